use super::onnx;
use super::RecognitionError;
use image::{imageops, RgbImage};
use ort::session::Session;
use ort::value::Value;
use std::cmp::Ordering;
use std::path::Path;

const INPUT_SIZE: u32 = 640;

/// Feature pyramid strides; outputs come grouped as scores, boxes, keypoints
const STRIDES: [usize; 3] = [8, 16, 32];
const ANCHORS_PER_CELL: usize = 2;
const NMS_IOU: f32 = 0.4;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaceBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl FaceBox {
    pub fn area(&self) -> f32 {
        self.width * self.height
    }

    pub fn iou(&self, other: &FaceBox) -> f32 {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = (self.x + self.width).min(other.x + other.width);
        let y2 = (self.y + self.height).min(other.y + other.height);

        let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
        let union = self.area() + other.area() - intersection;
        if union > 0.0 {
            intersection / union
        } else {
            0.0
        }
    }
}

/// Eyes, nose tip and mouth corners, in that order
pub type Landmarks = [(f32, f32); 5];

#[derive(Debug, Clone)]
pub struct DetectedFace {
    pub bbox: FaceBox,
    pub landmarks: Landmarks,
    pub confidence: f32,
}

impl DetectedFace {
    /// Ranking used to pick the subject when several faces are present
    fn prominence(&self) -> f32 {
        self.confidence * self.bbox.area().sqrt()
    }
}

/// SCRFD face detector.
pub struct ScrfdDetector {
    session: Session,
    confidence_threshold: f32,
}

impl ScrfdDetector {
    pub fn new<P: AsRef<Path>>(model_path: P, confidence_threshold: f32) -> Result<Self, RecognitionError> {
        Ok(Self {
            session: onnx::load_session(model_path)?,
            confidence_threshold,
        })
    }

    /// Detect faces, most prominent first. An empty vector means no face.
    pub fn detect(&mut self, image: &RgbImage) -> Result<Vec<DetectedFace>, RecognitionError> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Ok(Vec::new());
        }

        let resized = imageops::resize(image, INPUT_SIZE, INPUT_SIZE, imageops::FilterType::Triangle);
        let scale_x = INPUT_SIZE as f32 / width as f32;
        let scale_y = INPUT_SIZE as f32 / height as f32;

        let tensor = onnx::to_nchw(&resized, |v| (v as f32 - 127.5) / 128.0);
        let input = Value::from_array(tensor)
            .map_err(|e| RecognitionError::Inference(format!("Failed to create input tensor: {}", e)))?;

        let outputs = self
            .session
            .run(ort::inputs![input])
            .map_err(|e| RecognitionError::Inference(e.to_string()))?;

        if outputs.len() < STRIDES.len() * 3 {
            return Err(RecognitionError::Inference(format!(
                "Expected {} detector outputs, got {}",
                STRIDES.len() * 3,
                outputs.len()
            )));
        }

        let mut candidates = Vec::new();
        for (level, &stride) in STRIDES.iter().enumerate() {
            let extract = |idx: usize, what: &'static str| {
                outputs[idx]
                    .try_extract_tensor::<f32>()
                    .map(|(_, data)| data)
                    .map_err(|e| {
                        RecognitionError::Inference(format!(
                            "Failed to extract {} for stride {}: {}",
                            what, stride, e
                        ))
                    })
            };
            let scores = extract(level, "scores")?;
            let boxes = extract(level + STRIDES.len(), "boxes")?;
            let points = extract(level + STRIDES.len() * 2, "landmarks")?;

            let cells = INPUT_SIZE as usize / stride;
            for cell in 0..cells * cells {
                let cx = ((cell % cells) * stride) as f32;
                let cy = ((cell / cells) * stride) as f32;

                for anchor in 0..ANCHORS_PER_CELL {
                    let idx = cell * ANCHORS_PER_CELL + anchor;
                    let Some(&score) = scores.get(idx) else {
                        continue;
                    };
                    // Stock exports end in a sigmoid, so scores are already probabilities
                    if score < self.confidence_threshold {
                        continue;
                    }
                    let (Some(dist), Some(kps)) =
                        (boxes.get(idx * 4..idx * 4 + 4), points.get(idx * 10..idx * 10 + 10))
                    else {
                        continue;
                    };

                    let s = stride as f32;
                    let x1 = (cx - dist[0] * s) / scale_x;
                    let y1 = (cy - dist[1] * s) / scale_y;
                    let x2 = (cx + dist[2] * s) / scale_x;
                    let y2 = (cy + dist[3] * s) / scale_y;

                    let mut landmarks: Landmarks = [(0.0, 0.0); 5];
                    for (k, point) in landmarks.iter_mut().enumerate() {
                        *point = (
                            (cx + kps[k * 2] * s) / scale_x,
                            (cy + kps[k * 2 + 1] * s) / scale_y,
                        );
                    }

                    candidates.push(DetectedFace {
                        bbox: FaceBox {
                            x: x1,
                            y: y1,
                            width: x2 - x1,
                            height: y2 - y1,
                        },
                        landmarks,
                        confidence: score,
                    });
                }
            }
        }

        log::debug!("SCRFD: {} candidates before NMS", candidates.len());

        let mut faces = non_max_suppression(candidates, NMS_IOU);
        faces.sort_by(|a, b| {
            b.prominence()
                .partial_cmp(&a.prominence())
                .unwrap_or(Ordering::Equal)
        });
        Ok(faces)
    }
}

fn non_max_suppression(mut faces: Vec<DetectedFace>, iou_threshold: f32) -> Vec<DetectedFace> {
    faces.sort_by(|a, b| b.confidence.partial_cmp(&a.confidence).unwrap_or(Ordering::Equal));

    let mut kept: Vec<DetectedFace> = Vec::with_capacity(faces.len());
    for face in faces {
        if kept.iter().all(|k| k.bbox.iou(&face.bbox) <= iou_threshold) {
            kept.push(face);
        }
    }
    kept
}
