use super::align::ALIGNED_SIZE;
use super::{normalize, onnx, Embedding, RecognitionError};
use image::RgbImage;
use ndarray::Array1;
use ort::session::Session;
use ort::value::Value;
use std::path::Path;

/// ArcFace descriptor length
pub const EMBEDDING_DIM: usize = 512;

/// ArcFace embedder over 112×112 aligned crops.
pub struct ArcFaceEmbedder {
    session: Session,
}

impl ArcFaceEmbedder {
    pub fn new<P: AsRef<Path>>(model_path: P) -> Result<Self, RecognitionError> {
        Ok(Self {
            session: onnx::load_session(model_path)?,
        })
    }

    pub fn embed(&mut self, aligned: &RgbImage) -> Result<Embedding, RecognitionError> {
        let (width, height) = aligned.dimensions();
        if width != ALIGNED_SIZE || height != ALIGNED_SIZE {
            return Err(RecognitionError::Inference(format!(
                "Input image must be {0}x{0}, got {1}x{2}",
                ALIGNED_SIZE, width, height
            )));
        }

        let tensor = onnx::to_nchw(aligned, |v| (v as f32 - 127.5) / 128.0);
        let input = Value::from_array(tensor)
            .map_err(|e| RecognitionError::Inference(format!("Failed to create input tensor: {}", e)))?;

        let outputs = self
            .session
            .run(ort::inputs![input])
            .map_err(|e| RecognitionError::Inference(e.to_string()))?;

        let (shape, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| RecognitionError::Inference(format!("Failed to extract embedding: {}", e)))?;

        let actual = shape.get(1).copied().unwrap_or(0) as usize;
        if shape.len() != 2 || actual != EMBEDDING_DIM || data.len() < EMBEDDING_DIM {
            return Err(RecognitionError::InvalidDimension {
                expected: EMBEDDING_DIM,
                actual,
            });
        }

        Ok(normalize(Array1::from_vec(data[..EMBEDDING_DIM].to_vec())))
    }
}
