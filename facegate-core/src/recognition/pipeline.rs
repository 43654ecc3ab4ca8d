use super::align::align_face;
use super::arcface::ArcFaceEmbedder;
use super::scrfd::ScrfdDetector;
use super::{cosine_similarity, Embedding, RecognitionError, Recognizer};
use crate::config::Config;
use image::RgbImage;

/// Detect → align → embed, compared by cosine similarity.
pub struct OnnxRecognizer {
    detector: ScrfdDetector,
    embedder: ArcFaceEmbedder,
    threshold: f32,
}

impl OnnxRecognizer {
    /// Load both models named in `config`.
    pub fn load(config: &Config) -> Result<Self, RecognitionError> {
        log::info!("Loading face detection model...");
        let detector = ScrfdDetector::new(
            &config.detection.model_path,
            config.detection.confidence_threshold,
        )?;

        log::info!("Loading face embedding model...");
        let embedder = ArcFaceEmbedder::new(&config.embedding.model_path)?;

        Ok(Self {
            detector,
            embedder,
            threshold: config.matching.threshold,
        })
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }
}

impl Recognizer for OnnxRecognizer {
    fn embed(&mut self, image: &RgbImage) -> Result<Option<Embedding>, RecognitionError> {
        let started = std::time::Instant::now();
        let faces = self.detector.detect(image)?;
        let Some(face) = faces.first() else {
            log::debug!("No face detected");
            return Ok(None);
        };
        if faces.len() > 1 {
            log::debug!("{} faces detected, using the most prominent", faces.len());
        }

        let aligned = align_face(image, &face.landmarks)?;
        let embedding = self.embedder.embed(&aligned)?;
        log::debug!(
            "Embedded face (confidence {:.2}) in {}ms",
            face.confidence,
            started.elapsed().as_millis()
        );
        Ok(Some(embedding))
    }

    fn similarity(&self, a: &Embedding, b: &Embedding) -> f32 {
        cosine_similarity(a, b)
    }

    fn is_same_identity(&self, a: &Embedding, b: &Embedding) -> bool {
        self.similarity(a, b) >= self.threshold
    }
}
