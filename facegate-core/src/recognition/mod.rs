//! Face embedding and comparison.
//!
//! The rest of the crate only talks to the [`Recognizer`] trait. The stock
//! implementation, [`OnnxRecognizer`], runs an SCRFD detector, aligns the
//! strongest face to the ArcFace template and embeds it.

pub mod align;
pub mod arcface;
pub mod onnx;
pub mod pipeline;
pub mod scrfd;

use ndarray::Array1;
use thiserror::Error;

pub use pipeline::OnnxRecognizer;

/// L2-normalized face descriptor
pub type Embedding = Array1<f32>;

#[derive(Debug, Error)]
pub enum RecognitionError {
    #[error("Failed to load model {path}: {reason}")]
    ModelLoad { path: String, reason: String },
    #[error("Inference failed: {0}")]
    Inference(String),
    #[error("Face alignment failed: {0}")]
    Alignment(String),
    #[error("Invalid embedding dimension, expected {expected} but got {actual}")]
    InvalidDimension { expected: usize, actual: usize },
}

/// Boundary to whatever turns images into comparable face embeddings.
pub trait Recognizer: Send {
    /// Embed the face in `image`, or `None` if no face is found.
    fn embed(&mut self, image: &image::RgbImage) -> Result<Option<Embedding>, RecognitionError>;

    /// Similarity score; higher means more alike.
    fn similarity(&self, a: &Embedding, b: &Embedding) -> f32;

    /// Same-person judgment against the recognizer's fixed threshold.
    fn is_same_identity(&self, a: &Embedding, b: &Embedding) -> bool;
}

impl<R: Recognizer + ?Sized> Recognizer for Box<R> {
    fn embed(&mut self, image: &image::RgbImage) -> Result<Option<Embedding>, RecognitionError> {
        (**self).embed(image)
    }

    fn similarity(&self, a: &Embedding, b: &Embedding) -> f32 {
        (**self).similarity(a, b)
    }

    fn is_same_identity(&self, a: &Embedding, b: &Embedding) -> bool {
        (**self).is_same_identity(a, b)
    }
}

/// Cosine similarity of two L2-normalized embeddings, which is their dot product
pub fn cosine_similarity(a: &Embedding, b: &Embedding) -> f32 {
    a.dot(b)
}

/// Scale `embedding` to unit length; the zero vector is left as is.
pub fn normalize(mut embedding: Embedding) -> Embedding {
    let norm = embedding.dot(&embedding).sqrt();
    if norm > 0.0 {
        embedding /= norm;
    }
    embedding
}
