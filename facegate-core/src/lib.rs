//! Webcam face login: live frames, a folder of reference photos, an
//! append-only match log and a recognizer that ties them together.

pub mod capture;
pub mod config;
pub mod flow;
pub mod frame;
pub mod gallery;
pub mod match_log;
pub mod recognition;
pub mod session;
pub mod worker;

pub use capture::{CaptureError, FrameGrabber, FrameSource, V4lCamera};
pub use config::{Config, ConfigError, MatchPolicy};
pub use flow::{FlowError, Gatekeeper, LoginOutcome, Registration};
pub use frame::{Frame, FrameSlot, SlotRead};
pub use gallery::{GalleryEntry, GalleryError, ReferenceGallery};
pub use match_log::{LogEntry, MatchLog, MatchLogError};
pub use recognition::{cosine_similarity, Embedding, OnnxRecognizer, RecognitionError, Recognizer};
pub use session::{Session, SessionError, SessionEvent, SessionState};
pub use worker::{Job, JobId, JobOutcome, JobResult, RecognitionWorker};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Camera error: {0}")]
    Capture(#[from] CaptureError),
    #[error("Gallery error: {0}")]
    Gallery(#[from] GalleryError),
    #[error("Match log error: {0}")]
    MatchLog(#[from] MatchLogError),
    #[error("Recognition error: {0}")]
    Recognition(#[from] RecognitionError),
    #[error(transparent)]
    Flow(#[from] FlowError),
    #[error(transparent)]
    Session(#[from] SessionError),
}

pub type Result<T> = std::result::Result<T, Error>;
