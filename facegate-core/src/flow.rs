//! Login and registration, independent of where frames come from.

use crate::config::{Config, MatchPolicy};
use crate::gallery::{validate_name, GalleryError, ReferenceGallery};
use crate::match_log::{LogEntry, MatchLog, MatchLogError};
use crate::recognition::{RecognitionError, Recognizer};
use chrono::Local;
use image::RgbImage;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FlowError {
    #[error(transparent)]
    Recognition(#[from] RecognitionError),
    #[error(transparent)]
    Gallery(#[from] GalleryError),
    #[error(transparent)]
    MatchLog(#[from] MatchLogError),
    #[error("Face recognition unavailable: {0}")]
    RecognizerUnavailable(String),
    #[error("No face detected in the image")]
    NoFaceDetected,
    #[error("Cancelled")]
    Cancelled,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LoginOutcome {
    Matched { entry: LogEntry, similarity: f32 },
    UnknownUser,
    NoFaceDetected,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Registration {
    pub name: String,
    pub path: PathBuf,
}

/// Gallery, match log and the policies that tie them together.
#[derive(Debug, Clone)]
pub struct Gatekeeper {
    gallery: ReferenceGallery,
    match_log: MatchLog,
    policy: MatchPolicy,
    require_face: bool,
}

impl Gatekeeper {
    pub fn new(gallery: ReferenceGallery, match_log: MatchLog) -> Self {
        Self {
            gallery,
            match_log,
            policy: MatchPolicy::Best,
            require_face: true,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            ReferenceGallery::new(&config.storage.gallery_dir, &config.storage.image_extension),
            MatchLog::new(&config.storage.log_path),
        )
        .with_policy(config.matching.policy)
        .require_face_on_register(config.registration.require_face)
    }

    pub fn with_policy(mut self, policy: MatchPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn require_face_on_register(mut self, require: bool) -> Self {
        self.require_face = require;
        self
    }

    pub fn gallery(&self) -> &ReferenceGallery {
        &self.gallery
    }

    pub fn match_log(&self) -> &MatchLog {
        &self.match_log
    }

    /// Identify the face in `query` against every gallery entry.
    ///
    /// The gallery is read only when the query has a face, and the match log
    /// is written only on a match. `cancel` is checked between entries.
    /// References that fail to embed are skipped like faceless ones.
    pub fn login<R: Recognizer + ?Sized>(
        &self,
        recognizer: &mut R,
        query: &RgbImage,
        cancel: &AtomicBool,
    ) -> Result<LoginOutcome, FlowError> {
        let Some(query_embedding) = recognizer.embed(query)? else {
            log::info!("Login: no face detected");
            return Ok(LoginOutcome::NoFaceDetected);
        };

        let mut best: Option<(String, f32)> = None;
        let mut compared = 0usize;

        for entry in self.gallery.list()? {
            if cancel.load(Ordering::Relaxed) {
                log::info!("Login cancelled after {} comparisons", compared);
                return Err(FlowError::Cancelled);
            }

            let reference = match recognizer.embed(&entry.image) {
                Ok(Some(reference)) => reference,
                Ok(None) => {
                    log::debug!("Reference image for {} has no detectable face, skipping", entry.name);
                    continue;
                }
                // One bad reference must not lock everyone else out
                Err(e) => {
                    log::warn!("Skipping reference {}: {}", entry.name, e);
                    continue;
                }
            };
            compared += 1;

            if !recognizer.is_same_identity(&query_embedding, &reference) {
                continue;
            }
            let similarity = recognizer.similarity(&query_embedding, &reference);
            log::debug!("{} matches with similarity {:.3}", entry.name, similarity);

            match self.policy {
                MatchPolicy::First => {
                    best = Some((entry.name, similarity));
                    break;
                }
                MatchPolicy::Best => {
                    if best.as_ref().map_or(true, |(_, s)| similarity > *s) {
                        best = Some((entry.name, similarity));
                    }
                }
            }
        }

        let Some((name, similarity)) = best else {
            log::info!("Login: unknown user ({} references compared)", compared);
            return Ok(LoginOutcome::UnknownUser);
        };

        let entry = self.match_log.append(&name, Local::now())?;
        log::info!("Login: welcome {} (similarity {:.3})", name, similarity);
        Ok(LoginOutcome::Matched { entry, similarity })
    }

    /// Store `capture` as the reference image for `name`.
    pub fn register<R: Recognizer + ?Sized>(
        &self,
        recognizer: &mut R,
        name: &str,
        capture: &RgbImage,
    ) -> Result<Registration, FlowError> {
        let name = validate_name(name)?;

        if self.require_face && recognizer.embed(capture)?.is_none() {
            log::info!("Registration of {} rejected: no face in capture", name);
            return Err(FlowError::NoFaceDetected);
        }

        let path = self.gallery.add(&name, capture)?;
        Ok(Registration { name, path })
    }
}
