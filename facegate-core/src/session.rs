use crate::capture::{CaptureError, FrameSource};
use crate::config::Config;
use crate::flow::{FlowError, Gatekeeper, LoginOutcome, Registration};
use crate::frame::Frame;
use crate::gallery::{validate_name, GalleryError};
use crate::recognition::OnnxRecognizer;
use crate::worker::{Job, JobId, JobOutcome, RecognitionWorker};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Another request is still running")]
    Busy,
    #[error("No registration in progress")]
    NotRegistering,
    #[error("Camera unavailable: {0}")]
    CameraUnavailable(String),
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error(transparent)]
    Gallery(#[from] GalleryError),
}

/// Where the controller is in its login / registration cycle.
#[derive(Debug, Clone)]
pub enum SessionState {
    /// Preview running, ready for an action
    Idle,
    /// A captured frame is being identified
    LoginAttempt { job: JobId },
    /// A frame is held while the operator types a name
    Registering { capture: Frame },
    /// The held frame is being written to the gallery
    Saving { job: JobId, name: String, capture: Frame },
}

/// A finished request, reported once by [`Session::poll`].
#[derive(Debug)]
pub enum SessionEvent {
    Login(Result<LoginOutcome, FlowError>),
    Registration(Result<Registration, FlowError>),
}

/// Everything one operator's session needs, passed explicitly to handlers.
pub struct Session {
    frames: Option<FrameSource>,
    camera_error: Option<String>,
    worker: RecognitionWorker,
    state: SessionState,
}

impl Session {
    pub fn new(frames: Result<FrameSource, CaptureError>, worker: RecognitionWorker) -> Self {
        let (frames, camera_error) = match frames {
            Ok(source) => (Some(source), None),
            Err(e) => {
                log::error!("Could not access the webcam: {}", e);
                (None, Some(e.to_string()))
            }
        };

        Self {
            frames,
            camera_error,
            worker,
            state: SessionState::Idle,
        }
    }

    /// Open the configured camera and start the ONNX recognition worker.
    pub fn start(config: &Config) -> Self {
        let frames = FrameSource::open_camera(&config.camera);
        let recognizer_config = config.clone();
        let worker = RecognitionWorker::spawn(Gatekeeper::from_config(config), move || {
            OnnxRecognizer::load(&recognizer_config)
        });
        Self::new(frames, worker)
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn is_busy(&self) -> bool {
        matches!(
            self.state,
            SessionState::LoginAttempt { .. } | SessionState::Saving { .. }
        )
    }

    /// Why the preview is blank, if the camera never opened.
    pub fn camera_error(&self) -> Option<&str> {
        self.camera_error.as_deref()
    }

    /// Latest frame for the preview. Capture hiccups are skipped quietly.
    pub fn refresh(&self) -> Option<Frame> {
        let source = self.frames.as_ref()?;
        match source.next_frame() {
            Ok(frame) => Some(frame),
            Err(e) => {
                log::trace!("Preview refresh skipped: {}", e);
                None
            }
        }
    }

    fn capture(&self) -> Result<Frame, SessionError> {
        let source = self.frames.as_ref().ok_or_else(|| {
            SessionError::CameraUnavailable(
                self.camera_error
                    .clone()
                    .unwrap_or_else(|| "no camera".to_string()),
            )
        })?;
        Ok(source.next_frame()?)
    }

    fn ensure_idle(&self) -> Result<(), SessionError> {
        match self.state {
            SessionState::Idle => Ok(()),
            _ => Err(SessionError::Busy),
        }
    }

    /// Capture the current frame and start identifying it.
    pub fn begin_login(&mut self) -> Result<JobId, SessionError> {
        self.ensure_idle()?;
        let frame = self.capture()?;
        let job = self.worker.submit(Job::Login { frame });
        log::debug!("Login attempt started (job {})", job);
        self.state = SessionState::LoginAttempt { job };
        Ok(job)
    }

    /// Capture and hold the current frame for registration.
    pub fn begin_registration(&mut self) -> Result<Frame, SessionError> {
        self.ensure_idle()?;
        let capture = self.capture()?;
        self.state = SessionState::Registering {
            capture: capture.clone(),
        };
        Ok(capture)
    }

    /// Save the held frame under `name`.
    ///
    /// An empty or unusable name is rejected here without leaving the
    /// registration view.
    pub fn accept_registration(&mut self, name: &str) -> Result<JobId, SessionError> {
        let capture = match &self.state {
            SessionState::Registering { capture } => capture.clone(),
            SessionState::Idle => return Err(SessionError::NotRegistering),
            _ => return Err(SessionError::Busy),
        };

        let name = validate_name(name)?;
        let job = self.worker.submit(Job::Register {
            name: name.clone(),
            frame: capture.clone(),
        });
        log::debug!("Registration of {} started (job {})", name, job);
        self.state = SessionState::Saving { job, name, capture };
        Ok(job)
    }

    /// Drop the held frame and go back to the preview.
    pub fn cancel_registration(&mut self) {
        if let SessionState::Registering { .. } = self.state {
            log::debug!("Registration discarded");
            self.state = SessionState::Idle;
        }
    }

    /// Collect a finished request, if one is ready. Never blocks.
    ///
    /// A failed save returns to the registration view with the same capture
    /// so the operator can fix the name or try again.
    pub fn poll(&mut self) -> Option<SessionEvent> {
        while let Some(done) = self.worker.try_recv() {
            let expected = match &self.state {
                SessionState::LoginAttempt { job } | SessionState::Saving { job, .. } => {
                    *job == done.id
                }
                _ => false,
            };
            if !expected {
                log::debug!("Discarding result of stale job {}", done.id);
                continue;
            }

            let state = std::mem::replace(&mut self.state, SessionState::Idle);
            let event = match (state, done.result) {
                (_, Ok(JobOutcome::Login(outcome))) => SessionEvent::Login(Ok(outcome)),
                (_, Ok(JobOutcome::Registered(registration))) => {
                    SessionEvent::Registration(Ok(registration))
                }
                (SessionState::Saving { capture, .. }, Err(e)) => {
                    self.state = SessionState::Registering { capture };
                    SessionEvent::Registration(Err(e))
                }
                (_, Err(e)) => SessionEvent::Login(Err(e)),
            };
            return Some(event);
        }
        None
    }

    /// Cancel in-flight recognition; used when the window closes.
    pub fn shutdown(&mut self) {
        self.worker.cancel();
        self.state = SessionState::Idle;
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.worker.cancel();
    }
}
