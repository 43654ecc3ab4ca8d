use facegate_core::{FlowError, GalleryError, LoginOutcome, SessionError};
use rfd::{AsyncMessageDialog, MessageButtons, MessageLevel};

const NO_FACE: &str = "No face detected in the image.";
const NO_USERNAME: &str = "Please provide a username.";

/// A modal message box waiting to be shown.
#[derive(Debug, Clone)]
pub struct Notice {
    pub level: MessageLevel,
    pub title: String,
    pub body: String,
}

impl Notice {
    fn new(level: MessageLevel, title: &str, body: impl Into<String>) -> Self {
        Self {
            level,
            title: title.to_string(),
            body: body.into(),
        }
    }

    pub fn error(body: impl Into<String>) -> Self {
        Self::new(MessageLevel::Error, "Error", body)
    }

    pub fn login(outcome: &LoginOutcome) -> Self {
        match outcome {
            LoginOutcome::Matched { entry, .. } => Self::new(
                MessageLevel::Info,
                "Welcome back!",
                format!("Welcome, {}", entry.name),
            ),
            LoginOutcome::UnknownUser => Self::new(
                MessageLevel::Warning,
                "Oops...",
                "Unknown user. Please register or try again.",
            ),
            LoginOutcome::NoFaceDetected => Self::error(NO_FACE),
        }
    }

    pub fn registered() -> Self {
        Self::new(MessageLevel::Info, "Success", "User registered successfully!")
    }

    pub fn flow_failure(error: &FlowError) -> Self {
        match error {
            FlowError::NoFaceDetected => Self::error(NO_FACE),
            FlowError::Gallery(GalleryError::EmptyName) => Self::error(NO_USERNAME),
            FlowError::MatchLog(e) => Self::error(format!("Login could not be recorded: {}", e)),
            other => Self::error(other.to_string()),
        }
    }

    pub fn session_failure(error: &SessionError) -> Self {
        match error {
            SessionError::Gallery(GalleryError::EmptyName) => Self::error(NO_USERNAME),
            other => Self::error(other.to_string()),
        }
    }

    /// Show the message box; resolves once it is dismissed.
    pub async fn show(self) {
        AsyncMessageDialog::new()
            .set_level(self.level)
            .set_title(&self.title)
            .set_description(&self.body)
            .set_buttons(MessageButtons::Ok)
            .show()
            .await;
    }
}
