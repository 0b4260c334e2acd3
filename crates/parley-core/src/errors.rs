use thiserror::Error;

use crate::state::CallKind;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParleyError {
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("device busy: {0}")]
    DeviceBusy(String),
    #[error("device not found: {0}")]
    DeviceNotFound(String),
    #[error("media error: {0}")]
    Media(String),
    #[error("session creation failed: {0}")]
    SessionCreation(String),
    #[error("signaling failed: {0}")]
    Signaling(String),
    #[error("sdk unavailable: {0}")]
    SdkUnavailable(String),
    #[error("no active dialog selected")]
    NoDialogSelected,
    #[error("no other participants found in this dialog")]
    NoOpponents,
    #[error("unknown dialog: {0}")]
    UnknownDialog(String),
    #[error("dialog error: {0}")]
    Dialog(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl ParleyError {
    /// Message shown to the user for this failure.
    pub fn user_message(&self) -> String {
        match self {
            ParleyError::PermissionDenied(msg)
            | ParleyError::DeviceBusy(msg)
            | ParleyError::DeviceNotFound(msg)
            | ParleyError::Media(msg)
            | ParleyError::SessionCreation(msg)
            | ParleyError::Signaling(msg) => msg.clone(),
            other => {
                let text = other.to_string();
                let mut chars = text.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars).collect(),
                    None => text,
                }
            }
        }
    }
}

/// Failure category reported by the platform media layer.
///
/// Names follow the DOMException names browsers use for `getUserMedia`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaFailureKind {
    NotAllowed,
    NotReadable,
    NotFound,
    Other,
}

impl MediaFailureKind {
    pub fn from_name(name: &str) -> Self {
        match name {
            "NotAllowedError" | "PermissionDeniedError" => MediaFailureKind::NotAllowed,
            "NotReadableError" | "TrackStartError" => MediaFailureKind::NotReadable,
            "NotFoundError" | "DevicesNotFoundError" => MediaFailureKind::NotFound,
            _ => MediaFailureKind::Other,
        }
    }
}

/// A media acquisition failure as delivered by the SDK.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{name}: {message}")]
pub struct MediaFailure {
    pub name: String,
    pub message: String,
}

impl MediaFailure {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
        }
    }

    pub fn kind(&self) -> MediaFailureKind {
        MediaFailureKind::from_name(&self.name)
    }

    /// Classify into a call error with a message specific to the call kind.
    pub fn classify(&self, kind: CallKind) -> ParleyError {
        let video = kind == CallKind::Video;
        match self.kind() {
            MediaFailureKind::NotAllowed => ParleyError::PermissionDenied(format!(
                "Permission denied. Please allow access to your microphone{}",
                if video { " and camera" } else { "" }
            )),
            MediaFailureKind::NotReadable => ParleyError::DeviceBusy(
                "Device is already in use. Please close other applications using your microphone/camera"
                    .to_string(),
            ),
            MediaFailureKind::NotFound => ParleyError::DeviceNotFound(format!(
                "No microphone{} found",
                if video { " or camera" } else { "" }
            )),
            MediaFailureKind::Other => {
                ParleyError::Media("Failed to access media devices".to_string())
            }
        }
    }
}
