use serde::{Deserialize, Serialize};

/// Audio-only or audio+video.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallKind {
    Audio,
    Video,
}

impl CallKind {
    pub fn has_video(self) -> bool {
        self == CallKind::Video
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CallKind::Audio => "audio",
            CallKind::Video => "video",
        }
    }
}

impl std::fmt::Display for CallKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Call state rendered by the UI shell.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallUiState {
    pub in_progress: bool,
    pub incoming: bool,
    pub kind: Option<CallKind>,
    pub error_message: String,
}

impl CallUiState {
    pub fn idle() -> Self {
        Self::default()
    }

    pub fn is_idle(&self) -> bool {
        !self.in_progress && !self.incoming && self.kind.is_none()
    }

    /// Project the flags into the three affordances the shell renders.
    pub fn status(&self) -> CallStatus {
        match (self.incoming, self.in_progress, self.kind) {
            (true, _, Some(kind)) => CallStatus::Incoming(kind),
            (false, true, Some(kind)) => CallStatus::InProgress(kind),
            _ => CallStatus::Idle,
        }
    }

    /// Label for the incoming banner, e.g. "Incoming video call...".
    pub fn incoming_label(&self) -> Option<String> {
        match self.status() {
            CallStatus::Incoming(kind) => Some(format!("Incoming {kind} call...")),
            _ => None,
        }
    }

    /// Start buttons are disabled while a call is running or ringing.
    pub fn can_start_call(&self) -> bool {
        !self.in_progress && !self.incoming
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallStatus {
    Idle,
    Incoming(CallKind),
    InProgress(CallKind),
}
