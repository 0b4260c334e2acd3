//! Capability boundary to the communication SDK.
//!
//! Signaling, media transport and the messaging backend live behind these
//! traits. An adapter over the real SDK implements them; tests use fakes.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedReceiver;

use crate::dialogs::{ChatMessage, Dialog, UserItem};
use crate::errors::{MediaFailure, ParleyError};
use crate::media::MediaStream;
use crate::state::CallKind;

pub type UserId = u64;

/// Media request passed to the SDK when acquiring local media.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaConstraints {
    pub audio: bool,
    pub video: bool,
    pub muted: bool,
    pub mirror: bool,
}

impl MediaConstraints {
    pub fn for_kind(kind: CallKind, muted: bool, mirror: bool) -> Self {
        Self {
            audio: true,
            video: kind.has_video(),
            muted,
            mirror,
        }
    }
}

/// One call negotiation, owned by the SDK.
#[async_trait]
pub trait CallSession: Send + Sync {
    fn id(&self) -> &str;
    fn kind(&self) -> CallKind;
    fn initiator(&self) -> UserId;

    /// Acquire local media for this session.
    async fn acquire_media(&self, constraints: MediaConstraints) -> Result<MediaStream, MediaFailure>;
    /// Place the call to the session's opponents.
    async fn call(&self, constraints: MediaConstraints) -> Result<(), ParleyError>;
    async fn accept(&self, constraints: MediaConstraints) -> Result<(), ParleyError>;
    async fn stop(&self) -> Result<(), ParleyError>;
    async fn reject(&self) -> Result<(), ParleyError>;

    /// Hand over the locally held stream, if the session still has one.
    fn take_local_stream(&self) -> Option<MediaStream>;
}

/// Notifications delivered by the SDK's signaling layer.
#[derive(Clone)]
pub enum SignalingEvent {
    Incoming {
        session: Arc<dyn CallSession>,
    },
    Accepted {
        session_id: String,
        user_id: UserId,
    },
    Stopped {
        session_id: String,
    },
    Rejected {
        session_id: String,
        user_id: UserId,
    },
    UserNotAnswer {
        session_id: String,
        user_id: UserId,
    },
    LocalStream {
        session_id: String,
        stream: MediaStream,
    },
    RemoteStream {
        session_id: String,
        user_id: UserId,
        stream: MediaStream,
    },
}

impl std::fmt::Debug for SignalingEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignalingEvent::Incoming { session } => f
                .debug_struct("Incoming")
                .field("session_id", &session.id())
                .field("kind", &session.kind())
                .finish(),
            SignalingEvent::Accepted { session_id, user_id } => f
                .debug_struct("Accepted")
                .field("session_id", session_id)
                .field("user_id", user_id)
                .finish(),
            SignalingEvent::Stopped { session_id } => {
                f.debug_struct("Stopped").field("session_id", session_id).finish()
            }
            SignalingEvent::Rejected { session_id, user_id } => f
                .debug_struct("Rejected")
                .field("session_id", session_id)
                .field("user_id", user_id)
                .finish(),
            SignalingEvent::UserNotAnswer { session_id, user_id } => f
                .debug_struct("UserNotAnswer")
                .field("session_id", session_id)
                .field("user_id", user_id)
                .finish(),
            SignalingEvent::LocalStream { session_id, stream } => f
                .debug_struct("LocalStream")
                .field("session_id", session_id)
                .field("stream", stream)
                .finish(),
            SignalingEvent::RemoteStream {
                session_id,
                user_id,
                stream,
            } => f
                .debug_struct("RemoteStream")
                .field("session_id", session_id)
                .field("user_id", user_id)
                .field("stream", stream)
                .finish(),
        }
    }
}

#[async_trait]
pub trait SignalingService: Send + Sync {
    /// Subscribe to signaling notifications. Fails with `SdkUnavailable` when
    /// the SDK's call module is not initialized.
    fn subscribe(&self) -> Result<UnboundedReceiver<SignalingEvent>, ParleyError>;

    async fn create_session(
        &self,
        opponents: &[UserId],
        kind: CallKind,
    ) -> Result<Arc<dyn CallSession>, ParleyError>;
}

#[async_trait]
pub trait MediaDevices: Send + Sync {
    /// Whether the platform offers media capture and peer connections.
    fn is_webrtc_supported(&self) -> bool;

    /// Probe device access for `kind` and release the probe's tracks.
    async fn request_permission(&self, kind: CallKind) -> Result<(), MediaFailure>;
}

#[async_trait]
pub trait DialogService: Send + Sync {
    async fn list_dialogs(&self) -> Result<Vec<Dialog>, ParleyError>;
    /// Messages of a dialog, newest first.
    async fn list_messages(&self, dialog_id: &str) -> Result<Vec<ChatMessage>, ParleyError>;
    async fn send_message(&self, dialog_id: &str, text: &str) -> Result<(), ParleyError>;
    async fn join_if_needed(&self, dialog: &Dialog) -> Result<(), ParleyError>;
    /// The single global incoming-message listener.
    fn subscribe_messages(&self) -> Result<UnboundedReceiver<ChatMessage>, ParleyError>;
    async fn search_users(&self, query: Option<&str>) -> Result<Vec<UserItem>, ParleyError>;
    async fn create_private_dialog(&self, opponent: UserId) -> Result<Dialog, ParleyError>;
    async fn create_group_dialog(
        &self,
        name: &str,
        occupants: &[UserId],
    ) -> Result<Dialog, ParleyError>;
}
