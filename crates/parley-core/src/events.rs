use std::sync::{Arc, PoisonError, RwLock};

use crate::dialogs::ChatMessage;
use crate::media::MediaRole;
use crate::sdk::UserId;
use crate::state::{CallKind, CallUiState};

/// Events emitted by the core to UI shell listeners.
#[derive(Debug, Clone)]
pub enum ParleyEvent {
    CallStateChanged(CallUiState),
    IncomingCall { session_id: String, kind: CallKind, initiator: UserId },
    OpponentNoAnswer { session_id: String, user_id: UserId },
    MediaBound(MediaRole),
    MediaCleared(MediaRole),
    /// User-visible notice (the shell shows it as an alert or toast).
    Notice(String),
    DialogsUpdated(usize),
    ActiveDialogChanged(String),
    MessagesLoaded { dialog_id: String, count: usize },
    ChatMessageReceived(ChatMessage),
}

/// Trait for receiving events from the core.
/// Implementations must be Send + Sync (called from tokio tasks).
pub trait ParleyEventListener: Send + Sync {
    fn on_event(&self, event: ParleyEvent);
}

/// Internal event emitter that dispatches to registered listeners.
#[derive(Clone, Default)]
pub struct EventEmitter {
    listeners: Arc<RwLock<Vec<Arc<dyn ParleyEventListener>>>>,
}

impl EventEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_listener(&self, listener: Arc<dyn ParleyEventListener>) {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
    }

    pub fn emit(&self, event: ParleyEvent) {
        let listeners = self.listeners.read().unwrap_or_else(PoisonError::into_inner);
        for listener in listeners.iter() {
            listener.on_event(event.clone());
        }
    }

    pub fn notice(&self, text: impl Into<String>) {
        self.emit(ParleyEvent::Notice(text.into()));
    }
}
