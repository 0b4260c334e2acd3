//! Parley call-session core.
//!
//! Drives the call UI state of a chat client from the communication SDK's
//! signaling events and the user's call actions. The SDK is injected
//! through the traits in [`sdk`]; no platform dependencies.

pub mod bridge;
pub mod client;
pub mod controller;
pub mod dialogs;
pub mod errors;
pub mod events;
pub mod media;
pub mod sdk;
pub mod settings;
pub mod state;

#[cfg(test)]
mod testing;

pub use bridge::CallEventBridge;
pub use client::{ParleyClient, SdkHandles};
pub use controller::{CallController, StreamRouting};
pub use dialogs::{ChatMessage, Dialog, DialogKind, DialogWorkspace, UserItem};
pub use errors::{MediaFailure, MediaFailureKind, ParleyError};
pub use events::{EventEmitter, ParleyEvent, ParleyEventListener};
pub use media::{
    MediaBindings, MediaRenderer, MediaRole, MediaStream, MediaTrack, NullRenderer, TrackKind,
};
pub use sdk::{
    CallSession, DialogService, MediaConstraints, MediaDevices, SignalingEvent, SignalingService,
    UserId,
};
pub use settings::{Settings, SettingsStore};
pub use state::{CallKind, CallStatus, CallUiState};

/// Install the tracing subscriber used by UI shells. Safe to call repeatedly.
pub fn init_logging() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("parley_core=debug"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_ansi(false)
            .try_init();
    });
}
