use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::bridge::CallEventBridge;
use crate::controller::CallController;
use crate::dialogs::DialogWorkspace;
use crate::errors::ParleyError;
use crate::events::{EventEmitter, ParleyEventListener};
use crate::media::MediaRenderer;
use crate::sdk::{DialogService, MediaDevices, SignalingService, UserId};
use crate::settings::Settings;

const UNSUPPORTED_MESSAGE: &str = "WebRTC not supported in this browser";
const INIT_FAILED_MESSAGE: &str = "Failed to initialize call system";

/// The SDK capabilities the client is built on.
#[derive(Clone)]
pub struct SdkHandles {
    pub dialogs: Arc<dyn DialogService>,
    pub signaling: Arc<dyn SignalingService>,
    pub devices: Arc<dyn MediaDevices>,
    pub renderer: Arc<dyn MediaRenderer>,
}

/// Chat-and-calling client for one signed-in user.
pub struct ParleyClient {
    handles: SdkHandles,
    emitter: EventEmitter,
    calls: CallController,
    dialogs: DialogWorkspace,
    bridge: CallEventBridge,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl ParleyClient {
    pub fn new(handles: SdkHandles, settings: Settings, self_id: UserId) -> Self {
        let emitter = EventEmitter::new();
        let calls = CallController::new(
            handles.signaling.clone(),
            handles.devices.clone(),
            handles.renderer.clone(),
            emitter.clone(),
            settings,
            self_id,
        );
        let dialogs =
            DialogWorkspace::new(handles.dialogs.clone(), calls.clone(), emitter.clone(), self_id);
        Self {
            handles,
            emitter,
            calls,
            dialogs,
            bridge: CallEventBridge::new(),
            listener: Mutex::new(None),
        }
    }

    /// Register a listener for client events.
    pub fn add_listener(&self, listener: Arc<dyn ParleyEventListener>) {
        self.emitter.add_listener(listener);
    }

    pub fn calls(&self) -> &CallController {
        &self.calls
    }

    pub fn dialogs(&self) -> &DialogWorkspace {
        &self.dialogs
    }

    /// Pre-flight checks, dialog list, call events and the message listener.
    ///
    /// Failures are surfaced in the call state's error message; the client
    /// stays usable for whatever did start.
    pub async fn start(&self) -> Result<(), ParleyError> {
        tracing::info!("initializing client");
        if !self.handles.devices.is_webrtc_supported() {
            tracing::warn!("WebRTC not supported on this platform");
            self.calls.report_startup_error(UNSUPPORTED_MESSAGE).await;
        }

        let started = async {
            self.dialogs.refresh_dialogs().await?;
            self.bridge.arm(&self.calls)?;
            Ok::<(), ParleyError>(())
        }
        .await;

        {
            let mut listener = self.listener.lock().await;
            if listener.is_none() {
                match self.dialogs.listen() {
                    Ok(handle) => *listener = Some(handle),
                    Err(e) => tracing::warn!("message listener not started: {e}"),
                }
            }
        }

        match started {
            Ok(()) => {
                tracing::info!("client initialized");
                Ok(())
            }
            Err(e) => {
                tracing::error!("failed to initialize client: {e}");
                self.calls.report_startup_error(INIT_FAILED_MESSAGE).await;
                Err(e)
            }
        }
    }

    /// End any call and stop listening.
    pub async fn shutdown(&self) {
        self.calls.end_active().await;
        self.bridge.disarm();
        if let Some(handle) = self.listener.lock().await.take() {
            handle.abort();
        }
        tracing::info!("client shut down");
    }
}
