use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;

use crate::controller::CallController;
use crate::errors::ParleyError;
use crate::sdk::SignalingEvent;

/// Forwards the SDK's signaling notifications to a [`CallController`].
///
/// Armed at most once; the event loop keeps running whatever a handler
/// does with an individual event.
pub struct CallEventBridge {
    armed: AtomicBool,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl CallEventBridge {
    pub fn new() -> Self {
        Self {
            armed: AtomicBool::new(false),
            task: Mutex::new(None),
        }
    }

    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::SeqCst)
    }

    /// Subscribe to the controller's signaling service and spawn the event
    /// loop. Returns `Ok(false)` when already armed.
    pub fn arm(&self, controller: &CallController) -> Result<bool, ParleyError> {
        if self
            .armed
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::info!("call events already armed");
            return Ok(false);
        }

        let events = match controller.signaling().subscribe() {
            Ok(events) => events,
            Err(e) => {
                self.armed.store(false, Ordering::SeqCst);
                tracing::error!("failed to subscribe to call events: {e}");
                return Err(e);
            }
        };

        let handle = tokio::spawn(Self::event_loop(events, controller.clone()));
        *self.task.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
        tracing::info!("call events armed");
        Ok(true)
    }

    /// Stop forwarding events. The bridge can be armed again afterwards.
    pub fn disarm(&self) {
        if let Some(handle) = self.task.lock().unwrap_or_else(PoisonError::into_inner).take() {
            handle.abort();
        }
        self.armed.store(false, Ordering::SeqCst);
    }

    async fn event_loop(mut events: UnboundedReceiver<SignalingEvent>, controller: CallController) {
        while let Some(event) = events.recv().await {
            Self::dispatch(&controller, event).await;
        }
        tracing::info!("signaling channel closed");
    }

    /// Apply one signaling event to the controller.
    pub async fn dispatch(controller: &CallController, event: SignalingEvent) {
        tracing::debug!("signaling event: {event:?}");
        match event {
            SignalingEvent::Incoming { session } => controller.on_incoming(session).await,
            SignalingEvent::Accepted { session_id, user_id } => {
                controller.on_accepted(&session_id, user_id).await
            }
            SignalingEvent::Stopped { session_id } => {
                tracing::info!("call {session_id} ended by remote or system");
                controller.on_terminated(&session_id).await
            }
            SignalingEvent::Rejected { session_id, user_id } => {
                tracing::info!("call {session_id} rejected by user {user_id}");
                controller.on_terminated(&session_id).await
            }
            SignalingEvent::UserNotAnswer { session_id, user_id } => {
                controller.on_no_answer(&session_id, user_id)
            }
            SignalingEvent::LocalStream { session_id, stream } => {
                controller.on_local_stream(&session_id, stream).await
            }
            SignalingEvent::RemoteStream {
                session_id,
                user_id,
                stream,
            } => controller.on_remote_stream(&session_id, user_id, stream).await,
        }
    }
}

impl Default for CallEventBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for CallEventBridge {
    fn drop(&mut self) {
        self.disarm();
    }
}
