use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use crate::dialogs::Dialog;
use crate::errors::{MediaFailureKind, ParleyError};
use crate::events::{EventEmitter, ParleyEvent};
use crate::media::{MediaBindings, MediaRenderer, MediaRole, MediaStream};
use crate::sdk::{CallSession, MediaConstraints, MediaDevices, SignalingService, UserId};
use crate::settings::Settings;
use crate::state::{CallKind, CallStatus, CallUiState};

/// Where the streams of the current call are displayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamRouting {
    /// `None` for audio calls: the local stream stays with the session.
    pub local: Option<MediaRole>,
    pub remote: MediaRole,
}

impl StreamRouting {
    pub fn for_kind(kind: CallKind) -> Self {
        match kind {
            CallKind::Video => Self {
                local: Some(MediaRole::LocalVideo),
                remote: MediaRole::RemoteVideo,
            },
            CallKind::Audio => Self {
                local: None,
                remote: MediaRole::RemoteAudio,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamOrigin {
    Local,
    Remote,
}

struct CallInner {
    state: CallUiState,
    session: Option<Arc<dyn CallSession>>,
    routing: Option<StreamRouting>,
    bindings: MediaBindings,
    /// Bumped by every attempt and every teardown. A completion carrying an
    /// older value belongs to a superseded attempt.
    attempt: u64,
    /// Outgoing attempt claimed before its permission check has finished.
    /// The UI state stays idle until the call is actually placed.
    pending: Option<u64>,
}

impl CallInner {
    fn is_busy(&self) -> bool {
        !self.state.is_idle() || self.pending.is_some()
    }
}

/// Owns the single call slot and every transition of the call UI state.
///
/// Only this controller (directly, or through the event bridge) mutates the
/// session reference, the stream bindings and [`CallUiState`]. The lock is
/// never held across an SDK call.
#[derive(Clone)]
pub struct CallController {
    inner: Arc<Mutex<CallInner>>,
    signaling: Arc<dyn SignalingService>,
    devices: Arc<dyn MediaDevices>,
    renderer: Arc<dyn MediaRenderer>,
    emitter: EventEmitter,
    settings: Settings,
    self_id: UserId,
}

impl CallController {
    pub fn new(
        signaling: Arc<dyn SignalingService>,
        devices: Arc<dyn MediaDevices>,
        renderer: Arc<dyn MediaRenderer>,
        emitter: EventEmitter,
        settings: Settings,
        self_id: UserId,
    ) -> Self {
        Self {
            inner: Arc::new(Mutex::new(CallInner {
                state: CallUiState::idle(),
                session: None,
                routing: None,
                bindings: MediaBindings::new(),
                attempt: 0,
                pending: None,
            })),
            signaling,
            devices,
            renderer,
            emitter,
            settings,
            self_id,
        }
    }

    pub fn signaling(&self) -> Arc<dyn SignalingService> {
        self.signaling.clone()
    }

    pub async fn state(&self) -> CallUiState {
        self.inner.lock().await.state.clone()
    }

    pub async fn status(&self) -> CallStatus {
        self.inner.lock().await.state.status()
    }

    pub async fn has_session(&self) -> bool {
        self.inner.lock().await.session.is_some()
    }

    pub async fn session_id(&self) -> Option<String> {
        self.inner
            .lock()
            .await
            .session
            .as_ref()
            .map(|s| s.id().to_string())
    }

    /// Id of the stream currently shown in `role`.
    pub async fn bound_stream(&self, role: MediaRole) -> Option<String> {
        self.inner
            .lock()
            .await
            .bindings
            .get(role)
            .map(|s| s.id().to_string())
    }

    pub async fn has_bound_streams(&self) -> bool {
        !self.inner.lock().await.bindings.is_empty()
    }

    pub async fn start_audio_call(&self, dialog: Option<&Dialog>) -> Result<(), ParleyError> {
        self.start_call(dialog, CallKind::Audio).await
    }

    pub async fn start_video_call(&self, dialog: Option<&Dialog>) -> Result<(), ParleyError> {
        self.start_call(dialog, CallKind::Video).await
    }

    async fn start_call(&self, dialog: Option<&Dialog>, kind: CallKind) -> Result<(), ParleyError> {
        let Some(dialog) = dialog else {
            return Err(self.precondition_failed(ParleyError::NoDialogSelected));
        };
        tracing::info!("starting {kind} call in dialog {}", dialog.id);
        self.set_error(String::new()).await;

        let opponents = dialog.opponents(self.self_id);
        if opponents.is_empty() {
            return Err(self.precondition_failed(ParleyError::NoOpponents));
        }
        tracing::info!("{kind} call opponents: {opponents:?}");

        let (previous, busy) = {
            let inner = self.inner.lock().await;
            (inner.session.clone(), inner.is_busy())
        };
        if let Some(previous) = previous {
            tracing::info!("stopping existing call {}", previous.id());
            if let Err(e) = previous.stop().await {
                tracing::warn!("error stopping call {}: {e}", previous.id());
            }
            self.teardown().await;
        } else if busy {
            self.teardown().await;
        }

        let attempt = {
            let mut inner = self.inner.lock().await;
            inner.attempt += 1;
            inner.pending = Some(inner.attempt);
            inner.attempt
        };

        let permission = self.devices.request_permission(kind).await;
        if permission.is_ok() && self.settings.permission_settle_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.settings.permission_settle_ms)).await;
        }

        let mut inner = self.inner.lock().await;
        if inner.attempt != attempt {
            tracing::info!("{kind} call attempt superseded during permission check");
            return Ok(());
        }
        inner.pending = None;
        if let Err(failure) = permission {
            tracing::warn!("{kind} permission check failed: {failure}");
            let err = match failure.kind() {
                MediaFailureKind::NotReadable | MediaFailureKind::NotFound => failure.classify(kind),
                MediaFailureKind::NotAllowed | MediaFailureKind::Other => {
                    ParleyError::PermissionDenied(permission_required_message(kind).to_string())
                }
            };
            inner.state.error_message = err.user_message();
            self.emit_state(&inner.state);
            drop(inner);
            self.emitter.notice(match &err {
                ParleyError::PermissionDenied(_) => permission_notice(kind).to_string(),
                other => other.user_message(),
            });
            return Err(err);
        }
        inner.state.in_progress = true;
        inner.state.kind = Some(kind);
        inner.routing = Some(StreamRouting::for_kind(kind));
        self.emit_state(&inner.state);
        drop(inner);

        match self.place_call(attempt, &opponents, kind).await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.abort_attempt(attempt, &e).await;
                Err(e)
            }
        }
    }

    async fn place_call(
        &self,
        attempt: u64,
        opponents: &[UserId],
        kind: CallKind,
    ) -> Result<(), ParleyError> {
        let session = self
            .signaling
            .create_session(opponents, kind)
            .await
            .map_err(|e| match e {
                ParleyError::SessionCreation(_) => e,
                other => ParleyError::SessionCreation(format!(
                    "Failed to create WebRTC session: {}",
                    other.user_message()
                )),
            })?;

        if !self.adopt_session(attempt, &session).await {
            tracing::info!("call attempt superseded before session {} started", session.id());
            if let Err(e) = session.stop().await {
                tracing::warn!("error stopping superseded session {}: {e}", session.id());
            }
            return Ok(());
        }

        let constraints = self.constraints(kind);
        let stream = session
            .acquire_media(constraints)
            .await
            .map_err(|f| f.classify(kind))?;
        tracing::info!("user media obtained for session {}", session.id());
        if !self.bind_acquired(attempt, session.id(), stream).await {
            return Ok(());
        }

        session.call(constraints).await.map_err(|e| {
            ParleyError::Signaling(format!("Failed to initiate call: {}", e.user_message()))
        })?;
        tracing::info!("{kind} call {} placed", session.id());
        Ok(())
    }

    async fn adopt_session(&self, attempt: u64, session: &Arc<dyn CallSession>) -> bool {
        let mut inner = self.inner.lock().await;
        if inner.attempt != attempt {
            return false;
        }
        inner.session = Some(session.clone());
        true
    }

    /// Bind a stream returned by `acquire_media`. Stops it instead when the
    /// attempt that requested it has been superseded.
    async fn bind_acquired(&self, attempt: u64, session_id: &str, stream: MediaStream) -> bool {
        let mut inner = self.inner.lock().await;
        let current = inner.attempt == attempt
            && inner.session.as_ref().is_some_and(|s| s.id() == session_id);
        if !current {
            let stopped = stream.stop_all();
            tracing::info!("late local stream {} for session {session_id} stopped ({stopped} tracks)", stream.id());
            return false;
        }
        self.bind_routed(&mut inner, StreamOrigin::Local, stream);
        true
    }

    fn bind_routed(&self, inner: &mut CallInner, origin: StreamOrigin, stream: MediaStream) {
        let role = inner.routing.and_then(|routing| match origin {
            StreamOrigin::Local => routing.local,
            StreamOrigin::Remote => Some(routing.remote),
        });
        match role {
            Some(role) => {
                inner.bindings.bind(role, stream, self.renderer.as_ref());
                self.emitter.emit(ParleyEvent::MediaBound(role));
            }
            None => tracing::debug!("local stream {} kept by session, not displayed", stream.id()),
        }
    }

    async fn abort_attempt(&self, attempt: u64, err: &ParleyError) {
        let message = err.user_message();
        let session = {
            let mut inner = self.inner.lock().await;
            if inner.attempt != attempt {
                tracing::info!("ignoring failure of superseded call attempt: {err}");
                return;
            }
            tracing::warn!("call attempt failed: {err}");
            let session = inner.session.take();
            inner.attempt += 1;
            inner.routing = None;
            inner.state = CallUiState {
                error_message: message.clone(),
                ..CallUiState::idle()
            };
            self.release_media(&mut inner, session.as_deref());
            self.emit_state(&inner.state);
            session
        };
        if let Some(session) = session {
            if let Err(e) = session.stop().await {
                tracing::warn!("error stopping failed session {}: {e}", session.id());
            }
        }
        self.emitter.notice(message);
    }

    /// Accept the stored incoming call. Without one this is a no-op.
    pub async fn accept_incoming(&self) -> Result<(), ParleyError> {
        let (session, kind, attempt) = {
            let mut inner = self.inner.lock().await;
            let Some(session) = inner.session.clone() else {
                tracing::warn!("no session to accept");
                return Ok(());
            };
            if !inner.state.incoming {
                tracing::warn!("session {} is not ringing", session.id());
                return Ok(());
            }
            let kind = session.kind();
            inner.attempt += 1;
            inner.routing = Some(StreamRouting::for_kind(kind));
            inner.state.error_message.clear();
            self.emit_state(&inner.state);
            (session, kind, inner.attempt)
        };
        tracing::info!("accepting incoming {kind} call {}", session.id());

        let constraints = self.constraints(kind);
        let accepted: Result<bool, ParleyError> = async {
            let stream = session
                .acquire_media(constraints)
                .await
                .map_err(|f| f.classify(kind))?;
            if !self.bind_acquired(attempt, session.id(), stream).await {
                return Ok(false);
            }
            session.accept(constraints).await.map_err(|e| {
                ParleyError::Signaling(format!("Failed to accept call: {}", e.user_message()))
            })?;
            Ok(true)
        }
        .await;

        let mut inner = self.inner.lock().await;
        if inner.attempt != attempt {
            tracing::info!("accept of {} superseded", session.id());
            return Ok(());
        }
        match accepted {
            Ok(_) => {
                inner.state.incoming = false;
                inner.state.in_progress = true;
                inner.state.error_message.clear();
                self.emit_state(&inner.state);
                tracing::info!("call {} accepted", session.id());
                Ok(())
            }
            Err(e) => {
                tracing::warn!("failed to accept call {}: {e}", session.id());
                self.teardown_locked(&mut inner);
                drop(inner);
                self.emitter.notice(e.user_message());
                Err(e)
            }
        }
    }

    /// Decline the ringing call. SDK errors are logged; teardown always runs.
    pub async fn reject_incoming(&self) {
        self.terminate(Termination::Reject).await;
    }

    /// Hang up the current call. SDK errors are logged; teardown always runs.
    pub async fn end_active(&self) {
        self.terminate(Termination::Stop).await;
    }

    async fn terminate(&self, how: Termination) {
        let (session, busy) = {
            let inner = self.inner.lock().await;
            (inner.session.clone(), inner.is_busy())
        };
        match session {
            Some(session) => {
                tracing::info!("{} call {}", how.verb(), session.id());
                let result = match how {
                    Termination::Stop => session.stop().await,
                    Termination::Reject => session.reject().await,
                };
                if let Err(e) = result {
                    tracing::warn!("error during {} of {}: {e}", how.verb(), session.id());
                }
            }
            // An outgoing attempt that has no session yet.
            None if busy => tracing::info!("{} pending call attempt", how.verb()),
            None => {
                tracing::debug!("no session to {}", how.verb());
                return;
            }
        }
        self.teardown().await;
    }

    /// End the call because the user navigated to another dialog.
    pub async fn handle_dialog_switch(&self) {
        let active = {
            let inner = self.inner.lock().await;
            inner.session.is_some() || inner.is_busy()
        };
        if active {
            tracing::info!("active dialog changed, ending current call");
            self.end_active().await;
        }
    }

    /// Full reset: idle state, no session, every stream stopped and unbound.
    /// Idempotent.
    pub async fn teardown(&self) {
        let mut inner = self.inner.lock().await;
        self.teardown_locked(&mut inner);
    }

    fn teardown_locked(&self, inner: &mut CallInner) {
        let had_call = !inner.state.is_idle()
            || !inner.state.error_message.is_empty()
            || inner.session.is_some()
            || !inner.bindings.is_empty();
        inner.state = CallUiState::idle();
        let session = inner.session.take();
        inner.routing = None;
        inner.pending = None;
        inner.attempt += 1;
        self.release_media(inner, session.as_deref());
        if had_call {
            tracing::info!("call state cleaned up");
            self.emit_state(&inner.state);
        }
    }

    fn release_media(&self, inner: &mut CallInner, session: Option<&dyn CallSession>) {
        for role in inner.bindings.release_all(self.renderer.as_ref()) {
            self.emitter.emit(ParleyEvent::MediaCleared(role));
        }
        if let Some(stream) = session.and_then(|s| s.take_local_stream()) {
            let stopped = stream.stop_all();
            tracing::debug!("session stream {} released ({stopped} tracks stopped)", stream.id());
        }
    }

    /// Surface a startup condition (unsupported platform, SDK missing).
    pub async fn report_startup_error(&self, message: &str) {
        self.set_error(message.to_string()).await;
    }

    pub(crate) async fn on_incoming(&self, session: Arc<dyn CallSession>) {
        let kind = session.kind();
        let held = {
            let mut inner = self.inner.lock().await;
            match inner.session.clone() {
                Some(held) if held.id() == session.id() => return,
                Some(held) => Some(held.id().to_string()),
                None if inner.is_busy() => Some("pending attempt".to_string()),
                None => {
                    tracing::info!("incoming {kind} call {} from {}", session.id(), session.initiator());
                    inner.session = Some(session.clone());
                    inner.routing = None;
                    inner.state = CallUiState {
                        incoming: true,
                        kind: Some(kind),
                        ..CallUiState::idle()
                    };
                    self.emit_state(&inner.state);
                    None
                }
            }
        };

        match held {
            None => self.emitter.emit(ParleyEvent::IncomingCall {
                session_id: session.id().to_string(),
                kind,
                initiator: session.initiator(),
            }),
            Some(busy_with) => {
                tracing::info!("busy with {busy_with}, rejecting incoming call {}", session.id());
                if let Err(e) = session.reject().await {
                    tracing::warn!("error rejecting call {}: {e}", session.id());
                }
            }
        }
    }

    pub(crate) async fn on_accepted(&self, session_id: &str, user_id: UserId) {
        let mut inner = self.inner.lock().await;
        if !Self::holds(&inner, session_id) {
            tracing::debug!("accept for unknown session {session_id} ignored");
            return;
        }
        tracing::info!("call {session_id} accepted by user {user_id}");
        inner.state.in_progress = true;
        inner.state.incoming = false;
        inner.state.error_message.clear();
        self.emit_state(&inner.state);
    }

    /// Stop and reject notifications both end the call.
    pub(crate) async fn on_terminated(&self, session_id: &str) {
        let mut inner = self.inner.lock().await;
        if !Self::holds(&inner, session_id) {
            tracing::debug!("termination of unknown session {session_id} ignored");
            return;
        }
        self.teardown_locked(&mut inner);
    }

    pub(crate) fn on_no_answer(&self, session_id: &str, user_id: UserId) {
        tracing::info!("user {user_id} did not answer call {session_id}");
        self.emitter.emit(ParleyEvent::OpponentNoAnswer {
            session_id: session_id.to_string(),
            user_id,
        });
    }

    pub(crate) async fn on_local_stream(&self, session_id: &str, stream: MediaStream) {
        self.route_stream(session_id, StreamOrigin::Local, stream).await;
    }

    pub(crate) async fn on_remote_stream(&self, session_id: &str, user_id: UserId, stream: MediaStream) {
        tracing::info!("remote stream {} from user {user_id}", stream.id());
        self.route_stream(session_id, StreamOrigin::Remote, stream).await;
    }

    async fn route_stream(&self, session_id: &str, origin: StreamOrigin, stream: MediaStream) {
        let mut inner = self.inner.lock().await;
        if !Self::holds(&inner, session_id) || inner.routing.is_none() {
            let stopped = stream.stop_all();
            tracing::info!(
                "{origin:?} stream {} for inactive session {session_id} stopped ({stopped} tracks)",
                stream.id()
            );
            return;
        }
        self.bind_routed(&mut inner, origin, stream);
    }

    fn holds(inner: &CallInner, session_id: &str) -> bool {
        inner.session.as_ref().is_some_and(|s| s.id() == session_id)
    }

    fn constraints(&self, kind: CallKind) -> MediaConstraints {
        MediaConstraints::for_kind(kind, self.settings.start_muted, self.settings.mirror_local_video)
    }

    fn precondition_failed(&self, err: ParleyError) -> ParleyError {
        tracing::warn!("cannot start call: {err}");
        self.emitter.notice(err.user_message());
        err
    }

    async fn set_error(&self, message: String) {
        let mut inner = self.inner.lock().await;
        if inner.state.error_message != message {
            inner.state.error_message = message;
            self.emit_state(&inner.state);
        }
    }

    fn emit_state(&self, state: &CallUiState) {
        self.emitter.emit(ParleyEvent::CallStateChanged(state.clone()));
    }
}

#[derive(Debug, Clone, Copy)]
enum Termination {
    Stop,
    Reject,
}

impl Termination {
    fn verb(self) -> &'static str {
        match self {
            Termination::Stop => "stop",
            Termination::Reject => "reject",
        }
    }
}

fn permission_required_message(kind: CallKind) -> &'static str {
    match kind {
        CallKind::Audio => "Microphone permission required",
        CallKind::Video => "Camera and microphone permission required",
    }
}

fn permission_notice(kind: CallKind) -> &'static str {
    match kind {
        CallKind::Audio => "Please allow microphone access to make audio calls",
        CallKind::Video => "Please allow camera and microphone access to make video calls",
    }
}
