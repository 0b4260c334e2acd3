//! In-memory SDK doubles shared by the unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::controller::CallController;
use crate::dialogs::{ChatMessage, Dialog, DialogKind, UserItem};
use crate::errors::{MediaFailure, ParleyError};
use crate::events::{EventEmitter, ParleyEvent, ParleyEventListener};
use crate::media::{MediaRenderer, MediaRole, MediaStream, MediaTrack, TrackKind};
use crate::sdk::{
    CallSession, DialogService, MediaConstraints, MediaDevices, SignalingEvent, SignalingService,
    UserId,
};
use crate::settings::Settings;
use crate::state::{CallKind, CallUiState};

/// Ordered record of SDK calls across all fakes of one harness.
#[derive(Clone, Default)]
pub struct OpLog(Arc<Mutex<Vec<String>>>);

impl OpLog {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn position(&self, entry: &str) -> Option<usize> {
        self.entries().iter().position(|e| e == entry)
    }

    pub fn contains(&self, entry: &str) -> bool {
        self.position(entry).is_some()
    }
}

pub struct FakeTrack {
    id: String,
    kind: TrackKind,
    live: AtomicBool,
    stops: AtomicUsize,
}

impl FakeTrack {
    fn new(id: &str, kind: TrackKind) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            kind,
            live: AtomicBool::new(true),
            stops: AtomicUsize::new(0),
        })
    }

    pub fn audio(id: &str) -> Arc<Self> {
        Self::new(id, TrackKind::Audio)
    }

    pub fn video(id: &str) -> Arc<Self> {
        Self::new(id, TrackKind::Video)
    }

    pub fn stop_count(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

impl MediaTrack for FakeTrack {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> TrackKind {
        self.kind
    }

    fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
        self.live.store(false, Ordering::SeqCst);
    }
}

/// A stream with an audio track and, if `video`, a video track.
pub fn stream_of(id: &str, video: bool) -> (MediaStream, Vec<Arc<FakeTrack>>) {
    let mut tracks = vec![FakeTrack::audio(&format!("{id}-audio"))];
    if video {
        tracks.push(FakeTrack::video(&format!("{id}-video")));
    }
    let dyn_tracks = tracks
        .iter()
        .map(|t| t.clone() as Arc<dyn MediaTrack>)
        .collect();
    (MediaStream::new(id, dyn_tracks), tracks)
}

#[derive(Default)]
pub struct RecordingRenderer {
    attached: Mutex<HashMap<MediaRole, String>>,
    fail_playback: bool,
}

impl RecordingRenderer {
    pub fn failing() -> Self {
        Self {
            fail_playback: true,
            ..Self::default()
        }
    }

    pub fn attached(&self, role: MediaRole) -> Option<String> {
        self.attached.lock().unwrap().get(&role).cloned()
    }
}

impl MediaRenderer for RecordingRenderer {
    fn attach(&self, role: MediaRole, stream: &MediaStream) -> Result<(), ParleyError> {
        self.attached
            .lock()
            .unwrap()
            .insert(role, stream.id().to_string());
        if self.fail_playback {
            return Err(ParleyError::Media("autoplay blocked".into()));
        }
        Ok(())
    }

    fn detach(&self, role: MediaRole) {
        self.attached.lock().unwrap().remove(&role);
    }
}

pub struct FakeSession {
    id: String,
    kind: CallKind,
    initiator: UserId,
    log: OpLog,
    local: Mutex<Option<MediaStream>>,
    tracks: Mutex<Vec<Arc<FakeTrack>>>,
    acquire_failure: Mutex<Option<MediaFailure>>,
    call_failure: Mutex<Option<ParleyError>>,
    accept_failure: Mutex<Option<ParleyError>>,
    stop_failure: Mutex<Option<ParleyError>>,
    reject_failure: Mutex<Option<ParleyError>>,
    release: Mutex<Option<Arc<Notify>>>,
    pub entered: Arc<Notify>,
}

impl FakeSession {
    pub fn new(id: &str, kind: CallKind, initiator: UserId, log: OpLog) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            kind,
            initiator,
            log,
            local: Mutex::new(None),
            tracks: Mutex::new(Vec::new()),
            acquire_failure: Mutex::new(None),
            call_failure: Mutex::new(None),
            accept_failure: Mutex::new(None),
            stop_failure: Mutex::new(None),
            reject_failure: Mutex::new(None),
            release: Mutex::new(None),
            entered: Arc::new(Notify::new()),
        })
    }

    pub fn fail_acquire(&self, failure: MediaFailure) {
        *self.acquire_failure.lock().unwrap() = Some(failure);
    }

    pub fn fail_call(&self, err: ParleyError) {
        *self.call_failure.lock().unwrap() = Some(err);
    }

    pub fn fail_accept(&self, err: ParleyError) {
        *self.accept_failure.lock().unwrap() = Some(err);
    }

    pub fn fail_stop(&self, err: ParleyError) {
        *self.stop_failure.lock().unwrap() = Some(err);
    }

    pub fn fail_reject(&self, err: ParleyError) {
        *self.reject_failure.lock().unwrap() = Some(err);
    }

    /// Make `acquire_media` wait until the returned gate is notified.
    pub fn hold_acquire(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.release.lock().unwrap() = Some(gate.clone());
        gate
    }

    /// Every track this session has handed out.
    pub fn local_tracks(&self) -> Vec<Arc<FakeTrack>> {
        self.tracks.lock().unwrap().clone()
    }

    pub fn holds_local_stream(&self) -> bool {
        self.local.lock().unwrap().is_some()
    }

    fn record(&self, op: &str) -> Option<ParleyError> {
        self.log.push(format!("{op}:{}", self.id));
        let slot = match op {
            "call" => &self.call_failure,
            "accept" => &self.accept_failure,
            "stop" => &self.stop_failure,
            "reject" => &self.reject_failure,
            _ => return None,
        };
        slot.lock().unwrap().clone()
    }
}

#[async_trait]
impl CallSession for FakeSession {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> CallKind {
        self.kind
    }

    fn initiator(&self) -> UserId {
        self.initiator
    }

    async fn acquire_media(&self, constraints: MediaConstraints) -> Result<MediaStream, MediaFailure> {
        self.log.push(format!("acquire:{}", self.id));
        self.entered.notify_one();
        let gate = self.release.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if let Some(failure) = self.acquire_failure.lock().unwrap().clone() {
            return Err(failure);
        }
        let (stream, tracks) = stream_of(&format!("{}-local", self.id), constraints.video);
        self.tracks.lock().unwrap().extend(tracks);
        *self.local.lock().unwrap() = Some(stream.clone());
        Ok(stream)
    }

    async fn call(&self, _constraints: MediaConstraints) -> Result<(), ParleyError> {
        self.record("call").map_or(Ok(()), Err)
    }

    async fn accept(&self, _constraints: MediaConstraints) -> Result<(), ParleyError> {
        self.record("accept").map_or(Ok(()), Err)
    }

    async fn stop(&self) -> Result<(), ParleyError> {
        self.record("stop").map_or(Ok(()), Err)
    }

    async fn reject(&self) -> Result<(), ParleyError> {
        self.record("reject").map_or(Ok(()), Err)
    }

    fn take_local_stream(&self) -> Option<MediaStream> {
        self.local.lock().unwrap().take()
    }
}

pub struct FakeSignaling {
    log: OpLog,
    sender: Mutex<Option<UnboundedSender<SignalingEvent>>>,
    subscriptions: AtomicUsize,
    unavailable: AtomicBool,
    queued: Mutex<VecDeque<Arc<FakeSession>>>,
    created: Mutex<Vec<Arc<FakeSession>>>,
    create_failure: Mutex<Option<ParleyError>>,
}

impl FakeSignaling {
    pub fn new(log: OpLog) -> Arc<Self> {
        Arc::new(Self {
            log,
            sender: Mutex::new(None),
            subscriptions: AtomicUsize::new(0),
            unavailable: AtomicBool::new(false),
            queued: Mutex::new(VecDeque::new()),
            created: Mutex::new(Vec::new()),
            create_failure: Mutex::new(None),
        })
    }

    pub fn make_unavailable(&self) {
        self.unavailable.store(true, Ordering::SeqCst);
    }

    pub fn subscriptions(&self) -> usize {
        self.subscriptions.load(Ordering::SeqCst)
    }

    pub fn deliver(&self, event: SignalingEvent) {
        if let Some(sender) = self.sender.lock().unwrap().as_ref() {
            let _ = sender.send(event);
        }
    }

    /// Session returned by the next `create_session`.
    pub fn push_session(&self, session: Arc<FakeSession>) {
        self.queued.lock().unwrap().push_back(session);
    }

    pub fn fail_create(&self, err: ParleyError) {
        *self.create_failure.lock().unwrap() = Some(err);
    }

    pub fn created(&self) -> Vec<Arc<FakeSession>> {
        self.created.lock().unwrap().clone()
    }
}

#[async_trait]
impl SignalingService for FakeSignaling {
    fn subscribe(&self) -> Result<UnboundedReceiver<SignalingEvent>, ParleyError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(ParleyError::SdkUnavailable("call module is not initialized".into()));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        *self.sender.lock().unwrap() = Some(tx);
        self.subscriptions.fetch_add(1, Ordering::SeqCst);
        Ok(rx)
    }

    async fn create_session(
        &self,
        opponents: &[UserId],
        kind: CallKind,
    ) -> Result<Arc<dyn CallSession>, ParleyError> {
        self.log.push(format!("create:{opponents:?}:{kind}"));
        if let Some(err) = self.create_failure.lock().unwrap().clone() {
            return Err(err);
        }
        let queued = self.queued.lock().unwrap().pop_front();
        let session = queued.unwrap_or_else(|| {
            let n = self.created.lock().unwrap().len() + 1;
            FakeSession::new(&format!("out-{n}"), kind, 1, self.log.clone())
        });
        self.created.lock().unwrap().push(session.clone());
        Ok(session as Arc<dyn CallSession>)
    }
}

pub struct FakeDevices {
    log: OpLog,
    supported: AtomicBool,
    denial: Mutex<Option<MediaFailure>>,
    release: Mutex<Option<Arc<Notify>>>,
    /// Notified when `request_permission` starts.
    pub entered: Arc<Notify>,
}

impl FakeDevices {
    pub fn new(log: OpLog) -> Arc<Self> {
        Arc::new(Self {
            log,
            supported: AtomicBool::new(true),
            denial: Mutex::new(None),
            release: Mutex::new(None),
            entered: Arc::new(Notify::new()),
        })
    }

    pub fn set_supported(&self, supported: bool) {
        self.supported.store(supported, Ordering::SeqCst);
    }

    pub fn deny(&self, failure: MediaFailure) {
        *self.denial.lock().unwrap() = Some(failure);
    }

    /// Make `request_permission` wait until the returned gate is notified.
    pub fn hold_permission(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.release.lock().unwrap() = Some(gate.clone());
        gate
    }
}

#[async_trait]
impl MediaDevices for FakeDevices {
    fn is_webrtc_supported(&self) -> bool {
        self.supported.load(Ordering::SeqCst)
    }

    async fn request_permission(&self, kind: CallKind) -> Result<(), MediaFailure> {
        self.log.push(format!("permission:{kind}"));
        self.entered.notify_one();
        let gate = self.release.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        match self.denial.lock().unwrap().clone() {
            Some(failure) => Err(failure),
            None => Ok(()),
        }
    }
}

pub struct FakeDialogService {
    log: OpLog,
    dialogs: Mutex<Vec<Dialog>>,
    messages: Mutex<HashMap<String, Vec<ChatMessage>>>,
    sent: Mutex<Vec<(String, String)>>,
    joined: Mutex<Vec<String>>,
    searches: Mutex<Vec<Option<String>>>,
    fail_sends: AtomicBool,
    fail_list: AtomicBool,
    incoming: Mutex<Option<UnboundedSender<ChatMessage>>>,
}

impl FakeDialogService {
    pub fn new(dialogs: Vec<Dialog>) -> Arc<Self> {
        Self::with_log(dialogs, OpLog::default())
    }

    pub fn with_log(dialogs: Vec<Dialog>, log: OpLog) -> Arc<Self> {
        Arc::new(Self {
            log,
            dialogs: Mutex::new(dialogs),
            messages: Mutex::new(HashMap::new()),
            sent: Mutex::new(Vec::new()),
            joined: Mutex::new(Vec::new()),
            searches: Mutex::new(Vec::new()),
            fail_sends: AtomicBool::new(false),
            fail_list: AtomicBool::new(false),
            incoming: Mutex::new(None),
        })
    }

    /// Messages for `dialog_id`, newest first as the backend returns them.
    pub fn set_messages(&self, dialog_id: &str, messages: Vec<ChatMessage>) {
        self.messages
            .lock()
            .unwrap()
            .insert(dialog_id.to_string(), messages);
    }

    pub fn fail_sends(&self) {
        self.fail_sends.store(true, Ordering::SeqCst);
    }

    pub fn fail_listing(&self) {
        self.fail_list.store(true, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn joined(&self) -> Vec<String> {
        self.joined.lock().unwrap().clone()
    }

    pub fn searches(&self) -> Vec<Option<String>> {
        self.searches.lock().unwrap().clone()
    }

    pub fn push_incoming(&self, msg: ChatMessage) {
        if let Some(sender) = self.incoming.lock().unwrap().as_ref() {
            let _ = sender.send(msg);
        }
    }

    pub fn close_incoming(&self) {
        self.incoming.lock().unwrap().take();
    }
}

#[async_trait]
impl DialogService for FakeDialogService {
    async fn list_dialogs(&self) -> Result<Vec<Dialog>, ParleyError> {
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(ParleyError::Dialog("chat is not connected".into()));
        }
        Ok(self.dialogs.lock().unwrap().clone())
    }

    async fn list_messages(&self, dialog_id: &str) -> Result<Vec<ChatMessage>, ParleyError> {
        self.log.push(format!("list_messages:{dialog_id}"));
        Ok(self
            .messages
            .lock()
            .unwrap()
            .get(dialog_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn send_message(&self, dialog_id: &str, text: &str) -> Result<(), ParleyError> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(ParleyError::Dialog("send failed".into()));
        }
        self.sent
            .lock()
            .unwrap()
            .push((dialog_id.to_string(), text.to_string()));
        Ok(())
    }

    async fn join_if_needed(&self, dialog: &Dialog) -> Result<(), ParleyError> {
        self.joined.lock().unwrap().push(dialog.id.clone());
        Ok(())
    }

    fn subscribe_messages(&self) -> Result<UnboundedReceiver<ChatMessage>, ParleyError> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.incoming.lock().unwrap() = Some(tx);
        Ok(rx)
    }

    async fn search_users(&self, query: Option<&str>) -> Result<Vec<UserItem>, ParleyError> {
        self.searches.lock().unwrap().push(query.map(str::to_string));
        Ok(Vec::new())
    }

    async fn create_private_dialog(&self, opponent: UserId) -> Result<Dialog, ParleyError> {
        Ok(dialog(&format!("p{opponent}"), DialogKind::Private, &[opponent]))
    }

    async fn create_group_dialog(
        &self,
        name: &str,
        occupants: &[UserId],
    ) -> Result<Dialog, ParleyError> {
        let mut created = dialog(&format!("g-{name}"), DialogKind::Group, occupants);
        created.name = Some(name.to_string());
        Ok(created)
    }
}

#[derive(Default)]
pub struct EventLog {
    events: Mutex<Vec<ParleyEvent>>,
}

impl EventLog {
    pub fn notices(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                ParleyEvent::Notice(text) => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn states(&self) -> Vec<CallUiState> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                ParleyEvent::CallStateChanged(state) => Some(state.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn all(&self) -> Vec<ParleyEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl ParleyEventListener for EventLog {
    fn on_event(&self, event: ParleyEvent) {
        self.events.lock().unwrap().push(event);
    }
}

pub struct Harness {
    pub controller: CallController,
    pub signaling: Arc<FakeSignaling>,
    pub devices: Arc<FakeDevices>,
    pub renderer: Arc<RecordingRenderer>,
    pub emitter: EventEmitter,
    pub events: Arc<EventLog>,
    pub log: OpLog,
}

pub fn test_settings() -> Settings {
    Settings {
        permission_settle_ms: 0,
        ..Settings::default()
    }
}

pub fn harness(self_id: UserId) -> Harness {
    let log = OpLog::default();
    let signaling = FakeSignaling::new(log.clone());
    let devices = FakeDevices::new(log.clone());
    let renderer = Arc::new(RecordingRenderer::default());
    let emitter = EventEmitter::new();
    let events = Arc::new(EventLog::default());
    emitter.add_listener(events.clone());
    let controller = CallController::new(
        signaling.clone(),
        devices.clone(),
        renderer.clone(),
        emitter.clone(),
        test_settings(),
        self_id,
    );
    Harness {
        controller,
        signaling,
        devices,
        renderer,
        emitter,
        events,
        log,
    }
}

pub fn dialog(id: &str, kind: DialogKind, occupants: &[UserId]) -> Dialog {
    Dialog {
        id: id.to_string(),
        name: None,
        kind,
        last_message: None,
        last_message_at: None,
        occupant_ids: occupants.to_vec(),
    }
}

pub fn chat_message(dialog_id: &str, text: &str, sent_at: i64) -> ChatMessage {
    ChatMessage {
        id: Some(format!("{dialog_id}-{sent_at}")),
        local_id: None,
        text: text.to_string(),
        sent_at,
        sender_id: Some(2),
        dialog_id: Some(dialog_id.to_string()),
    }
}

/// Let spawned tasks drain their channels.
pub async fn settle() {
    for _ in 0..50 {
        tokio::task::yield_now().await;
    }
}
