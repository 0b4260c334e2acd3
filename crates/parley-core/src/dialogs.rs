use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::controller::CallController;
use crate::errors::ParleyError;
use crate::events::{EventEmitter, ParleyEvent};
use crate::sdk::{DialogService, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DialogKind {
    Private,
    Group,
    Public,
}

impl DialogKind {
    /// Group and public dialogs are rooms that must be joined before use.
    pub fn is_room(self) -> bool {
        matches!(self, DialogKind::Group | DialogKind::Public)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dialog {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub kind: DialogKind,
    #[serde(default)]
    pub last_message: Option<String>,
    #[serde(default)]
    pub last_message_at: Option<i64>,
    #[serde(default)]
    pub occupant_ids: Vec<UserId>,
}

impl Dialog {
    /// Occupants a call from `self_id` would ring, in occupant order.
    pub fn opponents(&self, self_id: UserId) -> Vec<UserId> {
        self.occupant_ids
            .iter()
            .copied()
            .filter(|&id| id != 0 && id != self_id)
            .collect()
    }

    pub fn display_name(&self) -> &str {
        match self.name.as_deref() {
            Some(name) if !name.is_empty() => name,
            _ => "Untitled",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Server id; `None` until the backend has stored the message.
    #[serde(default)]
    pub id: Option<String>,
    /// Client id of an optimistically appended message.
    #[serde(default)]
    pub local_id: Option<String>,
    pub text: String,
    /// Unix seconds.
    pub sent_at: i64,
    #[serde(default)]
    pub sender_id: Option<UserId>,
    #[serde(default)]
    pub dialog_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserItem {
    pub id: UserId,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub login: Option<String>,
}

impl UserItem {
    pub fn display_name(&self) -> String {
        self.full_name
            .clone()
            .filter(|n| !n.is_empty())
            .or_else(|| self.login.clone().filter(|l| !l.is_empty()))
            .unwrap_or_else(|| format!("User {}", self.id))
    }
}

/// Messages of the active dialog, oldest first.
type MessageStore = Arc<Mutex<Vec<ChatMessage>>>;

/// Dialog list, active dialog and its messages.
///
/// Selecting another dialog ends any call before the new dialog's
/// messages are loaded.
#[derive(Clone)]
pub struct DialogWorkspace {
    service: Arc<dyn DialogService>,
    calls: CallController,
    emitter: EventEmitter,
    self_id: UserId,
    dialogs: Arc<Mutex<Vec<Dialog>>>,
    active: Arc<Mutex<Option<String>>>,
    messages: MessageStore,
}

impl DialogWorkspace {
    pub fn new(
        service: Arc<dyn DialogService>,
        calls: CallController,
        emitter: EventEmitter,
        self_id: UserId,
    ) -> Self {
        Self {
            service,
            calls,
            emitter,
            self_id,
            dialogs: Arc::new(Mutex::new(Vec::new())),
            active: Arc::new(Mutex::new(None)),
            messages: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub async fn refresh_dialogs(&self) -> Result<usize, ParleyError> {
        let dialogs = self.service.list_dialogs().await?;
        let count = dialogs.len();
        *self.dialogs.lock().await = dialogs;
        tracing::info!("dialogs loaded: {count}");
        self.emitter.emit(ParleyEvent::DialogsUpdated(count));
        Ok(count)
    }

    pub async fn dialogs(&self) -> Vec<Dialog> {
        self.dialogs.lock().await.clone()
    }

    pub async fn active_dialog(&self) -> Option<Dialog> {
        let active = self.active.lock().await.clone()?;
        self.dialogs.lock().await.iter().find(|d| d.id == active).cloned()
    }

    pub async fn messages(&self) -> Vec<ChatMessage> {
        self.messages.lock().await.clone()
    }

    /// Make `dialog_id` the active dialog and load its messages.
    pub async fn select_dialog(&self, dialog_id: &str) -> Result<(), ParleyError> {
        let dialog = self
            .dialogs
            .lock()
            .await
            .iter()
            .find(|d| d.id == dialog_id)
            .cloned()
            .ok_or_else(|| ParleyError::UnknownDialog(dialog_id.to_string()))?;

        if self.active.lock().await.as_deref() == Some(dialog_id) {
            return Ok(());
        }

        // A call belongs to the dialog it was started from.
        self.calls.handle_dialog_switch().await;

        *self.active.lock().await = Some(dialog.id.clone());
        self.messages.lock().await.clear();
        self.emitter.emit(ParleyEvent::ActiveDialogChanged(dialog.id.clone()));

        if dialog.kind.is_room() {
            if let Err(e) = self.service.join_if_needed(&dialog).await {
                tracing::warn!("join {} failed: {e}", dialog.id);
            }
        }

        let mut loaded = self.service.list_messages(&dialog.id).await?;
        loaded.reverse();

        if self.active.lock().await.as_deref() != Some(dialog.id.as_str()) {
            tracing::debug!("dialog {} deselected while loading messages", dialog.id);
            return Ok(());
        }
        let count = loaded.len();
        *self.messages.lock().await = loaded;
        self.emitter.emit(ParleyEvent::MessagesLoaded {
            dialog_id: dialog.id,
            count,
        });
        Ok(())
    }

    /// Append optimistically, then send. A failed send is logged and the
    /// optimistic message stays in place.
    pub async fn send_message(&self, text: &str) -> Result<Option<ChatMessage>, ParleyError> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(None);
        }
        let Some(dialog_id) = self.active.lock().await.clone() else {
            return Ok(None);
        };

        let msg = ChatMessage {
            id: None,
            local_id: Some(uuid::Uuid::new_v4().to_string()),
            text: text.to_string(),
            sent_at: chrono::Utc::now().timestamp(),
            sender_id: Some(self.self_id),
            dialog_id: Some(dialog_id.clone()),
        };
        self.messages.lock().await.push(msg.clone());
        self.emitter.emit(ParleyEvent::ChatMessageReceived(msg.clone()));

        if let Err(e) = self.service.send_message(&dialog_id, text).await {
            tracing::warn!("failed to send message to {dialog_id}: {e}");
        }
        Ok(Some(msg))
    }

    /// Handle a message from the global listener. Messages of other dialogs
    /// are dropped.
    pub async fn handle_incoming(&self, msg: ChatMessage) {
        let active = self.active.lock().await.clone();
        if active.is_none() || msg.dialog_id != active {
            return;
        }
        self.messages.lock().await.push(msg.clone());
        self.emitter.emit(ParleyEvent::ChatMessageReceived(msg));
    }

    /// Start the incoming-message listener loop.
    pub fn listen(&self) -> Result<JoinHandle<()>, ParleyError> {
        let mut incoming = self.service.subscribe_messages()?;
        let workspace = self.clone();
        Ok(tokio::spawn(async move {
            while let Some(msg) = incoming.recv().await {
                workspace.handle_incoming(msg).await;
            }
            tracing::debug!("message listener closed");
        }))
    }

    pub async fn search_users(&self, query: &str) -> Result<Vec<UserItem>, ParleyError> {
        let query = query.trim();
        let query = if query.is_empty() { None } else { Some(query) };
        self.service.search_users(query).await
    }

    pub async fn create_private_dialog(&self, opponent: UserId) -> Result<Dialog, ParleyError> {
        if opponent == 0 || opponent == self.self_id {
            return Err(ParleyError::InvalidInput(format!("cannot open a dialog with user {opponent}")));
        }
        let dialog = self.service.create_private_dialog(opponent).await?;
        self.adopt_created(dialog).await
    }

    pub async fn create_group_dialog(
        &self,
        name: &str,
        occupants: &[UserId],
    ) -> Result<Dialog, ParleyError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ParleyError::InvalidInput("group name is required".into()));
        }
        let occupants: Vec<UserId> = occupants
            .iter()
            .copied()
            .filter(|&id| id != 0 && id != self.self_id)
            .collect();
        if occupants.is_empty() {
            return Err(ParleyError::InvalidInput("select at least one participant".into()));
        }
        let dialog = self.service.create_group_dialog(name, &occupants).await?;
        self.adopt_created(dialog).await
    }

    pub async fn start_audio_call(&self) -> Result<(), ParleyError> {
        let dialog = self.active_dialog().await;
        self.calls.start_audio_call(dialog.as_ref()).await
    }

    pub async fn start_video_call(&self) -> Result<(), ParleyError> {
        let dialog = self.active_dialog().await;
        self.calls.start_video_call(dialog.as_ref()).await
    }

    async fn adopt_created(&self, dialog: Dialog) -> Result<Dialog, ParleyError> {
        let count = {
            let mut dialogs = self.dialogs.lock().await;
            dialogs.retain(|d| d.id != dialog.id);
            dialogs.insert(0, dialog.clone());
            dialogs.len()
        };
        self.emitter.emit(ParleyEvent::DialogsUpdated(count));
        self.select_dialog(&dialog.id).await?;
        Ok(dialog)
    }
}
