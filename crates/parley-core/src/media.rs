use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::errors::ParleyError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackKind {
    Audio,
    Video,
}

/// A live capture or playback track owned by the SDK.
///
/// `stop` must tolerate being called on an already stopped track.
pub trait MediaTrack: Send + Sync {
    fn id(&self) -> &str;
    fn kind(&self) -> TrackKind;
    fn is_live(&self) -> bool;
    fn stop(&self);
}

/// A set of tracks delivered together by the SDK.
#[derive(Clone)]
pub struct MediaStream {
    id: String,
    tracks: Vec<Arc<dyn MediaTrack>>,
}

impl MediaStream {
    pub fn new(id: impl Into<String>, tracks: Vec<Arc<dyn MediaTrack>>) -> Self {
        Self {
            id: id.into(),
            tracks,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn tracks(&self) -> &[Arc<dyn MediaTrack>] {
        &self.tracks
    }

    pub fn is_live(&self) -> bool {
        self.tracks.iter().any(|t| t.is_live())
    }

    /// Stop every live track. Returns how many tracks were stopped.
    pub fn stop_all(&self) -> usize {
        let mut stopped = 0;
        for track in &self.tracks {
            if track.is_live() {
                track.stop();
                tracing::debug!(stream = %self.id, track = track.id(), kind = ?track.kind(), "stopped track");
                stopped += 1;
            }
        }
        stopped
    }
}

impl fmt::Debug for MediaStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaStream")
            .field("id", &self.id)
            .field("tracks", &self.tracks.len())
            .finish()
    }
}

/// Display slot a stream can be bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaRole {
    LocalVideo,
    RemoteVideo,
    /// Hidden audio element used for audio-only calls.
    RemoteAudio,
}

impl MediaRole {
    pub const ALL: [MediaRole; 3] = [
        MediaRole::LocalVideo,
        MediaRole::RemoteVideo,
        MediaRole::RemoteAudio,
    ];
}

/// The UI shell's media elements.
///
/// `attach` corresponds to assigning the element's source and starting
/// playback; a playback failure is reported but the binding still stands.
pub trait MediaRenderer: Send + Sync {
    fn attach(&self, role: MediaRole, stream: &MediaStream) -> Result<(), ParleyError>;
    fn detach(&self, role: MediaRole);
}

/// Renderer for headless use: binds nothing visible.
pub struct NullRenderer;

impl MediaRenderer for NullRenderer {
    fn attach(&self, _role: MediaRole, _stream: &MediaStream) -> Result<(), ParleyError> {
        Ok(())
    }

    fn detach(&self, _role: MediaRole) {}
}

/// Streams currently bound to display roles.
#[derive(Debug, Default)]
pub struct MediaBindings {
    slots: HashMap<MediaRole, MediaStream>,
}

impl MediaBindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `stream` to `role`, replacing and stopping any different stream
    /// already there. Rebinding the same stream is a no-op.
    pub fn bind(&mut self, role: MediaRole, stream: MediaStream, renderer: &dyn MediaRenderer) {
        if let Some(existing) = self.slots.get(&role) {
            if existing.id() == stream.id() {
                return;
            }
        }
        if let Some(previous) = self.slots.remove(&role) {
            previous.stop_all();
            renderer.detach(role);
        }
        if let Err(e) = renderer.attach(role, &stream) {
            tracing::warn!("{role:?} playback failed: {e}");
        }
        tracing::debug!("bound stream {} to {role:?}", stream.id());
        self.slots.insert(role, stream);
    }

    pub fn get(&self, role: MediaRole) -> Option<&MediaStream> {
        self.slots.get(&role)
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Stop every bound stream and clear its element. Returns the roles that
    /// were cleared.
    pub fn release_all(&mut self, renderer: &dyn MediaRenderer) -> Vec<MediaRole> {
        let mut cleared = Vec::new();
        for role in MediaRole::ALL {
            if let Some(stream) = self.slots.remove(&role) {
                let stopped = stream.stop_all();
                renderer.detach(role);
                tracing::debug!("cleared {role:?} ({stopped} tracks stopped)");
                cleared.push(role);
            }
        }
        cleared
    }
}
