use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, Weak};

use serde::{Deserialize, Serialize};

/// Engine-assigned participant identifier.
pub type Uid = u32;

/// Reserved uid meaning "no participant yet", also used for the local user.
pub const UNSET_UID: Uid = 0;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Audio,
    Video,
}

/// Remote stream state as reported by the engine.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RemoteMediaState {
    Stopped,
    Starting,
    Decoding,
    Frozen,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Initializing,
    Ready,
}

/// A remote party in the call.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Participant {
    pub id: Uid,
    pub has_audio: bool,
    pub has_video: bool,
}

impl Participant {
    /// Media is assumed live until the engine says otherwise.
    pub fn joined(id: Uid) -> Self {
        Self { id, has_audio: true, has_video: true }
    }
}

/// Callbacks delivered by the engine.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    Error { code: i32 },
    JoinChannelSuccess { local_uid: Uid },
    UserJoined { uid: Uid },
    UserOffline { uid: Uid },
    RemoteAudioStateChanged { uid: Uid, state: RemoteMediaState },
    RemoteVideoStateChanged { uid: Uid, state: RemoteMediaState },
    UserPublished { uid: Uid, kind: MediaKind },
    UserUnpublished { uid: Uid, kind: MediaKind },
    LeaveChannel,
}

/// Notifications pushed to UI listeners after the session state changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    StatusChanged(SessionStatus),
    Joined { local_uid: Uid },
    Left,
    ParticipantJoined(Participant),
    ParticipantLeft(Uid),
    ParticipantUpdated(Participant),
    TrackPublished { uid: Uid, kind: MediaKind },
    TrackUnpublished { uid: Uid, kind: MediaKind },
    EngineError { code: i32 },
}

/// Trait for receiving session notifications.
/// Implementations must be Send + Sync (engines may call back from their own threads).
pub trait SessionEventListener: Send + Sync {
    fn on_event(&self, event: SessionEvent);
}

type ListenerTable = RwLock<Vec<(u64, Arc<dyn SessionEventListener>)>>;

/// Dispatches session notifications to registered listeners.
#[derive(Clone)]
pub struct EventEmitter {
    listeners: Arc<ListenerTable>,
    next_id: Arc<AtomicU64>,
}

impl EventEmitter {
    pub fn new() -> Self {
        Self {
            listeners: Arc::new(RwLock::new(Vec::new())),
            next_id: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Register a listener. It stays registered until the handle is dropped.
    #[must_use = "dropping the handle unregisters the listener"]
    pub fn add_listener(&self, listener: Arc<dyn SessionEventListener>) -> ListenerHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, listener));
        ListenerHandle {
            id,
            listeners: Arc::downgrade(&self.listeners),
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn emit(&self, event: SessionEvent) {
        // Snapshot so a listener may register or drop handles while being called.
        let listeners: Vec<_> = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, l)| l.clone())
            .collect();
        for listener in listeners {
            listener.on_event(event.clone());
        }
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new()
    }
}

/// Registration guard returned by [`EventEmitter::add_listener`].
pub struct ListenerHandle {
    id: u64,
    listeners: Weak<ListenerTable>,
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        if let Some(listeners) = self.listeners.upgrade() {
            listeners
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .retain(|(id, _)| *id != self.id);
        }
    }
}
