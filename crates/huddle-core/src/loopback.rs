//! In-memory engine and device platform.
//!
//! Records every command it receives and lets the host inject engine
//! callbacks. The host CLI replays event scripts through it; tests use it to
//! drive a full [`Session`](crate::session::Session).

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use uuid::Uuid;

use crate::engine::{
    ChannelProfile, ClientRole, DeviceKind, DevicePlatform, EngineConfig, EngineEventHandler,
    HandlerId, JoinOptions, MediaDevice, MediaTrack, RtcEngine,
};
use crate::events::{EngineEvent, MediaKind, UNSET_UID, Uid};
use crate::key::EncryptionConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCommand {
    Initialize(EngineConfig),
    EnableVideo,
    StartPreview,
    SetChannelProfile(ChannelProfile),
    SetClientRole(ClientRole),
    CreateTrack { kind: MediaKind, device_id: String },
    EnableEncryption { enabled: bool, config: EncryptionConfig },
    JoinChannel { token: String, channel_id: String, uid_hint: Uid },
    LeaveChannel,
    Publish { track_ids: Vec<Uuid> },
    Subscribe { uid: Uid, kind: MediaKind },
}

#[derive(Debug, Default)]
struct TrackFlags {
    stopped: AtomicBool,
    closed: AtomicBool,
}

/// Track handle fabricated by the loopback engine. Clones share state.
#[derive(Debug, Clone)]
pub struct LoopbackTrack {
    id: Uuid,
    owner: Uid,
    kind: MediaKind,
    flags: Arc<TrackFlags>,
}

impl LoopbackTrack {
    fn new(owner: Uid, kind: MediaKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner,
            kind,
            flags: Arc::default(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Uid of the participant the track belongs to; unset for local tracks.
    pub fn owner(&self) -> Uid {
        self.owner
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    pub fn is_stopped(&self) -> bool {
        self.flags.stopped.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.flags.closed.load(Ordering::SeqCst)
    }
}

impl PartialEq for LoopbackTrack {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for LoopbackTrack {}

impl MediaTrack for LoopbackTrack {
    fn stop(&self) {
        self.flags.stopped.store(true, Ordering::SeqCst);
    }

    fn close(&self) {
        self.flags.closed.store(true, Ordering::SeqCst);
    }
}

pub struct LoopbackEngine {
    local_uid: Uid,
    join_code: i32,
    encryption_code: i32,
    publish_code: i32,
    init_failure: Option<String>,
    subscribe_failure: Option<String>,
    commands: Mutex<Vec<EngineCommand>>,
    handlers: Mutex<Vec<(HandlerId, Arc<dyn EngineEventHandler>)>>,
    next_handler: AtomicU64,
}

impl LoopbackEngine {
    /// An engine that accepts everything and never calls back on its own.
    pub fn new() -> Self {
        Self {
            local_uid: UNSET_UID,
            join_code: 0,
            encryption_code: 0,
            publish_code: 0,
            init_failure: None,
            subscribe_failure: None,
            commands: Mutex::new(Vec::new()),
            handlers: Mutex::new(Vec::new()),
            next_handler: AtomicU64::new(1),
        }
    }

    /// Confirm joins with `uid` and leaves with a leave callback, the way a
    /// live engine would.
    pub fn with_local_uid(mut self, uid: Uid) -> Self {
        self.local_uid = uid;
        self
    }

    pub fn with_join_code(mut self, code: i32) -> Self {
        self.join_code = code;
        self
    }

    pub fn with_encryption_code(mut self, code: i32) -> Self {
        self.encryption_code = code;
        self
    }

    pub fn with_publish_code(mut self, code: i32) -> Self {
        self.publish_code = code;
        self
    }

    pub fn with_init_failure(mut self, reason: impl Into<String>) -> Self {
        self.init_failure = Some(reason.into());
        self
    }

    pub fn with_subscribe_failure(mut self, reason: impl Into<String>) -> Self {
        self.subscribe_failure = Some(reason.into());
        self
    }

    /// Deliver a callback to every registered handler.
    pub fn emit(&self, event: EngineEvent) {
        let handlers: Vec<_> = self
            .handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, h)| h.clone())
            .collect();
        for handler in handlers {
            handler.on_engine_event(event.clone());
        }
    }

    pub fn commands(&self) -> Vec<EngineCommand> {
        self.commands.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn record(&self, command: EngineCommand) {
        self.commands
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(command);
    }

    fn confirms(&self) -> bool {
        self.local_uid != UNSET_UID
    }
}

impl Default for LoopbackEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl RtcEngine for LoopbackEngine {
    type Track = LoopbackTrack;

    async fn initialize(&self, config: &EngineConfig) -> Result<(), String> {
        self.record(EngineCommand::Initialize(config.clone()));
        match &self.init_failure {
            Some(reason) => Err(reason.clone()),
            None => Ok(()),
        }
    }

    fn add_handler(&self, handler: Arc<dyn EngineEventHandler>) -> HandlerId {
        let id = HandlerId(self.next_handler.fetch_add(1, Ordering::Relaxed));
        self.handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, handler));
        id
    }

    fn remove_handler(&self, id: HandlerId) {
        self.handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|(h, _)| *h != id);
    }

    fn enable_video(&self) -> i32 {
        self.record(EngineCommand::EnableVideo);
        0
    }

    fn start_preview(&self) -> i32 {
        self.record(EngineCommand::StartPreview);
        0
    }

    fn set_channel_profile(&self, profile: ChannelProfile) -> i32 {
        self.record(EngineCommand::SetChannelProfile(profile));
        0
    }

    fn set_client_role(&self, role: ClientRole) -> i32 {
        self.record(EngineCommand::SetClientRole(role));
        0
    }

    async fn create_microphone_track(&self, device_id: &str) -> Result<LoopbackTrack, String> {
        self.record(EngineCommand::CreateTrack {
            kind: MediaKind::Audio,
            device_id: device_id.to_string(),
        });
        Ok(LoopbackTrack::new(UNSET_UID, MediaKind::Audio))
    }

    async fn create_camera_track(&self, device_id: &str) -> Result<LoopbackTrack, String> {
        self.record(EngineCommand::CreateTrack {
            kind: MediaKind::Video,
            device_id: device_id.to_string(),
        });
        Ok(LoopbackTrack::new(UNSET_UID, MediaKind::Video))
    }

    fn enable_encryption(&self, enabled: bool, config: &EncryptionConfig) -> i32 {
        self.record(EngineCommand::EnableEncryption {
            enabled,
            config: config.clone(),
        });
        self.encryption_code
    }

    fn join_channel(&self, token: &str, channel_id: &str, uid_hint: Uid, _options: &JoinOptions) -> i32 {
        self.record(EngineCommand::JoinChannel {
            token: token.to_string(),
            channel_id: channel_id.to_string(),
            uid_hint,
        });
        if self.join_code >= 0 && self.confirms() {
            self.emit(EngineEvent::JoinChannelSuccess { local_uid: self.local_uid });
        }
        self.join_code
    }

    fn leave_channel(&self) -> i32 {
        self.record(EngineCommand::LeaveChannel);
        if self.confirms() {
            self.emit(EngineEvent::LeaveChannel);
        }
        0
    }

    fn publish(&self, tracks: &[LoopbackTrack]) -> i32 {
        self.record(EngineCommand::Publish {
            track_ids: tracks.iter().map(LoopbackTrack::id).collect(),
        });
        self.publish_code
    }

    async fn subscribe(&self, uid: Uid, kind: MediaKind) -> Result<LoopbackTrack, String> {
        self.record(EngineCommand::Subscribe { uid, kind });
        match &self.subscribe_failure {
            Some(reason) => Err(reason.clone()),
            None => Ok(LoopbackTrack::new(uid, kind)),
        }
    }
}

/// Device platform with a configurable device list.
pub struct LoopbackPlatform {
    devices: Vec<MediaDevice>,
    denial: Option<String>,
}

impl LoopbackPlatform {
    /// One microphone and one camera, permissions granted.
    pub fn new() -> Self {
        Self {
            devices: vec![
                MediaDevice {
                    device_id: "mic-0".to_string(),
                    kind: DeviceKind::AudioInput,
                    label: "Loopback microphone".to_string(),
                },
                MediaDevice {
                    device_id: "cam-0".to_string(),
                    kind: DeviceKind::VideoInput,
                    label: "Loopback camera".to_string(),
                },
            ],
            denial: None,
        }
    }

    pub fn without(mut self, kind: DeviceKind) -> Self {
        self.devices.retain(|d| d.kind != kind);
        self
    }

    pub fn denying(mut self, reason: impl Into<String>) -> Self {
        self.denial = Some(reason.into());
        self
    }
}

impl Default for LoopbackPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl DevicePlatform for LoopbackPlatform {
    async fn request_permissions(&self) -> Result<(), String> {
        match &self.denial {
            Some(reason) => Err(reason.clone()),
            None => Ok(()),
        }
    }

    async fn devices(&self) -> Result<Vec<MediaDevice>, String> {
        Ok(self.devices.clone())
    }
}
