//! Seam to the real-time communication engine and the device platform.
//!
//! The engine owns signaling, transport and media; this crate only issues
//! commands and folds the callbacks it delivers.

use std::future::Future;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::events::{EngineEvent, MediaKind, Uid};
use crate::key::EncryptionConfig;

/// Engine-side media track handle (local capture or remote subscription).
pub trait MediaTrack: Clone + Send + Sync + 'static {
    /// Stop playback or capture.
    fn stop(&self);
    /// Release the underlying device. Only meaningful for local tracks.
    fn close(&self) {}
}

/// Receives engine callbacks.
pub trait EngineEventHandler: Send + Sync {
    fn on_engine_event(&self, event: EngineEvent);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(pub u64);

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Region {
    Global,
    #[default]
    Europe,
    NorthAmerica,
    Asia,
    Japan,
    India,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum EngineLogLevel {
    None,
    #[default]
    Info,
    Warn,
    Error,
    Fatal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub app_id: String,
    pub region: Region,
    pub log_level: EngineLogLevel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelProfile {
    Communication,
    LiveBroadcasting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientRole {
    Broadcaster,
    Audience,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinOptions {
    pub auto_subscribe_audio: bool,
    pub auto_subscribe_video: bool,
}

impl Default for JoinOptions {
    fn default() -> Self {
        Self {
            auto_subscribe_audio: true,
            auto_subscribe_video: true,
        }
    }
}

/// Commands the session issues to the engine.
///
/// Synchronous commands return the engine's status code: negative means
/// failure. A rejected `join_channel` is NOT followed by an error callback.
pub trait RtcEngine: Send + Sync + 'static {
    type Track: MediaTrack;

    fn initialize(&self, config: &EngineConfig) -> impl Future<Output = Result<(), String>> + Send;

    fn add_handler(&self, handler: Arc<dyn EngineEventHandler>) -> HandlerId;
    fn remove_handler(&self, id: HandlerId);

    fn enable_video(&self) -> i32;
    fn start_preview(&self) -> i32;
    fn set_channel_profile(&self, profile: ChannelProfile) -> i32;
    fn set_client_role(&self, role: ClientRole) -> i32;

    fn create_microphone_track(
        &self,
        device_id: &str,
    ) -> impl Future<Output = Result<Self::Track, String>> + Send;
    fn create_camera_track(
        &self,
        device_id: &str,
    ) -> impl Future<Output = Result<Self::Track, String>> + Send;

    fn enable_encryption(&self, enabled: bool, config: &EncryptionConfig) -> i32;
    fn join_channel(&self, token: &str, channel_id: &str, uid_hint: Uid, options: &JoinOptions) -> i32;
    fn leave_channel(&self) -> i32;

    /// Send local tracks into the joined channel.
    fn publish(&self, tracks: &[Self::Track]) -> i32;

    fn subscribe(
        &self,
        uid: Uid,
        kind: MediaKind,
    ) -> impl Future<Output = Result<Self::Track, String>> + Send;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    AudioInput,
    VideoInput,
    AudioOutput,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaDevice {
    pub device_id: String,
    pub kind: DeviceKind,
    pub label: String,
}

/// OS-level collaborator: permission prompts and device enumeration.
pub trait DevicePlatform: Send + Sync {
    fn request_permissions(&self) -> impl Future<Output = Result<(), String>> + Send;
    fn devices(&self) -> impl Future<Output = Result<Vec<MediaDevice>, String>> + Send;
}

/// Registration of a handler on an engine. Dropping it unregisters.
pub struct EngineSubscription<E: RtcEngine> {
    engine: Arc<E>,
    id: HandlerId,
}

impl<E: RtcEngine> EngineSubscription<E> {
    pub fn register(engine: Arc<E>, handler: Arc<dyn EngineEventHandler>) -> Self {
        let id = engine.add_handler(handler);
        Self { engine, id }
    }
}

impl<E: RtcEngine> Drop for EngineSubscription<E> {
    fn drop(&mut self) {
        tracing::debug!(handler = self.id.0, "removing engine handler");
        self.engine.remove_handler(self.id);
    }
}
