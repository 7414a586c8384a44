//! Huddle call core.
//!
//! Pure Rust crate with no platform dependencies: tile grid sizing, the
//! call session and roster, and the seam to an external real-time engine.
//! Consumed by UI shells.

pub mod engine;
pub mod errors;
pub mod events;
pub mod key;
pub mod layout;
pub mod loopback;
pub mod participants;
pub mod session;
pub mod settings;
pub mod tracks;

pub use engine::{DevicePlatform, MediaTrack, RtcEngine};
pub use errors::{CallError, MissingDeviceKind};
pub use events::{
    EngineEvent, MediaKind, Participant, RemoteMediaState, SessionEvent, SessionEventListener,
    SessionStatus, UNSET_UID, Uid,
};
pub use layout::{TileLayout, calculate_layout, call_grid};
pub use session::Session;
pub use settings::{CallConfig, CallSettings, SettingsStore};
pub use tracks::{TileView, ViewBinding};
