use std::fmt;

use thiserror::Error;

/// Which local capture device could not be found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingDeviceKind {
    Audio,
    Video,
}

impl MissingDeviceKind {
    /// Stable code UI shells switch on to show a device-specific message.
    pub fn code(self) -> &'static str {
        match self {
            Self::Audio => "MISSING_AUDIO",
            Self::Video => "MISSING_VIDEO",
        }
    }
}

impl fmt::Display for MissingDeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Error)]
pub enum CallError {
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("engine initialization failed: {0}")]
    EngineInit(String),
    #[error("missing device: {0}")]
    MissingDevice(MissingDeviceKind),
    #[error("join rejected by engine (code {code})")]
    JoinRejected { code: i32 },
    #[error("encryption rejected by engine (code {code})")]
    Encryption { code: i32 },
    #[error("session is not ready")]
    NotReady,
    #[error("invalid encryption key: {0}")]
    InvalidKey(#[from] hex::FromHexError),
    #[error("subscribe failed: {0}")]
    Subscribe(String),
    #[error("settings error: {0}")]
    Settings(String),
}
