use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};

use crate::engine::{EngineConfig, EngineLogLevel, Region};
use crate::errors::CallError;
use crate::key::KeyEncoding;
use crate::layout::DEFAULT_ASPECT_RATIO;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct CallSettings {
    #[serde(default)]
    pub app_id: String,
    #[serde(default)]
    pub region: Region,
    #[serde(default)]
    pub log_level: EngineLogLevel,
    #[serde(default)]
    pub channel_id: String,
    #[serde(default)]
    pub token: String,
    /// Hex-encoded channel secret. `None` disables media encryption.
    #[serde(default)]
    pub encryption_secret: Option<String>,
    #[serde(default)]
    pub key_encoding: KeyEncoding,
    #[serde(default = "default_aspect_ratio")]
    pub aspect_ratio: f64,
}

fn default_aspect_ratio() -> f64 {
    DEFAULT_ASPECT_RATIO
}

impl Default for CallSettings {
    fn default() -> Self {
        Self {
            app_id: String::new(),
            region: Region::default(),
            log_level: EngineLogLevel::default(),
            channel_id: String::new(),
            token: String::new(),
            encryption_secret: None,
            key_encoding: KeyEncoding::default(),
            aspect_ratio: DEFAULT_ASPECT_RATIO,
        }
    }
}

impl CallSettings {
    pub fn call_config(&self) -> CallConfig {
        CallConfig {
            engine: EngineConfig {
                app_id: self.app_id.clone(),
                region: self.region,
                log_level: self.log_level,
            },
            channel_id: self.channel_id.clone(),
            token: self.token.clone(),
            encryption_secret: self.encryption_secret.clone(),
            key_encoding: self.key_encoding,
            aspect_ratio: self.aspect_ratio,
        }
    }
}

/// Everything a session needs to initialize the engine, join and size tiles.
#[derive(Debug, Clone, PartialEq)]
pub struct CallConfig {
    pub engine: EngineConfig,
    pub channel_id: String,
    pub token: String,
    pub encryption_secret: Option<String>,
    pub key_encoding: KeyEncoding,
    pub aspect_ratio: f64,
}

/// Settings persisted as `settings.json` under a data directory.
pub struct SettingsStore {
    settings: Mutex<CallSettings>,
    file_path: PathBuf,
}

impl SettingsStore {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        let file_path = data_dir.as_ref().join("settings.json");
        let settings = Self::load(&file_path);
        Self {
            settings: Mutex::new(settings),
            file_path,
        }
    }

    pub fn get(&self) -> CallSettings {
        self.settings.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    pub fn set_app_id(&self, app_id: String) -> Result<(), CallError> {
        self.update(|s| s.app_id = app_id)
    }

    pub fn set_region(&self, region: Region) -> Result<(), CallError> {
        self.update(|s| s.region = region)
    }

    pub fn set_channel(&self, channel_id: String, token: String) -> Result<(), CallError> {
        self.update(|s| {
            s.channel_id = channel_id;
            s.token = token;
        })
    }

    pub fn set_encryption_secret(&self, secret: Option<String>) -> Result<(), CallError> {
        self.update(|s| s.encryption_secret = secret)
    }

    pub fn set_key_encoding(&self, encoding: KeyEncoding) -> Result<(), CallError> {
        self.update(|s| s.key_encoding = encoding)
    }

    fn update(&self, apply: impl FnOnce(&mut CallSettings)) -> Result<(), CallError> {
        let snapshot = {
            let mut settings = self.settings.lock().unwrap_or_else(PoisonError::into_inner);
            apply(&mut settings);
            settings.clone()
        };
        self.save(&snapshot)
    }

    fn save(&self, settings: &CallSettings) -> Result<(), CallError> {
        if let Some(parent) = self.file_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| CallError::Settings(e.to_string()))?;
        }
        let json =
            serde_json::to_string_pretty(settings).map_err(|e| CallError::Settings(e.to_string()))?;
        std::fs::write(&self.file_path, json).map_err(|e| CallError::Settings(e.to_string()))
    }

    fn load(path: &Path) -> CallSettings {
        match std::fs::read_to_string(path) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("ignoring unreadable settings {}: {e}", path.display());
                CallSettings::default()
            }),
            Err(_) => CallSettings::default(),
        }
    }
}
