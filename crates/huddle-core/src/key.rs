//! Encryption key derivation for channel media encryption.
//!
//! Secrets are configured as hex strings. The engine expects the key as a
//! text string, so by default each decoded byte becomes one character whose
//! code point equals the byte value. Both ends of a call must agree on the
//! representation, which is why it is configurable.

use serde::{Deserialize, Serialize};

use crate::errors::CallError;

/// Length of the key-derivation salt handed to the engine.
pub const KDF_SALT_LEN: usize = 32;

/// Fixed salt shared by every client of a channel.
pub const KDF_SALT: [u8; KDF_SALT_LEN] = [1; KDF_SALT_LEN];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncryptionMode {
    Aes128Gcm,
}

/// How the configured hex secret is presented to the engine.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum KeyEncoding {
    /// One character per decoded byte.
    #[default]
    DecodedAscii,
    /// The hex string itself.
    RawHex,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptionConfig {
    pub key: String,
    pub mode: EncryptionMode,
    pub kdf_salt: [u8; KDF_SALT_LEN],
}

/// Decode a hex string into a string with one character per byte.
///
/// `"48656c6c6f"` decodes to `"Hello"`. Bytes above 0x7f map to the
/// Latin-1 code point of the same value, so the character count always
/// equals half the input length.
pub fn hex_to_ascii(hex: &str) -> Result<String, hex::FromHexError> {
    let bytes = hex::decode(hex)?;
    Ok(bytes.into_iter().map(char::from).collect())
}

/// Build the engine encryption config for a hex secret.
pub fn encryption_config(secret: &str, encoding: KeyEncoding) -> Result<EncryptionConfig, CallError> {
    let key = match encoding {
        KeyEncoding::DecodedAscii => hex_to_ascii(secret)?,
        KeyEncoding::RawHex => {
            hex::decode(secret)?;
            secret.to_string()
        }
    };
    Ok(EncryptionConfig {
        key,
        mode: EncryptionMode::Aes128Gcm,
        kdf_salt: KDF_SALT,
    })
}
