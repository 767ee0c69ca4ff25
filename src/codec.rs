//! Reversible encoding between store values and the strings kept in the
//! key/value table: JSON wrapped in standard base64.

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

use crate::error::AppError;
use crate::storage::KvStore;

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("invalid utf-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StorageKey {
    Habits,
    Categories,
    Reminders,
    Theme,
}

impl StorageKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Habits => "habits",
            Self::Categories => "categories",
            Self::Reminders => "reminders",
            Self::Theme => "theme",
        }
    }
}

pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<String, CodecError> {
    let json = serde_json::to_string(value)?;
    Ok(STANDARD.encode(json.as_bytes()))
}

pub fn decode<T: DeserializeOwned>(stored: &str) -> Result<T, CodecError> {
    let bytes = STANDARD.decode(stored.trim())?;
    let json = String::from_utf8(bytes)?;
    Ok(serde_json::from_str(&json)?)
}

/// Reads and decodes `key`, substituting `default` when the key is absent or
/// its value cannot be decoded. Only store failures are returned as errors.
pub async fn load_or_default<T, F>(store: &KvStore, key: StorageKey, default: F) -> Result<T, AppError>
where
    T: DeserializeOwned,
    F: FnOnce() -> T,
{
    let Some(stored) = store.get(key.as_str()).await? else {
        return Ok(default());
    };
    match decode(&stored) {
        Ok(value) => Ok(value),
        Err(err) => {
            warn!(key = key.as_str(), "discarding unreadable stored value: {err}");
            Ok(default())
        }
    }
}
