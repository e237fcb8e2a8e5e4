use semver::Version;
use serde::{de::DeserializeOwned, Serialize};

use crate::errors::{DraftResult, SerializationError};

const SUPPORTED_VERSION: (u64, u64, u64) = (1, 0, 0);

pub fn get_supported_version() -> Version {
    let (major, minor, patch) = SUPPORTED_VERSION;
    Version::new(major, minor, patch)
}

pub trait HasVersion {
    fn get_version(&self) -> &Version;
}

/// JSON document exchanged with an offline signer
pub trait VersionedDocument: HasVersion + Serialize + DeserializeOwned + Sized {
    fn from_json(s: &str) -> DraftResult<Self> {
        let value: serde_json::Value = serde_json::from_str(s)
            .map_err(|e| SerializationError::JsonDeserializationError(e.to_string()))?;
        let version = value.get("version").ok_or_else(|| {
            SerializationError::JsonDeserializationError("Missing version".into())
        })?;
        let version: Version = serde_json::from_value(version.clone())
            .map_err(|e| SerializationError::JsonDeserializationError(e.to_string()))?;
        if version != get_supported_version() {
            return Err(SerializationError::JsonDeserializationError(format!(
                "Unsupported version. Expected '{}', got '{}'",
                get_supported_version(),
                version
            ))
            .into());
        }

        let document: Self = serde_json::from_value(value)
            .map_err(|e| SerializationError::JsonDeserializationError(e.to_string()))?;
        Ok(document)
    }

    fn to_json(&self) -> DraftResult<String> {
        serde_json::to_string(&self)
            .map_err(|e| SerializationError::JsonSerializationError(e.to_string()).into())
    }
}
