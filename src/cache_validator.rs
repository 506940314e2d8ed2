use serde::{de::DeserializeOwned, Serialize};
use sha2::{Digest, Sha256};

/// Cached payload sealed with a SHA-256 checksum.
///
/// Search results and geocoding answers are cached as serialized JSON. The
/// checksum is verified on every read; an entry that fails verification is
/// treated as a miss and the value is fetched again.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ValidatedCacheEntry {
    /// The cached payload (JSON string).
    pub data: String,
    /// SHA-256 of `data`, hex encoded.
    pub checksum: String,
}

impl ValidatedCacheEntry {
    pub fn new(data: String) -> Self {
        let checksum = Self::compute_checksum(&data);
        Self { data, checksum }
    }

    fn compute_checksum(data: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(data.as_bytes());
        hex::encode(hasher.finalize())
    }

    pub fn is_valid(&self) -> bool {
        Self::compute_checksum(&self.data) == self.checksum
    }

    pub fn serialize(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Returns the payload if the entry parses and its checksum matches.
    pub fn deserialize_and_validate(serialized: &str) -> Option<String> {
        let entry: ValidatedCacheEntry = serde_json::from_str(serialized).ok()?;

        if entry.is_valid() {
            Some(entry.data)
        } else {
            tracing::warn!(
                "Cache validation failed: checksum mismatch. Expected: {}, Data length: {}",
                entry.checksum,
                entry.data.len()
            );
            None
        }
    }

    /// Serializes `value` and seals it, ready to insert into a string cache.
    pub fn seal<T: Serialize>(value: &T) -> Option<String> {
        serde_json::to_string(value)
            .ok()
            .map(|json| Self::new(json).serialize())
    }

    /// Inverse of [`seal`](Self::seal).
    pub fn open<T: DeserializeOwned>(serialized: &str) -> Option<T> {
        let data = Self::deserialize_and_validate(serialized)?;
        serde_json::from_str(&data).ok()
    }
}
