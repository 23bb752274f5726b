//! Snapshot of a paused upload

use super::UploadError;
use crate::s3::CompletedPart;
use serde::{Deserialize, Serialize};

/// Everything needed to continue a paused upload in another process.
///
/// Credentials and transport are not part of the snapshot; they come from the
/// client passed to [`Uploader::resume`](super::Uploader::resume).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploaderState {
    pub upload_id: String,
    pub url: String,
    /// Number of the last part issued
    pub part: u32,
    /// Uploaded parts in ascending part number order
    #[serde(default)]
    pub parts: Vec<CompletedPart>,
    /// Pending bytes too short to be uploaded as a part
    #[serde(default, with = "base64_bytes", skip_serializing_if = "Vec::is_empty")]
    pub buffer: Vec<u8>,
}

impl UploaderState {
    pub fn to_json(&self) -> Result<String, UploadError> {
        serde_json::to_string(self).map_err(|e| UploadError::Serialization(e.to_string()))
    }

    pub fn from_json(json: &str) -> Result<Self, UploadError> {
        serde_json::from_str(json).map_err(|e| UploadError::Serialization(e.to_string()))
    }

    /// Number the next emitted part will get
    pub fn next_part_number(&self) -> u32 {
        self.part + 1
    }

    /// Check that the snapshot describes a consistent upload
    pub fn validate(&self) -> Result<(), UploadError> {
        if self.upload_id.is_empty() {
            return Err(UploadError::Serialization("snapshot has no upload id".into()));
        }
        if self.parts.len() != self.part as usize {
            return Err(UploadError::Serialization(format!(
                "snapshot lists {} parts but {} were issued",
                self.parts.len(),
                self.part
            )));
        }
        let ordered = self
            .parts
            .iter()
            .enumerate()
            .all(|(i, p)| p.part_number as usize == i + 1);
        if !ordered {
            return Err(UploadError::Serialization(
                "snapshot parts are not numbered 1..n".into(),
            ));
        }
        Ok(())
    }
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&BASE64.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        BASE64
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}
