//! XML request and response bodies of the S3 REST API

use super::S3ClientError;
use serde::{Deserialize, Serialize};

/// Part number and entity tag of an uploaded part.
///
/// Serialized the same way in the completion body and in upload snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedPart {
    #[serde(rename = "PartNumber")]
    pub part_number: u32,
    #[serde(rename = "ETag")]
    pub etag: String,
}

impl CompletedPart {
    pub fn new(part_number: u32, etag: impl Into<String>) -> Self {
        Self {
            part_number,
            etag: etag.into(),
        }
    }
}

/// Response to `POST <object>?uploads`
#[derive(Debug, Deserialize)]
pub struct InitiateMultipartUploadResult {
    #[serde(rename = "UploadId", default)]
    pub upload_id: String,
}

/// Body of `POST <object>?uploadId=..`
#[derive(Debug, Serialize)]
pub struct CompleteMultipartUpload<'a> {
    #[serde(rename = "Part")]
    pub parts: &'a [CompletedPart],
}

/// Error document returned by the service
#[derive(Debug, Deserialize)]
pub struct ErrorResponse {
    #[serde(rename = "Code", default)]
    pub code: String,
    #[serde(rename = "Message", default)]
    pub message: String,
}

/// Response to a bucket GET (list objects, version 1)
#[derive(Debug, Default, Deserialize)]
pub struct ListBucketResult {
    #[serde(rename = "IsTruncated", default)]
    pub is_truncated: bool,
    #[serde(rename = "Contents", default)]
    pub contents: Vec<ListedObject>,
    #[serde(rename = "CommonPrefixes", default)]
    pub common_prefixes: Vec<CommonPrefix>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListedObject {
    #[serde(rename = "Key")]
    pub key: String,
    #[serde(rename = "LastModified", default)]
    pub last_modified: String,
    #[serde(rename = "ETag", default)]
    pub etag: String,
    #[serde(rename = "Size", default)]
    pub size: u64,
    #[serde(rename = "StorageClass", default)]
    pub storage_class: String,
    #[serde(rename = "Owner", default)]
    pub owner: Option<Owner>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Owner {
    #[serde(rename = "ID", default)]
    pub id: String,
    #[serde(rename = "DisplayName", default)]
    pub display_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommonPrefix {
    #[serde(rename = "Prefix")]
    pub prefix: String,
}

/// Decode an XML document
pub fn from_xml<T: serde::de::DeserializeOwned>(body: &[u8]) -> Result<T, S3ClientError> {
    let text = std::str::from_utf8(body).map_err(|e| S3ClientError::XmlError(e.to_string()))?;
    quick_xml::de::from_str(text).map_err(|e| S3ClientError::XmlError(e.to_string()))
}

/// Encode the completion body listing `parts` in the given order
pub fn complete_body(parts: &[CompletedPart]) -> Result<String, S3ClientError> {
    quick_xml::se::to_string(&CompleteMultipartUpload { parts })
        .map_err(|e| S3ClientError::XmlError(e.to_string()))
}
