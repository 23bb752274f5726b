//! Upload module
//!
//! Streaming multipart uploads: bytes written to an [`Uploader`] are cut into
//! growing parts by a [`PartBuffer`], uploaded concurrently by a
//! [`WorkerPool`] and committed (or aborted) when the session is closed.

use crate::s3::S3ClientError;
use http::StatusCode;
use std::sync::Arc;
use thiserror::Error;

pub mod multipart;
pub mod part;
pub mod pool;
pub mod state;
pub mod writer;

pub use multipart::{SessionState, Uploader};
pub use part::Part;
pub use pool::WorkerPool;
pub use state::UploaderState;
pub use writer::{PartBuffer, PartSizer};

/// Minimum part size (5 MiB). Only the last part may be smaller.
pub const MIN_PART_SIZE: u64 = 5 * 1024 * 1024;

/// Maximum part size (5 GiB)
pub const MAX_PART_SIZE: u64 = 5 * 1024 * 1024 * 1024;

/// Maximum parts allowed in one upload
pub const MAX_PARTS: u32 = 10000;

/// Maximum object size (5 TiB)
pub const MAX_OBJECT_SIZE: u64 = 5 * 1024 * 1024 * 1024 * 1024;

pub const DEFAULT_CONCURRENCY: usize = 5;
pub const DEFAULT_PART_ATTEMPTS: u32 = 2;
pub const DEFAULT_COMPLETE_ATTEMPTS: u32 = 3;

/// Part size growth per part. Starting at 5 MiB this reaches the maximum
/// object size within the part-count limit.
pub const DEFAULT_PART_SIZE_GROWTH: f64 = 1.001;

/// Upload errors
#[derive(Error, Debug, Clone)]
pub enum UploadError {
    #[error("S3 error: {0}")]
    S3(#[from] S3ClientError),

    #[error("Invalid state: {0}")]
    InvalidState(&'static str),

    #[error("Upload would exceed {max} parts")]
    TooManyParts { max: u32 },

    #[error("Part upload task failed: {0}")]
    WorkerFailed(String),

    #[error("IO error: {0}")]
    Io(Arc<std::io::Error>),

    #[error("Snapshot error: {0}")]
    Serialization(String),
}

impl From<std::io::Error> for UploadError {
    fn from(err: std::io::Error) -> Self {
        UploadError::Io(Arc::new(err))
    }
}

impl UploadError {
    /// HTTP status of the underlying unwanted response, if any
    pub fn status_code(&self) -> Option<StatusCode> {
        match self {
            UploadError::S3(err) => err.status_code(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_code_delegates_to_s3_error() {
        let err = UploadError::from(S3ClientError::UnwantedStatus {
            status: StatusCode::NOT_FOUND,
            body: String::new(),
        });
        assert_eq!(err.status_code(), Some(StatusCode::NOT_FOUND));
        assert_eq!(UploadError::InvalidState("closed").status_code(), None);
    }

    #[test]
    fn test_limits_reach_max_object_size() {
        let mut sizer = PartSizer::new(MIN_PART_SIZE, MAX_PART_SIZE, DEFAULT_PART_SIZE_GROWTH);
        let total: u64 = (0..MAX_PARTS).map(|_| sizer.next_size()).sum();
        assert!(total >= MAX_OBJECT_SIZE);
    }
}
