//! s3util Library
//!
//! Client for S3-compatible object storage with Signature Version 2 request
//! signing and a concurrent, resumable multipart upload pipeline.
//!
//! # Features
//!
//! - **Request Signing**: Deterministic SigV2 canonicalization and HMAC-SHA1 signing
//! - **Multipart Uploads**: Streaming writer that slices bytes into growing parts
//! - **Bounded Concurrency**: Parts are uploaded by a fixed pool of workers with retry
//! - **Pause/Resume**: In-flight uploads can be snapshotted and resumed in a new process
//! - **Listing & Reading**: Directory-style listing and streaming object reads
//!
//! # Example
//!
//! ```no_run
//! use s3util::{config::Config, s3::S3Client, upload::Uploader};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load("s3util.yaml")?;
//!     let client = S3Client::new(&config)?;
//!
//!     let mut uploader =
//!         Uploader::create(&client, "https://mybucket.s3.amazonaws.com/log.txt", None).await?;
//!     uploader.write(b"hello, world").await?;
//!     uploader.close().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod list;
pub mod logging;
pub mod metrics;
pub mod object;
pub mod s3;
pub mod sign;
pub mod upload;

// Re-export commonly used types
pub use config::Config;
pub use s3::{Credentials, S3Client, S3ClientError};
pub use sign::Service;
pub use upload::{UploadError, Uploader, UploaderState};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Extract the HTTP status code carried by an error returned from this crate.
///
/// Returns `0` when the error did not come from an unwanted HTTP response.
pub fn status_code(err: &(dyn std::error::Error + 'static)) -> u16 {
    if let Some(err) = err.downcast_ref::<S3ClientError>() {
        return err.status_code().map_or(0, |s| s.as_u16());
    }
    if let Some(err) = err.downcast_ref::<UploadError>() {
        return err.status_code().map_or(0, |s| s.as_u16());
    }
    0
}
