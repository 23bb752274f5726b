//! Multipart upload session
//!
//! An [`Uploader`] owns one remote multipart upload from initiation to commit
//! or abort.
//!
//! ```text
//! Open ──close──▶ Closing ──▶ Committed
//!                         ├─▶ Aborted   (a part failed, upload deleted)
//!                         └─▶ Failed    (completion kept failing)
//! Open ──pause──▶ UploaderState ──resume──▶ Open
//! ```
//!
//! The session expects a single writer. Dropping an open session stops the
//! part tasks still running but leaves the remote upload in place.

use super::writer::{PartBuffer, PartSizer};
use super::{UploadError, UploaderState, WorkerPool};
use crate::metrics;
use crate::s3::{CompletedPart, S3Client};
use bytes::Bytes;
use http::HeaderMap;
use tokio::io::{AsyncRead, AsyncReadExt};

const COPY_CHUNK_SIZE: usize = 64 * 1024;

/// Lifecycle of an upload session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Accepting writes
    Open,
    /// Flushing and waiting for parts in flight
    Closing,
    /// Completion succeeded; the object exists
    Committed,
    /// A part failed for good and the upload was deleted
    Aborted,
    /// Every completion attempt failed; the upload is still open remotely
    Failed,
}

/// Streaming writer for one multipart upload
pub struct Uploader {
    client: S3Client,
    url: String,
    upload_id: String,
    buffer: PartBuffer,
    pool: WorkerPool,
    state: SessionState,
}

impl std::fmt::Debug for Uploader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Uploader")
            .field("url", &self.url)
            .field("upload_id", &self.upload_id)
            .field("state", &self.state)
            .field("parts_issued", &self.buffer.issued())
            .field("buffered", &self.buffer.buffered())
            .finish_non_exhaustive()
    }
}

impl Uploader {
    /// Initiate a multipart upload of the object at `url`.
    ///
    /// `headers` (ACL, content type, user metadata) are sent with the
    /// initiate request only. Initiation is not retried.
    #[tracing::instrument(name = "upload.create", skip(client, headers), err)]
    pub async fn create(
        client: &S3Client,
        url: &str,
        headers: Option<&HeaderMap>,
    ) -> Result<Self, UploadError> {
        let upload_id = client.create_multipart_upload(url, headers).await?;

        let config = client.upload_config();
        let buffer = PartBuffer::new(PartSizer::from_config(config), config.max_parts);

        tracing::info!(upload_id = %upload_id, "Multipart upload session opened");
        Ok(Self::open(client.clone(), url.to_string(), upload_id, buffer, Vec::new()))
    }

    /// Continue a paused upload from its snapshot
    pub fn resume(client: &S3Client, state: UploaderState) -> Result<Self, UploadError> {
        state.validate()?;

        let config = client.upload_config();
        let buffer = PartBuffer::resume(
            PartSizer::from_config(config),
            state.part,
            &state.buffer,
            config.max_parts,
        )?;

        tracing::info!(
            upload_id = %state.upload_id,
            next_part = state.next_part_number(),
            buffered = state.buffer.len(),
            "Multipart upload session resumed"
        );
        Ok(Self::open(
            client.clone(),
            state.url,
            state.upload_id,
            buffer,
            state.parts,
        ))
    }

    fn open(
        client: S3Client,
        url: String,
        upload_id: String,
        buffer: PartBuffer,
        completed: Vec<CompletedPart>,
    ) -> Self {
        let pool = WorkerPool::new(client.clone(), &url, &upload_id, completed);
        Self {
            client,
            url,
            upload_id,
            buffer,
            pool,
            state: SessionState::Open,
        }
    }

    pub fn upload_id(&self) -> &str {
        &self.upload_id
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Parts emitted so far, uploaded or not
    pub fn parts_issued(&self) -> u32 {
        self.buffer.issued()
    }

    /// Write `data` into the upload.
    ///
    /// Suspends while every worker is busy. Fails with the sticky error once
    /// any part has failed for good.
    pub async fn write(&mut self, data: &[u8]) -> Result<usize, UploadError> {
        self.ensure_open()?;
        self.check_sticky()?;

        let mut written = 0;
        while written < data.len() {
            let (n, part) = match self.buffer.fill(&data[written..]) {
                Ok(filled) => filled,
                Err(err) => {
                    // The object can no longer be written completely.
                    self.pool.fail(err.clone());
                    return Err(err);
                }
            };
            written += n;
            if let Some(part) = part {
                self.pool.submit(part).await?;
                self.check_sticky()?;
            }
        }
        Ok(written)
    }

    /// Stream everything from `reader` into the upload, returning the byte count
    pub async fn copy_from<R>(&mut self, reader: &mut R) -> Result<u64, UploadError>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        self.ensure_open()?;

        let mut chunk = vec![0u8; COPY_CHUNK_SIZE];
        let mut total = 0u64;
        loop {
            let n = reader.read(&mut chunk).await?;
            if n == 0 {
                break;
            }
            self.write(&chunk[..n]).await?;
            total += n as u64;
        }
        Ok(total)
    }

    /// Flush, wait for every part and commit the upload.
    ///
    /// When a part failed for good the upload is aborted instead and the
    /// part's error is returned. Calling `close` again is an invalid-state
    /// error and sends nothing.
    #[tracing::instrument(
        name = "upload.close",
        skip(self),
        fields(s3.upload_id = %self.upload_id, parts_count = tracing::field::Empty),
        err
    )]
    pub async fn close(&mut self) -> Result<(), UploadError> {
        self.ensure_open()?;
        self.state = SessionState::Closing;

        if self.pool.error().is_none() {
            match self.buffer.finish() {
                Ok(Some(part)) => self.pool.submit(part).await?,
                Ok(None) => {}
                Err(err) => self.pool.fail(err),
            }
        }
        self.drain_or_abort().await?;

        let parts = self.pool.completed_parts();
        tracing::Span::current().record("parts_count", parts.len());
        self.commit(&parts).await
    }

    /// Stop the session and return a snapshot to resume it later.
    ///
    /// Pending bytes shorter than the minimum part size travel in the
    /// snapshot; a longer remainder is uploaded as a regular part first. If a
    /// part failed for good the upload is aborted and the error returned.
    #[tracing::instrument(
        name = "upload.pause",
        skip(self),
        fields(s3.upload_id = %self.upload_id),
        err
    )]
    pub async fn pause(mut self) -> Result<UploaderState, UploadError> {
        self.ensure_open()?;
        self.state = SessionState::Closing;

        let min_part_size = self.client.upload_config().min_part_size;
        let carry = if (self.buffer.buffered() as u64) < min_part_size {
            self.buffer.take_remainder()
        } else {
            Bytes::new()
        };

        if self.pool.error().is_none() {
            if let Some(part) = self.buffer.flush() {
                self.pool.submit(part).await?;
            }
        }
        self.drain_or_abort().await?;

        metrics::record_upload_paused();
        let state = UploaderState {
            upload_id: self.upload_id.clone(),
            url: self.url.clone(),
            part: self.buffer.issued(),
            parts: self.pool.completed_parts(),
            buffer: carry.to_vec(),
        };
        tracing::info!(
            next_part = state.next_part_number(),
            buffered = state.buffer.len(),
            "Multipart upload session paused"
        );
        Ok(state)
    }

    fn ensure_open(&self) -> Result<(), UploadError> {
        if self.state != SessionState::Open {
            return Err(UploadError::InvalidState("upload session is not open"));
        }
        Ok(())
    }

    fn check_sticky(&self) -> Result<(), UploadError> {
        match self.pool.error() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Wait for all parts; abort the upload if one of them failed
    async fn drain_or_abort(&mut self) -> Result<(), UploadError> {
        self.pool.drain().await;

        let Some(err) = self.pool.error() else {
            return Ok(());
        };

        self.abort().await;
        self.state = SessionState::Aborted;
        metrics::record_upload_aborted();
        Err(err)
    }

    /// Best-effort delete of the remote upload
    async fn abort(&self) {
        if let Err(err) = self
            .client
            .abort_multipart_upload(&self.url, &self.upload_id)
            .await
        {
            metrics::record_error("abort");
            tracing::error!(
                upload_id = %self.upload_id,
                error = %err,
                "Failed to abort multipart upload"
            );
        }
    }

    async fn commit(&mut self, parts: &[CompletedPart]) -> Result<(), UploadError> {
        let attempts = self.client.upload_config().complete_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            match self
                .client
                .complete_multipart_upload(&self.url, &self.upload_id, parts)
                .await
            {
                Ok(()) => {
                    self.state = SessionState::Committed;
                    metrics::record_upload_committed(parts.len());
                    tracing::info!(parts = parts.len(), "Multipart upload committed");
                    return Ok(());
                }
                Err(err) if attempt < attempts && err.is_retryable() => {
                    metrics::record_error(err.kind());
                    tracing::warn!(
                        attempt,
                        attempts,
                        error = %err,
                        "Complete multipart upload failed, retrying"
                    );
                }
                Err(err) => {
                    self.state = SessionState::Failed;
                    metrics::record_error(err.kind());
                    metrics::record_upload_failed();
                    tracing::error!(
                        upload_id = %self.upload_id,
                        error = %err,
                        "Complete multipart upload failed; upload left open"
                    );
                    return Err(err.into());
                }
            }
        }
    }
}
