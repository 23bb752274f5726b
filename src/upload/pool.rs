//! Worker pool for part uploads
//!
//! Each submitted [`Part`] runs in its own tokio task, but at most
//! `concurrency` of them at once: [`WorkerPool::submit`] waits for a free
//! permit before spawning, which pushes back on the writer when every worker
//! is busy.
//!
//! Failure is cooperative. A part that exhausts its attempts records the
//! session's sticky error (the first one wins) and the other parts in flight
//! run to completion. Nothing is cancelled mid-request.

use super::{Part, UploadError};
use crate::metrics;
use crate::s3::{CompletedPart, S3Client};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};

/// State shared between the session and its part tasks
#[derive(Debug, Default)]
struct PoolState {
    error: Mutex<Option<UploadError>>,
    /// Entity tags by part number, iterated in part order
    completed: Mutex<BTreeMap<u32, String>>,
}

impl PoolState {
    fn set_error(&self, err: UploadError) {
        let mut error = self.error.lock();
        if error.is_none() {
            *error = Some(err);
        }
    }

    fn record(&self, part_number: u32, etag: String) {
        self.completed.lock().insert(part_number, etag);
    }
}

/// What every part task needs to send its requests
#[derive(Clone)]
struct PartContext {
    client: S3Client,
    url: Arc<str>,
    upload_id: Arc<str>,
    attempts: u32,
    state: Arc<PoolState>,
}

/// Bounded pool of part upload tasks for one multipart upload
pub struct WorkerPool {
    ctx: PartContext,
    permits: Arc<Semaphore>,
    tasks: JoinSet<()>,
}

impl WorkerPool {
    /// Create a pool for `upload_id`, seeded with parts completed earlier
    pub fn new(
        client: S3Client,
        url: &str,
        upload_id: &str,
        completed: Vec<CompletedPart>,
    ) -> Self {
        let config = client.upload_config();
        let concurrency = config.concurrency.max(1);
        let attempts = config.part_attempts.max(1);

        let state = PoolState::default();
        state.completed.lock().extend(
            completed
                .into_iter()
                .map(|part| (part.part_number, part.etag)),
        );

        Self {
            ctx: PartContext {
                client,
                url: Arc::from(url),
                upload_id: Arc::from(upload_id),
                attempts,
                state: Arc::new(state),
            },
            permits: Arc::new(Semaphore::new(concurrency)),
            tasks: JoinSet::new(),
        }
    }

    /// Hand `part` to a worker, waiting while all workers are busy
    pub async fn submit(&mut self, part: Part) -> Result<(), UploadError> {
        self.reap();

        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| UploadError::InvalidState("worker pool is closed"))?;

        tracing::debug!(
            part_number = part.number(),
            bytes = part.len(),
            in_flight = self.tasks.len(),
            "Submitting part"
        );

        let ctx = self.ctx.clone();
        self.tasks.spawn(async move {
            let _permit = permit;
            upload_with_retry(&ctx, part).await;
        });

        Ok(())
    }

    /// Wait until every submitted part has finished
    pub async fn drain(&mut self) {
        while let Some(result) = self.tasks.join_next().await {
            self.on_task_exit(result);
        }
    }

    /// The sticky error, if any part has failed for good
    pub fn error(&self) -> Option<UploadError> {
        self.ctx.state.error.lock().clone()
    }

    /// Record `err` as the sticky error unless one is already set
    pub fn fail(&self, err: UploadError) {
        self.ctx.state.set_error(err);
    }

    /// Completed parts in ascending part number order
    pub fn completed_parts(&self) -> Vec<CompletedPart> {
        self.ctx
            .state
            .completed
            .lock()
            .iter()
            .map(|(number, etag)| CompletedPart::new(*number, etag.clone()))
            .collect()
    }

    /// Parts submitted but not yet finished
    pub fn in_flight(&self) -> usize {
        self.tasks.len()
    }

    fn reap(&mut self) {
        while let Some(result) = self.tasks.try_join_next() {
            self.on_task_exit(result);
        }
    }

    fn on_task_exit(&self, result: Result<(), JoinError>) {
        if let Err(err) = result {
            tracing::error!(error = %err, "Part upload task did not finish");
            metrics::record_error("worker");
            self.ctx
                .state
                .set_error(UploadError::WorkerFailed(err.to_string()));
        }
    }
}

/// Upload `part`, retrying up to the attempt budget.
///
/// Each attempt builds and signs a new request, so every retry carries a
/// fresh `Date` and signature.
async fn upload_with_retry(ctx: &PartContext, mut part: Part) {
    let part_number = part.number();
    let mut last_error = None;

    for attempt in 1..=ctx.attempts {
        let Some(body) = part.body() else {
            break;
        };

        match ctx
            .client
            .upload_part(&ctx.url, &ctx.upload_id, part_number, body)
            .await
        {
            Ok(etag) => {
                metrics::record_part_attempt(true, part.len());
                part.set_etag(etag.clone());
                ctx.state.record(part_number, etag);
                part.release();
                return;
            }
            Err(err) => {
                metrics::record_part_attempt(false, part.len());
                metrics::record_error(err.kind());
                tracing::warn!(
                    part_number,
                    attempt,
                    attempts = ctx.attempts,
                    error = %err,
                    "Part upload attempt failed"
                );
                let retryable = err.is_retryable();
                last_error = Some(err);
                if !retryable {
                    break;
                }
            }
        }
    }

    part.release();

    let err = match last_error {
        Some(err) => UploadError::S3(err),
        None => UploadError::InvalidState("part data released before upload"),
    };
    tracing::error!(
        part_number,
        upload_id = %ctx.upload_id,
        error = %err,
        "Part upload failed, giving up"
    );
    ctx.state.set_error(err);
}
