//! Streaming reads of single objects

use crate::metrics;
use crate::s3::{ResponseBody, S3Client, S3ClientError};
use bytes::{Bytes, BytesMut};
use futures::{Stream, TryStreamExt};
use http::{HeaderMap, Method};
use pin_project_lite::pin_project;
use std::fmt;
use std::pin::Pin;
use std::task::{ready, Context, Poll};
use std::time::{Duration, Instant};

/// Totals reported once an object body has been read to the end
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadStats {
    pub bytes: u64,
    /// Time from sending the request to the end of the body
    pub duration: Duration,
}

/// Called with the read totals when the body ends
pub type ReadCallback = Box<dyn FnOnce(ReadStats) + Send>;

pin_project! {
    /// Body of an object being read
    pub struct ObjectReader {
        #[pin]
        body: ResponseBody,
        headers: HeaderMap,
        bytes: u64,
        started: Instant,
        on_complete: Option<ReadCallback>,
    }
}

impl ObjectReader {
    /// Response headers (content type, length, ETag, user metadata)
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn content_length(&self) -> Option<u64> {
        self.headers
            .get(http::header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
    }

    /// Read the rest of the body into memory
    pub async fn bytes(self) -> Result<Bytes, S3ClientError> {
        let buf = self
            .try_fold(BytesMut::new(), |mut acc, chunk| async move {
                acc.extend_from_slice(&chunk);
                Ok(acc)
            })
            .await?;
        Ok(buf.freeze())
    }
}

impl Stream for ObjectReader {
    type Item = Result<Bytes, S3ClientError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.project();
        match ready!(this.body.poll_next(cx)) {
            Some(Ok(chunk)) => {
                *this.bytes += chunk.len() as u64;
                Poll::Ready(Some(Ok(chunk)))
            }
            Some(Err(err)) => Poll::Ready(Some(Err(err))),
            None => {
                if let Some(on_complete) = this.on_complete.take() {
                    let stats = ReadStats {
                        bytes: *this.bytes,
                        duration: this.started.elapsed(),
                    };
                    metrics::record_object_read(stats.bytes);
                    tracing::debug!(
                        bytes = stats.bytes,
                        duration_ms = stats.duration.as_millis() as u64,
                        "Object read completed"
                    );
                    on_complete(stats);
                }
                Poll::Ready(None)
            }
        }
    }
}

impl fmt::Debug for ObjectReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectReader")
            .field("bytes", &self.bytes)
            .field("started", &self.started)
            .finish_non_exhaustive()
    }
}

/// Request the object at `url`.
///
/// Any status other than 2xx is an [`S3ClientError::UnwantedStatus`].
/// `on_complete` runs once, when the returned stream reaches its end.
#[tracing::instrument(
    name = "s3.get_object",
    skip(client, on_complete),
    fields(http.method = "GET", http.status_code = tracing::field::Empty),
    err
)]
pub async fn open(
    client: &S3Client,
    url: &str,
    on_complete: Option<ReadCallback>,
) -> Result<ObjectReader, S3ClientError> {
    let started = Instant::now();
    let request = client.signed_request(Method::GET, url, None, Bytes::new())?;
    let response = client.send(request).await?;
    tracing::Span::current().record("http.status_code", response.status().as_u16());

    let (parts, body) = response.into_parts();
    Ok(ObjectReader {
        body,
        headers: parts.headers,
        bytes: 0,
        started,
        on_complete,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::{stream, StreamExt};
    use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
    use std::sync::Arc;

    fn reader(
        chunks: Vec<Result<Bytes, S3ClientError>>,
        on_complete: Option<ReadCallback>,
    ) -> ObjectReader {
        let mut headers = HeaderMap::new();
        headers.insert(http::header::CONTENT_LENGTH, "11".parse().unwrap());
        ObjectReader {
            body: ResponseBody::new(stream::iter(chunks)),
            headers,
            bytes: 0,
            started: Instant::now(),
            on_complete,
        }
    }

    #[test]
    fn test_callback_runs_once_at_end() {
        let calls = Arc::new(AtomicUsize::new(0));
        let total = Arc::new(AtomicU64::new(0));
        let (c, t) = (calls.clone(), total.clone());

        let mut reader = reader(
            vec![Ok(Bytes::from("hello ")), Ok(Bytes::from("world"))],
            Some(Box::new(move |stats| {
                c.fetch_add(1, Ordering::SeqCst);
                t.store(stats.bytes, Ordering::SeqCst);
            })),
        );
        assert_eq!(reader.content_length(), Some(11));

        tokio_test::block_on(async {
            while let Some(chunk) = reader.next().await {
                chunk.unwrap();
            }
            assert!(reader.next().await.is_none());
        });

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(total.load(Ordering::SeqCst), 11);
    }

    #[test]
    fn test_error_is_passed_through_without_callback() {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();

        let reader = reader(
            vec![
                Ok(Bytes::from("part")),
                Err(S3ClientError::TransportError("reset".into())),
            ],
            Some(Box::new(move |_| {
                c.fetch_add(1, Ordering::SeqCst);
            })),
        );

        let result = tokio_test::block_on(reader.bytes());
        assert!(matches!(result, Err(S3ClientError::TransportError(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
