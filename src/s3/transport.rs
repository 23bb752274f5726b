//! HTTP transport abstraction
//!
//! The client never talks to the network directly. Every signed request goes
//! through an [`HttpClient`], so the transport (and its timeouts, proxies and
//! TLS setup) can be swapped out, for example by an in-memory fake in tests.

use super::S3ClientError;
use crate::config::TransportConfig;
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::stream::{self, BoxStream, Stream, StreamExt, TryStreamExt};
use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

/// Executes signed requests.
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Send `request` and return the response, whatever its status.
    ///
    /// Errors are reserved for transport failures (connection, DNS, timeout).
    async fn execute(
        &self,
        request: http::Request<Bytes>,
    ) -> Result<http::Response<ResponseBody>, S3ClientError>;
}

/// Streaming response body.
pub struct ResponseBody {
    inner: BoxStream<'static, Result<Bytes, S3ClientError>>,
}

impl ResponseBody {
    /// Wrap a stream of body chunks
    pub fn new<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<Bytes, S3ClientError>> + Send + 'static,
    {
        Self {
            inner: stream.boxed(),
        }
    }

    pub fn empty() -> Self {
        Self::new(stream::empty())
    }

    /// Collect the remaining chunks into one buffer
    pub async fn bytes(self) -> Result<Bytes, S3ClientError> {
        let buf = self
            .inner
            .try_fold(BytesMut::new(), |mut acc, chunk| async move {
                acc.extend_from_slice(&chunk);
                Ok(acc)
            })
            .await?;
        Ok(buf.freeze())
    }
}

impl From<Bytes> for ResponseBody {
    fn from(bytes: Bytes) -> Self {
        if bytes.is_empty() {
            return Self::empty();
        }
        Self::new(stream::once(async move { Ok(bytes) }))
    }
}

impl From<String> for ResponseBody {
    fn from(body: String) -> Self {
        Bytes::from(body).into()
    }
}

impl From<&'static str> for ResponseBody {
    fn from(body: &'static str) -> Self {
        Bytes::from_static(body.as_bytes()).into()
    }
}

impl Stream for ResponseBody {
    type Item = Result<Bytes, S3ClientError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

impl fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseBody").finish_non_exhaustive()
    }
}

/// Default transport backed by `reqwest`
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(config: &TransportConfig) -> Result<Self, S3ClientError> {
        let mut builder = reqwest::Client::builder();
        if let Some(secs) = config.timeout_seconds {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        if let Some(secs) = config.connect_timeout_seconds {
            builder = builder.connect_timeout(Duration::from_secs(secs));
        }

        let client = builder
            .build()
            .map_err(|e| S3ClientError::ConfigError(e.to_string()))?;

        Ok(Self { client })
    }

    /// Use an already configured reqwest client
    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpClient for ReqwestTransport {
    async fn execute(
        &self,
        request: http::Request<Bytes>,
    ) -> Result<http::Response<ResponseBody>, S3ClientError> {
        let request = reqwest::Request::try_from(request)
            .map_err(|e| S3ClientError::RequestError(e.to_string()))?;

        let response = self
            .client
            .execute(request)
            .await
            .map_err(|e| S3ClientError::TransportError(e.to_string()))?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .bytes_stream()
            .map_err(|e| S3ClientError::TransportError(e.to_string()));

        let mut out = http::Response::new(ResponseBody::new(body));
        *out.status_mut() = status;
        *out.headers_mut() = headers;
        Ok(out)
    }
}
