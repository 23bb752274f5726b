//! S3 Client module
//!
//! Signs and sends requests to an S3-compatible service through an injectable
//! [`HttpClient`]. Every request gets a fresh `Date` header and a fresh
//! signature, so a retried request is never a replay of a stale one.
//!
//! # Example
//!
//! ```no_run
//! use s3util::{config::Config, s3::S3Client};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::default();
//! let client = S3Client::new(&config)?;
//!
//! let url = "https://my-bucket.s3.amazonaws.com/backup.tar";
//! let upload_id = client.create_multipart_upload(url, None).await?;
//! client.abort_multipart_upload(url, &upload_id).await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Tracing
//!
//! | Operation | Span Name | Attributes |
//! |-----------|-----------|------------|
//! | CreateMultipartUpload | `s3.create_multipart_upload` | url, upload_id, status_code |
//! | UploadPart | `s3.upload_part` | upload_id, part_number, bytes, etag, status_code |
//! | CompleteMultipartUpload | `s3.complete_multipart_upload` | upload_id, parts_count, status_code |
//! | AbortMultipartUpload | `s3.abort_multipart_upload` | upload_id, status_code |

pub mod credentials;
pub mod transport;
pub mod xml;

use crate::config::{Config, UploadConfig};
use crate::sign::{Service, SignError};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use http::header::{HeaderMap, HeaderValue, DATE, ETAG};
use http::{Method, Request, Response, StatusCode, Uri};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use std::sync::Arc;
use thiserror::Error;

pub use credentials::{Credentials, CredentialsError, CredentialsProvider};
pub use transport::{HttpClient, ReqwestTransport, ResponseBody};
pub use xml::CompletedPart;

/// Characters escaped in query parameter values (everything but unreserved)
pub(crate) const QUERY_VALUE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// S3 client errors
#[derive(Error, Debug, Clone)]
pub enum S3ClientError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Request error: {0}")]
    RequestError(String),

    #[error("Transport error: {0}")]
    TransportError(String),

    #[error("Unwanted HTTP status {}: {:?}", .status.as_u16(), .body)]
    UnwantedStatus { status: StatusCode, body: String },

    #[error("Response error: {0}")]
    ResponseError(String),

    #[error("XML error: {0}")]
    XmlError(String),

    #[error("Signing error: {0}")]
    SigningError(#[from] SignError),
}

impl S3ClientError {
    /// HTTP status of an unwanted response, `None` for every other kind
    pub fn status_code(&self) -> Option<StatusCode> {
        match self {
            S3ClientError::UnwantedStatus { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether sending the same request again may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            S3ClientError::TransportError(_)
                | S3ClientError::UnwantedStatus { .. }
                | S3ClientError::ResponseError(_)
        )
    }

    /// Short label used for the `type` dimension of the error metric
    pub fn kind(&self) -> &'static str {
        match self {
            S3ClientError::ConfigError(_) => "config",
            S3ClientError::RequestError(_) => "request",
            S3ClientError::TransportError(_) => "transport",
            S3ClientError::UnwantedStatus { .. } => "status",
            S3ClientError::ResponseError(_) => "response",
            S3ClientError::XmlError(_) => "xml",
            S3ClientError::SigningError(_) => "signing",
        }
    }
}

/// Format a timestamp the way the `Date` header expects it
pub fn http_date(time: DateTime<Utc>) -> String {
    time.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Append `query` to `url`, which may already carry a query string
pub(crate) fn with_query(url: &str, query: &str) -> String {
    let separator = if url.contains('?') { '&' } else { '?' };
    format!("{url}{separator}{query}")
}

/// S3 Client
///
/// Cheap to clone; clones share the transport and credentials.
#[derive(Clone)]
pub struct S3Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    service: Service,
    credentials: Credentials,
    upload: UploadConfig,
    transport: Arc<dyn HttpClient>,
}

impl std::fmt::Debug for S3Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Client")
            .field("service", &self.inner.service)
            .field("credentials", &self.inner.credentials)
            .field("upload", &self.inner.upload)
            .finish_non_exhaustive()
    }
}

impl S3Client {
    /// Create a client using the default reqwest transport
    pub fn new(config: &Config) -> Result<Self, S3ClientError> {
        let transport = ReqwestTransport::new(&config.transport)?;
        Self::with_transport(config, Arc::new(transport))
    }

    /// Create a client sending requests through `transport`
    pub fn with_transport(
        config: &Config,
        transport: Arc<dyn HttpClient>,
    ) -> Result<Self, S3ClientError> {
        config
            .validate()
            .map_err(|e| S3ClientError::ConfigError(e.to_string()))?;
        let credentials = CredentialsProvider::resolve(&config.credentials)
            .map_err(|e| S3ClientError::ConfigError(e.to_string()))?;

        Ok(Self::from_parts(
            Service::from(&config.service),
            credentials,
            config.upload.clone(),
            transport,
        ))
    }

    /// Assemble a client from already resolved pieces
    pub fn from_parts(
        service: Service,
        credentials: Credentials,
        upload: UploadConfig,
        transport: Arc<dyn HttpClient>,
    ) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                service,
                credentials,
                upload,
                transport,
            }),
        }
    }

    pub fn service(&self) -> &Service {
        &self.inner.service
    }

    pub fn credentials(&self) -> &Credentials {
        &self.inner.credentials
    }

    /// Upload tuning used by sessions created from this client
    pub fn upload_config(&self) -> &UploadConfig {
        &self.inner.upload
    }

    /// Build a request with a current `Date` header and sign it.
    ///
    /// `url` must be absolute and already percent-encoded.
    pub fn signed_request(
        &self,
        method: Method,
        url: &str,
        headers: Option<&HeaderMap>,
        body: Bytes,
    ) -> Result<Request<Bytes>, S3ClientError> {
        let uri: Uri = url
            .parse()
            .map_err(|e| S3ClientError::RequestError(format!("invalid URL {url}: {e}")))?;
        if uri.scheme().is_none() || uri.host().is_none() {
            return Err(S3ClientError::RequestError(format!(
                "URL must be absolute: {url}"
            )));
        }

        let mut request = Request::new(body);
        *request.method_mut() = method;
        *request.uri_mut() = uri;

        if let Some(extra) = headers {
            for (name, value) in extra {
                request.headers_mut().append(name.clone(), value.clone());
            }
        }

        let date = HeaderValue::from_str(&http_date(Utc::now()))
            .map_err(|e| S3ClientError::RequestError(e.to_string()))?;
        request.headers_mut().insert(DATE, date);

        self.inner.service.sign(&mut request, &self.inner.credentials)?;
        tracing::debug!(
            method = %request.method(),
            uri = %request.uri(),
            "Signed request"
        );

        Ok(request)
    }

    /// Send a signed request, turning non-2xx responses into
    /// [`S3ClientError::UnwantedStatus`].
    pub async fn send(
        &self,
        request: Request<Bytes>,
    ) -> Result<Response<ResponseBody>, S3ClientError> {
        let response = self.inner.transport.execute(request).await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = match response.into_body().bytes().await {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(_) => String::new(),
        };
        Err(S3ClientError::UnwantedStatus { status, body })
    }

    /// Start a multipart upload of the object at `url` and return its id.
    ///
    /// `headers` are sent on this request only (ACL, content type, metadata).
    #[tracing::instrument(
        name = "s3.create_multipart_upload",
        skip(self, headers),
        fields(
            s3.url = %url,
            http.method = "POST",
            s3.upload_id = tracing::field::Empty,
            http.status_code = tracing::field::Empty
        ),
        err
    )]
    pub async fn create_multipart_upload(
        &self,
        url: &str,
        headers: Option<&HeaderMap>,
    ) -> Result<String, S3ClientError> {
        let request =
            self.signed_request(Method::POST, &with_query(url, "uploads"), headers, Bytes::new())?;
        let response = self.send(request).await?;

        let span = tracing::Span::current();
        span.record("http.status_code", response.status().as_u16());

        let body = response.into_body().bytes().await?;
        let result: xml::InitiateMultipartUploadResult = xml::from_xml(&body)?;
        if result.upload_id.is_empty() {
            return Err(S3ClientError::ResponseError(
                "missing UploadId in initiate response".into(),
            ));
        }

        span.record("s3.upload_id", result.upload_id.as_str());
        tracing::info!(upload_id = %result.upload_id, "CreateMultipartUpload completed");

        Ok(result.upload_id)
    }

    /// Upload one part and return its entity tag with the quotes stripped
    #[tracing::instrument(
        name = "s3.upload_part",
        skip(self, url, body),
        fields(
            s3.upload_id = %upload_id,
            s3.part_number = part_number,
            http.method = "PUT",
            upload.bytes = body.len(),
            s3.etag = tracing::field::Empty,
            http.status_code = tracing::field::Empty
        ),
        err
    )]
    pub async fn upload_part(
        &self,
        url: &str,
        upload_id: &str,
        part_number: u32,
        body: Bytes,
    ) -> Result<String, S3ClientError> {
        let query = format!(
            "partNumber={}&uploadId={}",
            part_number,
            utf8_percent_encode(upload_id, QUERY_VALUE)
        );
        let request = self.signed_request(Method::PUT, &with_query(url, &query), None, body)?;
        let response = self.send(request).await?;

        let span = tracing::Span::current();
        span.record("http.status_code", response.status().as_u16());

        let etag = response
            .headers()
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim_matches('"').to_string())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| {
                S3ClientError::ResponseError(format!("missing ETag for part {part_number}"))
            })?;

        span.record("s3.etag", etag.as_str());
        tracing::debug!(part_number, etag = %etag, "UploadPart completed");

        Ok(etag)
    }

    /// Commit the upload. `parts` must be in ascending part number order.
    #[tracing::instrument(
        name = "s3.complete_multipart_upload",
        skip(self, url, parts),
        fields(
            s3.upload_id = %upload_id,
            http.method = "POST",
            parts_count = parts.len(),
            http.status_code = tracing::field::Empty
        ),
        err
    )]
    pub async fn complete_multipart_upload(
        &self,
        url: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> Result<(), S3ClientError> {
        let query = format!("uploadId={}", utf8_percent_encode(upload_id, QUERY_VALUE));
        let body = xml::complete_body(parts)?;
        let request =
            self.signed_request(Method::POST, &with_query(url, &query), None, Bytes::from(body))?;
        let response = self.send(request).await?;
        let status = response.status();
        tracing::Span::current().record("http.status_code", status.as_u16());

        // The service may report a failed commit inside a 200 response.
        let body = response.into_body().bytes().await?;
        if let Ok(error) = xml::from_xml::<xml::ErrorResponse>(&body) {
            if !error.code.is_empty() {
                return Err(S3ClientError::ResponseError(format!(
                    "{}: {}",
                    error.code, error.message
                )));
            }
        }

        tracing::info!(parts = parts.len(), "CompleteMultipartUpload completed");
        Ok(())
    }

    /// Discard the upload and every part stored for it
    #[tracing::instrument(
        name = "s3.abort_multipart_upload",
        skip(self, url),
        fields(
            s3.upload_id = %upload_id,
            http.method = "DELETE",
            http.status_code = tracing::field::Empty
        ),
        err
    )]
    pub async fn abort_multipart_upload(
        &self,
        url: &str,
        upload_id: &str,
    ) -> Result<(), S3ClientError> {
        let query = format!("uploadId={}", utf8_percent_encode(upload_id, QUERY_VALUE));
        let request =
            self.signed_request(Method::DELETE, &with_query(url, &query), None, Bytes::new())?;
        let response = self.send(request).await?;
        tracing::Span::current().record("http.status_code", response.status().as_u16());

        tracing::info!("AbortMultipartUpload completed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use parking_lot::Mutex;

    /// Records requests and answers each with a canned response
    struct Recorder {
        requests: Mutex<Vec<Request<Bytes>>>,
        status: StatusCode,
        body: &'static str,
        etag: Option<&'static str>,
    }

    impl Recorder {
        fn new(status: StatusCode, body: &'static str, etag: Option<&'static str>) -> Arc<Self> {
            Arc::new(Self {
                requests: Mutex::new(Vec::new()),
                status,
                body,
                etag,
            })
        }
    }

    #[async_trait]
    impl HttpClient for Recorder {
        async fn execute(
            &self,
            request: Request<Bytes>,
        ) -> Result<Response<ResponseBody>, S3ClientError> {
            self.requests.lock().push(request);
            let mut response = Response::new(ResponseBody::from(self.body));
            *response.status_mut() = self.status;
            if let Some(etag) = self.etag {
                response
                    .headers_mut()
                    .insert(ETAG, HeaderValue::from_static(etag));
            }
            Ok(response)
        }
    }

    fn client(transport: Arc<dyn HttpClient>) -> S3Client {
        S3Client::from_parts(
            Service::default(),
            Credentials::new("AKID", "SECRET"),
            UploadConfig::default(),
            transport,
        )
    }

    #[test]
    fn test_http_date_format() {
        let time = Utc.with_ymd_and_hms(2007, 3, 27, 19, 36, 42).unwrap();
        assert_eq!(http_date(time), "Tue, 27 Mar 2007 19:36:42 GMT");
    }

    #[test]
    fn test_with_query() {
        assert_eq!(with_query("http://h/k", "uploads"), "http://h/k?uploads");
        assert_eq!(with_query("http://h/k?a=b", "uploads"), "http://h/k?a=b&uploads");
    }

    #[test]
    fn test_error_status_code() {
        let err = S3ClientError::UnwantedStatus {
            status: StatusCode::SERVICE_UNAVAILABLE,
            body: String::new(),
        };
        assert_eq!(err.status_code(), Some(StatusCode::SERVICE_UNAVAILABLE));
        assert!(err.is_retryable());

        let err = S3ClientError::RequestError("bad url".into());
        assert_eq!(err.status_code(), None);
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_signed_request_sets_date_and_authorization() {
        let recorder = Recorder::new(StatusCode::OK, "", None);
        let client = client(recorder);

        let request = client
            .signed_request(
                Method::GET,
                "http://bucket.s3.amazonaws.com/key",
                None,
                Bytes::new(),
            )
            .unwrap();

        assert!(request.headers().contains_key(DATE));
        let auth = request.headers()["authorization"].to_str().unwrap();
        assert!(auth.starts_with("AWS AKID:"));
    }

    #[test]
    fn test_signed_request_rejects_relative_url() {
        let client = client(Recorder::new(StatusCode::OK, "", None));
        let result = client.signed_request(Method::GET, "/key", None, Bytes::new());
        assert!(matches!(result, Err(S3ClientError::RequestError(_))));
    }

    #[tokio::test]
    async fn test_create_multipart_upload_parses_id() {
        let recorder = Recorder::new(
            StatusCode::OK,
            "<InitiateMultipartUploadResult><UploadId>abc/123</UploadId></InitiateMultipartUploadResult>",
            None,
        );
        let client = client(recorder.clone());

        let mut headers = HeaderMap::new();
        headers.insert("x-amz-acl", HeaderValue::from_static("public-read"));
        let upload_id = client
            .create_multipart_upload("http://bucket.s3.amazonaws.com/key", Some(&headers))
            .await
            .unwrap();
        assert_eq!(upload_id, "abc/123");

        let requests = recorder.requests.lock();
        assert_eq!(requests[0].method(), Method::POST);
        assert_eq!(requests[0].uri().query(), Some("uploads"));
        assert_eq!(requests[0].headers()["x-amz-acl"], "public-read");
    }

    #[tokio::test]
    async fn test_create_multipart_upload_requires_id() {
        let recorder = Recorder::new(
            StatusCode::OK,
            "<InitiateMultipartUploadResult></InitiateMultipartUploadResult>",
            None,
        );
        let result = client(recorder)
            .create_multipart_upload("http://bucket.s3.amazonaws.com/key", None)
            .await;
        assert!(matches!(result, Err(S3ClientError::ResponseError(_))));
    }

    #[tokio::test]
    async fn test_upload_part_strips_etag_quotes_and_encodes_id() {
        let recorder = Recorder::new(StatusCode::OK, "", Some("\"d41d8cd98f00b204\""));
        let client = client(recorder.clone());

        let etag = client
            .upload_part(
                "http://bucket.s3.amazonaws.com/key",
                "abc/123",
                7,
                Bytes::from("data"),
            )
            .await
            .unwrap();
        assert_eq!(etag, "d41d8cd98f00b204");

        let requests = recorder.requests.lock();
        assert_eq!(requests[0].method(), Method::PUT);
        assert_eq!(
            requests[0].uri().query(),
            Some("partNumber=7&uploadId=abc%2F123")
        );
        assert_eq!(requests[0].body(), &Bytes::from("data"));
    }

    #[tokio::test]
    async fn test_unwanted_status_carries_body() {
        let recorder = Recorder::new(StatusCode::FORBIDDEN, "<Error>denied</Error>", None);
        let result = client(recorder)
            .abort_multipart_upload("http://bucket.s3.amazonaws.com/key", "id")
            .await;

        match result {
            Err(S3ClientError::UnwantedStatus { status, body }) => {
                assert_eq!(status, StatusCode::FORBIDDEN);
                assert_eq!(body, "<Error>denied</Error>");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_complete_reports_embedded_error() {
        let recorder = Recorder::new(
            StatusCode::OK,
            "<Error><Code>InternalError</Code><Message>retry</Message></Error>",
            None,
        );
        let result = client(recorder)
            .complete_multipart_upload(
                "http://bucket.s3.amazonaws.com/key",
                "id",
                &[CompletedPart::new(1, "e1")],
            )
            .await;
        assert!(matches!(result, Err(S3ClientError::ResponseError(_))));
    }
}
