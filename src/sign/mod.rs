//! AWS Signature Version 2 request signing.
//!
//! The `Authorization` header has the format:
//!
//! ```text
//! AWS <AWSAccessKeyId>:<Signature>
//! ```
//!
//! where `Signature = Base64(HMAC-SHA1(SecretKey, StringToSign))`. See
//! [`canonical`] for how the string to sign is built.

pub mod canonical;

use crate::config::{ServiceConfig, DEFAULT_DOMAIN};
use crate::s3::Credentials;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use hmac::{Hmac, Mac};
use http::header::{HeaderName, HeaderValue, AUTHORIZATION};
use http::Request;
use sha1::Sha1;
use thiserror::Error;

pub use canonical::{string_to_sign, vhost_bucket, SIGNED_SUB_RESOURCES};

type HmacSha1 = Hmac<Sha1>;

/// Header carrying the session token of temporary credentials
pub const SECURITY_TOKEN_HEADER: &str = "x-amz-security-token";

/// Signing errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignError {
    #[error("Invalid header value for {0}")]
    InvalidHeaderValue(&'static str),
}

/// An S3-compatible service, identified by its root domain.
///
/// The domain decides how the bucket is read from a request host when
/// building the canonicalized resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Service {
    domain: String,
}

impl Default for Service {
    fn default() -> Self {
        Self::new(DEFAULT_DOMAIN)
    }
}

impl From<&ServiceConfig> for Service {
    fn from(config: &ServiceConfig) -> Self {
        Self::new(config.domain.clone())
    }
}

impl Service {
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
        }
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// String to sign for `request`, exactly as [`Service::sign`] hashes it.
    pub fn string_to_sign<B>(&self, request: &Request<B>) -> String {
        canonical::string_to_sign(&self.domain, request)
    }

    /// Sign `request` in place.
    ///
    /// Sets `x-amz-security-token` first when the credentials carry a token,
    /// so that the token is covered by the signature, then sets
    /// `Authorization`. Any existing values of those headers are replaced.
    /// The request must already carry `Date` (or `x-amz-date`).
    pub fn sign<B>(
        &self,
        request: &mut Request<B>,
        credentials: &Credentials,
    ) -> Result<(), SignError> {
        if let Some(token) = credentials.session_token() {
            let value = HeaderValue::from_str(token)
                .map_err(|_| SignError::InvalidHeaderValue(SECURITY_TOKEN_HEADER))?;
            request
                .headers_mut()
                .insert(HeaderName::from_static(SECURITY_TOKEN_HEADER), value);
        }

        let string_to_sign = self.string_to_sign(request);
        let signature = compute_signature(credentials.secret_access_key(), &string_to_sign);

        tracing::debug!(
            access_key = credentials.access_key_id(),
            string_to_sign = %string_to_sign.escape_debug(),
            "Signing request"
        );

        let authorization = format!("AWS {}:{}", credentials.access_key_id(), signature);
        let value = HeaderValue::from_str(&authorization)
            .map_err(|_| SignError::InvalidHeaderValue("authorization"))?;
        request.headers_mut().insert(AUTHORIZATION, value);

        Ok(())
    }
}

/// Base64-encoded HMAC-SHA1 of `string_to_sign` keyed by `secret_key`.
pub fn compute_signature(secret_key: &str, string_to_sign: &str) -> String {
    let mut mac =
        HmacSha1::new_from_slice(secret_key.as_bytes()).expect("HMAC can accept any key length");
    mac.update(string_to_sign.as_bytes());
    BASE64.encode(mac.finalize().into_bytes())
}
