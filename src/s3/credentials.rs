//! S3 Credentials Module
//!
//! Access key pairs used to sign requests, loaded either from configuration
//! or from the standard `AWS_*` environment variables.
//!
//! # Example
//!
//! ```
//! use s3util::s3::Credentials;
//!
//! let creds = Credentials::new("access-key", "secret-key");
//! assert_eq!(creds.access_key_id(), "access-key");
//! assert!(creds.session_token().is_none());
//! ```

use crate::config::CredentialsConfig;
use std::fmt;
use thiserror::Error;

/// Credential loading errors
#[derive(Error, Debug)]
pub enum CredentialsError {
    #[error("Missing credentials: {0}")]
    MissingCredentials(String),

    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),
}

/// Access key pair, plus an optional security token for temporary credentials.
///
/// When a token is present it is sent as `x-amz-security-token` on every
/// signed request.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    access_key_id: String,
    secret_access_key: String,
    session_token: Option<String>,
}

impl Credentials {
    /// Create new credentials
    pub fn new(access_key_id: impl Into<String>, secret_access_key: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token: None,
        }
    }

    /// Create credentials with session token (for temporary credentials)
    pub fn with_session_token(
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
        session_token: impl Into<String>,
    ) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token: Some(session_token.into()),
        }
    }

    /// Get the access key ID
    pub fn access_key_id(&self) -> &str {
        &self.access_key_id
    }

    /// Get the secret access key
    pub fn secret_access_key(&self) -> &str {
        &self.secret_access_key
    }

    /// Get the session token (if any)
    pub fn session_token(&self) -> Option<&str> {
        self.session_token.as_deref()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field(
                "session_token",
                &self.session_token.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

/// Factory methods for loading [`Credentials`]
pub struct CredentialsProvider;

impl CredentialsProvider {
    /// Load credentials from environment variables
    ///
    /// Looks for:
    /// - `AWS_ACCESS_KEY_ID`
    /// - `AWS_SECRET_ACCESS_KEY`
    /// - `AWS_SESSION_TOKEN` (optional)
    pub fn from_env() -> Result<Credentials, CredentialsError> {
        let access_key = std::env::var("AWS_ACCESS_KEY_ID").map_err(|_| {
            CredentialsError::MissingCredentials("AWS_ACCESS_KEY_ID not set".into())
        })?;

        let secret_key = std::env::var("AWS_SECRET_ACCESS_KEY").map_err(|_| {
            CredentialsError::MissingCredentials("AWS_SECRET_ACCESS_KEY not set".into())
        })?;

        let session_token = std::env::var("AWS_SESSION_TOKEN").ok();

        Ok(match session_token {
            Some(token) => Credentials::with_session_token(access_key, secret_key, token),
            None => Credentials::new(access_key, secret_key),
        })
    }

    /// Load credentials from the `credentials` section of the configuration
    pub fn from_config(config: &CredentialsConfig) -> Result<Credentials, CredentialsError> {
        let access_key = config.access_key.as_deref().ok_or_else(|| {
            CredentialsError::MissingCredentials("access_key not set in config".into())
        })?;

        let secret_key = config.secret_key.as_deref().ok_or_else(|| {
            CredentialsError::MissingCredentials("secret_key not set in config".into())
        })?;

        if access_key.is_empty() || secret_key.is_empty() {
            return Err(CredentialsError::InvalidCredentials(
                "access_key and secret_key must not be empty".into(),
            ));
        }

        Ok(match config.security_token.as_deref() {
            Some(token) if !token.is_empty() => {
                Credentials::with_session_token(access_key, secret_key, token)
            }
            _ => Credentials::new(access_key, secret_key),
        })
    }

    /// Use the configured keys when both are set, otherwise fall back to the
    /// environment.
    pub fn resolve(config: &CredentialsConfig) -> Result<Credentials, CredentialsError> {
        if config.access_key.is_some() || config.secret_key.is_some() {
            Self::from_config(config)
        } else {
            Self::from_env()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credentials_creation() {
        let creds = Credentials::new("access", "secret");
        assert_eq!(creds.access_key_id(), "access");
        assert_eq!(creds.secret_access_key(), "secret");
        assert!(creds.session_token().is_none());
    }

    #[test]
    fn test_credentials_with_session_token() {
        let creds = Credentials::with_session_token("access", "secret", "token");
        assert_eq!(creds.session_token(), Some("token"));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let creds = Credentials::with_session_token("access", "very-secret", "tok");
        let debug = format!("{:?}", creds);
        assert!(debug.contains("access"));
        assert!(!debug.contains("very-secret"));
        assert!(!debug.contains("tok\""));
    }

    #[test]
    fn test_from_config_missing_access_key() {
        let config = CredentialsConfig {
            access_key: None,
            secret_key: Some("secret".into()),
            security_token: None,
        };
        assert!(CredentialsProvider::from_config(&config).is_err());
    }

    #[test]
    fn test_from_config_missing_secret_key() {
        let config = CredentialsConfig {
            access_key: Some("access".into()),
            secret_key: None,
            security_token: None,
        };
        assert!(CredentialsProvider::from_config(&config).is_err());
    }

    #[test]
    fn test_from_config_with_token() {
        let config = CredentialsConfig {
            access_key: Some("config-access".into()),
            secret_key: Some("config-secret".into()),
            security_token: Some("config-token".into()),
        };

        let creds = CredentialsProvider::from_config(&config).unwrap();
        assert_eq!(creds.access_key_id(), "config-access");
        assert_eq!(creds.secret_access_key(), "config-secret");
        assert_eq!(creds.session_token(), Some("config-token"));
    }

    #[test]
    fn test_resolve_prefers_config() {
        let config = CredentialsConfig {
            access_key: Some("a".into()),
            secret_key: Some("s".into()),
            security_token: None,
        };
        let creds = CredentialsProvider::resolve(&config).unwrap();
        assert_eq!(creds.access_key_id(), "a");
    }
}
