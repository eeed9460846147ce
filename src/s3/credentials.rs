//! S3 Credentials Module
//!
//! Resolves the static credentials the presigner signs with. When none are
//! configured the SDK's default provider chain (profile, web identity,
//! instance metadata) is used instead.
//!
//! # Example
//!
//! ```
//! use multipart_uploadr::s3::Credentials;
//!
//! let creds = Credentials::new("access-key", "secret-key");
//! assert_eq!(creds.access_key_id(), "access-key");
//! assert_eq!(creds.secret_access_key(), "secret-key");
//! ```

use crate::config::S3Config;
use thiserror::Error;

/// Provider name reported to the SDK for statically configured keys
const PROVIDER_NAME: &str = "multipart-uploadr";

/// Credential loading errors
#[derive(Error, Debug)]
pub enum CredentialsError {
    #[error("Missing credentials: {0}")]
    MissingCredentials(String),

    #[error("Incomplete credentials: {0}")]
    IncompleteCredentials(String),
}

/// Credentials for AWS authentication
#[derive(Clone)]
pub struct Credentials {
    access_key_id: String,
    secret_access_key: String,
    session_token: Option<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"** redacted **")
            .field("session_token", &self.session_token.as_ref().map(|_| "** redacted **"))
            .finish()
    }
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

impl From<Credentials> for aws_credential_types::Credentials {
    fn from(creds: Credentials) -> Self {
        aws_credential_types::Credentials::new(
            creds.access_key_id,
            creds.secret_access_key,
            creds.session_token,
            None,
            PROVIDER_NAME,
        )
    }
}

/// Factory methods for resolving credentials
pub struct CredentialsProvider;

impl CredentialsProvider {
    /// Load credentials from environment variables
    ///
    /// Looks for:
    /// - `AWS_KEY`
    /// - `AWS_SECRET`
    /// - `AWS_SESSION_TOKEN` (optional)
    ///
    /// Setting only one of `AWS_KEY` and `AWS_SECRET` is an error.
    pub fn from_env() -> Result<Credentials, CredentialsError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Credentials, CredentialsError> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        match (var("AWS_KEY"), var("AWS_SECRET")) {
            (Some(access_key), Some(secret_key)) => Ok(match var("AWS_SESSION_TOKEN") {
                Some(token) => Credentials::with_session_token(access_key, secret_key, token),
                None => Credentials::new(access_key, secret_key),
            }),
            (None, None) => Err(CredentialsError::MissingCredentials(
                "AWS_KEY and AWS_SECRET not set".into(),
            )),
            (Some(_), None) => Err(CredentialsError::IncompleteCredentials(
                "AWS_KEY is set but AWS_SECRET is not".into(),
            )),
            (None, Some(_)) => Err(CredentialsError::IncompleteCredentials(
                "AWS_SECRET is set but AWS_KEY is not".into(),
            )),
        }
    }

    /// Load credentials from S3Config
    ///
    /// Returns `None` when neither key is set, so the caller can fall back to
    /// the default provider chain. Setting only one of the two is an error.
    pub fn from_config(config: &S3Config) -> Result<Option<Credentials>, CredentialsError> {
        let access_key = config.access_key.as_deref().map(str::trim).filter(|s| !s.is_empty());
        let secret_key = config.secret_key.as_deref().map(str::trim).filter(|s| !s.is_empty());

        match (access_key, secret_key) {
            (Some(access), Some(secret)) => Ok(Some(Credentials::new(access, secret))),
            (None, None) => Ok(None),
            (Some(_), None) => Err(CredentialsError::IncompleteCredentials(
                "secret_key not set in config".into(),
            )),
            (None, Some(_)) => Err(CredentialsError::IncompleteCredentials(
                "access_key not set in config".into(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn s3_config(access_key: Option<&str>, secret_key: Option<&str>) -> S3Config {
        S3Config {
            bucket: "test".into(),
            region: "us-east-1".into(),
            endpoint: None,
            access_key: access_key.map(Into::into),
            secret_key: secret_key.map(Into::into),
            force_path_style: false,
        }
    }

    #[test]
    fn test_credentials_with_session_token() {
        let creds = Credentials::with_session_token("access", "secret", "token");
        assert_eq!(creds.access_key_id(), "access");
        assert_eq!(creds.secret_access_key(), "secret");
        assert_eq!(creds.session_token(), Some("token"));
    }

    #[test]
    fn test_debug_redacts_secret() {
        let creds = Credentials::new("access", "very-secret");
        let debug = format!("{:?}", creds);
        assert!(debug.contains("access"));
        assert!(!debug.contains("very-secret"));
    }

    #[test]
    fn test_from_config_success() {
        let creds = CredentialsProvider::from_config(&s3_config(Some("config-access"), Some("config-secret")))
            .unwrap()
            .unwrap();
        assert_eq!(creds.access_key_id(), "config-access");
        assert_eq!(creds.secret_access_key(), "config-secret");
    }

    #[test]
    fn test_from_config_none_falls_back() {
        let result = CredentialsProvider::from_config(&s3_config(None, Some("  ")));
        assert!(matches!(result, Ok(None)));
    }

    #[test]
    fn test_from_config_incomplete() {
        assert!(CredentialsProvider::from_config(&s3_config(Some("access"), None)).is_err());
        assert!(CredentialsProvider::from_config(&s3_config(None, Some("secret"))).is_err());
    }

    #[test]
    #[serial]
    fn test_from_env() {
        std::env::set_var("AWS_KEY", "env-access");
        std::env::set_var("AWS_SECRET", "env-secret");
        std::env::remove_var("AWS_SESSION_TOKEN");

        let creds = CredentialsProvider::from_env().unwrap();
        assert_eq!(creds.access_key_id(), "env-access");
        assert!(creds.session_token().is_none());

        std::env::remove_var("AWS_KEY");
        assert!(matches!(
            CredentialsProvider::from_env(),
            Err(CredentialsError::IncompleteCredentials(_))
        ));
        std::env::remove_var("AWS_SECRET");
        assert!(matches!(
            CredentialsProvider::from_env(),
            Err(CredentialsError::MissingCredentials(_))
        ));
    }

    #[test]
    fn test_from_lookup_half_set_pair() {
        let only_key = CredentialsProvider::from_lookup(|name| {
            (name == "AWS_KEY").then(|| "env-access".to_string())
        });
        assert!(matches!(
            only_key,
            Err(CredentialsError::IncompleteCredentials(_))
        ));

        let only_secret = CredentialsProvider::from_lookup(|name| {
            (name == "AWS_SECRET").then(|| "env-secret".to_string())
        });
        assert!(matches!(
            only_secret,
            Err(CredentialsError::IncompleteCredentials(_))
        ));
    }

    #[test]
    fn test_into_sdk_credentials() {
        let sdk: aws_credential_types::Credentials =
            Credentials::with_session_token("a", "s", "t").into();
        assert_eq!(sdk.access_key_id(), "a");
        assert_eq!(sdk.secret_access_key(), "s");
        assert_eq!(sdk.session_token(), Some("t"));
    }
}
