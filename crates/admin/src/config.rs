//! Back-office configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `DESK_BACKEND_URL` - Base URL of the hosted backend (e.g. `https://abc.supabase.co`)
//! - `DESK_BACKEND_API_KEY` - Backend API key sent with every request
//!
//! ## Optional
//! - `DESK_HOST` - Bind address (default: 127.0.0.1)
//! - `DESK_PORT` - Listen port (default: 3002)
//! - `DESK_BACKEND_TIMEOUT_SECS` - Per-request timeout for backend calls (default: 30)
//! - `DESK_ADMIN_EMAIL` / `DESK_ADMIN_PASSWORD` - Staff credentials the API
//!   server and CLI sign in with (must be set together)
//! - `DESK_LOG_JSON` - Emit JSON logs instead of text when set
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name
//! - `SENTRY_SAMPLE_RATE` - Error sample rate (default: 1.0)
//! - `SENTRY_TRACES_SAMPLE_RATE` - Traces sample rate (default: 0.0)

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;
use url::Url;

use billing_desk_core::Email;

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const MIN_API_KEY_LENGTH: usize = 20;
const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Back-office configuration.
#[derive(Debug, Clone)]
pub struct DeskConfig {
    /// Hosted backend connection settings
    pub backend: BackendConfig,
    /// IP address to bind the API server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Staff credentials for the API server / CLI session (optional)
    pub staff: Option<StaffCredentials>,
    /// Emit JSON-formatted logs
    pub log_json: bool,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment (e.g., "development", "production")
    pub sentry_environment: Option<String>,
    /// Sentry error sample rate (0.0 to 1.0)
    pub sentry_sample_rate: f32,
    /// Sentry traces sample rate (0.0 to 1.0)
    pub sentry_traces_sample_rate: f32,
}

/// Hosted backend connection settings.
///
/// Implements `Debug` manually to redact the API key.
#[derive(Clone)]
pub struct BackendConfig {
    /// Base URL; record and identity endpoints are resolved against it
    pub url: Url,
    /// API key sent as `apikey` header
    pub api_key: SecretString,
    /// Per-request timeout
    pub timeout: Duration,
}

impl std::fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendConfig")
            .field("url", &self.url.as_str())
            .field("api_key", &"[REDACTED]")
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Email/password pair used to open a staff session.
///
/// Implements `Debug` manually to redact the password.
#[derive(Clone)]
pub struct StaffCredentials {
    pub email: Email,
    pub password: SecretString,
}

impl std::fmt::Debug for StaffCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaffCredentials")
            .field("email", &self.email)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

impl DeskConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid,
    /// or if the API key fails validation (length, entropy).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let backend = BackendConfig::from_env()?;
        let host = get_env_or_default("DESK_HOST", "127.0.0.1")
            .parse::<IpAddr>()
            .map_err(|e| ConfigError::InvalidEnvVar("DESK_HOST".to_string(), e.to_string()))?;
        let port = get_env_or_default("DESK_PORT", "3002")
            .parse::<u16>()
            .map_err(|e| ConfigError::InvalidEnvVar("DESK_PORT".to_string(), e.to_string()))?;
        let staff = StaffCredentials::from_env()?;
        let log_json = get_optional_env("DESK_LOG_JSON").is_some();
        let sentry_dsn = get_optional_env("SENTRY_DSN");
        let sentry_environment = get_optional_env("SENTRY_ENVIRONMENT");
        let sentry_sample_rate = get_optional_env("SENTRY_SAMPLE_RATE")
            .and_then(|s| s.parse().ok())
            .unwrap_or(1.0);
        let sentry_traces_sample_rate = get_optional_env("SENTRY_TRACES_SAMPLE_RATE")
            .and_then(|s| s.parse().ok())
            .unwrap_or(0.0);

        Ok(Self {
            backend,
            host,
            port,
            staff,
            log_json,
            sentry_dsn,
            sentry_environment,
            sentry_sample_rate,
            sentry_traces_sample_rate,
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Staff credentials, required by anything that opens a session.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingEnvVar` if the credentials are not set.
    pub fn require_staff(&self) -> Result<&StaffCredentials, ConfigError> {
        self.staff
            .as_ref()
            .ok_or_else(|| ConfigError::MissingEnvVar("DESK_ADMIN_EMAIL".to_string()))
    }
}

impl BackendConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let url = parse_backend_url(&get_required_env("DESK_BACKEND_URL")?)?;
        let api_key = get_required_env("DESK_BACKEND_API_KEY")?;
        validate_api_key(&api_key, "DESK_BACKEND_API_KEY")?;
        let timeout_secs = get_optional_env("DESK_BACKEND_TIMEOUT_SECS")
            .map(|s| {
                s.parse::<u64>().map_err(|e| {
                    ConfigError::InvalidEnvVar("DESK_BACKEND_TIMEOUT_SECS".to_string(), e.to_string())
                })
            })
            .transpose()?
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        Ok(Self {
            url,
            api_key: SecretString::from(api_key),
            timeout: Duration::from_secs(timeout_secs),
        })
    }
}

impl StaffCredentials {
    fn from_env() -> Result<Option<Self>, ConfigError> {
        let email = get_optional_env("DESK_ADMIN_EMAIL");
        let password = get_optional_env("DESK_ADMIN_PASSWORD");

        match (email, password) {
            (Some(email), Some(password)) => {
                let email = Email::parse(&email).map_err(|e| {
                    ConfigError::InvalidEnvVar("DESK_ADMIN_EMAIL".to_string(), e.to_string())
                })?;
                Ok(Some(Self {
                    email,
                    password: SecretString::from(password),
                }))
            }
            (None, None) => Ok(None),
            _ => Err(ConfigError::InvalidEnvVar(
                "DESK_ADMIN_*".to_string(),
                "Both DESK_ADMIN_EMAIL and DESK_ADMIN_PASSWORD must be set together".to_string(),
            )),
        }
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get an optional environment variable (empty counts as unset).
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse the backend base URL, normalizing it to end with `/` so relative
/// endpoint paths join underneath it.
fn parse_backend_url(raw: &str) -> Result<Url, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidEnvVar("DESK_BACKEND_URL".to_string(), reason);

    let mut url = Url::parse(raw).map_err(|e| invalid(e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme '{}'", url.scheme())));
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.chars().count() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)]
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that an API key is long enough and has sufficient entropy.
///
/// Keys are issued by the backend provider, so arbitrary substrings of a
/// real key are not grounds for rejection.
fn validate_api_key(key: &str, var_name: &str) -> Result<(), ConfigError> {
    if key.len() < MIN_API_KEY_LENGTH {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!("must be at least {MIN_API_KEY_LENGTH} characters (got {})", key.len()),
        ));
    }

    let entropy = shannon_entropy(key);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1})"
            ),
        ));
    }

    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_backend_url_appends_slash() {
        let url = parse_backend_url("https://abc.supabase.co").unwrap();
        assert_eq!(url.as_str(), "https://abc.supabase.co/");
        assert_eq!(
            url.join("rest/v1/customers").unwrap().as_str(),
            "https://abc.supabase.co/rest/v1/customers"
        );

        let nested = parse_backend_url("http://localhost:54321/project").unwrap();
        assert_eq!(
            nested.join("auth/v1/user").unwrap().as_str(),
            "http://localhost:54321/project/auth/v1/user"
        );
    }

    #[test]
    fn test_parse_backend_url_rejects_other_schemes() {
        assert!(matches!(
            parse_backend_url("ftp://abc.supabase.co"),
            Err(ConfigError::InvalidEnvVar(..))
        ));
        assert!(parse_backend_url("not a url").is_err());
    }

    #[test]
    fn test_shannon_entropy() {
        assert!(shannon_entropy("").abs() < f64::EPSILON);
        assert!(shannon_entropy("aaaa").abs() < f64::EPSILON);
        assert!((shannon_entropy("abcd") - 2.0).abs() < 0.001);
    }

    #[test]
    fn test_validate_api_key() {
        assert!(validate_api_key("sb_4fQz9Lm2Xr7Tn1Vb8Kw3Hd6Pj0Yc5Ge", "K").is_ok());
        assert!(matches!(
            validate_api_key("short", "K"),
            Err(ConfigError::InsecureSecret(..))
        ));
        assert!(matches!(
            validate_api_key("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaa", "K"),
            Err(ConfigError::InsecureSecret(..))
        ));
    }

    #[test]
    fn test_validate_api_key_accepts_issued_key_substrings() {
        // Random provider keys can contain "xxx" or "todo" after lowercasing
        assert!(validate_api_key("eyJhbGciOiJIUzI1NiJ9.xXxQ7mTodoP4vK2nR8wLs", "K").is_ok());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config = BackendConfig {
            url: parse_backend_url("https://abc.supabase.co").unwrap(),
            api_key: SecretString::from("sb_secret_value".to_owned()),
            timeout: Duration::from_secs(5),
        };
        let debug = format!("{config:?}");
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("sb_secret_value"));
    }
}
