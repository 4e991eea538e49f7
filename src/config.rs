//! Application configuration loaded from environment variables.
//!
//! A `.env` file is honoured for local development. Everything except the
//! Firebase web API key has a default that matches the production project.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Default PIN issuance backend.
pub const DEFAULT_PIN_API_BASE_URL: &str = "https://wildlife-tracker-gxz5.vercel.app";
/// Default Identity Toolkit endpoint.
pub const DEFAULT_IDENTITY_TOOLKIT_URL: &str = "https://identitytoolkit.googleapis.com";
/// Default Secure Token endpoint used to refresh ID tokens.
pub const DEFAULT_SECURE_TOKEN_URL: &str = "https://securetoken.googleapis.com";
/// Service worker version token handed to the app runtime loader.
pub const DEFAULT_SERVICE_WORKER_VERSION: &str = "3967701479";

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Firebase web API key (public, but required by Identity Toolkit)
    pub firebase_api_key: String,
    /// Firebase / GCP project ID
    pub firebase_project_id: String,
    /// Named Firestore database holding the `users` collection
    pub firestore_database_id: String,
    /// Base URL of the remote PIN API
    pub pin_api_base_url: String,
    /// Base URL of the Identity Toolkit REST API
    pub identity_toolkit_url: String,
    /// Base URL of the Secure Token API (ID token refresh)
    pub secure_token_url: String,
    /// Directory for the durable on-device store
    pub data_dir: PathBuf,

    /// Bound on every user-facing network await
    pub request_timeout: Duration,
    /// Bound on a single profile read or write
    pub profile_write_timeout: Duration,
    /// Bound on waiting for the identity provider to come up
    pub ready_timeout: Duration,
    /// Pause after "Sign in successful!" before launching the app
    pub success_delay: Duration,

    /// Maximum number of distinct queued profile writes
    pub queue_capacity: usize,
    /// Failed attempts before a queued write is dead-lettered
    pub queue_max_attempts: u32,

    /// Cache-busting token passed to the app runtime loader
    pub service_worker_version: String,
    /// Command that boots the embedded app runtime (no loader when unset)
    pub app_command: Option<String>,
    /// Pre-solved human verification token for phone sign-in
    pub recaptcha_token: Option<String>,
    /// Emit JSON logs instead of human-readable ones
    pub json_logs: bool,
}

impl Default for Config {
    /// Default config for testing only.
    fn default() -> Self {
        Self {
            firebase_api_key: "test_api_key".to_string(),
            firebase_project_id: "test-project".to_string(),
            firestore_database_id: "(default)".to_string(),
            pin_api_base_url: "http://127.0.0.1:9".to_string(),
            identity_toolkit_url: "http://127.0.0.1:9".to_string(),
            secure_token_url: "http://127.0.0.1:9".to_string(),
            data_dir: PathBuf::from(".kpr-auth-test"),
            request_timeout: Duration::from_secs(5),
            profile_write_timeout: Duration::from_secs(2),
            ready_timeout: Duration::from_secs(2),
            success_delay: Duration::ZERO,
            queue_capacity: 100,
            queue_max_attempts: 5,
            service_worker_version: DEFAULT_SERVICE_WORKER_VERSION.to_string(),
            app_command: None,
            recaptcha_token: None,
            json_logs: false,
        }
    }
}

impl Config {
    /// Test configuration with zero UX delays.
    pub fn test_default() -> Self {
        Self::default()
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        Ok(Self {
            firebase_api_key: env::var("FIREBASE_API_KEY")
                .map(|v| v.trim().to_string())
                .map_err(|_| ConfigError::Missing("FIREBASE_API_KEY"))?,
            firebase_project_id: env::var("FIREBASE_PROJECT_ID")
                .unwrap_or_else(|_| "wildlifetracker-4d28b".to_string()),
            firestore_database_id: env::var("FIRESTORE_DATABASE_ID")
                .unwrap_or_else(|_| "wildlifetracker-db".to_string()),
            pin_api_base_url: env::var("PIN_API_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_PIN_API_BASE_URL.to_string()),
            identity_toolkit_url: env::var("IDENTITY_TOOLKIT_URL")
                .unwrap_or_else(|_| DEFAULT_IDENTITY_TOOLKIT_URL.to_string()),
            secure_token_url: env::var("SECURE_TOKEN_URL")
                .unwrap_or_else(|_| DEFAULT_SECURE_TOKEN_URL.to_string()),
            data_dir: env::var("DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(".kpr-auth")),

            request_timeout: Duration::from_secs(env_number("REQUEST_TIMEOUT_SECS", 15)),
            profile_write_timeout: Duration::from_secs(env_number(
                "PROFILE_WRITE_TIMEOUT_SECS",
                10,
            )),
            ready_timeout: Duration::from_secs(env_number("READY_TIMEOUT_SECS", 30)),
            success_delay: Duration::from_millis(env_number("SUCCESS_DELAY_MS", 1000)),

            queue_capacity: env_number("PROFILE_QUEUE_CAPACITY", 100),
            queue_max_attempts: env_number("PROFILE_QUEUE_MAX_ATTEMPTS", 5),

            service_worker_version: env::var("APP_SERVICE_WORKER_VERSION")
                .unwrap_or_else(|_| DEFAULT_SERVICE_WORKER_VERSION.to_string()),
            app_command: non_empty_var("APP_COMMAND"),
            recaptcha_token: non_empty_var("RECAPTCHA_TOKEN"),
            json_logs: env::var("LOG_FORMAT")
                .map(|v| v.eq_ignore_ascii_case("json"))
                .unwrap_or(false),
        })
    }
}

/// Parse a numeric variable, falling back to `default` when unset or invalid.
fn env_number<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
}
