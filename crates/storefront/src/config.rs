//! Storefront client configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `ATELIER_BACKEND_URL` - Base URL of the commerce backend (e.g., `https://api.atelier.example`)
//! - `ATELIER_PUBLISHABLE_KEY` - Backend publishable API key
//!
//! ## Optional
//! - `ATELIER_SITE_URL` - Public storefront URL used for sitemap entries (default: `http://localhost:3000`)
//! - `ATELIER_REGION_ID` - Region assigned to newly created carts
//! - `ATELIER_STORAGE_DIR` - Directory for persisted client state (default: `.atelier`)
//! - `ATELIER_PAYMENT_URL` - Payment processor API base (default: `https://api.stripe.com`)
//! - `ATELIER_PAYMENT_PUBLISHABLE_KEY` - Payment processor publishable key
//! - `ATELIER_PAYMENT_PROVIDER` - Backend payment provider ID (default: `pp_stripe_stripe`)
//! - `ATELIER_MAX_RETRIES` - Query retries for network errors (default: 3)
//! - `ATELIER_REQUEST_TIMEOUT_SECS` - HTTP timeout (default: 30)
//! - `ATELIER_CART_STALE_SECS` - Cart staleness window (default: 30)
//! - `ATELIER_WISHLIST_STALE_SECS` - Wishlist staleness window (default: 60)
//! - `ATELIER_SESSION_STALE_SECS` - Auth session staleness window (default: 300)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "enter-",
    "put-your",
    "add-your",
];

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

/// Storefront client configuration.
#[derive(Debug, Clone)]
pub struct StorefrontConfig {
    /// Commerce backend configuration
    pub backend: BackendConfig,
    /// Payment processor configuration
    pub payment: PaymentConfig,
    /// Query cache policy
    pub query: QueryConfig,
    /// Public base URL for the storefront
    pub site_url: String,
    /// Directory holding persisted client state
    pub storage_dir: PathBuf,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment name
    pub sentry_environment: Option<String>,
}

/// Commerce backend configuration.
///
/// Implements `Debug` manually to redact the publishable key.
#[derive(Clone)]
pub struct BackendConfig {
    /// Base URL, without trailing slash
    pub base_url: String,
    /// Publishable API key sent with every request
    pub publishable_key: SecretString,
    /// Region assigned to new carts
    pub region_id: Option<String>,
    /// HTTP request timeout
    pub timeout: Duration,
}

impl std::fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendConfig")
            .field("base_url", &self.base_url)
            .field("publishable_key", &"[REDACTED]")
            .field("region_id", &self.region_id)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Payment processor configuration.
#[derive(Clone)]
pub struct PaymentConfig {
    /// Processor API base URL
    pub api_url: String,
    /// Processor publishable key (client-side confirmation)
    pub publishable_key: Option<SecretString>,
    /// Backend payment provider used when initiating payment sessions
    pub provider_id: String,
}

impl std::fmt::Debug for PaymentConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentConfig")
            .field("api_url", &self.api_url)
            .field(
                "publishable_key",
                &self.publishable_key.as_ref().map(|_| "[REDACTED]"),
            )
            .field("provider_id", &self.provider_id)
            .finish()
    }
}

/// Query cache staleness and retry policy.
#[derive(Debug, Clone)]
pub struct QueryConfig {
    /// Cart staleness window
    pub cart_stale: Duration,
    /// Wishlist staleness window
    pub wishlist_stale: Duration,
    /// Auth session staleness window
    pub session_stale: Duration,
    /// Idle time after which an unused cache entry is dropped
    pub gc_time: Duration,
    /// Retries for retryable fetch errors
    pub max_retries: u32,
    /// Base delay for exponential retry backoff
    pub retry_base_delay: Duration,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            cart_stale: Duration::from_secs(30),
            wishlist_stale: Duration::from_secs(60),
            session_stale: Duration::from_secs(300),
            gc_time: Duration::from_secs(300),
            max_retries: 3,
            retry_base_delay: Duration::from_millis(500),
        }
    }
}

impl StorefrontConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if the publishable key looks like a placeholder.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let backend = BackendConfig::from_env()?;
        let payment = PaymentConfig::from_env()?;
        let query = QueryConfig::from_env()?;
        let site_url = get_env_or_default("ATELIER_SITE_URL", "http://localhost:3000")
            .trim_end_matches('/')
            .to_string();
        validate_url(&site_url, "ATELIER_SITE_URL")?;
        let storage_dir = PathBuf::from(get_env_or_default("ATELIER_STORAGE_DIR", ".atelier"));

        Ok(Self {
            backend,
            payment,
            query,
            site_url,
            storage_dir,
            sentry_dsn: get_optional_env("SENTRY_DSN"),
            sentry_environment: get_optional_env("SENTRY_ENVIRONMENT"),
        })
    }
}

impl BackendConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let base_url = get_required_env("ATELIER_BACKEND_URL")?
            .trim_end_matches('/')
            .to_string();
        validate_url(&base_url, "ATELIER_BACKEND_URL")?;

        Ok(Self {
            base_url,
            publishable_key: get_validated_secret("ATELIER_PUBLISHABLE_KEY")?,
            region_id: get_optional_env("ATELIER_REGION_ID"),
            timeout: Duration::from_secs(get_parsed_or_default(
                "ATELIER_REQUEST_TIMEOUT_SECS",
                30,
            )?),
        })
    }
}

impl PaymentConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let publishable_key = match get_optional_env("ATELIER_PAYMENT_PUBLISHABLE_KEY") {
            Some(value) => {
                validate_not_placeholder(&value, "ATELIER_PAYMENT_PUBLISHABLE_KEY")?;
                Some(SecretString::from(value))
            }
            None => None,
        };

        Ok(Self {
            api_url: get_env_or_default("ATELIER_PAYMENT_URL", "https://api.stripe.com")
                .trim_end_matches('/')
                .to_string(),
            publishable_key,
            provider_id: get_env_or_default("ATELIER_PAYMENT_PROVIDER", "pp_stripe_stripe"),
        })
    }
}

impl QueryConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            cart_stale: Duration::from_secs(get_parsed_or_default("ATELIER_CART_STALE_SECS", 30)?),
            wishlist_stale: Duration::from_secs(get_parsed_or_default(
                "ATELIER_WISHLIST_STALE_SECS",
                60,
            )?),
            session_stale: Duration::from_secs(get_parsed_or_default(
                "ATELIER_SESSION_STALE_SECS",
                300,
            )?),
            max_retries: get_parsed_or_default("ATELIER_MAX_RETRIES", 3)?,
            ..defaults
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get an optional environment variable. Empty values count as unset.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    get_optional_env(key).unwrap_or_else(|| default.to_string())
}

/// Parse an optional environment variable, falling back to `default`.
fn get_parsed_or_default<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    get_optional_env(key).map_or(Ok(default), |raw| {
        raw.trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
    })
}

/// Validate that a value parses as an absolute http(s) URL.
fn validate_url(value: &str, var_name: &str) -> Result<(), ConfigError> {
    let url = url::Url::parse(value)
        .map_err(|e| ConfigError::InvalidEnvVar(var_name.to_string(), e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidEnvVar(
            var_name.to_string(),
            format!("unsupported scheme '{}'", url.scheme()),
        ));
    }
    Ok(())
}

/// Reject values that look like copied placeholders from `.env.example`.
fn validate_not_placeholder(value: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = value.to_lowercase();

    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    Ok(())
}

/// Load and validate a key from environment.
fn get_validated_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    validate_not_placeholder(&value, key)?;
    Ok(SecretString::from(value))
}
