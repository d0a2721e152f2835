//! Server configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `CRAVECART_JWT_SECRET` - Access token signing secret (min 32 chars, high entropy)
//! - `CRAVECART_DATABASE_URL` - `PostgreSQL` connection string (falls back to
//!   `DATABASE_URL`; not needed with `CRAVECART_STORAGE=memory`)
//!
//! ## Optional
//! - `CRAVECART_STORAGE` - `postgres` (default) or `memory`
//! - `CRAVECART_HOST` - Bind address (default: 127.0.0.1)
//! - `CRAVECART_PORT` - Listen port (default: 4000)
//! - `CRAVECART_JWT_TTL_HOURS` - Access token lifetime (default: 168)
//! - `CRAVECART_CLIENT_URL` - Web client origin for CORS and payment redirects
//!   (default: <http://localhost:5173>)
//! - `PAYMENT_SECRET_KEY` - Gateway secret key; card payments are disabled without it
//! - `PAYMENT_API_BASE` - Gateway API base URL (default: <https://api.stripe.com>)
//! - `PAYMENT_CURRENCY` - ISO currency code sent to the gateway (default: usd)
//! - `PAYMENT_TIMEOUT_SECS` - Upper bound on a gateway call (default: 10)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Environment tag for Sentry events
//! - `SENTRY_SAMPLE_RATE` - Fraction of errors sent to Sentry (default: 1.0)
//! - `SENTRY_TRACES_SAMPLE_RATE` - Fraction of transactions traced (default: 0.0)

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;
use url::Url;

const MIN_JWT_SECRET_LENGTH: usize = 32;
const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "secret",
    "password",
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

/// Where orders, carts and promo codes are kept.
#[derive(Debug, Clone)]
pub enum StorageConfig {
    /// `PostgreSQL` (connection URL contains a password).
    Postgres { database_url: SecretString },
    /// Process-local store. Data is lost on restart.
    Memory,
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub storage: StorageConfig,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Web client origin, used for CORS and payment redirect URLs
    pub client_url: Url,
    /// Access token signing secret
    pub jwt_secret: SecretString,
    /// Access token lifetime
    pub jwt_ttl: Duration,
    /// Hosted checkout settings; `None` disables card payments
    pub payment: Option<PaymentConfig>,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    pub sentry_environment: Option<String>,
    pub sentry_sample_rate: f32,
    pub sentry_traces_sample_rate: f32,
}

/// Payment gateway configuration.
///
/// Implements `Debug` manually to redact the secret key.
#[derive(Clone)]
pub struct PaymentConfig {
    pub secret_key: SecretString,
    pub api_base: Url,
    /// Lower-case ISO 4217 code, e.g. `usd`
    pub currency: String,
    pub timeout: Duration,
}

impl std::fmt::Debug for PaymentConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentConfig")
            .field("secret_key", &"[REDACTED]")
            .field("api_base", &self.api_base.as_str())
            .field("currency", &self.currency)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if secrets fail validation (placeholder detection, entropy check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let storage = match get_env_or_default("CRAVECART_STORAGE", "postgres").as_str() {
            "postgres" => StorageConfig::Postgres {
                database_url: get_database_url("CRAVECART_DATABASE_URL")?,
            },
            "memory" => StorageConfig::Memory,
            other => {
                return Err(ConfigError::InvalidEnvVar(
                    "CRAVECART_STORAGE".to_string(),
                    format!("expected 'postgres' or 'memory', got '{other}'"),
                ));
            }
        };
        let host = parse_env("CRAVECART_HOST", "127.0.0.1")?;
        let port = parse_env("CRAVECART_PORT", "4000")?;
        let client_url = parse_env("CRAVECART_CLIENT_URL", "http://localhost:5173")?;

        let jwt_secret = get_validated_secret("CRAVECART_JWT_SECRET")?;
        validate_jwt_secret(&jwt_secret, "CRAVECART_JWT_SECRET")?;
        let jwt_ttl_hours: u64 = parse_env("CRAVECART_JWT_TTL_HOURS", "168")?;

        let payment = PaymentConfig::from_env()?;
        let sentry_dsn = get_optional_env("SENTRY_DSN");
        let sentry_environment = get_optional_env("SENTRY_ENVIRONMENT");
        let sentry_sample_rate = parse_env("SENTRY_SAMPLE_RATE", "1.0")?;
        let sentry_traces_sample_rate = parse_env("SENTRY_TRACES_SAMPLE_RATE", "0.0")?;

        Ok(Self {
            storage,
            host,
            port,
            client_url,
            jwt_secret,
            jwt_ttl: Duration::from_secs(jwt_ttl_hours * 3600),
            payment,
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
}

impl PaymentConfig {
    fn from_env() -> Result<Option<Self>, ConfigError> {
        let Some(raw_key) = get_optional_env("PAYMENT_SECRET_KEY") else {
            return Ok(None);
        };
        validate_secret_strength(&raw_key, "PAYMENT_SECRET_KEY")?;
        let timeout_secs: u64 = parse_env("PAYMENT_TIMEOUT_SECS", "10")?;

        Ok(Some(Self {
            secret_key: SecretString::from(raw_key),
            api_base: parse_env("PAYMENT_API_BASE", "https://api.stripe.com")?,
            currency: get_env_or_default("PAYMENT_CURRENCY", "usd").to_lowercase(),
            timeout: Duration::from_secs(timeout_secs),
        }))
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get database URL with fallback to generic `DATABASE_URL` (set by most managed Postgres add-ons).
fn get_database_url(primary_key: &str) -> Result<SecretString, ConfigError> {
    // Try primary key first (e.g., CRAVECART_DATABASE_URL)
    if let Ok(value) = std::env::var(primary_key) {
        return Ok(SecretString::from(value));
    }
    // Fallback to the generic name
    if let Ok(value) = std::env::var("DATABASE_URL") {
        return Ok(SecretString::from(value));
    }
    Err(ConfigError::MissingEnvVar(primary_key.to_string()))
}

/// Get an optional environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse an environment variable (or its default) into `T`.
fn parse_env<T>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    get_env_or_default(key, default)
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

/// Validate that a token signing secret meets minimum length requirements.
fn validate_jwt_secret(secret: &SecretString, var_name: &str) -> Result<(), ConfigError> {
    let value = secret.expose_secret();
    if value.len() < MIN_JWT_SECRET_LENGTH {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "must be at least {} characters (got {})",
                MIN_JWT_SECRET_LENGTH,
                value.len()
            ),
        ));
    }
    Ok(())
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
    let len = s.len() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)] // Character count will never exceed f64 precision
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    // Check blocklist
    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    // Check entropy (real secrets like API keys have high entropy)
    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1}). Use a randomly generated secret."
            ),
        ));
    }

    Ok(())
}

/// Load and validate a secret from environment.
fn get_validated_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    validate_secret_strength(&value, key)?;
    Ok(SecretString::from(value))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn entropy_of_uniform_and_repeated_strings() {
        assert!((shannon_entropy("") - 0.0).abs() < f64::EPSILON);
        assert!((shannon_entropy("aaaaaaa") - 0.0).abs() < f64::EPSILON);
        assert!((shannon_entropy("ab") - 1.0).abs() < 0.01);
        assert!(shannon_entropy("aB3$xY9!mK2@nL5#") > 3.3);
    }

    #[test]
    fn placeholder_secrets_are_rejected() {
        for placeholder in ["your-jwt-key-here", "changeme123", "REPLACE_ME_PLEASE"] {
            let err = validate_secret_strength(placeholder, "CRAVECART_JWT_SECRET").unwrap_err();
            assert!(matches!(err, ConfigError::InsecureSecret(_, _)));
        }
    }

    #[test]
    fn low_entropy_secret_is_rejected() {
        let result = validate_secret_strength(&"ab".repeat(20), "CRAVECART_JWT_SECRET");
        assert!(matches!(result, Err(ConfigError::InsecureSecret(_, _))));
    }

    #[test]
    fn random_secret_is_accepted() {
        assert!(validate_secret_strength("aB3$xY9!mK2@nL5#pQ7&rT0*uW4^zC6", "CRAVECART_JWT_SECRET").is_ok());
    }

    #[test]
    fn short_jwt_secret_is_rejected() {
        let short = SecretString::from("k2#Lm9");
        assert!(validate_jwt_secret(&short, "CRAVECART_JWT_SECRET").is_err());
        let long = SecretString::from("a".repeat(32));
        assert!(validate_jwt_secret(&long, "CRAVECART_JWT_SECRET").is_ok());
    }

    #[test]
    fn socket_addr_uses_host_and_port() {
        let config = ServerConfig {
            storage: StorageConfig::Memory,
            host: "0.0.0.0".parse().unwrap(),
            port: 4000,
            client_url: Url::parse("http://localhost:5173").unwrap(),
            jwt_secret: SecretString::from("x".repeat(32)),
            jwt_ttl: Duration::from_secs(3600),
            payment: None,
            sentry_dsn: None,
            sentry_environment: None,
            sentry_sample_rate: 1.0,
            sentry_traces_sample_rate: 0.0,
        };

        let addr = config.socket_addr();
        assert_eq!(addr.to_string(), "0.0.0.0:4000");
    }

    #[test]
    fn payment_debug_redacts_key() {
        let payment = PaymentConfig {
            secret_key: SecretString::from("sk_test_51HqzLkq9vG3n"),
            api_base: Url::parse("https://api.stripe.com").unwrap(),
            currency: "inr".to_string(),
            timeout: Duration::from_secs(10),
        };

        let debug_output = format!("{payment:?}");
        assert!(debug_output.contains("api.stripe.com"));
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("sk_test_51HqzLkq9vG3n"));
    }

    #[test]
    fn parse_env_reports_the_variable() {
        let err = parse_env::<u16>("CRAVECART_TEST_UNSET_PORT", "not-a-port").unwrap_err();
        assert!(err.to_string().contains("CRAVECART_TEST_UNSET_PORT"));
    }
}
