//! Configuration loading and validation.
//!
//! Loads from `./courier.toml` (or `$COURIER_CONFIG_PATH`). Environment
//! variables override file values; file values override defaults.
//!
//! Precedence: env vars > config file > defaults.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::messaging::retry::RetryPolicy;
use crate::providers::sendgrid::SENDGRID_API_BASE;

// ── Top-level config ────────────────────────────────────────────

/// Top-level courier configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CourierConfig {
    /// SQLite settings (`[database]`).
    pub database: DatabaseConfig,
    /// Provider retry settings (`[retry]`).
    pub retry: RetryConfig,
    /// Provider selection and credentials (`[providers]`).
    pub providers: ProvidersConfig,
    /// Log level and directory (`[logging]`).
    pub logging: LoggingConfig,
}

impl CourierConfig {
    /// Load with precedence env vars > TOML file > defaults, then validate.
    ///
    /// A missing config file is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if the
    /// merged configuration is invalid.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from_file()?;
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    fn load_from_file() -> Result<Self> {
        let path = Self::config_path_with(|key| std::env::var(key).ok());
        match std::fs::read_to_string(&path) {
            Ok(contents) => {
                tracing::info!(path = %path.display(), "loading config from file");
                Self::from_toml(&contents)
                    .with_context(|| format!("invalid config file {}", path.display()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file found, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(anyhow::anyhow!(
                "failed to read config file {}: {e}",
                path.display()
            )),
        }
    }

    /// Resolve the config file path using a custom env resolver.
    pub fn config_path_with(env: impl Fn(&str) -> Option<String>) -> PathBuf {
        env("COURIER_CONFIG_PATH").map_or_else(|| PathBuf::from("courier.toml"), PathBuf::from)
    }

    /// Apply environment variable overrides.
    ///
    /// Takes a resolver so tests never touch the process environment.
    /// Unparseable numeric or enum values are ignored with a warning.
    pub fn apply_overrides(&mut self, env: impl Fn(&str) -> Option<String>) {
        // Database.
        if let Some(v) = env("COURIER_DB_PATH") {
            self.database.path = v;
        }
        override_parsed(&env, "COURIER_DB_MAX_CONNECTIONS", &mut self.database.max_connections);

        // Retry.
        override_parsed(&env, "COURIER_MAX_RETRIES", &mut self.retry.max_retries);
        override_parsed(&env, "COURIER_RETRY_BASE_DELAY_MS", &mut self.retry.base_delay_ms);
        override_parsed(&env, "COURIER_RETRY_MAX_DELAY_MS", &mut self.retry.max_delay_ms);

        // Providers.
        if let Some(v) = env("COURIER_EMAIL_PROVIDER") {
            match EmailProviderKind::parse(&v) {
                Some(kind) => self.providers.email = kind,
                None => tracing::warn!(
                    var = "COURIER_EMAIL_PROVIDER",
                    value = %v,
                    "ignoring invalid env override"
                ),
            }
        }
        if let Some(v) = env("SENDGRID_API_KEY").filter(|v| !v.is_empty()) {
            self.providers.sendgrid_api_key = Some(v);
        }

        // Logging.
        if let Some(v) = env("COURIER_LOG_LEVEL") {
            self.logging.level = v;
        }
        if let Some(v) = env("COURIER_LOG_DIR") {
            self.logging.dir = v;
        }
    }

    /// Reject settings the service cannot run with.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first invalid setting.
    pub fn validate(&self) -> Result<()> {
        if self.database.path.trim().is_empty() {
            anyhow::bail!("database.path cannot be empty");
        }
        if self.database.max_connections == 0 {
            anyhow::bail!("database.max_connections must be at least 1");
        }
        if self.retry.max_delay_ms == 0 {
            anyhow::bail!("retry.max_delay_ms must be positive");
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            anyhow::bail!(
                "retry.base_delay_ms ({}) exceeds retry.max_delay_ms ({})",
                self.retry.base_delay_ms,
                self.retry.max_delay_ms
            );
        }
        if self.retry.multiplier.is_nan() || self.retry.multiplier < 1.0 {
            anyhow::bail!("retry.multiplier must be at least 1.0");
        }
        if self.providers.email == EmailProviderKind::Sendgrid
            && self
                .providers
                .sendgrid_api_key
                .as_deref()
                .map_or(true, |k| k.trim().is_empty())
        {
            anyhow::bail!("providers.email = \"sendgrid\" requires sendgrid_api_key");
        }
        if self.providers.request_timeout_secs == 0 {
            anyhow::bail!("providers.request_timeout_secs must be positive");
        }
        Ok(())
    }

    /// Parse a TOML string into config (no env overrides, no validation).
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is malformed or has wrongly typed fields.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str).context("failed to parse config TOML")
    }
}

fn override_parsed<T: std::str::FromStr>(
    env: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    target: &mut T,
) {
    if let Some(v) = env(var) {
        match v.trim().parse() {
            Ok(n) => *target = n,
            Err(_) => tracing::warn!(var, value = %v, "ignoring invalid env override"),
        }
    }
}

// ── Database ────────────────────────────────────────────────────

/// SQLite settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Database file; parent directories are created on open.
    pub path: String,
    /// Pool size.
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "courier.db".to_string(),
            max_connections: 5,
        }
    }
}

// ── Retry ───────────────────────────────────────────────────────

/// Provider retry settings, in milliseconds.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub base_delay_ms: u64,
    /// Cap for any single delay.
    pub max_delay_ms: u64,
    /// Backoff growth factor.
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 60_000,
            multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// The equivalent [`RetryPolicy`].
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            multiplier: self.multiplier,
        }
    }
}

// ── Providers ───────────────────────────────────────────────────

/// Which email transport to build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmailProviderKind {
    /// Recording mock.
    #[default]
    Mock,
    /// SendGrid v3 HTTP API.
    Sendgrid,
}

impl EmailProviderKind {
    /// Parse a case-insensitive provider name.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mock" => Some(Self::Mock),
            "sendgrid" => Some(Self::Sendgrid),
            _ => None,
        }
    }
}

/// Provider selection and credentials.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    /// Email transport.
    pub email: EmailProviderKind,
    /// SendGrid API key.
    pub sendgrid_api_key: Option<String>,
    /// SendGrid API base URL.
    pub sendgrid_base_url: String,
    /// HTTP request timeout for provider calls.
    pub request_timeout_secs: u64,
}

impl std::fmt::Debug for ProvidersConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProvidersConfig")
            .field("email", &self.email)
            .field(
                "sendgrid_api_key",
                &self.sendgrid_api_key.as_ref().map(|_| "__REDACTED__"),
            )
            .field("sendgrid_base_url", &self.sendgrid_base_url)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            email: EmailProviderKind::Mock,
            sendgrid_api_key: None,
            sendgrid_base_url: SENDGRID_API_BASE.to_string(),
            request_timeout_secs: 30,
        }
    }
}

// ── Logging ─────────────────────────────────────────────────────

/// Logging settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset.
    pub level: String,
    /// Directory for rotated JSON logs.
    pub dir: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            dir: "logs".to_string(),
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────
