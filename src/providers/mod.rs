//! Messaging provider abstraction layer.
//!
//! Defines the [`SmsSender`] and [`EmailSender`] traits and the shared
//! [`ProviderError`] taxonomy the retry engine classifies.
//!
//! Two implementations ship:
//! - [`mock`]: recording senders with scriptable failures
//! - [`sendgrid::SendGridEmailSender`]: SendGrid v3 `mail/send` API

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;

use crate::config::{EmailProviderKind, ProvidersConfig};

pub mod mock;
pub mod sendgrid;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// HTTP-style status codes that signal a transient provider condition.
const RETRYABLE_CODES: [u16; 5] = [429, 500, 502, 503, 504];

/// Errors returned by messaging providers.
///
/// Codes follow HTTP status semantics even for providers that are not
/// HTTP-based.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    /// Provider rejected or failed the request with a status code.
    #[error("provider error {code}: {message}")]
    Status {
        /// HTTP-style status code.
        code: u16,
        /// Provider-supplied description.
        message: String,
        /// Provider hint for when to retry, in seconds (rate limits).
        retry_after_secs: Option<u64>,
    },
    /// The request never produced a status (connection, encoding, ...).
    #[error("provider transport failure: {0}")]
    Transport(String),
}

impl ProviderError {
    /// Shorthand for a status error without a retry hint.
    pub fn status(code: u16, message: impl Into<String>) -> Self {
        Self::Status {
            code,
            message: message.into(),
            retry_after_secs: None,
        }
    }

    /// Status code, if the provider returned one.
    pub fn code(&self) -> Option<u16> {
        match self {
            Self::Status { code, .. } => Some(*code),
            Self::Transport(_) => None,
        }
    }

    /// Whether the failure is transient (429, 500, 502, 503, 504).
    pub fn is_retryable(&self) -> bool {
        self.code().is_some_and(|c| RETRYABLE_CODES.contains(&c))
    }

    /// Provider retry hint. Only honoured for 429 responses.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Status {
                code: 429,
                retry_after_secs: Some(secs),
                ..
            } if *secs > 0 => Some(Duration::from_secs(*secs)),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// SMS/MMS transport.
#[async_trait]
pub trait SmsSender: Send + Sync {
    /// Send a plain text message.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] when the provider rejects or fails the send.
    async fn send_sms(&self, from: &str, to: &str, body: &str) -> Result<(), ProviderError>;

    /// Send a multimedia message.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] when the provider rejects or fails the send.
    async fn send_mms(
        &self,
        from: &str,
        to: &str,
        body: &str,
        attachments: &[String],
    ) -> Result<(), ProviderError>;
}

/// Email transport.
#[async_trait]
pub trait EmailSender: Send + Sync {
    /// Send an email.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] when the provider rejects or fails the send.
    async fn send_email(
        &self,
        from: &str,
        to: &str,
        body: &str,
        attachments: &[String],
    ) -> Result<(), ProviderError>;
}

// ---------------------------------------------------------------------------
// Factory
// ---------------------------------------------------------------------------

/// Build the configured email sender.
///
/// # Errors
///
/// Returns an error if the SendGrid client cannot be constructed.
pub fn build_email_sender(config: &ProvidersConfig) -> anyhow::Result<Arc<dyn EmailSender>> {
    match config.email {
        EmailProviderKind::Mock => Ok(Arc::new(mock::MockEmailSender::new())),
        EmailProviderKind::Sendgrid => {
            let api_key = config
                .sendgrid_api_key
                .clone()
                .ok_or_else(|| anyhow::anyhow!("sendgrid provider requires an API key"))?;
            let sender = sendgrid::SendGridEmailSender::new(
                api_key,
                &config.sendgrid_base_url,
                Duration::from_secs(config.request_timeout_secs),
            )?;
            Ok(Arc::new(sender))
        }
    }
}

// ---------------------------------------------------------------------------
// HTTP helpers
// ---------------------------------------------------------------------------

/// Map an HTTP response to `Ok(())` or a [`ProviderError::Status`].
///
/// The `Retry-After` header (seconds form) is carried into the error.
///
/// # Errors
///
/// Returns `ProviderError::Status` on non-2xx, `ProviderError::Transport` if
/// the body cannot be read.
pub async fn check_http_response(response: reqwest::Response) -> Result<(), ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    let retry_after_secs = response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok());
    let body = response
        .text()
        .await
        .map_err(|e| ProviderError::Transport(e.to_string()))?;
    Err(ProviderError::Status {
        code: status.as_u16(),
        message: sanitize_http_error_body(&body),
        retry_after_secs,
    })
}

/// Collapse whitespace, redact credentials, and truncate a provider error body.
pub fn sanitize_http_error_body(raw: &str) -> String {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");

    let mut sanitized = collapsed;
    for pattern in [r"SG\.[A-Za-z0-9_\-]{16,}\.[A-Za-z0-9_\-]{16,}", r"Bearer [A-Za-z0-9_\-\.]{16,}"] {
        if let Ok(regex) = Regex::new(pattern) {
            sanitized = regex.replace_all(&sanitized, "[REDACTED]").into_owned();
        }
    }

    const MAX_ERROR_BODY_CHARS: usize = 256;
    if sanitized.chars().count() > MAX_ERROR_BODY_CHARS {
        let shortened = sanitized
            .chars()
            .take(MAX_ERROR_BODY_CHARS)
            .collect::<String>();
        return format!("{shortened}...[truncated]");
    }

    sanitized
}
