//! Messaging core: validation, provider retries, conversation resolution,
//! inbound idempotency, and conversation queries.
//!
//! # Write ordering
//!
//! Providers are always called before any database write, so no store
//! connection is held across a provider call or a backoff sleep. A send whose
//! provider call succeeded but whose write failed surfaces as
//! [`MessagingError::SentButNotRecorded`]; there is no compensating action.

pub mod contacts;
pub mod conversations;
pub mod retry;
pub mod service;
pub mod telemetry;
pub mod validate;

use std::future::Future;

use tokio_util::sync::CancellationToken;

use crate::providers::ProviderError;
use crate::store::StoreError;

/// Errors from the messaging subsystem.
#[derive(Debug, thiserror::Error)]
pub enum MessagingError {
    /// The request failed validation. Nothing was sent or written.
    #[error("invalid request: {field}: {reason}")]
    InvalidRequest {
        /// Offending field.
        field: &'static str,
        /// What was wrong with it.
        reason: String,
    },

    /// The provider failed (non-retryable, or retries exhausted). Nothing
    /// was written.
    #[error("provider failed: {0}")]
    Provider(#[from] ProviderError),

    /// Retries ran out without a provider error being captured.
    #[error("max retries exceeded")]
    RetriesExhausted,

    /// The requested conversation does not exist.
    #[error("conversation not found: {0}")]
    NotFound(i64),

    /// A store read or write failed before any external action.
    #[error("persistence failed: {0}")]
    Persistence(#[from] StoreError),

    /// The provider accepted the message but recording it failed.
    #[error("message sent but not recorded: {0}")]
    SentButNotRecorded(#[source] StoreError),

    /// The caller cancelled the operation.
    #[error("operation cancelled")]
    Cancelled,
}

impl MessagingError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidRequest {
            field,
            reason: reason.into(),
        }
    }

    /// Whether the caller is at fault (a 4xx-style failure).
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::InvalidRequest { .. } | Self::NotFound(_))
    }

    /// Whether an external side effect already happened despite the error.
    pub fn side_effect_taken(&self) -> bool {
        matches!(self, Self::SentButNotRecorded(_))
    }
}

/// Run `fut` unless `cancel` fires first.
///
/// # Errors
///
/// Returns [`MessagingError::Cancelled`] if the token is (or becomes)
/// cancelled before `fut` completes; `fut` is dropped in that case.
pub(crate) async fn cancellable<T, E>(
    cancel: &CancellationToken,
    fut: impl Future<Output = Result<T, E>>,
) -> Result<T, MessagingError>
where
    MessagingError: From<E>,
{
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(MessagingError::Cancelled),
        result = fut => result.map_err(MessagingError::from),
    }
}
