//! Recording mock senders.
//!
//! Used as the default SMS transport and in tests. Failures can be scripted
//! per attempt ([`MockSmsSender::with_failures`]) or made permanent
//! ([`MockSmsSender::with_error_code`], [`MockSmsSender::failing_with`]).

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::trace;

use super::{EmailSender, ProviderError, SmsSender};

/// A message accepted by a mock sender.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    /// Sender address.
    pub from: String,
    /// Recipient address.
    pub to: String,
    /// Body.
    pub body: String,
    /// Attachment URIs.
    pub attachments: Vec<String>,
    /// When the mock accepted it.
    pub sent_at: DateTime<Utc>,
}

/// Canned error for a status code, matching what real providers report.
///
/// 500 and 429 produce status errors (429 carries a 30 second hint); any
/// other code produces a transport failure.
pub fn error_for_code(code: u16, channel: &str) -> ProviderError {
    match code {
        500 => ProviderError::status(500, "Internal server error"),
        429 => ProviderError::Status {
            code: 429,
            message: "Too many requests".to_owned(),
            retry_after_secs: Some(30),
        },
        _ => ProviderError::Transport(format!("mock {channel} provider failure")),
    }
}

#[derive(Debug, Default)]
struct MockState {
    sent: Vec<SentMessage>,
    attempts: usize,
    scripted: VecDeque<ProviderError>,
    permanent: Option<ProviderError>,
}

/// Shared bookkeeping for both mock channels.
#[derive(Debug, Default)]
struct MockTransport {
    state: Mutex<MockState>,
}

impl MockTransport {
    fn with_state(state: MockState) -> Self {
        Self {
            state: Mutex::new(state),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn attempt(
        &self,
        from: &str,
        to: &str,
        body: &str,
        attachments: &[String],
    ) -> Result<(), ProviderError> {
        let mut state = self.lock();
        state.attempts = state.attempts.saturating_add(1);
        if let Some(err) = state.permanent.clone() {
            return Err(err);
        }
        if let Some(err) = state.scripted.pop_front() {
            return Err(err);
        }
        state.sent.push(SentMessage {
            from: from.to_owned(),
            to: to.to_owned(),
            body: body.to_owned(),
            attachments: attachments.to_vec(),
            sent_at: Utc::now(),
        });
        trace!(to, "mock send accepted");
        Ok(())
    }
}

macro_rules! mock_sender_api {
    ($ty:ident, $channel:literal) => {
        impl $ty {
            /// A sender that accepts everything.
            pub fn new() -> Self {
                Self::default()
            }

            /// A sender that fails every attempt with the canned error for `code`.
            pub fn with_error_code(code: u16) -> Self {
                Self::failing_with(error_for_code(code, $channel))
            }

            /// A sender that fails every attempt with `error`.
            pub fn failing_with(error: ProviderError) -> Self {
                Self {
                    inner: MockTransport::with_state(MockState {
                        permanent: Some(error),
                        ..MockState::default()
                    }),
                }
            }

            /// A sender that fails with each error in turn, then succeeds.
            pub fn with_failures(errors: impl IntoIterator<Item = ProviderError>) -> Self {
                Self {
                    inner: MockTransport::with_state(MockState {
                        scripted: errors.into_iter().collect(),
                        ..MockState::default()
                    }),
                }
            }

            /// Number of send attempts, successful or not.
            pub fn attempts(&self) -> usize {
                self.inner.lock().attempts
            }

            /// Messages accepted so far.
            pub fn sent(&self) -> Vec<SentMessage> {
                self.inner.lock().sent.clone()
            }

            /// Forget accepted messages and attempt counts.
            pub fn clear(&self) {
                let mut state = self.inner.lock();
                state.sent.clear();
                state.attempts = 0;
            }
        }
    };
}

/// Mock SMS/MMS transport.
#[derive(Debug, Default)]
pub struct MockSmsSender {
    inner: MockTransport,
}

mock_sender_api!(MockSmsSender, "SMS");

#[async_trait]
impl SmsSender for MockSmsSender {
    async fn send_sms(&self, from: &str, to: &str, body: &str) -> Result<(), ProviderError> {
        self.inner.attempt(from, to, body, &[])
    }

    async fn send_mms(
        &self,
        from: &str,
        to: &str,
        body: &str,
        attachments: &[String],
    ) -> Result<(), ProviderError> {
        self.inner.attempt(from, to, body, attachments)
    }
}

/// Mock email transport.
#[derive(Debug, Default)]
pub struct MockEmailSender {
    inner: MockTransport,
}

mock_sender_api!(MockEmailSender, "email");

#[async_trait]
impl EmailSender for MockEmailSender {
    async fn send_email(
        &self,
        from: &str,
        to: &str,
        body: &str,
        attachments: &[String],
    ) -> Result<(), ProviderError> {
        self.inner.attempt(from, to, body, attachments)
    }
}
