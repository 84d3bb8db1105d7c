//! Observability port for the messaging core.
//!
//! The core reports what happened through an injected [`Telemetry`] sink
//! instead of reaching for a global. [`TracingTelemetry`] forwards events to
//! `tracing`; [`RecordingTelemetry`] keeps them for assertions.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::types::{Direction, MessageType};

/// Something the messaging core wants observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TelemetryEvent {
    /// A provider call was made. `attempt` is zero-based.
    ProviderAttempt {
        /// Zero-based attempt number.
        attempt: u32,
        /// Whether the provider accepted the message.
        succeeded: bool,
    },
    /// A retryable failure was seen and the engine is about to wait.
    RetryScheduled {
        /// Attempt that just failed, zero-based.
        attempt: u32,
        /// Wait before the next attempt.
        delay: Duration,
        /// Status code of the failure, if any.
        code: Option<u16>,
    },
    /// A message row was written.
    MessageRecorded {
        /// Stored message id.
        message_id: i64,
        /// Owning conversation.
        conversation_id: i64,
        /// Outbound send or inbound webhook.
        direction: Direction,
        /// Channel.
        message_type: MessageType,
    },
    /// An inbound webhook replayed an already-recorded provider id.
    DuplicateSuppressed {
        /// The replayed provider message id.
        provider_message_id: String,
    },
    /// A contact pair was resolved to a conversation.
    ConversationResolved {
        /// Conversation id.
        conversation_id: i64,
    },
}

/// Sink for [`TelemetryEvent`]s.
pub trait Telemetry: Send + Sync {
    /// Observe one event. Must not block.
    fn record(&self, event: TelemetryEvent);
}

/// Emits every event as a structured `tracing` record.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingTelemetry;

impl Telemetry for TracingTelemetry {
    fn record(&self, event: TelemetryEvent) {
        match event {
            TelemetryEvent::ProviderAttempt { attempt, succeeded } => {
                debug!(attempt, succeeded, "provider attempt");
            }
            TelemetryEvent::RetryScheduled {
                attempt,
                delay,
                code,
            } => {
                warn!(
                    attempt,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    code = ?code,
                    "retryable provider failure, backing off"
                );
            }
            TelemetryEvent::MessageRecorded {
                message_id,
                conversation_id,
                direction,
                message_type,
            } => {
                info!(
                    message_id,
                    conversation_id,
                    direction = direction.as_str(),
                    message_type = message_type.as_str(),
                    "message recorded"
                );
            }
            TelemetryEvent::DuplicateSuppressed {
                provider_message_id,
            } => {
                info!(provider_message_id, "duplicate inbound webhook ignored");
            }
            TelemetryEvent::ConversationResolved { conversation_id } => {
                debug!(conversation_id, "conversation resolved");
            }
        }
    }
}

/// Keeps events in memory.
#[derive(Debug, Default)]
pub struct RecordingTelemetry {
    events: Mutex<Vec<TelemetryEvent>>,
}

impl RecordingTelemetry {
    /// Empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything recorded so far.
    pub fn events(&self) -> Vec<TelemetryEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Delays of every scheduled retry, in order.
    pub fn retry_delays(&self) -> Vec<Duration> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                TelemetryEvent::RetryScheduled { delay, .. } => Some(delay),
                _ => None,
            })
            .collect()
    }
}

impl Telemetry for RecordingTelemetry {
    fn record(&self, event: TelemetryEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}
