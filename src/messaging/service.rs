//! Message orchestration: outbound sends and inbound webhooks.
//!
//! Outbound: validate, call the provider under the retry engine, then resolve
//! the conversation and record a `pending` message. A failed send writes
//! nothing.
//!
//! Inbound: validate, look the provider message id up, then resolve the
//! conversation and record a `delivered` message. Replays of a recorded
//! provider id succeed without writing.

use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use super::contacts::canonical_pair;
use super::retry::{RetryEngine, RetryPolicy};
use super::telemetry::{Telemetry, TelemetryEvent, TracingTelemetry};
use super::validate::{
    validate_email_request, validate_inbound_email, validate_inbound_sms, validate_sms_request,
    Validated,
};
use super::{cancellable, MessagingError};
use crate::providers::{EmailSender, SmsSender};
use crate::store::{ConversationStore, MessageStore, StoreError};
use crate::types::{
    Conversation, Direction, InboundEmailWebhook, InboundSmsWebhook, Message, MessageStatus,
    MessageType, NewMessage, SendEmailRequest, SendSmsRequest,
};

/// Result of handling an inbound webhook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundOutcome {
    /// A new message row was written.
    Recorded(Message),
    /// The provider id was already recorded; nothing was written.
    Duplicate(Message),
}

impl InboundOutcome {
    /// The stored message, new or pre-existing.
    pub fn message(&self) -> &Message {
        match self {
            Self::Recorded(message) | Self::Duplicate(message) => message,
        }
    }

    /// Whether the webhook was a replay.
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::Duplicate(_))
    }
}

/// The fields shared by every message about to be recorded.
struct Draft<'a> {
    from: &'a str,
    to: &'a str,
    body: &'a str,
    attachments: &'a [String],
    validated: Validated,
    provider_id: Option<&'a str>,
}

/// Orchestrates sends and webhooks over injected stores and providers.
pub struct MessagingService {
    conversations: Arc<dyn ConversationStore>,
    messages: Arc<dyn MessageStore>,
    sms: Arc<dyn SmsSender>,
    email: Arc<dyn EmailSender>,
    retry: RetryEngine,
    telemetry: Arc<dyn Telemetry>,
}

impl std::fmt::Debug for MessagingService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessagingService")
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl MessagingService {
    /// Service with the default retry policy, reporting through `tracing`.
    pub fn new(
        conversations: Arc<dyn ConversationStore>,
        messages: Arc<dyn MessageStore>,
        sms: Arc<dyn SmsSender>,
        email: Arc<dyn EmailSender>,
    ) -> Self {
        let telemetry: Arc<dyn Telemetry> = Arc::new(TracingTelemetry);
        Self {
            conversations,
            messages,
            sms,
            email,
            retry: RetryEngine::new(RetryPolicy::default(), Arc::clone(&telemetry)),
            telemetry,
        }
    }

    /// Replace the retry policy.
    #[must_use]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = RetryEngine::new(policy, Arc::clone(&self.telemetry));
        self
    }

    /// Replace the telemetry sink (also used by the retry engine).
    #[must_use]
    pub fn with_telemetry(mut self, telemetry: Arc<dyn Telemetry>) -> Self {
        self.retry = RetryEngine::new(*self.retry.policy(), Arc::clone(&telemetry));
        self.telemetry = telemetry;
        self
    }

    /// Send an SMS or MMS and record it as `pending`.
    ///
    /// `cancel` covers validation, the provider call and its backoff. Once the
    /// provider has accepted the message the write runs to completion, so a
    /// late cancellation cannot leave a delivered message unrecorded.
    ///
    /// # Errors
    ///
    /// - [`MessagingError::InvalidRequest`] if validation fails
    /// - [`MessagingError::Provider`] if the provider fails for good
    /// - [`MessagingError::SentButNotRecorded`] if the send went out but the
    ///   write failed
    /// - [`MessagingError::Cancelled`] if cancelled before the send completed
    pub async fn send_sms(
        &self,
        request: &SendSmsRequest,
        cancel: &CancellationToken,
    ) -> Result<Message, MessagingError> {
        let validated = validate_sms_request(request, Utc::now())?;

        let sms = Arc::clone(&self.sms);
        self.retry
            .execute(cancel, || {
                let sms = Arc::clone(&sms);
                async move {
                    match validated.message_type {
                        MessageType::Mms => {
                            sms.send_mms(
                                &request.from,
                                &request.to,
                                &request.body,
                                &request.attachments,
                            )
                            .await
                        }
                        _ => sms.send_sms(&request.from, &request.to, &request.body).await,
                    }
                }
            })
            .await?;

        self.record_outbound(Draft {
            from: &request.from,
            to: &request.to,
            body: &request.body,
            attachments: &request.attachments,
            validated,
            provider_id: None,
        })
        .await
    }

    /// Send an email and record it as `pending`.
    ///
    /// Cancellation stops at the provider call, as for
    /// [`MessagingService::send_sms`].
    ///
    /// # Errors
    ///
    /// Same as [`MessagingService::send_sms`].
    pub async fn send_email(
        &self,
        request: &SendEmailRequest,
        cancel: &CancellationToken,
    ) -> Result<Message, MessagingError> {
        let validated = validate_email_request(request, Utc::now())?;

        let email = Arc::clone(&self.email);
        self.retry
            .execute(cancel, || {
                let email = Arc::clone(&email);
                async move {
                    email
                        .send_email(&request.from, &request.to, &request.body, &request.attachments)
                        .await
                }
            })
            .await?;

        self.record_outbound(Draft {
            from: &request.from,
            to: &request.to,
            body: &request.body,
            attachments: &request.attachments,
            validated,
            provider_id: None,
        })
        .await
    }

    /// Record an inbound SMS/MMS webhook as `delivered`, once per provider id.
    ///
    /// # Errors
    ///
    /// - [`MessagingError::InvalidRequest`] if validation fails
    /// - [`MessagingError::Persistence`] if a store call fails
    /// - [`MessagingError::Cancelled`] if cancelled
    pub async fn handle_inbound_sms(
        &self,
        webhook: &InboundSmsWebhook,
        cancel: &CancellationToken,
    ) -> Result<InboundOutcome, MessagingError> {
        let validated = validate_inbound_sms(webhook, Utc::now())?;
        self.record_inbound(
            Draft {
                from: &webhook.from,
                to: &webhook.to,
                body: &webhook.body,
                attachments: &webhook.attachments,
                validated,
                provider_id: Some(&webhook.messaging_provider_id),
            },
            cancel,
        )
        .await
    }

    /// Record an inbound email webhook as `delivered`, once per `xillio_id`.
    ///
    /// # Errors
    ///
    /// Same as [`MessagingService::handle_inbound_sms`].
    pub async fn handle_inbound_email(
        &self,
        webhook: &InboundEmailWebhook,
        cancel: &CancellationToken,
    ) -> Result<InboundOutcome, MessagingError> {
        let validated = validate_inbound_email(webhook, Utc::now())?;
        self.record_inbound(
            Draft {
                from: &webhook.from,
                to: &webhook.to,
                body: &webhook.body,
                attachments: &webhook.attachments,
                validated,
                provider_id: Some(&webhook.xillio_id),
            },
            cancel,
        )
        .await
    }

    /// Persist a message whose provider call already succeeded.
    ///
    /// Not cancellable: the message is out, so the write is allowed to finish.
    async fn record_outbound(&self, draft: Draft<'_>) -> Result<Message, MessagingError> {
        let result = async {
            let conversation = self.resolve_conversation(draft.from, draft.to).await?;
            let message = self
                .messages
                .create(new_message(&conversation, &draft, MessageStatus::Pending))
                .await?;
            Ok::<_, StoreError>(message)
        }
        .await;

        match result {
            Ok(message) => {
                self.recorded(&message, Direction::Outbound);
                Ok(message)
            }
            Err(err) => {
                error!(
                    from = draft.from,
                    to = draft.to,
                    error = %err,
                    "message sent but not recorded"
                );
                Err(MessagingError::SentButNotRecorded(err))
            }
        }
    }

    async fn record_inbound(
        &self,
        draft: Draft<'_>,
        cancel: &CancellationToken,
    ) -> Result<InboundOutcome, MessagingError> {
        let provider_id = draft.provider_id.unwrap_or_default();

        let existing =
            cancellable(cancel, self.messages.get_by_provider_message_id(provider_id)).await?;
        if let Some(existing) = existing {
            self.duplicate(provider_id);
            return Ok(InboundOutcome::Duplicate(existing));
        }

        let conversation =
            cancellable(cancel, self.resolve_conversation(draft.from, draft.to)).await?;
        let new = new_message(&conversation, &draft, MessageStatus::Delivered);
        let outcome = cancellable(cancel, self.insert_inbound(new)).await?;

        match &outcome {
            InboundOutcome::Recorded(message) => self.recorded(message, Direction::Inbound),
            InboundOutcome::Duplicate(_) => self.duplicate(provider_id),
        }
        Ok(outcome)
    }

    async fn insert_inbound(&self, new: NewMessage) -> Result<InboundOutcome, StoreError> {
        match self.messages.create(new).await {
            Ok(message) => Ok(InboundOutcome::Recorded(message)),
            // A concurrent replay won the insert.
            Err(StoreError::DuplicateProviderMessageId(id)) => {
                match self.messages.get_by_provider_message_id(&id).await? {
                    Some(existing) => Ok(InboundOutcome::Duplicate(existing)),
                    None => Err(StoreError::DuplicateProviderMessageId(id)),
                }
            }
            Err(err) => Err(err),
        }
    }

    async fn resolve_conversation(&self, a: &str, b: &str) -> Result<Conversation, StoreError> {
        let (customer, business) = canonical_pair(a, b);
        let conversation = self.conversations.get_or_create(&customer, &business).await?;
        debug!(
            conversation_id = conversation.id,
            customer_contact = %conversation.customer_contact,
            business_contact = %conversation.business_contact,
            "resolved conversation"
        );
        self.telemetry.record(TelemetryEvent::ConversationResolved {
            conversation_id: conversation.id,
        });
        Ok(conversation)
    }

    fn recorded(&self, message: &Message, direction: Direction) {
        self.telemetry.record(TelemetryEvent::MessageRecorded {
            message_id: message.id,
            conversation_id: message.conversation_id,
            direction,
            message_type: message.message_type,
        });
    }

    fn duplicate(&self, provider_id: &str) {
        self.telemetry.record(TelemetryEvent::DuplicateSuppressed {
            provider_message_id: provider_id.to_owned(),
        });
    }
}

fn new_message(
    conversation: &Conversation,
    draft: &Draft<'_>,
    status: MessageStatus,
) -> NewMessage {
    NewMessage {
        conversation_id: conversation.id,
        from: draft.from.to_owned(),
        to: draft.to.to_owned(),
        message_type: draft.validated.message_type,
        body: draft.body.to_owned(),
        attachments: draft.attachments.to_vec(),
        status,
        messaging_provider_id: draft.provider_id.map(str::to_owned),
        timestamp: draft.validated.timestamp,
    }
}
