//! Data model shared by the messaging core, the stores, and the CLI.
//!
//! Wire names follow the JSON shapes the HTTP layer accepts
//! (`messaging_provider_id`, `xillio_id`, `customer_contact`, ...).

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};

/// Default page size for conversation listings.
pub const DEFAULT_PAGE_LIMIT: u32 = 50;

/// Largest page size the transport layer will accept.
pub const MAX_PAGE_LIMIT: u32 = 100;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Channel a message travels over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    /// Plain text message.
    Sms,
    /// Multimedia message with attachments.
    Mms,
    /// Email.
    Email,
}

impl MessageType {
    /// Returns the string representation stored in SQLite.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sms => "sms",
            Self::Mms => "mms",
            Self::Email => "email",
        }
    }

    /// Parse from a stored or user-supplied value.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "sms" => Some(Self::Sms),
            "mms" => Some(Self::Mms),
            "email" => Some(Self::Email),
            _ => None,
        }
    }
}

/// Delivery status of a persisted message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    /// Accepted by the provider, no delivery receipt yet.
    Pending,
    /// Delivered (all inbound messages start here).
    Delivered,
    /// Provider reported a failure after acceptance.
    Failed,
    /// Email bounced.
    Bounced,
}

impl MessageStatus {
    /// Returns the string representation stored in SQLite.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Delivered => "delivered",
            Self::Failed => "failed",
            Self::Bounced => "bounced",
        }
    }

    /// Parse from a stored value.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "delivered" => Some(Self::Delivered),
            "failed" => Some(Self::Failed),
            "bounced" => Some(Self::Bounced),
            _ => None,
        }
    }
}

/// Whether a message left through a provider or arrived via webhook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Sent by us through a provider.
    Outbound,
    /// Received from a provider webhook.
    Inbound,
}

impl Direction {
    /// Lowercase name, as used in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Outbound => "outbound",
            Self::Inbound => "inbound",
        }
    }
}

// ---------------------------------------------------------------------------
// Persisted entities
// ---------------------------------------------------------------------------

/// A persisted message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Database row id.
    pub id: i64,
    /// Owning conversation.
    pub conversation_id: i64,
    /// Sender address.
    pub from: String,
    /// Recipient address.
    pub to: String,
    /// Channel.
    #[serde(rename = "type")]
    pub message_type: MessageType,
    /// Message body.
    pub body: String,
    /// Attachment URIs, in request order.
    pub attachments: Vec<String>,
    /// Delivery status.
    pub status: MessageStatus,
    /// Provider error code recorded by the status-update path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    /// Provider error message recorded by the status-update path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Provider-assigned identifier; the idempotency key for inbound messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub messaging_provider_id: Option<String>,
    /// Business time of the message (UTC).
    pub timestamp: DateTime<Utc>,
    /// When the row was written.
    pub created_at: DateTime<Utc>,
    /// When the row was last changed.
    pub updated_at: DateTime<Utc>,
}

/// A message built by the orchestrator and not yet persisted.
///
/// The store assigns `id`, `created_at` and `updated_at`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    /// Owning conversation.
    pub conversation_id: i64,
    /// Sender address.
    pub from: String,
    /// Recipient address.
    pub to: String,
    /// Channel.
    pub message_type: MessageType,
    /// Message body.
    pub body: String,
    /// Attachment URIs.
    pub attachments: Vec<String>,
    /// Initial status.
    pub status: MessageStatus,
    /// Provider identifier (inbound only).
    pub messaging_provider_id: Option<String>,
    /// Business time (UTC).
    pub timestamp: DateTime<Utc>,
}

/// A two-party conversation thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    /// Database row id.
    pub id: i64,
    /// First address of the normalized pair.
    pub customer_contact: String,
    /// Second address of the normalized pair.
    pub business_contact: String,
    /// When the conversation was created.
    pub created_at: DateTime<Utc>,
    /// Touched whenever a message is added.
    pub updated_at: DateTime<Utc>,
    /// Chronological messages, present only when hydrated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub messages: Option<Vec<Message>>,
}

// ---------------------------------------------------------------------------
// Requests and webhooks
// ---------------------------------------------------------------------------

/// Outbound SMS/MMS send request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendSmsRequest {
    /// Sender address.
    pub from: String,
    /// Recipient address.
    pub to: String,
    /// `sms` or `mms`; validated before use.
    #[serde(rename = "type")]
    pub message_type: String,
    /// Message body.
    pub body: String,
    /// Attachment URIs (MMS).
    #[serde(default)]
    pub attachments: Vec<String>,
    /// Business time; must be UTC.
    #[serde(default)]
    pub timestamp: Option<DateTime<FixedOffset>>,
}

/// Outbound email send request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendEmailRequest {
    /// Sender address.
    pub from: String,
    /// Recipient address.
    pub to: String,
    /// Message body (HTML allowed).
    pub body: String,
    /// Attachment URIs.
    #[serde(default)]
    pub attachments: Vec<String>,
    /// Business time; must be UTC.
    #[serde(default)]
    pub timestamp: Option<DateTime<FixedOffset>>,
}

/// Inbound SMS/MMS webhook payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundSmsWebhook {
    /// Sender address.
    pub from: String,
    /// Recipient address.
    pub to: String,
    /// `sms` or `mms`; validated before use.
    #[serde(rename = "type")]
    pub message_type: String,
    /// Provider message identifier (idempotency key).
    pub messaging_provider_id: String,
    /// Message body.
    pub body: String,
    /// Attachment URIs.
    #[serde(default)]
    pub attachments: Vec<String>,
    /// Business time; must be UTC.
    #[serde(default)]
    pub timestamp: Option<DateTime<FixedOffset>>,
}

/// Inbound email webhook payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundEmailWebhook {
    /// Sender address.
    pub from: String,
    /// Recipient address.
    pub to: String,
    /// Email provider message identifier (idempotency key).
    pub xillio_id: String,
    /// Message body.
    pub body: String,
    /// Attachment URIs.
    #[serde(default)]
    pub attachments: Vec<String>,
    /// Business time; must be UTC.
    #[serde(default)]
    pub timestamp: Option<DateTime<FixedOffset>>,
}

// ---------------------------------------------------------------------------
// Conversation queries
// ---------------------------------------------------------------------------

/// Column a conversation listing is ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    /// Row id.
    Id,
    /// Creation time.
    CreatedAt,
    /// Last activity.
    #[default]
    UpdatedAt,
    /// First contact of the pair.
    CustomerContact,
    /// Second contact of the pair.
    BusinessContact,
}

impl SortField {
    /// SQL column name. Only whitelisted names ever reach a query string.
    pub fn column(&self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::CreatedAt => "created_at",
            Self::UpdatedAt => "updated_at",
            Self::CustomerContact => "customer_contact",
            Self::BusinessContact => "business_contact",
        }
    }

    /// Parse a user-supplied column name, falling back to `updated_at`.
    pub fn parse_or_default(s: &str) -> Self {
        match s {
            "id" => Self::Id,
            "created_at" => Self::CreatedAt,
            "customer_contact" => Self::CustomerContact,
            "business_contact" => Self::BusinessContact,
            _ => Self::UpdatedAt,
        }
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    /// Ascending.
    Asc,
    /// Descending.
    #[default]
    Desc,
}

impl SortOrder {
    /// SQL keyword.
    pub fn keyword(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }

    /// Parse a user-supplied direction; anything but `asc` is descending.
    pub fn parse_or_default(s: &str) -> Self {
        if s.eq_ignore_ascii_case("asc") {
            Self::Asc
        } else {
            Self::Desc
        }
    }
}

/// Filters, ordering, and paging for a conversation listing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationQuery {
    /// Substring match on the business contact.
    pub business_email: Option<String>,
    /// Substring match on the business contact.
    pub business_phone: Option<String>,
    /// Substring match on either contact.
    pub search: Option<String>,
    /// Lower bound on `updated_at` (inclusive).
    pub from: Option<DateTime<Utc>>,
    /// Upper bound on `updated_at` (inclusive).
    pub to: Option<DateTime<Utc>>,
    /// Only conversations holding at least one message of this type.
    pub message_type: Option<MessageType>,
    /// Page size; unset or zero means [`DEFAULT_PAGE_LIMIT`].
    pub limit: Option<u32>,
    /// Rows to skip.
    pub offset: Option<u32>,
    /// Ordering column.
    pub sort_by: Option<SortField>,
    /// Ordering direction.
    pub sort_order: Option<SortOrder>,
    /// Attach each conversation's messages.
    pub include_messages: bool,
}

impl ConversationQuery {
    /// Page size after defaults.
    pub fn effective_limit(&self) -> u32 {
        match self.limit {
            None | Some(0) => DEFAULT_PAGE_LIMIT,
            Some(n) => n,
        }
    }

    /// Offset after defaults.
    pub fn effective_offset(&self) -> u32 {
        self.offset.unwrap_or(0)
    }

    /// Ordering column after defaults.
    pub fn effective_sort_by(&self) -> SortField {
        self.sort_by.unwrap_or_default()
    }

    /// Ordering direction after defaults.
    pub fn effective_sort_order(&self) -> SortOrder {
        self.sort_order.unwrap_or_default()
    }

    /// Copy of the query with every defaultable field filled in.
    pub fn with_defaults(&self) -> Self {
        Self {
            limit: Some(self.effective_limit()),
            offset: Some(self.effective_offset()),
            sort_by: Some(self.effective_sort_by()),
            sort_order: Some(self.effective_sort_order()),
            ..self.clone()
        }
    }
}

/// One page of conversations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationPage {
    /// Conversations on this page.
    pub conversations: Vec<Conversation>,
    /// Matching conversations across all pages.
    pub total: u64,
    /// One-based page number.
    pub page: u64,
    /// Page size used.
    pub per_page: u32,
    /// Whether rows remain past this page.
    pub has_more: bool,
}
