//! Persistence collaborators for conversations and messages.
//!
//! The messaging core only sees the [`ConversationStore`] and
//! [`MessageStore`] traits. Two backends implement both:
//! - [`sqlite::SqliteStore`]: `sqlx` over SQLite, the production store
//! - [`memory::InMemoryStore`]: a single-lock store for tests and dry runs
//!
//! Both enforce the invariants the core relies on under concurrency: one
//! conversation per normalized contact pair, and a unique provider message id.

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};

use crate::types::{Conversation, ConversationQuery, Message, NewMessage};

/// Errors from store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Database operation failed.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Attachment list could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A message with this provider id already exists.
    #[error("duplicate provider message id: {0}")]
    DuplicateProviderMessageId(String),

    /// An invalid enum value was read from the database.
    #[error("invalid {field} value: {value:?}")]
    InvalidEnum {
        /// Which field contained the bad value.
        field: &'static str,
        /// The unexpected value.
        value: String,
    },

    /// A stored timestamp could not be parsed.
    #[error("invalid {field} timestamp: {value:?}")]
    InvalidTimestamp {
        /// Which field contained the bad value.
        field: &'static str,
        /// The unparseable text.
        value: String,
    },

    /// Update targeted a message that does not exist.
    #[error("message not found: {0}")]
    MessageNotFound(i64),

    /// Referenced conversation does not exist.
    #[error("conversation not found: {0}")]
    ConversationNotFound(i64),
}

/// Conversation persistence.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Return the conversation for the pair, creating it if absent.
    ///
    /// Behaves atomically: concurrent callers with the same pair get the
    /// same row. Either ordering of the pair matches an existing row.
    async fn get_or_create(
        &self,
        customer_contact: &str,
        business_contact: &str,
    ) -> Result<Conversation, StoreError>;

    /// Look up a conversation by id.
    async fn get_by_id(&self, id: i64) -> Result<Option<Conversation>, StoreError>;

    /// One page of conversations and the total matching count.
    async fn list(&self, query: &ConversationQuery)
        -> Result<(Vec<Conversation>, u64), StoreError>;
}

/// Message persistence.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Insert a message, assigning id and write timestamps, and touch the
    /// owning conversation's `updated_at`.
    ///
    /// Returns [`StoreError::DuplicateProviderMessageId`] if the provider id
    /// is already taken.
    async fn create(&self, message: NewMessage) -> Result<Message, StoreError>;

    /// Look up a message by id.
    async fn get_by_id(&self, id: i64) -> Result<Option<Message>, StoreError>;

    /// Messages of a conversation, oldest first.
    async fn get_by_conversation_id(&self, conversation_id: i64)
        -> Result<Vec<Message>, StoreError>;

    /// Look up a message by its provider id.
    async fn get_by_provider_message_id(
        &self,
        provider_message_id: &str,
    ) -> Result<Option<Message>, StoreError>;

    /// Persist status and error fields of an existing message.
    async fn update(&self, message: &Message) -> Result<(), StoreError>;
}

/// Canonical text form for stored timestamps.
pub(crate) fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a stored timestamp.
pub(crate) fn parse_ts(field: &'static str, value: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|_| StoreError::InvalidTimestamp {
            field,
            value: value.to_owned(),
        })
}

/// Literal substring match, ASCII case-insensitive, used by listing filters.
///
/// Mirrors SQLite's `LIKE` with escaped wildcards, so both backends filter
/// identically.
pub(crate) fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack
        .to_ascii_lowercase()
        .contains(&needle.to_ascii_lowercase())
}

/// `%needle%` for `LIKE ... ESCAPE '\'`, with `%`, `_` and `\` in the
/// needle matched literally.
pub(crate) fn like_pattern(needle: &str) -> String {
    let mut pattern = String::with_capacity(needle.len().saturating_add(2));
    pattern.push('%');
    for c in needle.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}
