//! In-memory store guarded by a single lock.
//!
//! Mirrors the SQLite store's constraints (unique contact pair, unique
//! provider message id, chronological message order) so tests exercise the
//! same invariants without a database.

use std::cmp::Ordering;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::Utc;

use super::{contains_ci, ConversationStore, MessageStore, StoreError};
use crate::types::{
    Conversation, ConversationQuery, Message, NewMessage, SortField, SortOrder,
};

#[derive(Debug, Default)]
struct State {
    conversations: Vec<Conversation>,
    messages: Vec<Message>,
    next_conversation_id: i64,
    next_message_id: i64,
}

impl State {
    fn find_pair(&self, a: &str, b: &str) -> Option<&Conversation> {
        self.conversations.iter().find(|c| {
            (c.customer_contact == a && c.business_contact == b)
                || (c.customer_contact == b && c.business_contact == a)
        })
    }

    fn matches(&self, conversation: &Conversation, query: &ConversationQuery) -> bool {
        if query.from.is_some_and(|from| conversation.updated_at < from) {
            return false;
        }
        if query.to.is_some_and(|to| conversation.updated_at > to) {
            return false;
        }
        if let Some(search) = query.search.as_deref().filter(|s| !s.is_empty()) {
            if !contains_ci(&conversation.customer_contact, search)
                && !contains_ci(&conversation.business_contact, search)
            {
                return false;
            }
        }
        for filter in [&query.business_email, &query.business_phone] {
            if let Some(value) = filter.as_deref().filter(|s| !s.is_empty()) {
                if !contains_ci(&conversation.business_contact, value) {
                    return false;
                }
            }
        }
        if let Some(message_type) = query.message_type {
            let has_type = self
                .messages
                .iter()
                .any(|m| m.conversation_id == conversation.id && m.message_type == message_type);
            if !has_type {
                return false;
            }
        }
        true
    }
}

fn compare(a: &Conversation, b: &Conversation, field: SortField) -> Ordering {
    match field {
        SortField::Id => a.id.cmp(&b.id),
        SortField::CreatedAt => a.created_at.cmp(&b.created_at),
        SortField::UpdatedAt => a.updated_at.cmp(&b.updated_at),
        SortField::CustomerContact => a.customer_contact.cmp(&b.customer_contact),
        SortField::BusinessContact => a.business_contact.cmp(&b.business_contact),
    }
}

/// Thread-safe in-memory conversation and message store.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
}

impl InMemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of stored conversations.
    pub fn conversation_count(&self) -> usize {
        self.lock().conversations.len()
    }

    /// Number of stored messages.
    pub fn message_count(&self) -> usize {
        self.lock().messages.len()
    }
}

#[async_trait]
impl ConversationStore for InMemoryStore {
    async fn get_or_create(
        &self,
        customer_contact: &str,
        business_contact: &str,
    ) -> Result<Conversation, StoreError> {
        let mut state = self.lock();
        if let Some(existing) = state.find_pair(customer_contact, business_contact) {
            return Ok(existing.clone());
        }
        state.next_conversation_id = state.next_conversation_id.saturating_add(1);
        let now = Utc::now();
        let conversation = Conversation {
            id: state.next_conversation_id,
            customer_contact: customer_contact.to_owned(),
            business_contact: business_contact.to_owned(),
            created_at: now,
            updated_at: now,
            messages: None,
        };
        state.conversations.push(conversation.clone());
        Ok(conversation)
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Conversation>, StoreError> {
        Ok(self.lock().conversations.iter().find(|c| c.id == id).cloned())
    }

    async fn list(
        &self,
        query: &ConversationQuery,
    ) -> Result<(Vec<Conversation>, u64), StoreError> {
        let state = self.lock();
        let mut matching: Vec<Conversation> = state
            .conversations
            .iter()
            .filter(|c| state.matches(c, query))
            .cloned()
            .collect();

        let field = query.effective_sort_by();
        let order = query.effective_sort_order();
        matching.sort_by(|a, b| {
            let primary = match order {
                SortOrder::Asc => compare(a, b, field),
                SortOrder::Desc => compare(b, a, field),
            };
            primary.then(a.id.cmp(&b.id))
        });

        let total = u64::try_from(matching.len()).unwrap_or(u64::MAX);
        let offset = usize::try_from(query.effective_offset()).unwrap_or(usize::MAX);
        let limit = usize::try_from(query.effective_limit()).unwrap_or(usize::MAX);
        let page = matching.into_iter().skip(offset).take(limit).collect();
        Ok((page, total))
    }
}

#[async_trait]
impl MessageStore for InMemoryStore {
    async fn create(&self, message: NewMessage) -> Result<Message, StoreError> {
        let mut state = self.lock();
        if let Some(provider_id) = &message.messaging_provider_id {
            let taken = state
                .messages
                .iter()
                .any(|m| m.messaging_provider_id.as_ref() == Some(provider_id));
            if taken {
                return Err(StoreError::DuplicateProviderMessageId(provider_id.clone()));
            }
        }

        let now = Utc::now();
        let conversation = state
            .conversations
            .iter_mut()
            .find(|c| c.id == message.conversation_id)
            .ok_or(StoreError::ConversationNotFound(message.conversation_id))?;
        conversation.updated_at = now;

        state.next_message_id = state.next_message_id.saturating_add(1);
        let stored = Message {
            id: state.next_message_id,
            conversation_id: message.conversation_id,
            from: message.from,
            to: message.to,
            message_type: message.message_type,
            body: message.body,
            attachments: message.attachments,
            status: message.status,
            error_code: None,
            error_message: None,
            messaging_provider_id: message.messaging_provider_id,
            timestamp: message.timestamp,
            created_at: now,
            updated_at: now,
        };
        state.messages.push(stored.clone());
        Ok(stored)
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Message>, StoreError> {
        Ok(self.lock().messages.iter().find(|m| m.id == id).cloned())
    }

    async fn get_by_conversation_id(
        &self,
        conversation_id: i64,
    ) -> Result<Vec<Message>, StoreError> {
        let mut messages: Vec<Message> = self
            .lock()
            .messages
            .iter()
            .filter(|m| m.conversation_id == conversation_id)
            .cloned()
            .collect();
        messages.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(messages)
    }

    async fn get_by_provider_message_id(
        &self,
        provider_message_id: &str,
    ) -> Result<Option<Message>, StoreError> {
        Ok(self
            .lock()
            .messages
            .iter()
            .find(|m| m.messaging_provider_id.as_deref() == Some(provider_message_id))
            .cloned())
    }

    async fn update(&self, message: &Message) -> Result<(), StoreError> {
        let mut state = self.lock();
        let stored = state
            .messages
            .iter_mut()
            .find(|m| m.id == message.id)
            .ok_or(StoreError::MessageNotFound(message.id))?;
        stored.status = message.status;
        stored.error_code.clone_from(&message.error_code);
        stored.error_message.clone_from(&message.error_message);
        stored.updated_at = Utc::now();
        Ok(())
    }
}
