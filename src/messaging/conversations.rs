//! Conversation queries: paginated listing and per-conversation history.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{cancellable, MessagingError};
use crate::store::{ConversationStore, MessageStore};
use crate::types::{ConversationPage, ConversationQuery, Message};

/// Read-side service over the conversation and message stores.
pub struct ConversationService {
    conversations: Arc<dyn ConversationStore>,
    messages: Arc<dyn MessageStore>,
}

impl std::fmt::Debug for ConversationService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationService").finish_non_exhaustive()
    }
}

impl ConversationService {
    /// Build the service.
    pub fn new(conversations: Arc<dyn ConversationStore>, messages: Arc<dyn MessageStore>) -> Self {
        Self {
            conversations,
            messages,
        }
    }

    /// One page of conversations.
    ///
    /// Unset paging and sorting fields default to limit 50, offset 0,
    /// `updated_at desc`. With `include_messages`, each conversation carries
    /// its messages oldest first. The 100-row cap belongs to the caller.
    ///
    /// # Errors
    ///
    /// - [`MessagingError::Persistence`] if a store call fails
    /// - [`MessagingError::Cancelled`] if cancelled
    pub async fn list_conversations(
        &self,
        query: &ConversationQuery,
        cancel: &CancellationToken,
    ) -> Result<ConversationPage, MessagingError> {
        let query = query.with_defaults();
        let limit = query.effective_limit();
        let offset = query.effective_offset();

        let (mut conversations, total) =
            cancellable(cancel, self.conversations.list(&query)).await?;

        if query.include_messages {
            for conversation in &mut conversations {
                let messages =
                    cancellable(cancel, self.messages.get_by_conversation_id(conversation.id))
                        .await?;
                conversation.messages = Some(messages);
            }
        }

        let page = u64::from(offset.checked_div(limit).unwrap_or(0)).saturating_add(1);
        let has_more = u64::from(offset).saturating_add(u64::from(limit)) < total;
        debug!(
            returned = conversations.len(),
            total, page, has_more, "listed conversations"
        );

        Ok(ConversationPage {
            conversations,
            total,
            page,
            per_page: limit,
            has_more,
        })
    }

    /// Every message in a conversation, oldest first.
    ///
    /// # Errors
    ///
    /// - [`MessagingError::NotFound`] if the conversation does not exist
    /// - [`MessagingError::Persistence`] if a store call fails
    /// - [`MessagingError::Cancelled`] if cancelled
    pub async fn get_conversation_messages(
        &self,
        conversation_id: i64,
        cancel: &CancellationToken,
    ) -> Result<Vec<Message>, MessagingError> {
        let conversation =
            cancellable(cancel, self.conversations.get_by_id(conversation_id)).await?;
        if conversation.is_none() {
            return Err(MessagingError::NotFound(conversation_id));
        }
        cancellable(cancel, self.messages.get_by_conversation_id(conversation_id)).await
    }
}
