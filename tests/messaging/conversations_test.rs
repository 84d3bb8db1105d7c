//! Conversation listing, pagination and history lookups.

use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use courier::messaging::conversations::ConversationService;
use courier::messaging::MessagingError;
use courier::store::memory::InMemoryStore;
use courier::store::{ConversationStore, MessageStore};
use courier::types::{
    ConversationPage, ConversationQuery, MessageStatus, MessageType, NewMessage, SortField,
    SortOrder,
};

fn service(store: &Arc<InMemoryStore>) -> ConversationService {
    ConversationService::new(
        Arc::clone(store) as Arc<dyn ConversationStore>,
        Arc::clone(store) as Arc<dyn MessageStore>,
    )
}

async fn seed_conversation(store: &InMemoryStore, customer: &str, business: &str) -> i64 {
    store
        .get_or_create(customer, business)
        .await
        .expect("conversation should be created")
        .id
}

async fn seed_message(store: &InMemoryStore, conversation_id: i64, body: &str, kind: MessageType) {
    let message = NewMessage {
        conversation_id,
        from: "+12016661234".to_owned(),
        to: "+18045551234".to_owned(),
        message_type: kind,
        body: body.to_owned(),
        attachments: Vec::new(),
        status: MessageStatus::Pending,
        messaging_provider_id: None,
        timestamp: Utc::now(),
    };
    store.create(message).await.expect("message should be stored");
}

async fn list(service: &ConversationService, query: ConversationQuery) -> ConversationPage {
    service
        .list_conversations(&query, &CancellationToken::new())
        .await
        .expect("listing should succeed")
}

#[tokio::test]
async fn first_page_of_two_has_more() {
    let store = Arc::new(InMemoryStore::new());
    seed_conversation(&store, "+12016661234", "+18045551234").await;
    seed_conversation(&store, "contact@gmail.com", "user@usehatchapp.com").await;

    let page = list(
        &service(&store),
        ConversationQuery {
            limit: Some(1),
            offset: Some(0),
            ..ConversationQuery::default()
        },
    )
    .await;

    assert_eq!(page.conversations.len(), 1);
    assert_eq!(page.total, 2);
    assert_eq!(page.page, 1);
    assert_eq!(page.per_page, 1);
    assert!(page.has_more);
}

#[tokio::test]
async fn defaults_apply_when_unset() {
    let store = Arc::new(InMemoryStore::new());
    let first = seed_conversation(&store, "+1", "+2").await;
    let second = seed_conversation(&store, "+3", "+4").await;
    // Touch the first conversation so it becomes the most recently updated.
    seed_message(&store, first, "bump", MessageType::Sms).await;

    let page = list(&service(&store), ConversationQuery::default()).await;

    assert_eq!(page.per_page, 50);
    assert_eq!(page.page, 1);
    assert!(!page.has_more);
    let ids: Vec<i64> = page.conversations.iter().map(|c| c.id).collect();
    assert_eq!(ids, vec![first, second]);
    assert!(page.conversations.iter().all(|c| c.messages.is_none()));
}

#[tokio::test]
async fn later_pages_report_their_number() {
    let store = Arc::new(InMemoryStore::new());
    for n in 0..5 {
        seed_conversation(&store, &format!("+1000{n}"), "+19999999999").await;
    }

    let page = list(
        &service(&store),
        ConversationQuery {
            limit: Some(2),
            offset: Some(4),
            sort_by: Some(SortField::Id),
            sort_order: Some(SortOrder::Asc),
            ..ConversationQuery::default()
        },
    )
    .await;

    assert_eq!(page.page, 3);
    assert_eq!(page.conversations.len(), 1);
    assert!(!page.has_more);
}

#[tokio::test]
async fn include_messages_attaches_history_in_order() {
    let store = Arc::new(InMemoryStore::new());
    let id = seed_conversation(&store, "+12016661234", "+18045551234").await;
    seed_message(&store, id, "first", MessageType::Sms).await;
    seed_message(&store, id, "second", MessageType::Mms).await;

    let page = list(
        &service(&store),
        ConversationQuery {
            include_messages: true,
            ..ConversationQuery::default()
        },
    )
    .await;

    let messages = page.conversations[0]
        .messages
        .as_ref()
        .expect("messages should be attached");
    let bodies: Vec<&str> = messages.iter().map(|m| m.body.as_str()).collect();
    assert_eq!(bodies, vec!["first", "second"]);
}

#[tokio::test]
async fn message_type_filter_keeps_matching_conversations() {
    let store = Arc::new(InMemoryStore::new());
    let sms = seed_conversation(&store, "+1", "+2").await;
    let email = seed_conversation(&store, "a@x.com", "b@x.com").await;
    seed_message(&store, sms, "text", MessageType::Sms).await;
    seed_message(&store, email, "mail", MessageType::Email).await;

    let page = list(
        &service(&store),
        ConversationQuery {
            message_type: Some(MessageType::Email),
            ..ConversationQuery::default()
        },
    )
    .await;

    assert_eq!(page.total, 1);
    assert_eq!(page.conversations[0].id, email);
}

#[tokio::test]
async fn messages_of_unknown_conversation_is_not_found() {
    let store = Arc::new(InMemoryStore::new());
    let result = service(&store)
        .get_conversation_messages(42, &CancellationToken::new())
        .await;
    match result {
        Err(err @ MessagingError::NotFound(42)) => assert!(err.is_client_error()),
        other => panic!("expected NotFound, got {other:?}"),
    }
}

#[tokio::test]
async fn messages_come_back_oldest_first() {
    let store = Arc::new(InMemoryStore::new());
    let id = seed_conversation(&store, "+1", "+2").await;
    for body in ["one", "two", "three"] {
        seed_message(&store, id, body, MessageType::Sms).await;
    }

    let messages = service(&store)
        .get_conversation_messages(id, &CancellationToken::new())
        .await
        .expect("history should load");
    let bodies: Vec<&str> = messages.iter().map(|m| m.body.as_str()).collect();
    assert_eq!(bodies, vec!["one", "two", "three"]);
}
