//! Behaviour every store backend must share.

use std::sync::Arc;

use chrono::{Duration, Utc};

use courier::store::{ConversationStore, MessageStore, StoreError};
use courier::types::{
    ConversationQuery, Message, MessageStatus, MessageType, NewMessage, SortField, SortOrder,
};

pub trait Store: ConversationStore + MessageStore + 'static {}
impl<T: ConversationStore + MessageStore + 'static> Store for T {}

pub fn new_message(conversation_id: i64, provider_id: Option<&str>) -> NewMessage {
    NewMessage {
        conversation_id,
        from: "+18045551234".to_owned(),
        to: "+12016661234".to_owned(),
        message_type: MessageType::Mms,
        body: "photo".to_owned(),
        attachments: vec!["https://example.com/p.jpg".to_owned()],
        status: MessageStatus::Delivered,
        messaging_provider_id: provider_id.map(str::to_owned),
        timestamp: Utc::now(),
    }
}

async fn create(store: &impl Store, message: NewMessage) -> Message {
    MessageStore::create(store, message)
        .await
        .expect("message should be created")
}

async fn conversation(store: &impl Store, a: &str, b: &str) -> i64 {
    store
        .get_or_create(a, b)
        .await
        .expect("get_or_create should succeed")
        .id
}

pub async fn get_or_create_is_idempotent_for_either_order(store: &impl Store) {
    let first = conversation(store, "+12016661234", "+18045551234").await;
    let again = conversation(store, "+12016661234", "+18045551234").await;
    let swapped = conversation(store, "+18045551234", "+12016661234").await;
    assert_eq!(first, again);
    assert_eq!(first, swapped);

    let found = ConversationStore::get_by_id(store, first)
        .await
        .expect("lookup should succeed")
        .expect("conversation should be readable");
    assert_eq!(found.customer_contact, "+12016661234");
    assert_eq!(found.business_contact, "+18045551234");
    assert!(found.messages.is_none());
}

pub async fn concurrent_get_or_create_yields_one_conversation<S: Store>(store: Arc<S>) {
    let mut tasks = Vec::new();
    for _ in 0..8 {
        let store = Arc::clone(&store);
        tasks.push(tokio::spawn(async move {
            store.get_or_create("a@example.com", "b@example.com").await
        }));
    }
    let mut ids = Vec::new();
    for task in tasks {
        let conversation = task
            .await
            .expect("task should not panic")
            .expect("get_or_create should succeed");
        ids.push(conversation.id);
    }
    ids.dedup();
    assert_eq!(ids.len(), 1, "{ids:?}");

    let (_, total) = store
        .list(&ConversationQuery::default())
        .await
        .expect("list should succeed");
    assert_eq!(total, 1);
}

pub async fn create_assigns_ids_and_round_trips_fields(store: &impl Store) {
    let id = conversation(store, "+12016661234", "+18045551234").await;
    let before = ConversationStore::get_by_id(store, id)
        .await
        .expect("lookup should succeed")
        .expect("conversation should exist")
        .updated_at;

    let created = create(store, new_message(id, Some("message-1"))).await;
    assert!(created.id > 0);
    assert_eq!(created.created_at, created.updated_at);

    let loaded = MessageStore::get_by_id(store, created.id)
        .await
        .expect("lookup should succeed")
        .expect("message should exist");
    assert_eq!(loaded, created);
    assert_eq!(loaded.attachments, vec!["https://example.com/p.jpg".to_owned()]);

    let by_provider = store
        .get_by_provider_message_id("message-1")
        .await
        .expect("lookup should succeed")
        .expect("provider id should be found");
    assert_eq!(by_provider.id, created.id);
    assert!(matches!(store.get_by_provider_message_id("message-2").await, Ok(None)));

    let after = ConversationStore::get_by_id(store, id)
        .await
        .expect("lookup should succeed")
        .expect("conversation should exist")
        .updated_at;
    assert!(after >= before);
}

pub async fn duplicate_provider_id_is_rejected(store: &impl Store) {
    let id = conversation(store, "+1", "+2").await;
    create(store, new_message(id, Some("dup"))).await;

    let second = MessageStore::create(store, new_message(id, Some("dup"))).await;
    assert!(
        matches!(second, Err(StoreError::DuplicateProviderMessageId(ref p)) if p == "dup"),
        "{second:?}"
    );

    // Messages without a provider id never collide.
    create(store, new_message(id, None)).await;
    create(store, new_message(id, None)).await;
    let history = store
        .get_by_conversation_id(id)
        .await
        .expect("history should load");
    assert_eq!(history.len(), 3);
}

pub async fn create_for_missing_conversation_fails(store: &impl Store) {
    let result = MessageStore::create(store, new_message(9_999, None)).await;
    assert!(
        matches!(result, Err(StoreError::ConversationNotFound(9_999))),
        "{result:?}"
    );
}

pub async fn history_is_chronological(store: &impl Store) {
    let id = conversation(store, "+1", "+2").await;
    let other = conversation(store, "+3", "+4").await;
    let mut expected = Vec::new();
    for n in 0..4 {
        let mut message = new_message(id, None);
        message.body = format!("m{n}");
        expected.push(create(store, message).await.id);
        create(store, new_message(other, None)).await;
    }

    let history = store.get_by_conversation_id(id).await.expect("history should load");
    let ids: Vec<i64> = history.iter().map(|m| m.id).collect();
    assert_eq!(ids, expected);
    assert!(history.windows(2).all(|w| w[0].created_at <= w[1].created_at));
}

pub async fn update_changes_status_and_errors(store: &impl Store) {
    let id = conversation(store, "+1", "+2").await;
    let mut message = create(store, new_message(id, None)).await;
    message.status = MessageStatus::Failed;
    message.error_code = Some("500".to_owned());
    message.error_message = Some("Internal server error".to_owned());

    store.update(&message).await.expect("update should succeed");
    let loaded = MessageStore::get_by_id(store, message.id)
        .await
        .expect("lookup should succeed")
        .expect("message should exist");
    assert_eq!(loaded.status, MessageStatus::Failed);
    assert_eq!(loaded.error_code.as_deref(), Some("500"));
    assert_eq!(loaded.error_message.as_deref(), Some("Internal server error"));
    assert!(loaded.updated_at >= loaded.created_at);

    message.id = 424_242;
    assert!(matches!(
        store.update(&message).await,
        Err(StoreError::MessageNotFound(424_242))
    ));
}

pub async fn list_filters_sorts_and_pages(store: &impl Store) {
    let phone = conversation(store, "+12016661234", "+18045551234").await;
    let email = conversation(store, "contact@gmail.com", "User@UseHatchApp.com").await;
    let other = conversation(store, "+13335550000", "+14445550000").await;
    let mut mail = new_message(email, None);
    mail.message_type = MessageType::Email;
    create(store, mail).await;

    let listed = |query: ConversationQuery| async move {
        store.list(&query).await.expect("list should succeed")
    };

    // Case-insensitive search across both contacts.
    let (rows, total) = listed(ConversationQuery {
        search: Some("GMAIL".to_owned()),
        ..ConversationQuery::default()
    })
    .await;
    assert_eq!(total, 1);
    assert_eq!(rows[0].id, email);

    let (rows, _) = listed(ConversationQuery {
        business_email: Some("usehatchapp".to_owned()),
        ..ConversationQuery::default()
    })
    .await;
    assert_eq!(rows.iter().map(|c| c.id).collect::<Vec<_>>(), vec![email]);

    let (rows, _) = listed(ConversationQuery {
        business_phone: Some("804".to_owned()),
        ..ConversationQuery::default()
    })
    .await;
    assert_eq!(rows.iter().map(|c| c.id).collect::<Vec<_>>(), vec![phone]);

    let (rows, total) = listed(ConversationQuery {
        message_type: Some(MessageType::Email),
        ..ConversationQuery::default()
    })
    .await;
    assert_eq!(total, 1);
    assert_eq!(rows[0].id, email);

    let (rows, total) = listed(ConversationQuery {
        sort_by: Some(SortField::CustomerContact),
        sort_order: Some(SortOrder::Asc),
        limit: Some(2),
        offset: Some(1),
        ..ConversationQuery::default()
    })
    .await;
    assert_eq!(total, 3);
    assert_eq!(rows.iter().map(|c| c.id).collect::<Vec<_>>(), vec![other, email]);

    let future = Utc::now() + Duration::hours(1);
    let (_, total) = listed(ConversationQuery {
        from: Some(future),
        ..ConversationQuery::default()
    })
    .await;
    assert_eq!(total, 0);

    let (_, total) = listed(ConversationQuery {
        to: Some(future),
        ..ConversationQuery::default()
    })
    .await;
    assert_eq!(total, 3);
}

pub async fn search_treats_wildcards_literally(store: &impl Store) {
    let plain = conversation(store, "contact@gmail.com", "user@usehatchapp.com").await;
    let underscored = conversation(store, "first_last@gmail.com", "user@usehatchapp.com").await;

    let search = |needle: &'static str| async move {
        let query = ConversationQuery {
            search: Some(needle.to_owned()),
            ..ConversationQuery::default()
        };
        let (rows, _) = store.list(&query).await.expect("list should succeed");
        let mut ids: Vec<i64> = rows.iter().map(|c| c.id).collect();
        ids.sort_unstable();
        ids
    };

    assert!(search("%").await.is_empty());
    assert_eq!(search("t_l").await, vec![underscored]);
    assert_eq!(search("GMAIL").await, {
        let mut ids = vec![plain, underscored];
        ids.sort_unstable();
        ids
    });

    let (rows, _) = store
        .list(&ConversationQuery {
            business_email: Some("user_".to_owned()),
            ..ConversationQuery::default()
        })
        .await
        .expect("list should succeed");
    assert!(rows.is_empty());
}
