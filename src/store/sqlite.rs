//! SQLite store backed by an `sqlx` connection pool.
//!
//! The schema in `migrations/001_schema.sql` is applied inline on open.
//! Uniqueness of the contact pair and of `provider_message_id` is enforced by
//! table constraints, so concurrent callers cannot create duplicates.

use std::path::Path;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{SubsecRound, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use tracing::{debug, trace};

use super::{format_ts, like_pattern, parse_ts, ConversationStore, MessageStore, StoreError};
use crate::types::{
    Conversation, ConversationQuery, Message, MessageStatus, MessageType, NewMessage,
};

const SCHEMA_SQL: &str = include_str!("../../migrations/001_schema.sql");

const CONVERSATION_COLUMNS: &str = "id, customer_contact, business_contact, created_at, updated_at";

const MESSAGE_COLUMNS: &str = "id, conversation_id, from_address, to_address, message_type, body, \
     attachments, provider_message_id, status, error_code, error_message, timestamp, \
     created_at, updated_at";

/// Row type returned by SQLite queries for conversations.
type ConversationRow = (i64, String, String, String, String);

/// Row type returned by SQLite queries for messages.
type MessageRow = (
    i64,
    i64,
    String,
    String,
    String,
    String,
    String,
    Option<String>,
    String,
    Option<String>,
    Option<String>,
    String,
    String,
    String,
);

/// `sqlx`-backed conversation and message store.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    db: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) the database at `path` and apply the schema.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migration fails.
    pub async fn open(path: &Path, max_connections: u32) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create database directory {}", parent.display())
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .pragma("foreign_keys", "ON");

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .with_context(|| format!("failed to open database at {}", path.display()))?;

        let store = Self::from_pool(pool);
        store
            .migrate()
            .await
            .context("failed to apply messaging schema")?;
        debug!(path = %path.display(), "sqlite store opened");
        Ok(store)
    }

    /// A private in-memory database with the schema applied.
    ///
    /// Limited to one connection: each SQLite `:memory:` connection is its own
    /// database.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the pool or schema fails.
    pub async fn in_memory() -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::new()
            .filename(":memory:")
            .create_if_missing(true)
            .pragma("foreign_keys", "ON");
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        let store = Self::from_pool(pool);
        store.migrate().await?;
        Ok(store)
    }

    /// Wrap an existing pool. The schema is not applied.
    pub fn from_pool(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Apply the schema. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if a statement fails.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA_SQL).execute(&self.db).await?;
        Ok(())
    }

    /// Returns a reference to the underlying SQLite pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.db
    }

    async fn find_by_contacts(
        &self,
        a: &str,
        b: &str,
    ) -> Result<Option<Conversation>, StoreError> {
        let row: Option<ConversationRow> = sqlx::query_as(&format!(
            "SELECT {CONVERSATION_COLUMNS} FROM conversations \
             WHERE (customer_contact = ?1 AND business_contact = ?2) \
                OR (customer_contact = ?2 AND business_contact = ?1) \
             ORDER BY id ASC LIMIT 1"
        ))
        .bind(a)
        .bind(b)
        .fetch_optional(&self.db)
        .await?;
        row.map(conversation_from_row).transpose()
    }
}

fn conversation_from_row(row: ConversationRow) -> Result<Conversation, StoreError> {
    let (id, customer_contact, business_contact, created_at, updated_at) = row;
    Ok(Conversation {
        id,
        customer_contact,
        business_contact,
        created_at: parse_ts("created_at", &created_at)?,
        updated_at: parse_ts("updated_at", &updated_at)?,
        messages: None,
    })
}

fn message_from_row(row: MessageRow) -> Result<Message, StoreError> {
    let (
        id,
        conversation_id,
        from,
        to,
        message_type,
        body,
        attachments,
        messaging_provider_id,
        status,
        error_code,
        error_message,
        timestamp,
        created_at,
        updated_at,
    ) = row;
    Ok(Message {
        id,
        conversation_id,
        from,
        to,
        message_type: MessageType::parse(&message_type).ok_or_else(|| {
            StoreError::InvalidEnum {
                field: "message_type",
                value: message_type.clone(),
            }
        })?,
        body,
        attachments: serde_json::from_str(&attachments)?,
        status: MessageStatus::parse(&status).ok_or_else(|| StoreError::InvalidEnum {
            field: "status",
            value: status.clone(),
        })?,
        error_code,
        error_message,
        messaging_provider_id,
        timestamp: parse_ts("timestamp", &timestamp)?,
        created_at: parse_ts("created_at", &created_at)?,
        updated_at: parse_ts("updated_at", &updated_at)?,
    })
}

/// Append the listing filters shared by the count and page queries.
fn push_filters(qb: &mut QueryBuilder<'_, Sqlite>, query: &ConversationQuery) {
    if let Some(from) = &query.from {
        qb.push(" AND updated_at >= ").push_bind(format_ts(from));
    }
    if let Some(to) = &query.to {
        qb.push(" AND updated_at <= ").push_bind(format_ts(to));
    }
    if let Some(search) = query.search.as_deref().filter(|s| !s.is_empty()) {
        let pattern = like_pattern(search);
        qb.push(" AND (customer_contact LIKE ")
            .push_bind(pattern.clone())
            .push(r" ESCAPE '\' OR business_contact LIKE ")
            .push_bind(pattern)
            .push(r" ESCAPE '\')");
    }
    for filter in [&query.business_email, &query.business_phone] {
        if let Some(value) = filter.as_deref().filter(|s| !s.is_empty()) {
            qb.push(" AND business_contact LIKE ")
                .push_bind(like_pattern(value))
                .push(r" ESCAPE '\'");
        }
    }
    if let Some(message_type) = query.message_type {
        qb.push(
            " AND EXISTS (SELECT 1 FROM messages m \
             WHERE m.conversation_id = conversations.id AND m.message_type = ",
        )
        .push_bind(message_type.as_str())
        .push(")");
    }
}

#[async_trait]
impl ConversationStore for SqliteStore {
    async fn get_or_create(
        &self,
        customer_contact: &str,
        business_contact: &str,
    ) -> Result<Conversation, StoreError> {
        if let Some(existing) = self
            .find_by_contacts(customer_contact, business_contact)
            .await?
        {
            return Ok(existing);
        }

        let now = format_ts(&Utc::now());
        let inserted = sqlx::query(
            "INSERT INTO conversations (customer_contact, business_contact, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?3) \
             ON CONFLICT (customer_contact, business_contact) DO NOTHING",
        )
        .bind(customer_contact)
        .bind(business_contact)
        .bind(&now)
        .execute(&self.db)
        .await?;
        if inserted.rows_affected() > 0 {
            trace!(customer_contact, business_contact, "conversation created");
        }

        self.find_by_contacts(customer_contact, business_contact)
            .await?
            .ok_or(StoreError::Database(sqlx::Error::RowNotFound))
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Conversation>, StoreError> {
        let row: Option<ConversationRow> = sqlx::query_as(&format!(
            "SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        row.map(conversation_from_row).transpose()
    }

    async fn list(
        &self,
        query: &ConversationQuery,
    ) -> Result<(Vec<Conversation>, u64), StoreError> {
        let mut count_qb: QueryBuilder<'_, Sqlite> =
            QueryBuilder::new("SELECT COUNT(*) FROM conversations WHERE 1=1");
        push_filters(&mut count_qb, query);
        let (total,): (i64,) = count_qb.build_query_as().fetch_one(&self.db).await?;

        let mut page_qb: QueryBuilder<'_, Sqlite> = QueryBuilder::new(format!(
            "SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE 1=1"
        ));
        push_filters(&mut page_qb, query);
        page_qb.push(format!(
            " ORDER BY {} {}, id ASC",
            query.effective_sort_by().column(),
            query.effective_sort_order().keyword()
        ));
        page_qb
            .push(" LIMIT ")
            .push_bind(i64::from(query.effective_limit()))
            .push(" OFFSET ")
            .push_bind(i64::from(query.effective_offset()));

        let rows: Vec<ConversationRow> = page_qb.build_query_as().fetch_all(&self.db).await?;
        let conversations = rows
            .into_iter()
            .map(conversation_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        // count(*) is never negative.
        Ok((conversations, u64::try_from(total).unwrap_or(0)))
    }
}

#[async_trait]
impl MessageStore for SqliteStore {
    async fn create(&self, message: NewMessage) -> Result<Message, StoreError> {
        let now = Utc::now().trunc_subsecs(6);
        let now_text = format_ts(&now);
        let timestamp = message.timestamp.trunc_subsecs(6);
        let attachments = serde_json::to_string(&message.attachments)?;

        let mut tx = self.db.begin().await?;
        let inserted = sqlx::query(
            "INSERT INTO messages (conversation_id, from_address, to_address, message_type, body, \
             attachments, provider_message_id, status, timestamp, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)",
        )
        .bind(message.conversation_id)
        .bind(&message.from)
        .bind(&message.to)
        .bind(message.message_type.as_str())
        .bind(&message.body)
        .bind(&attachments)
        .bind(&message.messaging_provider_id)
        .bind(message.status.as_str())
        .bind(format_ts(&timestamp))
        .bind(&now_text)
        .execute(&mut *tx)
        .await;

        let inserted = match inserted {
            Ok(result) => result,
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                return Err(StoreError::DuplicateProviderMessageId(
                    message.messaging_provider_id.unwrap_or_default(),
                ));
            }
            Err(sqlx::Error::Database(db_err)) if db_err.is_foreign_key_violation() => {
                return Err(StoreError::ConversationNotFound(message.conversation_id));
            }
            Err(err) => return Err(err.into()),
        };
        let id = inserted.last_insert_rowid();

        sqlx::query("UPDATE conversations SET updated_at = ?1 WHERE id = ?2")
            .bind(&now_text)
            .bind(message.conversation_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        trace!(
            message_id = id,
            conversation_id = message.conversation_id,
            "message saved"
        );

        Ok(Message {
            id,
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
            timestamp,
            created_at: now,
            updated_at: now,
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Message>, StoreError> {
        let row: Option<MessageRow> =
            sqlx::query_as(&format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1"))
                .bind(id)
                .fetch_optional(&self.db)
                .await?;
        row.map(message_from_row).transpose()
    }

    async fn get_by_conversation_id(
        &self,
        conversation_id: i64,
    ) -> Result<Vec<Message>, StoreError> {
        let rows: Vec<MessageRow> = sqlx::query_as(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages \
             WHERE conversation_id = ?1 \
             ORDER BY created_at ASC, id ASC"
        ))
        .bind(conversation_id)
        .fetch_all(&self.db)
        .await?;
        rows.into_iter().map(message_from_row).collect()
    }

    async fn get_by_provider_message_id(
        &self,
        provider_message_id: &str,
    ) -> Result<Option<Message>, StoreError> {
        let row: Option<MessageRow> = sqlx::query_as(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE provider_message_id = ?1"
        ))
        .bind(provider_message_id)
        .fetch_optional(&self.db)
        .await?;
        row.map(message_from_row).transpose()
    }

    async fn update(&self, message: &Message) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE messages SET status = ?1, error_code = ?2, error_message = ?3, updated_at = ?4 \
             WHERE id = ?5",
        )
        .bind(message.status.as_str())
        .bind(&message.error_code)
        .bind(&message.error_message)
        .bind(format_ts(&Utc::now()))
        .bind(message.id)
        .execute(&self.db)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::MessageNotFound(message.id));
        }
        trace!(
            message_id = message.id,
            status = message.status.as_str(),
            "message status updated"
        );
        Ok(())
    }
}
