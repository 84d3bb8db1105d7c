//! Courier CLI entry point.
//!
//! Each subcommand loads configuration, opens the store, runs one messaging
//! operation, and prints the result as JSON. Ctrl-C cancels the operation in
//! flight.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use courier::config::CourierConfig;
use courier::messaging::conversations::ConversationService;
use courier::messaging::service::MessagingService;
use courier::messaging::MessagingError;
use courier::providers::mock::MockSmsSender;
use courier::providers::build_email_sender;
use courier::store::memory::InMemoryStore;
use courier::store::sqlite::SqliteStore;
use courier::store::{ConversationStore, MessageStore};
use courier::types::{
    ConversationQuery, InboundEmailWebhook, InboundSmsWebhook, MessageType, SendEmailRequest,
    SendSmsRequest, SortField, SortOrder, MAX_PAGE_LIMIT,
};

/// Courier: unified SMS, MMS and email conversations.
#[derive(Parser)]
#[command(name = "courier", version, about)]
struct Cli {
    /// Use a throwaway in-memory store instead of the SQLite database.
    #[arg(long, global = true)]
    ephemeral: bool,

    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

/// Available CLI subcommands.
#[derive(Subcommand)]
enum Command {
    /// Create the database and apply the schema.
    Init,
    /// Send an SMS or MMS.
    SendSms {
        /// Sender number.
        #[arg(long)]
        from: String,
        /// Recipient number.
        #[arg(long)]
        to: String,
        /// Message text.
        #[arg(long)]
        body: String,
        /// `sms` or `mms`.
        #[arg(long = "type", default_value = "sms")]
        message_type: String,
        /// Attachment URL (repeatable).
        #[arg(long = "attachment")]
        attachments: Vec<String>,
    },
    /// Send an email.
    SendEmail {
        /// Sender address.
        #[arg(long)]
        from: String,
        /// Recipient address.
        #[arg(long)]
        to: String,
        /// Message body (HTML allowed).
        #[arg(long)]
        body: String,
        /// Attachment URL (repeatable).
        #[arg(long = "attachment")]
        attachments: Vec<String>,
    },
    /// Record an inbound SMS or MMS webhook.
    InboundSms {
        /// Sender number.
        #[arg(long)]
        from: String,
        /// Recipient number.
        #[arg(long)]
        to: String,
        /// Message text.
        #[arg(long)]
        body: String,
        /// Provider message id used for deduplication.
        #[arg(long)]
        provider_id: String,
        /// `sms` or `mms`.
        #[arg(long = "type", default_value = "sms")]
        message_type: String,
        /// Attachment URL (repeatable).
        #[arg(long = "attachment")]
        attachments: Vec<String>,
    },
    /// Record an inbound email webhook.
    InboundEmail {
        /// Sender address.
        #[arg(long)]
        from: String,
        /// Recipient address.
        #[arg(long)]
        to: String,
        /// Message body.
        #[arg(long)]
        body: String,
        /// Provider message id used for deduplication.
        #[arg(long)]
        provider_id: String,
        /// Attachment URL (repeatable).
        #[arg(long = "attachment")]
        attachments: Vec<String>,
    },
    /// List conversations.
    Conversations {
        /// Page size (capped at 100).
        #[arg(long)]
        limit: Option<u32>,
        /// Rows to skip.
        #[arg(long)]
        offset: Option<u32>,
        /// id, created_at, updated_at, customer_contact or business_contact.
        #[arg(long)]
        sort_by: Option<String>,
        /// asc or desc.
        #[arg(long)]
        sort_order: Option<String>,
        /// Case-insensitive match on either contact.
        #[arg(long)]
        search: Option<String>,
        /// Case-insensitive match on the business email.
        #[arg(long)]
        business_email: Option<String>,
        /// Case-insensitive match on the business phone.
        #[arg(long)]
        business_phone: Option<String>,
        /// Only conversations containing this message type.
        #[arg(long)]
        message_type: Option<String>,
        /// Only conversations updated at or after this RFC 3339 time.
        #[arg(long)]
        updated_after: Option<DateTime<Utc>>,
        /// Only conversations updated at or before this RFC 3339 time.
        #[arg(long)]
        updated_before: Option<DateTime<Utc>>,
        /// Attach each conversation's messages.
        #[arg(long)]
        include_messages: bool,
    },
    /// Show a conversation's messages, oldest first.
    Messages {
        /// Conversation id.
        conversation_id: i64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let config = CourierConfig::load().context("failed to load configuration")?;
    courier::logging::init_cli(&config.logging.level);

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, cancelling");
                cancel.cancel();
            }
        }
    });

    let (conversations, messages) = open_store(&config, cli.ephemeral).await?;

    match cli.command {
        Command::Init => {
            let database = if cli.ephemeral {
                ":memory:"
            } else {
                config.database.path.as_str()
            };
            print_json(&serde_json::json!({ "database": database, "status": "ready" }))
        }
        Command::SendSms {
            from,
            to,
            body,
            message_type,
            attachments,
        } => {
            let service = messaging_service(&config, conversations, messages)?;
            let request = SendSmsRequest {
                from,
                to,
                message_type,
                body,
                attachments,
                timestamp: Some(Utc::now().fixed_offset()),
            };
            let message = service.send_sms(&request, &cancel).await.map_err(report)?;
            print_json(&message)
        }
        Command::SendEmail {
            from,
            to,
            body,
            attachments,
        } => {
            let service = messaging_service(&config, conversations, messages)?;
            let request = SendEmailRequest {
                from,
                to,
                body,
                attachments,
                timestamp: Some(Utc::now().fixed_offset()),
            };
            let message = service.send_email(&request, &cancel).await.map_err(report)?;
            print_json(&message)
        }
        Command::InboundSms {
            from,
            to,
            body,
            provider_id,
            message_type,
            attachments,
        } => {
            let service = messaging_service(&config, conversations, messages)?;
            let webhook = InboundSmsWebhook {
                from,
                to,
                message_type,
                messaging_provider_id: provider_id,
                body,
                attachments,
                timestamp: Some(Utc::now().fixed_offset()),
            };
            let outcome = service
                .handle_inbound_sms(&webhook, &cancel)
                .await
                .map_err(report)?;
            print_json(&serde_json::json!({
                "duplicate": outcome.is_duplicate(),
                "message": outcome.message(),
            }))
        }
        Command::InboundEmail {
            from,
            to,
            body,
            provider_id,
            attachments,
        } => {
            let service = messaging_service(&config, conversations, messages)?;
            let webhook = InboundEmailWebhook {
                from,
                to,
                xillio_id: provider_id,
                body,
                attachments,
                timestamp: Some(Utc::now().fixed_offset()),
            };
            let outcome = service
                .handle_inbound_email(&webhook, &cancel)
                .await
                .map_err(report)?;
            print_json(&serde_json::json!({
                "duplicate": outcome.is_duplicate(),
                "message": outcome.message(),
            }))
        }
        Command::Conversations {
            limit,
            offset,
            sort_by,
            sort_order,
            search,
            business_email,
            business_phone,
            message_type,
            updated_after,
            updated_before,
            include_messages,
        } => {
            let message_type = match message_type.as_deref() {
                None => None,
                Some(raw) => Some(
                    MessageType::parse(raw)
                        .with_context(|| format!("unknown message type: {raw}"))?,
                ),
            };
            let query = ConversationQuery {
                business_email,
                business_phone,
                search,
                from: updated_after,
                to: updated_before,
                message_type,
                limit: limit.map(|l| l.min(MAX_PAGE_LIMIT)),
                offset,
                sort_by: sort_by.as_deref().map(SortField::parse_or_default),
                sort_order: sort_order.as_deref().map(SortOrder::parse_or_default),
                include_messages,
            };
            let service = ConversationService::new(conversations, messages);
            let page = service
                .list_conversations(&query, &cancel)
                .await
                .map_err(report)?;
            print_json(&page)
        }
        Command::Messages { conversation_id } => {
            let service = ConversationService::new(conversations, messages);
            let messages = service
                .get_conversation_messages(conversation_id, &cancel)
                .await
                .map_err(report)?;
            print_json(&messages)
        }
    }
}

async fn open_store(
    config: &CourierConfig,
    ephemeral: bool,
) -> anyhow::Result<(Arc<dyn ConversationStore>, Arc<dyn MessageStore>)> {
    if ephemeral {
        info!("using in-memory store");
        let store = Arc::new(InMemoryStore::new());
        let conversations = Arc::clone(&store) as Arc<dyn ConversationStore>;
        let messages: Arc<dyn MessageStore> = store;
        return Ok((conversations, messages));
    }
    let path = Path::new(&config.database.path);
    let store = Arc::new(
        SqliteStore::open(path, config.database.max_connections)
            .await
            .with_context(|| format!("failed to open database {}", path.display()))?,
    );
    let conversations = Arc::clone(&store) as Arc<dyn ConversationStore>;
    let messages: Arc<dyn MessageStore> = store;
    Ok((conversations, messages))
}

fn messaging_service(
    config: &CourierConfig,
    conversations: Arc<dyn ConversationStore>,
    messages: Arc<dyn MessageStore>,
) -> anyhow::Result<MessagingService> {
    let email = build_email_sender(&config.providers).context("failed to build email sender")?;
    Ok(MessagingService::new(
        conversations,
        messages,
        Arc::new(MockSmsSender::new()),
        email,
    )
    .with_retry_policy(config.retry.policy()))
}

fn report(err: MessagingError) -> anyhow::Error {
    let hint = if err.side_effect_taken() {
        "message was delivered but could not be recorded"
    } else if err.is_client_error() {
        "request rejected"
    } else {
        "operation failed"
    };
    anyhow::Error::new(err).context(hint)
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("failed to render output")?;
    println!("{rendered}");
    Ok(())
}
