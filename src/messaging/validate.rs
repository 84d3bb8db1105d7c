//! Request and webhook validation.
//!
//! Checks run in a fixed order and stop at the first failure: required
//! fields, message type, then the timestamp policy. Validation has no side
//! effects. `now` is passed in so the time window is testable.

use chrono::{DateTime, Duration, FixedOffset, Months, NaiveDate, SecondsFormat, TimeZone, Utc};

use super::MessagingError;
use crate::types::{
    InboundEmailWebhook, InboundSmsWebhook, MessageType, SendEmailRequest, SendSmsRequest,
};

/// Allowed clock skew for timestamps in the future, in seconds.
pub const MAX_FUTURE_SKEW_SECS: i64 = 300;

/// Oldest accepted timestamp, relative to now, in months (ten years).
pub const MAX_AGE_MONTHS: u32 = 120;

/// Fields that passed validation, in the form the core stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Validated {
    /// Parsed message type.
    pub message_type: MessageType,
    /// Business time in UTC.
    pub timestamp: DateTime<Utc>,
}

fn require(field: &'static str, value: &str, what: &str) -> Result<(), MessagingError> {
    if value.trim().is_empty() {
        return Err(MessagingError::invalid(field, format!("{what} cannot be empty")));
    }
    Ok(())
}

fn require_addresses(from: &str, to: &str, body: &str) -> Result<(), MessagingError> {
    require("from", from, "from address")?;
    require("to", to, "to address")?;
    require("body", body, "message body")
}

fn sms_type(raw: &str) -> Result<MessageType, MessagingError> {
    match MessageType::parse(raw) {
        Some(t @ (MessageType::Sms | MessageType::Mms)) => Ok(t),
        _ => Err(MessagingError::invalid(
            "type",
            format!("invalid message type: {raw}"),
        )),
    }
}

/// Validate an outbound SMS/MMS request.
///
/// # Errors
///
/// Returns [`MessagingError::InvalidRequest`] naming the first bad field.
pub fn validate_sms_request(
    req: &SendSmsRequest,
    now: DateTime<Utc>,
) -> Result<Validated, MessagingError> {
    require_addresses(&req.from, &req.to, &req.body)?;
    let message_type = sms_type(&req.message_type)?;
    let timestamp = validate_timestamp(req.timestamp, now)?;
    Ok(Validated {
        message_type,
        timestamp,
    })
}

/// Validate an outbound email request.
///
/// # Errors
///
/// Returns [`MessagingError::InvalidRequest`] naming the first bad field.
pub fn validate_email_request(
    req: &SendEmailRequest,
    now: DateTime<Utc>,
) -> Result<Validated, MessagingError> {
    require_addresses(&req.from, &req.to, &req.body)?;
    let timestamp = validate_timestamp(req.timestamp, now)?;
    Ok(Validated {
        message_type: MessageType::Email,
        timestamp,
    })
}

/// Validate an inbound SMS/MMS webhook.
///
/// # Errors
///
/// Returns [`MessagingError::InvalidRequest`] naming the first bad field.
pub fn validate_inbound_sms(
    hook: &InboundSmsWebhook,
    now: DateTime<Utc>,
) -> Result<Validated, MessagingError> {
    require_addresses(&hook.from, &hook.to, &hook.body)?;
    require(
        "messaging_provider_id",
        &hook.messaging_provider_id,
        "messaging provider ID",
    )?;
    let message_type = sms_type(&hook.message_type)?;
    let timestamp = validate_timestamp(hook.timestamp, now)?;
    Ok(Validated {
        message_type,
        timestamp,
    })
}

/// Validate an inbound email webhook.
///
/// # Errors
///
/// Returns [`MessagingError::InvalidRequest`] naming the first bad field.
pub fn validate_inbound_email(
    hook: &InboundEmailWebhook,
    now: DateTime<Utc>,
) -> Result<Validated, MessagingError> {
    require_addresses(&hook.from, &hook.to, &hook.body)?;
    require("xillio_id", &hook.xillio_id, "xillio ID")?;
    let timestamp = validate_timestamp(hook.timestamp, now)?;
    Ok(Validated {
        message_type: MessageType::Email,
        timestamp,
    })
}

/// The instant treated as "unset" when a client sends a zero time value.
fn zero_instant() -> Option<DateTime<Utc>> {
    NaiveDate::from_ymd_opt(1, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// Earliest business time the service accepts.
fn year_2000() -> Option<DateTime<Utc>> {
    Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).single()
}

/// Apply the timestamp policy and return the timestamp in UTC.
///
/// Rejects, in order: a non-UTC offset, an unset or zero time, more than five
/// minutes in the future, older than ten years, before 2000-01-01. The age
/// check runs before the year-2000 check, so pre-2000 times report as too old.
///
/// # Errors
///
/// Returns [`MessagingError::InvalidRequest`] on field `timestamp`.
pub fn validate_timestamp(
    timestamp: Option<DateTime<FixedOffset>>,
    now: DateTime<Utc>,
) -> Result<DateTime<Utc>, MessagingError> {
    let Some(timestamp) = timestamp else {
        return Err(MessagingError::invalid("timestamp", "timestamp cannot be zero"));
    };
    if timestamp.offset().local_minus_utc() != 0 {
        return Err(MessagingError::invalid(
            "timestamp",
            "timestamp must be in UTC timezone",
        ));
    }
    let timestamp = timestamp.with_timezone(&Utc);

    if zero_instant() == Some(timestamp) {
        return Err(MessagingError::invalid("timestamp", "timestamp cannot be zero"));
    }

    let max_future = now.checked_add_signed(Duration::seconds(MAX_FUTURE_SKEW_SECS)).unwrap_or(now);
    if timestamp > max_future {
        return Err(MessagingError::invalid(
            "timestamp",
            format!(
                "timestamp cannot be in the future (max allowed: {})",
                max_future.to_rfc3339_opts(SecondsFormat::Secs, true)
            ),
        ));
    }

    if let Some(min_past) = now.checked_sub_months(Months::new(MAX_AGE_MONTHS)) {
        if timestamp < min_past {
            return Err(MessagingError::invalid(
                "timestamp",
                format!(
                    "timestamp too old (min allowed: {})",
                    min_past.to_rfc3339_opts(SecondsFormat::Secs, true)
                ),
            ));
        }
    }

    if year_2000().is_some_and(|floor| timestamp < floor) {
        return Err(MessagingError::invalid(
            "timestamp",
            "timestamp before year 2000 is not allowed",
        ));
    }

    Ok(timestamp)
}
