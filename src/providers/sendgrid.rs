//! SendGrid email sender using the v3 `mail/send` API.

use std::time::Duration;

use serde::Serialize;
use tracing::debug;
use url::Url;

use super::{check_http_response, EmailSender, ProviderError};

/// Public SendGrid API root.
pub const SENDGRID_API_BASE: &str = "https://api.sendgrid.com/";

const MAIL_SEND_PATH: &str = "v3/mail/send";
const DEFAULT_SUBJECT: &str = "New message";

// ---------------------------------------------------------------------------
// Wire types (pub for integration testing)
// ---------------------------------------------------------------------------

/// `mail/send` request body.
#[doc(hidden)]
#[derive(Debug, Serialize)]
pub struct MailSendRequest {
    /// One personalization per recipient set.
    pub personalizations: Vec<Personalization>,
    /// Sender.
    pub from: EmailAddress,
    /// Subject line.
    pub subject: String,
    /// Body parts.
    pub content: Vec<Content>,
}

/// Recipient block.
#[doc(hidden)]
#[derive(Debug, Serialize)]
pub struct Personalization {
    /// Recipients.
    pub to: Vec<EmailAddress>,
}

/// An email address object.
#[doc(hidden)]
#[derive(Debug, Serialize)]
pub struct EmailAddress {
    /// Address.
    pub email: String,
}

/// A body part.
#[doc(hidden)]
#[derive(Debug, Serialize)]
pub struct Content {
    /// MIME type.
    #[serde(rename = "type")]
    pub mime_type: String,
    /// Body text.
    pub value: String,
}

/// Build the `mail/send` payload.
///
/// Attachments are URIs, so they are linked from the body rather than
/// fetched and inlined.
#[doc(hidden)]
pub fn build_request(from: &str, to: &str, body: &str, attachments: &[String]) -> MailSendRequest {
    let mut value = body.to_owned();
    for uri in attachments {
        value.push_str(&format!("<br><a href=\"{uri}\">{uri}</a>"));
    }
    MailSendRequest {
        personalizations: vec![Personalization {
            to: vec![EmailAddress {
                email: to.to_owned(),
            }],
        }],
        from: EmailAddress {
            email: from.to_owned(),
        },
        subject: DEFAULT_SUBJECT.to_owned(),
        content: vec![Content {
            mime_type: "text/html".to_owned(),
            value,
        }],
    }
}

// ---------------------------------------------------------------------------
// Sender
// ---------------------------------------------------------------------------

/// SendGrid-backed [`EmailSender`].
#[derive(Debug, Clone)]
pub struct SendGridEmailSender {
    api_key: String,
    endpoint: Url,
    client: reqwest::Client,
}

impl SendGridEmailSender {
    /// Create a sender against `base_url` (normally [`SENDGRID_API_BASE`]).
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL is invalid or the HTTP client cannot
    /// be built.
    pub fn new(api_key: String, base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let base = Url::parse(base_url)
            .map_err(|e| anyhow::anyhow!("invalid sendgrid base url {base_url:?}: {e}"))?;
        let endpoint = base
            .join(MAIL_SEND_PATH)
            .map_err(|e| anyhow::anyhow!("invalid sendgrid endpoint: {e}"))?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build sendgrid client: {e}"))?;
        Ok(Self {
            api_key,
            endpoint,
            client,
        })
    }

    /// Resolved `mail/send` URL.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait::async_trait]
impl EmailSender for SendGridEmailSender {
    async fn send_email(
        &self,
        from: &str,
        to: &str,
        body: &str,
        attachments: &[String],
    ) -> Result<(), ProviderError> {
        let payload = build_request(from, to, body, attachments);
        debug!(to, attachments = attachments.len(), "sending email via sendgrid");

        let response = self
            .client
            .post(self.endpoint.clone())
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        check_http_response(response).await
    }
}
