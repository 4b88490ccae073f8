//! Instantly.ai mail provider — v2 HTTP API client.
//!
//! Pending emails come from `GET /api/v2/emails` (the v2 API has no
//! campaign filter, so campaign scope is filtered client-side on
//! `campaign_id`). Replies go through `POST /api/v2/emails/reply`, keyed by
//! the email id (not the thread id) and requiring the sending `eaccount`.
//!
//! Transient 5xx responses are retried here with a short backoff; 429s are
//! surfaced as `ProviderError::RateLimited` for the retry controller to
//! handle with its larger budget.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Method, StatusCode};
use secrecy::ExposeSecret;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::InstantlyConfig;
use crate::error::ProviderError;

use super::{Campaign, EmailItem, FetchScope, MailProvider, OutgoingEmail, OutgoingReply};

/// Attempts for transient 5xx responses (including the first).
const SERVER_ERROR_ATTEMPTS: u32 = 3;

/// Campaign listing page size for name resolution.
const CAMPAIGN_PAGE_SIZE: usize = 100;

/// Instantly.ai API client.
pub struct InstantlyProvider {
    client: reqwest::Client,
    config: InstantlyConfig,
}

impl InstantlyProvider {
    pub fn new(config: InstantlyConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.base_url)
    }

    /// Issue one API request, retrying transient 5xx responses.
    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
        query: &[(&str, String)],
    ) -> Result<serde_json::Value, ProviderError> {
        let mut delay = Duration::from_secs(2);

        for attempt in 1..=SERVER_ERROR_ATTEMPTS {
            let mut req = self
                .client
                .request(method.clone(), self.url(path))
                .bearer_auth(self.config.api_key.expose_secret())
                .query(query);
            if let Some(json) = body {
                req = req.json(json);
            }

            let resp = req
                .send()
                .await
                .map_err(|e| ProviderError::Http(e.to_string()))?;
            let status = resp.status();

            if status.is_success() {
                return resp
                    .json()
                    .await
                    .map_err(|e| ProviderError::InvalidResponse(e.to_string()));
            }

            let retry_after = retry_after_hint(resp.headers());
            let message = resp.text().await.unwrap_or_default();

            match status {
                StatusCode::TOO_MANY_REQUESTS => {
                    return Err(ProviderError::RateLimited {
                        message,
                        retry_after,
                    });
                }
                StatusCode::UNAUTHORIZED => {
                    return Err(ProviderError::AuthFailed { message });
                }
                s if s.is_server_error() && attempt < SERVER_ERROR_ATTEMPTS => {
                    warn!(
                        status = s.as_u16(),
                        attempt,
                        delay_secs = delay.as_secs(),
                        "Instantly server error; retrying"
                    );
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
                s => {
                    return Err(ProviderError::Api {
                        status: s.as_u16(),
                        message,
                    });
                }
            }
        }

        unreachable!("request loop returns on the final attempt")
    }
}

#[async_trait]
impl MailProvider for InstantlyProvider {
    async fn fetch_pending(
        &self,
        scope: &FetchScope,
        limit: usize,
    ) -> Result<Vec<EmailItem>, ProviderError> {
        let query = [
            ("limit", limit.to_string()),
            ("is_unread", "true".to_string()),
        ];
        let raw = self
            .request(Method::GET, "/api/v2/emails", None, &query)
            .await?;

        let envelope: EmailEnvelope = serde_json::from_value(raw)
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        let mut items: Vec<EmailItem> =
            envelope.items.into_iter().map(EmailItem::from).collect();
        if let FetchScope::Campaign(campaign_id) = scope {
            items.retain(|item| item.campaign_id.as_deref() == Some(campaign_id));
        }

        debug!(count = items.len(), "Fetched pending emails");
        Ok(items)
    }

    async fn fetch_email(&self, id: &str) -> Result<EmailItem, ProviderError> {
        let raw = self
            .request(Method::GET, &format!("/api/v2/emails/{id}"), None, &[])
            .await?;
        let wire: WireEmail = serde_json::from_value(raw)
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;
        Ok(EmailItem::from(wire))
    }

    async fn resolve_campaign(&self, name: &str) -> Result<Campaign, ProviderError> {
        let query = [("limit", CAMPAIGN_PAGE_SIZE.to_string())];
        let raw = self
            .request(Method::GET, "/api/v2/campaigns", None, &query)
            .await?;

        let envelope: CampaignEnvelope = serde_json::from_value(raw)
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        envelope
            .items
            .into_iter()
            .find(|c| c.name == name)
            .ok_or_else(|| ProviderError::CampaignNotFound { name: name.into() })
    }

    async fn send_reply(&self, reply: &OutgoingReply) -> Result<String, ProviderError> {
        let mut body = serde_json::json!({ "text": reply.body });
        if let Some(html) = &reply.html_body {
            body["html"] = serde_json::Value::String(html.clone());
        }

        let payload = serde_json::json!({
            "reply_to_uuid": reply.reply_to,
            "subject": reply_subject(&reply.subject),
            "body": body,
            "eaccount": reply.eaccount,
        });

        let raw = self
            .request(Method::POST, "/api/v2/emails/reply", Some(&payload), &[])
            .await?;

        raw.get("id")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| {
                ProviderError::InvalidResponse("reply response missing 'id'".into())
            })
    }

    async fn send_email(&self, email: &OutgoingEmail) -> Result<String, ProviderError> {
        // The v2 API has no standalone send endpoint; a one-lead campaign
        // with an immediate schedule is how a single email goes out.
        let subject_slug: String = email.subject.chars().take(50).collect();
        let payload = serde_json::json!({
            "name": format!("Quick Send - {subject_slug}"),
            "subject": email.subject,
            "content": email.html_body.as_deref().unwrap_or(&email.body),
            "from_name": email.eaccount.as_deref().unwrap_or("Borrower Support"),
            "eaccount": email.eaccount,
            "campaign_schedule": {
                "schedules": [{
                    "name": "Immediate Send",
                    "timing": { "from": "00:00", "to": "23:59" },
                    "days": {
                        "0": true, "1": true, "2": true, "3": true,
                        "4": true, "5": true, "6": true
                    },
                    "timezone": "UTC"
                }]
            },
            "leads": [{ "email": email.to, "first_name": "", "last_name": "" }]
        });

        let raw = self
            .request(Method::POST, "/api/v2/campaigns", Some(&payload), &[])
            .await?;
        let campaign_id = raw
            .get("id")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| {
                ProviderError::InvalidResponse("campaign response missing 'id'".into())
            })?;

        self.request(
            Method::POST,
            &format!("/api/v2/campaigns/{campaign_id}/activate"),
            None,
            &[],
        )
        .await?;

        debug!(campaign_id = %campaign_id, to = %email.to, "Dispatched quick-send campaign");
        Ok(campaign_id)
    }
}

/// Prefix the subject with "Re: " unless it already carries one, in any
/// casing.
fn reply_subject(subject: &str) -> String {
    let already_reply = subject
        .get(..3)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("re:"));
    if subject.is_empty() || already_reply {
        subject.to_string()
    } else {
        format!("Re: {subject}")
    }
}

/// Seconds hint from a `Retry-After` header, padded by one second. Date-form
/// values are ignored.
fn retry_after_hint(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(|secs| Duration::from_secs(secs + 1))
}

// ── Wire models ─────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct EmailEnvelope {
    #[serde(default)]
    items: Vec<WireEmail>,
}

#[derive(Debug, Deserialize)]
struct CampaignEnvelope {
    #[serde(default)]
    items: Vec<Campaign>,
}

/// Sent-item marker in the v2 email payload.
const UE_TYPE_SENT: i64 = 1;

#[derive(Debug, Deserialize)]
struct WireEmail {
    id: String,
    thread_id: Option<String>,
    lead: Option<String>,
    subject: Option<String>,
    body: Option<WireBody>,
    campaign_id: Option<String>,
    ue_type: Option<i64>,
    eaccount: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireBody {
    text: Option<String>,
    html: Option<String>,
}

impl From<WireEmail> for EmailItem {
    fn from(wire: WireEmail) -> Self {
        let body_text = wire
            .body
            .and_then(|b| b.text.filter(|t| !t.is_empty()).or(b.html))
            .unwrap_or_default();

        Self {
            id: wire.id,
            thread_id: wire.thread_id,
            sender: wire.lead.unwrap_or_default(),
            subject: wire.subject.unwrap_or_default(),
            body_text,
            campaign_id: wire.campaign_id,
            is_sent_item: wire.ue_type == Some(UE_TYPE_SENT),
            eaccount: wire.eaccount,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wire(value: serde_json::Value) -> EmailItem {
        let wire: WireEmail = serde_json::from_value(value).unwrap();
        EmailItem::from(wire)
    }

    #[test]
    fn wire_email_maps_fields() {
        let item = wire(serde_json::json!({
            "id": "e-1",
            "thread_id": "t-1",
            "lead": "borrower@example.com",
            "subject": "Loan settlement",
            "body": { "text": "I want to pay", "html": "<p>I want to pay</p>" },
            "campaign_id": "c-1",
            "ue_type": 2,
            "eaccount": "support@riverline.com"
        }));

        assert_eq!(item.id, "e-1");
        assert_eq!(item.sender, "borrower@example.com");
        assert_eq!(item.body_text, "I want to pay");
        assert!(!item.is_sent_item);
        assert_eq!(item.eaccount.as_deref(), Some("support@riverline.com"));
    }

    #[test]
    fn wire_email_falls_back_to_html_body() {
        let item = wire(serde_json::json!({
            "id": "e-2",
            "body": { "html": "<p>hello</p>" }
        }));
        assert_eq!(item.body_text, "<p>hello</p>");
    }

    #[test]
    fn sent_items_are_flagged() {
        let item = wire(serde_json::json!({ "id": "e-3", "ue_type": 1 }));
        assert!(item.is_sent_item);
    }

    #[test]
    fn reply_subject_prefixes_once() {
        assert_eq!(reply_subject("Loan settlement"), "Re: Loan settlement");
        assert_eq!(reply_subject("Re: Loan settlement"), "Re: Loan settlement");
        assert_eq!(reply_subject(""), "");
    }

    #[test]
    fn reply_subject_recognizes_existing_prefix_case_insensitively() {
        assert_eq!(reply_subject("RE: Loan settlement"), "RE: Loan settlement");
        assert_eq!(reply_subject("re: loan"), "re: loan");
    }

    #[test]
    fn retry_after_header_parses_as_padded_seconds() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, "30".parse().unwrap());
        assert_eq!(retry_after_hint(&headers), Some(Duration::from_secs(31)));
    }

    #[test]
    fn retry_after_date_form_is_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(
            RETRY_AFTER,
            "Wed, 21 Oct 2026 07:28:00 GMT".parse().unwrap(),
        );
        assert_eq!(retry_after_hint(&headers), None);
        assert_eq!(retry_after_hint(&HeaderMap::new()), None);
    }
}
