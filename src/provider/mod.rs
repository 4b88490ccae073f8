//! Mail-provider boundary — the outbound transport the batch engine talks to.

mod instantly;

pub use instantly::InstantlyProvider;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;

/// One candidate borrower email awaiting a reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailItem {
    pub id: String,
    pub thread_id: Option<String>,
    /// The borrower's address.
    pub sender: String,
    pub subject: String,
    pub body_text: String,
    pub campaign_id: Option<String>,
    /// True for the provider's own outbound echo (not a borrower email).
    pub is_sent_item: bool,
    /// Mailbox account the item arrived on; required for sending a reply.
    pub eaccount: Option<String>,
}

/// A provider campaign, resolved by name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Campaign {
    pub id: String,
    pub name: String,
}

/// Which pending emails to fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchScope {
    /// Every pending email (single bulk fetch).
    All,
    /// Pending emails belonging to one campaign id.
    Campaign(String),
}

/// A standalone outbound email, not tied to an existing thread.
#[derive(Debug, Clone)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub body: String,
    pub html_body: Option<String>,
    pub eaccount: Option<String>,
}

/// A reply ready for dispatch.
#[derive(Debug, Clone)]
pub struct OutgoingReply {
    /// Id of the email being replied to (the email id, not the thread id).
    pub reply_to: String,
    pub subject: String,
    pub body: String,
    pub html_body: Option<String>,
    /// Sending account. Required by the provider.
    pub eaccount: String,
}

/// External mail transport: fetches candidate emails and dispatches replies.
#[async_trait]
pub trait MailProvider: Send + Sync {
    /// Fetch up to `limit` pending emails within `scope`.
    async fn fetch_pending(
        &self,
        scope: &FetchScope,
        limit: usize,
    ) -> Result<Vec<EmailItem>, ProviderError>;

    /// Fetch one email by id.
    async fn fetch_email(&self, id: &str) -> Result<EmailItem, ProviderError>;

    /// Resolve a campaign by its display name.
    async fn resolve_campaign(&self, name: &str) -> Result<Campaign, ProviderError>;

    /// Dispatch a reply. Returns the provider's delivery id.
    async fn send_reply(&self, reply: &OutgoingReply) -> Result<String, ProviderError>;

    /// Dispatch a standalone email. Returns the provider's delivery id.
    async fn send_email(&self, email: &OutgoingEmail) -> Result<String, ProviderError>;
}
