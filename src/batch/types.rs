//! Batch job request and per-item outcome types.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Which candidate set a batch job covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchScope {
    /// Every pending email across campaigns (single bulk fetch).
    AllPending,
    /// Pending emails of one campaign, resolved by name at fetch time.
    Campaign(String),
}

impl BatchScope {
    /// Human-readable scope label for logs.
    pub fn label(&self) -> String {
        match self {
            Self::AllPending => "all pending emails".to_string(),
            Self::Campaign(name) => format!("campaign '{name}'"),
        }
    }
}

/// A batch-processing job request.
#[derive(Debug, Clone)]
pub struct JobRequest {
    pub scope: BatchScope,
    /// When true, generated replies are actually dispatched through the
    /// provider. When false, replies are generated for review only.
    pub auto_reply: bool,
    /// Overrides the per-item sender address as the borrower's name.
    pub borrower_name: Option<String>,
    /// Free-form context forwarded to the reply generator.
    pub context: HashMap<String, serde_json::Value>,
    /// Sending account override; defaults to the account the item arrived on.
    pub eaccount: Option<String>,
}

impl JobRequest {
    pub fn new(scope: BatchScope) -> Self {
        Self {
            scope,
            auto_reply: false,
            borrower_name: None,
            context: HashMap::new(),
            eaccount: None,
        }
    }

    pub fn with_auto_reply(mut self, auto_reply: bool) -> Self {
        self.auto_reply = auto_reply;
        self
    }

    pub fn with_borrower_name(mut self, name: impl Into<String>) -> Self {
        self.borrower_name = Some(name.into());
        self
    }
}

/// Terminal status of one processed item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    /// Reply generated but not sent (review-only batch).
    GeneratedOnly,
    /// Reply generated and dispatched through the provider.
    Approved,
    /// Item failed; `error` carries the detail.
    Error,
}

/// Outcome record for one processed candidate. Each item contributes
/// exactly one of these, success or failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemOutcome {
    pub item_id: String,
    /// Sender address of the original email.
    pub sender: String,
    pub status: OutcomeStatus,
    /// Generated reply body; absent on error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply: Option<String>,
    /// Delivery id returned by the provider on a successful send.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ItemOutcome {
    /// Build an error outcome preserving the failure detail.
    pub fn error(item_id: impl Into<String>, sender: impl Into<String>, detail: String) -> Self {
        Self {
            item_id: item_id.into(),
            sender: sender.into(),
            status: OutcomeStatus::Error,
            reply: None,
            reply_id: None,
            error: Some(detail),
        }
    }
}

/// Why a candidate was excluded before processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Marked processed by the dedup cache within its TTL.
    AlreadyProcessed,
    /// The provider's own outbound echo, not a borrower email.
    SentItem,
    /// Same item id surfaced twice in one fetch.
    DuplicateInBatch,
}

/// An item excluded during filtering, tagged with its reason.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkippedItem {
    pub item_id: String,
    pub reason: SkipReason,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_labels() {
        assert_eq!(BatchScope::AllPending.label(), "all pending emails");
        assert_eq!(
            BatchScope::Campaign("Q1".into()).label(),
            "campaign 'Q1'"
        );
    }

    #[test]
    fn outcome_status_serializes_snake_case() {
        let json = serde_json::to_string(&OutcomeStatus::GeneratedOnly).unwrap();
        assert_eq!(json, r#""generated_only""#);
        let json = serde_json::to_string(&SkipReason::AlreadyProcessed).unwrap();
        assert_eq!(json, r#""already_processed""#);
    }
}
