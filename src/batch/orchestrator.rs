//! Batch orchestrator — drives one job from submission to a terminal status.
//!
//! Flow per job: Fetching → Filtering → Processing → Finalizing. Submission
//! returns the job id immediately; the driver runs on its own task and the
//! caller polls the job tracker. Item-level failures are converted into
//! outcome records at the item boundary and never abort siblings; failures
//! during fetch/filter fail the whole job.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::{BatchConfig, RetryPolicy};
use crate::dedup::DedupCache;
use crate::error::{Error, ProviderError};
use crate::executor;
use crate::generator::{GenerateRequest, ReplyGenerator};
use crate::limiter::RateLimiter;
use crate::progress::{JobStatus, JobTracker};
use crate::provider::{EmailItem, FetchScope, MailProvider, OutgoingReply};
use crate::retry::RetryController;

use super::types::{BatchScope, ItemOutcome, JobRequest, OutcomeStatus, SkipReason};

/// Top-level batch state machine over injected shared state. The tracker,
/// dedup cache and rate limiter are process-wide and shared with any other
/// orchestrators or jobs running concurrently.
pub struct BatchOrchestrator {
    provider: Arc<dyn MailProvider>,
    generator: Arc<dyn ReplyGenerator>,
    tracker: Arc<JobTracker>,
    dedup: Arc<DedupCache>,
    limiter: Arc<RateLimiter>,
    retry: RetryController,
    config: BatchConfig,
}

impl BatchOrchestrator {
    pub fn new(
        provider: Arc<dyn MailProvider>,
        generator: Arc<dyn ReplyGenerator>,
        tracker: Arc<JobTracker>,
        dedup: Arc<DedupCache>,
        limiter: Arc<RateLimiter>,
        retry_policy: RetryPolicy,
        config: BatchConfig,
    ) -> Arc<Self> {
        let retry = RetryController::new(retry_policy, Arc::clone(&tracker));
        Arc::new(Self {
            provider,
            generator,
            tracker,
            dedup,
            limiter,
            retry,
            config,
        })
    }

    pub fn tracker(&self) -> &Arc<JobTracker> {
        &self.tracker
    }

    /// Submit a batch job. Creates the job record, spawns the driver and
    /// returns the job id without waiting for any fetching or processing.
    pub async fn submit(self: &Arc<Self>, request: JobRequest) -> Uuid {
        let job_id = self.tracker.create().await;
        self.tracker
            .log(job_id, format!("Job submitted for {}", request.scope.label()))
            .await;
        info!(job_id = %job_id, scope = %request.scope.label(), auto_reply = request.auto_reply,
            "Batch job submitted");

        let orchestrator = Arc::clone(self);
        tokio::spawn(async move {
            orchestrator.drive(job_id, request).await;
        });

        job_id
    }

    /// Driver entry point: any fetch/filter error fails the whole job.
    async fn drive(&self, job_id: Uuid, request: JobRequest) {
        if let Err(err) = self.run_to_completion(job_id, &request).await {
            error!(job_id = %job_id, error = %err, "Batch job failed");
            self.tracker.log(job_id, format!("Job failed: {err}")).await;
            self.tracker
                .finalize(job_id, JobStatus::Error, Some(err.to_string()))
                .await;
        }
    }

    async fn run_to_completion(&self, job_id: Uuid, request: &JobRequest) -> Result<(), Error> {
        // ── Fetching ────────────────────────────────────────────────
        let scope = self.resolve_scope(job_id, &request.scope).await?;

        let provider = Arc::clone(&self.provider);
        let fetch_limit = self.config.fetch_limit;
        let fetch_scope = scope.clone();
        let items = self
            .retry
            .run(Some(job_id), || {
                let provider = Arc::clone(&provider);
                let scope = fetch_scope.clone();
                async move { provider.fetch_pending(&scope, fetch_limit).await }
            })
            .await?;
        self.tracker
            .log(job_id, format!("Fetched {} candidate email(s)", items.len()))
            .await;

        // ── Filtering ───────────────────────────────────────────────
        let mut seen = HashSet::new();
        let mut to_process = Vec::new();
        for item in items {
            if item.is_sent_item {
                self.tracker
                    .record_skipped(job_id, &item.id, SkipReason::SentItem)
                    .await;
            } else if !seen.insert(item.id.clone()) {
                // The TTL cache only learns about an item after a send
                // completes, so within-batch duplicates need their own set.
                self.tracker
                    .record_skipped(job_id, &item.id, SkipReason::DuplicateInBatch)
                    .await;
            } else if self.dedup.is_processed(&item.id).await {
                self.tracker
                    .record_skipped(job_id, &item.id, SkipReason::AlreadyProcessed)
                    .await;
            } else {
                to_process.push(item);
            }
        }

        let total = to_process.len();
        self.tracker.set_total(job_id, total).await;

        if total == 0 {
            self.tracker.log(job_id, "No emails to process").await;
            self.tracker.finalize(job_id, JobStatus::Completed, None).await;
            return Ok(());
        }

        // ── Processing ──────────────────────────────────────────────
        let concurrency = self.concurrency_for(&request.scope);
        self.tracker
            .log(
                job_id,
                format!("Processing {total} email(s), up to {concurrency} in flight"),
            )
            .await;

        executor::run_bounded(to_process, concurrency, |_, item| {
            self.process_item(job_id, item, request)
        })
        .await;

        // ── Finalizing ──────────────────────────────────────────────
        let job = self.tracker.snapshot(job_id).await?;
        let approved = count_status(&job.results, OutcomeStatus::Approved);
        let generated = count_status(&job.results, OutcomeStatus::GeneratedOnly);
        let errors = count_status(&job.results, OutcomeStatus::Error);
        self.tracker
            .log(
                job_id,
                format!(
                    "Completed: {approved} replied, {generated} generated, {errors} failed, {} skipped",
                    job.skipped_items.len()
                ),
            )
            .await;
        self.tracker.finalize(job_id, JobStatus::Completed, None).await;
        info!(job_id = %job_id, approved, generated, errors, "Batch job completed");
        Ok(())
    }

    /// Translate the request scope into a provider fetch scope, resolving
    /// campaign names. An unknown campaign fails the job.
    async fn resolve_scope(&self, job_id: Uuid, scope: &BatchScope) -> Result<FetchScope, Error> {
        match scope {
            BatchScope::AllPending => Ok(FetchScope::All),
            BatchScope::Campaign(name) => {
                let provider = Arc::clone(&self.provider);
                let campaign_name = name.clone();
                let campaign = self
                    .retry
                    .run(Some(job_id), || {
                        let provider = Arc::clone(&provider);
                        let name = campaign_name.clone();
                        async move { provider.resolve_campaign(&name).await }
                    })
                    .await?;
                self.tracker
                    .log(
                        job_id,
                        format!("Resolved campaign '{}' to {}", campaign.name, campaign.id),
                    )
                    .await;
                Ok(FetchScope::Campaign(campaign.id))
            }
        }
    }

    fn concurrency_for(&self, scope: &BatchScope) -> usize {
        match scope {
            BatchScope::Campaign(_) => self.config.campaign_concurrency,
            BatchScope::AllPending => self.config.inbox_concurrency,
        }
    }

    /// Item boundary: every error becomes an outcome record, so one bad
    /// item can never abort the batch or its siblings.
    async fn process_item(&self, job_id: Uuid, item: EmailItem, request: &JobRequest) {
        self.tracker.start_item(job_id, &item.id).await;

        let outcome = match self.handle_item(job_id, &item, request).await {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(job_id = %job_id, item_id = %item.id, error = %err, "Item failed");
                self.tracker
                    .log(job_id, format!("Email {} failed: {err}", item.id))
                    .await;
                ItemOutcome::error(&item.id, &item.sender, err.to_string())
            }
        };

        self.tracker.record_outcome(job_id, outcome).await;
    }

    async fn handle_item(
        &self,
        job_id: Uuid,
        item: &EmailItem,
        request: &JobRequest,
    ) -> Result<ItemOutcome, Error> {
        let generate_request = GenerateRequest {
            email_body: item.body_text.clone(),
            subject: item.subject.clone(),
            borrower_name: request
                .borrower_name
                .clone()
                .or_else(|| (!item.sender.is_empty()).then(|| item.sender.clone())),
            context: request.context.clone(),
        };
        let generated = self.generator.generate(&generate_request).await?;

        if !request.auto_reply {
            self.tracker
                .log(job_id, format!("Generated reply for {}", item.id))
                .await;
            return Ok(ItemOutcome {
                item_id: item.id.clone(),
                sender: item.sender.clone(),
                status: OutcomeStatus::GeneratedOnly,
                reply: Some(generated.reply),
                reply_id: None,
                error: None,
            });
        }

        let eaccount = request
            .eaccount
            .clone()
            .or_else(|| item.eaccount.clone())
            .ok_or_else(|| ProviderError::MissingAccount {
                item_id: item.id.clone(),
            })?;

        let outgoing = Arc::new(OutgoingReply {
            reply_to: item.id.clone(),
            subject: item.subject.clone(),
            body: generated.reply.clone(),
            html_body: Some(generated.html_body()),
            eaccount,
        });

        // Sends consume the shared rate-limit window; generation above
        // deliberately does not.
        self.limiter.acquire().await;

        let provider = Arc::clone(&self.provider);
        let reply_id = self
            .retry
            .run(Some(job_id), || {
                let provider = Arc::clone(&provider);
                let outgoing = Arc::clone(&outgoing);
                async move { provider.send_reply(&outgoing).await }
            })
            .await?;

        self.dedup.mark_processed(&item.id).await;
        self.tracker
            .log(job_id, format!("Replied to {} ({reply_id})", item.id))
            .await;

        Ok(ItemOutcome {
            item_id: item.id.clone(),
            sender: item.sender.clone(),
            status: OutcomeStatus::Approved,
            reply: Some(generated.reply),
            reply_id: Some(reply_id),
            error: None,
        })
    }
}

fn count_status(results: &[ItemOutcome], status: OutcomeStatus) -> usize {
    results.iter().filter(|o| o.status == status).count()
}
