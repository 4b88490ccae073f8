//! Thin HTTP request layer over the batch engine.
//!
//! Batch submission endpoints return a job id synchronously; all fetching
//! and processing happens on the orchestrator's spawned tasks and is polled
//! through `GET /jobs/{id}`. The single-email endpoints (send, reply,
//! auto-reply to one borrower) run inline and draw from the same rate-limit
//! window as batch sends. When the reply generator is not configured the
//! generation-dependent endpoints answer 503 instead of failing per item.

use std::collections::HashMap;
use std::sync::Arc;

use axum::Router;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use uuid::Uuid;

use crate::batch::BatchOrchestrator;
use crate::batch::types::{BatchScope, JobRequest};
use crate::error::ProviderError;
use crate::generator::{GenerateRequest, ReplyGenerator};
use crate::limiter::RateLimiter;
use crate::progress::JobTracker;
use crate::provider::{MailProvider, OutgoingEmail, OutgoingReply};

/// Shared state for all routes.
#[derive(Clone)]
pub struct AppState {
    pub tracker: Arc<JobTracker>,
    pub provider: Arc<dyn MailProvider>,
    /// Shared with the orchestrator so single and batch sends draw from the
    /// same window.
    pub limiter: Arc<RateLimiter>,
    /// Absent when the generator credential is missing at startup.
    pub orchestrator: Option<Arc<BatchOrchestrator>>,
    pub generator: Option<Arc<dyn ReplyGenerator>>,
}

/// Build the service router.
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/send-email", post(send_email))
        .route("/reply-email", post(reply_email))
        .route("/auto-reply/generate", post(generate_reply))
        .route("/auto-reply/to-borrower", post(auto_reply_to_borrower))
        .route("/campaign/process", post(process_campaign))
        .route("/inbox/process", post(process_inbox))
        .route("/jobs/{id}", get(get_job))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// GET /health
async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "borrower-assist",
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

#[derive(Debug, Deserialize)]
struct SendEmailBody {
    to: String,
    subject: String,
    body: String,
    html_body: Option<String>,
    eaccount: Option<String>,
}

/// POST /send-email — dispatch one standalone email.
async fn send_email(
    State(state): State<AppState>,
    Json(req): Json<SendEmailBody>,
) -> impl IntoResponse {
    let email = OutgoingEmail {
        to: req.to,
        subject: req.subject,
        body: req.body,
        html_body: req.html_body,
        eaccount: req.eaccount,
    };

    state.limiter.acquire().await;
    match state.provider.send_email(&email).await {
        Ok(email_id) => sent("Email sent successfully", email_id),
        Err(err) => provider_failure(err),
    }
}

#[derive(Debug, Deserialize)]
struct ReplyEmailBody {
    /// Id of the email being replied to; `email_id` is accepted as an alias.
    reply_to_uuid: Option<String>,
    email_id: Option<String>,
    body: String,
    html_body: Option<String>,
    subject: Option<String>,
    eaccount: Option<String>,
}

/// POST /reply-email — reply to one existing email.
async fn reply_email(
    State(state): State<AppState>,
    Json(req): Json<ReplyEmailBody>,
) -> impl IntoResponse {
    let Some(email_id) = req.reply_to_uuid.or(req.email_id) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": "reply_to_uuid or email_id is required" })),
        )
            .into_response();
    };

    // Look up the original for its subject and account; fall back to the
    // request's values when the lookup fails.
    let original = state.provider.fetch_email(&email_id).await.ok();
    let subject = req
        .subject
        .or_else(|| original.as_ref().map(|e| e.subject.clone()))
        .unwrap_or_default();
    let Some(eaccount) = req
        .eaccount
        .or_else(|| original.as_ref().and_then(|e| e.eaccount.clone()))
    else {
        return provider_failure(ProviderError::MissingAccount { item_id: email_id });
    };

    let reply = OutgoingReply {
        reply_to: email_id,
        subject,
        body: req.body,
        html_body: req.html_body,
        eaccount,
    };

    state.limiter.acquire().await;
    match state.provider.send_reply(&reply).await {
        Ok(email_id) => sent("Reply sent successfully", email_id),
        Err(err) => provider_failure(err),
    }
}

#[derive(Debug, Deserialize)]
struct GenerateBody {
    email_body: String,
    #[serde(default)]
    subject: String,
    borrower_name: Option<String>,
    #[serde(default)]
    context: HashMap<String, serde_json::Value>,
}

/// POST /auto-reply/generate — one-off reply generation, no job involved.
async fn generate_reply(
    State(state): State<AppState>,
    Json(body): Json<GenerateBody>,
) -> impl IntoResponse {
    let Some(generator) = state.generator else {
        return generator_unavailable();
    };

    let request = GenerateRequest {
        email_body: body.email_body,
        subject: body.subject,
        borrower_name: body.borrower_name,
        context: body.context,
    };

    match generator.generate(&request).await {
        Ok(generated) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "success": true,
                "reply": generated.reply,
                "model": generated.model,
                "timestamp": Utc::now().to_rfc3339(),
            })),
        )
            .into_response(),
        Err(err) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "error": err.to_string() })),
        )
            .into_response(),
    }
}

#[derive(Debug, Deserialize)]
struct AutoReplyToBorrowerBody {
    email_id: String,
    borrower_name: Option<String>,
    #[serde(default)]
    context: HashMap<String, serde_json::Value>,
    eaccount: Option<String>,
}

/// POST /auto-reply/to-borrower — generate a reply for one email and send it.
async fn auto_reply_to_borrower(
    State(state): State<AppState>,
    Json(req): Json<AutoReplyToBorrowerBody>,
) -> impl IntoResponse {
    let Some(generator) = state.generator else {
        return generator_unavailable();
    };

    let original = match state.provider.fetch_email(&req.email_id).await {
        Ok(email) => email,
        Err(err) => return provider_failure(err),
    };

    let request = GenerateRequest {
        email_body: original.body_text,
        subject: original.subject.clone(),
        borrower_name: req.borrower_name,
        context: req.context,
    };
    let generated = match generator.generate(&request).await {
        Ok(generated) => generated,
        Err(err) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": err.to_string() })),
            )
                .into_response();
        }
    };

    let Some(eaccount) = req.eaccount.or(original.eaccount) else {
        return provider_failure(ProviderError::MissingAccount {
            item_id: req.email_id,
        });
    };

    let reply = OutgoingReply {
        reply_to: req.email_id,
        subject: original.subject,
        body: generated.reply.clone(),
        html_body: Some(generated.html_body()),
        eaccount,
    };

    state.limiter.acquire().await;
    match state.provider.send_reply(&reply).await {
        Ok(email_id) => sent(
            &format!("AI auto-reply sent (model {})", generated.model),
            email_id,
        ),
        Err(err) => provider_failure(err),
    }
}

#[derive(Debug, Deserialize)]
struct ProcessCampaignBody {
    campaign_name: String,
    #[serde(default)]
    auto_reply: bool,
    borrower_name: Option<String>,
    #[serde(default)]
    context: HashMap<String, serde_json::Value>,
    eaccount: Option<String>,
}

/// POST /campaign/process — submit a batch over one campaign's pending mail.
async fn process_campaign(
    State(state): State<AppState>,
    Json(body): Json<ProcessCampaignBody>,
) -> impl IntoResponse {
    let Some(orchestrator) = state.orchestrator else {
        return generator_unavailable();
    };

    let request = JobRequest {
        scope: BatchScope::Campaign(body.campaign_name),
        auto_reply: body.auto_reply,
        borrower_name: body.borrower_name,
        context: body.context,
        eaccount: body.eaccount,
    };
    let job_id = orchestrator.submit(request).await;
    submitted(job_id)
}

#[derive(Debug, Deserialize)]
struct ProcessInboxBody {
    #[serde(default)]
    auto_reply: bool,
    borrower_name: Option<String>,
    #[serde(default)]
    context: HashMap<String, serde_json::Value>,
    eaccount: Option<String>,
}

/// POST /inbox/process — submit a batch over all pending mail.
async fn process_inbox(
    State(state): State<AppState>,
    Json(body): Json<ProcessInboxBody>,
) -> impl IntoResponse {
    let Some(orchestrator) = state.orchestrator else {
        return generator_unavailable();
    };

    let request = JobRequest {
        scope: BatchScope::AllPending,
        auto_reply: body.auto_reply,
        borrower_name: body.borrower_name,
        context: body.context,
        eaccount: body.eaccount,
    };
    let job_id = orchestrator.submit(request).await;
    submitted(job_id)
}

/// GET /jobs/{id} — current job snapshot.
async fn get_job(State(state): State<AppState>, Path(id): Path<Uuid>) -> impl IntoResponse {
    match state.tracker.snapshot(id).await {
        Ok(job) => Json(serde_json::to_value(job).unwrap_or_default()).into_response(),
        Err(err) => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": err.to_string() })),
        )
            .into_response(),
    }
}

fn sent(message: &str, email_id: String) -> axum::response::Response {
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "success": true,
            "message": message,
            "email_id": email_id,
            "timestamp": Utc::now().to_rfc3339(),
        })),
    )
        .into_response()
}

fn provider_failure(err: ProviderError) -> axum::response::Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({ "error": err.to_string() })),
    )
        .into_response()
}

fn submitted(job_id: Uuid) -> axum::response::Response {
    (
        StatusCode::ACCEPTED,
        Json(serde_json::json!({
            "success": true,
            "job_id": job_id,
            "message": "Job submitted; poll /jobs/{id} for progress",
        })),
    )
        .into_response()
}

fn generator_unavailable() -> axum::response::Response {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(serde_json::json!({
            "error": "Reply generator not configured. Set OPENAI_API_KEY to enable this endpoint.",
        })),
    )
        .into_response()
}
