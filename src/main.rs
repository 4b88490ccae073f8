use std::sync::Arc;

use borrower_assist::batch::BatchOrchestrator;
use borrower_assist::config::Config;
use borrower_assist::dedup::DedupCache;
use borrower_assist::generator::{OpenAiGenerator, ReplyGenerator};
use borrower_assist::limiter::RateLimiter;
use borrower_assist::progress::JobTracker;
use borrower_assist::provider::{InstantlyProvider, MailProvider};
use borrower_assist::server::{AppState, routes};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = Config::from_env().unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        eprintln!("  export INSTANTLY_API_KEY=...");
        std::process::exit(1);
    });

    eprintln!("📬 Borrower Assist v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Provider: {}", config.instantly.base_url);
    eprintln!("   API: http://0.0.0.0:{}", config.port);

    let tracker = JobTracker::new();
    let dedup = DedupCache::new(config.batch.dedup_ttl);
    let limiter = RateLimiter::new(&config.limiter);
    let provider: Arc<dyn MailProvider> =
        Arc::new(InstantlyProvider::new(config.instantly.clone()));

    // Reply generation (and therefore batch processing) is only offered
    // when the generator credential is present; the routes answer 503
    // otherwise instead of failing on first use.
    let generator: Option<Arc<dyn ReplyGenerator>> = match &config.openai {
        Some(openai) => {
            eprintln!("   Model: {}", openai.model);
            Some(Arc::new(OpenAiGenerator::new(openai.clone())))
        }
        None => {
            tracing::warn!(
                "OPENAI_API_KEY not set — reply generation and batch processing disabled"
            );
            None
        }
    };

    let orchestrator: Option<Arc<BatchOrchestrator>> = generator.as_ref().map(|generator| {
        BatchOrchestrator::new(
            Arc::clone(&provider),
            Arc::clone(generator),
            Arc::clone(&tracker),
            Arc::clone(&dedup),
            Arc::clone(&limiter),
            config.retry.clone(),
            config.batch.clone(),
        )
    });

    let app = routes(AppState {
        tracker,
        provider,
        limiter,
        orchestrator,
        generator,
    });

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port)).await?;
    tracing::info!(port = config.port, "Listening");
    axum::serve(listener, app).await?;

    Ok(())
}
