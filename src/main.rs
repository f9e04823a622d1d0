use std::sync::Arc;

use rfp_assist::api::{AppState, api_routes};
use rfp_assist::config::PipelineConfig;
use rfp_assist::extract::{ExtractionService, ExtractorConfig, HttpBackend};
use rfp_assist::mailbox::{MailboxConfig, MailboxReader, MailboxSource, RfpMailer, VendorReply};
use rfp_assist::pipeline::{ComparisonAggregator, IngestionPipeline};
use rfp_assist::store::{Database, LibSqlBackend};
use tower_http::cors::CorsLayer;

/// Mailbox stand-in when no IMAP host is configured: every check cycle
/// sees an empty mailbox and callers fall back to manual entry.
struct DisabledMailbox;

#[async_trait::async_trait]
impl MailboxSource for DisabledMailbox {
    async fn fetch_recent(&self) -> Vec<VendorReply> {
        Vec::new()
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let port: u16 = std::env::var("RFP_ASSIST_PORT")
        .unwrap_or_else(|_| "5000".to_string())
        .parse()
        .unwrap_or(5000);

    // ── Extraction backend ───────────────────────────────────────────
    let extractor_config = ExtractorConfig::from_env().unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        eprintln!("  export EXTRACTOR_API_KEY=sk-...");
        std::process::exit(1);
    });
    let model = extractor_config.model.clone();
    let extractor = Arc::new(ExtractionService::new(Arc::new(HttpBackend::new(
        extractor_config,
    ))));

    // ── Database ─────────────────────────────────────────────────────
    let db_path =
        std::env::var("RFP_ASSIST_DB_PATH").unwrap_or_else(|_| "./data/rfp-assist.db".to_string());
    let db: Arc<dyn Database> = Arc::new(
        LibSqlBackend::new_local(std::path::Path::new(&db_path))
            .await
            .unwrap_or_else(|e| {
                eprintln!("Error: Failed to open database at {db_path}: {e}");
                std::process::exit(1);
            }),
    );

    // ── Mailbox ──────────────────────────────────────────────────────
    let pipeline_config = PipelineConfig::default();
    let mailbox_config = MailboxConfig::from_env();
    let (mailbox, mailer): (Arc<dyn MailboxSource>, Option<Arc<RfpMailer>>) = match mailbox_config {
        Some(config) => {
            let reader = MailboxReader::new(
                config.clone(),
                pipeline_config.lookback_days,
                pipeline_config.max_messages,
            );
            (Arc::new(reader), Some(Arc::new(RfpMailer::new(config))))
        }
        None => (Arc::new(DisabledMailbox), None),
    };

    // ── Pipeline ─────────────────────────────────────────────────────
    let pipeline = Arc::new(IngestionPipeline::new(
        Arc::clone(&db),
        Arc::clone(&mailbox),
        Arc::clone(&extractor),
        pipeline_config,
    ));
    let aggregator = Arc::new(ComparisonAggregator::new(
        Arc::clone(&db),
        Arc::clone(&extractor),
    ));

    eprintln!("📋 RFP Assist v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Model: {model}");
    eprintln!("   Database: {db_path}");
    eprintln!(
        "   Mailbox: {}",
        if mailer.is_some() {
            "enabled"
        } else {
            "disabled (manual entry only)"
        }
    );
    eprintln!("   API: http://0.0.0.0:{port}/api\n");

    let state = AppState {
        db,
        extractor,
        pipeline,
        aggregator,
        mailer,
    };
    let app = api_routes(state).layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}")).await?;
    tracing::info!(port, "Server started");
    axum::serve(listener, app).await?;

    Ok(())
}
