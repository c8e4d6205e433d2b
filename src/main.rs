use std::sync::Arc;

use mail_responder::channels::{ImapMailbox, SmtpMailer};
use mail_responder::config::Config;
use mail_responder::llm::create_generator;
use mail_responder::notify::Notifier;
use mail_responder::pipeline::{PipelineContext, spawn_pipeline};
use mail_responder::server::routes;
use mail_responder::store::ProcessedStore;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
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

    let config = Config::from_env().unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        eprintln!("  Required: EMAIL, APP_PASSWORD, IMAP_SERVER, SMTP_SERVER, OPENAI_API_KEY");
        std::process::exit(1);
    });

    eprintln!("📬 Mail Responder v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Mailbox: {}", config.mail.address);
    eprintln!("   IMAP: {}:{}", config.mail.imap_host, config.mail.imap_port);
    eprintln!("   SMTP: {}:{}", config.mail.smtp_host, config.mail.smtp_port);
    eprintln!("   Model: {}", config.llm.model);
    eprintln!("   UI: http://{}/", config.http_addr);

    let generator = create_generator(&config.llm)?;

    // ── Processed state ─────────────────────────────────────────────────
    let store = ProcessedStore::load(&config.state_path);
    eprintln!(
        "   State: {} ({} processed ids)\n",
        store.path().display(),
        store.len()
    );

    // ── UI server ───────────────────────────────────────────────────────
    let notifier = Notifier::new();
    let app = routes(Arc::clone(&notifier));
    let listener = tokio::net::TcpListener::bind(config.http_addr).await?;
    tracing::info!(addr = %config.http_addr, "UI server started");
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "UI server stopped");
        }
    });

    // ── Pipeline ────────────────────────────────────────────────────────
    let ctx = PipelineContext::new(
        Arc::new(ImapMailbox::new(config.mail.clone())),
        generator,
        Arc::new(SmtpMailer::new(config.mail.clone())),
        notifier,
        store,
        config.poll_interval,
    );
    let pipeline = spawn_pipeline(ctx);

    tokio::signal::ctrl_c().await?;
    eprintln!("\nShutting down…");
    if let Some(ctx) = pipeline.shutdown().await {
        tracing::info!(processed = ctx.store.len(), "Pipeline stopped");
    }

    Ok(())
}
