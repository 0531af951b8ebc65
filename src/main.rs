use std::sync::Arc;

use docrelay::config::RelayConfig;
use docrelay::dispatch::SmtpDispatcher;
use docrelay::extract::PdfTextExtractor;
use docrelay::pipeline::Pipeline;
use docrelay::route::FsRouter;
use docrelay::stats::{StatsTotals, stats_channel};
use docrelay::validate::MxValidator;
use docrelay::watch::{NotifyWatcher, Relay};

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

    let config = match RelayConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            eprintln!("  required: DOCRELAY_SMTP_HOST, DOCRELAY_SENDER,");
            eprintln!("            DOCRELAY_PASSWORD, DOCRELAY_WATCH_DIR");
            std::process::exit(1);
        }
    };

    eprintln!("📬 docrelay v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   SMTP: {}:{}", config.smtp_host, config.smtp_port);
    eprintln!("   Sender: {}", config.sender);
    eprintln!("   Watching: {}", config.watch_dir.display());
    eprintln!("   Sent folder: {}", config.sent_dir.display());
    eprintln!("   Failed folder: {}", config.failed_dir.display());
    eprintln!("   Extension: .{}\n", config.extension);

    // Make sure the three directories exist before the watcher starts.
    for dir in [&config.watch_dir, &config.sent_dir, &config.failed_dir] {
        std::fs::create_dir_all(dir)?;
    }

    let (stats_tx, mut stats_rx) = stats_channel();

    // Stats consumer: accumulates totals and logs each update. The
    // presentation layer owns the cumulative display; out here that is the
    // log stream.
    tokio::spawn(async move {
        let mut totals = StatsTotals::default();
        while let Some(delta) = stats_rx.recv().await {
            totals.apply(delta);
            tracing::info!(
                processed = totals.processed,
                sent = totals.sent,
                errors = totals.errors,
                "Statistics updated"
            );
        }
    });

    let pipeline = Arc::new(Pipeline::new(
        Arc::new(PdfTextExtractor),
        Arc::new(MxValidator::new()),
        Arc::new(SmtpDispatcher::new(config.clone())),
        Arc::new(FsRouter),
        stats_tx,
        config.clone(),
    ));

    let (watcher, events) = NotifyWatcher::start(&config.watch_dir)?;
    let relay = Relay::new(pipeline, config.settle_delay, config.extension.clone());
    let handle = relay.spawn(events);

    tracing::info!("Relay running; press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;

    tracing::info!("Shutdown requested");
    drop(watcher); // stop event delivery before draining the worker
    if !handle.stop(config.shutdown_deadline).await {
        tracing::warn!("In-flight document abandoned at shutdown");
    }

    Ok(())
}
