//! ingest: subscribes to the configured MQTT broker, canonicalizes rack
//! telemetry frames, and drains them into the write buffer / relay.

use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "ingest starting");

    let config = match ingest::config::load_config() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("FATAL: failed to load config: {e}");
            std::process::exit(1);
        }
    };
    info!(mqtt_url = %config.mqtt.url, topics = config.mqtt.topics.len(), "config loaded");

    let pipeline = ingest::build_pipeline(&config).await?;
    let adapter = ingest::start(&config, &pipeline).await?;

    wait_for_shutdown_signal().await;
    info!("shutdown signal received, draining pipeline");

    adapter.shutdown().await;
    pipeline.shutdown().await;
    info!("ingest stopped");
    Ok(())
}

/// Waits for either Ctrl+C or SIGTERM, matching the graceful-shutdown
/// trigger spec.md §5 assumes (pipeline stop drains the write buffer).
async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
