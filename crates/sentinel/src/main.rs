//! Sentinel Driver Monitor - Main Entry Point

use anyhow::Context;
use sentinel::{init_logging, run, Settings};
use tracing::info;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load().context("Failed to load settings")?;
    init_logging(&settings.log)?;

    info!("=== Sentinel Driver Monitor v{} ===", env!("CARGO_PKG_VERSION"));
    info!(
        interval_ms = settings.monitor.sample_interval_ms,
        cooldown_secs = settings.monitor.cooldown_secs,
        camera = ?settings.camera.source,
        "Starting drowsiness monitor..."
    );

    run(settings).await
}
