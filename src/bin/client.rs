//! Protected-application client - main entry point.
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment variables
//! 2. Collect the hardware fingerprint
//! 3. Activate the license (prompting for a key when not configured)
//! 4. Start the background heartbeat monitor
//! 5. Run the application until Ctrl-C
//!
//! The monitor enforces the kill switch: if a whole tick of heartbeat
//! attempts fails, the process exits with a non-zero status regardless of
//! what the application below is doing.

use std::io::Write;
use std::time::Duration;

use tracing_subscriber::EnvFilter;

use license_guard::{
    client::ProtocolClient,
    config::ClientConfig,
    hwid::{FingerprintProvider, MachineFingerprint},
    monitor::{HeartbeatMonitor, MonitorConfig},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = ClientConfig::from_env()?;
    tracing::info!(server = %config.server_url, "Configuration loaded");

    // Hardware fingerprint (opaque, stable per machine)
    let hwid = MachineFingerprint.fingerprint()?;
    tracing::info!(hwid = %&hwid[..16.min(hwid.len())], "Hardware fingerprint collected");

    // License key from config, or interactively
    let license_key = match config.license_key.clone() {
        Some(key) if !key.trim().is_empty() => key.trim().to_string(),
        _ => prompt_license_key()?,
    };

    // Activate once, synchronously, before anything else runs
    let mut client = ProtocolClient::new(config.server_url.clone())?;
    client.activate(&license_key, &hwid).await?;
    tracing::info!("License activated");

    // Background liveness enforcement
    let monitor = HeartbeatMonitor::new(
        client,
        MonitorConfig {
            interval: Duration::from_secs(config.heartbeat_interval_secs),
            max_retries: config.max_retries,
            retry_delay: Duration::from_secs(config.retry_delay_secs),
        },
    )
    .with_error_callback(|err| {
        tracing::error!(error = %err, "heartbeat validation failed, terminating");
    });
    let monitor_handle = monitor.start();

    tracing::info!("All checks passed, application running (Ctrl-C to exit)");
    run_application().await;

    // Normal shutdown path; the kill switch never reaches here
    monitor_handle.stop();
    tracing::info!("Shutting down");

    Ok(())
}

/// Placeholder for the protected application's real work.
async fn run_application() {
    let mut ticker = tokio::time::interval(Duration::from_secs(5));

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => return,
            _ = ticker.tick() => {
                tracing::debug!("application tick");
            }
        }
    }
}

/// Ask for a license key on stdin until a non-empty one is entered.
fn prompt_license_key() -> anyhow::Result<String> {
    loop {
        print!("Enter your license key: ");
        std::io::stdout().flush()?;

        let mut key = String::new();
        std::io::stdin().read_line(&mut key)?;

        let key = key.trim();
        if !key.is_empty() {
            return Ok(key.to_string());
        }

        println!("License key cannot be empty. Please try again.");
    }
}
