use anyhow::{Context, Result};
use tokio::signal;
use tracing::{error, info};

use weico_monitor::config::{MonitorConfig, DEFAULT_CONFIG_PATH, ENV_CONFIG_PATH};
use weico_monitor::engine::{Monitor, SystemClock};
use weico_monitor::mailer::SmtpMailer;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive(tracing::Level::INFO.into()))
        .with_ansi(true)
        .init();

    let config_path = std::env::var(ENV_CONFIG_PATH).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let config = MonitorConfig::load(&config_path)?;
    info!(path = %config_path, endpoints = config.endpoints.len(), "Configuration loaded");

    let mailer = SmtpMailer::new(&config.mail).context("Failed to configure mail notifier")?;
    let mut monitor = Monitor::new(config, Box::new(mailer), Box::new(SystemClock))?;

    monitor.run(shutdown_signal()).await;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("Shutdown signal received. Stopping weico monitor...");
}
