use tracing::{error, info};

use crate::infrastructure::bootstrap;
use crate::infrastructure::config::AppConfig;
use crate::interfaces::http::start_server;

pub async fn run() -> std::io::Result<()> {
    let _ = dotenvy::dotenv();
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .try_init();

    let config = AppConfig::load().map_err(|err| {
        error!(error = %err, "Failed to load configuration");
        std::io::Error::new(std::io::ErrorKind::InvalidInput, err.to_string())
    })?;

    let state = bootstrap::setup(&config);
    info!(
        provider = ?config.vision.provider,
        host = %config.server.host,
        port = config.server.port,
        "Starting Safety Vision"
    );

    start_server(state, &config.server)?.await
}
