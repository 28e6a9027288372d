use std::sync::Arc;

use tracing::{error, info};

use crate::infrastructure::config::AppConfig;
use crate::infrastructure::storage::ensure_reports_dir;
use crate::infrastructure::vision_clients::{RouterClient, VisionClient};
use crate::interfaces::http::{add_log, spawn_notification_relay};
use crate::interfaces::state::AppState;

/// Wires the application state from configuration. Must run inside a Tokio runtime.
pub fn setup(config: &AppConfig) -> Arc<AppState> {
    let vision_client: Arc<dyn VisionClient + Send + Sync> =
        Arc::new(RouterClient::new(config.vision.clone()));
    let state = Arc::new(AppState::new(vision_client, config));

    if let Some(dir) = &config.reports.output_dir {
        if let Err(err) = ensure_reports_dir(dir) {
            error!(error = %err, output_dir = %dir.display(), "Failed to create reports dir");
        }
    }

    spawn_notification_relay(&state.batch_use_case, state.logs.clone());

    if state.vision_configured() {
        info!(
            provider = ?config.vision.provider,
            model = %config.vision.model,
            "Vision client configured"
        );
    } else {
        add_log(
            &state.logs,
            "WARN",
            "Bootstrap",
            "No vision API key configured; analysis requests will fail",
        );
    }

    state
}
