use std::sync::{Arc, Mutex};

use crate::application::use_cases::session_store::SharedSessionStore;
use crate::application::{BatchAnalysisUseCase, ReportService, SessionStore};
use crate::domain::vision_config::VisionConfig;
use crate::infrastructure::config::AppConfig;
use crate::infrastructure::image_codec::PreviewStore;
use crate::infrastructure::pdf_renderer::PdfRenderer;
use crate::infrastructure::vision_clients::VisionClient;
use crate::interfaces::http::LogEntry;

pub struct AppState {
    pub batch_use_case: Arc<BatchAnalysisUseCase>,
    pub report_service: ReportService,
    pub session: SharedSessionStore,
    pub previews: Arc<PreviewStore>,
    pub vision_config: VisionConfig,
    pub logs: Arc<Mutex<Vec<LogEntry>>>,
}

impl AppState {
    pub fn new(vision_client: Arc<dyn VisionClient + Send + Sync>, config: &AppConfig) -> Self {
        let previews = Arc::new(PreviewStore::new());
        let session = SessionStore::shared(previews.clone());

        let batch_use_case = Arc::new(BatchAnalysisUseCase::new(
            vision_client,
            session.clone(),
            previews.clone(),
            config.batch.progress_clear_delay(),
            config.batch.event_capacity,
        ));

        let report_service = ReportService::new(
            session.clone(),
            Arc::new(PdfRenderer::new(&config.reports.organization)),
            config.reports.output_dir.clone(),
        );

        Self {
            batch_use_case,
            report_service,
            session,
            previews,
            vision_config: config.vision.clone(),
            logs: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn vision_configured(&self) -> bool {
        self.vision_config
            .api_key
            .as_deref()
            .map(|key| !key.trim().is_empty())
            .unwrap_or(false)
    }
}
