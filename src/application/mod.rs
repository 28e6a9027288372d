pub mod use_cases;

pub use use_cases::batch_analysis::BatchAnalysisUseCase;
pub use use_cases::report_synthesis::ReportService;
pub use use_cases::session_store::SessionStore;
