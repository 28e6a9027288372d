pub mod batch_analysis;
pub mod report_synthesis;
pub mod session_store;
