pub mod error;
pub mod inspection;
pub mod report;
pub mod upload_task;
pub mod vision_config;
