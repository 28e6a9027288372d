#[path = "config/mod.rs"]
pub mod config_mod;
pub use config_mod as config;
pub mod bootstrap;
pub mod image_codec;
pub mod pdf_renderer;
pub mod response;
pub mod storage;
pub mod vision_clients;
