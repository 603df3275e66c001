pub mod bot;
pub mod config;
pub mod error;
pub mod media;
pub mod player;

pub use config::AppConfig;
pub use error::{AppError, AppResult};
