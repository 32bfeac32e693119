pub mod config;
pub mod config_service;
pub mod logger;
pub mod logger_service;
pub mod logging;
pub mod rotate;
pub mod signals;

pub use config::*;
pub use config_service::*;
pub use logger::{ContextLogger, Logger, LoggerConfig, LoggerLevel, LoggerOptions};
pub use logger_service::LoggerService;
pub use logging::*;
pub use signals::*;
