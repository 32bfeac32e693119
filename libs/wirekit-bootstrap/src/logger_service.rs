use crate::logger::{resolve_dir, Logger, LoggerConfig, LoggerOptions, LoggerServiceConfig};
use dashmap::DashMap;
use std::path::{Path, PathBuf};

/// Registry of named loggers, created on first request from the `logger`
/// configuration section.
pub struct LoggerService {
    config: LoggerServiceConfig,
    base_dir: PathBuf,
    loggers: DashMap<String, Logger>,
}

impl LoggerService {
    pub fn new(config: LoggerServiceConfig, base_dir: impl Into<PathBuf>) -> Self {
        Self {
            config,
            base_dir: base_dir.into(),
            loggers: DashMap::new(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Effective options for `name`: `logger.default`, then `logger.clients.<name>`.
    pub fn config_for(&self, name: &str) -> LoggerConfig {
        let mut config = match self.config.clients.get(name) {
            Some(client) => self.config.default.overlay(client),
            None => self.config.default.clone(),
        };
        if config.file_log_name.is_none() {
            config.file_log_name = Some(format!("{name}.log"));
        }
        config.dir = Some(resolve_dir(config.dir.as_deref(), &self.base_dir));
        config
    }

    /// Returns the logger registered under `name`, creating it on first request.
    pub fn get_logger(&self, name: &str) -> std::io::Result<Logger> {
        if let Some(logger) = self.loggers.get(name) {
            return Ok(logger.clone());
        }
        let config = self.config_for(name);
        match self.loggers.entry(name.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(e) => Ok(e.get().clone()),
            dashmap::mapref::entry::Entry::Vacant(e) => {
                let logger = Logger::new(name, config)?;
                tracing::debug!(logger = name, "created application logger");
                Ok(e.insert(logger).clone())
            }
        }
    }

    /// Create (or replace) a logger with explicit options.
    pub fn create_logger(
        &self,
        name: &str,
        options: impl Into<LoggerOptions>,
    ) -> std::io::Result<Logger> {
        let logger = Logger::new(name, options)?;
        self.loggers.insert(name.to_string(), logger.clone());
        Ok(logger)
    }

    /// A logger writing to stdout only.
    pub fn create_console_logger(&self, name: &str) -> std::io::Result<Logger> {
        let mut config = self.config_for(name);
        config.disable_file = Some(true);
        config.disable_error = Some(true);
        config.disable_console = Some(false);
        self.create_logger(name, config)
    }

    /// A logger writing to `file_name` only (no console, no error file).
    pub fn create_file_logger(&self, name: &str, file_name: &str) -> std::io::Result<Logger> {
        let mut config = self.config_for(name);
        config.file_log_name = Some(file_name.to_string());
        config.disable_console = Some(true);
        config.disable_error = Some(true);
        config.disable_file = Some(false);
        self.create_logger(name, config)
    }

    pub fn has_logger(&self, name: &str) -> bool {
        self.loggers.contains_key(name)
    }

    pub fn logger_names(&self) -> Vec<String> {
        self.loggers.iter().map(|e| e.key().clone()).collect()
    }

    /// Forget every logger; the next request recreates it.
    pub fn reset(&self) {
        self.loggers.clear();
    }
}
