use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::logger::LoggerServiceConfig;

/// Environment variable that selects the configuration environment.
pub const ENV_VAR: &str = "WIREKIT_ENV";

/// Prefix of environment overrides, e.g. `WIREKIT__CACHE__OPTIONS__TTL=30`.
pub const ENV_PREFIX: &str = "WIREKIT__";

const DEFAULT_ENV: &str = "prod";

/// Typed view over the well-known sections of the merged configuration tree.
///
/// Everything else in the tree (component sections such as `cache` or `web`)
/// is only reachable through [`crate::ConfigService`].
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub app: AppSection,
    /// Tracing sinks for framework diagnostics (optional, uses defaults if None).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,
    /// Defaults and per-name overrides for application loggers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logger: Option<LoggerServiceConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppSection {
    #[serde(default = "default_app_name")]
    pub name: String,
    /// Base directory; relative log paths are resolved against it.
    #[serde(default = "default_base_dir")]
    pub base_dir: String,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: default_app_name(),
            base_dir: default_base_dir(),
        }
    }
}

fn default_app_name() -> String {
    "wirekit".to_string()
}

fn default_base_dir() -> String {
    ".".to_string()
}

/// Logging configuration - maps subsystem names to their logging settings.
/// Key "default" is the catch-all for logs that don't match explicit subsystems.
pub type LoggingConfig = HashMap<String, Section>;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Section {
    pub console_level: String, // "info", "debug", "error", "off"
    #[serde(default)]
    pub file: String, // "logs/core.log"
    #[serde(default)]
    pub file_level: String,
    pub max_age_days: Option<u32>,
    #[serde(default)]
    pub max_backups: Option<usize>,
    #[serde(default)]
    pub max_size_mb: Option<u64>,
}

/// Create a default logging configuration.
pub fn default_logging_config() -> LoggingConfig {
    let mut logging = HashMap::new();
    logging.insert(
        "default".to_string(),
        Section {
            console_level: "info".to_string(),
            file: "logs/wirekit.log".to_string(),
            file_level: "debug".to_string(),
            max_age_days: Some(7),
            max_backups: Some(3),
            max_size_mb: Some(100),
        },
    );
    logging
}

/// Resolve the configuration environment: explicit value, then `WIREKIT_ENV`, then `prod`.
pub fn resolve_env(explicit: Option<&str>) -> String {
    explicit
        .map(str::to_string)
        .or_else(|| std::env::var(ENV_VAR).ok())
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_ENV.to_string())
}

/// Load the merged configuration tree.
///
/// Layers, later wins: defaults → `config.default.yaml` → `config.{env}.yaml`
/// → `WIREKIT__*` environment variables. Missing files are skipped.
pub fn load_tree(config_dir: Option<&Path>, env: &str) -> Result<serde_json::Value> {
    use figment::{
        providers::{Env, Format, Serialized, Yaml},
        Figment,
    };

    let mut figment = Figment::new().merge(Serialized::defaults(AppConfig::default()));

    if let Some(dir) = config_dir {
        figment = figment
            .merge(Yaml::file(dir.join("config.default.yaml")))
            .merge(Yaml::file(dir.join(format!("config.{env}.yaml"))));
    }

    let figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

    figment
        .extract::<serde_json::Value>()
        .with_context(|| "Failed to extract config from figment".to_string())
}

impl AppConfig {
    /// Typed view of an already merged tree.
    pub fn from_tree(tree: &serde_json::Value) -> Result<Self> {
        serde_json::from_value(tree.clone()).context("Invalid application config sections")
    }

    /// Load configuration with layered loading, returning both views.
    pub fn load_layered(config_dir: Option<&Path>, env: &str) -> Result<(Self, serde_json::Value)> {
        let tree = load_tree(config_dir, env)?;
        let config = Self::from_tree(&tree)?;
        Ok((config, tree))
    }

    /// Absolute base directory; relative values are resolved against the process cwd.
    pub fn base_dir(&self) -> PathBuf {
        let p = PathBuf::from(&self.app.base_dir);
        if p.is_absolute() {
            p
        } else {
            std::env::current_dir()
                .map(|cwd| cwd.join(&p))
                .unwrap_or(p)
        }
    }

    /// Serialize configuration to YAML.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Failed to serialize config to YAML")
    }

    /// Apply overrides from command line arguments.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        // Set logging level based on verbose flags for "default" section.
        let logging = self.logging.get_or_insert_with(default_logging_config);
        if let Some(default_section) = logging.get_mut("default") {
            default_section.console_level = match args.verbose {
                0 => default_section.console_level.clone(), // keep
                1 => "debug".to_string(),
                _ => "trace".to_string(),
            };
        }
    }
}

/// Command line arguments structure.
#[derive(Debug, Clone, Default)]
pub struct CliArgs {
    pub config_dir: Option<String>,
    pub env: Option<String>,
    pub print_config: bool,
    pub verbose: u8,
}
