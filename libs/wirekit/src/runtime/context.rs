use super::host_runtime::LifecycleError;
use crate::catalog::Catalog;
use crate::container::Container;
use crate::framework::{FrameworkService, InitializeOptions};
use crate::handler::HandlerMap;
use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use wirekit_bootstrap::logger::LoggerServiceConfig;
use wirekit_bootstrap::{AppConfig, ConfigService, LoggerService};

pub const CONFIG_SERVICE_ID: &str = "configService";
pub const LOGGER_SERVICE_ID: &str = "loggerService";
pub const HANDLER_MAP_ID: &str = "handlerMap";
pub const FRAMEWORK_SERVICE_ID: &str = "frameworkService";

/// Hooks a configuration component receives around the run loop.
#[async_trait]
pub trait LifecycleConfiguration: Send + Sync + 'static {
    /// After every framework is initialized, before any is running.
    async fn on_ready(&self, _ctx: &ApplicationContext) -> anyhow::Result<()> {
        Ok(())
    }

    /// After every framework is running.
    async fn on_server_ready(&self, _ctx: &ApplicationContext) -> anyhow::Result<()> {
        Ok(())
    }

    async fn on_stop(&self, _ctx: &ApplicationContext) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Collaborators handed to [`bootstrap`].
#[derive(Clone)]
pub struct BootstrapOptions {
    pub config: Arc<ConfigService>,
    pub loggers: Arc<LoggerService>,
    pub base_dir: PathBuf,
    pub env: String,
}

impl BootstrapOptions {
    /// Options over an already merged configuration tree.
    pub fn from_tree(tree: Value, base_dir: impl Into<PathBuf>, env: impl Into<String>) -> anyhow::Result<Self> {
        let config = ConfigService::new(tree);
        let logger: LoggerServiceConfig = config.get_typed("logger")?.unwrap_or_default();
        let base_dir = base_dir.into();
        Ok(Self {
            loggers: Arc::new(LoggerService::new(logger, base_dir.clone())),
            config: Arc::new(config),
            base_dir,
            env: env.into(),
        })
    }

    /// Load layered configuration from `config_dir` for `env`.
    pub fn load(config_dir: Option<&Path>, env: &str) -> anyhow::Result<Self> {
        let (app, tree) = AppConfig::load_layered(config_dir, env)?;
        Self::from_tree(tree, app.base_dir(), env)
    }
}

/// Everything a running application shares.
#[derive(Clone)]
pub struct ApplicationContext {
    pub container: Arc<Container>,
    pub frameworks: Arc<FrameworkService>,
    pub config: Arc<ConfigService>,
    pub loggers: Arc<LoggerService>,
    pub catalog: Arc<Catalog>,
    pub base_dir: PathBuf,
    pub env: String,
}

impl std::fmt::Debug for ApplicationContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApplicationContext")
            .field("container", &self.container)
            .field("frameworks", &self.frameworks)
            .field("env", &self.env)
            .finish()
    }
}

/// Validate the catalog, build the root container and start the framework service.
pub async fn bootstrap(
    options: BootstrapOptions,
    catalog: Catalog,
) -> Result<ApplicationContext, LifecycleError> {
    tracing::info!(env = %options.env, "Phase: bootstrap");
    catalog.validate()?;

    let container = Container::new();
    let handlers = Arc::new(HandlerMap::new());
    let frameworks = Arc::new(FrameworkService::new(handlers.clone()));

    container.register_instance(CONFIG_SERVICE_ID, options.config.clone());
    container.register_instance(LOGGER_SERVICE_ID, options.loggers.clone());
    container.register_instance(HANDLER_MAP_ID, handlers.clone());
    container.register_instance(FRAMEWORK_SERVICE_ID, frameworks.clone());
    container.load(&catalog)?;

    let init = InitializeOptions {
        container: container.clone(),
        handlers,
        config: options.config.clone(),
        loggers: options.loggers.clone(),
        base_dir: options.base_dir.clone(),
        env: options.env.clone(),
    };
    frameworks.init(&catalog, &init).await?;

    Ok(ApplicationContext {
        container,
        frameworks,
        config: options.config,
        loggers: options.loggers,
        catalog: Arc::new(catalog),
        base_dir: options.base_dir,
        env: options.env,
    })
}
