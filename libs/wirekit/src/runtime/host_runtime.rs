//! Application runtime: owns the lifecycle after bootstrap.
//!
//! Phase order: ready → run → server_ready → wait → stop.

use super::context::{ApplicationContext, LifecycleConfiguration};
use crate::decorator::CONFIGURATION_KEY;
use crate::error::{CatalogError, ContainerError, DefinitionError};
use crate::framework::FrameworkError;
use crate::identifier::Identifier;
use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Framework(#[from] FrameworkError),

    #[error(transparent)]
    Resolve(#[from] ContainerError),

    #[error(transparent)]
    Definition(#[from] DefinitionError),

    #[error("'{0}' is registered as a configuration but does not implement it")]
    NotAConfiguration(Identifier),

    #[error("onReady failed in '{namespace}'")]
    Ready {
        namespace: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("framework '{framework}' failed to start")]
    Run {
        framework: Identifier,
        #[source]
        source: anyhow::Error,
    },

    #[error("onServerReady failed in '{namespace}'")]
    ServerReady {
        namespace: String,
        #[source]
        source: anyhow::Error,
    },
}

#[derive(Deserialize)]
struct ConfigurationMeta {
    #[serde(default)]
    namespace: Option<String>,
}

struct Configuration {
    namespace: String,
    hooks: Arc<dyn LifecycleConfiguration>,
}

pub struct ApplicationRuntime {
    ctx: ApplicationContext,
    configurations: Vec<Configuration>,
    cancel: CancellationToken,
}

impl ApplicationRuntime {
    pub fn new(ctx: ApplicationContext, cancel: CancellationToken) -> Self {
        Self {
            ctx,
            configurations: Vec::new(),
            cancel,
        }
    }

    pub fn context(&self) -> &ApplicationContext {
        &self.ctx
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Resolve configuration components in registration order.
    async fn resolve_configurations(&mut self) -> Result<(), LifecycleError> {
        let catalog = self.ctx.catalog.clone();
        for class in catalog.configuration_classes() {
            let def = catalog.definition(&class)?;
            let namespace = catalog
                .metadata()
                .get_own(&class, CONFIGURATION_KEY)
                .and_then(|v| serde_json::from_value::<ConfigurationMeta>(v.clone()).ok())
                .and_then(|m| m.namespace)
                .unwrap_or_else(|| def.id.to_string());

            let instance = self.ctx.container.resolve(def.id.clone()).await?;
            let hooks = def
                .as_configuration(&instance)
                .ok_or_else(|| LifecycleError::NotAConfiguration(def.id.clone()))?;
            tracing::debug!(namespace = %namespace, "configuration loaded");
            self.configurations.push(Configuration { namespace, hooks });
        }
        Ok(())
    }

    async fn run_ready_phase(&self) -> Result<(), LifecycleError> {
        tracing::info!("Phase: ready");
        for c in &self.configurations {
            c.hooks
                .on_ready(&self.ctx)
                .await
                .map_err(|source| LifecycleError::Ready {
                    namespace: c.namespace.clone(),
                    source,
                })?;
        }
        Ok(())
    }

    async fn run_frameworks_phase(&self) -> Result<(), LifecycleError> {
        tracing::info!("Phase: run");
        for (id, fw) in self.ctx.frameworks.named_frameworks() {
            tracing::debug!(framework = %id, ty = %fw.framework_type(), "Starting framework");
            fw.run()
                .await
                .map_err(|source| LifecycleError::Run {
                    framework: id.clone(),
                    source,
                })?;
        }
        Ok(())
    }

    async fn run_server_ready_phase(&self) -> Result<(), LifecycleError> {
        tracing::info!("Phase: server_ready");
        for c in &self.configurations {
            c.hooks
                .on_server_ready(&self.ctx)
                .await
                .map_err(|source| LifecycleError::ServerReady {
                    namespace: c.namespace.clone(),
                    source,
                })?;
        }
        Ok(())
    }

    /// Everything up to and including `on_server_ready`.
    pub async fn start(&mut self) -> Result<(), LifecycleError> {
        self.resolve_configurations().await?;
        self.run_ready_phase().await?;
        self.run_frameworks_phase().await?;
        self.run_server_ready_phase().await
    }

    /// STOP phase: `on_stop` in reverse, frameworks, then the container.
    ///
    /// Errors are logged but do not fail the shutdown process.
    pub async fn stop(&self) {
        tracing::info!("Phase: stop");

        for c in self.configurations.iter().rev() {
            if let Err(err) = c.hooks.on_stop(&self.ctx).await {
                tracing::warn!(namespace = %c.namespace, error = %err, "onStop failed");
            }
        }
        self.ctx.frameworks.stop_all().await;
        self.ctx.container.destroy_all().await;
    }

    /// Run the full lifecycle: ready → run → server_ready → wait → stop.
    ///
    /// A failing start phase still runs the stop phase before the error is returned.
    pub async fn run_full_cycle(mut self) -> anyhow::Result<()> {
        let started = self.start().await;

        if started.is_ok() {
            tracing::info!("application ready");
            self.cancel.cancelled().await;
        }

        self.stop().await;
        started.map_err(Into::into)
    }
}
