use super::{Application, Framework, FrameworkType, InitializeOptions};
use crate::catalog::Catalog;
use crate::container::ObjectCreated;
use crate::decorator::{ALL_CONFIG, APP_HANDLER, CONFIG_HANDLER, LOGGER_HANDLER};
use crate::error::{ContainerError, DefinitionError};
use crate::handler::{HandlerBinding, HandlerFn, HandlerMap, HandlerMeta, HandlerValue};
use crate::definition::Instance;
use crate::identifier::{ClassKey, Identifier};
use futures::future::join_all;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameworkState {
    Uninitialized,
    Discovering,
    Initializing,
    Ready,
}

#[derive(Debug, Error)]
pub enum FrameworkError {
    #[error("framework service is already initialized")]
    AlreadyInitialized,

    #[error(transparent)]
    Resolve(#[from] ContainerError),

    #[error("'{0}' is registered as a framework but does not implement it")]
    NotAFramework(Identifier),

    #[error("framework '{framework}' failed to initialize")]
    Initialize {
        framework: Identifier,
        #[source]
        source: anyhow::Error,
    },

    #[error("preloading '{id}' failed")]
    Preload {
        id: Identifier,
        #[source]
        source: ContainerError,
    },

    #[error(transparent)]
    Definition(#[from] DefinitionError),
}

#[derive(Default)]
struct Registry {
    frameworks: Vec<(Identifier, Arc<dyn Framework>)>,
    by_type: HashMap<FrameworkType, Arc<dyn Framework>>,
}

/// Discovers framework adapters, initializes them, and owns the handler map.
pub struct FrameworkService {
    state: RwLock<FrameworkState>,
    handlers: Arc<HandlerMap>,
    registry: RwLock<Registry>,
}

impl std::fmt::Debug for FrameworkService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let registry = self.registry.read();
        f.debug_struct("FrameworkService")
            .field("state", &*self.state.read())
            .field(
                "frameworks",
                &registry.frameworks.iter().map(|(id, _)| id).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl FrameworkService {
    pub fn new(handlers: Arc<HandlerMap>) -> Self {
        Self {
            state: RwLock::new(FrameworkState::Uninitialized),
            handlers,
            registry: RwLock::new(Registry::default()),
        }
    }

    pub fn state(&self) -> FrameworkState {
        *self.state.read()
    }

    fn set_state(&self, state: FrameworkState) {
        tracing::debug!(?state, "framework service state");
        *self.state.write() = state;
    }

    /// Discover and initialize every framework adapter in `catalog`, install the
    /// built-in handlers and resolve preload components.
    pub async fn init(
        &self,
        catalog: &Catalog,
        options: &InitializeOptions,
    ) -> Result<(), FrameworkError> {
        {
            let mut state = self.state.write();
            if *state != FrameworkState::Uninitialized {
                return Err(FrameworkError::AlreadyInitialized);
            }
            *state = FrameworkState::Discovering;
        }

        let container = &options.container;
        let handlers = self.handlers.clone();
        container.on_object_created(move |event| bind_handled_properties(&handlers, event));

        let classes = most_derived(catalog, catalog.framework_classes());
        let mut ids = Vec::with_capacity(classes.len());
        for class in &classes {
            let def = catalog.definition(class)?;
            if !def.is_framework() {
                return Err(FrameworkError::NotAFramework(def.id));
            }
            let id = def.id.clone();
            if !container.contains(&id) {
                container.register(def);
            }
            ids.push(id);
        }
        tracing::info!(frameworks = ?ids, "frameworks discovered");

        self.set_state(FrameworkState::Initializing);
        let results = join_all(ids.iter().map(|id| async move {
            let instance = container.resolve(id.clone()).await?;
            let framework = container
                .definition(id)
                .and_then(|def| def.as_framework(&instance))
                .ok_or_else(|| FrameworkError::NotAFramework(id.clone()))?;
            framework
                .initialize(options)
                .await
                .map_err(|source| FrameworkError::Initialize {
                    framework: id.clone(),
                    source,
                })?;
            tracing::debug!(framework = %id, ty = %framework.framework_type(), "framework initialized");
            Ok::<_, FrameworkError>((id.clone(), framework))
        }))
        .await;

        let mut frameworks = Vec::with_capacity(results.len());
        for result in results {
            frameworks.push(result?);
        }

        {
            let mut registry = self.registry.write();
            for (id, fw) in &frameworks {
                registry
                    .by_type
                    .entry(fw.framework_type())
                    .or_insert_with(|| fw.clone());
                registry.frameworks.push((id.clone(), fw.clone()));
            }
        }

        self.install_builtin_handlers(options);

        for class in catalog.preload_classes() {
            let id = catalog.definition(&class)?.id;
            tracing::debug!(id = %id, "preloading");
            container
                .resolve(id.clone())
                .await
                .map_err(|source| FrameworkError::Preload { id, source })?;
        }

        self.set_state(FrameworkState::Ready);
        Ok(())
    }

    fn install_builtin_handlers(&self, options: &InitializeOptions) {
        let config = options.config.clone();
        self.handlers.register_if_absent(
            CONFIG_HANDLER,
            move |property: &str, meta: &HandlerMeta, _: Option<&Instance>| {
                let path = meta.identifier.as_deref().unwrap_or(property);
                let value = if path == ALL_CONFIG {
                    Some(config.configuration())
                } else {
                    config.get_configuration(path)
                };
                value.map(|v| Arc::new(v) as HandlerValue)
            },
        );

        let loggers = options.loggers.clone();
        self.handlers.register_if_absent(
            LOGGER_HANDLER,
            move |property: &str, meta: &HandlerMeta, _: Option<&Instance>| {
                let name = meta.identifier.as_deref().unwrap_or(property);
                match loggers.get_logger(name) {
                    Ok(logger) => Some(Arc::new(logger) as HandlerValue),
                    Err(e) => {
                        tracing::warn!(logger = name, error = %e, "logger unavailable");
                        None
                    }
                }
            },
        );

        let apps = self.applications();
        if let Some(main) = self.main_app() {
            self.handlers.register_if_absent(
                APP_HANDLER,
                move |_: &str, meta: &HandlerMeta, _: Option<&Instance>| {
                    let app = meta
                        .identifier
                        .as_deref()
                        .and_then(|ty| apps.get(&FrameworkType::parse(ty)))
                        .unwrap_or(&main);
                    Some(Arc::new(app.clone()) as HandlerValue)
                },
            );
        }
    }

    pub fn register_handler<F>(&self, key: impl Into<String>, handler: F)
    where
        F: Fn(&str, &HandlerMeta, Option<&Instance>) -> Option<HandlerValue> + Send + Sync + 'static,
    {
        self.handlers.register(key, handler);
    }

    pub fn handler(&self, key: &str) -> Option<HandlerFn> {
        self.handlers.get(key)
    }

    pub fn handlers(&self) -> &Arc<HandlerMap> {
        &self.handlers
    }

    /// The first discovered framework.
    pub fn main_framework(&self) -> Option<Arc<dyn Framework>> {
        self.registry
            .read()
            .frameworks
            .first()
            .map(|(_, fw)| fw.clone())
    }

    pub fn main_app(&self) -> Option<Application> {
        self.main_framework().and_then(|fw| fw.application())
    }

    pub fn framework(&self, ty: &FrameworkType) -> Option<Arc<dyn Framework>> {
        self.registry.read().by_type.get(ty).cloned()
    }

    pub fn application(&self, ty: &FrameworkType) -> Option<Application> {
        self.framework(ty).and_then(|fw| fw.application())
    }

    fn applications(&self) -> HashMap<FrameworkType, Application> {
        self.registry
            .read()
            .by_type
            .iter()
            .filter_map(|(ty, fw)| fw.application().map(|app| (ty.clone(), app)))
            .collect()
    }

    /// Frameworks in discovery order.
    pub fn frameworks(&self) -> Vec<Arc<dyn Framework>> {
        self.registry
            .read()
            .frameworks
            .iter()
            .map(|(_, fw)| fw.clone())
            .collect()
    }

    pub(crate) fn named_frameworks(&self) -> Vec<(Identifier, Arc<dyn Framework>)> {
        self.registry.read().frameworks.clone()
    }

    /// Stop every framework, last discovered first. Failures are logged.
    pub async fn stop_all(&self) {
        for (id, fw) in self.named_frameworks().into_iter().rev() {
            if let Err(err) = fw.stop().await {
                tracing::warn!(framework = %id, error = %err, "Failed to stop framework");
            }
        }
    }
}

/// Drop any discovered class that another discovered class extends.
fn most_derived(catalog: &Catalog, classes: Vec<ClassKey>) -> Vec<ClassKey> {
    let metadata = catalog.metadata();
    classes
        .iter()
        .filter(|c| !classes.iter().any(|other| metadata.is_ancestor(c, other)))
        .copied()
        .collect()
}

fn bind_handled_properties(handlers: &Arc<HandlerMap>, event: &ObjectCreated<'_>) {
    for prop in &event.definition.handler_props {
        match prop.projector.project(event.instance.as_ref()) {
            Some(slot) => {
                let binding = HandlerBinding::new(
                    handlers.clone(),
                    prop.property.clone(),
                    prop.meta.clone(),
                    event.instance,
                );
                if !slot.bind(binding) {
                    tracing::debug!(id = %event.definition.id, property = %prop.property, "property already bound");
                }
            }
            None => tracing::warn!(
                id = %event.definition.id,
                property = %prop.property,
                "instance does not match its definition; property left unbound"
            ),
        }
    }
}
