//! Framework adapter contract.
//!
//! An adapter (web server, RPC server, queue consumer, ...) is a component
//! registered with [`crate::catalog::ClassBuilder::framework`]. The
//! [`FrameworkService`] discovers, initializes and indexes adapters; the
//! runtime drives `run` and `stop`.

mod service;

pub use service::{FrameworkError, FrameworkService, FrameworkState};

use crate::container::Container;
use crate::handler::HandlerMap;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::any::Any;
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock, Weak};
use wirekit_bootstrap::{merge_config, ConfigService, LoggerService};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FrameworkType {
    Web,
    Koa,
    Express,
    Faas,
    Grpc,
    RabbitMq,
    SocketIo,
    Empty,
    Custom(String),
}

impl FrameworkType {
    pub fn as_str(&self) -> &str {
        match self {
            FrameworkType::Web => "web",
            FrameworkType::Koa => "koa",
            FrameworkType::Express => "express",
            FrameworkType::Faas => "faas",
            FrameworkType::Grpc => "grpc",
            FrameworkType::RabbitMq => "rabbitmq",
            FrameworkType::SocketIo => "socketio",
            FrameworkType::Empty => "empty",
            FrameworkType::Custom(name) => name,
        }
    }

    /// Case-insensitive; unknown names become [`FrameworkType::Custom`].
    pub fn parse(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "web" => FrameworkType::Web,
            "koa" => FrameworkType::Koa,
            "express" => FrameworkType::Express,
            "faas" => FrameworkType::Faas,
            "grpc" => FrameworkType::Grpc,
            "rabbitmq" => FrameworkType::RabbitMq,
            "socketio" => FrameworkType::SocketIo,
            "empty" => FrameworkType::Empty,
            _ => FrameworkType::Custom(name.to_string()),
        }
    }
}

impl From<&str> for FrameworkType {
    fn from(s: &str) -> Self {
        Self::parse(s)
    }
}

impl fmt::Display for FrameworkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Handle to a running framework's application object.
#[derive(Clone)]
pub struct Application {
    inner: Arc<AppInner>,
}

struct AppInner {
    framework_type: FrameworkType,
    container: Weak<Container>,
    state: Arc<dyn Any + Send + Sync>,
}

impl fmt::Debug for Application {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Application")
            .field("framework_type", &self.inner.framework_type)
            .finish()
    }
}

impl Application {
    pub fn new<S: Send + Sync + 'static>(
        framework_type: FrameworkType,
        container: &Arc<Container>,
        state: Arc<S>,
    ) -> Self {
        Self {
            inner: Arc::new(AppInner {
                framework_type,
                container: Arc::downgrade(container),
                state,
            }),
        }
    }

    pub fn framework_type(&self) -> &FrameworkType {
        &self.inner.framework_type
    }

    /// The application container, while it is alive.
    pub fn container(&self) -> Option<Arc<Container>> {
        self.inner.container.upgrade()
    }

    /// Adapter-specific state, e.g. a router builder.
    pub fn state<S: Send + Sync + 'static>(&self) -> Option<Arc<S>> {
        self.inner.state.clone().downcast::<S>().ok()
    }

    pub fn ptr_eq(&self, other: &Application) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

/// Everything an adapter receives at initialization.
#[derive(Clone)]
pub struct InitializeOptions {
    pub container: Arc<Container>,
    pub handlers: Arc<HandlerMap>,
    pub config: Arc<ConfigService>,
    pub loggers: Arc<LoggerService>,
    pub base_dir: PathBuf,
    pub env: String,
}

#[async_trait]
pub trait Framework: Send + Sync + 'static {
    fn framework_type(&self) -> FrameworkType;

    /// `None` until `initialize` has run.
    fn application(&self) -> Option<Application>;

    /// Merge adapter options into the current configuration.
    fn set_configuration(&self, options: Value);

    async fn initialize(&self, options: &InitializeOptions) -> anyhow::Result<()>;

    /// Start serving. Returns once the adapter is accepting work.
    async fn run(&self) -> anyhow::Result<()>;

    async fn stop(&self) -> anyhow::Result<()> {
        Ok(())
    }

    fn configure(&self, options: Value) -> &Self
    where
        Self: Sized,
    {
        self.set_configuration(options);
        self
    }
}

/// Reusable state for adapters: configuration, application handle and a
/// weak link to the application container.
pub struct FrameworkBase {
    framework_type: FrameworkType,
    configuration: RwLock<Value>,
    app: OnceLock<Application>,
}

impl fmt::Debug for FrameworkBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameworkBase")
            .field("framework_type", &self.framework_type)
            .field("configuration", &*self.configuration.read())
            .field("initialized", &self.app.get().is_some())
            .finish()
    }
}

impl FrameworkBase {
    pub fn new(framework_type: FrameworkType) -> Self {
        Self {
            framework_type,
            configuration: RwLock::new(Value::Object(Default::default())),
            app: OnceLock::new(),
        }
    }

    pub fn framework_type(&self) -> FrameworkType {
        self.framework_type.clone()
    }

    pub fn configuration(&self) -> Value {
        self.configuration.read().clone()
    }

    pub fn set_configuration(&self, options: Value) {
        merge_config(&mut self.configuration.write(), options);
    }

    /// Typed view of the current configuration.
    pub fn configuration_as<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.configuration())
    }

    /// Create the application handle once; later calls return the first one.
    pub fn attach<S: Send + Sync + 'static>(
        &self,
        options: &InitializeOptions,
        state: Arc<S>,
    ) -> Application {
        self.app
            .get_or_init(|| Application::new(self.framework_type(), &options.container, state))
            .clone()
    }

    pub fn application(&self) -> Option<Application> {
        self.app.get().cloned()
    }

    pub fn container(&self) -> Option<Arc<Container>> {
        self.app.get().and_then(Application::container)
    }
}
