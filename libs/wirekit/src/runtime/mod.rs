//! Application lifecycle: bootstrap, configuration hooks and the run loop.

mod context;
mod host_runtime;
mod runner;

pub use context::{
    bootstrap, ApplicationContext, BootstrapOptions, LifecycleConfiguration, CONFIG_SERVICE_ID,
    FRAMEWORK_SERVICE_ID, HANDLER_MAP_ID, LOGGER_SERVICE_ID,
};
pub use host_runtime::{ApplicationRuntime, LifecycleError};
pub use runner::{run, RunOptions, ShutdownOptions};
