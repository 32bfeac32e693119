//! # wirekit - Dependency-injection application framework
//!
//! Components describe themselves through a typed registration API, the
//! container wires them with singleton / request / prototype scoping, and
//! the framework service boots every registered framework adapter behind
//! one lifecycle.
//!
//! ## Features
//!
//! - **Declarative**: class, property and method decorators as builder calls
//! - **Auto-discovery**: components are collected via inventory
//! - **Async resolution**: one construction per identifier, awaited init hooks
//! - **Phase-based lifecycle**: bootstrap → ready → run → server_ready → stop
//!
//! ## Basic Component Example
//!
//! ```rust,ignore
//! use wirekit::{Component, ClassBuilder, Handled, Inject, Identifier};
//!
//! pub struct UserService {
//!     repo: Inject<UserRepo>,
//!     page_size: Handled<serde_json::Value>,
//! }
//!
//! impl Component for UserService {
//!     fn describe(c: &mut ClassBuilder<'_, Self>) {
//!         c.provide()
//!             .factory(Vec::<Identifier>::new(), |_| Ok(UserService {
//!                 repo: Inject::new(),
//!                 page_size: Handled::new(),
//!             }))
//!             .inject("repo", |s| &s.repo)
//!             .config("page_size", Some("users.pageSize"), |s| &s.page_size);
//!     }
//! }
//!
//! wirekit::inventory::submit!(wirekit::Registrator(wirekit::register_component::<UserService>));
//! ```

pub use anyhow::Result;
pub use async_trait::async_trait;

// Re-export inventory for user convenience
pub use inventory;

pub mod catalog;
pub mod container;
pub mod decorator;
pub mod definition;
pub mod error;
pub mod framework;
pub mod handler;
pub mod identifier;
pub mod metadata;
pub mod runtime;
pub mod slot;

pub use catalog::{register_component, Catalog, ClassBuilder, Component, Registrator};
pub use container::{Container, ObjectCreated, ObjectCreatedListener};
pub use decorator::Decorator;
pub use definition::{ConstructorArgs, Instance, ObjectDefinition};
pub use error::{CatalogError, ContainerError, DecoratorError, DefinitionError, DestroyError};
pub use framework::{
    Application, Framework, FrameworkBase, FrameworkError, FrameworkService, FrameworkState,
    FrameworkType, InitializeOptions,
};
pub use handler::{HandlerBinding, HandlerMap, HandlerMeta, HandlerValue};
pub use identifier::{ClassKey, Identifier, Scope, Target, TargetKind};
pub use metadata::MetadataRegistry;
pub use runtime::{
    bootstrap, run, ApplicationContext, ApplicationRuntime, BootstrapOptions, LifecycleConfiguration,
    LifecycleError, RunOptions, ShutdownOptions,
};
pub use slot::{Handled, Inject};
