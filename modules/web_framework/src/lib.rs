//! axum-based web framework adapter.
//!
//! Registers itself as the `web` framework. Components add routes through
//! the [`WebApplication`] behind their `app` property; handlers reach their
//! request container through the [`RequestScope`] extension.

pub mod config;
mod framework;
mod request_scope;

pub use config::WebConfig;
pub use framework::{WebApplication, WebFramework};
pub use request_scope::{RequestContext, RequestScope, CTX_ID};
