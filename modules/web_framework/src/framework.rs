use crate::config::WebConfig;
use crate::request_scope::{request_id_header, request_scope};
use arc_swap::ArcSwap;
use async_trait::async_trait;
use axum::routing::{get, MethodRouter};
use axum::{Json, Router};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use wirekit::{
    register_component, Application, ClassBuilder, Component, Framework, FrameworkBase,
    FrameworkType, InitializeOptions, Registrator,
};
use wirekit_bootstrap::merge_config;

/// Route collector handed out as the web [`Application`] state.
///
/// Components reach it through an `app` property:
/// `app.state::<WebApplication>()`.
#[derive(Default)]
pub struct WebApplication {
    routes: Mutex<Router>,
}

impl WebApplication {
    pub fn route(&self, path: &str, method_router: MethodRouter) -> &Self {
        let mut routes = self.routes.lock();
        let current = std::mem::take(&mut *routes);
        *routes = current.route(path, method_router);
        self
    }

    pub fn merge(&self, router: Router) -> &Self {
        let mut routes = self.routes.lock();
        let current = std::mem::take(&mut *routes);
        *routes = current.merge(router);
        self
    }

    fn snapshot(&self) -> Router {
        self.routes.lock().clone()
    }
}

/// HTTP adapter on axum. Every request gets its own child container.
pub struct WebFramework {
    base: FrameworkBase,
    config: ArcSwap<WebConfig>,
    cancel: CancellationToken,
    server: Mutex<Option<JoinHandle<anyhow::Result<()>>>>,
    local_addr: OnceLock<SocketAddr>,
}

impl Default for WebFramework {
    fn default() -> Self {
        Self {
            base: FrameworkBase::new(FrameworkType::Web),
            config: ArcSwap::from_pointee(WebConfig::default()),
            cancel: CancellationToken::new(),
            server: Mutex::new(None),
            local_addr: OnceLock::new(),
        }
    }
}

impl Component for WebFramework {
    fn describe(c: &mut ClassBuilder<'_, Self>) {
        c.default_factory().framework();
    }
}

inventory::submit! {
    Registrator(register_component::<WebFramework>)
}

impl WebFramework {
    /// Effective configuration; the defaults until `initialize` has run.
    pub fn config(&self) -> Arc<WebConfig> {
        self.config.load_full()
    }

    /// Bound address once `run` has returned.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr.get().copied()
    }

    pub fn web_application(&self) -> Option<Arc<WebApplication>> {
        self.base.application()?.state::<WebApplication>()
    }

    /// Final router: application routes under the prefix, `/healthz` at the
    /// root, request scoping and request ids around everything.
    pub fn router(&self) -> anyhow::Result<Router> {
        let container = self
            .base
            .container()
            .ok_or_else(|| anyhow::anyhow!("web framework is not initialized"))?;
        let app = self
            .web_application()
            .ok_or_else(|| anyhow::anyhow!("web application state is missing"))?;

        let routes = app.snapshot();
        let mut router = match self.config().mount_point() {
            Some(prefix) => Router::new().nest(&prefix, routes),
            None => routes,
        };
        router = router.route("/healthz", get(healthz));

        router = router.layer(axum::middleware::from_fn_with_state(
            Arc::downgrade(&container),
            request_scope,
        ));
        router = router.layer(TraceLayer::new_for_http().make_span_with(
            |req: &axum::http::Request<axum::body::Body>| {
                let rid = req
                    .headers()
                    .get(request_id_header())
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("n/a");
                tracing::info_span!(
                    "http_request",
                    method = %req.method(),
                    uri = %req.uri().path(),
                    request_id = %rid,
                )
            },
        ));
        router = router.layer(PropagateRequestIdLayer::new(request_id_header()));
        router = router.layer(SetRequestIdLayer::new(request_id_header(), MakeRequestUuid));
        Ok(router)
    }
}

async fn healthz() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

#[async_trait]
impl Framework for WebFramework {
    fn framework_type(&self) -> FrameworkType {
        self.base.framework_type()
    }

    fn application(&self) -> Option<Application> {
        self.base.application()
    }

    fn set_configuration(&self, options: Value) {
        self.base.set_configuration(options);
    }

    async fn initialize(&self, options: &InitializeOptions) -> anyhow::Result<()> {
        let mut merged = options
            .config
            .get_configuration("web")
            .unwrap_or_else(|| json!({}));
        merge_config(&mut merged, self.base.configuration());
        let config: WebConfig = serde_json::from_value(merged)
            .map_err(|e| anyhow::anyhow!("Invalid web configuration: {e}"))?;
        tracing::debug!(host = %config.host, port = config.port, prefix = %config.prefix, "web configuration resolved");
        self.config.store(Arc::new(config));

        self.base
            .attach(options, Arc::new(WebApplication::default()));
        Ok(())
    }

    async fn run(&self) -> anyhow::Result<()> {
        if self.server.lock().is_some() {
            return Ok(());
        }
        let router = self.router()?;
        let addr = self.config().bind_addr()?;

        let listener = tokio::net::TcpListener::bind(addr).await?;
        let bound = listener.local_addr()?;
        let _ = self.local_addr.set(bound);
        tracing::info!("HTTP server bound on {}", bound);

        let shutdown = {
            let cancel = self.cancel.clone();
            async move {
                cancel.cancelled().await;
                tracing::info!("HTTP server shutting down gracefully (cancellation)");
            }
        };
        let handle = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(shutdown)
                .await
                .map_err(|e| anyhow::anyhow!(e))
        });
        *self.server.lock() = Some(handle);
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        self.cancel.cancel();
        let handle = self.server.lock().take();
        if let Some(handle) = handle {
            handle.await??;
        }
        Ok(())
    }
}
