//! Per-request child containers.

use axum::extract::{Request, State};
use axum::http::{HeaderName, Method, StatusCode, Uri};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use http::HeaderMap;
use std::sync::{Arc, Weak};
use wirekit::{Container, ContainerError};

/// Identifier of the [`RequestContext`] inside a request container.
pub const CTX_ID: &str = "ctx";

pub(crate) fn request_id_header() -> HeaderName {
    HeaderName::from_static("x-request-id")
}

/// The current request, registered as `ctx` in its request container.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: String,
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
}

/// Request extension carrying the request container.
#[derive(Debug, Clone)]
pub struct RequestScope(pub Arc<Container>);

impl RequestScope {
    pub fn container(&self) -> &Arc<Container> {
        &self.0
    }

    pub async fn context(&self) -> Result<Arc<RequestContext>, ContainerError> {
        self.0.resolve_as::<RequestContext>(CTX_ID).await
    }

    pub async fn get<T: Send + Sync + 'static>(&self) -> Result<Arc<T>, ContainerError> {
        self.0.get::<T>().await
    }
}

/// Create a child container for the request, expose it as [`RequestScope`],
/// and close it once the response is produced.
pub(crate) async fn request_scope(
    State(root): State<Weak<Container>>,
    mut req: Request,
    next: Next,
) -> Response {
    let Some(root) = root.upgrade() else {
        return (StatusCode::SERVICE_UNAVAILABLE, "application container is gone").into_response();
    };

    let request_id = req
        .headers()
        .get(request_id_header())
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let child = root.create_child();
    child.register_instance(
        CTX_ID,
        Arc::new(RequestContext {
            request_id: request_id.clone(),
            method: req.method().clone(),
            uri: req.uri().clone(),
            headers: req.headers().clone(),
        }),
    );
    req.extensions_mut().insert(RequestScope(child.clone()));

    let response = next.run(req).await;
    child.close().await;
    tracing::trace!(request_id = %request_id, "request container closed");
    response
}
