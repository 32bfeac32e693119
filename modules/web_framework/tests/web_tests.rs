//! Web adapter booted through the container.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::routing::get;
use axum::Extension;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tower::ServiceExt;
use web_framework::{RequestScope, WebApplication, WebFramework};
use wirekit::{
    bootstrap, Application, BootstrapOptions, Catalog, ClassBuilder, Component, Framework,
    Handled, Scope,
};

static VISITS_CLOSED: AtomicUsize = AtomicUsize::new(0);

#[derive(Default)]
struct Greeter {
    app: Handled<Application>,
}

impl Component for Greeter {
    fn describe(c: &mut ClassBuilder<'_, Self>) {
        c.provide()
            .default_factory()
            .preload()
            .app("app", None, |g| &g.app)
            .init("mount", |g: Arc<Greeter>| async move { g.mount() });
    }
}

impl Greeter {
    fn mount(&self) -> anyhow::Result<()> {
        let app = self
            .app
            .get()
            .ok_or_else(|| anyhow::anyhow!("no application"))?;
        let web = app
            .state::<WebApplication>()
            .ok_or_else(|| anyhow::anyhow!("not a web application"))?;
        web.route("/hello", get(|| async { "hello" }))
            .route("/whoami", get(whoami))
            .route("/visit", get(visit));
        Ok(())
    }
}

async fn whoami(Extension(scope): Extension<RequestScope>) -> Result<String, StatusCode> {
    let ctx = scope
        .context()
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok(format!("{} {}", ctx.method, ctx.request_id))
}

async fn visit(Extension(scope): Extension<RequestScope>) -> StatusCode {
    let first = scope.get::<Visit>().await;
    let second = scope.get::<Visit>().await;
    match (first, second) {
        (Ok(a), Ok(b)) if Arc::ptr_eq(&a, &b) => StatusCode::OK,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

#[derive(Default)]
struct Visit;

impl Component for Visit {
    fn describe(c: &mut ClassBuilder<'_, Self>) {
        c.provide()
            .scope(Scope::Request)
            .default_factory()
            .destroy("close", |_v: Arc<Visit>| async move {
                VISITS_CLOSED.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
    }
}

async fn boot(web: Value) -> (TempDir, wirekit::ApplicationContext, Arc<WebFramework>) {
    let dir = TempDir::new().unwrap();
    let options = BootstrapOptions::from_tree(json!({ "web": web }), dir.path(), "test").unwrap();
    let mut catalog = Catalog::new();
    catalog
        .register::<WebFramework>()
        .register::<Greeter>()
        .register::<Visit>();
    let ctx = bootstrap(options, catalog).await.unwrap();
    let web = ctx.container.get::<WebFramework>().await.unwrap();
    (dir, ctx, web)
}

async fn body_text(resp: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn healthz_and_component_routes_are_served() {
    let (_dir, ctx, web) = boot(json!({})).await;
    assert!(ctx.frameworks.main_app().is_some());

    let router = web.router().unwrap();
    let resp = router.clone().oneshot(get_request("/healthz")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let health: Value = serde_json::from_str(&body_text(resp).await).unwrap();
    assert_eq!(health, json!({ "status": "ok" }));

    let resp = router.oneshot(get_request("/hello")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp.headers().contains_key("x-request-id"));
    assert_eq!(body_text(resp).await, "hello");
}

#[tokio::test]
async fn request_context_carries_the_request_id() {
    let (_dir, _ctx, web) = boot(json!({})).await;
    let req = Request::builder()
        .uri("/whoami")
        .header("x-request-id", "abc-123")
        .body(Body::empty())
        .unwrap();

    let resp = web.router().unwrap().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers().get("x-request-id").unwrap().to_str().unwrap(),
        "abc-123"
    );
    assert_eq!(body_text(resp).await, "GET abc-123");
}

#[tokio::test]
async fn request_scoped_objects_are_shared_within_a_request_and_closed_after() {
    let (_dir, ctx, web) = boot(json!({})).await;
    let router = web.router().unwrap();

    let before = VISITS_CLOSED.load(Ordering::SeqCst);
    let resp = router.clone().oneshot(get_request("/visit")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let resp = router.oneshot(get_request("/visit")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    assert_eq!(VISITS_CLOSED.load(Ordering::SeqCst), before + 2);
    assert!(ctx.container.peek(&"visit".into()).is_none());
}

#[tokio::test]
async fn prefix_mounts_application_routes_only() {
    let (_dir, _ctx, web) = boot(json!({ "prefix": "/api" })).await;
    let router = web.router().unwrap();

    let resp = router.clone().oneshot(get_request("/api/hello")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let resp = router.clone().oneshot(get_request("/hello")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let resp = router.oneshot(get_request("/healthz")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn run_serves_until_stopped() {
    let (_dir, _ctx, web) = boot(json!({ "port": 0 })).await;
    web.run().await.unwrap();
    let addr = web.local_addr().unwrap();
    assert_ne!(addr.port(), 0);

    let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(b"GET /hello HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();
    let mut raw = String::new();
    stream.read_to_string(&mut raw).await.unwrap();
    assert!(raw.starts_with("HTTP/1.1 200"), "unexpected response: {raw}");
    assert!(raw.ends_with("hello"));

    web.stop().await.unwrap();
    assert!(tokio::net::TcpStream::connect(addr).await.is_err());
}
