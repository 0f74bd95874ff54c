#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use atelier_api::config::ServerConfig;
use atelier_api::router::build_app_router;
use atelier_api::state::AppState;
use atelier_api::ws::WsManager;
use atelier_core::retry::{Backoff, RetryPolicy};
use atelier_events::EventBus;
use atelier_pipeline::{DispatchConfig, ExecutorConfig, MemoryStore, Pipeline};
use atelier_provider::{
    Artifact, GenerationProvider, ProgressSink, ProviderError, ProviderRegistry, ProviderRequest,
};
use atelier_storage::MemoryArtifactStore;
use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

pub const SCOPE: i64 = 1;
pub const OTHER_SCOPE: i64 = 2;

/// Returns one PNG per requested variation, or fails with a fixed error.
pub struct StubProvider {
    pub failure: Option<ProviderError>,
}

#[async_trait]
impl GenerationProvider for StubProvider {
    async fn generate(
        &self,
        request: &ProviderRequest,
        progress: &dyn ProgressSink,
    ) -> Result<Vec<Artifact>, ProviderError> {
        if let Some(err) = &self.failure {
            return Err(err.clone());
        }
        progress.report(50).await;
        Ok((0..request.variations)
            .map(|i| Artifact {
                bytes: format!("{}#{i}", request.prompt).into_bytes(),
                content_type: "image/png".into(),
            })
            .collect())
    }
}

/// Build a test `ServerConfig` with safe defaults. Immediate dispatch is
/// off so tests decide when jobs run.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 1,
        dispatch_on_submit: false,
        scheduled_dispatch: false,
    }
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub store: Arc<MemoryStore>,
    pub events: Arc<EventBus>,
}

pub fn build_test_app() -> TestApp {
    build_test_app_with(test_config(), None)
}

pub fn build_test_app_with(config: ServerConfig, failure: Option<ProviderError>) -> TestApp {
    let store = Arc::new(MemoryStore::with_scopes([SCOPE, OTHER_SCOPE]));
    let events = Arc::new(EventBus::default());
    let providers = ProviderRegistry::new().with("stub", Arc::new(StubProvider { failure }));

    let pipeline = Pipeline::new(
        store.clone(),
        providers,
        Arc::new(MemoryArtifactStore::new()),
        Arc::clone(&events),
        DispatchConfig::default(),
        ExecutorConfig {
            upload_retry: RetryPolicy::new(3, Backoff::Fixed(Duration::ZERO)),
            terminal_write_retry: RetryPolicy::new(3, Backoff::Fixed(Duration::ZERO)),
        },
    );

    let state = AppState {
        config: Arc::new(config.clone()),
        pipeline,
        ws_manager: Arc::new(WsManager::new()),
        pool: None,
    };

    TestApp {
        router: build_app_router(state.clone(), &config),
        state,
        store,
        events,
    }
}

pub fn submit_body(variations: i32) -> Value {
    serde_json::json!({
        "kind": "image",
        "provider": "stub",
        "model": "stub-v1",
        "prompt": "a red bicycle",
        "variations": variations,
    })
}

pub async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    scope: Option<i64>,
    body: Option<Value>,
) -> Response<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(scope) = scope {
        builder = builder.header("x-owner-scope", scope.to_string());
    }
    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    app.clone().oneshot(request).await.unwrap()
}

pub async fn get(app: &Router, uri: &str) -> Response<Body> {
    send(app, Method::GET, uri, Some(SCOPE), None).await
}

pub async fn post_json(app: &Router, uri: &str, body: Value) -> Response<Body> {
    send(app, Method::POST, uri, Some(SCOPE), Some(body)).await
}

pub async fn post(app: &Router, uri: &str) -> Response<Body> {
    send(app, Method::POST, uri, Some(SCOPE), None).await
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
