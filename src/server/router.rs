//! Router assembly for the nested REST exposure

use crate::links::handlers::{AppState, dispatch_nested};
use crate::server::host::NestedHost;
use axum::{Json, Router, routing::get};
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

/// Build the complete router for a host
///
/// Health routes and custom routes are matched first, every other path
/// goes to the nested dispatch.
pub fn build_router(host: Arc<NestedHost>, custom_routes: Vec<Router>) -> Router {
    let mut app = health_routes();
    for custom_router in custom_routes {
        app = app.merge(custom_router);
    }

    app.merge(build_nested_routes(host.app_state()))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
}

/// Nested routes are resolved by the factories, so they hang off the fallback
pub fn build_nested_routes(state: AppState) -> Router {
    Router::new().fallback(dispatch_nested).with_state(state)
}

fn health_routes() -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/healthz", get(health_check))
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "nested-rest"
    }))
}
