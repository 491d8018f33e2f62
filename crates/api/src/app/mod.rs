//! HTTP application wiring (axum router + service wiring).
//!
//! - `services.rs`: builds the invoicing service and its collaborators
//! - `routes/`: HTTP handlers, one file per resource
//! - `dto.rs`: request bodies and JSON mapping
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{Extension, Router, routing::get};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

use services::AppServices;

/// Build the full HTTP router around already-wired services.
pub fn build_app(services: Arc<AppServices>) -> Router {
    // Tenant-scoped routes: require x-tenant-id.
    let scoped = routes::router()
        .layer(Extension(services))
        .layer(axum::middleware::from_fn(middleware::tenant_middleware));

    Router::new()
        .route("/health", get(routes::system::health))
        .merge(scoped)
        // One tracing span per request, with status and latency on response.
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
}
