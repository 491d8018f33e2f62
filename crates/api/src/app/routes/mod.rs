use axum::Router;
use axum::response::Response;

pub mod invoices;
pub mod students;
pub mod system;
pub mod templates;

/// Handlers answer errors as ready-made JSON responses.
pub type HandlerResult = Result<Response, Response>;

/// Router for all tenant-scoped endpoints.
pub fn router() -> Router {
    Router::new()
        .nest("/students", students::router())
        .nest("/templates", templates::router())
        .nest("/invoices", invoices::router())
}
