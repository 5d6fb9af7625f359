use axum::{routing::get, Router};

pub mod align;
pub mod system;

/// Router for all endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/health", get(system::health))
        .route("/status", get(system::status))
        .nest("/align", align::router())
}
