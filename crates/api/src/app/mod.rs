//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: infrastructure wiring (stores, engine client, event bus, orchestrator)
//! - `routes/`: HTTP routes + handlers
//! - `dto.rs`: request DTOs and query-string mapping
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{Extension, Router};
use tower::ServiceBuilder;

use seqalign_infra::AppConfig;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

pub use services::AppServices;

/// Router over already-built services.
pub fn router(services: Arc<AppServices>) -> Router {
    routes::router().layer(ServiceBuilder::new().layer(Extension(services)))
}

/// Build services from `config` and the full HTTP router (public entrypoint used by `main.rs`).
pub async fn build_app(config: &AppConfig) -> anyhow::Result<(Router, Arc<AppServices>)> {
    let services = Arc::new(services::build_services(config).await?);
    Ok((router(services.clone()), services))
}
