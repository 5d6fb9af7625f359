use std::sync::Arc;

use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};

use seqalign_events::EventBus;

use crate::app::services::AppServices;

pub async fn health() -> StatusCode {
    StatusCode::OK
}

/// GET /status
///
/// Live subscriber count, for diagnostics.
pub async fn status(Extension(services): Extension<Arc<AppServices>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "subscribers": services.bus.subscriber_count(),
        "bus_closed": services.bus.is_closed(),
    }))
}
