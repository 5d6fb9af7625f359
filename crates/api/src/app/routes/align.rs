use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    response::{
        sse::{Event as SseEvent, Sse},
        IntoResponse,
    },
    routing::{get, post},
    Json, Router,
};
use tokio_stream::{Stream, StreamExt};

use seqalign_core::CompletionUpdate;
use seqalign_events::{EventBus, JobEvent};
use seqalign_infra::CreateAlignJob;

use crate::app::routes::system;
use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/health", get(system::health))
        .route("/webhook", post(webhook))
        .route("/stream", get(stream))
        .route("/jobs", get(list_jobs))
        .route("/:file_id", post(create_job))
}

/// POST /align/{fileId}
pub async fn create_job(
    Extension(services): Extension<Arc<AppServices>>,
    Path(file_id): Path<String>,
    Json(body): Json<CreateAlignJob>,
) -> axum::response::Response {
    let file_id = match dto::parse_file_id(&file_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.orchestrator.create(file_id, body).await {
        Ok(event) => Json(event).into_response(),
        Err(e) => errors::lifecycle_error_to_response(e),
    }
}

/// POST /align/webhook
///
/// Completion callback from the alignment engine.
pub async fn webhook(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<CompletionUpdate>,
) -> axum::response::Response {
    match services.orchestrator.update(body).await {
        Ok(event) => Json(event).into_response(),
        Err(e) => errors::lifecycle_error_to_response(e),
    }
}

/// GET /align/stream
///
/// Live job events as SSE. Job changes are sent as `job` events and
/// keep-alives as `heartbeat` events; both carry a `JobEvent` body.
/// Closing the connection detaches the subscriber.
pub async fn stream(
    Extension(services): Extension<Arc<AppServices>>,
) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>> {
    let events = services.bus.subscribe().map(|event: JobEvent| {
        let name = if event.is_heartbeat() { "heartbeat" } else { "job" };
        let data = serde_json::to_string(&event).unwrap_or_else(|_| "{}".to_string());
        Ok(SseEvent::default().event(name).data(data))
    });

    Sse::new(events)
}

/// GET /align/jobs?page=1&size=10&sort=createdAt,desc
pub async fn list_jobs(
    Extension(services): Extension<Arc<AppServices>>,
    Query(params): Query<Vec<(String, String)>>,
) -> axum::response::Response {
    let query = dto::JobsQuery::from_pairs(params);
    let page = services.history.list(query.page_request(), &query.sort).await;
    Json(page).into_response()
}
