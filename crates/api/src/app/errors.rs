use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use seqalign_infra::LifecycleError;

pub fn lifecycle_error_to_response(err: LifecycleError) -> axum::response::Response {
    let status = match &err {
        LifecycleError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        LifecycleError::InvalidTransition { .. } => StatusCode::CONFLICT,
        LifecycleError::RemoteRejected { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        LifecycleError::RemoteUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        LifecycleError::JobNotFound(_) => StatusCode::NOT_FOUND,
        LifecycleError::StorageFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    json_error(status, err.kind(), err.to_string())
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
