use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;
use tracing::error;

use switchyard_core::DomainError;
use switchyard_infra::SchedulerError;

pub fn scheduler_error_to_response(err: SchedulerError) -> axum::response::Response {
    match err {
        SchedulerError::Domain(DomainError::NotFound(msg)) => {
            json_error(StatusCode::NOT_FOUND, "not_found", msg)
        }
        SchedulerError::Domain(e) => {
            json_error(StatusCode::BAD_REQUEST, "validation_error", e.to_string())
        }
        SchedulerError::JobStore(e) => {
            error!(error = %e, "job store failure");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", e.to_string())
        }
        SchedulerError::Broker(e) => {
            error!(error = %e, "broker failure");
            json_error(StatusCode::BAD_GATEWAY, "publish_error", e.to_string())
        }
        SchedulerError::Receipts(e) => {
            error!(error = %e, "receipt store failure");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "database_error", e.to_string())
        }
        SchedulerError::Registry(e) => {
            error!(error = %e, "registry failure");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "database_error", e.to_string())
        }
    }
}

/// Malformed or mistyped JSON bodies are validation errors.
pub fn json_rejection_to_response(rejection: JsonRejection) -> axum::response::Response {
    json_error(StatusCode::BAD_REQUEST, "validation_error", rejection.body_text())
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
