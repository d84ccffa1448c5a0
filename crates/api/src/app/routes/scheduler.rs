use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, rejection::JsonRejection},
    response::IntoResponse,
    routing::{delete, get, post},
};

use switchyard_core::{RegisterWorkerServiceRequest, ScheduleJobRequest};

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/schedule-job", post(schedule_job))
        .route("/get-job-statistics/:name", get(get_job_statistics))
        .route("/register-worker-service", post(register_worker_service))
        .route("/unregister-worker-service/:id", delete(unregister_worker_service))
        .route("/worker-services/:name", get(list_worker_services))
}

pub async fn schedule_job(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<ScheduleJobRequest>, JsonRejection>,
) -> axum::response::Response {
    let Json(request) = match body {
        Ok(body) => body,
        Err(rejection) => return errors::json_rejection_to_response(rejection),
    };

    match services.scheduler.schedule_job(&request).await {
        Ok(id) => Json(dto::ScheduleJobResponse {
            job_id: id.to_string(),
        })
        .into_response(),
        Err(e) => errors::scheduler_error_to_response(e),
    }
}

pub async fn get_job_statistics(
    Extension(services): Extension<Arc<AppServices>>,
    Path(name): Path<String>,
) -> axum::response::Response {
    match services.scheduler.job_statistics(&name).await {
        Ok(stats) => Json(stats).into_response(),
        Err(e) => errors::scheduler_error_to_response(e),
    }
}

pub async fn register_worker_service(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<RegisterWorkerServiceRequest>, JsonRejection>,
) -> axum::response::Response {
    let Json(request) = match body {
        Ok(body) => body,
        Err(rejection) => return errors::json_rejection_to_response(rejection),
    };

    match services.scheduler.register_worker_service(&request).await {
        Ok(()) => Json(dto::WorkerServiceResponse {
            service_id: request.service_id.trim().to_string(),
            job_name: request.job_name.trim().to_string(),
        })
        .into_response(),
        Err(e) => errors::scheduler_error_to_response(e),
    }
}

pub async fn unregister_worker_service(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    match services.scheduler.unregister_worker_service(&id).await {
        Ok(()) => Json(serde_json::json!({ "service_id": id })).into_response(),
        Err(e) => errors::scheduler_error_to_response(e),
    }
}

pub async fn list_worker_services(
    Extension(services): Extension<Arc<AppServices>>,
    Path(name): Path<String>,
) -> axum::response::Response {
    match services.scheduler.worker_services(&name).await {
        Ok(items) => Json(dto::ItemsResponse { items }).into_response(),
        Err(e) => errors::scheduler_error_to_response(e),
    }
}
