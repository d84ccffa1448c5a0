use serde::Serialize;

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
pub struct ScheduleJobResponse {
    pub job_id: String,
}

#[derive(Debug, Serialize)]
pub struct WorkerServiceResponse {
    pub service_id: String,
    pub job_name: String,
}

#[derive(Debug, Serialize)]
pub struct ItemsResponse<T> {
    pub items: Vec<T>,
}
