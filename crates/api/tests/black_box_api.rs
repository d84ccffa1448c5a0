use std::sync::Arc;

use reqwest::StatusCode;
use serde_json::json;

use switchyard_api::app::{build_app, services::AppServices, services::build_in_memory_services};
use switchyard_infra::SchedulerConfig;

struct TestServer {
    base_url: String,
    services: Arc<AppServices>,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn(config: SchedulerConfig) -> Self {
        // Same router as prod on in-memory stores, bound to an ephemeral port.
        let services = Arc::new(build_in_memory_services(&config));
        let app = build_app(services.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url,
            services,
            handle,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[tokio::test]
async fn health_is_ok() {
    let srv = TestServer::spawn(SchedulerConfig::default()).await;

    let res = reqwest::get(srv.url("/health")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn schedule_job_returns_id_of_pending_job() {
    let srv = TestServer::spawn(SchedulerConfig::default()).await;
    let client = reqwest::Client::new();

    let res = client
        .post(srv.url("/scheduler/schedule-job"))
        .json(&json!({ "job_name": "resize", "job_context": { "width": 640 } }))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    let job_id = body["job_id"].as_str().unwrap();
    let id: switchyard_core::JobId = job_id.parse().unwrap();

    let record = srv.services.store.get(id).await.unwrap().unwrap();
    assert_eq!(record.name, "resize");
    assert_eq!(record.status, switchyard_core::JobStatus::Pending);
    assert_eq!(record.context["width"], 640);
}

#[tokio::test]
async fn schedule_job_without_context_defaults_to_empty() {
    let srv = TestServer::spawn(SchedulerConfig::default()).await;
    let client = reqwest::Client::new();

    let res = client
        .post(srv.url("/scheduler/schedule-job"))
        .json(&json!({ "job_name": "resize" }))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn blank_job_name_is_rejected() {
    let srv = TestServer::spawn(SchedulerConfig::default()).await;
    let client = reqwest::Client::new();

    let res = client
        .post(srv.url("/scheduler/schedule-job"))
        .json(&json!({ "job_name": "   ", "job_context": {} }))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "validation_error");
}

#[tokio::test]
async fn malformed_json_is_rejected() {
    let srv = TestServer::spawn(SchedulerConfig::default()).await;
    let client = reqwest::Client::new();

    let res = client
        .post(srv.url("/scheduler/schedule-job"))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "validation_error");
}

#[tokio::test]
async fn statistics_reflect_escalated_jobs() {
    let config = SchedulerConfig {
        worker_max_job_retries: 0,
        ..SchedulerConfig::default()
    };
    let srv = TestServer::spawn(config).await;
    let client = reqwest::Client::new();

    let res = client
        .get(srv.url("/scheduler/get-job-statistics/encode"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let empty: serde_json::Value = res.json().await.unwrap();
    assert_eq!(empty["total_receipts"], 0);
    assert_eq!(empty["failure_rate"], 0.0);

    let res = client
        .post(srv.url("/scheduler/schedule-job"))
        .json(&json!({ "job_name": "encode", "job_context": {} }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    // Far enough in the future that the job is past the stuck threshold.
    let now = switchyard_core::unix_now() + 86_400;
    let report = srv.services.watchdog.check_stuck_jobs_at(now).await.unwrap();
    assert_eq!(report.escalated, 1);

    let stats: serde_json::Value = client
        .get(srv.url("/scheduler/get-job-statistics/encode"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(stats["job_name"], "encode");
    assert_eq!(stats["total_receipts"], 1);
    assert_eq!(stats["failed"], 1);
    assert_eq!(stats["succeeded"], 0);
    assert_eq!(stats["last_failure_at"], now);
    assert_eq!(stats["daily_failures"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn worker_service_registry_lifecycle() {
    let srv = TestServer::spawn(SchedulerConfig::default()).await;
    let client = reqwest::Client::new();

    for service_id in ["svc-b", "svc-a"] {
        let res = client
            .post(srv.url("/scheduler/register-worker-service"))
            .json(&json!({ "service_id": service_id, "job_name": "resize" }))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    let listed: serde_json::Value = client
        .get(srv.url("/scheduler/worker-services/resize"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(listed["items"], json!(["svc-a", "svc-b"]));

    let res = client
        .delete(srv.url("/scheduler/unregister-worker-service/svc-a"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = client
        .delete(srv.url("/scheduler/unregister-worker-service/svc-a"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "not_found");

    let listed: serde_json::Value = client
        .get(srv.url("/scheduler/worker-services/resize"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(listed["items"], json!(["svc-b"]));
}

#[tokio::test]
async fn register_worker_service_requires_both_fields() {
    let srv = TestServer::spawn(SchedulerConfig::default()).await;
    let client = reqwest::Client::new();

    let res = client
        .post(srv.url("/scheduler/register-worker-service"))
        .json(&json!({ "service_id": "svc", "job_name": "" }))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}
