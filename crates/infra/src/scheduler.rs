//! Facade the HTTP layer calls into.

use std::sync::Arc;

use tracing::info;

use switchyard_core::{DomainError, JobId, JobStatistics, RegisterWorkerServiceRequest, ScheduleJobRequest};

use crate::error::SchedulerResult;
use crate::message_bus::MessageBusService;
use crate::receipts::ReceiptStore;
use crate::registry::WorkerServiceRegistry;

#[derive(Clone)]
pub struct SchedulerService {
    bus: Arc<MessageBusService>,
    receipts: Arc<dyn ReceiptStore>,
    registry: Arc<dyn WorkerServiceRegistry>,
}

impl SchedulerService {
    pub fn new(
        bus: Arc<MessageBusService>,
        receipts: Arc<dyn ReceiptStore>,
        registry: Arc<dyn WorkerServiceRegistry>,
    ) -> Self {
        Self {
            bus,
            receipts,
            registry,
        }
    }

    pub fn bus(&self) -> &Arc<MessageBusService> {
        &self.bus
    }

    pub async fn schedule_job(&self, request: &ScheduleJobRequest) -> SchedulerResult<JobId> {
        self.bus.schedule_job(request).await
    }

    pub async fn job_statistics(&self, job_name: &str) -> SchedulerResult<JobStatistics> {
        Ok(self.receipts.statistics(job_name).await?)
    }

    pub async fn register_worker_service(
        &self,
        request: &RegisterWorkerServiceRequest,
    ) -> SchedulerResult<()> {
        request.validate()?;
        self.registry
            .register(request.service_id.trim(), request.job_name.trim())
            .await?;
        info!(service_id = %request.service_id, job_name = %request.job_name, "worker service registered");
        Ok(())
    }

    pub async fn unregister_worker_service(&self, service_id: &str) -> SchedulerResult<()> {
        if !self.registry.unregister(service_id).await? {
            return Err(DomainError::not_found(format!("worker service {service_id}")).into());
        }
        info!(service_id = %service_id, "worker service unregistered");
        Ok(())
    }

    pub async fn worker_services(&self, job_name: &str) -> SchedulerResult<Vec<String>> {
        Ok(self.registry.services_for(job_name).await?)
    }
}
