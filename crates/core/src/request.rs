//! Inbound requests accepted at the scheduler boundary.

use serde::Deserialize;

use crate::error::{DomainError, DomainResult};
use crate::job::JobContext;

/// Request to enqueue a job.
#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleJobRequest {
    pub job_name: String,
    #[serde(default)]
    pub job_context: JobContext,
}

impl ScheduleJobRequest {
    pub fn new(job_name: impl Into<String>, job_context: JobContext) -> Self {
        Self {
            job_name: job_name.into(),
            job_context,
        }
    }

    pub fn validate(&self) -> DomainResult<()> {
        if self.job_name.trim().is_empty() {
            return Err(DomainError::validation("job name must not be empty"));
        }
        Ok(())
    }
}

/// Request to bind a worker service to the job name it executes.
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterWorkerServiceRequest {
    pub service_id: String,
    pub job_name: String,
}

impl RegisterWorkerServiceRequest {
    pub fn validate(&self) -> DomainResult<()> {
        if self.service_id.trim().is_empty() {
            return Err(DomainError::validation("service id must not be empty"));
        }
        if self.job_name.trim().is_empty() {
            return Err(DomainError::validation("job name must not be empty"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn context_defaults_to_empty_object() {
        let req: ScheduleJobRequest = serde_json::from_str(r#"{"job_name":"N"}"#).unwrap();
        assert!(req.job_context.is_empty());
        assert!(req.validate().is_ok());
    }

    #[test]
    fn worker_registration_requires_both_fields() {
        let missing_service = RegisterWorkerServiceRequest {
            service_id: "".into(),
            job_name: "N".into(),
        };
        assert!(matches!(missing_service.validate(), Err(DomainError::Validation(_))));

        let missing_job = RegisterWorkerServiceRequest {
            service_id: "svc".into(),
            job_name: " ".into(),
        };
        assert!(matches!(missing_job.validate(), Err(DomainError::Validation(_))));
    }

    proptest! {
        #[test]
        fn whitespace_only_names_are_rejected(name in "[ \t\n]{0,8}") {
            let req = ScheduleJobRequest::new(name, JobContext::new());
            prop_assert!(req.validate().is_err());
        }

        #[test]
        fn names_with_a_visible_character_are_accepted(name in "[ ]{0,3}[a-z][a-z0-9_-]{0,12}") {
            let req = ScheduleJobRequest::new(name, JobContext::new());
            prop_assert!(req.validate().is_ok());
        }
    }
}
