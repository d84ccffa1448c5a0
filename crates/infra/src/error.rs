use switchyard_core::DomainError;

use crate::broker::BrokerError;
use crate::jobs::JobStoreError;
use crate::receipts::ReceiptStoreError;
use crate::registry::RegistryError;

pub type SchedulerResult<T> = Result<T, SchedulerError>;

/// Error of any scheduler operation.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SchedulerError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    JobStore(#[from] JobStoreError),

    #[error(transparent)]
    Broker(#[from] BrokerError),

    #[error(transparent)]
    Receipts(#[from] ReceiptStoreError),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}
