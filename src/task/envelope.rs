use super::TaskId;
use crate::metrics::Metrics;
use crate::models::{Operation, OperationKind};
use std::sync::Arc;

/// An accepted operation on its way to, or running on, the task worker.
///
/// Owns the parameter value for the whole life of the task. There is exactly one
/// envelope per accepted submission; dropping it releases the parameters and is
/// counted in [`Metrics::params_released`].
#[derive(Debug)]
pub struct TaskEnvelope {
    id: TaskId,
    operation: Operation,
    metrics: Arc<Metrics>,
}

impl TaskEnvelope {
    pub(crate) fn new(operation: Operation, metrics: Arc<Metrics>) -> Self {
        Self {
            id: TaskId::next(),
            operation,
            metrics,
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn kind(&self) -> OperationKind {
        self.operation.kind()
    }

    pub fn operation(&self) -> &Operation {
        &self.operation
    }
}

impl Drop for TaskEnvelope {
    fn drop(&mut self) {
        self.metrics.record_params_released();
        tracing::trace!("Released parameters of task {} ({})", self.id, self.kind());
    }
}
