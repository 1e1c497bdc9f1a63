//! Background task pipeline.
//!
//! The UI thread owns a [`TaskController`]. It admits one [`Operation`] at a time, moves
//! it into a [`TaskEnvelope`] and hands that to the worker thread, which owns the
//! [`GeometryProcessor`](crate::geometry::GeometryProcessor). Results come back as
//! [`TaskEvent`]s: log lines, immutable snapshots and exactly one `Finished` per
//! accepted task.
//!
//! ```text
//! UI ──submit──▶ TaskController ──TaskEnvelope──▶ worker thread ──▶ GeometryProcessor
//!  ▲                  │ pump()                          │
//!  └── TaskEvent ◀────┴──────────── TaskEvent ◀─────────┘
//! ```

pub mod controller;
pub mod envelope;
pub mod snapshot;
pub mod worker;

pub use controller::{ChannelDispatch, TaskController, TaskDispatch};
pub use envelope::TaskEnvelope;
pub use snapshot::{mesh_snapshot, point_cloud_snapshot};
pub use worker::spawn_worker;

use crate::models::{MeshSnapshot, Operation, OperationKind, PointCloudSnapshot};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

/// Identifier of one accepted submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

impl TaskId {
    pub(crate) fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

/// One line of the user-visible log stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub level: LogLevel,
    pub message: String,
}

impl LogEntry {
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
        }
    }

    /// Mirror the entry into `tracing`.
    pub(crate) fn trace(&self) {
        match self.level {
            LogLevel::Info => tracing::info!("{}", self.message),
            LogLevel::Warn => tracing::warn!("{}", self.message),
            LogLevel::Error => tracing::error!("{}", self.message),
        }
    }
}

/// Completion signal for an accepted task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskOutcome {
    pub id: TaskId,
    pub kind: OperationKind,
    pub success: bool,
}

/// Messages flowing from the task worker up to the UI.
#[derive(Debug, Clone)]
pub enum TaskEvent {
    Log(LogEntry),
    PointCloudReady(Arc<PointCloudSnapshot>),
    MeshReady(Arc<MeshSnapshot>),
    Finished(TaskOutcome),
}

/// Why a submission did not reach the worker.
#[derive(Error, Debug)]
pub enum SubmitError {
    /// Another task is in flight. The operation is handed back untouched.
    #[error("busy: {running} is still in flight, {} rejected", .operation.kind())]
    Busy {
        operation: Operation,
        running: OperationKind,
    },

    #[error("task worker is not running")]
    WorkerUnavailable,
}

impl SubmitError {
    /// Recover the rejected operation, if the rejection kept it.
    pub fn into_operation(self) -> Option<Operation> {
        match self {
            SubmitError::Busy { operation, .. } => Some(operation),
            SubmitError::WorkerUnavailable => None,
        }
    }
}

#[derive(Error, Debug)]
pub enum TaskError {
    #[error("failed to spawn task worker thread: {0}")]
    Spawn(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;

    #[test]
    fn test_task_ids_are_unique() {
        let a = TaskId::next();
        let b = TaskId::next();
        assert_ne!(a, b);
        assert!(b > a);
    }

    #[test]
    fn test_busy_error_returns_operation() {
        let operation = Operation::Import {
            path: Utf8PathBuf::from("a.xyz"),
        };
        let err = SubmitError::Busy {
            operation: operation.clone(),
            running: OperationKind::Reconstruct,
        };
        assert_eq!(
            err.to_string(),
            "busy: reconstruct is still in flight, import rejected"
        );
        assert_eq!(err.into_operation(), Some(operation));
    }
}
