use super::{
    LogEntry, LogLevel, SubmitError, TaskEnvelope, TaskError, TaskEvent, TaskId, spawn_worker,
};
use crate::geometry::GeometryProcessor;
use crate::metrics::Metrics;
use crate::models::{Operation, OperationKind, TaskConfig};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, mpsc};

/// Hands accepted envelopes to whatever runs them.
///
/// The production implementation is the worker's channel; tests substitute their own to
/// observe exactly which submissions made it past the busy gate.
#[cfg_attr(test, mockall::automock)]
pub trait TaskDispatch: Send {
    /// Returns the envelope back if it could not be delivered.
    fn dispatch(&mut self, envelope: TaskEnvelope) -> Result<(), TaskEnvelope>;
}

/// [`TaskDispatch`] over the worker's envelope channel.
pub struct ChannelDispatch(pub mpsc::UnboundedSender<TaskEnvelope>);

impl TaskDispatch for ChannelDispatch {
    fn dispatch(&mut self, envelope: TaskEnvelope) -> Result<(), TaskEnvelope> {
        self.0.send(envelope).map_err(|e| e.0)
    }
}

#[derive(Debug, Clone, Copy)]
struct InFlight {
    id: TaskId,
    kind: OperationKind,
    since: Instant,
}

/// UI-facing admission gate for geometry operations.
///
/// Lives on the UI thread and is driven through `&mut self`; the in-flight marker is
/// plain data, not shared with the worker. A task is in flight from the moment
/// [`submit`](Self::submit) accepts it until [`pump`](Self::pump) sees its `Finished`.
pub struct TaskController {
    dispatch: Option<Box<dyn TaskDispatch>>,
    events: mpsc::UnboundedReceiver<TaskEvent>,
    broadcast_tx: broadcast::Sender<TaskEvent>,
    in_flight: Option<InFlight>,
    worker: Option<JoinHandle<()>>,
    metrics: Arc<Metrics>,
    shutdown_timeout: Duration,
}

impl TaskController {
    /// Spawn the task worker thread around `processor`.
    pub fn spawn(
        processor: Box<dyn GeometryProcessor>,
        config: &TaskConfig,
        metrics: Arc<Metrics>,
    ) -> Result<Self, TaskError> {
        let (task_tx, event_rx, handle) = spawn_worker(processor, config.default_normal_method)?;
        let mut controller = Self::with_dispatch(
            Box::new(ChannelDispatch(task_tx)),
            event_rx,
            config,
            metrics,
        );
        controller.worker = Some(handle);
        Ok(controller)
    }

    /// Build a controller over a custom dispatch and event source, without a worker thread.
    pub fn with_dispatch(
        dispatch: Box<dyn TaskDispatch>,
        events: mpsc::UnboundedReceiver<TaskEvent>,
        config: &TaskConfig,
        metrics: Arc<Metrics>,
    ) -> Self {
        let (broadcast_tx, _) = broadcast::channel(config.event_capacity.max(1));
        Self {
            dispatch: Some(dispatch),
            events,
            broadcast_tx,
            in_flight: None,
            worker: None,
            metrics,
            shutdown_timeout: config.shutdown_timeout(),
        }
    }

    /// Whether a task is between acceptance and its finished signal.
    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some()
    }

    /// The task currently in flight, if any.
    pub fn current_task(&self) -> Option<(TaskId, OperationKind)> {
        self.in_flight.map(|f| (f.id, f.kind))
    }

    /// Subscribe to the upward event stream (logs, snapshots, finished signals).
    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.broadcast_tx.subscribe()
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Offer an operation to the worker.
    ///
    /// While another task is in flight the operation is rejected and returned inside
    /// [`SubmitError::Busy`]; nothing else changes apart from a log line.
    pub fn submit(&mut self, operation: Operation) -> Result<TaskId, SubmitError> {
        if let Some(running) = self.in_flight {
            self.metrics.record_task_rejected();
            self.publish_log(
                LogLevel::Warn,
                format!(
                    "Busy: {} is still running, {} was not started.",
                    running.kind,
                    operation.kind()
                ),
            );
            return Err(SubmitError::Busy {
                operation,
                running: running.kind,
            });
        }

        let Some(dispatch) = self.dispatch.as_mut() else {
            self.publish_log(LogLevel::Error, "Task worker is not running.");
            return Err(SubmitError::WorkerUnavailable);
        };

        let envelope = TaskEnvelope::new(operation, self.metrics.clone());
        let (id, kind) = (envelope.id(), envelope.kind());
        if let Err(envelope) = dispatch.dispatch(envelope) {
            drop(envelope);
            self.publish_log(LogLevel::Error, "Task worker is not running.");
            return Err(SubmitError::WorkerUnavailable);
        }

        self.in_flight = Some(InFlight {
            id,
            kind,
            since: Instant::now(),
        });
        self.metrics.record_task_accepted();
        tracing::debug!("Accepted task {} ({})", id, kind);
        Ok(id)
    }

    /// Drain pending worker events without blocking.
    ///
    /// Clears the in-flight marker on `Finished`, forwards every event to subscribers
    /// and returns them in arrival order.
    pub fn pump(&mut self) -> Vec<TaskEvent> {
        let mut drained = Vec::new();
        loop {
            match self.events.try_recv() {
                Ok(event) => {
                    self.observe(&event);
                    self.forward(event.clone());
                    drained.push(event);
                }
                Err(mpsc::error::TryRecvError::Empty) => break,
                Err(mpsc::error::TryRecvError::Disconnected) => {
                    if let Some(lost) = self.in_flight.take() {
                        // the worker can only vanish mid-task if its thread died
                        self.metrics
                            .record_task_finished(false, lost.since.elapsed());
                        let entry = LogEntry::new(
                            LogLevel::Error,
                            format!("Task worker exited while {} was running.", lost.kind),
                        );
                        entry.trace();
                        let event = TaskEvent::Log(entry);
                        self.forward(event.clone());
                        drained.push(event);
                    }
                    break;
                }
            }
        }
        drained
    }

    /// Pump until no task is in flight or `timeout` passes.
    ///
    /// Returns whether the controller ended idle, plus every event drained meanwhile.
    /// Blocks; meant for headless drivers and tests, not for a UI event loop.
    pub fn wait_until_idle(&mut self, timeout: Duration) -> (bool, Vec<TaskEvent>) {
        let start = Instant::now();
        let mut events = Vec::new();
        loop {
            events.extend(self.pump());
            if !self.is_busy() {
                return (true, events);
            }
            if start.elapsed() >= timeout {
                return (false, events);
            }
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    /// Close the worker's queue and join it within the configured timeout.
    ///
    /// There is no cancellation: a task already running is allowed to finish.
    pub fn shutdown(&mut self) {
        if self.dispatch.take().is_none() && self.worker.is_none() {
            return;
        }
        tracing::info!("Shutting down task worker");

        let Some(handle) = self.worker.take() else {
            return;
        };
        let start = Instant::now();
        while !handle.is_finished() && start.elapsed() < self.shutdown_timeout {
            std::thread::sleep(Duration::from_millis(5));
        }
        if handle.is_finished() {
            if handle.join().is_err() {
                tracing::error!("Task worker thread panicked");
            }
        } else {
            tracing::warn!(
                "Task worker still busy after {:?}, detaching",
                self.shutdown_timeout
            );
        }
        self.pump();
    }

    fn observe(&mut self, event: &TaskEvent) {
        let TaskEvent::Finished(outcome) = event else {
            return;
        };
        match self.in_flight {
            Some(current) if current.id == outcome.id => {
                self.in_flight = None;
                self.metrics
                    .record_task_finished(outcome.success, current.since.elapsed());
                tracing::debug!(
                    "Task {} ({}) finished, success={}",
                    outcome.id,
                    outcome.kind,
                    outcome.success
                );
            }
            _ => tracing::warn!(
                "Ignoring finished signal for task {} that is not in flight",
                outcome.id
            ),
        }
    }

    fn publish_log(&self, level: LogLevel, message: impl Into<String>) {
        let entry = LogEntry::new(level, message);
        entry.trace();
        self.forward(TaskEvent::Log(entry));
    }

    fn forward(&self, event: TaskEvent) {
        // send only fails with zero receivers; a lagging receiver sees RecvError::Lagged itself
        if self.broadcast_tx.send(event).is_err() {
            self.metrics.record_event_unobserved();
        }
    }
}

impl Drop for TaskController {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DownsampleParams, ReconstructionMethod};
    use crate::task::TaskOutcome;
    use std::sync::atomic::Ordering;

    fn import() -> Operation {
        Operation::Import {
            path: "a.xyz".into(),
        }
    }

    fn reconstruct() -> Operation {
        Operation::Reconstruct {
            method: ReconstructionMethod::default(),
        }
    }

    #[test]
    fn test_rejected_submit_never_dispatches() {
        let mut dispatch = MockTaskDispatch::new();
        dispatch.expect_dispatch().times(1).returning(|envelope| {
            assert_eq!(envelope.kind(), OperationKind::Import);
            Ok(())
        });
        let (_event_tx, event_rx) = mpsc::unbounded_channel();
        let metrics = Arc::new(Metrics::new());
        let mut controller = TaskController::with_dispatch(
            Box::new(dispatch),
            event_rx,
            &TaskConfig::default(),
            metrics.clone(),
        );

        let id = controller.submit(import()).unwrap();
        let err = controller.submit(reconstruct()).unwrap_err();

        assert!(matches!(
            err,
            SubmitError::Busy {
                running: OperationKind::Import,
                ..
            }
        ));
        assert_eq!(err.into_operation(), Some(reconstruct()));
        assert_eq!(controller.current_task(), Some((id, OperationKind::Import)));
        assert_eq!(metrics.tasks_rejected.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.tasks_accepted.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_finished_clears_flag() {
        let (task_tx, mut task_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let mut controller = TaskController::with_dispatch(
            Box::new(ChannelDispatch(task_tx)),
            event_rx,
            &TaskConfig::default(),
            Arc::new(Metrics::new()),
        );

        let id = controller.submit(import()).unwrap();
        assert!(controller.is_busy());

        let envelope = task_rx.try_recv().unwrap();
        let kind = envelope.kind();
        drop(envelope);
        event_tx
            .send(TaskEvent::Finished(TaskOutcome {
                id,
                kind,
                success: true,
            }))
            .unwrap();

        // not cleared until pumped
        assert!(controller.is_busy());
        let events = controller.pump();
        assert_eq!(events.len(), 1);
        assert!(!controller.is_busy());
        assert!(controller.submit(reconstruct()).is_ok());
    }

    #[test]
    fn test_stale_finished_is_ignored() {
        let (task_tx, _task_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let mut controller = TaskController::with_dispatch(
            Box::new(ChannelDispatch(task_tx)),
            event_rx,
            &TaskConfig::default(),
            Arc::new(Metrics::new()),
        );

        controller.submit(import()).unwrap();
        event_tx
            .send(TaskEvent::Finished(TaskOutcome {
                id: TaskId::next(),
                kind: OperationKind::Import,
                success: true,
            }))
            .unwrap();
        controller.pump();
        assert!(controller.is_busy());
    }

    #[test]
    fn test_dead_worker_reports_unavailable() {
        let (task_tx, task_rx) = mpsc::unbounded_channel();
        drop(task_rx);
        let (_event_tx, event_rx) = mpsc::unbounded_channel();
        let metrics = Arc::new(Metrics::new());
        let mut controller = TaskController::with_dispatch(
            Box::new(ChannelDispatch(task_tx)),
            event_rx,
            &TaskConfig::default(),
            metrics.clone(),
        );

        let err = controller
            .submit(Operation::Downsample(DownsampleParams { cell_size: 1.0 }))
            .unwrap_err();
        assert!(matches!(err, SubmitError::WorkerUnavailable));
        assert!(!controller.is_busy());
        // the undeliverable envelope was still released
        assert_eq!(metrics.params_released.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_disconnect_mid_task_clears_flag() {
        let (task_tx, _task_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let mut controller = TaskController::with_dispatch(
            Box::new(ChannelDispatch(task_tx)),
            event_rx,
            &TaskConfig::default(),
            Arc::new(Metrics::new()),
        );

        controller.submit(import()).unwrap();
        drop(event_tx);
        let events = controller.pump();
        assert!(!controller.is_busy());
        assert!(matches!(
            &events[..],
            [TaskEvent::Log(LogEntry {
                level: LogLevel::Error,
                ..
            })]
        ));
    }

    #[tokio::test]
    async fn test_rejection_is_broadcast() {
        let mut dispatch = MockTaskDispatch::new();
        dispatch.expect_dispatch().returning(|_| Ok(()));
        let (_event_tx, event_rx) = mpsc::unbounded_channel();
        let mut controller = TaskController::with_dispatch(
            Box::new(dispatch),
            event_rx,
            &TaskConfig::default(),
            Arc::new(Metrics::new()),
        );
        let mut rx = controller.subscribe();

        controller.submit(import()).unwrap();
        let _ = controller.submit(reconstruct());

        let event = tokio::time::timeout(Duration::from_millis(100), rx.recv())
            .await
            .expect("Timeout waiting for event")
            .expect("Channel closed");
        match event {
            TaskEvent::Log(entry) => {
                assert_eq!(entry.level, LogLevel::Warn);
                assert!(entry.message.starts_with("Busy:"), "{}", entry.message);
            }
            other => panic!("Expected busy log, got: {:?}", other),
        }
    }

    #[test]
    fn test_unsubscribed_events_are_counted_as_unobserved() {
        let mut dispatch = MockTaskDispatch::new();
        dispatch.expect_dispatch().returning(|_| Ok(()));
        let (_event_tx, event_rx) = mpsc::unbounded_channel();
        let metrics = Arc::new(Metrics::new());
        let mut controller = TaskController::with_dispatch(
            Box::new(dispatch),
            event_rx,
            &TaskConfig::default(),
            metrics.clone(),
        );

        controller.submit(import()).unwrap();
        let _ = controller.submit(reconstruct());
        let unobserved = metrics.events_unobserved.load(Ordering::Relaxed);
        assert!(unobserved >= 1);

        let mut rx = controller.subscribe();
        let _ = controller.submit(reconstruct());
        assert!(rx.try_recv().is_ok());
        assert_eq!(metrics.events_unobserved.load(Ordering::Relaxed), unobserved);
    }
}
