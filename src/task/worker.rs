use super::{
    LogEntry, LogLevel, TaskEnvelope, TaskError, TaskEvent, TaskId, TaskOutcome,
    mesh_snapshot, point_cloud_snapshot,
};
use crate::geometry::GeometryProcessor;
use crate::models::{NormalMethod, Operation, OperationKind};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tokio::sync::mpsc;

/// Start the task worker thread.
///
/// The worker owns `processor` and runs one envelope at a time until the envelope
/// sender is dropped. `normal_fallback` is the estimation used when a reconstruction
/// needs normals the cloud does not have.
pub fn spawn_worker(
    processor: Box<dyn GeometryProcessor>,
    normal_fallback: NormalMethod,
) -> Result<
    (
        mpsc::UnboundedSender<TaskEnvelope>,
        mpsc::UnboundedReceiver<TaskEvent>,
        JoinHandle<()>,
    ),
    TaskError,
> {
    let (task_tx, task_rx) = mpsc::unbounded_channel();
    let (event_tx, event_rx) = mpsc::unbounded_channel();

    let handle = thread::Builder::new()
        .name("pointmesh-task".to_string())
        .spawn(move || worker_loop(processor, task_rx, event_tx, normal_fallback))?;

    tracing::info!("Task worker started");
    Ok((task_tx, event_rx, handle))
}

fn worker_loop(
    mut processor: Box<dyn GeometryProcessor>,
    mut tasks: mpsc::UnboundedReceiver<TaskEnvelope>,
    events: mpsc::UnboundedSender<TaskEvent>,
    normal_fallback: NormalMethod,
) {
    while let Some(envelope) = tasks.blocking_recv() {
        let mut scope = TaskScope::begin(envelope, events.clone());
        let emitter = Emitter { events: &events };

        let result = panic::catch_unwind(AssertUnwindSafe(|| match scope.operation() {
            Some(operation) => execute(processor.as_mut(), operation, &emitter, normal_fallback),
            None => false,
        }));

        match result {
            Ok(success) => scope.success = success,
            Err(payload) => {
                let reason = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                emitter.log(
                    LogLevel::Error,
                    format!("{} aborted: {}", scope.kind, reason),
                );
            }
        }
        // releases the parameters, then signals completion
        drop(scope);
    }
    tracing::info!("Task worker stopped");
}

/// Scope guard for one running task.
///
/// Holds the envelope while the operation runs. Dropping it, on any path including
/// unwinding, first drops the envelope and then sends exactly one `Finished`.
struct TaskScope {
    envelope: Option<TaskEnvelope>,
    id: TaskId,
    kind: OperationKind,
    success: bool,
    events: mpsc::UnboundedSender<TaskEvent>,
}

impl TaskScope {
    fn begin(envelope: TaskEnvelope, events: mpsc::UnboundedSender<TaskEvent>) -> Self {
        tracing::debug!("Task {} ({}) started", envelope.id(), envelope.kind());
        Self {
            id: envelope.id(),
            kind: envelope.kind(),
            envelope: Some(envelope),
            success: false,
            events,
        }
    }

    /// `None` only once the scope is being dropped.
    fn operation(&self) -> Option<&Operation> {
        self.envelope.as_ref().map(TaskEnvelope::operation)
    }
}

impl Drop for TaskScope {
    fn drop(&mut self) {
        drop(self.envelope.take());
        let outcome = TaskOutcome {
            id: self.id,
            kind: self.kind,
            success: self.success && !thread::panicking(),
        };
        tracing::debug!(
            "Task {} ({}) finished, success={}",
            outcome.id,
            outcome.kind,
            outcome.success
        );
        if self.events.send(TaskEvent::Finished(outcome)).is_err() {
            tracing::warn!("Task {} finished after the controller went away", self.id);
        }
    }
}

/// Sends log lines and snapshots upward.
struct Emitter<'a> {
    events: &'a mpsc::UnboundedSender<TaskEvent>,
}

impl Emitter<'_> {
    fn log(&self, level: LogLevel, message: impl Into<String>) {
        let entry = LogEntry::new(level, message);
        entry.trace();
        let _ = self.events.send(TaskEvent::Log(entry));
    }

    fn info(&self, message: impl Into<String>) {
        self.log(LogLevel::Info, message);
    }

    fn warn(&self, message: impl Into<String>) {
        self.log(LogLevel::Warn, message);
    }

    fn point_cloud(&self, processor: &dyn GeometryProcessor) {
        let snapshot = Arc::new(point_cloud_snapshot(processor.point_cloud()));
        let _ = self.events.send(TaskEvent::PointCloudReady(snapshot));
    }

    fn mesh(&self, processor: &dyn GeometryProcessor) {
        let snapshot = Arc::new(mesh_snapshot(processor.mesh()));
        let _ = self.events.send(TaskEvent::MeshReady(snapshot));
    }
}

/// Run one operation. Returns whether it succeeded; every failure has been logged.
fn execute(
    processor: &mut dyn GeometryProcessor,
    operation: &Operation,
    out: &Emitter<'_>,
    normal_fallback: NormalMethod,
) -> bool {
    if let Err(e) = operation.validate() {
        out.warn(format!("Invalid {} parameters: {}", operation.kind(), e));
        return false;
    }

    match operation {
        Operation::Import { path } => match processor.load_point_cloud(path) {
            Ok(()) => {
                out.info(format!("Loaded point cloud: {path}"));
                out.point_cloud(processor);
                true
            }
            Err(e) => {
                out.warn(format!("Failed to load point cloud: {path} ({e})"));
                false
            }
        },

        Operation::EstimateNormals { method } => {
            out.info("Estimating normals...");
            match processor.estimate_normals(*method) {
                Ok(()) => {
                    out.info(format!(
                        "Estimated {} normals for {} points.",
                        method.label(),
                        processor.point_cloud().len()
                    ));
                    out.point_cloud(processor);
                    true
                }
                Err(e) => {
                    out.warn(format!("Normal estimation failed: {e}"));
                    false
                }
            }
        }

        Operation::Reconstruct { method } => {
            if method.requires_normals() && !processor.has_normals() {
                out.info("Estimating normals...");
                if let Err(e) = processor.estimate_normals(normal_fallback) {
                    out.warn(format!("Normal estimation failed: {e}"));
                    return false;
                }
                out.point_cloud(processor);
            }

            out.info("Running surface reconstruction...");
            match processor.reconstruct(method) {
                Ok(()) => {
                    out.mesh(processor);
                    out.info("Reconstruction finished.");
                    true
                }
                Err(e) => {
                    out.warn(format!("Reconstruction failed: {e}"));
                    false
                }
            }
        }

        Operation::Downsample(params) => match processor.downsample(params) {
            Ok(()) => {
                out.info(format!(
                    "Downsampled point cloud to {} points.",
                    processor.point_cloud().len()
                ));
                out.point_cloud(processor);
                true
            }
            Err(e) => {
                out.warn(format!("Downsampling failed: {e}"));
                false
            }
        },

        Operation::FilterRegion(filter) => match processor.filter_region(filter) {
            Ok(()) => {
                out.info(format!(
                    "Filtered point cloud: {} points remain.",
                    processor.point_cloud().len()
                ));
                out.point_cloud(processor);
                true
            }
            Err(e) => {
                out.warn(format!("Region filter failed: {e}"));
                false
            }
        },

        Operation::PostProcessMesh(params) => match processor.post_process_mesh(params) {
            Ok(()) => {
                out.info(format!(
                    "Post-processed mesh: {} faces.",
                    processor.mesh().faces.len()
                ));
                out.mesh(processor);
                true
            }
            Err(e) => {
                out.warn(format!("Mesh post-processing failed: {e}"));
                false
            }
        },

        Operation::ExportMesh { path, with_normals } => {
            match processor.export_mesh(path, *with_normals) {
                Ok(()) => {
                    out.info(format!("Exported mesh to: {path}"));
                    true
                }
                Err(e) => {
                    out.warn(format!("Export failed: {path} ({e})"));
                    false
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{GeometryError, GeometryResult, PointCloud, TriangleMesh};
    use crate::metrics::Metrics;
    use crate::models::{DownsampleParams, PoissonParams, PostProcessParams, ReconstructionMethod, RegionFilter};
    use camino::Utf8Path;
    use glam::Vec3;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    /// Processor that records calls and can be told to fail or panic.
    #[derive(Default)]
    struct ScriptedProcessor {
        cloud: PointCloud,
        mesh: TriangleMesh,
        calls: Vec<&'static str>,
        fail_load: bool,
        panic_on_downsample: bool,
    }

    impl GeometryProcessor for ScriptedProcessor {
        fn load_point_cloud(&mut self, _path: &Utf8Path) -> GeometryResult<()> {
            self.calls.push("load");
            if self.fail_load {
                return Err(GeometryError::EmptyPointCloud);
            }
            self.cloud = PointCloud::new(vec![Vec3::ZERO, Vec3::X, Vec3::Y]);
            Ok(())
        }

        fn estimate_normals(&mut self, _method: NormalMethod) -> GeometryResult<()> {
            self.calls.push("normals");
            self.cloud.normals = vec![Vec3::Z; self.cloud.len()];
            Ok(())
        }

        fn reconstruct(&mut self, _method: &ReconstructionMethod) -> GeometryResult<()> {
            self.calls.push("reconstruct");
            self.mesh = TriangleMesh {
                vertices: self.cloud.points.clone(),
                normals: Vec::new(),
                faces: vec![vec![0, 1, 2]],
            };
            Ok(())
        }

        fn downsample(&mut self, _params: &DownsampleParams) -> GeometryResult<()> {
            self.calls.push("downsample");
            if self.panic_on_downsample {
                panic!("grid exploded");
            }
            Ok(())
        }

        fn filter_region(&mut self, _filter: &RegionFilter) -> GeometryResult<()> {
            self.calls.push("filter");
            Ok(())
        }

        fn post_process_mesh(&mut self, _params: &PostProcessParams) -> GeometryResult<()> {
            self.calls.push("post");
            Ok(())
        }

        fn export_mesh(&mut self, _path: &Utf8Path, _with_normals: bool) -> GeometryResult<()> {
            self.calls.push("export");
            Err(GeometryError::EmptyMesh)
        }

        fn point_cloud(&self) -> &PointCloud {
            &self.cloud
        }

        fn mesh(&self) -> &TriangleMesh {
            &self.mesh
        }
    }

    fn run_one(processor: &mut ScriptedProcessor, operation: Operation) -> (bool, Vec<TaskEvent>) {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let success = execute(processor, &operation, &Emitter { events: &tx }, NormalMethod::Centroid);
        drop(tx);
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        (success, events)
    }

    fn log_messages(events: &[TaskEvent]) -> Vec<String> {
        events
            .iter()
            .filter_map(|e| match e {
                TaskEvent::Log(entry) => Some(entry.message.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_import_emits_snapshot_and_log() {
        let mut processor = ScriptedProcessor::default();
        let (success, events) = run_one(
            &mut processor,
            Operation::Import {
                path: "scan.xyz".into(),
            },
        );

        assert!(success);
        assert!(log_messages(&events).contains(&"Loaded point cloud: scan.xyz".to_string()));
        let snapshot = events.iter().find_map(|e| match e {
            TaskEvent::PointCloudReady(s) => Some(s.clone()),
            _ => None,
        });
        assert_eq!(snapshot.map(|s| s.len()), Some(3));
    }

    #[test]
    fn test_failed_import_logs_only() {
        let mut processor = ScriptedProcessor {
            fail_load: true,
            ..Default::default()
        };
        let (success, events) = run_one(
            &mut processor,
            Operation::Import {
                path: "scan.xyz".into(),
            },
        );

        assert!(!success);
        assert!(events.iter().all(|e| matches!(e, TaskEvent::Log(_))));
        assert!(log_messages(&events)[0].starts_with("Failed to load point cloud: scan.xyz"));
    }

    #[test]
    fn test_reconstruct_estimates_missing_normals_first() {
        let mut processor = ScriptedProcessor::default();
        processor.cloud = PointCloud::new(vec![Vec3::ZERO, Vec3::X, Vec3::Y]);

        let (success, events) = run_one(
            &mut processor,
            Operation::Reconstruct {
                method: ReconstructionMethod::Poisson(PoissonParams::default()),
            },
        );

        assert!(success);
        assert_eq!(processor.calls, vec!["normals", "reconstruct"]);
        assert_eq!(
            log_messages(&events),
            vec![
                "Estimating normals...",
                "Running surface reconstruction...",
                "Reconstruction finished."
            ]
        );
        assert!(events.iter().any(|e| matches!(e, TaskEvent::MeshReady(_))));
    }

    #[test]
    fn test_invalid_parameters_never_reach_processor() {
        let mut processor = ScriptedProcessor::default();
        let (success, events) = run_one(
            &mut processor,
            Operation::Downsample(DownsampleParams { cell_size: -1.0 }),
        );

        assert!(!success);
        assert!(processor.calls.is_empty());
        assert_eq!(log_messages(&events).len(), 1);
    }

    #[test]
    fn test_export_failure_message() {
        let mut processor = ScriptedProcessor::default();
        let (success, events) = run_one(
            &mut processor,
            Operation::ExportMesh {
                path: "out.obj".into(),
                with_normals: false,
            },
        );

        assert!(!success);
        assert_eq!(
            log_messages(&events),
            vec!["Export failed: out.obj (mesh is empty)"]
        );
    }

    #[test]
    fn test_panic_still_finishes_and_releases() {
        let processor = ScriptedProcessor {
            panic_on_downsample: true,
            ..Default::default()
        };
        let metrics = Arc::new(Metrics::new());
        let (tx, mut rx, handle) =
            spawn_worker(Box::new(processor), NormalMethod::Centroid).unwrap();

        let envelope = TaskEnvelope::new(
            Operation::Downsample(DownsampleParams { cell_size: 1.0 }),
            metrics.clone(),
        );
        let id = envelope.id();
        tx.send(envelope).unwrap();
        drop(tx);
        handle.join().unwrap();

        let mut finished = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let TaskEvent::Finished(outcome) = event {
                finished.push(outcome);
            }
        }
        assert_eq!(finished.len(), 1);
        assert_eq!(finished[0].id, id);
        assert!(!finished[0].success);
        assert_eq!(metrics.params_released.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_worker_stops_when_sender_dropped() {
        let (tx, _rx, handle) =
            spawn_worker(Box::new(ScriptedProcessor::default()), NormalMethod::Centroid).unwrap();
        drop(tx);
        let start = std::time::Instant::now();
        while !handle.is_finished() && start.elapsed() < Duration::from_secs(1) {
            std::thread::sleep(Duration::from_millis(1));
        }
        assert!(handle.is_finished());
    }
}
