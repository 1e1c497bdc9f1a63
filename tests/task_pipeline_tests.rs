//! Integration tests for the task pipeline
//!
//! These tests drive a real task worker thread through the TaskController and verify:
//! - The busy gate rejects overlapping submissions without touching the worker
//! - Every accepted operation releases its parameters exactly once, on every path
//! - Failures and panics inside the processor still produce a finished signal
//! - Snapshots and log lines reach broadcast subscribers

mod common;

use camino::Utf8Path;
use common::{GateProcessor, PanickyProcessor, sphere_points, sphere_reconstruction, write_xyz};
use pointmesh::geometry::ReferenceProcessor;
use pointmesh::metrics::Metrics;
use pointmesh::models::{
    DownsampleParams, Operation, OperationKind, PostProcessParams, RegionFilter, TaskConfig,
};
use pointmesh::task::{
    ChannelDispatch, LogLevel, SubmitError, TaskController, TaskEvent, TaskOutcome,
};
use proptest::prelude::*;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc;

const IDLE_TIMEOUT: Duration = Duration::from_secs(30);

fn finished(events: &[TaskEvent]) -> Vec<TaskOutcome> {
    events
        .iter()
        .filter_map(|event| match event {
            TaskEvent::Finished(outcome) => Some(*outcome),
            _ => None,
        })
        .collect()
}

fn log_messages(events: &[TaskEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|event| match event {
            TaskEvent::Log(entry) => Some(entry.message.clone()),
            _ => None,
        })
        .collect()
}

#[test]
fn test_reconstruct_rejected_while_import_in_flight() {
    let (processor, gate, calls) = GateProcessor::new();
    let metrics = Arc::new(Metrics::new());
    let mut controller =
        TaskController::spawn(Box::new(processor), &TaskConfig::default(), metrics.clone())
            .unwrap();
    let mut logs = controller.subscribe();

    controller
        .submit(Operation::Import {
            path: "scan_a.xyz".into(),
        })
        .unwrap();
    assert!(controller.is_busy());

    let err = controller
        .submit(Operation::Reconstruct {
            method: sphere_reconstruction(),
        })
        .unwrap_err();
    assert!(matches!(
        err,
        SubmitError::Busy {
            running: OperationKind::Import,
            ..
        }
    ));

    // the rejection is logged synchronously
    let entry = match logs.try_recv().unwrap() {
        TaskEvent::Log(entry) => entry,
        other => panic!("expected a log entry, got {:?}", other),
    };
    assert_eq!(entry.level, LogLevel::Warn);
    assert!(entry.message.starts_with("Busy:"), "{}", entry.message);
    assert!(controller.is_busy());

    gate.send(()).unwrap();
    let (idle, events) = controller.wait_until_idle(IDLE_TIMEOUT);
    assert!(idle);
    assert_eq!(finished(&events).len(), 1);
    assert!(finished(&events)[0].success);

    // only the import ever reached the processor
    assert_eq!(*calls.lock().unwrap(), vec!["load"]);

    controller
        .submit(Operation::Reconstruct {
            method: sphere_reconstruction(),
        })
        .unwrap();
    let (idle, events) = controller.wait_until_idle(IDLE_TIMEOUT);
    assert!(idle);
    assert!(finished(&events)[0].success);
    assert!(
        events
            .iter()
            .any(|event| matches!(event, TaskEvent::MeshReady(mesh) if !mesh.is_empty()))
    );
    assert_eq!(*calls.lock().unwrap(), vec!["load", "reconstruct"]);

    assert_eq!(metrics.tasks_rejected.load(Ordering::Relaxed), 1);
    assert_eq!(metrics.tasks_accepted.load(Ordering::Relaxed), 2);
}

#[test]
fn test_parameters_released_once_on_every_path() {
    let temp_dir = TempDir::new().unwrap();
    let dir = Utf8Path::from_path(temp_dir.path()).unwrap();
    let cloud_path = write_xyz(dir, "sphere.xyz", &sphere_points(2000, 1.0));

    let metrics = Arc::new(Metrics::new());
    let mut controller = TaskController::spawn(
        Box::new(ReferenceProcessor::new()),
        &TaskConfig::default(),
        metrics.clone(),
    )
    .unwrap();

    let operations = vec![
        // failures: missing file, empty cloud, rejected parameters
        (
            Operation::Import {
                path: dir.join("missing.xyz"),
            },
            false,
        ),
        (
            Operation::Downsample(DownsampleParams { cell_size: 0.1 }),
            false,
        ),
        (
            Operation::FilterRegion(RegionFilter::Sphere {
                center: [0.0; 3],
                radius: -1.0,
                keep_inside: true,
            }),
            false,
        ),
        // a full successful chain
        (Operation::Import { path: cloud_path }, true),
        (
            Operation::Downsample(DownsampleParams { cell_size: 0.02 }),
            true,
        ),
        (
            Operation::Reconstruct {
                method: sphere_reconstruction(),
            },
            true,
        ),
        (Operation::PostProcessMesh(PostProcessParams::default()), true),
        (
            Operation::ExportMesh {
                path: dir.join("sphere.ply"),
                with_normals: true,
            },
            true,
        ),
    ];
    let total = operations.len() as u64;

    for (operation, expected) in operations {
        let kind = operation.kind();
        controller.submit(operation).unwrap();
        let (idle, events) = controller.wait_until_idle(IDLE_TIMEOUT);
        assert!(idle, "{kind} did not finish");
        let outcomes = finished(&events);
        assert_eq!(outcomes.len(), 1, "{kind} finished {} times", outcomes.len());
        assert_eq!(outcomes[0].success, expected, "{kind}: {:?}", log_messages(&events));
    }

    assert!(dir.join("sphere.ply").exists());
    assert_eq!(metrics.tasks_accepted.load(Ordering::Relaxed), total);
    assert_eq!(metrics.tasks_finished(), total);
    assert_eq!(metrics.params_released.load(Ordering::Relaxed), total);
    assert_eq!(metrics.tasks_failed.load(Ordering::Relaxed), 3);
}

#[test]
fn test_panicking_operation_still_finishes() {
    let temp_dir = TempDir::new().unwrap();
    let dir = Utf8Path::from_path(temp_dir.path()).unwrap();
    let cloud_path = write_xyz(dir, "sphere.xyz", &sphere_points(500, 1.0));

    let metrics = Arc::new(Metrics::new());
    let mut controller = TaskController::spawn(
        Box::new(PanickyProcessor::default()),
        &TaskConfig::default(),
        metrics.clone(),
    )
    .unwrap();

    controller
        .submit(Operation::Downsample(DownsampleParams { cell_size: 0.1 }))
        .unwrap();
    let (idle, events) = controller.wait_until_idle(IDLE_TIMEOUT);
    assert!(idle);
    assert!(!finished(&events)[0].success);
    assert!(
        log_messages(&events)
            .iter()
            .any(|m| m.contains("voxel grid exploded"))
    );
    assert_eq!(metrics.params_released.load(Ordering::Relaxed), 1);

    // the worker survives and keeps serving
    controller
        .submit(Operation::Import { path: cloud_path })
        .unwrap();
    let (idle, events) = controller.wait_until_idle(IDLE_TIMEOUT);
    assert!(idle);
    assert!(finished(&events)[0].success);
    assert!(
        log_messages(&events)
            .iter()
            .any(|m| m.starts_with("Loaded point cloud:"))
    );
}

#[test]
fn test_subscribers_receive_snapshots() {
    let temp_dir = TempDir::new().unwrap();
    let dir = Utf8Path::from_path(temp_dir.path()).unwrap();
    let cloud_path = write_xyz(dir, "sphere.xyz", &sphere_points(300, 2.0));

    let mut controller = TaskController::spawn(
        Box::new(ReferenceProcessor::new()),
        &TaskConfig::default(),
        Arc::new(Metrics::new()),
    )
    .unwrap();
    let mut rx = controller.subscribe();

    controller
        .submit(Operation::Import { path: cloud_path })
        .unwrap();
    let (idle, _) = controller.wait_until_idle(IDLE_TIMEOUT);
    assert!(idle);

    let snapshot = tokio_test::block_on(async {
        loop {
            let event = tokio::time::timeout(Duration::from_millis(500), rx.recv())
                .await
                .expect("Timeout waiting for snapshot")
                .expect("Channel closed");
            if let TaskEvent::PointCloudReady(snapshot) = event {
                break snapshot;
            }
        }
    });
    assert_eq!(snapshot.len(), 300);
    let bounds = snapshot.bounds().unwrap();
    assert!((bounds.half_extent() - 2.0).abs() < 0.05);
}

#[derive(Debug, Clone)]
enum Step {
    Submit(u8),
    Complete(bool),
    Pump,
}

fn step() -> impl Strategy<Value = Step> {
    prop_oneof![
        (0u8..3).prop_map(Step::Submit),
        any::<bool>().prop_map(Step::Complete),
        Just(Step::Pump),
    ]
}

fn operation(which: u8) -> Operation {
    match which {
        0 => Operation::Import {
            path: "a.xyz".into(),
        },
        1 => Operation::Downsample(DownsampleParams { cell_size: 0.5 }),
        _ => Operation::Reconstruct {
            method: sphere_reconstruction(),
        },
    }
}

proptest! {
    /// The busy flag covers exactly [accept, finished observed) and a new acceptance only
    /// happens once every earlier envelope has been released.
    #[test]
    fn test_in_flight_intervals_never_overlap(steps in proptest::collection::vec(step(), 1..64)) {
        let (task_tx, mut task_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let metrics = Arc::new(Metrics::new());
        let mut controller = TaskController::with_dispatch(
            Box::new(ChannelDispatch(task_tx)),
            event_rx,
            &TaskConfig::default(),
            metrics.clone(),
        );
        let mut accepted = 0u64;
        let mut finished_pending = false;

        for step in steps {
            match step {
                Step::Submit(which) => {
                    let was_busy = controller.is_busy();
                    let released = metrics.params_released.load(Ordering::Relaxed);
                    let result = controller.submit(operation(which));
                    prop_assert_eq!(result.is_ok(), !was_busy);
                    if result.is_ok() {
                        prop_assert_eq!(released, accepted);
                        accepted += 1;
                    }
                    prop_assert!(controller.is_busy());
                }
                Step::Complete(success) => {
                    if let Ok(envelope) = task_rx.try_recv() {
                        let outcome = TaskOutcome {
                            id: envelope.id(),
                            kind: envelope.kind(),
                            success,
                        };
                        drop(envelope);
                        event_tx.send(TaskEvent::Finished(outcome)).unwrap();
                        finished_pending = true;
                    }
                }
                Step::Pump => {
                    let was_busy = controller.is_busy();
                    controller.pump();
                    if finished_pending {
                        prop_assert!(was_busy);
                        prop_assert!(!controller.is_busy());
                        finished_pending = false;
                    }
                }
            }
            let outstanding = accepted - metrics.params_released.load(Ordering::Relaxed);
            prop_assert!(outstanding <= 1);
        }
    }
}
