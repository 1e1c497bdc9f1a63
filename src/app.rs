//! Session wiring for both pipelines.
//!
//! A [`Session`] is what a UI shell (or the headless driver) holds on its main thread. It
//! owns the [`TaskController`] and, when rendering is enabled, the [`RenderView`] plus
//! the render worker's handle. Snapshots produced by the task side are relayed to the
//! render side during [`Session::pump`]; the two pipelines share nothing else.

use crate::geometry::GeometryProcessor;
use crate::metrics::Metrics;
use crate::models::{AppConfig, Operation};
use crate::render::{
    GpuProvider, PixelSize, RenderError, RenderStatus, RenderView, RenderWorkerHandle,
    texture_slot,
};
use crate::task::{SubmitError, TaskController, TaskError, TaskEvent, TaskId};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::broadcast;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Task(#[from] TaskError),

    #[error(transparent)]
    Render(#[from] RenderError),
}

struct RenderSide {
    view: RenderView,
    worker: RenderWorkerHandle,
}

pub struct Session {
    tasks: TaskController,
    render: Option<RenderSide>,
    metrics: Arc<Metrics>,
    closed: bool,
}

impl Session {
    /// Task pipeline only, for headless use.
    pub fn headless(
        processor: Box<dyn GeometryProcessor>,
        config: &AppConfig,
    ) -> Result<Self, SessionError> {
        let metrics = Arc::new(Metrics::new());
        let tasks = TaskController::spawn(processor, &config.task, metrics.clone())?;
        Ok(Self {
            tasks,
            render: None,
            metrics,
            closed: false,
        })
    }

    /// Both pipelines. `initial_size` is the viewport in physical pixels.
    ///
    /// Only a failure to start the threads is reported here; GPU initialization failures
    /// show up later as [`RenderState::Failed`](crate::render::RenderState::Failed) while
    /// the task pipeline keeps working.
    pub fn with_renderer<P: GpuProvider>(
        processor: Box<dyn GeometryProcessor>,
        provider: P,
        initial_size: PixelSize,
        config: &AppConfig,
    ) -> Result<Self, SessionError> {
        let mut session = Self::headless(processor, config)?;
        let (publisher, reader) = texture_slot();
        let worker = RenderWorkerHandle::spawn(
            provider,
            publisher,
            initial_size,
            &config.render,
            session.metrics.clone(),
        )?;
        let view = RenderView::new(worker.sender(), reader, &config.render);
        session.render = Some(RenderSide { view, worker });
        Ok(session)
    }

    pub fn submit(&mut self, operation: Operation) -> Result<TaskId, SubmitError> {
        self.tasks.submit(operation)
    }

    pub fn is_busy(&self) -> bool {
        self.tasks.is_busy()
    }

    pub fn tasks(&self) -> &TaskController {
        &self.tasks
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.tasks.subscribe()
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    pub fn view(&self) -> Option<&RenderView> {
        self.render.as_ref().map(|side| &side.view)
    }

    pub fn view_mut(&mut self) -> Option<&mut RenderView> {
        self.render.as_mut().map(|side| &mut side.view)
    }

    pub fn render_status(&self) -> Option<RenderStatus> {
        self.render.as_ref().map(|side| side.worker.status())
    }

    /// Drain task events, relaying new snapshots to the render view.
    pub fn pump(&mut self) -> Vec<TaskEvent> {
        let events = self.tasks.pump();
        self.relay(&events);
        events
    }

    /// Pump until the task pipeline is idle or `timeout` passes. Blocks.
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

    fn relay(&mut self, events: &[TaskEvent]) {
        let Some(side) = self.render.as_mut() else {
            return;
        };
        for event in events {
            match event {
                TaskEvent::PointCloudReady(cloud) => side.view.set_point_cloud(Some(cloud.clone())),
                TaskEvent::MeshReady(mesh) => side.view.set_mesh(Some(mesh.clone())),
                TaskEvent::Log(_) | TaskEvent::Finished(_) => {}
            }
        }
    }

    /// Stop the render worker, then the task worker, each with a bounded join.
    pub fn shutdown(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Some(mut side) = self.render.take() {
            side.view.stop();
            side.worker.shutdown();
        }
        self.tasks.shutdown();
        self.metrics.log_summary();
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.shutdown();
    }
}
