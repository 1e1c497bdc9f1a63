use super::{
    Camera, CameraInput, FrameParams, GpuContext, GpuProvider, PixelSize, RenderCommand,
    RenderError, RenderState, RenderStatus, RenderTarget, TexturePublisher,
};
use crate::metrics::Metrics;
use crate::models::{MeshSnapshot, PointCloudSnapshot, RenderConfig, RenderSettings};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;

type TargetOf<P> = <<P as GpuProvider>::Context as GpuContext>::Target;

/// UI-side handle to the render thread.
///
/// Dropping the handle shuts the thread down with the configured bounded join.
pub struct RenderWorkerHandle {
    commands: mpsc::UnboundedSender<RenderCommand>,
    status: watch::Receiver<RenderStatus>,
    thread: Option<JoinHandle<()>>,
    shutdown_timeout: Duration,
}

impl RenderWorkerHandle {
    /// Start the render thread. It initializes its GPU resources right away and waits in
    /// `Ready` for a [`RenderCommand::Start`].
    pub fn spawn<P: GpuProvider>(
        provider: P,
        publisher: TexturePublisher,
        initial_size: PixelSize,
        config: &RenderConfig,
        metrics: Arc<Metrics>,
    ) -> Result<Self, RenderError> {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(RenderStatus::default());
        let frame_interval = config.frame_interval();
        let settings = config.settings.sanitized();
        let background = config.background;

        let thread = std::thread::Builder::new()
            .name("pointmesh-render".to_string())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_time()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(e) => {
                        tracing::error!("Failed to build render runtime: {}", e);
                        status_tx.send_modify(|status| {
                            status.state = RenderState::Failed;
                            status.last_error = Some(e.to_string());
                        });
                        return;
                    }
                };
                let render_loop = RenderLoop {
                    provider,
                    surface: None,
                    context: None,
                    pipeline_built: false,
                    framebuffers: None,
                    write_index: 0,
                    publisher,
                    size: initial_size,
                    camera: Camera::default(),
                    pending_camera: Vec::new(),
                    settings,
                    background,
                    point_cloud: None,
                    points_dirty: false,
                    mesh: None,
                    mesh_dirty: false,
                    state: RenderState::Uninitialized,
                    status: status_tx,
                    metrics,
                };
                runtime.block_on(render_loop.run(command_rx, frame_interval));
                tracing::debug!("Render thread exiting");
            })?;

        Ok(Self {
            commands: command_tx,
            status: status_rx,
            thread: Some(thread),
            shutdown_timeout: config.shutdown_timeout(),
        })
    }

    pub fn sender(&self) -> mpsc::UnboundedSender<RenderCommand> {
        self.commands.clone()
    }

    /// Queue a command. Returns `false` once the render thread is gone.
    pub fn send(&self, command: RenderCommand) -> bool {
        self.commands.send(command).is_ok()
    }

    pub fn status(&self) -> RenderStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<RenderStatus> {
        self.status.clone()
    }

    /// Poll the status until `predicate` holds or `timeout` passes. Blocks the caller.
    pub fn wait_for(
        &self,
        predicate: impl Fn(&RenderStatus) -> bool,
        timeout: Duration,
    ) -> Option<RenderStatus> {
        let start = Instant::now();
        loop {
            let status = self.status();
            if predicate(&status) {
                return Some(status);
            }
            if start.elapsed() >= timeout {
                return None;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    /// Ask the render thread to release its resources, then join it within the
    /// configured timeout. Returns whether the thread was joined.
    pub fn shutdown(&mut self) -> bool {
        let Some(handle) = self.thread.take() else {
            return true;
        };
        tracing::info!("Shutting down render worker");
        let _ = self.commands.send(RenderCommand::Shutdown);

        let start = Instant::now();
        while !handle.is_finished() && start.elapsed() < self.shutdown_timeout {
            std::thread::sleep(Duration::from_millis(2));
        }
        if !handle.is_finished() {
            tracing::warn!(
                "Render worker did not stop within {:?}, detaching",
                self.shutdown_timeout
            );
            return false;
        }
        if handle.join().is_err() {
            tracing::error!("Render thread panicked");
        }
        true
    }
}

impl Drop for RenderWorkerHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// State owned by the render thread.
struct RenderLoop<P: GpuProvider> {
    provider: P,
    surface: Option<P::Surface>,
    context: Option<P::Context>,
    pipeline_built: bool,
    framebuffers: Option<[TargetOf<P>; 2]>,
    /// Index of the framebuffer the next tick draws into. The other one is the one
    /// currently published (once a frame exists).
    write_index: usize,
    publisher: TexturePublisher,
    size: PixelSize,
    camera: Camera,
    pending_camera: Vec<CameraInput>,
    settings: RenderSettings,
    background: [f32; 3],
    point_cloud: Option<Arc<PointCloudSnapshot>>,
    points_dirty: bool,
    mesh: Option<Arc<MeshSnapshot>>,
    mesh_dirty: bool,
    state: RenderState,
    status: watch::Sender<RenderStatus>,
    metrics: Arc<Metrics>,
}

impl<P: GpuProvider> RenderLoop<P> {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<RenderCommand>,
        frame_interval: Duration,
    ) {
        self.initialize();

        let mut ticker = tokio::time::interval(frame_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;

                command = commands.recv() => match command {
                    Some(RenderCommand::Shutdown) | None => break,
                    Some(command) => {
                        let was_rendering = self.state == RenderState::Rendering;
                        self.handle(command);
                        if !was_rendering && self.state == RenderState::Rendering {
                            ticker.reset();
                        }
                    }
                },
                _ = ticker.tick(), if self.state == RenderState::Rendering => {
                    self.tick();
                }
            }
        }

        self.shutdown();
    }

    fn set_state(&mut self, state: RenderState) {
        if self.state == state {
            return;
        }
        tracing::debug!("Render state {:?} -> {:?}", self.state, state);
        self.state = state;
        self.status.send_modify(|status| status.state = state);
    }

    fn fail(&mut self, error: RenderError) {
        tracing::error!("Rendering disabled: {}", error);
        self.release_resources();
        self.state = RenderState::Failed;
        let message = error.to_string();
        self.status.send_modify(|status| {
            status.state = RenderState::Failed;
            status.framebuffer_size = None;
            status.last_error = Some(message);
        });
    }

    fn initialize(&mut self) {
        self.set_state(RenderState::Initializing);
        match self.try_initialize() {
            Ok(()) => {
                let size = self.size;
                self.status
                    .send_modify(|status| status.framebuffer_size = Some(size));
                self.set_state(RenderState::Ready);
                tracing::info!("Render worker ready at {}", size);
            }
            Err(e) => self.fail(e),
        }
    }

    fn try_initialize(&mut self) -> Result<(), RenderError> {
        let surface = self.provider.create_surface()?;
        let context = self.provider.create_shared_context(&surface)?;
        self.surface = Some(surface);
        let context = self.context.insert(context);

        context.make_current()?;
        context.build_pipeline()?;
        self.pipeline_built = true;
        let front = context.create_framebuffer(self.size)?;
        let back = match context.create_framebuffer(self.size) {
            Ok(back) => back,
            Err(e) => {
                context.release_framebuffer(front);
                return Err(e);
            }
        };
        context.done_current();

        self.framebuffers = Some([front, back]);
        self.write_index = 0;
        Ok(())
    }

    fn handle(&mut self, command: RenderCommand) {
        match command {
            RenderCommand::Start => match self.state {
                RenderState::Ready => {
                    self.set_state(RenderState::Rendering);
                    tracing::info!("Render loop started");
                }
                RenderState::Rendering => {}
                other => tracing::debug!("Ignoring start while {:?}", other),
            },
            RenderCommand::Stop => {
                if self.state == RenderState::Rendering {
                    self.set_state(RenderState::Ready);
                    tracing::info!("Render loop stopped");
                }
            }
            RenderCommand::Resize(size) => self.resize(size),
            RenderCommand::SetPointCloud(cloud) => {
                self.point_cloud = cloud;
                self.points_dirty = true;
            }
            RenderCommand::SetMesh(mesh) => {
                self.mesh = mesh;
                self.mesh_dirty = true;
            }
            RenderCommand::SetSettings(settings) => self.settings = settings.sanitized(),
            RenderCommand::SetBackground(color) => self.background = color,
            RenderCommand::Camera(input) => {
                if self.state == RenderState::Rendering {
                    self.pending_camera.push(input);
                } else {
                    self.camera.apply(input, self.settings.camera_speed);
                }
            }
            // handled by the run loop
            RenderCommand::Shutdown => {}
        }
    }

    fn resize(&mut self, size: PixelSize) {
        if size.is_empty() || size == self.size {
            return;
        }
        tracing::debug!("Resizing framebuffers {} -> {}", self.size, size);
        self.size = size;

        let Some(old) = self.framebuffers.take() else {
            return;
        };
        // the published texture is about to be released
        self.publisher.clear();

        let Some(context) = self.context.as_mut() else {
            return;
        };
        let result = reallocate(context, old, size);
        match result {
            Ok(framebuffers) => {
                self.framebuffers = Some(framebuffers);
                self.write_index = 0;
                self.metrics.record_resize();
                self.status
                    .send_modify(|status| status.framebuffer_size = Some(size));
            }
            Err(e) => self.fail(e),
        }
    }

    fn tick(&mut self) {
        for input in self.pending_camera.drain(..) {
            self.camera.apply(input, self.settings.camera_speed);
        }

        let (Some(context), Some(framebuffers)) =
            (self.context.as_mut(), self.framebuffers.as_ref())
        else {
            return;
        };

        if let Err(e) = context.make_current() {
            tracing::warn!("Skipping frame: {}", e);
            return;
        }

        if self.points_dirty {
            self.points_dirty = false;
            if let Err(e) = context.upload_points(self.point_cloud.as_deref()) {
                tracing::warn!("{}", e);
            }
        }
        if self.mesh_dirty {
            self.mesh_dirty = false;
            if let Err(e) = context.upload_mesh(self.mesh.as_deref()) {
                tracing::warn!("{}", e);
            }
        }

        let target = &framebuffers[self.write_index];
        let size = target.size();
        let frame = FrameParams {
            view: self.camera.view_matrix(),
            projection: self.camera.projection_matrix(size.aspect()),
            camera_position: self.camera.position(),
            settings: self.settings,
            background: self.background,
            size,
        };

        let drawn = match context.bind_framebuffer(target) {
            Ok(()) => {
                let result = context.draw(&frame);
                context.unbind_framebuffer(target);
                result
            }
            Err(e) => Err(e),
        };
        context.done_current();

        match drawn {
            Ok(()) => {
                self.publisher.publish(target.color_texture());
                self.write_index ^= 1;
                self.metrics.record_frame();
                self.status.send_modify(|status| status.frames += 1);
            }
            Err(e) => tracing::warn!("Frame dropped: {}", e),
        }
    }

    /// Release GPU objects in dependency order. Safe to call with nothing allocated.
    fn release_resources(&mut self) {
        self.publisher.clear();
        if let Some(mut context) = self.context.take() {
            if let Err(e) = context.make_current() {
                tracing::warn!("Releasing GPU objects without a current context: {}", e);
            }
            if let Some([front, back]) = self.framebuffers.take() {
                context.release_framebuffer(front);
                context.release_framebuffer(back);
            }
            if self.pipeline_built {
                context.release_pipeline();
                self.pipeline_built = false;
            }
            context.done_current();
        }
        self.framebuffers = None;
        self.surface = None;
    }

    fn shutdown(&mut self) {
        self.set_state(RenderState::ShuttingDown);
        self.pending_camera.clear();
        self.release_resources();
        self.point_cloud = None;
        self.mesh = None;
        self.status.send_modify(|status| status.framebuffer_size = None);
        self.set_state(RenderState::Destroyed);
        tracing::info!("Render worker destroyed");
    }
}

fn reallocate<C: GpuContext>(
    context: &mut C,
    old: [C::Target; 2],
    size: PixelSize,
) -> Result<[C::Target; 2], RenderError> {
    let current = context.make_current();
    let [front, back] = old;
    context.release_framebuffer(front);
    context.release_framebuffer(back);
    current?;

    let result = context.create_framebuffer(size).and_then(|front| {
        match context.create_framebuffer(size) {
            Ok(back) => Ok([front, back]),
            Err(e) => {
                context.release_framebuffer(front);
                Err(e)
            }
        }
    });
    context.done_current();
    result
}
