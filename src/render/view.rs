use super::{
    CameraInput, FramePresenter, MoveDirection, PixelSize, RenderCommand, TextureId,
    TextureReader,
};
use crate::models::{Bounds, MeshSnapshot, PointCloudSnapshot, RenderConfig, RenderSettings};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Angle delta of one notch on a typical mouse wheel.
const WHEEL_NOTCH: f64 = 120.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerButton {
    Left,
    Right,
    Middle,
}

/// Keys the view reacts to. Anything else is reported as unhandled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Character(char),
    ArrowUp,
    ArrowDown,
    ArrowLeft,
    ArrowRight,
    PageUp,
    PageDown,
}

impl Key {
    fn direction(self) -> Option<MoveDirection> {
        match self {
            Key::ArrowUp => Some(MoveDirection::Forward),
            Key::ArrowDown => Some(MoveDirection::Backward),
            Key::ArrowLeft => Some(MoveDirection::Left),
            Key::ArrowRight => Some(MoveDirection::Right),
            Key::PageUp => Some(MoveDirection::Up),
            Key::PageDown => Some(MoveDirection::Down),
            Key::Character(c) => match c.to_ascii_lowercase() {
                'w' => Some(MoveDirection::Forward),
                's' => Some(MoveDirection::Backward),
                'a' => Some(MoveDirection::Left),
                'd' => Some(MoveDirection::Right),
                'e' => Some(MoveDirection::Up),
                'q' => Some(MoveDirection::Down),
                _ => None,
            },
        }
    }
}

/// What a paint call did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PaintOutcome {
    /// The view has no usable size yet.
    Skipped,
    Cleared([f32; 3]),
    Blitted(TextureId),
}

#[derive(Debug, Clone, Copy)]
enum DragMode {
    Orbit,
    Pan,
}

#[derive(Debug, Clone, Copy)]
struct Drag {
    mode: DragMode,
    last: (f64, f64),
}

/// UI-thread façade over the render worker.
///
/// Never touches GPU objects: every change becomes a [`RenderCommand`], and painting only
/// samples the published texture handle. Send failures are ignored, since a render
/// worker that is gone simply leaves the view on its background colour.
pub struct RenderView {
    commands: mpsc::UnboundedSender<RenderCommand>,
    reader: TextureReader,
    background: [f32; 3],
    settings: RenderSettings,
    logical_size: (f64, f64),
    scale_factor: f64,
    point_bounds: Option<Bounds>,
    mesh_bounds: Option<Bounds>,
    drag: Option<Drag>,
}

impl RenderView {
    pub fn new(
        commands: mpsc::UnboundedSender<RenderCommand>,
        reader: TextureReader,
        config: &RenderConfig,
    ) -> Self {
        Self {
            commands,
            reader,
            background: config.background,
            settings: config.settings.sanitized(),
            logical_size: (0.0, 0.0),
            scale_factor: 1.0,
            point_bounds: None,
            mesh_bounds: None,
            drag: None,
        }
    }

    fn send(&self, command: RenderCommand) {
        let _ = self.commands.send(command);
    }

    pub fn start(&self) {
        self.send(RenderCommand::Start);
    }

    pub fn stop(&self) {
        self.send(RenderCommand::Stop);
    }

    /// Replace the displayed point cloud and refit the camera to everything shown.
    pub fn set_point_cloud(&mut self, cloud: Option<Arc<PointCloudSnapshot>>) {
        self.point_bounds = cloud.as_ref().and_then(|c| c.bounds());
        self.send(RenderCommand::SetPointCloud(cloud));
        self.refit();
    }

    pub fn set_mesh(&mut self, mesh: Option<Arc<MeshSnapshot>>) {
        self.mesh_bounds = mesh.as_ref().and_then(|m| m.bounds());
        self.send(RenderCommand::SetMesh(mesh));
        self.refit();
    }

    /// Bounds the camera is fitted to: the union of both snapshots, or the unit cube.
    pub fn data_bounds(&self) -> Bounds {
        match (self.point_bounds, self.mesh_bounds) {
            (Some(a), Some(b)) => a.union(b),
            (Some(a), None) | (None, Some(a)) => a,
            (None, None) => Bounds::default(),
        }
    }

    pub fn refit(&self) {
        self.send(RenderCommand::Camera(CameraInput::Fit(self.data_bounds())));
    }

    pub fn settings(&self) -> &RenderSettings {
        &self.settings
    }

    /// Edit the settings in place; the worker gets a sanitized copy if anything changed.
    pub fn update_settings(&mut self, edit: impl FnOnce(&mut RenderSettings)) {
        let mut next = self.settings;
        edit(&mut next);
        self.set_settings(next);
    }

    pub fn set_settings(&mut self, settings: RenderSettings) {
        let settings = settings.sanitized();
        if settings == self.settings {
            return;
        }
        self.settings = settings;
        self.send(RenderCommand::SetSettings(settings));
    }

    pub fn set_background(&mut self, color: [f32; 3]) {
        self.background = color;
        self.send(RenderCommand::SetBackground(color));
    }

    pub fn background(&self) -> [f32; 3] {
        self.background
    }

    /// Track a new logical size and display scale. Returns the new pixel size when the
    /// render worker was asked to reallocate; non-positive sizes are ignored.
    pub fn resize(&mut self, width: f64, height: f64, scale_factor: f64) -> Option<PixelSize> {
        let size = PixelSize::from_logical(width, height, scale_factor)?;
        let previous = self.pixel_size();
        self.logical_size = (width, height);
        self.scale_factor = scale_factor;
        if previous == Some(size) {
            return None;
        }
        self.send(RenderCommand::Resize(size));
        Some(size)
    }

    pub fn pixel_size(&self) -> Option<PixelSize> {
        PixelSize::from_logical(self.logical_size.0, self.logical_size.1, self.scale_factor)
    }

    pub fn pointer_pressed(&mut self, button: PointerButton, x: f64, y: f64) {
        let mode = match button {
            PointerButton::Left => DragMode::Orbit,
            PointerButton::Right | PointerButton::Middle => DragMode::Pan,
        };
        self.drag = Some(Drag { mode, last: (x, y) });
    }

    pub fn pointer_moved(&mut self, x: f64, y: f64) {
        let Some(drag) = self.drag.as_mut() else {
            return;
        };
        let (last_x, last_y) = std::mem::replace(&mut drag.last, (x, y));
        let mode = drag.mode;

        let (width, height) = self.logical_size;
        if width <= 0.0 || height <= 0.0 {
            return;
        }
        let dx = ((x - last_x) / width) as f32;
        let dy = ((y - last_y) / height) as f32;
        let input = match mode {
            DragMode::Orbit => CameraInput::Orbit { dx, dy: -dy },
            DragMode::Pan => CameraInput::Pan { dx, dy },
        };
        self.send(RenderCommand::Camera(input));
    }

    pub fn pointer_released(&mut self, _button: PointerButton) {
        self.drag = None;
    }

    /// Zoom by a raw wheel angle delta; positive zooms in.
    pub fn wheel(&self, angle_delta: f64) {
        let steps = (angle_delta / WHEEL_NOTCH) as f32;
        if steps != 0.0 && steps.is_finite() {
            self.send(RenderCommand::Camera(CameraInput::Zoom { steps }));
        }
    }

    /// Returns whether the key moved the camera.
    pub fn key_pressed(&self, key: Key) -> bool {
        match key.direction() {
            Some(direction) => {
                self.send(RenderCommand::Camera(CameraInput::Move(direction)));
                true
            }
            None => false,
        }
    }

    /// Show the latest published frame, or the background when there is none.
    ///
    /// Only reads the published handle, so repeated paints without a new frame produce
    /// the same output.
    pub fn paint(&self, presenter: &mut impl FramePresenter) -> PaintOutcome {
        let Some(size) = self.pixel_size() else {
            return PaintOutcome::Skipped;
        };
        if let Some(texture) = self.reader.current() {
            if presenter.blit(texture, size) {
                return PaintOutcome::Blitted(texture);
            }
            tracing::debug!("Published texture {} could not be presented", texture);
        }
        presenter.clear(self.background, size);
        PaintOutcome::Cleared(self.background)
    }
}
