//! Double-buffered off-screen render pipeline.
//!
//! A dedicated render thread owns a secondary GPU context that shares resources with the
//! primary (UI) context, plus two framebuffers whose write/read roles swap every tick.
//! After each frame it publishes the colour texture it just finished through a single
//! atomic word ([`TexturePublisher`]); the UI thread's [`RenderView`] reads that word and
//! blits whatever it names, or clears to the background when nothing is published yet.
//!
//! Everything else reaches the render thread as a [`RenderCommand`].

pub mod backend;
pub mod camera;
pub mod publish;
pub mod view;
pub mod worker;

#[cfg(feature = "gpu")]
pub mod wgpu_backend;

pub use backend::{FrameParams, FramePresenter, GpuContext, GpuProvider, RenderTarget};
pub use camera::{Camera, MoveDirection};
pub use publish::{TextureId, TexturePublisher, TextureReader, texture_slot};
pub use view::{Key, PaintOutcome, PointerButton, RenderView};
pub use worker::RenderWorkerHandle;

use crate::models::{Bounds, MeshSnapshot, PointCloudSnapshot, RenderSettings};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Framebuffer dimensions in physical pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PixelSize {
    pub width: u32,
    pub height: u32,
}

impl PixelSize {
    /// `None` unless both dimensions are positive.
    pub fn new(width: u32, height: u32) -> Option<Self> {
        (width > 0 && height > 0).then_some(Self { width, height })
    }

    /// Physical size of a logical area at the given display scale.
    pub fn from_logical(width: f64, height: f64, scale_factor: f64) -> Option<Self> {
        if !(width > 0.0 && height > 0.0 && scale_factor > 0.0) {
            return None;
        }
        let w = (width * scale_factor).round();
        let h = (height * scale_factor).round();
        if w > f64::from(u32::MAX) || h > f64::from(u32::MAX) {
            return None;
        }
        Self::new(w as u32, h as u32)
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn aspect(&self) -> f32 {
        if self.height == 0 {
            1.0
        } else {
            self.width as f32 / self.height as f32
        }
    }
}

impl fmt::Display for PixelSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Lifecycle of the render worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderState {
    Uninitialized,
    Initializing,
    Ready,
    Rendering,
    ShuttingDown,
    Destroyed,
    /// Initialization or a framebuffer reallocation failed; rendering stays off for the
    /// rest of the session.
    Failed,
}

impl RenderState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RenderState::Destroyed | RenderState::Failed)
    }
}

/// What the render worker reports about itself through its status channel.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderStatus {
    pub state: RenderState,
    /// Size of the currently allocated framebuffer pair.
    pub framebuffer_size: Option<PixelSize>,
    /// Frames drawn and published so far.
    pub frames: u64,
    pub last_error: Option<String>,
}

impl Default for RenderStatus {
    fn default() -> Self {
        Self {
            state: RenderState::Uninitialized,
            framebuffer_size: None,
            frames: 0,
            last_error: None,
        }
    }
}

/// Camera interaction, applied by the render worker at the top of its next tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CameraInput {
    /// Normalized drag deltas.
    Orbit { dx: f32, dy: f32 },
    Pan { dx: f32, dy: f32 },
    /// Wheel steps, positive zooms in.
    Zoom { steps: f32 },
    /// One keyboard step.
    Move(MoveDirection),
    /// Frame the given bounds.
    Fit(Bounds),
}

/// Messages from the UI thread to the render worker.
#[derive(Debug, Clone)]
pub enum RenderCommand {
    Start,
    Stop,
    Resize(PixelSize),
    SetPointCloud(Option<Arc<PointCloudSnapshot>>),
    SetMesh(Option<Arc<MeshSnapshot>>),
    SetSettings(RenderSettings),
    SetBackground([f32; 3]),
    Camera(CameraInput),
    Shutdown,
}

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("failed to create off-screen surface: {0}")]
    SurfaceCreation(String),

    #[error("failed to create shared GPU context: {0}")]
    ContextCreation(String),

    #[error("failed to make GPU context current: {0}")]
    MakeCurrent(String),

    #[error("failed to build draw pipeline: {0}")]
    Pipeline(String),

    #[error("failed to allocate {size} framebuffer: {reason}")]
    Framebuffer { size: PixelSize, reason: String },

    #[error("failed to upload geometry: {0}")]
    Upload(String),

    #[error("draw failed: {0}")]
    Draw(String),

    #[error("no usable GPU adapter: {0}")]
    NotAvailable(String),

    #[error("failed to spawn render thread: {0}")]
    Spawn(#[from] std::io::Error),
}
