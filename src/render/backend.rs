//! GPU seams used by the render worker and the render view.
//!
//! The render worker is generic over a [`GpuProvider`]. The provider is created on the UI
//! thread (where the primary context lives) and moved into the render thread, where it
//! hands out an off-screen surface and a secondary context that shares resources with
//! the primary one. Every [`GpuContext`] call happens on the render thread.

use super::{PixelSize, RenderError, TextureId};
use crate::models::{MeshSnapshot, PointCloudSnapshot, RenderSettings};
use glam::{Mat4, Vec3};

/// One framebuffer: a colour texture visible to the primary context plus whatever
/// depth storage the backend needs.
pub trait RenderTarget {
    fn color_texture(&self) -> TextureId;
    fn size(&self) -> PixelSize;
}

/// Everything a single draw needs, resolved at the top of the tick.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameParams {
    pub view: Mat4,
    pub projection: Mat4,
    pub camera_position: Vec3,
    pub settings: RenderSettings,
    pub background: [f32; 3],
    pub size: PixelSize,
}

/// Secondary GPU context owned by the render thread.
pub trait GpuContext {
    type Target: RenderTarget;

    /// Bind this context to its off-screen surface on the calling thread.
    fn make_current(&mut self) -> Result<(), RenderError>;
    fn done_current(&mut self);

    /// Compile programs and set up vertex layouts.
    fn build_pipeline(&mut self) -> Result<(), RenderError>;
    fn release_pipeline(&mut self);

    fn create_framebuffer(&mut self, size: PixelSize) -> Result<Self::Target, RenderError>;
    fn release_framebuffer(&mut self, target: Self::Target);

    fn bind_framebuffer(&mut self, target: &Self::Target) -> Result<(), RenderError>;
    fn unbind_framebuffer(&mut self, target: &Self::Target);

    /// Replace the point buffers. `None` clears them.
    fn upload_points(&mut self, cloud: Option<&PointCloudSnapshot>) -> Result<(), RenderError>;
    fn upload_mesh(&mut self, mesh: Option<&MeshSnapshot>) -> Result<(), RenderError>;

    /// Draw into the currently bound framebuffer. Completion must be visible to the primary
    /// context before this returns.
    fn draw(&mut self, frame: &FrameParams) -> Result<(), RenderError>;
}

pub trait GpuProvider: Send + 'static {
    type Surface;
    type Context: GpuContext;

    /// Off-screen surface matching the primary context's format.
    fn create_surface(&mut self) -> Result<Self::Surface, RenderError>;

    fn create_shared_context(
        &mut self,
        surface: &Self::Surface,
    ) -> Result<Self::Context, RenderError>;
}

/// UI-side sink for the paint step.
pub trait FramePresenter {
    fn clear(&mut self, color: [f32; 3], size: PixelSize);

    /// Copy the named texture onto the visible surface. Returns `false` when the id no
    /// longer resolves to a texture.
    fn blit(&mut self, texture: TextureId, size: PixelSize) -> bool;
}
