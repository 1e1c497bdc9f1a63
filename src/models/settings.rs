use serde::{Deserialize, Serialize};

pub const MIN_POINT_SIZE: f32 = 1.0;
pub const MAX_POINT_SIZE: f32 = 20.0;

/// Optional clipping plane `ax + by + cz + d >= 0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClipPlane {
    pub enabled: bool,
    pub plane: [f32; 4],
}

impl Default for ClipPlane {
    fn default() -> Self {
        Self {
            enabled: false,
            plane: [0.0, 1.0, 0.0, 0.0],
        }
    }
}

/// What the render worker draws and how.
///
/// The render view sends a full copy on every change; the worker only re-uploads
/// geometry when the snapshots change, settings are applied per tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderSettings {
    pub show_points: bool,
    pub show_normals: bool,
    pub show_mesh: bool,
    pub wireframe: bool,
    pub point_size: f32,
    pub point_color: [f32; 3],
    pub mesh_color: [f32; 3],
    pub wire_color: [f32; 3],
    pub camera_speed: f32,
    pub clip_plane: ClipPlane,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            show_points: true,
            show_normals: false,
            show_mesh: false,
            wireframe: false,
            point_size: 3.0,
            point_color: [0.2, 0.8, 0.3],
            mesh_color: [0.85, 0.85, 0.9],
            wire_color: [0.1, 0.1, 0.1],
            camera_speed: 3.0,
            clip_plane: ClipPlane::default(),
        }
    }
}

impl RenderSettings {
    pub fn set_point_size(&mut self, size: f32) {
        self.point_size = clamp_point_size(size);
    }

    /// Copy of `self` with every field forced into its valid range.
    pub fn sanitized(mut self) -> Self {
        self.point_size = clamp_point_size(self.point_size);
        if !(self.camera_speed.is_finite() && self.camera_speed > 0.0) {
            self.camera_speed = RenderSettings::default().camera_speed;
        }
        self
    }
}

fn clamp_point_size(size: f32) -> f32 {
    if size.is_nan() {
        return MIN_POINT_SIZE;
    }
    size.clamp(MIN_POINT_SIZE, MAX_POINT_SIZE)
}
