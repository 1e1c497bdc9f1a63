use super::CameraInput;
use crate::models::Bounds;
use glam::{Mat4, Vec3};

/// Degrees of rotation per normalized drag unit.
const ORBIT_SENSITIVITY: f32 = 180.0;
const PITCH_LIMIT: f32 = 89.0;
const ZOOM_BASE: f32 = 0.9;
const MIN_DISTANCE: f32 = 0.05;
const MAX_DISTANCE: f32 = 1.0e6;
/// Fraction of the orbit distance covered by one keyboard step at speed 1.
const MOVE_STEP: f32 = 0.02;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveDirection {
    Forward,
    Backward,
    Left,
    Right,
    Up,
    Down,
}

/// Orbit camera around a target point. Angles are in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    pub target: Vec3,
    pub distance: f32,
    pub yaw: f32,
    pub pitch: f32,
    pub fov: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            target: Vec3::ZERO,
            distance: 3.0,
            yaw: 45.0,
            pitch: -20.0,
            fov: 45.0,
            near: 0.01,
            far: 1000.0,
        }
    }
}

impl Camera {
    /// Apply one interaction. `speed` scales keyboard moves.
    pub fn apply(&mut self, input: CameraInput, speed: f32) {
        match input {
            CameraInput::Orbit { dx, dy } => self.orbit(dx, dy),
            CameraInput::Pan { dx, dy } => self.pan(dx, dy),
            CameraInput::Zoom { steps } => self.zoom(steps),
            CameraInput::Move(direction) => self.step(direction, speed),
            CameraInput::Fit(bounds) => self.fit(bounds),
        }
    }

    pub fn orbit(&mut self, dx: f32, dy: f32) {
        self.yaw = (self.yaw + dx * ORBIT_SENSITIVITY) % 360.0;
        self.pitch = (self.pitch + dy * ORBIT_SENSITIVITY).clamp(-PITCH_LIMIT, PITCH_LIMIT);
    }

    pub fn zoom(&mut self, steps: f32) {
        self.distance = (self.distance * ZOOM_BASE.powf(steps)).clamp(MIN_DISTANCE, MAX_DISTANCE);
        self.near = self.near.min(self.distance * 0.1);
        self.far = self.far.max(self.distance * 10.0);
    }

    /// Slide the target in the view plane, proportionally to the orbit distance.
    pub fn pan(&mut self, dx: f32, dy: f32) {
        let (right, up) = self.basis();
        self.target += (-dx * self.distance) * right + (dy * self.distance) * up;
    }

    pub fn step(&mut self, direction: MoveDirection, speed: f32) {
        let forward = self.forward();
        let (right, _) = self.basis();
        let amount = speed * MOVE_STEP * self.distance;
        let offset = match direction {
            MoveDirection::Forward => forward,
            MoveDirection::Backward => -forward,
            MoveDirection::Right => right,
            MoveDirection::Left => -right,
            MoveDirection::Up => Vec3::Y,
            MoveDirection::Down => -Vec3::Y,
        };
        self.target += offset * amount;
    }

    /// Center on `bounds` and back off far enough to see all of it.
    pub fn fit(&mut self, bounds: Bounds) {
        let radius = bounds.half_extent().max(0.5);
        self.target = bounds.center();
        self.distance = (3.0 * radius).max(0.5);
        self.near = 0.01;
        self.far = (10.0 * radius).max(1000.0);
    }

    pub fn position(&self) -> Vec3 {
        let (yaw, pitch) = (self.yaw.to_radians(), self.pitch.to_radians());
        let offset = Vec3::new(
            pitch.cos() * yaw.cos(),
            pitch.sin(),
            pitch.cos() * yaw.sin(),
        );
        self.target + offset * self.distance
    }

    pub fn forward(&self) -> Vec3 {
        (self.target - self.position()).normalize_or(Vec3::NEG_Z)
    }

    fn basis(&self) -> (Vec3, Vec3) {
        let forward = self.forward();
        let right = forward.cross(Vec3::Y).normalize_or(Vec3::X);
        let up = right.cross(forward);
        (right, up)
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position(), self.target, Vec3::Y)
    }

    pub fn projection_matrix(&self, aspect: f32) -> Mat4 {
        Mat4::perspective_rh(self.fov.to_radians(), aspect.max(0.01), self.near, self.far)
    }
}
