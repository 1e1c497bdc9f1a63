use super::{NormalMethod, RenderSettings};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Application configuration loaded from `pointmesh.yaml` and `POINTMESH__*` variables.
///
/// Every section falls back to defaults, so an empty file is a valid config.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub logging: LoggingConfig,
    pub task: TaskConfig,
    pub render: RenderConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub directory: String,
    pub prefix: String,
    pub debug: bool,
    pub console: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: "logs".to_string(),
            prefix: "pointmesh".to_string(),
            debug: false,
            console: true,
        }
    }
}

/// Task pipeline settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskConfig {
    /// Buffer size of the upward event broadcast.
    pub event_capacity: usize,
    /// Estimation run automatically when a reconstruction needs normals the cloud lacks.
    pub default_normal_method: NormalMethod,
    pub shutdown_timeout_ms: u64,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            event_capacity: 100,
            default_normal_method: NormalMethod::Centroid,
            shutdown_timeout_ms: 5000,
        }
    }
}

impl TaskConfig {
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

/// Render pipeline settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub target_fps: u32,
    pub background: [f32; 3],
    pub shutdown_timeout_ms: u64,
    pub settings: RenderSettings,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            target_fps: 60,
            background: [0.1, 0.1, 0.12],
            shutdown_timeout_ms: 2000,
            settings: RenderSettings::default(),
        }
    }
}

impl RenderConfig {
    /// Tick period for the render loop. A zero fps falls back to 60.
    pub fn frame_interval(&self) -> Duration {
        let fps = if self.target_fps == 0 { 60 } else { self.target_fps };
        Duration::from_secs_f64(1.0 / f64::from(fps))
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}
