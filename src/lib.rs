// pointmesh - point cloud to mesh reconstruction with background processing
//
// Library crate: the task pipeline (busy-gated geometry operations on a worker thread),
// the double-buffered off-screen render pipeline, and the session wiring both.
// The binary crate (main.rs) is a headless command-line driver.

pub mod app;
pub mod config;
pub mod geometry;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod render;
pub mod task;

// Re-export commonly used types for convenience
pub use app::{Session, SessionError};
pub use config::ConfigManager;
pub use geometry::{GeometryError, GeometryProcessor, ReferenceProcessor};
pub use metrics::Metrics;
pub use models::{AppConfig, Operation, OperationKind};
pub use render::{RenderState, RenderView, RenderWorkerHandle};
pub use task::{SubmitError, TaskController, TaskEvent};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
