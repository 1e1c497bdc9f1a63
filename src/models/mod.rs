//! Plain data shared between the UI thread and the background pipelines.
//!
//! - [`Operation`]: a closed sum type over the geometry operations the task pipeline runs
//! - [`PointCloudSnapshot`] / [`MeshSnapshot`]: immutable display data built by the task worker
//! - [`RenderSettings`]: visibility toggles, colors and point size consumed by the render worker
//! - [`AppConfig`]: the injected configuration object loaded by [`ConfigManager`](crate::config::ConfigManager)
//!
//! Nothing in here is shared mutably across threads. Operations are moved into the worker,
//! snapshots are wrapped in `Arc` once and never touched again.

pub mod config;
pub mod operation;
pub mod settings;
pub mod snapshot;

pub use config::{AppConfig, LoggingConfig, RenderConfig, TaskConfig};
pub use operation::{
    DownsampleParams, NormalMethod, Operation, OperationKind, PoissonParams, PostProcessParams,
    ReconstructionMethod, RegionFilter, ScaleSpaceParams, SurfaceNetsParams,
};
pub use settings::{ClipPlane, RenderSettings, MAX_POINT_SIZE, MIN_POINT_SIZE};
pub use snapshot::{Bounds, MeshSnapshot, PointCloudSnapshot};
