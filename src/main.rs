//! pointmesh - headless point cloud to mesh driver
//!
//! Runs the same task pipeline a UI shell would, without the render side:
//!
//! 1. Load `pointmesh.yaml` (plus `POINTMESH__*` overrides) from the config directory
//! 2. Initialize logging (daily-rotated file + console)
//! 3. Start a [`Session`] around the reference geometry processor
//! 4. Submit import → optional downsample → reconstruct → export, one at a time,
//!    waiting for each finished signal before the next submission
//! 5. Shut the session down and log the metrics summary

use anyhow::{Context, Result, bail};
use camino::{Utf8Path, Utf8PathBuf};
use clap::Parser;
use pointmesh::models::{DownsampleParams, ReconstructionMethod, SurfaceNetsParams};
use pointmesh::task::TaskEvent;
use pointmesh::{APP_NAME, ConfigManager, Operation, ReferenceProcessor, Session, VERSION};
use std::time::Duration;

/// Reconstruct a mesh from a point cloud file.
#[derive(Parser, Debug)]
#[command(name = "pointmesh", version)]
#[command(about = "Reconstructs a triangle mesh from an XYZ or OBJ point cloud")]
struct Args {
    /// Point cloud to read (.xyz, .txt, .pts or .obj)
    input: Utf8PathBuf,

    /// Mesh to write (.obj or .ply). Defaults to `<input stem>_mesh.obj`
    #[arg(short, long)]
    output: Option<Utf8PathBuf>,

    /// Write per-vertex normals
    #[arg(long)]
    with_normals: bool,

    /// Voxel size for downsampling before reconstruction
    #[arg(long, value_name = "CELL")]
    downsample: Option<f32>,

    /// Grid cell size of the reconstruction
    #[arg(long)]
    cell_size: Option<f32>,

    /// Radius of the ball splatted around every point
    #[arg(long)]
    radius: Option<f32>,

    /// Directory holding pointmesh.yaml
    #[arg(long, default_value = ".")]
    config_dir: Utf8PathBuf,

    /// Log at debug level
    #[arg(long)]
    debug: bool,
}

fn default_output(input: &Utf8Path) -> Utf8PathBuf {
    let stem = input.file_stem().unwrap_or("pointcloud");
    input.with_file_name(format!("{stem}_mesh.obj"))
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config_manager = ConfigManager::new(&args.config_dir)?;
    let mut config = config_manager.load_config()?;
    config.logging.debug |= args.debug;

    let _guard = pointmesh::logging::setup_logging(&config.logging)?;
    tracing::info!("Starting {} v{}", APP_NAME, VERSION);
    // load_config ran before the subscriber existed, so its warning went nowhere
    if !config_manager.has_config_file() {
        tracing::warn!(
            "Config file not found at {}, using defaults",
            config_manager.config_path()
        );
    }

    let output = args.output.clone().unwrap_or_else(|| default_output(&args.input));

    let mut operations = vec![Operation::Import {
        path: args.input.clone(),
    }];
    if let Some(cell_size) = args.downsample {
        operations.push(Operation::Downsample(DownsampleParams { cell_size }));
    }
    operations.push(Operation::Reconstruct {
        method: ReconstructionMethod::SurfaceNets(SurfaceNetsParams {
            cell_size: args.cell_size,
            radius: args.radius,
        }),
    });
    operations.push(Operation::ExportMesh {
        path: output,
        with_normals: args.with_normals,
    });

    let mut session = Session::headless(Box::new(ReferenceProcessor::new()), &config)
        .context("Failed to start the task pipeline")?;

    let result = run(&mut session, operations);
    session.shutdown();
    tracing::info!("Application shutdown complete");
    result
}

/// Submit `operations` in order, stopping at the first failure.
fn run(session: &mut Session, operations: Vec<Operation>) -> Result<()> {
    for operation in operations {
        let kind = operation.kind();
        session
            .submit(operation)
            .map_err(|e| anyhow::anyhow!("{kind} was not accepted: {e}"))?;

        let (idle, events) = session.wait_until_idle(Duration::MAX);
        if !idle {
            bail!("{kind} did not finish");
        }

        // log lines were already mirrored into tracing by the worker
        let success = events.iter().any(|event| match event {
            TaskEvent::Finished(outcome) => outcome.success,
            _ => false,
        });
        if !success {
            bail!("{kind} failed");
        }
    }
    Ok(())
}
