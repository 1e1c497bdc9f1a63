use crate::geometry::GeometryError;
use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A geometry operation together with its parameters.
///
/// Built on the UI thread, moved into the task worker on acceptance and dropped there
/// once the operation ends. The worker matches on it exhaustively, there is no
/// "unknown parameter" path.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Import { path: Utf8PathBuf },
    EstimateNormals { method: NormalMethod },
    Reconstruct { method: ReconstructionMethod },
    Downsample(DownsampleParams),
    FilterRegion(RegionFilter),
    PostProcessMesh(PostProcessParams),
    ExportMesh { path: Utf8PathBuf, with_normals: bool },
}

impl Operation {
    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::Import { .. } => OperationKind::Import,
            Operation::EstimateNormals { .. } => OperationKind::EstimateNormals,
            Operation::Reconstruct { .. } => OperationKind::Reconstruct,
            Operation::Downsample(_) => OperationKind::Downsample,
            Operation::FilterRegion(_) => OperationKind::FilterRegion,
            Operation::PostProcessMesh(_) => OperationKind::PostProcessMesh,
            Operation::ExportMesh { .. } => OperationKind::ExportMesh,
        }
    }

    /// Check parameter values that can be rejected without looking at any geometry.
    pub fn validate(&self) -> Result<(), GeometryError> {
        match self {
            Operation::Import { path } | Operation::ExportMesh { path, .. } => {
                if path.as_str().is_empty() {
                    return Err(GeometryError::InvalidParameters("empty path".to_string()));
                }
                Ok(())
            }
            Operation::EstimateNormals { method } => method.validate(),
            Operation::Reconstruct { method } => method.validate(),
            Operation::Downsample(params) => params.validate(),
            Operation::FilterRegion(filter) => filter.validate(),
            Operation::PostProcessMesh(params) => params.validate(),
        }
    }
}

/// Fieldless tag of an [`Operation`], cheap to copy into events and log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Import,
    EstimateNormals,
    Reconstruct,
    Downsample,
    FilterRegion,
    PostProcessMesh,
    ExportMesh,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OperationKind::Import => "import",
            OperationKind::EstimateNormals => "estimate normals",
            OperationKind::Reconstruct => "reconstruct",
            OperationKind::Downsample => "downsample",
            OperationKind::FilterRegion => "filter region",
            OperationKind::PostProcessMesh => "post-process mesh",
            OperationKind::ExportMesh => "export mesh",
        };
        f.write_str(name)
    }
}

/// Normal estimation strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum NormalMethod {
    /// Local jet fitting over the `neighbors` nearest points.
    Jet { neighbors: usize },
    /// Voronoi covariance measure.
    Vcm {
        offset_radius: f32,
        convolve_radius: f32,
    },
    /// Orient every normal away from the cloud centroid. Only sensible for closed, roughly
    /// star-shaped scans.
    #[default]
    Centroid,
}

impl NormalMethod {
    pub fn validate(&self) -> Result<(), GeometryError> {
        match *self {
            NormalMethod::Jet { neighbors } if neighbors < 3 => Err(
                GeometryError::InvalidParameters(format!("jet needs at least 3 neighbors, got {neighbors}")),
            ),
            NormalMethod::Vcm {
                offset_radius,
                convolve_radius,
            } if !(offset_radius > 0.0 && convolve_radius >= 0.0) => {
                Err(GeometryError::InvalidParameters(format!(
                    "vcm radii must be positive (offset {offset_radius}, convolve {convolve_radius})"
                )))
            }
            _ => Ok(()),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            NormalMethod::Jet { .. } => "jet",
            NormalMethod::Vcm { .. } => "vcm",
            NormalMethod::Centroid => "centroid",
        }
    }
}

/// Surface reconstruction strategy and its parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum ReconstructionMethod {
    Poisson(PoissonParams),
    ScaleSpace(ScaleSpaceParams),
    AdvancingFront,
    SurfaceNets(SurfaceNetsParams),
}

impl Default for ReconstructionMethod {
    fn default() -> Self {
        ReconstructionMethod::SurfaceNets(SurfaceNetsParams::default())
    }
}

impl ReconstructionMethod {
    /// Whether the point cloud must carry normals before this method can run.
    pub fn requires_normals(&self) -> bool {
        matches!(self, ReconstructionMethod::Poisson(_))
    }

    pub fn label(&self) -> &'static str {
        match self {
            ReconstructionMethod::Poisson(_) => "poisson",
            ReconstructionMethod::ScaleSpace(_) => "scale space",
            ReconstructionMethod::AdvancingFront => "advancing front",
            ReconstructionMethod::SurfaceNets(_) => "surface nets",
        }
    }

    pub fn validate(&self) -> Result<(), GeometryError> {
        match self {
            ReconstructionMethod::Poisson(p) => p.validate(),
            ReconstructionMethod::SurfaceNets(p) => p.validate(),
            ReconstructionMethod::ScaleSpace(_) | ReconstructionMethod::AdvancingFront => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PoissonParams {
    /// Minimum triangle angle in degrees.
    pub angle: f32,
    /// Maximum triangle size relative to the average spacing.
    pub radius: f32,
    /// Surface approximation error relative to the average spacing.
    pub distance: f32,
    pub neighbors: usize,
    pub spacing_scale: f32,
}

impl Default for PoissonParams {
    fn default() -> Self {
        Self {
            angle: 20.0,
            radius: 30.0,
            distance: 0.375,
            neighbors: 6,
            spacing_scale: 1.0,
        }
    }
}

impl PoissonParams {
    fn validate(&self) -> Result<(), GeometryError> {
        if self.angle <= 0.0 || self.radius <= 0.0 || self.distance <= 0.0 || self.spacing_scale <= 0.0 {
            return Err(GeometryError::InvalidParameters(
                "poisson angle, radius, distance and spacing scale must be positive".to_string(),
            ));
        }
        if self.neighbors == 0 {
            return Err(GeometryError::InvalidParameters(
                "poisson needs at least one neighbor".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScaleSpaceParams {
    /// Smoothing iterations. Negative values are treated as zero.
    pub iterations: i32,
}

impl Default for ScaleSpaceParams {
    fn default() -> Self {
        Self { iterations: 4 }
    }
}

impl ScaleSpaceParams {
    pub fn effective_iterations(&self) -> u32 {
        self.iterations.max(0) as u32
    }
}

/// Distance-field reconstruction over a regular grid.
///
/// `None` picks a value from the point cloud bounds.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SurfaceNetsParams {
    pub cell_size: Option<f32>,
    pub radius: Option<f32>,
}

impl SurfaceNetsParams {
    fn validate(&self) -> Result<(), GeometryError> {
        for (name, value) in [("cell size", self.cell_size), ("radius", self.radius)] {
            match value {
                Some(v) if !(v.is_finite() && v > 0.0) => {
                    return Err(GeometryError::InvalidParameters(format!(
                        "surface nets {name} must be positive, got {v}"
                    )));
                }
                _ => {}
            }
        }
        Ok(())
    }
}

/// Voxel-grid downsampling: every occupied cell collapses to the average of its points.
#[derive(Debug, Clone, PartialEq)]
pub struct DownsampleParams {
    pub cell_size: f32,
}

impl DownsampleParams {
    pub fn validate(&self) -> Result<(), GeometryError> {
        if !(self.cell_size.is_finite() && self.cell_size > 0.0) {
            return Err(GeometryError::InvalidParameters(format!(
                "downsample cell size must be positive, got {}",
                self.cell_size
            )));
        }
        Ok(())
    }
}

/// Region used to crop the point cloud.
#[derive(Debug, Clone, PartialEq)]
pub enum RegionFilter {
    Aabb {
        min: [f32; 3],
        max: [f32; 3],
        keep_inside: bool,
    },
    Sphere {
        center: [f32; 3],
        radius: f32,
        keep_inside: bool,
    },
    /// Keep points whose neighbourhood of `radius` holds at most `max_neighbors` points,
    /// which strips the interior of a uniformly sampled volume.
    SurfaceFromVolume { radius: f32, max_neighbors: usize },
}

impl RegionFilter {
    pub fn validate(&self) -> Result<(), GeometryError> {
        match self {
            RegionFilter::Aabb { min, max, .. } => {
                if min.iter().zip(max).any(|(lo, hi)| !(lo <= hi)) {
                    return Err(GeometryError::InvalidParameters(format!(
                        "box minimum {min:?} exceeds maximum {max:?}"
                    )));
                }
                Ok(())
            }
            RegionFilter::Sphere { radius, .. } | RegionFilter::SurfaceFromVolume { radius, .. } => {
                if !(radius.is_finite() && *radius > 0.0) {
                    return Err(GeometryError::InvalidParameters(format!(
                        "filter radius must be positive, got {radius}"
                    )));
                }
                Ok(())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PostProcessParams {
    pub remove_degenerate: bool,
    pub remove_unreferenced: bool,
    pub smoothing_iterations: u32,
    /// Laplacian step in `(0, 1]`.
    pub smoothing_factor: f32,
    pub recompute_normals: bool,
}

impl Default for PostProcessParams {
    fn default() -> Self {
        Self {
            remove_degenerate: true,
            remove_unreferenced: true,
            smoothing_iterations: 0,
            smoothing_factor: 0.5,
            recompute_normals: true,
        }
    }
}

impl PostProcessParams {
    pub fn validate(&self) -> Result<(), GeometryError> {
        if !(self.smoothing_factor > 0.0 && self.smoothing_factor <= 1.0) {
            return Err(GeometryError::InvalidParameters(format!(
                "smoothing factor must lie in (0, 1], got {}",
                self.smoothing_factor
            )));
        }
        Ok(())
    }
}
