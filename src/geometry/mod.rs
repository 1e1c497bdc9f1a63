//! Geometry processing seam.
//!
//! The task worker only talks to geometry through [`GeometryProcessor`]. The math behind
//! it (normal estimation, reconstruction, mesh cleanup) is swappable; [`ReferenceProcessor`]
//! is a small self-contained implementation good enough for scans of a few hundred
//! thousand points.

pub mod error;
pub mod io;
pub mod reference;

pub use error::{GeometryError, GeometryResult};
pub use reference::ReferenceProcessor;

use crate::models::{
    DownsampleParams, NormalMethod, PostProcessParams, ReconstructionMethod, RegionFilter,
};
use camino::Utf8Path;
use glam::Vec3;

/// Live point cloud owned by a processor. `normals` is either empty or one per point.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointCloud {
    pub points: Vec<Vec3>,
    pub normals: Vec<Vec3>,
}

impl PointCloud {
    pub fn new(points: Vec<Vec3>) -> Self {
        Self {
            points,
            normals: Vec::new(),
        }
    }

    pub fn with_normals(points: Vec<Vec3>, normals: Vec<Vec3>) -> Self {
        Self { points, normals }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn has_normals(&self) -> bool {
        !self.points.is_empty() && self.normals.len() == self.points.len()
    }

    /// Min and max corners, `None` when empty.
    pub fn aabb(&self) -> Option<(Vec3, Vec3)> {
        let first = *self.points.first()?;
        Some(
            self.points
                .iter()
                .fold((first, first), |(lo, hi), p| (lo.min(*p), hi.max(*p))),
        )
    }

    pub fn centroid(&self) -> Option<Vec3> {
        if self.points.is_empty() {
            return None;
        }
        let sum: Vec3 = self.points.iter().copied().sum();
        Some(sum / self.points.len() as f32)
    }

    /// Keep the points for which `keep` returns true, normals stay aligned.
    pub(crate) fn retain_mask(&mut self, keep: &[bool]) {
        let has_normals = self.has_normals();
        let mut index = 0;
        self.points.retain(|_| {
            index += 1;
            keep[index - 1]
        });
        if has_normals {
            let mut index = 0;
            self.normals.retain(|_| {
                index += 1;
                keep[index - 1]
            });
        } else {
            self.normals.clear();
        }
    }
}

/// Live polygon mesh owned by a processor.
///
/// Faces may have any number of corners; only triangles reach the display snapshot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TriangleMesh {
    pub vertices: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    pub faces: Vec<Vec<u32>>,
}

impl TriangleMesh {
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty() || self.faces.is_empty()
    }

    pub fn has_normals(&self) -> bool {
        !self.vertices.is_empty() && self.normals.len() == self.vertices.len()
    }

    /// Area-weighted vertex normals from the face fans.
    pub fn compute_vertex_normals(&mut self) {
        let mut normals = vec![Vec3::ZERO; self.vertices.len()];
        let count = self.vertices.len();
        for face in &self.faces {
            if face.len() < 3 || face.iter().any(|&i| i as usize >= count) {
                continue;
            }
            let a = self.vertices[face[0] as usize];
            for k in 1..face.len() - 1 {
                let b = self.vertices[face[k] as usize];
                let c = self.vertices[face[k + 1] as usize];
                let n = (b - a).cross(c - a);
                for &i in [face[0], face[k], face[k + 1]].iter() {
                    normals[i as usize] += n;
                }
            }
        }
        self.normals = normals
            .into_iter()
            .map(|n| n.normalize_or(Vec3::Z))
            .collect();
    }
}

/// Performs the actual geometry work for the task worker.
///
/// Every operation either succeeds and leaves the processor holding the new state, or
/// returns an error and leaves the previous state untouched. Implementations run on the
/// task worker thread, one call at a time.
pub trait GeometryProcessor: Send {
    fn load_point_cloud(&mut self, path: &Utf8Path) -> GeometryResult<()>;

    fn estimate_normals(&mut self, method: NormalMethod) -> GeometryResult<()>;

    fn reconstruct(&mut self, method: &ReconstructionMethod) -> GeometryResult<()>;

    fn downsample(&mut self, params: &DownsampleParams) -> GeometryResult<()>;

    fn filter_region(&mut self, filter: &RegionFilter) -> GeometryResult<()>;

    fn post_process_mesh(&mut self, params: &PostProcessParams) -> GeometryResult<()>;

    fn export_mesh(&mut self, path: &Utf8Path, with_normals: bool) -> GeometryResult<()>;

    fn point_cloud(&self) -> &PointCloud;

    fn mesh(&self) -> &TriangleMesh;

    fn has_normals(&self) -> bool {
        self.point_cloud().has_normals()
    }
}
