use glam::Vec3;

/// Axis-aligned bounds of a snapshot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min: Vec3,
    pub max: Vec3,
}

impl Bounds {
    /// Bounds of `points`, `None` when empty.
    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a [f32; 3]>) -> Option<Self> {
        let mut iter = points.into_iter();
        let first = Vec3::from_array(*iter.next()?);
        let (min, max) = iter.fold((first, first), |(min, max), p| {
            let p = Vec3::from_array(*p);
            (min.min(p), max.max(p))
        });
        Some(Self { min, max })
    }

    pub fn union(self, other: Bounds) -> Bounds {
        Bounds {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    pub fn center(&self) -> Vec3 {
        0.5 * (self.min + self.max)
    }

    /// Largest half extent along any axis.
    pub fn half_extent(&self) -> f32 {
        (0.5 * (self.max - self.min)).max_element()
    }
}

impl Default for Bounds {
    fn default() -> Self {
        Self {
            min: Vec3::splat(-1.0),
            max: Vec3::splat(1.0),
        }
    }
}

/// Immutable point cloud ready for display.
///
/// Built once by the task worker and shared by `Arc` with the UI and the render worker.
#[derive(Debug, Clone, PartialEq)]
pub struct PointCloudSnapshot {
    positions: Vec<[f32; 3]>,
    normals: Option<Vec<[f32; 3]>>,
    bounds: Option<Bounds>,
}

impl PointCloudSnapshot {
    /// `normals` is dropped unless it has one entry per position.
    pub fn new(positions: Vec<[f32; 3]>, normals: Option<Vec<[f32; 3]>>) -> Self {
        let normals = normals.filter(|n| !n.is_empty() && n.len() == positions.len());
        let bounds = Bounds::from_points(&positions);
        Self {
            positions,
            normals,
            bounds,
        }
    }

    pub fn positions(&self) -> &[[f32; 3]] {
        &self.positions
    }

    pub fn normals(&self) -> Option<&[[f32; 3]]> {
        self.normals.as_deref()
    }

    pub fn bounds(&self) -> Option<Bounds> {
        self.bounds
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

/// Immutable triangle mesh ready for display. `indices` holds three entries per triangle.
#[derive(Debug, Clone, PartialEq)]
pub struct MeshSnapshot {
    vertices: Vec<[f32; 3]>,
    normals: Option<Vec<[f32; 3]>>,
    indices: Vec<u32>,
    bounds: Option<Bounds>,
}

impl MeshSnapshot {
    /// Faces referencing a vertex outside `vertices` are skipped.
    pub fn new(
        vertices: Vec<[f32; 3]>,
        normals: Option<Vec<[f32; 3]>>,
        triangles: impl IntoIterator<Item = [u32; 3]>,
    ) -> Self {
        let count = vertices.len() as u32;
        let indices = triangles
            .into_iter()
            .filter(|tri| tri.iter().all(|&i| i < count))
            .flatten()
            .collect();
        let normals = normals.filter(|n| !n.is_empty() && n.len() == vertices.len());
        let bounds = Bounds::from_points(&vertices);
        Self {
            vertices,
            normals,
            indices,
            bounds,
        }
    }

    pub fn vertices(&self) -> &[[f32; 3]] {
        &self.vertices
    }

    pub fn normals(&self) -> Option<&[[f32; 3]]> {
        self.normals.as_deref()
    }

    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn bounds(&self) -> Option<Bounds> {
        self.bounds
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}
