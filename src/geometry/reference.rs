use super::{GeometryError, GeometryProcessor, GeometryResult, PointCloud, TriangleMesh, io};
use crate::models::{
    DownsampleParams, NormalMethod, PostProcessParams, ReconstructionMethod, RegionFilter,
    SurfaceNetsParams,
};
use camino::Utf8Path;
use fast_surface_nets::ndshape::{RuntimeShape, Shape};
use fast_surface_nets::{SurfaceNetsBuffer, surface_nets};
use glam::{IVec3, Vec3};
use std::collections::{HashMap, HashSet};

/// Largest grid dimension the distance-field reconstruction will allocate.
pub const MAX_GRID_AXIS: u32 = 256;

/// Cells per bounding-box diagonal when no cell size is given.
const AUTO_GRID_RESOLUTION: f32 = 64.0;

/// Self-contained [`GeometryProcessor`].
///
/// Supports centroid normals and surface-nets reconstruction; the other methods report
/// [`GeometryError::Unsupported`].
#[derive(Debug, Default)]
pub struct ReferenceProcessor {
    cloud: PointCloud,
    mesh: TriangleMesh,
}

impl ReferenceProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an in-memory cloud instead of a file.
    pub fn with_point_cloud(cloud: PointCloud) -> Self {
        Self {
            cloud,
            mesh: TriangleMesh::default(),
        }
    }

    fn require_points(&self) -> GeometryResult<()> {
        if self.cloud.is_empty() {
            return Err(GeometryError::EmptyPointCloud);
        }
        Ok(())
    }
}

impl GeometryProcessor for ReferenceProcessor {
    fn load_point_cloud(&mut self, path: &Utf8Path) -> GeometryResult<()> {
        let cloud = io::read_point_cloud(path)?;
        tracing::debug!("Read {} points from {}", cloud.len(), path);
        self.cloud = cloud;
        self.mesh = TriangleMesh::default();
        Ok(())
    }

    fn estimate_normals(&mut self, method: NormalMethod) -> GeometryResult<()> {
        self.require_points()?;
        match method {
            NormalMethod::Centroid => {
                let centroid = self.cloud.centroid().ok_or(GeometryError::EmptyPointCloud)?;
                self.cloud.normals = self
                    .cloud
                    .points
                    .iter()
                    .map(|p| (*p - centroid).normalize_or(Vec3::Z))
                    .collect();
                Ok(())
            }
            other => Err(GeometryError::Unsupported(format!(
                "{} normal estimation",
                other.label()
            ))),
        }
    }

    fn reconstruct(&mut self, method: &ReconstructionMethod) -> GeometryResult<()> {
        self.require_points()?;
        if method.requires_normals() && !self.cloud.has_normals() {
            return Err(GeometryError::MissingNormals);
        }
        match method {
            ReconstructionMethod::SurfaceNets(params) => {
                self.mesh = surface_nets_mesh(&self.cloud, params)?;
                Ok(())
            }
            other => Err(GeometryError::Unsupported(format!(
                "{} reconstruction",
                other.label()
            ))),
        }
    }

    fn downsample(&mut self, params: &DownsampleParams) -> GeometryResult<()> {
        params.validate()?;
        self.require_points()?;
        self.cloud = voxel_downsample(&self.cloud, params.cell_size);
        Ok(())
    }

    fn filter_region(&mut self, filter: &RegionFilter) -> GeometryResult<()> {
        filter.validate()?;
        self.require_points()?;

        let keep: Vec<bool> = match *filter {
            RegionFilter::Aabb {
                min,
                max,
                keep_inside,
            } => {
                let (min, max) = (Vec3::from_array(min), Vec3::from_array(max));
                self.cloud
                    .points
                    .iter()
                    .map(|p| (p.cmpge(min).all() && p.cmple(max).all()) == keep_inside)
                    .collect()
            }
            RegionFilter::Sphere {
                center,
                radius,
                keep_inside,
            } => {
                let center = Vec3::from_array(center);
                let radius_sq = radius * radius;
                self.cloud
                    .points
                    .iter()
                    .map(|p| (p.distance_squared(center) <= radius_sq) == keep_inside)
                    .collect()
            }
            RegionFilter::SurfaceFromVolume {
                radius,
                max_neighbors,
            } => neighbor_counts(&self.cloud.points, radius)
                .into_iter()
                .map(|count| count <= max_neighbors)
                .collect(),
        };

        if !keep.iter().any(|&k| k) {
            return Err(GeometryError::InvalidParameters(
                "filter would remove every point".to_string(),
            ));
        }
        self.cloud.retain_mask(&keep);
        Ok(())
    }

    fn post_process_mesh(&mut self, params: &PostProcessParams) -> GeometryResult<()> {
        params.validate()?;
        if self.mesh.is_empty() {
            return Err(GeometryError::EmptyMesh);
        }

        let mut mesh = self.mesh.clone();
        if params.remove_degenerate {
            remove_degenerate_faces(&mut mesh);
        }
        if params.remove_unreferenced {
            remove_unreferenced_vertices(&mut mesh);
        }
        if params.smoothing_iterations > 0 {
            laplacian_smooth(&mut mesh, params.smoothing_iterations, params.smoothing_factor);
        }
        if mesh.is_empty() {
            return Err(GeometryError::EmptyMesh);
        }
        if params.recompute_normals || !mesh.has_normals() {
            mesh.compute_vertex_normals();
        }
        self.mesh = mesh;
        Ok(())
    }

    fn export_mesh(&mut self, path: &Utf8Path, with_normals: bool) -> GeometryResult<()> {
        if self.mesh.is_empty() {
            return Err(GeometryError::EmptyMesh);
        }
        if with_normals && !self.mesh.has_normals() {
            self.mesh.compute_vertex_normals();
        }
        io::write_mesh(path, &self.mesh, with_normals)
    }

    fn point_cloud(&self) -> &PointCloud {
        &self.cloud
    }

    fn mesh(&self) -> &TriangleMesh {
        &self.mesh
    }
}

fn cell_of(p: Vec3, cell_size: f32) -> IVec3 {
    (p / cell_size).floor().as_ivec3()
}

/// Collapse every occupied voxel to the mean of its points. Output order follows the
/// first point seen in each voxel.
fn voxel_downsample(cloud: &PointCloud, cell_size: f32) -> PointCloud {
    struct Cell {
        sum: Vec3,
        normal_sum: Vec3,
        count: u32,
    }

    let has_normals = cloud.has_normals();
    let mut index: HashMap<IVec3, usize> = HashMap::new();
    let mut cells: Vec<Cell> = Vec::new();

    for (i, p) in cloud.points.iter().enumerate() {
        let slot = *index.entry(cell_of(*p, cell_size)).or_insert_with(|| {
            cells.push(Cell {
                sum: Vec3::ZERO,
                normal_sum: Vec3::ZERO,
                count: 0,
            });
            cells.len() - 1
        });
        let cell = &mut cells[slot];
        cell.sum += *p;
        cell.count += 1;
        if has_normals {
            cell.normal_sum += cloud.normals[i];
        }
    }

    let points = cells.iter().map(|c| c.sum / c.count as f32).collect();
    let normals = if has_normals {
        cells
            .iter()
            .map(|c| c.normal_sum.normalize_or(Vec3::Z))
            .collect()
    } else {
        Vec::new()
    };
    PointCloud::with_normals(points, normals)
}

/// Number of other points within `radius` of each point.
fn neighbor_counts(points: &[Vec3], radius: f32) -> Vec<usize> {
    let mut grid: HashMap<IVec3, Vec<usize>> = HashMap::new();
    for (i, p) in points.iter().enumerate() {
        grid.entry(cell_of(*p, radius)).or_default().push(i);
    }

    let radius_sq = radius * radius;
    points
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let home = cell_of(*p, radius);
            let mut count = 0;
            for dz in -1..=1 {
                for dy in -1..=1 {
                    for dx in -1..=1 {
                        let Some(bucket) = grid.get(&(home + IVec3::new(dx, dy, dz))) else {
                            continue;
                        };
                        count += bucket
                            .iter()
                            .filter(|&&j| j != i && points[j].distance_squared(*p) <= radius_sq)
                            .count();
                    }
                }
            }
            count
        })
        .collect()
}

/// Splat a ball of `radius` around every point into a signed distance grid and
/// extract its zero level set.
fn surface_nets_mesh(cloud: &PointCloud, params: &SurfaceNetsParams) -> GeometryResult<TriangleMesh> {
    let (lo, hi) = cloud.aabb().ok_or(GeometryError::EmptyPointCloud)?;
    let diagonal = (hi - lo).length().max(1e-3);
    let cell = params
        .cell_size
        .unwrap_or(diagonal / AUTO_GRID_RESOLUTION);
    let radius = params.radius.unwrap_or(cell * 1.5);

    // two extra cells keep the surface away from the grid border
    let pad = radius + 2.0 * cell;
    let origin = lo - Vec3::splat(pad);
    let span = (hi - lo) + Vec3::splat(2.0 * pad);
    let dims_f = (span / cell).ceil() + Vec3::ONE;
    if !dims_f.is_finite() {
        return Err(GeometryError::EmptyGrid);
    }
    if dims_f.max_element() > MAX_GRID_AXIS as f32 {
        let dims = dims_f.as_uvec3().to_array();
        return Err(GeometryError::GridTooLarge(dims, MAX_GRID_AXIS));
    }
    let dims = dims_f.as_uvec3().to_array();
    if dims.iter().any(|&d| d < 2) {
        return Err(GeometryError::EmptyGrid);
    }

    let shape = RuntimeShape::<u32, 3>::new(dims);
    let mut sdf = vec![pad; shape.size() as usize];

    let reach = ((radius + cell) / cell).ceil() as i32;
    let max_index = IVec3::new(dims[0] as i32 - 1, dims[1] as i32 - 1, dims[2] as i32 - 1);
    for p in &cloud.points {
        let local = (*p - origin) / cell;
        let center = local.round().as_ivec3();
        let start = (center - IVec3::splat(reach)).max(IVec3::ZERO);
        let end = (center + IVec3::splat(reach)).min(max_index);
        for z in start.z..=end.z {
            for y in start.y..=end.y {
                for x in start.x..=end.x {
                    let node = IVec3::new(x, y, z).as_vec3();
                    let distance = (node - local).length() * cell - radius;
                    let i = shape.linearize([x as u32, y as u32, z as u32]) as usize;
                    if distance < sdf[i] {
                        sdf[i] = distance;
                    }
                }
            }
        }
    }

    let mut buffer = SurfaceNetsBuffer::default();
    surface_nets(&sdf, &shape, [0; 3], [dims[0] - 1, dims[1] - 1, dims[2] - 1], &mut buffer);
    if buffer.indices.is_empty() {
        return Err(GeometryError::EmptyGrid);
    }

    let vertices = buffer
        .positions
        .iter()
        .map(|p| origin + Vec3::from_array(*p) * cell)
        .collect();
    let normals = buffer
        .normals
        .iter()
        .map(|n| Vec3::from_array(*n).normalize_or(Vec3::Z))
        .collect();
    let faces = buffer
        .indices
        .chunks_exact(3)
        .map(|tri| tri.to_vec())
        .collect();

    Ok(TriangleMesh {
        vertices,
        normals,
        faces,
    })
}

fn remove_degenerate_faces(mesh: &mut TriangleMesh) {
    let count = mesh.vertices.len();
    let vertices = &mesh.vertices;
    mesh.faces.retain(|face| {
        if face.len() < 3 || face.iter().any(|&i| i as usize >= count) {
            return false;
        }
        let distinct: HashSet<u32> = face.iter().copied().collect();
        if distinct.len() < 3 {
            return false;
        }
        let a = vertices[face[0] as usize];
        let area: f32 = (1..face.len() - 1)
            .map(|k| {
                let b = vertices[face[k] as usize];
                let c = vertices[face[k + 1] as usize];
                (b - a).cross(c - a).length()
            })
            .sum();
        area > f32::EPSILON
    });
}

fn remove_unreferenced_vertices(mesh: &mut TriangleMesh) {
    let mut remap = vec![u32::MAX; mesh.vertices.len()];
    let mut vertices = Vec::new();
    let mut normals = Vec::new();
    let has_normals = mesh.has_normals();

    for face in &mut mesh.faces {
        for index in face.iter_mut() {
            let old = *index as usize;
            if remap[old] == u32::MAX {
                remap[old] = vertices.len() as u32;
                vertices.push(mesh.vertices[old]);
                if has_normals {
                    normals.push(mesh.normals[old]);
                }
            }
            *index = remap[old];
        }
    }
    mesh.vertices = vertices;
    mesh.normals = normals;
}

fn laplacian_smooth(mesh: &mut TriangleMesh, iterations: u32, factor: f32) {
    let mut neighbors: Vec<HashSet<u32>> = vec![HashSet::new(); mesh.vertices.len()];
    for face in &mesh.faces {
        for k in 0..face.len() {
            let a = face[k];
            let b = face[(k + 1) % face.len()];
            if (a as usize) < neighbors.len() && (b as usize) < neighbors.len() {
                neighbors[a as usize].insert(b);
                neighbors[b as usize].insert(a);
            }
        }
    }

    for _ in 0..iterations {
        let current = mesh.vertices.clone();
        for (i, v) in mesh.vertices.iter_mut().enumerate() {
            let ring = &neighbors[i];
            if ring.is_empty() {
                continue;
            }
            let average: Vec3 =
                ring.iter().map(|&j| current[j as usize]).sum::<Vec3>() / ring.len() as f32;
            *v += factor * (average - *v);
        }
    }
}
