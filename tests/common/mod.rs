//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use camino::{Utf8Path, Utf8PathBuf};
use glam::Vec3;
use pointmesh::geometry::{
    GeometryError, GeometryProcessor, GeometryResult, PointCloud, ReferenceProcessor,
    TriangleMesh,
};
use pointmesh::models::{
    DownsampleParams, NormalMethod, PostProcessParams, ReconstructionMethod, RegionFilter,
    SurfaceNetsParams,
};
use std::fmt::Write as _;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};

/// Points on a Fibonacci sphere.
pub fn sphere_points(count: usize, radius: f32) -> Vec<Vec3> {
    let golden = std::f32::consts::PI * (3.0 - 5.0_f32.sqrt());
    (0..count)
        .map(|i| {
            let y = 1.0 - 2.0 * (i as f32 + 0.5) / count as f32;
            let r = (1.0 - y * y).sqrt();
            let theta = golden * i as f32;
            Vec3::new(theta.cos() * r, y, theta.sin() * r) * radius
        })
        .collect()
}

/// Write `points` as a whitespace-separated XYZ file and return its path.
pub fn write_xyz(dir: &Utf8Path, name: &str, points: &[Vec3]) -> Utf8PathBuf {
    let mut text = String::from("# x y z\n");
    for p in points {
        let _ = writeln!(text, "{} {} {}", p.x, p.y, p.z);
    }
    let path = dir.join(name);
    std::fs::write(&path, text).unwrap();
    path
}

/// Surface nets parameters that resolve the unit sphere fixture.
pub fn sphere_reconstruction() -> ReconstructionMethod {
    ReconstructionMethod::SurfaceNets(SurfaceNetsParams {
        cell_size: Some(0.1),
        radius: Some(0.15),
    })
}

/// Processor whose `load_point_cloud` blocks until the test opens the gate, then
/// behaves like the reference processor over a sphere. Every call is recorded.
pub struct GateProcessor {
    inner: ReferenceProcessor,
    gate: mpsc::Receiver<()>,
    pub calls: Arc<Mutex<Vec<&'static str>>>,
}

impl GateProcessor {
    pub fn new() -> (Self, mpsc::Sender<()>, Arc<Mutex<Vec<&'static str>>>) {
        let (gate_tx, gate_rx) = mpsc::channel();
        let calls = Arc::new(Mutex::new(Vec::new()));
        let processor = Self {
            inner: ReferenceProcessor::new(),
            gate: gate_rx,
            calls: calls.clone(),
        };
        (processor, gate_tx, calls)
    }

    fn record(&self, call: &'static str) {
        self.calls.lock().unwrap().push(call);
    }
}

impl GeometryProcessor for GateProcessor {
    fn load_point_cloud(&mut self, _path: &Utf8Path) -> GeometryResult<()> {
        self.record("load");
        self.gate
            .recv()
            .map_err(|_| GeometryError::InvalidParameters("gate dropped".to_string()))?;
        self.inner = ReferenceProcessor::with_point_cloud(PointCloud::new(sphere_points(
            2000, 1.0,
        )));
        Ok(())
    }

    fn estimate_normals(&mut self, method: NormalMethod) -> GeometryResult<()> {
        self.record("normals");
        self.inner.estimate_normals(method)
    }

    fn reconstruct(&mut self, method: &ReconstructionMethod) -> GeometryResult<()> {
        self.record("reconstruct");
        self.inner.reconstruct(method)
    }

    fn downsample(&mut self, params: &DownsampleParams) -> GeometryResult<()> {
        self.record("downsample");
        self.inner.downsample(params)
    }

    fn filter_region(&mut self, filter: &RegionFilter) -> GeometryResult<()> {
        self.record("filter");
        self.inner.filter_region(filter)
    }

    fn post_process_mesh(&mut self, params: &PostProcessParams) -> GeometryResult<()> {
        self.record("post-process");
        self.inner.post_process_mesh(params)
    }

    fn export_mesh(&mut self, path: &Utf8Path, with_normals: bool) -> GeometryResult<()> {
        self.record("export");
        self.inner.export_mesh(path, with_normals)
    }

    fn point_cloud(&self) -> &PointCloud {
        self.inner.point_cloud()
    }

    fn mesh(&self) -> &TriangleMesh {
        self.inner.mesh()
    }
}

/// Processor that panics on every downsample and otherwise wraps the reference one.
#[derive(Default)]
pub struct PanickyProcessor {
    inner: ReferenceProcessor,
}

impl GeometryProcessor for PanickyProcessor {
    fn load_point_cloud(&mut self, path: &Utf8Path) -> GeometryResult<()> {
        self.inner.load_point_cloud(path)
    }

    fn estimate_normals(&mut self, method: NormalMethod) -> GeometryResult<()> {
        self.inner.estimate_normals(method)
    }

    fn reconstruct(&mut self, method: &ReconstructionMethod) -> GeometryResult<()> {
        self.inner.reconstruct(method)
    }

    fn downsample(&mut self, _params: &DownsampleParams) -> GeometryResult<()> {
        panic!("voxel grid exploded");
    }

    fn filter_region(&mut self, filter: &RegionFilter) -> GeometryResult<()> {
        self.inner.filter_region(filter)
    }

    fn post_process_mesh(&mut self, params: &PostProcessParams) -> GeometryResult<()> {
        self.inner.post_process_mesh(params)
    }

    fn export_mesh(&mut self, path: &Utf8Path, with_normals: bool) -> GeometryResult<()> {
        self.inner.export_mesh(path, with_normals)
    }

    fn point_cloud(&self) -> &PointCloud {
        self.inner.point_cloud()
    }

    fn mesh(&self) -> &TriangleMesh {
        self.inner.mesh()
    }
}
