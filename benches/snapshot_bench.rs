//! Benchmarks for the work done on the task worker after each operation.
//!
//! Run with: cargo bench --bench snapshot_bench

use criterion::{BatchSize, Criterion, Throughput, criterion_group, criterion_main};
use glam::Vec3;
use pointmesh::geometry::{GeometryProcessor, PointCloud, ReferenceProcessor};
use pointmesh::models::{DownsampleParams, ReconstructionMethod, SurfaceNetsParams};
use pointmesh::task::{mesh_snapshot, point_cloud_snapshot};
use std::hint::black_box;

fn sphere(count: usize) -> PointCloud {
    let golden = std::f32::consts::PI * (3.0 - 5.0_f32.sqrt());
    let points: Vec<Vec3> = (0..count)
        .map(|i| {
            let y = 1.0 - 2.0 * (i as f32 + 0.5) / count as f32;
            let r = (1.0 - y * y).sqrt();
            let theta = golden * i as f32;
            Vec3::new(theta.cos() * r, y, theta.sin() * r)
        })
        .collect();
    let normals = points.clone();
    PointCloud::with_normals(points, normals)
}

fn bench_point_snapshot(c: &mut Criterion) {
    let mut group = c.benchmark_group("point_cloud_snapshot");
    for count in [10_000usize, 100_000] {
        let cloud = sphere(count);
        group.throughput(Throughput::Elements(count as u64));
        group.bench_function(format!("{count}"), |b| {
            b.iter(|| point_cloud_snapshot(black_box(&cloud)))
        });
    }
    group.finish();
}

fn bench_mesh_snapshot(c: &mut Criterion) {
    let mut processor = ReferenceProcessor::with_point_cloud(sphere(5_000));
    if processor
        .reconstruct(&ReconstructionMethod::SurfaceNets(SurfaceNetsParams {
            cell_size: Some(0.05),
            radius: Some(0.08),
        }))
        .is_err()
    {
        return;
    }
    let mesh = processor.mesh().clone();
    c.bench_function("mesh_snapshot", |b| {
        b.iter(|| mesh_snapshot(black_box(&mesh)))
    });
}

fn bench_downsample(c: &mut Criterion) {
    let cloud = sphere(100_000);
    let params = DownsampleParams { cell_size: 0.02 };
    c.bench_function("voxel_downsample_100k", |b| {
        b.iter_batched(
            || ReferenceProcessor::with_point_cloud(cloud.clone()),
            |mut processor| processor.downsample(black_box(&params)),
            BatchSize::LargeInput,
        )
    });
}

fn bench_surface_nets(c: &mut Criterion) {
    let cloud = sphere(2_000);
    let method = ReconstructionMethod::SurfaceNets(SurfaceNetsParams {
        cell_size: Some(0.1),
        radius: Some(0.15),
    });
    c.bench_function("surface_nets_2k", |b| {
        b.iter_batched(
            || ReferenceProcessor::with_point_cloud(cloud.clone()),
            |mut processor| processor.reconstruct(black_box(&method)),
            BatchSize::SmallInput,
        )
    });
}

criterion_group!(
    benches,
    bench_point_snapshot,
    bench_mesh_snapshot,
    bench_downsample,
    bench_surface_nets
);
criterion_main!(benches);
