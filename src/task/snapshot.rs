use crate::geometry::{PointCloud, TriangleMesh};
use crate::models::{MeshSnapshot, PointCloudSnapshot};

/// Copy the processor's live point cloud into an immutable snapshot.
pub fn point_cloud_snapshot(cloud: &PointCloud) -> PointCloudSnapshot {
    let positions = cloud.points.iter().map(|p| p.to_array()).collect();
    let normals = cloud
        .has_normals()
        .then(|| cloud.normals.iter().map(|n| n.to_array()).collect());
    PointCloudSnapshot::new(positions, normals)
}

/// Copy the processor's live mesh into an immutable snapshot. Faces that are not
/// triangles are left out.
pub fn mesh_snapshot(mesh: &TriangleMesh) -> MeshSnapshot {
    let vertices = mesh.vertices.iter().map(|v| v.to_array()).collect();
    let normals = mesh
        .has_normals()
        .then(|| mesh.normals.iter().map(|n| n.to_array()).collect());
    let triangles = mesh
        .faces
        .iter()
        .filter(|face| face.len() == 3)
        .map(|face| [face[0], face[1], face[2]]);
    MeshSnapshot::new(vertices, normals, triangles)
}
