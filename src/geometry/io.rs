//! Plain-text point cloud import and mesh export.
//!
//! Supported inputs: whitespace separated `.xyz`/`.txt`/`.pts` (3 or 6 columns, `#` comments)
//! and the vertex part of `.obj`. Mesh export writes `.obj` or ASCII `.ply`.

use super::{GeometryError, GeometryResult, PointCloud, TriangleMesh};
use camino::Utf8Path;
use glam::Vec3;
use std::fs;
use std::io::{BufWriter, Write};

/// Read a point cloud, picking the parser from the file extension.
pub fn read_point_cloud(path: &Utf8Path) -> GeometryResult<PointCloud> {
    let extension = path.extension().map(str::to_ascii_lowercase);
    let text = fs::read_to_string(path).map_err(|e| GeometryError::io(path, e))?;

    let cloud = match extension.as_deref() {
        Some("xyz" | "txt" | "pts") => parse_xyz(path, &text)?,
        Some("obj") => parse_obj_vertices(path, &text)?,
        _ => return Err(GeometryError::UnsupportedFormat(path.to_path_buf())),
    };

    if cloud.is_empty() {
        return Err(GeometryError::EmptyPointCloud);
    }
    Ok(cloud)
}

fn parse_floats(path: &Utf8Path, line_no: usize, fields: &[&str]) -> GeometryResult<Vec<f32>> {
    fields
        .iter()
        .map(|f| {
            f.parse::<f32>().map_err(|e| GeometryError::Parse {
                path: path.to_path_buf(),
                line: line_no,
                message: format!("'{f}': {e}"),
            })
        })
        .collect()
}

fn parse_xyz(path: &Utf8Path, text: &str) -> GeometryResult<PointCloud> {
    let mut points = Vec::new();
    let mut normals = Vec::new();

    for (index, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let fields: Vec<&str> = line.split_whitespace().collect();
        let values = parse_floats(path, index + 1, &fields)?;
        match values.len() {
            3 => points.push(Vec3::new(values[0], values[1], values[2])),
            6 => {
                points.push(Vec3::new(values[0], values[1], values[2]));
                normals.push(Vec3::new(values[3], values[4], values[5]));
            }
            n => {
                return Err(GeometryError::Parse {
                    path: path.to_path_buf(),
                    line: index + 1,
                    message: format!("expected 3 or 6 values, found {n}"),
                });
            }
        }
    }

    if normals.len() != points.len() {
        normals.clear();
    }
    Ok(PointCloud::with_normals(points, normals))
}

fn parse_obj_vertices(path: &Utf8Path, text: &str) -> GeometryResult<PointCloud> {
    let mut points = Vec::new();
    let mut normals = Vec::new();

    for (index, line) in text.lines().enumerate() {
        let mut fields = line.split_whitespace();
        let target = match fields.next() {
            Some("v") => &mut points,
            Some("vn") => &mut normals,
            _ => continue,
        };
        let fields: Vec<&str> = fields.take(3).collect();
        if fields.len() < 3 {
            return Err(GeometryError::Parse {
                path: path.to_path_buf(),
                line: index + 1,
                message: "vertex needs three coordinates".to_string(),
            });
        }
        let values = parse_floats(path, index + 1, &fields)?;
        target.push(Vec3::new(values[0], values[1], values[2]));
    }

    if normals.len() != points.len() {
        normals.clear();
    }
    Ok(PointCloud::with_normals(points, normals))
}

/// Write `mesh` as OBJ or ASCII PLY depending on the extension of `path`.
///
/// Normals are written only when `with_normals` is set and the mesh has one per vertex.
pub fn write_mesh(path: &Utf8Path, mesh: &TriangleMesh, with_normals: bool) -> GeometryResult<()> {
    let extension = path.extension().map(str::to_ascii_lowercase);
    let write_body = match extension.as_deref() {
        Some("obj") => write_obj,
        Some("ply") => write_ply,
        _ => return Err(GeometryError::UnsupportedFormat(path.to_path_buf())),
    };
    let write_normals = with_normals && mesh.has_normals();

    let file = fs::File::create(path).map_err(|e| GeometryError::io(path, e))?;
    let mut out = BufWriter::new(file);
    write_body(&mut out, mesh, write_normals)
        .and_then(|_| out.flush())
        .map_err(|e| GeometryError::io(path, e))
}

fn write_obj(out: &mut dyn Write, mesh: &TriangleMesh, write_normals: bool) -> std::io::Result<()> {
    for v in &mesh.vertices {
        writeln!(out, "v {} {} {}", v.x, v.y, v.z)?;
    }
    if write_normals {
        for n in &mesh.normals {
            writeln!(out, "vn {} {} {}", n.x, n.y, n.z)?;
        }
    }
    for face in &mesh.faces {
        write!(out, "f")?;
        for &i in face {
            // OBJ indices are 1-based
            if write_normals {
                write!(out, " {0}//{0}", i + 1)?;
            } else {
                write!(out, " {}", i + 1)?;
            }
        }
        writeln!(out)?;
    }
    Ok(())
}

fn write_ply(out: &mut dyn Write, mesh: &TriangleMesh, write_normals: bool) -> std::io::Result<()> {
    writeln!(out, "ply")?;
    writeln!(out, "format ascii 1.0")?;
    writeln!(out, "element vertex {}", mesh.vertices.len())?;
    writeln!(out, "property float x")?;
    writeln!(out, "property float y")?;
    writeln!(out, "property float z")?;
    if write_normals {
        writeln!(out, "property float nx")?;
        writeln!(out, "property float ny")?;
        writeln!(out, "property float nz")?;
    }
    writeln!(out, "element face {}", mesh.faces.len())?;
    writeln!(out, "property list uchar int vertex_indices")?;
    writeln!(out, "end_header")?;

    for (i, v) in mesh.vertices.iter().enumerate() {
        if write_normals {
            let n = mesh.normals[i];
            writeln!(out, "{} {} {} {} {} {}", v.x, v.y, v.z, n.x, n.y, n.z)?;
        } else {
            writeln!(out, "{} {} {}", v.x, v.y, v.z)?;
        }
    }
    for face in &mesh.faces {
        write!(out, "{}", face.len())?;
        for &i in face {
            write!(out, " {i}")?;
        }
        writeln!(out)?;
    }
    Ok(())
}
