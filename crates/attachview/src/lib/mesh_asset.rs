//! glTF decoding into plain mesh data
//!
//! Decoding happens on a worker thread, so the output is plain vectors that
//! the viewer turns into Bevy meshes once it is back on the main schedule.
//! Both the JSON (`.gltf`) and binary (`.glb`) containers are accepted.
//! Buffers may be embedded as base64 `data:` URIs, live in the GLB blob, or
//! be separate files that the caller resolves.

use base64::Engine;
use bevy::log::warn;
use bevy::math::{Mat4, Vec3};
use gltf::buffer::Source;
use gltf::mesh::Mode;

use super::geometry::{fit, Bounds, GeometryError};

#[derive(Debug, thiserror::Error)]
pub enum MeshDecodeError {
    #[error("invalid glTF: {0}")]
    Gltf(#[from] gltf::Error),
    #[error("GLB binary chunk missing for buffer {0}")]
    MissingBlob(usize),
    #[error("unsupported data URI for buffer {index}")]
    UnsupportedDataUri { index: usize },
    #[error("invalid base64 in buffer {index}: {source}")]
    Base64 {
        index: usize,
        source: base64::DecodeError,
    },
    #[error("buffer {index} holds {actual} bytes, expected {expected}")]
    BufferTooShort {
        index: usize,
        expected: usize,
        actual: usize,
    },
    #[error("failed to fetch external buffer '{uri}': {reason}")]
    ExternalBuffer { uri: String, reason: String },
    #[error("glTF contains no triangle geometry")]
    NoGeometry,
}

/// One drawable primitive with its world transform
#[derive(Debug, Clone)]
pub struct MeshPart {
    pub name: Option<String>,
    pub positions: Vec<[f32; 3]>,
    pub normals: Vec<[f32; 3]>,
    pub indices: Vec<u32>,
    pub base_color: [f32; 4],
    pub metallic: f32,
    pub roughness: f32,
    pub double_sided: bool,
    pub transform: Mat4,
}

/// Decoded asset and its bounds in asset space
#[derive(Debug, Clone)]
pub struct MeshAsset {
    pub parts: Vec<MeshPart>,
    pub bounds: Bounds,
}

impl MeshAsset {
    pub fn vertex_count(&self) -> usize {
        self.parts.iter().map(|p| p.positions.len()).sum()
    }

    pub fn triangle_count(&self) -> usize {
        self.parts.iter().map(|p| p.indices.len() / 3).sum()
    }

    /// Uniform scale and offset so that the largest dimension equals
    /// `target_extent` and the bounds center lands on the origin.
    pub fn fit_transform(&self, target_extent: f32) -> Result<(f32, Vec3), GeometryError> {
        let (scale, center) = fit(&self.bounds, target_extent)?;
        Ok((scale, -center * scale))
    }
}

/// Decode a glTF or GLB payload. `resolve_uri` fetches buffers referenced by
/// relative URI.
pub fn decode_gltf<F>(bytes: &[u8], mut resolve_uri: F) -> Result<MeshAsset, MeshDecodeError>
where
    F: FnMut(&str) -> Result<Vec<u8>, MeshDecodeError>,
{
    let gltf::Gltf { document, mut blob } = gltf::Gltf::from_slice(bytes)?;

    let mut buffers = Vec::with_capacity(document.buffers().len());
    for buffer in document.buffers() {
        let index = buffer.index();
        let data = match buffer.source() {
            Source::Bin => blob.take().ok_or(MeshDecodeError::MissingBlob(index))?,
            Source::Uri(uri) => match uri.strip_prefix("data:") {
                Some(data_uri) => decode_data_uri(index, data_uri)?,
                None => resolve_uri(uri)?,
            },
        };
        if data.len() < buffer.length() {
            return Err(MeshDecodeError::BufferTooShort {
                index,
                expected: buffer.length(),
                actual: data.len(),
            });
        }
        buffers.push(data);
    }

    let mut parts = Vec::new();
    match document.default_scene().or_else(|| document.scenes().next()) {
        Some(scene) => {
            for node in scene.nodes() {
                collect_node(&node, Mat4::IDENTITY, &buffers, &mut parts);
            }
        }
        None => {
            // No scene graph: take meshes as-is
            for mesh in document.meshes() {
                collect_mesh(&mesh, Mat4::IDENTITY, &buffers, &mut parts);
            }
        }
    }

    let bounds = Bounds::from_points(parts.iter().flat_map(|part| {
        part.positions
            .iter()
            .map(move |p| part.transform.transform_point3(Vec3::from_array(*p)))
    }))
    .ok_or(MeshDecodeError::NoGeometry)?;

    Ok(MeshAsset { parts, bounds })
}

fn decode_data_uri(index: usize, data_uri: &str) -> Result<Vec<u8>, MeshDecodeError> {
    let (meta, payload) = data_uri
        .split_once(',')
        .ok_or(MeshDecodeError::UnsupportedDataUri { index })?;
    if !meta.ends_with(";base64") {
        return Err(MeshDecodeError::UnsupportedDataUri { index });
    }
    base64::engine::general_purpose::STANDARD
        .decode(payload)
        .map_err(|source| MeshDecodeError::Base64 { index, source })
}

fn collect_node(node: &gltf::Node, parent: Mat4, buffers: &[Vec<u8>], parts: &mut Vec<MeshPart>) {
    let world = parent * Mat4::from_cols_array_2d(&node.transform().matrix());
    if let Some(mesh) = node.mesh() {
        collect_mesh(&mesh, world, buffers, parts);
    }
    for child in node.children() {
        collect_node(&child, world, buffers, parts);
    }
}

fn collect_mesh(mesh: &gltf::Mesh, transform: Mat4, buffers: &[Vec<u8>], parts: &mut Vec<MeshPart>) {
    for primitive in mesh.primitives() {
        if primitive.mode() != Mode::Triangles {
            warn!(
                "Skipping primitive {} of mesh {:?}: mode {:?} is not supported",
                primitive.index(),
                mesh.name(),
                primitive.mode()
            );
            continue;
        }

        let reader = primitive.reader(|buffer| buffers.get(buffer.index()).map(Vec::as_slice));
        let Some(positions) = reader.read_positions() else {
            warn!("Skipping primitive without positions in mesh {:?}", mesh.name());
            continue;
        };
        let positions: Vec<[f32; 3]> = positions.collect();
        if positions.is_empty() {
            continue;
        }

        let indices: Vec<u32> = match reader.read_indices() {
            Some(indices) => indices.into_u32().collect(),
            None => (0..positions.len() as u32).collect(),
        };

        let normals = match reader.read_normals() {
            Some(normals) => normals.collect(),
            None => compute_normals(&positions, &indices),
        };

        let material = primitive.material();
        let pbr = material.pbr_metallic_roughness();

        parts.push(MeshPart {
            name: mesh.name().map(str::to_string),
            positions,
            normals,
            indices,
            base_color: pbr.base_color_factor(),
            metallic: pbr.metallic_factor(),
            roughness: pbr.roughness_factor(),
            double_sided: material.double_sided(),
            transform,
        });
    }
}

/// Area-weighted vertex normals from triangle faces
pub fn compute_normals(positions: &[[f32; 3]], indices: &[u32]) -> Vec<[f32; 3]> {
    let mut accumulated = vec![Vec3::ZERO; positions.len()];
    for tri in indices.chunks_exact(3) {
        let [a, b, c] = [tri[0] as usize, tri[1] as usize, tri[2] as usize];
        if a >= positions.len() || b >= positions.len() || c >= positions.len() {
            continue;
        }
        let pa = Vec3::from_array(positions[a]);
        let pb = Vec3::from_array(positions[b]);
        let pc = Vec3::from_array(positions[c]);
        let face = (pb - pa).cross(pc - pa);
        accumulated[a] += face;
        accumulated[b] += face;
        accumulated[c] += face;
    }
    accumulated
        .into_iter()
        .map(|n| n.try_normalize().unwrap_or(Vec3::Y).to_array())
        .collect()
}
