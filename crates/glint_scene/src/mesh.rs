//! Triangle mesh geometry for the Glint scene graph.
//!
//! Meshes are stored in their local frame and shared between scene nodes
//! through `Arc`, so a mesh placed several times is flattened into the
//! acceleration structure only once.

use std::path::Path;

use glint_math::{Aabb, Vec3};

use crate::error::{SceneError, SceneResult};

/// A mesh consisting of vertex positions, optional normals, and triangle indices.
#[derive(Clone, Debug)]
pub struct Mesh {
    /// Vertex positions (one Vec3 per vertex)
    pub positions: Vec<Vec3>,

    /// Vertex normals (optional, flat shading is used when absent)
    pub normals: Option<Vec<Vec3>>,

    /// Triangle indices (every 3 indices form a triangle, counter-clockwise)
    pub indices: Vec<u32>,

    /// Axis-aligned bounding box in the mesh's local frame
    pub bounds: Aabb,
}

impl Mesh {
    /// Create a new mesh from positions and indices, optionally with normals.
    pub fn new(positions: Vec<Vec3>, indices: Vec<u32>, normals: Option<Vec<Vec3>>) -> Self {
        let bounds = Self::compute_bounds(&positions);
        Self {
            positions,
            normals,
            indices,
            bounds,
        }
    }

    /// Load the first model of an OBJ file.
    pub fn load_obj<P: AsRef<Path>>(path: P) -> SceneResult<Self> {
        let path = path.as_ref();
        let (models, _materials) = tobj::load_obj(
            path,
            &tobj::LoadOptions {
                single_index: true,
                triangulate: true,
                ..Default::default()
            },
        )
        .map_err(|source| SceneError::Obj {
            path: path.to_path_buf(),
            source,
        })?;

        let model = models
            .first()
            .ok_or_else(|| SceneError::NoGeometry(path.to_path_buf()))?;
        let mesh = &model.mesh;

        let positions: Vec<Vec3> = mesh
            .positions
            .chunks_exact(3)
            .map(|p| Vec3::new(p[0], p[1], p[2]))
            .collect();

        let normals = if mesh.normals.len() == mesh.positions.len() {
            Some(
                mesh.normals
                    .chunks_exact(3)
                    .map(|n| Vec3::new(n[0], n[1], n[2]).normalize_or_zero())
                    .collect(),
            )
        } else {
            None
        };

        log::info!(
            "Loaded OBJ {:?}: {} vertices, {} triangles",
            path,
            positions.len(),
            mesh.indices.len() / 3
        );

        Ok(Self::new(positions, mesh.indices.clone(), normals))
    }

    /// Compute axis-aligned bounding box from positions.
    fn compute_bounds(positions: &[Vec3]) -> Aabb {
        if positions.is_empty() {
            return Aabb::EMPTY;
        }

        let (min, max) = positions.iter().fold(
            (Vec3::splat(f32::INFINITY), Vec3::splat(f32::NEG_INFINITY)),
            |(lo, hi), p| (lo.min(*p), hi.max(*p)),
        );

        Aabb::from_points(min, max)
    }

    /// Compute smooth vertex normals by averaging face normals.
    pub fn compute_normals(&mut self) {
        let vertex_count = self.positions.len();
        let mut normals = vec![Vec3::ZERO; vertex_count];

        for [i0, i1, i2] in self.triangle_indices() {
            let p0 = self.positions[i0];
            let face_normal = (self.positions[i1] - p0).cross(self.positions[i2] - p0);

            normals[i0] += face_normal;
            normals[i1] += face_normal;
            normals[i2] += face_normal;
        }

        for normal in &mut normals {
            *normal = normal.try_normalize().unwrap_or(Vec3::Y);
        }

        self.normals = Some(normals);
    }

    /// Check if the mesh has normals.
    pub fn has_normals(&self) -> bool {
        self.normals.is_some()
    }

    /// Get the number of triangles in the mesh.
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Get the number of vertices in the mesh.
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    /// Iterate over valid triangles as vertex index triplets.
    ///
    /// Triangles referencing missing vertices are skipped with a warning.
    pub fn triangle_indices(&self) -> impl Iterator<Item = [usize; 3]> + '_ {
        let vertex_count = self.positions.len();
        self.indices.chunks_exact(3).filter_map(move |chunk| {
            let tri = [chunk[0] as usize, chunk[1] as usize, chunk[2] as usize];
            if tri.iter().any(|&i| i >= vertex_count) {
                log::warn!(
                    "Invalid triangle indices: {:?}, vertex count: {}",
                    tri,
                    vertex_count
                );
                return None;
            }
            Some(tri)
        })
    }
}
