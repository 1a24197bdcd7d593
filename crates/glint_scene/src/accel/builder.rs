//! Flattens a [`Scene`] into an [`AcceleratedScene`].
//!
//! The top-level tree is a median-split hierarchy over shape nodes (sorted by
//! centroid along the longest axis). Each distinct mesh gets one axis-split
//! BSP; meshes placed several times share their triangles and BSP.

use std::collections::HashMap;
use std::sync::Arc;

use glint_math::{Aabb, Mat4, Mat4Ext};
use rayon::prelude::*;

use super::{AccelNode, AcceleratedScene, BspNode, Triangle};
use crate::error::AccelError;
use crate::mesh::Mesh;
use crate::scene::{Material, Scene, Shape};

/// Tunables for the acceleration builder.
#[derive(Debug, Clone)]
pub struct BuildConfig {
    /// Maximum triangles per BSP leaf before splitting.
    pub leaf_size: usize,
    /// BSP depth at which leaves are forced regardless of size.
    pub max_bsp_depth: usize,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            leaf_size: 4,
            max_bsp_depth: 24,
        }
    }
}

/// One shape node, ready to be placed in the top-level tree.
struct Item {
    world_bounds: Aabb,
    local_bounds: Aabb,
    inv_transform: Mat4,
    primitive: AccelNode,
}

/// Build the flattened acceleration structure for a scene.
///
/// The scene's world transforms must be current
/// (see [`Scene::update_world_transforms`]).
pub fn build(scene: &Scene, config: &BuildConfig) -> Result<AcceleratedScene, AccelError> {
    let mut materials: Vec<Material> = scene.materials.iter().map(Material::sanitized).collect();
    if materials.is_empty() {
        materials.push(Material::default());
    }

    let mut triangles = Vec::new();
    let mut triangle_indices = Vec::new();
    let mut bsp_nodes = Vec::new();
    let mut mesh_roots: HashMap<*const Mesh, u32> = HashMap::new();

    let mut items = Vec::new();
    for node in scene.shape_nodes() {
        let Some(shape) = &node.shape else { continue };

        let material = if node.material < materials.len() {
            node.material as u32
        } else {
            log::warn!(
                "Node '{}' references missing material {}, using material 0",
                node.name,
                node.material
            );
            0
        };

        let world = node.world_matrix();
        let inv_transform = world.inverse();
        if !inv_transform.is_finite() {
            log::warn!("Node '{}' has a singular transform, skipping", node.name);
            continue;
        }

        let local_bounds = shape.local_bounds();
        if local_bounds.is_empty() {
            continue;
        }

        let primitive = match shape {
            Shape::Sphere => AccelNode::Sphere {
                inv_transform,
                material,
            },
            Shape::Box => AccelNode::Box {
                inv_transform,
                material,
            },
            Shape::Cylinder => AccelNode::Cylinder {
                inv_transform,
                material,
            },
            Shape::Mesh(mesh) => {
                let key = Arc::as_ptr(mesh);
                let bsp_root = match mesh_roots.get(&key) {
                    Some(&root) => root,
                    None => {
                        let root = build_mesh_bsp(
                            mesh,
                            config,
                            &mut triangles,
                            &mut triangle_indices,
                            &mut bsp_nodes,
                        );
                        mesh_roots.insert(key, root);
                        root
                    }
                };
                AccelNode::Triangles {
                    bounds: local_bounds,
                    inv_transform,
                    bsp_root,
                    material,
                }
            }
        };

        items.push(Item {
            world_bounds: world.transform_aabb(&local_bounds),
            local_bounds,
            inv_transform,
            primitive,
        });
    }

    let mut nodes = Vec::with_capacity(items.len() * 3);
    if !items.is_empty() {
        emit_tree(&mut items, &mut nodes);
    }

    log::info!(
        "Built acceleration structure: {} nodes, {} triangles, {} BSP nodes, {} materials",
        nodes.len(),
        triangles.len(),
        bsp_nodes.len(),
        materials.len()
    );

    AcceleratedScene::new(nodes, triangles, triangle_indices, bsp_nodes, materials)
}

/// Emit a subtree for `items` in preorder and return its root index.
fn emit_tree(items: &mut [Item], nodes: &mut Vec<AccelNode>) -> u32 {
    let index = nodes.len() as u32;

    if let [item] = items {
        nodes.push(AccelNode::Geometry {
            bounds: item.local_bounds,
            inv_transform: item.inv_transform,
            second_child: None,
        });
        nodes.push(item.primitive);
        return index;
    }

    let bounds = items
        .iter()
        .fold(Aabb::EMPTY, |acc, item| Aabb::surrounding(&acc, &item.world_bounds));

    let centroid_bounds = items.iter().fold(Aabb::EMPTY, |acc, item| {
        let c = item.world_bounds.centroid();
        Aabb::surrounding(&acc, &Aabb::from_points(c, c))
    });
    let axis = centroid_bounds.longest_axis();

    items.sort_unstable_by(|a, b| {
        let a_val = a.world_bounds.centroid()[axis];
        let b_val = b.world_bounds.centroid()[axis];
        a_val.total_cmp(&b_val)
    });

    nodes.push(AccelNode::Group {
        bounds,
        inv_transform: Mat4::IDENTITY,
        second_child: None,
    });

    let mid = items.len() / 2;
    let (left, right) = items.split_at_mut(mid);
    emit_tree(left, nodes);
    let right_root = emit_tree(right, nodes);

    if let AccelNode::Group { second_child, .. } = &mut nodes[index as usize] {
        *second_child = Some(right_root);
    }

    index
}

/// Append a mesh's triangles and BSP, returning the BSP root index.
fn build_mesh_bsp(
    mesh: &Mesh,
    config: &BuildConfig,
    triangles: &mut Vec<Triangle>,
    triangle_indices: &mut Vec<u32>,
    bsp_nodes: &mut Vec<BspNode>,
) -> u32 {
    let base = triangles.len() as u32;
    triangles.extend(mesh.triangle_indices().map(|[i0, i1, i2]| Triangle {
        vertices: [mesh.positions[i0], mesh.positions[i1], mesh.positions[i2]],
        normals: mesh.normals.as_ref().and_then(|normals| {
            (normals.len() == mesh.positions.len()).then(|| [normals[i0], normals[i1], normals[i2]])
        }),
    }));

    let tri_bounds: Vec<Aabb> = triangles[base as usize..]
        .par_iter()
        .map(Triangle::bounds)
        .collect();

    let mut builder = BspBuilder {
        base,
        tri_bounds: &tri_bounds,
        config,
        triangle_indices,
        bsp_nodes,
    };
    let ids: Vec<u32> = (0..tri_bounds.len() as u32).collect();
    builder.emit(ids, 0)
}

struct BspBuilder<'a> {
    base: u32,
    tri_bounds: &'a [Aabb],
    config: &'a BuildConfig,
    triangle_indices: &'a mut Vec<u32>,
    bsp_nodes: &'a mut Vec<BspNode>,
}

impl BspBuilder<'_> {
    /// Emit a BSP subtree over mesh-relative triangle ids; returns its index.
    fn emit(&mut self, ids: Vec<u32>, depth: usize) -> u32 {
        if ids.len() <= self.config.leaf_size || depth >= self.config.max_bsp_depth {
            return self.leaf(&ids);
        }

        let centroid_bounds = ids.iter().fold(Aabb::EMPTY, |acc, &id| {
            let c = self.tri_bounds[id as usize].centroid();
            Aabb::surrounding(&acc, &Aabb::from_points(c, c))
        });
        let axis = centroid_bounds.longest_axis();

        let mut centroids: Vec<f32> = ids
            .iter()
            .map(|&id| self.tri_bounds[id as usize].centroid()[axis])
            .collect();
        let mid = centroids.len() / 2;
        let (_, &mut position, _) = centroids.select_nth_unstable_by(mid, f32::total_cmp);

        let mut below = Vec::with_capacity(ids.len() / 2 + 1);
        let mut above = Vec::with_capacity(ids.len() / 2 + 1);
        for &id in &ids {
            let extent = self.tri_bounds[id as usize].axis_interval(axis);
            if extent.min < position || (extent.min == position && extent.max == position) {
                below.push(id);
            }
            if extent.max > position {
                above.push(id);
            }
        }

        // Straddlers land on both sides; stop when a split makes no progress.
        if below.is_empty() || above.is_empty() || below.len() == ids.len() && above.len() == ids.len() {
            return self.leaf(&ids);
        }

        let index = self.bsp_nodes.len() as u32;
        self.bsp_nodes.push(BspNode::Split {
            axis: axis as u8,
            position,
            above: 0,
        });
        self.emit(below, depth + 1);
        let above_index = self.emit(above, depth + 1);
        if let BspNode::Split { above, .. } = &mut self.bsp_nodes[index as usize] {
            *above = above_index;
        }
        index
    }

    fn leaf(&mut self, ids: &[u32]) -> u32 {
        let index = self.bsp_nodes.len() as u32;
        self.bsp_nodes.push(BspNode::Leaf {
            offset: self.triangle_indices.len() as u32,
            count: ids.len() as u32,
        });
        self.triangle_indices
            .extend(ids.iter().map(|&id| self.base + id));
        index
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{Node, Transform};
    use glint_math::{Color, Vec3};

    fn grid_mesh(n: usize) -> Arc<Mesh> {
        // n x n quads in the XY plane, two triangles each.
        let mut positions = Vec::new();
        for y in 0..=n {
            for x in 0..=n {
                positions.push(Vec3::new(x as f32, y as f32, 0.0));
            }
        }
        let row = (n + 1) as u32;
        let mut indices = Vec::new();
        for y in 0..n as u32 {
            for x in 0..n as u32 {
                let i = y * row + x;
                indices.extend_from_slice(&[i, i + 1, i + row, i + 1, i + row + 1, i + row]);
            }
        }
        Arc::new(Mesh::new(positions, indices, None))
    }

    #[test]
    fn test_build_empty_scene() {
        let scene = Scene::new("empty");
        let accel = build(&scene, &BuildConfig::default()).unwrap();
        assert!(accel.is_empty());
        assert_eq!(accel.materials().len(), 1);
    }

    #[test]
    fn test_single_sphere_layout() {
        let mut scene = Scene::new("one");
        let m = scene.add_material(Material::light(Color::ONE));
        scene.add_node(Node::shape("s", Shape::Sphere, m, Transform::default()));
        scene.update_world_transforms();

        let accel = build(&scene, &BuildConfig::default()).unwrap();
        let nodes = accel.nodes();
        assert_eq!(nodes.len(), 2);
        assert!(matches!(nodes[0], AccelNode::Geometry { second_child: None, .. }));
        assert!(matches!(nodes[1], AccelNode::Sphere { material: 0, .. }));
    }

    #[test]
    fn test_group_tree_covers_every_item() {
        let _ = env_logger::builder().is_test(true).try_init();

        let mut scene = Scene::new("row");
        let m = scene.add_material(Material::default());
        for i in 0..7 {
            scene.add_node(Node::shape(
                format!("s{i}"),
                Shape::Sphere,
                m,
                Transform::from_translation(Vec3::new(i as f32 * 3.0, 0.0, 0.0)),
            ));
        }
        scene.update_world_transforms();

        let accel = build(&scene, &BuildConfig::default()).unwrap();
        let spheres = accel
            .nodes()
            .iter()
            .filter(|n| matches!(n, AccelNode::Sphere { .. }))
            .count();
        let groups = accel
            .nodes()
            .iter()
            .filter(|n| matches!(n, AccelNode::Group { .. }))
            .count();
        assert_eq!(spheres, 7);
        // A binary tree over 7 leaves has 6 interior nodes.
        assert_eq!(groups, 6);

        // The root group bounds every sphere.
        match accel.nodes()[0] {
            AccelNode::Group { bounds, second_child, .. } => {
                assert!(second_child.is_some());
                assert!(bounds.x.min <= -1.0 && bounds.x.max >= 19.0);
            }
            other => panic!("root should be a group, got {other:?}"),
        }
    }

    #[test]
    fn test_mesh_bsp_references_every_triangle() {
        let mut scene = Scene::new("grid");
        let m = scene.add_material(Material::default());
        let mesh = grid_mesh(8);
        scene.add_node(Node::shape("grid", Shape::Mesh(mesh.clone()), m, Transform::default()));
        scene.update_world_transforms();

        let accel = build(&scene, &BuildConfig::default()).unwrap();
        assert_eq!(accel.triangles().len(), mesh.triangle_count());
        assert!(accel.bsp_nodes().len() > 1);

        let mut seen = vec![false; accel.triangles().len()];
        for &t in accel.triangle_indices() {
            seen[t as usize] = true;
        }
        assert!(seen.iter().all(|&s| s));
    }

    #[test]
    fn test_instanced_mesh_is_flattened_once() {
        let mut scene = Scene::new("instances");
        let m = scene.add_material(Material::default());
        let mesh = grid_mesh(2);
        for i in 0..3 {
            scene.add_node(Node::shape(
                format!("grid{i}"),
                Shape::Mesh(mesh.clone()),
                m,
                Transform::from_translation(Vec3::new(0.0, 0.0, i as f32 * 2.0)),
            ));
        }
        scene.update_world_transforms();

        let accel = build(&scene, &BuildConfig::default()).unwrap();
        assert_eq!(accel.triangles().len(), mesh.triangle_count());

        let roots: Vec<u32> = accel
            .nodes()
            .iter()
            .filter_map(|n| match n {
                AccelNode::Triangles { bsp_root, .. } => Some(*bsp_root),
                _ => None,
            })
            .collect();
        assert_eq!(roots.len(), 3);
        assert!(roots.iter().all(|&r| r == roots[0]));
    }

    #[test]
    fn test_missing_material_falls_back_to_zero() {
        let mut scene = Scene::new("bad material");
        scene.add_material(Material::default());
        scene.add_node(Node::shape("s", Shape::Box, 42, Transform::default()));
        scene.update_world_transforms();

        let accel = build(&scene, &BuildConfig::default()).unwrap();
        assert!(matches!(accel.nodes()[1], AccelNode::Box { material: 0, .. }));
    }
}
