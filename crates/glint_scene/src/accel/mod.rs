//! Flattened, read-only acceleration structure consumed by the path tracer.
//!
//! Everything lives in plain arrays addressed by `u32` indices:
//!
//! - [`AccelNode`]s form the top-level tree. A `Group`/`Geometry` node's first
//!   child is the next array slot; its second child (if any) is stored explicitly.
//! - [`BspNode`]s form one binary space partition per mesh. A `Split` node's
//!   "below" child is the next array slot; its "above" child is stored explicitly.
//! - BSP leaves reference spans of `triangle_indices`, which point into `triangles`.
//!
//! Because nothing holds a pointer, an `AcceleratedScene` can be shared across
//! threads behind an `Arc` without lifetime concerns.

mod builder;

pub use builder::{build, BuildConfig};

use glint_math::{Aabb, Mat4, Vec3};

use crate::error::AccelError;
use crate::scene::Material;

/// Capacity of the fixed traversal stack for the top-level tree.
pub const NODE_STACK_CAPACITY: usize = 64;

/// Capacity of the fixed traversal stack for a triangle BSP.
pub const BSP_STACK_CAPACITY: usize = 64;

/// Node of the top-level tree.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AccelNode {
    /// Culling volume over two subtrees. `bounds` are in the frame reached by
    /// `inv_transform` (identity for builder-produced groups).
    Group {
        bounds: Aabb,
        inv_transform: Mat4,
        second_child: Option<u32>,
    },
    /// Wraps one primitive subtree; `bounds` are in the primitive's local frame.
    Geometry {
        bounds: Aabb,
        inv_transform: Mat4,
        second_child: Option<u32>,
    },
    /// Unit sphere (radius 1 at the origin) in local space.
    Sphere { inv_transform: Mat4, material: u32 },
    /// Box spanning `[-1, 1]³` in local space.
    Box { inv_transform: Mat4, material: u32 },
    /// Closed cylinder of radius 1 along Y between `y = -1` and `y = 1`.
    Cylinder { inv_transform: Mat4, material: u32 },
    /// Local-space triangle mesh described by a BSP sub-tree.
    Triangles {
        bounds: Aabb,
        inv_transform: Mat4,
        bsp_root: u32,
        material: u32,
    },
}

impl AccelNode {
    /// Explicit second child of an interior node.
    pub fn second_child(&self) -> Option<u32> {
        match self {
            AccelNode::Group { second_child, .. } | AccelNode::Geometry { second_child, .. } => {
                *second_child
            }
            _ => None,
        }
    }

    /// True for `Group`/`Geometry`, whose first child is the next slot.
    pub fn is_interior(&self) -> bool {
        matches!(self, AccelNode::Group { .. } | AccelNode::Geometry { .. })
    }
}

/// Node of a triangle BSP.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BspNode {
    /// Span `offset..offset + count` of [`AcceleratedScene::triangle_indices`].
    Leaf { offset: u32, count: u32 },
    /// Axis-aligned split plane. The "below" child is the next slot.
    Split { axis: u8, position: f32, above: u32 },
}

/// Triangle in its mesh's local frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Triangle {
    pub vertices: [Vec3; 3],
    /// Per-vertex shading normals; flat shading when absent.
    pub normals: Option<[Vec3; 3]>,
}

impl Triangle {
    /// Geometric normal following the counter-clockwise winding.
    pub fn face_normal(&self) -> Vec3 {
        let [v0, v1, v2] = self.vertices;
        (v1 - v0).cross(v2 - v0).normalize_or_zero()
    }

    pub fn bounds(&self) -> Aabb {
        let [v0, v1, v2] = self.vertices;
        Aabb::from_points(v0.min(v1).min(v2), v0.max(v1).max(v2))
    }
}

/// Immutable flattened scene ready for tracing.
#[derive(Debug, Clone)]
pub struct AcceleratedScene {
    nodes: Vec<AccelNode>,
    triangles: Vec<Triangle>,
    triangle_indices: Vec<u32>,
    bsp_nodes: Vec<BspNode>,
    materials: Vec<Material>,
}

impl AcceleratedScene {
    /// Assemble and validate a flattened scene.
    ///
    /// Rejects dangling indices and trees too deep for the fixed traversal stacks.
    pub fn new(
        nodes: Vec<AccelNode>,
        triangles: Vec<Triangle>,
        triangle_indices: Vec<u32>,
        bsp_nodes: Vec<BspNode>,
        materials: Vec<Material>,
    ) -> Result<Self, AccelError> {
        let scene = Self {
            nodes,
            triangles,
            triangle_indices,
            bsp_nodes,
            materials,
        };
        scene.validate()?;
        Ok(scene)
    }

    /// A scene with no geometry; every ray misses.
    pub fn empty() -> Self {
        Self {
            nodes: Vec::new(),
            triangles: Vec::new(),
            triangle_indices: Vec::new(),
            bsp_nodes: Vec::new(),
            materials: vec![Material::default()],
        }
    }

    pub fn nodes(&self) -> &[AccelNode] {
        &self.nodes
    }

    pub fn triangles(&self) -> &[Triangle] {
        &self.triangles
    }

    pub fn triangle_indices(&self) -> &[u32] {
        &self.triangle_indices
    }

    pub fn bsp_nodes(&self) -> &[BspNode] {
        &self.bsp_nodes
    }

    pub fn materials(&self) -> &[Material] {
        &self.materials
    }

    pub fn material(&self, id: u32) -> &Material {
        &self.materials[id as usize]
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn validate(&self) -> Result<(), AccelError> {
        let node_count = self.nodes.len();
        let bad = |kind, node, index| AccelError::BadIndex { kind, node, index };

        for (i, node) in self.nodes.iter().enumerate() {
            if node.is_interior() && i + 1 >= node_count {
                return Err(bad("group", i, i + 1));
            }
            if let Some(second) = node.second_child() {
                let second = second as usize;
                if second <= i || second >= node_count {
                    return Err(bad("group", i, second));
                }
            }
            let material = match node {
                AccelNode::Sphere { material, .. }
                | AccelNode::Box { material, .. }
                | AccelNode::Cylinder { material, .. } => Some(*material),
                AccelNode::Triangles { material, bsp_root, .. } => {
                    if *bsp_root as usize >= self.bsp_nodes.len() {
                        return Err(bad("triangles", i, *bsp_root as usize));
                    }
                    Some(*material)
                }
                _ => None,
            };
            if let Some(material) = material {
                if material as usize >= self.materials.len() {
                    return Err(bad("material", i, material as usize));
                }
            }
        }

        let bsp_count = self.bsp_nodes.len();
        for (i, node) in self.bsp_nodes.iter().enumerate() {
            match *node {
                BspNode::Split { above, .. } => {
                    if i + 1 >= bsp_count {
                        return Err(bad("bsp", i, i + 1));
                    }
                    if above as usize <= i || above as usize >= bsp_count {
                        return Err(bad("bsp", i, above as usize));
                    }
                }
                BspNode::Leaf { offset, count } => {
                    let end = offset as usize + count as usize;
                    if end > self.triangle_indices.len() {
                        return Err(bad("bsp", i, end));
                    }
                }
            }
        }

        if let Some(&index) = self
            .triangle_indices
            .iter()
            .find(|&&t| t as usize >= self.triangles.len())
        {
            return Err(bad("triangle index", 0, index as usize));
        }

        if !self.nodes.is_empty() {
            let depth = stack_demand(0, |i| match self.nodes[i] {
                node if node.is_interior() => {
                    (Some(i + 1), node.second_child().map(|s| s as usize))
                }
                _ => (None, None),
            });
            if depth > NODE_STACK_CAPACITY {
                return Err(AccelError::TooDeep {
                    kind: "node",
                    depth,
                    capacity: NODE_STACK_CAPACITY,
                });
            }
        }

        for root in self.nodes.iter().filter_map(|n| match n {
            AccelNode::Triangles { bsp_root, .. } => Some(*bsp_root as usize),
            _ => None,
        }) {
            let depth = stack_demand(root, |i| match self.bsp_nodes[i] {
                BspNode::Split { above, .. } => (Some(i + 1), Some(above as usize)),
                BspNode::Leaf { .. } => (None, None),
            });
            if depth > BSP_STACK_CAPACITY {
                return Err(AccelError::TooDeep {
                    kind: "bsp",
                    depth,
                    capacity: BSP_STACK_CAPACITY,
                });
            }
        }

        Ok(())
    }
}

/// Largest stack occupancy of a depth-first walk that pushes both children.
///
/// This bounds what the tracer's fixed stacks will ever hold. Indices were
/// validated to point strictly forward, so the walk terminates.
fn stack_demand(root: usize, children: impl Fn(usize) -> (Option<usize>, Option<usize>)) -> usize {
    let mut stack = vec![root];
    let mut max_len = 1;
    while let Some(index) = stack.pop() {
        let (first, second) = children(index);
        if let Some(second) = second {
            stack.push(second);
        }
        if let Some(first) = first {
            stack.push(first);
        }
        max_len = max_len.max(stack.len());
    }
    max_len
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sphere(material: u32) -> AccelNode {
        AccelNode::Sphere {
            inv_transform: Mat4::IDENTITY,
            material,
        }
    }

    #[test]
    fn test_empty_scene() {
        let scene = AcceleratedScene::empty();
        assert!(scene.is_empty());
        assert_eq!(scene.materials().len(), 1);
    }

    #[test]
    fn test_rejects_dangling_second_child() {
        let nodes = vec![
            AccelNode::Group {
                bounds: Aabb::UNIVERSE,
                inv_transform: Mat4::IDENTITY,
                second_child: Some(9),
            },
            sphere(0),
        ];
        let err = AcceleratedScene::new(nodes, vec![], vec![], vec![], vec![Material::default()])
            .unwrap_err();
        assert!(matches!(err, AccelError::BadIndex { index: 9, .. }));
    }

    #[test]
    fn test_rejects_missing_material() {
        let err = AcceleratedScene::new(vec![sphere(3)], vec![], vec![], vec![], vec![Material::default()])
            .unwrap_err();
        assert!(matches!(err, AccelError::BadIndex { kind: "material", .. }));
    }

    #[test]
    fn test_rejects_trees_deeper_than_stack() {
        // A left-leaning chain of groups: each level leaves its second child
        // (a sphere stored after the chain) on the stack.
        let levels = NODE_STACK_CAPACITY + 2;
        let mut nodes = Vec::new();
        for level in 0..levels {
            nodes.push(AccelNode::Group {
                bounds: Aabb::UNIVERSE,
                inv_transform: Mat4::IDENTITY,
                second_child: Some((levels + 1 + level) as u32),
            });
        }
        // First child of the deepest group, then every group's second child.
        for _ in 0..=levels {
            nodes.push(sphere(0));
        }

        let err = AcceleratedScene::new(nodes, vec![], vec![], vec![], vec![Material::default()])
            .unwrap_err();
        assert!(matches!(err, AccelError::TooDeep { kind: "node", .. }));
    }

    #[test]
    fn test_stack_demand_balanced() {
        // Perfect binary tree of depth 3 laid out in preorder.
        // 0 -> (1, 4); 1 -> (2, 3); 4 -> (5, 6)
        let children = |i: usize| match i {
            0 => (Some(1), Some(4)),
            1 => (Some(2), Some(3)),
            4 => (Some(5), Some(6)),
            _ => (None, None),
        };
        assert_eq!(stack_demand(0, children), 3);
    }

    #[test]
    fn test_triangle_helpers() {
        let tri = Triangle {
            vertices: [Vec3::ZERO, Vec3::X, Vec3::Y],
            normals: None,
        };
        assert_eq!(tri.face_normal(), Vec3::Z);
        assert!(tri.bounds().z.size() > 0.0);
    }
}
