//! Nearest-hit traversal of an [`AcceleratedScene`].
//!
//! Both the top-level tree and the per-mesh BSPs are walked with fixed-size
//! explicit stacks. [`AcceleratedScene::new`] rejects trees that could
//! overflow them, so the walk never allocates and never recurses.

use glint_math::{Interval, Mat4, Mat4Ext, Ray, Vec3};
use glint_scene::accel::{BSP_STACK_CAPACITY, NODE_STACK_CAPACITY};
use glint_scene::{AccelNode, AcceleratedScene, BspNode};
use rand::RngCore;

use crate::intersect::{
    intersect_box, intersect_cylinder, intersect_sphere, intersect_triangle, volumetric_distance, Span,
};

/// Minimum accepted hit distance for rays starting outside a closed shape.
pub const EPSILON: f32 = 1e-3;

/// Nearest intersection along a ray.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hit {
    pub t: f32,
    /// World-space hit point
    pub point: Vec3,
    /// Unit normal, always facing against the incoming ray
    pub normal: Vec3,
    /// True when the ray arrived from the outside of the surface
    pub front_face: bool,
    pub material: u32,
    /// Scattering event inside a participating medium rather than a surface hit
    pub volumetric: bool,
}

impl Hit {
    fn surface(ray: &Ray, t: f32, outward: Vec3, material: u32) -> Self {
        let front_face = ray.direction().dot(outward) < 0.0;
        Self {
            t,
            point: ray.at(t),
            normal: if front_face { outward } else { -outward },
            front_face,
            material,
            volumetric: false,
        }
    }
}

/// Fixed-capacity LIFO used by both walks.
struct Stack<T, const N: usize> {
    items: [T; N],
    len: usize,
}

impl<T: Copy + Default, const N: usize> Stack<T, N> {
    fn new() -> Self {
        Self {
            items: [T::default(); N],
            len: 0,
        }
    }

    #[inline]
    fn push(&mut self, item: T) {
        debug_assert!(self.len < N, "traversal stack overflow");
        if self.len < N {
            self.items[self.len] = item;
            self.len += 1;
        }
    }

    #[inline]
    fn pop(&mut self) -> Option<T> {
        self.len = self.len.checked_sub(1)?;
        Some(self.items[self.len])
    }
}

/// Find the nearest hit with `t` in `(EPSILON, inf)`.
///
/// `rng` is only consumed by volumetric media.
pub fn trace(scene: &AcceleratedScene, ray: &Ray, rng: &mut dyn RngCore) -> Option<Hit> {
    let nodes = scene.nodes();
    if nodes.is_empty() {
        return None;
    }

    let mut best: Option<Hit> = None;
    let mut closest = f32::INFINITY;
    let mut stack: Stack<u32, NODE_STACK_CAPACITY> = Stack::new();
    stack.push(0);

    while let Some(index) = stack.pop() {
        let ray_t = Interval::new(EPSILON, closest);
        // Culling starts at 0 so exits closer than EPSILON survive it.
        let cull_t = Interval::new(0.0, closest);

        let hit = match nodes[index as usize] {
            AccelNode::Group {
                bounds,
                inv_transform,
                second_child,
            }
            | AccelNode::Geometry {
                bounds,
                inv_transform,
                second_child,
            } => {
                // The interval is clipped at the best hit, so boxes entered
                // beyond it are culled here too.
                let local = ray.transformed(&inv_transform);
                if !bounds.hit(&local, cull_t) {
                    continue;
                }
                if let Some(second) = second_child {
                    stack.push(second);
                }
                stack.push(index + 1);
                continue;
            }
            AccelNode::Sphere {
                inv_transform,
                material,
            } => closed_shape(scene, ray, &inv_transform, material, ray_t, intersect_sphere, rng),
            AccelNode::Box {
                inv_transform,
                material,
            } => closed_shape(scene, ray, &inv_transform, material, ray_t, intersect_box, rng),
            AccelNode::Cylinder {
                inv_transform,
                material,
            } => closed_shape(scene, ray, &inv_transform, material, ray_t, intersect_cylinder, rng),
            AccelNode::Triangles {
                bounds,
                inv_transform,
                bsp_root,
                material,
            } => {
                let local = ray.transformed(&inv_transform);
                bounds
                    .hit_range(&local, ray_t)
                    .and_then(|range| trace_bsp(scene, &local, bsp_root, range, closest))
                    .map(|(t, outward)| {
                        let world_normal = inv_transform.transform_normal_by_inverse(outward);
                        Hit::surface(ray, t, world_normal, material)
                    })
            }
        };

        if let Some(hit) = hit {
            if hit.t < closest {
                closest = hit.t;
                best = Some(hit);
            }
        }
    }

    best
}

/// Sphere, box and cylinder share everything except the local test.
fn closed_shape(
    scene: &AcceleratedScene,
    ray: &Ray,
    inv_transform: &Mat4,
    material: u32,
    ray_t: Interval,
    test: fn(&Ray) -> Option<Span>,
    rng: &mut dyn RngCore,
) -> Option<Hit> {
    let local = ray.transformed(inv_transform);
    let span = test(&local)?;
    let medium = scene.material(material);

    if medium.is_volumetric() {
        // `t` is shared by both frames; path length is measured in world units.
        let t = volumetric_distance(ray, &span, medium.density, ray_t, rng)?;
        // The normal only marks the event; isotropic scattering ignores it.
        let normal = -ray.direction().normalize_or_zero();
        return Some(Hit {
            t,
            point: ray.at(t),
            normal,
            front_face: true,
            material,
            volumetric: true,
        });
    }

    let (t, outward) = span.nearest(ray_t)?;
    let world_normal = inv_transform.transform_normal_by_inverse(outward);
    Some(Hit::surface(ray, t, world_normal, material))
}

/// kd-style front-to-back BSP descent in the mesh's local frame.
///
/// Returns the nearest `t` below `closest` with the (local) outward normal.
fn trace_bsp(
    scene: &AcceleratedScene,
    ray: &Ray,
    root: u32,
    range: Interval,
    closest: f32,
) -> Option<(f32, Vec3)> {
    let bsp = scene.bsp_nodes();
    let origin = ray.origin();
    let dir = ray.direction();

    let mut best: Option<(f32, Vec3)> = None;
    let mut best_t = closest;
    let mut stack: Stack<(u32, f32, f32), BSP_STACK_CAPACITY> = Stack::new();
    stack.push((root, range.min, range.max));

    while let Some((mut node, tmin, mut tmax)) = stack.pop() {
        // Cells come off the stack front to back.
        if best_t < tmin {
            break;
        }

        loop {
            match bsp[node as usize] {
                BspNode::Split {
                    axis,
                    position,
                    above,
                } => {
                    let axis = axis as usize;
                    let o = origin[axis];
                    let d = dir[axis];

                    let below_first = o < position || (o == position && d <= 0.0);
                    let (first, second) = if below_first {
                        (node + 1, above)
                    } else {
                        (above, node + 1)
                    };

                    let t_plane = (position - o) / d;
                    // NaN (ray inside the plane) also takes the first branch.
                    if t_plane > tmax || !(t_plane > 0.0) {
                        node = first;
                    } else if t_plane < tmin {
                        node = second;
                    } else {
                        stack.push((second, t_plane, tmax));
                        node = first;
                        tmax = t_plane;
                    }
                }
                BspNode::Leaf { offset, count } => {
                    let start = offset as usize;
                    let end = start + count as usize;
                    for &tri_index in &scene.triangle_indices()[start..end] {
                        let tri = &scene.triangles()[tri_index as usize];
                        let Some(hit) = intersect_triangle(ray, &tri.vertices) else {
                            continue;
                        };
                        if hit.t > EPSILON && hit.t < best_t {
                            best_t = hit.t;
                            best = Some((hit.t, shading_normal(tri, hit.u, hit.v)));
                        }
                    }
                    break;
                }
            }
        }
    }

    best
}

/// Interpolated vertex normal oriented with the winding, or the face normal.
fn shading_normal(tri: &glint_scene::Triangle, u: f32, v: f32) -> Vec3 {
    let face = tri.face_normal();
    let Some([n0, n1, n2]) = tri.normals else {
        return face;
    };
    let smooth = ((1.0 - u - v) * n0 + u * n1 + v * n2).normalize_or_zero();
    if smooth == Vec3::ZERO {
        face
    } else if smooth.dot(face) < 0.0 {
        -smooth
    } else {
        smooth
    }
}
