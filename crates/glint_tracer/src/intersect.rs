//! Ray/primitive intersection tests.
//!
//! Closed primitives are unit shapes in their local frame and report the full
//! span a ray spends inside them, so the same test serves surfaces (nearest
//! valid root) and participating media (distance sampling over the span).
//! The ray direction is never normalized; `t` stays comparable with the
//! world-space ray that was transformed into the local frame.

use glint_math::{Interval, Ray, Vec3};
use rand::RngCore;

use crate::sampling::gen_f32;

/// Result of a ray/triangle test.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TriangleHit {
    pub t: f32,
    /// Barycentric weight of the second vertex
    pub u: f32,
    /// Barycentric weight of the third vertex
    pub v: f32,
}

/// Entry and exit of a ray through a closed primitive, with the outward
/// normals at both points. `t0 <= t1`; either may be negative.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Span {
    pub t0: f32,
    pub n0: Vec3,
    pub t1: f32,
    pub n1: Vec3,
}

impl Span {
    /// Nearest root inside `ray_t`, with its outward normal.
    ///
    /// Falls back to the exit root when the entry lies outside the interval
    /// (ray starting inside the shape). A ray whose origin is strictly inside
    /// always reports its exit, even one closer than `ray_t.min`: bounced rays
    /// are lifted off their own surface, so such an exit is a neighbouring
    /// face at an edge or corner.
    pub fn nearest(&self, ray_t: Interval) -> Option<(f32, Vec3)> {
        let starts_inside = self.t0 < 0.0 && self.t1 >= 0.0;
        if ray_t.surrounds(self.t0) {
            Some((self.t0, self.n0))
        } else if self.t1 < ray_t.max && (self.t1 > ray_t.min || starts_inside) {
            Some((self.t1, self.n1))
        } else {
            None
        }
    }
}

/// Möller-Trumbore ray/triangle intersection.
///
/// Returns the hit regardless of the sign of `t`; callers filter by interval.
pub fn intersect_triangle(ray: &Ray, vertices: &[Vec3; 3]) -> Option<TriangleHit> {
    let [v0, v1, v2] = *vertices;
    let edge1 = v1 - v0;
    let edge2 = v2 - v0;

    let h = ray.direction().cross(edge2);
    let a = edge1.dot(h);

    // Ray is parallel to the triangle plane
    if a.abs() < 1e-8 {
        return None;
    }

    let f = 1.0 / a;
    let s = ray.origin() - v0;
    let u = f * s.dot(h);
    if !(0.0..=1.0).contains(&u) {
        return None;
    }

    let q = s.cross(edge1);
    let v = f * ray.direction().dot(q);
    if v < 0.0 || u + v > 1.0 {
        return None;
    }

    Some(TriangleHit {
        t: f * edge2.dot(q),
        u,
        v,
    })
}

/// Unit sphere at the origin.
pub fn intersect_sphere(ray: &Ray) -> Option<Span> {
    let origin = ray.origin();
    let dir = ray.direction();

    let a = dir.length_squared();
    let h = dir.dot(origin);
    let c = origin.length_squared() - 1.0;

    let discriminant = h * h - a * c;
    if discriminant < 0.0 || a == 0.0 {
        return None;
    }

    let sqrtd = discriminant.sqrt();
    let t0 = (-h - sqrtd) / a;
    let t1 = (-h + sqrtd) / a;
    Some(Span {
        t0,
        n0: ray.at(t0),
        t1,
        n1: ray.at(t1),
    })
}

/// Box spanning `[-1, 1]` on every axis (slab method).
pub fn intersect_box(ray: &Ray) -> Option<Span> {
    let origin = ray.origin();
    let dir = ray.direction();

    let mut t0 = f32::NEG_INFINITY;
    let mut t1 = f32::INFINITY;
    let mut n0 = Vec3::ZERO;
    let mut n1 = Vec3::ZERO;

    for axis in 0..3 {
        let d = dir[axis];
        let o = origin[axis];
        if d == 0.0 {
            // Parallel to this slab: inside it or never
            if !(-1.0..=1.0).contains(&o) {
                return None;
            }
            continue;
        }

        let inv_d = 1.0 / d;
        let mut near = (-1.0 - o) * inv_d;
        let mut far = (1.0 - o) * inv_d;
        let mut normal = Vec3::ZERO;
        normal[axis] = -1.0;
        if inv_d < 0.0 {
            std::mem::swap(&mut near, &mut far);
            normal = -normal;
        }

        if near > t0 {
            t0 = near;
            n0 = normal;
        }
        if far < t1 {
            t1 = far;
            n1 = -normal;
        }
        if t1 < t0 {
            return None;
        }
    }

    if !t0.is_finite() || !t1.is_finite() {
        return None;
    }

    Some(Span { t0, n0, t1, n1 })
}

/// Closed cylinder of radius 1 along Y, capped at `y = -1` and `y = 1`.
pub fn intersect_cylinder(ray: &Ray) -> Option<Span> {
    let origin = ray.origin();
    let dir = ray.direction();

    let mut lo: Option<(f32, Vec3)> = None;
    let mut hi: Option<(f32, Vec3)> = None;
    let mut consider = |t: f32, n: Vec3| {
        if lo.map_or(true, |(best, _)| t < best) {
            lo = Some((t, n));
        }
        if hi.map_or(true, |(best, _)| t > best) {
            hi = Some((t, n));
        }
    };

    // Lateral surface
    let a = dir.x * dir.x + dir.z * dir.z;
    if a > 0.0 {
        let h = dir.x * origin.x + dir.z * origin.z;
        let c = origin.x * origin.x + origin.z * origin.z - 1.0;
        let discriminant = h * h - a * c;
        if discriminant >= 0.0 {
            let sqrtd = discriminant.sqrt();
            for t in [(-h - sqrtd) / a, (-h + sqrtd) / a] {
                let p = ray.at(t);
                if (-1.0..=1.0).contains(&p.y) {
                    consider(t, Vec3::new(p.x, 0.0, p.z));
                }
            }
        }
    }

    // Caps
    if dir.y != 0.0 {
        for cap in [-1.0_f32, 1.0] {
            let t = (cap - origin.y) / dir.y;
            let p = ray.at(t);
            if p.x * p.x + p.z * p.z <= 1.0 {
                consider(t, Vec3::new(0.0, cap, 0.0));
            }
        }
    }

    let ((t0, n0), (t1, n1)) = (lo?, hi?);
    Some(Span { t0, n0, t1, n1 })
}

/// Distance sampling through a homogeneous medium.
///
/// `density` is the mean free path: a free-flight length `-density * ln(u)`
/// is drawn and the ray scatters if that length fits inside the part of the
/// span that lies within `ray_t`. Returns the scattering `t`.
pub fn volumetric_distance(
    ray: &Ray,
    span: &Span,
    density: f32,
    ray_t: Interval,
    rng: &mut dyn RngCore,
) -> Option<f32> {
    let t0 = span.t0.max(ray_t.min);
    let t1 = span.t1.min(ray_t.max);
    if t1 <= t0 {
        return None;
    }

    let speed = ray.direction().length();
    if speed == 0.0 {
        return None;
    }

    let inside = (t1 - t0) * speed;
    // 1 - u keeps the log argument in (0, 1]
    let h = -density * (1.0 - gen_f32(rng)).ln();
    if h < inside {
        Some(t0 + h / speed)
    } else {
        None
    }
}
