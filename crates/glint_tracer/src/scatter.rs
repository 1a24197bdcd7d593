//! Material scattering and path evaluation.

use glint_math::{Color, Ray, Vec3};
use glint_scene::{AcceleratedScene, Material};
use rand::RngCore;

use crate::sampling::{gen_f32, random_in_unit_sphere, random_unit_vector};
use crate::traverse::{trace, Hit};

/// Distance a bounced ray starts from the surface it leaves.
pub const SURFACE_OFFSET: f32 = 1e-4;

/// Outcome of a ray meeting a material.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Scatter {
    /// Path continues along `ray`, filtered by `attenuation`.
    Bounce { ray: Ray, attenuation: Color },
    /// Path ends at a light with this radiance.
    Emit(Color),
    /// Path ends with no contribution.
    Absorb,
}

/// Apply the material at `hit` to the incoming ray.
///
/// Precedence: medium, transmission, metal, emission, diffuse.
pub fn scatter(ray_in: &Ray, hit: &Hit, material: &Material, rng: &mut dyn RngCore) -> Scatter {
    if hit.volumetric {
        // Isotropic phase function
        return Scatter::Bounce {
            ray: Ray::new(hit.point, random_unit_vector(rng)),
            attenuation: material.albedo,
        };
    }

    if material.transmission > 0.0 {
        let refraction_ratio = if hit.front_face {
            1.0 / material.ior
        } else {
            material.ior
        };

        let unit_direction = ray_in.direction().normalize_or_zero();
        let cos_theta = (-unit_direction).dot(hit.normal).min(1.0);
        let sin_theta = (1.0 - cos_theta * cos_theta).max(0.0).sqrt();

        // Total internal reflection
        let cannot_refract = refraction_ratio * sin_theta > 1.0;
        let direction = if cannot_refract || schlick(cos_theta, refraction_ratio) > gen_f32(rng) {
            reflect(unit_direction, hit.normal)
        } else {
            refract(unit_direction, hit.normal, refraction_ratio)
        };

        return Scatter::Bounce {
            ray: spawn(hit, direction),
            attenuation: Color::ONE,
        };
    }

    if material.metallic > 0.0 {
        let reflected = reflect(ray_in.direction().normalize_or_zero(), hit.normal);
        let scattered = reflected + material.roughness * random_in_unit_sphere(rng);
        if scattered.dot(hit.normal) > 0.0 {
            return Scatter::Bounce {
                ray: spawn(hit, scattered),
                attenuation: material.albedo,
            };
        }
        return Scatter::Absorb;
    }

    if material.is_emissive() {
        return Scatter::Emit(material.emissive);
    }

    // Lambertian
    let mut direction = hit.normal + random_unit_vector(rng);
    if direction.length_squared() < 1e-8 {
        direction = hit.normal;
    }
    Scatter::Bounce {
        ray: spawn(hit, direction),
        attenuation: material.albedo,
    }
}

/// Ray leaving `hit` along `direction`, lifted off the surface on the side
/// it heads into. Medium scatter points lie inside the volume and stay put.
fn spawn(hit: &Hit, direction: Vec3) -> Ray {
    if hit.volumetric {
        return Ray::new(hit.point, direction);
    }
    let side = if direction.dot(hit.normal) >= 0.0 { 1.0 } else { -1.0 };
    Ray::new(hit.point + hit.normal * (SURFACE_OFFSET * side), direction)
}

/// Radiance arriving along `ray`, following at most `depth` bounces.
///
/// Misses return `background`; an exhausted budget returns black.
pub fn ray_color(
    ray: &Ray,
    scene: &AcceleratedScene,
    depth: u32,
    background: Color,
    rng: &mut dyn RngCore,
) -> Color {
    if depth == 0 {
        return Color::ZERO;
    }

    let Some(hit) = trace(scene, ray, rng) else {
        return background;
    };

    match scatter(ray, &hit, scene.material(hit.material), rng) {
        Scatter::Bounce { ray, attenuation } => {
            attenuation * ray_color(&ray, scene, depth - 1, background, rng)
        }
        Scatter::Emit(color) => color,
        Scatter::Absorb => Color::ZERO,
    }
}

/// Schlick's approximation for reflectance
#[inline]
pub fn schlick(cosine: f32, refraction_ratio: f32) -> f32 {
    let r0 = ((1.0 - refraction_ratio) / (1.0 + refraction_ratio)).powi(2);
    r0 + (1.0 - r0) * (1.0 - cosine).powi(5)
}

/// Reflect a vector about a normal.
#[inline]
pub fn reflect(v: Vec3, n: Vec3) -> Vec3 {
    v - 2.0 * v.dot(n) * n
}

/// Refract a unit vector through a surface with the given eta ratio.
#[inline]
pub fn refract(uv: Vec3, n: Vec3, etai_over_etat: f32) -> Vec3 {
    let cos_theta = (-uv).dot(n).min(1.0);
    let r_out_perp = etai_over_etat * (uv + cos_theta * n);
    let r_out_parallel = -(1.0 - r_out_perp.length_squared()).abs().sqrt() * n;
    r_out_perp + r_out_parallel
}
