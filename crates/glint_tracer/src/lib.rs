//! Glint tracer - progressive CPU path tracing.
//!
//! A single background worker refines a running-mean image one full-frame
//! pass at a time while the host frame loop keeps presenting. The host calls
//! [`ProgressiveRenderer::render`] once per frame; it never blocks.
//!
//! Lower-level pieces are public for hosts that want to trace rays directly:
//! [`trace`] walks an [`AcceleratedScene`](glint_scene::AcceleratedScene),
//! [`scatter`] applies a material, and [`ray_color`] ties them together.

mod camera_rays;
mod display;
mod intersect;
mod progressive;
mod sampling;
mod scatter;
mod traverse;

pub use camera_rays::generate_ray;
pub use display::{color_to_rgba, linear_to_gamma, CpuTarget, DisplayTarget, ImageBuffer, TransferBuffer};
pub use intersect::{
    intersect_box, intersect_cylinder, intersect_sphere, intersect_triangle, volumetric_distance, Span,
    TriangleHit,
};
pub use progressive::{Accumulation, ProgressiveRenderer, RenderConfig, RenderState};
pub use sampling::{gen_f32, random_in_unit_disk, random_in_unit_sphere, random_unit_vector};
pub use scatter::{ray_color, reflect, refract, scatter, schlick, Scatter};
pub use traverse::{trace, Hit, EPSILON};

/// Re-export common math types from glint_math
pub use glint_math::{Color, Ray, Vec3};
