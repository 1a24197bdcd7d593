//! Scene graph types for Glint.
//!
//! A scene is a forest of transform nodes. Nodes may carry a shape and a
//! material index; world transforms are derived by [`Scene::update_world_transforms`].

use std::sync::Arc;

use glint_math::{Aabb, Color, Mat4, Mat4Ext, Quat, Vec3};

use crate::mesh::Mesh;

/// Surface/medium description shared by the scene graph and the tracer.
///
/// Which scattering model applies is decided by the tracer from these
/// factors: volumetric (`density >= 0`), then transmissive, metallic,
/// emissive, and diffuse as the fallback.
#[derive(Clone, Debug, PartialEq)]
pub struct Material {
    /// Material name (used by scene descriptions)
    pub name: String,

    /// Diffuse/albedo color (RGB, 0-1)
    pub albedo: Color,

    /// Metallic factor (0=dielectric, >0 selects mirror reflection)
    pub metallic: f32,

    /// Roughness factor, scales the reflection fuzz of metals
    pub roughness: f32,

    /// Transmission factor (>0 selects refraction)
    pub transmission: f32,

    /// Index of refraction
    pub ior: f32,

    /// Emissive color (RGB, for light-emitting surfaces)
    pub emissive: Color,

    /// Mean free path of a participating medium. Negative = solid surface.
    pub density: f32,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            name: String::new(),
            albedo: Color::new(0.5, 0.5, 0.5), // Grey default
            metallic: 0.0,
            roughness: 0.5,
            transmission: 0.0,
            ior: 1.5,
            emissive: Color::ZERO,
            density: -1.0,
        }
    }
}

impl Material {
    /// Create a new material with just a name and albedo color.
    pub fn new(name: impl Into<String>, albedo: Color) -> Self {
        Self {
            name: name.into(),
            albedo,
            ..Default::default()
        }
    }

    /// Lambertian surface.
    pub fn diffuse(albedo: Color) -> Self {
        Self::new("diffuse", albedo)
    }

    /// Mirror-like metal; `roughness` 0 is a perfect mirror.
    pub fn metal(albedo: Color, roughness: f32) -> Self {
        Self {
            metallic: 1.0,
            roughness,
            ..Self::new("metal", albedo)
        }
    }

    /// Clear dielectric such as glass (1.5) or water (1.33).
    pub fn dielectric(ior: f32) -> Self {
        Self {
            transmission: 1.0,
            ior,
            ..Self::new("dielectric", Color::ONE)
        }
    }

    /// Emitter that terminates paths with the given radiance.
    pub fn light(emissive: Color) -> Self {
        Self {
            emissive,
            ..Self::new("light", Color::ZERO)
        }
    }

    /// Participating medium filling the shape it is assigned to.
    pub fn fog(albedo: Color, density: f32) -> Self {
        Self {
            density: density.max(0.0),
            ..Self::new("fog", albedo)
        }
    }

    /// Check if this material is emissive.
    pub fn is_emissive(&self) -> bool {
        self.emissive.max_element() > 0.0
    }

    /// Check if this material describes a participating medium.
    pub fn is_volumetric(&self) -> bool {
        self.density >= 0.0
    }

    /// Clamp factors into the ranges the tracer expects.
    ///
    /// Colors are made non-negative and finite so radiance can never go negative.
    pub fn sanitized(&self) -> Self {
        let color = |c: Color| {
            let c = c.max(Color::ZERO);
            if c.is_finite() {
                c
            } else {
                Color::ZERO
            }
        };
        Self {
            name: self.name.clone(),
            albedo: color(self.albedo),
            metallic: self.metallic.max(0.0),
            roughness: self.roughness.clamp(0.0, 1.0),
            transmission: self.transmission.max(0.0),
            ior: if self.ior > 0.0 { self.ior } else { 1.0 },
            emissive: color(self.emissive),
            density: self.density,
        }
    }
}

/// Transform components that can be composed into a matrix.
#[derive(Clone, Debug, PartialEq)]
pub struct Transform {
    /// Translation
    pub translation: Vec3,

    /// Rotation (as quaternion)
    pub rotation: Quat,

    /// Scale
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            translation: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}

impl Transform {
    /// Create a new transform with only translation.
    pub fn from_translation(translation: Vec3) -> Self {
        Self {
            translation,
            ..Default::default()
        }
    }

    /// Translation plus uniform scale, the common case for unit primitives.
    pub fn from_translation_scale(translation: Vec3, scale: f32) -> Self {
        Self {
            translation,
            scale: Vec3::splat(scale),
            ..Default::default()
        }
    }

    /// Create a new transform from a 4x4 matrix.
    ///
    /// Decomposes the matrix into translation, rotation, and scale.
    pub fn from_matrix(matrix: Mat4) -> Self {
        let (scale, rotation, translation) = matrix.to_scale_rotation_translation();
        Self {
            translation,
            rotation,
            scale,
        }
    }

    /// Convert to a 4x4 transformation matrix.
    ///
    /// Order: Scale -> Rotate -> Translate (SRT)
    pub fn to_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.translation)
    }
}

/// Geometry attached to a node, always expressed in the node's local frame.
#[derive(Clone, Debug)]
pub enum Shape {
    /// Sphere of radius 1 centered at the origin.
    Sphere,
    /// Box spanning `[-1, 1]` on every axis.
    Box,
    /// Closed cylinder of radius 1 along Y, capped at `y = -1` and `y = 1`.
    Cylinder,
    /// Shared triangle mesh.
    Mesh(Arc<Mesh>),
}

impl Shape {
    /// Local-space bounds of the shape.
    pub fn local_bounds(&self) -> Aabb {
        match self {
            Shape::Sphere | Shape::Box | Shape::Cylinder => {
                Aabb::from_points(Vec3::splat(-1.0), Vec3::splat(1.0))
            }
            Shape::Mesh(mesh) => mesh.bounds,
        }
    }
}

/// A node in the scene graph.
#[derive(Clone, Debug)]
pub struct Node {
    pub name: String,
    pub transform: Transform,
    pub shape: Option<Shape>,
    /// Index into [`Scene::materials`]
    pub material: usize,
    pub children: Vec<Node>,
    world: Mat4,
}

impl Node {
    /// Create an empty transform node.
    pub fn group(name: impl Into<String>, transform: Transform) -> Self {
        Self {
            name: name.into(),
            transform,
            shape: None,
            material: 0,
            children: Vec::new(),
            world: Mat4::IDENTITY,
        }
    }

    /// Create a node carrying a shape.
    pub fn shape(name: impl Into<String>, shape: Shape, material: usize, transform: Transform) -> Self {
        Self {
            shape: Some(shape),
            material,
            ..Self::group(name, transform)
        }
    }

    /// Append a child node.
    pub fn with_child(mut self, child: Node) -> Self {
        self.children.push(child);
        self
    }

    /// Object-to-world matrix as of the last [`Scene::update_world_transforms`].
    pub fn world_matrix(&self) -> Mat4 {
        self.world
    }

    fn update_world(&mut self, parent: Mat4) {
        self.world = parent * self.transform.to_matrix();
        let world = self.world;
        for child in &mut self.children {
            child.update_world(world);
        }
    }

    fn visit<'a>(&'a self, f: &mut dyn FnMut(&'a Node)) {
        f(self);
        for child in &self.children {
            child.visit(f);
        }
    }
}

/// A complete scene: materials plus a forest of nodes.
#[derive(Clone, Debug, Default)]
pub struct Scene {
    /// Scene name (usually from filename)
    pub name: String,

    /// Materials used in the scene
    pub materials: Vec<Material>,

    /// Root nodes
    pub nodes: Vec<Node>,
}

impl Scene {
    /// Create an empty scene.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Add a material to the scene and return its ID.
    pub fn add_material(&mut self, material: Material) -> usize {
        let id = self.materials.len();
        self.materials.push(material);
        id
    }

    /// Find a material ID by name.
    pub fn material_id(&self, name: &str) -> Option<usize> {
        self.materials.iter().position(|m| m.name == name)
    }

    /// Get a material by ID.
    pub fn get_material(&self, id: usize) -> Option<&Material> {
        self.materials.get(id)
    }

    /// Add a root node.
    pub fn add_node(&mut self, node: Node) {
        self.nodes.push(node);
    }

    /// Recompute every node's world matrix from the local transforms.
    pub fn update_world_transforms(&mut self) {
        for node in &mut self.nodes {
            node.update_world(Mat4::IDENTITY);
        }
    }

    /// All nodes that carry a shape, in depth-first order.
    pub fn shape_nodes(&self) -> Vec<&Node> {
        let mut out = Vec::new();
        for root in &self.nodes {
            root.visit(&mut |node| {
                if node.shape.is_some() {
                    out.push(node);
                }
            });
        }
        out
    }

    /// Get total triangle count across all mesh nodes.
    pub fn total_triangle_count(&self) -> usize {
        self.shape_nodes()
            .iter()
            .map(|node| match &node.shape {
                Some(Shape::Mesh(mesh)) => mesh.triangle_count(),
                _ => 0,
            })
            .sum()
    }

    /// Compute the world-space bounding box of all shapes.
    ///
    /// Uses the world matrices from the last [`Scene::update_world_transforms`].
    pub fn world_bounds(&self) -> Aabb {
        self.shape_nodes().iter().fold(Aabb::EMPTY, |acc, node| {
            let local = node.shape.as_ref().map(Shape::local_bounds).unwrap_or(Aabb::EMPTY);
            Aabb::surrounding(&acc, &node.world_matrix().transform_aabb(&local))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scene_creation() {
        let mut scene = Scene::new("test");
        let grey = scene.add_material(Material::diffuse(Color::splat(0.5)));

        let mesh = Arc::new(Mesh::new(vec![Vec3::ZERO, Vec3::X, Vec3::Y], vec![0, 1, 2], None));
        scene.add_node(Node::shape("tri", Shape::Mesh(mesh.clone()), grey, Transform::default()));
        scene.add_node(Node::shape(
            "tri2",
            Shape::Mesh(mesh),
            grey,
            Transform::from_translation(Vec3::X),
        ));

        assert_eq!(scene.shape_nodes().len(), 2);
        assert_eq!(scene.total_triangle_count(), 2);
    }

    #[test]
    fn test_world_transforms_compose() {
        let mut scene = Scene::new("hierarchy");
        let m = scene.add_material(Material::default());

        let child = Node::shape(
            "ball",
            Shape::Sphere,
            m,
            Transform::from_translation(Vec3::new(0.0, 1.0, 0.0)),
        );
        let parent = Node::group("root", Transform::from_translation_scale(Vec3::new(5.0, 0.0, 0.0), 2.0))
            .with_child(child);
        scene.add_node(parent);
        scene.update_world_transforms();

        let ball = scene.shape_nodes()[0];
        let center = ball.world_matrix().transform_point3(Vec3::ZERO);
        assert!((center - Vec3::new(5.0, 2.0, 0.0)).length() < 1e-5);

        let bounds = scene.world_bounds();
        assert!((bounds.min() - Vec3::new(3.0, 0.0, -2.0)).length() < 1e-4);
        assert!((bounds.max() - Vec3::new(7.0, 4.0, 2.0)).length() < 1e-4);
    }

    #[test]
    fn test_transform_matrix_roundtrip() {
        let transform = Transform {
            translation: Vec3::new(1.0, 2.0, 3.0),
            rotation: Quat::from_rotation_y(std::f32::consts::FRAC_PI_4),
            scale: Vec3::new(2.0, 2.0, 2.0),
        };

        let recovered = Transform::from_matrix(transform.to_matrix());

        assert!((recovered.translation - transform.translation).length() < 0.001);
        assert!((recovered.scale - transform.scale).length() < 0.001);
    }

    #[test]
    fn test_material_classification() {
        assert!(Material::fog(Color::ONE, 0.5).is_volumetric());
        assert!(!Material::diffuse(Color::ONE).is_volumetric());
        assert!(Material::light(Color::ONE).is_emissive());
        assert!(!Material::metal(Color::ONE, 0.1).is_emissive());
    }

    #[test]
    fn test_material_sanitized() {
        let m = Material {
            albedo: Color::new(-1.0, 0.5, f32::NAN),
            roughness: 3.0,
            ior: 0.0,
            ..Material::default()
        };
        let s = m.sanitized();

        assert_eq!(s.albedo, Color::new(0.0, 0.5, 0.0));
        assert_eq!(s.roughness, 1.0);
        assert_eq!(s.ior, 1.0);
    }
}
