//! JSON scene descriptions.
//!
//! ```json
//! {
//!   "camera": { "position": [0, 1, 5], "target": [0, 0, 0], "fov": 40 },
//!   "background": [0.6, 0.7, 1.0],
//!   "materials": [
//!     { "name": "glass", "transmission": 1.0, "ior": 1.5 },
//!     { "name": "lamp", "emissive": [4, 4, 4] }
//!   ],
//!   "nodes": [
//!     { "name": "ball", "shape": "sphere", "material": "glass", "scale": 0.5 },
//!     { "name": "bunny", "shape": { "mesh": { "path": "bunny.obj" } },
//!       "rotation": [0, 45, 0] }
//!   ]
//! }
//! ```
//!
//! Mesh paths are resolved relative to the description file. Nodes that name
//! the same OBJ share a single [`Mesh`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use glint_math::{Camera, Color, EulerRot, Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::error::{SceneError, SceneResult};
use crate::mesh::Mesh;
use crate::scene::{Material, Node, Scene, Shape, Transform};

/// Top-level scene file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneDescription {
    pub name: String,
    pub camera: CameraDescription,
    pub background: [f32; 3],
    pub materials: Vec<MaterialDescription>,
    pub nodes: Vec<NodeDescription>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraDescription {
    pub position: [f32; 3],
    pub target: [f32; 3],
    pub up: [f32; 3],
    /// Vertical field of view in degrees.
    pub fov: f32,
    pub aperture: f32,
    /// Defaults to the distance between position and target.
    pub focus_distance: Option<f32>,
}

impl Default for CameraDescription {
    fn default() -> Self {
        Self {
            position: [0.0, 0.0, 5.0],
            target: [0.0, 0.0, 0.0],
            up: [0.0, 1.0, 0.0],
            fov: 45.0,
            aperture: 0.0,
            focus_distance: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MaterialDescription {
    pub name: String,
    pub albedo: [f32; 3],
    pub metallic: f32,
    pub roughness: f32,
    pub transmission: f32,
    pub ior: f32,
    pub emissive: [f32; 3],
    /// Mean free path of a participating medium; omitted for solid surfaces.
    pub density: Option<f32>,
}

impl Default for MaterialDescription {
    fn default() -> Self {
        let m = Material::default();
        Self {
            name: String::new(),
            albedo: m.albedo.to_array(),
            metallic: m.metallic,
            roughness: m.roughness,
            transmission: m.transmission,
            ior: m.ior,
            emissive: m.emissive.to_array(),
            density: None,
        }
    }
}

impl From<&MaterialDescription> for Material {
    fn from(desc: &MaterialDescription) -> Self {
        Material {
            name: desc.name.clone(),
            albedo: Color::from_array(desc.albedo),
            metallic: desc.metallic,
            roughness: desc.roughness,
            transmission: desc.transmission,
            ior: desc.ior,
            emissive: Color::from_array(desc.emissive),
            density: desc.density.map_or(-1.0, |d| d.max(0.0)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShapeDescription {
    Sphere,
    Box,
    Cylinder,
    /// OBJ file, relative to the description.
    Mesh {
        path: PathBuf,
        /// Compute smooth normals when the file has none.
        #[serde(default)]
        smooth: bool,
    },
    /// Inline triangle list.
    Triangles {
        positions: Vec<[f32; 3]>,
        indices: Vec<u32>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScaleDescription {
    Uniform(f32),
    Axes([f32; 3]),
}

impl Default for ScaleDescription {
    fn default() -> Self {
        ScaleDescription::Uniform(1.0)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeDescription {
    pub name: String,
    /// Absent for pure transform groups.
    pub shape: Option<ShapeDescription>,
    /// Material name; the first material when omitted.
    pub material: Option<String>,
    pub translation: [f32; 3],
    /// Euler angles in degrees, applied X then Y then Z.
    pub rotation: [f32; 3],
    pub scale: ScaleDescription,
    pub children: Vec<NodeDescription>,
}

/// Everything a scene file provides to the renderer.
#[derive(Debug, Clone)]
pub struct LoadedScene {
    pub scene: Scene,
    pub camera: Camera,
    pub background: Color,
}

/// Load a scene description from disk.
pub fn load_scene<P: AsRef<Path>>(path: P) -> SceneResult<LoadedScene> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)?;
    let mut description: SceneDescription = serde_json::from_str(&text)?;
    if description.name.is_empty() {
        description.name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
    }

    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
    let loaded = description.instantiate(base_dir)?;
    log::info!(
        "Loaded scene '{}': {} materials, {} shapes, {} triangles",
        loaded.scene.name,
        loaded.scene.materials.len(),
        loaded.scene.shape_nodes().len(),
        loaded.scene.total_triangle_count()
    );
    Ok(loaded)
}

impl SceneDescription {
    /// Parse a description from a JSON string.
    pub fn from_json(text: &str) -> SceneResult<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Build the scene graph and camera. `base_dir` resolves mesh paths.
    pub fn instantiate(&self, base_dir: &Path) -> SceneResult<LoadedScene> {
        let mut scene = Scene::new(self.name.clone());
        for material in &self.materials {
            scene.add_material(material.into());
        }
        if scene.materials.is_empty() {
            scene.add_material(Material::default());
        }

        let mut builder = NodeBuilder {
            scene: &scene,
            base_dir,
            meshes: HashMap::new(),
        };
        let nodes = self
            .nodes
            .iter()
            .map(|node| builder.build(node))
            .collect::<SceneResult<Vec<_>>>()?;

        for node in nodes {
            scene.add_node(node);
        }
        scene.update_world_transforms();

        let cam = &self.camera;
        let position = Vec3::from_array(cam.position);
        let target = Vec3::from_array(cam.target);
        let mut camera = Camera::new(position, target, 1.0).with_fov_degrees(cam.fov);
        camera.up = Vec3::from_array(cam.up).try_normalize().unwrap_or(Vec3::Y);
        let focus = cam.focus_distance.unwrap_or(camera.focus_distance);
        let camera = camera.with_lens(cam.aperture, focus);

        Ok(LoadedScene {
            scene,
            camera,
            background: Color::from_array(self.background),
        })
    }
}

struct NodeBuilder<'a> {
    scene: &'a Scene,
    base_dir: &'a Path,
    meshes: HashMap<PathBuf, Arc<Mesh>>,
}

impl NodeBuilder<'_> {
    fn build(&mut self, desc: &NodeDescription) -> SceneResult<Node> {
        let [rx, ry, rz] = desc.rotation.map(f32::to_radians);
        let scale = match desc.scale {
            ScaleDescription::Uniform(s) => Vec3::splat(s),
            ScaleDescription::Axes(axes) => Vec3::from_array(axes),
        };
        let transform = Transform {
            translation: Vec3::from_array(desc.translation),
            rotation: Quat::from_euler(EulerRot::ZYX, rz, ry, rx),
            scale,
        };

        let mut node = match &desc.shape {
            None => Node::group(desc.name.clone(), transform),
            Some(shape) => {
                let material = match &desc.material {
                    Some(name) => self
                        .scene
                        .material_id(name)
                        .ok_or_else(|| SceneError::UnknownMaterial(name.clone()))?,
                    None => 0,
                };
                let shape = self.shape(&desc.name, shape)?;
                Node::shape(desc.name.clone(), shape, material, transform)
            }
        };

        for child in &desc.children {
            node.children.push(self.build(child)?);
        }
        Ok(node)
    }

    fn shape(&mut self, name: &str, desc: &ShapeDescription) -> SceneResult<Shape> {
        Ok(match desc {
            ShapeDescription::Sphere => Shape::Sphere,
            ShapeDescription::Box => Shape::Box,
            ShapeDescription::Cylinder => Shape::Cylinder,
            ShapeDescription::Mesh { path, smooth } => {
                let full = self.base_dir.join(path);
                if let Some(mesh) = self.meshes.get(&full) {
                    return Ok(Shape::Mesh(mesh.clone()));
                }
                let mut mesh = Mesh::load_obj(&full)?;
                if *smooth && !mesh.has_normals() {
                    mesh.compute_normals();
                }
                let mesh = Arc::new(mesh);
                self.meshes.insert(full, mesh.clone());
                Shape::Mesh(mesh)
            }
            ShapeDescription::Triangles { positions, indices } => {
                let invalid = |reason: String| SceneError::InvalidNode {
                    name: name.to_string(),
                    reason,
                };
                if indices.len() % 3 != 0 {
                    return Err(invalid(format!(
                        "index count {} is not a multiple of 3",
                        indices.len()
                    )));
                }
                if let Some(&bad) = indices.iter().find(|&&i| i as usize >= positions.len()) {
                    return Err(invalid(format!(
                        "index {} out of range for {} positions",
                        bad,
                        positions.len()
                    )));
                }
                let positions = positions.iter().copied().map(Vec3::from_array).collect();
                Shape::Mesh(Arc::new(Mesh::new(positions, indices.clone(), None)))
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CORNELL_ISH: &str = r#"{
        "name": "test",
        "camera": { "position": [0, 0, 4], "target": [0, 0, 0], "fov": 50, "aperture": 0.1 },
        "background": [0.1, 0.2, 0.3],
        "materials": [
            { "name": "white", "albedo": [0.8, 0.8, 0.8] },
            { "name": "lamp", "emissive": [5, 5, 5] },
            { "name": "smoke", "albedo": [1, 1, 1], "density": 0.5 }
        ],
        "nodes": [
            { "name": "floor", "shape": "box", "material": "white",
              "translation": [0, -2, 0], "scale": [3, 0.1, 3] },
            { "name": "rig", "translation": [0, 1, 0], "children": [
                { "name": "light", "shape": "sphere", "material": "lamp", "scale": 0.25 }
            ]},
            { "name": "fog", "shape": "cylinder", "material": "smoke" },
            { "name": "tri", "shape": { "triangles": {
                "positions": [[0, 0, 0], [1, 0, 0], [0, 1, 0]],
                "indices": [0, 1, 2] } } }
        ]
    }"#;

    #[test]
    fn test_instantiate_description() {
        let desc = SceneDescription::from_json(CORNELL_ISH).unwrap();
        let loaded = desc.instantiate(Path::new(".")).unwrap();

        assert_eq!(loaded.scene.materials.len(), 3);
        assert_eq!(loaded.scene.shape_nodes().len(), 4);
        assert_eq!(loaded.scene.total_triangle_count(), 1);
        assert_eq!(loaded.background, Color::new(0.1, 0.2, 0.3));
        assert!((loaded.camera.aperture - 0.1).abs() < 1e-6);
        assert!((loaded.camera.focus_distance - 4.0).abs() < 1e-5);

        // Child world transform includes the parent's translation.
        let light = loaded
            .scene
            .shape_nodes()
            .into_iter()
            .find(|n| n.name == "light")
            .unwrap();
        let center = light.world_matrix().transform_point3(Vec3::ZERO);
        assert!((center - Vec3::Y).length() < 1e-5);

        let smoke = &loaded.scene.materials[2];
        assert!(smoke.is_volumetric());
        assert!(!loaded.scene.materials[0].is_volumetric());
    }

    #[test]
    fn test_unknown_material_is_an_error() {
        let json = r#"{ "materials": [{ "name": "a" }],
                        "nodes": [{ "name": "x", "shape": "sphere", "material": "b" }] }"#;
        let desc = SceneDescription::from_json(json).unwrap();
        let err = desc.instantiate(Path::new(".")).unwrap_err();
        assert!(matches!(err, SceneError::UnknownMaterial(name) if name == "b"));
    }

    #[test]
    fn test_bad_inline_triangles() {
        let json = r#"{ "nodes": [{ "name": "t", "shape": { "triangles": {
                          "positions": [[0, 0, 0]], "indices": [0, 0, 5] } } }] }"#;
        let desc = SceneDescription::from_json(json).unwrap();
        let err = desc.instantiate(Path::new(".")).unwrap_err();
        assert!(matches!(err, SceneError::InvalidNode { .. }));
    }

    #[test]
    fn test_defaults_add_a_material() {
        let json = r#"{ "nodes": [{ "name": "s", "shape": "sphere" }] }"#;
        let loaded = SceneDescription::from_json(json)
            .unwrap()
            .instantiate(Path::new("."))
            .unwrap();
        assert_eq!(loaded.scene.materials.len(), 1);
        assert_eq!(loaded.scene.shape_nodes()[0].material, 0);
    }

    #[test]
    fn test_rotation_in_degrees() {
        let json = r#"{ "nodes": [{ "name": "s", "shape": "box", "rotation": [0, 90, 0] }] }"#;
        let loaded = SceneDescription::from_json(json)
            .unwrap()
            .instantiate(Path::new("."))
            .unwrap();
        let world = loaded.scene.shape_nodes()[0].world_matrix();
        let x = world.transform_vector3(Vec3::X);
        assert!((x - Vec3::NEG_Z).length() < 1e-5);
    }

    #[test]
    fn test_load_scene_missing_file() {
        let err = load_scene("/definitely/not/here.json").unwrap_err();
        assert!(matches!(err, SceneError::Io(_)));
    }

    #[test]
    fn test_load_scene_from_disk_shares_meshes() {
        let dir = std::env::temp_dir().join(format!("glint_scene_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("tri.obj"),
            "v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n",
        )
        .unwrap();
        std::fs::write(
            dir.join("scene.json"),
            r#"{ "nodes": [
                { "name": "a", "shape": { "mesh": { "path": "tri.obj" } } },
                { "name": "b", "shape": { "mesh": { "path": "tri.obj", "smooth": true } },
                  "translation": [2, 0, 0] }
            ] }"#,
        )
        .unwrap();

        let loaded = load_scene(dir.join("scene.json")).unwrap();
        assert_eq!(loaded.scene.name, "scene");
        let meshes: Vec<_> = loaded
            .scene
            .shape_nodes()
            .into_iter()
            .filter_map(|n| match &n.shape {
                Some(Shape::Mesh(mesh)) => Some(mesh.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(meshes.len(), 2);
        assert!(Arc::ptr_eq(&meshes[0], &meshes[1]));

        std::fs::remove_dir_all(&dir).ok();
    }
}
