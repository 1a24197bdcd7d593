//! Scene graph and flattened acceleration structures for Glint.
//!
//! A [`Scene`] is the editable, hierarchical description of what is rendered.
//! [`accel::build`] flattens it into an [`AcceleratedScene`], the immutable
//! index-addressed form the path tracer walks.

pub mod accel;
pub mod description;
pub mod error;
pub mod mesh;
pub mod scene;

pub use accel::{build, AccelNode, AcceleratedScene, BspNode, BuildConfig, Triangle};
pub use description::{load_scene, LoadedScene, SceneDescription};
pub use error::{AccelError, SceneError, SceneResult};
pub use mesh::Mesh;
pub use scene::{Material, Node, Scene, Shape, Transform};
