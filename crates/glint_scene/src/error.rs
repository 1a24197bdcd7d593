//! Error types for scene loading and acceleration-structure building.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while loading a scene description or its meshes.
#[derive(Error, Debug)]
pub enum SceneError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Scene description error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to load OBJ {path}: {source}")]
    Obj {
        path: PathBuf,
        #[source]
        source: tobj::LoadError,
    },

    #[error("No geometry found in {0}")]
    NoGeometry(PathBuf),

    #[error("Unknown material: {0}")]
    UnknownMaterial(String),

    #[error("Invalid node '{name}': {reason}")]
    InvalidNode { name: String, reason: String },
}

/// Result type for scene loading operations.
pub type SceneResult<T> = Result<T, SceneError>;

/// Errors raised when a flattened acceleration structure cannot be used.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AccelError {
    #[error("{kind} tree depth {depth} exceeds traversal stack capacity {capacity}")]
    TooDeep {
        kind: &'static str,
        depth: usize,
        capacity: usize,
    },

    #[error("{kind} node {node} references out-of-range index {index}")]
    BadIndex {
        kind: &'static str,
        node: usize,
        index: usize,
    },
}
