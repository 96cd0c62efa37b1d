//! Asset loading

pub mod obj_loader;

pub use obj_loader::{IndexTriple, ObjAttributes, ObjLoader};

use thiserror::Error;
use crate::render::vulkan::VulkanError;

/// Errors raised while loading or uploading a mesh
#[derive(Error, Debug)]
pub enum MeshError {
    /// OBJ parsing or file access failed
    #[error("Failed to load model: {0}")]
    Load(#[from] tobj::LoadError),

    /// The model has no triangles
    #[error("Model contains no triangles")]
    NoGeometry,

    /// Uploading the mesh to the device failed
    #[error("Failed to upload mesh: {0}")]
    Vulkan(#[from] VulkanError),
}
