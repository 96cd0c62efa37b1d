//! # Rendering System
//!
//! Frame orchestration and GPU geometry on top of the Vulkan backend.
//!
//! ## Architecture
//!
//! - **Renderer**: drives acquire, record, submit and present, and rebuilds the
//!   swapchain when the surface changes
//! - **Mesh**: CPU-side build data and device-local mesh buffers
//! - **Backend traits**: the seams the renderer and meshes are written against
//! - **Vulkan Backend**: `ash` implementation of those traits

pub mod backend;
pub mod mesh;
pub mod renderer;
pub mod vulkan;

#[cfg(test)]
pub(crate) mod testing;

/// Number of frames the CPU may record ahead of the GPU
pub const MAX_FRAMES_IN_FLIGHT: usize = 2;

pub use mesh::{GpuMesh, MeshBuilder, Vertex, VertexKey};
pub use renderer::Renderer;
