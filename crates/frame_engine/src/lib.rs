//! # Frame Engine
//!
//! A Vulkan rendering layer that owns the frame lifecycle of a windowed application.
//!
//! ## Features
//!
//! - **Frame Orchestration**: acquire, record, submit and present with frames in flight
//! - **Swapchain Recreation**: transparent rebuild on resize, staleness and minimisation
//! - **Staged Mesh Upload**: device-local vertex/index buffers filled through staging buffers
//! - **OBJ Loading**: deduplicated mesh build data from Wavefront OBJ files
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use frame_engine::prelude::*;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ApplicationConfig::default();
//!     let mut window = Window::new(&config.window.title, config.window.width, config.window.height)?;
//!     let context = VulkanContext::new(&mut window, &config.renderer)?;
//!     let mut renderer = Renderer::new(&context, &mut window)?;
//!     let mesh = GpuMesh::new(&context, &MeshBuilder::cube([0.0, 0.0, 0.0]))?;
//!
//!     while !window.should_close() {
//!         window.poll_events();
//!         if let Some(command_buffer) = renderer.begin_frame(&mut window)? {
//!             renderer.begin_swapchain_render_pass(command_buffer);
//!             mesh.bind(&context, command_buffer);
//!             mesh.draw(&context, command_buffer);
//!             renderer.end_swapchain_render_pass(command_buffer);
//!             renderer.end_frame(&mut window)?;
//!         }
//!     }
//!     context.wait_idle()?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

// Core engine modules
pub mod core;

pub mod foundation;
pub mod config;
pub mod assets;
pub mod render;

/// Common imports for engine users
pub mod prelude {
    pub use crate::{
        assets::{MeshError, ObjLoader},
        core::config::{ApplicationConfig, EngineConfig, ShaderConfig, VulkanRendererConfig, WindowConfig},
        config::Config,
        render::{
            GpuMesh, MeshBuilder, Renderer, Vertex, MAX_FRAMES_IN_FLIGHT,
            backend::{BufferAllocator, CommandEncoder, PresentTarget, RenderBackend, WindowSurface},
            vulkan::{VulkanContext, VulkanError, VulkanResult, Window, WindowError},
        },
    };
}
