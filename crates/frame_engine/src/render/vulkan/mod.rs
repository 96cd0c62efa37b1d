//! Vulkan rendering backend
//!
//! RAII wrappers over `ash` plus the implementations of the backend traits.

pub mod buffer;
pub mod commands;
pub mod context;
pub mod framebuffer;
pub mod pipeline;
pub mod render_pass;
pub mod swapchain;
pub mod sync;
pub mod vertex_layout;
pub mod window;

pub use buffer::Buffer;
pub use commands::CommandPool;
pub use context::{LogicalDevice, PhysicalDeviceInfo, VulkanContext, VulkanError, VulkanInstance, VulkanResult};
pub use framebuffer::{DepthBuffer, Framebuffer};
pub use pipeline::{GraphicsPipeline, PipelineConfig, PipelineLayout, ShaderModule};
pub use render_pass::RenderPass;
pub use swapchain::Swapchain;
pub use sync::{Fence, FrameSync, Semaphore};
pub use vertex_layout::VulkanVertexLayout;
pub use window::{Window, WindowError, WindowResult};
