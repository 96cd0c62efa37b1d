//! Backend abstraction traits for the rendering system
//!
//! The frame renderer and the mesh upload path only talk to the GPU through the
//! traits in this module. [`VulkanContext`](crate::render::vulkan::VulkanContext)
//! and [`Swapchain`](crate::render::vulkan::Swapchain) implement them on top of
//! `ash`; the test suite implements them with recording mocks.

use ash::vk;
use crate::render::vulkan::{VulkanError, VulkanResult};

/// Window services the renderer needs during swapchain recreation
pub trait WindowSurface {
    /// Current drawable extent in pixels (zero while minimised)
    fn extent(&self) -> vk::Extent2D;

    /// Whether the framebuffer was resized since the flag was last reset
    fn was_resized(&self) -> bool;

    /// Clear the resize flag
    fn reset_resized_flag(&mut self);

    /// Block until at least one window event arrives
    fn wait_events(&mut self);
}

/// A device buffer together with its backing memory
///
/// Dropping the value releases the buffer handle first, then the memory.
pub trait GpuBuffer {
    /// Raw buffer handle for command recording
    fn handle(&self) -> vk::Buffer;

    /// Size in bytes
    fn size(&self) -> vk::DeviceSize;
}

/// Memory-backed buffer allocation and transfer
pub trait BufferAllocator {
    /// Owned buffer type produced by this allocator
    type Buffer: GpuBuffer;

    /// Allocate a buffer with the given usage and memory properties
    fn create_buffer(
        &self,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        properties: vk::MemoryPropertyFlags,
    ) -> VulkanResult<Self::Buffer>;

    /// Copy `bytes` into a host-visible buffer through a map/unmap round trip
    fn write_buffer(&self, buffer: &Self::Buffer, bytes: &[u8]) -> VulkanResult<()>;

    /// Device-side copy of `size` bytes from `src` to `dst`, blocking until done
    fn copy_buffer(&self, src: &Self::Buffer, dst: &Self::Buffer, size: vk::DeviceSize) -> VulkanResult<()>;
}

/// Clear values used when a render pass begins
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClearValues {
    /// RGBA clear color for the color attachment
    pub color: [f32; 4],
    /// Depth clear value
    pub depth: f32,
    /// Stencil clear value
    pub stencil: u32,
}

impl ClearValues {
    /// Vulkan clear values in attachment order (color, depth/stencil)
    pub fn to_vk(&self) -> [vk::ClearValue; 2] {
        [
            vk::ClearValue {
                color: vk::ClearColorValue { float32: self.color },
            },
            vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: self.depth,
                    stencil: self.stencil,
                },
            },
        ]
    }
}

/// Everything needed to record a render pass begin
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderPassBegin {
    /// Render pass to begin
    pub render_pass: vk::RenderPass,
    /// Framebuffer of the acquired image
    pub framebuffer: vk::Framebuffer,
    /// Area affected by the pass
    pub render_area: vk::Rect2D,
    /// Clear values for color and depth
    pub clear_values: ClearValues,
}

/// Command recording into a command buffer
///
/// Mirrors the `vkCmd*` entry points the frame protocol and meshes use.
pub trait CommandEncoder {
    /// Begin a render pass with inline subpass contents
    fn begin_render_pass(&self, command_buffer: vk::CommandBuffer, begin: &RenderPassBegin);

    /// End the current render pass
    fn end_render_pass(&self, command_buffer: vk::CommandBuffer);

    /// Set dynamic viewport 0
    fn set_viewport(&self, command_buffer: vk::CommandBuffer, viewport: vk::Viewport);

    /// Set dynamic scissor 0
    fn set_scissor(&self, command_buffer: vk::CommandBuffer, scissor: vk::Rect2D);

    /// Bind a pipeline
    fn bind_pipeline(&self, command_buffer: vk::CommandBuffer, bind_point: vk::PipelineBindPoint, pipeline: vk::Pipeline);

    /// Bind vertex buffers starting at `first_binding`
    fn bind_vertex_buffers(
        &self,
        command_buffer: vk::CommandBuffer,
        first_binding: u32,
        buffers: &[vk::Buffer],
        offsets: &[vk::DeviceSize],
    );

    /// Bind an index buffer
    fn bind_index_buffer(
        &self,
        command_buffer: vk::CommandBuffer,
        buffer: vk::Buffer,
        offset: vk::DeviceSize,
        index_type: vk::IndexType,
    );

    /// Non-indexed draw
    fn draw(
        &self,
        command_buffer: vk::CommandBuffer,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    );

    /// Indexed draw
    fn draw_indexed(
        &self,
        command_buffer: vk::CommandBuffer,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    );
}

/// Classification of acquire and present results
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapchainStatus {
    /// Swapchain matches the surface
    Optimal,
    /// Usable this frame but should be rebuilt
    Suboptimal,
    /// No longer matches the surface; must be rebuilt before use
    OutOfDate,
}

impl SwapchainStatus {
    /// Status for a successful call reporting the suboptimal flag
    pub const fn from_suboptimal(suboptimal: bool) -> Self {
        if suboptimal {
            Self::Suboptimal
        } else {
            Self::Optimal
        }
    }

    /// Status for a failed call: out-of-date is recoverable, anything else is fatal
    pub fn from_error(code: vk::Result) -> VulkanResult<Self> {
        match code {
            vk::Result::ERROR_OUT_OF_DATE_KHR => Ok(Self::OutOfDate),
            vk::Result::SUBOPTIMAL_KHR => Ok(Self::Suboptimal),
            other => Err(VulkanError::Api(other)),
        }
    }

    /// Whether the swapchain has to be rebuilt
    pub const fn needs_rebuild(self) -> bool {
        !matches!(self, Self::Optimal)
    }
}

/// Result of acquiring a swapchain image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcquiredImage {
    /// Index of the acquired image, meaningless when out of date
    pub index: u32,
    /// Acquisition status
    pub status: SwapchainStatus,
}

/// A swapchain as seen by the frame renderer
pub trait PresentTarget {
    /// Wait for the current frame slot and acquire the next image
    fn acquire_next_image(&mut self) -> VulkanResult<AcquiredImage>;

    /// Submit a recorded command buffer for `image_index` and present it
    fn submit_command_buffers(
        &mut self,
        command_buffer: vk::CommandBuffer,
        image_index: u32,
    ) -> VulkanResult<SwapchainStatus>;

    /// Render pass compatible with the swapchain framebuffers
    fn render_pass(&self) -> vk::RenderPass;

    /// Framebuffer of the image at `index`
    fn framebuffer(&self, index: usize) -> vk::Framebuffer;

    /// Extent of the swapchain images
    fn extent(&self) -> vk::Extent2D;

    /// Format of the color images
    fn color_format(&self) -> vk::Format;

    /// Format of the depth images
    fn depth_format(&self) -> vk::Format;

    /// Whether `other` uses the same color and depth formats
    fn compare_swap_formats(&self, other: &Self) -> bool
    where
        Self: Sized,
    {
        self.color_format() == other.color_format() && self.depth_format() == other.depth_format()
    }
}

/// Device services the frame renderer needs
pub trait RenderBackend: CommandEncoder {
    /// Swapchain type built by this backend
    type Swapchain: PresentTarget;

    /// Build a swapchain for `extent`, optionally replacing `previous`
    fn create_swapchain(
        &self,
        extent: vk::Extent2D,
        previous: Option<&Self::Swapchain>,
    ) -> VulkanResult<Self::Swapchain>;

    /// Block until all submitted GPU work has finished
    fn wait_idle(&self) -> VulkanResult<()>;

    /// Allocate primary command buffers from the device command pool
    fn allocate_command_buffers(&self, count: u32) -> VulkanResult<Vec<vk::CommandBuffer>>;

    /// Return command buffers to the device command pool
    fn free_command_buffers(&self, command_buffers: &[vk::CommandBuffer]);

    /// Begin recording
    fn begin_command_buffer(&self, command_buffer: vk::CommandBuffer) -> VulkanResult<()>;

    /// Finish recording
    fn end_command_buffer(&self, command_buffer: vk::CommandBuffer) -> VulkanResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_from_suboptimal_flag() {
        assert_eq!(SwapchainStatus::from_suboptimal(false), SwapchainStatus::Optimal);
        assert_eq!(SwapchainStatus::from_suboptimal(true), SwapchainStatus::Suboptimal);
    }

    #[test]
    fn test_out_of_date_is_recoverable() {
        let status = SwapchainStatus::from_error(vk::Result::ERROR_OUT_OF_DATE_KHR).unwrap();
        assert_eq!(status, SwapchainStatus::OutOfDate);
        assert!(status.needs_rebuild());
    }

    #[test]
    fn test_other_errors_are_fatal() {
        for code in [
            vk::Result::ERROR_DEVICE_LOST,
            vk::Result::ERROR_SURFACE_LOST_KHR,
            vk::Result::ERROR_OUT_OF_HOST_MEMORY,
        ] {
            match SwapchainStatus::from_error(code) {
                Err(VulkanError::Api(reported)) => assert_eq!(reported, code),
                other => panic!("expected fatal error for {code:?}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_only_optimal_skips_rebuild() {
        assert!(!SwapchainStatus::Optimal.needs_rebuild());
        assert!(SwapchainStatus::Suboptimal.needs_rebuild());
    }
}
