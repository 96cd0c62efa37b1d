//! Frame lifecycle
//!
//! The [`Renderer`] owns the swapchain and one command buffer per frame slot.
//! A frame is `begin_frame` → record → `end_frame`; stale or resized
//! swapchains are rebuilt in place without surfacing an error.

use ash::vk;
use std::mem;

use crate::render::backend::{ClearValues, PresentTarget, RenderBackend, RenderPassBegin, SwapchainStatus, WindowSurface};
use crate::render::vulkan::{VulkanError, VulkanResult};
use crate::render::MAX_FRAMES_IN_FLIGHT;

/// Clear values of the swapchain render pass
pub const SWAPCHAIN_CLEAR: ClearValues = ClearValues {
    color: [0.01, 0.1, 0.1, 1.0],
    depth: 1.0,
    stencil: 0,
};

/// Frame orchestrator
///
/// Only one frame can be in progress at a time. Calling the frame methods out
/// of order is a programmer error and panics.
pub struct Renderer<'d, B: RenderBackend> {
    device: &'d B,
    swapchain: B::Swapchain,
    command_buffers: Vec<vk::CommandBuffer>,
    current_image_index: u32,
    current_frame_index: usize,
    is_frame_started: bool,
}

impl<'d, B: RenderBackend> Renderer<'d, B> {
    /// Build the first swapchain and allocate the per-slot command buffers
    ///
    /// Blocks while the window is minimised.
    pub fn new<W>(device: &'d B, window: &mut W) -> VulkanResult<Self>
    where
        W: WindowSurface + ?Sized,
    {
        let swapchain = Self::build_swapchain(device, window, None)?;
        let command_buffers = device.allocate_command_buffers(MAX_FRAMES_IN_FLIGHT as u32)?;

        log::info!(
            "Renderer ready: {}x{}, {} frames in flight",
            swapchain.extent().width,
            swapchain.extent().height,
            MAX_FRAMES_IN_FLIGHT
        );

        Ok(Self {
            device,
            swapchain,
            command_buffers,
            current_image_index: 0,
            current_frame_index: 0,
            is_frame_started: false,
        })
    }

    fn build_swapchain<W>(device: &B, window: &mut W, previous: Option<&B::Swapchain>) -> VulkanResult<B::Swapchain>
    where
        W: WindowSurface + ?Sized,
    {
        let mut extent = window.extent();
        while extent.width == 0 || extent.height == 0 {
            log::trace!("Window minimised, waiting for events");
            window.wait_events();
            extent = window.extent();
        }

        device.wait_idle()?;
        device.create_swapchain(extent, previous)
    }

    /// Replace the swapchain with one matching the current window extent
    ///
    /// The new swapchain must keep the color and depth formats, since
    /// pipelines were built against them.
    pub fn recreate_swapchain<W>(&mut self, window: &mut W) -> VulkanResult<()>
    where
        W: WindowSurface + ?Sized,
    {
        let rebuilt = Self::build_swapchain(self.device, window, Some(&self.swapchain))?;
        let previous = mem::replace(&mut self.swapchain, rebuilt);

        if !previous.compare_swap_formats(&self.swapchain) {
            log::error!(
                "Swapchain formats changed: color {:?} -> {:?}, depth {:?} -> {:?}",
                previous.color_format(),
                self.swapchain.color_format(),
                previous.depth_format(),
                self.swapchain.depth_format()
            );
            return Err(VulkanError::SwapchainFormatChanged);
        }

        log::debug!(
            "Swapchain recreated: {}x{}",
            self.swapchain.extent().width,
            self.swapchain.extent().height
        );
        Ok(())
    }

    /// Acquire the next image and begin recording
    ///
    /// Returns `Ok(None)` when the swapchain was out of date and has been
    /// rebuilt; the caller skips rendering for this iteration.
    ///
    /// # Panics
    ///
    /// Panics if a frame is already in progress.
    pub fn begin_frame<W>(&mut self, window: &mut W) -> VulkanResult<Option<vk::CommandBuffer>>
    where
        W: WindowSurface + ?Sized,
    {
        assert!(!self.is_frame_started, "Can't call begin_frame while already in progress");

        let acquired = self.swapchain.acquire_next_image()?;
        if acquired.status == SwapchainStatus::OutOfDate {
            log::debug!("Swapchain out of date on acquire, rebuilding");
            self.recreate_swapchain(window)?;
            return Ok(None);
        }

        self.current_image_index = acquired.index;
        self.is_frame_started = true;

        let command_buffer = self.current_command_buffer();
        self.device.begin_command_buffer(command_buffer)?;
        Ok(Some(command_buffer))
    }

    /// Finish recording, submit and present
    ///
    /// Rebuilds the swapchain when presentation reports it stale or the window
    /// was resized, then advances to the next frame slot.
    ///
    /// # Panics
    ///
    /// Panics if no frame is in progress.
    pub fn end_frame<W>(&mut self, window: &mut W) -> VulkanResult<()>
    where
        W: WindowSurface + ?Sized,
    {
        assert!(self.is_frame_started, "Can't call end_frame while frame is not in progress");

        let command_buffer = self.current_command_buffer();
        self.device.end_command_buffer(command_buffer)?;

        let status = self
            .swapchain
            .submit_command_buffers(command_buffer, self.current_image_index)?;

        if status.needs_rebuild() || window.was_resized() {
            log::debug!("Rebuilding swapchain after present ({status:?})");
            window.reset_resized_flag();
            self.recreate_swapchain(window)?;
        }

        self.is_frame_started = false;
        self.current_frame_index = (self.current_frame_index + 1) % MAX_FRAMES_IN_FLIGHT;
        Ok(())
    }

    /// Begin the swapchain render pass on the acquired image
    ///
    /// Clears color and depth and sets a full-extent viewport and scissor.
    ///
    /// # Panics
    ///
    /// Panics if no frame is in progress or `command_buffer` is not the
    /// current frame's command buffer.
    pub fn begin_swapchain_render_pass(&self, command_buffer: vk::CommandBuffer) {
        self.assert_current(command_buffer, "begin render pass");

        let extent = self.swapchain.extent();
        let render_area = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent,
        };

        self.device.begin_render_pass(
            command_buffer,
            &RenderPassBegin {
                render_pass: self.swapchain.render_pass(),
                framebuffer: self.swapchain.framebuffer(self.current_image_index as usize),
                render_area,
                clear_values: SWAPCHAIN_CLEAR,
            },
        );

        let viewport = vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };
        self.device.set_viewport(command_buffer, viewport);
        self.device.set_scissor(command_buffer, render_area);
    }

    /// End the swapchain render pass
    ///
    /// # Panics
    ///
    /// Same preconditions as [`Self::begin_swapchain_render_pass`].
    pub fn end_swapchain_render_pass(&self, command_buffer: vk::CommandBuffer) {
        self.assert_current(command_buffer, "end render pass");
        self.device.end_render_pass(command_buffer);
    }

    fn assert_current(&self, command_buffer: vk::CommandBuffer, action: &str) {
        assert!(self.is_frame_started, "Can't {action} if frame is not in progress");
        assert!(
            command_buffer == self.current_command_buffer(),
            "Can't {action} on command buffer from a different frame"
        );
    }

    /// Whether a frame is between `begin_frame` and `end_frame`
    pub fn is_frame_in_progress(&self) -> bool {
        self.is_frame_started
    }

    /// Command buffer of the current frame slot
    ///
    /// # Panics
    ///
    /// Panics if no frame is in progress.
    pub fn current_command_buffer(&self) -> vk::CommandBuffer {
        assert!(self.is_frame_started, "Cannot get command buffer when frame not in progress");
        self.command_buffers[self.current_frame_index]
    }

    /// Current frame slot, in `0..MAX_FRAMES_IN_FLIGHT`
    pub fn frame_index(&self) -> usize {
        self.current_frame_index
    }

    /// Render pass pipelines must be compatible with
    pub fn swapchain_render_pass(&self) -> vk::RenderPass {
        self.swapchain.render_pass()
    }

    /// Extent of the swapchain images
    pub fn swapchain_extent(&self) -> vk::Extent2D {
        self.swapchain.extent()
    }

    /// Width over height of the swapchain images
    pub fn aspect_ratio(&self) -> f32 {
        let extent = self.swapchain.extent();
        extent.width as f32 / extent.height as f32
    }

    /// The current swapchain
    pub fn swapchain(&self) -> &B::Swapchain {
        &self.swapchain
    }
}

impl<B: RenderBackend> Drop for Renderer<'_, B> {
    fn drop(&mut self) {
        self.device.free_command_buffers(&self.command_buffers);
        self.command_buffers.clear();
    }
}
