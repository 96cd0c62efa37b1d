//! Vulkan swapchain management
//!
//! A [`Swapchain`] owns everything whose lifetime is tied to one surface
//! configuration: the presentable images and their views, one depth buffer
//! per image, the render pass, the framebuffers and the per-slot
//! synchronization objects. Rebuilding after a resize means creating a new
//! `Swapchain` from the old one and dropping the old one.

use ash::extensions::khr::Swapchain as SwapchainLoader;
use ash::{vk, Device};

use crate::render::backend::{AcquiredImage, PresentTarget, SwapchainStatus};
use crate::render::vulkan::framebuffer::{DepthBuffer, Framebuffer};
use crate::render::vulkan::render_pass::RenderPass;
use crate::render::vulkan::sync::FrameSync;
use crate::render::vulkan::{VulkanContext, VulkanError, VulkanResult};
use crate::render::MAX_FRAMES_IN_FLIGHT;

/// Preferred presentation format
pub const PREFERRED_SURFACE_FORMAT: vk::SurfaceFormatKHR = vk::SurfaceFormatKHR {
    format: vk::Format::B8G8R8A8_SRGB,
    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
};

/// Pick the preferred surface format, else the first one offered
pub fn choose_surface_format(available: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    available
        .iter()
        .copied()
        .find(|sf| {
            sf.format == PREFERRED_SURFACE_FORMAT.format
                && sf.color_space == PREFERRED_SURFACE_FORMAT.color_space
        })
        .or_else(|| available.first().copied())
}

/// Mailbox when offered, else FIFO which every implementation supports
pub fn choose_present_mode(available: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    if available.contains(&vk::PresentModeKHR::MAILBOX) {
        vk::PresentModeKHR::MAILBOX
    } else {
        vk::PresentModeKHR::FIFO
    }
}

/// Surface extent if fixed, else the window extent clamped to the surface limits
pub fn choose_extent(capabilities: &vk::SurfaceCapabilitiesKHR, window_extent: vk::Extent2D) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }

    vk::Extent2D {
        width: window_extent.width.clamp(
            capabilities.min_image_extent.width,
            capabilities.max_image_extent.width,
        ),
        height: window_extent.height.clamp(
            capabilities.min_image_extent.height,
            capabilities.max_image_extent.height,
        ),
    }
}

/// One more than the minimum, capped by the maximum when there is one
pub fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let desired = capabilities.min_image_count + 1;
    if capabilities.max_image_count > 0 {
        desired.min(capabilities.max_image_count)
    } else {
        desired
    }
}

/// Swapchain with its attachments and frame synchronization
pub struct Swapchain {
    device: Device,
    loader: SwapchainLoader,
    graphics_queue: vk::Queue,
    present_queue: vk::Queue,
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    depth_buffers: Vec<DepthBuffer>,
    framebuffers: Vec<Framebuffer>,
    render_pass: RenderPass,
    frame_sync: Vec<FrameSync>,
    images_in_flight: Vec<vk::Fence>,
    surface_format: vk::SurfaceFormatKHR,
    depth_format: vk::Format,
    extent: vk::Extent2D,
    current_frame: usize,
}

impl Swapchain {
    /// Create a swapchain for `window_extent`
    ///
    /// When `previous` is given its handle is passed as the old swapchain so the
    /// driver can reuse resources; the caller drops `previous` afterwards.
    pub fn new(
        context: &VulkanContext,
        window_extent: vk::Extent2D,
        previous: Option<&Self>,
    ) -> VulkanResult<Self> {
        let device = context.raw_device().clone();
        let loader = context.swapchain_loader().clone();
        let physical_device = context.physical_device();

        let (capabilities, formats, present_modes) = unsafe {
            let surface_loader = context.surface_loader();
            (
                surface_loader
                    .get_physical_device_surface_capabilities(physical_device.device, context.surface())
                    .map_err(VulkanError::Api)?,
                surface_loader
                    .get_physical_device_surface_formats(physical_device.device, context.surface())
                    .map_err(VulkanError::Api)?,
                surface_loader
                    .get_physical_device_surface_present_modes(physical_device.device, context.surface())
                    .map_err(VulkanError::Api)?,
            )
        };

        let surface_format = choose_surface_format(&formats).ok_or_else(|| {
            VulkanError::InitializationFailed("Surface reports no formats".to_string())
        })?;
        let present_mode = choose_present_mode(&present_modes);
        let extent = choose_extent(&capabilities, window_extent);
        let image_count = choose_image_count(&capabilities);

        let (graphics_family, present_family) = context.queue_families();
        let family_indices = [graphics_family, present_family];

        let mut create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(context.surface())
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .pre_transform(capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(previous.map_or(vk::SwapchainKHR::null(), |old| old.swapchain));

        create_info = if graphics_family == present_family {
            create_info.image_sharing_mode(vk::SharingMode::EXCLUSIVE)
        } else {
            create_info
                .image_sharing_mode(vk::SharingMode::CONCURRENT)
                .queue_family_indices(&family_indices)
        };

        let swapchain = unsafe {
            loader.create_swapchain(&create_info, None)
                .map_err(VulkanError::Api)?
        };

        let depth_format = match context.find_depth_format() {
            Ok(format) => format,
            Err(e) => {
                unsafe { loader.destroy_swapchain(swapchain, None) };
                return Err(e);
            }
        };

        let render_pass = match RenderPass::new_forward_pass(device.clone(), surface_format.format, depth_format) {
            Ok(render_pass) => render_pass,
            Err(e) => {
                unsafe { loader.destroy_swapchain(swapchain, None) };
                return Err(e);
            }
        };

        // Everything created below is released by Drop on early return
        let mut chain = Self {
            device,
            loader,
            graphics_queue: context.graphics_queue(),
            present_queue: context.present_queue(),
            swapchain,
            images: Vec::new(),
            image_views: Vec::new(),
            depth_buffers: Vec::new(),
            framebuffers: Vec::new(),
            render_pass,
            frame_sync: Vec::with_capacity(MAX_FRAMES_IN_FLIGHT),
            images_in_flight: Vec::new(),
            surface_format,
            depth_format,
            extent,
            current_frame: 0,
        };

        chain.images = unsafe {
            chain.loader.get_swapchain_images(swapchain)
                .map_err(VulkanError::Api)?
        };
        chain.create_image_views()?;
        chain.create_depth_resources(&physical_device.memory_properties)?;
        chain.create_framebuffers()?;
        chain.create_sync_objects()?;

        log::info!(
            "Created swapchain: {}x{}, {} images, {:?}, {:?}, depth {:?}",
            extent.width,
            extent.height,
            chain.images.len(),
            surface_format.format,
            present_mode,
            depth_format,
        );

        if let Some(old) = previous {
            if old.surface_format.format != surface_format.format || old.depth_format != depth_format {
                log::warn!(
                    "Swapchain formats changed from {:?}/{:?} to {:?}/{:?}",
                    old.surface_format.format,
                    old.depth_format,
                    surface_format.format,
                    depth_format,
                );
            }
        }

        Ok(chain)
    }

    fn create_image_views(&mut self) -> VulkanResult<()> {
        for &image in &self.images {
            let create_info = vk::ImageViewCreateInfo::builder()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(self.surface_format.format)
                .components(vk::ComponentMapping::default())
                .subresource_range(vk::ImageSubresourceRange {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    base_mip_level: 0,
                    level_count: 1,
                    base_array_layer: 0,
                    layer_count: 1,
                });

            let view = unsafe {
                self.device.create_image_view(&create_info, None)
                    .map_err(VulkanError::Api)?
            };
            self.image_views.push(view);
        }
        Ok(())
    }

    fn create_depth_resources(&mut self, memory_properties: &vk::PhysicalDeviceMemoryProperties) -> VulkanResult<()> {
        for _ in 0..self.images.len() {
            let depth = DepthBuffer::new(self.device.clone(), memory_properties, self.depth_format, self.extent)?;
            self.depth_buffers.push(depth);
        }
        Ok(())
    }

    fn create_framebuffers(&mut self) -> VulkanResult<()> {
        for (view, depth) in self.image_views.iter().zip(&self.depth_buffers) {
            let attachments = [*view, depth.image_view()];
            let framebuffer = Framebuffer::new(
                self.device.clone(),
                self.render_pass.handle(),
                &attachments,
                self.extent,
            )?;
            self.framebuffers.push(framebuffer);
        }
        Ok(())
    }

    fn create_sync_objects(&mut self) -> VulkanResult<()> {
        for _ in 0..MAX_FRAMES_IN_FLIGHT {
            self.frame_sync.push(FrameSync::new(self.device.clone())?);
        }
        self.images_in_flight = vec![vk::Fence::null(); self.images.len()];
        Ok(())
    }

    /// Get swapchain handle
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.swapchain
    }

    /// Number of presentable images
    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    /// Image view of the image at `index`
    pub fn image_view(&self, index: usize) -> vk::ImageView {
        self.image_views[index]
    }

    /// Chosen surface format
    pub fn surface_format(&self) -> vk::SurfaceFormatKHR {
        self.surface_format
    }

    /// Image width in pixels
    pub fn width(&self) -> u32 {
        self.extent.width
    }

    /// Image height in pixels
    pub fn height(&self) -> u32 {
        self.extent.height
    }

    /// Width divided by height
    pub fn extent_aspect_ratio(&self) -> f32 {
        self.extent.width as f32 / self.extent.height as f32
    }
}

impl PresentTarget for Swapchain {
    fn acquire_next_image(&mut self) -> VulkanResult<AcquiredImage> {
        let sync = &self.frame_sync[self.current_frame];
        sync.in_flight.wait(u64::MAX)?;

        let result = unsafe {
            self.loader.acquire_next_image(
                self.swapchain,
                u64::MAX,
                sync.image_available.handle(),
                vk::Fence::null(),
            )
        };

        match result {
            Ok((index, suboptimal)) => Ok(AcquiredImage {
                index,
                status: SwapchainStatus::from_suboptimal(suboptimal),
            }),
            Err(code) => SwapchainStatus::from_error(code).map(|status| AcquiredImage { index: 0, status }),
        }
    }

    fn submit_command_buffers(
        &mut self,
        command_buffer: vk::CommandBuffer,
        image_index: u32,
    ) -> VulkanResult<SwapchainStatus> {
        let image = image_index as usize;
        let image_fence = self.images_in_flight[image];
        if image_fence != vk::Fence::null() {
            unsafe {
                self.device.wait_for_fences(&[image_fence], true, u64::MAX)
                    .map_err(VulkanError::Api)?;
            }
        }

        let sync = &self.frame_sync[self.current_frame];
        self.images_in_flight[image] = sync.in_flight.handle();

        let wait_semaphores = [sync.image_available.handle()];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = [command_buffer];
        let signal_semaphores = [sync.render_finished.handle()];

        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores)
            .build();

        sync.in_flight.reset()?;
        unsafe {
            self.device.queue_submit(self.graphics_queue, &[submit_info], sync.in_flight.handle())
                .map_err(VulkanError::Api)?;
        }

        let swapchains = [self.swapchain];
        let image_indices = [image_index];
        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(&signal_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let result = unsafe { self.loader.queue_present(self.present_queue, &present_info) };

        self.current_frame = (self.current_frame + 1) % MAX_FRAMES_IN_FLIGHT;

        match result {
            Ok(suboptimal) => Ok(SwapchainStatus::from_suboptimal(suboptimal)),
            Err(code) => SwapchainStatus::from_error(code),
        }
    }

    fn render_pass(&self) -> vk::RenderPass {
        self.render_pass.handle()
    }

    fn framebuffer(&self, index: usize) -> vk::Framebuffer {
        self.framebuffers[index].handle()
    }

    fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    fn color_format(&self) -> vk::Format {
        self.surface_format.format
    }

    fn depth_format(&self) -> vk::Format {
        self.depth_format
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        // Framebuffers reference the views, views reference the images
        self.framebuffers.clear();
        self.depth_buffers.clear();
        unsafe {
            for &image_view in &self.image_views {
                self.device.destroy_image_view(image_view, None);
            }
            self.loader.destroy_swapchain(self.swapchain, None);
        }
        log::debug!("Destroyed swapchain {}x{}", self.extent.width, self.extent.height);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capabilities(min: u32, max: u32) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: min,
            max_image_count: max,
            current_extent: vk::Extent2D { width: u32::MAX, height: u32::MAX },
            min_image_extent: vk::Extent2D { width: 1, height: 1 },
            max_image_extent: vk::Extent2D { width: 1920, height: 1080 },
            ..Default::default()
        }
    }

    #[test]
    fn test_prefers_srgb_bgra() {
        let formats = [
            vk::SurfaceFormatKHR {
                format: vk::Format::R8G8B8A8_UNORM,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
            PREFERRED_SURFACE_FORMAT,
        ];
        assert_eq!(choose_surface_format(&formats), Some(PREFERRED_SURFACE_FORMAT));
    }

    #[test]
    fn test_falls_back_to_first_format() {
        let first = vk::SurfaceFormatKHR {
            format: vk::Format::R8G8B8A8_UNORM,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        };
        let second = vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_SRGB,
            color_space: vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT,
        };
        assert_eq!(choose_surface_format(&[first, second]), Some(first));
        assert_eq!(choose_surface_format(&[]), None);
    }

    #[test]
    fn test_present_mode_selection() {
        assert_eq!(
            choose_present_mode(&[vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX]),
            vk::PresentModeKHR::MAILBOX
        );
        assert_eq!(
            choose_present_mode(&[vk::PresentModeKHR::IMMEDIATE, vk::PresentModeKHR::FIFO]),
            vk::PresentModeKHR::FIFO
        );
    }

    #[test]
    fn test_fixed_surface_extent_wins() {
        let mut caps = capabilities(2, 3);
        caps.current_extent = vk::Extent2D { width: 1024, height: 768 };

        let extent = choose_extent(&caps, vk::Extent2D { width: 800, height: 600 });
        assert_eq!(extent, vk::Extent2D { width: 1024, height: 768 });
    }

    #[test]
    fn test_window_extent_is_clamped() {
        let caps = capabilities(2, 3);

        let extent = choose_extent(&caps, vk::Extent2D { width: 4000, height: 600 });
        assert_eq!(extent, vk::Extent2D { width: 1920, height: 600 });
    }

    #[test]
    fn test_image_count_selection() {
        assert_eq!(choose_image_count(&capabilities(2, 0)), 3);
        assert_eq!(choose_image_count(&capabilities(2, 8)), 3);
        assert_eq!(choose_image_count(&capabilities(3, 3)), 3);
    }
}
