//! Recording test doubles for the backend traits
//!
//! [`MockDevice`] stands in for the Vulkan context: buffers live in host
//! memory so uploads can be read back, commands are recorded in order and
//! swapchain acquire/present results are scripted.

use ash::vk::{self, Handle};
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use crate::render::backend::{
    AcquiredImage, BufferAllocator, CommandEncoder, GpuBuffer, PresentTarget, RenderBackend, RenderPassBegin,
    SwapchainStatus, WindowSurface,
};
use crate::render::vulkan::{VulkanError, VulkanResult};

/// A recorded command
#[derive(Debug, Clone)]
pub enum Recorded {
    BeginCommandBuffer(vk::CommandBuffer),
    EndCommandBuffer(vk::CommandBuffer),
    BeginRenderPass {
        command_buffer: vk::CommandBuffer,
        begin: RenderPassBegin,
    },
    EndRenderPass(vk::CommandBuffer),
    SetViewport(vk::CommandBuffer, vk::Viewport),
    SetScissor(vk::CommandBuffer, vk::Rect2D),
    BindPipeline(vk::CommandBuffer, vk::Pipeline),
    BindVertexBuffers {
        command_buffer: vk::CommandBuffer,
        first_binding: u32,
        buffers: Vec<vk::Buffer>,
        offsets: Vec<vk::DeviceSize>,
    },
    BindIndexBuffer {
        command_buffer: vk::CommandBuffer,
        buffer: vk::Buffer,
        offset: vk::DeviceSize,
        index_type: vk::IndexType,
    },
    Draw {
        command_buffer: vk::CommandBuffer,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    },
    DrawIndexed {
        command_buffer: vk::CommandBuffer,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    },
}

/// Buffer lifecycle and transfer events
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceEvent {
    Created {
        buffer: vk::Buffer,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        properties: vk::MemoryPropertyFlags,
    },
    Written {
        buffer: vk::Buffer,
        len: usize,
    },
    Copied {
        src: vk::Buffer,
        dst: vk::Buffer,
        size: vk::DeviceSize,
    },
    DestroyBuffer(vk::Buffer),
    FreeMemory(vk::Buffer),
}

#[derive(Default)]
struct MemoryState {
    events: RefCell<Vec<ResourceEvent>>,
    contents: RefCell<HashMap<u64, Vec<u8>>>,
    next_handle: Cell<u64>,
}

/// Host-memory buffer that logs its release
pub struct MockBuffer {
    handle: vk::Buffer,
    size: vk::DeviceSize,
    memory: Rc<MemoryState>,
}

impl GpuBuffer for MockBuffer {
    fn handle(&self) -> vk::Buffer {
        self.handle
    }

    fn size(&self) -> vk::DeviceSize {
        self.size
    }
}

impl Drop for MockBuffer {
    fn drop(&mut self) {
        let mut events = self.memory.events.borrow_mut();
        events.push(ResourceEvent::DestroyBuffer(self.handle));
        events.push(ResourceEvent::FreeMemory(self.handle));
        self.memory.contents.borrow_mut().remove(&self.handle.as_raw());
    }
}

/// Scripted results shared between the device and its swapchains
#[derive(Default)]
struct PresentScript {
    acquire: RefCell<VecDeque<VulkanResult<AcquiredImage>>>,
    present: RefCell<VecDeque<VulkanResult<SwapchainStatus>>>,
    submitted: RefCell<Vec<(vk::CommandBuffer, u32)>>,
}

/// Swapchain double; acquires cycle through three images unless scripted
pub struct MockSwapchain {
    /// Creation ordinal, starting at 1
    pub id: u32,
    /// Ordinal of the swapchain this one replaced
    pub previous_id: Option<u32>,
    extent: vk::Extent2D,
    color_format: vk::Format,
    depth_format: vk::Format,
    next_image: u32,
    script: Rc<PresentScript>,
}

const MOCK_IMAGE_COUNT: u32 = 3;

impl PresentTarget for MockSwapchain {
    fn acquire_next_image(&mut self) -> VulkanResult<AcquiredImage> {
        if let Some(scripted) = self.script.acquire.borrow_mut().pop_front() {
            return scripted;
        }
        let index = self.next_image;
        self.next_image = (self.next_image + 1) % MOCK_IMAGE_COUNT;
        Ok(AcquiredImage {
            index,
            status: SwapchainStatus::Optimal,
        })
    }

    fn submit_command_buffers(
        &mut self,
        command_buffer: vk::CommandBuffer,
        image_index: u32,
    ) -> VulkanResult<SwapchainStatus> {
        self.script.submitted.borrow_mut().push((command_buffer, image_index));
        self.script
            .present
            .borrow_mut()
            .pop_front()
            .unwrap_or(Ok(SwapchainStatus::Optimal))
    }

    fn render_pass(&self) -> vk::RenderPass {
        vk::RenderPass::from_raw(1000 + u64::from(self.id))
    }

    fn framebuffer(&self, index: usize) -> vk::Framebuffer {
        vk::Framebuffer::from_raw(2000 + u64::from(self.id) * 10 + index as u64)
    }

    fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    fn color_format(&self) -> vk::Format {
        self.color_format
    }

    fn depth_format(&self) -> vk::Format {
        self.depth_format
    }
}

/// Device double implementing every backend trait
pub struct MockDevice {
    memory: Rc<MemoryState>,
    commands: RefCell<Vec<Recorded>>,
    fail_copy: Cell<bool>,
    script: Rc<PresentScript>,
    swapchain_extents: RefCell<Vec<vk::Extent2D>>,
    swapchain_previous: RefCell<Vec<Option<u32>>>,
    wait_idle_calls: Cell<u32>,
    allocated: RefCell<Vec<vk::CommandBuffer>>,
    freed: RefCell<Vec<vk::CommandBuffer>>,
    color_format: Cell<vk::Format>,
    depth_format: Cell<vk::Format>,
}

impl MockDevice {
    pub fn new() -> Self {
        Self {
            memory: Rc::new(MemoryState {
                next_handle: Cell::new(1),
                ..MemoryState::default()
            }),
            commands: RefCell::new(Vec::new()),
            fail_copy: Cell::new(false),
            script: Rc::new(PresentScript::default()),
            swapchain_extents: RefCell::new(Vec::new()),
            swapchain_previous: RefCell::new(Vec::new()),
            wait_idle_calls: Cell::new(0),
            allocated: RefCell::new(Vec::new()),
            freed: RefCell::new(Vec::new()),
            color_format: Cell::new(vk::Format::B8G8R8A8_SRGB),
            depth_format: Cell::new(vk::Format::D32_SFLOAT),
        }
    }

    pub fn command_buffer(raw: u64) -> vk::CommandBuffer {
        vk::CommandBuffer::from_raw(raw)
    }

    pub fn read_buffer(&self, buffer: vk::Buffer) -> Vec<u8> {
        self.memory
            .contents
            .borrow()
            .get(&buffer.as_raw())
            .cloned()
            .unwrap_or_default()
    }

    pub fn events(&self) -> Vec<ResourceEvent> {
        self.memory.events.borrow().clone()
    }

    pub fn commands(&self) -> Vec<Recorded> {
        self.commands.borrow().clone()
    }

    pub fn clear_commands(&self) {
        self.commands.borrow_mut().clear();
    }

    pub fn fail_next_copy(&self) {
        self.fail_copy.set(true);
    }

    pub fn script_acquire(&self, result: VulkanResult<AcquiredImage>) {
        self.script.acquire.borrow_mut().push_back(result);
    }

    pub fn script_present(&self, result: VulkanResult<SwapchainStatus>) {
        self.script.present.borrow_mut().push_back(result);
    }

    pub fn submitted(&self) -> Vec<(vk::CommandBuffer, u32)> {
        self.script.submitted.borrow().clone()
    }

    /// Formats reported by swapchains built from now on
    pub fn set_formats(&self, color: vk::Format, depth: vk::Format) {
        self.color_format.set(color);
        self.depth_format.set(depth);
    }

    pub fn swapchains_created(&self) -> usize {
        self.swapchain_extents.borrow().len()
    }

    pub fn swapchain_extents(&self) -> Vec<vk::Extent2D> {
        self.swapchain_extents.borrow().clone()
    }

    pub fn swapchain_previous(&self) -> Vec<Option<u32>> {
        self.swapchain_previous.borrow().clone()
    }

    pub fn wait_idle_calls(&self) -> u32 {
        self.wait_idle_calls.get()
    }

    pub fn allocated_command_buffers(&self) -> Vec<vk::CommandBuffer> {
        self.allocated.borrow().clone()
    }

    pub fn freed_command_buffers(&self) -> Vec<vk::CommandBuffer> {
        self.freed.borrow().clone()
    }

    fn record(&self, command: Recorded) {
        self.commands.borrow_mut().push(command);
    }
}

impl BufferAllocator for MockDevice {
    type Buffer = MockBuffer;

    fn create_buffer(
        &self,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        properties: vk::MemoryPropertyFlags,
    ) -> VulkanResult<MockBuffer> {
        let raw = self.memory.next_handle.get();
        self.memory.next_handle.set(raw + 1);

        let handle = vk::Buffer::from_raw(raw);
        self.memory.contents.borrow_mut().insert(raw, vec![0; size as usize]);
        self.memory.events.borrow_mut().push(ResourceEvent::Created {
            buffer: handle,
            size,
            usage,
            properties,
        });

        Ok(MockBuffer {
            handle,
            size,
            memory: Rc::clone(&self.memory),
        })
    }

    fn write_buffer(&self, buffer: &MockBuffer, bytes: &[u8]) -> VulkanResult<()> {
        let mut contents = self.memory.contents.borrow_mut();
        let target = contents.entry(buffer.handle.as_raw()).or_default();
        target[..bytes.len()].copy_from_slice(bytes);
        self.memory.events.borrow_mut().push(ResourceEvent::Written {
            buffer: buffer.handle,
            len: bytes.len(),
        });
        Ok(())
    }

    fn copy_buffer(&self, src: &MockBuffer, dst: &MockBuffer, size: vk::DeviceSize) -> VulkanResult<()> {
        if self.fail_copy.replace(false) {
            return Err(VulkanError::Api(vk::Result::ERROR_DEVICE_LOST));
        }

        let mut contents = self.memory.contents.borrow_mut();
        let bytes = contents.get(&src.handle.as_raw()).cloned().unwrap_or_default();
        let target = contents.entry(dst.handle.as_raw()).or_default();
        target[..size as usize].copy_from_slice(&bytes[..size as usize]);
        self.memory.events.borrow_mut().push(ResourceEvent::Copied {
            src: src.handle,
            dst: dst.handle,
            size,
        });
        Ok(())
    }
}

impl CommandEncoder for MockDevice {
    fn begin_render_pass(&self, command_buffer: vk::CommandBuffer, begin: &RenderPassBegin) {
        self.record(Recorded::BeginRenderPass {
            command_buffer,
            begin: *begin,
        });
    }

    fn end_render_pass(&self, command_buffer: vk::CommandBuffer) {
        self.record(Recorded::EndRenderPass(command_buffer));
    }

    fn set_viewport(&self, command_buffer: vk::CommandBuffer, viewport: vk::Viewport) {
        self.record(Recorded::SetViewport(command_buffer, viewport));
    }

    fn set_scissor(&self, command_buffer: vk::CommandBuffer, scissor: vk::Rect2D) {
        self.record(Recorded::SetScissor(command_buffer, scissor));
    }

    fn bind_pipeline(&self, command_buffer: vk::CommandBuffer, _bind_point: vk::PipelineBindPoint, pipeline: vk::Pipeline) {
        self.record(Recorded::BindPipeline(command_buffer, pipeline));
    }

    fn bind_vertex_buffers(
        &self,
        command_buffer: vk::CommandBuffer,
        first_binding: u32,
        buffers: &[vk::Buffer],
        offsets: &[vk::DeviceSize],
    ) {
        self.record(Recorded::BindVertexBuffers {
            command_buffer,
            first_binding,
            buffers: buffers.to_vec(),
            offsets: offsets.to_vec(),
        });
    }

    fn bind_index_buffer(
        &self,
        command_buffer: vk::CommandBuffer,
        buffer: vk::Buffer,
        offset: vk::DeviceSize,
        index_type: vk::IndexType,
    ) {
        self.record(Recorded::BindIndexBuffer {
            command_buffer,
            buffer,
            offset,
            index_type,
        });
    }

    fn draw(
        &self,
        command_buffer: vk::CommandBuffer,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    ) {
        self.record(Recorded::Draw {
            command_buffer,
            vertex_count,
            instance_count,
            first_vertex,
            first_instance,
        });
    }

    fn draw_indexed(
        &self,
        command_buffer: vk::CommandBuffer,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    ) {
        self.record(Recorded::DrawIndexed {
            command_buffer,
            index_count,
            instance_count,
            first_index,
            vertex_offset,
            first_instance,
        });
    }
}

impl RenderBackend for MockDevice {
    type Swapchain = MockSwapchain;

    fn create_swapchain(&self, extent: vk::Extent2D, previous: Option<&MockSwapchain>) -> VulkanResult<MockSwapchain> {
        let mut extents = self.swapchain_extents.borrow_mut();
        extents.push(extent);
        let previous_id = previous.map(|old| old.id);
        self.swapchain_previous.borrow_mut().push(previous_id);

        Ok(MockSwapchain {
            id: extents.len() as u32,
            previous_id,
            extent,
            color_format: self.color_format.get(),
            depth_format: self.depth_format.get(),
            next_image: 0,
            script: Rc::clone(&self.script),
        })
    }

    fn wait_idle(&self) -> VulkanResult<()> {
        self.wait_idle_calls.set(self.wait_idle_calls.get() + 1);
        Ok(())
    }

    fn allocate_command_buffers(&self, count: u32) -> VulkanResult<Vec<vk::CommandBuffer>> {
        let mut allocated = self.allocated.borrow_mut();
        let start = allocated.len() as u64;
        let buffers: Vec<_> = (0..u64::from(count))
            .map(|i| vk::CommandBuffer::from_raw(100 + start + i))
            .collect();
        allocated.extend(&buffers);
        Ok(buffers)
    }

    fn free_command_buffers(&self, command_buffers: &[vk::CommandBuffer]) {
        self.freed.borrow_mut().extend_from_slice(command_buffers);
    }

    fn begin_command_buffer(&self, command_buffer: vk::CommandBuffer) -> VulkanResult<()> {
        self.record(Recorded::BeginCommandBuffer(command_buffer));
        Ok(())
    }

    fn end_command_buffer(&self, command_buffer: vk::CommandBuffer) -> VulkanResult<()> {
        self.record(Recorded::EndCommandBuffer(command_buffer));
        Ok(())
    }
}

/// Window double with scripted extents
///
/// Each extent query consumes the next scripted extent; once the script is
/// exhausted the last extent keeps being reported.
pub struct MockWindow {
    script: RefCell<VecDeque<vk::Extent2D>>,
    current: Cell<vk::Extent2D>,
    resized: bool,
    wait_count: u32,
}

impl MockWindow {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            script: RefCell::new(VecDeque::new()),
            current: Cell::new(vk::Extent2D { width, height }),
            resized: false,
            wait_count: 0,
        }
    }

    pub fn script_extents(&self, extents: &[(u32, u32)]) {
        self.script
            .borrow_mut()
            .extend(extents.iter().map(|&(width, height)| vk::Extent2D { width, height }));
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.current.set(vk::Extent2D { width, height });
        self.resized = true;
    }

    pub fn wait_count(&self) -> u32 {
        self.wait_count
    }
}

impl WindowSurface for MockWindow {
    fn extent(&self) -> vk::Extent2D {
        if let Some(next) = self.script.borrow_mut().pop_front() {
            self.current.set(next);
        }
        self.current.get()
    }

    fn was_resized(&self) -> bool {
        self.resized
    }

    fn reset_resized_flag(&mut self) {
        self.resized = false;
    }

    fn wait_events(&mut self) {
        self.wait_count += 1;
    }
}
