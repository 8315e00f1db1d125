// SPDX-License-Identifier: CEPL-1.0
//! Recording fake of [`GpuDevice`] used by the unit tests.
//!
//! Handles are minted from a counter and tracked until released, host-visible
//! memory is backed by real bytes, and each command buffer keeps the list of
//! commands recorded since its last `begin`.

use crate::device::GpuDevice;
use crate::kernel::{Kernel, Queue};
use crate::pipeline::Pipeline;
use crate::swap_chain::SwapChain;
use ash::prelude::VkResult;
use ash::vk::{self, Handle};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::ffi::c_void;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Kind {
    CommandPool,
    CommandBuffer,
    Buffer,
    Image,
    ImageView,
    Framebuffer,
    Memory,
    Fence,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Cmd {
    Begin(vk::CommandBufferUsageFlags),
    SetViewport([f32; 6]),
    SetScissor([i64; 4]),
    PushConstants {
        layout: vk::PipelineLayout,
        stages: vk::ShaderStageFlags,
        offset: u32,
        bytes: Vec<u8>,
    },
    BeginRenderPass {
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        extent: [u32; 2],
        clear: Vec<[f32; 4]>,
    },
    BindPipeline(vk::PipelineBindPoint, vk::Pipeline),
    BindVertexBuffers {
        first_binding: u32,
        buffers: Vec<vk::Buffer>,
        offsets: Vec<vk::DeviceSize>,
    },
    BindDescriptorSets {
        layout: vk::PipelineLayout,
        first_set: u32,
        sets: Vec<vk::DescriptorSet>,
    },
    Draw {
        vertex_count: u32,
        instance_count: u32,
    },
    EndRenderPass,
    Barrier {
        image: vk::Image,
        old: vk::ImageLayout,
        new: vk::ImageLayout,
        src_access: vk::AccessFlags,
        dst_access: vk::AccessFlags,
        src_stage: vk::PipelineStageFlags,
        dst_stage: vk::PipelineStageFlags,
        aspect: vk::ImageAspectFlags,
        levels: u32,
        layers: u32,
    },
    CopyBufferToImage {
        src: vk::Buffer,
        dst: vk::Image,
        layout: vk::ImageLayout,
        row_length: u32,
    },
    End,
}

pub struct MockDevice {
    next: Cell<u64>,
    live: RefCell<HashMap<u64, Kind>>,
    memory: RefCell<HashMap<u64, Vec<u8>>>,
    bound: RefCell<HashMap<u64, Vec<vk::DeviceMemory>>>,
    buffer_sizes: RefCell<HashMap<u64, vk::DeviceSize>>,
    image_infos: RefCell<HashMap<u64, (vk::ImageCreateFlags, vk::Extent3D)>>,
    commands: RefCell<HashMap<u64, Vec<Cmd>>>,
    submitted: RefCell<Vec<vk::CommandBuffer>>,
    idle_waits: Cell<usize>,
    // Signalled state per live fence.
    fences: RefCell<HashMap<u64, bool>>,
    failing: RefCell<Vec<&'static str>>,
}

/// Memory type 0 is device-local, type 1 host-visible + coherent.
pub fn memory_properties() -> vk::PhysicalDeviceMemoryProperties {
    let mut props = vk::PhysicalDeviceMemoryProperties {
        memory_type_count: 2,
        memory_heap_count: 1,
        ..Default::default()
    };
    props.memory_types[0].property_flags = vk::MemoryPropertyFlags::DEVICE_LOCAL;
    props.memory_types[1].property_flags =
        vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;
    props
}

/// A render context on the fake device with `images` swap-chain images.
pub fn kernel(images: usize, width: u32, height: u32) -> Kernel<MockDevice> {
    Kernel {
        device: MockDevice::new(),
        queue: Queue {
            handle: vk::Queue::from_raw(0xF00),
            queue_family_index: 0,
        },
        swap_chain: swap_chain(images, width, height),
        pipeline: Pipeline {
            pipeline_layout: vk::PipelineLayout::from_raw(0xA01),
            pipeline: vk::Pipeline::from_raw(0xA02),
            descriptor_set_layout: vk::DescriptorSetLayout::from_raw(0xA03),
            descriptor_pool: vk::DescriptorPool::from_raw(0xA04),
            descriptor_sets: vec![vk::DescriptorSet::from_raw(0xA05)],
            sampler: vk::Sampler::from_raw(0xA06),
        },
        memory_properties: memory_properties(),
        surface_rotation: Default::default(),
        invalidate_surface_rotation: false,
    }
}

pub fn swap_chain(images: usize, width: u32, height: u32) -> SwapChain {
    SwapChain {
        handle: vk::SwapchainKHR::null(),
        format: vk::Format::B8G8R8A8_UNORM,
        size: vk::Extent2D { width, height },
        images: (0..images as u64)
            .map(|i| vk::Image::from_raw(0xB00 + i))
            .collect(),
        image_views: (0..images as u64)
            .map(|i| vk::ImageView::from_raw(0xC00 + i))
            .collect(),
        render_pass: vk::RenderPass::from_raw(0xD00),
    }
}

impl MockDevice {
    pub fn new() -> Self {
        Self {
            next: Cell::new(0x10_000),
            live: RefCell::default(),
            memory: RefCell::default(),
            bound: RefCell::default(),
            buffer_sizes: RefCell::default(),
            image_infos: RefCell::default(),
            commands: RefCell::default(),
            submitted: RefCell::default(),
            idle_waits: Cell::new(0),
            fences: RefCell::default(),
            failing: RefCell::default(),
        }
    }

    /// Makes every later call to the named device function fail with
    /// `ERROR_OUT_OF_DEVICE_MEMORY`.
    pub fn fail_on(&self, call: &'static str) {
        self.failing.borrow_mut().push(call);
    }

    pub fn clear_failures(&self) {
        self.failing.borrow_mut().clear();
    }

    fn check(&self, call: &'static str) -> VkResult<()> {
        if self.failing.borrow().contains(&call) {
            Err(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY)
        } else {
            Ok(())
        }
    }

    pub fn is_signaled(&self, fence: vk::Fence) -> bool {
        self.fences.borrow()[&fence.as_raw()]
    }

    fn mint<H: Handle>(&self, kind: Kind) -> H {
        let raw = self.next.get();
        self.next.set(raw + 1);
        self.live.borrow_mut().insert(raw, kind);
        H::from_raw(raw)
    }

    fn release<H: Handle>(&self, handle: H, kind: Kind) {
        let raw = handle.as_raw();
        match self.live.borrow_mut().remove(&raw) {
            Some(k) if k == kind => {}
            other => panic!("released {kind:?} {raw:#x} but live entry was {other:?}"),
        }
    }

    fn record(&self, cmd: vk::CommandBuffer, entry: Cmd) {
        self.commands
            .borrow_mut()
            .entry(cmd.as_raw())
            .or_default()
            .push(entry);
    }

    pub fn live_count(&self, kind: Kind) -> usize {
        self.live.borrow().values().filter(|&&k| k == kind).count()
    }

    pub fn is_live<H: Handle>(&self, handle: H) -> bool {
        self.live.borrow().contains_key(&handle.as_raw())
    }

    pub fn commands(&self, cmd: vk::CommandBuffer) -> Vec<Cmd> {
        self.commands
            .borrow()
            .get(&cmd.as_raw())
            .cloned()
            .unwrap_or_default()
    }

    pub fn memory_bytes(&self, memory: vk::DeviceMemory) -> Vec<u8> {
        self.memory.borrow()[&memory.as_raw()].clone()
    }

    pub fn bound_memory<H: Handle>(&self, handle: H) -> Vec<vk::DeviceMemory> {
        self.bound
            .borrow()
            .get(&handle.as_raw())
            .cloned()
            .unwrap_or_default()
    }

    pub fn submits(&self) -> usize {
        self.submitted.borrow().len()
    }

    /// Command buffers handed to `queue_submit`, in order.
    pub fn submitted(&self) -> Vec<vk::CommandBuffer> {
        self.submitted.borrow().clone()
    }

    pub fn idle_waits(&self) -> usize {
        self.idle_waits.get()
    }

    fn bind(&self, target: u64, memory: vk::DeviceMemory) {
        self.bound.borrow_mut().entry(target).or_default().push(memory);
    }
}

fn padded(size: vk::DeviceSize) -> vk::DeviceSize {
    size.div_ceil(256) * 256
}

impl GpuDevice for MockDevice {
    unsafe fn create_command_pool(
        &self,
        _info: &vk::CommandPoolCreateInfo<'_>,
    ) -> VkResult<vk::CommandPool> {
        Ok(self.mint(Kind::CommandPool))
    }

    unsafe fn destroy_command_pool(&self, pool: vk::CommandPool) {
        self.release(pool, Kind::CommandPool);
    }

    unsafe fn allocate_command_buffers(
        &self,
        info: &vk::CommandBufferAllocateInfo<'_>,
    ) -> VkResult<Vec<vk::CommandBuffer>> {
        assert!(self.is_live(info.command_pool), "allocating from a dead pool");
        Ok((0..info.command_buffer_count)
            .map(|_| self.mint(Kind::CommandBuffer))
            .collect())
    }

    unsafe fn free_command_buffers(&self, _pool: vk::CommandPool, buffers: &[vk::CommandBuffer]) {
        for &cmd in buffers {
            self.release(cmd, Kind::CommandBuffer);
        }
    }

    unsafe fn begin_command_buffer(
        &self,
        cmd: vk::CommandBuffer,
        info: &vk::CommandBufferBeginInfo<'_>,
    ) -> VkResult<()> {
        self.commands
            .borrow_mut()
            .insert(cmd.as_raw(), vec![Cmd::Begin(info.flags)]);
        Ok(())
    }

    unsafe fn end_command_buffer(&self, cmd: vk::CommandBuffer) -> VkResult<()> {
        self.check("end_command_buffer")?;
        self.record(cmd, Cmd::End);
        Ok(())
    }

    unsafe fn cmd_set_viewport(&self, cmd: vk::CommandBuffer, _first: u32, viewports: &[vk::Viewport]) {
        for v in viewports {
            self.record(
                cmd,
                Cmd::SetViewport([v.x, v.y, v.width, v.height, v.min_depth, v.max_depth]),
            );
        }
    }

    unsafe fn cmd_set_scissor(&self, cmd: vk::CommandBuffer, _first: u32, scissors: &[vk::Rect2D]) {
        for s in scissors {
            self.record(
                cmd,
                Cmd::SetScissor([
                    s.offset.x as i64,
                    s.offset.y as i64,
                    s.extent.width as i64,
                    s.extent.height as i64,
                ]),
            );
        }
    }

    unsafe fn cmd_push_constants(
        &self,
        cmd: vk::CommandBuffer,
        layout: vk::PipelineLayout,
        stages: vk::ShaderStageFlags,
        offset: u32,
        constants: &[u8],
    ) {
        self.record(
            cmd,
            Cmd::PushConstants {
                layout,
                stages,
                offset,
                bytes: constants.to_vec(),
            },
        );
    }

    unsafe fn cmd_begin_render_pass(
        &self,
        cmd: vk::CommandBuffer,
        info: &vk::RenderPassBeginInfo<'_>,
        _contents: vk::SubpassContents,
    ) {
        let clears: &[vk::ClearValue] = if info.clear_value_count == 0 {
            &[]
        } else {
            unsafe {
                std::slice::from_raw_parts(info.p_clear_values, info.clear_value_count as usize)
            }
        };
        self.record(
            cmd,
            Cmd::BeginRenderPass {
                render_pass: info.render_pass,
                framebuffer: info.framebuffer,
                extent: [info.render_area.extent.width, info.render_area.extent.height],
                clear: clears.iter().map(|c| unsafe { c.color.float32 }).collect(),
            },
        );
    }

    unsafe fn cmd_end_render_pass(&self, cmd: vk::CommandBuffer) {
        self.record(cmd, Cmd::EndRenderPass);
    }

    unsafe fn cmd_bind_pipeline(
        &self,
        cmd: vk::CommandBuffer,
        bind_point: vk::PipelineBindPoint,
        pipeline: vk::Pipeline,
    ) {
        self.record(cmd, Cmd::BindPipeline(bind_point, pipeline));
    }

    unsafe fn cmd_bind_vertex_buffers(
        &self,
        cmd: vk::CommandBuffer,
        first_binding: u32,
        buffers: &[vk::Buffer],
        offsets: &[vk::DeviceSize],
    ) {
        self.record(
            cmd,
            Cmd::BindVertexBuffers {
                first_binding,
                buffers: buffers.to_vec(),
                offsets: offsets.to_vec(),
            },
        );
    }

    unsafe fn cmd_bind_descriptor_sets(
        &self,
        cmd: vk::CommandBuffer,
        _bind_point: vk::PipelineBindPoint,
        layout: vk::PipelineLayout,
        first_set: u32,
        sets: &[vk::DescriptorSet],
        _dynamic_offsets: &[u32],
    ) {
        self.record(
            cmd,
            Cmd::BindDescriptorSets {
                layout,
                first_set,
                sets: sets.to_vec(),
            },
        );
    }

    unsafe fn cmd_draw(
        &self,
        cmd: vk::CommandBuffer,
        vertex_count: u32,
        instance_count: u32,
        _first_vertex: u32,
        _first_instance: u32,
    ) {
        self.record(
            cmd,
            Cmd::Draw {
                vertex_count,
                instance_count,
            },
        );
    }

    unsafe fn cmd_pipeline_barrier(
        &self,
        cmd: vk::CommandBuffer,
        src_stage: vk::PipelineStageFlags,
        dst_stage: vk::PipelineStageFlags,
        image_barriers: &[vk::ImageMemoryBarrier<'_>],
    ) {
        for b in image_barriers {
            self.record(
                cmd,
                Cmd::Barrier {
                    image: b.image,
                    old: b.old_layout,
                    new: b.new_layout,
                    src_access: b.src_access_mask,
                    dst_access: b.dst_access_mask,
                    src_stage,
                    dst_stage,
                    aspect: b.subresource_range.aspect_mask,
                    levels: b.subresource_range.level_count,
                    layers: b.subresource_range.layer_count,
                },
            );
        }
    }

    unsafe fn cmd_copy_buffer_to_image(
        &self,
        cmd: vk::CommandBuffer,
        src: vk::Buffer,
        dst: vk::Image,
        dst_layout: vk::ImageLayout,
        regions: &[vk::BufferImageCopy],
    ) {
        for r in regions {
            self.record(
                cmd,
                Cmd::CopyBufferToImage {
                    src,
                    dst,
                    layout: dst_layout,
                    row_length: r.buffer_row_length,
                },
            );
        }
    }

    unsafe fn create_buffer(&self, info: &vk::BufferCreateInfo<'_>) -> VkResult<vk::Buffer> {
        let buffer: vk::Buffer = self.mint(Kind::Buffer);
        self.buffer_sizes
            .borrow_mut()
            .insert(buffer.as_raw(), info.size);
        Ok(buffer)
    }

    unsafe fn destroy_buffer(&self, buffer: vk::Buffer) {
        self.release(buffer, Kind::Buffer);
    }

    unsafe fn get_buffer_memory_requirements(&self, buffer: vk::Buffer) -> vk::MemoryRequirements {
        vk::MemoryRequirements {
            size: padded(self.buffer_sizes.borrow()[&buffer.as_raw()]),
            alignment: 256,
            memory_type_bits: 0b11,
        }
    }

    unsafe fn create_image(&self, info: &vk::ImageCreateInfo<'_>) -> VkResult<vk::Image> {
        self.check("create_image")?;
        let image: vk::Image = self.mint(Kind::Image);
        self.image_infos
            .borrow_mut()
            .insert(image.as_raw(), (info.flags, info.extent));
        Ok(image)
    }

    unsafe fn destroy_image(&self, image: vk::Image) {
        self.release(image, Kind::Image);
    }

    unsafe fn get_image_memory_requirements(&self, image: vk::Image) -> vk::MemoryRequirements {
        let (flags, extent) = self.image_infos.borrow()[&image.as_raw()];
        assert!(
            !flags.contains(vk::ImageCreateFlags::DISJOINT),
            "disjoint images must be queried per plane"
        );
        vk::MemoryRequirements {
            size: padded(extent.width as u64 * extent.height as u64 * 4),
            alignment: 256,
            memory_type_bits: 0b01,
        }
    }

    unsafe fn get_image_plane_memory_requirements(
        &self,
        image: vk::Image,
        plane: vk::ImageAspectFlags,
    ) -> vk::MemoryRequirements {
        let (_, extent) = self.image_infos.borrow()[&image.as_raw()];
        let luma = extent.width as u64 * extent.height as u64;
        let size = if plane == vk::ImageAspectFlags::PLANE_0 {
            luma
        } else {
            luma / 2
        };
        vk::MemoryRequirements {
            size: padded(size),
            alignment: 256,
            memory_type_bits: 0b01,
        }
    }

    unsafe fn create_image_view(
        &self,
        _info: &vk::ImageViewCreateInfo<'_>,
    ) -> VkResult<vk::ImageView> {
        Ok(self.mint(Kind::ImageView))
    }

    unsafe fn destroy_image_view(&self, view: vk::ImageView) {
        self.release(view, Kind::ImageView);
    }

    unsafe fn create_framebuffer(
        &self,
        _info: &vk::FramebufferCreateInfo<'_>,
    ) -> VkResult<vk::Framebuffer> {
        Ok(self.mint(Kind::Framebuffer))
    }

    unsafe fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer) {
        self.release(framebuffer, Kind::Framebuffer);
    }

    unsafe fn allocate_memory(
        &self,
        info: &vk::MemoryAllocateInfo<'_>,
    ) -> VkResult<vk::DeviceMemory> {
        let memory: vk::DeviceMemory = self.mint(Kind::Memory);
        self.memory
            .borrow_mut()
            .insert(memory.as_raw(), vec![0; info.allocation_size as usize]);
        Ok(memory)
    }

    unsafe fn free_memory(&self, memory: vk::DeviceMemory) {
        self.release(memory, Kind::Memory);
    }

    unsafe fn map_memory(
        &self,
        memory: vk::DeviceMemory,
        offset: vk::DeviceSize,
        size: vk::DeviceSize,
    ) -> VkResult<*mut c_void> {
        let mut all = self.memory.borrow_mut();
        let bytes = all
            .get_mut(&memory.as_raw())
            .ok_or(vk::Result::ERROR_MEMORY_MAP_FAILED)?;
        if size != vk::WHOLE_SIZE && offset + size > bytes.len() as u64 {
            return Err(vk::Result::ERROR_MEMORY_MAP_FAILED);
        }
        Ok(unsafe { bytes.as_mut_ptr().add(offset as usize) }.cast())
    }

    unsafe fn unmap_memory(&self, _memory: vk::DeviceMemory) {}

    unsafe fn bind_buffer_memory(
        &self,
        buffer: vk::Buffer,
        memory: vk::DeviceMemory,
        _offset: vk::DeviceSize,
    ) -> VkResult<()> {
        self.bind(buffer.as_raw(), memory);
        Ok(())
    }

    unsafe fn bind_image_memory(
        &self,
        image: vk::Image,
        memory: vk::DeviceMemory,
        _offset: vk::DeviceSize,
    ) -> VkResult<()> {
        self.bind(image.as_raw(), memory);
        Ok(())
    }

    unsafe fn bind_image_plane_memory(
        &self,
        image: vk::Image,
        memory: vk::DeviceMemory,
        _plane: vk::ImageAspectFlags,
    ) -> VkResult<()> {
        self.bind(image.as_raw(), memory);
        Ok(())
    }

    unsafe fn queue_submit(
        &self,
        _queue: vk::Queue,
        submits: &[vk::SubmitInfo<'_>],
        fence: vk::Fence,
    ) -> VkResult<()> {
        self.check("queue_submit")?;
        // Work completes immediately.
        if fence != vk::Fence::null() {
            self.fences.borrow_mut().insert(fence.as_raw(), true);
        }
        let mut submitted = self.submitted.borrow_mut();
        for info in submits {
            if info.command_buffer_count > 0 {
                submitted.extend_from_slice(unsafe {
                    std::slice::from_raw_parts(
                        info.p_command_buffers,
                        info.command_buffer_count as usize,
                    )
                });
            }
        }
        Ok(())
    }

    unsafe fn create_fence(&self, info: &vk::FenceCreateInfo<'_>) -> VkResult<vk::Fence> {
        let fence: vk::Fence = self.mint(Kind::Fence);
        self.fences.borrow_mut().insert(
            fence.as_raw(),
            info.flags.contains(vk::FenceCreateFlags::SIGNALED),
        );
        Ok(fence)
    }

    unsafe fn destroy_fence(&self, fence: vk::Fence) {
        self.release(fence, Kind::Fence);
        self.fences.borrow_mut().remove(&fence.as_raw());
    }

    unsafe fn reset_fences(&self, fences: &[vk::Fence]) -> VkResult<()> {
        for fence in fences {
            self.fences.borrow_mut().insert(fence.as_raw(), false);
        }
        Ok(())
    }

    unsafe fn queue_wait_idle(&self, _queue: vk::Queue) -> VkResult<()> {
        self.idle_waits.set(self.idle_waits.get() + 1);
        Ok(())
    }
}
