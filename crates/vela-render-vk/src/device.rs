// SPDX-License-Identifier: CEPL-1.0
//! The slice of `VkDevice` the recording core touches.
//!
//! Everything that creates, binds, records or frees goes through this trait so
//! the recorder, image storage and texture can run against a fake device in
//! tests. `ash::Device` implements it by plain forwarding.
//!
//! Every method is `unsafe` for the same reason the `ash` calls are: handles
//! passed in must be valid and owned by this device, and objects must not be
//! destroyed while the GPU still uses them.

use ash::prelude::VkResult;
use ash::vk;
use std::ffi::c_void;

pub trait GpuDevice {
    // --- command pool / buffers ---
    unsafe fn create_command_pool(
        &self,
        info: &vk::CommandPoolCreateInfo<'_>,
    ) -> VkResult<vk::CommandPool>;
    unsafe fn destroy_command_pool(&self, pool: vk::CommandPool);
    unsafe fn allocate_command_buffers(
        &self,
        info: &vk::CommandBufferAllocateInfo<'_>,
    ) -> VkResult<Vec<vk::CommandBuffer>>;
    unsafe fn free_command_buffers(&self, pool: vk::CommandPool, buffers: &[vk::CommandBuffer]);
    unsafe fn begin_command_buffer(
        &self,
        cmd: vk::CommandBuffer,
        info: &vk::CommandBufferBeginInfo<'_>,
    ) -> VkResult<()>;
    unsafe fn end_command_buffer(&self, cmd: vk::CommandBuffer) -> VkResult<()>;

    // --- recording ---
    unsafe fn cmd_set_viewport(&self, cmd: vk::CommandBuffer, first: u32, viewports: &[vk::Viewport]);
    unsafe fn cmd_set_scissor(&self, cmd: vk::CommandBuffer, first: u32, scissors: &[vk::Rect2D]);
    unsafe fn cmd_push_constants(
        &self,
        cmd: vk::CommandBuffer,
        layout: vk::PipelineLayout,
        stages: vk::ShaderStageFlags,
        offset: u32,
        constants: &[u8],
    );
    unsafe fn cmd_begin_render_pass(
        &self,
        cmd: vk::CommandBuffer,
        info: &vk::RenderPassBeginInfo<'_>,
        contents: vk::SubpassContents,
    );
    unsafe fn cmd_end_render_pass(&self, cmd: vk::CommandBuffer);
    unsafe fn cmd_bind_pipeline(
        &self,
        cmd: vk::CommandBuffer,
        bind_point: vk::PipelineBindPoint,
        pipeline: vk::Pipeline,
    );
    unsafe fn cmd_bind_vertex_buffers(
        &self,
        cmd: vk::CommandBuffer,
        first_binding: u32,
        buffers: &[vk::Buffer],
        offsets: &[vk::DeviceSize],
    );
    unsafe fn cmd_bind_descriptor_sets(
        &self,
        cmd: vk::CommandBuffer,
        bind_point: vk::PipelineBindPoint,
        layout: vk::PipelineLayout,
        first_set: u32,
        sets: &[vk::DescriptorSet],
        dynamic_offsets: &[u32],
    );
    unsafe fn cmd_draw(
        &self,
        cmd: vk::CommandBuffer,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    );
    unsafe fn cmd_pipeline_barrier(
        &self,
        cmd: vk::CommandBuffer,
        src_stage: vk::PipelineStageFlags,
        dst_stage: vk::PipelineStageFlags,
        image_barriers: &[vk::ImageMemoryBarrier<'_>],
    );
    unsafe fn cmd_copy_buffer_to_image(
        &self,
        cmd: vk::CommandBuffer,
        src: vk::Buffer,
        dst: vk::Image,
        dst_layout: vk::ImageLayout,
        regions: &[vk::BufferImageCopy],
    );

    // --- buffers / images ---
    unsafe fn create_buffer(&self, info: &vk::BufferCreateInfo<'_>) -> VkResult<vk::Buffer>;
    unsafe fn destroy_buffer(&self, buffer: vk::Buffer);
    unsafe fn get_buffer_memory_requirements(&self, buffer: vk::Buffer) -> vk::MemoryRequirements;
    unsafe fn create_image(&self, info: &vk::ImageCreateInfo<'_>) -> VkResult<vk::Image>;
    unsafe fn destroy_image(&self, image: vk::Image);
    unsafe fn get_image_memory_requirements(&self, image: vk::Image) -> vk::MemoryRequirements;
    /// Requirements of one plane of a disjoint multi-planar image.
    unsafe fn get_image_plane_memory_requirements(
        &self,
        image: vk::Image,
        plane: vk::ImageAspectFlags,
    ) -> vk::MemoryRequirements;
    unsafe fn create_image_view(&self, info: &vk::ImageViewCreateInfo<'_>)
        -> VkResult<vk::ImageView>;
    unsafe fn destroy_image_view(&self, view: vk::ImageView);
    unsafe fn create_framebuffer(
        &self,
        info: &vk::FramebufferCreateInfo<'_>,
    ) -> VkResult<vk::Framebuffer>;
    unsafe fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer);

    // --- memory ---
    unsafe fn allocate_memory(&self, info: &vk::MemoryAllocateInfo<'_>)
        -> VkResult<vk::DeviceMemory>;
    unsafe fn free_memory(&self, memory: vk::DeviceMemory);
    unsafe fn map_memory(
        &self,
        memory: vk::DeviceMemory,
        offset: vk::DeviceSize,
        size: vk::DeviceSize,
    ) -> VkResult<*mut c_void>;
    unsafe fn unmap_memory(&self, memory: vk::DeviceMemory);
    unsafe fn bind_buffer_memory(
        &self,
        buffer: vk::Buffer,
        memory: vk::DeviceMemory,
        offset: vk::DeviceSize,
    ) -> VkResult<()>;
    unsafe fn bind_image_memory(
        &self,
        image: vk::Image,
        memory: vk::DeviceMemory,
        offset: vk::DeviceSize,
    ) -> VkResult<()>;
    unsafe fn bind_image_plane_memory(
        &self,
        image: vk::Image,
        memory: vk::DeviceMemory,
        plane: vk::ImageAspectFlags,
    ) -> VkResult<()>;

    // --- sync ---
    unsafe fn create_fence(&self, info: &vk::FenceCreateInfo<'_>) -> VkResult<vk::Fence>;
    unsafe fn destroy_fence(&self, fence: vk::Fence);
    unsafe fn reset_fences(&self, fences: &[vk::Fence]) -> VkResult<()>;

    // --- queue ---
    unsafe fn queue_submit(
        &self,
        queue: vk::Queue,
        submits: &[vk::SubmitInfo<'_>],
        fence: vk::Fence,
    ) -> VkResult<()>;
    unsafe fn queue_wait_idle(&self, queue: vk::Queue) -> VkResult<()>;
}

impl GpuDevice for ash::Device {
    unsafe fn create_command_pool(
        &self,
        info: &vk::CommandPoolCreateInfo<'_>,
    ) -> VkResult<vk::CommandPool> {
        ash::Device::create_command_pool(self, info, None)
    }

    unsafe fn destroy_command_pool(&self, pool: vk::CommandPool) {
        ash::Device::destroy_command_pool(self, pool, None)
    }

    unsafe fn allocate_command_buffers(
        &self,
        info: &vk::CommandBufferAllocateInfo<'_>,
    ) -> VkResult<Vec<vk::CommandBuffer>> {
        ash::Device::allocate_command_buffers(self, info)
    }

    unsafe fn free_command_buffers(&self, pool: vk::CommandPool, buffers: &[vk::CommandBuffer]) {
        ash::Device::free_command_buffers(self, pool, buffers)
    }

    unsafe fn begin_command_buffer(
        &self,
        cmd: vk::CommandBuffer,
        info: &vk::CommandBufferBeginInfo<'_>,
    ) -> VkResult<()> {
        ash::Device::begin_command_buffer(self, cmd, info)
    }

    unsafe fn end_command_buffer(&self, cmd: vk::CommandBuffer) -> VkResult<()> {
        ash::Device::end_command_buffer(self, cmd)
    }

    unsafe fn cmd_set_viewport(&self, cmd: vk::CommandBuffer, first: u32, viewports: &[vk::Viewport]) {
        ash::Device::cmd_set_viewport(self, cmd, first, viewports)
    }

    unsafe fn cmd_set_scissor(&self, cmd: vk::CommandBuffer, first: u32, scissors: &[vk::Rect2D]) {
        ash::Device::cmd_set_scissor(self, cmd, first, scissors)
    }

    unsafe fn cmd_push_constants(
        &self,
        cmd: vk::CommandBuffer,
        layout: vk::PipelineLayout,
        stages: vk::ShaderStageFlags,
        offset: u32,
        constants: &[u8],
    ) {
        ash::Device::cmd_push_constants(self, cmd, layout, stages, offset, constants)
    }

    unsafe fn cmd_begin_render_pass(
        &self,
        cmd: vk::CommandBuffer,
        info: &vk::RenderPassBeginInfo<'_>,
        contents: vk::SubpassContents,
    ) {
        ash::Device::cmd_begin_render_pass(self, cmd, info, contents)
    }

    unsafe fn cmd_end_render_pass(&self, cmd: vk::CommandBuffer) {
        ash::Device::cmd_end_render_pass(self, cmd)
    }

    unsafe fn cmd_bind_pipeline(
        &self,
        cmd: vk::CommandBuffer,
        bind_point: vk::PipelineBindPoint,
        pipeline: vk::Pipeline,
    ) {
        ash::Device::cmd_bind_pipeline(self, cmd, bind_point, pipeline)
    }

    unsafe fn cmd_bind_vertex_buffers(
        &self,
        cmd: vk::CommandBuffer,
        first_binding: u32,
        buffers: &[vk::Buffer],
        offsets: &[vk::DeviceSize],
    ) {
        ash::Device::cmd_bind_vertex_buffers(self, cmd, first_binding, buffers, offsets)
    }

    unsafe fn cmd_bind_descriptor_sets(
        &self,
        cmd: vk::CommandBuffer,
        bind_point: vk::PipelineBindPoint,
        layout: vk::PipelineLayout,
        first_set: u32,
        sets: &[vk::DescriptorSet],
        dynamic_offsets: &[u32],
    ) {
        ash::Device::cmd_bind_descriptor_sets(
            self,
            cmd,
            bind_point,
            layout,
            first_set,
            sets,
            dynamic_offsets,
        )
    }

    unsafe fn cmd_draw(
        &self,
        cmd: vk::CommandBuffer,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    ) {
        ash::Device::cmd_draw(
            self,
            cmd,
            vertex_count,
            instance_count,
            first_vertex,
            first_instance,
        )
    }

    unsafe fn cmd_pipeline_barrier(
        &self,
        cmd: vk::CommandBuffer,
        src_stage: vk::PipelineStageFlags,
        dst_stage: vk::PipelineStageFlags,
        image_barriers: &[vk::ImageMemoryBarrier<'_>],
    ) {
        ash::Device::cmd_pipeline_barrier(
            self,
            cmd,
            src_stage,
            dst_stage,
            vk::DependencyFlags::empty(),
            &[],
            &[],
            image_barriers,
        )
    }

    unsafe fn cmd_copy_buffer_to_image(
        &self,
        cmd: vk::CommandBuffer,
        src: vk::Buffer,
        dst: vk::Image,
        dst_layout: vk::ImageLayout,
        regions: &[vk::BufferImageCopy],
    ) {
        ash::Device::cmd_copy_buffer_to_image(self, cmd, src, dst, dst_layout, regions)
    }

    unsafe fn create_buffer(&self, info: &vk::BufferCreateInfo<'_>) -> VkResult<vk::Buffer> {
        ash::Device::create_buffer(self, info, None)
    }

    unsafe fn destroy_buffer(&self, buffer: vk::Buffer) {
        ash::Device::destroy_buffer(self, buffer, None)
    }

    unsafe fn get_buffer_memory_requirements(&self, buffer: vk::Buffer) -> vk::MemoryRequirements {
        ash::Device::get_buffer_memory_requirements(self, buffer)
    }

    unsafe fn create_image(&self, info: &vk::ImageCreateInfo<'_>) -> VkResult<vk::Image> {
        ash::Device::create_image(self, info, None)
    }

    unsafe fn destroy_image(&self, image: vk::Image) {
        ash::Device::destroy_image(self, image, None)
    }

    unsafe fn get_image_memory_requirements(&self, image: vk::Image) -> vk::MemoryRequirements {
        ash::Device::get_image_memory_requirements(self, image)
    }

    unsafe fn get_image_plane_memory_requirements(
        &self,
        image: vk::Image,
        plane: vk::ImageAspectFlags,
    ) -> vk::MemoryRequirements {
        let mut plane_info = vk::ImagePlaneMemoryRequirementsInfo::default().plane_aspect(plane);
        let info = vk::ImageMemoryRequirementsInfo2::default()
            .image(image)
            .push_next(&mut plane_info);
        let mut out = vk::MemoryRequirements2::default();
        ash::Device::get_image_memory_requirements2(self, &info, &mut out);
        out.memory_requirements
    }

    unsafe fn create_image_view(
        &self,
        info: &vk::ImageViewCreateInfo<'_>,
    ) -> VkResult<vk::ImageView> {
        ash::Device::create_image_view(self, info, None)
    }

    unsafe fn destroy_image_view(&self, view: vk::ImageView) {
        ash::Device::destroy_image_view(self, view, None)
    }

    unsafe fn create_framebuffer(
        &self,
        info: &vk::FramebufferCreateInfo<'_>,
    ) -> VkResult<vk::Framebuffer> {
        ash::Device::create_framebuffer(self, info, None)
    }

    unsafe fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer) {
        ash::Device::destroy_framebuffer(self, framebuffer, None)
    }

    unsafe fn allocate_memory(
        &self,
        info: &vk::MemoryAllocateInfo<'_>,
    ) -> VkResult<vk::DeviceMemory> {
        ash::Device::allocate_memory(self, info, None)
    }

    unsafe fn free_memory(&self, memory: vk::DeviceMemory) {
        ash::Device::free_memory(self, memory, None)
    }

    unsafe fn map_memory(
        &self,
        memory: vk::DeviceMemory,
        offset: vk::DeviceSize,
        size: vk::DeviceSize,
    ) -> VkResult<*mut c_void> {
        ash::Device::map_memory(self, memory, offset, size, vk::MemoryMapFlags::empty())
    }

    unsafe fn unmap_memory(&self, memory: vk::DeviceMemory) {
        ash::Device::unmap_memory(self, memory)
    }

    unsafe fn bind_buffer_memory(
        &self,
        buffer: vk::Buffer,
        memory: vk::DeviceMemory,
        offset: vk::DeviceSize,
    ) -> VkResult<()> {
        ash::Device::bind_buffer_memory(self, buffer, memory, offset)
    }

    unsafe fn bind_image_memory(
        &self,
        image: vk::Image,
        memory: vk::DeviceMemory,
        offset: vk::DeviceSize,
    ) -> VkResult<()> {
        ash::Device::bind_image_memory(self, image, memory, offset)
    }

    unsafe fn bind_image_plane_memory(
        &self,
        image: vk::Image,
        memory: vk::DeviceMemory,
        plane: vk::ImageAspectFlags,
    ) -> VkResult<()> {
        let mut plane_info = vk::BindImagePlaneMemoryInfo::default().plane_aspect(plane);
        let info = vk::BindImageMemoryInfo::default()
            .image(image)
            .memory(memory)
            .memory_offset(0)
            .push_next(&mut plane_info);
        ash::Device::bind_image_memory2(self, std::slice::from_ref(&info))
    }

    unsafe fn create_fence(&self, info: &vk::FenceCreateInfo<'_>) -> VkResult<vk::Fence> {
        ash::Device::create_fence(self, info, None)
    }

    unsafe fn destroy_fence(&self, fence: vk::Fence) {
        ash::Device::destroy_fence(self, fence, None)
    }

    unsafe fn reset_fences(&self, fences: &[vk::Fence]) -> VkResult<()> {
        ash::Device::reset_fences(self, fences)
    }

    unsafe fn queue_submit(
        &self,
        queue: vk::Queue,
        submits: &[vk::SubmitInfo<'_>],
        fence: vk::Fence,
    ) -> VkResult<()> {
        ash::Device::queue_submit(self, queue, submits, fence)
    }

    unsafe fn queue_wait_idle(&self, queue: vk::Queue) -> VkResult<()> {
        ash::Device::queue_wait_idle(self, queue)
    }
}
