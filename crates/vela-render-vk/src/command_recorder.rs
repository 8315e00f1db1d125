// SPDX-License-Identifier: CEPL-1.0
use crate::device::GpuDevice;
use crate::error::{RenderError, Result};
use crate::kernel::Kernel;
use crate::pipeline::Vertex;
use crate::texture::Texture;
use ash::vk;
use tracing::{debug, info};

/// Full-screen quad as a triangle strip, texture origin at the top left.
pub const QUAD_VERTICES: [Vertex; 4] = [
    Vertex {
        position: [-1.0, 1.0],
        tex_coord: [0.0, 1.0],
    },
    Vertex {
        position: [1.0, 1.0],
        tex_coord: [1.0, 1.0],
    },
    Vertex {
        position: [-1.0, -1.0],
        tex_coord: [0.0, 0.0],
    },
    Vertex {
        position: [1.0, -1.0],
        tex_coord: [1.0, 0.0],
    },
];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecorderState {
    /// Nothing valid is recorded yet.
    Idle,
    /// Every command buffer draws the current textures.
    Recorded,
}

/// One primary command buffer and framebuffer per swap-chain image, plus the
/// quad's vertex buffer.
///
/// The buffers are re-recorded as a whole by [`CommandRecorder::set_textures`]
/// and submitted unchanged every frame. A new swap chain needs `tear_down`
/// followed by `set_up`.
pub struct CommandRecorder {
    command_pool: vk::CommandPool,
    command_buffers: Vec<vk::CommandBuffer>,
    framebuffers: Vec<vk::Framebuffer>,
    buffers: Vec<vk::Buffer>,
    memories: Vec<vk::DeviceMemory>,
    offsets: Vec<vk::DeviceSize>,
    state: RecorderState,
}

impl Default for CommandRecorder {
    fn default() -> Self {
        Self {
            command_pool: vk::CommandPool::null(),
            command_buffers: Vec::new(),
            framebuffers: Vec::new(),
            buffers: Vec::new(),
            memories: Vec::new(),
            offsets: Vec::new(),
            state: RecorderState::Idle,
        }
    }
}

impl CommandRecorder {
    pub fn state(&self) -> RecorderState {
        self.state
    }

    pub fn command_buffers(&self) -> &[vk::CommandBuffer] {
        &self.command_buffers
    }

    pub fn framebuffers(&self) -> &[vk::Framebuffer] {
        &self.framebuffers
    }

    fn is_set_up(&self) -> bool {
        self.command_pool != vk::CommandPool::null() && !self.buffers.is_empty()
    }

    /// Allocates everything for the kernel's current swap chain. Call once,
    /// or again only after [`CommandRecorder::tear_down`]. On failure the
    /// partial set-up is released.
    pub fn set_up<D: GpuDevice>(&mut self, kernel: &Kernel<D>) -> Result<()> {
        let created = unsafe { self.create(kernel) };
        match created {
            Ok(()) => {
                info!(
                    "command recorder ready ({} command buffers)",
                    self.command_buffers.len()
                );
                Ok(())
            }
            Err(e) => {
                unsafe { self.tear_down(kernel) };
                Err(e)
            }
        }
    }

    unsafe fn create<D: GpuDevice>(&mut self, kernel: &Kernel<D>) -> Result<()> {
        let device = &kernel.device;
        let pool_info = vk::CommandPoolCreateInfo {
            s_type: vk::StructureType::COMMAND_POOL_CREATE_INFO,
            flags: vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
            queue_family_index: kernel.queue.queue_family_index,
            ..Default::default()
        };
        self.command_pool = device.create_command_pool(&pool_info)?;

        let count = kernel.swap_chain.images_count();
        let alloc_info = vk::CommandBufferAllocateInfo {
            s_type: vk::StructureType::COMMAND_BUFFER_ALLOCATE_INFO,
            command_pool: self.command_pool,
            level: vk::CommandBufferLevel::PRIMARY,
            command_buffer_count: count as u32,
            ..Default::default()
        };
        self.command_buffers = device.allocate_command_buffers(&alloc_info)?;

        for index in 0..count {
            let framebuffer = kernel.swap_chain.create_framebuffer(device, index)?;
            self.framebuffers.push(framebuffer);
        }

        self.create_buffer(kernel, bytemuck::cast_slice(&QUAD_VERTICES))?;
        self.state = RecorderState::Idle;
        Ok(())
    }

    /// Frees the command buffers and destroys every owned object, the pool
    /// last. Safe to call on a partial or repeated set-up.
    ///
    /// # Safety
    /// None of the owned objects may still be in use by the GPU.
    pub unsafe fn tear_down<D: GpuDevice>(&mut self, kernel: &Kernel<D>) {
        let device = &kernel.device;
        if !self.command_buffers.is_empty() {
            device.free_command_buffers(self.command_pool, &self.command_buffers);
            self.command_buffers.clear();
        }
        for framebuffer in self.framebuffers.drain(..) {
            device.destroy_framebuffer(framebuffer);
        }
        for buffer in self.buffers.drain(..) {
            device.destroy_buffer(buffer);
        }
        for memory in self.memories.drain(..) {
            device.free_memory(memory);
        }
        self.offsets.clear();
        if self.command_pool != vk::CommandPool::null() {
            device.destroy_command_pool(self.command_pool);
            self.command_pool = vk::CommandPool::null();
        }
        self.state = RecorderState::Idle;
    }

    /// Re-records every command buffer to draw `textures[0]`, then clears the
    /// textures' and the kernel's invalidation flags.
    ///
    /// The caller must make sure none of the buffers is pending execution.
    /// On error the recorder stays [`RecorderState::Idle`] and a buffer may be
    /// left mid-recording: tear the recorder down and set it up again before
    /// recording once more.
    pub fn set_textures<D: GpuDevice>(
        &mut self,
        kernel: &mut Kernel<D>,
        textures: &mut [Texture],
    ) -> Result<()> {
        if !self.is_set_up() {
            return Err(RenderError::NotSetUp);
        }
        let texture = textures.first().ok_or(RenderError::NoTextures)?;

        let viewport = texture.get_viewport(kernel);
        let push_constants = texture.get_push_constants(kernel);
        let extent = kernel.swap_chain.size;
        let scissor = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent,
        };
        let clear = vk::ClearValue {
            color: vk::ClearColorValue {
                float32: [0.0, 0.0, 0.0, 1.0],
            },
        };

        self.state = RecorderState::Idle;
        for (&cmd, &framebuffer) in self.command_buffers.iter().zip(&self.framebuffers) {
            unsafe {
                record_frame(
                    kernel,
                    cmd,
                    framebuffer,
                    viewport,
                    scissor,
                    &clear,
                    bytemuck::bytes_of(&push_constants),
                    self.buffers[0],
                    self.offsets[0],
                )?;
            }
        }

        for texture in textures.iter_mut() {
            texture.invalidate_layout = false;
        }
        kernel.invalidate_surface_rotation = false;
        self.state = RecorderState::Recorded;

        debug!(
            "recorded {} command buffers (viewport {}x{} at {},{})",
            self.command_buffers.len(),
            viewport.width,
            viewport.height,
            viewport.x,
            viewport.y
        );
        Ok(())
    }

    /// A fresh primary command buffer for one-off work. The caller records,
    /// submits and hands it back through [`CommandRecorder::free`].
    pub fn allocate<D: GpuDevice>(&self, kernel: &Kernel<D>) -> Result<vk::CommandBuffer> {
        if self.command_pool == vk::CommandPool::null() {
            return Err(RenderError::NotSetUp);
        }
        let alloc_info = vk::CommandBufferAllocateInfo {
            s_type: vk::StructureType::COMMAND_BUFFER_ALLOCATE_INFO,
            command_pool: self.command_pool,
            level: vk::CommandBufferLevel::PRIMARY,
            command_buffer_count: 1,
            ..Default::default()
        };
        let buffers = unsafe { kernel.device.allocate_command_buffers(&alloc_info)? };
        buffers
            .into_iter()
            .next()
            .ok_or(RenderError::Vk(vk::Result::ERROR_UNKNOWN))
    }

    /// # Safety
    /// `cmd` must come from [`CommandRecorder::allocate`] and not be pending.
    pub unsafe fn free<D: GpuDevice>(&self, kernel: &Kernel<D>, cmd: vk::CommandBuffer) {
        kernel
            .device
            .free_command_buffers(self.command_pool, std::slice::from_ref(&cmd));
    }

    /// Host-visible vertex buffer holding `data`, bound at offset 0. The
    /// allocation is sized from the buffer's memory requirements.
    pub fn create_buffer<D: GpuDevice>(&mut self, kernel: &Kernel<D>, data: &[u8]) -> Result<vk::Buffer> {
        let device = &kernel.device;
        unsafe {
            let buffer_info = vk::BufferCreateInfo {
                s_type: vk::StructureType::BUFFER_CREATE_INFO,
                size: data.len() as vk::DeviceSize,
                usage: vk::BufferUsageFlags::VERTEX_BUFFER,
                sharing_mode: vk::SharingMode::EXCLUSIVE,
                ..Default::default()
            };
            let buffer = device.create_buffer(&buffer_info)?;
            self.buffers.push(buffer);

            let req = device.get_buffer_memory_requirements(buffer);
            let alloc_info = vk::MemoryAllocateInfo {
                s_type: vk::StructureType::MEMORY_ALLOCATE_INFO,
                allocation_size: req.size,
                memory_type_index: kernel.find_memory_type(
                    req.memory_type_bits,
                    vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
                )?,
                ..Default::default()
            };
            let memory = device.allocate_memory(&alloc_info)?;
            self.memories.push(memory);

            let ptr = device.map_memory(memory, 0, req.size)?;
            std::ptr::copy_nonoverlapping(data.as_ptr(), ptr.cast::<u8>(), data.len());
            device.unmap_memory(memory);

            device.bind_buffer_memory(buffer, memory, 0)?;
            self.offsets.push(0);
            Ok(buffer)
        }
    }
}

#[allow(clippy::too_many_arguments)]
unsafe fn record_frame<D: GpuDevice>(
    kernel: &Kernel<D>,
    cmd: vk::CommandBuffer,
    framebuffer: vk::Framebuffer,
    viewport: vk::Viewport,
    scissor: vk::Rect2D,
    clear: &vk::ClearValue,
    push_constants: &[u8],
    vertex_buffer: vk::Buffer,
    vertex_offset: vk::DeviceSize,
) -> Result<()> {
    let device = &kernel.device;
    let pipeline = &kernel.pipeline;

    let begin = vk::CommandBufferBeginInfo {
        s_type: vk::StructureType::COMMAND_BUFFER_BEGIN_INFO,
        flags: vk::CommandBufferUsageFlags::RENDER_PASS_CONTINUE,
        ..Default::default()
    };
    device.begin_command_buffer(cmd, &begin)?;

    device.cmd_set_viewport(cmd, 0, std::slice::from_ref(&viewport));
    device.cmd_set_scissor(cmd, 0, std::slice::from_ref(&scissor));
    device.cmd_push_constants(
        cmd,
        pipeline.pipeline_layout,
        vk::ShaderStageFlags::VERTEX,
        0,
        push_constants,
    );

    let rp_begin = vk::RenderPassBeginInfo {
        s_type: vk::StructureType::RENDER_PASS_BEGIN_INFO,
        render_pass: kernel.swap_chain.render_pass,
        framebuffer,
        render_area: scissor,
        clear_value_count: 1,
        p_clear_values: clear,
        ..Default::default()
    };
    device.cmd_begin_render_pass(cmd, &rp_begin, vk::SubpassContents::INLINE);
    device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, pipeline.pipeline);
    device.cmd_bind_vertex_buffers(cmd, 0, &[vertex_buffer], &[vertex_offset]);
    device.cmd_bind_descriptor_sets(
        cmd,
        vk::PipelineBindPoint::GRAPHICS,
        pipeline.pipeline_layout,
        0,
        &pipeline.descriptor_sets[..1],
        &[],
    );
    device.cmd_draw(cmd, QUAD_VERTICES.len() as u32, 1, 0, 0);
    device.cmd_end_render_pass(cmd);
    device.end_command_buffer(cmd)?;
    Ok(())
}
