// SPDX-License-Identifier: CEPL-1.0
use crate::device::GpuDevice;
use crate::error::Result;
use crate::kernel::Kernel;
use crate::swap_chain::COLOR_SUBRESOURCE;
use ash::vk;
use tracing::{debug, warn};

/// One GPU image, the memory behind it and the layout it was last moved to.
///
/// `layout` is only ever changed by [`ImageStorage::set_layout`], so it always
/// matches the layout the recorded commands leave the image in.
pub struct ImageStorage {
    pub image: vk::Image,
    pub memories: Vec<vk::DeviceMemory>,
    pub layout: vk::ImageLayout,
    pub format: vk::Format,
    pub extent: vk::Extent2D,
    pub usage: vk::ImageUsageFlags,
}

impl ImageStorage {
    pub fn new(format: vk::Format, extent: vk::Extent2D, usage: vk::ImageUsageFlags) -> Self {
        Self {
            image: vk::Image::null(),
            memories: Vec::new(),
            layout: vk::ImageLayout::UNDEFINED,
            format,
            extent,
            usage,
        }
    }

    /// Creates the image from `info` and binds device-local memory to it.
    /// Anything created before a failure is released again.
    pub fn set_up<D: GpuDevice>(&mut self, kernel: &Kernel<D>, info: &vk::ImageCreateInfo<'_>) -> Result<()> {
        self.format = info.format;
        self.extent = vk::Extent2D {
            width: info.extent.width,
            height: info.extent.height,
        };
        self.usage = info.usage;

        unsafe {
            self.image = kernel.device.create_image(info)?;
            self.layout = info.initial_layout;
            if let Err(e) = self.bind_memory(kernel, info.flags) {
                self.tear_down(kernel);
                return Err(e);
            }
        }

        debug!(
            "image {}x{} {:?} ready ({} memory binding(s))",
            self.extent.width,
            self.extent.height,
            self.format,
            self.memories.len()
        );
        Ok(())
    }

    unsafe fn bind_memory<D: GpuDevice>(
        &mut self,
        kernel: &Kernel<D>,
        flags: vk::ImageCreateFlags,
    ) -> Result<()> {
        let device = &kernel.device;
        if flags.contains(vk::ImageCreateFlags::DISJOINT) {
            for plane in [vk::ImageAspectFlags::PLANE_0, vk::ImageAspectFlags::PLANE_1] {
                let req = device.get_image_plane_memory_requirements(self.image, plane);
                let memory = allocate(kernel, req)?;
                self.memories.push(memory);
                device.bind_image_plane_memory(self.image, memory, plane)?;
            }
        } else {
            let req = device.get_image_memory_requirements(self.image);
            let memory = allocate(kernel, req)?;
            self.memories.push(memory);
            device.bind_image_memory(self.image, memory, 0)?;
        }
        Ok(())
    }

    /// Destroys the image and frees its memory. Safe to call twice.
    ///
    /// # Safety
    /// No submitted work may still reference the image.
    pub unsafe fn tear_down<D: GpuDevice>(&mut self, kernel: &Kernel<D>) {
        if self.image != vk::Image::null() {
            kernel.device.destroy_image(self.image);
            self.image = vk::Image::null();
        }
        for memory in self.memories.drain(..) {
            kernel.device.free_memory(memory);
        }
        self.layout = vk::ImageLayout::UNDEFINED;
    }

    /// Records one barrier moving the whole color subresource from the
    /// current layout to `new_layout`.
    ///
    /// # Safety
    /// `cmd` must be recording. The stages must cover every access before and
    /// after the transition; that is not checked here.
    pub unsafe fn set_layout<D: GpuDevice>(
        &mut self,
        device: &D,
        cmd: vk::CommandBuffer,
        new_layout: vk::ImageLayout,
        src_stage: vk::PipelineStageFlags,
        dst_stage: vk::PipelineStageFlags,
    ) {
        if self.layout == new_layout {
            warn!("redundant layout transition {:?} -> {:?}", self.layout, new_layout);
        }

        let barrier = vk::ImageMemoryBarrier {
            s_type: vk::StructureType::IMAGE_MEMORY_BARRIER,
            src_access_mask: access_mask(self.layout),
            dst_access_mask: access_mask(new_layout),
            old_layout: self.layout,
            new_layout,
            src_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
            dst_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
            image: self.image,
            subresource_range: COLOR_SUBRESOURCE,
            ..Default::default()
        };
        device.cmd_pipeline_barrier(cmd, src_stage, dst_stage, std::slice::from_ref(&barrier));
        self.layout = new_layout;
    }

    /// True for formats whose planes need separate memory bindings.
    pub fn is_multi_planar(&self) -> bool {
        self.format == vk::Format::G8_B8R8_2PLANE_420_UNORM
    }

    pub fn create_image_create_info(&self) -> vk::ImageCreateInfo<'static> {
        let flags = if self.is_multi_planar() {
            vk::ImageCreateFlags::DISJOINT
        } else {
            vk::ImageCreateFlags::empty()
        };
        vk::ImageCreateInfo {
            s_type: vk::StructureType::IMAGE_CREATE_INFO,
            flags,
            image_type: vk::ImageType::TYPE_2D,
            format: self.format,
            extent: vk::Extent3D {
                width: self.extent.width,
                height: self.extent.height,
                depth: 1,
            },
            mip_levels: 1,
            array_layers: 1,
            samples: vk::SampleCountFlags::TYPE_1,
            tiling: vk::ImageTiling::OPTIMAL,
            usage: self.usage,
            sharing_mode: vk::SharingMode::EXCLUSIVE,
            initial_layout: self.layout,
            ..Default::default()
        }
    }
}

unsafe fn allocate<D: GpuDevice>(
    kernel: &Kernel<D>,
    req: vk::MemoryRequirements,
) -> Result<vk::DeviceMemory> {
    let alloc_info = vk::MemoryAllocateInfo {
        s_type: vk::StructureType::MEMORY_ALLOCATE_INFO,
        allocation_size: req.size,
        memory_type_index: kernel
            .find_memory_type(req.memory_type_bits, vk::MemoryPropertyFlags::DEVICE_LOCAL)?,
        ..Default::default()
    };
    Ok(kernel.device.allocate_memory(&alloc_info)?)
}

fn access_mask(layout: vk::ImageLayout) -> vk::AccessFlags {
    match layout {
        vk::ImageLayout::PREINITIALIZED => vk::AccessFlags::HOST_WRITE,
        vk::ImageLayout::TRANSFER_DST_OPTIMAL => vk::AccessFlags::TRANSFER_WRITE,
        vk::ImageLayout::TRANSFER_SRC_OPTIMAL => vk::AccessFlags::TRANSFER_READ,
        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL => vk::AccessFlags::SHADER_READ,
        vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL => vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
        vk::ImageLayout::GENERAL => vk::AccessFlags::MEMORY_READ | vk::AccessFlags::MEMORY_WRITE,
        _ => vk::AccessFlags::empty(),
    }
}
