// SPDX-License-Identifier: CEPL-1.0
use crate::device::GpuDevice;
use crate::error::{RenderError, Result};
use crate::pipeline::Pipeline;
use crate::swap_chain::SwapChain;
use ash::vk;
use vela_render::SurfaceRotation;

#[derive(Clone, Copy, Debug)]
pub struct Queue {
    pub handle: vk::Queue,
    pub queue_family_index: u32,
}

/// Render context shared by every component that records or allocates.
///
/// Owns the logical device, the graphics/present queue, the swap chain and
/// the graphics pipeline. The rotation flag is raised here and cleared by the
/// command recorder once it has re-recorded.
pub struct Kernel<D: GpuDevice = ash::Device> {
    pub device: D,
    pub queue: Queue,
    pub swap_chain: SwapChain,
    pub pipeline: Pipeline,
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    pub surface_rotation: SurfaceRotation,
    pub invalidate_surface_rotation: bool,
}

impl<D: GpuDevice> Kernel<D> {
    pub fn find_memory_type(
        &self,
        type_bits: u32,
        properties: vk::MemoryPropertyFlags,
    ) -> Result<u32> {
        find_memory_type(&self.memory_properties, type_bits, properties)
    }

    pub fn set_surface_rotation(&mut self, rotation: SurfaceRotation) {
        if self.surface_rotation != rotation {
            self.surface_rotation = rotation;
            self.invalidate_surface_rotation = true;
        }
    }

    /// Resets `fence` and submits `submit` to the queue, signalling it.
    ///
    /// If the submit fails the reset fence would never signal again, so it is
    /// swapped for a fresh signalled one and waiting on `*fence` stays safe.
    ///
    /// # Safety
    /// `fence` must be owned by this device and not in use by pending work.
    pub unsafe fn submit_fenced(&self, submit: &vk::SubmitInfo<'_>, fence: &mut vk::Fence) -> Result<()> {
        self.device.reset_fences(std::slice::from_ref(fence))?;
        let Err(e) = self
            .device
            .queue_submit(self.queue.handle, std::slice::from_ref(submit), *fence)
        else {
            return Ok(());
        };
        let info = vk::FenceCreateInfo {
            s_type: vk::StructureType::FENCE_CREATE_INFO,
            flags: vk::FenceCreateFlags::SIGNALED,
            ..Default::default()
        };
        if let Ok(fresh) = self.device.create_fence(&info) {
            self.device.destroy_fence(*fence);
            *fence = fresh;
        }
        Err(e.into())
    }
}

#[inline]
pub fn find_memory_type(
    memory: &vk::PhysicalDeviceMemoryProperties,
    type_bits: u32,
    properties: vk::MemoryPropertyFlags,
) -> Result<u32> {
    (0..memory.memory_type_count)
        .find(|&i| {
            (type_bits & (1 << i)) != 0
                && memory.memory_types[i as usize]
                    .property_flags
                    .contains(properties)
        })
        .ok_or(RenderError::NoSuitableMemoryType {
            type_bits,
            properties,
        })
}
