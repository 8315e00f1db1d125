// SPDX-License-Identifier: CEPL-1.0
use crate::device::GpuDevice;
use crate::error::Result;
use anyhow::Context;
use ash::khr::{surface, swapchain};
use ash::vk;
use tracing::info;
use vela_render::RenderSize;

/// Presentable images plus the render pass that draws into them.
pub struct SwapChain {
    pub handle: vk::SwapchainKHR,
    pub format: vk::Format,
    pub size: vk::Extent2D,
    pub images: Vec<vk::Image>,
    pub image_views: Vec<vk::ImageView>,
    pub render_pass: vk::RenderPass,
}

impl SwapChain {
    pub fn images_count(&self) -> usize {
        self.image_views.len()
    }

    /// Framebuffer over image `index`. The caller owns the result.
    pub unsafe fn create_framebuffer<D: GpuDevice>(
        &self,
        device: &D,
        index: usize,
    ) -> Result<vk::Framebuffer> {
        let fb_info = vk::FramebufferCreateInfo {
            s_type: vk::StructureType::FRAMEBUFFER_CREATE_INFO,
            render_pass: self.render_pass,
            attachment_count: 1,
            p_attachments: &self.image_views[index],
            width: self.size.width,
            height: self.size.height,
            layers: 1,
            ..Default::default()
        };
        Ok(device.create_framebuffer(&fb_info)?)
    }

    pub(crate) unsafe fn create(
        device: &ash::Device,
        surface_loader: &surface::Instance,
        swapchain_loader: &swapchain::Device,
        phys: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
        hint: RenderSize,
        old: vk::SwapchainKHR,
    ) -> anyhow::Result<Self> {
        let caps = surface_loader
            .get_physical_device_surface_capabilities(phys, surface)
            .context("surface capabilities")?;
        let formats = surface_loader
            .get_physical_device_surface_formats(phys, surface)
            .context("surface formats")?;
        let modes = surface_loader
            .get_physical_device_surface_present_modes(phys, surface)
            .context("surface present modes")?;

        let surf_format = choose_surface_format(&formats)?;
        let present_mode = choose_present_mode(&modes);
        let extent = extent_from_caps(&caps, hint);

        let min_count = if caps.max_image_count == 0 {
            caps.min_image_count + 1
        } else {
            (caps.min_image_count + 1).min(caps.max_image_count)
        };

        let swap_info = vk::SwapchainCreateInfoKHR {
            s_type: vk::StructureType::SWAPCHAIN_CREATE_INFO_KHR,
            surface,
            min_image_count: min_count,
            image_format: surf_format.format,
            image_color_space: surf_format.color_space,
            image_extent: extent,
            image_array_layers: 1,
            image_usage: vk::ImageUsageFlags::COLOR_ATTACHMENT,
            image_sharing_mode: vk::SharingMode::EXCLUSIVE,
            pre_transform: caps.current_transform,
            composite_alpha: vk::CompositeAlphaFlagsKHR::OPAQUE,
            present_mode,
            clipped: vk::TRUE,
            old_swapchain: old,
            ..Default::default()
        };

        let handle = swapchain_loader
            .create_swapchain(&swap_info, None)
            .context("create_swapchain")?;
        let images = swapchain_loader.get_swapchain_images(handle)?;

        let mut image_views = Vec::with_capacity(images.len());
        for &img in &images {
            let iv_info = vk::ImageViewCreateInfo {
                s_type: vk::StructureType::IMAGE_VIEW_CREATE_INFO,
                image: img,
                view_type: vk::ImageViewType::TYPE_2D,
                format: surf_format.format,
                subresource_range: COLOR_SUBRESOURCE,
                ..Default::default()
            };
            image_views.push(device.create_image_view(&iv_info, None)?);
        }

        let render_pass = create_render_pass(device, surf_format.format)?;

        info!(
            "swap chain ready ({}x{}, {} images, fmt {:?}, {:?})",
            extent.width,
            extent.height,
            images.len(),
            surf_format.format,
            present_mode
        );

        Ok(Self {
            handle,
            format: surf_format.format,
            size: extent,
            images,
            image_views,
            render_pass,
        })
    }

    /// Caller must have waited for the device to go idle.
    pub(crate) unsafe fn destroy(&mut self, device: &ash::Device, loader: &swapchain::Device) {
        for &iv in &self.image_views {
            device.destroy_image_view(iv, None);
        }
        self.image_views.clear();
        self.images.clear();
        device.destroy_render_pass(self.render_pass, None);
        self.render_pass = vk::RenderPass::null();
        loader.destroy_swapchain(self.handle, None);
        self.handle = vk::SwapchainKHR::null();
    }
}

pub(crate) const COLOR_SUBRESOURCE: vk::ImageSubresourceRange = vk::ImageSubresourceRange {
    aspect_mask: vk::ImageAspectFlags::COLOR,
    base_mip_level: 0,
    level_count: 1,
    base_array_layer: 0,
    layer_count: 1,
};

fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> anyhow::Result<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .copied()
        .find(|f| {
            f.format == vk::Format::B8G8R8A8_UNORM
                && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
        .or_else(|| formats.first().copied())
        .context("surface reports no formats")
}

fn choose_present_mode(modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    if modes.contains(&vk::PresentModeKHR::MAILBOX) {
        vk::PresentModeKHR::MAILBOX
    } else {
        vk::PresentModeKHR::FIFO
    }
}

fn extent_from_caps(caps: &vk::SurfaceCapabilitiesKHR, want: RenderSize) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX {
        caps.current_extent
    } else {
        vk::Extent2D {
            width: want
                .width
                .clamp(caps.min_image_extent.width, caps.max_image_extent.width),
            height: want
                .height
                .clamp(caps.min_image_extent.height, caps.max_image_extent.height),
        }
    }
}

// Single color attachment, cleared on load, handed to the presentation engine.
unsafe fn create_render_pass(device: &ash::Device, format: vk::Format) -> anyhow::Result<vk::RenderPass> {
    let color_att = vk::AttachmentDescription {
        format,
        samples: vk::SampleCountFlags::TYPE_1,
        load_op: vk::AttachmentLoadOp::CLEAR,
        store_op: vk::AttachmentStoreOp::STORE,
        stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
        stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
        initial_layout: vk::ImageLayout::UNDEFINED,
        final_layout: vk::ImageLayout::PRESENT_SRC_KHR,
        ..Default::default()
    };
    let att_ref = vk::AttachmentReference {
        attachment: 0,
        layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
    };

    let subpass = vk::SubpassDescription {
        pipeline_bind_point: vk::PipelineBindPoint::GRAPHICS,
        color_attachment_count: 1,
        p_color_attachments: &att_ref,
        ..Default::default()
    };

    // Acquire semaphore waits at COLOR_ATTACHMENT_OUTPUT; order the implicit
    // UNDEFINED -> COLOR_ATTACHMENT_OPTIMAL transition after it.
    let dependency = vk::SubpassDependency {
        src_subpass: vk::SUBPASS_EXTERNAL,
        dst_subpass: 0,
        src_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
        dst_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
        src_access_mask: vk::AccessFlags::empty(),
        dst_access_mask: vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
        ..Default::default()
    };

    let rp_info = vk::RenderPassCreateInfo {
        s_type: vk::StructureType::RENDER_PASS_CREATE_INFO,
        attachment_count: 1,
        p_attachments: &color_att,
        subpass_count: 1,
        p_subpasses: &subpass,
        dependency_count: 1,
        p_dependencies: &dependency,
        ..Default::default()
    };
    Ok(device.create_render_pass(&rp_info, None)?)
}
