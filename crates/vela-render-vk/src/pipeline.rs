// SPDX-License-Identifier: CEPL-1.0
use crate::texture::PushConstants;
use anyhow::{anyhow, Context, Result};
use ash::util::read_spv;
use ash::vk;
use bytemuck::{Pod, Zeroable};
use std::io::Cursor;
use vela_render::ResampleFilter;

/// Quad vertex: clip-space position and texture coordinate.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 2],
    pub tex_coord: [f32; 2],
}

/// The single textured-quad pipeline and the descriptor set that feeds it.
pub struct Pipeline {
    pub pipeline_layout: vk::PipelineLayout,
    pub pipeline: vk::Pipeline,
    pub descriptor_set_layout: vk::DescriptorSetLayout,
    pub descriptor_pool: vk::DescriptorPool,
    pub descriptor_sets: Vec<vk::DescriptorSet>,
    pub sampler: vk::Sampler,
}

impl Pipeline {
    pub(crate) unsafe fn create(
        device: &ash::Device,
        render_pass: vk::RenderPass,
        filter: ResampleFilter,
    ) -> Result<Self> {
        let descriptor_set_layout = create_descriptor_set_layout(device)?;

        let pool_size = vk::DescriptorPoolSize {
            ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            descriptor_count: 1,
        };
        let pool_info = vk::DescriptorPoolCreateInfo {
            s_type: vk::StructureType::DESCRIPTOR_POOL_CREATE_INFO,
            max_sets: 1,
            pool_size_count: 1,
            p_pool_sizes: &pool_size,
            ..Default::default()
        };
        let descriptor_pool = device.create_descriptor_pool(&pool_info, None)?;

        let alloc_info = vk::DescriptorSetAllocateInfo {
            s_type: vk::StructureType::DESCRIPTOR_SET_ALLOCATE_INFO,
            descriptor_pool,
            descriptor_set_count: 1,
            p_set_layouts: &descriptor_set_layout,
            ..Default::default()
        };
        let descriptor_sets = device.allocate_descriptor_sets(&alloc_info)?;

        let sampler = create_sampler(device, filter)?;
        let (pipeline_layout, pipeline) =
            create_pipeline(device, render_pass, descriptor_set_layout)?;

        Ok(Self {
            pipeline_layout,
            pipeline,
            descriptor_set_layout,
            descriptor_pool,
            descriptor_sets,
            sampler,
        })
    }

    /// Rebuilds only the pipeline object, e.g. after the swap-chain format changed.
    pub(crate) unsafe fn rebuild(&mut self, device: &ash::Device, render_pass: vk::RenderPass) -> Result<()> {
        let (layout, pipeline) = create_pipeline(device, render_pass, self.descriptor_set_layout)?;
        device.destroy_pipeline(self.pipeline, None);
        device.destroy_pipeline_layout(self.pipeline_layout, None);
        self.pipeline_layout = layout;
        self.pipeline = pipeline;
        Ok(())
    }

    /// Points descriptor set 0 at `view`, sampled in SHADER_READ_ONLY_OPTIMAL.
    pub(crate) unsafe fn bind_texture(&self, device: &ash::Device, view: vk::ImageView) {
        let image_info = vk::DescriptorImageInfo {
            sampler: self.sampler,
            image_view: view,
            image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        };
        let write = vk::WriteDescriptorSet {
            s_type: vk::StructureType::WRITE_DESCRIPTOR_SET,
            dst_set: self.descriptor_sets[0],
            dst_binding: 0,
            descriptor_count: 1,
            descriptor_type: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            p_image_info: &image_info,
            ..Default::default()
        };
        device.update_descriptor_sets(std::slice::from_ref(&write), &[]);
    }

    /// Swaps the sampler. The device must be idle; rebinds `view` if given.
    pub(crate) unsafe fn set_resample_filter(
        &mut self,
        device: &ash::Device,
        filter: ResampleFilter,
        view: Option<vk::ImageView>,
    ) -> Result<()> {
        let sampler = create_sampler(device, filter)?;
        device.destroy_sampler(self.sampler, None);
        self.sampler = sampler;
        if let Some(view) = view {
            self.bind_texture(device, view);
        }
        Ok(())
    }

    pub(crate) unsafe fn destroy(&mut self, device: &ash::Device) {
        device.destroy_pipeline(self.pipeline, None);
        device.destroy_pipeline_layout(self.pipeline_layout, None);
        device.destroy_sampler(self.sampler, None);
        // Frees the sets allocated from it.
        device.destroy_descriptor_pool(self.descriptor_pool, None);
        device.destroy_descriptor_set_layout(self.descriptor_set_layout, None);
        self.descriptor_sets.clear();
    }
}

unsafe fn create_descriptor_set_layout(device: &ash::Device) -> Result<vk::DescriptorSetLayout> {
    let binding = vk::DescriptorSetLayoutBinding {
        binding: 0,
        descriptor_type: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
        descriptor_count: 1,
        stage_flags: vk::ShaderStageFlags::FRAGMENT,
        ..Default::default()
    };
    let ci = vk::DescriptorSetLayoutCreateInfo {
        s_type: vk::StructureType::DESCRIPTOR_SET_LAYOUT_CREATE_INFO,
        binding_count: 1,
        p_bindings: &binding,
        ..Default::default()
    };
    Ok(device.create_descriptor_set_layout(&ci, None)?)
}

unsafe fn create_sampler(device: &ash::Device, filter: ResampleFilter) -> Result<vk::Sampler> {
    let filter = match filter {
        ResampleFilter::Nearest => vk::Filter::NEAREST,
        ResampleFilter::Linear => vk::Filter::LINEAR,
    };
    let ci = vk::SamplerCreateInfo {
        s_type: vk::StructureType::SAMPLER_CREATE_INFO,
        mag_filter: filter,
        min_filter: filter,
        mipmap_mode: vk::SamplerMipmapMode::NEAREST,
        address_mode_u: vk::SamplerAddressMode::CLAMP_TO_EDGE,
        address_mode_v: vk::SamplerAddressMode::CLAMP_TO_EDGE,
        address_mode_w: vk::SamplerAddressMode::CLAMP_TO_EDGE,
        max_lod: 0.0,
        border_color: vk::BorderColor::FLOAT_OPAQUE_BLACK,
        ..Default::default()
    };
    Ok(device.create_sampler(&ci, None)?)
}

unsafe fn create_pipeline(
    device: &ash::Device,
    render_pass: vk::RenderPass,
    set_layout: vk::DescriptorSetLayout,
) -> Result<(vk::PipelineLayout, vk::Pipeline)> {
    let vs_bytes = include_bytes!(concat!(env!("OUT_DIR"), "/quad.vert.spv"));
    let fs_bytes = include_bytes!(concat!(env!("OUT_DIR"), "/quad.frag.spv"));
    let vs_code = read_spv(&mut Cursor::new(&vs_bytes[..]))?;
    let fs_code = read_spv(&mut Cursor::new(&fs_bytes[..]))?;
    let vs_ci = vk::ShaderModuleCreateInfo {
        s_type: vk::StructureType::SHADER_MODULE_CREATE_INFO,
        p_code: vs_code.as_ptr(),
        code_size: vs_code.len() * 4,
        ..Default::default()
    };
    let fs_ci = vk::ShaderModuleCreateInfo {
        s_type: vk::StructureType::SHADER_MODULE_CREATE_INFO,
        p_code: fs_code.as_ptr(),
        code_size: fs_code.len() * 4,
        ..Default::default()
    };
    let vs = device.create_shader_module(&vs_ci, None)?;
    let fs = match device.create_shader_module(&fs_ci, None) {
        Ok(fs) => fs,
        Err(e) => {
            device.destroy_shader_module(vs, None);
            return Err(e).context("create_shader_module(fragment)");
        }
    };
    let entry = c"main";

    let stages = [
        vk::PipelineShaderStageCreateInfo {
            s_type: vk::StructureType::PIPELINE_SHADER_STAGE_CREATE_INFO,
            stage: vk::ShaderStageFlags::VERTEX,
            module: vs,
            p_name: entry.as_ptr(),
            ..Default::default()
        },
        vk::PipelineShaderStageCreateInfo {
            s_type: vk::StructureType::PIPELINE_SHADER_STAGE_CREATE_INFO,
            stage: vk::ShaderStageFlags::FRAGMENT,
            module: fs,
            p_name: entry.as_ptr(),
            ..Default::default()
        },
    ];

    let vb = vk::VertexInputBindingDescription {
        binding: 0,
        stride: std::mem::size_of::<Vertex>() as u32,
        input_rate: vk::VertexInputRate::VERTEX,
    };
    let va = [
        vk::VertexInputAttributeDescription {
            location: 0,
            binding: 0,
            format: vk::Format::R32G32_SFLOAT,
            offset: 0,
        },
        vk::VertexInputAttributeDescription {
            location: 1,
            binding: 0,
            format: vk::Format::R32G32_SFLOAT,
            offset: std::mem::size_of::<[f32; 2]>() as u32,
        },
    ];
    let vertex_input = vk::PipelineVertexInputStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_VERTEX_INPUT_STATE_CREATE_INFO,
        vertex_binding_description_count: 1,
        p_vertex_binding_descriptions: &vb,
        vertex_attribute_description_count: va.len() as u32,
        p_vertex_attribute_descriptions: va.as_ptr(),
        ..Default::default()
    };
    // Four vertices, no index buffer.
    let input_assembly = vk::PipelineInputAssemblyStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_INPUT_ASSEMBLY_STATE_CREATE_INFO,
        topology: vk::PrimitiveTopology::TRIANGLE_STRIP,
        ..Default::default()
    };
    let dyn_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
    let dynamic_state = vk::PipelineDynamicStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_DYNAMIC_STATE_CREATE_INFO,
        dynamic_state_count: dyn_states.len() as u32,
        p_dynamic_states: dyn_states.as_ptr(),
        ..Default::default()
    };
    let viewport_state = vk::PipelineViewportStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_VIEWPORT_STATE_CREATE_INFO,
        viewport_count: 1,
        scissor_count: 1,
        ..Default::default()
    };
    // Mirroring flips the winding, so nothing is culled.
    let raster = vk::PipelineRasterizationStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_RASTERIZATION_STATE_CREATE_INFO,
        polygon_mode: vk::PolygonMode::FILL,
        cull_mode: vk::CullModeFlags::NONE,
        front_face: vk::FrontFace::COUNTER_CLOCKWISE,
        line_width: 1.0,
        ..Default::default()
    };
    let multisample = vk::PipelineMultisampleStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_MULTISAMPLE_STATE_CREATE_INFO,
        rasterization_samples: vk::SampleCountFlags::TYPE_1,
        ..Default::default()
    };
    let color_blend_att = vk::PipelineColorBlendAttachmentState {
        color_write_mask: vk::ColorComponentFlags::RGBA,
        blend_enable: vk::FALSE,
        ..Default::default()
    };
    let color_blend = vk::PipelineColorBlendStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_COLOR_BLEND_STATE_CREATE_INFO,
        attachment_count: 1,
        p_attachments: &color_blend_att,
        ..Default::default()
    };

    let push_range = vk::PushConstantRange {
        stage_flags: vk::ShaderStageFlags::VERTEX,
        offset: 0,
        size: std::mem::size_of::<PushConstants>() as u32,
    };
    let layout_info = vk::PipelineLayoutCreateInfo {
        s_type: vk::StructureType::PIPELINE_LAYOUT_CREATE_INFO,
        set_layout_count: 1,
        p_set_layouts: &set_layout,
        push_constant_range_count: 1,
        p_push_constant_ranges: &push_range,
        ..Default::default()
    };
    let layout = device.create_pipeline_layout(&layout_info, None)?;

    let pipeline_info = vk::GraphicsPipelineCreateInfo {
        s_type: vk::StructureType::GRAPHICS_PIPELINE_CREATE_INFO,
        stage_count: stages.len() as u32,
        p_stages: stages.as_ptr(),
        p_vertex_input_state: &vertex_input,
        p_input_assembly_state: &input_assembly,
        p_viewport_state: &viewport_state,
        p_rasterization_state: &raster,
        p_multisample_state: &multisample,
        p_color_blend_state: &color_blend,
        p_dynamic_state: &dynamic_state,
        layout,
        render_pass,
        subpass: 0,
        ..Default::default()
    };

    let created = device.create_graphics_pipelines(
        vk::PipelineCache::null(),
        std::slice::from_ref(&pipeline_info),
        None,
    );
    device.destroy_shader_module(vs, None);
    device.destroy_shader_module(fs, None);

    match created {
        Ok(pipelines) => Ok((layout, pipelines[0])),
        Err((_, err)) => {
            device.destroy_pipeline_layout(layout, None);
            Err(anyhow!("create_graphics_pipelines failed: {:?}", err))
        }
    }
}
