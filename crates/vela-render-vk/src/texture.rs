// SPDX-License-Identifier: CEPL-1.0
use crate::command_recorder::CommandRecorder;
use crate::device::GpuDevice;
use crate::error::{RenderError, Result};
use crate::image_storage::ImageStorage;
use crate::kernel::Kernel;
use crate::swap_chain::COLOR_SUBRESOURCE;
use ash::vk;
use bytemuck::{Pod, Zeroable};
use tracing::debug;
use vela_render::{
    combined_quarter_turns, orientation_transform, ImageOrientation, PixelFormat, RenderSize,
    VideoGravity,
};

/// Vertex-stage push constant block, matches `quad.vert`.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct PushConstants {
    pub transform: [[f32; 4]; 4],
}

/// A sampled frame image fed from a persistent host-visible staging buffer.
pub struct Texture {
    pub image: ImageStorage,
    pub view: vk::ImageView,
    /// Raised when the recorded draw parameters no longer match this texture.
    /// Cleared by [`CommandRecorder::set_textures`].
    pub invalidate_layout: bool,
    staging: vk::Buffer,
    staging_memory: vk::DeviceMemory,
    staging_size: vk::DeviceSize,
    pixel_format: PixelFormat,
    video_gravity: VideoGravity,
    image_orientation: ImageOrientation,
}

impl Default for Texture {
    fn default() -> Self {
        Self {
            image: ImageStorage::new(
                vk::Format::UNDEFINED,
                vk::Extent2D::default(),
                vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST,
            ),
            view: vk::ImageView::null(),
            invalidate_layout: true,
            staging: vk::Buffer::null(),
            staging_memory: vk::DeviceMemory::null(),
            staging_size: 0,
            pixel_format: PixelFormat::default(),
            video_gravity: VideoGravity::default(),
            image_orientation: ImageOrientation::default(),
        }
    }
}

impl Texture {
    /// Creates the image, its view and the staging buffer. The texture must be
    /// fresh or torn down. Always raises `invalidate_layout`: the new view has
    /// to be written to the descriptor set, which voids earlier recordings.
    pub fn set_up<D: GpuDevice>(
        &mut self,
        kernel: &Kernel<D>,
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> Result<()> {
        self.pixel_format = format;
        self.set_up_format(kernel, width, height, vk_format(format), format.frame_len(width, height))
    }

    pub(crate) fn set_up_format<D: GpuDevice>(
        &mut self,
        kernel: &Kernel<D>,
        width: u32,
        height: u32,
        format: vk::Format,
        frame_len: usize,
    ) -> Result<()> {
        if width == 0 || height == 0 {
            return Err(RenderError::EmptyExtent { width, height });
        }
        self.image.format = format;
        self.image.extent = vk::Extent2D { width, height };
        self.image.layout = vk::ImageLayout::UNDEFINED;
        if self.image.is_multi_planar() {
            return Err(RenderError::UnsupportedFormat(format));
        }

        let info = self.image.create_image_create_info();
        self.image.set_up(kernel, &info)?;
        self.invalidate_layout = true;

        let created = unsafe { self.create_view_and_staging(kernel, frame_len) };
        if created.is_err() {
            unsafe { self.tear_down(kernel) };
        } else {
            debug!("texture {}x{} {:?} set up", width, height, format);
        }
        created
    }

    unsafe fn create_view_and_staging<D: GpuDevice>(
        &mut self,
        kernel: &Kernel<D>,
        frame_len: usize,
    ) -> Result<()> {
        let device = &kernel.device;
        let view_info = vk::ImageViewCreateInfo {
            s_type: vk::StructureType::IMAGE_VIEW_CREATE_INFO,
            image: self.image.image,
            view_type: vk::ImageViewType::TYPE_2D,
            format: self.image.format,
            subresource_range: COLOR_SUBRESOURCE,
            ..Default::default()
        };
        self.view = device.create_image_view(&view_info)?;

        let buffer_info = vk::BufferCreateInfo {
            s_type: vk::StructureType::BUFFER_CREATE_INFO,
            size: frame_len as vk::DeviceSize,
            usage: vk::BufferUsageFlags::TRANSFER_SRC,
            sharing_mode: vk::SharingMode::EXCLUSIVE,
            ..Default::default()
        };
        self.staging = device.create_buffer(&buffer_info)?;
        self.staging_size = frame_len as vk::DeviceSize;

        let req = device.get_buffer_memory_requirements(self.staging);
        let alloc_info = vk::MemoryAllocateInfo {
            s_type: vk::StructureType::MEMORY_ALLOCATE_INFO,
            allocation_size: req.size,
            memory_type_index: kernel.find_memory_type(
                req.memory_type_bits,
                vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            )?,
            ..Default::default()
        };
        self.staging_memory = device.allocate_memory(&alloc_info)?;
        device.bind_buffer_memory(self.staging, self.staging_memory, 0)?;
        Ok(())
    }

    /// Releases the view, the staging buffer and the image.
    ///
    /// # Safety
    /// No submitted work may still sample the image.
    pub unsafe fn tear_down<D: GpuDevice>(&mut self, kernel: &Kernel<D>) {
        let device = &kernel.device;
        if self.view != vk::ImageView::null() {
            device.destroy_image_view(self.view);
            self.view = vk::ImageView::null();
        }
        if self.staging != vk::Buffer::null() {
            device.destroy_buffer(self.staging);
            self.staging = vk::Buffer::null();
        }
        if self.staging_memory != vk::DeviceMemory::null() {
            device.free_memory(self.staging_memory);
            self.staging_memory = vk::DeviceMemory::null();
        }
        self.staging_size = 0;
        self.image.tear_down(kernel);
    }

    /// True once a frame has been uploaded and the image is ready to sample.
    pub fn has_contents(&self) -> bool {
        self.image.layout == vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL
    }

    pub fn size(&self) -> RenderSize {
        RenderSize::new(self.image.extent.width, self.image.extent.height)
    }

    /// Uploads one frame. `stride` is the distance between source rows in
    /// bytes, 0 for tightly packed rows. Blocks until the copy has finished.
    pub fn update<D: GpuDevice>(
        &mut self,
        kernel: &Kernel<D>,
        recorder: &CommandRecorder,
        data: &[u8],
        stride: usize,
    ) -> Result<()> {
        if self.staging == vk::Buffer::null() {
            return Err(RenderError::NotSetUp);
        }
        let extent = self.image.extent;
        let row_len = extent.width as usize * self.pixel_format.bytes_per_pixel();
        let rows = extent.height as usize;
        let stride = if stride == 0 { row_len } else { stride };
        if stride < row_len {
            return Err(RenderError::StrideTooShort { stride, row_len });
        }
        let too_small = |expected| RenderError::FrameTooSmall {
            expected,
            actual: data.len(),
        };
        let expected = stride
            .checked_mul(rows.saturating_sub(1))
            .and_then(|n| n.checked_add(row_len))
            .ok_or_else(|| too_small(usize::MAX))?;
        if data.len() < expected {
            return Err(too_small(expected));
        }

        unsafe {
            let device = &kernel.device;
            let dst = device
                .map_memory(self.staging_memory, 0, self.staging_size)?
                .cast::<u8>();
            for row in 0..rows {
                std::ptr::copy_nonoverlapping(
                    data.as_ptr().add(row * stride),
                    dst.add(row * row_len),
                    row_len,
                );
            }
            device.unmap_memory(self.staging_memory);

            let cmd = recorder.allocate(kernel)?;
            let previous = self.image.layout;
            let uploaded = self
                .record_upload(device, cmd)
                .and_then(|()| submit_and_wait(kernel, cmd));
            recorder.free(kernel, cmd);
            if uploaded.is_err() {
                self.image.layout = previous;
            }
            uploaded
        }
    }

    unsafe fn record_upload<D: GpuDevice>(&mut self, device: &D, cmd: vk::CommandBuffer) -> Result<()> {
        let begin = vk::CommandBufferBeginInfo {
            s_type: vk::StructureType::COMMAND_BUFFER_BEGIN_INFO,
            flags: vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT,
            ..Default::default()
        };
        device.begin_command_buffer(cmd, &begin)?;

        // A previously shown frame may still be sampled by queued draws.
        let src_stage = if self.image.layout == vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL {
            vk::PipelineStageFlags::FRAGMENT_SHADER
        } else {
            vk::PipelineStageFlags::TOP_OF_PIPE
        };
        self.image.set_layout(
            device,
            cmd,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            src_stage,
            vk::PipelineStageFlags::TRANSFER,
        );

        let region = vk::BufferImageCopy {
            buffer_offset: 0,
            buffer_row_length: 0,
            buffer_image_height: 0,
            image_subresource: vk::ImageSubresourceLayers {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                mip_level: 0,
                base_array_layer: 0,
                layer_count: 1,
            },
            image_offset: vk::Offset3D::default(),
            image_extent: vk::Extent3D {
                width: self.image.extent.width,
                height: self.image.extent.height,
                depth: 1,
            },
        };
        device.cmd_copy_buffer_to_image(
            cmd,
            self.staging,
            self.image.image,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            std::slice::from_ref(&region),
        );

        self.image.set_layout(
            device,
            cmd,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            vk::PipelineStageFlags::TRANSFER,
            vk::PipelineStageFlags::FRAGMENT_SHADER,
        );
        device.end_command_buffer(cmd)?;
        Ok(())
    }

    pub fn video_gravity(&self) -> VideoGravity {
        self.video_gravity
    }

    pub fn set_video_gravity(&mut self, gravity: VideoGravity) {
        if self.video_gravity != gravity {
            self.video_gravity = gravity;
            self.invalidate_layout = true;
        }
    }

    pub fn image_orientation(&self) -> ImageOrientation {
        self.image_orientation
    }

    pub fn set_image_orientation(&mut self, orientation: ImageOrientation) {
        if self.image_orientation != orientation {
            self.image_orientation = orientation;
            self.invalidate_layout = true;
        }
    }

    /// Where the quad lands on the current swap-chain image.
    pub fn get_viewport<D: GpuDevice>(&self, kernel: &Kernel<D>) -> vk::Viewport {
        let mut source = self.size();
        if combined_quarter_turns(self.image_orientation, kernel.surface_rotation) % 2 == 1 {
            source = source.swapped();
        }
        let target = RenderSize::new(kernel.swap_chain.size.width, kernel.swap_chain.size.height);
        let rect = self.video_gravity.viewport(source, target);
        vk::Viewport {
            x: rect.x,
            y: rect.y,
            width: rect.width,
            height: rect.height,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }

    pub fn get_push_constants<D: GpuDevice>(&self, kernel: &Kernel<D>) -> PushConstants {
        PushConstants {
            transform: orientation_transform(self.image_orientation, kernel.surface_rotation)
                .to_cols_array_2d(),
        }
    }
}

unsafe fn submit_and_wait<D: GpuDevice>(kernel: &Kernel<D>, cmd: vk::CommandBuffer) -> Result<()> {
    let submit = vk::SubmitInfo {
        s_type: vk::StructureType::SUBMIT_INFO,
        command_buffer_count: 1,
        p_command_buffers: &cmd,
        ..Default::default()
    };
    kernel
        .device
        .queue_submit(kernel.queue.handle, std::slice::from_ref(&submit), vk::Fence::null())?;
    kernel.device.queue_wait_idle(kernel.queue.handle)?;
    Ok(())
}

fn vk_format(format: PixelFormat) -> vk::Format {
    match format {
        PixelFormat::Rgba8 => vk::Format::R8G8B8A8_UNORM,
        PixelFormat::Bgra8 => vk::Format::B8G8R8A8_UNORM,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{self, Cmd, Kind};
    use glam::Mat4;
    use vela_render::SurfaceRotation;

    #[test]
    fn rotated_source_fills_portrait_target() {
        let mut kernel = mock::kernel(2, 1080, 1920);
        let mut texture = Texture::default();
        texture.set_up(&kernel, 1920, 1080, PixelFormat::Rgba8).unwrap();

        kernel.set_surface_rotation(SurfaceRotation::Rotation90);
        let v = texture.get_viewport(&kernel);
        assert_eq!(
            [v.x, v.y, v.width, v.height, v.min_depth, v.max_depth],
            [0.0, 0.0, 1080.0, 1920.0, 0.0, 1.0]
        );

        kernel.set_surface_rotation(SurfaceRotation::Rotation0);
        let v = texture.get_viewport(&kernel);
        assert_eq!((v.x, v.width), (0.0, 1080.0));
        assert!((v.height - 607.5).abs() < 1e-3);
        assert!((v.y - 656.25).abs() < 1e-3);

        unsafe { texture.tear_down(&kernel) };
    }

    #[test]
    fn push_constants_carry_the_orientation_transform() {
        let kernel = mock::kernel(2, 640, 480);
        let mut texture = Texture::default();
        assert_eq!(
            texture.get_push_constants(&kernel).transform,
            Mat4::IDENTITY.to_cols_array_2d()
        );
        texture.set_image_orientation(ImageOrientation::Right);
        assert_eq!(
            texture.get_push_constants(&kernel).transform,
            orientation_transform(ImageOrientation::Right, SurfaceRotation::Rotation0)
                .to_cols_array_2d()
        );
        assert_eq!(std::mem::size_of::<PushConstants>(), 64);
    }

    #[test]
    fn setters_raise_the_flag_only_on_change() {
        let mut texture = Texture::default();
        texture.invalidate_layout = false;

        texture.set_video_gravity(VideoGravity::ResizeAspect);
        texture.set_image_orientation(ImageOrientation::Up);
        assert!(!texture.invalidate_layout);

        texture.set_video_gravity(VideoGravity::ResizeAspectFill);
        assert!(texture.invalidate_layout);

        texture.invalidate_layout = false;
        texture.set_image_orientation(ImageOrientation::LeftMirrored);
        assert!(texture.invalidate_layout);
    }

    #[test]
    fn upload_copies_rows_and_leaves_image_sampleable() {
        let kernel = mock::kernel(2, 640, 480);
        let mut recorder = CommandRecorder::default();
        recorder.set_up(&kernel).unwrap();
        let mut texture = Texture::default();
        texture.set_up(&kernel, 2, 2, PixelFormat::Bgra8).unwrap();

        // Two 8-byte rows, each followed by 4 bytes of padding.
        let data: Vec<u8> = (0..24).collect();
        texture.update(&kernel, &recorder, &data, 12).unwrap();

        let staged = kernel.device.memory_bytes(texture.staging_memory);
        assert_eq!(&staged[..8], &data[..8]);
        assert_eq!(&staged[8..16], &data[12..20]);

        let submitted = kernel.device.submitted();
        assert_eq!(submitted.len(), 1);
        assert_eq!(kernel.device.idle_waits(), 1);
        assert!(!kernel.device.is_live(submitted[0]));

        let cmds = kernel.device.commands(submitted[0]);
        assert_eq!(cmds.len(), 5);
        assert_eq!(cmds[0], Cmd::Begin(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT));
        assert!(matches!(
            cmds[1],
            Cmd::Barrier {
                old: vk::ImageLayout::UNDEFINED,
                new: vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                ..
            }
        ));
        assert_eq!(
            cmds[2],
            Cmd::CopyBufferToImage {
                src: texture.staging,
                dst: texture.image.image,
                layout: vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                row_length: 0,
            }
        );
        assert!(matches!(
            cmds[3],
            Cmd::Barrier {
                old: vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                new: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                dst_stage: vk::PipelineStageFlags::FRAGMENT_SHADER,
                ..
            }
        ));
        assert_eq!(cmds[4], Cmd::End);
        assert!(texture.has_contents());

        unsafe {
            texture.tear_down(&kernel);
            recorder.tear_down(&kernel);
        }
        for kind in [Kind::Image, Kind::ImageView, Kind::Buffer, Kind::Memory] {
            assert_eq!(kernel.device.live_count(kind), 0, "{kind:?}");
        }
    }

    #[test]
    fn second_upload_waits_on_fragment_reads() {
        let kernel = mock::kernel(2, 640, 480);
        let mut recorder = CommandRecorder::default();
        recorder.set_up(&kernel).unwrap();
        let mut texture = Texture::default();
        texture.set_up(&kernel, 2, 2, PixelFormat::Rgba8).unwrap();
        let frame = [0u8; 16];

        texture.update(&kernel, &recorder, &frame, 0).unwrap();
        texture.update(&kernel, &recorder, &frame, 0).unwrap();

        let second = kernel.device.submitted()[1];
        assert!(matches!(
            kernel.device.commands(second)[1],
            Cmd::Barrier {
                old: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                src_stage: vk::PipelineStageFlags::FRAGMENT_SHADER,
                ..
            }
        ));
    }

    #[test]
    fn short_frames_are_rejected_before_anything_is_submitted() {
        let kernel = mock::kernel(2, 640, 480);
        let mut recorder = CommandRecorder::default();
        recorder.set_up(&kernel).unwrap();
        let mut texture = Texture::default();
        texture.set_up(&kernel, 4, 4, PixelFormat::Rgba8).unwrap();

        let err = texture.update(&kernel, &recorder, &[0; 63], 0).unwrap_err();
        assert!(matches!(
            err,
            RenderError::FrameTooSmall {
                expected: 64,
                actual: 63
            }
        ));
        let err = texture.update(&kernel, &recorder, &[0; 64], 8).unwrap_err();
        assert!(matches!(
            err,
            RenderError::StrideTooShort {
                stride: 8,
                row_len: 16
            }
        ));
        assert_eq!(kernel.device.submits(), 0);
    }

    #[test]
    fn huge_stride_is_a_short_frame_not_an_overflow() {
        let kernel = mock::kernel(2, 640, 480);
        let mut recorder = CommandRecorder::default();
        recorder.set_up(&kernel).unwrap();
        let mut texture = Texture::default();
        texture.set_up(&kernel, 2, 4, PixelFormat::Rgba8).unwrap();

        let err = texture
            .update(&kernel, &recorder, &[0; 64], usize::MAX / 2)
            .unwrap_err();
        assert!(matches!(
            err,
            RenderError::FrameTooSmall {
                expected: usize::MAX,
                actual: 64
            }
        ));
        assert_eq!(kernel.device.submits(), 0);
    }

    #[test]
    fn empty_extents_are_refused() {
        let kernel = mock::kernel(2, 640, 480);
        let mut texture = Texture::default();
        for (w, h) in [(0, 0), (16, 0), (0, 16)] {
            let err = texture.set_up(&kernel, w, h, PixelFormat::Rgba8).unwrap_err();
            assert!(matches!(
                err,
                RenderError::EmptyExtent { width, height } if (width, height) == (w, h)
            ));
        }
        assert_eq!(kernel.device.live_count(Kind::Image), 0);
        assert_eq!(kernel.device.live_count(Kind::Buffer), 0);
    }

    #[test]
    fn multi_planar_formats_are_refused() {
        let kernel = mock::kernel(2, 640, 480);
        let mut texture = Texture::default();
        let err = texture
            .set_up_format(&kernel, 64, 64, vk::Format::G8_B8R8_2PLANE_420_UNORM, 6144)
            .unwrap_err();
        assert!(matches!(
            err,
            RenderError::UnsupportedFormat(vk::Format::G8_B8R8_2PLANE_420_UNORM)
        ));
        assert_eq!(kernel.device.live_count(Kind::Image), 0);
    }
}
