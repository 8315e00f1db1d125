// SPDX-License-Identifier: CEPL-1.0
use anyhow::Result;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

mod format;
mod gravity;
mod orientation;

pub use format::{PixelFormat, ResampleFilter};
pub use gravity::{Rect, VideoGravity};
pub use orientation::{
    combined_quarter_turns, orientation_transform, ImageOrientation, SurfaceRotation,
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RenderSize {
    pub width: u32,
    pub height: u32,
}

impl RenderSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn swapped(self) -> Self {
        Self {
            width: self.height,
            height: self.width,
        }
    }
}

/// Pushes decoded frames onto a platform output surface.
///
/// Implementations own the GPU context and the frame textures but never the
/// platform window: the caller keeps the window alive and reports its loss
/// through [`PixelTransform::detach_surface`].
pub trait PixelTransform {
    fn new(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        size: RenderSize,
    ) -> Result<Self>
    where
        Self: Sized;

    fn resize(&mut self, size: RenderSize) -> Result<()>;

    /// (Re)creates the frame texture for a source of the given size.
    fn set_up_texture(&mut self, width: u32, height: u32, format: PixelFormat) -> Result<()>;

    /// Uploads one frame (`stride` bytes per source row) and presents it.
    fn update_texture(&mut self, data: &[u8], stride: usize) -> Result<()>;

    /// Presents the last uploaded frame again.
    fn render(&mut self) -> Result<()>;

    fn set_video_gravity(&mut self, gravity: VideoGravity);
    fn video_gravity(&self) -> VideoGravity;
    fn set_image_orientation(&mut self, orientation: ImageOrientation);
    fn set_surface_rotation(&mut self, rotation: SurfaceRotation);
    fn set_resample_filter(&mut self, filter: ResampleFilter) -> Result<()>;

    fn attach_surface(
        &mut self,
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        size: RenderSize,
    ) -> Result<()>;
    fn detach_surface(&mut self);

    /// Human-readable list of the GPUs visible to the backend.
    fn inspect_devices(&self) -> String;
    fn is_ready(&self) -> bool;
}
