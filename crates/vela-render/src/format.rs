// SPDX-License-Identifier: CEPL-1.0

/// Layout of the raw pixel buffers handed to `update_texture`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PixelFormat {
    #[default]
    Rgba8,
    Bgra8,
}

impl PixelFormat {
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Rgba8 | PixelFormat::Bgra8 => 4,
        }
    }

    /// Tightly packed size of one `width` x `height` frame.
    pub const fn frame_len(self, width: u32, height: u32) -> usize {
        width as usize * height as usize * self.bytes_per_pixel()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ResampleFilter {
    Nearest,
    #[default]
    Linear,
}
