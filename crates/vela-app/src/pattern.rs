// SPDX-License-Identifier: CEPL-1.0
use vela_render::PixelFormat;

// White, yellow, cyan, green, magenta, red, blue, black.
const BARS: [[u8; 3]; 8] = [
    [235, 235, 235],
    [235, 235, 16],
    [16, 235, 235],
    [16, 235, 16],
    [235, 16, 235],
    [235, 16, 16],
    [16, 16, 235],
    [16, 16, 16],
];

/// Scrolling colour bars standing in for a decoder.
pub struct ColorBars {
    width: u32,
    format: PixelFormat,
    buf: Vec<u8>,
}

impl ColorBars {
    pub fn new(width: u32, height: u32, format: PixelFormat) -> Self {
        let (width, height) = (width.max(1), height.max(1));
        Self {
            width,
            format,
            buf: vec![0; format.frame_len(width, height)],
        }
    }

    /// Bytes between rows of [`ColorBars::frame`].
    pub fn stride(&self) -> usize {
        self.width as usize * self.format.bytes_per_pixel()
    }

    /// Renders frame `index`; bars move one pixel per frame.
    pub fn frame(&mut self, index: u64) -> &[u8] {
        let width = self.width as u64;
        let bar_width = (width / BARS.len() as u64).max(1);
        let stride = self.stride();

        let (first, rest) = self.buf.split_at_mut(stride);
        for (x, px) in first.chunks_exact_mut(4).enumerate() {
            let shifted = (x as u64 + index) % width;
            let [r, g, b] = BARS[((shifted / bar_width) as usize).min(BARS.len() - 1)];
            let bytes = match self.format {
                PixelFormat::Rgba8 => [r, g, b, 255],
                PixelFormat::Bgra8 => [b, g, r, 255],
            };
            px.copy_from_slice(&bytes);
        }
        for row in rest.chunks_exact_mut(stride) {
            row.copy_from_slice(first);
        }
        &self.buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_covers_the_whole_source() {
        let mut bars = ColorBars::new(64, 8, PixelFormat::Rgba8);
        assert_eq!(bars.stride(), 256);
        assert_eq!(bars.frame(0).len(), 64 * 8 * 4);
    }

    #[test]
    fn first_bar_is_white_and_rows_repeat() {
        let mut bars = ColorBars::new(64, 4, PixelFormat::Rgba8);
        let frame = bars.frame(0).to_vec();
        assert_eq!(&frame[..4], &[235, 235, 235, 255]);
        assert_eq!(&frame[..256], &frame[3 * 256..]);
    }

    #[test]
    fn bgra_swaps_red_and_blue() {
        let mut bars = ColorBars::new(64, 1, PixelFormat::Bgra8);
        let frame = bars.frame(0);
        // Second bar (yellow) starts at x = 8.
        assert_eq!(&frame[8 * 4..8 * 4 + 4], &[16, 235, 235, 255]);
    }

    #[test]
    fn bars_scroll_with_the_frame_index() {
        let mut bars = ColorBars::new(64, 1, PixelFormat::Rgba8);
        let frame = bars.frame(8).to_vec();
        // Shifted by one bar: yellow now starts at x = 0.
        assert_eq!(&frame[..4], &[235, 235, 16, 255]);
    }
}
