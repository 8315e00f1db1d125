// SPDX-License-Identifier: CEPL-1.0
use crate::RenderSize;

/// Viewport rectangle in target pixels. Offsets may be negative and the
/// extent may exceed the target when the source is cropped.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    fn centered(width: f32, height: f32, target: RenderSize) -> Self {
        Self {
            x: (target.width as f32 - width) * 0.5,
            y: (target.height as f32 - height) * 0.5,
            width,
            height,
        }
    }
}

/// How a source frame is mapped onto a differently shaped target.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum VideoGravity {
    /// Letterbox: whole frame visible, aspect preserved.
    #[default]
    ResizeAspect,
    /// Crop: target fully covered, aspect preserved.
    ResizeAspectFill,
    /// Stretch to the target, aspect ignored.
    Resize,
}

impl VideoGravity {
    pub fn viewport(self, source: RenderSize, target: RenderSize) -> Rect {
        let full = Rect::new(0.0, 0.0, target.width as f32, target.height as f32);
        if source.is_empty() || target.is_empty() {
            return full;
        }

        let sx = target.width as f32 / source.width as f32;
        let sy = target.height as f32 / source.height as f32;
        let scale = match self {
            VideoGravity::Resize => return full,
            VideoGravity::ResizeAspect => sx.min(sy),
            VideoGravity::ResizeAspectFill => sx.max(sy),
        };

        Rect::centered(
            source.width as f32 * scale,
            source.height as f32 * scale,
            target,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PORTRAIT: RenderSize = RenderSize::new(1080, 1920);
    const LANDSCAPE: RenderSize = RenderSize::new(1920, 1080);

    #[test]
    fn same_shape_fills_target_for_every_gravity() {
        for gravity in [
            VideoGravity::ResizeAspect,
            VideoGravity::ResizeAspectFill,
            VideoGravity::Resize,
        ] {
            assert_eq!(
                gravity.viewport(PORTRAIT, PORTRAIT),
                Rect::new(0.0, 0.0, 1080.0, 1920.0)
            );
        }
    }

    #[test]
    fn aspect_letterboxes_wide_source_on_tall_target() {
        let vp = VideoGravity::ResizeAspect.viewport(LANDSCAPE, PORTRAIT);
        assert_eq!(vp.width, 1080.0);
        assert_eq!(vp.height, 607.5);
        assert_eq!(vp.x, 0.0);
        assert_eq!(vp.y, 656.25);
    }

    #[test]
    fn aspect_fill_overflows_and_goes_negative() {
        let vp = VideoGravity::ResizeAspectFill.viewport(LANDSCAPE, PORTRAIT);
        assert!((vp.height - 1920.0).abs() < 1e-3);
        assert!(vp.width > 1080.0);
        assert!(vp.x < 0.0);
        assert!((vp.x * 2.0 + vp.width - 1080.0).abs() < 1e-3);
    }

    #[test]
    fn resize_ignores_aspect() {
        let vp = VideoGravity::Resize.viewport(RenderSize::new(640, 480), PORTRAIT);
        assert_eq!(vp, Rect::new(0.0, 0.0, 1080.0, 1920.0));
    }

    #[test]
    fn empty_source_falls_back_to_full_target() {
        let vp = VideoGravity::ResizeAspect.viewport(RenderSize::new(0, 480), LANDSCAPE);
        assert_eq!(vp, Rect::new(0.0, 0.0, 1920.0, 1080.0));
    }
}
