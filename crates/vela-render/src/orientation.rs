// SPDX-License-Identifier: CEPL-1.0
use glam::{Mat4, Vec4};

/// Rotation of the output surface relative to its natural orientation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SurfaceRotation {
    #[default]
    Rotation0,
    Rotation90,
    Rotation180,
    Rotation270,
}

impl SurfaceRotation {
    pub fn from_degrees(degrees: u32) -> Option<Self> {
        match degrees % 360 {
            0 => Some(Self::Rotation0),
            90 => Some(Self::Rotation90),
            180 => Some(Self::Rotation180),
            270 => Some(Self::Rotation270),
            _ => None,
        }
    }

    pub const fn degrees(self) -> u32 {
        self.quarter_turns() * 90
    }

    pub const fn quarter_turns(self) -> u32 {
        match self {
            Self::Rotation0 => 0,
            Self::Rotation90 => 1,
            Self::Rotation180 => 2,
            Self::Rotation270 => 3,
        }
    }
}

/// Orientation the source frame was captured in.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ImageOrientation {
    #[default]
    Up,
    Down,
    Left,
    Right,
    UpMirrored,
    DownMirrored,
    LeftMirrored,
    RightMirrored,
}

impl ImageOrientation {
    /// Clockwise quarter turns needed to show the frame upright.
    pub const fn quarter_turns(self) -> u32 {
        match self {
            Self::Up | Self::UpMirrored => 0,
            Self::Right | Self::RightMirrored => 1,
            Self::Down | Self::DownMirrored => 2,
            Self::Left | Self::LeftMirrored => 3,
        }
    }

    pub const fn is_mirrored(self) -> bool {
        matches!(
            self,
            Self::UpMirrored | Self::DownMirrored | Self::LeftMirrored | Self::RightMirrored
        )
    }
}

/// Total clockwise quarter turns applied to the quad, modulo 4.
pub fn combined_quarter_turns(orientation: ImageOrientation, rotation: SurfaceRotation) -> u32 {
    (orientation.quarter_turns() + rotation.quarter_turns()) % 4
}

/// Clip-space transform for the full-screen quad. Built from exact quarter
/// turns so axis-aligned results stay bit-exact.
pub fn orientation_transform(orientation: ImageOrientation, rotation: SurfaceRotation) -> Mat4 {
    // Vulkan clip space is y-down, so +x -> +y is clockwise on screen.
    let (x_axis, y_axis) = match combined_quarter_turns(orientation, rotation) {
        0 => (Vec4::X, Vec4::Y),
        1 => (Vec4::Y, Vec4::NEG_X),
        2 => (Vec4::NEG_X, Vec4::NEG_Y),
        _ => (Vec4::NEG_Y, Vec4::X),
    };
    let turn = Mat4::from_cols(x_axis, y_axis, Vec4::Z, Vec4::W);
    if orientation.is_mirrored() {
        turn * Mat4::from_cols(Vec4::NEG_X, Vec4::Y, Vec4::Z, Vec4::W)
    } else {
        turn
    }
}
