// SPDX-License-Identifier: CEPL-1.0
use ash::vk;
use thiserror::Error;

/// Failures surfaced by the recording core. None of them is retried: a
/// resource that could not be created is treated as fatal by the caller.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("vulkan call failed: {0}")]
    Vk(#[from] vk::Result),

    #[error("no memory type in {type_bits:#b} supports {properties:?}")]
    NoSuitableMemoryType {
        type_bits: u32,
        properties: vk::MemoryPropertyFlags,
    },

    #[error("command recorder used before set_up")]
    NotSetUp,

    #[error("set_textures called with an empty texture set")]
    NoTextures,

    #[error("texture extent {width}x{height} is empty")]
    EmptyExtent { width: u32, height: u32 },

    #[error("unsupported texture format {0:?}")]
    UnsupportedFormat(vk::Format),

    #[error("frame holds {actual} bytes, {expected} required")]
    FrameTooSmall { expected: usize, actual: usize },

    #[error("row stride {stride} is shorter than a {row_len}-byte row")]
    StrideTooShort { stride: usize, row_len: usize },
}

pub type Result<T, E = RenderError> = std::result::Result<T, E>;
