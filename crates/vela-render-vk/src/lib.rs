// SPDX-License-Identifier: CEPL-1.0
//! Vulkan backend for [`vela_render::PixelTransform`].
//!
//! [`VkPixelTransform`] is the entry point. Underneath it the [`Kernel`]
//! holds the device, swap chain and pipeline, [`CommandRecorder`] keeps one
//! pre-recorded command buffer per swap-chain image, and [`Texture`] wraps the
//! [`ImageStorage`] that frames are uploaded into.

mod command_recorder;
mod device;
mod error;
mod image_storage;
mod kernel;
#[cfg(test)]
mod mock;
mod pipeline;
mod pixel_transform;
mod swap_chain;
mod texture;

pub use command_recorder::{CommandRecorder, RecorderState, QUAD_VERTICES};
pub use device::GpuDevice;
pub use error::{RenderError, Result};
pub use image_storage::ImageStorage;
pub use kernel::{find_memory_type, Kernel, Queue};
pub use pipeline::{Pipeline, Vertex};
pub use pixel_transform::VkPixelTransform;
pub use swap_chain::SwapChain;
pub use texture::{PushConstants, Texture};
