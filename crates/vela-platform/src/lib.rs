// SPDX-License-Identifier: CEPL-1.0
//! Platform surface boundary. Windowing stays behind this crate so the
//! renderer crates only ever see raw window/display handles.
pub use winit;
