// SPDX-License-Identifier: CEPL-1.0
use serde::Deserialize;
use std::{fs, io, path::Path};
use tracing::{debug, warn};
use vela_render::{ImageOrientation, PixelFormat, ResampleFilter, SurfaceRotation, VideoGravity};

#[derive(Debug, Deserialize, Default)]
pub struct AppCfg {
    #[serde(default)]
    pub render: RenderCfg,
    #[serde(default)]
    pub source: SourceCfg,
}

#[derive(Debug, Deserialize, Clone, Copy, Default)]
pub struct RenderCfg {
    #[serde(default)]
    pub video_gravity: GravityCfg,
    #[serde(default)]
    pub image_orientation: OrientationCfg,
    /// Degrees, one of 0/90/180/270.
    #[serde(default)]
    pub surface_rotation: u32,
    #[serde(default)]
    pub resample_filter: FilterCfg,
    #[serde(default)]
    pub pixel_format: PixelFormatCfg,
}

#[derive(Debug, Deserialize, Clone, Copy)]
pub struct SourceCfg {
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default = "default_fps")]
    pub fps: u32,
}

impl Default for SourceCfg {
    fn default() -> Self {
        SourceCfg {
            width: default_width(),
            height: default_height(),
            fps: default_fps(),
        }
    }
}

impl SourceCfg {
    /// Zero sizes or rates are raised to 1.
    fn clamped(self) -> Self {
        if self.width == 0 || self.height == 0 || self.fps == 0 {
            warn!(
                "[source] {}x{} @ {} fps has a zero field, raising it to 1",
                self.width, self.height, self.fps
            );
        }
        SourceCfg {
            width: self.width.max(1),
            height: self.height.max(1),
            fps: self.fps.max(1),
        }
    }
}

fn default_width() -> u32 {
    1280
}
fn default_height() -> u32 {
    720
}
fn default_fps() -> u32 {
    30
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
#[value(rename_all = "snake_case")]
pub enum GravityCfg {
    #[default]
    ResizeAspect,
    ResizeAspectFill,
    Resize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrientationCfg {
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

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FilterCfg {
    Nearest,
    #[default]
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PixelFormatCfg {
    #[default]
    Rgba8,
    Bgra8,
}

impl From<GravityCfg> for VideoGravity {
    fn from(g: GravityCfg) -> Self {
        match g {
            GravityCfg::ResizeAspect => VideoGravity::ResizeAspect,
            GravityCfg::ResizeAspectFill => VideoGravity::ResizeAspectFill,
            GravityCfg::Resize => VideoGravity::Resize,
        }
    }
}

impl From<OrientationCfg> for ImageOrientation {
    fn from(o: OrientationCfg) -> Self {
        match o {
            OrientationCfg::Up => ImageOrientation::Up,
            OrientationCfg::Down => ImageOrientation::Down,
            OrientationCfg::Left => ImageOrientation::Left,
            OrientationCfg::Right => ImageOrientation::Right,
            OrientationCfg::UpMirrored => ImageOrientation::UpMirrored,
            OrientationCfg::DownMirrored => ImageOrientation::DownMirrored,
            OrientationCfg::LeftMirrored => ImageOrientation::LeftMirrored,
            OrientationCfg::RightMirrored => ImageOrientation::RightMirrored,
        }
    }
}

impl From<FilterCfg> for ResampleFilter {
    fn from(f: FilterCfg) -> Self {
        match f {
            FilterCfg::Nearest => ResampleFilter::Nearest,
            FilterCfg::Linear => ResampleFilter::Linear,
        }
    }
}

impl From<PixelFormatCfg> for PixelFormat {
    fn from(p: PixelFormatCfg) -> Self {
        match p {
            PixelFormatCfg::Rgba8 => PixelFormat::Rgba8,
            PixelFormatCfg::Bgra8 => PixelFormat::Bgra8,
        }
    }
}

impl RenderCfg {
    pub fn surface_rotation(&self) -> SurfaceRotation {
        SurfaceRotation::from_degrees(self.surface_rotation).unwrap_or_else(|| {
            warn!(
                "surface_rotation = {} is not a quarter turn, using 0",
                self.surface_rotation
            );
            SurfaceRotation::Rotation0
        })
    }
}

/// Missing file means defaults; a malformed one is reported and ignored.
pub fn load_cfg(path: &Path) -> AppCfg {
    match fs::read_to_string(path) {
        Ok(s) => parse_cfg(&s).unwrap_or_else(|e| {
            warn!("{}: {e}; using defaults", path.display());
            AppCfg::default()
        }),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!("{} not found, using defaults", path.display());
            AppCfg::default()
        }
        Err(e) => {
            warn!("{}: {e}; using defaults", path.display());
            AppCfg::default()
        }
    }
}

pub fn parse_cfg(s: &str) -> Result<AppCfg, toml::de::Error> {
    let mut cfg = toml::from_str::<AppCfg>(s)?;
    cfg.source = cfg.source.clamped();
    Ok(cfg)
}
