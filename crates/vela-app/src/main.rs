// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};
use vela_core::init_tracing;
use vela_render::{PixelFormat, PixelTransform, RenderSize, ResampleFilter, VideoGravity};
use vela_render_vk::VkPixelTransform;

use vela_platform::winit::{
    application::ApplicationHandler,
    event::{ElementState, WindowEvent},
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    keyboard::Key,
    window::{Window, WindowId},
};

mod config;
mod pattern;

use config::{load_cfg, AppCfg, FilterCfg, GravityCfg, OrientationCfg};
use pattern::ColorBars;

// Order the `o` key steps through.
const ORIENTATIONS: [OrientationCfg; 8] = [
    OrientationCfg::Up,
    OrientationCfg::Right,
    OrientationCfg::Down,
    OrientationCfg::Left,
    OrientationCfg::UpMirrored,
    OrientationCfg::RightMirrored,
    OrientationCfg::DownMirrored,
    OrientationCfg::LeftMirrored,
];

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the TOML config
    #[arg(long, default_value = "vela.toml")]
    config: PathBuf,
    /// Override [render].video_gravity
    #[arg(long, value_enum)]
    gravity: Option<GravityCfg>,
}

struct App {
    cfg: AppCfg,
    window: Option<Window>,
    transform: Option<VkPixelTransform>,
    render_size: RenderSize,
    bars: ColorBars,
    pixel_format: PixelFormat,

    exiting: bool,
    paused: bool,
    frame_index: u64,
    frame_interval: Duration,
    next_frame_deadline: Instant,
    frames: u32,
    last_fps_instant: Instant,
}

impl App {
    fn new(cfg: AppCfg) -> Self {
        let source = cfg.source;
        let pixel_format = PixelFormat::from(cfg.render.pixel_format);
        let now = Instant::now();
        App {
            bars: ColorBars::new(source.width, source.height, pixel_format),
            pixel_format,
            frame_interval: Duration::from_nanos(1_000_000_000u64 / source.fps as u64),
            cfg,
            window: None,
            transform: None,
            render_size: RenderSize::new(1, 1),
            exiting: false,
            paused: false,
            frame_index: 0,
            next_frame_deadline: now,
            frames: 0,
            last_fps_instant: now,
        }
    }

    fn create_transform(&self, window: &Window) -> Result<VkPixelTransform> {
        let mut transform = VkPixelTransform::new(window, window, self.render_size)?;
        info!("devices:\n{}", transform.inspect_devices().trim_end());

        let render = self.cfg.render;
        transform.set_video_gravity(render.video_gravity.into());
        transform.set_image_orientation(render.image_orientation.into());
        transform.set_surface_rotation(render.surface_rotation());
        transform.set_resample_filter(render.resample_filter.into())?;
        transform.set_up_texture(self.cfg.source.width, self.cfg.source.height, self.pixel_format)?;
        Ok(transform)
    }

    fn attach(&mut self) -> Result<()> {
        let (Some(window), Some(transform)) = (&self.window, &mut self.transform) else {
            return Ok(());
        };
        transform.attach_surface(window, window, self.render_size)
    }

    fn push_frame(&mut self) {
        let Some(transform) = &mut self.transform else {
            return;
        };
        let stride = self.bars.stride();
        let frame = self.bars.frame(self.frame_index);
        match transform.update_texture(frame, stride) {
            Ok(()) => {
                // count only frames that were actually pushed
                self.frames = self.frames.saturating_add(1);
                self.frame_index = self.frame_index.wrapping_add(1);
            }
            Err(e) => error!("frame error: {e:#}"),
        }
    }

    fn handle_key(&mut self, key: &str) {
        let Some(transform) = &mut self.transform else {
            return;
        };
        match key {
            "g" => {
                let next = match transform.video_gravity() {
                    VideoGravity::ResizeAspect => VideoGravity::ResizeAspectFill,
                    VideoGravity::ResizeAspectFill => VideoGravity::Resize,
                    VideoGravity::Resize => VideoGravity::ResizeAspect,
                };
                transform.set_video_gravity(next);
                info!("gravity = {:?}", next);
            }
            "r" => {
                let current = self.cfg.render.surface_rotation().degrees();
                self.cfg.render.surface_rotation = (current + 90) % 360;
                let rotation = self.cfg.render.surface_rotation();
                transform.set_surface_rotation(rotation);
                info!("surface rotation = {}°", rotation.degrees());
            }
            "o" => {
                let current = ORIENTATIONS
                    .iter()
                    .position(|o| *o == self.cfg.render.image_orientation)
                    .unwrap_or(0);
                let next = ORIENTATIONS[(current + 1) % ORIENTATIONS.len()];
                self.cfg.render.image_orientation = next;
                transform.set_image_orientation(next.into());
                info!("orientation = {:?}", next);
            }
            "f" => {
                let next = match self.cfg.render.resample_filter {
                    FilterCfg::Linear => FilterCfg::Nearest,
                    FilterCfg::Nearest => FilterCfg::Linear,
                };
                match transform.set_resample_filter(ResampleFilter::from(next)) {
                    Ok(()) => {
                        self.cfg.render.resample_filter = next;
                        info!("filter = {:?}", next);
                    }
                    Err(e) => warn!("resample filter: {e:#}"),
                }
            }
            _ => {}
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_none() {
            let window = match event_loop
                .create_window(Window::default_attributes().with_title("vela"))
            {
                Ok(w) => w,
                Err(e) => {
                    error!("create_window failed: {e}");
                    event_loop.exit();
                    return;
                }
            };

            let size = window.inner_size();
            self.render_size = RenderSize::new(size.width.max(1), size.height.max(1));

            match self.create_transform(&window) {
                Ok(t) => self.transform = Some(t),
                Err(e) => {
                    error!("vk init failed: {e:#}");
                    event_loop.exit();
                    return;
                }
            }
            self.window = Some(window);
        } else if let Err(e) = self.attach() {
            error!("attach_surface failed: {e:#}");
        }

        self.paused = self.render_size.is_empty();
        info!("resumed → paused={}", self.paused);
        event_loop.set_control_flow(ControlFlow::WaitUntil(self.next_frame_deadline));
    }

    fn suspended(&mut self, _event_loop: &ActiveEventLoop) {
        // The platform may destroy the native surface once we return.
        if let Some(transform) = &mut self.transform {
            transform.detach_surface();
        }
        self.paused = true;
        info!("suspended → paused=true");
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent,
    ) {
        if let Some(window) = &self.window {
            if window_id != window.id() {
                return;
            }
        }

        match event {
            WindowEvent::CloseRequested => {
                info!("CloseRequested");
                self.exiting = true;
                // Transform first: it must not outlive the surface's window.
                self.transform = None;
                self.window = None;
                event_loop.exit();
            }

            WindowEvent::Resized(new_size) => {
                self.render_size = RenderSize::new(new_size.width, new_size.height);
                self.paused = self.render_size.is_empty();
                info!(
                    "Resized → {}x{} (paused={})",
                    self.render_size.width, self.render_size.height, self.paused
                );

                if let Some(transform) = &mut self.transform {
                    if let Err(e) = transform.resize(self.render_size) {
                        error!("resize failed: {e:#}");
                    }
                }
                if !self.paused {
                    if let Some(w) = &self.window {
                        w.request_redraw();
                    }
                }
            }

            WindowEvent::KeyboardInput { event, .. } if event.state == ElementState::Pressed => {
                if let Key::Character(c) = &event.logical_key {
                    self.handle_key(&c.to_lowercase());
                }
            }

            WindowEvent::RedrawRequested => {
                if self.exiting || self.paused {
                    return;
                }
                let now = Instant::now();
                if now >= self.next_frame_deadline {
                    self.next_frame_deadline = now + self.frame_interval;
                    self.push_frame();
                } else if let Some(transform) = &mut self.transform {
                    // Gravity or rotation may have changed between frames.
                    if let Err(e) = transform.render() {
                        error!("render error: {e:#}");
                    }
                }
            }

            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.exiting {
            return;
        }
        if self.paused {
            // window-size=0 or suspended → sleep
            event_loop.set_control_flow(ControlFlow::Wait);
            self.frames = 0;
            return;
        }

        let now = Instant::now();
        if now >= self.next_frame_deadline {
            if let Some(w) = &self.window {
                w.request_redraw();
            }
        }
        event_loop.set_control_flow(ControlFlow::WaitUntil(self.next_frame_deadline));

        if now.duration_since(self.last_fps_instant).as_secs_f32() >= 1.0 {
            info!("fps ~ {}", self.frames);
            self.frames = 0;
            self.last_fps_instant = now;
        }
    }
}

fn main() -> Result<()> {
    init_tracing("info");
    let args = Args::parse();

    let mut cfg = load_cfg(&args.config);
    if let Some(gravity) = args.gravity {
        cfg.render.video_gravity = gravity;
    }
    info!(
        "source {}x{} @ {} fps, gravity {:?}, rotation {:?}",
        cfg.source.width,
        cfg.source.height,
        cfg.source.fps,
        cfg.render.video_gravity,
        cfg.render.surface_rotation()
    );

    let event_loop: EventLoop<()> = EventLoop::new()?;
    let mut app = App::new(cfg);
    event_loop.run_app(&mut app)?;
    Ok(())
}
