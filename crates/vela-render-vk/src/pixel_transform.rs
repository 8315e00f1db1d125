// SPDX-License-Identifier: CEPL-1.0
use crate::command_recorder::{CommandRecorder, RecorderState};
use crate::kernel::{Kernel, Queue};
use crate::pipeline::Pipeline;
use crate::swap_chain::SwapChain;
use crate::texture::Texture;
use anyhow::{anyhow, Context, Result};
#[cfg(debug_assertions)]
use ash::ext::debug_utils;
use ash::khr::{surface, swapchain};
use ash::{vk, Entry, Instance};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle, RawDisplayHandle};
use std::ffi::CStr;
use std::fmt::Write as _;
use tracing::{debug, info, warn};
use vela_render::{
    ImageOrientation, PixelFormat, PixelTransform, RenderSize, ResampleFilter, SurfaceRotation,
    VideoGravity,
};

#[cfg(debug_assertions)]
type DebugState = vk::DebugUtilsMessengerEXT;
#[cfg(not(debug_assertions))]
type DebugState = ();

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

struct AcquireSlot {
    sem: vk::Semaphore,
    fence: vk::Fence,
}

/// Vulkan implementation of [`PixelTransform`].
///
/// Owns the instance, the render context, the command recorder and the frame
/// textures. The platform window is only borrowed while creating a surface;
/// its loss is reported through `detach_surface`.
pub struct VkPixelTransform {
    entry: Entry,
    instance: Instance,
    debug_messenger: DebugState,
    surface_loader: surface::Instance,
    surface: vk::SurfaceKHR,
    phys: vk::PhysicalDevice,
    swapchain_loader: swapchain::Device,

    kernel: Kernel,
    recorder: CommandRecorder,
    textures: Vec<Texture>,

    acq_slots: Vec<AcquireSlot>,
    acq_index: usize,
    // One per swap-chain image.
    render_finished: Vec<vk::Semaphore>,
    // Slot fence of the last submit that drew into each image.
    image_fences: Vec<vk::Fence>,

    size: RenderSize,
    paused: bool,
    video_gravity: VideoGravity,
    image_orientation: ImageOrientation,
    resample_filter: ResampleFilter,
}

#[cfg(debug_assertions)]
unsafe extern "system" fn debug_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _types: vk::DebugUtilsMessageTypeFlagsEXT,
    data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _user: *mut std::os::raw::c_void,
) -> vk::Bool32 {
    if !data.is_null() && !(*data).p_message.is_null() {
        let msg = CStr::from_ptr((*data).p_message).to_string_lossy();
        if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
            tracing::error!(target: "vulkan", "{msg}");
        } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
            warn!(target: "vulkan", "{msg}");
        } else {
            debug!(target: "vulkan", "{msg}");
        }
    }
    vk::FALSE
}

#[cfg(debug_assertions)]
unsafe fn create_debug_messenger(entry: &Entry, instance: &Instance) -> Result<DebugState> {
    let loader = debug_utils::Instance::new(entry, instance);
    let ci = vk::DebugUtilsMessengerCreateInfoEXT {
        s_type: vk::StructureType::DEBUG_UTILS_MESSENGER_CREATE_INFO_EXT,
        message_severity: vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
            | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        message_type: vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
            | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
            | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        pfn_user_callback: Some(debug_callback),
        ..Default::default()
    };
    Ok(loader.create_debug_utils_messenger(&ci, None)?)
}

#[cfg(not(debug_assertions))]
unsafe fn create_debug_messenger(_entry: &Entry, _instance: &Instance) -> Result<DebugState> {
    Ok(())
}

#[cfg(debug_assertions)]
unsafe fn destroy_debug_messenger(entry: &Entry, instance: &Instance, dbg: DebugState) {
    let loader = debug_utils::Instance::new(entry, instance);
    loader.destroy_debug_utils_messenger(dbg, None);
}

#[cfg(not(debug_assertions))]
unsafe fn destroy_debug_messenger(_entry: &Entry, _instance: &Instance, _dbg: DebugState) {}

unsafe fn create_instance(entry: &Entry, display_raw: RawDisplayHandle) -> Result<Instance> {
    let app = c"vela";
    let app_info = vk::ApplicationInfo {
        s_type: vk::StructureType::APPLICATION_INFO,
        p_application_name: app.as_ptr(),
        application_version: 0,
        p_engine_name: app.as_ptr(),
        engine_version: 0,
        // Per-plane memory queries and binds are core in 1.1.
        api_version: vk::API_VERSION_1_1,
        ..Default::default()
    };

    let mut exts = ash_window::enumerate_required_extensions(display_raw)
        .context("enumerate_required_extensions")?
        .to_vec();
    if cfg!(debug_assertions) {
        exts.push(ash::ext::debug_utils::NAME.as_ptr());
    }

    // Only ask for validation when it is installed, so debug builds still run
    // on machines without the SDK.
    let mut layers = Vec::new();
    if cfg!(debug_assertions) {
        let available = entry
            .enumerate_instance_layer_properties()
            .unwrap_or_default();
        if available
            .iter()
            .any(|l| CStr::from_ptr(l.layer_name.as_ptr()) == VALIDATION_LAYER)
        {
            layers.push(VALIDATION_LAYER.as_ptr());
        } else {
            warn!("validation layer not installed, running without it");
        }
    }

    let create_info = vk::InstanceCreateInfo {
        s_type: vk::StructureType::INSTANCE_CREATE_INFO,
        p_application_info: &app_info,
        enabled_extension_count: exts.len() as u32,
        pp_enabled_extension_names: exts.as_ptr(),
        enabled_layer_count: layers.len() as u32,
        pp_enabled_layer_names: layers.as_ptr(),
        ..Default::default()
    };
    Ok(entry.create_instance(&create_info, None)?)
}

unsafe fn create_surface(
    entry: &Entry,
    instance: &Instance,
    window: &dyn HasWindowHandle,
    display: &dyn HasDisplayHandle,
) -> Result<vk::SurfaceKHR> {
    let dh = display
        .display_handle()
        .map_err(|e| anyhow!("{e}"))?
        .as_raw();
    let wh = window.window_handle().map_err(|e| anyhow!("{e}"))?.as_raw();
    ash_window::create_surface(entry, instance, dh, wh, None).context("ash_window::create_surface")
}

unsafe fn pick_device_and_queue(
    instance: &Instance,
    surf_i: &surface::Instance,
    surface: vk::SurfaceKHR,
) -> Result<(vk::PhysicalDevice, u32)> {
    for phys in instance.enumerate_physical_devices()? {
        let props = instance.get_physical_device_properties(phys);
        if props.api_version < vk::API_VERSION_1_1 {
            continue;
        }
        let qprops = instance.get_physical_device_queue_family_properties(phys);
        for (i, q) in qprops.iter().enumerate() {
            if q.queue_flags.contains(vk::QueueFlags::GRAPHICS)
                && surf_i
                    .get_physical_device_surface_support(phys, i as u32, surface)
                    .unwrap_or(false)
            {
                return Ok((phys, i as u32));
            }
        }
    }
    Err(anyhow!("no suitable physical device/queue family"))
}

unsafe fn create_device(
    instance: &Instance,
    phys: vk::PhysicalDevice,
    queue_family: u32,
) -> Result<(ash::Device, vk::Queue)> {
    let priorities = [1.0_f32];
    let qinfo = vk::DeviceQueueCreateInfo {
        s_type: vk::StructureType::DEVICE_QUEUE_CREATE_INFO,
        queue_family_index: queue_family,
        queue_count: 1,
        p_queue_priorities: priorities.as_ptr(),
        ..Default::default()
    };
    let device_exts = [swapchain::NAME.as_ptr()];
    let dinfo = vk::DeviceCreateInfo {
        s_type: vk::StructureType::DEVICE_CREATE_INFO,
        queue_create_info_count: 1,
        p_queue_create_infos: &qinfo,
        enabled_extension_count: device_exts.len() as u32,
        pp_enabled_extension_names: device_exts.as_ptr(),
        ..Default::default()
    };
    let device = instance
        .create_device(phys, &dinfo, None)
        .context("create_device")?;
    let queue = device.get_device_queue(queue_family, 0);
    Ok((device, queue))
}

unsafe fn create_acquire_slots(device: &ash::Device) -> Result<Vec<AcquireSlot>> {
    let sem_ci = vk::SemaphoreCreateInfo::default();
    let fence_ci = vk::FenceCreateInfo {
        s_type: vk::StructureType::FENCE_CREATE_INFO,
        flags: vk::FenceCreateFlags::SIGNALED,
        ..Default::default()
    };
    let mut slots = Vec::with_capacity(2);
    for _ in 0..2 {
        let sem = device.create_semaphore(&sem_ci, None)?;
        let fence = device.create_fence(&fence_ci, None)?;
        slots.push(AcquireSlot { sem, fence });
    }
    Ok(slots)
}

unsafe fn create_semaphores(device: &ash::Device, count: usize) -> Result<Vec<vk::Semaphore>> {
    let sem_ci = vk::SemaphoreCreateInfo::default();
    (0..count)
        .map(|_| Ok(device.create_semaphore(&sem_ci, None)?))
        .collect()
}

/// Objects created so far by [`build`]. If a later step fails, dropping the
/// guard releases them in reverse creation order; on success everything is
/// taken out and the drop is a no-op.
#[derive(Default)]
struct BringUp {
    entry: Option<Entry>,
    instance: Option<Instance>,
    debug_messenger: Option<DebugState>,
    surface_loader: Option<surface::Instance>,
    surface: vk::SurfaceKHR,
    device: Option<ash::Device>,
    swapchain_loader: Option<swapchain::Device>,
    swap_chain: Option<SwapChain>,
    pipeline: Option<Pipeline>,
    acq_slots: Vec<AcquireSlot>,
    render_finished: Vec<vk::Semaphore>,
}

impl Drop for BringUp {
    fn drop(&mut self) {
        unsafe {
            if let Some(device) = self.device.take() {
                device.device_wait_idle().ok();
                for sem in self.render_finished.drain(..) {
                    device.destroy_semaphore(sem, None);
                }
                for s in self.acq_slots.drain(..) {
                    device.destroy_fence(s.fence, None);
                    device.destroy_semaphore(s.sem, None);
                }
                if let Some(mut pipeline) = self.pipeline.take() {
                    pipeline.destroy(&device);
                }
                if let (Some(mut swap_chain), Some(loader)) =
                    (self.swap_chain.take(), self.swapchain_loader.as_ref())
                {
                    swap_chain.destroy(&device, loader);
                }
                device.destroy_device(None);
            }
            if let Some(instance) = self.instance.take() {
                if let Some(loader) = self.surface_loader.as_ref() {
                    if self.surface != vk::SurfaceKHR::null() {
                        loader.destroy_surface(self.surface, None);
                    }
                }
                if let (Some(dbg), Some(entry)) = (self.debug_messenger.take(), self.entry.as_ref()) {
                    destroy_debug_messenger(entry, &instance, dbg);
                }
                instance.destroy_instance(None);
            }
        }
    }
}

unsafe fn build(
    window: &dyn HasWindowHandle,
    display: &dyn HasDisplayHandle,
    size: RenderSize,
) -> Result<VkPixelTransform> {
    // Instance, then a surface from it, then a device that can present to it.
    let dh = display
        .display_handle()
        .map_err(|e| anyhow!("{e}"))?
        .as_raw();
    let mut up = BringUp::default();
    let entry = up.entry.insert(Entry::linked());
    let instance = up
        .instance
        .insert(create_instance(entry, dh).context("create_instance")?);
    up.debug_messenger = Some(create_debug_messenger(entry, instance)?);
    let surface_loader = up
        .surface_loader
        .insert(surface::Instance::new(entry, instance));
    up.surface = create_surface(entry, instance, window, display)?;

    let (phys, queue_family) = pick_device_and_queue(instance, surface_loader, up.surface)?;
    let (device, queue) = create_device(instance, phys, queue_family)?;
    let device = up.device.insert(device);
    let memory_properties = instance.get_physical_device_memory_properties(phys);
    let swapchain_loader = up
        .swapchain_loader
        .insert(swapchain::Device::new(instance, device));

    let resample_filter = ResampleFilter::default();
    let swap_chain = up.swap_chain.insert(SwapChain::create(
        device,
        surface_loader,
        swapchain_loader,
        phys,
        up.surface,
        size,
        vk::SwapchainKHR::null(),
    )?);
    up.pipeline = Some(Pipeline::create(device, swap_chain.render_pass, resample_filter)?);
    up.acq_slots = create_acquire_slots(device)?;
    up.render_finished = create_semaphores(device, swap_chain.images_count())?;
    let image_fences = vec![vk::Fence::null(); swap_chain.images_count()];

    let props = instance.get_physical_device_properties(phys);
    info!(
        "pixel transform ready on {}",
        CStr::from_ptr(props.device_name.as_ptr()).to_string_lossy()
    );

    let (Some(device), Some(swap_chain), Some(pipeline)) =
        (up.device.take(), up.swap_chain.take(), up.pipeline.take())
    else {
        return Err(anyhow!("bring-up finished without a device"));
    };
    let mut kernel = Kernel {
        device,
        queue: Queue {
            handle: queue,
            queue_family_index: queue_family,
        },
        swap_chain,
        pipeline,
        memory_properties,
        surface_rotation: SurfaceRotation::default(),
        invalidate_surface_rotation: false,
    };
    let mut recorder = CommandRecorder::default();
    if let Err(e) = recorder.set_up(&kernel) {
        // Hand the kernel's objects back so the guard releases them.
        kernel.device.device_wait_idle().ok();
        kernel.pipeline.destroy(&kernel.device);
        if let Some(loader) = up.swapchain_loader.as_ref() {
            kernel.swap_chain.destroy(&kernel.device, loader);
        }
        up.device = Some(kernel.device);
        return Err(e.into());
    }

    let (Some(entry), Some(instance), Some(debug_messenger), Some(surface_loader), Some(swapchain_loader)) = (
        up.entry.take(),
        up.instance.take(),
        up.debug_messenger.take(),
        up.surface_loader.take(),
        up.swapchain_loader.take(),
    ) else {
        return Err(anyhow!("bring-up finished without an instance"));
    };
    let surface = std::mem::replace(&mut up.surface, vk::SurfaceKHR::null());

    Ok(VkPixelTransform {
        entry,
        instance,
        debug_messenger,
        surface_loader,
        surface,
        phys,
        swapchain_loader,
        kernel,
        recorder,
        textures: Vec::new(),
        acq_slots: std::mem::take(&mut up.acq_slots),
        acq_index: 0,
        render_finished: std::mem::take(&mut up.render_finished),
        image_fences,
        size,
        paused: size.is_empty(),
        video_gravity: VideoGravity::default(),
        image_orientation: ImageOrientation::default(),
        resample_filter,
    })
}

impl VkPixelTransform {
    unsafe fn wait_for_slots(&self) {
        let fences: Vec<_> = self.acq_slots.iter().map(|s| s.fence).collect();
        if !fences.is_empty() {
            let _ = self.kernel.device.wait_for_fences(&fences, true, u64::MAX);
        }
    }

    /// Releases the recorder and everything tied to the current swap chain.
    unsafe fn release_swap_chain(&mut self) {
        self.wait_for_slots();
        self.kernel.device.device_wait_idle().ok();
        self.recorder.tear_down(&self.kernel);
        for &sem in &self.render_finished {
            self.kernel.device.destroy_semaphore(sem, None);
        }
        self.render_finished.clear();
        self.image_fences.clear();
        self.kernel
            .swap_chain
            .destroy(&self.kernel.device, &self.swapchain_loader);
    }

    /// Builds the swap chain, its semaphores and the recorder for the current
    /// surface. `old` may be a retired swap chain to hand over from.
    unsafe fn build_swap_chain(&mut self, size: RenderSize, old: Option<SwapChain>) -> Result<()> {
        let old_handle = old.as_ref().map_or(vk::SwapchainKHR::null(), |sc| sc.handle);
        let created = SwapChain::create(
            &self.kernel.device,
            &self.surface_loader,
            &self.swapchain_loader,
            self.phys,
            self.surface,
            size,
            old_handle,
        );
        if let Some(mut old) = old {
            old.destroy(&self.kernel.device, &self.swapchain_loader);
        }
        let new = created?;
        let old_format = self.kernel.swap_chain.format;

        // Render passes with the same format stay compatible with the pipeline.
        if new.format != old_format {
            info!("swap chain format {:?} -> {:?}, rebuilding pipeline", old_format, new.format);
            self.kernel.pipeline.rebuild(&self.kernel.device, new.render_pass)?;
        }

        self.render_finished = create_semaphores(&self.kernel.device, new.images_count())?;
        self.image_fences = vec![vk::Fence::null(); new.images_count()];
        self.kernel.swap_chain = new;
        self.recorder.set_up(&self.kernel)?;
        self.kernel.invalidate_surface_rotation = true;
        self.acq_index = 0;
        Ok(())
    }

    unsafe fn recreate_swap_chain(&mut self, size: RenderSize) -> Result<()> {
        if size.is_empty() || self.surface == vk::SurfaceKHR::null() {
            return Ok(());
        }

        self.wait_for_slots();
        self.kernel.device.device_wait_idle().ok();
        self.recorder.tear_down(&self.kernel);
        for &sem in &self.render_finished {
            self.kernel.device.destroy_semaphore(sem, None);
        }
        self.render_finished.clear();

        let retired = empty_swap_chain(self.kernel.swap_chain.format);
        let old = std::mem::replace(&mut self.kernel.swap_chain, retired);
        self.build_swap_chain(size, Some(old))
    }

    fn needs_recording(&self) -> bool {
        self.recorder.state() == RecorderState::Idle
            || self.kernel.invalidate_surface_rotation
            || self.textures.iter().any(|t| t.invalidate_layout)
    }

    unsafe fn draw_frame(&mut self) -> Result<()> {
        match self
            .surface_loader
            .get_physical_device_surface_capabilities(self.phys, self.surface)
        {
            Ok(caps) => {
                if caps.current_extent.width == 0 || caps.current_extent.height == 0 {
                    if !self.paused {
                        self.paused = true;
                        info!("vk: current_extent is 0x0 → paused=true");
                    }
                    return Ok(());
                }
            }
            Err(e) => {
                if !self.paused {
                    self.paused = true;
                    info!("vk: surface caps error {:?} → paused=true", e);
                }
                return Ok(());
            }
        }

        let slot = &self.acq_slots[self.acq_index];
        let (sem, fence) = (slot.sem, slot.fence);
        self.kernel
            .device
            .wait_for_fences(&[fence], true, u64::MAX)
            .context("wait_for_fences(acquire slot)")?;

        let (image_index, acquire_suboptimal) = match self.swapchain_loader.acquire_next_image(
            self.kernel.swap_chain.handle,
            u64::MAX,
            sem,
            vk::Fence::null(),
        ) {
            Ok(pair) => pair,
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                // Skip this frame after recreate; try again next tick.
                return self.recreate_swap_chain(self.size);
            }
            Err(e) => return Err(anyhow!("acquire_next_image: {e:?}")),
        };
        let img = image_index as usize;

        if self.needs_recording() {
            self.kernel.device.device_wait_idle().context("device_wait_idle")?;
            self.recorder
                .set_textures(&mut self.kernel, &mut self.textures)
                .context("record frame command buffers")?;
        }

        // The image may still be drawn by a submit from the other slot.
        let previous = self.image_fences[img];
        if previous != vk::Fence::null() && previous != fence {
            self.kernel
                .device
                .wait_for_fences(&[previous], true, u64::MAX)
                .context("wait_for_fences(image)")?;
        }
        self.image_fences[img] = fence;

        let cmd = self.recorder.command_buffers()[img];
        let render_finished = self.render_finished[img];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let submit = vk::SubmitInfo {
            s_type: vk::StructureType::SUBMIT_INFO,
            wait_semaphore_count: 1,
            p_wait_semaphores: &sem,
            p_wait_dst_stage_mask: wait_stages.as_ptr(),
            command_buffer_count: 1,
            p_command_buffers: &cmd,
            signal_semaphore_count: 1,
            p_signal_semaphores: &render_finished,
            ..Default::default()
        };
        let slot_fence = &mut self.acq_slots[self.acq_index].fence;
        if let Err(e) = self.kernel.submit_fenced(&submit, slot_fence) {
            // The slot may now hold a new fence; forget the old one.
            for f in &mut self.image_fences {
                if *f == fence {
                    *f = vk::Fence::null();
                }
            }
            return Err(e).context("queue_submit");
        }

        let present = vk::PresentInfoKHR {
            s_type: vk::StructureType::PRESENT_INFO_KHR,
            wait_semaphore_count: 1,
            p_wait_semaphores: &render_finished,
            swapchain_count: 1,
            p_swapchains: &self.kernel.swap_chain.handle,
            p_image_indices: &image_index,
            ..Default::default()
        };
        self.acq_index = (self.acq_index + 1) % self.acq_slots.len();

        match self
            .swapchain_loader
            .queue_present(self.kernel.queue.handle, &present)
        {
            Ok(false) if !acquire_suboptimal => Ok(()),
            Ok(_) | Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => self.recreate_swap_chain(self.size),
            Err(e) => Err(anyhow!("queue_present: {e:?}")),
        }
    }
}

// Placeholder left in the kernel while a swap chain is retired or the
// surface is detached.
fn empty_swap_chain(format: vk::Format) -> SwapChain {
    SwapChain {
        handle: vk::SwapchainKHR::null(),
        format,
        size: vk::Extent2D::default(),
        images: Vec::new(),
        image_views: Vec::new(),
        render_pass: vk::RenderPass::null(),
    }
}

impl PixelTransform for VkPixelTransform {
    fn new(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        size: RenderSize,
    ) -> Result<Self> {
        unsafe { build(window, display, size) }
    }

    fn resize(&mut self, size: RenderSize) -> Result<()> {
        self.size = size;
        if size.is_empty() {
            if !self.paused {
                info!("vk: resize to 0x0 → paused=true");
            }
            self.paused = true;
            return Ok(());
        }
        if self.paused {
            info!("vk: resize to {}x{} → paused=false", size.width, size.height);
        }
        self.paused = false;
        unsafe { self.recreate_swap_chain(size) }
    }

    fn set_up_texture(&mut self, width: u32, height: u32, format: PixelFormat) -> Result<()> {
        unsafe {
            self.kernel.device.device_wait_idle().context("device_wait_idle")?;
            for texture in &mut self.textures {
                texture.tear_down(&self.kernel);
            }
        }
        if self.textures.is_empty() {
            self.textures.push(Texture::default());
        }
        let texture = &mut self.textures[0];
        texture.set_video_gravity(self.video_gravity);
        texture.set_image_orientation(self.image_orientation);
        texture
            .set_up(&self.kernel, width, height, format)
            .with_context(|| format!("set up {width}x{height} {format:?} texture"))?;
        unsafe {
            self.kernel
                .pipeline
                .bind_texture(&self.kernel.device, texture.view);
        }
        info!("frame texture {}x{} {:?}", width, height, format);
        Ok(())
    }

    fn update_texture(&mut self, data: &[u8], stride: usize) -> Result<()> {
        if self.surface == vk::SurfaceKHR::null() {
            debug!("no surface attached, frame dropped");
            return Ok(());
        }
        let texture = self
            .textures
            .first_mut()
            .context("update_texture before set_up_texture")?;
        texture
            .update(&self.kernel, &self.recorder, data, stride)
            .context("upload frame")?;
        self.render()
    }

    fn render(&mut self) -> Result<()> {
        if !self.is_ready() || !self.textures.first().is_some_and(Texture::has_contents) {
            return Ok(());
        }
        unsafe { self.draw_frame() }
    }

    fn set_video_gravity(&mut self, gravity: VideoGravity) {
        self.video_gravity = gravity;
        for texture in &mut self.textures {
            texture.set_video_gravity(gravity);
        }
    }

    fn video_gravity(&self) -> VideoGravity {
        self.video_gravity
    }

    fn set_image_orientation(&mut self, orientation: ImageOrientation) {
        self.image_orientation = orientation;
        for texture in &mut self.textures {
            texture.set_image_orientation(orientation);
        }
    }

    fn set_surface_rotation(&mut self, rotation: SurfaceRotation) {
        self.kernel.set_surface_rotation(rotation);
    }

    fn set_resample_filter(&mut self, filter: ResampleFilter) -> Result<()> {
        if self.resample_filter == filter {
            return Ok(());
        }
        let view = self
            .textures
            .first()
            .map(|t| t.view)
            .filter(|&v| v != vk::ImageView::null());
        unsafe {
            self.kernel.device.device_wait_idle().context("device_wait_idle")?;
            self.kernel
                .pipeline
                .set_resample_filter(&self.kernel.device, filter, view)?;
        }
        // Rewriting the descriptor set voids the recorded buffers.
        for texture in &mut self.textures {
            texture.invalidate_layout = true;
        }
        self.resample_filter = filter;
        Ok(())
    }

    fn attach_surface(
        &mut self,
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        size: RenderSize,
    ) -> Result<()> {
        if self.surface != vk::SurfaceKHR::null() {
            self.detach_surface();
        }
        unsafe {
            let surface = create_surface(&self.entry, &self.instance, window, display)?;
            let supported = self
                .surface_loader
                .get_physical_device_surface_support(
                    self.phys,
                    self.kernel.queue.queue_family_index,
                    surface,
                )
                .unwrap_or(false);
            if !supported {
                self.surface_loader.destroy_surface(surface, None);
                return Err(anyhow!("queue family cannot present to the new surface"));
            }
            self.surface = surface;
            self.size = size;
            self.paused = size.is_empty();
            // A zero-sized surface gets its swap chain on the next resize.
            if !size.is_empty() {
                self.build_swap_chain(size, None)?;
            }
        }
        info!("surface attached ({}x{})", size.width, size.height);
        Ok(())
    }

    fn detach_surface(&mut self) {
        if self.surface == vk::SurfaceKHR::null() {
            return;
        }
        unsafe {
            self.release_swap_chain();
            self.surface_loader.destroy_surface(self.surface, None);
        }
        self.surface = vk::SurfaceKHR::null();
        info!("surface detached");
    }

    fn inspect_devices(&self) -> String {
        let mut out = String::new();
        let devices = unsafe { self.instance.enumerate_physical_devices() }.unwrap_or_default();
        for (i, &phys) in devices.iter().enumerate() {
            let props = unsafe { self.instance.get_physical_device_properties(phys) };
            let name = unsafe { CStr::from_ptr(props.device_name.as_ptr()) };
            let _ = writeln!(
                out,
                "#{i} {} ({:?}, Vulkan {}.{}.{}){}",
                name.to_string_lossy(),
                props.device_type,
                vk::api_version_major(props.api_version),
                vk::api_version_minor(props.api_version),
                vk::api_version_patch(props.api_version),
                if phys == self.phys { " [in use]" } else { "" }
            );
        }
        out
    }

    fn is_ready(&self) -> bool {
        !self.paused
            && self.surface != vk::SurfaceKHR::null()
            && self.kernel.swap_chain.handle != vk::SwapchainKHR::null()
    }
}

// STRICT TEARDOWN ORDER:
// - Wait acquire fences, then device_wait_idle()
// - Textures and recorder before the pipeline and swap chain they draw with
// - Semaphores and fences before the device
// - Device, then surface, debug messenger, instance last.
impl Drop for VkPixelTransform {
    fn drop(&mut self) {
        unsafe {
            self.wait_for_slots();
            self.kernel.device.device_wait_idle().ok();

            for texture in &mut self.textures {
                texture.tear_down(&self.kernel);
            }
            self.recorder.tear_down(&self.kernel);
            self.kernel.pipeline.destroy(&self.kernel.device);
            if self.kernel.swap_chain.handle != vk::SwapchainKHR::null() {
                self.kernel
                    .swap_chain
                    .destroy(&self.kernel.device, &self.swapchain_loader);
            }

            let d = &self.kernel.device;
            for &sem in &self.render_finished {
                d.destroy_semaphore(sem, None);
            }
            for s in &self.acq_slots {
                d.destroy_fence(s.fence, None);
                d.destroy_semaphore(s.sem, None);
            }

            d.destroy_device(None);
            if self.surface != vk::SurfaceKHR::null() {
                self.surface_loader.destroy_surface(self.surface, None);
            }
            destroy_debug_messenger(&self.entry, &self.instance, self.debug_messenger);
            self.instance.destroy_instance(None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bring_up_guard_with_nothing_created_releases_nothing() {
        let up = BringUp::default();
        assert!(up.instance.is_none() && up.device.is_none());
        assert_eq!(up.surface, vk::SurfaceKHR::null());
        drop(up);
    }
}
