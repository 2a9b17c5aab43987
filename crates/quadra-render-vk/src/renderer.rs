// SPDX-License-Identifier: CEPL-1.0
use std::time::Duration;

use anyhow::{Context, Result};
use ash::prelude::VkResult;
use ash::vk;
use quadra_render::{EventHook, FrameStatus, RenderEvent, RenderSize, Renderer};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use tracing::{debug, info, warn};

use crate::config::VkConfig;
use crate::device::DeviceContext;
use crate::error::{ApiContext, RenderError, RenderResult};
use crate::frame::{CommandPool, FrameResources};
use crate::instance::InstanceContext;
use crate::pipeline::{GraphicsPipeline, RenderPass};
use crate::scheduler::{Acquired, FrameOps, FrameReport, FrameScheduler, PresentOutcome};
use crate::shader::{source_for, ShaderSource};
use crate::surface::PresentationSurface;
use crate::swapchain::{fmt_name, pm_name, Swapchain, SwapchainPlan};
use crate::sync::FrameSlots;

/// Everything tied to one swapchain generation. Fields drop top to bottom,
/// which is the reverse of creation order.
struct SwapchainBundle {
    frames: FrameResources,
    pipeline: GraphicsPipeline,
    render_pass: RenderPass,
    swapchain: Swapchain,
}

pub struct VkRenderer {
    // Drop order matters: children before parents.
    bundle: Option<SwapchainBundle>,
    scheduler: FrameScheduler,
    slots: FrameSlots,
    command_pool: CommandPool,
    shaders: Box<dyn ShaderSource>,
    device: DeviceContext,
    surface: PresentationSurface,
    instance: InstanceContext,

    cfg: VkConfig,
    hook: Option<EventHook>,
}

impl VkRenderer {
    pub fn new(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        size: RenderSize,
        cfg: &VkConfig,
    ) -> RenderResult<Self> {
        let instance = InstanceContext::new(display.display_handle()?.as_raw(), cfg)?;
        let surface = PresentationSurface::new(&instance, window, display)?;
        let device = DeviceContext::new(&instance, &surface)?;
        let command_pool = CommandPool::new(device.raw(), device.families().graphics)?;
        let slots = FrameSlots::new(device.raw(), cfg.slot_count())?;
        let shaders = source_for(cfg.shader_dir.as_deref());
        info!(
            "frames in flight: {}, shaders: {}",
            slots.len(),
            shaders.describe()
        );

        let mut renderer = Self {
            bundle: None,
            scheduler: FrameScheduler::new(slots.len(), 0),
            slots,
            command_pool,
            shaders,
            device,
            surface,
            instance,
            cfg: cfg.clone(),
            hook: None,
        };
        renderer.rebuild_swapchain(size)?;
        Ok(renderer)
    }

    /// Installs an observer for swapchain and synchronization events.
    pub fn set_event_hook(&mut self, hook: EventHook) {
        self.hook = Some(hook);
    }

    fn emit(&mut self, event: RenderEvent) {
        if let Some(hook) = self.hook.as_mut() {
            hook(&event);
        }
    }

    fn build_bundle(&self, size: RenderSize) -> RenderResult<SwapchainBundle> {
        let support = self.surface.support(self.device.physical())?;
        let plan = SwapchainPlan::new(
            &support,
            size,
            self.device.families(),
            self.cfg.vsync_mode,
        )?;
        let swapchain = Swapchain::build(&self.device, &self.surface, plan)?;
        let render_pass = RenderPass::new(self.device.raw(), swapchain.format())?;
        let pipeline = GraphicsPipeline::new(
            self.device.raw(),
            &render_pass,
            swapchain.extent(),
            self.shaders.as_ref(),
        )?;
        let frames = FrameResources::new(
            self.device.raw(),
            &self.command_pool,
            &render_pass,
            &swapchain,
        )?;
        frames.record(
            &render_pass,
            &pipeline,
            swapchain.extent(),
            self.cfg.clear_color,
            self.cfg.shape,
        )?;
        Ok(SwapchainBundle {
            frames,
            pipeline,
            render_pass,
            swapchain,
        })
    }

    /// Idles the device, tears down every swapchain-scoped resource and builds
    /// them again against `size`. On failure no bundle remains and
    /// [`draw_frame`](Self::draw_frame) reports [`RenderError::NotBuilt`].
    pub fn rebuild_swapchain(&mut self, size: RenderSize) -> RenderResult<()> {
        self.device.wait_idle()?;
        self.emit(RenderEvent::DeviceIdle);
        self.bundle = None;

        let bundle = self.build_bundle(size)?;
        let chain = &bundle.swapchain;
        let image_count = chain.image_count();
        let extent = chain.extent();
        let event = RenderEvent::SwapchainBuilt {
            width: extent.width,
            height: extent.height,
            image_count,
            format: fmt_name(chain.format()),
            present_mode: pm_name(chain.plan().present_mode),
        };

        self.scheduler.on_rebuild(image_count);
        self.bundle = Some(bundle);
        self.emit(event);
        Ok(())
    }

    pub fn draw_frame(&mut self) -> RenderResult<FrameStatus> {
        let bundle = self.bundle.as_ref().ok_or(RenderError::NotBuilt)?;
        let mut ops = VkFrame {
            device: &self.device,
            slots: &self.slots,
            bundle,
            timeout_ns: self.cfg.fence_timeout_ns(),
        };
        let report = self.scheduler.draw_frame(&mut ops)?;
        self.report(report);
        Ok(report.status)
    }

    fn report(&mut self, report: FrameReport) {
        if let (Some(image), Some(owner)) = (report.image, report.cross_wait) {
            self.emit(RenderEvent::CrossSlotWait {
                image,
                slot: report.slot,
                owner,
            });
        }
        if let Some(at) = report.stale_at {
            debug!(?at, "swapchain stale");
            self.emit(RenderEvent::SwapchainStale { at });
        }
    }
}

fn acquire_outcome(res: VkResult<(u32, bool)>, timeout_ns: u64) -> RenderResult<Acquired> {
    match res {
        Ok((index, suboptimal)) => Ok(Acquired::Image { index, suboptimal }),
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(Acquired::OutOfDate),
        Err(vk::Result::TIMEOUT | vk::Result::NOT_READY) => {
            Err(RenderError::DeviceUnresponsive(Duration::from_nanos(timeout_ns)))
        }
        Err(result) => Err(RenderError::Api {
            call: "acquire_next_image",
            result,
        }),
    }
}

fn present_outcome(res: VkResult<bool>) -> RenderResult<PresentOutcome> {
    match res {
        Ok(false) => Ok(PresentOutcome::Done),
        Ok(true) => Ok(PresentOutcome::Suboptimal),
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentOutcome::OutOfDate),
        Err(result) => Err(RenderError::Api {
            call: "queue_present",
            result,
        }),
    }
}

/// [`FrameOps`] against the live device and the current swapchain bundle.
struct VkFrame<'a> {
    device: &'a DeviceContext,
    slots: &'a FrameSlots,
    bundle: &'a SwapchainBundle,
    timeout_ns: u64,
}

impl FrameOps for VkFrame<'_> {
    fn wait_slot(&mut self, slot: usize) -> RenderResult<()> {
        self.device
            .wait_fence(self.slots.get(slot).in_flight, self.timeout_ns)
    }

    fn acquire(&mut self, slot: usize) -> RenderResult<Acquired> {
        let res = unsafe {
            self.device.swapchain_fns().acquire_next_image(
                self.bundle.swapchain.handle(),
                self.timeout_ns,
                self.slots.get(slot).image_available,
                vk::Fence::null(),
            )
        };
        acquire_outcome(res, self.timeout_ns)
    }

    fn reset_slot(&mut self, slot: usize) -> RenderResult<()> {
        unsafe {
            self.device
                .raw()
                .reset_fences(&[self.slots.get(slot).in_flight])
        }
        .api("reset_fences")
    }

    fn submit(&mut self, slot: usize, image: u32) -> RenderResult<()> {
        let s = self.slots.get(slot);
        let wait_semaphores = [s.image_available];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let signal_semaphores = [s.render_finished];
        let cmd = [self.bundle.frames.command_buffer(image)];

        let submit = vk::SubmitInfo {
            s_type: vk::StructureType::SUBMIT_INFO,
            wait_semaphore_count: wait_semaphores.len() as u32,
            p_wait_semaphores: wait_semaphores.as_ptr(),
            p_wait_dst_stage_mask: wait_stages.as_ptr(),
            command_buffer_count: cmd.len() as u32,
            p_command_buffers: cmd.as_ptr(),
            signal_semaphore_count: signal_semaphores.len() as u32,
            p_signal_semaphores: signal_semaphores.as_ptr(),
            ..Default::default()
        };
        unsafe {
            self.device
                .raw()
                .queue_submit(self.device.graphics_queue(), &[submit], s.in_flight)
        }
        .api("queue_submit")
    }

    fn present(&mut self, slot: usize, image: u32) -> RenderResult<PresentOutcome> {
        let wait_semaphores = [self.slots.get(slot).render_finished];
        let swapchains = [self.bundle.swapchain.handle()];
        let indices = [image];
        let present = vk::PresentInfoKHR {
            s_type: vk::StructureType::PRESENT_INFO_KHR,
            wait_semaphore_count: wait_semaphores.len() as u32,
            p_wait_semaphores: wait_semaphores.as_ptr(),
            swapchain_count: swapchains.len() as u32,
            p_swapchains: swapchains.as_ptr(),
            p_image_indices: indices.as_ptr(),
            ..Default::default()
        };
        let res = unsafe {
            self.device
                .swapchain_fns()
                .queue_present(self.device.present_queue(), &present)
        };
        present_outcome(res)
    }
}

impl Renderer for VkRenderer {
    fn render(&mut self) -> Result<FrameStatus> {
        self.draw_frame().context("draw_frame")
    }

    fn rebuild(&mut self, size: RenderSize) -> Result<()> {
        self.rebuild_swapchain(size)
            .with_context(|| format!("rebuild swapchain at {}x{}", size.width, size.height))
    }

    fn wait_idle(&mut self) -> Result<()> {
        self.device.wait_idle().context("device_wait_idle")
    }
}

impl Drop for VkRenderer {
    fn drop(&mut self) {
        if let Err(e) = self.device.wait_idle() {
            warn!("device_wait_idle on shutdown: {e}");
        }
    }
}
