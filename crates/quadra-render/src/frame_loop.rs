// SPDX-License-Identifier: CEPL-1.0
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::{FrameStatus, RenderSize, Renderer, WindowSystem};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub presented: u64,
    pub stale: u64,
    pub rebuilds: u64,
}

/// Drives pump → render → (rebuild) until the window asks to close.
///
/// Whatever way the loop ends, the renderer is idled before this returns, so
/// dropping it afterwards never frees a resource the GPU still references. A
/// render or rebuild error is returned after that idle wait.
pub fn run_frame_loop<W, R>(window: &mut W, renderer: &mut R) -> Result<LoopStats>
where
    W: WindowSystem + ?Sized,
    R: Renderer + ?Sized,
{
    let result = drive(window, renderer);
    let idle = renderer.wait_idle().context("wait_idle on shutdown");
    let stats = result?;
    idle?;
    info!(
        presented = stats.presented,
        stale = stats.stale,
        rebuilds = stats.rebuilds,
        "frame loop finished"
    );
    Ok(stats)
}

fn drive<W, R>(window: &mut W, renderer: &mut R) -> Result<LoopStats>
where
    W: WindowSystem + ?Sized,
    R: Renderer + ?Sized,
{
    let mut stats = LoopStats::default();
    let mut fps = FpsCounter::new();

    loop {
        window.pump_events();
        if window.close_requested() {
            break;
        }

        let status = renderer.render().context("render")?;
        match status {
            FrameStatus::Presented => {
                stats.presented += 1;
                fps.tick();
            }
            FrameStatus::Stale => stats.stale += 1,
        }

        let resized = window.take_resized();
        if status == FrameStatus::Stale || resized {
            let Some(size) = wait_for_drawable(window) else {
                break;
            };
            debug!(
                width = size.width,
                height = size.height,
                resized,
                "rebuilding swapchain"
            );
            renderer.rebuild(size).context("swapchain rebuild")?;
            stats.rebuilds += 1;
        }
    }

    Ok(stats)
}

/// Blocks until the drawable has a non-zero area.
///
/// Returns `None` if the window asks to close while waiting.
pub fn wait_for_drawable<W: WindowSystem + ?Sized>(window: &mut W) -> Option<RenderSize> {
    loop {
        let size = window.drawable_size();
        if !size.is_degenerate() {
            return Some(size);
        }
        if window.close_requested() {
            return None;
        }
        window.wait_events();
    }
}

struct FpsCounter {
    frames: u32,
    since: Instant,
}

impl FpsCounter {
    fn new() -> Self {
        Self {
            frames: 0,
            since: Instant::now(),
        }
    }

    fn tick(&mut self) {
        self.frames = self.frames.saturating_add(1);
        let now = Instant::now();
        if now.duration_since(self.since) >= Duration::from_secs(1) {
            debug!("fps ~ {}", self.frames);
            self.frames = 0;
            self.since = now;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::rc::Rc;

    type Log = Rc<RefCell<Vec<String>>>;

    struct ScriptedWindow {
        log: Log,
        size: RenderSize,
        pumps: usize,
        close_on_pump: usize,
        close_on_wait: bool,
        resize_on_pump: Option<(usize, RenderSize)>,
        sizes_on_wait: VecDeque<RenderSize>,
        resized: bool,
        closed: bool,
    }

    impl ScriptedWindow {
        fn new(log: &Log, close_on_pump: usize) -> Self {
            Self {
                log: log.clone(),
                size: RenderSize::new(800, 600),
                pumps: 0,
                close_on_pump,
                close_on_wait: false,
                resize_on_pump: None,
                sizes_on_wait: VecDeque::new(),
                resized: false,
                closed: false,
            }
        }
    }

    impl WindowSystem for ScriptedWindow {
        fn drawable_size(&self) -> RenderSize {
            self.size
        }

        fn take_resized(&mut self) -> bool {
            std::mem::take(&mut self.resized)
        }

        fn close_requested(&self) -> bool {
            self.closed
        }

        fn pump_events(&mut self) {
            self.pumps += 1;
            self.log.borrow_mut().push("pump".into());
            if let Some((at, size)) = self.resize_on_pump {
                if at == self.pumps {
                    self.size = size;
                    self.resized = true;
                }
            }
            if self.pumps == self.close_on_pump {
                self.closed = true;
            }
        }

        fn wait_events(&mut self) {
            self.log.borrow_mut().push("wait".into());
            if let Some(size) = self.sizes_on_wait.pop_front() {
                self.size = size;
            }
            if self.close_on_wait {
                self.closed = true;
            }
        }
    }

    struct ScriptedRenderer {
        log: Log,
        statuses: VecDeque<FrameStatus>,
        fail_render: bool,
    }

    impl ScriptedRenderer {
        fn new(log: &Log) -> Self {
            Self {
                log: log.clone(),
                statuses: VecDeque::new(),
                fail_render: false,
            }
        }
    }

    impl Renderer for ScriptedRenderer {
        fn render(&mut self) -> Result<FrameStatus> {
            self.log.borrow_mut().push("render".into());
            if self.fail_render {
                anyhow::bail!("queue_submit failed: ERROR_DEVICE_LOST");
            }
            Ok(self.statuses.pop_front().unwrap_or(FrameStatus::Presented))
        }

        fn rebuild(&mut self, size: RenderSize) -> Result<()> {
            assert!(!size.is_degenerate(), "rebuild with degenerate size");
            self.log
                .borrow_mut()
                .push(format!("rebuild {}x{}", size.width, size.height));
            Ok(())
        }

        fn wait_idle(&mut self) -> Result<()> {
            self.log.borrow_mut().push("idle".into());
            Ok(())
        }
    }

    fn entries(log: &Log) -> Vec<String> {
        log.borrow().clone()
    }

    #[test]
    fn pumps_before_every_frame_and_idles_on_close() {
        let log = Log::default();
        let mut window = ScriptedWindow::new(&log, 3);
        let mut renderer = ScriptedRenderer::new(&log);

        let stats = run_frame_loop(&mut window, &mut renderer).unwrap();

        assert_eq!(stats.presented, 2);
        assert_eq!(stats.rebuilds, 0);
        assert_eq!(
            entries(&log),
            ["pump", "render", "pump", "render", "pump", "idle"]
        );
    }

    #[test]
    fn degenerate_drawable_defers_rebuild_until_nonzero() {
        let log = Log::default();
        let mut window = ScriptedWindow::new(&log, 2);
        window.resize_on_pump = Some((1, RenderSize::new(0, 0)));
        window
            .sizes_on_wait
            .extend([RenderSize::new(0, 0), RenderSize::new(640, 480)]);
        let mut renderer = ScriptedRenderer::new(&log);

        let stats = run_frame_loop(&mut window, &mut renderer).unwrap();

        assert_eq!(stats.rebuilds, 1);
        assert_eq!(
            entries(&log),
            ["pump", "render", "wait", "wait", "rebuild 640x480", "pump", "idle"]
        );
    }

    #[test]
    fn stale_frame_rebuilds_then_resumes() {
        let log = Log::default();
        let mut window = ScriptedWindow::new(&log, 3);
        let mut renderer = ScriptedRenderer::new(&log);
        renderer.statuses.push_back(FrameStatus::Stale);

        let stats = run_frame_loop(&mut window, &mut renderer).unwrap();

        assert_eq!(
            stats,
            LoopStats {
                presented: 1,
                stale: 1,
                rebuilds: 1
            }
        );
        assert_eq!(
            entries(&log),
            ["pump", "render", "rebuild 800x600", "pump", "render", "pump", "idle"]
        );
    }

    #[test]
    fn close_while_minimised_skips_rebuild() {
        let log = Log::default();
        let mut window = ScriptedWindow::new(&log, usize::MAX);
        window.resize_on_pump = Some((1, RenderSize::new(0, 0)));
        window.close_on_wait = true;
        let mut renderer = ScriptedRenderer::new(&log);

        let stats = run_frame_loop(&mut window, &mut renderer).unwrap();

        assert_eq!(stats.rebuilds, 0);
        assert_eq!(entries(&log), ["pump", "render", "wait", "idle"]);
    }

    #[test]
    fn render_error_is_returned_after_idle() {
        let log = Log::default();
        let mut window = ScriptedWindow::new(&log, usize::MAX);
        let mut renderer = ScriptedRenderer::new(&log);
        renderer.fail_render = true;

        let err = run_frame_loop(&mut window, &mut renderer).unwrap_err();

        assert!(format!("{err:#}").contains("ERROR_DEVICE_LOST"));
        assert_eq!(entries(&log), ["pump", "render", "idle"]);
    }

    #[test]
    fn wait_for_drawable_returns_immediately_when_sized() {
        let log = Log::default();
        let mut window = ScriptedWindow::new(&log, usize::MAX);
        assert_eq!(
            wait_for_drawable(&mut window),
            Some(RenderSize::new(800, 600))
        );
        assert!(entries(&log).is_empty());
    }
}
