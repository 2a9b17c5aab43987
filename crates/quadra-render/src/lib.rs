// SPDX-License-Identifier: CEPL-1.0
use anyhow::Result;

mod events;
mod frame_loop;

pub use events::{EventHook, RenderEvent, StalePoint};
pub use frame_loop::{run_frame_loop, wait_for_drawable, LoopStats};
pub use raw_window_handle;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct RenderSize {
    pub width: u32,
    pub height: u32,
}

impl RenderSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// A zero-area drawable (minimised window, mid-resize on some compositors).
    /// No swapchain may be built against it.
    pub fn is_degenerate(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// What happened to one frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameStatus {
    Presented,
    /// The presentation engine reported the chain out-of-date or suboptimal.
    /// The caller must rebuild before the next frame is worth drawing.
    Stale,
}

pub trait Renderer {
    /// Draws one frame: acquire, submit, present.
    fn render(&mut self) -> Result<FrameStatus>;

    /// Full teardown-then-build of every swapchain-scoped resource.
    fn rebuild(&mut self, size: RenderSize) -> Result<()>;

    /// Blocks until the GPU has finished all submitted work.
    fn wait_idle(&mut self) -> Result<()>;
}

/// The slice of a windowing library the frame loop consumes.
pub trait WindowSystem {
    /// Current drawable size in physical pixels.
    fn drawable_size(&self) -> RenderSize;

    /// Returns and clears the "window was resized" flag.
    fn take_resized(&mut self) -> bool;

    fn close_requested(&self) -> bool;

    /// Processes pending events without blocking. Called once per loop iteration
    /// before drawing.
    fn pump_events(&mut self);

    /// Blocks until at least one event arrives. Polling is an acceptable
    /// implementation.
    fn wait_events(&mut self) {
        self.pump_events();
    }
}
