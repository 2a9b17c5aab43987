// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
//! winit-backed window that is pumped explicitly from the frame loop instead
//! of owning control flow through `EventLoop::run_app`.

use std::time::Duration;

use anyhow::{anyhow, Result};
use quadra_render::{RenderSize, WindowSystem};
use tracing::{debug, info};

pub use winit;

use winit::{
    application::ApplicationHandler,
    dpi::LogicalSize,
    error::OsError,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop},
    platform::pump_events::{EventLoopExtPumpEvents, PumpStatus},
    window::{Window, WindowId},
};

// Desktop backends deliver `resumed` within the first couple of pumps.
const CREATE_PUMPS: usize = 64;
// Upper bound for one blocking wait; the caller re-checks its condition after.
const WAIT_SLICE: Duration = Duration::from_millis(100);

#[derive(Clone, Debug)]
pub struct WindowConfig {
    pub width: u32,
    pub height: u32,
    pub title: String,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            width: 800,
            height: 800,
            title: "quadra".into(),
        }
    }
}

struct WindowState {
    cfg: WindowConfig,
    created: bool,
    pending: Option<Window>,
    create_error: Option<OsError>,
    window_id: Option<WindowId>,
    resized: bool,
    close_requested: bool,
}

impl ApplicationHandler for WindowState {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.created {
            return;
        }
        self.created = true;

        let attrs = Window::default_attributes()
            .with_title(self.cfg.title.clone())
            .with_inner_size(LogicalSize::new(
                self.cfg.width as f64,
                self.cfg.height as f64,
            ));
        match event_loop.create_window(attrs) {
            Ok(window) => {
                self.window_id = Some(window.id());
                self.pending = Some(window);
            }
            Err(e) => self.create_error = Some(e),
        }
    }

    fn window_event(
        &mut self,
        _event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent,
    ) {
        if self.window_id != Some(window_id) {
            return;
        }

        match event {
            WindowEvent::CloseRequested => {
                info!("CloseRequested");
                self.close_requested = true;
            }
            WindowEvent::Resized(size) => {
                debug!("Resized → {}x{}", size.width, size.height);
                self.resized = true;
            }
            WindowEvent::ScaleFactorChanged { scale_factor, .. } => {
                debug!("ScaleFactorChanged → {scale_factor}");
                self.resized = true;
            }
            _ => {}
        }
    }
}

/// The windowing collaborator for the frame loop.
///
/// Field order matters: the window is dropped before the event loop that
/// created it. Any surface created from [`WinitWindow::window`] must be dropped
/// before this value.
pub struct WinitWindow {
    window: Window,
    state: WindowState,
    event_loop: EventLoop<()>,
}

impl WinitWindow {
    pub fn open(cfg: WindowConfig) -> Result<Self> {
        let mut event_loop = EventLoop::new()?;
        let mut state = WindowState {
            cfg,
            created: false,
            pending: None,
            create_error: None,
            window_id: None,
            resized: false,
            close_requested: false,
        };

        for _ in 0..CREATE_PUMPS {
            if let PumpStatus::Exit(code) =
                event_loop.pump_app_events(Some(Duration::ZERO), &mut state)
            {
                return Err(anyhow!("event loop exited during startup (code {code})"));
            }
            if let Some(e) = state.create_error.take() {
                return Err(anyhow!("create_window: {e}"));
            }
            if state.pending.is_some() {
                break;
            }
        }

        let window = state
            .pending
            .take()
            .ok_or_else(|| anyhow!("window was not created after {CREATE_PUMPS} event pumps"))?;

        let size = window.inner_size();
        info!(
            "window '{}' open ({}x{} px)",
            state.cfg.title, size.width, size.height
        );

        Ok(Self {
            window,
            state,
            event_loop,
        })
    }

    /// The native window, for creating a presentation surface.
    pub fn window(&self) -> &Window {
        &self.window
    }

    fn pump(&mut self, timeout: Option<Duration>) {
        if let PumpStatus::Exit(code) = self.event_loop.pump_app_events(timeout, &mut self.state) {
            debug!("event loop exit requested (code {code})");
            self.state.close_requested = true;
        }
    }
}

impl WindowSystem for WinitWindow {
    fn drawable_size(&self) -> RenderSize {
        let size = self.window.inner_size();
        RenderSize::new(size.width, size.height)
    }

    fn take_resized(&mut self) -> bool {
        std::mem::take(&mut self.state.resized)
    }

    fn close_requested(&self) -> bool {
        self.state.close_requested
    }

    fn pump_events(&mut self) {
        self.pump(Some(Duration::ZERO));
    }

    fn wait_events(&mut self) {
        self.pump(Some(WAIT_SLICE));
    }
}
