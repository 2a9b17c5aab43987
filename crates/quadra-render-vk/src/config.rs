// SPDX-License-Identifier: CEPL-1.0
use std::path::PathBuf;
use std::time::Duration;

use ash::vk;

pub const DEFAULT_FRAMES_IN_FLIGHT: usize = 2;
pub const MAX_FRAMES_IN_FLIGHT: usize = 4;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum VsyncMode {
    Fifo,    // Target monitor refresh rate
    #[default]
    Mailbox, // Low latency, falls back to FIFO when unavailable
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Shape {
    #[default]
    Quad,
    Triangle,
}

impl Shape {
    /// `(vertex_count, first_vertex)` into the vertex shader's position table.
    pub fn draw_range(self) -> (u32, u32) {
        match self {
            Shape::Quad => (6, 0),
            Shape::Triangle => (3, 6),
        }
    }
}

/// Lowest validation-message severity that gets reported.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum DebugLevel {
    Verbose,
    #[default]
    Warning,
    Error,
}

impl DebugLevel {
    pub fn severities(self) -> vk::DebugUtilsMessageSeverityFlagsEXT {
        use vk::DebugUtilsMessageSeverityFlagsEXT as S;
        match self {
            DebugLevel::Verbose => S::VERBOSE | S::INFO | S::WARNING | S::ERROR,
            DebugLevel::Warning => S::WARNING | S::ERROR,
            DebugLevel::Error => S::ERROR,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppInfo {
    pub app_name: String,
    pub app_version: (u32, u32, u32),
    pub engine_name: String,
    pub engine_version: (u32, u32, u32),
}

impl Default for AppInfo {
    fn default() -> Self {
        Self {
            app_name: "quadra".into(),
            app_version: (1, 0, 0),
            engine_name: "quadra".into(),
            engine_version: (0, 1, 0),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct VkConfig {
    pub clear_color: [f32; 4],
    pub vsync_mode: VsyncMode,
    pub frames_in_flight: usize,
    pub shape: Shape,
    /// `None` (or zero) waits on fences forever; a hung driver then hangs the
    /// process.
    pub fence_timeout: Option<Duration>,
    /// Directory holding `quad.vert.spv` / `quad.frag.spv`. `None` uses the
    /// shaders compiled into the binary.
    pub shader_dir: Option<PathBuf>,
    pub validation: bool,
    pub debug_level: DebugLevel,
    pub app: AppInfo,
}

impl Default for VkConfig {
    fn default() -> Self {
        Self {
            clear_color: [0.901, 0.623, 0.180, 1.0],
            vsync_mode: VsyncMode::Mailbox,
            frames_in_flight: DEFAULT_FRAMES_IN_FLIGHT,
            shape: Shape::Quad,
            fence_timeout: None,
            shader_dir: None,
            validation: cfg!(debug_assertions),
            debug_level: DebugLevel::Warning,
            app: AppInfo::default(),
        }
    }
}

impl VkConfig {
    /// Applies `QUADRA_VALIDATION` (`0`/`1`) and `QUADRA_VSYNC`
    /// (`fifo`/`mailbox`) from the process environment.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides(mut self, get: impl Fn(&str) -> Option<String>) -> Self {
        match get("QUADRA_VALIDATION").as_deref() {
            Some("1") => self.validation = true,
            Some("0") => self.validation = false,
            _ => {}
        }
        match get("QUADRA_VSYNC").as_deref() {
            Some(s) if s.eq_ignore_ascii_case("fifo") => self.vsync_mode = VsyncMode::Fifo,
            Some(s) if s.eq_ignore_ascii_case("mailbox") => self.vsync_mode = VsyncMode::Mailbox,
            _ => {}
        }
        self
    }

    /// Slot count actually allocated, clamped into `1..=MAX_FRAMES_IN_FLIGHT`.
    pub fn slot_count(&self) -> usize {
        self.frames_in_flight.clamp(1, MAX_FRAMES_IN_FLIGHT)
    }

    pub(crate) fn fence_timeout_ns(&self) -> u64 {
        self.fence_timeout
            .filter(|d| !d.is_zero())
            .map(|d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
            .unwrap_or(u64::MAX)
    }
}
