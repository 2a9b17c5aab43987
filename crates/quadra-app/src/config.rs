// SPDX-License-Identifier: CEPL-1.0
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::ValueEnum;
use quadra_platform::WindowConfig;
use quadra_render_vk::{AppInfo, DebugLevel, Shape, VkConfig, VsyncMode};
use serde::Deserialize;
use tracing::{debug, warn};

#[derive(Debug, Deserialize, Default)]
pub struct AppCfg {
    #[serde(default)]
    pub window: WindowCfg,
    #[serde(default)]
    pub render: RenderCfg,
    #[serde(default)]
    pub vulkan: VulkanCfg,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct WindowCfg {
    pub width: u32,
    pub height: u32,
    pub title: String,
}

impl Default for WindowCfg {
    fn default() -> Self {
        let w = WindowConfig::default();
        Self {
            width: w.width,
            height: w.height,
            title: w.title,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RenderCfg {
    pub clear_color: [f32; 4],
    pub vsync_mode: VsyncModeCfg,
    pub frames_in_flight: usize,
    pub shape: ShapeCfg,
    /// Unset or zero waits on fences forever.
    pub fence_timeout_ms: Option<u64>,
    pub shader_dir: Option<PathBuf>,
}

impl Default for RenderCfg {
    fn default() -> Self {
        let vk = VkConfig::default();
        RenderCfg {
            clear_color: vk.clear_color,
            vsync_mode: VsyncModeCfg::Mailbox,
            frames_in_flight: vk.frames_in_flight,
            shape: ShapeCfg::Quad,
            fence_timeout_ms: None,
            shader_dir: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct VulkanCfg {
    /// Unset follows the build profile: on in debug builds.
    pub validation: Option<bool>,
    pub debug_level: DebugLevelCfg,
    pub app_name: String,
    pub app_version: [u32; 3],
    pub engine_name: String,
    pub engine_version: [u32; 3],
}

impl Default for VulkanCfg {
    fn default() -> Self {
        let app = AppInfo::default();
        let (a, b, c) = app.app_version;
        let (x, y, z) = app.engine_version;
        Self {
            validation: None,
            debug_level: DebugLevelCfg::Warning,
            app_name: app.app_name,
            app_version: [a, b, c],
            engine_name: app.engine_name,
            engine_version: [x, y, z],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum VsyncModeCfg {
    Fifo,
    #[default]
    Mailbox,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ShapeCfg {
    #[default]
    Quad,
    Triangle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DebugLevelCfg {
    Verbose,
    #[default]
    Warning,
    Error,
}

impl From<VsyncModeCfg> for VsyncMode {
    fn from(m: VsyncModeCfg) -> Self {
        match m {
            VsyncModeCfg::Fifo => VsyncMode::Fifo,
            VsyncModeCfg::Mailbox => VsyncMode::Mailbox,
        }
    }
}

impl From<ShapeCfg> for Shape {
    fn from(s: ShapeCfg) -> Self {
        match s {
            ShapeCfg::Quad => Shape::Quad,
            ShapeCfg::Triangle => Shape::Triangle,
        }
    }
}

impl From<DebugLevelCfg> for DebugLevel {
    fn from(l: DebugLevelCfg) -> Self {
        match l {
            DebugLevelCfg::Verbose => DebugLevel::Verbose,
            DebugLevelCfg::Warning => DebugLevel::Warning,
            DebugLevelCfg::Error => DebugLevel::Error,
        }
    }
}

impl AppCfg {
    pub fn window_config(&self) -> WindowConfig {
        WindowConfig {
            width: self.window.width,
            height: self.window.height,
            title: self.window.title.clone(),
        }
    }

    pub fn vk_config(&self) -> VkConfig {
        let r = &self.render;
        let v = &self.vulkan;
        let defaults = VkConfig::default();
        VkConfig {
            clear_color: r.clear_color,
            vsync_mode: r.vsync_mode.into(),
            frames_in_flight: r.frames_in_flight,
            shape: r.shape.into(),
            fence_timeout: fence_timeout(r.fence_timeout_ms),
            shader_dir: r.shader_dir.clone(),
            validation: v.validation.unwrap_or(defaults.validation),
            debug_level: v.debug_level.into(),
            app: AppInfo {
                app_name: v.app_name.clone(),
                app_version: v.app_version.into(),
                engine_name: v.engine_name.clone(),
                engine_version: v.engine_version.into(),
            },
        }
    }
}

fn fence_timeout(ms: Option<u64>) -> Option<Duration> {
    match ms {
        Some(0) => {
            warn!("fence_timeout_ms = 0 would fail every busy wait; waiting without a bound");
            None
        }
        other => other.map(Duration::from_millis),
    }
}

/// Reads `path`. A missing file means defaults; a malformed one is reported
/// and also falls back to defaults.
pub fn load_cfg(path: &Path) -> AppCfg {
    match fs::read_to_string(path) {
        Ok(s) => match toml::from_str::<AppCfg>(&s) {
            Ok(cfg) => cfg,
            Err(e) => {
                warn!("ignoring {}: {e}", path.display());
                AppCfg::default()
            }
        },
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!("no {}, using defaults", path.display());
            AppCfg::default()
        }
        Err(e) => {
            warn!("cannot read {}: {e}", path.display());
            AppCfg::default()
        }
    }
}
