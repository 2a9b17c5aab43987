// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use quadra_core::init_tracing;
use quadra_platform::WinitWindow;
use quadra_render::{run_frame_loop, wait_for_drawable, RenderEvent};
use quadra_render_vk::{VkConfig, VkRenderer};
use tracing::{debug, info};

mod config;

use config::{load_cfg, ShapeCfg, VsyncModeCfg};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(long, default_value = "quadra.toml")]
    config: PathBuf,

    /// What to draw: quad | triangle
    #[arg(long, value_enum)]
    shape: Option<ShapeCfg>,

    /// Present mode preference: fifo | mailbox
    #[arg(long, value_enum)]
    vsync: Option<VsyncModeCfg>,

    /// Force Vulkan validation layers on or off
    #[arg(long, value_name = "BOOL")]
    validation: Option<bool>,
}

impl Args {
    // Flags win over the environment, which wins over the file.
    fn apply(&self, mut cfg: VkConfig) -> VkConfig {
        if let Some(shape) = self.shape {
            cfg.shape = shape.into();
        }
        if let Some(vsync) = self.vsync {
            cfg.vsync_mode = vsync.into();
        }
        if let Some(validation) = self.validation {
            cfg.validation = validation;
        }
        cfg
    }
}

fn log_event(event: &RenderEvent) {
    match event {
        RenderEvent::SwapchainBuilt {
            width,
            height,
            image_count,
            format,
            present_mode,
        } => info!("swapchain {width}x{height}, {image_count} images, {format}, {present_mode}"),
        other => debug!(?other, "render event"),
    }
}

fn main() -> Result<()> {
    init_tracing("info");
    let args = Args::parse();

    let cfg = load_cfg(&args.config);
    let vk_cfg = args.apply(cfg.vk_config().with_env_overrides());
    info!(
        "shape = {:?}, vsync = {:?}, validation = {}",
        vk_cfg.shape, vk_cfg.vsync_mode, vk_cfg.validation
    );

    // The renderer is declared after the window so its surface drops first.
    let mut window = WinitWindow::open(cfg.window_config())?;
    let Some(size) = wait_for_drawable(&mut window) else {
        info!("closed before the first frame");
        return Ok(());
    };

    let mut renderer = VkRenderer::new(window.window(), window.window(), size, &vk_cfg)
        .context("Vulkan initialisation")?;
    renderer.set_event_hook(Box::new(log_event));

    run_frame_loop(&mut window, &mut renderer)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use quadra_render_vk::{Shape, VsyncMode};

    #[test]
    fn flags_override_config() {
        let args = Args::try_parse_from([
            "quadra",
            "--shape",
            "triangle",
            "--vsync",
            "fifo",
            "--validation",
            "false",
        ])
        .unwrap();
        let base = VkConfig {
            validation: true,
            ..Default::default()
        };
        let cfg = args.apply(base);
        assert_eq!(cfg.shape, Shape::Triangle);
        assert_eq!(cfg.vsync_mode, VsyncMode::Fifo);
        assert!(!cfg.validation);
    }

    #[test]
    fn no_flags_keep_config() {
        let args = Args::try_parse_from(["quadra"]).unwrap();
        assert_eq!(args.config, PathBuf::from("quadra.toml"));
        assert_eq!(args.apply(VkConfig::default()), VkConfig::default());
    }
}
