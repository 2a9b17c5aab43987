// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
//! Vulkan backend: device setup, swapchain lifecycle and per-frame
//! synchronization for one window drawing a single quad or triangle.

pub mod config;
mod debug;
pub mod device;
pub mod error;
pub mod frame;
pub mod instance;
pub mod pipeline;
pub mod scheduler;
pub mod shader;
pub mod surface;
pub mod swapchain;
pub mod sync;

mod renderer;

pub use config::{AppInfo, DebugLevel, Shape, VkConfig, VsyncMode};
pub use error::{RenderError, RenderResult};
pub use renderer::VkRenderer;
pub use shader::{EmbeddedShaders, ShaderDir, ShaderError, ShaderSource, ShaderStage};
