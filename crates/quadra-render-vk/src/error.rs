// SPDX-License-Identifier: CEPL-1.0
use std::time::Duration;

use ash::prelude::VkResult;
use ash::vk;
use thiserror::Error;

use crate::shader::ShaderError;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to load the Vulkan loader: {0}")]
    Loading(#[from] ash::LoadingError),

    #[error("window handle unavailable: {0}")]
    Handle(#[from] raw_window_handle::HandleError),

    #[error("validation layer {0} was requested but is not installed")]
    ValidationLayerMissing(String),

    #[error("required instance extensions unavailable: {}", .0.join(", "))]
    MissingExtensions(Vec<String>),

    #[error("no GPU offers graphics + present queues, VK_KHR_swapchain and a usable surface")]
    NoSuitableDevice,

    #[error("surface is unsupported ({formats} formats, {present_modes} present modes)")]
    UnsupportedSurface { formats: usize, present_modes: usize },

    #[error(transparent)]
    Shader(#[from] ShaderError),

    #[error("{call} failed: {result}")]
    Api {
        call: &'static str,
        result: vk::Result,
    },

    #[error("device did not signal a fence within {0:?}")]
    DeviceUnresponsive(Duration),

    #[error("swapchain is not built")]
    NotBuilt,
}

pub type RenderResult<T> = Result<T, RenderError>;

/// Names the failing Vulkan entry point, the way `anyhow::Context` would.
pub(crate) trait ApiContext<T> {
    fn api(self, call: &'static str) -> RenderResult<T>;
}

impl<T> ApiContext<T> for VkResult<T> {
    fn api(self, call: &'static str) -> RenderResult<T> {
        self.map_err(|result| RenderError::Api { call, result })
    }
}
