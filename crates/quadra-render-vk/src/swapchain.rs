// SPDX-License-Identifier: CEPL-1.0
use ash::khr::swapchain;
use ash::vk;
use quadra_render::RenderSize;
use tracing::info;

use crate::config::VsyncMode;
use crate::device::{DeviceContext, QueueFamilyIndices};
use crate::error::{ApiContext, RenderError, RenderResult};
use crate::surface::{PresentationSurface, SurfaceSupport};

pub(crate) fn fmt_name(f: vk::Format) -> &'static str {
    match f {
        vk::Format::B8G8R8A8_UNORM => "B8G8R8A8_UNORM",
        vk::Format::B8G8R8A8_SRGB => "B8G8R8A8_SRGB",
        vk::Format::R8G8B8A8_SRGB => "R8G8B8A8_SRGB",
        vk::Format::R8G8B8A8_UNORM => "R8G8B8A8_UNORM",
        _ => "OTHER",
    }
}

pub(crate) fn cs_name(cs: vk::ColorSpaceKHR) -> &'static str {
    match cs {
        vk::ColorSpaceKHR::SRGB_NONLINEAR => "SRGB_NONLINEAR",
        _ => "OTHER",
    }
}

pub(crate) fn pm_name(m: vk::PresentModeKHR) -> &'static str {
    match m {
        vk::PresentModeKHR::FIFO => "FIFO",
        vk::PresentModeKHR::MAILBOX => "MAILBOX",
        vk::PresentModeKHR::IMMEDIATE => "IMMEDIATE",
        vk::PresentModeKHR::FIFO_RELAXED => "FIFO_RELAXED",
        _ => "OTHER",
    }
}

/// `B8G8R8A8_SRGB` in the sRGB colour space when offered, else whatever the
/// surface lists first.
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .copied()
        .find(|f| {
            f.format == vk::Format::B8G8R8A8_SRGB
                && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
        .or_else(|| formats.first().copied())
}

pub fn choose_present_mode(modes: &[vk::PresentModeKHR], mode: VsyncMode) -> vk::PresentModeKHR {
    match mode {
        VsyncMode::Mailbox if modes.contains(&vk::PresentModeKHR::MAILBOX) => {
            vk::PresentModeKHR::MAILBOX
        }
        // FIFO is the one mode every implementation must support.
        _ => vk::PresentModeKHR::FIFO,
    }
}

pub fn choose_extent(caps: &vk::SurfaceCapabilitiesKHR, want: RenderSize) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX {
        return caps.current_extent;
    }
    let clamp = |v: u32, lo: u32, hi: u32| v.max(lo).min(hi.max(lo));
    vk::Extent2D {
        width: clamp(
            want.width,
            caps.min_image_extent.width,
            caps.max_image_extent.width,
        ),
        height: clamp(
            want.height,
            caps.min_image_extent.height,
            caps.max_image_extent.height,
        ),
    }
}

/// One above the minimum so acquire rarely waits on the driver. A zero
/// maximum means no upper bound.
pub fn choose_image_count(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let want = caps.min_image_count + 1;
    if caps.max_image_count > 0 {
        want.min(caps.max_image_count)
    } else {
        want
    }
}

fn choose_composite_alpha(caps: &vk::SurfaceCapabilitiesKHR) -> vk::CompositeAlphaFlagsKHR {
    use vk::CompositeAlphaFlagsKHR as A;
    [A::OPAQUE, A::PRE_MULTIPLIED, A::POST_MULTIPLIED, A::INHERIT]
        .into_iter()
        .find(|a| caps.supported_composite_alpha.contains(*a))
        .unwrap_or(A::OPAQUE)
}

/// Everything `vkCreateSwapchainKHR` needs, decided from the surface's
/// reported support alone.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SwapchainPlan {
    pub format: vk::Format,
    pub color_space: vk::ColorSpaceKHR,
    pub present_mode: vk::PresentModeKHR,
    pub width: u32,
    pub height: u32,
    pub image_count: u32,
    pub sharing_mode: vk::SharingMode,
    pub queue_family_indices: Vec<u32>,
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
    pub composite_alpha: vk::CompositeAlphaFlagsKHR,
}

impl SwapchainPlan {
    pub fn new(
        support: &SurfaceSupport,
        want: RenderSize,
        families: QueueFamilyIndices,
        vsync: VsyncMode,
    ) -> RenderResult<Self> {
        let unsupported = || RenderError::UnsupportedSurface {
            formats: support.formats.len(),
            present_modes: support.present_modes.len(),
        };
        if support.present_modes.is_empty() {
            return Err(unsupported());
        }
        let surface_format = choose_surface_format(&support.formats).ok_or_else(unsupported)?;

        let caps = &support.capabilities;
        let extent = choose_extent(caps, want);
        let (sharing_mode, queue_family_indices) = if families.is_shared() {
            (vk::SharingMode::EXCLUSIVE, Vec::new())
        } else {
            (
                vk::SharingMode::CONCURRENT,
                vec![families.graphics, families.present],
            )
        };

        Ok(Self {
            format: surface_format.format,
            color_space: surface_format.color_space,
            present_mode: choose_present_mode(&support.present_modes, vsync),
            width: extent.width,
            height: extent.height,
            image_count: choose_image_count(caps),
            sharing_mode,
            queue_family_indices,
            pre_transform: caps.current_transform,
            composite_alpha: choose_composite_alpha(caps),
        })
    }

    pub fn extent(&self) -> vk::Extent2D {
        vk::Extent2D {
            width: self.width,
            height: self.height,
        }
    }
}

/// The chain and one colour view per image. Views go first on drop.
pub struct Swapchain {
    views: Vec<vk::ImageView>,
    images: Vec<vk::Image>,
    handle: vk::SwapchainKHR,
    loader: swapchain::Device,
    device: ash::Device,
    plan: SwapchainPlan,
}

impl Swapchain {
    pub fn build(
        device: &DeviceContext,
        surface: &PresentationSurface,
        plan: SwapchainPlan,
    ) -> RenderResult<Self> {
        let ci = vk::SwapchainCreateInfoKHR {
            s_type: vk::StructureType::SWAPCHAIN_CREATE_INFO_KHR,
            surface: surface.handle(),
            min_image_count: plan.image_count,
            image_format: plan.format,
            image_color_space: plan.color_space,
            image_extent: plan.extent(),
            image_array_layers: 1,
            image_usage: vk::ImageUsageFlags::COLOR_ATTACHMENT,
            image_sharing_mode: plan.sharing_mode,
            queue_family_index_count: plan.queue_family_indices.len() as u32,
            p_queue_family_indices: plan.queue_family_indices.as_ptr(),
            pre_transform: plan.pre_transform,
            composite_alpha: plan.composite_alpha,
            present_mode: plan.present_mode,
            clipped: vk::TRUE,
            old_swapchain: vk::SwapchainKHR::null(),
            ..Default::default()
        };

        let loader = device.swapchain_fns().clone();
        let handle =
            unsafe { loader.create_swapchain(&ci, None) }.api("create_swapchain")?;
        let mut chain = Self {
            views: Vec::new(),
            images: Vec::new(),
            handle,
            loader,
            device: device.raw().clone(),
            plan,
        };

        chain.images = unsafe { chain.loader.get_swapchain_images(chain.handle) }
            .api("get_swapchain_images")?;
        for &image in &chain.images {
            let view_ci = vk::ImageViewCreateInfo {
                s_type: vk::StructureType::IMAGE_VIEW_CREATE_INFO,
                image,
                view_type: vk::ImageViewType::TYPE_2D,
                format: chain.plan.format,
                components: vk::ComponentMapping::default(),
                subresource_range: vk::ImageSubresourceRange {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    base_mip_level: 0,
                    level_count: 1,
                    base_array_layer: 0,
                    layer_count: 1,
                },
                ..Default::default()
            };
            let view = unsafe { chain.device.create_image_view(&view_ci, None) }
                .api("create_image_view")?;
            chain.views.push(view);
        }

        info!(
            "Swapchain: {}x{}, {} images, {} / {}, {}",
            chain.plan.width,
            chain.plan.height,
            chain.images.len(),
            fmt_name(chain.plan.format),
            cs_name(chain.plan.color_space),
            pm_name(chain.plan.present_mode),
        );
        Ok(chain)
    }

    pub fn handle(&self) -> vk::SwapchainKHR {
        self.handle
    }

    pub fn views(&self) -> &[vk::ImageView] {
        &self.views
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    pub fn format(&self) -> vk::Format {
        self.plan.format
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.plan.extent()
    }

    pub fn plan(&self) -> &SwapchainPlan {
        &self.plan
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        unsafe {
            for &view in &self.views {
                self.device.destroy_image_view(view, None);
            }
            self.loader.destroy_swapchain(self.handle, None);
        }
    }
}
