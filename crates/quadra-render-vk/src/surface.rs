// SPDX-License-Identifier: CEPL-1.0
use ash::khr::surface;
use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

use crate::error::{ApiContext, RenderResult};
use crate::instance::InstanceContext;

/// What a physical device can do with the surface, queried fresh before every
/// swapchain build.
#[derive(Clone, Debug, Default)]
pub struct SurfaceSupport {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SurfaceSupport {
    pub fn is_adequate(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }
}

/// The window's presentable surface. Created after the instance, destroyed
/// before it.
pub struct PresentationSurface {
    loader: surface::Instance,
    handle: vk::SurfaceKHR,
}

impl PresentationSurface {
    pub fn new(
        instance: &InstanceContext,
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
    ) -> RenderResult<Self> {
        let display = display.display_handle()?.as_raw();
        let window = window.window_handle()?.as_raw();
        let handle = unsafe {
            ash_window::create_surface(instance.entry(), instance.raw(), display, window, None)
        }
        .api("create_surface")?;
        let loader = surface::Instance::new(instance.entry(), instance.raw());
        Ok(Self { loader, handle })
    }

    pub fn handle(&self) -> vk::SurfaceKHR {
        self.handle
    }

    pub fn supports_present(&self, phys: vk::PhysicalDevice, family: u32) -> RenderResult<bool> {
        unsafe {
            self.loader
                .get_physical_device_surface_support(phys, family, self.handle)
        }
        .api("get_physical_device_surface_support")
    }

    pub fn support(&self, phys: vk::PhysicalDevice) -> RenderResult<SurfaceSupport> {
        unsafe {
            let capabilities = self
                .loader
                .get_physical_device_surface_capabilities(phys, self.handle)
                .api("get_physical_device_surface_capabilities")?;
            let formats = self
                .loader
                .get_physical_device_surface_formats(phys, self.handle)
                .api("get_physical_device_surface_formats")?;
            let present_modes = self
                .loader
                .get_physical_device_surface_present_modes(phys, self.handle)
                .api("get_physical_device_surface_present_modes")?;
            Ok(SurfaceSupport {
                capabilities,
                formats,
                present_modes,
            })
        }
    }
}

impl Drop for PresentationSurface {
    fn drop(&mut self) {
        unsafe { self.loader.destroy_surface(self.handle, None) };
    }
}
