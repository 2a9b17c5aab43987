// SPDX-License-Identifier: CEPL-1.0
use std::collections::BTreeSet;
use std::ffi::{c_char, CStr};
use std::time::Duration;

use ash::khr::swapchain;
use ash::prelude::VkResult;
use ash::vk;
use tracing::{debug, info};

use crate::error::{ApiContext, RenderError, RenderResult};
use crate::instance::{missing_names, InstanceContext};
use crate::surface::PresentationSurface;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    pub graphics: u32,
    pub present: u32,
}

impl QueueFamilyIndices {
    pub fn is_shared(&self) -> bool {
        self.graphics == self.present
    }

    /// Distinct families, ascending. One queue is requested per entry.
    pub fn unique(&self) -> Vec<u32> {
        BTreeSet::from([self.graphics, self.present])
            .into_iter()
            .collect()
    }
}

/// Picks queue families for drawing and presenting. A single family that does
/// both wins; otherwise the first graphics family pairs with the first
/// present-capable one.
pub fn find_queue_families<E>(
    families: &[vk::QueueFamilyProperties],
    mut supports_present: impl FnMut(u32) -> Result<bool, E>,
) -> Result<Option<QueueFamilyIndices>, E> {
    let mut graphics = None;
    let mut present = None;
    for (i, family) in families.iter().enumerate() {
        let i = i as u32;
        let draws = family.queue_count > 0
            && family.queue_flags.contains(vk::QueueFlags::GRAPHICS);
        let presents = family.queue_count > 0 && supports_present(i)?;
        if draws && presents {
            return Ok(Some(QueueFamilyIndices {
                graphics: i,
                present: i,
            }));
        }
        if draws && graphics.is_none() {
            graphics = Some(i);
        }
        if presents && present.is_none() {
            present = Some(i);
        }
    }
    Ok(graphics
        .zip(present)
        .map(|(graphics, present)| QueueFamilyIndices { graphics, present }))
}

/// Higher is better. Discrete GPUs first.
pub fn device_rank(ty: vk::PhysicalDeviceType) -> u32 {
    match ty {
        vk::PhysicalDeviceType::DISCRETE_GPU => 3,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 2,
        vk::PhysicalDeviceType::VIRTUAL_GPU => 1,
        _ => 0,
    }
}

struct Candidate {
    phys: vk::PhysicalDevice,
    families: QueueFamilyIndices,
    rank: u32,
    name: String,
}

fn pick_physical_device(
    instance: &InstanceContext,
    surface: &PresentationSurface,
) -> RenderResult<Candidate> {
    let raw = instance.raw();
    let devices =
        unsafe { raw.enumerate_physical_devices() }.api("enumerate_physical_devices")?;

    let mut best: Option<Candidate> = None;
    for phys in devices {
        let props = unsafe { raw.get_physical_device_properties(phys) };
        let name = unsafe { CStr::from_ptr(props.device_name.as_ptr()) }
            .to_string_lossy()
            .into_owned();

        let queue_props = unsafe { raw.get_physical_device_queue_family_properties(phys) };
        let Some(families) =
            find_queue_families(&queue_props, |i| surface.supports_present(phys, i))?
        else {
            debug!(device = %name, "skipped: no graphics + present queue families");
            continue;
        };

        let exts = unsafe { raw.enumerate_device_extension_properties(phys) }
            .api("enumerate_device_extension_properties")?;
        let missing = missing_names(
            &[swapchain::NAME],
            exts.iter()
                .map(|e| unsafe { CStr::from_ptr(e.extension_name.as_ptr()) }),
        );
        if !missing.is_empty() {
            debug!(device = %name, "skipped: no VK_KHR_swapchain");
            continue;
        }

        if !surface.support(phys)?.is_adequate() {
            debug!(device = %name, "skipped: surface has no formats or present modes");
            continue;
        }

        let rank = device_rank(props.device_type);
        debug!(device = %name, rank, ?families, "candidate");
        if best.as_ref().map_or(true, |b| rank > b.rank) {
            best = Some(Candidate {
                phys,
                families,
                rank,
                name,
            });
        }
    }
    best.ok_or(RenderError::NoSuitableDevice)
}

fn fence_outcome(res: VkResult<()>, timeout_ns: u64) -> RenderResult<()> {
    match res {
        Ok(()) => Ok(()),
        Err(vk::Result::TIMEOUT) => Err(RenderError::DeviceUnresponsive(Duration::from_nanos(
            timeout_ns,
        ))),
        Err(result) => Err(RenderError::Api {
            call: "wait_for_fences",
            result,
        }),
    }
}

/// Logical device with its graphics and present queues.
pub struct DeviceContext {
    swapchain_fns: swapchain::Device,
    device: ash::Device,
    phys: vk::PhysicalDevice,
    families: QueueFamilyIndices,
    graphics_queue: vk::Queue,
    present_queue: vk::Queue,
}

impl DeviceContext {
    pub fn new(instance: &InstanceContext, surface: &PresentationSurface) -> RenderResult<Self> {
        let Candidate {
            phys,
            families,
            name,
            ..
        } = pick_physical_device(instance, surface)?;

        let priorities = [1.0f32];
        let queue_infos: Vec<vk::DeviceQueueCreateInfo> = families
            .unique()
            .into_iter()
            .map(|family| vk::DeviceQueueCreateInfo {
                s_type: vk::StructureType::DEVICE_QUEUE_CREATE_INFO,
                queue_family_index: family,
                queue_count: 1,
                p_queue_priorities: priorities.as_ptr(),
                ..Default::default()
            })
            .collect();

        let features = vk::PhysicalDeviceFeatures::default();
        let ext_ptrs: [*const c_char; 1] = [swapchain::NAME.as_ptr()];
        let create_info = vk::DeviceCreateInfo {
            s_type: vk::StructureType::DEVICE_CREATE_INFO,
            queue_create_info_count: queue_infos.len() as u32,
            p_queue_create_infos: queue_infos.as_ptr(),
            enabled_extension_count: ext_ptrs.len() as u32,
            pp_enabled_extension_names: ext_ptrs.as_ptr(),
            p_enabled_features: &features,
            ..Default::default()
        };

        let device = unsafe { instance.raw().create_device(phys, &create_info, None) }
            .api("create_device")?;
        let graphics_queue = unsafe { device.get_device_queue(families.graphics, 0) };
        let present_queue = unsafe { device.get_device_queue(families.present, 0) };
        let swapchain_fns = swapchain::Device::new(instance.raw(), &device);

        info!(
            "GPU: {name} (graphics family {}, present family {})",
            families.graphics, families.present
        );

        Ok(Self {
            swapchain_fns,
            device,
            phys,
            families,
            graphics_queue,
            present_queue,
        })
    }

    pub fn raw(&self) -> &ash::Device {
        &self.device
    }

    pub fn physical(&self) -> vk::PhysicalDevice {
        self.phys
    }

    pub fn families(&self) -> QueueFamilyIndices {
        self.families
    }

    pub fn graphics_queue(&self) -> vk::Queue {
        self.graphics_queue
    }

    pub fn present_queue(&self) -> vk::Queue {
        self.present_queue
    }

    pub fn swapchain_fns(&self) -> &swapchain::Device {
        &self.swapchain_fns
    }

    pub fn wait_idle(&self) -> RenderResult<()> {
        unsafe { self.device.device_wait_idle() }.api("device_wait_idle")
    }

    /// Blocks on `fence`. `timeout_ns == u64::MAX` waits forever.
    pub fn wait_fence(&self, fence: vk::Fence, timeout_ns: u64) -> RenderResult<()> {
        fence_outcome(
            unsafe { self.device.wait_for_fences(&[fence], true, timeout_ns) },
            timeout_ns,
        )
    }
}

impl Drop for DeviceContext {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();
            self.device.destroy_device(None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;

    fn family(flags: vk::QueueFlags) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count: 1,
            ..Default::default()
        }
    }

    fn pick(
        families: &[vk::QueueFamilyProperties],
        present: &[u32],
    ) -> Option<QueueFamilyIndices> {
        find_queue_families::<Infallible>(families, |i| Ok(present.contains(&i)))
            .unwrap_or_else(|e| match e {})
    }

    #[test]
    fn prefers_one_family_doing_both() {
        let fams = [
            family(vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::TRANSFER),
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE),
        ];
        // family 1 presents first, but family 2 does both
        let got = pick(&fams, &[1, 2]).unwrap();
        assert_eq!(got, QueueFamilyIndices { graphics: 2, present: 2 });
        assert!(got.is_shared());
        assert_eq!(got.unique(), vec![2]);
    }

    #[test]
    fn splits_across_families_when_needed() {
        let fams = [
            family(vk::QueueFlags::COMPUTE),
            family(vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::TRANSFER),
        ];
        let got = pick(&fams, &[0, 2]).unwrap();
        assert_eq!(got, QueueFamilyIndices { graphics: 1, present: 0 });
        assert!(!got.is_shared());
        assert_eq!(got.unique(), vec![0, 1]);
    }

    #[test]
    fn none_without_present_support() {
        let fams = [family(vk::QueueFlags::GRAPHICS)];
        assert_eq!(pick(&fams, &[]), None);
    }

    #[test]
    fn empty_families_are_ignored() {
        let mut empty = family(vk::QueueFlags::GRAPHICS);
        empty.queue_count = 0;
        let fams = [empty, family(vk::QueueFlags::GRAPHICS)];
        assert_eq!(
            pick(&fams, &[0, 1]),
            Some(QueueFamilyIndices { graphics: 1, present: 1 })
        );
    }

    #[test]
    fn present_query_errors_propagate() {
        let fams = [family(vk::QueueFlags::GRAPHICS)];
        let got = find_queue_families(&fams, |_| Err(vk::Result::ERROR_SURFACE_LOST_KHR));
        assert_eq!(got, Err(vk::Result::ERROR_SURFACE_LOST_KHR));
    }

    #[test]
    fn fence_timeout_is_unresponsive() {
        assert!(fence_outcome(Ok(()), 1_000).is_ok());
        let err = fence_outcome(Err(vk::Result::TIMEOUT), 250_000_000).unwrap_err();
        assert!(matches!(
            err,
            RenderError::DeviceUnresponsive(d) if d == Duration::from_millis(250)
        ));
        let err = fence_outcome(Err(vk::Result::ERROR_DEVICE_LOST), u64::MAX).unwrap_err();
        assert!(matches!(
            err,
            RenderError::Api {
                call: "wait_for_fences",
                result: vk::Result::ERROR_DEVICE_LOST
            }
        ));
    }

    #[test]
    fn discrete_outranks_integrated() {
        assert!(
            device_rank(vk::PhysicalDeviceType::DISCRETE_GPU)
                > device_rank(vk::PhysicalDeviceType::INTEGRATED_GPU)
        );
        assert!(
            device_rank(vk::PhysicalDeviceType::INTEGRATED_GPU)
                > device_rank(vk::PhysicalDeviceType::CPU)
        );
    }
}
