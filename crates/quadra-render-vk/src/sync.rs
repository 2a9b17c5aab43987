// SPDX-License-Identifier: CEPL-1.0
use ash::vk;
use tracing::debug;

use crate::error::{ApiContext, RenderResult};

/// Per-frame-in-flight primitives. The fence starts signaled so the first
/// wait on a fresh slot returns immediately.
pub struct FrameSlot {
    device: ash::Device,
    pub image_available: vk::Semaphore,
    pub render_finished: vk::Semaphore,
    pub in_flight: vk::Fence,
}

impl FrameSlot {
    pub fn new(device: &ash::Device) -> RenderResult<Self> {
        // Null handles are valid to destroy, so a half-built slot drops cleanly.
        let mut slot = Self {
            device: device.clone(),
            image_available: vk::Semaphore::null(),
            render_finished: vk::Semaphore::null(),
            in_flight: vk::Fence::null(),
        };
        let sem_ci = vk::SemaphoreCreateInfo {
            s_type: vk::StructureType::SEMAPHORE_CREATE_INFO,
            ..Default::default()
        };
        let fence_ci = vk::FenceCreateInfo {
            s_type: vk::StructureType::FENCE_CREATE_INFO,
            flags: vk::FenceCreateFlags::SIGNALED,
            ..Default::default()
        };
        unsafe {
            slot.image_available = device
                .create_semaphore(&sem_ci, None)
                .api("create_semaphore")?;
            slot.render_finished = device
                .create_semaphore(&sem_ci, None)
                .api("create_semaphore")?;
            slot.in_flight = device.create_fence(&fence_ci, None).api("create_fence")?;
        }
        Ok(slot)
    }
}

impl Drop for FrameSlot {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_fence(self.in_flight, None);
            self.device.destroy_semaphore(self.render_finished, None);
            self.device.destroy_semaphore(self.image_available, None);
        }
    }
}

pub struct FrameSlots {
    slots: Vec<FrameSlot>,
}

impl FrameSlots {
    pub fn new(device: &ash::Device, count: usize) -> RenderResult<Self> {
        let slots = (0..count)
            .map(|_| FrameSlot::new(device))
            .collect::<RenderResult<Vec<_>>>()?;
        debug!(count, "frame slots created");
        Ok(Self { slots })
    }

    pub fn get(&self, slot: usize) -> &FrameSlot {
        &self.slots[slot]
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// Which frame slot last submitted work for each swapchain image.
///
/// A slot that wants an image still owned by another slot must wait on that
/// slot's fence first, since the image's command buffer may still be pending.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ImagesInFlight {
    owners: Vec<Option<usize>>,
}

impl ImagesInFlight {
    pub fn new(image_count: usize) -> Self {
        Self {
            owners: vec![None; image_count],
        }
    }

    /// Forgets every claim. Only valid after a device-idle wait.
    pub fn reset(&mut self, image_count: usize) {
        self.owners.clear();
        self.owners.resize(image_count, None);
    }

    pub fn owner(&self, image: u32) -> Option<usize> {
        self.owners.get(image as usize).copied().flatten()
    }

    /// Records `slot` as the image's owner and returns the previous one.
    pub fn claim(&mut self, image: u32, slot: usize) -> Option<usize> {
        let idx = image as usize;
        if idx >= self.owners.len() {
            self.owners.resize(idx + 1, None);
        }
        self.owners[idx].replace(slot)
    }

    pub fn len(&self) -> usize {
        self.owners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }

    pub fn is_clear(&self) -> bool {
        self.owners.iter().all(Option::is_none)
    }
}
