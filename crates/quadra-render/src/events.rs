// SPDX-License-Identifier: CEPL-1.0

/// Structured notifications emitted at component boundaries.
///
/// Purely observational: a hook sees these after the fact and cannot steer the
/// renderer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RenderEvent {
    SwapchainBuilt {
        width: u32,
        height: u32,
        image_count: usize,
        format: &'static str,
        present_mode: &'static str,
    },
    SwapchainStale {
        at: StalePoint,
    },
    /// The acquired image was still claimed by another frame slot, whose fence
    /// had to be waited on first.
    CrossSlotWait {
        image: u32,
        slot: usize,
        owner: usize,
    },
    DeviceIdle,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StalePoint {
    Acquire,
    Present,
}

pub type EventHook = Box<dyn FnMut(&RenderEvent)>;
