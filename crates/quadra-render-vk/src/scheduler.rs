// SPDX-License-Identifier: CEPL-1.0
//! Per-frame state machine: wait, acquire, submit, present, advance.
//!
//! GPU access goes through [`FrameOps`] so the ordering rules can be
//! exercised without a device.
use quadra_render::{FrameStatus, StalePoint};
use tracing::trace;

use crate::error::RenderResult;
use crate::sync::ImagesInFlight;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Acquired {
    Image { index: u32, suboptimal: bool },
    /// Nothing was acquired and no semaphore will be signaled.
    OutOfDate,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PresentOutcome {
    Done,
    Suboptimal,
    OutOfDate,
}

pub trait FrameOps {
    /// Blocks until `slot`'s fence is signaled.
    fn wait_slot(&mut self, slot: usize) -> RenderResult<()>;

    /// Asks the presentation engine for an image, signaling `slot`'s
    /// image-available semaphore.
    fn acquire(&mut self, slot: usize) -> RenderResult<Acquired>;

    fn reset_slot(&mut self, slot: usize) -> RenderResult<()>;

    /// Submits `image`'s command buffer, signaling `slot`'s render-finished
    /// semaphore and fence.
    fn submit(&mut self, slot: usize, image: u32) -> RenderResult<()>;

    fn present(&mut self, slot: usize, image: u32) -> RenderResult<PresentOutcome>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameReport {
    pub status: FrameStatus,
    pub slot: usize,
    pub image: Option<u32>,
    pub stale_at: Option<StalePoint>,
    /// Slot whose fence was waited because it still owned the acquired image.
    pub cross_wait: Option<usize>,
}

#[derive(Debug)]
pub struct FrameScheduler {
    slot: usize,
    slot_count: usize,
    images: ImagesInFlight,
}

impl FrameScheduler {
    pub fn new(slot_count: usize, image_count: usize) -> Self {
        Self {
            slot: 0,
            slot_count: slot_count.max(1),
            images: ImagesInFlight::new(image_count),
        }
    }

    pub fn current_slot(&self) -> usize {
        self.slot
    }

    pub fn slot_count(&self) -> usize {
        self.slot_count
    }

    pub fn images(&self) -> &ImagesInFlight {
        &self.images
    }

    /// Drops every image claim. Call only once the device is idle.
    pub fn on_rebuild(&mut self, image_count: usize) {
        self.images.reset(image_count);
    }

    pub fn draw_frame<O: FrameOps + ?Sized>(&mut self, ops: &mut O) -> RenderResult<FrameReport> {
        let slot = self.slot;
        ops.wait_slot(slot)?;

        let (image, acquire_suboptimal) = match ops.acquire(slot)? {
            Acquired::Image { index, suboptimal } => (index, suboptimal),
            Acquired::OutOfDate => {
                // The fence stays signaled and the slot is reused next frame.
                trace!(slot, "acquire out of date");
                return Ok(FrameReport {
                    status: FrameStatus::Stale,
                    slot,
                    image: None,
                    stale_at: Some(StalePoint::Acquire),
                    cross_wait: None,
                });
            }
        };

        let mut cross_wait = None;
        if let Some(owner) = self.images.owner(image) {
            if owner != slot {
                ops.wait_slot(owner)?;
                cross_wait = Some(owner);
            }
        }
        self.images.claim(image, slot);

        ops.reset_slot(slot)?;
        ops.submit(slot, image)?;
        let presented = ops.present(slot, image)?;
        self.slot = (slot + 1) % self.slot_count;

        let stale_at = match presented {
            PresentOutcome::Suboptimal | PresentOutcome::OutOfDate => Some(StalePoint::Present),
            PresentOutcome::Done if acquire_suboptimal => Some(StalePoint::Acquire),
            PresentOutcome::Done => None,
        };
        trace!(slot, image, ?presented, "frame submitted");

        Ok(FrameReport {
            status: if stale_at.is_some() {
                FrameStatus::Stale
            } else {
                FrameStatus::Presented
            },
            slot,
            image: Some(image),
            stale_at,
            cross_wait,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RenderError;
    use ash::vk;
    use std::collections::VecDeque;

    /// A GPU that only finishes work when someone waits for it, which is the
    /// worst case the scheduler has to be correct against.
    struct LazyGpu {
        image_count: u32,
        next_image: u32,
        acquires: VecDeque<RenderResult<Acquired>>,
        presents: VecDeque<PresentOutcome>,
        signaled: Vec<bool>,
        executing: Vec<Option<u32>>,
        log: Vec<String>,
        submits: usize,
    }

    impl LazyGpu {
        fn new(slots: usize, image_count: u32) -> Self {
            Self {
                image_count,
                next_image: 0,
                acquires: VecDeque::new(),
                presents: VecDeque::new(),
                signaled: vec![true; slots],
                executing: vec![None; slots],
                log: Vec::new(),
                submits: 0,
            }
        }

        fn acquire_images(mut self, images: impl IntoIterator<Item = u32>) -> Self {
            self.acquires.extend(images.into_iter().map(|index| {
                Ok(Acquired::Image {
                    index,
                    suboptimal: false,
                })
            }));
            self
        }
    }

    impl FrameOps for LazyGpu {
        fn wait_slot(&mut self, slot: usize) -> RenderResult<()> {
            if self.executing[slot].take().is_some() {
                self.signaled[slot] = true;
            }
            assert!(
                self.signaled[slot],
                "slot {slot}: waiting on a fence nothing will signal"
            );
            self.log.push(format!("wait {slot}"));
            Ok(())
        }

        fn acquire(&mut self, slot: usize) -> RenderResult<Acquired> {
            self.log.push(format!("acquire {slot}"));
            self.acquires.pop_front().unwrap_or_else(|| {
                let index = self.next_image;
                self.next_image = (self.next_image + 1) % self.image_count;
                Ok(Acquired::Image {
                    index,
                    suboptimal: false,
                })
            })
        }

        fn reset_slot(&mut self, slot: usize) -> RenderResult<()> {
            assert!(self.signaled[slot], "slot {slot}: reset of an unsignaled fence");
            self.signaled[slot] = false;
            self.log.push(format!("reset {slot}"));
            Ok(())
        }

        fn submit(&mut self, slot: usize, image: u32) -> RenderResult<()> {
            assert!(!self.signaled[slot], "slot {slot}: submit without fence reset");
            for (other, running) in self.executing.iter().enumerate() {
                assert_ne!(
                    *running,
                    Some(image),
                    "image {image} resubmitted while slot {other} still executes it"
                );
            }
            self.executing[slot] = Some(image);
            self.submits += 1;
            self.log.push(format!("submit {slot} {image}"));
            Ok(())
        }

        fn present(&mut self, slot: usize, image: u32) -> RenderResult<PresentOutcome> {
            self.log.push(format!("present {slot} {image}"));
            Ok(self.presents.pop_front().unwrap_or(PresentOutcome::Done))
        }
    }

    // Deterministic image order that keeps revisiting recently used images.
    fn scrambled(n: usize, image_count: u32) -> Vec<u32> {
        let mut x: u32 = 0x2545_f491;
        (0..n)
            .map(|_| {
                x ^= x << 13;
                x ^= x >> 17;
                x ^= x << 5;
                x % image_count
            })
            .collect()
    }

    fn run(slots: usize, images: u32, frames: usize) -> (FrameScheduler, LazyGpu) {
        let mut sched = FrameScheduler::new(slots, images as usize);
        let mut gpu = LazyGpu::new(slots, images).acquire_images(scrambled(frames, images));
        for _ in 0..frames {
            let r = sched.draw_frame(&mut gpu).unwrap();
            assert_eq!(r.status, FrameStatus::Presented);
        }
        (sched, gpu)
    }

    #[test]
    fn fence_discipline_more_images_than_slots() {
        let (_, gpu) = run(2, 3, 200);
        assert_eq!(gpu.submits, 200);
    }

    #[test]
    fn fence_discipline_more_slots_than_images() {
        let (_, gpu) = run(3, 2, 200);
        assert_eq!(gpu.submits, 200);
    }

    #[test]
    fn fence_discipline_single_slot() {
        let (sched, gpu) = run(1, 3, 50);
        assert_eq!(gpu.submits, 50);
        assert_eq!(sched.current_slot(), 0);
    }

    #[test]
    fn slots_advance_round_robin() {
        let mut sched = FrameScheduler::new(2, 3);
        let mut gpu = LazyGpu::new(2, 3);
        let slots: Vec<usize> = (0..5)
            .map(|_| sched.draw_frame(&mut gpu).unwrap().slot)
            .collect();
        assert_eq!(slots, vec![0, 1, 0, 1, 0]);
        assert_eq!(
            &gpu.log[..6],
            ["wait 0", "acquire 0", "reset 0", "submit 0 0", "present 0 0", "wait 1"]
        );
    }

    #[test]
    fn reacquired_image_waits_on_its_owner() {
        let mut sched = FrameScheduler::new(2, 2);
        let mut gpu = LazyGpu::new(2, 2).acquire_images([0, 0]);

        let first = sched.draw_frame(&mut gpu).unwrap();
        assert_eq!(first.cross_wait, None);

        let before = gpu.log.len();
        let second = sched.draw_frame(&mut gpu).unwrap();
        assert_eq!(second.slot, 1);
        assert_eq!(second.cross_wait, Some(0));
        assert_eq!(sched.images().owner(0), Some(1));
        assert_eq!(
            gpu.log[before..],
            ["wait 1", "acquire 1", "wait 0", "reset 1", "submit 1 0", "present 1 0"]
        );
    }

    #[test]
    fn out_of_date_acquire_skips_the_frame() {
        let mut sched = FrameScheduler::new(2, 3);
        let mut gpu = LazyGpu::new(2, 3);
        gpu.acquires.extend([
            Ok(Acquired::Image {
                index: 0,
                suboptimal: false,
            }),
            Ok(Acquired::OutOfDate),
        ]);

        sched.draw_frame(&mut gpu).unwrap();
        let before = gpu.log.len();
        let r = sched.draw_frame(&mut gpu).unwrap();

        assert_eq!(r.status, FrameStatus::Stale);
        assert_eq!(r.stale_at, Some(StalePoint::Acquire));
        assert_eq!(r.image, None);
        assert_eq!(gpu.log[before..], ["wait 1", "acquire 1"]);
        assert!(gpu.signaled[1], "fence must stay signaled");
        assert_eq!(sched.current_slot(), 1);
        assert_eq!(gpu.submits, 1);
    }

    #[test]
    fn scenario_c_resumes_after_rebuild() {
        let mut sched = FrameScheduler::new(2, 3);
        let mut gpu = LazyGpu::new(2, 3);
        gpu.acquires.extend([
            Ok(Acquired::Image {
                index: 0,
                suboptimal: false,
            }),
            Ok(Acquired::Image {
                index: 1,
                suboptimal: false,
            }),
            Ok(Acquired::OutOfDate),
        ]);
        for _ in 0..2 {
            sched.draw_frame(&mut gpu).unwrap();
        }
        assert_eq!(sched.draw_frame(&mut gpu).unwrap().status, FrameStatus::Stale);

        // What the renderer does between frames: idle the device, rebuild.
        for slot in 0..2 {
            gpu.wait_slot(slot).unwrap();
        }
        sched.on_rebuild(3);
        assert!(sched.images().is_clear());

        gpu.next_image = 0;
        for i in 0..6 {
            let r = sched.draw_frame(&mut gpu).unwrap();
            assert_eq!(r.status, FrameStatus::Presented);
            if i == 0 {
                assert_eq!((r.slot, r.cross_wait), (0, None));
            }
        }
        assert_eq!(gpu.submits, 8);
    }

    #[test]
    fn suboptimal_acquire_still_presents() {
        let mut sched = FrameScheduler::new(2, 3);
        let mut gpu = LazyGpu::new(2, 3);
        gpu.acquires.push_back(Ok(Acquired::Image {
            index: 2,
            suboptimal: true,
        }));

        let r = sched.draw_frame(&mut gpu).unwrap();
        assert_eq!(r.status, FrameStatus::Stale);
        assert_eq!(r.stale_at, Some(StalePoint::Acquire));
        assert_eq!(gpu.log.last().map(String::as_str), Some("present 0 2"));
        assert_eq!(sched.current_slot(), 1);
    }

    #[test]
    fn present_staleness_is_reported_after_presenting() {
        let mut sched = FrameScheduler::new(2, 3);
        let mut gpu = LazyGpu::new(2, 3);
        gpu.presents
            .extend([PresentOutcome::Suboptimal, PresentOutcome::OutOfDate]);

        for slot in 0..2 {
            let r = sched.draw_frame(&mut gpu).unwrap();
            assert_eq!(r.status, FrameStatus::Stale);
            assert_eq!(r.stale_at, Some(StalePoint::Present));
            assert_eq!(r.slot, slot);
        }
        assert_eq!(gpu.submits, 2);
    }

    #[test]
    fn acquire_errors_propagate_without_advancing() {
        let mut sched = FrameScheduler::new(2, 3);
        let mut gpu = LazyGpu::new(2, 3);
        gpu.acquires.push_back(Err(RenderError::Api {
            call: "acquire_next_image",
            result: vk::Result::ERROR_SURFACE_LOST_KHR,
        }));

        let err = sched.draw_frame(&mut gpu).unwrap_err();
        assert!(matches!(
            err,
            RenderError::Api {
                result: vk::Result::ERROR_SURFACE_LOST_KHR,
                ..
            }
        ));
        assert_eq!(sched.current_slot(), 0);
        assert!(gpu.signaled[0]);
    }

    #[test]
    fn rebuild_reset_is_idempotent() {
        let (mut sched, _) = run(2, 3, 10);
        sched.on_rebuild(4);
        let once = sched.images().clone();
        sched.on_rebuild(4);
        assert_eq!(sched.images(), &once);
        assert_eq!(once.len(), 4);
    }
}
