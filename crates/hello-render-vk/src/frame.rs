// SPDX-License-Identifier: CEPL-1.0
//! Per-frame state machine: wait, acquire, record, submit, present.
//!
//! The steps are expressed through [`FrameDriver`] so the ordering rules can
//! be checked without a device. The renderer implements the trait with real
//! Vulkan calls.

use crate::error::{VkError, VkResult};
use ash::vk;
use tracing::{debug, error};

/// Bound on the slot fence wait, in nanoseconds.
pub const FENCE_TIMEOUT: u64 = 1_000_000_000;

/// Monotonic frame counter mapped onto a fixed number of slots.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameRing {
    counter: u64,
    len: usize,
}

impl FrameRing {
    pub fn new(len: usize) -> Self {
        debug_assert!(len > 0);
        Self { counter: 0, len }
    }

    /// Slot for the current frame; moves the counter on.
    pub fn advance(&mut self) -> usize {
        let slot = (self.counter % self.len as u64) as usize;
        self.counter += 1;
        slot
    }

    pub fn frames(&self) -> u64 {
        self.counter
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AcquireOutcome {
    Image { index: u32, suboptimal: bool },
    OutOfDate,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PresentOutcome {
    Presented,
    Recreate,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameOutcome {
    Presented,
    /// Image was presented, then the chain was rebuilt.
    PresentedAndRecreated,
    /// Acquire reported out-of-date; chain rebuilt, nothing drawn.
    Skipped,
}

pub fn classify_acquire(result: Result<(u32, bool), vk::Result>) -> VkResult<AcquireOutcome> {
    match result {
        Ok((index, suboptimal)) => Ok(AcquireOutcome::Image { index, suboptimal }),
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireOutcome::OutOfDate),
        Err(e) => {
            error!("could not acquire swap chain image: {e}");
            Err(VkError::AcquireFailed(e))
        }
    }
}

/// `Ok(true)` from present means suboptimal.
pub fn classify_present(result: Result<bool, vk::Result>) -> VkResult<PresentOutcome> {
    match result {
        Ok(false) => Ok(PresentOutcome::Presented),
        Ok(true) | Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentOutcome::Recreate),
        Err(e) => {
            error!("image presentation failed: {e}");
            Err(VkError::PresentFailed(e))
        }
    }
}

/// GPU-facing steps of one frame, each acting on one ring slot.
pub trait FrameDriver {
    fn wait_for_slot(&mut self, slot: usize, timeout_ns: u64) -> Result<(), vk::Result>;
    fn acquire_image(&mut self, slot: usize) -> Result<(u32, bool), vk::Result>;
    /// Everything `record` needs for `image_index` is in place.
    fn check_image(&mut self, image_index: u32) -> VkResult<()>;
    fn reset_slot_fence(&mut self, slot: usize) -> VkResult<()>;
    fn record(&mut self, slot: usize, image_index: u32) -> VkResult<()>;
    fn submit(&mut self, slot: usize) -> Result<(), vk::Result>;
    fn present(&mut self, slot: usize, image_index: u32) -> Result<bool, vk::Result>;
    fn recreate_swapchain(&mut self) -> VkResult<()>;
}

/// Runs one frame on the next slot of `ring`.
///
/// The slot fence is reset only after an image was acquired and checked, so
/// a skipped or rejected frame leaves the fence signaled.
pub fn draw_frame<D: FrameDriver>(ring: &mut FrameRing, driver: &mut D) -> VkResult<FrameOutcome> {
    let slot = ring.advance();

    match driver.wait_for_slot(slot, FENCE_TIMEOUT) {
        Ok(()) => {}
        Err(vk::Result::TIMEOUT) => {
            error!("waiting for the fence of slot {slot} timed out");
            return Err(VkError::FenceTimeout);
        }
        Err(result) => {
            error!("waiting for the fence of slot {slot} failed: {result}");
            return Err(VkError::Vulkan {
                call: "vkWaitForFences",
                result,
            });
        }
    }

    let index = match classify_acquire(driver.acquire_image(slot))? {
        AcquireOutcome::Image { index, suboptimal } => {
            if suboptimal {
                debug!("vk: acquired image {index} is suboptimal");
            }
            index
        }
        AcquireOutcome::OutOfDate => {
            debug!("vk: swap chain out of date on acquire");
            driver.recreate_swapchain()?;
            return Ok(FrameOutcome::Skipped);
        }
    };

    driver.check_image(index)?;
    driver.reset_slot_fence(slot)?;
    driver.record(slot, index)?;
    driver.submit(slot).map_err(|e| {
        error!("queue submission failed: {e}");
        VkError::SubmitFailed(e)
    })?;

    match classify_present(driver.present(slot, index))? {
        PresentOutcome::Presented => Ok(FrameOutcome::Presented),
        PresentOutcome::Recreate => {
            debug!("vk: swap chain out of date or suboptimal on present");
            driver.recreate_swapchain()?;
            Ok(FrameOutcome::PresentedAndRecreated)
        }
    }
}
