// SPDX-License-Identifier: CEPL-1.0
//! Fixed ring of per-frame recording and synchronization objects.

use crate::error::VkResult;
use crate::handles::{CommandPool, Fence, Framebuffer, Semaphore};
use ash::vk;
use tracing::error;

/// Frames that may be in flight at once.
pub const FRAMES_IN_FLIGHT: usize = 3;

pub struct RenderingResource {
    pub command_buffer: vk::CommandBuffer,
    pub image_available: Semaphore,
    pub render_finished: Semaphore,
    pub fence: Fence,
    /// Rebuilt every frame against the acquired view.
    pub framebuffer: Option<Framebuffer>,
}

/// Slots are declared before the pool: command buffers are freed with it.
pub struct RenderingResourcePool {
    slots: Vec<RenderingResource>,
    _pool: CommandPool,
}

impl RenderingResourcePool {
    /// Creation order: command pool, command buffers, semaphores, fences.
    /// The first failure is returned and everything made so far is dropped.
    pub fn new(device: &ash::Device, graphics_family: u32) -> VkResult<Self> {
        let pool = CommandPool::new(device, graphics_family)
            .inspect_err(|e| error!("could not create command pool: {e}"))?;
        let buffers = pool
            .allocate(FRAMES_IN_FLIGHT as u32)
            .inspect_err(|e| error!("could not allocate command buffers: {e}"))?;

        let mut semaphores = Vec::with_capacity(FRAMES_IN_FLIGHT);
        for _ in 0..FRAMES_IN_FLIGHT {
            let pair = Semaphore::new(device)
                .and_then(|a| Ok((a, Semaphore::new(device)?)))
                .inspect_err(|e| error!("could not create semaphore: {e}"))?;
            semaphores.push(pair);
        }

        let mut fences = Vec::with_capacity(FRAMES_IN_FLIGHT);
        for _ in 0..FRAMES_IN_FLIGHT {
            fences.push(
                Fence::signaled(device).inspect_err(|e| error!("could not create fence: {e}"))?,
            );
        }

        let slots = buffers
            .into_iter()
            .zip(semaphores)
            .zip(fences)
            .map(
                |((command_buffer, (image_available, render_finished)), fence)| RenderingResource {
                    command_buffer,
                    image_available,
                    render_finished,
                    fence,
                    framebuffer: None,
                },
            )
            .collect();

        Ok(Self {
            slots,
            _pool: pool,
        })
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn slot(&self, index: usize) -> &RenderingResource {
        &self.slots[index]
    }

    pub fn slot_mut(&mut self, index: usize) -> &mut RenderingResource {
        &mut self.slots[index]
    }

    /// Drops framebuffers that may reference views of a replaced chain.
    /// The device must be idle.
    pub fn release_framebuffers(&mut self) {
        for slot in &mut self.slots {
            slot.framebuffer = None;
        }
    }
}
