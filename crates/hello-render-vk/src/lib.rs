// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
//! Vulkan backend: one static triangle strip drawn every frame through a
//! ring of three frames in flight.

use anyhow::{Context, Result};
use ash::vk;
use hello_render::{PayloadError, RenderDesc, RenderSize, Renderer};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use tracing::{debug, info};

pub mod buffer;
pub mod context;
pub mod error;
pub mod frame;
pub mod handles;
pub mod pipeline;
pub mod resources;
pub mod swapchain;

use buffer::{upload_vertices, VertexUpload, DRAW_VERTEX_COUNT};
use context::DeviceContext;
pub use error::{VkError, VkResult};
use error::VkResultExt;
use frame::{draw_frame, FrameDriver, FrameOutcome, FrameRing};
use handles::Framebuffer;
use pipeline::{GraphicsPipeline, ShaderCode};
use resources::{RenderingResourcePool, FRAMES_IN_FLIGHT};
use swapchain::SwapchainManager;

// STRICT TEARDOWN ORDER (fields drop top to bottom):
// slot objects and framebuffers, vertex/staging buffers, pipeline and render
// pass, swap chain views and chain, then the device context itself.
pub struct VkRenderer {
    frames: FrameRing,
    clear: [f32; 3],
    hint: RenderSize,
    pool: RenderingResourcePool,
    upload: VertexUpload,
    shaders: ShaderCode,
    pipeline: Option<GraphicsPipeline>,
    swapchain: SwapchainManager,
    ctx: DeviceContext,
}

impl Drop for VkRenderer {
    fn drop(&mut self) {
        if let Err(e) = self.ctx.wait_idle() {
            tracing::warn!("vk: wait idle before teardown failed: {e}");
        }
    }
}

impl VkRenderer {
    /// Number of swap chain (re)creations, the initial one included.
    pub fn recreation_count(&self) -> u64 {
        self.swapchain.recreations()
    }

    pub fn frames_drawn(&self) -> u64 {
        self.frames.frames()
    }

    pub fn swapchain_extent(&self) -> RenderSize {
        let e = self.swapchain.extent();
        RenderSize {
            width: e.width,
            height: e.height,
        }
    }

    pub fn vertex_buffer(&self) -> vk::Buffer {
        self.upload.vertex_buffer.raw()
    }

    pub fn vertex_count(&self) -> u32 {
        self.upload.vertex_count
    }

    pub fn wait_idle(&self) -> VkResult<()> {
        self.ctx.wait_idle()
    }

    pub fn slot_fence_signaled(&self, slot: usize) -> VkResult<bool> {
        let fence = self.pool.slot(slot).fence.raw();
        unsafe { self.ctx.device().get_fence_status(fence) }.during("vkGetFenceStatus")
    }

    /// Rebuilds render pass and pipeline when the chain format changed.
    fn sync_pipeline(&mut self) -> VkResult<()> {
        let Some(format) = self.swapchain.format() else {
            return Ok(());
        };
        if self.pipeline.as_ref().map(GraphicsPipeline::format) == Some(format) {
            return Ok(());
        }
        if self.pipeline.is_some() {
            info!("vk: swap chain format changed to {format:?}; rebuilding pipeline");
        }
        self.pipeline = None;
        self.pipeline = Some(GraphicsPipeline::new(
            self.ctx.device(),
            format,
            &self.shaders,
        )?);
        Ok(())
    }

    fn recreate(&mut self) -> VkResult<()> {
        self.swapchain.create_or_recreate(&self.ctx, self.hint)?;
        // The manager left the device idle, so framebuffers built on the
        // replaced views are unused.
        self.pool.release_framebuffers();
        self.sync_pipeline()
    }

    /// Moves `image` between the present and graphics families: to graphics
    /// when `acquire`, back to present otherwise.
    fn ownership_barrier(&self, cmd: vk::CommandBuffer, image: vk::Image, acquire: bool) {
        let (graphics, present) = (
            self.ctx.graphics_queue().family,
            self.ctx.present_queue().family,
        );
        let barrier = vk::ImageMemoryBarrier {
            s_type: vk::StructureType::IMAGE_MEMORY_BARRIER,
            src_access_mask: if acquire {
                vk::AccessFlags::MEMORY_READ
            } else {
                vk::AccessFlags::COLOR_ATTACHMENT_WRITE
            },
            dst_access_mask: if acquire {
                vk::AccessFlags::COLOR_ATTACHMENT_WRITE
            } else {
                vk::AccessFlags::MEMORY_READ
            },
            old_layout: vk::ImageLayout::PRESENT_SRC_KHR,
            new_layout: vk::ImageLayout::PRESENT_SRC_KHR,
            src_queue_family_index: if acquire { present } else { graphics },
            dst_queue_family_index: if acquire { graphics } else { present },
            image,
            subresource_range: vk::ImageSubresourceRange {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            },
            ..Default::default()
        };
        let dst_stage = if acquire {
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
        } else {
            vk::PipelineStageFlags::BOTTOM_OF_PIPE
        };
        unsafe {
            self.ctx.device().cmd_pipeline_barrier(
                cmd,
                vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
                dst_stage,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                std::slice::from_ref(&barrier),
            );
        }
    }
}

impl FrameDriver for VkRenderer {
    fn wait_for_slot(&mut self, slot: usize, timeout_ns: u64) -> Result<(), vk::Result> {
        let fence = self.pool.slot(slot).fence.raw();
        unsafe { self.ctx.device().wait_for_fences(&[fence], true, timeout_ns) }
    }

    fn acquire_image(&mut self, slot: usize) -> Result<(u32, bool), vk::Result> {
        let semaphore = self.pool.slot(slot).image_available.raw();
        unsafe {
            self.ctx.swapchain_loader().acquire_next_image(
                self.swapchain.raw(),
                u64::MAX,
                semaphore,
                vk::Fence::null(),
            )
        }
    }

    fn check_image(&mut self, image_index: u32) -> VkResult<()> {
        if self.swapchain.view(image_index).is_none() {
            return Err(VkError::InvalidFrameState("acquired image has no view"));
        }
        if self.pipeline.is_none() {
            return Err(VkError::InvalidFrameState("no pipeline for the swap chain format"));
        }
        Ok(())
    }

    fn reset_slot_fence(&mut self, slot: usize) -> VkResult<()> {
        let fence = self.pool.slot(slot).fence.raw();
        unsafe { self.ctx.device().reset_fences(&[fence]) }.during("vkResetFences")
    }

    fn record(&mut self, slot: usize, image_index: u32) -> VkResult<()> {
        let (Some(image), Some(view)) = (
            self.swapchain.image(image_index),
            self.swapchain.view(image_index),
        ) else {
            return Err(VkError::InvalidFrameState("acquired image has no view"));
        };
        let extent = self.swapchain.extent();
        let Some(pipeline) = self.pipeline.as_ref() else {
            return Err(VkError::InvalidFrameState("no pipeline for the swap chain format"));
        };
        let (render_pass, raw_pipeline) = (pipeline.render_pass(), pipeline.raw());

        // The slot fence was waited on, so its previous framebuffer is idle.
        let framebuffer = Framebuffer::new(self.ctx.device(), render_pass, view, extent)?;
        let fb = framebuffer.raw();
        let cmd = self.pool.slot(slot).command_buffer;
        self.pool.slot_mut(slot).framebuffer = Some(framebuffer);

        let device = self.ctx.device();
        let separate = self.ctx.separate_present_queue();
        unsafe {
            let begin = vk::CommandBufferBeginInfo {
                s_type: vk::StructureType::COMMAND_BUFFER_BEGIN_INFO,
                flags: vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT,
                ..Default::default()
            };
            device
                .begin_command_buffer(cmd, &begin)
                .during("vkBeginCommandBuffer")?;

            if separate {
                self.ownership_barrier(cmd, image, true);
            }

            let [r, g, b] = self.clear;
            let clears = [vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: [r, g, b, 1.0],
                },
            }];
            let rp_begin = vk::RenderPassBeginInfo {
                s_type: vk::StructureType::RENDER_PASS_BEGIN_INFO,
                render_pass,
                framebuffer: fb,
                render_area: vk::Rect2D {
                    offset: vk::Offset2D { x: 0, y: 0 },
                    extent,
                },
                clear_value_count: clears.len() as u32,
                p_clear_values: clears.as_ptr(),
                ..Default::default()
            };
            device.cmd_begin_render_pass(cmd, &rp_begin, vk::SubpassContents::INLINE);
            device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, raw_pipeline);

            let viewport = vk::Viewport {
                x: 0.0,
                y: 0.0,
                width: extent.width as f32,
                height: extent.height as f32,
                min_depth: 0.0,
                max_depth: 1.0,
            };
            let scissor = vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent,
            };
            device.cmd_set_viewport(cmd, 0, std::slice::from_ref(&viewport));
            device.cmd_set_scissor(cmd, 0, std::slice::from_ref(&scissor));

            device.cmd_bind_vertex_buffers(cmd, 0, &[self.upload.vertex_buffer.raw()], &[0]);
            device.cmd_draw(cmd, DRAW_VERTEX_COUNT, 1, 0, 0);
            device.cmd_end_render_pass(cmd);

            if separate {
                self.ownership_barrier(cmd, image, false);
            }

            device
                .end_command_buffer(cmd)
                .during("vkEndCommandBuffer")?;
        }
        Ok(())
    }

    fn submit(&mut self, slot: usize) -> Result<(), vk::Result> {
        let s = self.pool.slot(slot);
        let wait_stage = vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT;
        let wait = s.image_available.raw();
        let signal = s.render_finished.raw();
        let submit = vk::SubmitInfo {
            s_type: vk::StructureType::SUBMIT_INFO,
            wait_semaphore_count: 1,
            p_wait_semaphores: &wait,
            p_wait_dst_stage_mask: &wait_stage,
            command_buffer_count: 1,
            p_command_buffers: &s.command_buffer,
            signal_semaphore_count: 1,
            p_signal_semaphores: &signal,
            ..Default::default()
        };
        unsafe {
            self.ctx.device().queue_submit(
                self.ctx.graphics_queue().handle,
                std::slice::from_ref(&submit),
                s.fence.raw(),
            )
        }
    }

    fn present(&mut self, slot: usize, image_index: u32) -> Result<bool, vk::Result> {
        let wait = self.pool.slot(slot).render_finished.raw();
        let swapchain = self.swapchain.raw();
        let present = vk::PresentInfoKHR {
            s_type: vk::StructureType::PRESENT_INFO_KHR,
            wait_semaphore_count: 1,
            p_wait_semaphores: &wait,
            swapchain_count: 1,
            p_swapchains: &swapchain,
            p_image_indices: &image_index,
            ..Default::default()
        };
        unsafe {
            self.ctx
                .swapchain_loader()
                .queue_present(self.ctx.present_queue().handle, &present)
        }
    }

    fn recreate_swapchain(&mut self) -> VkResult<()> {
        self.recreate()
    }
}

impl Renderer for VkRenderer {
    fn new(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        size: RenderSize,
        desc: &RenderDesc,
    ) -> Result<Self> {
        if desc.vertices.is_empty() {
            return Err(PayloadError::Empty.into());
        }

        let ctx = DeviceContext::new(window, display).context("Vulkan device setup")?;
        let swapchain = SwapchainManager::new(&ctx, size).context("swap chain creation")?;
        let pool = RenderingResourcePool::new(ctx.device(), ctx.graphics_queue().family)
            .context("frame resource creation")?;
        let shaders = ShaderCode::load(desc.shader_dir.as_deref()).context("shader loading")?;
        let upload = upload_vertices(&ctx, pool.slot(0).command_buffer, &desc.vertices)
            .context("vertex upload")?;

        let mut r = VkRenderer {
            frames: FrameRing::new(FRAMES_IN_FLIGHT),
            clear: desc.clear_color,
            hint: size,
            pool,
            upload,
            shaders,
            pipeline: None,
            swapchain,
            ctx,
        };
        r.sync_pipeline().context("pipeline creation")?;

        let extent = r.swapchain.extent();
        info!(
            "vk: renderer ready ({}x{}, {} vertices, {} frames in flight)",
            extent.width,
            extent.height,
            r.upload.vertex_count,
            r.pool.len()
        );
        Ok(r)
    }

    fn resize(&mut self, size: RenderSize) -> Result<()> {
        debug!("vk: resize to {}x{}", size.width, size.height);
        self.hint = size;
        self.recreate().context("swap chain recreation")?;
        Ok(())
    }

    fn ready_to_draw(&self) -> bool {
        self.swapchain.is_ready() && self.pipeline.is_some()
    }

    fn render(&mut self) -> Result<()> {
        if !self.ready_to_draw() {
            return Ok(());
        }
        let mut ring = self.frames;
        let outcome = draw_frame(&mut ring, self);
        self.frames = ring;
        if outcome? == FrameOutcome::Skipped {
            debug!("vk: frame skipped for swap chain recreation");
        }
        Ok(())
    }

    fn set_clear_color(&mut self, rgb: [f32; 3]) {
        self.clear = rgb;
    }
}
