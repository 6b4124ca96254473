// SPDX-License-Identifier: CEPL-1.0
//! Owning wrappers for device-level handles.
//!
//! Each wrapper keeps a clone of the device dispatch table and destroys its
//! handle on drop. Teardown order therefore follows field order of the
//! owning struct: declare dependents before what they depend on.

use crate::error::{VkResult, VkResultExt};
use ash::vk;

macro_rules! owned_handle {
    ($name:ident, $raw:ty, $destroy:ident) => {
        pub struct $name {
            device: ash::Device,
            raw: $raw,
        }

        impl $name {
            /// # Safety
            /// `raw` must have been created from `device` and not be owned elsewhere.
            pub unsafe fn from_raw(device: &ash::Device, raw: $raw) -> Self {
                Self {
                    device: device.clone(),
                    raw,
                }
            }

            pub fn raw(&self) -> $raw {
                self.raw
            }
        }

        impl Drop for $name {
            fn drop(&mut self) {
                unsafe { self.device.$destroy(self.raw, None) };
            }
        }
    };
}

owned_handle!(Semaphore, vk::Semaphore, destroy_semaphore);
owned_handle!(Fence, vk::Fence, destroy_fence);
owned_handle!(Framebuffer, vk::Framebuffer, destroy_framebuffer);
owned_handle!(ImageView, vk::ImageView, destroy_image_view);
owned_handle!(RenderPass, vk::RenderPass, destroy_render_pass);
owned_handle!(PipelineLayout, vk::PipelineLayout, destroy_pipeline_layout);
owned_handle!(Pipeline, vk::Pipeline, destroy_pipeline);
owned_handle!(ShaderModule, vk::ShaderModule, destroy_shader_module);
owned_handle!(CommandPool, vk::CommandPool, destroy_command_pool);

impl Semaphore {
    pub fn new(device: &ash::Device) -> VkResult<Self> {
        let ci = vk::SemaphoreCreateInfo::default();
        let raw = unsafe { device.create_semaphore(&ci, None) }.during("vkCreateSemaphore")?;
        Ok(unsafe { Self::from_raw(device, raw) })
    }
}

impl Fence {
    /// Fences start signaled so the first wait on a fresh slot returns at once.
    pub fn signaled(device: &ash::Device) -> VkResult<Self> {
        let ci = vk::FenceCreateInfo {
            s_type: vk::StructureType::FENCE_CREATE_INFO,
            flags: vk::FenceCreateFlags::SIGNALED,
            ..Default::default()
        };
        let raw = unsafe { device.create_fence(&ci, None) }.during("vkCreateFence")?;
        Ok(unsafe { Self::from_raw(device, raw) })
    }
}

impl Framebuffer {
    pub fn new(
        device: &ash::Device,
        render_pass: vk::RenderPass,
        view: vk::ImageView,
        extent: vk::Extent2D,
    ) -> VkResult<Self> {
        let ci = vk::FramebufferCreateInfo {
            s_type: vk::StructureType::FRAMEBUFFER_CREATE_INFO,
            render_pass,
            attachment_count: 1,
            p_attachments: &view,
            width: extent.width,
            height: extent.height,
            layers: 1,
            ..Default::default()
        };
        let raw = unsafe { device.create_framebuffer(&ci, None) }.during("vkCreateFramebuffer")?;
        Ok(unsafe { Self::from_raw(device, raw) })
    }
}

impl ImageView {
    pub fn color_2d(device: &ash::Device, image: vk::Image, format: vk::Format) -> VkResult<Self> {
        let ci = vk::ImageViewCreateInfo {
            s_type: vk::StructureType::IMAGE_VIEW_CREATE_INFO,
            image,
            view_type: vk::ImageViewType::TYPE_2D,
            format,
            components: vk::ComponentMapping {
                r: vk::ComponentSwizzle::IDENTITY,
                g: vk::ComponentSwizzle::IDENTITY,
                b: vk::ComponentSwizzle::IDENTITY,
                a: vk::ComponentSwizzle::IDENTITY,
            },
            subresource_range: vk::ImageSubresourceRange {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            },
            ..Default::default()
        };
        let raw = unsafe { device.create_image_view(&ci, None) }.during("vkCreateImageView")?;
        Ok(unsafe { Self::from_raw(device, raw) })
    }
}

impl CommandPool {
    pub fn new(device: &ash::Device, queue_family: u32) -> VkResult<Self> {
        let ci = vk::CommandPoolCreateInfo {
            s_type: vk::StructureType::COMMAND_POOL_CREATE_INFO,
            queue_family_index: queue_family,
            flags: vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER
                | vk::CommandPoolCreateFlags::TRANSIENT,
            ..Default::default()
        };
        let raw = unsafe { device.create_command_pool(&ci, None) }.during("vkCreateCommandPool")?;
        Ok(unsafe { Self::from_raw(device, raw) })
    }

    /// Buffers are freed together with the pool.
    pub fn allocate(&self, count: u32) -> VkResult<Vec<vk::CommandBuffer>> {
        let ai = vk::CommandBufferAllocateInfo {
            s_type: vk::StructureType::COMMAND_BUFFER_ALLOCATE_INFO,
            command_pool: self.raw,
            level: vk::CommandBufferLevel::PRIMARY,
            command_buffer_count: count,
            ..Default::default()
        };
        unsafe { self.device.allocate_command_buffers(&ai) }.during("vkAllocateCommandBuffers")
    }
}

impl ShaderModule {
    pub fn new(device: &ash::Device, code: &[u32]) -> VkResult<Self> {
        let ci = vk::ShaderModuleCreateInfo {
            s_type: vk::StructureType::SHADER_MODULE_CREATE_INFO,
            code_size: code.len() * 4,
            p_code: code.as_ptr(),
            ..Default::default()
        };
        let raw = unsafe { device.create_shader_module(&ci, None) }.during("vkCreateShaderModule")?;
        Ok(unsafe { Self::from_raw(device, raw) })
    }
}
