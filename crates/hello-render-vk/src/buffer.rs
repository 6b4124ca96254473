// SPDX-License-Identifier: CEPL-1.0
//! Buffers and the one-time vertex upload.

use crate::context::DeviceContext;
use crate::error::{VkError, VkResult, VkResultExt};
use ash::vk;
use hello_render::Vertex;
use tracing::{debug, error, warn};

/// The draw is issued with this many vertices as a triangle strip.
pub const DRAW_VERTEX_COUNT: u32 = 4;

/// Memory type indices allowed by `type_bits` whose flags contain `required`,
/// in the order the device lists them.
pub fn matching_memory_types(
    props: &vk::PhysicalDeviceMemoryProperties,
    type_bits: u32,
    required: vk::MemoryPropertyFlags,
) -> impl Iterator<Item = u32> + '_ {
    (0..props.memory_type_count).filter(move |&i| {
        type_bits & (1 << i) != 0
            && props.memory_types[i as usize]
                .property_flags
                .contains(required)
    })
}

pub fn find_memory_type(
    props: &vk::PhysicalDeviceMemoryProperties,
    type_bits: u32,
    required: vk::MemoryPropertyFlags,
) -> Option<u32> {
    matching_memory_types(props, type_bits, required).next()
}

/// Repeats the last vertex until `count` are present. Empty stays empty.
pub fn pad_vertices(vertices: &[Vertex], count: usize) -> Vec<Vertex> {
    let mut out = vertices.to_vec();
    if let Some(&last) = vertices.last() {
        out.resize(count.max(vertices.len()), last);
    }
    out
}

/// A buffer with its own dedicated allocation.
pub struct Buffer {
    device: ash::Device,
    raw: vk::Buffer,
    memory: vk::DeviceMemory,
    size: vk::DeviceSize,
}

impl Buffer {
    pub fn new(
        ctx: &DeviceContext,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        props: vk::MemoryPropertyFlags,
    ) -> VkResult<Self> {
        let device = ctx.device();
        let bci = vk::BufferCreateInfo {
            s_type: vk::StructureType::BUFFER_CREATE_INFO,
            size,
            usage,
            sharing_mode: vk::SharingMode::EXCLUSIVE,
            ..Default::default()
        };
        let raw = unsafe { device.create_buffer(&bci, None) }.during("vkCreateBuffer")?;
        let req = unsafe { device.get_buffer_memory_requirements(raw) };

        let mut memory = None;
        for type_index in matching_memory_types(ctx.memory_properties(), req.memory_type_bits, props)
        {
            let mai = vk::MemoryAllocateInfo {
                s_type: vk::StructureType::MEMORY_ALLOCATE_INFO,
                allocation_size: req.size,
                memory_type_index: type_index,
                ..Default::default()
            };
            match unsafe { device.allocate_memory(&mai, None) } {
                Ok(m) => {
                    memory = Some(m);
                    break;
                }
                Err(e) => debug!("vk: memory type {type_index} allocation failed: {e}"),
            }
        }
        let Some(memory) = memory else {
            error!("could not allocate {size} bytes with {props:?} for a buffer");
            unsafe { device.destroy_buffer(raw, None) };
            return Err(VkError::NoMemoryType);
        };

        let buffer = Self {
            device: device.clone(),
            raw,
            memory,
            size,
        };
        unsafe { device.bind_buffer_memory(raw, memory, 0) }.during("vkBindBufferMemory")?;
        Ok(buffer)
    }

    pub fn raw(&self) -> vk::Buffer {
        self.raw
    }

    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    /// Copies `bytes` to the start of a host-visible buffer and flushes.
    pub fn write(&self, bytes: &[u8]) -> VkResult<()> {
        debug_assert!(bytes.len() as vk::DeviceSize <= self.size);
        unsafe {
            let ptr = self
                .device
                .map_memory(self.memory, 0, self.size, vk::MemoryMapFlags::empty())
                .during("vkMapMemory")?;
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), ptr.cast::<u8>(), bytes.len());

            let range = vk::MappedMemoryRange {
                s_type: vk::StructureType::MAPPED_MEMORY_RANGE,
                memory: self.memory,
                offset: 0,
                size: vk::WHOLE_SIZE,
                ..Default::default()
            };
            let flushed = self
                .device
                .flush_mapped_memory_ranges(std::slice::from_ref(&range))
                .during("vkFlushMappedMemoryRanges");
            self.device.unmap_memory(self.memory);
            flushed
        }
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_buffer(self.raw, None);
            self.device.free_memory(self.memory, None);
        }
    }
}

/// Device-local vertex data plus the host-visible buffer it came from.
pub struct VertexUpload {
    pub vertex_buffer: Buffer,
    pub staging: Buffer,
    pub vertex_count: u32,
}

/// Copies `vertices` into a device-local buffer through a staging buffer.
///
/// `cmd` is borrowed from a resource slot that is not in flight. The
/// submission waits on nothing and the call returns only after the device
/// is idle.
pub fn upload_vertices(
    ctx: &DeviceContext,
    cmd: vk::CommandBuffer,
    vertices: &[Vertex],
) -> VkResult<VertexUpload> {
    let padded = pad_vertices(vertices, DRAW_VERTEX_COUNT as usize);
    if padded.len() != vertices.len() {
        warn!(
            "vk: {} vertices padded to {} for the strip draw",
            vertices.len(),
            padded.len()
        );
    }
    let bytes: &[u8] = bytemuck::cast_slice(&padded);
    let size = bytes.len() as vk::DeviceSize;

    let vertex_buffer = Buffer::new(
        ctx,
        size,
        vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST,
        vk::MemoryPropertyFlags::DEVICE_LOCAL,
    )
    .inspect_err(|e| error!("could not create vertex buffer: {e}"))?;
    let staging = Buffer::new(
        ctx,
        size,
        vk::BufferUsageFlags::TRANSFER_SRC,
        vk::MemoryPropertyFlags::HOST_VISIBLE,
    )
    .inspect_err(|e| error!("could not create staging buffer: {e}"))?;
    staging.write(bytes)?;

    let device = ctx.device();
    unsafe {
        let bi = vk::CommandBufferBeginInfo {
            s_type: vk::StructureType::COMMAND_BUFFER_BEGIN_INFO,
            flags: vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT,
            ..Default::default()
        };
        device
            .begin_command_buffer(cmd, &bi)
            .during("vkBeginCommandBuffer")?;

        let region = vk::BufferCopy {
            src_offset: 0,
            dst_offset: 0,
            size,
        };
        device.cmd_copy_buffer(
            cmd,
            staging.raw(),
            vertex_buffer.raw(),
            std::slice::from_ref(&region),
        );

        let barrier = vk::BufferMemoryBarrier {
            s_type: vk::StructureType::BUFFER_MEMORY_BARRIER,
            src_access_mask: vk::AccessFlags::TRANSFER_WRITE,
            dst_access_mask: vk::AccessFlags::VERTEX_ATTRIBUTE_READ,
            src_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
            dst_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
            buffer: vertex_buffer.raw(),
            offset: 0,
            size: vk::WHOLE_SIZE,
            ..Default::default()
        };
        device.cmd_pipeline_barrier(
            cmd,
            vk::PipelineStageFlags::TRANSFER,
            vk::PipelineStageFlags::VERTEX_INPUT,
            vk::DependencyFlags::empty(),
            &[],
            std::slice::from_ref(&barrier),
            &[],
        );
        device
            .end_command_buffer(cmd)
            .during("vkEndCommandBuffer")?;

        let si = vk::SubmitInfo {
            s_type: vk::StructureType::SUBMIT_INFO,
            command_buffer_count: 1,
            p_command_buffers: &cmd,
            ..Default::default()
        };
        device
            .queue_submit(
                ctx.graphics_queue().handle,
                std::slice::from_ref(&si),
                vk::Fence::null(),
            )
            .map_err(|e| {
                error!("vertex upload submission failed: {e}");
                VkError::SubmitFailed(e)
            })?;
    }
    ctx.wait_idle()?;

    Ok(VertexUpload {
        vertex_buffer,
        staging,
        vertex_count: padded.len() as u32,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec4;

    fn props(flags: &[vk::MemoryPropertyFlags]) -> vk::PhysicalDeviceMemoryProperties {
        let mut p = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: flags.len() as u32,
            ..Default::default()
        };
        for (i, &f) in flags.iter().enumerate() {
            p.memory_types[i].property_flags = f;
        }
        p
    }

    #[test]
    fn memory_type_respects_bits_and_flags() {
        let p = props(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_CACHED,
        ]);
        assert_eq!(
            find_memory_type(&p, 0b111, vk::MemoryPropertyFlags::HOST_VISIBLE),
            Some(1)
        );
        assert_eq!(
            find_memory_type(&p, 0b100, vk::MemoryPropertyFlags::HOST_VISIBLE),
            Some(2)
        );
        assert_eq!(
            find_memory_type(&p, 0b110, vk::MemoryPropertyFlags::DEVICE_LOCAL),
            None
        );
        let all: Vec<_> =
            matching_memory_types(&p, u32::MAX, vk::MemoryPropertyFlags::HOST_VISIBLE).collect();
        assert_eq!(all, [1, 2]);
    }

    #[test]
    fn type_count_bounds_the_search() {
        let mut p = props(&[vk::MemoryPropertyFlags::DEVICE_LOCAL]);
        p.memory_types[1].property_flags = vk::MemoryPropertyFlags::HOST_VISIBLE;
        assert_eq!(
            find_memory_type(&p, u32::MAX, vk::MemoryPropertyFlags::HOST_VISIBLE),
            None
        );
    }

    fn v(x: f32) -> Vertex {
        Vertex {
            position: Vec4::new(x, 0.0, 0.0, 1.0),
            color: Vec4::ONE,
        }
    }

    #[test]
    fn triangle_is_padded_with_its_last_vertex() {
        let padded = pad_vertices(&[v(0.0), v(1.0), v(2.0)], 4);
        assert_eq!(padded, [v(0.0), v(1.0), v(2.0), v(2.0)]);
    }

    #[test]
    fn long_or_empty_payloads_are_untouched() {
        let five: Vec<_> = (0..5).map(|i| v(i as f32)).collect();
        assert_eq!(pad_vertices(&five, 4), five);
        assert!(pad_vertices(&[], 4).is_empty());
    }
}
