// SPDX-License-Identifier: CEPL-1.0
//! Render pass, shader bytecode and the one graphics pipeline.

use crate::error::{VkError, VkResult, VkResultExt};
use crate::handles::{Pipeline, PipelineLayout, RenderPass, ShaderModule};
use ash::util::read_spv;
use ash::vk;
use hello_render::Vertex;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tracing::{error, info};

static BUILTIN_VERT: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/strip.vert.spv"));
static BUILTIN_FRAG: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/strip.frag.spv"));

/// SPIR-V words for both stages, kept so the pipeline can be rebuilt.
#[derive(Clone, Debug)]
pub struct ShaderCode {
    vert: Vec<u32>,
    frag: Vec<u32>,
}

impl ShaderCode {
    pub fn builtin() -> VkResult<Self> {
        let decode = |bytes: &[u8]| {
            read_spv(&mut Cursor::new(bytes))
                .map_err(|_| VkError::ShaderLoad(PathBuf::from("<builtin>")))
        };
        Ok(Self {
            vert: decode(BUILTIN_VERT)?,
            frag: decode(BUILTIN_FRAG)?,
        })
    }

    /// Loads `vert.spv` and `frag.spv` from `dir`.
    pub fn from_dir(dir: &Path) -> VkResult<Self> {
        let load = |name: &str| {
            let path = dir.join(name);
            let bytes = hello_core::read_binary_file(&path);
            if bytes.is_empty() {
                error!("could not read shader {}", path.display());
                return Err(VkError::ShaderLoad(path));
            }
            read_spv(&mut Cursor::new(&bytes)).map_err(|e| {
                error!("{} is not valid SPIR-V: {e}", path.display());
                VkError::ShaderLoad(path)
            })
        };
        let code = Self {
            vert: load("vert.spv")?,
            frag: load("frag.spv")?,
        };
        info!("vk: shaders loaded from {}", dir.display());
        Ok(code)
    }

    pub fn load(dir: Option<&Path>) -> VkResult<Self> {
        match dir {
            Some(d) => Self::from_dir(d),
            None => Self::builtin(),
        }
    }
}

/// One interleaved binding: position vec4 at 0, color vec4 at 16.
pub fn vertex_input_layout() -> (
    vk::VertexInputBindingDescription,
    [vk::VertexInputAttributeDescription; 2],
) {
    let binding = vk::VertexInputBindingDescription {
        binding: 0,
        stride: std::mem::size_of::<Vertex>() as u32,
        input_rate: vk::VertexInputRate::VERTEX,
    };
    let attributes = [
        vk::VertexInputAttributeDescription {
            location: 0,
            binding: 0,
            format: vk::Format::R32G32B32A32_SFLOAT,
            offset: std::mem::offset_of!(Vertex, position) as u32,
        },
        vk::VertexInputAttributeDescription {
            location: 1,
            binding: 0,
            format: vk::Format::R32G32B32A32_SFLOAT,
            offset: std::mem::offset_of!(Vertex, color) as u32,
        },
    ];
    (binding, attributes)
}

fn create_render_pass(device: &ash::Device, format: vk::Format) -> VkResult<RenderPass> {
    let attachment = vk::AttachmentDescription {
        format,
        samples: vk::SampleCountFlags::TYPE_1,
        load_op: vk::AttachmentLoadOp::CLEAR,
        store_op: vk::AttachmentStoreOp::STORE,
        stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
        stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
        initial_layout: vk::ImageLayout::UNDEFINED,
        final_layout: vk::ImageLayout::PRESENT_SRC_KHR,
        ..Default::default()
    };
    let color_ref = vk::AttachmentReference {
        attachment: 0,
        layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
    };
    let subpass = vk::SubpassDescription {
        pipeline_bind_point: vk::PipelineBindPoint::GRAPHICS,
        color_attachment_count: 1,
        p_color_attachments: &color_ref,
        ..Default::default()
    };
    let dependencies = [
        vk::SubpassDependency {
            src_subpass: vk::SUBPASS_EXTERNAL,
            dst_subpass: 0,
            src_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            dst_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            src_access_mask: vk::AccessFlags::MEMORY_READ,
            dst_access_mask: vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
            dependency_flags: vk::DependencyFlags::BY_REGION,
        },
        vk::SubpassDependency {
            src_subpass: 0,
            dst_subpass: vk::SUBPASS_EXTERNAL,
            src_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            dst_stage_mask: vk::PipelineStageFlags::BOTTOM_OF_PIPE,
            src_access_mask: vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
            dst_access_mask: vk::AccessFlags::MEMORY_READ,
            dependency_flags: vk::DependencyFlags::BY_REGION,
        },
    ];
    let ci = vk::RenderPassCreateInfo {
        s_type: vk::StructureType::RENDER_PASS_CREATE_INFO,
        attachment_count: 1,
        p_attachments: &attachment,
        subpass_count: 1,
        p_subpasses: &subpass,
        dependency_count: dependencies.len() as u32,
        p_dependencies: dependencies.as_ptr(),
        ..Default::default()
    };
    let raw = unsafe { device.create_render_pass(&ci, None) }.during("vkCreateRenderPass")?;
    Ok(unsafe { RenderPass::from_raw(device, raw) })
}

/// Render pass and pipeline built for one swap chain format.
/// Field order is teardown order.
pub struct GraphicsPipeline {
    pipeline: Pipeline,
    _layout: PipelineLayout,
    render_pass: RenderPass,
    format: vk::Format,
}

impl GraphicsPipeline {
    pub fn new(device: &ash::Device, format: vk::Format, code: &ShaderCode) -> VkResult<Self> {
        let render_pass = create_render_pass(device, format)
            .inspect_err(|e| error!("could not create render pass: {e}"))?;

        // Modules are only needed until the pipeline exists.
        let vs = ShaderModule::new(device, &code.vert)?;
        let fs = ShaderModule::new(device, &code.frag)?;
        let stages = [
            vk::PipelineShaderStageCreateInfo {
                s_type: vk::StructureType::PIPELINE_SHADER_STAGE_CREATE_INFO,
                stage: vk::ShaderStageFlags::VERTEX,
                module: vs.raw(),
                p_name: c"main".as_ptr(),
                ..Default::default()
            },
            vk::PipelineShaderStageCreateInfo {
                s_type: vk::StructureType::PIPELINE_SHADER_STAGE_CREATE_INFO,
                stage: vk::ShaderStageFlags::FRAGMENT,
                module: fs.raw(),
                p_name: c"main".as_ptr(),
                ..Default::default()
            },
        ];

        let (vb, va) = vertex_input_layout();
        let vertex_input = vk::PipelineVertexInputStateCreateInfo {
            s_type: vk::StructureType::PIPELINE_VERTEX_INPUT_STATE_CREATE_INFO,
            vertex_binding_description_count: 1,
            p_vertex_binding_descriptions: &vb,
            vertex_attribute_description_count: va.len() as u32,
            p_vertex_attribute_descriptions: va.as_ptr(),
            ..Default::default()
        };
        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo {
            s_type: vk::StructureType::PIPELINE_INPUT_ASSEMBLY_STATE_CREATE_INFO,
            topology: vk::PrimitiveTopology::TRIANGLE_STRIP,
            ..Default::default()
        };
        let dyn_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state = vk::PipelineDynamicStateCreateInfo {
            s_type: vk::StructureType::PIPELINE_DYNAMIC_STATE_CREATE_INFO,
            dynamic_state_count: dyn_states.len() as u32,
            p_dynamic_states: dyn_states.as_ptr(),
            ..Default::default()
        };
        let viewport_state = vk::PipelineViewportStateCreateInfo {
            s_type: vk::StructureType::PIPELINE_VIEWPORT_STATE_CREATE_INFO,
            viewport_count: 1,
            scissor_count: 1,
            ..Default::default()
        };
        let raster = vk::PipelineRasterizationStateCreateInfo {
            s_type: vk::StructureType::PIPELINE_RASTERIZATION_STATE_CREATE_INFO,
            polygon_mode: vk::PolygonMode::FILL,
            cull_mode: vk::CullModeFlags::NONE,
            front_face: vk::FrontFace::COUNTER_CLOCKWISE,
            line_width: 1.0,
            ..Default::default()
        };
        let multisample = vk::PipelineMultisampleStateCreateInfo {
            s_type: vk::StructureType::PIPELINE_MULTISAMPLE_STATE_CREATE_INFO,
            rasterization_samples: vk::SampleCountFlags::TYPE_1,
            min_sample_shading: 1.0,
            ..Default::default()
        };
        let blend_attachment = vk::PipelineColorBlendAttachmentState {
            color_write_mask: vk::ColorComponentFlags::R
                | vk::ColorComponentFlags::G
                | vk::ColorComponentFlags::B
                | vk::ColorComponentFlags::A,
            blend_enable: vk::FALSE,
            ..Default::default()
        };
        let color_blend = vk::PipelineColorBlendStateCreateInfo {
            s_type: vk::StructureType::PIPELINE_COLOR_BLEND_STATE_CREATE_INFO,
            attachment_count: 1,
            p_attachments: &blend_attachment,
            ..Default::default()
        };

        let layout_info = vk::PipelineLayoutCreateInfo {
            s_type: vk::StructureType::PIPELINE_LAYOUT_CREATE_INFO,
            ..Default::default()
        };
        let layout = unsafe { device.create_pipeline_layout(&layout_info, None) }
            .during("vkCreatePipelineLayout")?;
        let layout = unsafe { PipelineLayout::from_raw(device, layout) };

        let info = vk::GraphicsPipelineCreateInfo {
            s_type: vk::StructureType::GRAPHICS_PIPELINE_CREATE_INFO,
            stage_count: stages.len() as u32,
            p_stages: stages.as_ptr(),
            p_vertex_input_state: &vertex_input,
            p_input_assembly_state: &input_assembly,
            p_viewport_state: &viewport_state,
            p_rasterization_state: &raster,
            p_multisample_state: &multisample,
            p_color_blend_state: &color_blend,
            p_dynamic_state: &dynamic_state,
            layout: layout.raw(),
            render_pass: render_pass.raw(),
            subpass: 0,
            ..Default::default()
        };
        let pipelines = unsafe {
            device.create_graphics_pipelines(
                vk::PipelineCache::null(),
                std::slice::from_ref(&info),
                None,
            )
        }
        .map_err(|(_, result)| {
            error!("could not create graphics pipeline: {result}");
            VkError::Vulkan {
                call: "vkCreateGraphicsPipelines",
                result,
            }
        })?;
        let pipeline = unsafe { Pipeline::from_raw(device, pipelines[0]) };

        Ok(Self {
            pipeline,
            _layout: layout,
            render_pass,
            format,
        })
    }

    pub fn raw(&self) -> vk::Pipeline {
        self.pipeline.raw()
    }

    pub fn render_pass(&self) -> vk::RenderPass {
        self.render_pass.raw()
    }

    pub fn format(&self) -> vk::Format {
        self.format
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attributes_match_interleaved_vertex() {
        let (binding, attrs) = vertex_input_layout();
        assert_eq!(binding.stride, 32);
        assert_eq!(attrs[0].offset, 0);
        assert_eq!(attrs[1].offset, 16);
        assert!(attrs
            .iter()
            .all(|a| a.format == vk::Format::R32G32B32A32_SFLOAT && a.binding == 0));
    }

    #[test]
    fn builtin_shaders_decode() {
        let code = ShaderCode::builtin().unwrap();
        assert_eq!(code.vert[0], 0x0723_0203);
        assert_eq!(code.frag[0], 0x0723_0203);
    }

    #[test]
    fn missing_shader_dir_is_a_load_error() {
        let dir = std::env::temp_dir().join("hello-render-vk-no-such-shaders");
        match ShaderCode::from_dir(&dir) {
            Err(VkError::ShaderLoad(p)) => assert_eq!(p, dir.join("vert.spv")),
            other => panic!("expected ShaderLoad, got {other:?}"),
        }
    }

    #[test]
    fn garbage_bytecode_is_a_load_error() {
        let dir = std::env::temp_dir().join(format!("hello-render-vk-bad-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("vert.spv"), BUILTIN_VERT).unwrap();
        std::fs::write(dir.join("frag.spv"), b"not spir-v").unwrap();
        let result = ShaderCode::from_dir(&dir);
        std::fs::remove_dir_all(&dir).ok();
        assert!(matches!(result, Err(VkError::ShaderLoad(p)) if p.ends_with("frag.spv")));
    }

    #[test]
    fn shader_dir_round_trip() {
        let dir = std::env::temp_dir().join(format!("hello-render-vk-ok-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("vert.spv"), BUILTIN_VERT).unwrap();
        std::fs::write(dir.join("frag.spv"), BUILTIN_FRAG).unwrap();
        let loaded = ShaderCode::load(Some(&dir));
        std::fs::remove_dir_all(&dir).ok();
        let builtin = ShaderCode::builtin().unwrap();
        let loaded = loaded.unwrap();
        assert_eq!(loaded.vert, builtin.vert);
        assert_eq!(loaded.frag, builtin.frag);
    }
}
