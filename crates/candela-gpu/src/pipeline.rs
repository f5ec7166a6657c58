//! Graphics pipeline creation.
//!
//! Pipelines are built against one subpass of a planned render pass. Vertex
//! input state comes from the shader container's reflection, the color blend
//! attachment count from the subpass plan, and the sample count from the
//! pass variant the pipeline targets. Viewport and scissor are dynamic so a
//! pipeline survives swapchain rebuilds.

use std::sync::Arc;

use ash::vk;

use crate::capabilities;
use crate::device::GraphicsDevice;
use crate::error::{GpuError, Result};
use crate::layout::ShaderLayout;
use crate::renderpass::RenderPass;
use crate::shader::{ShaderModules, VertexInput};

/// Fixed-function configuration for a graphics pipeline.
#[derive(Clone)]
pub struct PipelineConfig {
    pub topology: vk::PrimitiveTopology,
    pub polygon_mode: vk::PolygonMode,
    pub cull_mode: vk::CullModeFlags,
    pub front_face: vk::FrontFace,
    pub depth_test: bool,
    pub depth_write: bool,
    /// Standard alpha blending on every color attachment.
    pub blend: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            topology: vk::PrimitiveTopology::TRIANGLE_LIST,
            polygon_mode: vk::PolygonMode::FILL,
            cull_mode: vk::CullModeFlags::BACK,
            front_face: vk::FrontFace::COUNTER_CLOCKWISE,
            depth_test: true,
            depth_write: true,
            blend: false,
        }
    }
}

/// Graphics pipeline wrapper.
pub struct GraphicsPipeline {
    handle: vk::Pipeline,
    layout: Arc<ShaderLayout>,
    subpass: u32,
    samples: u32,
}

impl GraphicsPipeline {
    /// Create a graphics pipeline for one subpass of `pass`.
    ///
    /// Requesting a multisampled variant builds it on the pass first.
    ///
    /// # Safety
    /// The device must be valid and `modules` must come from the container
    /// the layout was built from.
    pub unsafe fn new(
        device: &GraphicsDevice,
        modules: &ShaderModules,
        layout: Arc<ShaderLayout>,
        pass: &mut RenderPass,
        subpass: u32,
        samples: u32,
        config: &PipelineConfig,
    ) -> Result<Self> {
        let pass_handle = pass.handle_for(device, samples)?;
        let plan = pass.plan_for(samples)?;
        let Some(subpass_plan) = plan.subpasses.get(subpass as usize) else {
            return Err(GpuError::InvalidState(format!(
                "render pass has no subpass {subpass}"
            )));
        };
        let sample_flag = capabilities::sample_count_flag(plan.samples)
            .ok_or(GpuError::UnsupportedSampleCount(plan.samples))?;

        // Shader stages
        let shader_stages = [
            vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::VERTEX)
                .module(modules.vertex)
                .name(c"main"),
            vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::FRAGMENT)
                .module(modules.fragment)
                .name(c"main"),
        ];

        // Vertex input, derived from the reflection tables
        let (vertex_bindings, vertex_attributes) =
            vertex_input_state(&layout.reflection().vertex_inputs);
        let vertex_input = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&vertex_bindings)
            .vertex_attribute_descriptions(&vertex_attributes);

        // Input assembly
        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(config.topology)
            .primitive_restart_enable(false);

        // Viewport (dynamic)
        let viewport_state = vk::PipelineViewportStateCreateInfo::default()
            .viewport_count(1)
            .scissor_count(1);

        // Rasterization
        let rasterization = vk::PipelineRasterizationStateCreateInfo::default()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(config.polygon_mode)
            .cull_mode(config.cull_mode)
            .front_face(config.front_face)
            .depth_bias_enable(false)
            .line_width(1.0);

        // Multisampling follows the pass variant
        let multisampling = vk::PipelineMultisampleStateCreateInfo::default()
            .rasterization_samples(sample_flag)
            .sample_shading_enable(false);

        // Depth stencil, only live when the subpass has a depth slot
        let has_depth = subpass_plan.depth.is_some();
        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(config.depth_test && has_depth)
            .depth_write_enable(config.depth_write && has_depth)
            .depth_compare_op(vk::CompareOp::LESS)
            .depth_bounds_test_enable(false)
            .stencil_test_enable(false);

        // Color blending, one state per color reference
        let color_blend_attachments: Vec<_> = subpass_plan
            .colors
            .iter()
            .map(|_| {
                let state = vk::PipelineColorBlendAttachmentState::default()
                    .color_write_mask(vk::ColorComponentFlags::RGBA);
                if config.blend {
                    state
                        .blend_enable(true)
                        .src_color_blend_factor(vk::BlendFactor::SRC_ALPHA)
                        .dst_color_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
                        .color_blend_op(vk::BlendOp::ADD)
                        .src_alpha_blend_factor(vk::BlendFactor::ONE)
                        .dst_alpha_blend_factor(vk::BlendFactor::ZERO)
                        .alpha_blend_op(vk::BlendOp::ADD)
                } else {
                    state.blend_enable(false)
                }
            })
            .collect();

        let color_blending = vk::PipelineColorBlendStateCreateInfo::default()
            .logic_op_enable(false)
            .attachments(&color_blend_attachments);

        // Dynamic state
        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state =
            vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

        // Create pipeline
        let pipeline_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&shader_stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization)
            .multisample_state(&multisampling)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blending)
            .dynamic_state(&dynamic_state)
            .layout(layout.pipeline_layout())
            .render_pass(pass_handle)
            .subpass(subpass);

        let pipelines = device
            .device()
            .create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
            .map_err(|(_pipelines, e)| GpuError::Vulkan(e))?;

        Ok(Self {
            handle: pipelines[0],
            layout,
            subpass,
            samples,
        })
    }

    /// Pipeline handle.
    pub fn handle(&self) -> vk::Pipeline {
        self.handle
    }

    /// Layout the pipeline was created with.
    pub fn layout(&self) -> &Arc<ShaderLayout> {
        &self.layout
    }

    /// Subpass index the pipeline targets.
    pub fn subpass(&self) -> u32 {
        self.subpass
    }

    /// Sample count of the pass variant the pipeline targets.
    pub fn samples(&self) -> u32 {
        self.samples
    }

    /// Queue the pipeline for destruction once every in-flight frame has
    /// retired. The shared layout is left to its own owner.
    pub fn destroy_deferred(&self, device: &GraphicsDevice) {
        let handle = self.handle;
        device.defer_destroy(move |dev| unsafe {
            dev.destroy_pipeline(handle, None);
        });
    }

    /// Destroy the pipeline immediately.
    ///
    /// # Safety
    /// The device must be valid and the pipeline must not be in use.
    pub unsafe fn destroy_now(&self, device: &GraphicsDevice) {
        device.device().destroy_pipeline(self.handle, None);
    }
}

/// Derive single-binding vertex input state from the reflected inputs.
///
/// Attributes pack tightly in location order; an array input takes one
/// location per element.
fn vertex_input_state(
    inputs: &[VertexInput],
) -> (
    Vec<vk::VertexInputBindingDescription>,
    Vec<vk::VertexInputAttributeDescription>,
) {
    let mut sorted: Vec<&VertexInput> = inputs.iter().collect();
    sorted.sort_by_key(|input| input.location);

    let mut attributes = Vec::new();
    let mut stride = 0u32;
    for input in sorted {
        for element in 0..input.array_len.max(1) {
            attributes.push(vk::VertexInputAttributeDescription {
                location: input.location + element,
                binding: 0,
                format: input.format.to_vk(),
                offset: stride,
            });
            stride += input.format.size();
        }
    }

    let bindings = if attributes.is_empty() {
        Vec::new()
    } else {
        vec![vk::VertexInputBindingDescription {
            binding: 0,
            stride,
            input_rate: vk::VertexInputRate::VERTEX,
        }]
    };

    (bindings, attributes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shader::VertexFormat;

    fn input(location: u32, format: VertexFormat, array_len: u32) -> VertexInput {
        VertexInput {
            location,
            format,
            array_len,
        }
    }

    #[test]
    fn attributes_pack_in_location_order() {
        let (bindings, attributes) = vertex_input_state(&[
            input(1, VertexFormat::Float2, 1),
            input(0, VertexFormat::Float3, 1),
        ]);

        assert_eq!(bindings.len(), 1);
        assert_eq!(bindings[0].stride, 20);
        assert_eq!(attributes[0].location, 0);
        assert_eq!(attributes[0].offset, 0);
        assert_eq!(attributes[0].format, vk::Format::R32G32B32_SFLOAT);
        assert_eq!(attributes[1].location, 1);
        assert_eq!(attributes[1].offset, 12);
    }

    #[test]
    fn array_input_spans_consecutive_locations() {
        let (bindings, attributes) = vertex_input_state(&[input(2, VertexFormat::Float4, 4)]);

        assert_eq!(attributes.len(), 4);
        assert_eq!(bindings[0].stride, 64);
        for (element, attribute) in attributes.iter().enumerate() {
            assert_eq!(attribute.location, 2 + element as u32);
            assert_eq!(attribute.offset, 16 * element as u32);
        }
    }

    #[test]
    fn no_inputs_mean_no_binding() {
        let (bindings, attributes) = vertex_input_state(&[]);
        assert!(bindings.is_empty());
        assert!(attributes.is_empty());
    }
}
