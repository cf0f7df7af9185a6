use ash::vk;
use color_eyre::Result;
use color_eyre::eyre::{OptionExt, eyre};

/// Graphics pipeline targeting a single color attachment through dynamic rendering
pub struct VulkanPipeline {
    pub pipeline: vk::Pipeline,
    pub layout: vk::PipelineLayout,
}

impl VulkanPipeline {
    /// # Safety
    /// The pipeline must not be referenced by pending command buffers.
    pub unsafe fn destroy(&self, device: &ash::Device) {
        unsafe {
            device.destroy_pipeline(self.pipeline, None);
            device.destroy_pipeline_layout(self.layout, None);
        }
    }
}

pub struct GraphicsPipelineBuilder<'a> {
    device: &'a ash::Device,

    vertex_shader: Option<vk::ShaderModule>,
    fragment_shader: Option<vk::ShaderModule>,
    input_assembly: vk::PipelineInputAssemblyStateCreateInfo<'static>,
    rasterization: vk::PipelineRasterizationStateCreateInfo<'static>,
    multisample: vk::PipelineMultisampleStateCreateInfo<'static>,
    color_blend_attachment: vk::PipelineColorBlendAttachmentState,
    color_attachment_format: vk::Format,
}

impl<'a> GraphicsPipelineBuilder<'a> {
    pub fn new(device: &'a ash::Device) -> Self {
        Self {
            device,

            vertex_shader: None,
            fragment_shader: None,
            input_assembly: Self::default_input_assembly_info(),
            rasterization: Self::default_rasterization_info(),
            multisample: Self::default_multisample_info(),
            color_blend_attachment: Self::default_color_blend_state(),
            color_attachment_format: vk::Format::UNDEFINED,
        }
    }

    pub fn with_shaders(mut self, vertex: vk::ShaderModule, fragment: vk::ShaderModule) -> Self {
        self.vertex_shader = Some(vertex);
        self.fragment_shader = Some(fragment);
        self
    }

    pub fn with_input_topology(mut self, topology: vk::PrimitiveTopology) -> Self {
        self.input_assembly.topology = topology;
        self.input_assembly.primitive_restart_enable = vk::FALSE;
        self
    }

    pub fn with_cull_mode(
        mut self,
        cull_mode: vk::CullModeFlags,
        front_face: vk::FrontFace,
    ) -> Self {
        self.rasterization.cull_mode = cull_mode;
        self.rasterization.front_face = front_face;
        self
    }

    pub fn with_blending_disabled(mut self) -> Self {
        // Default RGBA write mask
        self.color_blend_attachment.color_write_mask = vk::ColorComponentFlags::RGBA;
        // No blending
        self.color_blend_attachment.blend_enable = vk::FALSE;
        self
    }

    pub fn with_color_attachment_format(mut self, format: vk::Format) -> Self {
        self.color_attachment_format = format;
        self
    }

    pub fn build(self) -> Result<VulkanPipeline> {
        let vertex_shader = self
            .vertex_shader
            .ok_or_eyre("No vertex shader provided for GraphicsPipelineBuilder")?;
        let fragment_shader = self
            .fragment_shader
            .ok_or_eyre("No fragment shader provided for GraphicsPipelineBuilder")?;
        if self.color_attachment_format == vk::Format::UNDEFINED {
            return Err(eyre!("No color attachment format provided for GraphicsPipelineBuilder"));
        }

        let layout = unsafe {
            self.device
                .create_pipeline_layout(&vk::PipelineLayoutCreateInfo::default(), None)?
        };

        let stages = [
            vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::VERTEX)
                .module(vertex_shader)
                .name(c"main"),
            vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::FRAGMENT)
                .module(fragment_shader)
                .name(c"main"),
        ];

        // Vertices are generated in the vertex shader
        let vertex_input = vk::PipelineVertexInputStateCreateInfo::default();

        // Viewport and scissor are set per frame, so the pipeline survives swapchain resizes
        let viewport = vk::PipelineViewportStateCreateInfo::default()
            .viewport_count(1)
            .scissor_count(1);
        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state =
            vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

        let color_blend_attachments = [self.color_blend_attachment];
        let color_blend = vk::PipelineColorBlendStateCreateInfo::default()
            .logic_op_enable(false)
            .logic_op(vk::LogicOp::COPY)
            .attachments(&color_blend_attachments);

        let color_attachment_formats = [self.color_attachment_format];
        let mut rendering_info = vk::PipelineRenderingCreateInfo::default()
            .color_attachment_formats(&color_attachment_formats);

        let pipeline_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&self.input_assembly)
            .viewport_state(&viewport)
            .rasterization_state(&self.rasterization)
            .multisample_state(&self.multisample)
            .color_blend_state(&color_blend)
            .dynamic_state(&dynamic_state)
            .layout(layout)
            .push_next(&mut rendering_info);

        let pipelines = unsafe {
            self.device.create_graphics_pipelines(
                vk::PipelineCache::null(),
                std::slice::from_ref(&pipeline_info),
                None,
            )
        };

        match pipelines {
            Ok(pipelines) => Ok(VulkanPipeline {
                pipeline: pipelines[0],
                layout,
            }),
            Err((_, e)) => {
                unsafe {
                    self.device.destroy_pipeline_layout(layout, None);
                }
                Err(eyre!("Failed to create graphics pipeline: {e}"))
            }
        }
    }

    fn default_input_assembly_info() -> vk::PipelineInputAssemblyStateCreateInfo<'static> {
        vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
            .primitive_restart_enable(false)
    }

    fn default_rasterization_info() -> vk::PipelineRasterizationStateCreateInfo<'static> {
        vk::PipelineRasterizationStateCreateInfo::default()
            .depth_clamp_enable(false)
            // Discards all primitives before rasterization stage if true
            .rasterizer_discard_enable(false)
            .polygon_mode(vk::PolygonMode::FILL)
            .line_width(1.0)
            .cull_mode(vk::CullModeFlags::NONE)
            .front_face(vk::FrontFace::CLOCKWISE)
            .depth_bias_enable(false)
    }

    fn default_multisample_info() -> vk::PipelineMultisampleStateCreateInfo<'static> {
        vk::PipelineMultisampleStateCreateInfo::default()
            .sample_shading_enable(false)
            // 1 sample per pixel means no multisampling
            .rasterization_samples(vk::SampleCountFlags::TYPE_1)
            .min_sample_shading(1.0)
            .alpha_to_coverage_enable(false)
            .alpha_to_one_enable(false)
    }

    fn default_color_blend_state() -> vk::PipelineColorBlendAttachmentState {
        // Alpha blending unless the caller opts out
        vk::PipelineColorBlendAttachmentState::default()
            .color_write_mask(vk::ColorComponentFlags::RGBA)
            .blend_enable(true)
            .src_color_blend_factor(vk::BlendFactor::SRC_ALPHA)
            .dst_color_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
            .color_blend_op(vk::BlendOp::ADD)
            .src_alpha_blend_factor(vk::BlendFactor::ONE)
            .dst_alpha_blend_factor(vk::BlendFactor::ZERO)
            .alpha_blend_op(vk::BlendOp::ADD)
    }
}
