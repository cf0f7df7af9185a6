use color_eyre::Result;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use slotmap::{SlotMap, new_key_type};

use crate::renderer::backend::{ColorFormat, RenderBackend, ShaderStage};
use crate::renderer::command_buffer::CommandBuffer;
use crate::renderer::config::RenderConfig;
use crate::renderer::error::RenderError;
use crate::renderer::shader;
use crate::renderer::vk::VulkanBackend;

new_key_type! {
    pub struct ShaderModuleHandle;
    pub struct RenderPipelineHandle;
}

struct ShaderModuleEntry<M> {
    module: M,
    stage: ShaderStage,
    label: String,
}

pub(crate) struct PipelineEntry<P> {
    pub pipeline: P,
    pub format: ColorFormat,
    vertex: ShaderModuleHandle,
    fragment: ShaderModuleHandle,
}

/// Owns the device connection and the swapchain, plus every GPU object created through it.
///
/// Shader modules and pipelines live in arenas inside the context; callers only hold keys.
/// Dropping the context waits for the device to go idle, destroys pipelines, then shader
/// modules, then the backend itself.
pub struct GraphicsContext<B: RenderBackend> {
    pub(crate) backend: B,
    pub(crate) config: RenderConfig,

    shader_modules: SlotMap<ShaderModuleHandle, ShaderModuleEntry<B::ShaderModule>>,
    pub(crate) pipelines: SlotMap<RenderPipelineHandle, PipelineEntry<B::Pipeline>>,

    extent: (u32, u32),
    frame_index: u64,
    frame_prepared: bool,
}

impl GraphicsContext<VulkanBackend> {
    pub fn create<W>(
        window: &W,
        width: u32,
        height: u32,
        config: RenderConfig,
    ) -> Result<Self>
    where
        W: HasDisplayHandle + HasWindowHandle,
    {
        let backend = VulkanBackend::new(window, width, height, &config)?;
        Ok(Self::with_backend(backend, config))
    }
}

impl<B: RenderBackend> GraphicsContext<B> {
    pub fn with_backend(backend: B, config: RenderConfig) -> Self {
        let extent = backend.swapchain_extent();
        Self {
            backend,
            config,
            shader_modules: SlotMap::with_key(),
            pipelines: SlotMap::with_key(),
            extent,
            frame_index: 0,
            frame_prepared: false,
        }
    }

    pub fn swapchain_format(&self) -> ColorFormat {
        self.backend.swapchain_format()
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    pub fn create_shader_module(
        &mut self,
        source: &str,
        stage: ShaderStage,
        label: &str,
    ) -> Result<ShaderModuleHandle> {
        let spirv = shader::compile_glsl(source, stage, label)?;
        let module = self.backend.create_shader_module(&spirv, stage, label)?;

        Ok(self.shader_modules.insert(ShaderModuleEntry {
            module,
            stage,
            label: label.to_owned(),
        }))
    }

    pub fn create_render_pipeline(
        &mut self,
        vertex: ShaderModuleHandle,
        fragment: ShaderModuleHandle,
        color_format: ColorFormat,
        label: &str,
    ) -> Result<RenderPipelineHandle> {
        let swapchain_format = self.backend.swapchain_format();
        if color_format != swapchain_format {
            return Err(RenderError::FormatMismatch {
                requested: color_format,
                swapchain: swapchain_format,
            }
            .into());
        }

        let vertex_entry = Self::module_entry(&self.shader_modules, vertex, ShaderStage::Vertex)?;
        let fragment_entry =
            Self::module_entry(&self.shader_modules, fragment, ShaderStage::Fragment)?;

        let pipeline = self.backend.create_render_pipeline(
            &vertex_entry.module,
            &fragment_entry.module,
            color_format,
            label,
        )?;
        log::info!("Created render pipeline '{}' targeting {:?}", label, color_format);

        Ok(self.pipelines.insert(PipelineEntry {
            pipeline,
            format: color_format,
            vertex,
            fragment,
        }))
    }

    /// Destroys a shader module. Modules still referenced by a live pipeline are kept.
    pub fn release_shader_module(&mut self, handle: ShaderModuleHandle) -> Result<()> {
        let label = match self.shader_modules.get(handle) {
            Some(entry) => entry.label.clone(),
            None => return Err(RenderError::InvalidShaderModule.into()),
        };
        let in_use = self
            .pipelines
            .values()
            .any(|p| p.vertex == handle || p.fragment == handle);
        if in_use {
            return Err(RenderError::ShaderModuleInUse { label }.into());
        }

        if let Some(entry) = self.shader_modules.remove(handle) {
            self.backend.destroy_shader_module(entry.module);
        }
        Ok(())
    }

    /// Destroys a pipeline once the device has stopped using it. If waiting fails the pipeline
    /// stays in the context and is destroyed on drop.
    pub fn release_render_pipeline(&mut self, handle: RenderPipelineHandle) -> Result<()> {
        if !self.pipelines.contains_key(handle) {
            return Err(RenderError::InvalidRenderPipeline.into());
        }
        self.backend.wait_idle()?;

        if let Some(entry) = self.pipelines.remove(handle) {
            self.backend.destroy_render_pipeline(entry.pipeline);
        }
        Ok(())
    }

    /// Brings the swapchain in line with the drawable size.
    ///
    /// Degenerate sizes and unchanged sizes are no-ops. Fails if the recreated swapchain no
    /// longer matches the color format a live pipeline was built for.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<bool> {
        if width == 0 || height == 0 || self.extent == (width, height) {
            return Ok(false);
        }

        self.backend.resize_swapchain(width, height)?;
        self.extent = (width, height);
        self.check_pipeline_formats()?;

        log::debug!("Swapchain resized to {}x{}", width, height);
        Ok(true)
    }

    /// Waits for the previous frame and readies the swapchain for the next one.
    ///
    /// Returns `false` when the surface has no presentable area even though the window reports
    /// a non-zero size. That frame must be skipped like any other degenerate frame.
    pub fn prepare_frame(&mut self) -> Result<bool> {
        if self.frame_prepared {
            return Ok(true);
        }
        if !self.backend.prepare_frame()? {
            return Ok(false);
        }
        self.check_pipeline_formats()?;

        self.frame_prepared = true;
        Ok(true)
    }

    /// Opens the one command buffer for a new frame. The returned handle borrows the context,
    /// so a second buffer cannot exist until this one is submitted or dropped.
    ///
    /// Prepares the frame first if [`Self::prepare_frame`] was not called.
    pub fn acquire_command_buffer(&mut self) -> Result<CommandBuffer<'_, B>> {
        if !self.prepare_frame()? {
            return Err(RenderError::SurfaceUnavailable.into());
        }
        self.frame_prepared = false;

        let raw = self.backend.begin_command_buffer()?;
        self.frame_index += 1;
        let frame = self.frame_index;
        Ok(CommandBuffer::new(self, raw, frame))
    }

    fn check_pipeline_formats(&self) -> Result<(), RenderError> {
        let swapchain_format = self.backend.swapchain_format();
        match self.pipelines.values().find(|p| p.format != swapchain_format) {
            Some(stale) => Err(RenderError::StalePipeline {
                pipeline: stale.format,
                swapchain: swapchain_format,
            }),
            None => Ok(()),
        }
    }

    fn module_entry<'m>(
        modules: &'m SlotMap<ShaderModuleHandle, ShaderModuleEntry<B::ShaderModule>>,
        handle: ShaderModuleHandle,
        expected: ShaderStage,
    ) -> Result<&'m ShaderModuleEntry<B::ShaderModule>, RenderError> {
        let entry = modules.get(handle).ok_or(RenderError::InvalidShaderModule)?;
        if entry.stage != expected {
            return Err(RenderError::ShaderStageMismatch {
                label: entry.label.clone(),
                expected,
                actual: entry.stage,
            });
        }
        Ok(entry)
    }
}

impl<B: RenderBackend> Drop for GraphicsContext<B> {
    fn drop(&mut self) {
        if let Err(e) = self.backend.wait_idle() {
            log::error!("Failed to wait for device idle during shutdown: {e}");
        }

        for (_, entry) in self.pipelines.drain() {
            self.backend.destroy_render_pipeline(entry.pipeline);
        }
        for (_, entry) in self.shader_modules.drain() {
            self.backend.destroy_shader_module(entry.module);
        }

        log::debug!("Graphics context destroyed after {} frames", self.frame_index);
    }
}
