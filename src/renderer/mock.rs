//! Recording backend used by the unit tests. Every call is appended to a shared log so tests
//! can assert on ordering after the backend has been moved into a context.

use std::cell::RefCell;
use std::rc::Rc;

use color_eyre::Result;
use color_eyre::eyre::eyre;

use crate::renderer::backend::{ColorFormat, LoadOp, RenderBackend, ShaderStage, SwapchainImage};

pub const TRIANGLE_VERT: &str = include_str!("../../shaders/triangle.vert");
pub const TRIANGLE_FRAG: &str = include_str!("../../shaders/triangle.frag");

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    CreateShaderModule(ShaderStage, String),
    CreateRenderPipeline(ColorFormat),
    DestroyShaderModule(u32),
    DestroyRenderPipeline(u32),
    ResizeSwapchain(u32, u32),
    BeginCommandBuffer(u32),
    AcquireSwapchainImage(u32),
    BeginRendering(u32),
    BindRenderPipeline(u32),
    Draw(u32),
    EndRendering(u32),
    Submit(u32, u32),
    WaitIdle,
}

pub type CallLog = Rc<RefCell<Vec<Call>>>;

pub struct MockBackend {
    log: CallLog,
    format: ColorFormat,
    format_after_resize: Option<ColorFormat>,
    extent: (u32, u32),
    image_count: u32,
    next_image: u32,
    next_module: u32,
    next_pipeline: u32,
    next_command_buffer: u32,
    fail_submit_at: Option<u32>,
    unpresentable_frames: u32,
    failing_wait_idles: u32,
}

impl MockBackend {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            log: Rc::new(RefCell::new(Vec::new())),
            format: ColorFormat::Bgra8Srgb,
            format_after_resize: None,
            extent: (width, height),
            image_count: 3,
            next_image: 0,
            next_module: 0,
            next_pipeline: 0,
            next_command_buffer: 0,
            fail_submit_at: None,
            unpresentable_frames: 0,
            failing_wait_idles: 0,
        }
    }

    pub fn with_format_after_resize(mut self, format: ColorFormat) -> Self {
        self.format_after_resize = Some(format);
        self
    }

    /// Makes the n-th submitted command buffer (1-based) fail.
    pub fn with_failing_submit(mut self, command_buffer: u32) -> Self {
        self.fail_submit_at = Some(command_buffer);
        self
    }

    /// Makes the next `frames` calls to `prepare_frame` report a surface without area.
    pub fn with_unpresentable_frames(mut self, frames: u32) -> Self {
        self.unpresentable_frames = frames;
        self
    }

    /// Makes the next `count` calls to `wait_idle` fail.
    pub fn with_failing_wait_idle(mut self, count: u32) -> Self {
        self.failing_wait_idles = count;
        self
    }

    pub fn log(&self) -> CallLog {
        self.log.clone()
    }

    fn record(&self, call: Call) {
        self.log.borrow_mut().push(call);
    }
}

impl RenderBackend for MockBackend {
    type ShaderModule = u32;
    type Pipeline = u32;
    type CommandBuffer = u32;

    fn swapchain_format(&self) -> ColorFormat {
        self.format
    }

    fn swapchain_extent(&self) -> (u32, u32) {
        self.extent
    }

    fn resize_swapchain(&mut self, width: u32, height: u32) -> Result<()> {
        self.record(Call::ResizeSwapchain(width, height));
        self.extent = (width, height);
        if let Some(format) = self.format_after_resize {
            self.format = format;
        }
        Ok(())
    }

    fn create_shader_module(
        &mut self,
        spirv: &[u32],
        stage: ShaderStage,
        label: &str,
    ) -> Result<u32> {
        if spirv.is_empty() {
            return Err(eyre!("Empty SPIR-V for '{}'", label));
        }
        self.record(Call::CreateShaderModule(stage, label.to_owned()));
        self.next_module += 1;
        Ok(self.next_module)
    }

    fn create_render_pipeline(
        &mut self,
        _vertex: &u32,
        _fragment: &u32,
        color_format: ColorFormat,
        _label: &str,
    ) -> Result<u32> {
        self.record(Call::CreateRenderPipeline(color_format));
        self.next_pipeline += 1;
        Ok(self.next_pipeline)
    }

    fn destroy_shader_module(&mut self, module: u32) {
        self.record(Call::DestroyShaderModule(module));
    }

    fn destroy_render_pipeline(&mut self, pipeline: u32) {
        self.record(Call::DestroyRenderPipeline(pipeline));
    }

    fn prepare_frame(&mut self) -> Result<bool> {
        if self.unpresentable_frames > 0 {
            self.unpresentable_frames -= 1;
            return Ok(false);
        }
        Ok(true)
    }

    fn begin_command_buffer(&mut self) -> Result<u32> {
        self.next_command_buffer += 1;
        self.record(Call::BeginCommandBuffer(self.next_command_buffer));
        Ok(self.next_command_buffer)
    }

    fn acquire_swapchain_image(&mut self, _cmd: &u32) -> Result<SwapchainImage> {
        let index = self.next_image;
        self.next_image = (self.next_image + 1) % self.image_count;
        self.record(Call::AcquireSwapchainImage(index));
        Ok(SwapchainImage {
            index,
            width: self.extent.0,
            height: self.extent.1,
        })
    }

    fn cmd_begin_rendering(&mut self, _cmd: &u32, target: &SwapchainImage, _load_op: LoadOp) {
        self.record(Call::BeginRendering(target.index));
    }

    fn cmd_bind_render_pipeline(&mut self, _cmd: &u32, pipeline: &u32) {
        self.record(Call::BindRenderPipeline(*pipeline));
    }

    fn cmd_draw(&mut self, _cmd: &u32, vertex_count: u32) {
        self.record(Call::Draw(vertex_count));
    }

    fn cmd_end_rendering(&mut self, _cmd: &u32, target: &SwapchainImage) {
        self.record(Call::EndRendering(target.index));
    }

    fn submit(&mut self, cmd: u32, target: &SwapchainImage) -> Result<()> {
        if self.fail_submit_at == Some(cmd) {
            return Err(eyre!("Device lost while submitting command buffer {}", cmd));
        }
        self.record(Call::Submit(cmd, target.index));
        Ok(())
    }

    fn wait_idle(&mut self) -> Result<()> {
        if self.failing_wait_idles > 0 {
            self.failing_wait_idles -= 1;
            return Err(eyre!("Device lost while waiting for idle"));
        }
        self.record(Call::WaitIdle);
        Ok(())
    }
}
