use color_eyre::Result;

use crate::renderer::backend::{ColorFormat, LoadOp, RenderBackend, SwapchainImage};
use crate::renderer::context::{GraphicsContext, RenderPipelineHandle};
use crate::renderer::error::RenderError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordingState {
    Idle,
    Rendering,
    PipelineBound,
    Drawn,
    Ended,
    Submitted,
}

/// Presentable image for one frame. Only valid for the command buffer it was acquired with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapchainTexture {
    pub(crate) image: SwapchainImage,
    pub(crate) frame: u64,
    pub format: ColorFormat,
}

impl SwapchainTexture {
    pub fn size(&self) -> (u32, u32) {
        (self.image.width, self.image.height)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorAttachment {
    pub texture: SwapchainTexture,
    pub load_op: LoadOp,
}

/// Records a single dynamic-rendering pass for one frame.
///
/// Calls must follow `begin_rendering`, `bind_render_pipeline`, `draw`, `end_rendering` and
/// `submit`, in that order.
/// Anything else returns [`RenderError::CommandOrder`] and leaves the state untouched.
pub struct CommandBuffer<'a, B: RenderBackend> {
    ctx: &'a mut GraphicsContext<B>,
    raw: Option<B::CommandBuffer>,
    state: RecordingState,
    frame: u64,
    texture: Option<SwapchainTexture>,
}

impl<'a, B: RenderBackend> CommandBuffer<'a, B> {
    pub(crate) fn new(ctx: &'a mut GraphicsContext<B>, raw: B::CommandBuffer, frame: u64) -> Self {
        Self {
            ctx,
            raw: Some(raw),
            state: RecordingState::Idle,
            frame,
            texture: None,
        }
    }

    pub fn state(&self) -> RecordingState {
        self.state
    }

    /// Acquires this frame's presentable image. Repeated calls within the frame return the
    /// same texture.
    pub fn swapchain_texture(&mut self) -> Result<SwapchainTexture> {
        if let Some(texture) = self.texture {
            return Ok(texture);
        }
        self.expect_state("acquire a swapchain texture", RecordingState::Idle)?;

        let Some(raw) = self.raw.as_ref() else {
            return Err(self.order_error("acquire a swapchain texture").into());
        };
        let image = self.ctx.backend.acquire_swapchain_image(raw)?;
        let texture = SwapchainTexture {
            image,
            frame: self.frame,
            format: self.ctx.backend.swapchain_format(),
        };
        self.texture = Some(texture);
        Ok(texture)
    }

    pub fn begin_rendering(&mut self, attachment: ColorAttachment) -> Result<()> {
        self.expect_state("begin rendering", RecordingState::Idle)?;
        self.check_texture(&attachment.texture)?;

        let Some(raw) = self.raw.as_ref() else {
            return Err(self.order_error("begin rendering").into());
        };
        self.ctx
            .backend
            .cmd_begin_rendering(raw, &attachment.texture.image, attachment.load_op);
        self.state = RecordingState::Rendering;
        Ok(())
    }

    pub fn bind_render_pipeline(&mut self, pipeline: RenderPipelineHandle) -> Result<()> {
        self.expect_state("bind a render pipeline", RecordingState::Rendering)?;

        let entry = self
            .ctx
            .pipelines
            .get(pipeline)
            .ok_or(RenderError::InvalidRenderPipeline)?;
        let target_format = self.texture.map(|t| t.format);
        if let Some(swapchain) = target_format.filter(|f| *f != entry.format) {
            return Err(RenderError::StalePipeline {
                pipeline: entry.format,
                swapchain,
            }
            .into());
        }

        let Some(raw) = self.raw.as_ref() else {
            return Err(self.order_error("bind a render pipeline").into());
        };
        self.ctx.backend.cmd_bind_render_pipeline(raw, &entry.pipeline);
        self.state = RecordingState::PipelineBound;
        Ok(())
    }

    pub fn draw(&mut self, vertex_count: u32) -> Result<()> {
        self.expect_state("draw", RecordingState::PipelineBound)?;

        let Some(raw) = self.raw.as_ref() else {
            return Err(self.order_error("draw").into());
        };
        self.ctx.backend.cmd_draw(raw, vertex_count);
        self.state = RecordingState::Drawn;
        Ok(())
    }

    pub fn end_rendering(&mut self) -> Result<()> {
        self.expect_state("end rendering", RecordingState::Drawn)?;
        let (Some(raw), Some(texture)) = (self.raw.as_ref(), self.texture.as_ref()) else {
            return Err(self.order_error("end rendering").into());
        };
        let image = texture.image;
        self.ctx.backend.cmd_end_rendering(raw, &image);
        self.state = RecordingState::Ended;
        Ok(())
    }

    /// Hands the recorded work to the device and presents `texture`. The command buffer is
    /// consumed either way.
    pub fn submit(mut self, texture: SwapchainTexture) -> Result<()> {
        self.expect_state("submit", RecordingState::Ended)?;
        self.check_texture(&texture)?;

        let Some(raw) = self.raw.take() else {
            return Err(self.order_error("submit").into());
        };
        self.state = RecordingState::Submitted;
        self.ctx.backend.submit(raw, &texture.image)
    }

    fn expect_state(&self, operation: &'static str, expected: RecordingState) -> Result<()> {
        if self.state != expected {
            return Err(self.order_error(operation).into());
        }
        Ok(())
    }

    fn order_error(&self, operation: &'static str) -> RenderError {
        RenderError::CommandOrder {
            operation,
            state: self.state,
        }
    }

    fn check_texture(&self, texture: &SwapchainTexture) -> Result<()> {
        let acquired = self.texture.as_ref() == Some(texture);
        if texture.frame != self.frame || !acquired {
            return Err(RenderError::StaleSwapchainTexture {
                texture_frame: texture.frame,
                current_frame: self.frame,
            }
            .into());
        }
        Ok(())
    }
}

impl<B: RenderBackend> Drop for CommandBuffer<'_, B> {
    fn drop(&mut self) {
        if self.raw.is_some() {
            log::warn!(
                "Dropping command buffer for frame {} without submitting ({:?})",
                self.frame,
                self.state
            );
        }
    }
}
