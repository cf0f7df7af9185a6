use thiserror::Error;

use crate::renderer::backend::{ColorFormat, ShaderStage};
use crate::renderer::command_buffer::RecordingState;

/// Contract violations raised by the graphics context and the command buffer.
///
/// These travel inside an `eyre::Report` like every other failure; callers that need to
/// tell them apart use `report.downcast_ref::<RenderError>()`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RenderError {
    #[error("Shader source for '{label}' is empty")]
    EmptyShaderSource { label: String },

    #[error("Failed to compile {stage:?} shader '{label}': {message}")]
    ShaderCompilation {
        label: String,
        stage: ShaderStage,
        message: String,
    },

    #[error("Shader module handle is not valid in this context")]
    InvalidShaderModule,

    #[error("Render pipeline handle is not valid in this context")]
    InvalidRenderPipeline,

    #[error("Shader module '{label}' is a {actual:?} shader, expected {expected:?}")]
    ShaderStageMismatch {
        label: String,
        expected: ShaderStage,
        actual: ShaderStage,
    },

    #[error("Pipeline color format {requested:?} does not match swapchain format {swapchain:?}")]
    FormatMismatch {
        requested: ColorFormat,
        swapchain: ColorFormat,
    },

    #[error("Pipeline was built for {pipeline:?} but the swapchain is now {swapchain:?}")]
    StalePipeline {
        pipeline: ColorFormat,
        swapchain: ColorFormat,
    },

    #[error("Shader module '{label}' is still referenced by a render pipeline")]
    ShaderModuleInUse { label: String },

    #[error("Cannot {operation} while the command buffer is {state:?}")]
    CommandOrder {
        operation: &'static str,
        state: RecordingState,
    },

    #[error("Surface has no presentable area, the frame cannot be recorded")]
    SurfaceUnavailable,

    #[error("Swapchain texture from frame {texture_frame} used during frame {current_frame}")]
    StaleSwapchainTexture {
        texture_frame: u64,
        current_frame: u64,
    },
}
