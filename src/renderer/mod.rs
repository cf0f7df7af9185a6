pub mod backend;
pub mod command_buffer;
pub mod config;
pub mod context;
pub mod error;
pub mod shader;

mod vk;

#[cfg(test)]
pub(crate) mod mock;

pub use backend::{ColorFormat, LoadOp, RenderBackend, ShaderStage};
pub use command_buffer::{ColorAttachment, CommandBuffer, RecordingState, SwapchainTexture};
pub use config::RenderConfig;
pub use context::{GraphicsContext, RenderPipelineHandle, ShaderModuleHandle};
pub use error::RenderError;
pub use vk::VulkanBackend;
