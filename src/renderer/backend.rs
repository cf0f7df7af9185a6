use color_eyre::Result;
use glam::Vec4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

/// Color formats a swapchain image or a pipeline color target can have
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColorFormat {
    Bgra8Srgb,
    Rgba8Srgb,
    Bgra8Unorm,
    Rgba8Unorm,
}

/// What happens to the color target when a rendering pass begins
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LoadOp {
    Clear(Vec4),
}

/// Presentable image handed out by the backend for one frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapchainImage {
    pub index: u32,
    pub width: u32,
    pub height: u32,
}

/// The device-side half of the renderer.
///
/// `GraphicsContext` owns exactly one backend and drives it from a single thread. The context
/// enforces ordering and handle validity, so implementations can assume every call they
/// receive is legal: a successful `prepare_frame` precedes `begin_command_buffer`, which is
/// followed by at most one image acquisition, one begin/bind/draw/end sequence and one
/// `submit`, in that order.
pub trait RenderBackend {
    type ShaderModule;
    type Pipeline;
    type CommandBuffer;

    fn swapchain_format(&self) -> ColorFormat;

    fn swapchain_extent(&self) -> (u32, u32);

    /// Retargets the swapchain to a new drawable size. Never called with a zero dimension.
    /// Implementations may defer the recreation to the next `prepare_frame`.
    fn resize_swapchain(&mut self, width: u32, height: u32) -> Result<()>;

    fn create_shader_module(
        &mut self,
        spirv: &[u32],
        stage: ShaderStage,
        label: &str,
    ) -> Result<Self::ShaderModule>;

    fn create_render_pipeline(
        &mut self,
        vertex: &Self::ShaderModule,
        fragment: &Self::ShaderModule,
        color_format: ColorFormat,
        label: &str,
    ) -> Result<Self::Pipeline>;

    fn destroy_shader_module(&mut self, module: Self::ShaderModule);

    fn destroy_render_pipeline(&mut self, pipeline: Self::Pipeline);

    /// Waits until the previous frame's work has retired and readies the swapchain for the next
    /// one. Returns `false` when the surface currently has no presentable area; nothing is
    /// acquired and the frame must be skipped.
    fn prepare_frame(&mut self) -> Result<bool>;

    fn begin_command_buffer(&mut self) -> Result<Self::CommandBuffer>;

    fn acquire_swapchain_image(&mut self, cmd: &Self::CommandBuffer) -> Result<SwapchainImage>;

    fn cmd_begin_rendering(
        &mut self,
        cmd: &Self::CommandBuffer,
        target: &SwapchainImage,
        load_op: LoadOp,
    );

    fn cmd_bind_render_pipeline(&mut self, cmd: &Self::CommandBuffer, pipeline: &Self::Pipeline);

    fn cmd_draw(&mut self, cmd: &Self::CommandBuffer, vertex_count: u32);

    fn cmd_end_rendering(&mut self, cmd: &Self::CommandBuffer, target: &SwapchainImage);

    /// Closes recording, executes the work and presents `target`.
    fn submit(&mut self, cmd: Self::CommandBuffer, target: &SwapchainImage) -> Result<()>;

    fn wait_idle(&mut self) -> Result<()>;
}
