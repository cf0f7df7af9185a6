pub mod frame_loop;
pub mod surface;

#[cfg(test)]
mod mock_surface;

use std::path::PathBuf;

use color_eyre::Result;

use crate::app::frame_loop::FrameStats;
use crate::app::surface::{SurfaceProvider, WinitSurface};
use crate::renderer::{
    GraphicsContext, RenderBackend, RenderConfig, RenderPipelineHandle, ShaderModuleHandle,
    ShaderStage, shader,
};

#[derive(Debug, Clone)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub resizable: bool,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Vulkan Engine".to_owned(),
            width: 800,
            height: 600,
            resizable: false,
        }
    }
}

/// Locations of the triangle's shader sources, relative to the working directory
#[derive(Debug, Clone)]
pub struct ShaderPaths {
    pub vertex: PathBuf,
    pub fragment: PathBuf,
}

impl Default for ShaderPaths {
    fn default() -> Self {
        Self {
            vertex: PathBuf::from("shaders/triangle.vert"),
            fragment: PathBuf::from("shaders/triangle.frag"),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    pub window: WindowConfig,
    pub shaders: ShaderPaths,
    pub render: RenderConfig,
}

/// The shader modules and pipeline that draw the triangle.
///
/// Both modules stay alive in the context for as long as the pipeline does.
pub struct TrianglePipeline {
    pub vertex: ShaderModuleHandle,
    pub fragment: ShaderModuleHandle,
    pub pipeline: RenderPipelineHandle,
}

impl TrianglePipeline {
    pub fn setup<B: RenderBackend>(
        ctx: &mut GraphicsContext<B>,
        paths: &ShaderPaths,
    ) -> Result<Self> {
        let vertex_source = shader::read_source(&paths.vertex);
        let vertex = ctx.create_shader_module(
            &vertex_source,
            ShaderStage::Vertex,
            &paths.vertex.to_string_lossy(),
        )?;

        let fragment_source = shader::read_source(&paths.fragment);
        let fragment = ctx.create_shader_module(
            &fragment_source,
            ShaderStage::Fragment,
            &paths.fragment.to_string_lossy(),
        )?;

        let format = ctx.swapchain_format();
        let pipeline = ctx.create_render_pipeline(vertex, fragment, format, "triangle")?;

        Ok(Self {
            vertex,
            fragment,
            pipeline,
        })
    }
}

pub struct App {
    config: AppConfig,
    surface: WinitSurface,
}

impl App {
    /// Opens the window. Fails before any GPU state exists if the windowing subsystem or the
    /// window cannot be created.
    pub fn new(config: AppConfig) -> Result<Self> {
        let surface = WinitSurface::new(&config.window)?;
        Ok(Self { config, surface })
    }

    /// Creates the graphics context and renders until the window is closed.
    ///
    /// The context is destroyed before this returns; the window goes with `self`.
    pub fn run(mut self) -> Result<FrameStats> {
        let (width, height) = self.surface.framebuffer_size();
        let ctx = GraphicsContext::create(
            self.surface.window()?,
            width,
            height,
            self.config.render.clone(),
        )?;

        render(ctx, &mut self.surface, &self.config.shaders)
    }
}

/// Builds the triangle pipeline and runs the frame loop. Consumes the context so it is torn
/// down before the caller's surface, whether rendering succeeded or not.
fn render<B, S>(
    mut ctx: GraphicsContext<B>,
    surface: &mut S,
    shaders: &ShaderPaths,
) -> Result<FrameStats>
where
    B: RenderBackend,
    S: SurfaceProvider,
{
    let triangle = TrianglePipeline::setup(&mut ctx, shaders)?;
    frame_loop::run(&mut ctx, surface, triangle.pipeline)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::mock_surface::{MockSurface, Step, escape};
    use crate::app::surface::KeyAction;
    use crate::renderer::RenderError;
    use crate::renderer::mock::{Call, MockBackend};

    fn bundled_shaders() -> ShaderPaths {
        let root = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
        ShaderPaths {
            vertex: root.join("shaders/triangle.vert"),
            fragment: root.join("shaders/triangle.frag"),
        }
    }

    #[test]
    fn default_config_opens_an_800_by_600_window() {
        let config = AppConfig::default();
        assert_eq!(config.window.title, "Vulkan Engine");
        assert_eq!((config.window.width, config.window.height), (800, 600));
        assert!(!config.window.resizable);
        assert_eq!(config.shaders.vertex, PathBuf::from("shaders/triangle.vert"));
        assert_eq!(config.shaders.fragment, PathBuf::from("shaders/triangle.frag"));
    }

    #[test]
    fn missing_vertex_shader_aborts_before_the_loop() {
        let backend = MockBackend::new(800, 600);
        let log = backend.log();
        let ctx = GraphicsContext::with_backend(backend, RenderConfig::default());
        let mut surface = MockSurface::new(vec![Step::sized(800, 600)]);
        let shaders = ShaderPaths {
            vertex: PathBuf::from("does/not/exist.vert"),
            ..bundled_shaders()
        };

        let report = render(ctx, &mut surface, &shaders).unwrap_err();

        assert!(matches!(
            report.downcast_ref::<RenderError>(),
            Some(RenderError::EmptyShaderSource { .. })
        ));
        assert_eq!(surface.polls, 0);
        // The context was still created, so it is still torn down
        assert_eq!(*log.borrow(), vec![Call::WaitIdle]);
    }

    #[test]
    fn escape_tears_down_the_context_while_the_surface_is_alive() {
        let backend = MockBackend::new(800, 600);
        let log = backend.log();
        let ctx = GraphicsContext::with_backend(backend, RenderConfig::default());
        let mut surface = MockSurface::new(vec![
            Step::sized(800, 600),
            Step::sized(800, 600).with_event(escape(KeyAction::Press)),
        ]);

        let stats = render(ctx, &mut surface, &bundled_shaders()).unwrap();

        assert_eq!(stats.frames_rendered, 2);
        assert!(surface.should_close());
        let log = log.borrow();
        assert_eq!(
            log[log.len() - 4..],
            [
                Call::WaitIdle,
                Call::DestroyRenderPipeline(1),
                Call::DestroyShaderModule(1),
                Call::DestroyShaderModule(2),
            ]
        );
    }
}
