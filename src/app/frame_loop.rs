use color_eyre::Result;
use glam::Vec4;
use winit::keyboard::{Key, NamedKey};

use crate::app::surface::{KeyAction, SurfaceEvent, SurfaceProvider};
use crate::renderer::{
    ColorAttachment, GraphicsContext, LoadOp, RenderBackend, RenderPipelineHandle,
};

/// The triangle's vertices are generated in the vertex shader from the vertex index.
pub const TRIANGLE_VERTEX_COUNT: u32 = 3;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FrameStats {
    pub frames_rendered: u64,
    /// Iterations skipped because the drawable or the surface had no area
    pub frames_skipped: u64,
    pub resizes: u64,
}

/// Renders until the surface asks to close.
///
/// Every iteration polls the surface, skips the frame while the drawable is degenerate, brings
/// the swapchain in line with the drawable size and records one frame. A surface that has no
/// area yet while the window still reports a size also skips the frame. The first error stops
/// the loop and is returned as is.
pub fn run<B, S>(
    ctx: &mut GraphicsContext<B>,
    surface: &mut S,
    pipeline: RenderPipelineHandle,
) -> Result<FrameStats>
where
    B: RenderBackend,
    S: SurfaceProvider,
{
    let mut stats = FrameStats::default();
    let clear_color = ctx.config().clear_color;

    while !surface.should_close() {
        for event in surface.poll_events() {
            handle_event(surface, &event);
        }

        let (width, height) = surface.framebuffer_size();
        if width == 0 || height == 0 {
            stats.frames_skipped += 1;
            continue;
        }

        if ctx.resize(width, height)? {
            stats.resizes += 1;
        }
        if !ctx.prepare_frame()? {
            stats.frames_skipped += 1;
            continue;
        }

        record_frame(ctx, pipeline, clear_color)?;
        stats.frames_rendered += 1;
    }

    log::info!(
        "Frame loop finished: {} rendered, {} skipped, {} resizes",
        stats.frames_rendered,
        stats.frames_skipped,
        stats.resizes
    );
    Ok(stats)
}

fn handle_event<S: SurfaceProvider>(surface: &mut S, event: &SurfaceEvent) {
    match event {
        SurfaceEvent::CloseRequested => surface.set_close_requested(),
        SurfaceEvent::Key {
            key: Key::Named(NamedKey::Escape),
            action: KeyAction::Press,
        } => {
            log::debug!("Escape pressed, closing");
            surface.set_close_requested();
        }
        _ => {}
    }
}

/// Records and submits one frame: clear, bind, draw the triangle.
pub fn record_frame<B: RenderBackend>(
    ctx: &mut GraphicsContext<B>,
    pipeline: RenderPipelineHandle,
    clear_color: Vec4,
) -> Result<()> {
    let mut cmd = ctx.acquire_command_buffer()?;
    let texture = cmd.swapchain_texture()?;

    cmd.begin_rendering(ColorAttachment {
        texture,
        load_op: LoadOp::Clear(clear_color),
    })?;
    cmd.bind_render_pipeline(pipeline)?;
    cmd.draw(TRIANGLE_VERTEX_COUNT)?;
    cmd.end_rendering()?;

    cmd.submit(texture)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::mock_surface::{MockSurface, Step, character, escape};
    use crate::renderer::mock::{Call, CallLog, MockBackend, TRIANGLE_FRAG, TRIANGLE_VERT};
    use crate::renderer::{RenderConfig, ShaderStage};

    fn triangle_context(
        backend: MockBackend,
    ) -> (GraphicsContext<MockBackend>, RenderPipelineHandle, CallLog) {
        let log = backend.log();
        let mut ctx = GraphicsContext::with_backend(backend, RenderConfig::default());
        let vert = ctx
            .create_shader_module(TRIANGLE_VERT, ShaderStage::Vertex, "triangle.vert")
            .unwrap();
        let frag = ctx
            .create_shader_module(TRIANGLE_FRAG, ShaderStage::Fragment, "triangle.frag")
            .unwrap();
        let format = ctx.swapchain_format();
        let pipeline = ctx
            .create_render_pipeline(vert, frag, format, "triangle")
            .unwrap();
        log.borrow_mut().clear();
        (ctx, pipeline, log)
    }

    fn count(log: &CallLog, pred: impl Fn(&Call) -> bool) -> usize {
        log.borrow().iter().filter(|call| pred(call)).count()
    }

    fn acquisitions(log: &CallLog) -> usize {
        count(log, |call| matches!(call, Call::BeginCommandBuffer(_)))
    }

    #[test]
    fn renders_one_command_buffer_per_frame_until_closed() {
        let (mut ctx, pipeline, log) = triangle_context(MockBackend::new(800, 600));
        let mut surface = MockSurface::new(vec![
            Step::sized(800, 600),
            Step::sized(800, 600),
            Step::sized(800, 600).closing(),
        ]);

        let stats = run(&mut ctx, &mut surface, pipeline).unwrap();

        assert_eq!(
            stats,
            FrameStats {
                frames_rendered: 3,
                frames_skipped: 0,
                resizes: 0,
            }
        );
        assert!(surface.should_close());

        let log = log.borrow();
        let frames: Vec<&[Call]> = log.chunks(7).collect();
        assert_eq!(frames.len(), 3);
        for (i, frame) in frames.iter().enumerate() {
            let cmd = i as u32 + 1;
            let image = i as u32;
            assert_eq!(
                *frame,
                [
                    Call::BeginCommandBuffer(cmd),
                    Call::AcquireSwapchainImage(image),
                    Call::BeginRendering(image),
                    Call::BindRenderPipeline(1),
                    Call::Draw(3),
                    Call::EndRendering(image),
                    Call::Submit(cmd, image),
                ]
            );
        }
    }

    #[test]
    fn minimized_frames_never_reach_the_context() {
        let (mut ctx, pipeline, log) = triangle_context(MockBackend::new(800, 600));
        let mut script = vec![Step::sized(800, 600)];
        script.extend((0..4).map(|_| Step::sized(0, 0)));
        script.push(Step::sized(800, 600).closing());
        let mut surface = MockSurface::new(script);

        let stats = run(&mut ctx, &mut surface, pipeline).unwrap();

        assert_eq!(stats.frames_rendered, 2);
        assert_eq!(stats.frames_skipped, 4);
        assert_eq!(stats.resizes, 0);
        assert_eq!(acquisitions(&log), 2);
        assert_eq!(count(&log, |call| matches!(call, Call::Submit(..))), 2);
    }

    #[test]
    fn any_zero_dimension_skips_the_frame() {
        for size in [(0, 600), (800, 0), (0, 0)] {
            let (mut ctx, pipeline, log) = triangle_context(MockBackend::new(800, 600));
            let mut surface = MockSurface::new(vec![Step::sized(size.0, size.1).closing()]);

            let stats = run(&mut ctx, &mut surface, pipeline).unwrap();

            assert_eq!(stats.frames_skipped, 1, "size {:?}", size);
            assert!(log.borrow().is_empty(), "size {:?} touched the backend", size);
        }
    }

    #[test]
    fn escape_press_stops_after_the_current_frame() {
        let (mut ctx, pipeline, log) = triangle_context(MockBackend::new(800, 600));
        let mut surface = MockSurface::new(vec![
            Step::sized(800, 600),
            Step::sized(800, 600).with_event(escape(KeyAction::Press)),
            Step::sized(800, 600),
        ]);

        let stats = run(&mut ctx, &mut surface, pipeline).unwrap();

        assert_eq!(stats.frames_rendered, 2);
        assert_eq!(surface.polls, 2);
        assert_eq!(acquisitions(&log), 2);
    }

    #[test]
    fn other_key_events_are_ignored() {
        let (mut ctx, pipeline, _log) = triangle_context(MockBackend::new(800, 600));
        let mut surface = MockSurface::new(vec![
            Step::sized(800, 600).with_event(escape(KeyAction::Release)),
            Step::sized(800, 600).with_event(escape(KeyAction::Repeat)),
            Step::sized(800, 600).with_event(character("q", KeyAction::Press)),
            Step::sized(800, 600).closing(),
        ]);

        let stats = run(&mut ctx, &mut surface, pipeline).unwrap();

        assert_eq!(stats.frames_rendered, 4);
    }

    #[test]
    fn surface_without_area_skips_frames_the_window_reports_as_sized() {
        let (mut ctx, pipeline, log) =
            triangle_context(MockBackend::new(800, 600).with_unpresentable_frames(2));
        let mut surface = MockSurface::new(vec![
            Step::sized(800, 600),
            Step::sized(800, 600),
            Step::sized(800, 600).closing(),
        ]);

        let stats = run(&mut ctx, &mut surface, pipeline).unwrap();

        assert_eq!(stats.frames_rendered, 1);
        assert_eq!(stats.frames_skipped, 2);
        assert_eq!(acquisitions(&log), 1);
        assert_eq!(count(&log, |call| matches!(call, Call::Submit(..))), 1);
    }

    #[test]
    fn size_change_recreates_the_swapchain_before_recording() {
        let (mut ctx, pipeline, log) = triangle_context(MockBackend::new(800, 600));
        let mut surface = MockSurface::new(vec![
            Step::sized(800, 600),
            Step::sized(1024, 768),
            Step::sized(1024, 768).closing(),
        ]);

        let stats = run(&mut ctx, &mut surface, pipeline).unwrap();

        assert_eq!(stats.resizes, 1);
        let log = log.borrow();
        let resize_at = log
            .iter()
            .position(|call| *call == Call::ResizeSwapchain(1024, 768))
            .unwrap();
        assert_eq!(log[resize_at + 1], Call::BeginCommandBuffer(2));
    }

    #[test]
    fn submit_failure_stops_the_loop() {
        let (mut ctx, pipeline, log) =
            triangle_context(MockBackend::new(800, 600).with_failing_submit(2));
        let mut surface = MockSurface::new(vec![
            Step::sized(800, 600),
            Step::sized(800, 600),
            Step::sized(800, 600).closing(),
        ]);

        let report = run(&mut ctx, &mut surface, pipeline).unwrap_err();

        assert!(report.to_string().contains("Device lost"));
        assert_eq!(surface.polls, 2);
        assert_eq!(acquisitions(&log), 2);
        assert_eq!(count(&log, |call| matches!(call, Call::Submit(..))), 1);
    }
}
