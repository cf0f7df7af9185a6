use std::time::Duration;

use color_eyre::Result;
use color_eyre::eyre::{OptionExt, eyre};
use smallvec::SmallVec;
use winit::application::ApplicationHandler;
use winit::dpi::LogicalSize;
use winit::error::OsError;
use winit::event::{ElementState, KeyEvent, WindowEvent};
use winit::event_loop::{ActiveEventLoop, EventLoop};
use winit::keyboard::Key;
use winit::platform::pump_events::{EventLoopExtPumpEvents, PumpStatus};
use winit::window::{Window, WindowId};

use crate::app::WindowConfig;

pub type SurfaceEvents = SmallVec<[SurfaceEvent; 4]>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    Press,
    Release,
    Repeat,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SurfaceEvent {
    /// The window manager asked the window to close.
    CloseRequested,
    Key { key: Key, action: KeyAction },
}

/// The window side of the frame loop: events, drawable size and the close flag.
pub trait SurfaceProvider {
    /// Drains pending window events without blocking.
    fn poll_events(&mut self) -> SurfaceEvents;

    /// Current drawable size in pixels. Either dimension is zero while minimized.
    fn framebuffer_size(&self) -> (u32, u32);

    fn should_close(&self) -> bool;

    fn set_close_requested(&mut self);
}

pub fn key_action(state: ElementState, repeat: bool) -> KeyAction {
    match (state, repeat) {
        (ElementState::Pressed, false) => KeyAction::Press,
        (ElementState::Pressed, true) => KeyAction::Repeat,
        (ElementState::Released, _) => KeyAction::Release,
    }
}

struct WindowState {
    config: WindowConfig,
    window: Option<Window>,
    init_error: Option<OsError>,

    events: SurfaceEvents,
    close_requested: bool,
}

impl ApplicationHandler for WindowState {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let attributes = Window::default_attributes()
            .with_title(self.config.title.as_str())
            .with_inner_size(LogicalSize::new(self.config.width, self.config.height))
            .with_resizable(self.config.resizable);
        match event_loop.create_window(attributes) {
            Ok(window) => self.window = Some(window),
            Err(e) => self.init_error = Some(e),
        }
    }

    fn window_event(
        &mut self,
        _event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent,
    ) {
        if self.window.as_ref().map(Window::id) != Some(window_id) {
            return;
        }

        match event {
            WindowEvent::CloseRequested => {
                self.close_requested = true;
                self.events.push(SurfaceEvent::CloseRequested);
            }
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        logical_key,
                        state,
                        repeat,
                        ..
                    },
                ..
            } => {
                self.events.push(SurfaceEvent::Key {
                    key: logical_key,
                    action: key_action(state, repeat),
                });
            }
            _ => {}
        }
    }
}

/// Native window driven by explicit, non-blocking event pumping.
pub struct WinitSurface {
    // Declared before the event loop so the window is destroyed first
    state: WindowState,
    event_loop: EventLoop<()>,
}

impl WinitSurface {
    /// Starts the windowing subsystem and pumps it until the window exists.
    pub fn new(config: &WindowConfig) -> Result<Self> {
        let mut event_loop = EventLoop::new()?;
        let mut state = WindowState {
            config: config.clone(),
            window: None,
            init_error: None,
            events: SurfaceEvents::new(),
            close_requested: false,
        };

        while state.window.is_none() {
            let status =
                event_loop.pump_app_events(Some(Duration::from_millis(10)), &mut state);
            if let Some(e) = state.init_error.take() {
                return Err(eyre!("Failed to create window: {e}"));
            }
            if let PumpStatus::Exit(code) = status {
                return Err(eyre!(
                    "Event loop exited with code {code} before the window was created"
                ));
            }
        }
        log::info!(
            "Created window '{}' ({}x{})",
            config.title,
            config.width,
            config.height
        );

        Ok(Self { state, event_loop })
    }

    pub fn window(&self) -> Result<&Window> {
        self.state.window.as_ref().ok_or_eyre("Window has not been created")
    }
}

impl SurfaceProvider for WinitSurface {
    fn poll_events(&mut self) -> SurfaceEvents {
        let status = self
            .event_loop
            .pump_app_events(Some(Duration::ZERO), &mut self.state);
        if let PumpStatus::Exit(code) = status {
            log::debug!("Event loop exited with code {code}");
            self.state.close_requested = true;
        }
        std::mem::take(&mut self.state.events)
    }

    fn framebuffer_size(&self) -> (u32, u32) {
        self.state
            .window
            .as_ref()
            .map(|window| {
                let size = window.inner_size();
                (size.width, size.height)
            })
            .unwrap_or((0, 0))
    }

    fn should_close(&self) -> bool {
        self.state.close_requested
    }

    fn set_close_requested(&mut self) {
        self.state.close_requested = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_press_is_a_press_and_held_keys_repeat() {
        assert_eq!(key_action(ElementState::Pressed, false), KeyAction::Press);
        assert_eq!(key_action(ElementState::Pressed, true), KeyAction::Repeat);
    }

    #[test]
    fn release_ignores_the_repeat_flag() {
        assert_eq!(key_action(ElementState::Released, false), KeyAction::Release);
        assert_eq!(key_action(ElementState::Released, true), KeyAction::Release);
    }
}
