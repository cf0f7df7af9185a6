//! Scripted surface for frame loop tests. Each poll consumes one step of the script.

use std::collections::VecDeque;

use smallvec::smallvec;
use winit::keyboard::{Key, NamedKey, SmolStr};

use crate::app::surface::{KeyAction, SurfaceEvent, SurfaceEvents, SurfaceProvider};

pub struct Step {
    pub size: (u32, u32),
    pub events: SurfaceEvents,
}

impl Step {
    pub fn sized(width: u32, height: u32) -> Self {
        Self {
            size: (width, height),
            events: SurfaceEvents::new(),
        }
    }

    pub fn with_event(mut self, event: SurfaceEvent) -> Self {
        self.events.push(event);
        self
    }

    pub fn closing(self) -> Self {
        self.with_event(SurfaceEvent::CloseRequested)
    }
}

pub fn escape(action: KeyAction) -> SurfaceEvent {
    SurfaceEvent::Key {
        key: Key::Named(NamedKey::Escape),
        action,
    }
}

pub fn character(c: &str, action: KeyAction) -> SurfaceEvent {
    SurfaceEvent::Key {
        key: Key::Character(SmolStr::new(c)),
        action,
    }
}

pub struct MockSurface {
    script: VecDeque<Step>,
    size: (u32, u32),
    close_requested: bool,
    pub polls: usize,
}

impl MockSurface {
    pub fn new(script: Vec<Step>) -> Self {
        Self {
            script: script.into(),
            size: (0, 0),
            close_requested: false,
            polls: 0,
        }
    }
}

impl SurfaceProvider for MockSurface {
    fn poll_events(&mut self) -> SurfaceEvents {
        self.polls += 1;
        match self.script.pop_front() {
            Some(step) => {
                self.size = step.size;
                step.events
            }
            // Running past the script behaves like the user closing the window
            None => smallvec![SurfaceEvent::CloseRequested],
        }
    }

    fn framebuffer_size(&self) -> (u32, u32) {
        self.size
    }

    fn should_close(&self) -> bool {
        self.close_requested
    }

    fn set_close_requested(&mut self) {
        self.close_requested = true;
    }
}
