use glam::Vec4;

/// Contains configuration options for the renderer like vsync, validation, and the clear color
#[derive(Debug, Clone)]
pub struct RenderConfig {
    pub vsync: bool,
    /// Enables the Khronos validation layer and debug object names
    pub validation: bool,
    pub clear_color: Vec4,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            vsync: true,
            validation: cfg!(debug_assertions),
            clear_color: Vec4::new(0.02, 0.02, 0.08, 1.0),
        }
    }
}
