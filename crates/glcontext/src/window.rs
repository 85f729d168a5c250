use crate::backend::GlBackend;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RenderRectangle {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

/// Render target of a context. Only reachable through the GL thread's
/// [`ActiveContext`](crate::ActiveContext).
#[derive(Debug, Default)]
pub struct Window {
    preferred_size: Option<(u32, u32)>,
    render_rectangle: Option<RenderRectangle>,
    size: (u32, u32),
}

impl Window {
    pub fn preferred_size(&self) -> Option<(u32, u32)> {
        self.preferred_size
    }

    pub fn set_preferred_size(&mut self, width: u32, height: u32) {
        self.preferred_size = Some((width, height));
    }

    pub fn render_rectangle(&self) -> Option<RenderRectangle> {
        self.render_rectangle
    }

    pub fn set_render_rectangle(&mut self, rectangle: RenderRectangle) {
        self.render_rectangle = Some(rectangle);
    }

    pub fn size(&self) -> (u32, u32) {
        self.size
    }

    /// Applies the render rectangle (falling back to the preferred size) to
    /// the backing surface.
    pub(crate) fn resize(&mut self, backend: &mut dyn GlBackend) {
        let target = self
            .render_rectangle
            .map(|rect| (rect.width, rect.height))
            .or(self.preferred_size);
        let Some((width, height)) = target else {
            return;
        };
        if (width, height) != backend.surface_size() {
            tracing::debug!(width, height, "resizing GL window");
            backend.resize_surface(width, height);
        }
        self.size = backend.surface_size();
    }
}
