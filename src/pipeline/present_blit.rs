//! Copy of the finished image into the window surface.

use crate::backend::{BackendResult, FilterMode, GraphicsBackend, Rect, TextureHandle};

/// Nearest when the copy is 1:1, linear when it has to scale
pub fn filter_for(src: Rect, dst: Rect) -> FilterMode {
    if src.same_size(&dst) {
        FilterMode::Nearest
    } else {
        FilterMode::Linear
    }
}

/// Stretches the whole offscreen image over the whole surface
#[derive(Debug, Clone, Copy)]
pub struct PresentationBlit {
    image: TextureHandle,
    source: Rect,
}

impl PresentationBlit {
    pub fn new(image: TextureHandle, width: u32, height: u32) -> Self {
        Self {
            image,
            source: Rect::from_size(width, height),
        }
    }

    /// Blit into a `surface_width` x `surface_height` drawable
    pub fn run<B: GraphicsBackend + ?Sized>(
        &self,
        backend: &mut B,
        surface_width: u32,
        surface_height: u32,
    ) -> BackendResult<()> {
        let dst = Rect::from_size(surface_width, surface_height);
        if dst.is_empty() {
            return Ok(());
        }
        backend.blit_to_surface(self.image, self.source, dst, filter_for(self.source, dst))
    }
}
