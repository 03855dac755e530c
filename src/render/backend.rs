use crate::foundation::core::{BezPath, Canvas, Rect, Rgba8};
use crate::foundation::error::RenderResult;

/// A rendered figure as RGBA8 pixels.
#[derive(Clone, Debug)]
pub struct FrameRGBA {
    pub width: u32,
    pub height: u32,
    /// RGBA8 bytes, tightly packed, row-major.
    pub data: Vec<u8>,
    /// Whether `data` is premultiplied alpha.
    pub premultiplied: bool,
}

impl FrameRGBA {
    /// Convert to straight alpha in place; no-op if already straight.
    pub fn unpremultiply(&mut self) {
        if !self.premultiplied {
            return;
        }
        for px in self.data.chunks_exact_mut(4) {
            let a = u16::from(px[3]);
            if a == 0 {
                px[0] = 0;
                px[1] = 0;
                px[2] = 0;
                continue;
            }
            for c in &mut px[..3] {
                *c = ((u16::from(*c) * 255 + a / 2) / a).min(255) as u8;
            }
        }
        self.premultiplied = false;
    }

    /// Straight-alpha pixel at `(x, y)`, for inspection.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = ((y as usize) * (self.width as usize) + (x as usize)) * 4;
        let px = self.data.get(i..i + 4)?;
        Some([px[0], px[1], px[2], px[3]])
    }
}

/// The external rasterization primitive.
///
/// A backend hands out one fresh [`Surface`] per render call. The surface is the only rendering
/// resource a call holds and it is released when dropped, on success and failure alike, so a
/// backend shared by several workers never shares a surface between them.
pub trait RenderBackend: Sync {
    /// Acquire a surface cleared to `background`.
    fn create_surface(
        &self,
        canvas: Canvas,
        background: Rgba8,
    ) -> RenderResult<Box<dyn Surface + '_>>;
}

/// A drawing surface in pixel space (origin top-left, y down).
pub trait Surface {
    /// Fill `path` using the even-odd rule, so inner rings cut holes.
    fn fill_path(&mut self, path: &BezPath, color: Rgba8) -> RenderResult<()>;

    fn stroke_path(&mut self, path: &BezPath, width_px: f64, color: Rgba8) -> RenderResult<()>;

    /// Draw `text` centered horizontally at the top of `area`, wrapping to its width.
    ///
    /// Lines that would overflow `area` are dropped. Returns the height used, which is `0.0`
    /// when nothing was drawn (for example when the surface has no font).
    fn draw_text(
        &mut self,
        text: &str,
        area: Rect,
        size_px: f64,
        color: Rgba8,
    ) -> RenderResult<f64>;

    /// Rasterize everything drawn so far.
    fn finish(&mut self) -> RenderResult<FrameRGBA>;
}

/// Available backend kinds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BackendKind {
    /// CPU raster backend powered by `vello_cpu`.
    #[default]
    Cpu,
}

/// Create a rendering backend implementation.
pub fn create_backend(kind: BackendKind) -> Box<dyn RenderBackend> {
    match kind {
        BackendKind::Cpu => Box::new(crate::render::cpu::CpuBackend::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unpremultiply_restores_straight_alpha() {
        let mut f = FrameRGBA {
            width: 2,
            height: 1,
            data: vec![64, 0, 32, 128, 0, 0, 0, 0],
            premultiplied: true,
        };
        f.unpremultiply();
        assert!(!f.premultiplied);
        assert_eq!(f.pixel(0, 0), Some([128, 0, 64, 128]));
        assert_eq!(f.pixel(1, 0), Some([0, 0, 0, 0]));
        assert_eq!(f.pixel(2, 0), None);
    }
}
