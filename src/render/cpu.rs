use crate::foundation::core::{BezPath, Canvas, Rect, Rgba8};
use crate::foundation::error::{RenderError, RenderResult};
use crate::render::backend::{FrameRGBA, RenderBackend, Surface};
use crate::render::text::TitleFont;

/// CPU backend powered by `vello_cpu`.
///
/// Every surface owns its own render context and pixmap and only borrows the title font, so
/// one backend can be shared across worker threads.
#[derive(Clone, Debug)]
pub struct CpuBackend {
    font: Option<TitleFont>,
}

impl CpuBackend {
    /// Backend drawing titles with [`TitleFont::system`].
    pub fn new() -> Self {
        Self::with_font(TitleFont::system())
    }

    /// Backend with an explicit title font; `None` leaves titles undrawn.
    pub fn with_font(font: Option<TitleFont>) -> Self {
        Self { font }
    }

    pub fn font(&self) -> Option<&TitleFont> {
        self.font.as_ref()
    }
}

impl Default for CpuBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderBackend for CpuBackend {
    fn create_surface(
        &self,
        canvas: Canvas,
        background: Rgba8,
    ) -> RenderResult<Box<dyn Surface + '_>> {
        let surface = CpuSurface::new(canvas, background, self.font.as_ref())?;
        Ok(Box::new(surface))
    }
}

struct CpuSurface<'a> {
    width: u16,
    height: u16,
    ctx: vello_cpu::RenderContext,
    font: Option<&'a TitleFont>,
}

impl<'a> CpuSurface<'a> {
    fn new(
        canvas: Canvas,
        background: Rgba8,
        font: Option<&'a TitleFont>,
    ) -> RenderResult<Self> {
        let width: u16 = canvas
            .width
            .try_into()
            .map_err(|_| RenderError::surface("surface width exceeds u16"))?;
        let height: u16 = canvas
            .height
            .try_into()
            .map_err(|_| RenderError::surface("surface height exceeds u16"))?;
        if width == 0 || height == 0 {
            return Err(RenderError::surface("surface must be at least 1x1"));
        }

        let mut ctx = vello_cpu::RenderContext::new(width, height);
        ctx.set_paint(paint(background));
        ctx.fill_rect(&vello_cpu::kurbo::Rect::new(
            0.0,
            0.0,
            f64::from(width),
            f64::from(height),
        ));
        ctx.set_fill_rule(vello_cpu::peniko::Fill::EvenOdd);
        Ok(Self {
            width,
            height,
            ctx,
            font,
        })
    }
}

impl Surface for CpuSurface<'_> {
    fn fill_path(&mut self, path: &BezPath, color: Rgba8) -> RenderResult<()> {
        self.ctx.set_paint(paint(color));
        self.ctx.fill_path(&bezpath_to_cpu(path));
        Ok(())
    }

    fn stroke_path(&mut self, path: &BezPath, width_px: f64, color: Rgba8) -> RenderResult<()> {
        if !(width_px.is_finite() && width_px >= 0.0) {
            return Err(RenderError::surface(format!(
                "invalid stroke width {width_px}"
            )));
        }
        if width_px == 0.0 || color.a == 0 {
            return Ok(());
        }
        self.ctx.set_paint(paint(color));
        self.ctx.set_stroke(vello_cpu::kurbo::Stroke::new(width_px));
        self.ctx.stroke_path(&bezpath_to_cpu(path));
        Ok(())
    }

    fn draw_text(
        &mut self,
        text: &str,
        area: Rect,
        size_px: f64,
        color: Rgba8,
    ) -> RenderResult<f64> {
        let Some(font) = self.font else {
            return Ok(0.0);
        };
        if text.trim().is_empty() || !(area.width() > 0.0 && area.height() > 0.0) {
            return Ok(0.0);
        }
        let layout = font.layout(text, size_px as f32, area.width() as f32)?;

        self.ctx.set_paint(paint(color));
        let mut used = 0.0f64;
        for line in layout.lines() {
            let metrics = line.metrics();
            let bottom = f64::from(metrics.baseline + metrics.descent);
            if bottom > area.height() {
                break;
            }
            let dx = area.x0 + (area.width() - f64::from(metrics.advance)).max(0.0) / 2.0;
            self.ctx.set_transform(vello_cpu::kurbo::Affine::translate((dx, area.y0)));
            for item in line.items() {
                let parley::layout::PositionedLayoutItem::GlyphRun(run) = item else {
                    continue;
                };
                let mut x = run.offset();
                let baseline = run.baseline();
                let glyphs = run.glyphs().map(|g| {
                    let glyph = vello_cpu::Glyph {
                        id: g.id,
                        x: x + g.x,
                        y: baseline - g.y,
                    };
                    x += g.advance;
                    glyph
                });
                self.ctx
                    .glyph_run(font.data())
                    .font_size(run.run().font_size())
                    .fill_glyphs(glyphs);
            }
            used = bottom;
        }
        self.ctx.reset_transform();
        Ok(used)
    }

    fn finish(&mut self) -> RenderResult<FrameRGBA> {
        let mut pixmap = vello_cpu::Pixmap::new(self.width, self.height);
        self.ctx.flush();
        self.ctx.render_to_pixmap(&mut pixmap);
        Ok(FrameRGBA {
            width: u32::from(self.width),
            height: u32::from(self.height),
            data: pixmap.data_as_u8_slice().to_vec(),
            premultiplied: true,
        })
    }
}

fn paint(c: Rgba8) -> vello_cpu::peniko::Color {
    vello_cpu::peniko::Color::from_rgba8(c.r, c.g, c.b, c.a)
}

fn bezpath_to_cpu(path: &BezPath) -> vello_cpu::kurbo::BezPath {
    use kurbo::PathEl;

    let mut out = vello_cpu::kurbo::BezPath::new();
    for &el in path.elements() {
        match el {
            PathEl::MoveTo(p) => out.move_to(vello_cpu::kurbo::Point::new(p.x, p.y)),
            PathEl::LineTo(p) => out.line_to(vello_cpu::kurbo::Point::new(p.x, p.y)),
            PathEl::QuadTo(p1, p2) => out.quad_to(
                vello_cpu::kurbo::Point::new(p1.x, p1.y),
                vello_cpu::kurbo::Point::new(p2.x, p2.y),
            ),
            PathEl::CurveTo(p1, p2, p3) => out.curve_to(
                vello_cpu::kurbo::Point::new(p1.x, p1.y),
                vello_cpu::kurbo::Point::new(p2.x, p2.y),
                vello_cpu::kurbo::Point::new(p3.x, p3.y),
            ),
            PathEl::ClosePath => out.close_path(),
        }
    }
    out
}
