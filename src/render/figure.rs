//! One figure, end to end: validate geometry, fit it to the canvas, draw on a fresh surface,
//! encode, and write the file into place.

use std::path::{Path, PathBuf};

use crate::feature::{Geometry, Ring, bounds_of};
use crate::foundation::core::{BezPath, Canvas, Point, Rect};
use crate::foundation::error::{RenderError, RenderResult};
use crate::render::backend::{RenderBackend, Surface};
use crate::render::png::encode_png;
use crate::style::StyleConfig;

/// What to do with a geometry the renderer cannot draw.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InvalidGeometry {
    /// Abort the figure with the geometry's error.
    Fail,
    /// Leave it out and keep drawing the rest.
    Skip,
}

/// Result of a written figure.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FigureReport {
    pub path: PathBuf,
    pub drawn: usize,
    pub skipped: usize,
}

/// Render `geometries` into one PNG at `dest`.
///
/// `title` is drawn in a band above the geometry and also stored in the PNG metadata; no axes,
/// ticks or frame are drawn. On any error nothing is left at `dest`: a partially written temporary is removed and so is an older
/// file of the same name.
pub fn render_figure(
    backend: &dyn RenderBackend,
    geometries: &[&Geometry],
    title: &str,
    style: &StyleConfig,
    invalid: InvalidGeometry,
    dest: &Path,
) -> RenderResult<FigureReport> {
    let res = render_figure_inner(backend, geometries, title, style, invalid, dest);
    if res.is_err() {
        discard(dest);
    }
    res
}

fn render_figure_inner(
    backend: &dyn RenderBackend,
    geometries: &[&Geometry],
    title: &str,
    style: &StyleConfig,
    invalid: InvalidGeometry,
    dest: &Path,
) -> RenderResult<FigureReport> {
    let canvas = style
        .validate()
        .map_err(|e| RenderError::surface(format!("invalid style: {e}")))?;

    let mut polygons: Vec<&[Ring]> = Vec::new();
    let mut skipped = 0usize;
    for geometry in geometries {
        match geometry.polygons() {
            Ok(mut p) => polygons.append(&mut p),
            Err(e) if invalid == InvalidGeometry::Skip => {
                tracing::warn!(kind = geometry.kind(), error = %e, "skipping geometry");
                skipped += 1;
            }
            Err(e) => return Err(e),
        }
    }
    if polygons.is_empty() {
        return Err(RenderError::NothingToDraw(skipped));
    }

    let extent = bounds_of(polygons.iter().flat_map(|rings| rings.iter()))
        .ok_or(RenderError::NothingToDraw(skipped))?;

    let mut frame = {
        let mut surface = backend.create_surface(canvas, style.background_color)?;
        let band = draw_title(surface.as_mut(), title, canvas, style)?;
        let fit = Fit::new(extent, canvas, style.pad_px(), band)?;
        let paths: Vec<BezPath> = polygons.iter().map(|rings| fit.path(rings)).collect();
        for path in &paths {
            surface.fill_path(path, style.fill_paint())?;
        }
        for path in &paths {
            surface.stroke_path(path, style.line_width_px(), style.edge_paint())?;
        }
        surface.finish()?
    };

    frame.unpremultiply();
    let bytes = encode_png(&frame, title, style.dpi)?;
    write_file(dest, &bytes)?;

    Ok(FigureReport {
        path: dest.to_path_buf(),
        drawn: polygons.len(),
        skipped,
    })
}

/// Draw the title at the top of the padded canvas and return the band it takes, gap included.
///
/// The band is capped at a third of the padded height.
fn draw_title(
    surface: &mut dyn Surface,
    title: &str,
    canvas: Canvas,
    style: &StyleConfig,
) -> RenderResult<f64> {
    let pad = style.pad_px();
    let max_band = (f64::from(canvas.height) - 2.0 * pad) / 3.0;
    let area = Rect::new(pad, pad, f64::from(canvas.width) - pad, pad + max_band);
    let used = surface.draw_text(title, area, style.title_size_px(), style.title_color)?;
    if used <= 0.0 {
        return Ok(0.0);
    }
    Ok((used + style.title_pad_px()).min(max_band))
}

/// Maps source coordinates onto the canvas below the title band: uniform scale, centered, y up.
struct Fit {
    extent: Rect,
    scale: f64,
    offset_x: f64,
    offset_y: f64,
}

impl Fit {
    fn new(extent: Rect, canvas: Canvas, pad: f64, band: f64) -> RenderResult<Self> {
        let area_w = f64::from(canvas.width) - 2.0 * pad;
        let area_h = f64::from(canvas.height) - 2.0 * pad - band;
        let (w, h) = (extent.width(), extent.height());
        if !(w.is_finite() && h.is_finite()) {
            return Err(RenderError::DegenerateExtent(format!(
                "non-finite extent {w} x {h}"
            )));
        }

        let scale = match (w > 0.0, h > 0.0) {
            (true, true) => (area_w / w).min(area_h / h),
            (true, false) => area_w / w,
            (false, true) => area_h / h,
            (false, false) => {
                return Err(RenderError::DegenerateExtent(format!(
                    "all positions coincide at ({}, {})",
                    extent.x0, extent.y0
                )));
            }
        };
        if !(scale.is_finite() && scale > 0.0) {
            return Err(RenderError::DegenerateExtent(format!(
                "cannot fit {w} x {h} into {area_w} x {area_h} px"
            )));
        }

        Ok(Self {
            extent,
            scale,
            offset_x: pad + (area_w - w * scale) / 2.0,
            offset_y: pad + band + (area_h - h * scale) / 2.0,
        })
    }

    fn point(&self, p: [f64; 2]) -> Point {
        Point::new(
            self.offset_x + (p[0] - self.extent.x0) * self.scale,
            self.offset_y + (self.extent.y1 - p[1]) * self.scale,
        )
    }

    fn path(&self, rings: &[Ring]) -> BezPath {
        let mut path = BezPath::new();
        for ring in rings {
            let mut it = ring.iter();
            let Some(first) = it.next() else { continue };
            path.move_to(self.point(*first));
            for p in it {
                path.line_to(self.point(*p));
            }
            path.close_path();
        }
        path
    }
}

/// Write through a temporary sibling and rename into place.
fn write_file(dest: &Path, bytes: &[u8]) -> RenderResult<()> {
    let file_name = dest
        .file_name()
        .ok_or_else(|| RenderError::io(dest, std::io::Error::other("destination has no file name")))?;
    let mut tmp_name = std::ffi::OsString::from(".");
    tmp_name.push(file_name);
    tmp_name.push(".partial");
    let tmp = dest.with_file_name(tmp_name);

    let mut guard = TempFileGuard(Some(tmp.clone()));
    std::fs::write(&tmp, bytes).map_err(|e| RenderError::io(&tmp, e))?;
    std::fs::rename(&tmp, dest).map_err(|e| RenderError::io(dest, e))?;
    guard.0 = None;
    Ok(())
}

fn discard(dest: &Path) {
    match std::fs::remove_file(dest) {
        Ok(()) => tracing::debug!(path = %dest.display(), "removed stale output"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %dest.display(), error = %e, "could not remove output"),
    }
}

struct TempFileGuard(Option<PathBuf>);

impl Drop for TempFileGuard {
    fn drop(&mut self) {
        if let Some(path) = self.0.take() {
            let _ = std::fs::remove_file(path);
        }
    }
}
