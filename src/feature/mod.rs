//! Feature records and the geometry handle they carry.
//!
//! The geometry handle holds planar polygon rings as read from the source and knows how to
//! validate itself and report its extent. Coordinates are drawn as given; nothing is reprojected.

pub mod geojson;

use crate::foundation::core::Rect;
use crate::foundation::error::{RenderError, RenderResult};

pub use geojson::{FeatureCollection, LABEL_CANDIDATES, LabelField};

/// One position, `[x, y]`.
pub type Position = [f64; 2];

/// A closed ring of positions. The first ring of a polygon is its exterior; the rest are holes.
pub type Ring = Vec<Position>;

/// Geometry handle attached to a feature record.
///
/// Problems in the source geometry are kept as values instead of rejecting the whole
/// collection; they surface as a per-feature render failure.
#[derive(Clone, Debug, PartialEq)]
pub enum Geometry {
    Polygon(Vec<Ring>),
    MultiPolygon(Vec<Vec<Ring>>),
    /// A geometry type the renderer does not draw (points, lines, collections).
    Unsupported(String),
    /// The geometry object could not be decoded.
    Malformed(String),
    Empty,
}

impl Geometry {
    /// Validated polygons, each a slice of rings.
    pub fn polygons(&self) -> RenderResult<Vec<&[Ring]>> {
        let polys: Vec<&[Ring]> = match self {
            Geometry::Polygon(rings) => vec![rings.as_slice()],
            Geometry::MultiPolygon(polys) => polys.iter().map(Vec::as_slice).collect(),
            Geometry::Unsupported(kind) => {
                return Err(RenderError::UnsupportedGeometry(kind.clone()));
            }
            Geometry::Malformed(reason) => return Err(RenderError::malformed(reason.clone())),
            Geometry::Empty => return Err(RenderError::EmptyGeometry),
        };

        if polys.iter().all(|rings| rings.is_empty()) {
            return Err(RenderError::EmptyGeometry);
        }
        for rings in &polys {
            for ring in rings.iter() {
                validate_ring(ring)?;
            }
        }
        Ok(polys)
    }

    /// Short type name, for logs.
    pub fn kind(&self) -> &str {
        match self {
            Geometry::Polygon(_) => "Polygon",
            Geometry::MultiPolygon(_) => "MultiPolygon",
            Geometry::Unsupported(kind) => kind,
            Geometry::Malformed(_) => "Malformed",
            Geometry::Empty => "Empty",
        }
    }
}

fn validate_ring(ring: &Ring) -> RenderResult<()> {
    if ring.len() < 4 {
        return Err(RenderError::malformed(format!(
            "ring has {} positions; at least 4 are required",
            ring.len()
        )));
    }
    if let Some(p) = ring.iter().find(|p| !(p[0].is_finite() && p[1].is_finite())) {
        return Err(RenderError::malformed(format!(
            "non-finite position [{}, {}]",
            p[0], p[1]
        )));
    }
    Ok(())
}

/// Union bounding box over rings; `None` when there are no positions.
pub(crate) fn bounds_of<'a>(rings: impl IntoIterator<Item = &'a Ring>) -> Option<Rect> {
    let mut out: Option<Rect> = None;
    for p in rings.into_iter().flatten() {
        let r = Rect::new(p[0], p[1], p[0], p[1]);
        out = Some(match out {
            Some(acc) => acc.union(r),
            None => r,
        });
    }
    out
}

/// One named geometry, immutable once read from the source.
#[derive(Clone, Debug, PartialEq)]
pub struct FeatureRecord {
    /// Display label. Not unique, may be empty.
    pub label: String,
    pub geometry: Geometry,
    /// 0-based position in the source collection.
    pub sequence_index: usize,
}

impl FeatureRecord {
    pub fn new(sequence_index: usize, label: impl Into<String>, geometry: Geometry) -> Self {
        Self {
            label: label.into(),
            geometry,
            sequence_index,
        }
    }
}
