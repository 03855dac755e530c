//! Mapbatch renders a collection of named geographic features into one PNG per feature, an
//! overview image of the whole collection, and a plain-text manifest of what was produced.
//!
//! A run never stops because one feature fails:
//!
//! - Read a [`FeatureCollection`] (GeoJSON)
//! - Pick a [`StyleConfig`] from a [`StyleBook`]
//! - Call [`run_pipeline`] with a [`RenderBackend`] and inspect the [`RunReport`]
#![forbid(unsafe_code)]

mod foundation;

pub mod aggregate;
pub mod batch;
pub mod feature;
pub mod job;
pub mod manifest;
pub mod naming;
pub mod pipeline;
pub mod render;
pub mod style;

pub use crate::foundation::core::{BezPath, Canvas, FigureSize, Point, Rect, Rgba8};
pub use crate::foundation::error::{MapError, MapResult, RenderError, RenderResult};

pub use crate::aggregate::{AggregateOutcome, render_aggregate};
pub use crate::batch::{BatchOpts, BatchOutcomes, CancelToken, RenderThreading, run_batch};
pub use crate::feature::{FeatureCollection, FeatureRecord, Geometry, LabelField};
pub use crate::job::{RenderJob, RenderOutcome, render_feature};
pub use crate::manifest::{ManifestReport, RunSummary, write_manifest};
pub use crate::naming::{NameSanitizer, SanitizedName, sanitize};
pub use crate::pipeline::{PipelineOptions, RunReport, run_pipeline};
pub use crate::render::{
    BackendKind, CpuBackend, FrameRGBA, RenderBackend, Surface, TitleFont, create_backend,
};
pub use crate::style::{DEFAULT_STYLE, StyleBook, StyleConfig};
