//! End-to-end run: output directory, feature batch, overview, then the manifest.

use std::path::{Path, PathBuf};

use crate::aggregate::{AggregateOutcome, render_aggregate};
use crate::batch::{BatchOpts, ensure_output_dir, run_batch, sanitizer_for};
use crate::feature::FeatureCollection;
use crate::foundation::error::{MapError, MapResult};
use crate::job::IMAGE_EXT;
use crate::manifest::{DEFAULT_PREVIEW, ManifestReport, RunSummary, write_manifest};
use crate::render::RenderBackend;
use crate::style::{DEFAULT_STYLE, StyleConfig};

pub const DEFAULT_OVERVIEW_NAME: &str = "OVERVIEW";
pub const DEFAULT_MANIFEST_NAME: &str = "FILE_INDEX.txt";
pub const DEFAULT_TITLE: &str = "Feature Maps";

#[derive(Clone, Debug)]
pub struct PipelineOptions {
    pub output_dir: PathBuf,
    pub style_name: String,
    pub style: StyleConfig,
    /// Style for the overview; `None` derives it with [`StyleConfig::overview`].
    pub overview_style: Option<StyleConfig>,
    pub overview_name: String,
    pub manifest_name: String,
    pub title: String,
    pub preview: usize,
    pub batch: BatchOpts,
}

impl PipelineOptions {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            style_name: DEFAULT_STYLE.to_owned(),
            style: StyleConfig::default(),
            overview_style: None,
            overview_name: DEFAULT_OVERVIEW_NAME.to_owned(),
            manifest_name: DEFAULT_MANIFEST_NAME.to_owned(),
            title: DEFAULT_TITLE.to_owned(),
            preview: DEFAULT_PREVIEW,
            batch: BatchOpts::default(),
        }
    }

    pub fn with_style(mut self, name: impl Into<String>, style: StyleConfig) -> Self {
        self.style_name = name.into();
        self.style = style;
        self
    }

    fn overview_style(&self) -> StyleConfig {
        self.overview_style
            .clone()
            .unwrap_or_else(|| self.style.overview())
    }

    fn validate(&self) -> MapResult<()> {
        self.style.validate()?;
        self.overview_style()
            .validate()
            .map_err(|e| MapError::validation(format!("overview style: {e}")))?;
        let name = Path::new(&self.manifest_name);
        if self.manifest_name.is_empty() || name.file_name() != Some(name.as_os_str()) {
            return Err(MapError::validation(format!(
                "manifest name must be a plain file name, got '{}'",
                self.manifest_name
            )));
        }
        // The manifest counts image files on disk; it must not be one of them.
        if name
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case(IMAGE_EXT))
        {
            return Err(MapError::validation(format!(
                "manifest name must not end in .{IMAGE_EXT}, got '{}'",
                self.manifest_name
            )));
        }
        Ok(())
    }
}

/// A finished run. `manifest` carries the run's final status.
#[derive(Debug)]
pub struct RunReport {
    pub summary: RunSummary,
    pub manifest: MapResult<ManifestReport>,
}

impl RunReport {
    pub fn manifest_ok(&self) -> bool {
        self.manifest.is_ok()
    }
}

/// Run the whole pipeline over `collection`.
///
/// Returns `Err` only when the run cannot start. Per-feature and overview failures end up in
/// the summary; a manifest failure ends up in [`RunReport::manifest`].
#[tracing::instrument(skip_all, fields(source = %collection.source_name, out = %opts.output_dir.display()))]
pub fn run_pipeline(
    backend: &dyn RenderBackend,
    collection: &FeatureCollection,
    opts: &PipelineOptions,
) -> MapResult<RunReport> {
    opts.validate()?;
    ensure_output_dir(&opts.output_dir)?;

    let records = &collection.records;
    let batch = run_batch(backend, records, &opts.style, &opts.output_dir, &opts.batch)?;

    let aggregate_path = opts.output_dir.join(
        sanitizer_for(records)
            .reserved(&opts.overview_name)
            .file_name(IMAGE_EXT),
    );
    let aggregate = if batch.cancelled {
        tracing::info!("run cancelled; overview not rendered");
        AggregateOutcome::Failure {
            error: "cancelled".to_owned(),
        }
    } else {
        render_aggregate(
            backend,
            records,
            &opts.overview_style(),
            &opts.title,
            &aggregate_path,
        )
    };

    // Both renders are done; the directory listing below sees their final state.
    let summary = RunSummary {
        title: opts.title.clone(),
        total_records: records.len(),
        outcomes: batch.outcomes,
        not_attempted: batch.not_attempted,
        cancelled: batch.cancelled,
        aggregate,
        aggregate_path,
        manifest_path: opts.output_dir.join(&opts.manifest_name),
        style_name: opts.style_name.clone(),
        style: opts.style.clone(),
        crs: collection.crs.clone(),
        source_name: collection.source_name.clone(),
        preview: opts.preview,
    };

    let manifest = write_manifest(&summary, &opts.output_dir, &summary.manifest_path);
    if let Err(e) = &manifest {
        tracing::error!(error = %e, "manifest not written");
    }
    Ok(RunReport { summary, manifest })
}
