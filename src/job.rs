//! Render jobs and the per-feature renderer.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::{Path, PathBuf};

use crate::feature::FeatureRecord;
use crate::naming::{NameSanitizer, SanitizedName};
use crate::render::{InvalidGeometry, RenderBackend, render_figure};
use crate::style::StyleConfig;

/// Extension of every image the pipeline writes.
pub const IMAGE_EXT: &str = "png";

/// One feature, its file name, and where its image goes.
#[derive(Clone, Debug)]
pub struct RenderJob<'a> {
    pub record: &'a FeatureRecord,
    pub name: SanitizedName,
    pub destination: PathBuf,
}

impl<'a> RenderJob<'a> {
    pub fn new(record: &'a FeatureRecord, names: NameSanitizer, output_dir: &Path) -> Self {
        let name = names.sanitize(&record.label, record.sequence_index);
        let destination = output_dir.join(name.file_name(IMAGE_EXT));
        Self {
            record,
            name,
            destination,
        }
    }

    /// Execute against `backend`; consumes the job.
    pub fn run(self, backend: &dyn RenderBackend, style: &StyleConfig) -> RenderOutcome {
        render_feature(backend, self.record, style, &self.destination)
    }
}

/// Per-feature result.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RenderOutcome {
    Success {
        sequence_index: usize,
        label: String,
        path: PathBuf,
    },
    Failure {
        sequence_index: usize,
        label: String,
        error: String,
    },
}

impl RenderOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn sequence_index(&self) -> usize {
        match self {
            Self::Success { sequence_index, .. } | Self::Failure { sequence_index, .. } => {
                *sequence_index
            }
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Self::Success { label, .. } | Self::Failure { label, .. } => label,
        }
    }
}

/// Render one feature to `destination`.
///
/// Never fails outright: geometry, surface, encoding and I/O errors, and a panicking backend,
/// all come back as [`RenderOutcome::Failure`], with nothing left at `destination`. The title is
/// the raw label.
pub fn render_feature(
    backend: &dyn RenderBackend,
    record: &FeatureRecord,
    style: &StyleConfig,
    destination: &Path,
) -> RenderOutcome {
    let res = catch_unwind(AssertUnwindSafe(|| {
        render_figure(
            backend,
            &[&record.geometry],
            &record.label,
            style,
            InvalidGeometry::Fail,
            destination,
        )
    }));

    let error = match res {
        Ok(Ok(report)) => {
            tracing::debug!(
                index = record.sequence_index,
                label = %record.label,
                path = %report.path.display(),
                "rendered feature"
            );
            return RenderOutcome::Success {
                sequence_index: record.sequence_index,
                label: record.label.clone(),
                path: report.path,
            };
        }
        Ok(Err(e)) => e.to_string(),
        Err(payload) => {
            let _ = std::fs::remove_file(destination);
            format!("renderer panicked: {}", panic_message(payload.as_ref()))
        }
    };

    tracing::warn!(
        index = record.sequence_index,
        label = %record.label,
        error = %error,
        "feature render failed"
    );
    RenderOutcome::Failure {
        sequence_index: record.sequence_index,
        label: record.label.clone(),
        error,
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}
