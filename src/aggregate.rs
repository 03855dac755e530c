//! The overview: every record's geometry in one image.

use std::path::{Path, PathBuf};

use crate::feature::{FeatureRecord, Geometry};
use crate::render::{InvalidGeometry, RenderBackend, render_figure};
use crate::style::StyleConfig;

#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AggregateOutcome {
    Success {
        path: PathBuf,
        drawn: usize,
        skipped: usize,
    },
    Failure {
        error: String,
    },
}

impl AggregateOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// Title stored in the overview image.
pub fn overview_title(title: &str, record_count: usize) -> String {
    format!("{title}\n{record_count} features")
}

/// Render all `records` into `destination`.
///
/// Works from the source geometries, so it does not care how the per-feature renders went.
/// Geometries that cannot be drawn are skipped; the overview fails only when nothing is left,
/// which includes an empty `records`. Callers usually pass [`StyleConfig::overview`].
#[tracing::instrument(skip_all, fields(records = records.len(), dest = %destination.display()))]
pub fn render_aggregate(
    backend: &dyn RenderBackend,
    records: &[FeatureRecord],
    style: &StyleConfig,
    title: &str,
    destination: &Path,
) -> AggregateOutcome {
    let geometries: Vec<&Geometry> = records.iter().map(|r| &r.geometry).collect();
    let title = overview_title(title, records.len());

    let res = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        render_figure(
            backend,
            &geometries,
            &title,
            style,
            InvalidGeometry::Skip,
            destination,
        )
    }));

    match res {
        Ok(Ok(report)) => {
            tracing::info!(
                drawn = report.drawn,
                skipped = report.skipped,
                "overview rendered"
            );
            AggregateOutcome::Success {
                path: report.path,
                drawn: report.drawn,
                skipped: report.skipped,
            }
        }
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "overview render failed");
            AggregateOutcome::Failure {
                error: e.to_string(),
            }
        }
        Err(_) => {
            let _ = std::fs::remove_file(destination);
            tracing::warn!("overview renderer panicked");
            AggregateOutcome::Failure {
                error: "renderer panicked".to_owned(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::core::FigureSize;
    use crate::render::CpuBackend;
    use crate::render::png::read_title;

    fn style() -> StyleConfig {
        StyleConfig {
            figure_size: FigureSize(1.0, 1.0),
            ..StyleConfig::default().with_dpi(40)
        }
    }

    fn square(x: f64) -> Geometry {
        Geometry::Polygon(vec![vec![
            [x, 0.0],
            [x + 1.0, 0.0],
            [x + 1.0, 1.0],
            [x, 1.0],
            [x, 0.0],
        ]])
    }

    #[test]
    fn zero_records_is_a_failure_outcome() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("000_OVERVIEW.png");
        let out = render_aggregate(&CpuBackend::new(), &[], &style(), "UK", &dest);
        match out {
            AggregateOutcome::Failure { error } => assert!(error.contains("nothing to draw")),
            other => panic!("expected failure, got {other:?}"),
        }
        assert!(!dest.exists());
    }

    #[test]
    fn bad_geometries_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("000_OVERVIEW.png");
        let records = vec![
            FeatureRecord::new(0, "a", square(0.0)),
            FeatureRecord::new(1, "b", Geometry::Unsupported("Point".into())),
            FeatureRecord::new(2, "c", square(3.0)),
        ];
        let out = render_aggregate(&CpuBackend::new(), &records, &style(), "UK", &dest);
        assert_eq!(
            out,
            AggregateOutcome::Success {
                path: dest.clone(),
                drawn: 2,
                skipped: 1
            }
        );
        let bytes = std::fs::read(&dest).unwrap();
        assert_eq!(read_title(&bytes).as_deref(), Some("UK\n3 features"));
    }
}
