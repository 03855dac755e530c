//! Run summary and the plain-text manifest.
//!
//! The manifest lists what is on disk when it is written, not what the batch believes it wrote.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::aggregate::AggregateOutcome;
use crate::foundation::error::{MapError, MapResult};
use crate::job::{IMAGE_EXT, RenderOutcome};
use crate::style::StyleConfig;

/// Failures shown in previews unless configured otherwise.
pub const DEFAULT_PREVIEW: usize = 5;

/// Everything known about a finished run. Built once, after the batch and the overview.
#[derive(Clone, Debug, PartialEq)]
pub struct RunSummary {
    pub title: String,
    pub total_records: usize,
    pub outcomes: Vec<RenderOutcome>,
    pub not_attempted: usize,
    pub cancelled: bool,
    pub aggregate: AggregateOutcome,
    pub aggregate_path: PathBuf,
    pub manifest_path: PathBuf,
    pub style_name: String,
    pub style: StyleConfig,
    pub crs: Option<String>,
    pub source_name: String,
    /// How many failures previews list before summarizing the rest.
    pub preview: usize,
}

impl RunSummary {
    pub fn attempted(&self) -> usize {
        self.outcomes.len()
    }

    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.attempted() - self.succeeded()
    }

    /// Failure lines, at most `preview` of them, plus a trailer giving the rest.
    pub fn failure_preview(&self) -> Vec<String> {
        let failures: Vec<_> = self
            .outcomes
            .iter()
            .filter_map(|o| match o {
                RenderOutcome::Failure {
                    sequence_index,
                    label,
                    error,
                } => Some((sequence_index, label, error)),
                RenderOutcome::Success { .. } => None,
            })
            .collect();

        let mut lines: Vec<String> = failures
            .iter()
            .take(self.preview)
            .map(|(idx, label, error)| format!("#{} {label:?}: {error}", *idx + 1))
            .collect();
        if failures.len() > self.preview {
            lines.push(format!("... and {} more", failures.len() - self.preview));
        }
        lines
    }

    fn overview_status(&self) -> String {
        match &self.aggregate {
            AggregateOutcome::Success { path, skipped, .. } => {
                let name = file_label(path);
                if *skipped > 0 {
                    format!("{name} ({skipped} geometries skipped)")
                } else {
                    name
                }
            }
            AggregateOutcome::Failure { error } => format!("failed: {error}"),
        }
    }

    /// Multi-line summary for the terminal.
    pub fn console_report(&self) -> String {
        let mut lines = vec![
            format!("{}: {} records", self.title, self.total_records),
            format!("  attempted:     {}", self.attempted()),
            format!("  succeeded:     {}", self.succeeded()),
            format!("  failed:        {}", self.failed()),
        ];
        if self.cancelled || self.not_attempted > 0 {
            lines.push(format!("  not attempted: {} (cancelled)", self.not_attempted));
        }
        lines.push(format!("  overview:      {}", self.overview_status()));
        let preview = self.failure_preview();
        if !preview.is_empty() {
            lines.push(format!("  failures ({}):", self.failed()));
            lines.extend(preview.into_iter().map(|l| format!("    {l}")));
        }
        lines.join("\n")
    }
}

/// What the manifest writer found and wrote.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ManifestReport {
    pub path: PathBuf,
    pub images_found: usize,
    /// Image file names in `output_dir`, sorted.
    pub files: Vec<String>,
}

/// Image files currently in `dir`, sorted by name.
pub fn list_images(dir: &Path) -> std::io::Result<Vec<String>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if !entry.file_type()?.is_file() {
            continue;
        }
        if path.extension().and_then(|e| e.to_str()) != Some(IMAGE_EXT) {
            continue;
        }
        files.push(entry.file_name().to_string_lossy().into_owned());
    }
    files.sort();
    Ok(files)
}

/// Write the manifest for `summary` to `destination`, listing images found in `output_dir`.
///
/// Must run after every render of the run has finished.
#[tracing::instrument(skip_all, fields(dest = %destination.display()))]
pub fn write_manifest(
    summary: &RunSummary,
    output_dir: &Path,
    destination: &Path,
) -> MapResult<ManifestReport> {
    let files = list_images(output_dir).map_err(|source| MapError::Manifest {
        path: output_dir.to_path_buf(),
        source,
    })?;

    let write = || -> std::io::Result<()> {
        let mut w = BufWriter::new(File::create(destination)?);
        write_body(&mut w, summary, &files)?;
        w.into_inner().map_err(|e| e.into_error())?.sync_all()
    };
    write().map_err(|source| MapError::Manifest {
        path: destination.to_path_buf(),
        source,
    })?;

    tracing::info!(images_found = files.len(), "manifest written");
    Ok(ManifestReport {
        path: destination.to_path_buf(),
        images_found: files.len(),
        files,
    })
}

fn write_body(w: &mut impl Write, s: &RunSummary, files: &[String]) -> std::io::Result<()> {
    let heading = format!("{} - Generated Files", s.title);
    writeln!(w, "{heading}")?;
    writeln!(w, "{}", "=".repeat(heading.chars().count()))?;
    writeln!(w)?;

    writeln!(w, "Total records: {}", s.total_records)?;
    writeln!(w, "Images found: {}", files.len())?;
    write!(w, "Rendered: {} succeeded, {} failed", s.succeeded(), s.failed())?;
    if s.cancelled || s.not_attempted > 0 {
        write!(w, ", {} not attempted (cancelled)", s.not_attempted)?;
    }
    writeln!(w)?;
    writeln!(w, "Overview: {}", s.overview_status())?;

    let st = &s.style;
    writeln!(
        w,
        "Style: {} (fill {}, edge {}, background {}, line width {} pt, alpha {})",
        s.style_name, st.fill_color, st.edge_color, st.background_color, st.line_width, st.alpha
    )?;
    writeln!(w, "Resolution: {} DPI", st.dpi)?;
    writeln!(
        w,
        "Figure size: {} x {} in",
        st.figure_size.0, st.figure_size.1
    )?;
    writeln!(
        w,
        "Spatial reference: {}",
        s.crs.as_deref().unwrap_or("unspecified")
    )?;
    writeln!(w, "Data source: {}", s.source_name)?;

    let preview = s.failure_preview();
    if !preview.is_empty() {
        writeln!(w)?;
        writeln!(w, "Failures ({}):", s.failed())?;
        for line in preview {
            writeln!(w, "  {line}")?;
        }
    }

    writeln!(w)?;
    writeln!(w, "Files:")?;
    for (i, name) in files.iter().enumerate() {
        writeln!(w, "{:3}. {name}", i + 1)?;
    }
    Ok(())
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(dir: &Path, outcomes: Vec<RenderOutcome>) -> RunSummary {
        RunSummary {
            title: "UK Counties".into(),
            total_records: outcomes.len(),
            outcomes,
            not_attempted: 0,
            cancelled: false,
            aggregate: AggregateOutcome::Failure {
                error: "nothing to draw (0 geometries skipped)".into(),
            },
            aggregate_path: dir.join("000_OVERVIEW.png"),
            manifest_path: dir.join("FILE_INDEX.txt"),
            style_name: "black".into(),
            style: StyleConfig::default(),
            crs: None,
            source_name: "counties.geojson".into(),
            preview: 2,
        }
    }

    fn failure(i: usize) -> RenderOutcome {
        RenderOutcome::Failure {
            sequence_index: i,
            label: format!("f{i}"),
            error: "boom".into(),
        }
    }

    #[test]
    fn manifest_reflects_disk_not_memory() {
        let dir = tempfile::tempdir().unwrap();
        let mut outcomes = Vec::new();
        for (i, name) in ["001_a.png", "002_b.png", "003_c.png"].iter().enumerate() {
            let path = dir.path().join(name);
            std::fs::write(&path, b"png").unwrap();
            outcomes.push(RenderOutcome::Success {
                sequence_index: i,
                label: name.to_string(),
                path,
            });
        }
        std::fs::write(dir.path().join("notes.txt"), b"x").unwrap();
        std::fs::remove_file(dir.path().join("002_b.png")).unwrap();

        let s = summary(dir.path(), outcomes);
        let report = write_manifest(&s, dir.path(), &s.manifest_path).unwrap();
        assert_eq!(report.images_found, 2);
        assert_eq!(report.files, ["001_a.png", "003_c.png"]);

        let text = std::fs::read_to_string(&s.manifest_path).unwrap();
        assert!(text.starts_with("UK Counties - Generated Files\n"));
        assert!(text.contains("Total records: 3\n"));
        assert!(text.contains("Images found: 2\n"));
        assert!(text.contains("Resolution: 300 DPI\n"));
        assert!(text.contains("  1. 001_a.png\n  2. 003_c.png\n"));
        assert!(text.contains("Overview: failed: nothing to draw"));
    }

    #[test]
    fn failure_preview_is_bounded_but_counts_everything() {
        let dir = tempfile::tempdir().unwrap();
        let s = summary(dir.path(), (0..5).map(failure).collect());
        let preview = s.failure_preview();
        assert_eq!(preview.len(), 3);
        assert_eq!(preview[0], "#1 \"f0\": boom");
        assert_eq!(preview[2], "... and 3 more");

        let console = s.console_report();
        assert!(console.contains("failed:        5"));
        assert!(console.contains("failures (5):"));
    }

    #[test]
    fn unwritable_destination_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let s = summary(dir.path(), Vec::new());
        let dest = dir.path().join("missing").join("FILE_INDEX.txt");
        let err = write_manifest(&s, dir.path(), &dest).unwrap_err();
        assert!(matches!(err, MapError::Manifest { .. }));
        assert!(!err.is_fatal_before_render());
    }
}
