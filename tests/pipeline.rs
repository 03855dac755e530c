use std::collections::BTreeSet;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use mapbatch::{
    AggregateOutcome, BatchOpts, BezPath, Canvas, CancelToken, CpuBackend, FeatureCollection,
    FeatureRecord, FigureSize, FrameRGBA, Geometry, PipelineOptions, Rect, RenderBackend,
    RenderError, RenderOutcome, RenderResult, RenderThreading, Rgba8, RunSummary, StyleConfig,
    Surface,
    render_aggregate, run_batch, run_pipeline, write_manifest,
};

fn small_style() -> StyleConfig {
    StyleConfig {
        figure_size: FigureSize(1.0, 1.0),
        ..StyleConfig::default().with_dpi(32)
    }
}

fn options(out: &Path) -> PipelineOptions {
    let mut opts = PipelineOptions::new(out).with_style("black", small_style());
    opts.overview_style = Some(small_style().overview().with_dpi(16));
    opts
}

fn square(x: f64, y: f64) -> Geometry {
    Geometry::Polygon(vec![vec![
        [x, y],
        [x + 1.0, y],
        [x + 1.0, y + 1.0],
        [x, y + 1.0],
        [x, y],
    ]])
}

fn records(n: usize) -> Vec<FeatureRecord> {
    (0..n)
        .map(|i| FeatureRecord::new(i, format!("County {i}"), square(i as f64, 0.0)))
        .collect()
}

fn png_names(dir: &Path) -> BTreeSet<String> {
    std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|n| n.ends_with(".png"))
        .collect()
}

/// Wraps the CPU backend and counts surfaces handed out and dropped.
#[derive(Default)]
struct CountingBackend {
    inner: CpuBackend,
    calls: AtomicUsize,
    acquired: AtomicUsize,
    released: AtomicUsize,
    /// 1-based call number that fails, if any.
    fail_on: Option<usize>,
    /// 1-based call number whose surface panics in `finish`.
    panic_on: Option<usize>,
    cancel_on: Option<(usize, CancelToken)>,
}

struct CountingSurface<'a> {
    inner: Box<dyn Surface + 'a>,
    released: &'a AtomicUsize,
    panics: bool,
}

impl RenderBackend for CountingBackend {
    fn create_surface(
        &self,
        canvas: Canvas,
        background: Rgba8,
    ) -> RenderResult<Box<dyn Surface + '_>> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some((at, token)) = &self.cancel_on
            && *at == n
        {
            token.cancel();
        }
        if self.fail_on == Some(n) {
            return Err(RenderError::surface("injected failure"));
        }
        let inner = self.inner.create_surface(canvas, background)?;
        self.acquired.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(CountingSurface {
            inner,
            released: &self.released,
            panics: self.panic_on == Some(n),
        }))
    }
}

impl Surface for CountingSurface<'_> {
    fn fill_path(&mut self, path: &BezPath, color: Rgba8) -> RenderResult<()> {
        self.inner.fill_path(path, color)
    }

    fn stroke_path(&mut self, path: &BezPath, width_px: f64, color: Rgba8) -> RenderResult<()> {
        self.inner.stroke_path(path, width_px, color)
    }

    fn draw_text(
        &mut self,
        text: &str,
        area: Rect,
        size_px: f64,
        color: Rgba8,
    ) -> RenderResult<f64> {
        self.inner.draw_text(text, area, size_px, color)
    }

    fn finish(&mut self) -> RenderResult<FrameRGBA> {
        if self.panics {
            panic!("surface exploded");
        }
        self.inner.finish()
    }
}

impl Drop for CountingSurface<'_> {
    fn drop(&mut self) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn every_record_gets_exactly_one_outcome() {
    let dir = tempfile::tempdir().unwrap();
    let recs = records(7);
    let out = run_batch(
        &CpuBackend::new(),
        &recs,
        &small_style(),
        dir.path(),
        &BatchOpts::default(),
    )
    .unwrap();
    assert_eq!(out.outcomes.len(), recs.len());
    assert_eq!(out.not_attempted, 0);
    let idx: Vec<_> = out.outcomes.iter().map(RenderOutcome::sequence_index).collect();
    assert_eq!(idx, (0..7).collect::<Vec<_>>());
    assert_eq!(png_names(dir.path()).len(), 7);
}

#[test]
fn one_bad_record_does_not_stop_the_batch() {
    let dir = tempfile::tempdir().unwrap();
    let mut recs = records(6);
    recs[2].geometry = Geometry::Unsupported("LineString".into());

    let backend = CountingBackend {
        fail_on: Some(4),
        ..Default::default()
    };
    let out = run_batch(&backend, &recs, &small_style(), dir.path(), &BatchOpts::default())
        .unwrap();

    let failed: Vec<_> = out
        .outcomes
        .iter()
        .filter(|o| !o.is_success())
        .map(RenderOutcome::sequence_index)
        .collect();
    // Record 2 fails before asking for a surface, so the 4th call is record 4.
    assert_eq!(failed, [2, 4]);
    assert_eq!(out.succeeded(), 4);
    assert!(!dir.path().join("003_County_2.png").exists());
    assert!(!dir.path().join("005_County_4.png").exists());
    assert!(dir.path().join("006_County_5.png").exists());
}

#[test]
fn surfaces_are_released_on_every_path() {
    let dir = tempfile::tempdir().unwrap();
    let mut recs = records(8);
    recs[1].geometry = Geometry::Empty;

    let backend = CountingBackend {
        fail_on: Some(2),
        panic_on: Some(3),
        ..Default::default()
    };
    let out = run_batch(&backend, &recs, &small_style(), dir.path(), &BatchOpts::default())
        .unwrap();

    assert_eq!(out.outcomes.len(), 8);
    assert_eq!(out.failed(), 3);
    let panicked = out.failures().any(|o| match o {
        RenderOutcome::Failure { error, .. } => error.contains("renderer panicked"),
        RenderOutcome::Success { .. } => false,
    });
    assert!(panicked);

    assert_eq!(backend.calls.load(Ordering::SeqCst), 7);
    let acquired = backend.acquired.load(Ordering::SeqCst);
    assert_eq!(acquired, 6);
    assert_eq!(backend.released.load(Ordering::SeqCst), acquired);
}

#[test]
fn empty_input_is_not_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let out = run_batch(
        &CpuBackend::new(),
        &[],
        &small_style(),
        &dir.path().join("nested"),
        &BatchOpts::default(),
    )
    .unwrap();
    assert!(out.outcomes.is_empty());
    assert!(dir.path().join("nested").is_dir());
}

#[test]
fn pool_matches_sequential() {
    let seq_dir = tempfile::tempdir().unwrap();
    let par_dir = tempfile::tempdir().unwrap();
    let mut recs = records(24);
    recs[5].geometry = Geometry::Malformed("bad ring".into());
    recs[17].label = "Kent".into();
    recs[18].label = "Kent".into();

    let seq = run_batch(
        &CpuBackend::new(),
        &recs,
        &small_style(),
        seq_dir.path(),
        &BatchOpts::default(),
    )
    .unwrap();
    let par = run_batch(
        &CpuBackend::new(),
        &recs,
        &small_style(),
        par_dir.path(),
        &BatchOpts {
            threading: RenderThreading::pool(Some(4)),
            ..Default::default()
        },
    )
    .unwrap();

    let shape = |o: &RenderOutcome| (o.sequence_index(), o.is_success());
    assert_eq!(
        seq.outcomes.iter().map(shape).collect::<Vec<_>>(),
        par.outcomes.iter().map(shape).collect::<Vec<_>>()
    );
    assert_eq!(png_names(seq_dir.path()), png_names(par_dir.path()));
    assert_eq!(png_names(par_dir.path()).len(), 23);
}

#[test]
fn cancellation_stops_dispatch_and_accounts_for_the_rest() {
    let dir = tempfile::tempdir().unwrap();
    let recs = records(10);
    let cancel = CancelToken::new();
    let backend = CountingBackend {
        cancel_on: Some((3, cancel.clone())),
        ..Default::default()
    };
    let out = run_batch(
        &backend,
        &recs,
        &small_style(),
        dir.path(),
        &BatchOpts {
            cancel,
            ..Default::default()
        },
    )
    .unwrap();

    assert!(out.cancelled);
    assert_eq!(out.outcomes.len(), 3, "in-flight job finishes");
    assert_eq!(out.not_attempted, 7);
    assert_eq!(out.outcomes.len() + out.not_attempted, recs.len());
}

#[test]
fn cancellation_on_the_pool_accounts_for_every_record() {
    let dir = tempfile::tempdir().unwrap();
    let recs = records(200);
    let cancel = CancelToken::new();
    let backend = CountingBackend {
        cancel_on: Some((3, cancel.clone())),
        ..Default::default()
    };
    let out = run_batch(
        &backend,
        &recs,
        &small_style(),
        dir.path(),
        &BatchOpts {
            threading: RenderThreading::pool(Some(4)),
            cancel,
        },
    )
    .unwrap();

    assert!(out.cancelled);
    assert!(out.outcomes.len() >= 3, "jobs already dispatched finish");
    assert!(out.not_attempted > 0);
    assert_eq!(out.outcomes.len() + out.not_attempted, recs.len());

    let idx: Vec<_> = out.outcomes.iter().map(RenderOutcome::sequence_index).collect();
    assert!(idx.windows(2).all(|w| w[0] < w[1]), "outcomes stay in order");
    for o in &out.outcomes {
        if let RenderOutcome::Success { path, .. } = o {
            assert!(path.exists(), "{} missing", path.display());
        }
    }
    assert_eq!(png_names(dir.path()).len(), out.succeeded());
    assert_eq!(
        backend.released.load(Ordering::SeqCst),
        backend.acquired.load(Ordering::SeqCst)
    );
}

#[test]
fn duplicate_sequence_indices_are_rejected_before_rendering() {
    let dir = tempfile::tempdir().unwrap();
    let recs = vec![
        FeatureRecord::new(0, "a", square(0.0, 0.0)),
        FeatureRecord::new(0, "b", square(1.0, 0.0)),
    ];
    let err = run_batch(
        &CpuBackend::new(),
        &recs,
        &small_style(),
        dir.path(),
        &BatchOpts::default(),
    )
    .unwrap_err();
    assert!(err.is_fatal_before_render());
    assert!(png_names(dir.path()).is_empty());
}

#[test]
fn overview_does_not_depend_on_feature_outcomes() {
    let dir = tempfile::tempdir().unwrap();
    let recs = records(3);
    let backend = CountingBackend {
        fail_on: Some(1),
        ..Default::default()
    };
    let batch =
        run_batch(&backend, &recs, &small_style(), dir.path(), &BatchOpts::default()).unwrap();
    assert_eq!(batch.failed(), 1);

    let dest = dir.path().join("000_OVERVIEW.png");
    let out = render_aggregate(&backend, &recs, &small_style(), "UK", &dest);
    assert!(out.is_success());
    assert!(dest.exists());
}

#[test]
fn full_run_writes_images_overview_and_manifest() {
    let dir = tempfile::tempdir().unwrap();
    let out_dir = dir.path().join("out");
    let mut recs = records(4);
    recs[3].label = "Bath & North East Somerset".into();
    recs[1].geometry = Geometry::Unsupported("Point".into());
    let collection = FeatureCollection::from_records("fixture.geojson", recs);

    let report = run_pipeline(&CpuBackend::new(), &collection, &options(&out_dir)).unwrap();
    let manifest = report.manifest.as_ref().unwrap();

    assert_eq!(report.summary.total_records, 4);
    assert_eq!(report.summary.succeeded(), 3);
    assert_eq!(report.summary.failed(), 1);
    assert!(report.summary.aggregate.is_success());
    assert_eq!(
        manifest.files,
        [
            "000_OVERVIEW.png",
            "001_County_0.png",
            "003_County_2.png",
            "004_Bath_and_North_East_Somerset.png",
        ]
    );

    let text = std::fs::read_to_string(out_dir.join("FILE_INDEX.txt")).unwrap();
    assert!(text.contains("Total records: 4\n"));
    assert!(text.contains("Images found: 4\n"));
    assert!(text.contains("Rendered: 3 succeeded, 1 failed\n"));
    assert!(text.contains("Data source: fixture.geojson\n"));
    assert!(text.contains("#2 \"County 1\""));
}

#[test]
fn rerun_produces_the_same_file_names() {
    let dir = tempfile::tempdir().unwrap();
    let mut recs = records(5);
    recs[0].label = "Kent".into();
    recs[4].label = "Kent".into();
    recs[2].label = String::new();
    let collection = FeatureCollection::from_records("fixture", recs);
    let opts = options(dir.path());

    run_pipeline(&CpuBackend::new(), &collection, &opts).unwrap();
    let first = png_names(dir.path());
    run_pipeline(&CpuBackend::new(), &collection, &opts).unwrap();
    let second = png_names(dir.path());

    assert_eq!(first, second);
    assert!(first.contains("001_Kent.png"));
    assert!(first.contains("005_Kent.png"));
    assert!(first.contains("003_unnamed.png"));
}

#[test]
fn empty_collection_still_writes_a_manifest() {
    let dir = tempfile::tempdir().unwrap();
    let collection = FeatureCollection::from_records("empty", Vec::new());

    let report = run_pipeline(&CpuBackend::new(), &collection, &options(dir.path())).unwrap();
    assert!(report.summary.outcomes.is_empty());
    assert!(matches!(
        report.summary.aggregate,
        AggregateOutcome::Failure { .. }
    ));
    let manifest = report.manifest.unwrap();
    assert_eq!(manifest.images_found, 0);
    assert!(dir.path().join("FILE_INDEX.txt").exists());
}

#[test]
fn manifest_counts_what_is_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let recs = records(3);
    let style = small_style();
    let batch =
        run_batch(&CpuBackend::new(), &recs, &style, dir.path(), &BatchOpts::default()).unwrap();
    let aggregate_path = dir.path().join("000_OVERVIEW.png");
    let aggregate = render_aggregate(&CpuBackend::new(), &recs, &style, "t", &aggregate_path);

    std::fs::remove_file(dir.path().join("002_County_1.png")).unwrap();

    let summary = RunSummary {
        title: "t".into(),
        total_records: recs.len(),
        outcomes: batch.outcomes,
        not_attempted: 0,
        cancelled: false,
        aggregate,
        aggregate_path,
        manifest_path: dir.path().join("FILE_INDEX.txt"),
        style_name: "black".into(),
        style,
        crs: Some("EPSG:4326".into()),
        source_name: "mem".into(),
        preview: 5,
    };
    let report = write_manifest(&summary, dir.path(), &summary.manifest_path).unwrap();
    assert_eq!(report.images_found, png_names(dir.path()).len());
    assert_eq!(report.images_found, 3);
    let text = std::fs::read_to_string(&summary.manifest_path).unwrap();
    assert!(text.contains("Spatial reference: EPSG:4326\n"));
    assert!(!text.contains("002_County_1.png"));
}

#[test]
fn uncreatable_output_dir_aborts_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("file");
    std::fs::write(&blocker, b"x").unwrap();
    let collection = FeatureCollection::from_records("x", records(2));

    let err = run_pipeline(&CpuBackend::new(), &collection, &options(&blocker.join("out")))
        .unwrap_err();
    assert!(err.is_fatal_before_render());
}
