//! Batch dispatch: one job per record, sequential or on a bounded worker pool.
//!
//! A failing record never stops the batch. Every dispatched record yields exactly one outcome,
//! so `outcomes.len() + not_attempted == records.len()` always holds, and `not_attempted` is zero
//! unless the batch was cancelled.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use rayon::prelude::*;

use crate::feature::FeatureRecord;
use crate::foundation::error::{MapError, MapResult};
use crate::job::{RenderJob, RenderOutcome};
use crate::naming::NameSanitizer;
use crate::render::RenderBackend;
use crate::style::StyleConfig;

/// Cooperative cancellation shared between the caller and a running batch.
///
/// Cancelling stops new jobs from being dispatched; jobs already rendering run to completion.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RenderThreading {
    pub parallel: bool,
    /// Worker count for the pool; `None` uses rayon's default.
    pub threads: Option<usize>,
}

impl RenderThreading {
    pub fn sequential() -> Self {
        Self::default()
    }

    pub fn pool(threads: Option<usize>) -> Self {
        Self {
            parallel: true,
            threads,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct BatchOpts {
    pub threading: RenderThreading,
    pub cancel: CancelToken,
}

/// Outcomes of one batch.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BatchOutcomes {
    /// One per dispatched record, in `sequence_index` order.
    pub outcomes: Vec<RenderOutcome>,
    /// Records never dispatched because the batch was cancelled.
    pub not_attempted: usize,
    pub cancelled: bool,
}

impl BatchOutcomes {
    pub fn attempted(&self) -> usize {
        self.outcomes.len()
    }

    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.attempted() - self.succeeded()
    }

    pub fn failures(&self) -> impl Iterator<Item = &RenderOutcome> {
        self.outcomes.iter().filter(|o| !o.is_success())
    }
}

/// Create `dir` and its parents. Tolerates the directory already existing, including when a
/// concurrent caller creates it first.
pub fn ensure_output_dir(dir: &Path) -> MapResult<()> {
    match std::fs::create_dir_all(dir) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists && dir.is_dir() => Ok(()),
        Err(source) => Err(MapError::OutputDir {
            path: dir.to_path_buf(),
            source,
        }),
    }
}

/// Sanitizer sized for a set of records: wide enough for the largest sequence number.
pub fn sanitizer_for(records: &[FeatureRecord]) -> NameSanitizer {
    let max_seq = records
        .iter()
        .map(|r| r.sequence_index.saturating_add(1))
        .max()
        .unwrap_or(0);
    NameSanitizer::for_count(max_seq.max(records.len()))
}

/// Render every record into `output_dir`.
///
/// Errors only for problems found before the first render: an invalid style, duplicate
/// sequence indices, a worker pool that cannot be built, or an output directory that cannot be
/// created. Everything after that is reported per record.
#[tracing::instrument(skip_all, fields(records = records.len(), out = %output_dir.display()))]
pub fn run_batch(
    backend: &dyn RenderBackend,
    records: &[FeatureRecord],
    style: &StyleConfig,
    output_dir: &Path,
    opts: &BatchOpts,
) -> MapResult<BatchOutcomes> {
    style.validate()?;

    let mut seen = HashSet::with_capacity(records.len());
    if let Some(dup) = records.iter().find(|r| !seen.insert(r.sequence_index)) {
        return Err(MapError::validation(format!(
            "duplicate sequence index {}",
            dup.sequence_index
        )));
    }

    let mut ordered: Vec<&FeatureRecord> = records.iter().collect();
    ordered.sort_by_key(|r| r.sequence_index);
    let names = sanitizer_for(records);

    let pool = if opts.threading.parallel {
        Some(build_thread_pool(opts.threading.threads)?)
    } else {
        None
    };

    ensure_output_dir(output_dir)?;
    tracing::info!(
        parallel = opts.threading.parallel,
        threads = ?opts.threading.threads,
        "rendering features"
    );

    let cancel = &opts.cancel;
    let outcomes: Vec<RenderOutcome> = match &pool {
        None => {
            let mut out = Vec::with_capacity(ordered.len());
            for record in &ordered {
                if cancel.is_cancelled() {
                    break;
                }
                out.push(RenderJob::new(record, names, output_dir).run(backend, style));
            }
            out
        }
        Some(pool) => pool.install(|| {
            ordered
                .par_iter()
                .map(|record| {
                    if cancel.is_cancelled() {
                        return None;
                    }
                    Some(RenderJob::new(record, names, output_dir).run(backend, style))
                })
                .collect::<Vec<_>>()
                .into_iter()
                .flatten()
                .collect()
        }),
    };

    let result = BatchOutcomes {
        not_attempted: records.len() - outcomes.len(),
        cancelled: cancel.is_cancelled(),
        outcomes,
    };
    tracing::info!(
        succeeded = result.succeeded(),
        failed = result.failed(),
        not_attempted = result.not_attempted,
        "feature batch finished"
    );
    Ok(result)
}

fn build_thread_pool(threads: Option<usize>) -> MapResult<rayon::ThreadPool> {
    if let Some(n) = threads
        && n == 0
    {
        return Err(MapError::validation(
            "render threading 'threads' must be >= 1 when set",
        ));
    }

    let mut builder = rayon::ThreadPoolBuilder::new().thread_name(|i| format!("render-{i}"));
    if let Some(n) = threads {
        builder = builder.num_threads(n);
    }
    builder
        .build()
        .map_err(|e| MapError::Other(anyhow::anyhow!("failed to build rayon thread pool: {e}")))
}
