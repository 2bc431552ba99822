use crate::cancel::CancellationToken;
use crate::config::{EnrichConfig, ENRICHED_COLUMNS};
use crate::enrich::enrich_rows;
use crate::error::EnrichError;
use crate::reader::{IndexLine, IndexReader};
use crate::scan::{scan, ScanOptions, ScanSummary};
use crate::stats::{EnrichmentCounts, EnrichmentStats};
use crate::status::{format_count, StatusSink};
use crate::table::{output_path_for, CsvSink, CsvSource, RowSink, RowSource};
use crate::targets::TargetSet;
use anyhow::{Context, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;
use tracing::{error, info};

/// Steps of a run, announced on the headline channel as each one starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Validating,
    ReadingTable,
    BuildingTargets,
    Scanning,
    Enriching,
    Writing,
    Done,
    Cancelled,
    Failed,
}

impl Phase {
    pub fn headline(self) -> &'static str {
        match self {
            Phase::Validating => "Validating inputs...",
            Phase::ReadingTable => "Reading table...",
            Phase::BuildingTargets => "Collecting target IDs...",
            Phase::Scanning => "Scanning index...",
            Phase::Enriching => "Enriching rows...",
            Phase::Writing => "Writing output...",
            Phase::Done => "Done!",
            Phase::Cancelled => "Cancelled",
            Phase::Failed => "Failed",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct EngineOptions {
    pub scan: ScanOptions,
    pub parallel: bool,
}

impl From<&EnrichConfig> for EngineOptions {
    fn from(config: &EnrichConfig) -> Self {
        Self {
            scan: ScanOptions {
                progress_interval: config.progress_interval,
                decode_policy: config.decode_policy,
            },
            parallel: config.parallel,
        }
    }
}

/// Final statistics of a successful run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub total_rows: u64,
    pub non_empty_keys: u64,
    pub empty_keys: u64,
    pub distinct_keys: u64,
    pub scan: ScanSummary,
    pub enrichment: EnrichmentCounts,
    pub output_path: Option<PathBuf>,
    pub elapsed_secs: f64,
}

/// Full run against files: CSV table in, line-delimited index, CSV table out.
pub fn run(
    config: &EnrichConfig,
    status: &dyn StatusSink,
    cancel: &CancellationToken,
) -> Result<RunSummary> {
    let started = Instant::now();
    let result = run_files(config, status, cancel, started);
    if let Ok(summary) = &result {
        status.headline(Phase::Done.headline());
        if let Some(path) = &summary.output_path {
            status.detail(&format!("File saved to: {}", path.display()));
        }
    }
    report_failure(result, status)
}

/// Same pipeline over caller-supplied source, index lines and sink.
pub fn run_with<S, I, K>(
    source: S,
    index: I,
    sink: &mut K,
    key_column: &str,
    options: &EngineOptions,
    status: &dyn StatusSink,
    cancel: &CancellationToken,
) -> Result<RunSummary>
where
    S: RowSource,
    I: IntoIterator<Item = Result<IndexLine>>,
    K: RowSink,
{
    let started = Instant::now();
    let result = if key_column.trim().is_empty() {
        Err(EnrichError::EmptyKeyColumn.into())
    } else {
        run_engine(source, index, sink, key_column, options, status, cancel, started)
    };
    if let Ok(summary) = &result {
        status.headline(Phase::Done.headline());
        status.detail(&format!(
            "Enriched {} rows",
            format_count(summary.enrichment.rows_enriched)
        ));
    }
    report_failure(result, status)
}

/// Runs [`run`] on a dedicated worker thread. `on_complete` is invoked exactly once, from
/// the worker, with the run's result.
pub fn spawn<F>(
    config: EnrichConfig,
    status: Arc<dyn StatusSink>,
    cancel: CancellationToken,
    on_complete: F,
) -> Result<JoinHandle<()>>
where
    F: FnOnce(Result<RunSummary>) + Send + 'static,
{
    thread::Builder::new()
        .name("enrichr-worker".to_string())
        .spawn(move || {
            let result = run(&config, status.as_ref(), &cancel);
            on_complete(result);
        })
        .context("Failed to spawn enrichment worker")
}

fn report_failure(result: Result<RunSummary>, status: &dyn StatusSink) -> Result<RunSummary> {
    if let Err(e) = &result {
        if matches!(e.downcast_ref::<EnrichError>(), Some(EnrichError::Cancelled)) {
            info!("Run cancelled");
            status.headline(Phase::Cancelled.headline());
            status.detail("");
        } else {
            error!("Enrichment failed: {:#}", e);
            status.headline(Phase::Failed.headline());
            status.detail(&format!("{:#}", e));
        }
    }
    result
}

fn run_files(
    config: &EnrichConfig,
    status: &dyn StatusSink,
    cancel: &CancellationToken,
    started: Instant,
) -> Result<RunSummary> {
    status.headline(Phase::Validating.headline());
    status.detail("");

    if config.key_column.trim().is_empty() {
        return Err(EnrichError::EmptyKeyColumn.into());
    }
    if !config.input.is_file() {
        return Err(EnrichError::InputNotFound(config.input.clone()).into());
    }
    if !config.index.is_file() {
        return Err(EnrichError::IndexNotFound(config.index.clone()).into());
    }

    let output_path = match &config.output {
        Some(path) => path.clone(),
        None => output_path_for(&config.input)?,
    };
    if same_file(&output_path, &config.input) {
        return Err(EnrichError::OutputPath(format!(
            "{:?} would overwrite the input table",
            output_path
        ))
        .into());
    }

    info!(
        input = ?config.input,
        index = ?config.index,
        output = ?output_path,
        column = %config.key_column,
        "Starting enrichment"
    );

    let index = IndexReader::open(&config.index)?;
    let mut sink = CsvSink::new(&output_path);
    let mut summary = run_engine(
        CsvSource::new(&config.input),
        index,
        &mut sink,
        &config.key_column,
        &EngineOptions::from(config),
        status,
        cancel,
        started,
    )?;
    summary.output_path = Some(output_path);
    Ok(summary)
}

/// Resolves symlinks and `..` so aliases of one file compare equal. The output usually does not
/// exist yet, so its parent directory is resolved instead.
fn resolve_path(path: &Path) -> Option<PathBuf> {
    if let Ok(resolved) = path.canonicalize() {
        return Some(resolved);
    }
    let name = path.file_name()?;
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    parent.canonicalize().ok().map(|p| p.join(name))
}

fn same_file(a: &Path, b: &Path) -> bool {
    a == b
        || matches!(
            (resolve_path(a), resolve_path(b)),
            (Some(x), Some(y)) if x == y
        )
}

#[allow(clippy::too_many_arguments)]
fn run_engine<S, I, K>(
    source: S,
    index: I,
    sink: &mut K,
    key_column: &str,
    options: &EngineOptions,
    status: &dyn StatusSink,
    cancel: &CancellationToken,
    started: Instant,
) -> Result<RunSummary>
where
    S: RowSource,
    I: IntoIterator<Item = Result<IndexLine>>,
    K: RowSink,
{
    status.headline(Phase::ReadingTable.headline());
    let table = source.load()?;
    let key_index = table.key_index(key_column)?;

    status.headline(Phase::BuildingTargets.headline());
    let targets = TargetSet::from_keys(table.keys(key_index));
    status.detail(&format!(
        "Found {} IDs in your table ({} empty rows)",
        format_count(targets.non_empty_rows()),
        format_count(targets.empty_rows())
    ));
    info!(
        rows = table.len(),
        non_empty = targets.non_empty_rows(),
        empty = targets.empty_rows(),
        distinct = targets.distinct(),
        "Targets collected"
    );

    status.headline(Phase::Scanning.headline());
    let outcome = scan(index, &targets, &options.scan, status, cancel)?;

    status.headline(Phase::Enriching.headline());
    let stats = EnrichmentStats::new();
    let enriched = enrich_rows(
        table.rows(),
        key_index,
        &outcome.matches,
        options.parallel,
        &stats,
        cancel,
    )?;
    status.detail(&format!(
        "{} rows matched, {} not found",
        format_count(stats.matched()),
        format_count(stats.unmatched())
    ));

    if cancel.is_cancelled() {
        return Err(EnrichError::Cancelled.into());
    }

    status.headline(Phase::Writing.headline());
    let headers: Vec<String> = table
        .headers()
        .iter()
        .map(String::as_str)
        .chain(ENRICHED_COLUMNS)
        .map(str::to_string)
        .collect();
    sink.write(&headers, &enriched)
        .context("Failed to write enriched table")?;

    let summary = RunSummary {
        total_rows: table.len() as u64,
        non_empty_keys: targets.non_empty_rows(),
        empty_keys: targets.empty_rows(),
        distinct_keys: targets.distinct() as u64,
        scan: outcome.summary,
        enrichment: stats.snapshot(),
        output_path: None,
        elapsed_secs: started.elapsed().as_secs_f64(),
    };
    info!(
        rows = summary.total_rows,
        matched = summary.enrichment.rows_matched,
        scanned = summary.scan.records_scanned,
        duration_secs = summary.elapsed_secs,
        "Enrichment complete"
    );
    Ok(summary)
}
