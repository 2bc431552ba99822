use crate::cancel::CancellationToken;
use crate::config::{DecodePolicy, MAX_LOGGED_DECODE_ERRORS, PROGRESS_INTERVAL};
use crate::error::EnrichError;
use crate::models::IndexRecord;
use crate::reader::IndexLine;
use crate::status::{format_count, StatusSink};
use crate::targets::TargetSet;
use anyhow::Result;
use rustc_hash::FxHashMap;
use serde::Serialize;
use tracing::{debug, info, warn};

/// Index records for the requested identifiers only, keyed by trimmed identifier.
///
/// Filled once by [`scan`] and read-only afterwards. An identifier that appears more than
/// once in the index keeps its first record.
#[derive(Debug, Default)]
pub struct MatchTable {
    records: FxHashMap<String, IndexRecord>,
}

impl MatchTable {
    fn with_capacity(capacity: usize) -> Self {
        let mut records = FxHashMap::default();
        records.reserve(capacity);
        Self { records }
    }

    /// Returns false, leaving the table untouched, when the key is already present.
    fn insert_first(&mut self, record: IndexRecord) -> bool {
        if self.records.contains_key(&record.key) {
            return false;
        }
        self.records.insert(record.key.clone(), record);
        true
    }

    pub fn get(&self, key: &str) -> Option<&IndexRecord> {
        self.records.get(key)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl FromIterator<IndexRecord> for MatchTable {
    fn from_iter<T: IntoIterator<Item = IndexRecord>>(iter: T) -> Self {
        let mut table = MatchTable::default();
        for record in iter {
            table.insert_first(record);
        }
        table
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ScanOptions {
    pub progress_interval: u64,
    pub decode_policy: DecodePolicy,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            progress_interval: PROGRESS_INTERVAL,
            decode_policy: DecodePolicy::Skip,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScanSummary {
    /// Non-blank index lines consumed, malformed ones included.
    pub records_scanned: u64,
    pub matched: u64,
    pub goal: u64,
    pub malformed_lines: u64,
    /// Records whose identifier had already been matched earlier in the index.
    pub duplicate_hits: u64,
    /// True when the scan stopped because every target was found.
    pub goal_reached: bool,
}

pub struct ScanOutcome {
    pub matches: MatchTable,
    pub summary: ScanSummary,
}

/// Streams index lines into a [`MatchTable`], stopping as soon as every distinct target has
/// been matched. Lines after that point are never pulled from `lines`.
pub fn scan<I>(
    lines: I,
    targets: &TargetSet,
    options: &ScanOptions,
    status: &dyn StatusSink,
    cancel: &CancellationToken,
) -> Result<ScanOutcome>
where
    I: IntoIterator<Item = Result<IndexLine>>,
{
    let goal = targets.match_goal();
    let interval = options.progress_interval.max(1);
    let mut matches = MatchTable::with_capacity(targets.distinct());
    let mut summary = ScanSummary {
        goal,
        ..Default::default()
    };

    status.detail("Scanning index...");
    info!(goal, "Scanning index");

    let mut lines = lines.into_iter();
    while summary.matched < goal {
        if cancel.is_cancelled() {
            info!(scanned = summary.records_scanned, "Scan cancelled");
            return Err(EnrichError::Cancelled.into());
        }

        let Some(line) = lines.next() else {
            break;
        };
        summary.records_scanned += 1;

        match line? {
            IndexLine::Record(record) => {
                if !record.key.is_empty() && targets.contains(&record.key) {
                    if matches.insert_first(record) {
                        summary.matched += 1;
                    } else {
                        summary.duplicate_hits += 1;
                    }
                }
            }
            IndexLine::Malformed(err) => {
                summary.malformed_lines += 1;
                if options.decode_policy == DecodePolicy::Halt {
                    return Err(EnrichError::MalformedLine {
                        line: err.line,
                        message: err.message,
                    }
                    .into());
                }
                if summary.malformed_lines <= MAX_LOGGED_DECODE_ERRORS {
                    warn!(line = err.line, error = %err.message, "Skipping malformed index line");
                } else if summary.malformed_lines == MAX_LOGGED_DECODE_ERRORS + 1 {
                    warn!("Further malformed index lines will only be counted");
                }
            }
        }

        if summary.records_scanned % interval == 0 {
            status.detail(&format!(
                "Scanned {} lines, matched {} IDs",
                format_count(summary.records_scanned),
                format_count(summary.matched)
            ));
            debug!(
                scanned = summary.records_scanned,
                matched = summary.matched,
                "Scan progress"
            );
        }
    }

    summary.goal_reached = summary.matched == goal;

    if summary.malformed_lines > 0 {
        warn!(
            count = summary.malformed_lines,
            "Malformed index lines were skipped"
        );
    }
    status.detail(&format!(
        "Match complete: {} / {} IDs matched",
        format_count(summary.matched),
        format_count(goal)
    ));
    info!(
        scanned = summary.records_scanned,
        matched = summary.matched,
        goal,
        duplicates = summary.duplicate_hits,
        goal_reached = summary.goal_reached,
        "Scan finished"
    );

    Ok(ScanOutcome { matches, summary })
}
