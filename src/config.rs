use std::path::PathBuf;

/// Progress update interval (detail message every N index lines)
pub const PROGRESS_INTERVAL: u64 = 100_000;

/// Placeholder written to every enrichment column of an unmatched row
pub const NOT_FOUND: &str = "NOT FOUND";

/// Inserted between the input file stem and its extension to name the output
pub const OUTPUT_SUFFIX: &str = "_enriched";

/// Columns appended to the input schema, in output order
pub const ENRICHED_COLUMNS: [&str; 5] = [
    "full_name",
    "location",
    "phones",
    "emails",
    "linkedin_url",
];

/// Separator used when flattening phone and email lists
pub const LIST_SEPARATOR: &str = ", ";

pub const READ_BUFFER_SIZE: usize = 256 * 1024;
pub const WRITE_BUFFER_SIZE: usize = 128 * 1024;

/// Rows enriched between cancellation checks
pub const ENRICH_BATCH_SIZE: usize = 10_000;

/// Malformed index lines logged individually before switching to a summary
pub const MAX_LOGGED_DECODE_ERRORS: u64 = 10;

/// What the scanner does with an index line that fails to decode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DecodePolicy {
    /// Count the line, warn, and keep scanning.
    #[default]
    Skip,
    /// Abort the run at the first malformed line.
    Halt,
}

/// Everything a single enrichment run needs. Built by the front-end, consumed by the pipeline.
#[derive(Debug, Clone)]
pub struct EnrichConfig {
    pub input: PathBuf,
    pub index: PathBuf,
    pub key_column: String,
    /// Explicit destination; derived from `input` when absent.
    pub output: Option<PathBuf>,
    pub progress_interval: u64,
    pub parallel: bool,
    pub decode_policy: DecodePolicy,
}

impl EnrichConfig {
    pub fn new(input: &str, index: &str, key_column: &str) -> Self {
        Self {
            input: clean_path(input),
            index: clean_path(index),
            key_column: key_column.trim().to_string(),
            output: None,
            progress_interval: PROGRESS_INTERVAL,
            parallel: true,
            decode_policy: DecodePolicy::Skip,
        }
    }

    pub fn with_output(mut self, output: &str) -> Self {
        self.output = Some(clean_path(output));
        self
    }

    pub fn with_progress_interval(mut self, interval: u64) -> Self {
        self.progress_interval = interval.max(1);
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn with_decode_policy(mut self, policy: DecodePolicy) -> Self {
        self.decode_policy = policy;
        self
    }
}

/// Strips whitespace and surrounding double quotes, as left behind by "copy as path".
pub fn clean_path(raw: &str) -> PathBuf {
    PathBuf::from(raw.trim().trim_matches('"'))
}
