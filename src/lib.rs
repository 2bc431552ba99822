//! Enrichr: identifier-keyed table enrichment from a line-delimited record index
//!
//! Given a table with an identifier column and a (potentially huge) JSON-lines index, the
//! pipeline appends `full_name, location, phones, emails, linkedin_url` to every row:
//!
//! 1. **Targets** -- Collect the distinct, trimmed identifiers from the key column
//! 2. **Scan** -- Stream the index line by line, keeping only records for requested
//!    identifiers, and stop as soon as every identifier has been found
//! 3. **Enrich** -- Project each row against the (now frozen) match table, in parallel,
//!    preserving row order; unmatched rows get `NOT FOUND` in all five columns
//! 4. **Write** -- Hand the rows to a sink; the CSV sink writes a temp file and renames it
//!
//! # Architecture
//!
//! - **Streaming index reads** -- Never loads the index into memory; one line at a time,
//!   with transparent `.bz2` decompression
//! - **Bounded memory** -- The match table never holds more than one record per target
//! - **Early termination** -- Reading stops the moment the last target is matched
//! - **Tolerant decoding** -- Malformed lines are counted and skipped (or fatal, on request)
//! - **Parallel projection** -- rayon over a read-only table, lock-free atomic counters
//! - **Cooperative cancellation** -- Checked between index lines and row batches
//!
//! # Key Modules
//!
//! - [`reader`] -- Line-delimited index reader
//! - [`targets`] -- Target identifier set and key normalization
//! - [`scan`] -- Index scan with early termination, producing the [`scan::MatchTable`]
//! - [`enrich`] -- Row projection and sentinel handling
//! - [`pipeline`] -- Phase orchestration, status reporting, background worker
//! - [`table`] -- Row sources and sinks (CSV, in-memory)
//! - [`status`] -- Headline/detail status channels
//! - [`models`] -- Index record decoding
//! - [`stats`] -- Atomic counters for the enrichment pass
//! - [`config`] -- Constants and run configuration
//!
//! # Example Usage
//!
//! ```bash
//! enrichr --input leads.csv --index people.jsonl.bz2 --column liid -v
//! ```

pub mod cancel;
pub mod config;
pub mod enrich;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod reader;
pub mod scan;
pub mod stats;
pub mod status;
pub mod table;
pub mod targets;
