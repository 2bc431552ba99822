use crate::config::{OUTPUT_SUFFIX, READ_BUFFER_SIZE, WRITE_BUFFER_SIZE};
use crate::enrich::EnrichedRow;
use crate::error::EnrichError;
use anyhow::{anyhow, Context, Result};
use csv::{ReaderBuilder, Writer};
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Column values in header order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InputRow {
    values: Vec<String>,
}

impl InputRow {
    pub fn new(values: Vec<String>) -> Self {
        Self { values }
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.values.get(index).map(String::as_str)
    }

    pub fn values(&self) -> &[String] {
        &self.values
    }
}

#[derive(Debug, Clone, Default)]
pub struct InputTable {
    headers: Vec<String>,
    rows: Vec<InputRow>,
}

impl InputTable {
    pub fn new(headers: Vec<String>, rows: Vec<InputRow>) -> Self {
        Self { headers, rows }
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[InputRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of the key column. Header names are compared after trimming.
    pub fn key_index(&self, column: &str) -> Result<usize> {
        let wanted = column.trim();
        self.headers
            .iter()
            .position(|h| h.trim() == wanted)
            .ok_or_else(|| {
                EnrichError::KeyColumnNotFound {
                    column: wanted.to_string(),
                    available: self.headers.join(", "),
                }
                .into()
            })
    }

    /// Raw key values in row order; a row too short to hold the column yields "".
    pub fn keys(&self, key_index: usize) -> impl Iterator<Item = &str> {
        self.rows.iter().map(move |r| r.get(key_index).unwrap_or(""))
    }
}

pub trait RowSource {
    fn load(self) -> Result<InputTable>;
}

pub trait RowSink {
    /// Receives the complete output exactly once per successful run.
    fn write(&mut self, headers: &[String], rows: &[EnrichedRow<'_>]) -> Result<()>;
}

impl RowSource for InputTable {
    fn load(self) -> Result<InputTable> {
        Ok(self)
    }
}

pub struct CsvSource {
    path: PathBuf,
}

impl CsvSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl RowSource for CsvSource {
    fn load(self) -> Result<InputTable> {
        let path = self.path;
        if !path.is_file() {
            return Err(EnrichError::InputNotFound(path).into());
        }

        let file =
            File::open(&path).with_context(|| format!("Failed to open table: {:?}", path))?;
        let mut reader =
            ReaderBuilder::new().from_reader(BufReader::with_capacity(READ_BUFFER_SIZE, file));

        let headers: Vec<String> = reader
            .headers()
            .with_context(|| format!("Failed to read header row of {:?}", path))?
            .iter()
            .map(str::to_string)
            .collect();

        let mut rows = Vec::new();
        for (i, result) in reader.records().enumerate() {
            let record =
                result.with_context(|| format!("Failed to read row {} of {:?}", i + 1, path))?;
            rows.push(InputRow::new(record.iter().map(str::to_string).collect()));
        }

        info!(path = ?path, columns = headers.len(), rows = rows.len(), "Table loaded");
        Ok(InputTable::new(headers, rows))
    }
}

/// Writes to a sibling `.tmp` file and renames it into place once flushed.
pub struct CsvSink {
    path: PathBuf,
}

impl CsvSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

/// `report.csv` -> `report.csv.tmp`, in the same directory so the final rename stays on one
/// filesystem.
fn temp_path_for(path: &Path) -> PathBuf {
    let mut name: OsString = path.file_name().map(OsString::from).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

fn write_csv(path: &Path, headers: &[String], rows: &[EnrichedRow<'_>]) -> Result<()> {
    let file = File::create(path).with_context(|| format!("Failed to create {:?}", path))?;
    let mut writer = Writer::from_writer(BufWriter::with_capacity(WRITE_BUFFER_SIZE, file));

    writer.write_record(headers)?;
    for row in rows {
        writer.write_record(row.values())?;
    }
    writer
        .flush()
        .with_context(|| format!("Failed to flush {:?}", path))?;

    let file = writer
        .into_inner()
        .map_err(|e| anyhow!("Failed to flush {:?}: {}", path, e.error()))?
        .into_inner()
        .map_err(|e| e.into_error())
        .with_context(|| format!("Failed to flush {:?}", path))?;
    file.sync_all()
        .with_context(|| format!("Failed to sync {:?}", path))?;
    Ok(())
}

impl RowSink for CsvSink {
    fn write(&mut self, headers: &[String], rows: &[EnrichedRow<'_>]) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {:?}", parent))?;
        }

        let tmp_path = temp_path_for(&self.path);
        debug!(tmp = ?tmp_path, "Writing output to temporary file");

        let result = write_csv(&tmp_path, headers, rows).and_then(|()| {
            fs::rename(&tmp_path, &self.path)
                .with_context(|| format!("Failed to rename temp output to: {:?}", self.path))
        });
        if let Err(e) = result {
            if let Err(cleanup) = fs::remove_file(&tmp_path) {
                warn!(error = %cleanup, path = ?tmp_path, "Failed to remove temporary output");
            }
            return Err(e);
        }

        info!(path = ?self.path, rows = rows.len(), "Output written");
        Ok(())
    }
}

/// Collects output in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl RowSink for MemorySink {
    fn write(&mut self, headers: &[String], rows: &[EnrichedRow<'_>]) -> Result<()> {
        self.headers = headers.to_vec();
        self.rows = rows
            .iter()
            .map(|r| r.values().map(str::to_string).collect())
            .collect();
        Ok(())
    }
}

/// `dir/people.csv` -> `dir/people_enriched.csv`; a name without extension just gets the
/// suffix.
pub fn output_path_for(input: &Path) -> Result<PathBuf> {
    let stem = input
        .file_stem()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| EnrichError::OutputPath(format!("{:?} has no file name", input)))?;

    let mut name = OsString::from(stem);
    name.push(OUTPUT_SUFFIX);
    if let Some(ext) = input.extension() {
        name.push(".");
        name.push(ext);
    }
    Ok(input.with_file_name(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ENRICHED_COLUMNS;
    use crate::enrich::enrich_row;
    use crate::scan::MatchTable;
    use tempfile::TempDir;

    fn table() -> InputTable {
        InputTable::new(
            vec!["id".into(), " company ".into()],
            vec![
                InputRow::new(vec!["a".into(), "Acme".into()]),
                InputRow::new(vec!["".into(), "Globex".into()]),
            ],
        )
    }

    #[test]
    fn output_path_keeps_extension() {
        assert_eq!(
            output_path_for(Path::new("/data/people.csv")).unwrap(),
            PathBuf::from("/data/people_enriched.csv")
        );
        assert_eq!(
            output_path_for(Path::new("people.tsv")).unwrap(),
            PathBuf::from("people_enriched.tsv")
        );
    }

    #[test]
    fn output_path_without_extension() {
        assert_eq!(
            output_path_for(Path::new("/data/people")).unwrap(),
            PathBuf::from("/data/people_enriched")
        );
    }

    #[test]
    fn output_path_needs_file_name() {
        let err = output_path_for(Path::new("/")).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<EnrichError>(),
            Some(EnrichError::OutputPath(_))
        ));
    }

    #[test]
    fn key_index_trims_header_names() {
        let t = table();
        assert_eq!(t.key_index("id").unwrap(), 0);
        assert_eq!(t.key_index("company").unwrap(), 1);
    }

    #[test]
    fn key_index_missing_column() {
        let err = table().key_index("liid").unwrap_err();
        match err.downcast_ref::<EnrichError>() {
            Some(EnrichError::KeyColumnNotFound { column, available }) => {
                assert_eq!(column, "liid");
                assert_eq!(available, "id,  company ");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn keys_in_row_order() {
        let t = table();
        assert_eq!(t.keys(0).collect::<Vec<_>>(), vec!["a", ""]);
        assert_eq!(t.keys(5).collect::<Vec<_>>(), vec!["", ""]);
    }

    #[test]
    fn csv_source_reads_quoted_fields() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("in.csv");
        fs::write(&path, "id,note\nx1,\"hello, world\"\nx2,\"multi\nline\"\n")?;

        let t = CsvSource::new(&path).load()?;
        assert_eq!(t.headers(), &["id".to_string(), "note".to_string()]);
        assert_eq!(t.len(), 2);
        assert_eq!(t.rows()[0].get(1), Some("hello, world"));
        assert_eq!(t.rows()[1].get(1), Some("multi\nline"));
        Ok(())
    }

    #[test]
    fn csv_source_missing_file() {
        let err = CsvSource::new("/no/such/table.csv").load().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<EnrichError>(),
            Some(EnrichError::InputNotFound(_))
        ));
    }

    #[test]
    fn csv_source_ragged_row_is_an_error() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("bad.csv");
        fs::write(&path, "id,name\n1,a\n2,b,extra\n")?;
        let err = CsvSource::new(&path).load().unwrap_err();
        assert!(format!("{:#}", err).contains("row 2"));
        Ok(())
    }

    #[test]
    fn csv_sink_writes_and_removes_temp() -> Result<()> {
        let dir = TempDir::new()?;
        let out = dir.path().join("nested").join("out.csv");
        let t = table();
        let matches = MatchTable::default();
        let rows: Vec<_> = t.rows().iter().map(|r| enrich_row(r, 0, &matches)).collect();

        let headers: Vec<String> = ["id", "company"]
            .into_iter()
            .chain(ENRICHED_COLUMNS)
            .map(str::to_string)
            .collect();
        let mut sink = CsvSink::new(&out);
        sink.write(&headers, &rows)?;

        assert!(out.exists());
        assert!(!temp_path_for(&out).exists());
        let content = fs::read_to_string(&out)?;
        let mut lines = content.lines();
        assert_eq!(
            lines.next(),
            Some("id,company,full_name,location,phones,emails,linkedin_url")
        );
        assert_eq!(
            lines.next(),
            Some("a,Acme,NOT FOUND,NOT FOUND,NOT FOUND,NOT FOUND,NOT FOUND")
        );
        Ok(())
    }

    #[test]
    fn csv_sink_failure_leaves_no_output() -> Result<()> {
        let dir = TempDir::new()?;
        // A directory in the way makes the final rename fail after the temp file is written.
        let out = dir.path().join("out.csv");
        fs::create_dir(&out)?;
        let t = table();
        let matches = MatchTable::default();
        let rows: Vec<_> = t.rows().iter().map(|r| enrich_row(r, 0, &matches)).collect();

        let mut sink = CsvSink::new(&out);
        let err = sink.write(&["id".into(), "company".into()], &rows).unwrap_err();

        assert!(format!("{:#}", err).contains("rename"));
        assert!(!temp_path_for(&out).exists());
        assert!(out.is_dir());
        Ok(())
    }

    #[test]
    fn csv_sink_unwritable_temp_is_an_error() -> Result<()> {
        let dir = TempDir::new()?;
        let out = dir.path().join("out.csv");
        fs::create_dir(temp_path_for(&out))?;
        let t = table();
        let matches = MatchTable::default();
        let rows: Vec<_> = t.rows().iter().map(|r| enrich_row(r, 0, &matches)).collect();

        assert!(CsvSink::new(&out).write(&["id".into()], &rows).is_err());
        assert!(!out.exists());
        Ok(())
    }

    #[test]
    fn temp_path_is_sibling() {
        assert_eq!(
            temp_path_for(Path::new("/d/out.csv")),
            PathBuf::from("/d/out.csv.tmp")
        );
    }

    #[test]
    fn memory_sink_collects_values() -> Result<()> {
        let t = table();
        let matches = MatchTable::default();
        let rows: Vec<_> = t.rows().iter().map(|r| enrich_row(r, 0, &matches)).collect();
        let mut sink = MemorySink::default();
        sink.write(&["h".into()], &rows)?;
        assert_eq!(sink.rows.len(), 2);
        assert_eq!(sink.rows[1][1], "Globex");
        assert_eq!(sink.rows[1].len(), 7);
        Ok(())
    }
}
