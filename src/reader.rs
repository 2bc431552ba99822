use crate::config::READ_BUFFER_SIZE;
use crate::error::EnrichError;
use crate::models::IndexRecord;
use anyhow::{Context, Result};
use bzip2::read::MultiBzDecoder;
use serde_json::Value;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::debug;

/// A line that could not be turned into an [`IndexRecord`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeError {
    /// 1-based physical line number in the index.
    pub line: u64,
    pub message: String,
}

#[derive(Debug, Clone)]
pub enum IndexLine {
    Record(IndexRecord),
    Malformed(DecodeError),
}

/// Streams an index one line at a time. Blank lines are skipped; each non-blank line is
/// decoded on its own so one bad line never poisons its neighbours. I/O errors end the stream.
pub struct IndexReader<R> {
    reader: R,
    buf: Vec<u8>,
    line: u64,
    failed: bool,
}

impl IndexReader<Box<dyn BufRead + Send>> {
    /// Opens an index file; paths ending in `.bz2` are decompressed on the fly.
    pub fn open(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(EnrichError::IndexNotFound(path.to_path_buf()).into());
        }
        let file =
            File::open(path).with_context(|| format!("Failed to open index file: {:?}", path))?;

        let compressed = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("bz2"));
        debug!(path = ?path, compressed, "Opening index");

        let reader: Box<dyn BufRead + Send> = if compressed {
            Box::new(BufReader::with_capacity(
                READ_BUFFER_SIZE,
                MultiBzDecoder::new(file),
            ))
        } else {
            Box::new(BufReader::with_capacity(READ_BUFFER_SIZE, file))
        };
        Ok(Self::new(reader))
    }
}

impl<R: BufRead> IndexReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::new(),
            line: 0,
            failed: false,
        }
    }
}

fn decode_line(bytes: &[u8], line: u64) -> IndexLine {
    match serde_json::from_slice::<Value>(bytes) {
        Ok(value) => match IndexRecord::from_value(value) {
            Some(record) => IndexLine::Record(record),
            None => IndexLine::Malformed(DecodeError {
                line,
                message: "expected a JSON object".to_string(),
            }),
        },
        Err(e) => IndexLine::Malformed(DecodeError {
            line,
            message: e.to_string(),
        }),
    }
}

impl<R: BufRead> Iterator for IndexReader<R> {
    type Item = Result<IndexLine>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        loop {
            self.buf.clear();
            match self.reader.read_until(b'\n', &mut self.buf) {
                Ok(0) => return None,
                Ok(_) => {
                    self.line += 1;
                    let trimmed = self.buf.trim_ascii();
                    if trimmed.is_empty() {
                        continue;
                    }
                    return Some(Ok(decode_line(trimmed, self.line)));
                }
                Err(e) => {
                    self.failed = true;
                    let line = self.line + 1;
                    return Some(
                        Err(e).with_context(|| format!("Failed to read index at line {}", line)),
                    );
                }
            }
        }
    }
}
