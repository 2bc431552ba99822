use std::path::PathBuf;
use thiserror::Error;

/// Failures a front-end can tell apart via `downcast_ref`.
#[derive(Error, Debug)]
pub enum EnrichError {
    #[error("Input table not found: {0:?}")]
    InputNotFound(PathBuf),

    #[error("Index file not found: {0:?}")]
    IndexNotFound(PathBuf),

    #[error("Key column name must not be empty")]
    EmptyKeyColumn,

    #[error("Column '{column}' not found in table (available: {available})")]
    KeyColumnNotFound { column: String, available: String },

    #[error("Cannot determine output path: {0}")]
    OutputPath(String),

    /// Only raised under `DecodePolicy::Halt`.
    #[error("Malformed index line {line}: {message}")]
    MalformedLine { line: u64, message: String },

    #[error("Run cancelled")]
    Cancelled,
}

impl EnrichError {
    /// True for failures detected before any index line was read.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            EnrichError::InputNotFound(_)
                | EnrichError::IndexNotFound(_)
                | EnrichError::EmptyKeyColumn
                | EnrichError::KeyColumnNotFound { .. }
                | EnrichError::OutputPath(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn precondition_classification() {
        assert!(EnrichError::EmptyKeyColumn.is_precondition());
        assert!(EnrichError::IndexNotFound(PathBuf::from("x")).is_precondition());
        assert!(!EnrichError::Cancelled.is_precondition());
        assert!(!EnrichError::MalformedLine {
            line: 3,
            message: "eof".into()
        }
        .is_precondition());
    }

    #[test]
    fn key_column_message_lists_columns() {
        let err = EnrichError::KeyColumnNotFound {
            column: "liid".into(),
            available: "id, name".into(),
        };
        assert_eq!(
            err.to_string(),
            "Column 'liid' not found in table (available: id, name)"
        );
    }
}
