// Error taxonomy - one enum per pipeline stage
// Each stage fails with its own type so the origin of a failure stays visible

use std::path::PathBuf;

use thiserror::Error;

/// Bad, missing or inconsistent settings file
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read settings file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed settings file {path}: {reason}")]
    Malformed { path: PathBuf, reason: String },

    #[error("source '{source_name}' references undefined source type '{source_type}'")]
    UnknownSourceType {
        source_name: String,
        source_type: String,
    },

    #[error("source type '{source_type}' uses unsupported format '{format}'")]
    UnsupportedFormat { source_type: String, format: String },

    #[error("source type '{source_type}' does not map any column to {field}")]
    MissingColumn { source_type: String, field: String },

    #[error("source name '{0}' is used more than once")]
    DuplicateSource(String),

    #[error("cannot list files for source '{source_name}' ({pattern}): {source}")]
    Discovery {
        source_name: String,
        pattern: String,
        #[source]
        source: std::io::Error,
    },
}

/// A file this tool cannot read as a delimited-text export
#[derive(Debug, Error)]
#[error("unsupported export format for {file}: {reason}")]
pub struct UnsupportedFormatError {
    pub file: PathBuf,
    pub reason: String,
}

/// Malformed input, located by file and (when known) line
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("cannot read {file}: {source}")]
    Io {
        file: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{file}: header row is missing column '{column}'")]
    MissingHeader { file: PathBuf, column: String },

    #[error("{file}:{line}: {reason}")]
    Row {
        file: PathBuf,
        line: u64,
        reason: String,
    },

    #[error("{file}: cannot read workbook: {reason}")]
    Workbook { file: PathBuf, reason: String },
}

impl ParseError {
    pub fn row(file: impl Into<PathBuf>, line: u64, reason: impl Into<String>) -> Self {
        ParseError::Row {
            file: file.into(),
            line,
            reason: reason.into(),
        }
    }
}

/// Failure while merging records or totalling them into reports
#[derive(Debug, Error)]
pub enum AggregationError {
    #[error("record from {reference} claims unknown source '{source_name}'")]
    UnknownSource {
        source_name: String,
        reference: String,
    },

    #[error("identity key {0} appears twice in the merged ledger")]
    DuplicateIdentity(String),

    #[error("{dimension} report total for '{key}' is out of range")]
    AmountOverflow { dimension: String, key: String },
}

/// Filesystem failure while producing output
#[derive(Debug, Error)]
pub enum WriteError {
    #[error("cannot create output directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot write rows to {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

/// Any failure of a run, tagged by kind
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    UnsupportedFormat(#[from] UnsupportedFormatError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Aggregation(#[from] AggregationError),

    #[error(transparent)]
    Write(#[from] WriteError),
}

impl RunError {
    /// Process exit code for this failure (sysexits.h values)
    pub fn exit_code(&self) -> u8 {
        match self {
            RunError::Config(_) => 78,
            RunError::UnsupportedFormat(_) | RunError::Parse(_) => 65,
            RunError::Aggregation(_) => 70,
            RunError::Write(_) => 73,
        }
    }
}
