// Bank Ledger - Core Library
// Bank exports -> one deduplicated, ordered ledger + reports

pub mod categorize;
pub mod config;
pub mod error;
pub mod ledger;
pub mod parser;
pub mod pipeline;
pub mod reports;
pub mod writer;

// Re-export commonly used types
pub use categorize::{Categorizer, Classification};
pub use config::{
    load_settings, Categorization, Field, FormatFamily, OutputSettings, ParseMode, Settings,
    Source, SourceType,
};
pub use error::{
    AggregationError, ConfigError, ParseError, RunError, UnsupportedFormatError, WriteError,
};
pub use ledger::{DuplicateMatch, Ledger, SourceBatch};
pub use parser::{
    parser_for, BankParser, DelimitedParser, RowRef, TransactionKind, TransactionRecord,
    XlsxParser,
};
pub use pipeline::{run, Pipeline, PipelineError, RunOptions, RunSummary, SourceSummary, Stage};
pub use reports::{Report, ReportSet};
pub use writer::{write_atomic, OutputWriter};
