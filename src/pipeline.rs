// Pipeline - Configuring -> Parsing -> Aggregating -> Writing -> Done
// Any failure ends the run in Failed, tagged with the stage it happened in

use std::fmt;
use std::fs;
use std::path::PathBuf;

use tracing::{debug, info, warn};

use crate::categorize::Categorizer;
use crate::config::{self, ParseMode, Source};
use crate::error::{ParseError, RunError};
use crate::ledger::{Ledger, SourceBatch};
use crate::parser::{check_supported, parser_for};
use crate::reports::{self, ReportSet};
use crate::writer::OutputWriter;

// ============================================================================
// STATES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Configuring,
    Parsing,
    Aggregating,
    Writing,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Configuring => "configuring",
            Stage::Parsing => "parsing",
            Stage::Aggregating => "aggregating",
            Stage::Writing => "writing",
            Stage::Done => "done",
        };
        f.write_str(name)
    }
}

/// Terminal failure: the stage that failed and why
#[derive(Debug, thiserror::Error)]
#[error("{stage} failed: {error}")]
pub struct PipelineError {
    pub stage: Stage,
    #[source]
    pub error: RunError,
}

impl PipelineError {
    pub fn exit_code(&self) -> u8 {
        self.error.exit_code()
    }
}

// ============================================================================
// OPTIONS & SUMMARY
// ============================================================================

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub config_path: PathBuf,
    /// Overrides `output.directory` from the settings file
    pub output_dir: Option<PathBuf>,
    /// Overrides `parseMode` from the settings file
    pub parse_mode: Option<ParseMode>,
}

impl Default for RunOptions {
    fn default() -> Self {
        RunOptions {
            config_path: PathBuf::from(config::DEFAULT_SETTINGS_FILE),
            output_dir: None,
            parse_mode: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceSummary {
    pub name: String,
    pub files: usize,
    pub records: usize,
    /// Malformed rows dropped in lenient mode
    pub skipped_rows: usize,
    /// Files dropped in lenient mode (unreadable, bad header)
    pub skipped_files: usize,
    /// Rows outside the source type's amount bounds
    pub filtered: usize,
}

#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub parse_mode: ParseMode,
    pub sources: Vec<SourceSummary>,
    pub warnings: Vec<String>,
    pub ledger_records: usize,
    pub duplicates: usize,
    pub files_written: Vec<PathBuf>,
}

impl RunSummary {
    pub fn records_parsed(&self) -> usize {
        self.sources.iter().map(|s| s.records).sum()
    }

    pub fn skipped_rows(&self) -> usize {
        self.sources.iter().map(|s| s.skipped_rows).sum()
    }
}

// ============================================================================
// PIPELINE
// ============================================================================

pub struct Pipeline {
    stage: Stage,
    options: RunOptions,
}

impl Pipeline {
    pub fn new(options: RunOptions) -> Self {
        Pipeline {
            stage: Stage::Configuring,
            options,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    fn advance(&mut self, next: Stage) {
        debug!(from = %self.stage, to = %next, "pipeline transition");
        self.stage = next;
    }

    fn fail(&self, error: impl Into<RunError>) -> PipelineError {
        PipelineError {
            stage: self.stage,
            error: error.into(),
        }
    }

    /// Run every stage once; there is no retry or resume
    pub fn run(mut self) -> Result<RunSummary, PipelineError> {
        info!(config = %self.options.config_path.display(), "loading settings");
        let mut settings =
            config::load_settings(&self.options.config_path).map_err(|e| self.fail(e))?;
        if let Some(dir) = &self.options.output_dir {
            settings.output.directory = dir.clone();
        }
        if let Some(mode) = self.options.parse_mode {
            settings.parse_mode = mode;
        }

        self.advance(Stage::Parsing);
        let mut summary = RunSummary {
            parse_mode: settings.parse_mode,
            ..RunSummary::default()
        };
        let categorizer = Categorizer::new(&settings.categorizations);
        let mut batches = Vec::with_capacity(settings.sources.len());
        for (position, source) in settings.sources.iter().enumerate() {
            let parsed = parse_source(position, source, settings.parse_mode, &categorizer)
                .map_err(|e| self.fail(e))?;
            info!(
                source = %source.name,
                files = parsed.summary.files,
                records = parsed.summary.records,
                skipped = parsed.summary.skipped_rows,
                "parsed source"
            );
            summary.sources.push(parsed.summary);
            summary.warnings.extend(parsed.warnings);
            batches.push(parsed.batch);
        }

        self.advance(Stage::Aggregating);
        let ledger = Ledger::aggregate(batches).map_err(|e| self.fail(e))?;
        summary.ledger_records = ledger.len();
        summary.duplicates = ledger.duplicate_count();
        info!(
            records = ledger.len(),
            duplicates = ledger.duplicate_count(),
            "built unified ledger"
        );

        let categories = reports::report_categories(&settings.category_names(), &ledger);
        let report_set = if settings.output.reports {
            Some(ReportSet::build(&ledger, &categories).map_err(|e| self.fail(e))?)
        } else {
            None
        };

        self.advance(Stage::Writing);
        let writer = OutputWriter::new(settings.output.directory.clone(), categories);
        summary.files_written = writer
            .write(&ledger, report_set.as_ref())
            .map_err(|e| self.fail(e))?;
        info!(
            dir = %writer.output_dir().display(),
            files = summary.files_written.len(),
            "wrote output"
        );

        self.advance(Stage::Done);
        Ok(summary)
    }
}

/// Run the whole pipeline with `options`
pub fn run(options: RunOptions) -> Result<RunSummary, PipelineError> {
    Pipeline::new(options).run()
}

// ============================================================================
// PER-SOURCE PARSING
// ============================================================================

pub struct ParsedSource {
    pub batch: SourceBatch,
    pub summary: SourceSummary,
    pub warnings: Vec<String>,
}

/// Parse every file of one source, applying the parse policy
///
/// Unsupported file types always abort. In strict mode the first parse error
/// aborts; in lenient mode bad rows are skipped, unreadable files or files with
/// a bad header are skipped whole, and each skip is reported as a warning.
pub fn parse_source(
    position: usize,
    source: &Source,
    mode: ParseMode,
    categorizer: &Categorizer,
) -> Result<ParsedSource, RunError> {
    let files = source.resolve_files()?;
    let parser = parser_for(source.source_type.format);

    let mut records = Vec::new();
    let mut warnings = Vec::new();
    let mut summary = SourceSummary {
        name: source.name.clone(),
        files: files.len(),
        ..SourceSummary::default()
    };

    let skip = |err: ParseError, warnings: &mut Vec<String>| -> Result<(), RunError> {
        match mode {
            ParseMode::Strict => Err(RunError::Parse(err)),
            ParseMode::Lenient => {
                warn!(source = %source.name, "{}", err);
                warnings.push(err.to_string());
                Ok(())
            }
        }
    };

    for file in &files {
        check_supported(file, source.source_type.format)?;
        debug!(source = %source.name, file = %file.display(), "parsing file");

        let contents = match fs::read(file) {
            Ok(c) => c,
            Err(e) => {
                skip(
                    ParseError::Io {
                        file: file.clone(),
                        source: e,
                    },
                    &mut warnings,
                )?;
                summary.skipped_files += 1;
                continue;
            }
        };

        let rows = match parser.parse(source, file, &contents) {
            Ok(rows) => rows,
            Err(e) => {
                skip(e, &mut warnings)?;
                summary.skipped_files += 1;
                continue;
            }
        };

        for row in rows {
            match row {
                Ok(record) => {
                    if !source.source_type.accepts_amount(record.amount) {
                        summary.filtered += 1;
                        continue;
                    }
                    records.push(categorizer.apply(record));
                }
                Err(e) => {
                    skip(e, &mut warnings)?;
                    summary.skipped_rows += 1;
                }
            }
        }
    }

    summary.records = records.len();
    Ok(ParsedSource {
        batch: SourceBatch {
            position,
            source_name: source.name.clone(),
            records,
        },
        summary,
        warnings,
    })
}

// ============================================================================
// TESTS
// ============================================================================
