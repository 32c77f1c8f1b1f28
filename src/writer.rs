// Output Writer - ledger and reports -> files, atomically
// Every file goes through a uniquely named temp file in the target directory, then a rename

use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use csv::WriterBuilder;
use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::WriteError;
use crate::ledger::Ledger;
use crate::parser::TransactionRecord;
use crate::reports::{self, Calendar, Report, ReportSet, TOP_N};

pub const TRANSACTIONS_FILE: &str = "transactions_all.csv";
pub const INCOMES_FILE: &str = "incomes/incomes_all.csv";
pub const INVESTMENTS_FILE: &str = "investments/investments_all.csv";
pub const UNCATEGORIZED_FILE: &str = "uncategorized.txt";
pub const EXPENSES_DIR: &str = "expenses";

/// Leading columns of every transaction CSV; one `Amount<Category>` column
/// per report category follows. Downstream tools rely on this order.
pub const TRANSACTION_COLUMNS: [&str; 21] = [
    "Date",
    "Year",
    "QuarterNumber",
    "Quarter",
    "Season",
    "Month",
    "MonthName",
    "DayOfMonth",
    "Week",
    "WeekNumber",
    "Weekday",
    "IsWeekend",
    "Amount",
    "Currency",
    "Description",
    "Category",
    "Type",
    "Account",
    "Source",
    "Reference",
    "Id",
];

// ============================================================================
// ATOMIC WRITE
// ============================================================================

/// Write `path` via a temp file + rename
///
/// If `write` fails, or flushing/renaming fails, the temp file is removed and
/// whatever was at `path` before is left untouched.
pub fn write_atomic<F>(path: &Path, write: F) -> Result<(), WriteError>
where
    F: FnOnce(&mut dyn Write) -> csv::Result<()>,
{
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir).map_err(|e| WriteError::CreateDir {
        path: dir.clone(),
        source: e,
    })?;

    let io_err = |e: io::Error| WriteError::Io {
        path: path.to_path_buf(),
        source: e,
    };

    let mut tmp = NamedTempFile::new_in(&dir).map_err(io_err)?;
    {
        let mut out = BufWriter::new(tmp.as_file_mut());
        write(&mut out).map_err(|e| WriteError::Csv {
            path: path.to_path_buf(),
            source: e,
        })?;
        out.flush().map_err(io_err)?;
    }
    tmp.as_file().sync_all().map_err(io_err)?;
    tmp.persist(path).map_err(|e| io_err(e.error))?;

    debug!(path = %path.display(), "wrote output file");
    Ok(())
}

// ============================================================================
// OUTPUT WRITER
// ============================================================================

pub struct OutputWriter {
    dir: PathBuf,
    categories: Vec<String>,
}

impl OutputWriter {
    /// `categories` name the per-category amount columns, in order
    pub fn new(dir: PathBuf, categories: Vec<String>) -> Self {
        OutputWriter { dir, categories }
    }

    pub fn output_dir(&self) -> &Path {
        &self.dir
    }

    /// Write every output file; returns their paths in write order
    pub fn write(
        &self,
        ledger: &Ledger,
        reports: Option<&ReportSet>,
    ) -> Result<Vec<PathBuf>, WriteError> {
        let mut written = Vec::new();

        let all: Vec<&TransactionRecord> = ledger.records().iter().collect();
        written.push(self.write_transactions(TRANSACTIONS_FILE, &all)?);
        written.push(self.write_transactions(INCOMES_FILE, &reports::incomes(ledger))?);
        written.push(self.write_transactions(INVESTMENTS_FILE, &reports::investments(ledger))?);
        written.push(self.write_uncategorized(ledger)?);

        if let Some(set) = reports {
            let base = self.dir.join(EXPENSES_DIR);
            for report in &set.all_time {
                written.extend(write_report(&base, report)?);
            }
            for (year, year_reports) in &set.by_year {
                let year_dir = base.join(year.to_string());
                for report in year_reports {
                    written.extend(write_report(&year_dir, report)?);
                }
            }
        }

        Ok(written)
    }

    fn write_transactions(
        &self,
        relative: &str,
        records: &[&TransactionRecord],
    ) -> Result<PathBuf, WriteError> {
        let path = self.dir.join(relative);
        write_atomic(&path, |out| write_transaction_csv(out, records, &self.categories))?;
        Ok(path)
    }

    fn write_uncategorized(&self, ledger: &Ledger) -> Result<PathBuf, WriteError> {
        let path = self.dir.join(UNCATEGORIZED_FILE);
        let descriptions = reports::uncategorized_descriptions(ledger);
        write_atomic(&path, |out| {
            for description in descriptions {
                writeln!(out, "{}", description)?;
            }
            Ok(())
        })?;
        Ok(path)
    }
}

/// Header row, then one row per record in ledger order
pub fn write_transaction_csv(
    out: &mut dyn Write,
    records: &[&TransactionRecord],
    categories: &[String],
) -> csv::Result<()> {
    let mut writer = WriterBuilder::new().has_headers(false).from_writer(out);

    let mut header: Vec<String> = TRANSACTION_COLUMNS.iter().map(|c| c.to_string()).collect();
    header.extend(categories.iter().map(|c| format!("Amount{}", c)));
    writer.write_record(&header)?;

    for record in records {
        let cal = Calendar::of(record.date);
        let mut row = vec![
            record.date.to_string(),
            cal.year.to_string(),
            cal.quarter_number.to_string(),
            cal.quarter,
            cal.season.to_string(),
            cal.month,
            cal.month_name,
            cal.day_of_month.to_string(),
            cal.week,
            cal.week_number.to_string(),
            cal.weekday,
            cal.is_weekend.to_string(),
            record.amount.to_string(),
            record.currency.clone(),
            record.description.clone(),
            record.category.clone(),
            record.kind.name().to_string(),
            record.account.clone(),
            record.source_name.clone(),
            record.reference.to_string(),
            record.identity_key(),
        ];
        row.extend(categories.iter().map(|c| {
            if *c == record.category {
                record.amount.to_string()
            } else {
                "0".to_string()
            }
        }));
        writer.write_record(&row)?;
    }

    writer.flush()?;
    Ok(())
}

/// `<stem>-dataAll.csv` and `<stem>-dataTop25.csv` for one report
fn write_report(dir: &Path, report: &Report) -> Result<Vec<PathBuf>, WriteError> {
    let stem = report.dimension.file_stem();
    let all_path = dir.join(format!("{}-dataAll.csv", stem));
    let top_path = dir.join(format!("{}-dataTop{}.csv", stem, TOP_N));

    let all_rows: Vec<_> = report.rows.iter().collect();
    write_atomic(&all_path, |out| write_report_csv(out, report, &all_rows))?;
    write_atomic(&top_path, |out| write_report_csv(out, report, &report.top(TOP_N)))?;

    Ok(vec![all_path, top_path])
}

fn write_report_csv(
    out: &mut dyn Write,
    report: &Report,
    rows: &[&reports::ReportRow],
) -> csv::Result<()> {
    let mut writer = WriterBuilder::new().has_headers(false).from_writer(out);
    writer.write_record(report.header())?;
    for row in rows {
        writer.write_record(report.row_values(row))?;
    }
    writer.flush()?;
    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================
