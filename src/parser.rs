// Parser Framework - raw bank export -> TransactionRecord
// Delimited text and workbooks share one row normalizer, driven by each bank's column mapping

use std::collections::HashMap;
use std::fmt;
use std::io::{self, Cursor};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use calamine::{Data, Reader, Xlsx};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use csv::ReaderBuilder;
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use sha2::{Digest, Sha256};

use crate::config::{Field, FormatFamily, Source, SourceType};
use crate::error::{ParseError, UnsupportedFormatError};

pub const UNCATEGORIZED: &str = "Uncategorized";

// ============================================================================
// CORE TYPES
// ============================================================================

/// Where a record came from: file name and 1-based line
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RowRef {
    pub file: String,
    pub line: u64,
}

impl fmt::Display for RowRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

/// Income / Expense / Investment / Transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionKind {
    Income,
    Expense,
    Investment,
    Transfer,
}

impl TransactionKind {
    /// Kind implied by the sign of the amount alone
    pub fn from_amount(amount: Decimal) -> Self {
        if amount > Decimal::ZERO {
            TransactionKind::Income
        } else {
            TransactionKind::Expense
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            TransactionKind::Income => "Income",
            TransactionKind::Expense => "Expense",
            TransactionKind::Investment => "Investment",
            TransactionKind::Transfer => "Transfer",
        }
    }
}

/// One normalized transaction, owned by exactly one source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionRecord {
    pub date: NaiveDate,
    /// Signed: negative leaves the account
    pub amount: Decimal,
    pub currency: String,
    pub description: String,
    pub source_name: String,
    pub account: String,
    pub reference: RowRef,
    pub category: String,
    pub kind: TransactionKind,
}

impl TransactionRecord {
    pub fn new(
        date: NaiveDate,
        amount: Decimal,
        currency: String,
        description: String,
        source_name: String,
        account: String,
        reference: RowRef,
    ) -> Self {
        TransactionRecord {
            date,
            amount,
            currency,
            description,
            source_name,
            account,
            reference,
            category: UNCATEGORIZED.to_string(),
            kind: TransactionKind::from_amount(amount),
        }
    }

    /// Builder pattern: set category and kind
    pub fn with_category(mut self, category: String, kind: TransactionKind) -> Self {
        self.category = category;
        self.kind = kind;
        self
    }

    /// Deduplication key: date + amount + description + account
    ///
    /// Amounts compare by value, so "12.50" and "12.5" collide. Each field is
    /// length-prefixed, so no description can shift bytes into the account.
    pub fn identity_key(&self) -> String {
        let mut hasher = Sha256::new();
        let fields = [
            self.date.to_string(),
            self.amount.normalize().to_string(),
            self.description.clone(),
            self.account.clone(),
        ];
        for field in &fields {
            hasher.update((field.len() as u64).to_le_bytes());
            hasher.update(field.as_bytes());
        }
        format!("{:x}", hasher.finalize())
    }
}

pub type RecordIter<'a> = Box<dyn Iterator<Item = Result<TransactionRecord, ParseError>> + 'a>;

// ============================================================================
// PARSER TRAIT
// ============================================================================

/// A parser for one export format family
///
/// `parse` validates the header eagerly and returns a lazy iterator over the
/// data rows, in file order. Each file is parsed independently.
pub trait BankParser: Send + Sync {
    fn parse<'a>(
        &self,
        source: &'a Source,
        file: &Path,
        contents: &'a [u8],
    ) -> Result<RecordIter<'a>, ParseError>;
}

/// Get the parser for a format family
pub fn parser_for(format: FormatFamily) -> Box<dyn BankParser> {
    match format {
        FormatFamily::Csv | FormatFamily::Tsv | FormatFamily::Ssv => Box::new(DelimitedParser),
        FormatFamily::Xlsx => Box::new(XlsxParser),
    }
}

/// Reject files whose extension does not belong to the configured family
pub fn check_supported(file: &Path, format: FormatFamily) -> Result<(), UnsupportedFormatError> {
    let Some(ext) = file.extension().and_then(|e| e.to_str()) else {
        return Ok(());
    };
    let ext = ext.to_lowercase();
    if format.extensions().contains(&ext.as_str()) {
        return Ok(());
    }
    Err(UnsupportedFormatError {
        file: file.to_path_buf(),
        reason: format!(
            "'.{}' files cannot be read as {:?} exports (expected one of: {})",
            ext,
            format,
            format.extensions().join(", ")
        ),
    })
}

/// Map header names to canonical fields; Date and Amount must be present
fn map_headers<'h>(
    source_type: &SourceType,
    file: &Path,
    headers: impl Iterator<Item = &'h str>,
) -> Result<HashMap<Field, usize>, ParseError> {
    let positions: HashMap<&str, usize> = headers
        .enumerate()
        .map(|(i, h)| (h.trim(), i))
        .collect();

    let mut indices = HashMap::new();
    for (raw_name, field) in &source_type.columns {
        match positions.get(raw_name.trim()) {
            Some(idx) => {
                indices.insert(*field, *idx);
            }
            None if matches!(field, Field::Date | Field::Amount) => {
                return Err(ParseError::MissingHeader {
                    file: file.to_path_buf(),
                    column: raw_name.clone(),
                });
            }
            None => {}
        }
    }
    Ok(indices)
}

// ============================================================================
// DELIMITED TEXT PARSER
// ============================================================================

/// Header-mapped delimited text (CSV, TSV, semicolon-separated)
pub struct DelimitedParser;

impl BankParser for DelimitedParser {
    fn parse<'a>(
        &self,
        source: &'a Source,
        file: &Path,
        contents: &'a [u8],
    ) -> Result<RecordIter<'a>, ParseError> {
        let source_type = &source.source_type;
        let contents = std::str::from_utf8(contents).map_err(|e| ParseError::Io {
            file: file.to_path_buf(),
            source: io::Error::new(io::ErrorKind::InvalidData, e),
        })?;
        let contents = contents.strip_prefix('\u{feff}').unwrap_or(contents);
        let body = skip_lines(contents, source_type.skip_rows);
        let line_offset = source_type.skip_rows as u64;

        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .delimiter(source_type.delimiter)
            .from_reader(body.as_bytes());

        let headers = reader
            .headers()
            .map_err(|e| ParseError::row(file, line_offset + 1, e.to_string()))?
            .clone();
        let indices = map_headers(source_type, file, headers.iter())?;
        let row_parser = RowParser::new(source, file, indices);

        let iter = reader.into_records().filter_map(move |result| match result {
            Ok(record) => {
                let line = record.position().map(|p| p.line()).unwrap_or(0) + line_offset;
                let cells: Vec<&str> = record.iter().collect();
                row_parser.parse_row(line, &cells).transpose()
            }
            Err(e) => {
                let line = e.position().map(|p| p.line()).unwrap_or(0) + line_offset;
                Some(Err(ParseError::row(&row_parser.file, line, e.to_string())))
            }
        });

        Ok(Box::new(iter))
    }
}

// ============================================================================
// WORKBOOK PARSER
// ============================================================================

/// First worksheet of an `.xlsx` export; `skip_rows` counts worksheet rows
pub struct XlsxParser;

impl BankParser for XlsxParser {
    fn parse<'a>(
        &self,
        source: &'a Source,
        file: &Path,
        contents: &'a [u8],
    ) -> Result<RecordIter<'a>, ParseError> {
        let workbook_error = |reason: String| ParseError::Workbook {
            file: file.to_path_buf(),
            reason,
        };

        let mut workbook: Xlsx<_> =
            Xlsx::new(Cursor::new(contents)).map_err(|e| workbook_error(e.to_string()))?;
        let sheet_name = workbook
            .sheet_names()
            .first()
            .cloned()
            .ok_or_else(|| workbook_error("no worksheets".to_string()))?;
        let range = workbook
            .worksheet_range(&sheet_name)
            .map_err(|e| workbook_error(e.to_string()))?;

        // Ranges start at the first used cell, not at A1
        let first_line = range.start().map(|(row, _)| row as u64 + 1).unwrap_or(1);
        let skip_rows = source.source_type.skip_rows as u64;

        let mut rows = range
            .rows()
            .enumerate()
            .map(|(i, cells)| (first_line + i as u64, cells.iter().map(cell_text).collect::<Vec<_>>()))
            .filter(|(line, _)| *line > skip_rows)
            .skip_while(|(_, cells)| is_blank(cells));

        let headers = rows.next().map(|(_, cells)| cells).unwrap_or_default();
        let indices = map_headers(&source.source_type, file, headers.iter().map(String::as_str))?;
        let data: Vec<(u64, Vec<String>)> = rows.collect();
        let row_parser = RowParser::new(source, file, indices);

        let iter = data
            .into_iter()
            .filter_map(move |(line, cells)| row_parser.parse_row(line, &cells).transpose());

        Ok(Box::new(iter))
    }
}

/// Cell value as the text a delimited export would carry
fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
        Data::Float(f) => f.to_string(),
        Data::Int(i) => i.to_string(),
        Data::DateTime(dt) => excel_serial_date(dt.as_f64())
            .map(|d| d.to_string())
            .unwrap_or_else(|| dt.as_f64().to_string()),
        other => other.to_string(),
    }
}

/// Excel serial day number (days since 1899-12-30) to a date
fn excel_serial_date(serial: f64) -> Option<NaiveDate> {
    // 2958465 is 9999-12-31
    if !(0.0..=2_958_465.0).contains(&serial) {
        return None;
    }
    NaiveDate::from_ymd_opt(1899, 12, 30)?.checked_add_signed(Duration::days(serial.floor() as i64))
}

fn is_blank<S: AsRef<str>>(cells: &[S]) -> bool {
    cells.iter().all(|c| c.as_ref().trim().is_empty())
}

// ============================================================================
// ROW NORMALIZATION
// ============================================================================

/// Per-file state for turning raw rows into records
struct RowParser<'a> {
    source: &'a Source,
    file: PathBuf,
    file_name: String,
    indices: HashMap<Field, usize>,
}

impl<'a> RowParser<'a> {
    fn new(source: &'a Source, file: &Path, indices: HashMap<Field, usize>) -> Self {
        RowParser {
            source,
            file: file.to_path_buf(),
            file_name: file
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("unknown")
                .to_string(),
            indices,
        }
    }

    fn field<'r, S: AsRef<str>>(&self, cells: &'r [S], field: Field) -> Option<&'r str> {
        self.indices
            .get(&field)
            .and_then(|idx| cells.get(*idx))
            .map(|c| c.as_ref())
    }

    /// `Ok(None)` for rows with every field blank
    fn parse_row<S: AsRef<str>>(
        &self,
        line: u64,
        cells: &[S],
    ) -> Result<Option<TransactionRecord>, ParseError> {
        if is_blank(cells) {
            return Ok(None);
        }

        let source_type = &self.source.source_type;

        let raw_date = self.field(cells, Field::Date).unwrap_or("").trim();
        if raw_date.is_empty() {
            return Err(ParseError::row(&self.file, line, "missing date"));
        }
        let date = parse_date(raw_date, source_type.date_format.as_deref()).ok_or_else(|| {
            ParseError::row(&self.file, line, format!("invalid date '{}'", raw_date))
        })?;

        let raw_amount = self.field(cells, Field::Amount).unwrap_or("").trim();
        if raw_amount.is_empty() {
            return Err(ParseError::row(&self.file, line, "missing amount"));
        }
        let amount = parse_amount(raw_amount, source_type.decimal_comma).ok_or_else(|| {
            ParseError::row(&self.file, line, format!("invalid amount '{}'", raw_amount))
        })?;
        let amount = apply_modifier(amount, self.source.modifier).ok_or_else(|| {
            ParseError::row(
                &self.file,
                line,
                format!("amount out of range: {} x {}", raw_amount, self.source.modifier),
            )
        })?;

        let currency = self
            .field(cells, Field::Currency)
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_uppercase)
            .unwrap_or_else(|| self.source.currency.clone());

        let text = self.field(cells, Field::Text).unwrap_or("");
        let description = if source_type.clean_text {
            clean_text(text)
        } else {
            text.to_string()
        };

        Ok(Some(TransactionRecord::new(
            date,
            amount,
            currency,
            description,
            self.source.name.clone(),
            self.source.account.clone(),
            RowRef {
                file: self.file_name.clone(),
                line,
            },
        )))
    }
}

// ============================================================================
// FIELD HELPERS
// ============================================================================

/// Drop the first `n` lines (bank preambles before the header row)
fn skip_lines(contents: &str, n: usize) -> &str {
    let mut rest = contents;
    for _ in 0..n {
        match rest.find('\n') {
            Some(pos) => rest = &rest[pos + 1..],
            None => return "",
        }
    }
    rest
}

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%d.%m.%Y", "%m/%d/%Y"];
const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"];

/// Parse a date with the configured format, or the common bank formats
///
/// Date-times (e.g. "2024-01-05 10:22:33") keep only the date.
pub fn parse_date(raw: &str, format: Option<&str>) -> Option<NaiveDate> {
    let raw = raw.trim();

    if let Some(fmt) = format {
        return NaiveDate::parse_from_str(raw, fmt)
            .ok()
            .or_else(|| NaiveDateTime::parse_from_str(raw, fmt).ok().map(|dt| dt.date()))
            // Workbook date cells arrive as ISO dates whatever the configured format
            .or_else(|| NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok());
    }

    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
                .map(|dt| dt.date())
        })
}

/// Parse an exported amount exactly
///
/// Handles "-$855.94", "1 234,56" (with `decimal_comma`), "1,234.56",
/// "+12.00", "−5.00" (unicode minus) and trailing currency codes like "120 SEK".
pub fn parse_amount(raw: &str, decimal_comma: bool) -> Option<Decimal> {
    let cleaned: String = raw
        .trim()
        .trim_matches(|c: char| c.is_alphabetic())
        .chars()
        .filter(|c| !c.is_whitespace() && !matches!(c, '$' | '€' | '£' | '\'' | '+'))
        .map(|c| if c == '\u{2212}' { '-' } else { c })
        .collect();

    let normalized = if decimal_comma {
        cleaned.replace('.', "").replace(',', ".")
    } else {
        cleaned.replace(',', "")
    };

    if normalized.is_empty() || normalized == "-" {
        return None;
    }
    Decimal::from_str(&normalized).ok()
}

/// Scale an amount by the source modifier, keeping at least cent precision
///
/// `None` when the product does not fit a `Decimal`.
fn apply_modifier(amount: Decimal, modifier: Decimal) -> Option<Decimal> {
    if modifier == Decimal::ONE {
        return Some(amount);
    }
    let mut scaled = amount.checked_mul(modifier)?;
    scaled.rescale(amount.scale().max(2));
    Some(scaled)
}

static CARD_STAMP: Lazy<Regex> = Lazy::new(|| {
    // Card purchase stamps such as "K/24-05-05"
    Regex::new(r"[A-Za-z]?/\d{2}-\d{2}-\d{2}").expect("valid card stamp regex")
});

/// Trim, drop card purchase stamps, lowercase
pub fn clean_text(text: &str) -> String {
    CARD_STAMP
        .replace_all(text.trim(), "")
        .trim()
        .to_lowercase()
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use std::path::PathBuf;

    fn source_from(source_type_json: &str) -> Source {
        let json = format!(
            r#"{{
                "sources": [ {{ "name": "bank", "path": "bank.csv", "type": "T", "account": "Main" }} ],
                "sourceTypes": {{ "T": {} }}
            }}"#,
            source_type_json
        );
        let settings = Settings::from_json(&json, Path::new("settings.json"), Path::new("/in"))
            .expect("valid settings");
        settings.sources[0].clone()
    }

    fn plain_source() -> Source {
        source_from(r#"{ "columns": { "Date": "Date", "Amount": "Amount", "Text": "Text" } }"#)
    }

    fn parse_all(source: &Source, contents: &str) -> Vec<Result<TransactionRecord, ParseError>> {
        let parser = parser_for(source.source_type.format);
        parser
            .parse(source, Path::new("/in/bank.csv"), contents.as_bytes())
            .expect("header should parse")
            .collect()
    }

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_parse_csv_preserves_rows() {
        let source = plain_source();
        let contents = "Date,Amount,Text\n\
                        2024-01-05,-45.99,STARBUCKS\n\
                        2024-01-01,2000.00,Salary\n\
                        2024-01-10,-3.50,\"Coffee, large\"\n";

        let records: Vec<_> = parse_all(&source, contents)
            .into_iter()
            .map(|r| r.unwrap())
            .collect();

        assert_eq!(records.len(), 3, "Should parse 3 transactions");
        assert_eq!(records[0].date, NaiveDate::from_ymd_opt(2024, 1, 5).unwrap());
        assert_eq!(records[0].amount.to_string(), "-45.99");
        assert_eq!(records[0].description, "STARBUCKS");
        assert_eq!(records[0].currency, "EUR");
        assert_eq!(records[0].source_name, "bank");
        assert_eq!(records[0].account, "Main");
        assert_eq!(records[0].reference.to_string(), "bank.csv:2");
        assert_eq!(records[1].kind, TransactionKind::Income);
        assert_eq!(records[2].description, "Coffee, large");
        assert_eq!(records[2].reference.line, 4);
    }

    #[test]
    fn test_parse_semicolon_with_preamble_and_decimal_comma() {
        let source = source_from(
            r#"{
                "format": "ssv",
                "skipRows": 2,
                "decimalComma": true,
                "currency": "SEK",
                "columns": { "Bokföringsdatum": "Date", "Belopp": "Amount", "Text": "Text" }
            }"#,
        );
        let contents = "Kontoutdrag\nSkapad 2024-02-01\n\
                        Bokföringsdatum;Text;Belopp\n\
                        2024-01-31;ICA NARA;-1 234,50\n";

        let records: Vec<_> = parse_all(&source, contents);
        let record = records[0].as_ref().unwrap();

        assert_eq!(record.amount, dec("-1234.50"));
        assert_eq!(record.currency, "SEK");
        assert_eq!(record.reference.line, 4);
    }

    #[test]
    fn test_currency_column_overrides_source_currency() {
        let source = source_from(
            r#"{ "columns": { "Date": "Date", "Amount": "Amount", "Currency": "Currency" } }"#,
        );
        let records = parse_all(&source, "Date,Amount,Currency\n2024-03-01,10,usd\n");

        assert_eq!(records[0].as_ref().unwrap().currency, "USD");
    }

    #[test]
    fn test_malformed_row_reports_line_and_continues() {
        let source = plain_source();
        let contents = "Date,Amount,Text\n\
                        2024-01-05,-1.00,ok\n\
                        2024-01-06,abc,bad\n\
                        2024-01-07,-2.00,ok\n";

        let results = parse_all(&source, contents);

        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        match &results[1] {
            Err(ParseError::Row { line, reason, .. }) => {
                assert_eq!(*line, 3);
                assert!(reason.contains("abc"));
            }
            other => panic!("expected row error, got {:?}", other),
        }
        assert!(results[2].is_ok());
    }

    #[test]
    fn test_missing_header_column_fails_fast() {
        let source = plain_source();
        let parser = parser_for(FormatFamily::Csv);
        let result = parser.parse(&source, Path::new("/in/bank.csv"), b"Datum,Amount\n");

        match result {
            Err(ParseError::MissingHeader { column, .. }) => assert_eq!(column, "Date"),
            Err(other) => panic!("expected MissingHeader, got {:?}", other),
            Ok(_) => panic!("expected MissingHeader, got records"),
        }
    }

    #[test]
    fn test_blank_rows_are_skipped() {
        let source = plain_source();
        let records = parse_all(&source, "Date,Amount,Text\n,,\n2024-01-01,1,x\n\n");

        assert_eq!(records.len(), 1);
        assert!(records[0].is_ok());
    }

    #[test]
    fn test_modifier_flips_sign() {
        let json = r#"{
            "sources": [ { "name": "card", "path": "c.csv", "type": "T", "modifier": -1 } ],
            "sourceTypes": { "T": { "columns": { "Date": "Date", "Amount": "Amount" } } }
        }"#;
        let settings = Settings::from_json(json, Path::new("s.json"), Path::new("/")).unwrap();
        let records = parse_all(&settings.sources[0], "Date,Amount\n2024-01-01,3.74\n");

        assert_eq!(records[0].as_ref().unwrap().amount.to_string(), "-3.74");
    }

    #[test]
    fn test_modifier_overflow_is_row_error() {
        let json = r#"{
            "sources": [ { "name": "card", "path": "c.csv", "type": "T", "modifier": -2 } ],
            "sourceTypes": { "T": { "columns": { "Date": "Date", "Amount": "Amount" } } }
        }"#;
        let settings = Settings::from_json(json, Path::new("s.json"), Path::new("/")).unwrap();
        let records = parse_all(
            &settings.sources[0],
            "Date,Amount\n2024-01-01,79228162514264337593543950335\n2024-01-02,1.00\n",
        );

        match &records[0] {
            Err(ParseError::Row { line, reason, .. }) => {
                assert_eq!(*line, 2);
                assert!(reason.contains("out of range"));
            }
            other => panic!("expected row error, got {:?}", other),
        }
        assert_eq!(records[1].as_ref().unwrap().amount, dec("-2.00"));
    }

    #[test]
    fn test_invalid_utf8_is_file_error() {
        let source = plain_source();
        let result = DelimitedParser.parse(&source, Path::new("/in/bank.csv"), b"Date,Amount\n\xff\xfe");

        assert!(matches!(result, Err(ParseError::Io { .. })));
    }

    #[test]
    fn test_parse_xlsx_statement() {
        // Sheet: a title row, then Datum | Text | Belopp; the second date is a date-formatted cell
        let source = source_from(
            r#"{
                "format": "xlsx",
                "skipRows": 1,
                "currency": "SEK",
                "columns": { "Datum": "Date", "Belopp": "Amount", "Text": "Text" }
            }"#,
        );
        let contents = include_bytes!("../tests/fixtures/statement.xlsx");

        let records: Vec<_> = parser_for(FormatFamily::Xlsx)
            .parse(&source, Path::new("/in/statement.xlsx"), contents)
            .expect("workbook should open")
            .map(|r| r.unwrap())
            .collect();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].date, NaiveDate::from_ymd_opt(2024, 1, 31).unwrap());
        assert_eq!(records[0].amount, dec("-1234.5"));
        assert_eq!(records[0].description, "ICA NARA");
        assert_eq!(records[0].currency, "SEK");
        assert_eq!(records[0].reference.to_string(), "statement.xlsx:3");
        assert_eq!(records[1].date, NaiveDate::from_ymd_opt(2024, 2, 1).unwrap());
        assert_eq!(records[1].amount, dec("30000"));
        assert_eq!(records[1].kind, TransactionKind::Income);
        assert_eq!(records[1].reference.line, 4);
    }

    #[test]
    fn test_xlsx_missing_header_column() {
        let source = source_from(
            r#"{ "format": "xlsx", "columns": { "Datum": "Date", "Belopp": "Amount" } }"#,
        );
        let contents = include_bytes!("../tests/fixtures/statement.xlsx");

        // Without skipRows the title row is taken as the header
        let result = XlsxParser.parse(&source, Path::new("/in/statement.xlsx"), contents);
        assert!(matches!(result, Err(ParseError::MissingHeader { .. })));
    }

    #[test]
    fn test_xlsx_garbage_is_workbook_error() {
        let source = source_from(r#"{ "format": "xlsx", "columns": { "d": "Date", "a": "Amount" } }"#);
        let result = XlsxParser.parse(&source, Path::new("/in/x.xlsx"), b"not a zip archive");

        assert!(matches!(result, Err(ParseError::Workbook { .. })));
    }

    #[test]
    fn test_excel_serial_date() {
        assert_eq!(excel_serial_date(45322.0), NaiveDate::from_ymd_opt(2024, 1, 31));
        assert_eq!(excel_serial_date(45322.75), NaiveDate::from_ymd_opt(2024, 1, 31));
        assert_eq!(excel_serial_date(-1.0), None);
        assert_eq!(excel_serial_date(1e300), None);
    }

    #[test]
    fn test_clean_text_option() {
        let source = source_from(
            r#"{ "cleanText": true, "columns": { "Date": "Date", "Amount": "Amount", "Text": "Text" } }"#,
        );
        let records = parse_all(&source, "Date,Amount,Text\n2024-01-01,-5,  ICA NARA K/24-05-05 \n");

        assert_eq!(records[0].as_ref().unwrap().description, "ica nara");
    }

    #[test]
    fn test_parse_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 12, 31).unwrap();
        assert_eq!(parse_date("2024-12-31", None), Some(expected));
        assert_eq!(parse_date("2024/12/31", None), Some(expected));
        assert_eq!(parse_date("31.12.2024", None), Some(expected));
        assert_eq!(parse_date("12/31/2024", None), Some(expected));
        assert_eq!(parse_date("2024-12-31 10:22:33", None), Some(expected));
        assert_eq!(parse_date("31/12/2024", Some("%d/%m/%Y")), Some(expected));
        assert_eq!(parse_date("2024-12-31", Some("%d/%m/%Y")), Some(expected));
        assert_eq!(parse_date("yesterday", None), None);
    }

    #[test]
    fn test_parse_amount_variants() {
        assert_eq!(parse_amount("-$855.94", false), Some(dec("-855.94")));
        assert_eq!(parse_amount("1,234.56", false), Some(dec("1234.56")));
        assert_eq!(parse_amount("1 234,56", true), Some(dec("1234.56")));
        assert_eq!(parse_amount("1.234,56", true), Some(dec("1234.56")));
        assert_eq!(parse_amount("+12.00", false), Some(dec("12.00")));
        assert_eq!(parse_amount("\u{2212}5.00", false), Some(dec("-5.00")));
        assert_eq!(parse_amount("120 SEK", false), Some(dec("120")));
        assert_eq!(parse_amount("abc", false), None);
        assert_eq!(parse_amount("-", false), None);
    }

    #[test]
    fn test_identity_key_compares_amount_by_value() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let make = |amount: &str, source: &str| {
            TransactionRecord::new(
                date,
                dec(amount),
                "EUR".to_string(),
                "Coffee".to_string(),
                source.to_string(),
                "Default".to_string(),
                RowRef {
                    file: "a.csv".to_string(),
                    line: 2,
                },
            )
        };

        assert_eq!(make("12.50", "a").identity_key(), make("12.5", "b").identity_key());
        assert_ne!(make("12.50", "a").identity_key(), make("12.51", "a").identity_key());
    }

    #[test]
    fn test_identity_key_fields_do_not_run_together() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let make = |description: &str, account: &str| {
            TransactionRecord::new(
                date,
                dec("-5"),
                "EUR".to_string(),
                description.to_string(),
                "a".to_string(),
                account.to_string(),
                RowRef {
                    file: "a.csv".to_string(),
                    line: 2,
                },
            )
        };

        assert_ne!(make("kiosk|x", "y").identity_key(), make("kiosk", "x|y").identity_key());
    }

    #[test]
    fn test_check_supported_matches_family() {
        assert!(check_supported(Path::new("seb.csv"), FormatFamily::Csv).is_ok());
        assert!(check_supported(Path::new("SEB.CSV"), FormatFamily::Ssv).is_ok());
        assert!(check_supported(Path::new("export"), FormatFamily::Csv).is_ok());

        let err = check_supported(&PathBuf::from("seb.xlsx"), FormatFamily::Csv).unwrap_err();
        assert!(err.reason.contains("xlsx"));

        assert!(check_supported(Path::new("seb.XLSX"), FormatFamily::Xlsx).is_ok());
        assert!(check_supported(Path::new("seb.csv"), FormatFamily::Xlsx).is_err());
    }
}
