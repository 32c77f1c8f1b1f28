// Configuration Loader - settings.json -> validated Settings
// Sources, source types (format descriptors), categorization keywords, policy

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::ConfigError;

pub const DEFAULT_SETTINGS_FILE: &str = "settings.json";
pub const DEFAULT_ACCOUNT: &str = "Default";
pub const DEFAULT_CURRENCY: &str = "EUR";
pub const DEFAULT_OUTPUT_DIR: &str = "output";

// ============================================================================
// POLICY & FORMAT ENUMS
// ============================================================================

/// What to do with a malformed row
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParseMode {
    /// First malformed row aborts the whole run
    #[default]
    Strict,
    /// Malformed rows are skipped and reported as warnings
    Lenient,
}

/// Supported export format families; every one has a header row mapped through `columns`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatFamily {
    Csv,
    Tsv,
    Ssv,
    /// First worksheet of an Excel workbook
    Xlsx,
}

impl FormatFamily {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "csv" => Some(FormatFamily::Csv),
            "tsv" => Some(FormatFamily::Tsv),
            "ssv" => Some(FormatFamily::Ssv),
            "xlsx" | "excel" => Some(FormatFamily::Xlsx),
            _ => None,
        }
    }

    /// Default field delimiter for this family (unused by workbooks)
    pub fn delimiter(&self) -> u8 {
        match self {
            FormatFamily::Csv | FormatFamily::Xlsx => b',',
            FormatFamily::Tsv => b'\t',
            FormatFamily::Ssv => b';',
        }
    }

    /// File extensions accepted for this family
    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            FormatFamily::Csv => &["csv", "txt"],
            FormatFamily::Tsv => &["tsv", "txt", "csv"],
            FormatFamily::Ssv => &["csv", "txt"],
            FormatFamily::Xlsx => &["xlsx", "xlsm"],
        }
    }
}

/// Canonical transaction field a raw export column maps to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
pub enum Field {
    Date,
    Amount,
    #[serde(alias = "Description")]
    Text,
    Currency,
}

impl Field {
    pub fn name(&self) -> &'static str {
        match self {
            Field::Date => "Date",
            Field::Amount => "Amount",
            Field::Text => "Text",
            Field::Currency => "Currency",
        }
    }
}

// ============================================================================
// VALIDATED SETTINGS
// ============================================================================

/// Format descriptor: how one bank's export is laid out
#[derive(Debug, Clone, PartialEq)]
pub struct SourceType {
    pub name: String,
    pub format: FormatFamily,
    pub delimiter: u8,
    /// Preamble lines (or worksheet rows) before the header row
    pub skip_rows: usize,
    /// Raw header name -> canonical field
    pub columns: BTreeMap<String, Field>,
    pub date_format: Option<String>,
    pub decimal_comma: bool,
    pub currency: Option<String>,
    pub clean_text: bool,
    pub min_amount: Option<Decimal>,
    pub max_amount: Option<Decimal>,
}

impl SourceType {
    /// Whether an amount passes the min/max bounds
    pub fn accepts_amount(&self, amount: Decimal) -> bool {
        if let Some(min) = self.min_amount {
            if amount < min {
                return false;
            }
        }
        if let Some(max) = self.max_amount {
            if amount > max {
                return false;
            }
        }
        true
    }
}

/// Source Descriptor: one named input (file or filename pattern)
#[derive(Debug, Clone, PartialEq)]
pub struct Source {
    pub name: String,
    /// Resolved against the settings file directory
    pub path: PathBuf,
    pub source_type: SourceType,
    pub account: String,
    pub modifier: Decimal,
    /// Currency used when the export has no currency column
    pub currency: String,
}

impl Source {
    /// Files this source covers, sorted by path
    ///
    /// A plain path is returned as-is (a missing file surfaces later as a read error).
    /// A `*`/`?` pattern in the file name is expanded against its directory; a missing
    /// directory matches nothing. Patterns in directory names are rejected at load time.
    pub fn resolve_files(&self) -> Result<Vec<PathBuf>, ConfigError> {
        let file_pattern = self
            .path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("");

        if !is_pattern(file_pattern) {
            return Ok(vec![self.path.clone()]);
        }

        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(source = %self.name, dir = %dir.display(), "input directory does not exist");
                return Ok(Vec::new());
            }
            Err(e) => {
                return Err(ConfigError::Discovery {
                    source_name: self.name.clone(),
                    pattern: self.path.display().to_string(),
                    source: e,
                })
            }
        };

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| ConfigError::Discovery {
                source_name: self.name.clone(),
                pattern: self.path.display().to_string(),
                source: e,
            })?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let matched = path
                .file_name()
                .and_then(|n| n.to_str())
                .map(|n| wildcard_match(file_pattern, n))
                .unwrap_or(false);
            if matched {
                files.push(path);
            }
        }

        files.sort();
        debug!(source = %self.name, count = files.len(), "resolved input files");
        Ok(files)
    }
}

/// Keyword list for one category, in configuration order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Categorization {
    pub category: String,
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputSettings {
    pub directory: PathBuf,
    pub reports: bool,
}

/// Everything one run needs, loaded once at startup
#[derive(Debug, Clone)]
pub struct Settings {
    pub sources: Vec<Source>,
    pub source_types: BTreeMap<String, SourceType>,
    pub categorizations: Vec<Categorization>,
    pub parse_mode: ParseMode,
    pub default_currency: String,
    pub output: OutputSettings,
}

// ============================================================================
// RAW JSON SHAPE
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct RawSettings {
    #[serde(default)]
    sources: Vec<RawSource>,
    #[serde(default)]
    source_types: BTreeMap<String, RawSourceType>,
    #[serde(default)]
    categorizations: Map<String, Value>,
    #[serde(default)]
    parse_mode: ParseMode,
    #[serde(default = "default_currency")]
    default_currency: String,
    #[serde(default)]
    output: RawOutput,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct RawSource {
    name: Option<String>,
    path: String,
    #[serde(rename = "type")]
    source_type: String,
    account: Option<String>,
    modifier: Option<Decimal>,
    currency: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct RawSourceType {
    #[serde(default = "default_format")]
    format: String,
    delimiter: Option<char>,
    #[serde(default)]
    skip_rows: usize,
    columns: BTreeMap<String, Field>,
    date_format: Option<String>,
    #[serde(default)]
    decimal_comma: bool,
    currency: Option<String>,
    #[serde(default)]
    clean_text: bool,
    min_amount: Option<Decimal>,
    max_amount: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct RawOutput {
    #[serde(default = "default_output_dir")]
    directory: String,
    #[serde(default = "default_reports")]
    reports: bool,
}

impl Default for RawOutput {
    fn default() -> Self {
        RawOutput {
            directory: default_output_dir(),
            reports: default_reports(),
        }
    }
}

fn default_currency() -> String {
    DEFAULT_CURRENCY.to_string()
}

fn default_format() -> String {
    "csv".to_string()
}

fn default_output_dir() -> String {
    DEFAULT_OUTPUT_DIR.to_string()
}

fn default_reports() -> bool {
    true
}

// ============================================================================
// LOADING
// ============================================================================

/// Load and validate settings from a JSON file
///
/// Relative source paths and the output directory resolve against the
/// directory holding the settings file.
pub fn load_settings<P: AsRef<Path>>(path: P) -> Result<Settings, ConfigError> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|e| ConfigError::Read {
        path: path.to_path_buf(),
        source: e,
    })?;

    let base_dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    Settings::from_json(&content, path, &base_dir)
}

impl Settings {
    /// Parse and validate settings from JSON text
    ///
    /// `origin` is only used in error messages.
    pub fn from_json(content: &str, origin: &Path, base_dir: &Path) -> Result<Self, ConfigError> {
        let raw: RawSettings =
            serde_json::from_str(content).map_err(|e| ConfigError::Malformed {
                path: origin.to_path_buf(),
                reason: e.to_string(),
            })?;

        let mut source_types = BTreeMap::new();
        for (name, raw_type) in raw.source_types {
            let source_type = validate_source_type(&name, raw_type, origin)?;
            source_types.insert(name, source_type);
        }

        let mut seen_names = HashSet::new();
        let mut sources = Vec::with_capacity(raw.sources.len());
        for raw_source in raw.sources {
            let name = raw_source
                .name
                .clone()
                .unwrap_or_else(|| raw_source.path.clone());
            if !seen_names.insert(name.clone()) {
                return Err(ConfigError::DuplicateSource(name));
            }

            let source_type = source_types
                .get(&raw_source.source_type)
                .cloned()
                .ok_or_else(|| ConfigError::UnknownSourceType {
                    source_name: name.clone(),
                    source_type: raw_source.source_type.clone(),
                })?;

            if has_wildcard_dir(&raw_source.path) {
                return Err(ConfigError::Malformed {
                    path: origin.to_path_buf(),
                    reason: format!(
                        "source '{}': wildcards are only allowed in the file name ({})",
                        name, raw_source.path
                    ),
                });
            }

            let currency = raw_source
                .currency
                .or_else(|| source_type.currency.clone())
                .unwrap_or_else(|| raw.default_currency.clone());

            sources.push(Source {
                name,
                path: base_dir.join(&raw_source.path),
                source_type,
                account: raw_source
                    .account
                    .unwrap_or_else(|| DEFAULT_ACCOUNT.to_string()),
                modifier: raw_source.modifier.unwrap_or(Decimal::ONE),
                currency,
            });
        }

        let categorizations = validate_categorizations(raw.categorizations, origin)?;

        Ok(Settings {
            sources,
            source_types,
            categorizations,
            parse_mode: raw.parse_mode,
            default_currency: raw.default_currency,
            output: OutputSettings {
                directory: base_dir.join(raw.output.directory),
                reports: raw.output.reports,
            },
        })
    }

    /// Category names in configuration order
    pub fn category_names(&self) -> Vec<String> {
        self.categorizations
            .iter()
            .map(|c| c.category.clone())
            .collect()
    }
}

fn validate_source_type(
    name: &str,
    raw: RawSourceType,
    origin: &Path,
) -> Result<SourceType, ConfigError> {
    let format = FormatFamily::from_name(&raw.format).ok_or_else(|| {
        ConfigError::UnsupportedFormat {
            source_type: name.to_string(),
            format: raw.format.clone(),
        }
    })?;

    let delimiter = match raw.delimiter {
        Some(c) if c.is_ascii() => c as u8,
        Some(c) => {
            return Err(ConfigError::Malformed {
                path: origin.to_path_buf(),
                reason: format!("source type '{}' has non-ASCII delimiter '{}'", name, c),
            })
        }
        None => format.delimiter(),
    };

    for required in [Field::Date, Field::Amount] {
        if !raw.columns.values().any(|f| *f == required) {
            return Err(ConfigError::MissingColumn {
                source_type: name.to_string(),
                field: required.name().to_string(),
            });
        }
    }

    let mut mapped = HashSet::new();
    for field in raw.columns.values() {
        if !mapped.insert(*field) {
            return Err(ConfigError::Malformed {
                path: origin.to_path_buf(),
                reason: format!(
                    "source type '{}' maps more than one column to {}",
                    name,
                    field.name()
                ),
            });
        }
    }

    Ok(SourceType {
        name: name.to_string(),
        format,
        delimiter,
        skip_rows: raw.skip_rows,
        columns: raw.columns,
        date_format: raw.date_format,
        decimal_comma: raw.decimal_comma,
        currency: raw.currency,
        clean_text: raw.clean_text,
        min_amount: raw.min_amount,
        max_amount: raw.max_amount,
    })
}

fn validate_categorizations(
    raw: Map<String, Value>,
    origin: &Path,
) -> Result<Vec<Categorization>, ConfigError> {
    let mut categorizations = Vec::with_capacity(raw.len());
    for (category, value) in raw {
        let keywords: Vec<String> =
            serde_json::from_value(value).map_err(|e| ConfigError::Malformed {
                path: origin.to_path_buf(),
                reason: format!("categorization '{}': {}", category, e),
            })?;
        categorizations.push(Categorization {
            category,
            keywords: keywords.into_iter().map(|k| k.to_lowercase()).collect(),
        });
    }
    Ok(categorizations)
}

// ============================================================================
// FILENAME PATTERNS
// ============================================================================

fn is_pattern(text: &str) -> bool {
    text.contains('*') || text.contains('?')
}

/// Whether any directory component of `path` holds a `*`/`?` pattern
fn has_wildcard_dir(path: &str) -> bool {
    Path::new(path)
        .parent()
        .map(|dir| dir.iter().any(|c| c.to_str().map(is_pattern).unwrap_or(false)))
        .unwrap_or(false)
}

/// Case-insensitive filename match supporting `*` (any run) and `?` (one char)
pub fn wildcard_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.to_lowercase().chars().collect();
    let text: Vec<char> = text.to_lowercase().chars().collect();

    let (mut p, mut t) = (0, 0);
    let mut star: Option<(usize, usize)> = None;

    while t < text.len() {
        if p < pattern.len() && (pattern[p] == '?' || pattern[p] == text[t]) {
            p += 1;
            t += 1;
        } else if p < pattern.len() && pattern[p] == '*' {
            star = Some((p, t));
            p += 1;
        } else if let Some((star_p, star_t)) = star {
            // Let the last star swallow one more character
            p = star_p + 1;
            t = star_t + 1;
            star = Some((star_p, star_t + 1));
        } else {
            return false;
        }
    }

    pattern[p..].iter().all(|c| *c == '*')
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    const SETTINGS: &str = r#"{
        "sources": [
            { "name": "seb", "path": "input/seb_*.csv", "type": "SEB", "account": "Checking" },
            { "path": "input/revolut.csv", "type": "Revolut", "modifier": -1 }
        ],
        "sourceTypes": {
            "SEB": {
                "format": "ssv",
                "skipRows": 5,
                "columns": { "Bokföringsdatum": "Date", "Belopp": "Amount", "Text": "Text" },
                "decimalComma": true,
                "currency": "SEK",
                "cleanText": true,
                "minAmount": -50000
            },
            "Revolut": {
                "columns": { "Completed Date": "Date", "Amount": "Amount", "Description": "Description", "Currency": "Currency" }
            }
        },
        "categorizations": {
            "Groceries": ["ICA", "Coop"],
            "Transfers": ["swish"]
        },
        "parseMode": "lenient"
    }"#;

    fn load(json: &str) -> Result<Settings, ConfigError> {
        Settings::from_json(json, Path::new("settings.json"), Path::new("/data"))
    }

    #[test]
    fn test_load_full_settings() {
        let settings = load(SETTINGS).unwrap();

        assert_eq!(settings.sources.len(), 2);
        assert_eq!(settings.parse_mode, ParseMode::Lenient);
        assert_eq!(settings.default_currency, "EUR");
        assert_eq!(settings.output.directory, PathBuf::from("/data/output"));
        assert!(settings.output.reports);

        let seb = &settings.sources[0];
        assert_eq!(seb.name, "seb");
        assert_eq!(seb.path, PathBuf::from("/data/input/seb_*.csv"));
        assert_eq!(seb.account, "Checking");
        assert_eq!(seb.modifier, Decimal::ONE);
        assert_eq!(seb.currency, "SEK");
        assert_eq!(seb.source_type.format, FormatFamily::Ssv);
        assert_eq!(seb.source_type.delimiter, b';');
        assert_eq!(seb.source_type.skip_rows, 5);
        assert_eq!(seb.source_type.columns.get("Belopp"), Some(&Field::Amount));
        assert_eq!(
            seb.source_type.min_amount,
            Some(Decimal::from_str("-50000").unwrap())
        );
    }

    #[test]
    fn test_source_defaults() {
        let settings = load(SETTINGS).unwrap();
        let revolut = &settings.sources[1];

        // Unnamed source falls back to its path
        assert_eq!(revolut.name, "input/revolut.csv");
        assert_eq!(revolut.account, DEFAULT_ACCOUNT);
        assert_eq!(revolut.modifier, Decimal::NEGATIVE_ONE);
        assert_eq!(revolut.currency, "EUR");
        assert_eq!(revolut.source_type.format, FormatFamily::Csv);
        assert_eq!(revolut.source_type.columns.get("Description"), Some(&Field::Text));
    }

    #[test]
    fn test_categorizations_keep_order_and_lowercase() {
        let settings = load(SETTINGS).unwrap();

        assert_eq!(settings.category_names(), vec!["Groceries", "Transfers"]);
        assert_eq!(settings.categorizations[0].keywords, vec!["ica", "coop"]);
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let result = load_settings("/definitely/not/here/settings.json");
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn test_malformed_json() {
        let result = load("{ \"sources\": [ ");
        assert!(matches!(result, Err(ConfigError::Malformed { .. })));
    }

    #[test]
    fn test_unknown_source_type() {
        let json = r#"{ "sources": [ { "path": "a.csv", "type": "Nordea" } ] }"#;
        match load(json) {
            Err(ConfigError::UnknownSourceType { source_type, .. }) => {
                assert_eq!(source_type, "Nordea")
            }
            other => panic!("expected UnknownSourceType, got {:?}", other),
        }
    }

    #[test]
    fn test_unsupported_format() {
        let json = r#"{
            "sourceTypes": { "X": { "format": "pdf", "columns": { "d": "Date", "a": "Amount" } } }
        }"#;
        assert!(matches!(
            load(json),
            Err(ConfigError::UnsupportedFormat { .. })
        ));
    }

    #[test]
    fn test_xlsx_format_family() {
        let json = r#"{
            "sourceTypes": { "X": { "format": "xlsx", "skipRows": 1, "columns": { "d": "Date", "a": "Amount" } } }
        }"#;
        let settings = load(json).unwrap();

        assert_eq!(settings.source_types["X"].format, FormatFamily::Xlsx);
        assert_eq!(FormatFamily::Xlsx.extensions(), &["xlsx", "xlsm"]);
    }

    #[test]
    fn test_wildcard_in_directory_is_rejected() {
        let json = r#"{
            "sources": [ { "name": "b", "path": "input/*/seb.csv", "type": "X" } ],
            "sourceTypes": { "X": { "columns": { "d": "Date", "a": "Amount" } } }
        }"#;
        match load(json) {
            Err(ConfigError::Malformed { reason, .. }) => assert!(reason.contains("input/*/seb.csv")),
            other => panic!("expected Malformed, got {:?}", other),
        }

        let ok = r#"{
            "sources": [ { "name": "b", "path": "input/2024/seb_*.csv", "type": "X" } ],
            "sourceTypes": { "X": { "columns": { "d": "Date", "a": "Amount" } } }
        }"#;
        assert!(load(ok).is_ok());
    }

    #[test]
    fn test_missing_amount_column() {
        let json = r#"{ "sourceTypes": { "X": { "columns": { "d": "Date" } } } }"#;
        match load(json) {
            Err(ConfigError::MissingColumn { field, .. }) => assert_eq!(field, "Amount"),
            other => panic!("expected MissingColumn, got {:?}", other),
        }
    }

    #[test]
    fn test_duplicate_source_name() {
        let json = r#"{
            "sources": [
                { "name": "a", "path": "a.csv", "type": "X" },
                { "name": "a", "path": "b.csv", "type": "X" }
            ],
            "sourceTypes": { "X": { "columns": { "d": "Date", "a": "Amount" } } }
        }"#;
        assert!(matches!(load(json), Err(ConfigError::DuplicateSource(_))));
    }

    #[test]
    fn test_empty_settings_are_valid() {
        let settings = load("{}").unwrap();
        assert!(settings.sources.is_empty());
        assert_eq!(settings.parse_mode, ParseMode::Strict);
    }

    #[test]
    fn test_wildcard_match() {
        assert!(wildcard_match("seb_*.csv", "seb_2024.csv"));
        assert!(wildcard_match("seb_*.csv", "SEB_.csv"));
        assert!(wildcard_match("*.csv", "anything.csv"));
        assert!(wildcard_match("seb_????.csv", "seb_2024.csv"));
        assert!(wildcard_match("a*b*c", "aXXbYYc"));
        assert!(!wildcard_match("seb_*.csv", "seb_2024.xlsx"));
        assert!(!wildcard_match("seb_*.csv", "revolut.csv"));
        assert!(!wildcard_match("seb_????.csv", "seb_24.csv"));
    }

    #[test]
    fn test_resolve_files_pattern_sorted() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b_2.csv", "b_1.csv", "other.csv"] {
            fs::write(dir.path().join(name), "x").unwrap();
        }

        let json = r#"{
            "sources": [ { "name": "b", "path": "b_*.csv", "type": "X" } ],
            "sourceTypes": { "X": { "columns": { "d": "Date", "a": "Amount" } } }
        }"#;
        let settings = Settings::from_json(json, Path::new("settings.json"), dir.path()).unwrap();
        let files = settings.sources[0].resolve_files().unwrap();

        assert_eq!(
            files,
            vec![dir.path().join("b_1.csv"), dir.path().join("b_2.csv")]
        );
    }

    #[test]
    fn test_resolve_files_missing_dir_matches_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let json = r#"{
            "sources": [ { "name": "b", "path": "nowhere/*.csv", "type": "X" } ],
            "sourceTypes": { "X": { "columns": { "d": "Date", "a": "Amount" } } }
        }"#;
        let settings = Settings::from_json(json, Path::new("settings.json"), dir.path()).unwrap();

        assert!(settings.sources[0].resolve_files().unwrap().is_empty());
    }
}
