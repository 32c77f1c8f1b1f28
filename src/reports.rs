// Reports - expense summaries by calendar dimension and category
// Plus the income / investment / uncategorized extracts

use std::collections::{BTreeMap, HashSet};

use chrono::{Datelike, NaiveDate, Weekday};
use rust_decimal::Decimal;

use crate::categorize::INVESTMENTS;
use crate::error::AggregationError;
use crate::ledger::Ledger;
use crate::parser::{TransactionKind, TransactionRecord, UNCATEGORIZED};

pub const TOP_N: usize = 25;

// ============================================================================
// CALENDAR FIELDS
// ============================================================================

/// Derived calendar columns for one date
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Calendar {
    pub year: i32,
    /// 1-4
    pub quarter_number: u32,
    /// "2024-Q1"
    pub quarter: String,
    /// "2024-01"
    pub month: String,
    /// "January"
    pub month_name: String,
    pub day_of_month: u32,
    /// ISO week, "2024-W01"
    pub week: String,
    /// ISO week number alone, 1-53
    pub week_number: u32,
    /// "Monday"
    pub weekday: String,
    pub is_weekend: bool,
    pub season: &'static str,
}

impl Calendar {
    pub fn of(date: NaiveDate) -> Self {
        let weekday = date.weekday();
        let quarter_number = (date.month() - 1) / 3 + 1;
        Calendar {
            year: date.year(),
            quarter_number,
            quarter: format!("{}-Q{}", date.year(), quarter_number),
            month: date.format("%Y-%m").to_string(),
            month_name: date.format("%B").to_string(),
            day_of_month: date.day(),
            week: date.format("%G-W%V").to_string(),
            week_number: date.iso_week().week(),
            weekday: date.format("%A").to_string(),
            is_weekend: matches!(weekday, Weekday::Sat | Weekday::Sun),
            season: season(date.month()),
        }
    }
}

/// Meteorological season: Dec-Feb is winter
fn season(month: u32) -> &'static str {
    match (month % 12 + 3) / 3 {
        1 => "Winter",
        2 => "Spring",
        3 => "Summer",
        _ => "Autumn",
    }
}

// ============================================================================
// DIMENSIONS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dimension {
    Date,
    Weekday,
    Week,
    Month,
    MonthName,
    Quarter,
    Season,
    Year,
    Category,
}

impl Dimension {
    pub const ALL: [Dimension; 9] = [
        Dimension::Date,
        Dimension::Weekday,
        Dimension::Week,
        Dimension::Month,
        Dimension::MonthName,
        Dimension::Quarter,
        Dimension::Season,
        Dimension::Year,
        Dimension::Category,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Dimension::Date => "Date",
            Dimension::Weekday => "Weekday",
            Dimension::Week => "Week",
            Dimension::Month => "Month",
            Dimension::MonthName => "MonthName",
            Dimension::Quarter => "Quarter",
            Dimension::Season => "Season",
            Dimension::Year => "Year",
            Dimension::Category => "Category",
        }
    }

    /// Report file stem, e.g. "d-byMonth"
    pub fn file_stem(&self) -> String {
        let letter = match self {
            Dimension::Date => 'a',
            Dimension::Weekday => 'b',
            Dimension::Week => 'c',
            Dimension::Month => 'd',
            Dimension::MonthName => 'e',
            Dimension::Quarter => 'f',
            Dimension::Season => 'g',
            Dimension::Year => 'h',
            Dimension::Category => 'i',
        };
        format!("{}-by{}", letter, self.name())
    }

    fn key(&self, record: &TransactionRecord) -> String {
        let calendar = Calendar::of(record.date);
        match self {
            Dimension::Date => record.date.to_string(),
            Dimension::Weekday => calendar.weekday,
            Dimension::Week => calendar.week,
            Dimension::Month => calendar.month,
            Dimension::MonthName => calendar.month_name,
            Dimension::Quarter => calendar.quarter,
            Dimension::Season => calendar.season.to_string(),
            Dimension::Year => calendar.year.to_string(),
            Dimension::Category => record.category.clone(),
        }
    }
}

// ============================================================================
// REPORT
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct ReportRow {
    pub key: String,
    pub amount: Decimal,
    /// One entry per report category, zero when absent
    pub by_category: BTreeMap<String, Decimal>,
}

#[derive(Debug, Clone)]
pub struct Report {
    pub dimension: Dimension,
    /// Sorted category columns (always includes Uncategorized)
    pub categories: Vec<String>,
    /// Sorted by key
    pub rows: Vec<ReportRow>,
}

impl Report {
    /// Sum absolute amounts of `records` grouped by `dimension`
    ///
    /// Fails when a total no longer fits a `Decimal`.
    pub fn build(
        dimension: Dimension,
        records: &[&TransactionRecord],
        categories: &[String],
    ) -> Result<Self, AggregationError> {
        let mut groups: BTreeMap<String, ReportRow> = BTreeMap::new();

        for record in records {
            let key = dimension.key(record);
            let amount = record.amount.abs();
            let row = groups.entry(key.clone()).or_insert_with(|| ReportRow {
                key: key.clone(),
                amount: Decimal::ZERO,
                by_category: categories.iter().map(|c| (c.clone(), Decimal::ZERO)).collect(),
            });
            row.amount = checked_total(row.amount, amount, dimension, &key)?;
            let slot = row.by_category.entry(record.category.clone()).or_insert(Decimal::ZERO);
            *slot = checked_total(*slot, amount, dimension, &key)?;
        }

        Ok(Report {
            dimension,
            categories: categories.to_vec(),
            rows: groups.into_values().collect(),
        })
    }

    /// Largest `n` rows by amount; equal amounts keep key order
    pub fn top(&self, n: usize) -> Vec<&ReportRow> {
        let mut rows: Vec<&ReportRow> = self.rows.iter().collect();
        rows.sort_by(|a, b| b.amount.cmp(&a.amount));
        rows.truncate(n);
        rows
    }

    pub fn header(&self) -> Vec<String> {
        let mut header = vec![self.dimension.name().to_string(), "Amount".to_string()];
        header.extend(self.categories.iter().map(|c| format!("Amount{}", c)));
        header
    }

    pub fn row_values(&self, row: &ReportRow) -> Vec<String> {
        let mut values = vec![row.key.clone(), row.amount.to_string()];
        values.extend(self.categories.iter().map(|c| {
            row.by_category
                .get(c)
                .copied()
                .unwrap_or(Decimal::ZERO)
                .to_string()
        }));
        values
    }
}

fn checked_total(
    total: Decimal,
    amount: Decimal,
    dimension: Dimension,
    key: &str,
) -> Result<Decimal, AggregationError> {
    total
        .checked_add(amount)
        .ok_or_else(|| AggregationError::AmountOverflow {
            dimension: dimension.name().to_string(),
            key: key.to_string(),
        })
}

/// Report category columns: configured ones, any seen in the ledger, and Uncategorized
pub fn report_categories(configured: &[String], ledger: &Ledger) -> Vec<String> {
    let mut categories: Vec<String> = configured.to_vec();
    categories.extend(ledger.records().iter().map(|r| r.category.clone()));
    categories.push(UNCATEGORIZED.to_string());
    categories.sort();
    categories.dedup();
    categories
}

/// Expense reports for all time and per year
#[derive(Debug, Clone)]
pub struct ReportSet {
    pub all_time: Vec<Report>,
    pub by_year: BTreeMap<i32, Vec<Report>>,
}

impl ReportSet {
    pub fn build(ledger: &Ledger, categories: &[String]) -> Result<Self, AggregationError> {
        let all = expenses(ledger);

        let mut years: BTreeMap<i32, Vec<&TransactionRecord>> = BTreeMap::new();
        for record in &all {
            years.entry(record.date.year()).or_default().push(*record);
        }

        let mut by_year = BTreeMap::new();
        for (year, records) in &years {
            by_year.insert(*year, all_dimensions(records, categories)?);
        }

        Ok(ReportSet {
            all_time: all_dimensions(&all, categories)?,
            by_year,
        })
    }
}

fn all_dimensions(
    records: &[&TransactionRecord],
    categories: &[String],
) -> Result<Vec<Report>, AggregationError> {
    Dimension::ALL
        .iter()
        .map(|d| Report::build(*d, records, categories))
        .collect()
}

// ============================================================================
// EXTRACTS
// ============================================================================

pub fn expenses(ledger: &Ledger) -> Vec<&TransactionRecord> {
    ledger
        .records()
        .iter()
        .filter(|r| r.kind == TransactionKind::Expense)
        .collect()
}

pub fn incomes(ledger: &Ledger) -> Vec<&TransactionRecord> {
    ledger
        .records()
        .iter()
        .filter(|r| r.kind == TransactionKind::Income)
        .collect()
}

pub fn investments(ledger: &Ledger) -> Vec<&TransactionRecord> {
    ledger
        .records()
        .iter()
        .filter(|r| r.category == INVESTMENTS)
        .collect()
}

/// Distinct descriptions of uncategorized records, first-seen order
pub fn uncategorized_descriptions(ledger: &Ledger) -> Vec<&str> {
    let mut seen = HashSet::new();
    ledger
        .records()
        .iter()
        .filter(|r| r.category == UNCATEGORIZED)
        .map(|r| r.description.as_str())
        .filter(|d| seen.insert(*d))
        .collect()
}

// ============================================================================
// TESTS
// ============================================================================
