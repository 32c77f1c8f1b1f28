// Categorization - keyword rules as data
// First category (in settings order) with a keyword found in the description wins

use rust_decimal::Decimal;

use crate::config::Categorization;
use crate::parser::{TransactionKind, TransactionRecord, UNCATEGORIZED};

/// Category names that also decide the transaction kind
pub const INVESTMENTS: &str = "Investments";
pub const TRANSFERS: &str = "Transfers";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub category: String,
    pub kind: TransactionKind,
}

pub struct Categorizer {
    rules: Vec<Categorization>,
}

impl Categorizer {
    /// Build from settings; keywords are matched case-insensitively, blanks dropped
    pub fn new(categorizations: &[Categorization]) -> Self {
        let rules = categorizations
            .iter()
            .map(|c| Categorization {
                category: c.category.clone(),
                keywords: c
                    .keywords
                    .iter()
                    .map(|k| k.trim().to_lowercase())
                    .filter(|k| !k.is_empty())
                    .collect(),
            })
            .collect();
        Categorizer { rules }
    }

    pub fn classify(&self, description: &str, amount: Decimal) -> Classification {
        let text = description.to_lowercase();

        for rule in &self.rules {
            if rule.keywords.iter().any(|k| text.contains(k.as_str())) {
                return Classification {
                    category: rule.category.clone(),
                    kind: kind_for(&rule.category, amount),
                };
            }
        }

        Classification {
            category: UNCATEGORIZED.to_string(),
            kind: TransactionKind::from_amount(amount),
        }
    }

    /// Attach category and kind to a freshly parsed record
    pub fn apply(&self, record: TransactionRecord) -> TransactionRecord {
        let result = self.classify(&record.description, record.amount);
        record.with_category(result.category, result.kind)
    }
}

fn kind_for(category: &str, amount: Decimal) -> TransactionKind {
    match category {
        INVESTMENTS => TransactionKind::Investment,
        TRANSFERS => TransactionKind::Transfer,
        _ => TransactionKind::from_amount(amount),
    }
}
