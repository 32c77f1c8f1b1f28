// Aggregator - per-source batches -> Unified Ledger
// Exact-match deduplication by identity key, then a deterministic total order

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::error::AggregationError;
use crate::parser::{RowRef, TransactionRecord};

// ============================================================================
// INPUT
// ============================================================================

/// All records parsed for one source, in file order
#[derive(Debug, Clone)]
pub struct SourceBatch {
    /// Position of the source in the settings file
    pub position: usize,
    pub source_name: String,
    pub records: Vec<TransactionRecord>,
}

// ============================================================================
// DUPLICATE MATCH RESULT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateMatch {
    /// Record that stays in the ledger
    pub kept: RowRef,
    /// Later record with the same identity key
    pub discarded: RowRef,
    pub identity_key: String,
}

// ============================================================================
// UNIFIED LEDGER
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct Ledger {
    records: Vec<TransactionRecord>,
    duplicates: Vec<DuplicateMatch>,
}

impl Ledger {
    /// Merge batches into one ledger
    ///
    /// Batches are visited in settings order (not arrival order), so the
    /// first-seen record of a duplicate pair does not depend on parse order.
    /// Output order is (date, source name, original order).
    pub fn aggregate(mut batches: Vec<SourceBatch>) -> Result<Ledger, AggregationError> {
        batches.sort_by_key(|b| b.position);

        let mut seen: HashMap<String, RowRef> = HashMap::new();
        let mut records = Vec::new();
        let mut duplicates = Vec::new();

        for batch in batches {
            for record in batch.records {
                if record.source_name != batch.source_name {
                    return Err(AggregationError::UnknownSource {
                        source_name: record.source_name.clone(),
                        reference: record.reference.to_string(),
                    });
                }

                let key = record.identity_key();
                if let Some(kept) = seen.get(&key) {
                    debug!(kept = %kept, discarded = %record.reference, "duplicate transaction");
                    duplicates.push(DuplicateMatch {
                        kept: kept.clone(),
                        discarded: record.reference.clone(),
                        identity_key: key,
                    });
                    continue;
                }

                seen.insert(key, record.reference.clone());
                records.push(record);
            }
        }

        // Stable sort keeps original order among equal (date, source) pairs
        records.sort_by(|a, b| {
            a.date
                .cmp(&b.date)
                .then_with(|| a.source_name.cmp(&b.source_name))
        });

        let ledger = Ledger {
            records,
            duplicates,
        };
        ledger.verify()?;
        Ok(ledger)
    }

    /// Check the no-duplicate invariant of the merged ledger
    fn verify(&self) -> Result<(), AggregationError> {
        let mut keys = HashSet::with_capacity(self.records.len());
        for record in &self.records {
            let key = record.identity_key();
            if !keys.insert(key.clone()) {
                return Err(AggregationError::DuplicateIdentity(key));
            }
        }
        Ok(())
    }

    pub fn records(&self) -> &[TransactionRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn duplicate_count(&self) -> usize {
        self.duplicates.len()
    }

    pub fn duplicates(&self) -> &[DuplicateMatch] {
        &self.duplicates
    }
}

// ============================================================================
// TESTS
// ============================================================================
