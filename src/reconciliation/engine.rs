//! Matching uploaded records against system records

use bigdecimal::BigDecimal;
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::{debug, info};

use crate::config::{DuplicatePolicy, NaturalKey, ReconciliationConfig};
use crate::reconciliation::compare::{evaluate_pair, PairEvaluation};
use crate::types::*;

/// Reconciliation engine that classifies uploaded records against the
/// system of record
#[derive(Debug, Clone, Default)]
pub struct ReconciliationEngine {
    config: ReconciliationConfig,
}

impl ReconciliationEngine {
    /// Create an engine with the default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an engine with a custom configuration
    pub fn with_config(config: ReconciliationConfig) -> ReconResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Create an engine with the default configuration and a custom tolerance
    pub fn with_tolerance(tolerance: BigDecimal) -> ReconResult<Self> {
        Self::with_config(ReconciliationConfig::with_tolerance(tolerance))
    }

    pub fn config(&self) -> &ReconciliationConfig {
        &self.config
    }

    /// Reconcile a batch of uploaded records
    ///
    /// Returns exactly one result per uploaded record, in input order. Earlier
    /// uploaded records take precedence when two of them compete for the same
    /// system record (or, under [`DuplicatePolicy::SameNaturalKey`], share a
    /// natural key); the later ones are classified as duplicates.
    pub fn reconcile(
        &self,
        uploaded: &[UploadedRecord],
        system: &[SystemRecord],
    ) -> Vec<ReconciliationResult> {
        let index = CandidateIndex::build(system, self.config.natural_key);
        let mut claimed: HashSet<usize> = HashSet::new();
        let mut seen_keys: HashSet<&str> = HashSet::new();
        let mut results = Vec::with_capacity(uploaded.len());

        for record in uploaded {
            let candidates = index.candidates(record);
            let best = self.best_candidate(record, system, &candidates, &claimed);

            let repeated_key = match self.config.duplicate_policy {
                DuplicatePolicy::SameNaturalKey => natural_key(record, self.config.natural_key)
                    .is_some_and(|key| !seen_keys.insert(key)),
                DuplicatePolicy::SameSystemRecord => false,
            };

            let result = match best {
                None if repeated_key => ReconciliationResult::duplicate(record.id.clone(), None),
                None => ReconciliationResult::unmatched(record.id.clone()),
                Some((idx, _)) if repeated_key || claimed.contains(&idx) => {
                    ReconciliationResult::duplicate(record.id.clone(), Some(system[idx].id.clone()))
                }
                Some((idx, evaluation)) => {
                    claimed.insert(idx);
                    evaluation.into_result(record, &system[idx])
                }
            };

            debug!(
                uploaded_record_id = %result.uploaded_record_id,
                status = %result.match_status,
                score = result.match_score,
                candidates = candidates.len(),
                "Classified uploaded record"
            );
            results.push(result);
        }

        let summary = ReconciliationSummary::from_results(&results);
        info!(
            total = summary.total,
            matched = summary.matched,
            partially_matched = summary.partially_matched,
            not_matched = summary.not_matched,
            duplicate = summary.duplicate,
            "Reconciliation finished"
        );

        results
    }

    /// Pick the highest-scoring candidate, preferring unclaimed ones on a tie
    /// and then the earliest system record
    fn best_candidate(
        &self,
        record: &UploadedRecord,
        system: &[SystemRecord],
        candidates: &BTreeSet<usize>,
        claimed: &HashSet<usize>,
    ) -> Option<(usize, PairEvaluation)> {
        let mut best: Option<(usize, PairEvaluation)> = None;

        for &idx in candidates {
            let evaluation = evaluate_pair(record, &system[idx], &self.config);
            let better = match &best {
                None => true,
                Some((best_idx, best_eval)) => {
                    evaluation.match_score > best_eval.match_score
                        || (evaluation.match_score == best_eval.match_score
                            && claimed.contains(best_idx)
                            && !claimed.contains(&idx))
                }
            };
            if better {
                best = Some((idx, evaluation));
            }
        }

        best
    }
}

/// Reconcile with the default configuration and the given tolerance
pub fn reconcile(
    uploaded: &[UploadedRecord],
    system: &[SystemRecord],
    tolerance: &BigDecimal,
) -> ReconResult<Vec<ReconciliationResult>> {
    let engine = ReconciliationEngine::with_tolerance(tolerance.clone())?;
    Ok(engine.reconcile(uploaded, system))
}

/// The key an uploaded record is looked up and de-duplicated by
fn natural_key(record: &TransactionRecord, key: NaturalKey) -> Option<&str> {
    match key {
        NaturalKey::TransactionId => record.transaction_key(),
        NaturalKey::ReferenceNumber => record.reference(),
        NaturalKey::Any => record.transaction_key().or_else(|| record.reference()),
    }
}

/// Lookup from natural key to system record positions
struct CandidateIndex<'a> {
    key: NaturalKey,
    by_transaction: HashMap<&'a str, Vec<usize>>,
    by_reference: HashMap<&'a str, Vec<usize>>,
}

impl<'a> CandidateIndex<'a> {
    fn build(system: &'a [SystemRecord], key: NaturalKey) -> Self {
        let mut by_transaction: HashMap<&str, Vec<usize>> = HashMap::new();
        let mut by_reference: HashMap<&str, Vec<usize>> = HashMap::new();

        for (idx, record) in system.iter().enumerate() {
            if let Some(txn) = record.transaction_key() {
                by_transaction.entry(txn).or_default().push(idx);
            }
            if let Some(reference) = record.reference() {
                by_reference.entry(reference).or_default().push(idx);
            }
        }

        Self {
            key,
            by_transaction,
            by_reference,
        }
    }

    /// Positions of the system records sharing a natural key with `record`,
    /// in system order
    fn candidates(&self, record: &TransactionRecord) -> BTreeSet<usize> {
        let mut found = BTreeSet::new();

        let use_transaction = matches!(self.key, NaturalKey::TransactionId | NaturalKey::Any);
        let use_reference = matches!(self.key, NaturalKey::ReferenceNumber | NaturalKey::Any);

        if use_transaction {
            if let Some(hits) = record
                .transaction_key()
                .and_then(|txn| self.by_transaction.get(txn))
            {
                found.extend(hits.iter().copied());
            }
        }
        if use_reference {
            if let Some(hits) = record
                .reference()
                .and_then(|reference| self.by_reference.get(reference))
            {
                found.extend(hits.iter().copied());
            }
        }

        found
    }
}
