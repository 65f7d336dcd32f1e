//! Configuration for the job queue and the reconciliation engine
//!
//! All structures deserialize with defaults for any missing key, so hosts can
//! load a partial JSON (or any serde format) document and override only what
//! they need.

use bigdecimal::{BigDecimal, Zero};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use std::time::Duration;

use crate::types::*;

/// Which record fields locate candidate system records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NaturalKey {
    TransactionId,
    ReferenceNumber,
    /// Either the transaction id or the reference number
    Any,
}

/// What makes an uploaded record a duplicate of an earlier one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    /// Its chosen system record was already claimed by an earlier upload
    SameSystemRecord,
    /// An earlier upload carried the same natural key
    SameNaturalKey,
}

/// Matching parameters for a reconciliation run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconciliationConfig {
    /// Largest relative variance still counted as agreement (inclusive)
    pub tolerance: BigDecimal,
    /// Floor for the variance denominator
    pub epsilon: BigDecimal,
    pub natural_key: NaturalKey,
    pub duplicate_policy: DuplicatePolicy,
    /// Per-field score weights; unlisted fields weigh 1.0
    pub field_weights: BTreeMap<String, f64>,
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            tolerance: decimal("0.01"),
            epsilon: decimal("0.000000001"),
            natural_key: NaturalKey::Any,
            duplicate_policy: DuplicatePolicy::SameSystemRecord,
            field_weights: BTreeMap::new(),
        }
    }
}

impl ReconciliationConfig {
    /// Default configuration with a different tolerance
    pub fn with_tolerance(tolerance: BigDecimal) -> Self {
        Self {
            tolerance,
            ..Self::default()
        }
    }

    /// Weight applied to a field when scoring
    pub fn weight(&self, field: &str) -> f64 {
        self.field_weights.get(field).copied().unwrap_or(1.0)
    }

    /// Validate the configuration
    pub fn validate(&self) -> ReconResult<()> {
        if self.tolerance < BigDecimal::zero() {
            return Err(ReconciliationError::InvalidConfig(format!(
                "Tolerance cannot be negative: {}",
                self.tolerance
            )));
        }

        if self.epsilon <= BigDecimal::zero() {
            return Err(ReconciliationError::InvalidConfig(format!(
                "Epsilon must be positive: {}",
                self.epsilon
            )));
        }

        // A zero weight would let a disagreeing field leave the score at 1.0
        for (field, weight) in &self.field_weights {
            if !weight.is_finite() || *weight <= 0.0 {
                return Err(ReconciliationError::InvalidConfig(format!(
                    "Weight for field '{}' must be a positive number, got {}",
                    field, weight
                )));
            }
        }

        Ok(())
    }
}

/// Scheduling parameters for the job queue
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Pause between finishing one job and starting the next
    pub dispatch_delay_ms: u64,
    /// Fail a job that runs longer than this
    pub job_timeout_ms: Option<u64>,
}

impl QueueConfig {
    pub fn dispatch_delay(&self) -> Duration {
        Duration::from_millis(self.dispatch_delay_ms)
    }

    pub fn job_timeout(&self) -> Option<Duration> {
        self.job_timeout_ms.map(Duration::from_millis)
    }
}

/// Top-level configuration document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    pub queue: QueueConfig,
    pub reconciliation: ReconciliationConfig,
}

impl CoreConfig {
    /// Validate every section
    pub fn validate(&self) -> ReconResult<()> {
        self.reconciliation.validate()
    }
}

fn decimal(s: &str) -> BigDecimal {
    BigDecimal::from_str(s).unwrap_or_else(|_| BigDecimal::zero())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = CoreConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(
            config.reconciliation.tolerance,
            BigDecimal::from_str("0.01").unwrap()
        );
        assert_eq!(config.reconciliation.natural_key, NaturalKey::Any);
        assert_eq!(config.queue.dispatch_delay(), Duration::ZERO);
        assert_eq!(config.queue.job_timeout(), None);
    }

    #[test]
    fn test_partial_document() {
        let config: CoreConfig = serde_json::from_str(
            r#"{
                "queue": { "job_timeout_ms": 500 },
                "reconciliation": {
                    "tolerance": "0.05",
                    "natural_key": "reference_number",
                    "field_weights": { "amount": 2.0 }
                }
            }"#,
        )
        .unwrap();

        assert_eq!(config.queue.job_timeout(), Some(Duration::from_millis(500)));
        assert_eq!(config.queue.dispatch_delay_ms, 0);
        assert_eq!(
            config.reconciliation.tolerance,
            BigDecimal::from_str("0.05").unwrap()
        );
        assert_eq!(
            config.reconciliation.natural_key,
            NaturalKey::ReferenceNumber
        );
        assert_eq!(
            config.reconciliation.duplicate_policy,
            DuplicatePolicy::SameSystemRecord
        );
        assert_eq!(config.reconciliation.weight("amount"), 2.0);
        assert_eq!(config.reconciliation.weight("referenceNumber"), 1.0);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let negative = ReconciliationConfig::with_tolerance(BigDecimal::from(-1));
        assert!(matches!(
            negative.validate(),
            Err(ReconciliationError::InvalidConfig(_))
        ));

        let mut zero_epsilon = ReconciliationConfig::default();
        zero_epsilon.epsilon = BigDecimal::zero();
        assert!(zero_epsilon.validate().is_err());

        let mut zero_weight = ReconciliationConfig::default();
        zero_weight.field_weights.insert("amount".to_string(), 0.0);
        assert!(zero_weight.validate().is_err());
    }
}
