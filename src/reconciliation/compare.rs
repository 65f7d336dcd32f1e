//! Field-level comparison between an uploaded record and a system record

use bigdecimal::{BigDecimal, ToPrimitive};
use std::collections::BTreeSet;

use crate::config::ReconciliationConfig;
use crate::types::*;

pub const FIELD_TRANSACTION_ID: &str = "transactionId";
pub const FIELD_AMOUNT: &str = "amount";
pub const FIELD_REFERENCE_NUMBER: &str = "referenceNumber";

/// Score and differences for one uploaded/system pair
///
/// Both are produced by the same pass over the fields and are only ever
/// handed out together.
#[derive(Debug, Clone, PartialEq)]
pub struct PairEvaluation {
    pub match_score: f64,
    pub differences: Vec<Difference>,
    /// Number of fields that agreed
    pub agreeing: usize,
    /// Number of fields compared
    pub compared: usize,
}

impl PairEvaluation {
    /// Classification implied by the field agreement
    pub fn status(&self) -> MatchStatus {
        if self.differences.is_empty() {
            MatchStatus::Matched
        } else if self.agreeing == 0 {
            MatchStatus::NotMatched
        } else {
            MatchStatus::PartiallyMatched
        }
    }

    /// Turn the evaluation into a result for the given pair
    pub fn into_result(
        self,
        uploaded: &UploadedRecord,
        system: &SystemRecord,
    ) -> ReconciliationResult {
        ReconciliationResult {
            uploaded_record_id: uploaded.id.clone(),
            system_record_id: Some(system.id.clone()),
            match_status: self.status(),
            match_score: self.match_score,
            differences: self.differences,
        }
    }
}

/// Relative variance `|uploaded - system| / max(|system|, epsilon)`
pub fn relative_variance(
    uploaded: &BigDecimal,
    system: &BigDecimal,
    epsilon: &BigDecimal,
) -> BigDecimal {
    let denominator = system.abs().max(epsilon.clone());
    (uploaded - system).abs() / denominator
}

/// Compare two values, returning whether they agree and their variance
pub fn compare_values(
    uploaded: &FieldValue,
    system: &FieldValue,
    config: &ReconciliationConfig,
) -> (bool, f64) {
    match (uploaded, system) {
        (FieldValue::Number(u), FieldValue::Number(s)) => {
            let variance = relative_variance(u, s, &config.epsilon);
            let agrees = variance <= config.tolerance;
            (agrees, variance.to_f64().unwrap_or(f64::MAX))
        }
        (FieldValue::Text(u), FieldValue::Text(s)) if u == s => (true, 0.0),
        // Null never agrees, not even with another null
        _ => (false, 1.0),
    }
}

/// The comparable fields of a pair, in comparison order
///
/// Transaction ids and references are compared in the same trimmed form
/// the candidate lookup uses, with blanks treated as missing.
pub fn comparable_fields(
    uploaded: &UploadedRecord,
    system: &SystemRecord,
) -> Vec<(String, FieldValue, FieldValue)> {
    let text =
        |key: Option<&str>| key.map_or(FieldValue::Null, |k| FieldValue::Text(k.to_string()));

    let mut fields = vec![
        (
            FIELD_TRANSACTION_ID.to_string(),
            text(uploaded.transaction_key()),
            text(system.transaction_key()),
        ),
        (
            FIELD_AMOUNT.to_string(),
            uploaded.amount.clone().into(),
            system.amount.clone().into(),
        ),
        (
            FIELD_REFERENCE_NUMBER.to_string(),
            text(uploaded.reference()),
            text(system.reference()),
        ),
    ];

    let names: BTreeSet<&String> = uploaded
        .fields
        .keys()
        .chain(system.fields.keys())
        .collect();
    for name in names {
        let value_of =
            |r: &TransactionRecord| r.fields.get(name).cloned().unwrap_or(FieldValue::Null);
        fields.push((name.clone(), value_of(uploaded), value_of(system)));
    }

    fields
}

/// Compare every field of a pair and score the agreement
pub fn evaluate_pair(
    uploaded: &UploadedRecord,
    system: &SystemRecord,
    config: &ReconciliationConfig,
) -> PairEvaluation {
    let mut differences = Vec::new();
    let mut agreeing = 0;
    let mut compared = 0;
    let mut agreeing_weight = 0.0;
    let mut total_weight = 0.0;

    for (field, uploaded_value, system_value) in comparable_fields(uploaded, system) {
        let weight = config.weight(&field);
        let (agrees, variance) = compare_values(&uploaded_value, &system_value, config);

        compared += 1;
        total_weight += weight;
        if agrees {
            agreeing += 1;
            agreeing_weight += weight;
        } else {
            differences.push(Difference {
                field,
                uploaded_value,
                system_value,
                variance,
            });
        }
    }

    let match_score = if differences.is_empty() {
        1.0
    } else if agreeing == 0 || total_weight <= 0.0 {
        0.0
    } else {
        // Keep a partial score strictly below an exact match
        (agreeing_weight / total_weight).min(1.0 - f64::EPSILON)
    };

    PairEvaluation {
        match_score,
        differences,
        agreeing,
        compared,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    fn record(
        id: &str,
        txn: &str,
        amount: Option<&str>,
        reference: Option<&str>,
    ) -> TransactionRecord {
        TransactionRecord::new(
            id.to_string(),
            txn.to_string(),
            amount.map(dec),
            reference.map(str::to_string),
        )
    }

    #[test]
    fn test_relative_variance() {
        let variance =
            relative_variance(&dec("1800.00"), &dec("1799.50"), &dec("0.000000001"));
        let v = variance.to_f64().unwrap();
        assert!((v - 0.000277855).abs() < 1e-8);

        let v = relative_variance(&dec("110"), &dec("100"), &dec("0.000000001"));
        assert_eq!(v, dec("0.1"));
    }

    #[test]
    fn test_zero_and_negative_system_amounts() {
        let epsilon = dec("0.000000001");

        // Zero denominator falls back to epsilon
        let v = relative_variance(&dec("0"), &dec("0"), &epsilon);
        assert_eq!(v, dec("0"));
        let v = relative_variance(&dec("1"), &dec("0"), &epsilon);
        assert_eq!(v, dec("1000000000"));

        // Negative amounts use their magnitude
        let v = relative_variance(&dec("-110"), &dec("-100"), &epsilon);
        assert_eq!(v, dec("0.1"));
    }

    #[test]
    fn test_tolerance_is_inclusive() {
        let config = ReconciliationConfig::with_tolerance(dec("0.01"));

        let (agrees, variance) = compare_values(
            &FieldValue::Number(dec("101")),
            &FieldValue::Number(dec("100")),
            &config,
        );
        assert!(agrees);
        assert!((variance - 0.01).abs() < 1e-12);

        let (agrees, _) = compare_values(
            &FieldValue::Number(dec("101.0000001")),
            &FieldValue::Number(dec("100")),
            &config,
        );
        assert!(!agrees);
    }

    #[test]
    fn test_text_and_null_comparison() {
        let config = ReconciliationConfig::default();
        let text = |s: &str| FieldValue::Text(s.to_string());

        assert_eq!(compare_values(&text("A"), &text("A"), &config), (true, 0.0));
        assert_eq!(compare_values(&text("A"), &text("a"), &config), (false, 1.0));
        assert_eq!(
            compare_values(&FieldValue::Null, &FieldValue::Null, &config),
            (false, 1.0)
        );
        assert_eq!(
            compare_values(&text("1"), &FieldValue::Number(dec("1")), &config),
            (false, 1.0)
        );
    }

    #[test]
    fn test_exact_pair() {
        let config = ReconciliationConfig::default();
        let uploaded = record("u1", "TXN001", Some("1500.00"), Some("REF001"));
        let system = record("s1", "TXN001", Some("1500.00"), Some("REF001"));

        let eval = evaluate_pair(&uploaded, &system, &config);
        assert_eq!(eval.match_score, 1.0);
        assert!(eval.differences.is_empty());
        assert_eq!(eval.status(), MatchStatus::Matched);
        assert_eq!(eval.compared, 3);
    }

    #[test]
    fn test_missing_amount_is_a_difference() {
        let config = ReconciliationConfig::default();
        let uploaded = record("u1", "TXN002", None, Some("REF002"));
        let system = record("s1", "TXN002", Some("200"), Some("REF002"));

        let eval = evaluate_pair(&uploaded, &system, &config);
        assert_eq!(eval.status(), MatchStatus::PartiallyMatched);
        assert_eq!(eval.differences.len(), 1);
        assert_eq!(eval.differences[0].field, FIELD_AMOUNT);
        assert_eq!(eval.differences[0].uploaded_value, FieldValue::Null);
        assert!((eval.match_score - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_pair_with_no_agreeing_field() {
        let config = ReconciliationConfig::default();
        let uploaded = record("u1", "TXN010", Some("10"), Some("REF010"));
        let system = record("s9", "TXN090", Some("90"), Some("REF090"));

        let eval = evaluate_pair(&uploaded, &system, &config);
        assert_eq!(eval.agreeing, 0);
        assert_eq!(eval.status(), MatchStatus::NotMatched);

        let result = eval.into_result(&uploaded, &system);
        assert_eq!(result.match_status, MatchStatus::NotMatched);
        assert_eq!(result.system_record_id.as_deref(), Some("s9"));
        assert_eq!(result.match_score, 0.0);
        let fields: Vec<&str> = result.differences.iter().map(|d| d.field.as_str()).collect();
        assert_eq!(
            fields,
            vec![FIELD_TRANSACTION_ID, FIELD_AMOUNT, FIELD_REFERENCE_NUMBER]
        );
        assert!(result.is_consistent());
    }

    #[test]
    fn test_keys_compare_trimmed() {
        let config = ReconciliationConfig::default();
        let uploaded = record("u1", " TXN001 ", Some("5"), Some("REF001  "));
        let system = record("s1", "TXN001", Some("5"), Some("REF001"));

        let eval = evaluate_pair(&uploaded, &system, &config);
        assert!(eval.differences.is_empty());
        assert_eq!(eval.status(), MatchStatus::Matched);

        // Blank references count as missing on both sides
        let uploaded = record("u2", "TXN002", Some("5"), Some("  "));
        let system = record("s2", "TXN002", Some("5"), Some(""));
        let eval = evaluate_pair(&uploaded, &system, &config);
        assert_eq!(eval.differences.len(), 1);
        assert_eq!(eval.differences[0].field, FIELD_REFERENCE_NUMBER);
        assert_eq!(eval.differences[0].uploaded_value, FieldValue::Null);
    }

    #[test]
    fn test_extra_fields_and_weights() {
        let mut config = ReconciliationConfig::default();
        config.field_weights.insert(FIELD_AMOUNT.to_string(), 2.0);

        let uploaded = record("u1", "TXN003", Some("300"), Some("REF003"))
            .with_field("currency", FieldValue::Text("INR".to_string()));
        let system = record("s1", "TXN003", Some("350"), Some("REF003"))
            .with_field("currency", FieldValue::Text("INR".to_string()))
            .with_field("branch", FieldValue::Text("MUM".to_string()));

        let eval = evaluate_pair(&uploaded, &system, &config);
        assert_eq!(eval.compared, 5);
        let fields: Vec<&str> = eval.differences.iter().map(|d| d.field.as_str()).collect();
        assert_eq!(fields, vec![FIELD_AMOUNT, "branch"]);
        // transactionId + referenceNumber + currency agree: 3 of 6 weight
        assert!((eval.match_score - 0.5).abs() < 1e-12);
    }
}
