//! Validation utilities

use bigdecimal::BigDecimal;

use crate::traits::*;
use crate::types::*;

/// Validate that a transaction ID is valid
pub fn validate_transaction_id(transaction_id: &str) -> ReconResult<()> {
    if transaction_id.trim().is_empty() {
        return Err(ReconciliationError::Validation(
            "Transaction ID cannot be empty".to_string(),
        ));
    }

    if transaction_id.chars().count() > 64 {
        return Err(ReconciliationError::Validation(
            "Transaction ID cannot exceed 64 characters".to_string(),
        ));
    }

    // Check for valid characters (alphanumeric, dashes, underscores, slashes)
    if !transaction_id
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_' || c == '/')
    {
        return Err(ReconciliationError::Validation(format!(
            "Transaction ID '{}' can only contain alphanumeric characters, dashes, underscores, and slashes",
            transaction_id
        )));
    }

    Ok(())
}

/// Validate that a reference number is valid, if present
pub fn validate_reference_number(reference: Option<&str>) -> ReconResult<()> {
    match reference {
        Some(r) if r.chars().count() > 100 => Err(ReconciliationError::Validation(
            "Reference number cannot exceed 100 characters".to_string(),
        )),
        _ => Ok(()),
    }
}

/// Validate that an amount is present
pub fn validate_amount_present(amount: Option<&BigDecimal>) -> ReconResult<()> {
    if amount.is_none() {
        Err(ReconciliationError::Validation(
            "Amount is missing".to_string(),
        ))
    } else {
        Ok(())
    }
}

/// Strict validator rejecting rows that would only reconcile as
/// partial matches
pub struct EnhancedRecordValidator;

impl RecordValidator for EnhancedRecordValidator {
    fn validate_record(&self, record: &UploadedRecord) -> ReconResult<()> {
        // Basic validation
        DefaultRecordValidator.validate_record(record)?;

        validate_transaction_id(&record.transaction_id)?;
        validate_amount_present(record.amount.as_ref())?;
        validate_reference_number(record.reference_number.as_deref())?;

        Ok(())
    }
}
