//! Validation utilities

use bigdecimal::BigDecimal;
use chrono::NaiveDate;

use crate::types::*;

/// Validate that an account ID is valid
pub fn validate_account_id(account_id: &str) -> LedgerResult<()> {
    if account_id.trim().is_empty() {
        return Err(LedgerError::Validation(
            "Account ID cannot be empty".to_string(),
        ));
    }

    if account_id.len() > 50 {
        return Err(LedgerError::Validation(
            "Account ID cannot exceed 50 characters".to_string(),
        ));
    }

    // Check for valid characters (alphanumeric, dashes, underscores)
    if !account_id
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
    {
        return Err(LedgerError::Validation(
            "Account ID can only contain alphanumeric characters, dashes, and underscores"
                .to_string(),
        ));
    }

    Ok(())
}

/// Validate an ISO 4217 style currency code
pub fn validate_currency(currency: &str) -> LedgerResult<()> {
    if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_uppercase()) {
        return Err(LedgerError::Validation(format!(
            "Currency must be a three letter uppercase code, got '{}'",
            currency
        )));
    }
    Ok(())
}

/// Validate a transaction description
pub fn validate_transaction_description(description: &str) -> LedgerResult<()> {
    if description.len() > 500 {
        return Err(LedgerError::Validation(
            "Transaction description cannot exceed 500 characters".to_string(),
        ));
    }
    Ok(())
}

/// Validate a single statement row before import
pub fn validate_import_row(row: &ImportRow) -> LedgerResult<()> {
    validate_transaction_description(&row.description)?;

    if let Some(reference) = &row.reference {
        if reference.len() > 255 {
            return Err(LedgerError::Validation(
                "Reference cannot exceed 255 characters".to_string(),
            ));
        }
    }

    if let Some(external_id) = &row.external_id {
        if external_id.trim().is_empty() {
            return Err(LedgerError::Validation(
                "External ID cannot be blank".to_string(),
            ));
        }
    }

    Ok(())
}

/// Validate that a statement window is well formed
pub fn validate_statement_window(start: NaiveDate, end: NaiveDate) -> LedgerResult<()> {
    if start > end {
        return Err(LedgerError::Validation(format!(
            "Statement start date {} is after end date {}",
            start, end
        )));
    }
    Ok(())
}

/// Validate that a matched amount is positive
pub fn validate_positive_amount(amount: &BigDecimal) -> LedgerResult<()> {
    if *amount <= BigDecimal::from(0) {
        Err(LedgerError::Validation(
            "Amount must be positive".to_string(),
        ))
    } else {
        Ok(())
    }
}

/// Validate an adjustment description
pub fn validate_adjustment_description(description: &str) -> LedgerResult<()> {
    if description.trim().is_empty() {
        return Err(LedgerError::Validation(
            "Adjustment description cannot be empty".to_string(),
        ));
    }
    if description.len() > 255 {
        return Err(LedgerError::Validation(
            "Adjustment description cannot exceed 255 characters".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_statement_window() {
        assert!(validate_statement_window(date(2024, 1, 1), date(2024, 1, 31)).is_ok());
        assert!(validate_statement_window(date(2024, 1, 31), date(2024, 1, 31)).is_ok());
        assert!(validate_statement_window(date(2024, 2, 1), date(2024, 1, 31)).is_err());
    }

    #[test]
    fn test_import_row_rules() {
        let row = ImportRow::new(date(2024, 1, 5), String::new(), BigDecimal::from(10));
        assert!(validate_import_row(&row).is_ok());

        let blank_external = row.clone().with_external_id("   ");
        assert!(validate_import_row(&blank_external).is_err());

        let long_description =
            ImportRow::new(date(2024, 1, 5), "x".repeat(501), BigDecimal::from(10));
        assert!(validate_import_row(&long_description).is_err());
    }

    #[test]
    fn test_currency_codes() {
        assert!(validate_currency("EUR").is_ok());
        assert!(validate_currency("eur").is_err());
        assert!(validate_currency("EURO").is_err());
    }
}
