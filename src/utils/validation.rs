//! Validation rules
//!
//! Every function here evaluates all of its rules and returns the full list of
//! violations; none of them stop at the first failure.

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use std::collections::{HashMap, HashSet};

use crate::traits::MoneyConverter;
use crate::types::*;

/// Validate that a text field is present and not too long
pub fn validate_required(field: &str, value: &str, max_len: usize) -> ValidationErrors {
    let mut errors = ValidationErrors::new();
    if value.trim().is_empty() {
        errors.push(ValidationError::BlankField {
            field: field.to_string(),
        });
    } else if value.chars().count() > max_len {
        errors.push(ValidationError::FieldTooLong {
            field: field.to_string(),
            max: max_len,
        });
    }
    errors
}

/// Validate that an account ID is valid
pub fn validate_account_id(account_id: &str) -> ValidationErrors {
    let mut errors = validate_required("account id", account_id, 50);

    if !account_id
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
    {
        errors.push(ValidationError::InvalidFormat {
            field: "account id".to_string(),
            reason: "can only contain alphanumeric characters, dashes, and underscores"
                .to_string(),
        });
    }

    errors
}

/// Per-entry checks that do not depend on other records
pub fn validate_entry_integrity(entry: &EntryDraft) -> ValidationErrors {
    let mut errors = ValidationErrors::new();

    if entry.amount_in_cents <= 0 {
        errors.push(ValidationError::NonPositiveAmount {
            entry_id: entry.id,
            amount_in_cents: entry.amount_in_cents,
        });
    }

    if entry.posted_date.is_none() {
        errors.push(ValidationError::MissingPostedDate { entry_id: entry.id });
    }

    if !has_valid_rate(entry) {
        errors.push(ValidationError::NonPositiveExchangeRate { entry_id: entry.id });
    }

    errors
}

/// Chain adjacency: an entry's date must lie between its neighbours' dates.
///
/// Neighbours are given as `(id, posted_date)` and may be the entry's current
/// links or the links it is about to receive.
pub fn validate_adjacency(
    entry_id: EntryId,
    posted_date: NaiveDate,
    previous: Option<(EntryId, NaiveDate)>,
    next: Option<(EntryId, NaiveDate)>,
) -> ValidationErrors {
    let mut errors = ValidationErrors::new();

    if let Some((next_entry_id, next_date)) = next {
        if posted_date > next_date {
            errors.push(ValidationError::PostedAfterNextEntry {
                entry_id,
                next_entry_id,
            });
        }
    }

    if let Some((previous_entry_id, previous_date)) = previous {
        if posted_date < previous_date {
            errors.push(ValidationError::PostedBeforePreviousEntry {
                entry_id,
                previous_entry_id,
            });
        }
    }

    errors
}

/// Aggregate rules over the member entries of one transaction: at least two
/// entries, distinct accounts, and a signed sum of exactly zero once rounded
/// to `balance_scale` decimal places.
///
/// The sum is only evaluated when every entry references a known account and
/// carries a positive amount and a usable exchange rate; otherwise the
/// offending entries are reported and the balance cannot be judged.
pub fn validate_transaction_entries(
    entries: &[EntryDraft],
    accounts: &HashMap<AccountId, Account>,
    converter: &dyn MoneyConverter,
    balance_scale: i64,
) -> LedgerResult<ValidationErrors> {
    let mut errors = ValidationErrors::new();

    if entries.len() < 2 {
        errors.push(ValidationError::IncompleteTransaction {
            entries: entries.len(),
        });
    }

    let mut seen = HashSet::new();
    let mut reported = HashSet::new();
    for entry in entries {
        if !seen.insert(entry.account_id.as_str()) && reported.insert(entry.account_id.as_str()) {
            errors.push(ValidationError::DuplicateAccount {
                account_id: entry.account_id.clone(),
            });
        }
    }

    let mut computable = true;
    for entry in entries {
        if !accounts.contains_key(&entry.account_id) {
            errors.push(ValidationError::UnknownAccount {
                entry_id: entry.id,
                account_id: entry.account_id.clone(),
            });
            computable = false;
        }
        if entry.amount_in_cents <= 0 || !has_valid_rate(entry) {
            computable = false;
        }
    }

    if computable {
        let sum = balance_of(entries, accounts, converter)?.round(balance_scale);
        if sum != BigDecimal::from(0) {
            errors.push(ValidationError::UnbalancedTransaction { sum });
        }
    }

    Ok(errors)
}

/// Signed sum of the entries, each converted into its account's currency
pub fn balance_of(
    entries: &[EntryDraft],
    accounts: &HashMap<AccountId, Account>,
    converter: &dyn MoneyConverter,
) -> LedgerResult<BigDecimal> {
    let mut sum = BigDecimal::from(0);
    for entry in entries {
        let account = accounts
            .get(&entry.account_id)
            .ok_or_else(|| LedgerError::AccountNotFound(entry.account_id.clone()))?;
        sum += converter.minor_units_to_decimal(
            entry.transaction_type.signed(entry.amount_in_cents)?,
            &account.currency,
            entry.exchange_rate.as_ref(),
        )?;
    }
    Ok(sum)
}

fn has_valid_rate(entry: &EntryDraft) -> bool {
    entry
        .exchange_rate
        .as_ref()
        .is_none_or(|rate| *rate > BigDecimal::from(0))
}
