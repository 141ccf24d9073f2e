//! Traits for storage abstraction and extensibility

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use std::collections::{BTreeMap, HashMap};

use crate::types::*;
use crate::utils::validation;

/// Lookup surface over accounts and their entries.
///
/// Chain queries always take or imply the `(posted_date, order)` sort key;
/// nothing relies on an ambient default ordering.
#[async_trait]
pub trait AccountRegistry: Send + Sync {
    /// Get an account by ID
    async fn get_account(&self, account_id: &str) -> LedgerResult<Option<Account>>;

    /// All entries of an account, sorted by `ordering`
    async fn entries_for_account(
        &self,
        account_id: &str,
        ordering: EntryOrdering,
    ) -> LedgerResult<Vec<JournalEntry>>;

    /// First entry in chain order posted strictly after `date`
    async fn first_entry_after(
        &self,
        account_id: &str,
        date: NaiveDate,
    ) -> LedgerResult<Option<JournalEntry>>;

    /// Last entry in chain order posted on or before `date`
    async fn last_entry_at_or_before(
        &self,
        account_id: &str,
        date: NaiveDate,
    ) -> LedgerResult<Option<JournalEntry>>;
}

/// Everything one ledger operation writes, applied all-or-nothing.
///
/// `expected_versions` holds the chain version of every account the change
/// set was computed against; a commit must fail with
/// `LedgerError::ConcurrencyConflict` if any of them moved, and must bump all
/// of them on success.
///
/// A row in `put_entries` that is not stored yet must belong to
/// `insert_transaction`; any other row must already exist.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    pub expected_versions: BTreeMap<AccountId, u64>,
    /// New header; fails if the id is taken
    pub insert_transaction: Option<Transaction>,
    /// Replacement header; fails if the header is gone
    pub update_transaction: Option<Transaction>,
    pub delete_transaction: Option<TransactionId>,
    /// Inserted or replaced entry rows
    pub put_entries: Vec<JournalEntry>,
    pub delete_entries: Vec<EntryId>,
}

/// Storage abstraction for the ledger system
///
/// This trait allows the ledger to work with any storage backend
/// (PostgreSQL, SQLite, in-memory, etc.) by implementing these methods.
#[async_trait]
pub trait LedgerStorage: AccountRegistry {
    /// Save a new account to storage
    async fn save_account(&mut self, account: &Account) -> LedgerResult<()>;

    /// List all accounts, optionally filtered by type
    async fn list_accounts(&self, account_type: Option<AccountType>) -> LedgerResult<Vec<Account>>;

    /// Get a transaction header by ID
    async fn get_transaction(&self, transaction_id: &str) -> LedgerResult<Option<Transaction>>;

    /// List all transaction headers
    async fn list_transactions(&self) -> LedgerResult<Vec<Transaction>>;

    /// Member entries of a transaction
    async fn get_transaction_entries(&self, transaction_id: &str)
        -> LedgerResult<Vec<JournalEntry>>;

    /// Get a journal entry by ID
    async fn get_entry(&self, entry_id: EntryId) -> LedgerResult<Option<JournalEntry>>;

    /// Current chain version of an account (0 before its first commit)
    async fn chain_version(&self, account_id: &str) -> LedgerResult<u64>;

    /// Apply a change set atomically
    async fn commit(&mut self, changes: ChangeSet) -> LedgerResult<()>;
}

/// Conversion between integer minor units and decimal currency amounts
pub trait MoneyConverter: Send + Sync {
    /// Number of decimal places of the currency's minor unit
    fn minor_unit_exponent(&self, currency: &str) -> LedgerResult<u32>;

    /// Decimal amount of `amount_in_cents` minor units, after applying `rate`
    fn minor_units_to_decimal(
        &self,
        amount_in_cents: i64,
        currency: &str,
        rate: Option<&BigDecimal>,
    ) -> LedgerResult<BigDecimal>;

    /// Minor units of a decimal amount, after undoing `rate`
    fn decimal_to_minor_units(
        &self,
        amount: &BigDecimal,
        currency: &str,
        rate: Option<&BigDecimal>,
    ) -> LedgerResult<i64>;
}

/// Trait for implementing custom account validation rules
pub trait AccountValidator: Send + Sync {
    /// Validate an account before saving
    fn validate_account(&self, account: &Account) -> ValidationErrors;
}

/// Per-entry integrity rules, evaluated before an entry is linked
pub trait EntryValidator: Send + Sync {
    fn validate_entry(&self, entry: &EntryDraft) -> ValidationErrors;
}

/// Rules over a transaction and the full set of its member entries
pub trait TransactionValidator: Send + Sync {
    /// `accounts` holds every known account referenced by `entries`
    fn validate_transaction(
        &self,
        transaction: &Transaction,
        entries: &[EntryDraft],
        accounts: &HashMap<AccountId, Account>,
        converter: &dyn MoneyConverter,
    ) -> LedgerResult<ValidationErrors>;
}

/// Default account validator with basic rules
pub struct DefaultAccountValidator;

impl AccountValidator for DefaultAccountValidator {
    fn validate_account(&self, account: &Account) -> ValidationErrors {
        let mut errors = ValidationErrors::new();
        errors.extend(validation::validate_account_id(&account.id));
        errors.extend(validation::validate_required("title", &account.title, 100));
        errors.extend(validation::validate_required("currency", &account.currency, 3));
        errors
    }
}

/// Default entry validator: positive amount, posted date present, positive rate
pub struct DefaultEntryValidator;

impl EntryValidator for DefaultEntryValidator {
    fn validate_entry(&self, entry: &EntryDraft) -> ValidationErrors {
        validation::validate_entry_integrity(entry)
    }
}

/// Default transaction validator with the double-entry rules
pub struct DefaultTransactionValidator {
    pub balance_scale: i64,
    pub max_description_len: usize,
}

impl Default for DefaultTransactionValidator {
    fn default() -> Self {
        Self {
            balance_scale: 2,
            max_description_len: 500,
        }
    }
}

impl TransactionValidator for DefaultTransactionValidator {
    fn validate_transaction(
        &self,
        transaction: &Transaction,
        entries: &[EntryDraft],
        accounts: &HashMap<AccountId, Account>,
        converter: &dyn MoneyConverter,
    ) -> LedgerResult<ValidationErrors> {
        let mut errors = validation::validate_required(
            "description",
            &transaction.description,
            self.max_description_len,
        );
        errors.extend(validation::validate_transaction_entries(
            entries,
            accounts,
            converter,
            self.balance_scale,
        )?);
        Ok(errors)
    }
}
