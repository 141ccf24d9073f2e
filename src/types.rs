//! Core types and data structures for the ledger

use bigdecimal::BigDecimal;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

use crate::traits::MoneyConverter;

/// Identifier of an account, chosen by the caller
pub type AccountId = String;

/// Identifier of a transaction, chosen by the caller
pub type TransactionId = String;

/// Identifier of a journal entry, generated when the draft is created
pub type EntryId = Uuid;

/// Account types following standard accounting principles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountType {
    /// Assets - what the business owns (Cash, Inventory, Equipment, etc.)
    Asset,
    /// Liabilities - what the business owes (Loans, Accounts Payable, etc.)
    Liability,
    /// Equity - owner's interest in the business (Capital, Retained Earnings, etc.)
    Equity,
    /// Income/Revenue - money earned by the business
    Income,
    /// Expenses - costs incurred by the business
    Expense,
}

impl AccountType {
    /// Returns the side on which this account type normally carries its balance
    /// Assets and Expenses normally have debit balances
    /// Liabilities, Equity, and Income normally have credit balances
    pub fn normal_balance(&self) -> TransactionType {
        match self {
            AccountType::Asset | AccountType::Expense => TransactionType::Debit,
            AccountType::Liability | AccountType::Equity | AccountType::Income => {
                TransactionType::Credit
            }
        }
    }
}

/// Direction of a journal entry.
///
/// The direction is carried here and never by the sign of the amount, which
/// is always a positive number of minor units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    /// Credit entry, multiplier +1
    Credit,
    /// Debit entry, multiplier -1
    Debit,
}

impl TransactionType {
    /// Signed multiplier applied to `amount_in_cents`
    pub fn multiplier(&self) -> i64 {
        match self {
            TransactionType::Credit => 1,
            TransactionType::Debit => -1,
        }
    }

    /// `amount_in_cents` with this direction's sign applied
    pub fn signed(&self, amount_in_cents: i64) -> LedgerResult<i64> {
        amount_in_cents.checked_mul(self.multiplier()).ok_or_else(|| {
            LedgerError::Integrity(format!(
                "amount {} cannot carry a {:?} sign",
                amount_in_cents, self
            ))
        })
    }

    pub fn opposite(&self) -> Self {
        match self {
            TransactionType::Credit => TransactionType::Debit,
            TransactionType::Debit => TransactionType::Credit,
        }
    }
}

/// Core account structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    /// Unique identifier for the account
    pub id: AccountId,
    /// Human-readable account title
    pub title: String,
    /// ISO-4217 currency code; fixed once the account exists
    pub currency: String,
    /// Type of account (Asset, Liability, etc.)
    pub account_type: AccountType,
    /// Additional metadata
    pub metadata: HashMap<String, String>,
    /// When the account was created
    pub created_at: NaiveDateTime,
    /// When the account was last updated
    pub updated_at: NaiveDateTime,
}

impl Account {
    /// Create a new account
    pub fn new(id: AccountId, title: String, currency: &str, account_type: AccountType) -> Self {
        let now = chrono::Utc::now().naive_utc();
        Self {
            id,
            title,
            currency: currency.trim().to_uppercase(),
            account_type,
            metadata: HashMap::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Where a new entry goes in its account chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Placement {
    /// After every entry posted on or before the entry's date
    #[default]
    Auto,
    /// Immediately before the given entry of the same account
    Before(EntryId),
}

/// Explicit sort key for chain queries: `(posted_date, order)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EntryOrdering {
    /// Oldest first, same-day entries by ascending order
    #[default]
    Chain,
    /// Newest first
    ChainReversed,
}

impl EntryOrdering {
    pub fn compare(&self, a: &JournalEntry, b: &JournalEntry) -> Ordering {
        let ord = a.sort_key().cmp(&b.sort_key());
        match self {
            EntryOrdering::Chain => ord,
            EntryOrdering::ChainReversed => ord.reverse(),
        }
    }
}

/// A journal entry as persisted: one side of a transaction, linked into its
/// account's chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub id: EntryId,
    pub account_id: AccountId,
    pub transaction_id: TransactionId,
    pub transaction_type: TransactionType,
    /// Magnitude in the account's minor currency unit, always > 0
    pub amount_in_cents: i64,
    /// Conversion rate applied when reading the decimal amount; `None` means 1
    pub exchange_rate: Option<BigDecimal>,
    pub description: Option<String>,
    pub posted_date: NaiveDate,
    pub cleared_date: Option<NaiveDate>,
    /// Tie-breaker among entries of the same account and posted date
    pub order: u32,
    pub next_entry_id: Option<EntryId>,
    /// Mirror of the predecessor's `next_entry_id`
    pub previous_entry_id: Option<EntryId>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl JournalEntry {
    /// Position of the entry in chain order
    pub fn sort_key(&self) -> (NaiveDate, u32) {
        (self.posted_date, self.order)
    }

    /// Signed amount in the account's currency:
    /// `amount_in_cents * multiplier * exchange_rate`
    pub fn amount(
        &self,
        currency: &str,
        converter: &dyn MoneyConverter,
    ) -> LedgerResult<BigDecimal> {
        converter.minor_units_to_decimal(
            self.transaction_type.signed(self.amount_in_cents)?,
            currency,
            self.exchange_rate.as_ref(),
        )
    }

    /// Assign the magnitude from a decimal amount in the account's currency.
    ///
    /// The direction stays with `transaction_type`, so only the absolute value
    /// of `value` is used.
    pub fn set_amount(
        &mut self,
        value: &BigDecimal,
        currency: &str,
        converter: &dyn MoneyConverter,
    ) -> LedgerResult<()> {
        self.amount_in_cents =
            converter.decimal_to_minor_units(&value.abs(), currency, self.exchange_rate.as_ref())?;
        self.updated_at = chrono::Utc::now().naive_utc();
        Ok(())
    }

    pub(crate) fn from_draft(
        draft: &EntryDraft,
        transaction_id: &str,
        posted_date: NaiveDate,
    ) -> Self {
        let now = chrono::Utc::now().naive_utc();
        Self {
            id: draft.id,
            account_id: draft.account_id.clone(),
            transaction_id: transaction_id.to_string(),
            transaction_type: draft.transaction_type,
            amount_in_cents: draft.amount_in_cents,
            exchange_rate: draft.exchange_rate.clone(),
            description: draft.description.clone(),
            posted_date,
            cleared_date: draft.cleared_date,
            order: 0,
            next_entry_id: None,
            previous_entry_id: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A journal entry that has not been linked into a chain yet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryDraft {
    pub id: EntryId,
    pub account_id: AccountId,
    pub transaction_type: TransactionType,
    pub amount_in_cents: i64,
    pub exchange_rate: Option<BigDecimal>,
    pub description: Option<String>,
    pub posted_date: Option<NaiveDate>,
    pub cleared_date: Option<NaiveDate>,
    pub placement: Placement,
}

impl EntryDraft {
    /// Create a new draft with a freshly generated id
    pub fn new(
        account_id: impl Into<AccountId>,
        transaction_type: TransactionType,
        amount_in_cents: i64,
        posted_date: Option<NaiveDate>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            account_id: account_id.into(),
            transaction_type,
            amount_in_cents,
            exchange_rate: None,
            description: None,
            posted_date,
            cleared_date: None,
            placement: Placement::Auto,
        }
    }

    /// Create a credit draft
    pub fn credit(account_id: impl Into<AccountId>, amount_in_cents: i64, posted_date: NaiveDate) -> Self {
        Self::new(account_id, TransactionType::Credit, amount_in_cents, Some(posted_date))
    }

    /// Create a debit draft
    pub fn debit(account_id: impl Into<AccountId>, amount_in_cents: i64, posted_date: NaiveDate) -> Self {
        Self::new(account_id, TransactionType::Debit, amount_in_cents, Some(posted_date))
    }

    pub fn with_exchange_rate(mut self, rate: BigDecimal) -> Self {
        self.exchange_rate = Some(rate);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn cleared_on(mut self, date: NaiveDate) -> Self {
        self.cleared_date = Some(date);
        self
    }

    pub fn placed(mut self, placement: Placement) -> Self {
        self.placement = placement;
        self
    }
}

impl From<&JournalEntry> for EntryDraft {
    fn from(entry: &JournalEntry) -> Self {
        Self {
            id: entry.id,
            account_id: entry.account_id.clone(),
            transaction_type: entry.transaction_type,
            amount_in_cents: entry.amount_in_cents,
            exchange_rate: entry.exchange_rate.clone(),
            description: entry.description.clone(),
            posted_date: Some(entry.posted_date),
            cleared_date: entry.cleared_date,
            placement: Placement::Auto,
        }
    }
}

/// Transaction header as persisted; its entries are stored separately
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Unique identifier for the transaction
    pub id: TransactionId,
    /// Description of the transaction
    pub description: String,
    /// Optional reference number (invoice number, check number, etc.)
    pub reference: Option<String>,
    /// Additional metadata
    pub metadata: HashMap<String, String>,
    /// When the transaction was created
    pub created_at: NaiveDateTime,
    /// When the transaction was last updated
    pub updated_at: NaiveDateTime,
}

impl Transaction {
    /// Create a new transaction header
    pub fn new(id: TransactionId, description: String, reference: Option<String>) -> Self {
        let now = chrono::Utc::now().naive_utc();
        Self {
            id,
            description,
            reference,
            metadata: HashMap::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// A committed transaction together with its member entries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostedTransaction {
    pub transaction: Transaction,
    pub entries: Vec<JournalEntry>,
}

impl PostedTransaction {
    pub fn entry_for_account(&self, account_id: &str) -> Option<&JournalEntry> {
        self.entries.iter().find(|e| e.account_id == account_id)
    }
}

/// A transaction that has not been committed yet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionDraft {
    pub transaction: Transaction,
    pub entries: Vec<EntryDraft>,
}

/// Change of an entry's magnitude inside an existing transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryAmendment {
    pub entry_id: EntryId,
    pub amount_in_cents: i64,
}

/// A single violated rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum ValidationError {
    #[error("entry {entry_id}: amount_in_cents must be greater than 0 (got {amount_in_cents})")]
    NonPositiveAmount { entry_id: EntryId, amount_in_cents: i64 },
    #[error("entry {entry_id}: posted_date must be present")]
    MissingPostedDate { entry_id: EntryId },
    #[error("entry {entry_id}: exchange_rate must be greater than 0")]
    NonPositiveExchangeRate { entry_id: EntryId },
    #[error("entry {entry_id}: posted_date must be on or before that of the next account entry {next_entry_id}")]
    PostedAfterNextEntry { entry_id: EntryId, next_entry_id: EntryId },
    #[error("entry {entry_id}: posted_date must be on or after that of the previous account entry {previous_entry_id}")]
    PostedBeforePreviousEntry { entry_id: EntryId, previous_entry_id: EntryId },
    #[error("entry {entry_id}: cannot be placed before {anchor_id}, which is not in the chain of account {account_id}")]
    PlacementOutsideAccount { entry_id: EntryId, anchor_id: EntryId, account_id: AccountId },
    #[error("entry {entry_id}: account {account_id} does not exist")]
    UnknownAccount { entry_id: EntryId, account_id: AccountId },
    #[error("journal entries are not balanced (sum = {sum})")]
    UnbalancedTransaction { sum: BigDecimal },
    #[error("journal entries must have unique accounts ({account_id} appears more than once)")]
    DuplicateAccount { account_id: AccountId },
    #[error("a transaction needs at least 2 journal entries (got {entries})")]
    IncompleteTransaction { entries: usize },
    #[error("{field} cannot be blank")]
    BlankField { field: String },
    #[error("{field} cannot exceed {max} characters")]
    FieldTooLong { field: String, max: usize },
    #[error("{field} {reason}")]
    InvalidFormat { field: String, reason: String },
}

/// Every rule violated by one validation call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationErrors(Vec<ValidationError>);

impl ValidationErrors {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, error: ValidationError) {
        self.0.push(error);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ValidationError> {
        self.0.iter()
    }

    pub fn errors(&self) -> &[ValidationError] {
        &self.0
    }

    /// `Ok(())` when nothing was violated, otherwise `LedgerError::Validation`
    pub fn into_result(self) -> LedgerResult<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(LedgerError::Validation(self))
        }
    }
}

impl From<ValidationError> for ValidationErrors {
    fn from(error: ValidationError) -> Self {
        Self(vec![error])
    }
}

impl Extend<ValidationError> for ValidationErrors {
    fn extend<I: IntoIterator<Item = ValidationError>>(&mut self, iter: I) {
        self.0.extend(iter);
    }
}

impl IntoIterator for ValidationErrors {
    type Item = ValidationError;
    type IntoIter = std::vec::IntoIter<ValidationError>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a ValidationErrors {
    type Item = &'a ValidationError;
    type IntoIter = std::slice::Iter<'a, ValidationError>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, error) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{}", error)?;
        }
        Ok(())
    }
}

/// Errors that can occur in the ledger system
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Validation failed: {0}")]
    Validation(ValidationErrors),
    #[error("Integrity error: {0}")]
    Integrity(String),
    #[error("Concurrency conflict on account {account_id}: expected chain version {expected}, found {found}")]
    ConcurrencyConflict {
        account_id: AccountId,
        expected: u64,
        found: u64,
    },
    #[error("Account not found: {0}")]
    AccountNotFound(String),
    #[error("Account already exists: {0}")]
    AccountExists(String),
    #[error("Transaction not found: {0}")]
    TransactionNotFound(String),
    #[error("Transaction already exists: {0}")]
    TransactionExists(String),
    #[error("Journal entry not found: {0}")]
    EntryNotFound(EntryId),
    #[error("Unsupported currency: {0}")]
    UnsupportedCurrency(String),
    #[error("Configuration error: {0}")]
    Config(String),
}

impl LedgerError {
    /// Whether the caller may retry the same operation unchanged
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::ConcurrencyConflict { .. })
    }

    /// The accumulated violations, if this is a validation failure
    pub fn validation_errors(&self) -> Option<&ValidationErrors> {
        match self {
            LedgerError::Validation(errors) => Some(errors),
            _ => None,
        }
    }
}

/// Result type for ledger operations
pub type LedgerResult<T> = Result<T, LedgerError>;
