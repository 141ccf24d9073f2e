//! Account management and chain queries

use chrono::NaiveDate;
use std::sync::Arc;

use crate::traits::*;
use crate::types::*;

/// Account manager for handling account registry operations
pub struct AccountManager<S: LedgerStorage> {
    pub(crate) storage: S,
    validator: Box<dyn AccountValidator>,
    converter: Arc<dyn MoneyConverter>,
}

impl<S: LedgerStorage> AccountManager<S> {
    /// Create a new account manager
    pub fn new(storage: S, converter: Arc<dyn MoneyConverter>) -> Self {
        Self {
            storage,
            validator: Box::new(DefaultAccountValidator),
            converter,
        }
    }

    /// Create a new account manager with custom validator
    pub fn with_validator(
        storage: S,
        converter: Arc<dyn MoneyConverter>,
        validator: Box<dyn AccountValidator>,
    ) -> Self {
        Self {
            storage,
            validator,
            converter,
        }
    }

    /// Create a new account
    pub async fn create_account(
        &mut self,
        id: AccountId,
        title: String,
        currency: &str,
        account_type: AccountType,
    ) -> LedgerResult<Account> {
        let account = Account::new(id, title, currency, account_type);

        self.validator.validate_account(&account).into_result()?;
        self.converter.minor_unit_exponent(&account.currency)?;

        if self.storage.get_account(&account.id).await?.is_some() {
            return Err(LedgerError::AccountExists(account.id));
        }

        self.storage.save_account(&account).await?;
        tracing::info!(
            account_id = %account.id,
            currency = %account.currency,
            account_type = ?account.account_type,
            "created account"
        );

        Ok(account)
    }

    /// Get an account by ID
    pub async fn get_account(&self, account_id: &str) -> LedgerResult<Option<Account>> {
        self.storage.get_account(account_id).await
    }

    /// Get an account by ID, returning an error if not found
    pub async fn get_account_required(&self, account_id: &str) -> LedgerResult<Account> {
        self.storage
            .get_account(account_id)
            .await?
            .ok_or_else(|| LedgerError::AccountNotFound(account_id.to_string()))
    }

    /// List all accounts
    pub async fn list_accounts(&self) -> LedgerResult<Vec<Account>> {
        self.storage.list_accounts(None).await
    }

    /// List accounts by type
    pub async fn list_accounts_by_type(
        &self,
        account_type: AccountType,
    ) -> LedgerResult<Vec<Account>> {
        self.storage.list_accounts(Some(account_type)).await
    }

    /// Entries of an account sorted by `ordering`
    pub async fn entries_for_account(
        &self,
        account_id: &str,
        ordering: EntryOrdering,
    ) -> LedgerResult<Vec<JournalEntry>> {
        self.get_account_required(account_id).await?;
        self.storage.entries_for_account(account_id, ordering).await
    }

    /// First entry posted strictly after `date`
    pub async fn first_entry_after(
        &self,
        account_id: &str,
        date: NaiveDate,
    ) -> LedgerResult<Option<JournalEntry>> {
        self.storage.first_entry_after(account_id, date).await
    }

    pub async fn last_entry_at_or_before(
        &self,
        account_id: &str,
        date: NaiveDate,
    ) -> LedgerResult<Option<JournalEntry>> {
        self.storage.last_entry_at_or_before(account_id, date).await
    }

    /// Signed decimal amount of an entry in its account's currency
    pub async fn entry_amount(&self, entry: &JournalEntry) -> LedgerResult<bigdecimal::BigDecimal> {
        let account = self.get_account_required(&entry.account_id).await?;
        entry.amount(&account.currency, self.converter.as_ref())
    }
}
