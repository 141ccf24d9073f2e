//! Main ledger orchestrator that coordinates accounts, chains and transactions

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::LedgerConfig;
use crate::ledger::chain::AccountChain;
use crate::ledger::{AccountManager, TransactionManager};
use crate::money::Iso4217Converter;
use crate::traits::*;
use crate::types::*;

/// Main ledger system that orchestrates all ledger operations
pub struct Ledger<S: LedgerStorage> {
    account_manager: AccountManager<S>,
    transaction_manager: TransactionManager<S>,
    config: LedgerConfig,
}

impl<S: LedgerStorage + Clone> Ledger<S> {
    /// Create a new ledger with the given storage backend and default configuration
    pub fn new(storage: S) -> Self {
        let config = LedgerConfig::default();
        let converter: Arc<dyn MoneyConverter> = Arc::new(Iso4217Converter::new());
        Self {
            account_manager: AccountManager::new(storage.clone(), converter.clone()),
            transaction_manager: TransactionManager::new(storage, converter, &config),
            config,
        }
    }

    /// Create a new ledger from a validated configuration
    pub fn with_config(storage: S, config: LedgerConfig) -> LedgerResult<Self> {
        Self::with_validators(
            storage,
            config,
            Box::new(DefaultAccountValidator),
            Box::new(DefaultEntryValidator),
            None,
        )
    }

    /// Create a new ledger with custom validators.
    ///
    /// Without a transaction validator the default one is built from `config`.
    pub fn with_validators(
        storage: S,
        config: LedgerConfig,
        account_validator: Box<dyn AccountValidator>,
        entry_validator: Box<dyn EntryValidator>,
        transaction_validator: Option<Box<dyn TransactionValidator>>,
    ) -> LedgerResult<Self> {
        config.validate()?;

        let converter: Arc<dyn MoneyConverter> =
            Arc::new(Iso4217Converter::with_exponents(&config.currency_exponents));
        let transaction_validator: Box<dyn TransactionValidator> = match transaction_validator {
            Some(validator) => validator,
            None => Box::new(DefaultTransactionValidator {
                balance_scale: config.balance_scale,
                max_description_len: config.max_description_len,
            }),
        };

        Ok(Self {
            account_manager: AccountManager::with_validator(
                storage.clone(),
                converter.clone(),
                account_validator,
            ),
            transaction_manager: TransactionManager::with_validators(
                storage,
                converter,
                &config,
                entry_validator,
                transaction_validator,
            ),
            config,
        })
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    // Account operations
    /// Create a new account
    pub async fn create_account(
        &mut self,
        id: impl Into<AccountId>,
        title: impl Into<String>,
        currency: &str,
        account_type: AccountType,
    ) -> LedgerResult<Account> {
        self.account_manager
            .create_account(id.into(), title.into(), currency, account_type)
            .await
    }

    /// Get an account by ID
    pub async fn get_account(&self, account_id: &str) -> LedgerResult<Option<Account>> {
        self.account_manager.get_account(account_id).await
    }

    /// List all accounts
    pub async fn list_accounts(&self) -> LedgerResult<Vec<Account>> {
        self.account_manager.list_accounts().await
    }

    /// List accounts by type
    pub async fn list_accounts_by_type(
        &self,
        account_type: AccountType,
    ) -> LedgerResult<Vec<Account>> {
        self.account_manager.list_accounts_by_type(account_type).await
    }

    // Chain queries
    /// Entries of an account in chain order (or its reverse)
    pub async fn entries_for_account(
        &self,
        account_id: &str,
        ordering: EntryOrdering,
    ) -> LedgerResult<Vec<JournalEntry>> {
        self.account_manager
            .entries_for_account(account_id, ordering)
            .await
    }

    pub async fn first_entry_after(
        &self,
        account_id: &str,
        date: NaiveDate,
    ) -> LedgerResult<Option<JournalEntry>> {
        self.account_manager.first_entry_after(account_id, date).await
    }

    pub async fn last_entry_at_or_before(
        &self,
        account_id: &str,
        date: NaiveDate,
    ) -> LedgerResult<Option<JournalEntry>> {
        self.account_manager
            .last_entry_at_or_before(account_id, date)
            .await
    }

    /// Get a journal entry by ID
    pub async fn get_entry(&self, entry_id: EntryId) -> LedgerResult<Option<JournalEntry>> {
        self.transaction_manager.get_entry(entry_id).await
    }

    /// Signed decimal amount of an entry in its account's currency
    pub async fn entry_amount(&self, entry_id: EntryId) -> LedgerResult<BigDecimal> {
        let entry = self
            .get_entry(entry_id)
            .await?
            .ok_or(LedgerError::EntryNotFound(entry_id))?;
        self.account_manager.entry_amount(&entry).await
    }

    /// Check an entry's date against its chain neighbours
    pub async fn validate_entry_links(&self, entry_id: EntryId) -> LedgerResult<ValidationErrors> {
        self.transaction_manager.validate_entry_links(entry_id).await
    }

    /// Move an entry to a new posted date or position within its account
    pub async fn repost_entry(
        &mut self,
        entry_id: EntryId,
        posted_date: NaiveDate,
        placement: Placement,
    ) -> LedgerResult<JournalEntry> {
        self.transaction_manager
            .repost_entry(entry_id, posted_date, placement)
            .await
    }

    // Transaction operations
    /// Record a new transaction
    pub async fn record_transaction(
        &mut self,
        draft: TransactionDraft,
    ) -> LedgerResult<PostedTransaction> {
        self.transaction_manager.record_transaction(draft).await
    }

    /// Get a transaction with its entries
    pub async fn get_transaction(
        &self,
        transaction_id: &str,
    ) -> LedgerResult<Option<PostedTransaction>> {
        self.transaction_manager.get_transaction(transaction_id).await
    }

    /// List all transaction headers
    pub async fn list_transactions(&self) -> LedgerResult<Vec<Transaction>> {
        self.transaction_manager.list_transactions().await
    }

    /// Re-run validation on a committed transaction
    pub async fn validate_transaction(&self, transaction_id: &str) -> LedgerResult<ValidationErrors> {
        self.transaction_manager
            .validate_transaction(transaction_id)
            .await
    }

    /// Change entry amounts of a committed transaction
    pub async fn amend_entry_amounts(
        &mut self,
        transaction_id: &str,
        amendments: &[EntryAmendment],
    ) -> LedgerResult<PostedTransaction> {
        self.transaction_manager
            .amend_entry_amounts(transaction_id, amendments)
            .await
    }

    /// Delete a transaction and unlink its entries
    pub async fn delete_transaction(&mut self, transaction_id: &str) -> LedgerResult<()> {
        self.transaction_manager
            .delete_transaction(transaction_id)
            .await
    }

    /// Validate the whole ledger: every account chain and every transaction
    pub async fn validate_integrity(&self) -> LedgerResult<LedgerIntegrityReport> {
        let storage = &self.account_manager.storage;
        let mut issues = Vec::new();

        let accounts = storage.list_accounts(None).await?;
        let mut entries_checked = 0;
        for account in &accounts {
            let entries = storage
                .entries_for_account(&account.id, EntryOrdering::Chain)
                .await?;
            entries_checked += entries.len();
            if let Err(e) = AccountChain::load(&account.id, &entries) {
                issues.push(format!("account {}: {}", account.id, e));
            }
        }

        let transactions = storage.list_transactions().await?;
        for transaction in &transactions {
            let errors = self.validate_transaction(&transaction.id).await?;
            for error in &errors {
                issues.push(format!("transaction {}: {}", transaction.id, error));
            }
        }

        if !issues.is_empty() {
            tracing::warn!(issues = issues.len(), "ledger integrity check failed");
        }

        Ok(LedgerIntegrityReport {
            is_valid: issues.is_empty(),
            issues,
            accounts_checked: accounts.len(),
            transactions_checked: transactions.len(),
            entries_checked,
        })
    }
}

/// Ledger integrity validation report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerIntegrityReport {
    pub is_valid: bool,
    pub issues: Vec<String>,
    pub accounts_checked: usize,
    pub transactions_checked: usize,
    pub entries_checked: usize,
}
