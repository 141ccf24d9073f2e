//! Transaction processing and management

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::config::LedgerConfig;
use crate::ledger::chain::{AccountChain, InsertOutcome};
use crate::traits::*;
use crate::types::*;

/// A chain together with the rows and version it was loaded from
struct LoadedChain {
    chain: AccountChain,
    version: u64,
    rows: HashMap<EntryId, JournalEntry>,
}

impl LoadedChain {
    /// Persisted rows for every entry whose links changed. `fresh` supplies
    /// rows for entries that are not stored yet.
    fn touched_rows(
        &mut self,
        mut fresh: impl FnMut(EntryId) -> Option<JournalEntry>,
    ) -> LedgerResult<Vec<JournalEntry>> {
        let mut rows = Vec::new();
        for link in self.chain.touched() {
            let mut row = match self.rows.remove(&link.entry_id) {
                Some(row) => row,
                None => fresh(link.entry_id).ok_or_else(|| {
                    LedgerError::Integrity(format!(
                        "linked entry {} has no stored row in account {}",
                        link.entry_id,
                        self.chain.account_id()
                    ))
                })?,
            };
            link.apply(&mut row);
            rows.push(row);
        }
        Ok(rows)
    }
}

/// Transaction manager for handling transaction operations.
///
/// Every mutating operation reads the chains it touches, computes the full
/// change set in memory and hands it to [`LedgerStorage::commit`] in one
/// call, so nothing is written when any step fails.
pub struct TransactionManager<S: LedgerStorage> {
    storage: S,
    converter: Arc<dyn MoneyConverter>,
    entry_validator: Box<dyn EntryValidator>,
    validator: Box<dyn TransactionValidator>,
    cascade_warn_threshold: usize,
}

impl<S: LedgerStorage> TransactionManager<S> {
    /// Create a new transaction manager
    pub fn new(storage: S, converter: Arc<dyn MoneyConverter>, config: &LedgerConfig) -> Self {
        Self::with_validators(
            storage,
            converter,
            config,
            Box::new(DefaultEntryValidator),
            Box::new(DefaultTransactionValidator {
                balance_scale: config.balance_scale,
                max_description_len: config.max_description_len,
            }),
        )
    }

    /// Create a new transaction manager with custom validators
    pub fn with_validators(
        storage: S,
        converter: Arc<dyn MoneyConverter>,
        config: &LedgerConfig,
        entry_validator: Box<dyn EntryValidator>,
        validator: Box<dyn TransactionValidator>,
    ) -> Self {
        Self {
            storage,
            converter,
            entry_validator,
            validator,
            cascade_warn_threshold: config.cascade_warn_threshold,
        }
    }

    /// Validate a new transaction, link each of its entries into its
    /// account's chain and commit everything at once
    pub async fn record_transaction(
        &mut self,
        draft: TransactionDraft,
    ) -> LedgerResult<PostedTransaction> {
        let TransactionDraft {
            mut transaction,
            entries,
        } = draft;

        if self.storage.get_transaction(&transaction.id).await?.is_some() {
            return Err(LedgerError::TransactionExists(transaction.id));
        }

        // Chain placement errors are collected alongside the rule errors.
        let mut errors = self.validate(&transaction, &entries).await?;
        let mut changes = ChangeSet::default();
        let mut posted = Vec::with_capacity(entries.len());

        for draft in &entries {
            let Some(posted_date) = draft.posted_date else {
                let missing = ValidationError::MissingPostedDate { entry_id: draft.id };
                if !errors.iter().any(|e| *e == missing) {
                    errors.push(missing);
                }
                continue;
            };
            let mut loaded = self.load_chain(&draft.account_id).await?;

            match loaded.chain.insert(draft.id, posted_date, draft.placement) {
                Ok(outcome) => self.note_cascade(&loaded.chain, &outcome),
                Err(LedgerError::Validation(e)) => {
                    errors.extend(e);
                    continue;
                }
                Err(e) => return Err(e),
            }

            let new_row = JournalEntry::from_draft(draft, &transaction.id, posted_date);
            let mut fresh = Some(new_row);
            for row in loaded.touched_rows(|id| fresh.take().filter(|r| r.id == id))? {
                if row.id == draft.id {
                    posted.push(row.clone());
                }
                changes.put_entries.push(row);
            }
            changes
                .expected_versions
                .insert(draft.account_id.clone(), loaded.version);
        }

        errors.into_result()?;

        transaction.updated_at = chrono::Utc::now().naive_utc();
        changes.insert_transaction = Some(transaction.clone());
        self.storage.commit(changes).await?;

        tracing::info!(
            transaction_id = %transaction.id,
            entries = posted.len(),
            "recorded transaction"
        );

        Ok(PostedTransaction {
            transaction,
            entries: posted,
        })
    }

    /// Get a transaction with its entries
    pub async fn get_transaction(
        &self,
        transaction_id: &str,
    ) -> LedgerResult<Option<PostedTransaction>> {
        let Some(transaction) = self.storage.get_transaction(transaction_id).await? else {
            return Ok(None);
        };
        let entries = self.storage.get_transaction_entries(transaction_id).await?;
        Ok(Some(PostedTransaction {
            transaction,
            entries,
        }))
    }

    /// Get a transaction by ID, returning an error if not found
    pub async fn get_transaction_required(
        &self,
        transaction_id: &str,
    ) -> LedgerResult<PostedTransaction> {
        self.get_transaction(transaction_id)
            .await?
            .ok_or_else(|| LedgerError::TransactionNotFound(transaction_id.to_string()))
    }

    /// List all transaction headers
    pub async fn list_transactions(&self) -> LedgerResult<Vec<Transaction>> {
        self.storage.list_transactions().await
    }

    /// Get a journal entry by ID
    pub async fn get_entry(&self, entry_id: EntryId) -> LedgerResult<Option<JournalEntry>> {
        self.storage.get_entry(entry_id).await
    }

    /// Re-run entry and aggregate validation on a committed transaction
    pub async fn validate_transaction(&self, transaction_id: &str) -> LedgerResult<ValidationErrors> {
        let posted = self.get_transaction_required(transaction_id).await?;
        let drafts: Vec<EntryDraft> = posted.entries.iter().map(EntryDraft::from).collect();
        self.validate(&posted.transaction, &drafts).await
    }

    /// Check a committed entry's date against its current chain neighbours
    pub async fn validate_entry_links(&self, entry_id: EntryId) -> LedgerResult<ValidationErrors> {
        let entry = self.get_entry_required(entry_id).await?;
        let loaded = self.load_chain(&entry.account_id).await?;
        loaded.chain.validate_links(entry_id)
    }

    /// Change the magnitude of member entries and re-validate the transaction
    pub async fn amend_entry_amounts(
        &mut self,
        transaction_id: &str,
        amendments: &[EntryAmendment],
    ) -> LedgerResult<PostedTransaction> {
        let snapshot = self.get_transaction_required(transaction_id).await?;
        let mut versions = BTreeMap::new();
        for entry in &snapshot.entries {
            if !versions.contains_key(&entry.account_id) {
                let version = self.storage.chain_version(&entry.account_id).await?;
                versions.insert(entry.account_id.clone(), version);
            }
        }

        // Rows read after the versions are covered by the commit's version check.
        let PostedTransaction {
            mut transaction,
            mut entries,
        } = self.get_transaction_required(transaction_id).await?;
        let replaced = snapshot
            .entries
            .iter()
            .find(|old| !entries.iter().any(|e| e.id == old.id))
            .or_else(|| {
                entries
                    .iter()
                    .find(|e| !snapshot.entries.iter().any(|old| old.id == e.id))
            });
        if let Some(entry) = replaced {
            return Err(LedgerError::ConcurrencyConflict {
                account_id: entry.account_id.clone(),
                expected: versions.get(&entry.account_id).copied().unwrap_or_default(),
                found: self.storage.chain_version(&entry.account_id).await?,
            });
        }

        let now = chrono::Utc::now().naive_utc();
        for amendment in amendments {
            let entry = entries
                .iter_mut()
                .find(|e| e.id == amendment.entry_id)
                .ok_or(LedgerError::EntryNotFound(amendment.entry_id))?;
            entry.amount_in_cents = amendment.amount_in_cents;
            entry.updated_at = now;
        }

        let drafts: Vec<EntryDraft> = entries.iter().map(EntryDraft::from).collect();
        self.validate(&transaction, &drafts).await?.into_result()?;

        let mut changes = ChangeSet {
            expected_versions: versions,
            ..ChangeSet::default()
        };
        changes.put_entries = entries
            .iter()
            .filter(|e| amendments.iter().any(|a| a.entry_id == e.id))
            .cloned()
            .collect();
        transaction.updated_at = now;
        changes.update_transaction = Some(transaction.clone());
        self.storage.commit(changes).await?;

        tracing::info!(
            transaction_id = %transaction.id,
            amended = amendments.len(),
            "amended transaction amounts"
        );

        Ok(PostedTransaction {
            transaction,
            entries,
        })
    }

    /// Move an entry to another posted date (or position) by unlinking it and
    /// linking it again, committed as one change
    pub async fn repost_entry(
        &mut self,
        entry_id: EntryId,
        posted_date: NaiveDate,
        placement: Placement,
    ) -> LedgerResult<JournalEntry> {
        let entry = self.get_entry_required(entry_id).await?;
        let mut loaded = self.load_chain(&entry.account_id).await?;
        if !loaded.rows.contains_key(&entry_id) {
            return Err(LedgerError::EntryNotFound(entry_id));
        }

        loaded.chain.remove(entry_id)?;
        let outcome = loaded.chain.insert(entry_id, posted_date, placement)?;
        self.note_cascade(&loaded.chain, &outcome);

        let rows = loaded.touched_rows(|_| None)?;
        let moved = rows
            .iter()
            .find(|row| row.id == entry_id)
            .cloned()
            .ok_or(LedgerError::EntryNotFound(entry_id))?;

        let mut changes = ChangeSet {
            put_entries: rows,
            ..ChangeSet::default()
        };
        changes
            .expected_versions
            .insert(entry.account_id.clone(), loaded.version);
        self.storage.commit(changes).await?;

        tracing::info!(
            entry_id = %entry_id,
            from = %entry.posted_date,
            to = %posted_date,
            "reposted journal entry"
        );

        Ok(moved)
    }

    /// Delete a transaction, unlinking each of its entries from its chain
    pub async fn delete_transaction(&mut self, transaction_id: &str) -> LedgerResult<()> {
        let posted = self.get_transaction_required(transaction_id).await?;

        let mut by_account: BTreeMap<&str, Vec<EntryId>> = BTreeMap::new();
        for entry in &posted.entries {
            by_account
                .entry(entry.account_id.as_str())
                .or_default()
                .push(entry.id);
        }

        let mut changes = ChangeSet {
            delete_transaction: Some(transaction_id.to_string()),
            ..ChangeSet::default()
        };

        for (account_id, entry_ids) in by_account {
            let mut loaded = self.load_chain(account_id).await?;
            for entry_id in &entry_ids {
                let owner = loaded
                    .rows
                    .get(entry_id)
                    .map(|row| row.transaction_id.as_str());
                if owner != Some(transaction_id) {
                    return Err(LedgerError::Integrity(format!(
                        "entry {} is not owned by transaction {} in account {}",
                        entry_id, transaction_id, account_id
                    )));
                }
                loaded.chain.remove(*entry_id)?;
                loaded.rows.remove(entry_id);
            }
            changes.put_entries.extend(loaded.touched_rows(|_| None)?);
            changes.delete_entries.extend(entry_ids);
            changes
                .expected_versions
                .insert(account_id.to_string(), loaded.version);
        }

        self.storage.commit(changes).await?;
        tracing::info!(transaction_id, "deleted transaction");
        Ok(())
    }

    /// Signed sum of a set of entries, for callers that want the raw figure
    pub async fn balance_of(&self, entries: &[EntryDraft]) -> LedgerResult<BigDecimal> {
        let accounts = self.accounts_for(entries).await?;
        crate::utils::validation::balance_of(entries, &accounts, self.converter.as_ref())
    }

    async fn validate(
        &self,
        transaction: &Transaction,
        entries: &[EntryDraft],
    ) -> LedgerResult<ValidationErrors> {
        let accounts = self.accounts_for(entries).await?;
        let mut errors = ValidationErrors::new();
        for entry in entries {
            errors.extend(self.entry_validator.validate_entry(entry));
        }
        errors.extend(self.validator.validate_transaction(
            transaction,
            entries,
            &accounts,
            self.converter.as_ref(),
        )?);
        Ok(errors)
    }

    async fn accounts_for(&self, entries: &[EntryDraft]) -> LedgerResult<HashMap<AccountId, Account>> {
        let mut accounts = HashMap::new();
        for entry in entries {
            if accounts.contains_key(&entry.account_id) {
                continue;
            }
            if let Some(account) = self.storage.get_account(&entry.account_id).await? {
                accounts.insert(account.id.clone(), account);
            }
        }
        Ok(accounts)
    }

    async fn get_entry_required(&self, entry_id: EntryId) -> LedgerResult<JournalEntry> {
        self.storage
            .get_entry(entry_id)
            .await?
            .ok_or(LedgerError::EntryNotFound(entry_id))
    }

    async fn load_chain(&self, account_id: &str) -> LedgerResult<LoadedChain> {
        let version = self.storage.chain_version(account_id).await?;
        let entries = self
            .storage
            .entries_for_account(account_id, EntryOrdering::Chain)
            .await?;
        let chain = AccountChain::load(account_id, &entries)?;
        Ok(LoadedChain {
            chain,
            version,
            rows: entries.into_iter().map(|e| (e.id, e)).collect(),
        })
    }

    fn note_cascade(&self, chain: &AccountChain, outcome: &InsertOutcome) {
        if outcome.cascaded > self.cascade_warn_threshold {
            tracing::warn!(
                account_id = %chain.account_id(),
                entry_id = %outcome.link.entry_id,
                posted_date = %outcome.link.posted_date,
                cascaded = outcome.cascaded,
                "long same-day order cascade"
            );
        }
    }
}

/// Transaction builder for creating multi-entry transactions
#[derive(Debug)]
pub struct TransactionBuilder {
    transaction: Transaction,
    posted_date: Option<NaiveDate>,
    entries: Vec<EntryDraft>,
}

impl TransactionBuilder {
    /// Create a new transaction builder
    pub fn new(id: impl Into<TransactionId>, description: impl Into<String>) -> Self {
        Self {
            transaction: Transaction::new(id.into(), description.into(), None),
            posted_date: None,
            entries: Vec::new(),
        }
    }

    /// Posted date used by subsequent `credit` / `debit` calls
    pub fn posted_on(mut self, date: NaiveDate) -> Self {
        self.posted_date = Some(date);
        self
    }

    /// Set the reference for the transaction
    pub fn reference(mut self, reference: impl Into<String>) -> Self {
        self.transaction.reference = Some(reference.into());
        self
    }

    /// Add metadata to the transaction
    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.transaction.metadata.insert(key.into(), value.into());
        self
    }

    /// Add a credit entry
    pub fn credit(mut self, account_id: impl Into<AccountId>, amount_in_cents: i64) -> Self {
        self.entries.push(EntryDraft::new(
            account_id,
            TransactionType::Credit,
            amount_in_cents,
            self.posted_date,
        ));
        self
    }

    /// Add a debit entry
    pub fn debit(mut self, account_id: impl Into<AccountId>, amount_in_cents: i64) -> Self {
        self.entries.push(EntryDraft::new(
            account_id,
            TransactionType::Debit,
            amount_in_cents,
            self.posted_date,
        ));
        self
    }

    /// Add a custom entry
    pub fn entry(mut self, entry: EntryDraft) -> Self {
        self.entries.push(entry);
        self
    }

    /// Build the draft; validation happens when it is recorded
    pub fn build(self) -> TransactionDraft {
        TransactionDraft {
            transaction: self.transaction,
            entries: self.entries,
        }
    }
}

/// Common transaction patterns
pub mod patterns {
    use super::*;

    /// Move an amount between two accounts of the same currency
    pub fn transfer(
        id: impl Into<TransactionId>,
        description: impl Into<String>,
        date: NaiveDate,
        from_account_id: impl Into<AccountId>,
        to_account_id: impl Into<AccountId>,
        amount_in_cents: i64,
    ) -> TransactionDraft {
        TransactionBuilder::new(id, description)
            .posted_on(date)
            .debit(from_account_id, amount_in_cents)
            .credit(to_account_id, amount_in_cents)
            .build()
    }

    /// Move money between accounts of different currencies; the receiving
    /// entry carries the rate that converts its minor units into the common
    /// unit of the transaction
    pub fn cross_currency_transfer(
        id: impl Into<TransactionId>,
        description: impl Into<String>,
        date: NaiveDate,
        from_account_id: impl Into<AccountId>,
        from_amount_in_cents: i64,
        to_account_id: impl Into<AccountId>,
        to_amount_in_cents: i64,
        to_exchange_rate: BigDecimal,
    ) -> TransactionDraft {
        TransactionBuilder::new(id, description)
            .posted_on(date)
            .debit(from_account_id, from_amount_in_cents)
            .entry(
                EntryDraft::credit(to_account_id, to_amount_in_cents, date)
                    .with_exchange_rate(to_exchange_rate),
            )
            .build()
    }
}
