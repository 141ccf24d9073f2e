//! In-memory storage implementation for testing

use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::traits::*;
use crate::types::*;

#[derive(Debug, Default)]
struct State {
    accounts: HashMap<AccountId, Account>,
    transactions: HashMap<TransactionId, Transaction>,
    entries: HashMap<EntryId, JournalEntry>,
    chain_versions: HashMap<AccountId, u64>,
}

impl State {
    fn account_entries(&self, account_id: &str) -> impl Iterator<Item = &JournalEntry> {
        let account_id = account_id.to_string();
        self.entries
            .values()
            .filter(move |e| e.account_id == account_id)
    }
}

/// In-memory storage implementation for testing and development.
///
/// Clones share the same state. Every commit runs under one write lock, so a
/// change set is applied completely or not at all.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    state: Arc<RwLock<State>>,
}

fn poisoned<T>(_: PoisonError<T>) -> LedgerError {
    LedgerError::Storage("memory storage lock poisoned".to_string())
}

impl MemoryStorage {
    /// Create a new memory storage instance
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite a stored entry row without any checks (useful for testing
    /// corruption handling)
    pub fn put_entry_unchecked(&self, entry: JournalEntry) -> LedgerResult<()> {
        self.state
            .write()
            .map_err(poisoned)?
            .entries
            .insert(entry.id, entry);
        Ok(())
    }
}

#[async_trait]
impl AccountRegistry for MemoryStorage {
    async fn get_account(&self, account_id: &str) -> LedgerResult<Option<Account>> {
        Ok(self
            .state
            .read()
            .map_err(poisoned)?
            .accounts
            .get(account_id)
            .cloned())
    }

    async fn entries_for_account(
        &self,
        account_id: &str,
        ordering: EntryOrdering,
    ) -> LedgerResult<Vec<JournalEntry>> {
        let state = self.state.read().map_err(poisoned)?;
        let mut entries: Vec<JournalEntry> = state.account_entries(account_id).cloned().collect();
        entries.sort_by(|a, b| ordering.compare(a, b));
        Ok(entries)
    }

    async fn first_entry_after(
        &self,
        account_id: &str,
        date: NaiveDate,
    ) -> LedgerResult<Option<JournalEntry>> {
        let state = self.state.read().map_err(poisoned)?;
        Ok(state
            .account_entries(account_id)
            .filter(|e| e.posted_date > date)
            .min_by(|a, b| EntryOrdering::Chain.compare(a, b))
            .cloned())
    }

    async fn last_entry_at_or_before(
        &self,
        account_id: &str,
        date: NaiveDate,
    ) -> LedgerResult<Option<JournalEntry>> {
        let state = self.state.read().map_err(poisoned)?;
        Ok(state
            .account_entries(account_id)
            .filter(|e| e.posted_date <= date)
            .max_by(|a, b| EntryOrdering::Chain.compare(a, b))
            .cloned())
    }
}

#[async_trait]
impl LedgerStorage for MemoryStorage {
    async fn save_account(&mut self, account: &Account) -> LedgerResult<()> {
        let mut state = self.state.write().map_err(poisoned)?;
        if state.accounts.contains_key(&account.id) {
            return Err(LedgerError::AccountExists(account.id.clone()));
        }
        state.accounts.insert(account.id.clone(), account.clone());
        Ok(())
    }

    async fn list_accounts(&self, account_type: Option<AccountType>) -> LedgerResult<Vec<Account>> {
        let state = self.state.read().map_err(poisoned)?;
        let mut accounts: Vec<Account> = state
            .accounts
            .values()
            .filter(|account| account_type.is_none_or(|t| account.account_type == t))
            .cloned()
            .collect();
        accounts.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(accounts)
    }

    async fn get_transaction(&self, transaction_id: &str) -> LedgerResult<Option<Transaction>> {
        Ok(self
            .state
            .read()
            .map_err(poisoned)?
            .transactions
            .get(transaction_id)
            .cloned())
    }

    async fn list_transactions(&self) -> LedgerResult<Vec<Transaction>> {
        let state = self.state.read().map_err(poisoned)?;
        let mut transactions: Vec<Transaction> = state.transactions.values().cloned().collect();
        transactions.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(transactions)
    }

    async fn get_transaction_entries(
        &self,
        transaction_id: &str,
    ) -> LedgerResult<Vec<JournalEntry>> {
        let state = self.state.read().map_err(poisoned)?;
        let mut entries: Vec<JournalEntry> = state
            .entries
            .values()
            .filter(|e| e.transaction_id == transaction_id)
            .cloned()
            .collect();
        entries.sort_by(|a, b| a.account_id.cmp(&b.account_id));
        Ok(entries)
    }

    async fn get_entry(&self, entry_id: EntryId) -> LedgerResult<Option<JournalEntry>> {
        Ok(self
            .state
            .read()
            .map_err(poisoned)?
            .entries
            .get(&entry_id)
            .cloned())
    }

    async fn chain_version(&self, account_id: &str) -> LedgerResult<u64> {
        Ok(self
            .state
            .read()
            .map_err(poisoned)?
            .chain_versions
            .get(account_id)
            .copied()
            .unwrap_or(0))
    }

    async fn commit(&mut self, changes: ChangeSet) -> LedgerResult<()> {
        let mut state = self.state.write().map_err(poisoned)?;

        // Every check runs before the first write.
        for (account_id, &expected) in &changes.expected_versions {
            let found = state.chain_versions.get(account_id).copied().unwrap_or(0);
            if found != expected {
                return Err(LedgerError::ConcurrencyConflict {
                    account_id: account_id.clone(),
                    expected,
                    found,
                });
            }
        }
        if let Some(transaction) = &changes.insert_transaction {
            if state.transactions.contains_key(&transaction.id) {
                return Err(LedgerError::TransactionExists(transaction.id.clone()));
            }
        }
        if let Some(transaction) = &changes.update_transaction {
            if !state.transactions.contains_key(&transaction.id) {
                return Err(LedgerError::TransactionNotFound(transaction.id.clone()));
            }
        }
        let inserted = changes.insert_transaction.as_ref().map(|t| t.id.as_str());
        for entry in &changes.put_entries {
            if !state.accounts.contains_key(&entry.account_id) {
                return Err(LedgerError::AccountNotFound(entry.account_id.clone()));
            }
            let owner_known = state.transactions.contains_key(&entry.transaction_id)
                || inserted == Some(entry.transaction_id.as_str());
            if !owner_known {
                return Err(LedgerError::TransactionNotFound(entry.transaction_id.clone()));
            }
            if !state.entries.contains_key(&entry.id)
                && inserted != Some(entry.transaction_id.as_str())
            {
                return Err(LedgerError::EntryNotFound(entry.id));
            }
        }
        for entry_id in &changes.delete_entries {
            if !state.entries.contains_key(entry_id) {
                return Err(LedgerError::EntryNotFound(*entry_id));
            }
        }
        if let Some(transaction_id) = &changes.delete_transaction {
            if !state.transactions.contains_key(transaction_id) {
                return Err(LedgerError::TransactionNotFound(transaction_id.clone()));
            }
        }

        for entry_id in &changes.delete_entries {
            state.entries.remove(entry_id);
        }
        if let Some(transaction_id) = &changes.delete_transaction {
            state.transactions.remove(transaction_id);
        }
        for transaction in changes
            .insert_transaction
            .into_iter()
            .chain(changes.update_transaction)
        {
            state.transactions.insert(transaction.id.clone(), transaction);
        }
        for entry in changes.put_entries {
            state.entries.insert(entry.id, entry);
        }
        for account_id in changes.expected_versions.into_keys() {
            *state.chain_versions.entry(account_id).or_insert(0) += 1;
        }

        Ok(())
    }
}
