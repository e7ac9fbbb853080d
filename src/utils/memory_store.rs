//! In-memory storage implementation for testing and development
//!
//! All tables live behind one lock, which is what makes the batch update
//! methods genuinely all-or-nothing: a version check failing halfway can
//! bail before anything was written.

use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::traits::LedgerStore;
use crate::types::*;

#[derive(Debug, Default)]
struct Inner {
    accounts: HashMap<String, Account>,
    account_order: Vec<String>,
    entries: HashMap<String, JournalEntry>,
    references: HashMap<String, BillingReference>,
    budgets: HashMap<String, Budget>,
    budget_order: Vec<String>,
    alerts: HashMap<String, BudgetAlert>,
    alert_order: Vec<String>,
    entry_seq: u64,
    reference_seq: u64,
}

impl Inner {
    /// Require that every row in the batch matches its stored version.
    /// Called before any write, so a failure leaves the store untouched.
    fn check_account_versions(&self, accounts: &[Account]) -> LedgerResult<()> {
        for account in accounts {
            let stored = self
                .accounts
                .get(&account.id)
                .ok_or_else(|| LedgerError::AccountNotFound(account.id.clone()))?;
            if stored.version != account.version {
                return Err(LedgerError::Conflict {
                    kind: "account",
                    id: account.id.clone(),
                });
            }
        }
        Ok(())
    }

    fn check_entry_version(&self, entry: &JournalEntry) -> LedgerResult<()> {
        let stored = self
            .entries
            .get(&entry.id)
            .ok_or_else(|| LedgerError::EntryNotFound(entry.id.clone()))?;
        if stored.version != entry.version {
            return Err(LedgerError::Conflict {
                kind: "entry",
                id: entry.id.clone(),
            });
        }
        Ok(())
    }

    fn check_reference_versions(&self, references: &[BillingReference]) -> LedgerResult<()> {
        for reference in references {
            let stored = self
                .references
                .get(&reference.id)
                .ok_or_else(|| LedgerError::ReferenceNotFound(reference.id.clone()))?;
            if stored.version != reference.version {
                return Err(LedgerError::Conflict {
                    kind: "reference",
                    id: reference.id.clone(),
                });
            }
        }
        Ok(())
    }
}

/// In-memory [`LedgerStore`] backed by a single `RwLock`.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear all data (useful for testing)
    pub fn clear(&self) {
        *self.write() = Inner::default();
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        // A poisoned lock means a panic mid-write; propagating the panic is
        // the only honest option for an in-memory test store.
        match self.inner.read() {
            Ok(guard) => guard,
            Err(poisoned) => panic!("memory store lock poisoned: {}", poisoned),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        match self.inner.write() {
            Ok(guard) => guard,
            Err(poisoned) => panic!("memory store lock poisoned: {}", poisoned),
        }
    }
}

fn in_range(date: NaiveDate, start: Option<NaiveDate>, end: Option<NaiveDate>) -> bool {
    start.map_or(true, |s| date >= s) && end.map_or(true, |e| date <= e)
}

fn sort_entries(entries: &mut [JournalEntry]) {
    entries.sort_by(|a, b| a.date.cmp(&b.date).then(a.entry_number.cmp(&b.entry_number)));
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn save_account(&self, account: &Account) -> LedgerResult<()> {
        let mut inner = self.write();
        if !inner.accounts.contains_key(&account.id) {
            inner.account_order.push(account.id.clone());
        }
        inner.accounts.insert(account.id.clone(), account.clone());
        Ok(())
    }

    async fn find_account(&self, account_id: &str) -> LedgerResult<Option<Account>> {
        Ok(self.read().accounts.get(account_id).cloned())
    }

    async fn find_account_by_code(&self, code: &str) -> LedgerResult<Option<Account>> {
        Ok(self
            .read()
            .accounts
            .values()
            .find(|a| a.code.eq_ignore_ascii_case(code))
            .cloned())
    }

    async fn list_accounts(&self) -> LedgerResult<Vec<Account>> {
        let inner = self.read();
        Ok(inner
            .account_order
            .iter()
            .filter_map(|id| inner.accounts.get(id).cloned())
            .collect())
    }

    async fn update_accounts(&self, accounts: &[Account]) -> LedgerResult<()> {
        let mut inner = self.write();
        inner.check_account_versions(accounts)?;
        for account in accounts {
            let mut updated = account.clone();
            updated.version += 1;
            inner.accounts.insert(updated.id.clone(), updated);
        }
        Ok(())
    }

    async fn save_entry(&self, entry: &JournalEntry) -> LedgerResult<()> {
        self.write().entries.insert(entry.id.clone(), entry.clone());
        Ok(())
    }

    async fn find_entry(&self, entry_id: &str) -> LedgerResult<Option<JournalEntry>> {
        Ok(self.read().entries.get(entry_id).cloned())
    }

    async fn update_entry(&self, entry: &JournalEntry) -> LedgerResult<()> {
        let mut inner = self.write();
        inner.check_entry_version(entry)?;
        let mut updated = entry.clone();
        updated.version += 1;
        inner.entries.insert(updated.id.clone(), updated);
        Ok(())
    }

    async fn commit_posting(
        &self,
        accounts: &[Account],
        entry: &JournalEntry,
    ) -> LedgerResult<()> {
        let mut inner = self.write();
        inner.check_account_versions(accounts)?;
        inner.check_entry_version(entry)?;
        for account in accounts {
            let mut updated = account.clone();
            updated.version += 1;
            inner.accounts.insert(updated.id.clone(), updated);
        }
        let mut updated = entry.clone();
        updated.version += 1;
        inner.entries.insert(updated.id.clone(), updated);
        Ok(())
    }

    async fn entries_for_account(
        &self,
        account_id: &str,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> LedgerResult<Vec<JournalEntry>> {
        let mut entries: Vec<JournalEntry> = self
            .read()
            .entries
            .values()
            .filter(|e| in_range(e.date, start, end))
            .filter(|e| e.lines.iter().any(|l| l.account_id == account_id))
            .cloned()
            .collect();
        sort_entries(&mut entries);
        Ok(entries)
    }

    async fn list_entries(
        &self,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> LedgerResult<Vec<JournalEntry>> {
        let mut entries: Vec<JournalEntry> = self
            .read()
            .entries
            .values()
            .filter(|e| in_range(e.date, start, end))
            .cloned()
            .collect();
        sort_entries(&mut entries);
        Ok(entries)
    }

    async fn next_entry_number(&self) -> LedgerResult<u64> {
        let mut inner = self.write();
        inner.entry_seq += 1;
        Ok(inner.entry_seq)
    }

    async fn save_reference(&self, reference: &BillingReference) -> LedgerResult<()> {
        self.write()
            .references
            .insert(reference.id.clone(), reference.clone());
        Ok(())
    }

    async fn find_reference(&self, reference_id: &str) -> LedgerResult<Option<BillingReference>> {
        Ok(self.read().references.get(reference_id).cloned())
    }

    async fn find_reference_for_entry(
        &self,
        entry_id: &str,
        account_id: &str,
    ) -> LedgerResult<Option<BillingReference>> {
        Ok(self
            .read()
            .references
            .values()
            .find(|r| r.entry_id == entry_id && r.account_id == account_id)
            .cloned())
    }

    async fn outstanding_references(
        &self,
        account_id: &str,
    ) -> LedgerResult<Vec<BillingReference>> {
        let mut open: Vec<BillingReference> = self
            .read()
            .references
            .values()
            .filter(|r| r.account_id == account_id && r.is_open())
            .cloned()
            .collect();
        open.sort_by(|a, b| a.due_date.cmp(&b.due_date).then(a.seq.cmp(&b.seq)));
        Ok(open)
    }

    async fn update_references(&self, references: &[BillingReference]) -> LedgerResult<()> {
        let mut inner = self.write();
        inner.check_reference_versions(references)?;
        for reference in references {
            let mut updated = reference.clone();
            updated.version += 1;
            inner.references.insert(updated.id.clone(), updated);
        }
        Ok(())
    }

    async fn next_reference_seq(&self) -> LedgerResult<u64> {
        let mut inner = self.write();
        inner.reference_seq += 1;
        Ok(inner.reference_seq)
    }

    async fn save_budget(&self, budget: &Budget) -> LedgerResult<()> {
        let mut inner = self.write();
        if !inner.budgets.contains_key(&budget.id) {
            inner.budget_order.push(budget.id.clone());
        }
        inner.budgets.insert(budget.id.clone(), budget.clone());
        Ok(())
    }

    async fn find_budget(&self, budget_id: &str) -> LedgerResult<Option<Budget>> {
        Ok(self.read().budgets.get(budget_id).cloned())
    }

    async fn budgets_linked_to(&self, account_code: &str) -> LedgerResult<Vec<Budget>> {
        let inner = self.read();
        Ok(inner
            .budget_order
            .iter()
            .filter_map(|id| inner.budgets.get(id))
            .filter(|b| {
                b.linked_accounts
                    .iter()
                    .any(|code| code.eq_ignore_ascii_case(account_code))
            })
            .cloned()
            .collect())
    }

    async fn update_budget(&self, budget: &Budget) -> LedgerResult<()> {
        let mut inner = self.write();
        let stored = inner
            .budgets
            .get(&budget.id)
            .ok_or_else(|| LedgerError::BudgetNotFound(budget.id.clone()))?;
        if stored.version != budget.version {
            return Err(LedgerError::Conflict {
                kind: "budget",
                id: budget.id.clone(),
            });
        }
        let mut updated = budget.clone();
        updated.version += 1;
        inner.budgets.insert(updated.id.clone(), updated);
        Ok(())
    }

    async fn save_alert(&self, alert: &BudgetAlert) -> LedgerResult<()> {
        let mut inner = self.write();
        if !inner.alerts.contains_key(&alert.id) {
            inner.alert_order.push(alert.id.clone());
        }
        inner.alerts.insert(alert.id.clone(), alert.clone());
        Ok(())
    }

    async fn find_alert(&self, alert_id: &str) -> LedgerResult<Option<BudgetAlert>> {
        Ok(self.read().alerts.get(alert_id).cloned())
    }

    async fn alerts_for_budget(&self, budget_id: &str) -> LedgerResult<Vec<BudgetAlert>> {
        let inner = self.read();
        Ok(inner
            .alert_order
            .iter()
            .filter_map(|id| inner.alerts.get(id))
            .filter(|a| a.budget_id == budget_id)
            .cloned()
            .collect())
    }

    async fn update_alert(&self, alert: &BudgetAlert) -> LedgerResult<()> {
        let mut inner = self.write();
        if !inner.alerts.contains_key(&alert.id) {
            return Err(LedgerError::AlertNotFound(alert.id.clone()));
        }
        inner.alerts.insert(alert.id.clone(), alert.clone());
        Ok(())
    }
}
