//! Persistence abstraction for the ledger core
//!
//! The core works against any storage backend (PostgreSQL, MySQL, SQLite,
//! in-memory, ...) that implements [`LedgerStore`]. The backend is expected
//! to provide the atomicity guarantees the batch methods document; the
//! in-memory implementation in [`crate::utils::memory_store`] does so under
//! a single lock.

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::types::*;

/// Storage abstraction for accounts, journal entries, billing references,
/// budgets, and alerts.
///
/// Concurrency discipline: single-row `update_*` methods and the batch
/// methods compare the incoming aggregate's `version` against the stored one
/// and fail with [`LedgerError::Conflict`] on mismatch, bumping the version
/// on success. Batch methods are all-or-nothing: either every row passes its
/// version check and is written, or none is.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    // --- accounts ---

    /// Persist a new account.
    async fn save_account(&self, account: &Account) -> LedgerResult<()>;

    /// Look up an account by id.
    async fn find_account(&self, account_id: &str) -> LedgerResult<Option<Account>>;

    /// Look up an account by its human code, case-insensitively.
    async fn find_account_by_code(&self, code: &str) -> LedgerResult<Option<Account>>;

    /// All accounts in creation order.
    async fn list_accounts(&self) -> LedgerResult<Vec<Account>>;

    /// Version-checked, all-or-nothing update of a set of accounts.
    async fn update_accounts(&self, accounts: &[Account]) -> LedgerResult<()>;

    // --- journal entries ---

    async fn save_entry(&self, entry: &JournalEntry) -> LedgerResult<()>;

    async fn find_entry(&self, entry_id: &str) -> LedgerResult<Option<JournalEntry>>;

    /// Version-checked update of a single entry.
    async fn update_entry(&self, entry: &JournalEntry) -> LedgerResult<()>;

    /// Commit a posting: the updated account batch and the posted entry land
    /// in one version-checked, all-or-nothing operation. A failure leaves
    /// both the balances and the entry status untouched, so retrying the
    /// posting can never apply the lines twice.
    async fn commit_posting(
        &self,
        accounts: &[Account],
        entry: &JournalEntry,
    ) -> LedgerResult<()>;

    /// Entries touching the account, ordered by date then entry number.
    async fn entries_for_account(
        &self,
        account_id: &str,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> LedgerResult<Vec<JournalEntry>>;

    /// All entries in a date range, ordered by date then entry number.
    async fn list_entries(
        &self,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> LedgerResult<Vec<JournalEntry>>;

    /// Next value of the per-ledger entry number sequence.
    async fn next_entry_number(&self) -> LedgerResult<u64>;

    // --- billing references ---

    async fn save_reference(&self, reference: &BillingReference) -> LedgerResult<()>;

    async fn find_reference(&self, reference_id: &str) -> LedgerResult<Option<BillingReference>>;

    /// The reference opened for a given (entry, account) pair, if any.
    async fn find_reference_for_entry(
        &self,
        entry_id: &str,
        account_id: &str,
    ) -> LedgerResult<Option<BillingReference>>;

    /// Open (not fully paid) references for an account, ordered by due date
    /// ascending then creation sequence.
    async fn outstanding_references(&self, account_id: &str)
        -> LedgerResult<Vec<BillingReference>>;

    /// Version-checked, all-or-nothing update of a set of references.
    async fn update_references(&self, references: &[BillingReference]) -> LedgerResult<()>;

    /// Next value of the reference creation sequence.
    async fn next_reference_seq(&self) -> LedgerResult<u64>;

    // --- budgets ---

    async fn save_budget(&self, budget: &Budget) -> LedgerResult<()>;

    async fn find_budget(&self, budget_id: &str) -> LedgerResult<Option<Budget>>;

    /// Budgets whose linked account codes include the given code.
    async fn budgets_linked_to(&self, account_code: &str) -> LedgerResult<Vec<Budget>>;

    /// Version-checked update of a single budget.
    async fn update_budget(&self, budget: &Budget) -> LedgerResult<()>;

    // --- alerts ---

    async fn save_alert(&self, alert: &BudgetAlert) -> LedgerResult<()>;

    async fn find_alert(&self, alert_id: &str) -> LedgerResult<Option<BudgetAlert>>;

    /// Alerts for a budget in creation order.
    async fn alerts_for_budget(&self, budget_id: &str) -> LedgerResult<Vec<BudgetAlert>>;

    async fn update_alert(&self, alert: &BudgetAlert) -> LedgerResult<()>;
}
