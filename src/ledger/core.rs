//! Ledger facade wiring the components together
//!
//! [`LedgerCore`] owns one storage handle shared across the account
//! directory, journal engine, trial balance calculator, payment allocator,
//! and budget monitor, and is the single place where domain events are
//! published and budget spend is routed after a posting commits.

use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

use crate::allocation::{OverpaymentPolicy, PaymentAllocator};
use crate::budget::BudgetMonitor;
use crate::events::{DomainEvent, EventSink, NullSink};
use crate::ledger::directory::{AccountDirectory, AccountNode};
use crate::ledger::journal::JournalEngine;
use crate::ledger::trial_balance::TrialBalanceCalculator;
use crate::traits::LedgerStore;
use crate::types::*;

pub struct LedgerCore<S: LedgerStore + Clone> {
    directory: AccountDirectory<S>,
    journal: JournalEngine<S>,
    trial_balance: TrialBalanceCalculator<S>,
    allocator: PaymentAllocator<S>,
    monitor: BudgetMonitor<S>,
    events: Arc<dyn EventSink>,
}

impl<S: LedgerStore + Clone> LedgerCore<S> {
    pub fn new(store: S) -> Self {
        Self::with_events(store, Arc::new(NullSink))
    }

    pub fn with_events(store: S, events: Arc<dyn EventSink>) -> Self {
        Self {
            directory: AccountDirectory::new(store.clone()),
            journal: JournalEngine::new(store.clone()),
            trial_balance: TrialBalanceCalculator::new(store.clone()),
            allocator: PaymentAllocator::new(store.clone()),
            monitor: BudgetMonitor::new(store),
            events,
        }
    }

    // --- chart of accounts ---

    pub async fn create_account(&self, spec: AccountSpec) -> LedgerResult<Account> {
        self.directory.create_account(spec).await
    }

    pub async fn get_account(&self, account_id: &str) -> LedgerResult<Option<Account>> {
        self.directory.get_account(account_id).await
    }

    pub async fn find_account_by_code(&self, code: &str) -> LedgerResult<Option<Account>> {
        self.directory.find_by_code(code).await
    }

    pub async fn list_accounts(&self) -> LedgerResult<Vec<Account>> {
        self.directory.list_accounts().await
    }

    pub async fn account_balance(
        &self,
        account_id: &str,
        as_of: Option<NaiveDate>,
    ) -> LedgerResult<Amount> {
        self.directory.get_balance(account_id, as_of).await
    }

    pub async fn list_hierarchy(&self, root_id: Option<&str>) -> LedgerResult<Vec<AccountNode>> {
        self.directory.list_hierarchy(root_id).await
    }

    pub async fn deactivate_account(&self, account_id: &str) -> LedgerResult<Account> {
        self.directory.deactivate_account(account_id).await
    }

    // --- journal ---

    pub async fn create_entry(
        &self,
        draft: EntryDraft,
        period: &LedgerPeriod,
    ) -> LedgerResult<JournalEntry> {
        self.journal.create_entry(draft, period).await
    }

    /// Post an entry, emit [`DomainEvent::EntryPosted`], and charge the
    /// budgets linked to the entry's accounts.
    pub async fn post_entry(
        &self,
        entry_id: &str,
        period: &LedgerPeriod,
    ) -> LedgerResult<JournalEntry> {
        let entry = self.journal.post_entry(entry_id, period).await?;
        self.after_post(&entry, period.fiscal_year).await;
        Ok(entry)
    }

    pub async fn void_entry(&self, entry_id: &str) -> LedgerResult<JournalEntry> {
        self.journal.void_entry(entry_id).await
    }

    /// Reverse a posted entry. The reversal posts through the same path, so
    /// it emits its own event and backs its amounts out of linked budgets.
    pub async fn reverse_entry(
        &self,
        entry_id: &str,
        date: NaiveDate,
        period: &LedgerPeriod,
    ) -> LedgerResult<JournalEntry> {
        let reversal = self.journal.reverse_entry(entry_id, date, period).await?;
        self.after_post(&reversal, period.fiscal_year).await;
        Ok(reversal)
    }

    pub async fn get_entry(&self, entry_id: &str) -> LedgerResult<Option<JournalEntry>> {
        self.journal.get_entry(entry_id).await
    }

    pub async fn entries_for_account(
        &self,
        account_id: &str,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> LedgerResult<Vec<JournalEntry>> {
        self.journal.entries_for_account(account_id, start, end).await
    }

    // --- reporting ---

    pub async fn trial_balance(&self, as_of: NaiveDate) -> LedgerResult<TrialBalance> {
        self.trial_balance.compute(as_of).await
    }

    pub async fn rebuild_balance(&self, account_id: &str) -> LedgerResult<Amount> {
        self.trial_balance.rebuild_balance(account_id).await
    }

    // --- payment references ---

    pub async fn open_reference(
        &self,
        entry_id: &str,
        account_id: &str,
        total: Amount,
        due_date: NaiveDate,
    ) -> LedgerResult<BillingReference> {
        self.allocator
            .open_reference(entry_id, account_id, total, due_date)
            .await
    }

    pub async fn allocate_payment(
        &self,
        payment_id: &str,
        amount: Amount,
        reference_ids: &[String],
        policy: OverpaymentPolicy,
    ) -> LedgerResult<AllocationReport> {
        let report = self
            .allocator
            .allocate(payment_id, amount, reference_ids, policy)
            .await?;
        self.events.publish(DomainEvent::PaymentAllocated {
            payment_id: report.payment_id.clone(),
            allocations: report.allocations.clone(),
        });
        Ok(report)
    }

    pub async fn preview_allocation(
        &self,
        payment_id: &str,
        amount: Amount,
        reference_ids: &[String],
        policy: OverpaymentPolicy,
    ) -> LedgerResult<AllocationReport> {
        self.allocator
            .preview(payment_id, amount, reference_ids, policy)
            .await
    }

    pub async fn outstanding_references(
        &self,
        account_id: &str,
    ) -> LedgerResult<Vec<BillingReference>> {
        self.allocator.outstanding_for_account(account_id).await
    }

    // --- budgets ---

    pub async fn create_budget(
        &self,
        name: &str,
        allocated: Amount,
        fiscal_year: i32,
        linked_accounts: Vec<String>,
    ) -> LedgerResult<Budget> {
        self.monitor
            .create_budget(name, allocated, fiscal_year, linked_accounts)
            .await
    }

    pub async fn get_budget(&self, budget_id: &str) -> LedgerResult<Option<Budget>> {
        self.monitor.get_budget(budget_id).await
    }

    pub async fn alerts_for_budget(&self, budget_id: &str) -> LedgerResult<Vec<BudgetAlert>> {
        self.monitor.alerts_for_budget(budget_id).await
    }

    pub async fn acknowledge_alert(
        &self,
        alert_id: &str,
        acknowledged_by: &str,
    ) -> LedgerResult<BudgetAlert> {
        self.monitor.acknowledge_alert(alert_id, acknowledged_by).await
    }

    /// Post-commit side effects: the posted event, then budget spend
    /// routing. The posting is already committed, so a failure here is
    /// logged and left for reconciliation rather than unwound.
    async fn after_post(&self, entry: &JournalEntry, fiscal_year: i32) {
        self.events.publish(DomainEvent::EntryPosted {
            entry_id: entry.id.clone(),
            entry_number: entry.entry_number.clone(),
            account_ids: entry.account_ids(),
            total: entry.total_debits(),
        });
        if let Err(err) = self.sync_budgets(entry, fiscal_year).await {
            warn!(
                entry = %entry.entry_number,
                error = %err,
                "budget sync failed after posting; budgets need reconciliation"
            );
        }
    }

    /// Charge budgets linked to the entry's account codes. The per-line
    /// spend delta is `debit - credit`, so reversals back spend out again.
    async fn sync_budgets(&self, entry: &JournalEntry, fiscal_year: i32) -> LedgerResult<()> {
        let mut deltas: HashMap<String, Amount> = HashMap::new();
        for line in &entry.lines {
            let Some(account) = self.directory.get_account(&line.account_id).await? else {
                continue;
            };
            if account.account_type != AccountType::Expense {
                continue;
            }
            for budget in self.monitor.budgets_for_account_code(&account.code).await? {
                if budget.fiscal_year != fiscal_year {
                    continue;
                }
                *deltas.entry(budget.id).or_insert(0) += line.debit - line.credit;
            }
        }

        for (budget_id, delta) in deltas {
            if delta == 0 {
                continue;
            }
            let raised = self.monitor.record_spend(&budget_id, delta).await?;
            for alert in raised {
                self.events.publish(DomainEvent::BudgetAlertRaised {
                    alert_id: alert.id.clone(),
                    budget_id: alert.budget_id.clone(),
                    alert_type: alert.alert_type,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::RecordingSink;
    use crate::ledger::journal::EntryBuilder;
    use crate::utils::memory_store::MemoryStore;

    fn date(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, m, d).unwrap()
    }

    #[tokio::test]
    async fn posting_emits_event_and_charges_linked_budget() {
        let sink = Arc::new(RecordingSink::new());
        let core = LedgerCore::with_events(MemoryStore::new(), sink.clone());
        let period = LedgerPeriod::calendar_year(2024);

        let cash = core
            .create_account(AccountSpec::leaf("1110", "Cash", AccountType::Asset))
            .await
            .unwrap();
        let rent = core
            .create_account(AccountSpec::leaf("6000", "Rent", AccountType::Expense))
            .await
            .unwrap();
        let budget = core
            .create_budget("Facilities 2024", 10_000, 2024, vec!["6000".to_string()])
            .await
            .unwrap();

        let entry = core
            .create_entry(
                EntryBuilder::new(date(3, 1), "March rent")
                    .debit(&rent.id, 8_000)
                    .credit(&cash.id, 8_000)
                    .build(),
                &period,
            )
            .await
            .unwrap();
        core.post_entry(&entry.id, &period).await.unwrap();

        let charged = core.get_budget(&budget.id).await.unwrap().unwrap();
        assert_eq!(charged.spent, 8_000);

        let events = sink.events();
        assert!(matches!(
            &events[0],
            DomainEvent::EntryPosted { entry_number, total, .. }
                if entry_number == &entry.entry_number && *total == 8_000
        ));
        assert!(matches!(
            &events[1],
            DomainEvent::BudgetAlertRaised { budget_id, alert_type, .. }
                if budget_id == &budget.id && *alert_type == AlertType::Warning
        ));
    }

    #[tokio::test]
    async fn reversal_backs_spend_out_of_budget() {
        let core = LedgerCore::new(MemoryStore::new());
        let period = LedgerPeriod::calendar_year(2024);

        let cash = core
            .create_account(AccountSpec::leaf("1110", "Cash", AccountType::Asset))
            .await
            .unwrap();
        let rent = core
            .create_account(AccountSpec::leaf("6000", "Rent", AccountType::Expense))
            .await
            .unwrap();
        let budget = core
            .create_budget("Facilities 2024", 10_000, 2024, vec!["6000".to_string()])
            .await
            .unwrap();

        let entry = core
            .create_entry(
                EntryBuilder::new(date(3, 1), "March rent")
                    .debit(&rent.id, 4_000)
                    .credit(&cash.id, 4_000)
                    .build(),
                &period,
            )
            .await
            .unwrap();
        core.post_entry(&entry.id, &period).await.unwrap();
        core.reverse_entry(&entry.id, date(3, 2), &period)
            .await
            .unwrap();

        let after = core.get_budget(&budget.id).await.unwrap().unwrap();
        assert_eq!(after.spent, 0);
    }

    #[tokio::test]
    async fn budget_in_other_fiscal_year_is_not_charged() {
        let core = LedgerCore::new(MemoryStore::new());
        let period = LedgerPeriod::calendar_year(2024);

        let cash = core
            .create_account(AccountSpec::leaf("1110", "Cash", AccountType::Asset))
            .await
            .unwrap();
        let rent = core
            .create_account(AccountSpec::leaf("6000", "Rent", AccountType::Expense))
            .await
            .unwrap();
        let budget = core
            .create_budget("Facilities 2025", 10_000, 2025, vec!["6000".to_string()])
            .await
            .unwrap();

        let entry = core
            .create_entry(
                EntryBuilder::new(date(3, 1), "March rent")
                    .debit(&rent.id, 4_000)
                    .credit(&cash.id, 4_000)
                    .build(),
                &period,
            )
            .await
            .unwrap();
        core.post_entry(&entry.id, &period).await.unwrap();

        let untouched = core.get_budget(&budget.id).await.unwrap().unwrap();
        assert_eq!(untouched.spent, 0);
    }

    #[tokio::test]
    async fn allocation_emits_payment_event() {
        let sink = Arc::new(RecordingSink::new());
        let core = LedgerCore::with_events(MemoryStore::new(), sink.clone());
        let period = LedgerPeriod::calendar_year(2024);

        let receivables = core
            .create_account(AccountSpec::leaf("1200", "Accounts Receivable", AccountType::Asset))
            .await
            .unwrap();
        let revenue = core
            .create_account(AccountSpec::leaf("4000", "Sales", AccountType::Revenue))
            .await
            .unwrap();
        let entry = core
            .create_entry(
                EntryBuilder::new(date(1, 5), "Invoice")
                    .reference("INV-001")
                    .debit(&receivables.id, 1_000)
                    .credit(&revenue.id, 1_000)
                    .build(),
                &period,
            )
            .await
            .unwrap();
        core.post_entry(&entry.id, &period).await.unwrap();
        let reference = core
            .open_reference(&entry.id, &receivables.id, 1_000, date(2, 1))
            .await
            .unwrap();

        core.allocate_payment(
            "pay-1",
            400,
            &[reference.id.clone()],
            OverpaymentPolicy::Reject,
        )
        .await
        .unwrap();

        let events = sink.events();
        assert!(events.iter().any(|e| matches!(
            e,
            DomainEvent::PaymentAllocated { payment_id, allocations }
                if payment_id == "pay-1" && allocations.len() == 1
        )));
    }
}
