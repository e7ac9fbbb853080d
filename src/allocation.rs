//! Payment allocation against outstanding billing references
//!
//! A payment walks the target references oldest-due-first and applies
//! `min(remaining, outstanding)` to each until it runs out. The touched
//! references are committed as one version-checked batch; a conflict rolls
//! the whole allocation back.

use chrono::NaiveDate;
use tracing::{debug, info};

use crate::traits::LedgerStore;
use crate::types::*;

/// What to do when the payment exceeds the total outstanding of the target
/// references.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverpaymentPolicy {
    /// Reject the allocation with [`LedgerError::OverAllocation`].
    #[default]
    Reject,
    /// Satisfy every reference and report the remainder as unapplied
    /// credit.
    CarryCredit,
}

pub struct PaymentAllocator<S: LedgerStore> {
    store: S,
}

impl<S: LedgerStore> PaymentAllocator<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Open a billing reference from a posted journal entry, Tally-style:
    /// the entry's reference string becomes the bill/invoice identity the
    /// allocator settles against later.
    pub async fn open_reference(
        &self,
        entry_id: &str,
        account_id: &str,
        total: Amount,
        due_date: NaiveDate,
    ) -> LedgerResult<BillingReference> {
        if total <= 0 {
            return Err(LedgerError::Validation(
                "reference total must be positive".to_string(),
            ));
        }
        let entry = self
            .store
            .find_entry(entry_id)
            .await?
            .ok_or_else(|| LedgerError::EntryNotFound(entry_id.to_string()))?;
        if !entry.is_posted() {
            return Err(LedgerError::Validation(format!(
                "journal entry {} must be posted before a reference can be opened",
                entry.entry_number
            )));
        }
        let reference_string = entry.reference.clone().ok_or_else(|| {
            LedgerError::Validation(format!(
                "journal entry {} has no reference string",
                entry.entry_number
            ))
        })?;
        let account = self
            .store
            .find_account(account_id)
            .await?
            .ok_or_else(|| LedgerError::AccountNotFound(account_id.to_string()))?;
        if account.is_group {
            return Err(LedgerError::Validation(format!(
                "references attach to leaf accounts, '{}' is a group",
                account.code
            )));
        }
        if self
            .store
            .find_reference_for_entry(entry_id, account_id)
            .await?
            .is_some()
        {
            return Err(LedgerError::Validation(format!(
                "a reference already exists for entry {} on account '{}'",
                entry.entry_number, account.code
            )));
        }

        let now = chrono::Utc::now().naive_utc();
        let reference = BillingReference {
            id: uuid::Uuid::new_v4().to_string(),
            entry_id: entry.id.clone(),
            entry_number: entry.entry_number.clone(),
            reference: reference_string,
            account_id: account.id.clone(),
            total,
            paid: 0,
            outstanding: total,
            due_date,
            seq: self.store.next_reference_seq().await?,
            status: ReferenceStatus::Outstanding,
            version: 0,
            created_at: now,
            updated_at: now,
        };
        self.store.save_reference(&reference).await?;
        debug!(reference = %reference.reference, total, "billing reference opened");
        Ok(reference)
    }

    /// Distribute a payment across the given references and commit the
    /// result as one batch.
    pub async fn allocate(
        &self,
        payment_id: &str,
        amount: Amount,
        reference_ids: &[String],
        policy: OverpaymentPolicy,
    ) -> LedgerResult<AllocationReport> {
        let targets = self.load_targets(reference_ids).await?;
        let (updated, report) = plan_allocation(payment_id, amount, targets, policy)?;

        if !updated.is_empty() {
            self.store.update_references(&updated).await?;
        }
        info!(
            payment = payment_id,
            amount,
            references = report.allocations.len(),
            unapplied = report.unapplied,
            "payment allocated"
        );
        Ok(report)
    }

    /// Dry run: the allocation breakdown the payment would produce, with no
    /// state change.
    pub async fn preview(
        &self,
        payment_id: &str,
        amount: Amount,
        reference_ids: &[String],
        policy: OverpaymentPolicy,
    ) -> LedgerResult<AllocationReport> {
        let targets = self.load_targets(reference_ids).await?;
        let (_, report) = plan_allocation(payment_id, amount, targets, policy)?;
        Ok(report)
    }

    /// Allocate against every open reference of an account, oldest due
    /// first.
    pub async fn allocate_for_account(
        &self,
        payment_id: &str,
        amount: Amount,
        account_id: &str,
        policy: OverpaymentPolicy,
    ) -> LedgerResult<AllocationReport> {
        let open = self.store.outstanding_references(account_id).await?;
        let (updated, report) = plan_allocation(payment_id, amount, open, policy)?;
        if !updated.is_empty() {
            self.store.update_references(&updated).await?;
        }
        Ok(report)
    }

    pub async fn get_reference(&self, reference_id: &str) -> LedgerResult<Option<BillingReference>> {
        self.store.find_reference(reference_id).await
    }

    pub async fn outstanding_for_account(
        &self,
        account_id: &str,
    ) -> LedgerResult<Vec<BillingReference>> {
        self.store.outstanding_references(account_id).await
    }

    async fn load_targets(&self, reference_ids: &[String]) -> LedgerResult<Vec<BillingReference>> {
        let mut targets = Vec::with_capacity(reference_ids.len());
        for id in reference_ids {
            let reference = self
                .store
                .find_reference(id)
                .await?
                .ok_or_else(|| LedgerError::ReferenceNotFound(id.clone()))?;
            targets.push(reference);
        }
        Ok(targets)
    }
}

/// Pure allocation walk. Sorts the targets into the required order, checks
/// the amount against policy, and returns the mutated references together
/// with the report. Touching no storage makes preview and commit share one
/// code path.
fn plan_allocation(
    payment_id: &str,
    amount: Amount,
    mut targets: Vec<BillingReference>,
    policy: OverpaymentPolicy,
) -> LedgerResult<(Vec<BillingReference>, AllocationReport)> {
    if amount <= 0 {
        return Err(LedgerError::Validation(
            "payment amount must be positive".to_string(),
        ));
    }

    // Required order: ascending due date, creation sequence breaks ties.
    targets.sort_by(|a, b| a.due_date.cmp(&b.due_date).then(a.seq.cmp(&b.seq)));

    let available: Amount = targets.iter().map(|r| r.outstanding).sum();
    if amount > available && policy == OverpaymentPolicy::Reject {
        return Err(LedgerError::OverAllocation {
            requested: amount,
            available,
        });
    }

    let mut remaining = amount;
    let mut updated = Vec::new();
    let mut allocations = Vec::new();
    for mut reference in targets {
        if remaining == 0 {
            break;
        }
        let applied = remaining.min(reference.outstanding);
        if applied == 0 {
            continue;
        }
        reference.apply_payment(applied);
        remaining -= applied;
        allocations.push(Allocation {
            reference_id: reference.id.clone(),
            reference: reference.reference.clone(),
            applied,
            outstanding_after: reference.outstanding,
            status_after: reference.status,
        });
        updated.push(reference);
    }

    let report = AllocationReport {
        payment_id: payment_id.to_string(),
        amount,
        allocations,
        unapplied: remaining,
    };
    Ok((updated, report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::directory::AccountDirectory;
    use crate::ledger::journal::{EntryBuilder, JournalEngine};
    use crate::utils::memory_store::MemoryStore;

    fn date(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, m, d).unwrap()
    }

    struct Fixture {
        allocator: PaymentAllocator<MemoryStore>,
        receivables: Account,
    }

    /// Posts one invoice entry per (amount, due date) pair and opens a
    /// reference for each against the receivables account.
    async fn fixture(invoices: &[(Amount, NaiveDate)]) -> (Fixture, Vec<BillingReference>) {
        let store = MemoryStore::new();
        let directory = AccountDirectory::new(store.clone());
        let engine = JournalEngine::new(store.clone());
        let allocator = PaymentAllocator::new(store.clone());
        let period = LedgerPeriod::calendar_year(2024);

        let receivables = directory
            .create_account(AccountSpec::leaf("1200", "Accounts Receivable", AccountType::Asset))
            .await
            .unwrap();
        let revenue = directory
            .create_account(AccountSpec::leaf("4000", "Sales", AccountType::Revenue))
            .await
            .unwrap();

        let mut references = Vec::new();
        for (i, (amount, due)) in invoices.iter().enumerate() {
            let entry = engine
                .create_entry(
                    EntryBuilder::new(date(1, 5), "Invoice")
                        .reference(&format!("INV-{:03}", i + 1))
                        .debit(&receivables.id, *amount)
                        .credit(&revenue.id, *amount)
                        .build(),
                    &period,
                )
                .await
                .unwrap();
            engine.post_entry(&entry.id, &period).await.unwrap();
            let reference = allocator
                .open_reference(&entry.id, &receivables.id, *amount, *due)
                .await
                .unwrap();
            references.push(reference);
        }

        (
            Fixture {
                allocator,
                receivables,
            },
            references,
        )
    }

    fn ids(refs: &[BillingReference]) -> Vec<String> {
        refs.iter().map(|r| r.id.clone()).collect()
    }

    #[tokio::test]
    async fn partial_payment_touches_only_first_reference() {
        let (fx, refs) = fixture(&[(1000, date(2, 1)), (500, date(3, 1))]).await;
        let report = fx
            .allocator
            .allocate("pay-1", 400, &ids(&refs), OverpaymentPolicy::Reject)
            .await
            .unwrap();

        assert_eq!(report.allocations.len(), 1);
        assert_eq!(report.allocations[0].applied, 400);
        assert_eq!(report.allocations[0].status_after, ReferenceStatus::PartiallyPaid);
        assert_eq!(report.unapplied, 0);

        let first = fx.allocator.get_reference(&refs[0].id).await.unwrap().unwrap();
        assert_eq!(first.paid, 400);
        assert_eq!(first.outstanding, 600);
        let second = fx.allocator.get_reference(&refs[1].id).await.unwrap().unwrap();
        assert_eq!(second.paid, 0);
        assert_eq!(second.status, ReferenceStatus::Outstanding);
    }

    #[tokio::test]
    async fn two_step_settlement_reaches_fully_paid() {
        let (fx, refs) = fixture(&[(1000, date(2, 1))]).await;
        fx.allocator
            .allocate("pay-1", 400, &ids(&refs), OverpaymentPolicy::Reject)
            .await
            .unwrap();
        fx.allocator
            .allocate("pay-2", 600, &ids(&refs), OverpaymentPolicy::Reject)
            .await
            .unwrap();

        let settled = fx.allocator.get_reference(&refs[0].id).await.unwrap().unwrap();
        assert_eq!(settled.paid, 1000);
        assert_eq!(settled.outstanding, 0);
        assert_eq!(settled.status, ReferenceStatus::FullyPaid);
        assert_eq!(settled.paid + settled.outstanding, settled.total);
    }

    #[tokio::test]
    async fn allocates_oldest_due_date_first_with_seq_tiebreak() {
        // Created out of due-date order on purpose; the second and third
        // share a due date so creation sequence decides.
        let (fx, refs) =
            fixture(&[(300, date(3, 1)), (200, date(2, 1)), (100, date(2, 1))]).await;
        let report = fx
            .allocator
            .allocate("pay-1", 250, &ids(&refs), OverpaymentPolicy::Reject)
            .await
            .unwrap();

        assert_eq!(report.allocations.len(), 2);
        assert_eq!(report.allocations[0].reference_id, refs[1].id);
        assert_eq!(report.allocations[0].applied, 200);
        assert_eq!(report.allocations[1].reference_id, refs[2].id);
        assert_eq!(report.allocations[1].applied, 50);

        let untouched = fx.allocator.get_reference(&refs[0].id).await.unwrap().unwrap();
        assert_eq!(untouched.paid, 0);
    }

    #[tokio::test]
    async fn full_coverage_satisfies_all_in_order() {
        let (fx, refs) = fixture(&[(1000, date(2, 1)), (500, date(3, 1))]).await;
        let report = fx
            .allocator
            .allocate("pay-1", 1500, &ids(&refs), OverpaymentPolicy::Reject)
            .await
            .unwrap();
        assert_eq!(report.allocations.len(), 2);
        assert!(report
            .allocations
            .iter()
            .all(|a| a.status_after == ReferenceStatus::FullyPaid));
        assert_eq!(report.unapplied, 0);
        assert!(fx
            .allocator
            .outstanding_for_account(&fx.receivables.id)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn overpayment_rejected_by_default() {
        let (fx, refs) = fixture(&[(1000, date(2, 1))]).await;
        let err = fx
            .allocator
            .allocate("pay-1", 1200, &ids(&refs), OverpaymentPolicy::Reject)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::OverAllocation {
                requested: 1200,
                available: 1000
            }
        ));
        // Nothing was mutated.
        let reference = fx.allocator.get_reference(&refs[0].id).await.unwrap().unwrap();
        assert_eq!(reference.paid, 0);
    }

    #[tokio::test]
    async fn overpayment_carried_as_credit_when_opted_in() {
        let (fx, refs) = fixture(&[(1000, date(2, 1))]).await;
        let report = fx
            .allocator
            .allocate("pay-1", 1200, &ids(&refs), OverpaymentPolicy::CarryCredit)
            .await
            .unwrap();
        assert_eq!(report.unapplied, 200);
        let reference = fx.allocator.get_reference(&refs[0].id).await.unwrap().unwrap();
        assert_eq!(reference.status, ReferenceStatus::FullyPaid);
    }

    #[tokio::test]
    async fn non_positive_amount_is_rejected() {
        let (fx, refs) = fixture(&[(1000, date(2, 1))]).await;
        for amount in [0, -50] {
            let err = fx
                .allocator
                .allocate("pay-1", amount, &ids(&refs), OverpaymentPolicy::Reject)
                .await
                .unwrap_err();
            assert!(matches!(err, LedgerError::Validation(_)));
        }
    }

    #[tokio::test]
    async fn preview_does_not_mutate() {
        let (fx, refs) = fixture(&[(1000, date(2, 1))]).await;
        let report = fx
            .allocator
            .preview("pay-1", 400, &ids(&refs), OverpaymentPolicy::Reject)
            .await
            .unwrap();
        assert_eq!(report.allocations[0].applied, 400);

        let reference = fx.allocator.get_reference(&refs[0].id).await.unwrap().unwrap();
        assert_eq!(reference.paid, 0);
        assert_eq!(reference.status, ReferenceStatus::Outstanding);
    }

    #[tokio::test]
    async fn duplicate_reference_per_entry_and_account_is_rejected() {
        let (fx, refs) = fixture(&[(1000, date(2, 1))]).await;
        let err = fx
            .allocator
            .open_reference(&refs[0].entry_id, &fx.receivables.id, 1000, date(2, 1))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));
    }
}
