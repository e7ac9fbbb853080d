//! Budget monitoring with threshold alerts
//!
//! Budgets accumulate spend from expense postings routed through
//! [`BudgetMonitor::record_spend`]. An alert fires when utilization crosses
//! a threshold upward (80% warning, 90% alert, 100% critical) and stays
//! until someone acknowledges it; the same threshold does not re-fire while
//! an unacknowledged alert for it is still open.

use tracing::{info, warn};

use crate::traits::LedgerStore;
use crate::types::*;
use crate::utils::validation;

pub struct BudgetMonitor<S: LedgerStore> {
    store: S,
}

impl<S: LedgerStore> BudgetMonitor<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub async fn create_budget(
        &self,
        name: &str,
        allocated: Amount,
        fiscal_year: i32,
        linked_accounts: Vec<String>,
    ) -> LedgerResult<Budget> {
        validation::validate_name(name)?;
        if allocated <= 0 {
            return Err(LedgerError::Validation(
                "budget allocation must be positive".to_string(),
            ));
        }
        if linked_accounts.is_empty() {
            return Err(LedgerError::Validation(
                "budget must link at least one account code".to_string(),
            ));
        }
        for code in &linked_accounts {
            if self.store.find_account_by_code(code).await?.is_none() {
                return Err(LedgerError::AccountNotFound(code.clone()));
            }
        }

        let now = chrono::Utc::now().naive_utc();
        let budget = Budget {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.trim().to_string(),
            allocated,
            spent: 0,
            fiscal_year,
            linked_accounts,
            version: 0,
            created_at: now,
            updated_at: now,
        };
        self.store.save_budget(&budget).await?;
        Ok(budget)
    }

    /// Apply a signed spend delta to a budget and raise whatever alerts the
    /// new utilization warrants. A reversal routes through here with a
    /// negative delta; dropping below a threshold never auto-resolves the
    /// alerts it raised.
    pub async fn record_spend(
        &self,
        budget_id: &str,
        delta: Amount,
    ) -> LedgerResult<Vec<BudgetAlert>> {
        let mut budget = self.get_budget_required(budget_id).await?;
        let before = budget.spent;
        budget.spent += delta;
        budget.updated_at = chrono::Utc::now().naive_utc();
        self.store.update_budget(&budget).await?;
        budget.version += 1;

        let raised = self.check_thresholds(&budget, before).await?;
        for alert in &raised {
            warn!(
                budget = %budget.name,
                alert_type = ?alert.alert_type,
                threshold = alert.threshold,
                utilization = alert.utilization,
                "budget threshold crossed"
            );
        }
        Ok(raised)
    }

    /// Raise alerts for every threshold the spend change crossed upward,
    /// skipping thresholds with an unacknowledged alert still open.
    async fn check_thresholds(
        &self,
        budget: &Budget,
        spent_before: Amount,
    ) -> LedgerResult<Vec<BudgetAlert>> {
        let mut raised = Vec::new();
        let existing = self.store.alerts_for_budget(&budget.id).await?;
        for alert_type in AlertType::ALL {
            let threshold = alert_type.threshold();
            let crossed = budget.meets_threshold(threshold)
                && !Budget::spend_meets_threshold(spent_before, budget.allocated, threshold);
            if !crossed {
                continue;
            }
            let open = existing
                .iter()
                .any(|a| a.alert_type == alert_type && !a.acknowledged);
            if open {
                continue;
            }
            let alert = BudgetAlert::raise(budget, alert_type);
            self.store.save_alert(&alert).await?;
            raised.push(alert);
        }
        Ok(raised)
    }

    pub async fn acknowledge_alert(
        &self,
        alert_id: &str,
        acknowledged_by: &str,
    ) -> LedgerResult<BudgetAlert> {
        let mut alert = self
            .store
            .find_alert(alert_id)
            .await?
            .ok_or_else(|| LedgerError::AlertNotFound(alert_id.to_string()))?;
        if alert.acknowledged {
            return Err(LedgerError::AlreadyAcknowledged(alert_id.to_string()));
        }
        alert.acknowledged = true;
        alert.acknowledged_by = Some(acknowledged_by.to_string());
        alert.acknowledged_at = Some(chrono::Utc::now().naive_utc());
        self.store.update_alert(&alert).await?;
        info!(alert = alert_id, by = acknowledged_by, "budget alert acknowledged");
        Ok(alert)
    }

    pub async fn get_budget(&self, budget_id: &str) -> LedgerResult<Option<Budget>> {
        self.store.find_budget(budget_id).await
    }

    pub async fn get_budget_required(&self, budget_id: &str) -> LedgerResult<Budget> {
        self.store
            .find_budget(budget_id)
            .await?
            .ok_or_else(|| LedgerError::BudgetNotFound(budget_id.to_string()))
    }

    pub async fn alerts_for_budget(&self, budget_id: &str) -> LedgerResult<Vec<BudgetAlert>> {
        self.store.alerts_for_budget(budget_id).await
    }

    /// Budgets to charge for a posting against the given account code.
    pub async fn budgets_for_account_code(&self, code: &str) -> LedgerResult<Vec<Budget>> {
        self.store.budgets_linked_to(code).await
    }
}
