//! Trial balance: a pure read over the posted line history
//!
//! Account balances are a materialized projection; the journal lines are
//! ground truth. Everything here re-derives from the lines so that a
//! discrepancy between cache and history is detectable.

use chrono::NaiveDate;
use std::collections::HashMap;

use crate::traits::LedgerStore;
use crate::types::*;

pub struct TrialBalanceCalculator<S: LedgerStore> {
    store: S,
}

impl<S: LedgerStore> TrialBalanceCalculator<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Per-account debit/credit totals over posted entries up to and
    /// including `as_of`, plus grand totals and the balanced verdict.
    /// Integer arithmetic makes exact equality the correct check.
    pub async fn compute(&self, as_of: NaiveDate) -> LedgerResult<TrialBalance> {
        let mut accounts: Vec<Account> = self
            .store
            .list_accounts()
            .await?
            .into_iter()
            .filter(|a| a.is_active && !a.is_group)
            .collect();
        accounts.sort_by(|a, b| a.code.cmp(&b.code));

        let mut net_by_account: HashMap<String, Amount> = HashMap::new();
        for account in &accounts {
            net_by_account.insert(account.id.clone(), account.opening_balance);
        }
        let entries = self.store.list_entries(None, Some(as_of)).await?;
        for entry in entries.iter().filter(|e| e.is_posted()) {
            for line in &entry.lines {
                if let Some(account) = accounts.iter().find(|a| a.id == line.account_id) {
                    *net_by_account.entry(account.id.clone()).or_insert(0) +=
                        account.account_type.signed_delta(line.debit, line.credit);
                }
            }
        }

        let mut rows = Vec::with_capacity(accounts.len());
        let mut total_debits = 0;
        let mut total_credits = 0;
        for account in &accounts {
            let net = net_by_account[&account.id];
            // Net balance goes on the account's normal side; a negative net
            // flips to the opposite column.
            let (debit, credit) = match account.account_type.normal_side() {
                Side::Debit if net >= 0 => (net, 0),
                Side::Debit => (0, -net),
                Side::Credit if net >= 0 => (0, net),
                Side::Credit => (-net, 0),
            };
            total_debits += debit;
            total_credits += credit;
            rows.push(TrialBalanceRow {
                account_id: account.id.clone(),
                code: account.code.clone(),
                name: account.name.clone(),
                account_type: account.account_type,
                debit,
                credit,
            });
        }

        Ok(TrialBalance {
            as_of,
            rows,
            total_debits,
            total_credits,
            balanced: total_debits == total_credits,
        })
    }

    /// Rebuild one account's balance projection from scratch, for
    /// cache-vs-history verification.
    pub async fn rebuild_balance(&self, account_id: &str) -> LedgerResult<Amount> {
        let account = self
            .store
            .find_account(account_id)
            .await?
            .ok_or_else(|| LedgerError::AccountNotFound(account_id.to_string()))?;
        let entries = self.store.entries_for_account(account_id, None, None).await?;
        let mut balance = account.opening_balance;
        for entry in entries.iter().filter(|e| e.is_posted()) {
            for line in entry.lines.iter().filter(|l| l.account_id == account.id) {
                balance += account.account_type.signed_delta(line.debit, line.credit);
            }
        }
        Ok(balance)
    }
}
