//! Chart of accounts: hierarchy management and balance lookup

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use crate::traits::LedgerStore;
use crate::types::*;
use crate::utils::validation;

/// Maximum depth of the account tree. A parent chain longer than this is
/// treated as corrupt (cycle or runaway nesting) and rejected.
pub const MAX_DEPTH: u32 = 10;

/// A subtree of the chart of accounts, parents before children, siblings in
/// creation order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountNode {
    pub account: Account,
    pub children: Vec<AccountNode>,
}

/// Owns the chart of accounts: creation, hierarchy invariants, balance
/// lookup and rollup aggregation. Balances themselves are written only by
/// the journal engine.
pub struct AccountDirectory<S: LedgerStore> {
    store: S,
}

impl<S: LedgerStore> AccountDirectory<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Create an account after validating code uniqueness, parent linkage,
    /// and level consistency.
    pub async fn create_account(&self, spec: AccountSpec) -> LedgerResult<Account> {
        validation::validate_code(&spec.code)?;
        validation::validate_name(&spec.name)?;

        if let Some(existing) = self.store.find_account_by_code(&spec.code).await? {
            return Err(LedgerError::Validation(format!(
                "account code '{}' collides with existing account '{}'",
                spec.code, existing.code
            )));
        }
        if spec.is_group && spec.opening_balance != 0 {
            // Group balances are derived from children; a direct opening
            // balance would double-count on rollup.
            return Err(LedgerError::Validation(
                "group accounts cannot carry an opening balance".to_string(),
            ));
        }

        let level = match &spec.parent_id {
            Some(parent_id) => {
                let parent = self
                    .store
                    .find_account(parent_id)
                    .await?
                    .ok_or_else(|| {
                        LedgerError::Validation(format!(
                            "parent account '{}' does not exist",
                            parent_id
                        ))
                    })?;
                if !parent.is_group {
                    return Err(LedgerError::Validation(format!(
                        "parent account '{}' is not a group account",
                        parent.code
                    )));
                }
                if !parent.is_active {
                    return Err(LedgerError::Validation(format!(
                        "parent account '{}' is inactive",
                        parent.code
                    )));
                }
                self.verify_chain_terminates(&parent).await?;
                let level = parent.level + 1;
                if level > MAX_DEPTH {
                    return Err(LedgerError::Validation(format!(
                        "account nesting deeper than {} levels is not allowed",
                        MAX_DEPTH
                    )));
                }
                if let Some(supplied) = spec.level {
                    if supplied != level {
                        return Err(LedgerError::Validation(format!(
                            "supplied level {} does not match parent level {} + 1",
                            supplied, parent.level
                        )));
                    }
                }
                level
            }
            None => {
                if let Some(supplied) = spec.level {
                    if supplied != 0 {
                        return Err(LedgerError::Validation(
                            "a root account must be at level 0".to_string(),
                        ));
                    }
                }
                0
            }
        };

        let account = Account::new(spec, level);
        self.store.save_account(&account).await?;
        debug!(code = %account.code, level = account.level, "account created");
        Ok(account)
    }

    /// Walk the parent chain and require it to reach a root within
    /// `MAX_DEPTH` hops.
    async fn verify_chain_terminates(&self, from: &Account) -> LedgerResult<()> {
        let mut current = from.parent_id.clone();
        let mut hops = 0u32;
        while let Some(id) = current {
            hops += 1;
            if hops > MAX_DEPTH {
                return Err(LedgerError::Validation(format!(
                    "parent chain of account '{}' does not terminate (cycle?)",
                    from.code
                )));
            }
            let ancestor = self
                .store
                .find_account(&id)
                .await?
                .ok_or_else(|| LedgerError::AccountNotFound(id))?;
            current = ancestor.parent_id;
        }
        Ok(())
    }

    pub async fn get_account(&self, account_id: &str) -> LedgerResult<Option<Account>> {
        self.store.find_account(account_id).await
    }

    pub async fn get_account_required(&self, account_id: &str) -> LedgerResult<Account> {
        self.store
            .find_account(account_id)
            .await?
            .ok_or_else(|| LedgerError::AccountNotFound(account_id.to_string()))
    }

    pub async fn find_by_code(&self, code: &str) -> LedgerResult<Option<Account>> {
        self.store.find_account_by_code(code).await
    }

    pub async fn list_accounts(&self) -> LedgerResult<Vec<Account>> {
        self.store.list_accounts().await
    }

    /// Balance of an account. For a leaf this is the stored balance, or a
    /// re-derivation from posted lines when a cutoff date is given. For a
    /// group it is the sum of active descendant leaf balances.
    pub async fn get_balance(
        &self,
        account_id: &str,
        as_of: Option<NaiveDate>,
    ) -> LedgerResult<Amount> {
        let account = self.get_account_required(account_id).await?;
        if !account.is_group {
            return self.leaf_balance(&account, as_of).await;
        }

        let mut total = 0;
        for leaf in self.descendant_leaves(&account).await? {
            total += self.leaf_balance(&leaf, as_of).await?;
        }
        Ok(total)
    }

    async fn leaf_balance(&self, account: &Account, as_of: Option<NaiveDate>) -> LedgerResult<Amount> {
        let Some(cutoff) = as_of else {
            return Ok(account.balance);
        };
        let entries = self
            .store
            .entries_for_account(&account.id, None, Some(cutoff))
            .await?;
        let mut balance = account.opening_balance;
        for entry in entries.iter().filter(|e| e.is_posted()) {
            for line in entry.lines.iter().filter(|l| l.account_id == account.id) {
                balance += account.account_type.signed_delta(line.debit, line.credit);
            }
        }
        Ok(balance)
    }

    /// Active leaf accounts below a group, found by bounded traversal over a
    /// child index rather than pointer-chasing.
    async fn descendant_leaves(&self, root: &Account) -> LedgerResult<Vec<Account>> {
        let accounts = self.store.list_accounts().await?;
        let mut by_parent: HashMap<&str, Vec<&Account>> = HashMap::new();
        for account in &accounts {
            if let Some(parent_id) = &account.parent_id {
                by_parent.entry(parent_id.as_str()).or_default().push(account);
            }
        }

        let mut leaves = Vec::new();
        let mut stack = vec![root.id.as_str()];
        while let Some(id) = stack.pop() {
            for child in by_parent.get(id).into_iter().flatten() {
                if !child.is_active {
                    continue;
                }
                if child.is_group {
                    stack.push(child.id.as_str());
                } else {
                    leaves.push((*child).clone());
                }
            }
        }
        Ok(leaves)
    }

    /// The account tree, parents before children, siblings in creation
    /// order. With a root id, only that subtree; otherwise every root.
    pub async fn list_hierarchy(&self, root_id: Option<&str>) -> LedgerResult<Vec<AccountNode>> {
        let accounts = self.store.list_accounts().await?;
        let mut by_parent: HashMap<Option<String>, Vec<Account>> = HashMap::new();
        for account in accounts {
            by_parent
                .entry(account.parent_id.clone())
                .or_default()
                .push(account);
        }

        match root_id {
            Some(id) => {
                let root = self.get_account_required(id).await?;
                Ok(vec![Self::attach_children(root, &by_parent, 0)])
            }
            None => {
                let roots = by_parent.get(&None).cloned().unwrap_or_default();
                Ok(roots
                    .into_iter()
                    .map(|root| Self::attach_children(root, &by_parent, 0))
                    .collect())
            }
        }
    }

    fn attach_children(
        account: Account,
        by_parent: &HashMap<Option<String>, Vec<Account>>,
        depth: u32,
    ) -> AccountNode {
        let children = if depth >= MAX_DEPTH {
            Vec::new()
        } else {
            by_parent
                .get(&Some(account.id.clone()))
                .cloned()
                .unwrap_or_default()
                .into_iter()
                .map(|child| Self::attach_children(child, by_parent, depth + 1))
                .collect()
        };
        AccountNode { account, children }
    }

    /// Soft-delete an account. Groups with active children and leaves still
    /// carrying a balance are rejected; history stays intact either way.
    /// The balance guard matters because inactive leaves drop out of trial
    /// balance rows and group rollups, so a frozen nonzero balance would
    /// leave the books permanently unbalanced.
    pub async fn deactivate_account(&self, account_id: &str) -> LedgerResult<Account> {
        let mut account = self.get_account_required(account_id).await?;
        if !account.is_group && account.balance != 0 {
            return Err(LedgerError::Validation(format!(
                "account '{}' still carries a balance of {}; bring it to zero before deactivating",
                account.code, account.balance
            )));
        }
        if account.is_group {
            let accounts = self.store.list_accounts().await?;
            let has_active_children = accounts
                .iter()
                .any(|a| a.parent_id.as_deref() == Some(account_id) && a.is_active);
            if has_active_children {
                return Err(LedgerError::Validation(format!(
                    "group account '{}' still has active children",
                    account.code
                )));
            }
        }
        account.is_active = false;
        account.updated_at = chrono::Utc::now().naive_utc();
        self.store.update_accounts(std::slice::from_ref(&account)).await?;
        account.version += 1;
        Ok(account)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::memory_store::MemoryStore;

    fn directory() -> AccountDirectory<MemoryStore> {
        AccountDirectory::new(MemoryStore::new())
    }

    #[tokio::test]
    async fn computes_child_level_from_parent() {
        let dir = directory();
        let assets = dir
            .create_account(AccountSpec::group("1000", "Assets", AccountType::Asset))
            .await
            .unwrap();
        assert_eq!(assets.level, 0);

        let current = dir
            .create_account(
                AccountSpec::group("1100", "Current Assets", AccountType::Asset)
                    .under(&assets.id),
            )
            .await
            .unwrap();
        assert_eq!(current.level, 1);

        let cash = dir
            .create_account(
                AccountSpec::leaf("1110", "Cash", AccountType::Asset).under(&current.id),
            )
            .await
            .unwrap();
        assert_eq!(cash.level, 2);
    }

    #[tokio::test]
    async fn rejects_code_collision_case_insensitively() {
        let dir = directory();
        dir.create_account(AccountSpec::leaf("CASH", "Cash", AccountType::Asset))
            .await
            .unwrap();
        let err = dir
            .create_account(AccountSpec::leaf("cash", "Petty Cash", AccountType::Asset))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));
    }

    #[tokio::test]
    async fn rejects_leaf_parent() {
        let dir = directory();
        let leaf = dir
            .create_account(AccountSpec::leaf("1110", "Cash", AccountType::Asset))
            .await
            .unwrap();
        let err = dir
            .create_account(
                AccountSpec::leaf("1111", "Till Cash", AccountType::Asset).under(&leaf.id),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));
    }

    #[tokio::test]
    async fn rejects_mismatched_supplied_level() {
        let dir = directory();
        let group = dir
            .create_account(AccountSpec::group("1000", "Assets", AccountType::Asset))
            .await
            .unwrap();
        let mut spec = AccountSpec::leaf("1110", "Cash", AccountType::Asset).under(&group.id);
        spec.level = Some(3);
        assert!(dir.create_account(spec).await.is_err());
    }

    #[tokio::test]
    async fn rejects_group_opening_balance() {
        let dir = directory();
        let err = dir
            .create_account(
                AccountSpec::group("1000", "Assets", AccountType::Asset).opening(500),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));
    }

    #[tokio::test]
    async fn group_balance_is_rollup_of_active_leaves() {
        let store = MemoryStore::new();
        let dir = AccountDirectory::new(store.clone());
        let group = dir
            .create_account(AccountSpec::group("1000", "Assets", AccountType::Asset))
            .await
            .unwrap();
        let cash = dir
            .create_account(
                AccountSpec::leaf("1110", "Cash", AccountType::Asset)
                    .under(&group.id)
                    .opening(700),
            )
            .await
            .unwrap();
        dir.create_account(
            AccountSpec::leaf("1120", "Bank", AccountType::Asset)
                .under(&group.id)
                .opening(300),
        )
        .await
        .unwrap();
        let dormant = dir
            .create_account(
                AccountSpec::leaf("1130", "Old Till", AccountType::Asset).under(&group.id),
            )
            .await
            .unwrap();
        dir.deactivate_account(&dormant.id).await.unwrap();

        // A backend migrated from legacy data can carry a balance on an
        // already-inactive leaf; rollups must still skip it.
        let mut stale = store.find_account(&dormant.id).await.unwrap().unwrap();
        stale.balance = 50;
        store
            .update_accounts(std::slice::from_ref(&stale))
            .await
            .unwrap();

        assert_eq!(dir.get_balance(&group.id, None).await.unwrap(), 1000);
        assert_eq!(dir.get_balance(&cash.id, None).await.unwrap(), 700);
    }

    #[tokio::test]
    async fn deactivation_requires_zero_balance() {
        let dir = directory();
        let funded = dir
            .create_account(AccountSpec::leaf("1110", "Cash", AccountType::Asset).opening(250))
            .await
            .unwrap();
        let err = dir.deactivate_account(&funded.id).await.unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));
        assert!(dir.get_account_required(&funded.id).await.unwrap().is_active);

        let empty = dir
            .create_account(AccountSpec::leaf("1120", "Bank", AccountType::Asset))
            .await
            .unwrap();
        assert!(!dir.deactivate_account(&empty.id).await.unwrap().is_active);
    }

    #[tokio::test]
    async fn hierarchy_lists_parents_before_children_in_creation_order() {
        let dir = directory();
        let assets = dir
            .create_account(AccountSpec::group("1000", "Assets", AccountType::Asset))
            .await
            .unwrap();
        let cash = dir
            .create_account(
                AccountSpec::leaf("1110", "Cash", AccountType::Asset).under(&assets.id),
            )
            .await
            .unwrap();
        let bank = dir
            .create_account(
                AccountSpec::leaf("1120", "Bank", AccountType::Asset).under(&assets.id),
            )
            .await
            .unwrap();
        dir.create_account(AccountSpec::group("2000", "Liabilities", AccountType::Liability))
            .await
            .unwrap();

        let tree = dir.list_hierarchy(None).await.unwrap();
        assert_eq!(tree.len(), 2);
        assert_eq!(tree[0].account.id, assets.id);
        assert_eq!(tree[0].children.len(), 2);
        assert_eq!(tree[0].children[0].account.id, cash.id);
        assert_eq!(tree[0].children[1].account.id, bank.id);
        assert_eq!(tree[1].account.code, "2000");

        let subtree = dir.list_hierarchy(Some(&assets.id)).await.unwrap();
        assert_eq!(subtree.len(), 1);
        assert_eq!(subtree[0].children.len(), 2);
    }

    #[tokio::test]
    async fn cannot_deactivate_group_with_active_children() {
        let dir = directory();
        let group = dir
            .create_account(AccountSpec::group("1000", "Assets", AccountType::Asset))
            .await
            .unwrap();
        dir.create_account(AccountSpec::leaf("1110", "Cash", AccountType::Asset).under(&group.id))
            .await
            .unwrap();
        assert!(dir.deactivate_account(&group.id).await.is_err());
    }
}
