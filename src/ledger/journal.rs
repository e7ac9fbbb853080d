//! Journal entry validation, posting, and reversal
//!
//! The journal engine is the sole writer of account balances. Entries move
//! `Draft -> Posted` or `Draft -> Void`, both terminal; a posted entry is
//! corrected by a reversing entry, never by mutation.

use chrono::NaiveDate;
use std::collections::HashMap;
use tracing::{debug, info};

use crate::traits::LedgerStore;
use crate::types::*;
use crate::utils::validation;

pub struct JournalEngine<S: LedgerStore> {
    store: S,
}

impl<S: LedgerStore> JournalEngine<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Validate a draft and persist it with the next sequential entry
    /// number. Nothing touches account balances yet.
    pub async fn create_entry(
        &self,
        draft: EntryDraft,
        period: &LedgerPeriod,
    ) -> LedgerResult<JournalEntry> {
        validation::validate_description(&draft.description)?;
        if !period.contains(draft.date) {
            return Err(LedgerError::Validation(format!(
                "entry date {} is outside the ledger period {}..{}",
                draft.date, period.start, period.end
            )));
        }

        let now = chrono::Utc::now().naive_utc();
        let number = self.store.next_entry_number().await?;
        let entry = JournalEntry {
            id: uuid::Uuid::new_v4().to_string(),
            entry_number: format!("JE{:06}", number),
            date: draft.date,
            description: draft.description,
            reference: draft.reference,
            lines: draft.lines,
            status: EntryStatus::Draft,
            reverses: None,
            created_by: draft.created_by,
            posted_at: None,
            version: 0,
            created_at: now,
            updated_at: now,
        };

        entry.validate()?;
        self.check_postable_accounts(&entry).await?;

        self.store.save_entry(&entry).await?;
        debug!(entry = %entry.entry_number, lines = entry.lines.len(), "journal entry drafted");
        Ok(entry)
    }

    /// Every line must reference an existing, active, leaf account.
    async fn check_postable_accounts(&self, entry: &JournalEntry) -> LedgerResult<HashMap<String, Account>> {
        let mut accounts = HashMap::new();
        for id in entry.account_ids() {
            let account = self
                .store
                .find_account(&id)
                .await?
                .ok_or_else(|| LedgerError::AccountNotFound(id.clone()))?;
            if account.is_group {
                return Err(LedgerError::Validation(format!(
                    "cannot post to group account '{}'",
                    account.code
                )));
            }
            if !account.is_active {
                return Err(LedgerError::Validation(format!(
                    "cannot post to inactive account '{}'",
                    account.code
                )));
            }
            accounts.insert(id, account);
        }
        Ok(accounts)
    }

    /// Apply the entry's lines to its accounts and mark it posted, exactly
    /// once. The account batch is version-checked and written all-or-nothing
    /// by the store; a concurrent posting against an overlapping account set
    /// surfaces as a retryable conflict before anything is marked posted.
    pub async fn post_entry(
        &self,
        entry_id: &str,
        period: &LedgerPeriod,
    ) -> LedgerResult<JournalEntry> {
        let mut entry = self.get_entry_required(entry_id).await?;
        match entry.status {
            EntryStatus::Posted => return Err(LedgerError::AlreadyPosted(entry_id.to_string())),
            EntryStatus::Void => {
                return Err(LedgerError::Validation(format!(
                    "journal entry {} is void and cannot be posted",
                    entry.entry_number
                )))
            }
            EntryStatus::Draft => {}
        }
        if !period.contains(entry.date) {
            return Err(LedgerError::Validation(format!(
                "entry date {} is outside the ledger period {}..{}",
                entry.date, period.start, period.end
            )));
        }
        // The balance invariant is re-checked at the posting boundary; a
        // draft tampered with in storage must fail loudly here.
        entry.validate()?;
        let mut accounts = self.check_postable_accounts(&entry).await?;

        for line in &entry.lines {
            let account = accounts
                .get_mut(&line.account_id)
                .ok_or_else(|| LedgerError::AccountNotFound(line.account_id.clone()))?;
            account.apply_line(line.debit, line.credit);
        }

        let now = chrono::Utc::now().naive_utc();
        entry.status = EntryStatus::Posted;
        entry.posted_at = Some(now);
        entry.updated_at = now;

        // Balances and the status flip commit together or not at all; a
        // failed commit leaves the entry Draft with nothing applied.
        let batch: Vec<Account> = accounts.into_values().collect();
        self.store.commit_posting(&batch, &entry).await?;
        entry.version += 1;

        info!(
            entry = %entry.entry_number,
            total = entry.total_debits(),
            accounts = batch.len(),
            "journal entry posted"
        );
        Ok(entry)
    }

    /// Discard a draft. Posted entries cannot be voided; reverse them.
    pub async fn void_entry(&self, entry_id: &str) -> LedgerResult<JournalEntry> {
        let mut entry = self.get_entry_required(entry_id).await?;
        match entry.status {
            EntryStatus::Posted => {
                return Err(LedgerError::Validation(format!(
                    "journal entry {} is posted; create a reversing entry instead",
                    entry.entry_number
                )))
            }
            EntryStatus::Void => {
                return Err(LedgerError::Validation(format!(
                    "journal entry {} is already void",
                    entry.entry_number
                )))
            }
            EntryStatus::Draft => {}
        }
        entry.status = EntryStatus::Void;
        entry.updated_at = chrono::Utc::now().naive_utc();
        self.store.update_entry(&entry).await?;
        entry.version += 1;
        Ok(entry)
    }

    /// Create and post a mirror of a posted entry: every debit becomes a
    /// credit and vice versa. The original is untouched.
    pub async fn reverse_entry(
        &self,
        entry_id: &str,
        date: NaiveDate,
        period: &LedgerPeriod,
    ) -> LedgerResult<JournalEntry> {
        let original = self.get_entry_required(entry_id).await?;
        if !original.is_posted() {
            return Err(LedgerError::Validation(format!(
                "journal entry {} is not posted and cannot be reversed",
                original.entry_number
            )));
        }

        let lines = original
            .lines
            .iter()
            .map(|line| JournalLine {
                account_id: line.account_id.clone(),
                debit: line.credit,
                credit: line.debit,
                description: line.description.clone(),
            })
            .collect();

        let draft = EntryDraft {
            date,
            description: format!(
                "Reversal of {}: {}",
                original.entry_number, original.description
            ),
            reference: Some(format!("REV-{}", original.entry_number)),
            created_by: original.created_by.clone(),
            lines,
        };

        let mut reversal = self.create_entry(draft, period).await?;
        reversal.reverses = Some(original.id.clone());
        self.store.update_entry(&reversal).await?;
        self.post_entry(&reversal.id, period).await
    }

    pub async fn get_entry(&self, entry_id: &str) -> LedgerResult<Option<JournalEntry>> {
        self.store.find_entry(entry_id).await
    }

    pub async fn get_entry_required(&self, entry_id: &str) -> LedgerResult<JournalEntry> {
        self.store
            .find_entry(entry_id)
            .await?
            .ok_or_else(|| LedgerError::EntryNotFound(entry_id.to_string()))
    }

    /// Entries touching an account in a date range, posted or not.
    pub async fn entries_for_account(
        &self,
        account_id: &str,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> LedgerResult<Vec<JournalEntry>> {
        self.store.entries_for_account(account_id, start, end).await
    }
}

/// Builder for journal entry drafts
#[derive(Debug)]
pub struct EntryBuilder {
    draft: EntryDraft,
}

impl EntryBuilder {
    pub fn new(date: NaiveDate, description: &str) -> Self {
        Self {
            draft: EntryDraft {
                date,
                description: description.to_string(),
                reference: None,
                created_by: None,
                lines: Vec::new(),
            },
        }
    }

    pub fn reference(mut self, reference: &str) -> Self {
        self.draft.reference = Some(reference.to_string());
        self
    }

    pub fn created_by(mut self, user_id: &str) -> Self {
        self.draft.created_by = Some(user_id.to_string());
        self
    }

    pub fn debit(mut self, account_id: &str, amount: Amount) -> Self {
        self.draft.lines.push(JournalLine::debit(account_id, amount));
        self
    }

    pub fn credit(mut self, account_id: &str, amount: Amount) -> Self {
        self.draft.lines.push(JournalLine::credit(account_id, amount));
        self
    }

    pub fn line(mut self, line: JournalLine) -> Self {
        self.draft.lines.push(line);
        self
    }

    pub fn build(self) -> EntryDraft {
        self.draft
    }
}
