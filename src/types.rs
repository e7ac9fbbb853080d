//! Core types and data structures for the ledger system

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Monetary amount in minor currency units (paise, cents, ...).
///
/// All arithmetic in the crate is integer arithmetic; balance checks are
/// exact equality, never epsilon comparisons.
pub type Amount = i64;

/// Account types following standard accounting principles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccountType {
    /// Assets - what the business owns (Cash, Receivables, Equipment, ...)
    Asset,
    /// Liabilities - what the business owes (Loans, Payables, ...)
    Liability,
    /// Equity - owner's interest in the business
    Equity,
    /// Revenue - money earned by the business
    Revenue,
    /// Expenses - costs incurred by the business
    Expense,
}

impl AccountType {
    /// Returns the normal balance side for this account type.
    /// Assets and Expenses normally carry debit balances; Liabilities,
    /// Equity, and Revenue normally carry credit balances.
    pub fn normal_side(&self) -> Side {
        match self {
            AccountType::Asset | AccountType::Expense => Side::Debit,
            AccountType::Liability | AccountType::Equity | AccountType::Revenue => Side::Credit,
        }
    }

    /// Signed balance delta for a debit/credit pair applied to an account of
    /// this type. Debits increase asset/expense balances and decrease the
    /// rest; credits do the opposite.
    pub fn signed_delta(&self, debit: Amount, credit: Amount) -> Amount {
        match self.normal_side() {
            Side::Debit => debit - credit,
            Side::Credit => credit - debit,
        }
    }
}

/// The two sides of double-entry bookkeeping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Debit,
    Credit,
}

/// A node in the chart of accounts: either a group (aggregation only) or a
/// leaf ledger account that can receive postings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    /// Unique identifier
    pub id: String,
    /// Human-readable code, unique case-insensitively (e.g. "1110")
    pub code: String,
    /// Account name
    pub name: String,
    /// Accounting type
    pub account_type: AccountType,
    /// Groups aggregate children and never receive postings directly
    pub is_group: bool,
    /// Parent account id; the parent must be a group one level shallower
    pub parent_id: Option<String>,
    /// Depth in the hierarchy, root = 0
    pub level: u32,
    /// Running balance from the account's normal-side perspective.
    /// A materialized projection of the posted line history, never the
    /// source of truth for audit purposes.
    pub balance: Amount,
    /// Balance carried in at account creation
    pub opening_balance: Amount,
    /// Inactive accounts are excluded from rollups and reject postings
    pub is_active: bool,
    /// Optimistic-concurrency version, bumped by the store on update
    pub version: u64,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Account {
    pub fn new(spec: AccountSpec, level: u32) -> Self {
        let now = chrono::Utc::now().naive_utc();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            code: spec.code,
            name: spec.name,
            account_type: spec.account_type,
            is_group: spec.is_group,
            parent_id: spec.parent_id,
            level,
            balance: spec.opening_balance,
            opening_balance: spec.opening_balance,
            is_active: true,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply a posted line's debit/credit pair to the running balance.
    pub fn apply_line(&mut self, debit: Amount, credit: Amount) {
        self.balance += self.account_type.signed_delta(debit, credit);
        self.updated_at = chrono::Utc::now().naive_utc();
    }
}

/// Caller-supplied description of a new account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountSpec {
    pub code: String,
    pub name: String,
    pub account_type: AccountType,
    pub is_group: bool,
    pub parent_id: Option<String>,
    /// Validated against the parent's level when supplied; computed otherwise
    pub level: Option<u32>,
    pub opening_balance: Amount,
}

impl AccountSpec {
    pub fn leaf(code: &str, name: &str, account_type: AccountType) -> Self {
        Self {
            code: code.to_string(),
            name: name.to_string(),
            account_type,
            is_group: false,
            parent_id: None,
            level: None,
            opening_balance: 0,
        }
    }

    pub fn group(code: &str, name: &str, account_type: AccountType) -> Self {
        Self {
            is_group: true,
            ..Self::leaf(code, name, account_type)
        }
    }

    pub fn under(mut self, parent_id: &str) -> Self {
        self.parent_id = Some(parent_id.to_string());
        self
    }

    pub fn opening(mut self, amount: Amount) -> Self {
        self.opening_balance = amount;
        self
    }
}

/// A single debit or credit line within a journal entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalLine {
    pub account_id: String,
    pub debit: Amount,
    pub credit: Amount,
    pub description: Option<String>,
}

impl JournalLine {
    pub fn debit(account_id: &str, amount: Amount) -> Self {
        Self {
            account_id: account_id.to_string(),
            debit: amount,
            credit: 0,
            description: None,
        }
    }

    pub fn credit(account_id: &str, amount: Amount) -> Self {
        Self {
            account_id: account_id.to_string(),
            debit: 0,
            credit: amount,
            description: None,
        }
    }

    /// Exactly one of debit/credit must be nonzero and neither may be
    /// negative.
    pub fn validate(&self) -> LedgerResult<()> {
        if self.debit < 0 || self.credit < 0 {
            return Err(LedgerError::Validation(format!(
                "line on account '{}' has a negative amount",
                self.account_id
            )));
        }
        if self.debit == 0 && self.credit == 0 {
            return Err(LedgerError::Validation(format!(
                "line on account '{}' has neither a debit nor a credit",
                self.account_id
            )));
        }
        if self.debit != 0 && self.credit != 0 {
            return Err(LedgerError::Validation(format!(
                "line on account '{}' has both a debit and a credit",
                self.account_id
            )));
        }
        Ok(())
    }
}

/// Journal entry lifecycle. Posted and Void are terminal; there is no way
/// back to Draft.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryStatus {
    Draft,
    Posted,
    Void,
}

/// A balanced set of journal lines. Once posted, the lines are immutable;
/// corrections go through a reversing entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub id: String,
    /// Sequential per ledger, e.g. "JE000042"
    pub entry_number: String,
    pub date: NaiveDate,
    pub description: String,
    pub reference: Option<String>,
    pub lines: Vec<JournalLine>,
    pub status: EntryStatus,
    /// Id of the entry this one reverses, if any
    pub reverses: Option<String>,
    pub created_by: Option<String>,
    pub posted_at: Option<NaiveDateTime>,
    /// Optimistic-concurrency version, bumped by the store on update
    pub version: u64,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl JournalEntry {
    pub fn total_debits(&self) -> Amount {
        self.lines.iter().map(|l| l.debit).sum()
    }

    pub fn total_credits(&self) -> Amount {
        self.lines.iter().map(|l| l.credit).sum()
    }

    pub fn is_balanced(&self) -> bool {
        self.total_debits() == self.total_credits()
    }

    pub fn is_posted(&self) -> bool {
        self.status == EntryStatus::Posted
    }

    /// Distinct account ids touched by this entry, in line order.
    pub fn account_ids(&self) -> Vec<String> {
        let mut ids = Vec::new();
        for line in &self.lines {
            if !ids.contains(&line.account_id) {
                ids.push(line.account_id.clone());
            }
        }
        ids
    }

    /// Structural validation: line rules, minimum shape, and the fundamental
    /// balance invariant.
    pub fn validate(&self) -> LedgerResult<()> {
        if self.lines.len() < 2 {
            return Err(LedgerError::Validation(
                "a journal entry needs at least two lines".to_string(),
            ));
        }
        for line in &self.lines {
            line.validate()?;
        }
        if self.account_ids().len() < 2 {
            return Err(LedgerError::Validation(
                "a journal entry must touch at least two distinct accounts".to_string(),
            ));
        }
        if !self.is_balanced() {
            return Err(LedgerError::UnbalancedEntry {
                debits: self.total_debits(),
                credits: self.total_credits(),
            });
        }
        Ok(())
    }
}

/// Caller input for a new journal entry; ids and numbering are assigned by
/// the journal engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryDraft {
    pub date: NaiveDate,
    pub description: String,
    pub reference: Option<String>,
    pub created_by: Option<String>,
    pub lines: Vec<JournalLine>,
}

/// An explicit fiscal period handed into journal operations instead of a
/// mutable "current year" global.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerPeriod {
    pub fiscal_year: i32,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl LedgerPeriod {
    /// Calendar-year period, 1 January through 31 December.
    pub fn calendar_year(year: i32) -> Self {
        Self {
            fiscal_year: year,
            start: NaiveDate::from_ymd_opt(year, 1, 1).expect("valid date"),
            end: NaiveDate::from_ymd_opt(year, 12, 31).expect("valid date"),
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }
}

/// Payment status of a billing reference, a pure function of paid vs total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReferenceStatus {
    Outstanding,
    PartiallyPaid,
    FullyPaid,
}

impl ReferenceStatus {
    pub fn for_amounts(paid: Amount, total: Amount) -> Self {
        if paid == 0 {
            ReferenceStatus::Outstanding
        } else if paid < total {
            ReferenceStatus::PartiallyPaid
        } else {
            ReferenceStatus::FullyPaid
        }
    }
}

/// An invoice or bill with an unpaid balance, tracked against a posted
/// journal entry. Invariant: paid + outstanding == total at all times.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BillingReference {
    pub id: String,
    /// Posting that created the receivable/payable
    pub entry_id: String,
    pub entry_number: String,
    /// Reference string carried from the entry (invoice number, bill number)
    pub reference: String,
    pub account_id: String,
    pub total: Amount,
    pub paid: Amount,
    pub outstanding: Amount,
    pub due_date: NaiveDate,
    /// Creation sequence, the tie-break after due date when allocating
    pub seq: u64,
    pub status: ReferenceStatus,
    pub version: u64,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl BillingReference {
    /// Apply part of a payment. The caller guarantees
    /// `amount <= self.outstanding`.
    pub fn apply_payment(&mut self, amount: Amount) {
        self.paid += amount;
        self.outstanding = self.total - self.paid;
        self.status = ReferenceStatus::for_amounts(self.paid, self.total);
        self.updated_at = chrono::Utc::now().naive_utc();
        debug_assert!(self.outstanding >= 0);
        debug_assert_eq!(self.paid + self.outstanding, self.total);
    }

    pub fn is_open(&self) -> bool {
        self.status != ReferenceStatus::FullyPaid
    }
}

/// One slice of a payment applied to a single billing reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Allocation {
    pub reference_id: String,
    pub reference: String,
    pub applied: Amount,
    pub outstanding_after: Amount,
    pub status_after: ReferenceStatus,
}

/// Result of allocating (or previewing) a payment across references.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationReport {
    pub payment_id: String,
    pub amount: Amount,
    pub allocations: Vec<Allocation>,
    /// Payment left over after all references were satisfied; nonzero only
    /// under the overpayment-as-credit policy
    pub unapplied: Amount,
}

/// Spending plan for a fiscal period, linked to ledger accounts by code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Budget {
    pub id: String,
    pub name: String,
    pub allocated: Amount,
    /// Derived from postings routed through the budget monitor
    pub spent: Amount,
    pub fiscal_year: i32,
    /// Account codes whose postings count against this budget
    pub linked_accounts: Vec<String>,
    pub version: u64,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Budget {
    /// Utilization as a percentage, for display and alert snapshots only.
    /// Threshold decisions use integer arithmetic, see
    /// [`Budget::meets_threshold`].
    pub fn utilization_percent(&self) -> f64 {
        if self.allocated <= 0 {
            return 0.0;
        }
        self.spent as f64 * 100.0 / self.allocated as f64
    }

    /// Exact integer check for `spent / allocated * 100 >= threshold`.
    pub fn meets_threshold(&self, threshold: u8) -> bool {
        Self::spend_meets_threshold(self.spent, self.allocated, threshold)
    }

    pub fn spend_meets_threshold(spent: Amount, allocated: Amount, threshold: u8) -> bool {
        if allocated <= 0 {
            return false;
        }
        (spent as i128) * 100 >= (allocated as i128) * (threshold as i128)
    }
}

/// Alert severities and the utilization thresholds that trigger them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertType {
    Warning,
    Alert,
    Critical,
}

impl AlertType {
    pub fn threshold(&self) -> u8 {
        match self {
            AlertType::Warning => 80,
            AlertType::Alert => 90,
            AlertType::Critical => 100,
        }
    }

    /// All alert types in ascending threshold order.
    pub const ALL: [AlertType; 3] = [AlertType::Warning, AlertType::Alert, AlertType::Critical];
}

/// Raised when a budget crosses a utilization threshold upward. Alerts are
/// acknowledged explicitly, never auto-resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetAlert {
    pub id: String,
    pub budget_id: String,
    pub alert_type: AlertType,
    pub threshold: u8,
    /// Utilization percentage at the time the alert was raised
    pub utilization: f64,
    pub acknowledged: bool,
    pub acknowledged_by: Option<String>,
    pub acknowledged_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
}

impl BudgetAlert {
    pub fn raise(budget: &Budget, alert_type: AlertType) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            budget_id: budget.id.clone(),
            alert_type,
            threshold: alert_type.threshold(),
            utilization: budget.utilization_percent(),
            acknowledged: false,
            acknowledged_by: None,
            acknowledged_at: None,
            created_at: chrono::Utc::now().naive_utc(),
        }
    }
}

/// One account's row in a trial balance: its net balance placed on the
/// debit or credit column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialBalanceRow {
    pub account_id: String,
    pub code: String,
    pub name: String,
    pub account_type: AccountType,
    pub debit: Amount,
    pub credit: Amount,
}

/// Proof that total debits equal total credits as of a date, re-derived
/// from the posted line history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialBalance {
    pub as_of: NaiveDate,
    pub rows: Vec<TrialBalanceRow>,
    pub total_debits: Amount,
    pub total_credits: Amount,
    pub balanced: bool,
}

/// Errors that can occur in the ledger system
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// Malformed input, rejected before any mutation
    #[error("validation failed: {0}")]
    Validation(String),
    /// The fundamental double-entry invariant would be violated
    #[error("journal entry is not balanced: debits = {debits}, credits = {credits}")]
    UnbalancedEntry { debits: Amount, credits: Amount },
    #[error("account not found: {0}")]
    AccountNotFound(String),
    #[error("journal entry not found: {0}")]
    EntryNotFound(String),
    #[error("billing reference not found: {0}")]
    ReferenceNotFound(String),
    #[error("budget not found: {0}")]
    BudgetNotFound(String),
    #[error("budget alert not found: {0}")]
    AlertNotFound(String),
    #[error("journal entry {0} is already posted")]
    AlreadyPosted(String),
    #[error("budget alert {0} is already acknowledged")]
    AlreadyAcknowledged(String),
    /// Concurrent modification detected by a version check; retrying the
    /// whole operation against fresh state is safe
    #[error("concurrent modification of {kind} '{id}', retry the operation")]
    Conflict { kind: &'static str, id: String },
    #[error("payment of {requested} exceeds allocatable outstanding of {available}")]
    OverAllocation { requested: Amount, available: Amount },
    #[error("storage error: {0}")]
    Storage(String),
    /// Persistence-layer timeout; callers should retry with backoff
    #[error("storage timed out: {0}")]
    StorageTimeout(String),
}

impl LedgerError {
    /// Whether retrying the same operation can succeed without caller
    /// intervention.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LedgerError::Conflict { .. } | LedgerError::StorageTimeout(_)
        )
    }
}

/// Result type for ledger operations
pub type LedgerResult<T> = Result<T, LedgerError>;
