//! # Ledger Core
//!
//! A general-ledger accounting library providing double-entry bookkeeping,
//! payment allocation, and budget monitoring over a pluggable storage
//! backend.
//!
//! ## Features
//!
//! - **Chart of accounts**: Hierarchical account tree with group rollups and
//!   leaf-only posting
//! - **Double-entry journal**: Balanced-entry validation, draft/post/void
//!   lifecycle, and reversing entries
//! - **Trial balance**: Point-in-time debit/credit reporting re-derived from
//!   the posted line history
//! - **Payment allocation**: Oldest-due-first settlement of billing
//!   references with configurable overpayment policy
//! - **Budget monitoring**: Spend tracking per linked account with
//!   80/90/100% threshold alerts
//! - **Storage abstraction**: Database-agnostic design with trait-based
//!   storage and optimistic version checks
//!
//! ## Quick Start
//!
//! ```rust
//! use ledger_core::{
//!     AccountSpec, AccountType, EntryBuilder, LedgerCore, LedgerPeriod,
//!     MemoryStore,
//! };
//! use chrono::NaiveDate;
//!
//! # async fn demo() -> ledger_core::LedgerResult<()> {
//! let core = LedgerCore::new(MemoryStore::new());
//! let period = LedgerPeriod::calendar_year(2024);
//!
//! let cash = core
//!     .create_account(AccountSpec::leaf("1110", "Cash", AccountType::Asset))
//!     .await?;
//! let sales = core
//!     .create_account(AccountSpec::leaf("4000", "Sales", AccountType::Revenue))
//!     .await?;
//!
//! let entry = core
//!     .create_entry(
//!         EntryBuilder::new(
//!             NaiveDate::from_ymd_opt(2024, 1, 10).unwrap(),
//!             "Cash sale",
//!         )
//!         .debit(&cash.id, 1_000)
//!         .credit(&sales.id, 1_000)
//!         .build(),
//!         &period,
//!     )
//!     .await?;
//! core.post_entry(&entry.id, &period).await?;
//! # Ok(())
//! # }
//! ```

pub mod allocation;
pub mod budget;
pub mod events;
pub mod ledger;
pub mod traits;
pub mod types;
pub mod utils;

// Re-export commonly used types
pub use allocation::*;
pub use budget::*;
pub use events::*;
pub use ledger::*;
pub use traits::*;
pub use types::*;
pub use utils::memory_store::MemoryStore;
