//! Ledger module: chart of accounts, journal processing, and reporting

pub mod core;
pub mod directory;
pub mod journal;
pub mod trial_balance;

pub use self::core::*;
pub use directory::*;
pub use journal::*;
pub use trial_balance::*;
