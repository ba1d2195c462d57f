//! DGT Treasury Ledger Engine
//!
//! Moves a fungible internal credit ("DGT") between a single treasury
//! reserve and many user wallets, and between user wallets directly,
//! while preserving global conservation of supply and per-account
//! non-negativity under concurrent operations.
//!
//! # Architecture
//!
//! - **Integer money**: all storage and arithmetic use minor units at
//!   10^-6 granularity; decimals exist only at the external boundary
//! - **One transaction per operation**: the store transaction is the
//!   sole concurrency boundary; treasury and wallet rows carry write
//!   locks with bounded waits
//! - **Append-only history**: every balance movement leaves a write-once
//!   ledger entry; corrections are new, reversing entries
//!
//! # Invariants
//!
//! - Treasury and wallet balances never go negative
//! - Debits equal credits for every committed transfer
//! - An airdrop debits the treasury only by what was actually credited

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod amount;
pub mod audit;
pub mod config;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod policy;
pub mod storage;
pub mod types;

// Re-exports
pub use amount::MinorUnits;
pub use config::Config;
pub use engine::TreasuryEngine;
pub use error::{Error, Result};
pub use policy::{PolicyParameters, PolicyStore, PolicyUpdate, PolicyView};
pub use storage::LedgerStore;
pub use types::{
    AdminId, AirdropOutcome, EntryKind, EntryStatus, LedgerEntry, LedgerEntryView, TreasuryStats,
    UserId,
};
