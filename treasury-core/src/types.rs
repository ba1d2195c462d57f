//! Core types for the treasury ledger
//!
//! All stored types are designed for:
//! - Deterministic serialization (bincode)
//! - Exact arithmetic (integer minor units for money)
//! - Append-only history (ledger entries are write-once)

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

use crate::amount::{self, MinorUnits};

/// User identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(String);

impl UserId {
    /// Create new user ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Administrator identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AdminId(String);

impl AdminId {
    /// Create new admin ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// System identity used for seeding
    pub fn system() -> Self {
        Self("system".to_string())
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AdminId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The singleton treasury reserve account
///
/// Exactly one row exists for the store's lifetime; it is mutated only
/// inside a transaction holding its write lock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreasuryAccount {
    /// Reserve balance, always >= 0
    pub balance: MinorUnits,

    /// Last mutation timestamp
    pub last_updated_at: DateTime<Utc>,

    /// Admin responsible for the last mutation
    pub last_updated_by: AdminId,
}

/// Per-user wallet row
///
/// Created at registration or first credit; never deleted, only zeroed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserWallet {
    /// Wallet owner
    pub user_id: UserId,

    /// Balance, always >= 0 (enforced before commit)
    pub balance: MinorUnits,

    /// Last mutation timestamp
    pub updated_at: DateTime<Utc>,
}

impl UserWallet {
    /// Fresh zero-balance wallet
    pub fn new(user_id: UserId, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            balance: MinorUnits::ZERO,
            updated_at: now,
        }
    }
}

/// Registered user record
///
/// Backs existence checks; wallets are created lazily, user records are
/// not.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    /// User identifier
    pub user_id: UserId,

    /// Registration timestamp
    pub created_at: DateTime<Utc>,
}

/// Classification of a ledger entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum EntryKind {
    /// Administrative disbursement or recovery against the treasury
    AdminAdjust = 1,
    /// Batch credit from the treasury to many users
    Airdrop = 2,
    /// Direct user-to-user transfer
    Tip = 3,
    /// Transfer out to the external settlement bridge
    Withdrawal = 4,
    /// Transfer in from the external settlement bridge
    Deposit = 5,
}

/// Lifecycle status of a ledger entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum EntryStatus {
    /// Movement recorded but not yet settled
    Pending = 1,
    /// Movement committed (terminal, write-once)
    Confirmed = 2,
    /// Movement failed (terminal, write-once)
    Failed = 3,
}

/// Immutable record of one signed balance movement
///
/// Written exactly once per logical money movement and never mutated
/// after its status reaches `Confirmed` or `Failed`; corrections are new,
/// reversing entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Unique entry ID (UUIDv7 for time-ordering)
    pub id: Uuid,

    /// Subject account
    pub user_id: UserId,

    /// Other side of a direct transfer, None for treasury-origin entries
    pub counterparty_user_id: Option<UserId>,

    /// Signed amount: positive = credit to `user_id`, negative = debit
    pub amount_minor: MinorUnits,

    /// Entry classification
    pub kind: EntryKind,

    /// Lifecycle status
    pub status: EntryStatus,

    /// Human-readable description
    pub description: String,

    /// Opaque metadata bag; write-once, never parsed for business logic
    #[serde(default)]
    pub metadata: HashMap<String, String>,

    /// True when the treasury is the counterparty
    pub is_treasury_transaction: bool,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

/// External projection of a ledger entry
///
/// Carries the display-converted amount; internal row identifiers beyond
/// the entry ID are not exposed.
#[derive(Debug, Clone, Serialize)]
pub struct LedgerEntryView {
    /// Entry ID
    pub id: Uuid,
    /// Subject account
    pub user_id: UserId,
    /// Counterparty, if any
    pub counterparty_user_id: Option<UserId>,
    /// Signed display amount
    pub amount: Decimal,
    /// Entry classification
    pub kind: EntryKind,
    /// Lifecycle status
    pub status: EntryStatus,
    /// Human-readable description
    pub description: String,
    /// Opaque metadata bag
    pub metadata: HashMap<String, String>,
    /// True when the treasury is the counterparty
    pub is_treasury_transaction: bool,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl From<&LedgerEntry> for LedgerEntryView {
    fn from(entry: &LedgerEntry) -> Self {
        Self {
            id: entry.id,
            user_id: entry.user_id.clone(),
            counterparty_user_id: entry.counterparty_user_id.clone(),
            amount: amount::to_display(entry.amount_minor),
            kind: entry.kind,
            status: entry.status,
            description: entry.description.clone(),
            metadata: entry.metadata.clone(),
            is_treasury_transaction: entry.is_treasury_transaction,
            created_at: entry.created_at,
        }
    }
}

/// Supply and distribution snapshot, in display form
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TreasuryStats {
    /// Treasury balance plus all wallet balances
    pub total_supply: Decimal,
    /// Sum of all wallet balances
    pub circulating_supply: Decimal,
    /// Treasury reserve balance
    pub treasury_balance: Decimal,
    /// Circulating share of total supply, percent
    pub percent_circulating: Decimal,
    /// Wallets holding a positive balance
    pub holder_count: u64,
}

/// Outcome of a single airdrop recipient
#[derive(Debug, Clone, Serialize)]
pub struct AirdropResult {
    /// Recipient
    pub user_id: UserId,
    /// Requested per-user display amount
    pub amount: Decimal,
    /// Confirmed or Failed
    pub status: EntryStatus,
    /// Ledger entry ID for the credit attempt
    pub transaction_id: Option<Uuid>,
    /// Failure detail when status is Failed
    pub error: Option<String>,
}

/// Outcome of a batch airdrop
#[derive(Debug, Clone, Serialize)]
pub struct AirdropOutcome {
    /// Per-recipient results, in request order
    pub results: Vec<AirdropResult>,
    /// Requested IDs that did not resolve to registered users
    pub missing_user_ids: Vec<UserId>,
    /// Amount actually debited from the treasury (sum of confirmed credits)
    pub total_debited: Decimal,
}

/// Outcome of a direct user-to-user tip
#[derive(Debug, Clone, Serialize)]
pub struct TipOutcome {
    /// Sender debit entry
    pub debit: LedgerEntryView,
    /// Recipient credit entry
    pub credit: LedgerEntryView,
    /// Share destroyed from supply
    pub burned: Decimal,
    /// Share returned to the treasury reserve
    pub treasury_share: Decimal,
}
