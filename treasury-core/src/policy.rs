//! Mutable economic parameters
//!
//! A single versioned row gates withdrawals and tips. Reads dominate;
//! writes are rare admin mutations applied as a PATCH merge with range
//! validation before anything persists.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::{
    amount::{self, MinorUnits},
    error::{Error, Result},
    storage::LedgerStore,
    types::AdminId,
};

/// The policy parameters singleton
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyParameters {
    /// External settlement target for the opaque bridge
    pub treasury_wallet_address: String,

    /// Minimum withdrawal amount
    pub min_withdrawal: MinorUnits,

    /// Withdrawal fee, whole percent in [0, 100]
    pub withdrawal_fee_percent: u8,

    /// Delay before reward distribution, seconds
    pub reward_distribution_delay_secs: u64,

    /// Tip share destroyed from supply, whole percent
    pub tip_burn_percent: u8,

    /// Tip share credited to the recipient, whole percent
    pub tip_recipient_percent: u8,

    /// Minimum tip amount
    pub min_tip: MinorUnits,

    /// Maximum tip amount
    pub max_tip: MinorUnits,

    /// Last mutation timestamp
    pub updated_at: DateTime<Utc>,

    /// Admin responsible for the last mutation
    pub updated_by: AdminId,
}

impl PolicyParameters {
    /// Conservative defaults for first seeding
    pub fn default_seed(admin_id: AdminId) -> Self {
        Self {
            treasury_wallet_address: String::new(),
            min_withdrawal: MinorUnits::from_raw(10_000_000), // 10 DGT
            withdrawal_fee_percent: 2,
            reward_distribution_delay_secs: 86_400,
            tip_burn_percent: 10,
            tip_recipient_percent: 90,
            min_tip: MinorUnits::from_raw(100_000), // 0.1 DGT
            max_tip: MinorUnits::from_raw(1_000_000_000_000), // 1M DGT
            updated_at: Utc::now(),
            updated_by: admin_id,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.withdrawal_fee_percent > 100 {
            return Err(Error::Validation(format!(
                "withdrawal_fee_percent must be within [0, 100], got {}",
                self.withdrawal_fee_percent
            )));
        }
        if self.tip_burn_percent > 100 {
            return Err(Error::Validation(format!(
                "tip_burn_percent must be within [0, 100], got {}",
                self.tip_burn_percent
            )));
        }
        if self.tip_recipient_percent > 100 {
            return Err(Error::Validation(format!(
                "tip_recipient_percent must be within [0, 100], got {}",
                self.tip_recipient_percent
            )));
        }
        if self.tip_burn_percent as u16 + self.tip_recipient_percent as u16 > 100 {
            return Err(Error::Validation(format!(
                "tip_burn_percent + tip_recipient_percent must not exceed 100, got {}",
                self.tip_burn_percent as u16 + self.tip_recipient_percent as u16
            )));
        }
        if self.min_withdrawal.is_negative() {
            return Err(Error::Validation(
                "min_withdrawal must be non-negative".to_string(),
            ));
        }
        if self.min_tip.is_negative() {
            return Err(Error::Validation("min_tip must be non-negative".to_string()));
        }
        if self.max_tip < self.min_tip {
            return Err(Error::Validation(format!(
                "max_tip {} must not be below min_tip {}",
                self.max_tip, self.min_tip
            )));
        }
        Ok(())
    }
}

/// Partial policy mutation; omitted fields are left untouched
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyUpdate {
    /// External settlement target
    pub treasury_wallet_address: Option<String>,
    /// Minimum withdrawal, display form
    pub min_withdrawal: Option<Decimal>,
    /// Withdrawal fee percent
    pub withdrawal_fee_percent: Option<u8>,
    /// Reward distribution delay, seconds
    pub reward_distribution_delay_secs: Option<u64>,
    /// Tip burn percent
    pub tip_burn_percent: Option<u8>,
    /// Tip recipient percent
    pub tip_recipient_percent: Option<u8>,
    /// Minimum tip, display form
    pub min_tip: Option<Decimal>,
    /// Maximum tip, display form
    pub max_tip: Option<Decimal>,
}

impl PolicyUpdate {
    /// Apply provided fields onto `current` (PATCH merge, not a replace)
    fn merge_into(&self, current: &PolicyParameters) -> Result<PolicyParameters> {
        let mut merged = current.clone();

        if let Some(ref address) = self.treasury_wallet_address {
            merged.treasury_wallet_address = address.clone();
        }
        if let Some(min_withdrawal) = self.min_withdrawal {
            merged.min_withdrawal = amount::to_minor(min_withdrawal)?;
        }
        if let Some(fee) = self.withdrawal_fee_percent {
            merged.withdrawal_fee_percent = fee;
        }
        if let Some(delay) = self.reward_distribution_delay_secs {
            merged.reward_distribution_delay_secs = delay;
        }
        if let Some(burn) = self.tip_burn_percent {
            merged.tip_burn_percent = burn;
        }
        if let Some(recipient) = self.tip_recipient_percent {
            merged.tip_recipient_percent = recipient;
        }
        if let Some(min_tip) = self.min_tip {
            merged.min_tip = amount::to_minor(min_tip)?;
        }
        if let Some(max_tip) = self.max_tip {
            merged.max_tip = amount::to_minor(max_tip)?;
        }

        Ok(merged)
    }
}

/// External projection with display-converted monetary fields
#[derive(Debug, Clone, Serialize)]
pub struct PolicyView {
    /// External settlement target
    pub treasury_wallet_address: String,
    /// Minimum withdrawal
    pub min_withdrawal: Decimal,
    /// Withdrawal fee percent
    pub withdrawal_fee_percent: u8,
    /// Reward distribution delay, seconds
    pub reward_distribution_delay_secs: u64,
    /// Tip burn percent
    pub tip_burn_percent: u8,
    /// Tip recipient percent
    pub tip_recipient_percent: u8,
    /// Minimum tip
    pub min_tip: Decimal,
    /// Maximum tip
    pub max_tip: Decimal,
    /// Last mutation timestamp
    pub updated_at: DateTime<Utc>,
    /// Admin responsible for the last mutation
    pub updated_by: AdminId,
}

impl From<&PolicyParameters> for PolicyView {
    fn from(params: &PolicyParameters) -> Self {
        Self {
            treasury_wallet_address: params.treasury_wallet_address.clone(),
            min_withdrawal: amount::to_display(params.min_withdrawal),
            withdrawal_fee_percent: params.withdrawal_fee_percent,
            reward_distribution_delay_secs: params.reward_distribution_delay_secs,
            tip_burn_percent: params.tip_burn_percent,
            tip_recipient_percent: params.tip_recipient_percent,
            min_tip: amount::to_display(params.min_tip),
            max_tip: amount::to_display(params.max_tip),
            updated_at: params.updated_at,
            updated_by: params.updated_by.clone(),
        }
    }
}

/// Read-mostly store for the policy singleton
#[derive(Debug, Clone)]
pub struct PolicyStore {
    store: Arc<LedgerStore>,
}

impl PolicyStore {
    /// Create over the shared ledger store
    pub fn new(store: Arc<LedgerStore>) -> Self {
        Self { store }
    }

    /// Current parameters
    ///
    /// A missing singleton is a fatal configuration error, not retried.
    pub fn get(&self) -> Result<PolicyParameters> {
        self.store.policy()?.ok_or(Error::PolicyNotFound)
    }

    /// Seed the singleton if it has never existed (idempotent)
    pub fn seed(&self, params: PolicyParameters) -> Result<()> {
        params.validate()?;
        self.store.with_transaction(|tx| {
            if tx.policy_for_update()?.is_some() {
                return Ok(());
            }
            tx.put_policy(&params)
        })
    }

    /// Apply a partial update and return the merged record
    ///
    /// Range validation rejects out-of-range values before any
    /// persistence.
    pub fn update(&self, admin_id: &AdminId, update: &PolicyUpdate) -> Result<PolicyParameters> {
        self.store.with_transaction(|tx| {
            let current = tx.policy_for_update()?.ok_or(Error::PolicyNotFound)?;

            let mut merged = update.merge_into(&current)?;
            merged.validate()?;
            merged.updated_at = Utc::now();
            merged.updated_by = admin_id.clone();

            tx.put_policy(&merged)?;
            Ok(merged)
        })
    }
}
