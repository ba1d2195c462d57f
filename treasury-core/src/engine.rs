//! Main transfer orchestration layer
//!
//! This module ties together storage, policy, audit, and metrics into a
//! high-level API for moving DGT between the treasury reserve and user
//! wallets, and between user wallets directly.
//!
//! Every operation runs inside exactly one store transaction, which is
//! the sole concurrency boundary: operations touching the treasury
//! serialize on its row lock, operations over disjoint wallets run in
//! parallel, and a bounded lock wait that expires surfaces as
//! `Error::Contention` with zero partial writes.
//!
//! # Example
//!
//! ```no_run
//! use treasury_core::{Config, TreasuryEngine};
//! use treasury_core::types::{AdminId, UserId};
//! use rust_decimal::Decimal;
//!
//! fn main() -> treasury_core::Result<()> {
//!     let engine = TreasuryEngine::open(Config::default())?;
//!     let admin = AdminId::new("admin-1");
//!     let user = UserId::new("user-1");
//!
//!     engine.register_user(&admin, &user)?;
//!     let entry = engine.disburse(&admin, &user, Decimal::from(200), None, Default::default())?;
//!     println!("credited {}", entry.amount);
//!     Ok(())
//! }
//! ```

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    amount::{self, MinorUnits},
    audit::{AuditAction, AuditEmitter, AuditRecord},
    error::{Error, Result},
    metrics::Metrics,
    policy::{PolicyStore, PolicyUpdate, PolicyView},
    storage::{LedgerStore, UnitOfWork},
    types::{
        AdminId, AirdropOutcome, AirdropResult, EntryKind, EntryStatus, LedgerEntry,
        LedgerEntryView, TipOutcome, TreasuryStats, UserId, UserRecord, UserWallet,
    },
    Config,
};

/// Core orchestrator for all treasury and wallet movements
pub struct TreasuryEngine {
    store: Arc<LedgerStore>,
    policy: PolicyStore,
    audit: AuditEmitter,
    metrics: Metrics,
}

impl std::fmt::Debug for TreasuryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TreasuryEngine").finish_non_exhaustive()
    }
}

impl TreasuryEngine {
    /// Open the engine with configuration
    pub fn open(config: Config) -> Result<Self> {
        let store = Arc::new(LedgerStore::open(&config)?);
        let policy = PolicyStore::new(store.clone());
        let audit = AuditEmitter::new(store.clone());
        let metrics =
            Metrics::new().map_err(|e| Error::Config(format!("metrics registry: {}", e)))?;

        metrics
            .treasury_balance
            .set(store.treasury()?.balance.raw());

        Ok(Self {
            store,
            policy,
            audit,
            metrics,
        })
    }

    /// Shared ledger store
    pub fn store(&self) -> &Arc<LedgerStore> {
        &self.store
    }

    /// Policy store
    pub fn policy_store(&self) -> &PolicyStore {
        &self.policy
    }

    /// Audit emitter
    pub fn audit(&self) -> &AuditEmitter {
        &self.audit
    }

    /// Metrics collector
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Register a user and their zero-balance wallet
    ///
    /// Idempotent: re-registration returns `false` and changes nothing.
    /// The existence check locks the user record key, so two concurrent
    /// registrations of the same user serialize and only one creates the
    /// wallet; the loser can never overwrite a wallet funded in between.
    pub fn register_user(&self, admin_id: &AdminId, user_id: &UserId) -> Result<bool> {
        let created = self.store.with_transaction(|tx| {
            if tx.user_exists_for_update(user_id)? {
                return Ok(false);
            }
            let now = Utc::now();
            tx.put_user(&UserRecord {
                user_id: user_id.clone(),
                created_at: now,
            })?;
            tx.put_wallet(&UserWallet::new(user_id.clone(), now))?;
            Ok(true)
        })?;

        if created {
            self.audit.emit(AuditRecord::new(
                admin_id.clone(),
                AuditAction::RegisterUser,
                &json!({ "user_id": user_id.as_str() }),
            ));
        }

        Ok(created)
    }

    /// Disburse from the treasury reserve to a user wallet
    pub fn disburse(
        &self,
        admin_id: &AdminId,
        user_id: &UserId,
        amount: Decimal,
        description: Option<String>,
        metadata: HashMap<String, String>,
    ) -> Result<LedgerEntryView> {
        let _timer = self.metrics.op_duration.start_timer();
        let minor = positive_minor(amount)?;

        let (entry, treasury_balance) = self.store.with_transaction(|tx| {
            if !tx.user_exists(user_id)? {
                return Err(Error::UserNotFound(user_id.to_string()));
            }

            let now = Utc::now();
            let treasury_balance = debit_treasury(tx, admin_id, minor, now)?;
            credit_wallet(tx, user_id, minor, now)?;

            let entry = LedgerEntry {
                id: Uuid::now_v7(),
                user_id: user_id.clone(),
                counterparty_user_id: None,
                amount_minor: minor,
                kind: EntryKind::AdminAdjust,
                status: EntryStatus::Confirmed,
                description: description.unwrap_or_else(|| "treasury disbursement".to_string()),
                metadata,
                is_treasury_transaction: true,
                created_at: now,
            };
            tx.insert_entry(&entry)?;

            Ok((entry, treasury_balance))
        })?;

        self.metrics.disbursements_total.inc();
        self.metrics.treasury_balance.set(treasury_balance.raw());
        self.audit.emit(AuditRecord::new(
            admin_id.clone(),
            AuditAction::Disburse,
            &json!({
                "user_id": user_id.as_str(),
                "amount": amount::to_display(minor),
                "entry_id": entry.id,
            }),
        ));

        tracing::info!(
            admin_id = %admin_id,
            user_id = %user_id,
            amount = %amount::to_display(minor),
            entry_id = %entry.id,
            "disbursement committed"
        );

        Ok(LedgerEntryView::from(&entry))
    }

    /// Recover from a user wallet back into the treasury reserve
    pub fn recover(
        &self,
        admin_id: &AdminId,
        user_id: &UserId,
        amount: Decimal,
        description: Option<String>,
        metadata: HashMap<String, String>,
    ) -> Result<LedgerEntryView> {
        let _timer = self.metrics.op_duration.start_timer();
        let minor = positive_minor(amount)?;

        let (entry, treasury_balance) = self.store.with_transaction(|tx| {
            if !tx.user_exists(user_id)? {
                return Err(Error::UserNotFound(user_id.to_string()));
            }

            let now = Utc::now();
            debit_wallet(tx, user_id, minor, now)?;
            let treasury_balance = credit_treasury(tx, admin_id, minor, now)?;

            let entry = LedgerEntry {
                id: Uuid::now_v7(),
                user_id: user_id.clone(),
                counterparty_user_id: None,
                amount_minor: minor.negate(),
                kind: EntryKind::AdminAdjust,
                status: EntryStatus::Confirmed,
                description: description.unwrap_or_else(|| "treasury recovery".to_string()),
                metadata,
                is_treasury_transaction: true,
                created_at: now,
            };
            tx.insert_entry(&entry)?;

            Ok((entry, treasury_balance))
        })?;

        self.metrics.recoveries_total.inc();
        self.metrics.treasury_balance.set(treasury_balance.raw());
        self.audit.emit(AuditRecord::new(
            admin_id.clone(),
            AuditAction::Recover,
            &json!({
                "user_id": user_id.as_str(),
                "amount": amount::to_display(minor),
                "entry_id": entry.id,
            }),
        ));

        tracing::info!(
            admin_id = %admin_id,
            user_id = %user_id,
            amount = %amount::to_display(minor),
            entry_id = %entry.id,
            "recovery committed"
        );

        Ok(LedgerEntryView::from(&entry))
    }

    /// Credit many user wallets from the treasury in one batch
    ///
    /// All-or-nothing at the treasury level: the reserve must cover the
    /// full requested total before any wallet is touched. Per-recipient
    /// credits are best-effort inside the batch: unresolved user IDs are
    /// reported and skipped, and a per-user failure becomes an explicit
    /// `Failed` result instead of unwinding the loop. The treasury is
    /// debited only by the amount actually credited, so skipped or
    /// failed recipients leak nothing from the reserve.
    pub fn airdrop(
        &self,
        admin_id: &AdminId,
        user_ids: &[UserId],
        amount_per_user: Decimal,
        reason: Option<String>,
    ) -> Result<AirdropOutcome> {
        let _timer = self.metrics.op_duration.start_timer();
        let per_user = positive_minor(amount_per_user)?;
        let total_required = per_user
            .checked_mul(user_ids.len() as i64)
            .ok_or_else(|| Error::Validation("airdrop batch total overflows".to_string()))?;

        let (outcome, treasury_balance) = self.store.with_transaction(|tx| {
            let mut treasury = tx.treasury_for_update()?;
            if treasury.balance < total_required {
                return Err(Error::InsufficientTreasuryFunds {
                    required: amount::to_display(total_required).to_string(),
                    available: amount::to_display(treasury.balance).to_string(),
                });
            }

            let now = Utc::now();
            let description = reason
                .clone()
                .unwrap_or_else(|| "treasury airdrop".to_string());

            let mut results = Vec::with_capacity(user_ids.len());
            let mut missing_user_ids = Vec::new();
            let mut credited = MinorUnits::ZERO;

            for user_id in user_ids {
                if !tx.user_exists(user_id)? {
                    missing_user_ids.push(user_id.clone());
                    continue;
                }

                match credit_airdrop_recipient(tx, user_id, per_user, &description, now) {
                    Ok(entry_id) => {
                        credited = credited.checked_add(per_user).ok_or_else(|| {
                            Error::Validation("airdrop credited total overflows".to_string())
                        })?;
                        results.push(AirdropResult {
                            user_id: user_id.clone(),
                            amount: amount::to_display(per_user),
                            status: EntryStatus::Confirmed,
                            transaction_id: Some(entry_id),
                            error: None,
                        });
                    }
                    Err(err) => {
                        let failed = LedgerEntry {
                            id: Uuid::now_v7(),
                            user_id: user_id.clone(),
                            counterparty_user_id: None,
                            amount_minor: per_user,
                            kind: EntryKind::Airdrop,
                            status: EntryStatus::Failed,
                            description: description.clone(),
                            metadata: HashMap::new(),
                            is_treasury_transaction: true,
                            created_at: now,
                        };
                        if let Err(insert_err) = tx.insert_entry(&failed) {
                            tracing::warn!(
                                user_id = %user_id,
                                error = %insert_err,
                                "failed airdrop entry could not be recorded"
                            );
                        }
                        results.push(AirdropResult {
                            user_id: user_id.clone(),
                            amount: amount::to_display(per_user),
                            status: EntryStatus::Failed,
                            transaction_id: Some(failed.id),
                            error: Some(err.to_string()),
                        });
                    }
                }
            }

            treasury.balance = treasury.balance.checked_sub(credited).ok_or_else(|| {
                Error::Storage("treasury balance underflow in airdrop".to_string())
            })?;
            treasury.last_updated_at = now;
            treasury.last_updated_by = admin_id.clone();
            tx.put_treasury(&treasury)?;

            Ok((
                AirdropOutcome {
                    results,
                    missing_user_ids,
                    total_debited: amount::to_display(credited),
                },
                treasury.balance,
            ))
        })?;

        let confirmed = outcome
            .results
            .iter()
            .filter(|r| r.status == EntryStatus::Confirmed)
            .count() as u64;
        let failed = outcome.results.len() as u64 - confirmed;

        self.metrics.airdrop_credits_total.inc_by(confirmed);
        self.metrics.airdrop_failures_total.inc_by(failed);
        self.metrics.treasury_balance.set(treasury_balance.raw());
        self.audit.emit(AuditRecord::new(
            admin_id.clone(),
            AuditAction::Airdrop,
            &json!({
                "requested": user_ids.len(),
                "confirmed": confirmed,
                "failed": failed,
                "missing": outcome.missing_user_ids.len(),
                "amount_per_user": amount::to_display(per_user),
                "total_debited": outcome.total_debited,
            }),
        ));

        tracing::info!(
            admin_id = %admin_id,
            requested = user_ids.len(),
            confirmed,
            missing = outcome.missing_user_ids.len(),
            total_debited = %outcome.total_debited,
            "airdrop committed"
        );

        Ok(outcome)
    }

    /// Direct user-to-user transfer, split per policy
    ///
    /// The recipient share is credited to the recipient, the burn share
    /// is destroyed from supply, and any remainder returns to the
    /// treasury reserve. Bounds and split percentages come from the
    /// policy singleton.
    pub fn tip(
        &self,
        sender_id: &UserId,
        recipient_id: &UserId,
        amount: Decimal,
    ) -> Result<TipOutcome> {
        let _timer = self.metrics.op_duration.start_timer();
        let minor = positive_minor(amount)?;

        if sender_id == recipient_id {
            return Err(Error::Validation(
                "tip sender and recipient must differ".to_string(),
            ));
        }

        let params = self.policy.get()?;
        if minor < params.min_tip || minor > params.max_tip {
            return Err(Error::Validation(format!(
                "tip amount {} outside bounds [{}, {}]",
                amount::to_display(minor),
                amount::to_display(params.min_tip),
                amount::to_display(params.max_tip)
            )));
        }

        let recipient_share = minor.percent_share(params.tip_recipient_percent);
        let burn_share = minor.percent_share(params.tip_burn_percent);
        let treasury_share = minor
            .checked_sub(recipient_share)
            .and_then(|rest| rest.checked_sub(burn_share))
            .ok_or_else(|| Error::Storage("tip split underflow".to_string()))?;

        let (debit, credit) = self.store.with_transaction(|tx| {
            if !tx.user_exists(sender_id)? {
                return Err(Error::UserNotFound(sender_id.to_string()));
            }
            if !tx.user_exists(recipient_id)? {
                return Err(Error::UserNotFound(recipient_id.to_string()));
            }

            let now = Utc::now();
            debit_wallet(tx, sender_id, minor, now)?;
            credit_wallet(tx, recipient_id, recipient_share, now)?;
            if treasury_share.is_positive() {
                credit_treasury(tx, &AdminId::system(), treasury_share, now)?;
            }

            let debit = LedgerEntry {
                id: Uuid::now_v7(),
                user_id: sender_id.clone(),
                counterparty_user_id: Some(recipient_id.clone()),
                amount_minor: minor.negate(),
                kind: EntryKind::Tip,
                status: EntryStatus::Confirmed,
                description: format!("tip to {}", recipient_id),
                metadata: HashMap::new(),
                is_treasury_transaction: false,
                created_at: now,
            };
            tx.insert_entry(&debit)?;

            let credit = LedgerEntry {
                id: Uuid::now_v7(),
                user_id: recipient_id.clone(),
                counterparty_user_id: Some(sender_id.clone()),
                amount_minor: recipient_share,
                kind: EntryKind::Tip,
                status: EntryStatus::Confirmed,
                description: format!("tip from {}", sender_id),
                metadata: HashMap::new(),
                is_treasury_transaction: false,
                created_at: now,
            };
            tx.insert_entry(&credit)?;

            Ok((debit, credit))
        })?;

        self.metrics.tips_total.inc();
        self.audit.emit(AuditRecord::new(
            AdminId::system(),
            AuditAction::Tip,
            &json!({
                "sender_id": sender_id.as_str(),
                "recipient_id": recipient_id.as_str(),
                "amount": amount::to_display(minor),
                "burned": amount::to_display(burn_share),
                "treasury_share": amount::to_display(treasury_share),
            }),
        ));

        tracing::info!(
            sender_id = %sender_id,
            recipient_id = %recipient_id,
            amount = %amount::to_display(minor),
            burned = %amount::to_display(burn_share),
            "tip committed"
        );

        Ok(TipOutcome {
            debit: LedgerEntryView::from(&debit),
            credit: LedgerEntryView::from(&credit),
            burned: amount::to_display(burn_share),
            treasury_share: amount::to_display(treasury_share),
        })
    }

    /// Supply and distribution snapshot
    ///
    /// Read-only: two calls with no intervening mutation return
    /// identical values.
    pub fn treasury_stats(&self) -> Result<TreasuryStats> {
        let treasury = self.store.treasury()?;
        let (circulating, holder_count) = self.store.wallet_totals()?;

        let total = treasury
            .balance
            .checked_add(circulating)
            .ok_or_else(|| Error::Storage("total supply overflow".to_string()))?;

        let total_supply = amount::to_display(total);
        let circulating_supply = amount::to_display(circulating);
        let percent_circulating = if total_supply.is_zero() {
            Decimal::ZERO
        } else {
            (circulating_supply / total_supply * Decimal::from(100)).round_dp(6)
        };

        Ok(TreasuryStats {
            total_supply,
            circulating_supply,
            treasury_balance: amount::to_display(treasury.balance),
            percent_circulating,
            holder_count,
        })
    }

    /// Wallet balance in display form, zero if never credited
    pub fn wallet_balance(&self, user_id: &UserId) -> Result<Decimal> {
        if !self.store.user_exists(user_id)? {
            return Err(Error::UserNotFound(user_id.to_string()));
        }
        let balance = self
            .store
            .wallet(user_id)?
            .map(|w| w.balance)
            .unwrap_or(MinorUnits::ZERO);
        Ok(amount::to_display(balance))
    }

    /// Ledger history for one user, oldest first
    pub fn user_entries(&self, user_id: &UserId, limit: usize) -> Result<Vec<LedgerEntryView>> {
        let entries = self.store.entries_for_user(user_id, limit)?;
        Ok(entries.iter().map(LedgerEntryView::from).collect())
    }

    /// Current policy parameters in display form
    pub fn policy(&self) -> Result<PolicyView> {
        Ok(PolicyView::from(&self.policy.get()?))
    }

    /// Seed the policy singleton if absent (idempotent)
    pub fn seed_policy(&self, params: crate::policy::PolicyParameters) -> Result<()> {
        self.policy.seed(params)
    }

    /// Apply a partial policy update
    pub fn update_policy(&self, admin_id: &AdminId, update: &PolicyUpdate) -> Result<PolicyView> {
        let merged = self.policy.update(admin_id, update)?;

        self.audit.emit(AuditRecord::new(
            admin_id.clone(),
            AuditAction::PolicyUpdate,
            update,
        ));

        tracing::info!(admin_id = %admin_id, "policy updated");

        Ok(PolicyView::from(&merged))
    }
}

/// Reject non-positive display amounts at the boundary
fn positive_minor(amount: Decimal) -> Result<MinorUnits> {
    let minor = amount::to_minor(amount)?;
    if !minor.is_positive() {
        return Err(Error::Validation(format!(
            "amount must be positive, got {}",
            amount
        )));
    }
    Ok(minor)
}

/// Lock the treasury, verify coverage, stage the debit
fn debit_treasury(
    tx: &UnitOfWork<'_>,
    admin_id: &AdminId,
    minor: MinorUnits,
    now: DateTime<Utc>,
) -> Result<MinorUnits> {
    let mut treasury = tx.treasury_for_update()?;
    if treasury.balance < minor {
        return Err(Error::InsufficientTreasuryFunds {
            required: amount::to_display(minor).to_string(),
            available: amount::to_display(treasury.balance).to_string(),
        });
    }
    treasury.balance = treasury
        .balance
        .checked_sub(minor)
        .ok_or_else(|| Error::Storage("treasury balance underflow".to_string()))?;
    treasury.last_updated_at = now;
    treasury.last_updated_by = admin_id.clone();
    tx.put_treasury(&treasury)?;
    Ok(treasury.balance)
}

/// Lock the treasury and stage the credit
fn credit_treasury(
    tx: &UnitOfWork<'_>,
    admin_id: &AdminId,
    minor: MinorUnits,
    now: DateTime<Utc>,
) -> Result<MinorUnits> {
    let mut treasury = tx.treasury_for_update()?;
    treasury.balance = treasury
        .balance
        .checked_add(minor)
        .ok_or_else(|| Error::Storage("treasury balance overflow".to_string()))?;
    treasury.last_updated_at = now;
    treasury.last_updated_by = admin_id.clone();
    tx.put_treasury(&treasury)?;
    Ok(treasury.balance)
}

/// Lock (or create) a wallet and stage the credit
fn credit_wallet(
    tx: &UnitOfWork<'_>,
    user_id: &UserId,
    minor: MinorUnits,
    now: DateTime<Utc>,
) -> Result<()> {
    let mut wallet = tx
        .wallet_for_update(user_id)?
        .unwrap_or_else(|| UserWallet::new(user_id.clone(), now));
    wallet.balance = wallet
        .balance
        .checked_add(minor)
        .ok_or_else(|| Error::Storage(format!("wallet balance overflow for {}", user_id)))?;
    wallet.updated_at = now;
    tx.put_wallet(&wallet)
}

/// Lock a wallet, verify coverage, stage the debit
fn debit_wallet(
    tx: &UnitOfWork<'_>,
    user_id: &UserId,
    minor: MinorUnits,
    now: DateTime<Utc>,
) -> Result<()> {
    let mut wallet = match tx.wallet_for_update(user_id)? {
        Some(wallet) if wallet.balance >= minor => wallet,
        Some(wallet) => {
            return Err(Error::InsufficientUserFunds {
                user_id: user_id.to_string(),
                required: amount::to_display(minor).to_string(),
                available: amount::to_display(wallet.balance).to_string(),
            });
        }
        None => {
            return Err(Error::InsufficientUserFunds {
                user_id: user_id.to_string(),
                required: amount::to_display(minor).to_string(),
                available: amount::to_display(MinorUnits::ZERO).to_string(),
            });
        }
    };
    wallet.balance = wallet
        .balance
        .checked_sub(minor)
        .ok_or_else(|| Error::Storage(format!("wallet balance underflow for {}", user_id)))?;
    wallet.updated_at = now;
    tx.put_wallet(&wallet)
}

/// Credit one airdrop recipient and insert the confirmed entry
///
/// A failure after the credit was staged restores the pre-credit wallet
/// row before returning, so a `Failed` recipient never commits a credit
/// and the treasury debit stays matched to confirmed credits only.
fn credit_airdrop_recipient(
    tx: &UnitOfWork<'_>,
    user_id: &UserId,
    per_user: MinorUnits,
    description: &str,
    now: DateTime<Utc>,
) -> Result<Uuid> {
    let original = tx.wallet_for_update(user_id)?;

    let mut wallet = original
        .clone()
        .unwrap_or_else(|| UserWallet::new(user_id.clone(), now));
    wallet.balance = wallet
        .balance
        .checked_add(per_user)
        .ok_or_else(|| Error::Storage(format!("wallet balance overflow for {}", user_id)))?;
    wallet.updated_at = now;
    tx.put_wallet(&wallet)?;

    let entry = LedgerEntry {
        id: Uuid::now_v7(),
        user_id: user_id.clone(),
        counterparty_user_id: None,
        amount_minor: per_user,
        kind: EntryKind::Airdrop,
        status: EntryStatus::Confirmed,
        description: description.to_string(),
        metadata: HashMap::new(),
        is_treasury_transaction: true,
        created_at: now,
    };
    if let Err(err) = tx.insert_entry(&entry) {
        match original {
            Some(wallet) => tx.put_wallet(&wallet)?,
            None => tx.delete_wallet(user_id)?,
        }
        return Err(err);
    }

    Ok(entry.id)
}
