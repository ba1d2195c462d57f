//! Storage layer using RocksDB pessimistic transactions
//!
//! # Column Families
//!
//! - `treasury` - Treasury singleton row (key: fixed)
//! - `users` - Registered user records (key: user_id)
//! - `wallets` - Per-user wallet balances (key: user_id)
//! - `entries` - Append-only ledger entries (key: entry_id, UUIDv7)
//! - `indices` - Secondary index user_id -> entry_ids
//! - `policy` - Policy parameters singleton (key: fixed)
//! - `audit` - Admin audit trail (key: record_id, UUIDv7)
//!
//! Row locks come from `get_for_update` inside a pessimistic transaction:
//! two transactions touching the treasury serialize on its row, while
//! transactions over disjoint wallets proceed in parallel. A lock wait
//! that exceeds the configured timeout surfaces as `Error::Contention`
//! and the transaction never commits.

use crate::{
    amount,
    audit::AuditRecord,
    error::{Error, Result},
    policy::PolicyParameters,
    types::{AdminId, LedgerEntry, TreasuryAccount, UserId, UserRecord, UserWallet},
    Config,
};
use chrono::Utc;
use rocksdb::{
    ColumnFamily, ColumnFamilyDescriptor, DBCompactionStyle, Direction, IteratorMode, Options,
    Transaction, TransactionDB, TransactionDBOptions, TransactionOptions, WriteOptions,
};
use uuid::Uuid;

/// Column family names
const CF_TREASURY: &str = "treasury";
const CF_USERS: &str = "users";
const CF_WALLETS: &str = "wallets";
const CF_ENTRIES: &str = "entries";
const CF_INDICES: &str = "indices";
const CF_POLICY: &str = "policy";
const CF_AUDIT: &str = "audit";

/// Fixed key of the treasury singleton row
const TREASURY_KEY: &[u8] = b"treasury";

/// Fixed key of the policy singleton row
const POLICY_KEY: &[u8] = b"policy";

/// Durable transactional store for the treasury ledger
pub struct LedgerStore {
    db: TransactionDB,
    lock_wait_ms: i64,
}

impl std::fmt::Debug for LedgerStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerStore")
            .field("lock_wait_ms", &self.lock_wait_ms)
            .finish_non_exhaustive()
    }
}

impl LedgerStore {
    /// Open or create the database and seed the treasury singleton
    pub fn open(config: &Config) -> Result<Self> {
        let path = &config.data_dir;

        std::fs::create_dir_all(path)?;

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        // Tuning from config
        db_opts.set_write_buffer_size(config.rocksdb.write_buffer_size_mb * 1024 * 1024);
        db_opts.set_max_write_buffer_number(config.rocksdb.max_write_buffer_number);
        db_opts.set_target_file_size_base(config.rocksdb.target_file_size_mb * 1024 * 1024);
        db_opts.set_max_background_jobs(config.rocksdb.max_background_jobs);

        // Universal compaction for an append-heavy workload
        db_opts.set_compaction_style(DBCompactionStyle::Universal);

        let mut txn_db_opts = TransactionDBOptions::default();
        txn_db_opts.set_txn_lock_timeout(config.lock_wait_ms);
        txn_db_opts.set_default_lock_timeout(config.lock_wait_ms);

        let cf_descriptors = vec![
            ColumnFamilyDescriptor::new(CF_TREASURY, Options::default()),
            ColumnFamilyDescriptor::new(CF_USERS, Options::default()),
            ColumnFamilyDescriptor::new(CF_WALLETS, Options::default()),
            ColumnFamilyDescriptor::new(CF_ENTRIES, Self::cf_options_entries()),
            ColumnFamilyDescriptor::new(CF_INDICES, Options::default()),
            ColumnFamilyDescriptor::new(CF_POLICY, Options::default()),
            ColumnFamilyDescriptor::new(CF_AUDIT, Self::cf_options_entries()),
        ];

        let db = TransactionDB::open_cf_descriptors(&db_opts, &txn_db_opts, path, cf_descriptors)?;

        let store = Self {
            db,
            lock_wait_ms: config.lock_wait_ms,
        };

        store.seed_treasury(config)?;

        tracing::info!(path = %path.display(), "opened treasury store");

        Ok(store)
    }

    fn cf_options_entries() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        opts
    }

    fn cf_handle(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| Error::Storage(format!("column family {} not found", name)))
    }

    /// Write the treasury singleton if it has never existed
    fn seed_treasury(&self, config: &Config) -> Result<()> {
        let cf = self.cf_handle(CF_TREASURY)?;
        if self.db.get_cf(cf, TREASURY_KEY)?.is_some() {
            return Ok(());
        }

        let balance = amount::to_minor(config.initial_supply)?;
        if balance.is_negative() {
            return Err(Error::Config(format!(
                "initial supply must be non-negative, got {}",
                config.initial_supply
            )));
        }

        let account = TreasuryAccount {
            balance,
            last_updated_at: Utc::now(),
            last_updated_by: AdminId::system(),
        };

        self.db
            .put_cf(cf, TREASURY_KEY, bincode::serialize(&account)?)?;

        tracing::info!(initial_supply = %config.initial_supply, "seeded treasury reserve");

        Ok(())
    }

    /// Run `f` inside one atomic unit of work
    ///
    /// On `Ok` every staged write commits atomically; on `Err` all writes
    /// roll back and the error propagates unchanged. Row locks acquired
    /// inside `f` are held until the transaction ends.
    pub fn with_transaction<T>(&self, f: impl FnOnce(&UnitOfWork<'_>) -> Result<T>) -> Result<T> {
        let mut txn_opts = TransactionOptions::default();
        txn_opts.set_deadlock_detect(true);
        txn_opts.set_lock_timeout(self.lock_wait_ms);

        let txn = self.db.transaction_opt(&WriteOptions::default(), &txn_opts);
        let uow = UnitOfWork { store: self, txn };

        match f(&uow) {
            Ok(value) => {
                uow.txn.commit()?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = uow.txn.rollback() {
                    tracing::warn!(error = %rollback_err, "transaction rollback failed");
                }
                Err(err)
            }
        }
    }

    // Plain reads (outside any transaction)

    /// Read the treasury singleton
    pub fn treasury(&self) -> Result<TreasuryAccount> {
        let cf = self.cf_handle(CF_TREASURY)?;
        let bytes = self
            .db
            .get_cf(cf, TREASURY_KEY)?
            .ok_or_else(|| Error::Storage("treasury row missing".to_string()))?;
        Ok(bincode::deserialize(&bytes)?)
    }

    /// Read a wallet, None if never created
    pub fn wallet(&self, user_id: &UserId) -> Result<Option<UserWallet>> {
        let cf = self.cf_handle(CF_WALLETS)?;
        match self.db.get_cf(cf, user_id.as_str().as_bytes())? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Check whether a user has been registered
    pub fn user_exists(&self, user_id: &UserId) -> Result<bool> {
        let cf = self.cf_handle(CF_USERS)?;
        Ok(self.db.get_cf(cf, user_id.as_str().as_bytes())?.is_some())
    }

    /// Read a ledger entry by ID
    pub fn entry(&self, entry_id: Uuid) -> Result<Option<LedgerEntry>> {
        let cf = self.cf_handle(CF_ENTRIES)?;
        match self.db.get_cf(cf, entry_id.as_bytes())? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Ledger entries for one user, oldest first, via the user index
    pub fn entries_for_user(&self, user_id: &UserId, limit: usize) -> Result<Vec<LedgerEntry>> {
        let cf_indices = self.cf_handle(CF_INDICES)?;

        let prefix = Self::index_prefix(user_id);
        let iter = self
            .db
            .iterator_cf(cf_indices, IteratorMode::From(&prefix, Direction::Forward));

        let mut entries = Vec::new();
        for item in iter {
            let (key, _) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            if entries.len() >= limit {
                break;
            }

            // Entry ID is the 16 trailing bytes
            if key.len() >= prefix.len() + 16 {
                let id_bytes: [u8; 16] = key[key.len() - 16..]
                    .try_into()
                    .map_err(|_| Error::Storage("malformed index key".to_string()))?;
                let entry_id = Uuid::from_bytes(id_bytes);
                if let Some(entry) = self.entry(entry_id)? {
                    entries.push(entry);
                }
            }
        }

        Ok(entries)
    }

    /// Sum of all wallet balances plus count of positive-balance holders
    pub fn wallet_totals(&self) -> Result<(amount::MinorUnits, u64)> {
        let cf = self.cf_handle(CF_WALLETS)?;

        let mut total = amount::MinorUnits::ZERO;
        let mut holders = 0u64;

        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_, value) = item?;
            let wallet: UserWallet = bincode::deserialize(&value)?;
            total = total
                .checked_add(wallet.balance)
                .ok_or_else(|| Error::Storage("wallet balance sum overflow".to_string()))?;
            if wallet.balance.is_positive() {
                holders += 1;
            }
        }

        Ok((total, holders))
    }

    /// Read the policy singleton, None if never seeded
    pub fn policy(&self) -> Result<Option<PolicyParameters>> {
        let cf = self.cf_handle(CF_POLICY)?;
        match self.db.get_cf(cf, POLICY_KEY)? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    // Audit trail (direct writes, not part of any unit of work)

    /// Append an audit record
    pub fn append_audit(&self, record: &AuditRecord) -> Result<()> {
        let cf = self.cf_handle(CF_AUDIT)?;
        self.db
            .put_cf(cf, record.id.as_bytes(), bincode::serialize(record)?)?;
        Ok(())
    }

    /// Most recent audit records, newest first
    pub fn recent_audit(&self, limit: usize) -> Result<Vec<AuditRecord>> {
        let cf = self.cf_handle(CF_AUDIT)?;

        let mut records = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::End) {
            if records.len() >= limit {
                break;
            }
            let (_, value) = item?;
            records.push(bincode::deserialize(&value)?);
        }

        Ok(records)
    }

    fn index_prefix(user_id: &UserId) -> Vec<u8> {
        let mut prefix = user_id.as_str().as_bytes().to_vec();
        prefix.push(b'|');
        prefix
    }
}

/// Handle to one atomic unit of work
///
/// All writes take effect only if the enclosing transaction commits.
pub struct UnitOfWork<'db> {
    store: &'db LedgerStore,
    txn: Transaction<'db, TransactionDB>,
}

impl std::fmt::Debug for UnitOfWork<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnitOfWork").finish_non_exhaustive()
    }
}

impl UnitOfWork<'_> {
    /// Read the treasury row with an exclusive write-intent lock
    ///
    /// Blocks concurrent lockers until this transaction ends; a bounded
    /// wait that expires maps to `Error::Contention`.
    pub fn treasury_for_update(&self) -> Result<TreasuryAccount> {
        let cf = self.store.cf_handle(CF_TREASURY)?;
        let bytes = self
            .txn
            .get_for_update_cf(cf, TREASURY_KEY, true)?
            .ok_or_else(|| Error::Storage("treasury row missing".to_string()))?;
        Ok(bincode::deserialize(&bytes)?)
    }

    /// Stage a treasury write
    pub fn put_treasury(&self, account: &TreasuryAccount) -> Result<()> {
        let cf = self.store.cf_handle(CF_TREASURY)?;
        self.txn
            .put_cf(cf, TREASURY_KEY, bincode::serialize(account)?)?;
        Ok(())
    }

    /// Read a wallet row with an exclusive write-intent lock
    ///
    /// Returns None if the wallet has never been created. Same lock
    /// semantics as [`Self::treasury_for_update`], scoped per user.
    pub fn wallet_for_update(&self, user_id: &UserId) -> Result<Option<UserWallet>> {
        let cf = self.store.cf_handle(CF_WALLETS)?;
        match self
            .txn
            .get_for_update_cf(cf, user_id.as_str().as_bytes(), true)?
        {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Stage a wallet write
    pub fn put_wallet(&self, wallet: &UserWallet) -> Result<()> {
        let cf = self.store.cf_handle(CF_WALLETS)?;
        self.txn.put_cf(
            cf,
            wallet.user_id.as_str().as_bytes(),
            bincode::serialize(wallet)?,
        )?;
        Ok(())
    }

    /// Stage a wallet delete
    pub fn delete_wallet(&self, user_id: &UserId) -> Result<()> {
        let cf = self.store.cf_handle(CF_WALLETS)?;
        self.txn.delete_cf(cf, user_id.as_str().as_bytes())?;
        Ok(())
    }

    /// Check whether a user has been registered
    ///
    /// Plain read, no lock. Safe for existence gates because users are
    /// never unregistered; registration paths must use
    /// [`Self::user_exists_for_update`] instead.
    pub fn user_exists(&self, user_id: &UserId) -> Result<bool> {
        let cf = self.store.cf_handle(CF_USERS)?;
        Ok(self.txn.get_cf(cf, user_id.as_str().as_bytes())?.is_some())
    }

    /// Check registration while locking the user record key
    ///
    /// The lock serializes concurrent registrations of the same user, so
    /// only one transaction can observe the record as absent and write it.
    pub fn user_exists_for_update(&self, user_id: &UserId) -> Result<bool> {
        let cf = self.store.cf_handle(CF_USERS)?;
        Ok(self
            .txn
            .get_for_update_cf(cf, user_id.as_str().as_bytes(), true)?
            .is_some())
    }

    /// Stage a user record write
    pub fn put_user(&self, record: &UserRecord) -> Result<()> {
        let cf = self.store.cf_handle(CF_USERS)?;
        self.txn.put_cf(
            cf,
            record.user_id.as_str().as_bytes(),
            bincode::serialize(record)?,
        )?;
        Ok(())
    }

    /// Stage a ledger entry insert plus its user index row
    pub fn insert_entry(&self, entry: &LedgerEntry) -> Result<()> {
        let cf_entries = self.store.cf_handle(CF_ENTRIES)?;
        self.txn
            .put_cf(cf_entries, entry.id.as_bytes(), bincode::serialize(entry)?)?;

        let cf_indices = self.store.cf_handle(CF_INDICES)?;
        let mut index_key = LedgerStore::index_prefix(&entry.user_id);
        index_key.extend_from_slice(entry.id.as_bytes());
        self.txn.put_cf(cf_indices, &index_key, b"")?;

        tracing::debug!(
            entry_id = %entry.id,
            user_id = %entry.user_id,
            amount_minor = entry.amount_minor.raw(),
            kind = ?entry.kind,
            "ledger entry staged"
        );

        Ok(())
    }

    /// Read the policy singleton with an exclusive write-intent lock
    pub fn policy_for_update(&self) -> Result<Option<PolicyParameters>> {
        let cf = self.store.cf_handle(CF_POLICY)?;
        match self.txn.get_for_update_cf(cf, POLICY_KEY, true)? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Stage a policy write
    pub fn put_policy(&self, params: &PolicyParameters) -> Result<()> {
        let cf = self.store.cf_handle(CF_POLICY)?;
        self.txn.put_cf(cf, POLICY_KEY, bincode::serialize(params)?)?;
        Ok(())
    }
}
