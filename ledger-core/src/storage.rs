//! Storage layer using RocksDB
//!
//! # Column Families
//!
//! - `entries` - Append-only double-entry rows (key: entry id, big-endian)
//! - `entity_idx` - Secondary index `[type][entity_id][entry_id]`
//! - `reference_idx` - Secondary index `[ref kind][ref id][entry_id]`
//! - `group_idx` - Secondary index `[group uuid][entry_id]`
//! - `maturity` - Unlock-timestamp overrides (key: entry id) - the single
//!   sanctioned exception to append-only immutability, kept out of the row
//!   itself so ledger rows are never rewritten
//! - `rules` - Charge rules (key: rule id)
//! - `recurring_log` - Dedup log `[rule id][entity id][billing period]`
//!
//! The two legs of a transaction are committed in one `WriteBatch`: a
//! reader observes a transaction fully present or fully absent, never one
//! leg without its pair.

use crate::{
    error::{Error, Result},
    types::{ChargeRule, EntityType, LedgerEntry, LockType, Reference},
    Config,
};
use chrono::{DateTime, Utc};
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, Direction, IteratorMode, Options, WriteBatch, DB};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// Column family names
const CF_ENTRIES: &str = "entries";
const CF_ENTITY_IDX: &str = "entity_idx";
const CF_REFERENCE_IDX: &str = "reference_idx";
const CF_GROUP_IDX: &str = "group_idx";
const CF_MATURITY: &str = "maturity";
const CF_RULES: &str = "rules";
const CF_RECURRING_LOG: &str = "recurring_log";

/// Storage wrapper for RocksDB
pub struct Storage {
    db: Arc<DB>,
    next_entry_id: AtomicU64,
    next_rule_id: AtomicU64,
}

impl Storage {
    /// Open or create database
    pub fn open(config: &Config) -> Result<Self> {
        let path = &config.data_dir;

        std::fs::create_dir_all(path)?;

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        // Tuning from config
        db_opts.set_write_buffer_size(config.rocksdb.write_buffer_size_mb * 1024 * 1024);
        db_opts.set_max_write_buffer_number(config.rocksdb.max_write_buffer_number);
        db_opts.set_max_background_jobs(config.rocksdb.max_background_jobs);

        if config.rocksdb.enable_statistics {
            db_opts.enable_statistics();
        }

        let cf_descriptors = vec![
            ColumnFamilyDescriptor::new(CF_ENTRIES, Self::cf_options_rows()),
            ColumnFamilyDescriptor::new(CF_ENTITY_IDX, Self::cf_options_indices()),
            ColumnFamilyDescriptor::new(CF_REFERENCE_IDX, Self::cf_options_indices()),
            ColumnFamilyDescriptor::new(CF_GROUP_IDX, Self::cf_options_indices()),
            ColumnFamilyDescriptor::new(CF_MATURITY, Self::cf_options_indices()),
            ColumnFamilyDescriptor::new(CF_RULES, Self::cf_options_rows()),
            ColumnFamilyDescriptor::new(CF_RECURRING_LOG, Self::cf_options_rows()),
        ];

        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        let storage = Self {
            db: Arc::new(db),
            next_entry_id: AtomicU64::new(1),
            next_rule_id: AtomicU64::new(1),
        };

        // Seed id counters from the highest persisted keys
        storage
            .next_entry_id
            .store(storage.last_u64_key(CF_ENTRIES)? + 1, Ordering::SeqCst);
        storage
            .next_rule_id
            .store(storage.last_u64_key(CF_RULES)? + 1, Ordering::SeqCst);

        tracing::info!(
            path = %path.display(),
            next_entry_id = storage.next_entry_id.load(Ordering::SeqCst),
            "Opened ledger storage"
        );

        Ok(storage)
    }

    // Column family options

    fn cf_options_rows() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Zstd);
        opts.set_bottommost_compression_type(rocksdb::DBCompressionType::Zstd);
        opts
    }

    fn cf_options_indices() -> Options {
        let mut opts = Options::default();
        // Indices are read-heavy, use LZ4 for speed
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        let mut block_opts = rocksdb::BlockBasedOptions::default();
        block_opts.set_bloom_filter(10.0, false);
        opts.set_block_based_table_factory(&block_opts);
        opts
    }

    fn cf_handle(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| Error::Storage(format!("Column family {} not found", name)))
    }

    fn last_u64_key(&self, cf_name: &str) -> Result<u64> {
        let cf = self.cf_handle(cf_name)?;
        let mut iter = self.db.iterator_cf(cf, IteratorMode::End);
        if let Some(item) = iter.next() {
            let (key, _) = item?;
            if key.len() == 8 {
                let bytes: [u8; 8] = key[..8].try_into().expect("length checked");
                return Ok(u64::from_be_bytes(bytes));
            }
        }
        Ok(0)
    }

    // Double-entry append

    /// Persist the two legs of one transaction atomically, assigning row
    /// ids. Either both rows and all their index keys land, or none do.
    pub fn append_transaction(
        &self,
        mut debit: LedgerEntry,
        mut credit: LedgerEntry,
    ) -> Result<(LedgerEntry, LedgerEntry)> {
        debit.id = self.next_entry_id.fetch_add(2, Ordering::SeqCst);
        credit.id = debit.id + 1;

        let mut batch = WriteBatch::default();
        self.batch_put_entry(&mut batch, &debit)?;
        self.batch_put_entry(&mut batch, &credit)?;

        self.db
            .write(batch)
            .map_err(|e| Error::LedgerWrite(e.to_string()))?;

        tracing::debug!(
            group_id = %debit.group_id,
            debit_id = debit.id,
            credit_id = credit.id,
            impact = %debit.impact,
            "Transaction appended"
        );

        Ok((debit, credit))
    }

    fn batch_put_entry(&self, batch: &mut WriteBatch, entry: &LedgerEntry) -> Result<()> {
        let cf_entries = self.cf_handle(CF_ENTRIES)?;
        let cf_entity = self.cf_handle(CF_ENTITY_IDX)?;
        let cf_reference = self.cf_handle(CF_REFERENCE_IDX)?;
        let cf_group = self.cf_handle(CF_GROUP_IDX)?;

        let value = bincode::serialize(entry)?;
        batch.put_cf(cf_entries, entry.id.to_be_bytes(), &value);

        batch.put_cf(
            cf_entity,
            Self::index_key_entity(entry.entity_type, entry.entity_id, entry.id),
            [],
        );
        batch.put_cf(
            cf_reference,
            Self::index_key_reference(entry.reference, entry.id),
            [],
        );
        batch.put_cf(cf_group, Self::index_key_group(&entry.group_id, entry.id), []);

        Ok(())
    }

    // Entry reads

    /// Get entry by id
    pub fn get_entry(&self, entry_id: u64) -> Result<LedgerEntry> {
        let cf = self.cf_handle(CF_ENTRIES)?;
        let value = self
            .db
            .get_cf(cf, entry_id.to_be_bytes())?
            .ok_or(Error::EntryNotFound(entry_id))?;
        Ok(bincode::deserialize(&value)?)
    }

    /// All entries for one entity, in id order
    pub fn entries_for_entity(
        &self,
        entity_type: EntityType,
        entity_id: u64,
    ) -> Result<Vec<LedgerEntry>> {
        let mut prefix = Vec::with_capacity(9);
        prefix.push(entity_type.tag());
        prefix.extend_from_slice(&entity_id.to_be_bytes());
        self.scan_index(CF_ENTITY_IDX, &prefix)
    }

    /// All entries for every entity of one type, in id order
    pub fn entries_for_entity_type(&self, entity_type: EntityType) -> Result<Vec<LedgerEntry>> {
        self.scan_index(CF_ENTITY_IDX, &[entity_type.tag()])
    }

    /// All entries tied to one business reference
    pub fn entries_for_reference(&self, reference: Reference) -> Result<Vec<LedgerEntry>> {
        let mut prefix = Vec::with_capacity(9);
        prefix.push(reference.kind.tag());
        prefix.extend_from_slice(&reference.id.to_be_bytes());
        self.scan_index(CF_REFERENCE_IDX, &prefix)
    }

    /// The (normally two) entries sharing one group id
    pub fn entries_for_group(&self, group_id: &Uuid) -> Result<Vec<LedgerEntry>> {
        self.scan_index(CF_GROUP_IDX, group_id.as_bytes())
    }

    fn scan_index(&self, cf_name: &str, prefix: &[u8]) -> Result<Vec<LedgerEntry>> {
        let cf = self.cf_handle(cf_name)?;
        let iter = self
            .db
            .iterator_cf(cf, IteratorMode::From(prefix, Direction::Forward));

        let mut entries = Vec::new();
        for item in iter {
            let (key, _) = item?;
            if !key.starts_with(prefix) {
                break;
            }
            // Entry id is the trailing 8 bytes of every index key
            if key.len() >= prefix.len() + 8 {
                let id_bytes: [u8; 8] = key[key.len() - 8..].try_into().expect("length checked");
                entries.push(self.get_entry(u64::from_be_bytes(id_bytes))?);
            }
        }
        Ok(entries)
    }

    // Maturity overrides

    /// Override the unlock timestamp for every entry of `reference` still
    /// under `OrderHold`. The rows themselves are never rewritten; readers
    /// resolve the override at query time. Re-applying simply overwrites.
    pub fn apply_maturity_override(
        &self,
        reference: Reference,
        unlock_at: DateTime<Utc>,
    ) -> Result<usize> {
        let cf = self.cf_handle(CF_MATURITY)?;
        let value = bincode::serialize(&unlock_at)?;

        let mut batch = WriteBatch::default();
        let mut updated = 0usize;
        for entry in self.entries_for_reference(reference)? {
            if entry.lock_type == LockType::OrderHold {
                batch.put_cf(cf, entry.id.to_be_bytes(), &value);
                updated += 1;
            }
        }

        if updated > 0 {
            self.db
                .write(batch)
                .map_err(|e| Error::LedgerWrite(e.to_string()))?;
        }

        Ok(updated)
    }

    /// Unlock override for one entry, if any
    pub fn unlock_override(&self, entry_id: u64) -> Result<Option<DateTime<Utc>>> {
        let cf = self.cf_handle(CF_MATURITY)?;
        match self.db.get_cf(cf, entry_id.to_be_bytes())? {
            Some(value) => Ok(Some(bincode::deserialize(&value)?)),
            None => Ok(None),
        }
    }

    /// Effective unlock timestamp: override wins over the stored column
    pub fn effective_unlock_at(&self, entry: &LedgerEntry) -> Result<Option<DateTime<Utc>>> {
        Ok(self.unlock_override(entry.id)?.or(entry.unlock_at))
    }

    // Charge rules

    /// Insert or update a rule, assigning an id when unset. Rules are
    /// never deleted, only toggled inactive.
    pub fn save_rule(&self, mut rule: ChargeRule) -> Result<u64> {
        if rule.id == 0 {
            rule.id = self.next_rule_id.fetch_add(1, Ordering::SeqCst);
        }
        let cf = self.cf_handle(CF_RULES)?;
        let value = bincode::serialize(&rule)?;
        self.db.put_cf(cf, rule.id.to_be_bytes(), &value)?;

        tracing::info!(rule_id = rule.id, name = %rule.name, "Charge rule saved");
        Ok(rule.id)
    }

    /// Get one rule
    pub fn get_rule(&self, rule_id: u64) -> Result<ChargeRule> {
        let cf = self.cf_handle(CF_RULES)?;
        let value = self
            .db
            .get_cf(cf, rule_id.to_be_bytes())?
            .ok_or(Error::RuleNotFound(rule_id))?;
        Ok(bincode::deserialize(&value)?)
    }

    /// Toggle a rule's active flag
    pub fn set_rule_active(&self, rule_id: u64, active: bool) -> Result<()> {
        let mut rule = self.get_rule(rule_id)?;
        rule.active = active;
        rule.updated_at = Utc::now();

        let cf = self.cf_handle(CF_RULES)?;
        let value = bincode::serialize(&rule)?;
        self.db.put_cf(cf, rule.id.to_be_bytes(), &value)?;

        tracing::info!(rule_id, active, "Charge rule toggled");
        Ok(())
    }

    /// All rules, active and inactive, in id order
    pub fn rules(&self) -> Result<Vec<ChargeRule>> {
        let cf = self.cf_handle(CF_RULES)?;
        let iter = self.db.iterator_cf(cf, IteratorMode::Start);

        let mut rules = Vec::new();
        for item in iter {
            let (_, value) = item?;
            rules.push(bincode::deserialize(&value)?);
        }
        Ok(rules)
    }

    // Recurring charge log

    /// Dedup-insert for recurring billing: returns true when this
    /// (rule, entity, period) had not been charged yet and is now claimed.
    /// Callers must route through the single-writer actor, which makes the
    /// check-then-insert atomic.
    pub fn try_insert_recurring(
        &self,
        rule_id: u64,
        entity_id: u64,
        period: &str,
        charged_at: DateTime<Utc>,
    ) -> Result<bool> {
        let cf = self.cf_handle(CF_RECURRING_LOG)?;
        let key = Self::recurring_key(rule_id, entity_id, period);

        if self.db.get_cf(cf, &key)?.is_some() {
            return Ok(false);
        }

        let value = bincode::serialize(&charged_at)?;
        self.db.put_cf(cf, &key, &value)?;
        Ok(true)
    }

    /// Whether a (rule, entity, period) was already charged
    pub fn recurring_charged(&self, rule_id: u64, entity_id: u64, period: &str) -> Result<bool> {
        let cf = self.cf_handle(CF_RECURRING_LOG)?;
        let key = Self::recurring_key(rule_id, entity_id, period);
        Ok(self.db.get_cf(cf, &key)?.is_some())
    }

    // Index key helpers

    fn index_key_entity(entity_type: EntityType, entity_id: u64, entry_id: u64) -> Vec<u8> {
        let mut key = Vec::with_capacity(17);
        key.push(entity_type.tag());
        key.extend_from_slice(&entity_id.to_be_bytes());
        key.extend_from_slice(&entry_id.to_be_bytes());
        key
    }

    fn index_key_reference(reference: Reference, entry_id: u64) -> Vec<u8> {
        let mut key = Vec::with_capacity(17);
        key.push(reference.kind.tag());
        key.extend_from_slice(&reference.id.to_be_bytes());
        key.extend_from_slice(&entry_id.to_be_bytes());
        key
    }

    fn index_key_group(group_id: &Uuid, entry_id: u64) -> Vec<u8> {
        let mut key = Vec::with_capacity(24);
        key.extend_from_slice(group_id.as_bytes());
        key.extend_from_slice(&entry_id.to_be_bytes());
        key
    }

    fn recurring_key(rule_id: u64, entity_id: u64, period: &str) -> Vec<u8> {
        let mut key = Vec::with_capacity(16 + period.len());
        key.extend_from_slice(&rule_id.to_be_bytes());
        key.extend_from_slice(&entity_id.to_be_bytes());
        key.extend_from_slice(period.as_bytes());
        key
    }

    // Statistics

    /// Approximate entry count (fast, estimate)
    pub fn approximate_entry_count(&self) -> Result<u64> {
        let cf = self.cf_handle(CF_ENTRIES)?;
        let prop = self
            .db
            .property_int_value_cf(cf, "rocksdb.estimate-num-keys")?
            .unwrap_or(0);
        Ok(prop)
    }

    // Administrative reset

    /// Irreversibly clear every column family and restart id assignment.
    /// Gating (arming flag + confirmation phrase) lives in `Ledger::reset`;
    /// this is the raw destructive step.
    pub(crate) fn wipe_all(&self) -> Result<()> {
        for cf_name in [
            CF_ENTRIES,
            CF_ENTITY_IDX,
            CF_REFERENCE_IDX,
            CF_GROUP_IDX,
            CF_MATURITY,
            CF_RULES,
            CF_RECURRING_LOG,
        ] {
            let cf = self.cf_handle(cf_name)?;
            let mut batch = WriteBatch::default();
            let iter = self.db.iterator_cf(cf, IteratorMode::Start);
            for item in iter {
                let (key, _) = item?;
                batch.delete_cf(cf, key);
            }
            self.db.write(batch)?;
        }

        self.next_entry_id.store(1, Ordering::SeqCst);
        self.next_rule_id.store(1, Ordering::SeqCst);

        tracing::warn!("Ledger storage wiped by administrative reset");
        Ok(())
    }
}
