//! Weighted schema cache.
//!
//! Entries are keyed by canonical measurement path and weighed by their
//! estimated footprint; moka evicts by its TinyLFU policy once the summed
//! weight passes the configured ceiling.
//!
//! A readers-writer lock splits operations in two classes. Point lookups,
//! `compute`, `put`, point invalidation and last-value updates share the
//! read side and run concurrently. Pattern invalidation and `clean_up`
//! take the write side, so no lookup observes a half-applied bulk
//! invalidation. parking_lot's lock is task-fair: a waiting writer holds
//! back new readers.

use crate::computation::SchemaComputation;
use crate::entry::SchemaCacheEntry;
use crate::stats::CacheStats;
use moka::notification::RemovalCause;
use moka::sync::Cache;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, info};
use tsmeta_common::path::MULTI_LEVEL_WILDCARD;
use tsmeta_common::{PartialPath, SchemaCacheConfig, SchemaEntry, SchemaTree, TimeValuePair};

pub struct SchemaCache {
    cache: Cache<PartialPath, Arc<SchemaCacheEntry>>,
    lock: RwLock<()>,
    stats: Arc<CacheStats>,
    max_weight: u64,
}

impl SchemaCache {
    #[must_use]
    pub fn new(config: &SchemaCacheConfig) -> Self {
        let stats = Arc::new(CacheStats::default());
        let listener_stats = Arc::clone(&stats);
        let cache = Cache::builder()
            .max_capacity(config.max_weight_bytes)
            .weigher(|path: &PartialPath, entry: &Arc<SchemaCacheEntry>| -> u32 {
                u32::try_from(path.estimated_size() + entry.estimated_size()).unwrap_or(u32::MAX)
            })
            .eviction_listener(move |_path, _entry, cause| {
                if cause == RemovalCause::Size {
                    listener_stats.record_eviction();
                }
            })
            .build();

        info!(max_weight = config.max_weight_bytes, "Schema cache created");
        Self {
            cache,
            lock: RwLock::new(()),
            stats,
            max_weight: config.max_weight_bytes,
        }
    }

    fn get_recorded(&self, path: &PartialPath) -> Option<Arc<SchemaCacheEntry>> {
        let entry = self.cache.get(path);
        if entry.is_some() {
            self.stats.record_hit();
        } else {
            self.stats.record_miss();
        }
        entry
    }

    /// Cached schema of `measurements` under `device`. Misses are left
    /// out of the returned tree.
    pub fn lookup(&self, device: &PartialPath, measurements: &[String]) -> SchemaTree {
        let _read = self.lock.read();
        let mut tree = SchemaTree::new();
        for name in measurements {
            let Ok(path) = device.concat_node(name) else {
                continue;
            };
            if let Some(entry) = self.get_recorded(&path) {
                let canonical = device.child_unchecked(&entry.schema().name);
                tree.append_measurement(entry.to_schema_entry(canonical));
            }
        }
        tree
    }

    /// Cached schema of a single measurement path
    pub fn lookup_single(&self, path: &PartialPath) -> SchemaTree {
        let _read = self.lock.read();
        let mut tree = SchemaTree::new();
        if let Some(entry) = self.get_recorded(path) {
            tree.append_measurement(entry.to_schema_entry(path.clone()));
        }
        tree
    }

    /// Feed every cached measurement of the batch into `computation` and
    /// return the indexes of the misses, in order.
    pub fn compute<C: SchemaComputation>(
        &self,
        device: &PartialPath,
        measurements: &[String],
        computation: &mut C,
    ) -> Vec<usize> {
        let _read = self.lock.read();
        let mut missing = Vec::new();
        let mut first_hit = true;
        for (index, name) in measurements.iter().enumerate() {
            let entry = device
                .concat_node(name)
                .ok()
                .and_then(|path| self.get_recorded(&path));
            let Some(entry) = entry else {
                missing.push(index);
                continue;
            };
            if first_hit {
                computation.compute_device(entry.is_aligned());
                first_hit = false;
            }
            computation.compute_measurement(index, name, entry.schema());
        }
        missing
    }

    /// Insert or overwrite an entry for every measurement in `tree`
    pub fn put(&self, tree: SchemaTree) {
        let _read = self.lock.read();
        let mut count = 0usize;
        for entry in tree {
            let cached = Arc::new(SchemaCacheEntry::from(&entry));
            self.cache.insert(entry.path, cached);
            count += 1;
        }
        // Apply pending evictions so the weight bound holds on return
        self.cache.run_pending_tasks();
        debug!(count, "Schema entries cached");
    }

    pub fn get_last_value(&self, path: &PartialPath) -> Option<TimeValuePair> {
        let _read = self.lock.read();
        self.get_recorded(path)?.last_value()
    }

    /// Offer a last value to an existing entry. Returns false when the
    /// path is not cached, in which case nothing happens.
    pub fn update_last_value(
        &self,
        path: &PartialPath,
        pair: TimeValuePair,
        high_priority: bool,
        latest_flushed_time: Option<i64>,
    ) -> bool {
        let _read = self.lock.read();
        match self.cache.get(path) {
            Some(entry) => {
                entry.update_last_value(pair, high_priority, latest_flushed_time);
                true
            }
            None => false,
        }
    }

    /// Offer a last value, creating the entry from `schema` first if the
    /// path is not cached. Concurrent creators of the same path share
    /// one entry.
    pub fn update_last_value_or_create(
        &self,
        schema: &SchemaEntry,
        pair: TimeValuePair,
        high_priority: bool,
        latest_flushed_time: Option<i64>,
    ) {
        let _read = self.lock.read();
        let entry = self
            .cache
            .get_with_by_ref(&schema.path, || Arc::new(SchemaCacheEntry::from(schema)));
        entry.update_last_value(pair, high_priority, latest_flushed_time);
    }

    pub fn reset_last_value(&self, path: &PartialPath) {
        let _read = self.lock.read();
        if let Some(entry) = self.cache.get(path) {
            entry.reset_last_value();
        }
    }

    /// Drop one entry
    pub fn invalidate(&self, path: &PartialPath) {
        let _read = self.lock.read();
        if let Some(entry) = self.cache.get(path) {
            entry.reset_last_value();
        }
        self.cache.invalidate(path);
    }

    /// Drop every entry whose path `pattern` matches. Scans the whole
    /// cache; returns the number of entries dropped.
    pub fn invalidate_matching(&self, pattern: &PartialPath) -> usize {
        let _write = self.lock.write();
        let mut dropped = 0;
        for (path, entry) in self.cache.iter() {
            if pattern.matches(&path) {
                entry.reset_last_value();
                self.cache.invalidate(path.as_ref());
                dropped += 1;
            }
        }
        debug!(pattern = %pattern, dropped, "Schema entries invalidated");
        dropped
    }

    /// Drop every entry below a storage group
    pub fn invalidate_storage_group(&self, storage_group: &PartialPath) -> usize {
        self.invalidate_matching(&storage_group.child_unchecked(MULTI_LEVEL_WILDCARD))
    }

    /// Number of cached entries once pending maintenance is applied
    pub fn estimated_entry_count(&self) -> u64 {
        self.cache.run_pending_tasks();
        self.cache.entry_count()
    }

    /// Summed weight of cached entries once pending maintenance is applied
    pub fn weighted_size(&self) -> u64 {
        self.cache.run_pending_tasks();
        self.cache.weighted_size()
    }

    #[must_use]
    pub const fn max_weight(&self) -> u64 {
        self.max_weight
    }

    #[must_use]
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// Hit rate of lookups so far, 0 to 100
    #[must_use]
    pub fn hit_rate_percent(&self) -> f64 {
        self.stats.hit_ratio() * 100.0
    }

    /// Remove every entry
    pub fn clean_up(&self) {
        let _write = self.lock.write();
        self.cache.invalidate_all();
        self.cache.run_pending_tasks();
        info!("Schema cache cleared");
    }
}
