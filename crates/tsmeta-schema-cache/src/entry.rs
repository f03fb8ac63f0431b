//! Cached projection of one measurement.

use parking_lot::RwLock;
use tsmeta_common::{MeasurementSchema, PartialPath, SchemaEntry, StringMap, TimeValuePair};

/// Space reserved in an entry's weight for its last value, which can
/// change after the entry was weighed
const LAST_VALUE_RESERVE: usize = 64;

#[derive(Debug, Default)]
struct LastValue {
    value: Option<TimeValuePair>,
    highest_flushed_time: Option<i64>,
}

/// Schema of a measurement plus its most recent observed value
#[derive(Debug)]
pub struct SchemaCacheEntry {
    storage_group: PartialPath,
    schema: MeasurementSchema,
    tags: Option<StringMap>,
    aligned: bool,
    last: RwLock<LastValue>,
}

impl SchemaCacheEntry {
    #[must_use]
    pub fn new(
        storage_group: PartialPath,
        schema: MeasurementSchema,
        tags: Option<StringMap>,
        aligned: bool,
    ) -> Self {
        Self {
            storage_group,
            schema,
            tags,
            aligned,
            last: RwLock::new(LastValue::default()),
        }
    }

    #[must_use]
    pub const fn storage_group(&self) -> &PartialPath {
        &self.storage_group
    }

    #[must_use]
    pub const fn schema(&self) -> &MeasurementSchema {
        &self.schema
    }

    #[must_use]
    pub const fn tags(&self) -> Option<&StringMap> {
        self.tags.as_ref()
    }

    #[must_use]
    pub const fn is_aligned(&self) -> bool {
        self.aligned
    }

    #[must_use]
    pub fn last_value(&self) -> Option<TimeValuePair> {
        self.last.read().value.clone()
    }

    #[must_use]
    pub fn highest_flushed_time(&self) -> Option<i64> {
        self.last.read().highest_flushed_time
    }

    /// Offer a new last value. It replaces the current one when there is
    /// none, when it is strictly newer, or when `high_priority` is set.
    /// `latest_flushed_time` is only recorded, never consulted.
    /// Returns whether the value was taken.
    pub fn update_last_value(
        &self,
        pair: TimeValuePair,
        high_priority: bool,
        latest_flushed_time: Option<i64>,
    ) -> bool {
        let mut last = self.last.write();
        if let Some(flushed) = latest_flushed_time {
            last.highest_flushed_time = Some(
                last.highest_flushed_time
                    .map_or(flushed, |current| current.max(flushed)),
            );
        }
        let newer = last
            .value
            .as_ref()
            .is_none_or(|current| pair.timestamp > current.timestamp);
        if newer || high_priority {
            last.value = Some(pair);
            return true;
        }
        false
    }

    pub fn reset_last_value(&self) {
        *self.last.write() = LastValue::default();
    }

    /// Rough in-memory footprint used as the cache weight
    #[must_use]
    pub fn estimated_size(&self) -> usize {
        64 + self.storage_group.estimated_size()
            + self.schema.estimated_size()
            + self.tags.as_ref().map_or(0, tsmeta_common::estimate_map_size)
            + LAST_VALUE_RESERVE
    }

    /// Project a resolved store entry into the cache representation
    #[must_use]
    pub fn to_schema_entry(&self, path: PartialPath) -> SchemaEntry {
        SchemaEntry {
            path,
            schema: self.schema.clone(),
            alias: None,
            tags: self.tags.clone(),
            aligned: self.aligned,
            storage_group: self.storage_group.clone(),
        }
    }
}

impl From<&SchemaEntry> for SchemaCacheEntry {
    fn from(entry: &SchemaEntry) -> Self {
        Self::new(
            entry.storage_group.clone(),
            entry.schema.clone(),
            entry.tags.clone(),
            entry.aligned,
        )
    }
}
