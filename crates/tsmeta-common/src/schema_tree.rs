//! Partial schema tree
//!
//! The unit of exchange between the metadata store, the schema cache and
//! their callers: a set of resolved measurements together with the
//! storage groups they belong to.

use crate::path::PartialPath;
use crate::types::{MeasurementSchema, StringMap};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// One resolved measurement
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaEntry {
    /// Canonical full path of the measurement
    pub path: PartialPath,
    pub schema: MeasurementSchema,
    pub alias: Option<String>,
    pub tags: Option<StringMap>,
    /// Whether the owning device is aligned
    pub aligned: bool,
    /// Owning storage group
    pub storage_group: PartialPath,
}

impl SchemaEntry {
    /// Path of the owning device
    #[must_use]
    pub fn device_path(&self) -> PartialPath {
        self.path.parent().unwrap_or_else(PartialPath::root)
    }
}

/// Set of measurements keyed by canonical path
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SchemaTree {
    measurements: BTreeMap<PartialPath, SchemaEntry>,
    storage_groups: BTreeSet<PartialPath>,
}

impl SchemaTree {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace one measurement
    pub fn append_measurement(&mut self, entry: SchemaEntry) {
        self.storage_groups.insert(entry.storage_group.clone());
        self.measurements.insert(entry.path.clone(), entry);
    }

    #[must_use]
    pub fn get(&self, path: &PartialPath) -> Option<&SchemaEntry> {
        self.measurements.get(path)
    }

    #[must_use]
    pub fn contains(&self, path: &PartialPath) -> bool {
        self.measurements.contains_key(path)
    }

    /// All measurements in path order
    pub fn measurements(&self) -> impl Iterator<Item = &SchemaEntry> {
        self.measurements.values()
    }

    /// Storage groups referenced by the contained measurements
    #[must_use]
    pub const fn storage_groups(&self) -> &BTreeSet<PartialPath> {
        &self.storage_groups
    }

    /// Storage group a contained measurement belongs to
    #[must_use]
    pub fn storage_group_of(&self, path: &PartialPath) -> Option<&PartialPath> {
        self.measurements.get(path).map(|e| &e.storage_group)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.measurements.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.measurements.is_empty()
    }

    /// Merge another tree into this one
    pub fn merge(&mut self, other: Self) {
        for entry in other.measurements.into_values() {
            self.append_measurement(entry);
        }
    }
}

impl IntoIterator for SchemaTree {
    type Item = SchemaEntry;
    type IntoIter = std::collections::btree_map::IntoValues<PartialPath, SchemaEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.measurements.into_values()
    }
}
