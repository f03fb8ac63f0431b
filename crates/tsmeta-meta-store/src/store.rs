//! Persistent schema namespace backed by redb.
//!
//! Every mutation runs in a single write transaction while holding the
//! lock domain of the top-level segment it touches; a failed check drops
//! the transaction, so no operation is ever partially applied. Reads use
//! a snapshot and never take a domain lock.

use crate::keys::{self, MAX_DEPTH};
use crate::lock::LockDomains;
use crate::tables::{ALIASES, NODES, STORAGE_GROUPS};
use crate::traverse;
use crate::types::{MeasurementRecord, NodeRecord};
use parking_lot::RwLock;
use redb::{Database, ReadOnlyTable, ReadTransaction, ReadableTable, Table, WriteTransaction};
use std::collections::BTreeSet;
use tracing::{debug, info, warn};
use tsmeta_common::path::ROOT;
use tsmeta_common::{
    Compression, DataType, Encoding, Error, MeasurementSchema, MetaStoreConfig, PartialPath,
    PathError, PatternCursor, Result, SchemaEntry, SchemaTree, StringMap,
};

/// Error type for metadata store operations
#[derive(Debug, thiserror::Error)]
pub enum MetaStoreError {
    #[error(transparent)]
    Schema(#[from] Error),
    #[error("redb error: {0}")]
    Redb(#[from] redb::DatabaseError),
    #[error("redb storage error: {0}")]
    Storage(#[from] redb::StorageError),
    #[error("redb table error: {0}")]
    Table(#[from] redb::TableError),
    #[error("redb transaction error: {0}")]
    Transaction(Box<redb::TransactionError>),
    #[error("redb commit error: {0}")]
    Commit(#[from] redb::CommitError),
    #[error("bincode error: {0}")]
    Bincode(#[from] bincode::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<redb::TransactionError> for MetaStoreError {
    fn from(e: redb::TransactionError) -> Self {
        Self::Transaction(Box::new(e))
    }
}

impl From<PathError> for MetaStoreError {
    fn from(e: PathError) -> Self {
        Self::Schema(e.into())
    }
}

impl From<MetaStoreError> for Error {
    fn from(e: MetaStoreError) -> Self {
        match e {
            MetaStoreError::Schema(e) => e,
            MetaStoreError::Bincode(e) => Self::Serialization(e.to_string()),
            other => Self::Storage(other.to_string()),
        }
    }
}

pub type MetaStoreResult<T> = std::result::Result<T, MetaStoreError>;

/// Resolved measurement as returned by [`MetadataStore::get_measurement`]
pub type MeasurementNode = SchemaEntry;

/// How aggregate queries treat the pattern's concrete prefix
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PatternScope {
    /// Match against the raw tree
    #[default]
    Loose,
    /// The concrete prefix must lie in, or contain, a storage group;
    /// only nodes inside storage groups are considered.
    StorageGroupBounded,
}

fn check_depth(path: &PartialPath) -> Result<()> {
    if path.depth() > MAX_DEPTH {
        return Err(Error::invalid_argument(format!(
            "path deeper than {MAX_DEPTH} levels: {path}"
        )));
    }
    Ok(())
}

fn check_alias(device: &PartialPath, alias: &str) -> Result<()> {
    device.concat_node(alias)?.ensure_concrete()?;
    Ok(())
}

fn alias_conflict(device: &PartialPath, alias: &str) -> MetaStoreError {
    Error::AliasConflict {
        device: device.to_string(),
        alias: alias.to_string(),
    }
    .into()
}

const fn alignment_label(aligned: bool) -> &'static str {
    if aligned { "aligned" } else { "non-aligned" }
}

fn alias_target<A>(aliases: &A, device: &PartialPath, alias: &str) -> MetaStoreResult<Option<String>>
where
    A: ReadableTable<&'static str, &'static str>,
{
    let key = keys::alias_key(device, alias);
    Ok(aliases.get(key.as_str())?.map(|v| v.value().to_string()))
}

/// Tables of one read snapshot
struct Reader {
    nodes: ReadOnlyTable<&'static str, &'static [u8]>,
    aliases: ReadOnlyTable<&'static str, &'static str>,
    groups: ReadOnlyTable<&'static str, ()>,
}

impl Reader {
    fn open(txn: &ReadTransaction) -> MetaStoreResult<Self> {
        Ok(Self {
            nodes: txn.open_table(NODES)?,
            aliases: txn.open_table(ALIASES)?,
            groups: txn.open_table(STORAGE_GROUPS)?,
        })
    }

    /// Resolve a canonical or alias-qualified path to its measurement
    fn resolve(&self, path: &PartialPath) -> MetaStoreResult<Option<SchemaEntry>> {
        let Some(device) = path.parent() else {
            return Ok(None);
        };
        let (canonical, record) = match traverse::load_node(&self.nodes, path)? {
            Some(NodeRecord::Measurement(record)) => (path.clone(), record),
            Some(_) => return Ok(None),
            None => {
                let Some(target) = alias_target(&self.aliases, &device, path.last())? else {
                    return Ok(None);
                };
                let canonical = PartialPath::parse(&target)?;
                match traverse::load_node(&self.nodes, &canonical)? {
                    Some(NodeRecord::Measurement(record)) => (canonical, record),
                    _ => return Ok(None),
                }
            }
        };
        self.entry(canonical, record).map(Some)
    }

    fn entry(&self, path: PartialPath, record: MeasurementRecord) -> MetaStoreResult<SchemaEntry> {
        let device = path.parent().unwrap_or_else(PartialPath::root);
        let aligned = matches!(
            traverse::load_node(&self.nodes, &device)?,
            Some(NodeRecord::Device { aligned: true })
        );
        let storage_group = traverse::storage_group_of(&self.groups, &path)?
            .ok_or_else(|| Error::NoStorageGroup(path.to_string()))?;
        Ok(SchemaEntry {
            path,
            schema: record.schema,
            alias: record.alias,
            tags: record.tags,
            aligned,
            storage_group,
        })
    }

    fn check_scope(&self, pattern: &PartialPath, scope: PatternScope) -> MetaStoreResult<()> {
        if scope == PatternScope::Loose {
            return Ok(());
        }
        let prefix = pattern.concrete_prefix();
        if traverse::storage_group_of(&self.groups, &prefix)?.is_some()
            || traverse::has_storage_group_below(&self.groups, &prefix)?
        {
            return Ok(());
        }
        Err(Error::not_found(format!("no storage group covers {pattern}")).into())
    }
}

/// Tables of one write transaction
struct Writer<'txn> {
    nodes: Table<'txn, &'static str, &'static [u8]>,
    aliases: Table<'txn, &'static str, &'static str>,
    groups: Table<'txn, &'static str, ()>,
}

impl<'txn> Writer<'txn> {
    fn open(txn: &'txn WriteTransaction) -> MetaStoreResult<Self> {
        Ok(Self {
            nodes: txn.open_table(NODES)?,
            aliases: txn.open_table(ALIASES)?,
            groups: txn.open_table(STORAGE_GROUPS)?,
        })
    }

    fn node(&self, path: &PartialPath) -> MetaStoreResult<Option<NodeRecord>> {
        traverse::load_node(&self.nodes, path)
    }

    fn put_node(&mut self, path: &PartialPath, record: &NodeRecord) -> MetaStoreResult<()> {
        let bytes = record.encode()?;
        self.nodes
            .insert(keys::node_key(path).as_str(), bytes.as_slice())?;
        Ok(())
    }

    fn remove_node(&mut self, path: &PartialPath) -> MetaStoreResult<()> {
        self.nodes.remove(keys::node_key(path).as_str())?;
        Ok(())
    }

    fn declare_storage_group(&mut self, path: &PartialPath, ttl: Option<u64>) -> MetaStoreResult<()> {
        for ancestor in path.ancestors().skip(1) {
            match self.node(&ancestor)? {
                None | Some(NodeRecord::Internal) => {}
                Some(NodeRecord::StorageGroup { .. }) => {
                    return Err(Error::conflict(format!(
                        "{ancestor} is already a storage group, cannot declare {path}"
                    ))
                    .into());
                }
                Some(record) => {
                    return Err(Error::conflict(format!(
                        "{ancestor} is a {} node, cannot declare {path}",
                        record.kind()
                    ))
                    .into());
                }
            }
        }
        match self.node(path)? {
            None | Some(NodeRecord::Internal) => {}
            Some(NodeRecord::StorageGroup { .. }) => {
                return Err(Error::conflict(format!("storage group {path} already exists")).into());
            }
            Some(record) => {
                return Err(Error::conflict(format!(
                    "{path} already exists as a {} node",
                    record.kind()
                ))
                .into());
            }
        }
        if traverse::has_storage_group_below(&self.groups, path)? {
            return Err(Error::conflict(format!(
                "{path} already has a storage group below it"
            ))
            .into());
        }

        self.ensure_ancestors(path, 1)?;
        self.put_node(path, &NodeRecord::StorageGroup { ttl })?;
        self.groups.insert(path.to_string().as_str(), ())?;
        Ok(())
    }

    /// Create missing proper ancestors of `path` longer than `skip` segments
    fn ensure_ancestors(&mut self, path: &PartialPath, skip: usize) -> MetaStoreResult<()> {
        for ancestor in path.ancestors().skip(skip) {
            match self.node(&ancestor)? {
                None => self.put_node(&ancestor, &NodeRecord::Internal)?,
                Some(NodeRecord::Internal | NodeRecord::Device { .. }) => {}
                Some(record) => {
                    return Err(Error::conflict(format!(
                        "{ancestor} is a {} node and cannot have descendants here",
                        record.kind()
                    ))
                    .into());
                }
            }
        }
        Ok(())
    }

    /// Storage group owning `device`, declared on the fly when the store
    /// is configured with an automatic level
    fn resolve_storage_group(
        &mut self,
        device: &PartialPath,
        config: &MetaStoreConfig,
    ) -> MetaStoreResult<PartialPath> {
        if let Some(sg) = traverse::storage_group_of(&self.groups, device)? {
            if &sg == device {
                return Err(Error::conflict(format!(
                    "storage group {device} cannot hold timeseries directly"
                ))
                .into());
            }
            return Ok(sg);
        }
        let Some(level) = config
            .auto_storage_group_level
            .filter(|&level| level >= 1 && level < device.depth())
        else {
            return Err(Error::NoStorageGroup(device.to_string()).into());
        };
        let sg = device.prefix(level + 1);
        self.declare_storage_group(&sg, config.default_ttl)?;
        info!(storage_group = %sg, "Storage group declared implicitly");
        Ok(sg)
    }

    /// Make `device` a device node of the requested alignment, creating
    /// intermediate nodes below `sg` as needed
    fn prepare_device(
        &mut self,
        sg: &PartialPath,
        device: &PartialPath,
        aligned: bool,
    ) -> MetaStoreResult<()> {
        self.ensure_ancestors(device, sg.len())?;
        match self.node(device)? {
            None | Some(NodeRecord::Internal) => {
                self.put_node(device, &NodeRecord::Device { aligned })
            }
            Some(NodeRecord::Device { aligned: existing }) if existing == aligned => Ok(()),
            Some(NodeRecord::Device { aligned: existing }) => Err(Error::AlignmentConflict(
                format!(
                    "device {device} is {} and cannot take {} timeseries",
                    alignment_label(existing),
                    alignment_label(aligned)
                ),
            )
            .into()),
            Some(record) => Err(Error::conflict(format!(
                "{device} is a {} node and cannot hold timeseries",
                record.kind()
            ))
            .into()),
        }
    }

    fn check_leaf_free(&self, device: &PartialPath, name: &str) -> MetaStoreResult<()> {
        let leaf = device.child_unchecked(name);
        if let Some(record) = self.node(&leaf)? {
            let msg = if record.is_measurement() {
                format!("timeseries {leaf} already exists")
            } else {
                format!("{leaf} already exists as a {} node", record.kind())
            };
            return Err(Error::conflict(msg).into());
        }
        if alias_target(&self.aliases, device, name)?.is_some() {
            return Err(alias_conflict(device, name));
        }
        Ok(())
    }

    fn check_alias_free(&self, device: &PartialPath, alias: &str) -> MetaStoreResult<()> {
        if alias_target(&self.aliases, device, alias)?.is_some()
            || self.node(&device.child_unchecked(alias))?.is_some()
        {
            return Err(alias_conflict(device, alias));
        }
        Ok(())
    }

    fn measurement(&self, path: &PartialPath) -> MetaStoreResult<MeasurementRecord> {
        match self.node(path)? {
            Some(NodeRecord::Measurement(record)) => Ok(record),
            _ => Err(Error::not_found(format!("timeseries {path}")).into()),
        }
    }

    /// Remove a storage group and everything below it. Returns false when
    /// `path` is no longer a storage group.
    fn delete_storage_group(&mut self, path: &PartialPath) -> MetaStoreResult<bool> {
        if !matches!(self.node(path)?, Some(NodeRecord::StorageGroup { .. })) {
            return Ok(false);
        }
        for depth in path.depth() + 1..=MAX_DEPTH {
            let doomed = traverse::keys_with_prefix(&self.nodes, &keys::level_prefix(path, depth))?;
            if doomed.is_empty() {
                break;
            }
            for key in &doomed {
                self.nodes.remove(key.as_str())?;
            }
        }
        self.remove_node(path)?;

        let subtree = keys::subtree_prefix(path);
        for key in traverse::keys_with_prefix(&self.aliases, &subtree)? {
            self.aliases.remove(key.as_str())?;
        }
        self.groups.remove(path.to_string().as_str())?;
        self.prune_ancestors(path, &PartialPath::root())?;
        Ok(true)
    }

    /// Delete matched measurements below `start`
    fn delete_measurements(
        &mut self,
        pattern: &PartialPath,
        start: &PartialPath,
    ) -> MetaStoreResult<Vec<PartialPath>> {
        let matched = traverse::collect(&self.nodes, pattern, start, NodeRecord::is_measurement)?;
        let mut devices = BTreeSet::new();
        let mut deleted = Vec::with_capacity(matched.len());
        for (path, record) in matched {
            let (NodeRecord::Measurement(record), Some(device)) = (record, path.parent()) else {
                continue;
            };
            if let Some(alias) = &record.alias {
                self.aliases
                    .remove(keys::alias_key(&device, alias).as_str())?;
            }
            self.remove_node(&path)?;
            devices.insert(device);
            deleted.push(path);
        }
        // Sub-devices sort after their ancestors
        for device in devices.iter().rev() {
            self.retire_device(device)?;
        }
        Ok(deleted)
    }

    /// Demote or remove a device that lost its last measurement
    fn retire_device(&mut self, device: &PartialPath) -> MetaStoreResult<()> {
        if !matches!(self.node(device)?, Some(NodeRecord::Device { .. }))
            || traverse::has_measurement_child(&self.nodes, device)?
        {
            return Ok(());
        }
        if traverse::has_children(&self.nodes, device)? {
            return self.put_node(device, &NodeRecord::Internal);
        }
        self.remove_node(device)?;
        let sg = traverse::storage_group_of(&self.groups, device)?.unwrap_or_else(PartialPath::root);
        self.prune_ancestors(device, &sg)
    }

    /// Remove childless internal ancestors of `path` strictly below `stop`
    fn prune_ancestors(&mut self, path: &PartialPath, stop: &PartialPath) -> MetaStoreResult<()> {
        let mut current = path.parent();
        while let Some(ancestor) = current {
            if ancestor.len() <= stop.len() {
                break;
            }
            match self.node(&ancestor)? {
                Some(NodeRecord::Internal) if !traverse::has_children(&self.nodes, &ancestor)? => {
                    self.remove_node(&ancestor)?;
                    current = ancestor.parent();
                }
                _ => break,
            }
        }
        Ok(())
    }
}

/// Persistent schema namespace.
///
/// Owns the storage-group / device / measurement tree, the alias index
/// and the storage group index. Safe to share across threads.
pub struct MetadataStore {
    db: RwLock<Option<Database>>,
    locks: LockDomains,
    config: MetaStoreConfig,
}

impl MetadataStore {
    /// Open (or create) the schema database described by `config`.
    pub fn open(config: MetaStoreConfig) -> Result<Self> {
        Ok(Self::open_db(config)?)
    }

    fn open_db(config: MetaStoreConfig) -> MetaStoreResult<Self> {
        std::fs::create_dir_all(&config.data_dir)?;
        let path = config.db_path();
        let db = redb::Builder::new()
            .set_cache_size(config.db_cache_bytes)
            .create(&path)?;

        // Create all tables eagerly so later read txns don't fail
        let write_txn = db.begin_write()?;
        {
            let mut nodes = write_txn.open_table(NODES)?;
            let _t = write_txn.open_table(ALIASES)?;
            let _t = write_txn.open_table(STORAGE_GROUPS)?;

            let root_key = keys::node_key(&PartialPath::root());
            let has_root = nodes.get(root_key.as_str())?.is_some();
            if !has_root {
                let bytes = NodeRecord::Internal.encode()?;
                nodes.insert(root_key.as_str(), bytes.as_slice())?;
            }
        }
        write_txn.commit()?;

        info!(path = %path.display(), "Metadata store opened");
        Ok(Self {
            db: RwLock::new(Some(db)),
            locks: LockDomains::new(),
            config,
        })
    }

    /// Release the database. Every later call fails with `Closed`.
    pub fn close(&self) {
        if self.db.write().take().is_some() {
            info!("Metadata store closed");
        }
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.db.read().is_none()
    }

    #[must_use]
    pub const fn config(&self) -> &MetaStoreConfig {
        &self.config
    }

    fn read<T>(&self, f: impl FnOnce(&Reader) -> MetaStoreResult<T>) -> Result<T> {
        let guard = self.db.read();
        let db = guard.as_ref().ok_or(Error::Closed)?;
        let txn = db.begin_read().map_err(MetaStoreError::from)?;
        let reader = Reader::open(&txn)?;
        Ok(f(&reader)?)
    }

    /// Run `f` in a write transaction under the lock domain of `path`
    fn write<T>(
        &self,
        path: &PartialPath,
        f: impl FnOnce(&mut Writer<'_>) -> MetaStoreResult<T>,
    ) -> Result<T> {
        let domain = LockDomains::domain_of(path)
            .ok_or_else(|| Error::invalid_argument(format!("{path} is not below {ROOT}")))?;
        let guard = self.db.read();
        let db = guard.as_ref().ok_or(Error::Closed)?;
        let lock = self.locks.get(domain);
        let _held = lock.lock();
        Ok(Self::commit_with(db, f)?)
    }

    fn commit_with<T>(
        db: &Database,
        f: impl FnOnce(&mut Writer<'_>) -> MetaStoreResult<T>,
    ) -> MetaStoreResult<T> {
        let write_txn = db.begin_write()?;
        let value = {
            let mut writer = Writer::open(&write_txn)?;
            f(&mut writer)?
        };
        write_txn.commit()?;
        Ok(value)
    }

    // ---- Storage groups ----

    /// Declare `path` as a storage group, creating missing ancestors.
    pub fn declare_storage_group(&self, path: &PartialPath) -> Result<()> {
        path.ensure_concrete()?;
        check_depth(path)?;
        if path.is_root() {
            return Err(Error::conflict("root cannot be a storage group"));
        }
        self.write(path, |w| w.declare_storage_group(path, None))?;
        info!(storage_group = %path, "Storage group declared");
        Ok(())
    }

    /// Set (or clear) the retention of a storage group
    pub fn set_ttl(&self, path: &PartialPath, ttl: Option<u64>) -> Result<()> {
        path.ensure_concrete()?;
        if path.is_root() {
            return Err(Error::not_found(format!("storage group {path}")));
        }
        self.write(path, |w| match w.node(path)? {
            Some(NodeRecord::StorageGroup { .. }) => {
                w.put_node(path, &NodeRecord::StorageGroup { ttl })
            }
            _ => Err(Error::not_found(format!("storage group {path}")).into()),
        })?;
        debug!(storage_group = %path, ?ttl, "TTL updated");
        Ok(())
    }

    pub fn get_ttl(&self, path: &PartialPath) -> Result<Option<u64>> {
        path.ensure_concrete()?;
        self.read(|r| match traverse::load_node(&r.nodes, path)? {
            Some(NodeRecord::StorageGroup { ttl }) => Ok(ttl),
            _ => Err(Error::not_found(format!("storage group {path}")).into()),
        })
    }

    /// Storage group that owns `path`
    pub fn storage_group_of(&self, path: &PartialPath) -> Result<PartialPath> {
        path.ensure_concrete()?;
        self.read(|r| {
            traverse::storage_group_of(&r.groups, path)?
                .ok_or_else(|| Error::NoStorageGroup(path.to_string()).into())
        })
    }

    /// Delete storage groups with their whole subtrees. Every path must be
    /// a storage group; otherwise nothing is deleted.
    pub fn delete_storage_groups(&self, paths: &[PartialPath]) -> Result<()> {
        for path in paths {
            path.ensure_concrete()?;
        }
        self.read(|r| {
            for path in paths {
                if r.groups.get(path.to_string().as_str())?.is_none() {
                    return Err(Error::not_found(format!("storage group {path}")).into());
                }
            }
            Ok(())
        })?;

        for path in paths {
            if self.write(path, |w| w.delete_storage_group(path))? {
                info!(storage_group = %path, "Storage group deleted");
            } else {
                warn!(storage_group = %path, "Storage group already removed");
            }
        }
        Ok(())
    }

    // ---- Timeseries ----

    /// Create one non-aligned timeseries
    pub fn create_measurement(
        &self,
        path: &PartialPath,
        data_type: DataType,
        encoding: Encoding,
        compression: Compression,
        props: Option<StringMap>,
        alias: Option<&str>,
    ) -> Result<()> {
        path.ensure_concrete()?;
        check_depth(path)?;
        let device = path
            .parent()
            .ok_or_else(|| Error::conflict("root cannot be a timeseries"))?;
        if let Some(alias) = alias {
            check_alias(&device, alias)?;
            if alias == path.last() {
                return Err(alias_conflict(&device, alias).into());
            }
        }
        if !data_type.supports(encoding) {
            return Err(Error::UnsupportedEncoding {
                data_type,
                encoding,
            });
        }
        let schema =
            MeasurementSchema::new(path.last(), data_type, encoding, compression).with_props(props);

        self.write(path, |w| {
            let sg = w.resolve_storage_group(&device, &self.config)?;
            w.prepare_device(&sg, &device, false)?;
            w.check_leaf_free(&device, path.last())?;
            if let Some(alias) = alias {
                w.check_alias_free(&device, alias)?;
                w.aliases.insert(
                    keys::alias_key(&device, alias).as_str(),
                    path.to_string().as_str(),
                )?;
            }
            w.put_node(
                path,
                &NodeRecord::Measurement(MeasurementRecord {
                    schema,
                    alias: alias.map(str::to_string),
                    tags: None,
                }),
            )
        })?;
        debug!(timeseries = %path, "Timeseries created");
        Ok(())
    }

    /// Create several timeseries under one aligned device. Either all of
    /// them are created or none.
    pub fn create_aligned_measurements(
        &self,
        device: &PartialPath,
        measurements: &[String],
        data_types: &[DataType],
        encodings: &[Encoding],
        compressions: &[Compression],
    ) -> Result<()> {
        device.ensure_concrete()?;
        if device.is_root() {
            return Err(Error::NoStorageGroup(device.to_string()));
        }
        if measurements.is_empty() {
            return Err(Error::invalid_argument("no measurements given"));
        }
        if data_types.len() != measurements.len()
            || encodings.len() != measurements.len()
            || compressions.len() != measurements.len()
        {
            return Err(Error::invalid_argument(format!(
                "mismatched batch lengths: {} measurements, {} data types, {} encodings, {} compressions",
                measurements.len(),
                data_types.len(),
                encodings.len(),
                compressions.len()
            )));
        }

        let mut seen = BTreeSet::new();
        let mut schemas = Vec::with_capacity(measurements.len());
        for (i, name) in measurements.iter().enumerate() {
            let leaf = device.concat_node(name)?;
            leaf.ensure_concrete()?;
            check_depth(&leaf)?;
            if !seen.insert(name.as_str()) {
                return Err(Error::invalid_argument(format!(
                    "duplicate measurement {name} in batch"
                )));
            }
            let (data_type, encoding) = (data_types[i], encodings[i]);
            if !data_type.supports(encoding) {
                return Err(Error::UnsupportedEncoding {
                    data_type,
                    encoding,
                });
            }
            schemas.push(MeasurementSchema::new(
                name.as_str(),
                data_type,
                encoding,
                compressions[i],
            ));
        }

        self.write(device, |w| {
            let sg = w.resolve_storage_group(device, &self.config)?;
            w.prepare_device(&sg, device, true)?;
            for schema in &schemas {
                w.check_leaf_free(device, &schema.name)?;
            }
            for schema in schemas {
                let leaf = device.child_unchecked(&schema.name);
                w.put_node(
                    &leaf,
                    &NodeRecord::Measurement(MeasurementRecord {
                        schema,
                        alias: None,
                        tags: None,
                    }),
                )?;
            }
            Ok(())
        })?;
        debug!(device = %device, count = measurements.len(), "Aligned timeseries created");
        Ok(())
    }

    /// Look up a timeseries by canonical or alias-qualified path
    pub fn get_measurement(&self, path: &PartialPath) -> Result<MeasurementNode> {
        path.ensure_concrete()?;
        self.read(|r| {
            r.resolve(path)?
                .ok_or_else(|| Error::not_found(format!("timeseries {path}")).into())
        })
    }

    /// Whether a node exists at exactly this canonical path
    pub fn path_exists(&self, path: &PartialPath) -> Result<bool> {
        path.ensure_concrete()?;
        self.read(|r| Ok(traverse::load_node(&r.nodes, path)?.is_some()))
    }

    /// Bind `alias` to a timeseries, replacing its previous alias
    pub fn set_alias(&self, path: &PartialPath, alias: &str) -> Result<()> {
        path.ensure_concrete()?;
        let device = path
            .parent()
            .ok_or_else(|| Error::not_found(format!("timeseries {path}")))?;
        check_alias(&device, alias)?;

        self.write(path, |w| {
            let mut record = w.measurement(path)?;
            if record.alias.as_deref() == Some(alias) {
                return Ok(());
            }
            if alias == path.last() {
                return Err(alias_conflict(&device, alias));
            }
            w.check_alias_free(&device, alias)?;
            if let Some(old) = record.alias.take() {
                w.aliases.remove(keys::alias_key(&device, &old).as_str())?;
            }
            w.aliases.insert(
                keys::alias_key(&device, alias).as_str(),
                path.to_string().as_str(),
            )?;
            record.alias = Some(alias.to_string());
            w.put_node(path, &NodeRecord::Measurement(record))
        })?;
        debug!(timeseries = %path, alias, "Alias set");
        Ok(())
    }

    /// Merge `tags` into the tags of a timeseries
    pub fn upsert_tags(&self, path: &PartialPath, tags: StringMap) -> Result<()> {
        path.ensure_concrete()?;
        if path.is_root() {
            return Err(Error::not_found(format!("timeseries {path}")));
        }
        self.write(path, |w| {
            let mut record = w.measurement(path)?;
            record.tags.get_or_insert_with(StringMap::new).extend(tags);
            w.put_node(path, &NodeRecord::Measurement(record))
        })
    }

    /// Delete every timeseries matched by `pattern`, returning the
    /// deleted paths. Devices left empty are removed with their
    /// childless ancestors up to the storage group.
    pub fn delete_measurements(&self, pattern: &PartialPath) -> Result<Vec<PartialPath>> {
        let below_root = PatternCursor::new(pattern).advance(ROOT);
        let domains: Vec<PartialPath> = self.read(|r| {
            Ok(traverse::children(&r.nodes, &PartialPath::root())?
                .into_iter()
                .map(|(path, _)| path)
                .filter(|path| !below_root.advance(path.last()).is_dead())
                .collect())
        })?;

        let mut deleted = Vec::new();
        for start in &domains {
            deleted.extend(self.write(start, |w| w.delete_measurements(pattern, start))?);
        }
        deleted.sort();
        debug!(pattern = %pattern, count = deleted.len(), "Timeseries deleted");
        Ok(deleted)
    }

    // ---- Aggregates ----

    pub fn count_timeseries(&self, pattern: &PartialPath, scope: PatternScope) -> Result<usize> {
        self.read(|r| {
            r.check_scope(pattern, scope)?;
            traverse::count(&r.nodes, pattern, NodeRecord::is_measurement)
        })
    }

    pub fn count_devices(&self, pattern: &PartialPath, scope: PatternScope) -> Result<usize> {
        self.read(|r| {
            r.check_scope(pattern, scope)?;
            traverse::count(&r.nodes, pattern, NodeRecord::is_device)
        })
    }

    pub fn count_storage_groups(&self, pattern: &PartialPath, scope: PatternScope) -> Result<usize> {
        self.read(|r| {
            r.check_scope(pattern, scope)?;
            Ok(traverse::storage_groups_matching(&r.groups, pattern)?.len())
        })
    }

    /// Number of distinct nodes at depth `level` that are matched by
    /// `pattern`, or are an ancestor or descendant of a matched node
    pub fn count_nodes_at_level(
        &self,
        pattern: &PartialPath,
        level: usize,
        scope: PatternScope,
    ) -> Result<usize> {
        self.read(|r| {
            r.check_scope(pattern, scope)?;
            traverse::count_nodes_at_level(
                &r.nodes,
                pattern,
                level,
                scope == PatternScope::StorageGroupBounded,
            )
        })
    }

    pub fn list_storage_groups(&self, pattern: &PartialPath) -> Result<Vec<PartialPath>> {
        self.read(|r| traverse::storage_groups_matching(&r.groups, pattern))
    }

    pub fn list_timeseries(&self, pattern: &PartialPath) -> Result<Vec<PartialPath>> {
        self.read(|r| {
            Ok(traverse::collect(
                &r.nodes,
                pattern,
                &PartialPath::root(),
                NodeRecord::is_measurement,
            )?
            .into_iter()
            .map(|(path, _)| path)
            .collect())
        })
    }

    /// Resolve every timeseries matched by `pattern`
    pub fn fetch_schema(&self, pattern: &PartialPath) -> Result<SchemaTree> {
        self.read(|r| {
            let mut tree = SchemaTree::new();
            let matched = traverse::collect(
                &r.nodes,
                pattern,
                &PartialPath::root(),
                NodeRecord::is_measurement,
            )?;
            for (path, record) in matched {
                if let NodeRecord::Measurement(record) = record {
                    tree.append_measurement(r.entry(path, record)?);
                }
            }
            Ok(tree)
        })
    }

    /// Every stored key, one line each, for diagnostics
    pub fn dump_keys(&self) -> Result<Vec<String>> {
        let lines = self.read(|r| {
            let mut lines = Vec::new();
            for entry in r.nodes.iter()? {
                let (key, value) = entry?;
                let record = NodeRecord::decode(value.value())?;
                lines.push(format!("node {} [{}]", key.value(), record.kind()));
            }
            for entry in r.aliases.iter()? {
                let (key, value) = entry?;
                lines.push(format!("alias {} -> {}", key.value(), value.value()));
            }
            for entry in r.groups.iter()? {
                lines.push(format!("storage_group {}", entry?.0.value()));
            }
            Ok(lines)
        })?;
        for line in &lines {
            debug!("{line}");
        }
        Ok(lines)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Barrier};
    use tempfile::TempDir;

    fn p(s: &str) -> PartialPath {
        PartialPath::parse(s).unwrap()
    }

    fn open_store(dir: &TempDir) -> MetadataStore {
        MetadataStore::open(MetaStoreConfig::with_data_dir(dir.path())).unwrap()
    }

    fn create_text(store: &MetadataStore, path: &str, alias: Option<&str>) -> Result<()> {
        store.create_measurement(
            &p(path),
            DataType::Text,
            Encoding::Plain,
            Compression::Uncompressed,
            None,
            alias,
        )
    }

    #[test]
    fn test_declare_storage_group_rules() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);

        store.declare_storage_group(&p("root.sg1")).unwrap();
        assert!(store.declare_storage_group(&p("root.sg1")).unwrap_err().is_conflict());
        assert!(store.declare_storage_group(&p("root.sg1.sub")).unwrap_err().is_conflict());
        assert!(store.declare_storage_group(&p("root")).unwrap_err().is_conflict());

        store.declare_storage_group(&p("root.inner.sg1")).unwrap();
        assert!(store.declare_storage_group(&p("root.inner")).unwrap_err().is_conflict());
        assert!(matches!(
            store.declare_storage_group(&p("root.*")),
            Err(Error::Parse(_))
        ));

        assert!(store.path_exists(&p("root.inner")).unwrap());
        assert_eq!(
            store.list_storage_groups(&p("root.**")).unwrap(),
            vec![p("root.inner.sg1"), p("root.sg1")]
        );
    }

    #[test]
    fn test_create_timeseries() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);
        store.declare_storage_group(&p("root.tt.sg")).unwrap();

        create_text(&store, "root.tt.sg.dd.m1", None).unwrap();
        let m1 = store.get_measurement(&p("root.tt.sg.dd.m1")).unwrap();
        assert_eq!(m1.alias, None);
        assert_eq!(m1.schema.data_type, DataType::Text);
        assert_eq!(m1.schema.encoding, Encoding::Plain);
        assert_eq!(m1.schema.compression, Compression::Uncompressed);
        assert_eq!(m1.schema.props, None);
        assert_eq!(m1.storage_group, p("root.tt.sg"));
        assert!(!m1.aligned);

        store
            .create_measurement(
                &p("root.tt.sg.dd.m2"),
                DataType::Double,
                Encoding::Plain,
                Compression::Gzip,
                None,
                Some("ma"),
            )
            .unwrap();
        let m2 = store.get_measurement(&p("root.tt.sg.dd.m2")).unwrap();
        assert_eq!(m2.alias.as_deref(), Some("ma"));
        assert_eq!(m2.schema.compression, Compression::Gzip);

        let by_alias = store.get_measurement(&p("root.tt.sg.dd.ma")).unwrap();
        assert_eq!(by_alias.path, p("root.tt.sg.dd.m2"));
        assert!(!store.path_exists(&p("root.tt.sg.dd.ma")).unwrap());

        assert!(create_text(&store, "root.tt.sg.dd.m1", None).unwrap_err().is_conflict());
        assert!(matches!(
            create_text(&store, "root.tt.sg.dd.ma", None),
            Err(Error::AliasConflict { .. })
        ));
        assert!(matches!(
            create_text(&store, "root.tt.sg.dd.m3", Some("m1")),
            Err(Error::AliasConflict { .. })
        ));
        assert!(create_text(&store, "root.tt.sg.dd.m1.x", None).unwrap_err().is_conflict());
        assert!(create_text(&store, "root.tt.sg.m0", None).unwrap_err().is_conflict());
    }

    #[test]
    fn test_create_requires_storage_group() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);
        assert!(matches!(
            create_text(&store, "root.x.d.s", None),
            Err(Error::NoStorageGroup(_))
        ));
        assert!(!store.path_exists(&p("root.x")).unwrap());

        assert!(matches!(
            store.create_measurement(
                &p("root.x.d.s"),
                DataType::Text,
                Encoding::Gorilla,
                Compression::Snappy,
                None,
                None,
            ),
            Err(Error::UnsupportedEncoding { .. })
        ));
    }

    #[test]
    fn test_auto_storage_group_level() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = MetaStoreConfig::with_data_dir(dir.path());
        config.auto_storage_group_level = Some(1);
        config.default_ttl = Some(3600);
        let store = MetadataStore::open(config).unwrap();

        create_text(&store, "root.tt.sg.dd.m1", None).unwrap();
        assert_eq!(store.storage_group_of(&p("root.tt.sg.dd.m1")).unwrap(), p("root.tt"));
        assert_eq!(store.get_ttl(&p("root.tt")).unwrap(), Some(3600));

        // a device directly below root is too shallow for level 1
        assert!(matches!(
            create_text(&store, "root.d.s", None),
            Err(Error::NoStorageGroup(_))
        ));
    }

    #[test]
    fn test_create_aligned_timeseries() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);
        store.declare_storage_group(&p("root.tt.sg")).unwrap();

        let names: Vec<String> = (0..6).map(|i| format!("mm{i}")).collect();
        store
            .create_aligned_measurements(
                &p("root.tt.sg.dd"),
                &names,
                &[DataType::Int32; 6],
                &[Encoding::Plain; 6],
                &[Compression::Uncompressed; 6],
            )
            .unwrap();
        assert!(store.get_measurement(&p("root.tt.sg.dd.mm3")).unwrap().aligned);

        assert!(matches!(
            create_text(&store, "root.tt.sg.dd.mn", None),
            Err(Error::AlignmentConflict(_))
        ));

        // extending an aligned device works; a clash aborts the whole batch
        let batch = vec!["mm6".to_string(), "mm0".to_string()];
        assert!(
            store
                .create_aligned_measurements(
                    &p("root.tt.sg.dd"),
                    &batch,
                    &[DataType::Int64; 2],
                    &[Encoding::Rle; 2],
                    &[Compression::Snappy; 2],
                )
                .unwrap_err()
                .is_conflict()
        );
        assert!(!store.path_exists(&p("root.tt.sg.dd.mm6")).unwrap());

        assert!(matches!(
            store.create_aligned_measurements(
                &p("root.tt.sg.dd"),
                &batch,
                &[DataType::Int64],
                &[Encoding::Rle; 2],
                &[Compression::Snappy; 2],
            ),
            Err(Error::InvalidArgument(_))
        ));

        create_text(&store, "root.tt.sg.plain.s1", None).unwrap();
        assert!(matches!(
            store.create_aligned_measurements(
                &p("root.tt.sg.plain"),
                &["s2".to_string()],
                &[DataType::Int32],
                &[Encoding::Plain],
                &[Compression::Uncompressed],
            ),
            Err(Error::AlignmentConflict(_))
        ));

        assert!(matches!(
            store.create_aligned_measurements(
                &p("root"),
                &["s".to_string()],
                &[DataType::Int32],
                &[Encoding::Plain],
                &[Compression::Uncompressed],
            ),
            Err(Error::NoStorageGroup(_))
        ));
    }

    #[test]
    fn test_node_type_count() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = MetaStoreConfig::with_data_dir(dir.path());
        config.auto_storage_group_level = Some(1);
        let store = MetadataStore::open(config).unwrap();

        for sg in [
            "root.sg1",
            "root.inner.sg1",
            "root.inner.sg2",
            "root.inner1.inner2.inner3.sg",
            "root.inner1.inner2.sg",
        ] {
            store.declare_storage_group(&p(sg)).unwrap();
        }
        let loose = PatternScope::Loose;
        assert_eq!(store.count_storage_groups(&p("root.inner.**"), loose).unwrap(), 2);
        assert_eq!(store.count_storage_groups(&p("root.**"), loose).unwrap(), 5);

        // root.tt is declared implicitly here
        create_text(&store, "root.tt.sg.dd.m1", None).unwrap();
        create_text(&store, "root.tt.sg.ddd.m2", Some("ma")).unwrap();

        assert_eq!(store.count_timeseries(&p("root.**"), loose).unwrap(), 2);
        assert_eq!(
            store
                .count_storage_groups(&p("root.inner1.inner2.inner3.sg"), loose)
                .unwrap(),
            1
        );
        assert_eq!(store.count_storage_groups(&p("root.inner.**"), loose).unwrap(), 2);
        assert_eq!(store.count_storage_groups(&p("root.**"), loose).unwrap(), 6);
        assert_eq!(store.count_timeseries(&p("root.tt.sg.dd.m1"), loose).unwrap(), 1);
        assert_eq!(store.count_devices(&p("root.inner1.inner2"), loose).unwrap(), 0);
        assert_eq!(store.count_devices(&p("root.inner1.inner2.**"), loose).unwrap(), 0);
        assert_eq!(store.count_devices(&p("root.tt.sg.**"), loose).unwrap(), 2);
        assert_eq!(store.count_devices(&p("root.tt.sg.dd"), loose).unwrap(), 1);
        assert_eq!(store.count_nodes_at_level(&p("root.tt.sg"), 3, loose).unwrap(), 2);
        assert_eq!(store.count_nodes_at_level(&p("root.tt.sg.dd.m1"), 1, loose).unwrap(), 1);
        assert_eq!(store.count_nodes_at_level(&p("root.*"), 1, loose).unwrap(), 4);
    }

    #[test]
    fn test_counts_do_not_double_count() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);
        store.declare_storage_group(&p("root.sg")).unwrap();
        create_text(&store, "root.sg.d1.s1", None).unwrap();
        create_text(&store, "root.sg.d1.d1.s1", None).unwrap();

        let loose = PatternScope::Loose;
        assert_eq!(store.count_timeseries(&p("root.**.**"), loose).unwrap(), 2);
        assert_eq!(store.count_timeseries(&p("root.**.d1.**"), loose).unwrap(), 2);
        assert_eq!(store.count_devices(&p("root.**.d1"), loose).unwrap(), 2);
        assert_eq!(store.count_nodes_at_level(&p("root.**.s1"), 2, loose).unwrap(), 1);
    }

    #[test]
    fn test_count_agrees_with_path_matching() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);
        store.declare_storage_group(&p("root.sg1")).unwrap();
        store.declare_storage_group(&p("root.x.sg2")).unwrap();
        for path in [
            "root.sg1.a.s",
            "root.sg1.a.b.s",
            "root.sg1.b.a.s",
            "root.sg1.b.c",
            "root.x.sg2.a.s",
            "root.x.sg2.a.b.a.s",
            "root.x.sg2.b.b.t",
        ] {
            create_text(&store, path, None).unwrap();
        }

        let leaves = store.list_timeseries(&p("root.**")).unwrap();
        assert_eq!(leaves.len(), 7);
        for pattern in [
            "root.**.a.**.s",
            "root.*.**.b.*",
            "root.*.*.s",
            "root.**.s",
            "root.x.**",
            "root.**.b.**",
            "root.*.a.*",
        ] {
            let pattern = p(pattern);
            let expected = leaves.iter().filter(|leaf| pattern.matches(leaf)).count();
            assert_eq!(
                store.count_timeseries(&pattern, PatternScope::Loose).unwrap(),
                expected,
                "pattern {pattern}"
            );
        }
    }

    #[test]
    fn test_storage_group_bounded_scope() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);
        store.declare_storage_group(&p("root.inner.sg1")).unwrap();
        create_text(&store, "root.inner.sg1.d.s", None).unwrap();

        let bounded = PatternScope::StorageGroupBounded;
        assert!(store
            .count_timeseries(&p("root.other.**"), bounded)
            .unwrap_err()
            .is_not_found());
        assert_eq!(store.count_timeseries(&p("root.inner.**"), bounded).unwrap(), 1);
        assert_eq!(store.count_timeseries(&p("root.other.**"), PatternScope::Loose).unwrap(), 0);

        assert_eq!(
            store.count_nodes_at_level(&p("root.**"), 1, PatternScope::Loose).unwrap(),
            1
        );
        assert_eq!(store.count_nodes_at_level(&p("root.**"), 1, bounded).unwrap(), 0);
        assert_eq!(store.count_nodes_at_level(&p("root.**"), 2, bounded).unwrap(), 1);
    }

    #[test]
    fn test_delete_timeseries() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);
        store.declare_storage_group(&p("root.sg")).unwrap();
        store.declare_storage_group(&p("root.sg1")).unwrap();
        let timeseries = [
            "root.sg.d1.m1",
            "root.sg.d1.m2",
            "root.sg.d2.m1",
            "root.sg.d2.m2",
            "root.sg.d3.m1",
            "root.sg.d3.m2",
            "root.sg1.d1.m1",
            "root.sg1.d1.m2",
            "root.sg1.d2.m1",
            "root.sg1.d2.m2",
        ];
        for path in timeseries {
            create_text(&store, path, None).unwrap();
        }
        let all = p("root.**");
        let loose = PatternScope::Loose;
        assert_eq!(store.count_timeseries(&all, loose).unwrap(), 10);

        let deleted = store.delete_measurements(&p("root.sg.d1.*")).unwrap();
        assert_eq!(deleted, vec![p("root.sg.d1.m1"), p("root.sg.d1.m2")]);
        assert_eq!(store.count_timeseries(&all, loose).unwrap(), 8);
        assert!(!store.path_exists(&p("root.sg.d1")).unwrap());

        assert_eq!(store.delete_measurements(&p("root.sg1.**")).unwrap().len(), 4);
        assert_eq!(store.count_timeseries(&all, loose).unwrap(), 4);
        assert!(store.path_exists(&p("root.sg1")).unwrap());

        assert_eq!(store.delete_measurements(&p("root.sg.*.m1")).unwrap().len(), 2);
        assert_eq!(store.count_timeseries(&all, loose).unwrap(), 2);

        assert!(store.delete_measurements(&p("root.nothing.**")).unwrap().is_empty());
    }

    #[test]
    fn test_delete_demotes_device_with_children() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);
        store.declare_storage_group(&p("root.sg")).unwrap();
        create_text(&store, "root.sg.d1.s1", Some("a1")).unwrap();
        create_text(&store, "root.sg.d1.sub.s1", None).unwrap();

        store.delete_measurements(&p("root.sg.d1.s1")).unwrap();
        assert!(store.path_exists(&p("root.sg.d1")).unwrap());
        assert_eq!(store.count_devices(&p("root.sg.d1"), PatternScope::Loose).unwrap(), 0);
        assert!(store.get_measurement(&p("root.sg.d1.a1")).is_err());

        // the alias name is free again
        create_text(&store, "root.sg.d1.a1", None).unwrap();
    }

    #[test]
    fn test_upsert_alias() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);
        store.declare_storage_group(&p("root.tt.sg")).unwrap();
        create_text(&store, "root.tt.sg.dd.m2", Some("ma")).unwrap();
        create_text(&store, "root.tt.sg.dd.m3", Some("mb")).unwrap();

        let path = p("root.tt.sg.dd.m2");
        assert_eq!(store.get_measurement(&path).unwrap().alias.as_deref(), Some("ma"));

        store.set_alias(&path, "test").unwrap();
        assert_eq!(store.get_measurement(&path).unwrap().alias.as_deref(), Some("test"));
        let m3 = store.get_measurement(&p("root.tt.sg.dd.test")).unwrap();
        assert_eq!(m3.alias.as_deref(), Some("test"));
        assert!(store.get_measurement(&p("root.tt.sg.dd.ma")).unwrap_err().is_not_found());

        assert!(matches!(
            store.set_alias(&path, "mb"),
            Err(Error::AliasConflict { .. })
        ));
        assert!(matches!(
            store.set_alias(&path, "m3"),
            Err(Error::AliasConflict { .. })
        ));
        assert!(store.set_alias(&p("root.tt.sg.dd.nope"), "x").unwrap_err().is_not_found());

        // aliases are scoped to their device
        create_text(&store, "root.tt.sg.other.m1", Some("test")).unwrap();
    }

    #[test]
    fn test_upsert_tags() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);
        store.declare_storage_group(&p("root.sg")).unwrap();
        create_text(&store, "root.sg.d.s", None).unwrap();

        let mut tags = StringMap::new();
        tags.insert("unit".into(), "c".into());
        store.upsert_tags(&p("root.sg.d.s"), tags).unwrap();
        let mut more = StringMap::new();
        more.insert("owner".into(), "ops".into());
        store.upsert_tags(&p("root.sg.d.s"), more).unwrap();

        let tags = store.get_measurement(&p("root.sg.d.s")).unwrap().tags.unwrap();
        assert_eq!(tags.len(), 2);
        assert_eq!(tags["unit"], "c");
        assert!(store.upsert_tags(&p("root"), StringMap::new()).unwrap_err().is_not_found());
    }

    #[test]
    fn test_delete_storage_groups() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);
        store.declare_storage_group(&p("root.inner.sg1")).unwrap();
        store.declare_storage_group(&p("root.inner.sg2")).unwrap();
        create_text(&store, "root.inner.sg1.d.a.b.s", Some("x")).unwrap();

        assert!(store
            .delete_storage_groups(&[p("root.inner.sg1"), p("root.inner")])
            .unwrap_err()
            .is_not_found());
        assert!(store.path_exists(&p("root.inner.sg1.d.a.b.s")).unwrap());

        store.delete_storage_groups(&[p("root.inner.sg1")]).unwrap();
        assert!(!store.path_exists(&p("root.inner.sg1")).unwrap());
        assert!(store.path_exists(&p("root.inner")).unwrap());
        let dump = store.dump_keys().unwrap();
        assert!(!dump.iter().any(|line| line.contains("root.inner.sg1")));

        store.delete_storage_groups(&[p("root.inner.sg2")]).unwrap();
        assert!(!store.path_exists(&p("root.inner")).unwrap());
        assert_eq!(store.count_storage_groups(&p("root.**"), PatternScope::Loose).unwrap(), 0);

        // the name can be reused
        store.declare_storage_group(&p("root.inner")).unwrap();
    }

    #[test]
    fn test_ttl() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);
        store.declare_storage_group(&p("root.sg")).unwrap();
        assert_eq!(store.get_ttl(&p("root.sg")).unwrap(), None);
        store.set_ttl(&p("root.sg"), Some(86_400)).unwrap();
        assert_eq!(store.get_ttl(&p("root.sg")).unwrap(), Some(86_400));
        assert!(store.set_ttl(&p("root.nope"), Some(1)).unwrap_err().is_not_found());
        assert!(store.set_ttl(&p("root"), Some(1)).unwrap_err().is_not_found());
        assert!(store.get_ttl(&p("root")).unwrap_err().is_not_found());
    }

    #[test]
    fn test_fetch_schema() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);
        store.declare_storage_group(&p("root.sg")).unwrap();
        create_text(&store, "root.sg.d1.s1", None).unwrap();
        store
            .create_aligned_measurements(
                &p("root.sg.d2"),
                &["s1".to_string(), "s2".to_string()],
                &[DataType::Float, DataType::Int64],
                &[Encoding::Gorilla, Encoding::Ts2Diff],
                &[Compression::Snappy, Compression::Snappy],
            )
            .unwrap();

        let tree = store.fetch_schema(&p("root.sg.*.s1")).unwrap();
        assert_eq!(tree.len(), 2);
        assert!(tree.get(&p("root.sg.d2.s1")).unwrap().aligned);
        assert!(!tree.get(&p("root.sg.d1.s1")).unwrap().aligned);
        assert_eq!(tree.storage_groups().len(), 1);
        assert_eq!(
            store.list_timeseries(&p("root.sg.d2.*")).unwrap(),
            vec![p("root.sg.d2.s1"), p("root.sg.d2.s2")]
        );
    }

    #[test]
    fn test_close_and_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = open_store(&dir);
            store.declare_storage_group(&p("root.sg")).unwrap();
            create_text(&store, "root.sg.d.s", Some("alias")).unwrap();
            store.close();
            store.close();
            assert!(store.is_closed());
            assert!(matches!(store.path_exists(&p("root.sg")), Err(Error::Closed)));
            assert!(matches!(create_text(&store, "root.sg.d.t", None), Err(Error::Closed)));
        }
        let store = open_store(&dir);
        assert!(store.dump_keys().unwrap().iter().any(|l| l.contains("000:root")));
        let entry = store.get_measurement(&p("root.sg.d.alias")).unwrap();
        assert_eq!(entry.path, p("root.sg.d.s"));
    }

    #[test]
    fn test_concurrent_delete_and_create() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);

        for round in 0..20 {
            store.declare_storage_group(&p("root.sg1")).unwrap();
            let barrier = Arc::new(Barrier::new(2));
            std::thread::scope(|s| {
                let b = Arc::clone(&barrier);
                let store_ref = &store;
                s.spawn(move || {
                    b.wait();
                    store_ref.delete_storage_groups(&[p("root.sg1")]).unwrap();
                });
                let b = Arc::clone(&barrier);
                s.spawn(move || {
                    b.wait();
                    let result = create_text(store_ref, "root.sg1.dd.m1", None);
                    if let Err(e) = result {
                        assert!(e.is_not_found(), "round {round}: {e}");
                    }
                });
            });

            // the create either ran first and was swept away, or it failed
            assert!(!store.path_exists(&p("root.sg1.dd.m1")).unwrap());
            assert!(!store.path_exists(&p("root.sg1")).unwrap());
            assert_eq!(store.count_timeseries(&p("root.**"), PatternScope::Loose).unwrap(), 0);
        }
    }

    #[test]
    fn test_disjoint_domains_proceed_in_parallel() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);
        std::thread::scope(|s| {
            for t in 0..4 {
                let store = &store;
                s.spawn(move || {
                    let sg = format!("root.sg{t}");
                    store.declare_storage_group(&p(&sg)).unwrap();
                    for i in 0..10 {
                        create_text(store, &format!("{sg}.d{i}.s"), None).unwrap();
                    }
                });
            }
        });
        assert_eq!(store.count_timeseries(&p("root.**"), PatternScope::Loose).unwrap(), 40);
        assert_eq!(store.count_devices(&p("root.*.*"), PatternScope::Loose).unwrap(), 40);
    }
}
