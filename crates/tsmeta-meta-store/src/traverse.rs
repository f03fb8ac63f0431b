//! Pattern-driven walks over the namespace tables.
//!
//! All helpers are generic over redb's `ReadableTable`, so they run both
//! against a read snapshot and inside a write transaction.

use crate::keys;
use crate::store::MetaStoreResult;
use crate::types::NodeRecord;
use redb::ReadableTable;
use tsmeta_common::PartialPath;
use tsmeta_common::PatternCursor;
use tsmeta_common::path::ROOT;

/// Any table shaped like `NODES`
pub trait NodeTable: ReadableTable<&'static str, &'static [u8]> {}
impl<T: ReadableTable<&'static str, &'static [u8]>> NodeTable for T {}

/// Any table shaped like `STORAGE_GROUPS`
pub trait GroupTable: ReadableTable<&'static str, ()> {}
impl<T: ReadableTable<&'static str, ()>> GroupTable for T {}

pub fn load_node<T: NodeTable>(table: &T, path: &PartialPath) -> MetaStoreResult<Option<NodeRecord>> {
    let key = keys::node_key(path);
    match table.get(key.as_str())? {
        Some(bytes) => Ok(Some(NodeRecord::decode(bytes.value())?)),
        None => Ok(None),
    }
}

/// Direct children of `parent`, in segment order
pub fn children<T: NodeTable>(
    table: &T,
    parent: &PartialPath,
) -> MetaStoreResult<Vec<(PartialPath, NodeRecord)>> {
    let prefix = keys::children_prefix(parent);
    let mut result = Vec::new();
    for entry in table.range::<&str>(prefix.as_str()..)? {
        let (key, value) = entry?;
        let Some(segment) = key.value().strip_prefix(prefix.as_str()) else {
            break;
        };
        let child = parent.child_unchecked(segment);
        result.push((child, NodeRecord::decode(value.value())?));
    }
    Ok(result)
}

pub fn has_children<T: NodeTable>(table: &T, parent: &PartialPath) -> MetaStoreResult<bool> {
    let prefix = keys::children_prefix(parent);
    match table.range::<&str>(prefix.as_str()..)?.next() {
        Some(entry) => Ok(entry?.0.value().starts_with(prefix.as_str())),
        None => Ok(false),
    }
}

pub fn has_measurement_child<T: NodeTable>(
    table: &T,
    parent: &PartialPath,
) -> MetaStoreResult<bool> {
    Ok(children(table, parent)?
        .iter()
        .any(|(_, record)| record.is_measurement()))
}

/// Children of `path` that the cursor may still accept. When the
/// pattern only allows literal segments next, those are fetched with
/// point lookups instead of a range scan.
fn expand<T: NodeTable>(
    table: &T,
    path: &PartialPath,
    cursor: &PatternCursor<'_>,
) -> MetaStoreResult<Vec<(PartialPath, NodeRecord)>> {
    let Some(literals) = cursor.next_literals() else {
        return children(table, path);
    };
    let mut result = Vec::with_capacity(literals.len());
    for literal in literals {
        let child = path.child_unchecked(literal);
        if let Some(record) = load_node(table, &child)? {
            result.push((child, record));
        }
    }
    Ok(result)
}

/// Visit every node below (and including) `start` that `pattern`
/// matches. Each node is visited at most once regardless of how many
/// ways the pattern can reach it.
pub fn walk<T, F>(
    table: &T,
    pattern: &PartialPath,
    start: &PartialPath,
    mut visit: F,
) -> MetaStoreResult<()>
where
    T: NodeTable,
    F: FnMut(&PartialPath, &NodeRecord),
{
    let mut cursor = PatternCursor::new(pattern);
    for node in start.nodes() {
        cursor = cursor.advance(node);
        if cursor.is_dead() {
            return Ok(());
        }
    }
    let Some(record) = load_node(table, start)? else {
        return Ok(());
    };

    let mut stack = vec![(start.clone(), record, cursor)];
    while let Some((path, record, cursor)) = stack.pop() {
        if cursor.is_match() {
            visit(&path, &record);
        }
        if record.is_measurement() || !cursor.can_descend() {
            continue;
        }
        for (child, child_record) in expand(table, &path, &cursor)? {
            let next = cursor.advance(child.last());
            if !next.is_dead() {
                stack.push((child, child_record, next));
            }
        }
    }
    Ok(())
}

/// Collect matched nodes accepted by `filter`, sorted by path
pub fn collect<T, F>(
    table: &T,
    pattern: &PartialPath,
    start: &PartialPath,
    filter: F,
) -> MetaStoreResult<Vec<(PartialPath, NodeRecord)>>
where
    T: NodeTable,
    F: Fn(&NodeRecord) -> bool,
{
    let mut result = Vec::new();
    walk(table, pattern, start, |path, record| {
        if filter(record) {
            result.push((path.clone(), record.clone()));
        }
    })?;
    result.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(result)
}

pub fn count<T, F>(table: &T, pattern: &PartialPath, filter: F) -> MetaStoreResult<usize>
where
    T: NodeTable,
    F: Fn(&NodeRecord) -> bool,
{
    let mut count = 0;
    walk(table, pattern, &PartialPath::root(), |_, record| {
        if filter(record) {
            count += 1;
        }
    })?;
    Ok(count)
}

/// Whether anything strictly below `path` is matched
fn match_below<T: NodeTable>(
    table: &T,
    path: &PartialPath,
    cursor: &PatternCursor<'_>,
) -> MetaStoreResult<bool> {
    let mut stack = vec![(path.clone(), cursor.clone())];
    while let Some((path, cursor)) = stack.pop() {
        if !cursor.can_descend() {
            continue;
        }
        for (child, record) in expand(table, &path, &cursor)? {
            let next = cursor.advance(child.last());
            if next.is_match() {
                return Ok(true);
            }
            if !next.is_dead() && !record.is_measurement() {
                stack.push((child, next));
            }
        }
    }
    Ok(false)
}

struct LevelFrame<'a> {
    path: PartialPath,
    record: NodeRecord,
    cursor: PatternCursor<'a>,
    /// Some ancestor-or-self is matched
    covered: bool,
    /// Some ancestor-or-self is a storage group
    in_storage_group: bool,
}

/// Count the distinct nodes at `level` that are matched, lie below a
/// matched node, or lie above one. With `storage_group_only` nodes
/// outside every storage group are ignored.
pub fn count_nodes_at_level<T: NodeTable>(
    table: &T,
    pattern: &PartialPath,
    level: usize,
    storage_group_only: bool,
) -> MetaStoreResult<usize> {
    let root = PartialPath::root();
    let Some(record) = load_node(table, &root)? else {
        return Ok(0);
    };
    let cursor = PatternCursor::new(pattern).advance(ROOT);
    let mut stack = vec![LevelFrame {
        path: root,
        record,
        cursor,
        covered: false,
        in_storage_group: false,
    }];

    let mut count = 0;
    while let Some(frame) = stack.pop() {
        let covered = frame.covered || frame.cursor.is_match();
        let in_storage_group = frame.in_storage_group || frame.record.is_storage_group();

        if frame.path.depth() == level {
            let counted = (in_storage_group || !storage_group_only)
                && (covered
                    || (!frame.record.is_measurement()
                        && match_below(table, &frame.path, &frame.cursor)?));
            if counted {
                count += 1;
            }
            continue;
        }
        if frame.record.is_measurement() || (!covered && !frame.cursor.can_descend()) {
            continue;
        }
        for (child, record) in children(table, &frame.path)? {
            let cursor = frame.cursor.advance(child.last());
            if !covered && cursor.is_dead() {
                continue;
            }
            stack.push(LevelFrame {
                path: child,
                record,
                cursor,
                covered,
                in_storage_group,
            });
        }
    }
    Ok(count)
}

/// Storage group that is `path` or one of its ancestors
pub fn storage_group_of<G: GroupTable>(
    groups: &G,
    path: &PartialPath,
) -> MetaStoreResult<Option<PartialPath>> {
    for len in 2..=path.len() {
        let candidate = path.prefix(len);
        if groups.get(candidate.to_string().as_str())?.is_some() {
            return Ok(Some(candidate));
        }
    }
    Ok(None)
}

/// Whether a storage group is declared strictly below `path`
pub fn has_storage_group_below<G: GroupTable>(
    groups: &G,
    path: &PartialPath,
) -> MetaStoreResult<bool> {
    let prefix = keys::subtree_prefix(path);
    match groups.range::<&str>(prefix.as_str()..)?.next() {
        Some(entry) => Ok(entry?.0.value().starts_with(prefix.as_str())),
        None => Ok(false),
    }
}

/// Storage groups matched by `pattern`, sorted by path. Only the key
/// range under the pattern's concrete prefix is scanned.
pub fn storage_groups_matching<G: GroupTable>(
    groups: &G,
    pattern: &PartialPath,
) -> MetaStoreResult<Vec<PartialPath>> {
    let start = pattern.concrete_prefix().to_string();
    let mut result = Vec::new();
    for entry in groups.range::<&str>(start.as_str()..)? {
        let (key, _) = entry?;
        let key = key.value();
        if !key.starts_with(start.as_str()) {
            break;
        }
        let path = PartialPath::parse(key)?;
        if pattern.matches(&path) {
            result.push(path);
        }
    }
    Ok(result)
}

/// Keys of `table` starting with `prefix`
pub fn keys_with_prefix<V, T>(table: &T, prefix: &str) -> MetaStoreResult<Vec<String>>
where
    V: redb::Value + 'static,
    T: ReadableTable<&'static str, V>,
{
    let mut result = Vec::new();
    for entry in table.range::<&str>(prefix..)? {
        let (key, _) = entry?;
        let key = key.value();
        if !key.starts_with(prefix) {
            break;
        }
        result.push(key.to_string());
    }
    Ok(result)
}
