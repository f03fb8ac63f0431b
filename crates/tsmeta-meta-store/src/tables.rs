//! Redb table definitions for persistent schema storage.

use redb::TableDefinition;

// Namespace tree
// Key: "{depth:03}:{path}" (see `keys`), Value: bincode-encoded NodeRecord
pub const NODES: TableDefinition<&str, &[u8]> = TableDefinition::new("schema_nodes");

// Alias index
// Key: "{device_path}.{alias}", Value: canonical measurement path
pub const ALIASES: TableDefinition<&str, &str> = TableDefinition::new("measurement_aliases");

// Storage group boundaries
// Key: storage group path, Value: unit (the TTL lives on the node record)
pub const STORAGE_GROUPS: TableDefinition<&str, ()> = TableDefinition::new("storage_groups");
