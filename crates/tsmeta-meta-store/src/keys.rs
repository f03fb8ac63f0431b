//! Key layout of the namespace tables.
//!
//! Node keys carry a zero-padded depth prefix so that all children of a
//! node sit in one contiguous key range: the children of `root.sg` are
//! exactly the keys starting with `002:root.sg.`.

use tsmeta_common::PartialPath;

/// Deepest path the key layout can address (three decimal digits)
pub const MAX_DEPTH: usize = 999;

const DEPTH_WIDTH: usize = 4;

/// Key of a node in the `NODES` table
#[must_use]
pub fn node_key(path: &PartialPath) -> String {
    format!("{:03}:{path}", path.depth())
}

/// Key prefix shared by every direct child of `parent`
#[must_use]
pub fn children_prefix(parent: &PartialPath) -> String {
    format!("{:03}:{parent}.", parent.depth() + 1)
}

/// Key prefix shared by every node at `depth` below `ancestor`
#[must_use]
pub fn level_prefix(ancestor: &PartialPath, depth: usize) -> String {
    format!("{depth:03}:{ancestor}.")
}

/// Dotted path portion of a node key
#[must_use]
pub fn path_part(node_key: &str) -> &str {
    node_key.get(DEPTH_WIDTH..).unwrap_or_default()
}

/// Key of an alias entry in the `ALIASES` table
#[must_use]
pub fn alias_key(device: &PartialPath, alias: &str) -> String {
    format!("{device}.{alias}")
}

/// Prefix shared by every alias or storage group key below `path`
#[must_use]
pub fn subtree_prefix(path: &PartialPath) -> String {
    format!("{path}.")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_key_layout() {
        let path = PartialPath::parse("root.sg.d1").unwrap();
        assert_eq!(node_key(&PartialPath::root()), "000:root");
        assert_eq!(node_key(&path), "002:root.sg.d1");
        assert_eq!(children_prefix(&path), "003:root.sg.d1.");
        assert_eq!(path_part(&node_key(&path)), "root.sg.d1");
    }

    #[test]
    fn test_children_prefix_excludes_siblings() {
        let sg = PartialPath::parse("root.sg").unwrap();
        let child = node_key(&PartialPath::parse("root.sg.d1").unwrap());
        let cousin = node_key(&PartialPath::parse("root.sg1.d1").unwrap());
        assert!(child.starts_with(&children_prefix(&sg)));
        assert!(!cousin.starts_with(&children_prefix(&sg)));
    }

    #[test]
    fn test_alias_and_subtree_keys() {
        let device = PartialPath::parse("root.sg.d1").unwrap();
        assert_eq!(alias_key(&device, "temp"), "root.sg.d1.temp");
        assert_eq!(subtree_prefix(&device), "root.sg.d1.");
        assert_eq!(level_prefix(&device, 5), "005:root.sg.d1.");
    }
}
