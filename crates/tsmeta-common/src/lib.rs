//! tsmeta Common - Shared types and utilities
//!
//! This crate provides the path lexicon, schema types, error definitions
//! and configuration used across all tsmeta components.

pub mod config;
pub mod error;
pub mod path;
pub mod schema_tree;
pub mod types;

pub use config::{Config, MetaStoreConfig, SchemaCacheConfig};
pub use error::{Error, Result};
pub use path::{PartialPath, PathError, PatternCursor};
pub use schema_tree::{SchemaEntry, SchemaTree};
pub use types::*;
