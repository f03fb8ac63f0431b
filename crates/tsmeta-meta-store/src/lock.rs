//! Per-domain write serialization.
//!
//! Every mutation of the namespace below `root.<name>` runs under the
//! mutex of domain `<name>`. Storage groups never nest and always sit
//! below a first-level node, so two writers touching different
//! top-level subtrees never contend, while a declare and a create that
//! race on the same storage group are serialized.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use tsmeta_common::PartialPath;

#[derive(Default)]
pub struct LockDomains {
    domains: DashMap<String, Arc<Mutex<()>>>,
}

impl LockDomains {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Domain name of a path: its first segment below `root`
    #[must_use]
    pub fn domain_of(path: &PartialPath) -> Option<&str> {
        path.nodes().get(1).map(String::as_str)
    }

    /// Mutex guarding `domain`, created on first use
    #[must_use]
    pub fn get(&self, domain: &str) -> Arc<Mutex<()>> {
        if let Some(lock) = self.domains.get(domain) {
            return Arc::clone(lock.value());
        }
        Arc::clone(
            self.domains
                .entry(domain.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .value(),
        )
    }

    /// Number of domains seen so far
    #[must_use]
    pub fn len(&self) -> usize {
        self.domains.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.domains.is_empty()
    }
}
