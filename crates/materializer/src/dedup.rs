//! Run-scoped dependency deduplication.

use crate::core::types::ComponentId;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Maps dependency identities to the path they were claimed at during one run.
///
/// Once an identity is claimed no further write for it happens in the same
/// run; later references resolve to the cached path. Never persisted, and
/// never shared between runs.
#[derive(Debug, Default)]
pub struct DedupCache {
    entries: HashMap<ComponentId, PathBuf>,
}

impl DedupCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Path `id` was claimed at, if any.
    #[must_use]
    pub fn get(&self, id: &ComponentId) -> Option<&Path> {
        self.entries.get(id).map(PathBuf::as_path)
    }

    /// Claims `id` at `path`.
    ///
    /// Returns `false` and keeps the earlier claim when `id` is already present.
    pub fn claim(&mut self, id: &ComponentId, path: PathBuf) -> bool {
        if self.entries.contains_key(id) {
            return false;
        }
        self.entries.insert(id.clone(), path);
        true
    }

    /// Number of claimed identities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing has been claimed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
