//! File-backed tracking map.
//!
//! The workspace keeps a `.bitmap` JSON file at its root recording where every
//! known component lives and which components depend on which. Root
//! directories are stored relative to the workspace root.

use crate::core::traits::TrackingMap;
use crate::core::types::{ComponentId, Origin, TrackingRecord};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

/// File name of the tracking map inside a workspace.
pub const BITMAP_FILE_NAME: &str = ".bitmap";

/// JSON-backed [`TrackingMap`].
///
/// Authored and imported components are keyed without their version, so at
/// most one version of each can be tracked; nested dependencies are keyed by
/// exact identity and several versions may coexist.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BitMap {
    #[serde(skip)]
    path: Option<PathBuf>,

    #[serde(default)]
    components: BTreeMap<String, TrackingRecord>,

    /// Parent identity -> child identities.
    #[serde(default)]
    dependencies: BTreeMap<String, BTreeSet<String>>,
}

impl BitMap {
    /// Creates an empty in-memory map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads the map stored in `workspace_root`, or an empty one if there is none yet.
    ///
    /// # Errors
    ///
    /// Returns an error when the file exists but cannot be read or parsed.
    pub fn load(workspace_root: &Path) -> Result<Self> {
        let path = workspace_root.join(BITMAP_FILE_NAME);
        let mut map = match std::fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str::<Self>(&contents).map_err(|source| Error::Json {
                source,
                path: Some(path.clone()),
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(e) => return Err(Error::io(e, &path, "read tracking map")),
        };
        map.validate(&path)?;
        map.path = Some(path);
        Ok(map)
    }

    /// Writes the map back to the file it was loaded from.
    ///
    /// # Errors
    ///
    /// Returns an error when the map was not loaded from a file or the write fails.
    pub fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Err(Error::TrackingMap {
                path: PathBuf::from(BITMAP_FILE_NAME),
                message: "in-memory tracking map has no backing file".to_string(),
            });
        };
        let contents = serde_json::to_string_pretty(self).map_err(|source| Error::Json {
            source,
            path: Some(path.clone()),
        })?;
        std::fs::write(path, contents).map_err(|e| Error::io(e, path, "write tracking map"))
    }

    /// Number of tracked components.
    #[must_use]
    pub fn len(&self) -> usize {
        self.components.len()
    }

    /// Whether nothing is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Identities `parent` depends on, in string form.
    #[must_use]
    pub fn dependencies_of(&self, parent: &ComponentId) -> Vec<String> {
        self.dependencies
            .get(&parent.to_string())
            .map(|children| children.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Every tracked record.
    pub fn records(&self) -> impl Iterator<Item = &TrackingRecord> {
        self.components.values()
    }

    fn key(record_id: &ComponentId, origin: Origin) -> String {
        match origin {
            Origin::Nested => record_id.to_string(),
            Origin::Authored | Origin::Imported => record_id.to_string_without_version(),
        }
    }

    fn validate(&self, path: &Path) -> Result<()> {
        for (key, record) in &self.components {
            if *key != Self::key(&record.id, record.origin) {
                return Err(Error::TrackingMap {
                    path: path.to_path_buf(),
                    message: format!("entry '{key}' does not match its record '{}'", record.id),
                });
            }
        }
        Ok(())
    }
}

impl TrackingMap for BitMap {
    fn get_ignoring_version(&self, id: &ComponentId) -> Option<TrackingRecord> {
        self.components
            .get(&id.to_string_without_version())
            .filter(|record| record.origin != Origin::Nested)
            .cloned()
    }

    fn get_exact(&self, id: &ComponentId) -> Option<TrackingRecord> {
        [id.to_string(), id.to_string_without_version()]
            .iter()
            .filter_map(|key| self.components.get(key))
            .find(|record| record.id == *id)
            .cloned()
    }

    fn add_dependency_edge(&mut self, parent: &ComponentId, child: &ComponentId) {
        self.dependencies
            .entry(parent.to_string())
            .or_default()
            .insert(child.to_string());
    }

    fn record_component(&mut self, record: TrackingRecord) {
        let key = Self::key(&record.id, record.origin);
        if let Some(previous) = self.components.get(&key)
            && previous.origin != record.origin
        {
            tracing::debug!(
                component = %record.id,
                from = %previous.origin,
                to = %record.origin,
                "Tracking record changes origin"
            );
        }
        self.components.insert(key, record);
    }

    fn set_root_dir(&mut self, id: &ComponentId, root_dir: PathBuf) -> bool {
        let key = if self.components.contains_key(&id.to_string()) {
            id.to_string()
        } else {
            id.to_string_without_version()
        };
        match self.components.get_mut(&key) {
            Some(record) => {
                record.root_dir = root_dir;
                true
            }
            None => false,
        }
    }
}

/// A tracking map that knows nothing and remembers nothing.
///
/// Stands in for the real map in isolated runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct DetachedTrackingMap;

impl TrackingMap for DetachedTrackingMap {
    fn get_ignoring_version(&self, _id: &ComponentId) -> Option<TrackingRecord> {
        None
    }

    fn get_exact(&self, _id: &ComponentId) -> Option<TrackingRecord> {
        None
    }

    fn add_dependency_edge(&mut self, _parent: &ComponentId, _child: &ComponentId) {}

    fn record_component(&mut self, _record: TrackingRecord) {}

    fn set_root_dir(&mut self, _id: &ComponentId, _root_dir: PathBuf) -> bool {
        false
    }
}
