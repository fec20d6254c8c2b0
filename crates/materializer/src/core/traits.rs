//! Collaborator contracts consumed by the materialization pipeline.
//!
//! The pipeline decides where components go and in which order things
//! happen; the actual file emission, package installation, linking and
//! tracking-map storage sit behind these traits. Reference implementations
//! live in [`crate::bitmap`], [`crate::writer`], [`crate::installer`],
//! [`crate::linker`], [`crate::manifest`] and [`crate::relocate`].

use crate::core::types::{
    ComponentId, InstallRequest, LinkRequest, TrackingRecord, WritePlan, WrittenComponent,
};
use crate::error::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Persists a single component according to a [`WritePlan`].
///
/// Implementations must be idempotent when invoked again with an identical
/// plan.
#[async_trait]
pub trait ComponentWriter: Send + Sync {
    /// Writes the component to `plan.destination`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::WriteFailure`](crate::Error::WriteFailure) when any
    /// file cannot be written.
    async fn persist(&self, plan: &WritePlan<'_>) -> Result<WrittenComponent>;
}

/// Persistent record of where each known component lives.
///
/// The pipeline reads it to decide placement and appends to it; it never
/// removes entries.
pub trait TrackingMap: Send {
    /// Looks up an authored or imported record, ignoring the version.
    fn get_ignoring_version(&self, id: &ComponentId) -> Option<TrackingRecord>;

    /// Looks up a record by exact identity, version included.
    fn get_exact(&self, id: &ComponentId) -> Option<TrackingRecord>;

    /// Registers that `parent` depends on `child`.
    fn add_dependency_edge(&mut self, parent: &ComponentId, child: &ComponentId);

    /// Inserts or updates the record for `record.id`.
    fn record_component(&mut self, record: TrackingRecord);

    /// Points an existing record at a new root directory.
    ///
    /// Returns `false` when no record exists for `id`.
    fn set_root_dir(&mut self, id: &ComponentId, root_dir: PathBuf) -> bool;
}

/// Answers whether a scope is served by a hub-capable remote.
pub trait RemoteRegistry: Send + Sync {
    /// Whether `scope` supports component-style dependency distribution.
    fn is_hub(&self, scope: &str) -> bool;
}

/// Installs package-style dependencies for written components.
#[async_trait]
pub trait PackageInstaller: Send + Sync {
    /// Runs the installation. Invoked at most once per run.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InstallFailure`](crate::Error::InstallFailure) when the
    /// package manager fails.
    async fn install(&self, request: &InstallRequest<'_>) -> Result<()>;
}

/// Makes written components resolvable from one another.
#[async_trait]
pub trait Linker: Send + Sync {
    /// Creates links between authored code, imported components and nested dependencies.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LinkFailure`](crate::Error::LinkFailure) when a link
    /// cannot be created.
    async fn link(&self, request: &LinkRequest<'_>) -> Result<()>;
}

/// Maintains the workspace's aggregate package manifest.
#[async_trait]
pub trait WorkspaceManifestWriter: Send + Sync {
    /// Adds directories to the workspace member list.
    async fn add_workspace_entries(&self, paths: &[PathBuf]) -> Result<()>;

    /// Adds written components as dependencies of the workspace root.
    async fn add_components_to_root(&self, components: &[WrittenComponent]) -> Result<()>;
}

/// Moves a directory tree.
#[async_trait]
pub trait DirectoryMover: Send + Sync {
    /// Moves `from` to `to`, replacing whatever is at `to`.
    async fn move_dir(&self, from: &Path, to: &Path) -> Result<()>;
}
