//! Materialization options and workspace layout.

use crate::core::types::ComponentId;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default registry prefix for emitted package names.
pub const DEFAULT_REGISTRY_PREFIX: &str = "@bit";

/// Default components directory, relative to the workspace root.
pub const DEFAULT_COMPONENTS_DIR: &str = "components";

/// Default nested-dependency store, relative to the workspace root.
pub const DEFAULT_DEPENDENCIES_DIR: &str = "components/.dependencies";

const LOCAL_SCOPE_DIR: &str = "_local";

/// When planned writes reach the disk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WriteMode {
    /// Plan everything first, then persist all plans.
    ///
    /// Every safety check has passed before the first byte is written.
    #[default]
    Deferred,
    /// Persist each plan as soon as it is produced.
    Immediate,
}

/// Options for a materialization run.
///
/// Deserializes from camelCase JSON; missing fields take the defaults below.
///
/// | field | default |
/// |---|---|
/// | `write_to_path` | `None` |
/// | `override_existing` | `false` |
/// | `write_package_json` | `true` |
/// | `write_config` | `false` |
/// | `write_bit_dependencies` | `false` |
/// | `create_npm_link_files` | `false` |
/// | `write_dists` | `true` |
/// | `save_dependencies_as_components` | `false` |
/// | `install_npm_packages` | `true` |
/// | `install_peer_dependencies` | `false` |
/// | `add_to_root_package_json` | `true` |
/// | `manage_workspaces` | `false` |
/// | `isolated` | `false` |
/// | `exclude_registry_prefix` | `false` |
/// | `registry_prefix` | `"@bit"` |
/// | `verbose` / `silent` | `false` |
/// | `max_parallel_writes` | `0` (unlimited) |
/// | `mode` | [`WriteMode::Deferred`] |
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MaterializeOptions {
    /// Write every top-level component to this path instead of the default layout.
    pub write_to_path: Option<PathBuf>,
    /// Allow replacing a non-empty, untracked directory.
    #[serde(rename = "override")]
    pub override_existing: bool,
    /// Emit `package.json` per component.
    pub write_package_json: bool,
    /// Emit a standalone config file per top-level component.
    pub write_config: bool,
    /// Put component dependencies into `package.json` even when written as components.
    pub write_bit_dependencies: bool,
    /// Emit indirection link files instead of symlinks.
    pub create_npm_link_files: bool,
    /// Emit compiled output for imported components.
    pub write_dists: bool,
    /// Write dependencies as component copies regardless of remote hub capability.
    pub save_dependencies_as_components: bool,
    /// Run the package installer.
    pub install_npm_packages: bool,
    /// Install peer dependencies as well.
    pub install_peer_dependencies: bool,
    /// Register imported components in the root `package.json`.
    pub add_to_root_package_json: bool,
    /// Register written directories as workspace members in the root `package.json`.
    pub manage_workspaces: bool,
    /// Ephemeral mode: no tracking map, every top-level component is authored.
    pub isolated: bool,
    /// Strip the registry prefix from emitted package names.
    pub exclude_registry_prefix: bool,
    /// Registry prefix for emitted package names.
    pub registry_prefix: String,
    /// Verbose installer output.
    pub verbose: bool,
    /// Silence installer output.
    pub silent: bool,
    /// Maximum concurrent component writes (0 = unlimited).
    pub max_parallel_writes: usize,
    /// When planned writes are persisted.
    pub mode: WriteMode,
}

impl Default for MaterializeOptions {
    fn default() -> Self {
        Self {
            write_to_path: None,
            override_existing: false,
            write_package_json: true,
            write_config: false,
            write_bit_dependencies: false,
            create_npm_link_files: false,
            write_dists: true,
            save_dependencies_as_components: false,
            install_npm_packages: true,
            install_peer_dependencies: false,
            add_to_root_package_json: true,
            manage_workspaces: false,
            isolated: false,
            exclude_registry_prefix: false,
            registry_prefix: DEFAULT_REGISTRY_PREFIX.to_string(),
            verbose: false,
            silent: false,
            max_parallel_writes: 0,
            mode: WriteMode::Deferred,
        }
    }
}

impl MaterializeOptions {
    /// Rejects option combinations the pipeline cannot honour.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidOptions`] when:
    /// - `install_peer_dependencies` is set without `install_npm_packages`
    /// - both `verbose` and `silent` are set
    /// - `write_to_path` is set for more than one top-level component
    pub fn validate(&self, top_level_count: usize) -> Result<()> {
        if self.install_peer_dependencies && !self.install_npm_packages {
            return Err(Error::InvalidOptions {
                message: "installPeerDependencies requires installNpmPackages".to_string(),
            });
        }
        if self.verbose && self.silent {
            return Err(Error::InvalidOptions {
                message: "verbose and silent are mutually exclusive".to_string(),
            });
        }
        if self.write_to_path.is_some() && top_level_count > 1 {
            return Err(Error::InvalidOptions {
                message: format!(
                    "writeToPath places a single component, but {top_level_count} were requested"
                ),
            });
        }
        Ok(())
    }

    /// Registry prefix for emitted package names, `None` when excluded.
    #[must_use]
    pub fn package_prefix(&self) -> Option<&str> {
        if self.exclude_registry_prefix {
            None
        } else {
            Some(self.registry_prefix.as_str())
        }
    }

    /// The requested output path as an absolute path.
    #[must_use]
    pub fn requested_path(&self) -> Option<PathBuf> {
        self.write_to_path.as_deref().map(absolutize)
    }
}

/// Where things go inside a workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceLayout {
    root: PathBuf,
    components_dir: PathBuf,
    dependencies_dir: PathBuf,
}

impl WorkspaceLayout {
    /// Creates the default layout rooted at `root`.
    ///
    /// # Example
    ///
    /// ```
    /// use bitsmith_materializer::{ComponentId, WorkspaceLayout};
    /// use std::path::Path;
    ///
    /// let layout = WorkspaceLayout::new("/ws");
    /// let id = ComponentId::new("button").with_scope("ui").with_version("1.0.0");
    /// assert_eq!(layout.component_dir(&id), Path::new("/ws/components/ui/button"));
    /// assert_eq!(
    ///     layout.dependency_dir(&id),
    ///     Path::new("/ws/components/.dependencies/ui/button/1.0.0")
    /// );
    /// ```
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: absolutize(&root.into()),
            components_dir: PathBuf::from(DEFAULT_COMPONENTS_DIR),
            dependencies_dir: PathBuf::from(DEFAULT_DEPENDENCIES_DIR),
        }
    }

    /// Overrides the components directory (relative to the root).
    #[must_use]
    pub fn with_components_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.components_dir = dir.into();
        self
    }

    /// Overrides the nested-dependency store (relative to the root).
    #[must_use]
    pub fn with_dependencies_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dependencies_dir = dir.into();
        self
    }

    /// Absolute workspace root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Default directory of an authored or imported component. Version-less.
    #[must_use]
    pub fn component_dir(&self, id: &ComponentId) -> PathBuf {
        let mut dir = self.root.join(&self.components_dir);
        push_identity(&mut dir, id);
        dir
    }

    /// Directory of a nested dependency, qualified by scope and exact version.
    #[must_use]
    pub fn dependency_dir(&self, id: &ComponentId) -> PathBuf {
        let mut dir = self.root.join(&self.dependencies_dir);
        push_identity(&mut dir, id);
        dir.push(id.version.as_deref().unwrap_or("latest"));
        dir
    }

    /// Converts an absolute path into its tracked form (root-relative when inside the workspace).
    #[must_use]
    pub fn to_tracked(&self, path: &Path) -> PathBuf {
        path.strip_prefix(&self.root)
            .map_or_else(|_| path.to_path_buf(), Path::to_path_buf)
    }

    /// Resolves a tracked path against the workspace root.
    #[must_use]
    pub fn resolve(&self, tracked: &Path) -> PathBuf {
        self.root.join(tracked)
    }
}

/// Appends `<scope>/<namespace>/<name>`; unscoped identities go under `_local`.
fn push_identity(dir: &mut PathBuf, id: &ComponentId) {
    dir.push(id.scope.as_deref().unwrap_or(LOCAL_SCOPE_DIR));
    if let Some(namespace) = &id.namespace {
        dir.push(namespace);
    }
    dir.push(&id.name);
}

/// Makes `path` absolute against the current directory without touching the filesystem.
pub(crate) fn absolutize(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}
