//! Core types for components, tracking records and write plans.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};

/// Globally unique identity of a component version.
///
/// Two identities are equal iff their string forms match. The version is only
/// significant for nested dependencies; authored and imported components are
/// version-singletons in a workspace, see [`ComponentId::same_component`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentId {
    /// Scope the component was exported to, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,

    /// Namespace inside the scope.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    /// Component name.
    pub name: String,

    /// Exact version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl ComponentId {
    /// Creates an unscoped, unversioned identity.
    ///
    /// # Example
    ///
    /// ```
    /// use bitsmith_materializer::ComponentId;
    ///
    /// let id = ComponentId::new("button").with_scope("ui").with_version("1.0.0");
    /// assert_eq!(id.to_string(), "ui/button@1.0.0");
    /// ```
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            scope: None,
            namespace: None,
            name: name.into(),
            version: None,
        }
    }

    /// Sets the scope.
    #[must_use]
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    /// Sets the namespace.
    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Sets the version.
    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Returns a copy of this identity without its version.
    #[must_use]
    pub fn without_version(&self) -> Self {
        Self {
            version: None,
            ..self.clone()
        }
    }

    /// String form without the version suffix.
    #[must_use]
    pub fn to_string_without_version(&self) -> String {
        let mut out = String::new();
        for part in [&self.scope, &self.namespace].into_iter().flatten() {
            out.push_str(part);
            out.push('/');
        }
        out.push_str(&self.name);
        out
    }

    /// Whether both identities name the same component, ignoring versions.
    #[must_use]
    pub fn same_component(&self, other: &Self) -> bool {
        self.to_string_without_version() == other.to_string_without_version()
    }

    /// Package name emitted into `package.json` files and `node_modules`.
    ///
    /// # Example
    ///
    /// ```
    /// use bitsmith_materializer::ComponentId;
    ///
    /// let id = ComponentId::new("button").with_scope("ui").with_namespace("forms");
    /// assert_eq!(id.package_name(Some("@bit")), "@bit/ui.forms.button");
    /// assert_eq!(id.package_name(None), "ui.forms.button");
    /// ```
    #[must_use]
    pub fn package_name(&self, registry_prefix: Option<&str>) -> String {
        let dotted = [&self.scope, &self.namespace]
            .into_iter()
            .flatten()
            .map(String::as_str)
            .chain(std::iter::once(self.name.as_str()))
            .collect::<Vec<_>>()
            .join(".");
        match registry_prefix {
            Some(prefix) => format!("{prefix}/{dotted}"),
            None => dotted,
        }
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_string_without_version())?;
        if let Some(version) = &self.version {
            write!(f, "@{version}")?;
        }
        Ok(())
    }
}

impl PartialEq for ComponentId {
    fn eq(&self, other: &Self) -> bool {
        self.to_string() == other.to_string()
    }
}

impl Eq for ComponentId {}

impl Hash for ComponentId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.to_string().hash(state);
    }
}

/// How a component is placed in the workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Origin {
    /// The user's own code at the workspace root.
    Authored,
    /// Fetched from a remote into its own directory under the components root.
    Imported,
    /// A dependency materialized in the private dependency store, addressed by exact version.
    Nested,
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Authored => write!(f, "AUTHORED"),
            Self::Imported => write!(f, "IMPORTED"),
            Self::Nested => write!(f, "NESTED"),
        }
    }
}

/// A file to persist, relative to the component directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFile {
    /// Path relative to the component root.
    pub path: PathBuf,
    /// Raw file contents.
    pub contents: Vec<u8>,
}

impl SourceFile {
    /// Creates a file from UTF-8 text.
    #[must_use]
    pub fn text(path: impl Into<PathBuf>, contents: &str) -> Self {
        Self {
            path: path.into(),
            contents: contents.as_bytes().to_vec(),
        }
    }
}

/// Package-manifest data carried by a component.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageManifest {
    /// Package-style runtime dependencies (name -> range).
    #[serde(default)]
    pub dependencies: BTreeMap<String, String>,

    /// Peer dependencies (name -> range).
    #[serde(default)]
    pub peer_dependencies: BTreeMap<String, String>,

    /// Any other `package.json` fields, copied verbatim.
    #[serde(default, flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// A single write unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Component {
    /// Component identity.
    pub id: ComponentId,

    /// Source files to persist.
    #[serde(default)]
    pub files: Vec<SourceFile>,

    /// Compiled output, if the component was built.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dists: Option<Vec<SourceFile>>,

    /// Package-manifest data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manifest: Option<PackageManifest>,

    /// Direct component dependencies.
    #[serde(default)]
    pub dependencies: Vec<ComponentId>,
}

impl Component {
    /// Creates a component without files or dependencies.
    #[must_use]
    pub fn new(id: ComponentId) -> Self {
        Self {
            id,
            files: Vec::new(),
            dists: None,
            manifest: None,
            dependencies: Vec::new(),
        }
    }

    /// Peer dependencies declared by the component manifest.
    #[must_use]
    pub fn peer_dependencies(&self) -> BTreeMap<String, String> {
        self.manifest
            .as_ref()
            .map(|m| m.peer_dependencies.clone())
            .unwrap_or_default()
    }
}

/// A top-level component with its flattened dependency graph.
///
/// `all_dependencies` is free of duplicates within this graph; duplicates
/// across graphs are handled by the dedup cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentWithDependencies {
    /// The top-level component.
    pub component: Component,
    /// Every transitive dependency.
    #[serde(default)]
    pub all_dependencies: Vec<Component>,
}

impl ComponentWithDependencies {
    /// Creates a graph.
    #[must_use]
    pub fn new(component: Component, all_dependencies: Vec<Component>) -> Self {
        Self {
            component,
            all_dependencies,
        }
    }
}

/// Tracking-map record for a single component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingRecord {
    /// Tracked identity.
    pub id: ComponentId,
    /// Placement origin.
    pub origin: Origin,
    /// Root directory, relative to the workspace root when inside it.
    pub root_dir: PathBuf,
    /// Directory holding the component's config file, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_dir: Option<PathBuf>,
}

/// Everything the per-component writer needs to persist one component.
#[derive(Debug, Clone)]
pub struct WritePlan<'a> {
    /// The component being written.
    pub component: &'a Component,
    /// Absolute destination directory.
    pub destination: PathBuf,
    /// Placement origin.
    pub origin: Origin,
    /// Absolute config directory, if a config file is tracked or requested.
    pub config_dir: Option<PathBuf>,
    /// Tracking record that existed before this run.
    pub existing: Option<TrackingRecord>,
    /// Consuming component, for nested dependencies.
    pub parent: Option<ComponentId>,
    /// Whether this component's dependencies are written as component copies.
    pub dependencies_saved_as_components: bool,
    /// Emit compiled output.
    pub write_dists: bool,
    /// Emit a standalone config file.
    pub write_config: bool,
    /// Emit `package.json`.
    pub write_package_json: bool,
    /// Put component dependencies into `package.json` even when they are written as components.
    pub write_bit_dependencies: bool,
    /// Clear the destination before writing; set when override replaced an untracked directory.
    pub replace_existing: bool,
    /// Registry prefix for emitted package names, `None` when excluded.
    pub registry_prefix: Option<String>,
}

/// A component after it has been placed on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenComponent {
    /// Component identity.
    pub id: ComponentId,
    /// Absolute directory the component occupies.
    pub path: PathBuf,
    /// Placement origin.
    pub origin: Origin,
    /// Absolute config directory, if any.
    pub config_dir: Option<PathBuf>,
    /// Consuming component, for nested dependencies.
    pub parent: Option<ComponentId>,
    /// Whether its dependencies were written as component copies.
    pub dependencies_saved_as_components: bool,
}

impl WrittenComponent {
    /// Builds the written record for a persisted plan.
    #[must_use]
    pub fn from_plan(plan: &WritePlan<'_>) -> Self {
        Self {
            id: plan.component.id.clone(),
            path: plan.destination.clone(),
            origin: plan.origin,
            config_dir: plan.config_dir.clone(),
            parent: plan.parent.clone(),
            dependencies_saved_as_components: plan.dependencies_saved_as_components,
        }
    }
}

/// Resolved location of every identity placed during a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlacementResult {
    locations: HashMap<ComponentId, PathBuf>,
}

impl PlacementResult {
    /// Records where `id` lives.
    pub fn insert(&mut self, id: ComponentId, path: PathBuf) {
        self.locations.insert(id, path);
    }

    /// Location of `id`, if it was placed.
    #[must_use]
    pub fn get(&self, id: &ComponentId) -> Option<&Path> {
        self.locations.get(id).map(PathBuf::as_path)
    }

    /// Number of placed identities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.locations.len()
    }

    /// Whether nothing was placed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }
}

/// A directory the package installer runs in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallTarget {
    /// Component directory containing a `package.json`.
    pub dir: PathBuf,
    /// Peer dependencies of the component written there.
    pub peer_dependencies: BTreeMap<String, String>,
}

/// Input of the package installer.
#[derive(Debug, Clone)]
pub struct InstallRequest<'a> {
    /// Every graph of the run.
    pub graphs: &'a [ComponentWithDependencies],
    /// Written component directories.
    pub targets: Vec<InstallTarget>,
    /// Verbose installer output.
    pub verbose: bool,
    /// Silence installer output.
    pub silent: bool,
    /// Install peer dependencies too.
    pub install_peer_dependencies: bool,
}

/// Input of the linker.
#[derive(Debug, Clone)]
pub struct LinkRequest<'a> {
    /// Every graph of the run.
    pub graphs: &'a [ComponentWithDependencies],
    /// Top-level components written this run.
    pub written_components: &'a [WrittenComponent],
    /// Nested dependencies written this run.
    pub written_dependencies: &'a [WrittenComponent],
    /// Resolved location of every placed identity.
    pub placements: &'a PlacementResult,
    /// Emit indirection link files instead of symlinks.
    pub create_link_files: bool,
    /// Emit a `package.json` inside link directories.
    pub write_package_manifests: bool,
    /// Registry prefix for package names, `None` when excluded.
    pub registry_prefix: Option<&'a str>,
}
