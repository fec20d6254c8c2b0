//! Root `package.json` maintenance.

use crate::core::traits::WorkspaceManifestWriter;
use crate::core::types::WrittenComponent;
use crate::error::{Error, Result};
use crate::writer::PACKAGE_JSON;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

/// Edits the `package.json` at the workspace root.
///
/// A missing file is treated as `{}`. Keys this writer does not manage are
/// kept as they are.
#[derive(Debug, Clone)]
pub struct RootPackageJson {
    root: PathBuf,
    registry_prefix: Option<String>,
}

impl RootPackageJson {
    /// Creates a writer for the workspace at `root`.
    ///
    /// `registry_prefix` is used to name component dependencies; `None` emits
    /// unprefixed names.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, registry_prefix: Option<&str>) -> Self {
        Self {
            root: root.into(),
            registry_prefix: registry_prefix.map(str::to_string),
        }
    }

    /// Path of the managed manifest.
    #[must_use]
    pub fn path(&self) -> PathBuf {
        self.root.join(PACKAGE_JSON)
    }

    async fn read(&self) -> Result<Map<String, Value>> {
        let path = self.path();
        let contents = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Map::new()),
            Err(e) => return Err(Error::io(e, &path, "read root package.json")),
        };
        match serde_json::from_str::<Value>(&contents).map_err(|source| Error::Json {
            source,
            path: Some(path.clone()),
        })? {
            Value::Object(doc) => Ok(doc),
            _ => Err(Error::Manifest {
                path,
                message: "not a JSON object".to_string(),
            }),
        }
    }

    async fn write(&self, doc: Map<String, Value>) -> Result<()> {
        let path = self.path();
        let mut contents =
            serde_json::to_string_pretty(&Value::Object(doc)).map_err(|source| Error::Json {
                source,
                path: Some(path.clone()),
            })?;
        contents.push('\n');
        tokio::fs::write(&path, contents)
            .await
            .map_err(|e| Error::write(e, &path, "write root package.json"))
    }

    /// Path as written into the manifest: root-relative with forward slashes when possible.
    fn manifest_path(&self, path: &Path) -> String {
        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        let rendered = relative.to_string_lossy().replace('\\', "/");
        if rendered.is_empty() {
            ".".to_string()
        } else {
            rendered
        }
    }
}

#[async_trait]
impl WorkspaceManifestWriter for RootPackageJson {
    async fn add_workspace_entries(&self, paths: &[PathBuf]) -> Result<()> {
        if paths.is_empty() {
            return Ok(());
        }
        let mut doc = self.read().await?;
        let entries = doc
            .entry("workspaces")
            .or_insert_with(|| Value::Array(Vec::new()));
        let Value::Array(entries) = entries else {
            tracing::warn!(
                path = %self.path().display(),
                "Root package.json has a non-array workspaces field, leaving it untouched"
            );
            return Ok(());
        };

        let mut added = 0_usize;
        for path in paths {
            let entry = Value::String(self.manifest_path(path));
            if !entries.contains(&entry) {
                entries.push(entry);
                added += 1;
            }
        }
        tracing::debug!(added, "Updated workspace entries");
        self.write(doc).await
    }

    async fn add_components_to_root(&self, components: &[WrittenComponent]) -> Result<()> {
        if components.is_empty() {
            return Ok(());
        }
        let mut doc = self.read().await?;
        let dependencies = doc
            .entry("dependencies")
            .or_insert_with(|| Value::Object(Map::new()));
        let Value::Object(dependencies) = dependencies else {
            return Err(Error::Manifest {
                path: self.path(),
                message: "dependencies is not an object".to_string(),
            });
        };

        for component in components {
            let name = component.id.package_name(self.registry_prefix.as_deref());
            let location = format!("file:{}", self.manifest_path(&component.path));
            dependencies.insert(name, Value::String(location));
        }
        tracing::debug!(
            components = components.len(),
            "Registered components in root package.json"
        );
        self.write(doc).await
    }
}
