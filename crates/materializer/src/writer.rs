//! Filesystem implementation of [`ComponentWriter`].

use crate::core::traits::ComponentWriter;
use crate::core::types::{SourceFile, WritePlan, WrittenComponent};
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde_json::{Map, Value, json};
use std::path::{Component as PathComponent, Path};

/// Package manifest file name.
pub const PACKAGE_JSON: &str = "package.json";

/// Standalone component config file name.
pub const COMPONENT_CONFIG: &str = "component.json";

/// Directory compiled output is written to, inside the component directory.
pub const DIST_DIR: &str = "dist";

/// Writes component files, dists, `package.json` and config into the plan's destination.
///
/// Rewriting an identical plan produces identical files.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsComponentWriter;

impl FsComponentWriter {
    /// Creates a writer.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ComponentWriter for FsComponentWriter {
    async fn persist(&self, plan: &WritePlan<'_>) -> Result<WrittenComponent> {
        let destination = &plan.destination;

        if plan.replace_existing {
            tracing::info!(path = %destination.display(), "Clearing directory before write");
            match tokio::fs::remove_dir_all(destination).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(Error::write(e, destination, "clear existing directory")),
            }
        }
        tokio::fs::create_dir_all(destination)
            .await
            .map_err(|e| Error::write(e, destination, "create component directory"))?;

        for file in &plan.component.files {
            write_file(destination, file).await?;
        }

        if plan.write_dists
            && let Some(dists) = &plan.component.dists
        {
            let dist_dir = destination.join(DIST_DIR);
            for file in dists {
                write_file(&dist_dir, file).await?;
            }
        }

        if plan.write_package_json {
            write_json(&destination.join(PACKAGE_JSON), &package_json(plan)).await?;
        }

        if plan.write_config
            && let Some(config_dir) = &plan.config_dir
        {
            let config = json!({
                "id": plan.component.id.to_string(),
                "origin": plan.origin,
                "dependencies": plan
                    .component
                    .dependencies
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>(),
            });
            write_json(&config_dir.join(COMPONENT_CONFIG), &config).await?;
        }

        tracing::debug!(
            component = %plan.component.id,
            origin = %plan.origin,
            path = %destination.display(),
            files = plan.component.files.len(),
            "Wrote component"
        );

        Ok(WrittenComponent::from_plan(plan))
    }
}

/// Builds the `package.json` document for a plan.
///
/// Component dependencies are listed as packages when they are not written as
/// component copies, or when `write_bit_dependencies` forces them in.
#[must_use]
pub fn package_json(plan: &WritePlan<'_>) -> Value {
    let component = plan.component;
    let prefix = plan.registry_prefix.as_deref();
    let manifest = component.manifest.clone().unwrap_or_default();

    let mut doc: Map<String, Value> = manifest.extra;
    doc.insert(
        "name".to_string(),
        Value::String(component.id.package_name(prefix)),
    );
    if let Some(version) = &component.id.version {
        doc.insert("version".to_string(), Value::String(version.clone()));
    }

    let mut dependencies = manifest.dependencies;
    if !plan.dependencies_saved_as_components || plan.write_bit_dependencies {
        for dependency in &component.dependencies {
            dependencies.insert(
                dependency.package_name(prefix),
                dependency.version.clone().unwrap_or_else(|| "*".to_string()),
            );
        }
    }
    doc.insert("dependencies".to_string(), json!(dependencies));

    if !manifest.peer_dependencies.is_empty() {
        doc.insert(
            "peerDependencies".to_string(),
            json!(manifest.peer_dependencies),
        );
    }

    Value::Object(doc)
}

async fn write_file(root: &Path, file: &SourceFile) -> Result<()> {
    let is_contained = file
        .path
        .components()
        .all(|part| matches!(part, PathComponent::Normal(_) | PathComponent::CurDir));
    if !is_contained {
        return Err(Error::write(
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "component file paths must stay inside the component directory",
            ),
            &file.path,
            "validate component file path",
        ));
    }

    let target = root.join(&file.path);
    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| Error::write(e, parent, "create directory"))?;
    }
    tokio::fs::write(&target, &file.contents)
        .await
        .map_err(|e| Error::write(e, &target, "write component file"))
}

async fn write_json(path: &Path, value: &Value) -> Result<()> {
    let mut contents = serde_json::to_string_pretty(value).map_err(|source| Error::Json {
        source,
        path: Some(path.to_path_buf()),
    })?;
    contents.push('\n');
    tokio::fs::write(path, contents)
        .await
        .map_err(|e| Error::write(e, path, "write json file"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{Component, ComponentId, Origin, PackageManifest};
    use std::collections::BTreeMap;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn component() -> Component {
        let mut component =
            Component::new(ComponentId::new("button").with_scope("ui").with_version("1.0.0"));
        component.files = vec![
            SourceFile::text("index.js", "export * from './button';"),
            SourceFile::text("src/button.js", "export const Button = 1;"),
        ];
        component.dists = Some(vec![SourceFile::text("index.js", "module.exports = {};")]);
        component.dependencies = vec![ComponentId::new("utils").with_scope("ui").with_version("2.0.0")];
        component.manifest = Some(PackageManifest {
            dependencies: BTreeMap::from([("lodash".to_string(), "^4.17.0".to_string())]),
            peer_dependencies: BTreeMap::from([("react".to_string(), "^18.0.0".to_string())]),
            extra: Map::new(),
        });
        component
    }

    fn plan<'a>(component: &'a Component, destination: PathBuf) -> WritePlan<'a> {
        WritePlan {
            component,
            destination,
            origin: Origin::Imported,
            config_dir: None,
            existing: None,
            parent: None,
            dependencies_saved_as_components: true,
            write_dists: false,
            write_config: false,
            write_package_json: true,
            write_bit_dependencies: false,
            replace_existing: false,
            registry_prefix: Some("@bit".to_string()),
        }
    }

    fn read_json(path: &Path) -> Value {
        serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_writes_files_and_package_json() {
        let temp = TempDir::new().unwrap();
        let component = component();
        let destination = temp.path().join("components/button");

        let written = FsComponentWriter::new()
            .persist(&plan(&component, destination.clone()))
            .await
            .unwrap();

        assert_eq!(written.path, destination);
        assert!(destination.join("index.js").exists());
        assert!(destination.join("src/button.js").exists());
        assert!(!destination.join(DIST_DIR).exists());
        assert!(!destination.join(COMPONENT_CONFIG).exists());

        let manifest = read_json(&destination.join(PACKAGE_JSON));
        assert_eq!(manifest["name"], "@bit/ui.button");
        assert_eq!(manifest["version"], "1.0.0");
        assert_eq!(manifest["dependencies"]["lodash"], "^4.17.0");
        assert!(manifest["dependencies"].get("@bit/ui.utils").is_none());
        assert_eq!(manifest["peerDependencies"]["react"], "^18.0.0");
    }

    #[tokio::test]
    async fn test_package_style_dependencies_are_listed() {
        let temp = TempDir::new().unwrap();
        let component = component();
        let mut plan = plan(&component, temp.path().join("button"));
        plan.dependencies_saved_as_components = false;
        plan.registry_prefix = None;

        FsComponentWriter::new().persist(&plan).await.unwrap();

        let manifest = read_json(&temp.path().join("button").join(PACKAGE_JSON));
        assert_eq!(manifest["name"], "ui.button");
        assert_eq!(manifest["dependencies"]["ui.utils"], "2.0.0");
    }

    #[tokio::test]
    async fn test_writes_dists_and_config_when_requested() {
        let temp = TempDir::new().unwrap();
        let component = component();
        let destination = temp.path().join("button");
        let mut plan = plan(&component, destination.clone());
        plan.write_dists = true;
        plan.write_config = true;
        plan.config_dir = Some(destination.clone());

        FsComponentWriter::new().persist(&plan).await.unwrap();

        assert!(destination.join(DIST_DIR).join("index.js").exists());
        let config = read_json(&destination.join(COMPONENT_CONFIG));
        assert_eq!(config["id"], "ui/button@1.0.0");
        assert_eq!(config["origin"], "IMPORTED");
        assert_eq!(config["dependencies"][0], "ui/utils@2.0.0");
    }

    #[tokio::test]
    async fn test_replace_existing_clears_directory() {
        let temp = TempDir::new().unwrap();
        let component = component();
        let destination = temp.path().join("button");
        fs::create_dir_all(&destination).unwrap();
        fs::write(destination.join("stray.txt"), "unrelated").unwrap();
        let mut plan = plan(&component, destination.clone());
        plan.replace_existing = true;

        FsComponentWriter::new().persist(&plan).await.unwrap();

        assert!(!destination.join("stray.txt").exists());
        assert!(destination.join("index.js").exists());
    }

    #[tokio::test]
    async fn test_rewrite_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let component = component();
        let destination = temp.path().join("button");
        let plan = plan(&component, destination.clone());
        let writer = FsComponentWriter::new();

        writer.persist(&plan).await.unwrap();
        let first = fs::read(destination.join(PACKAGE_JSON)).unwrap();
        writer.persist(&plan).await.unwrap();
        let second = fs::read(destination.join(PACKAGE_JSON)).unwrap();

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_rejects_paths_outside_component() {
        let temp = TempDir::new().unwrap();
        let mut component = component();
        component.files = vec![SourceFile::text("../escape.js", "nope")];

        let result = FsComponentWriter::new()
            .persist(&plan(&component, temp.path().join("button")))
            .await;

        assert!(matches!(result, Err(Error::WriteFailure { .. })));
        assert!(!temp.path().join("escape.js").exists());
    }
}
