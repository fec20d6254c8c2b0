//! Links written components to their component dependencies through `node_modules`.

use crate::core::traits::Linker;
use crate::core::types::{Component, ComponentId, LinkRequest};
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde_json::json;
use std::collections::HashMap;
use std::path::Path;

#[cfg(unix)]
use tokio::fs::symlink;
#[cfg(windows)]
use tokio::fs::symlink_dir as symlink;

/// Directory links are created in, inside each component directory.
pub const NODE_MODULES: &str = "node_modules";

/// Creates `node_modules/<package>` entries pointing at resolved dependency locations.
///
/// Dependencies without a placement were left to the package manager and are
/// not linked.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsLinker;

#[async_trait]
impl Linker for FsLinker {
    async fn link(&self, request: &LinkRequest<'_>) -> Result<()> {
        let components: HashMap<&ComponentId, &Component> = request
            .graphs
            .iter()
            .flat_map(|graph| std::iter::once(&graph.component).chain(&graph.all_dependencies))
            .map(|component| (&component.id, component))
            .collect();

        let mut links = 0_usize;
        for written in request
            .written_components
            .iter()
            .chain(request.written_dependencies)
        {
            let Some(component) = components.get(&written.id) else {
                continue;
            };
            for dependency in &component.dependencies {
                let Some(target) = request.placements.get(dependency) else {
                    continue;
                };
                let package = dependency.package_name(request.registry_prefix);
                let link = written.path.join(NODE_MODULES).join(&package);
                if request.create_link_files {
                    write_link_file(&link, target, &package, request.write_package_manifests)
                        .await?;
                } else {
                    replace_with_symlink(&link, target).await?;
                }
                links += 1;
            }
        }

        tracing::info!(links, "Linked components");
        Ok(())
    }
}

fn link_error(path: &Path, message: impl std::fmt::Display) -> Error {
    Error::LinkFailure {
        path: path.to_path_buf(),
        message: message.to_string(),
    }
}

async fn clear_link(link: &Path) -> Result<()> {
    let metadata = match tokio::fs::symlink_metadata(link).await {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(link_error(link, e)),
    };
    let removed = if metadata.is_dir() {
        tokio::fs::remove_dir_all(link).await
    } else {
        tokio::fs::remove_file(link).await
    };
    removed.map_err(|e| link_error(link, format!("removing existing link: {e}")))
}

async fn prepare(link: &Path) -> Result<()> {
    clear_link(link).await?;
    if let Some(parent) = link.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| link_error(parent, e))?;
    }
    Ok(())
}

async fn replace_with_symlink(link: &Path, target: &Path) -> Result<()> {
    prepare(link).await?;
    symlink(target, link)
        .await
        .map_err(|e| link_error(link, format!("symlink to {}: {e}", target.display())))
}

async fn write_link_file(
    link: &Path,
    target: &Path,
    package: &str,
    write_manifest: bool,
) -> Result<()> {
    prepare(link).await?;
    tokio::fs::create_dir_all(link)
        .await
        .map_err(|e| link_error(link, e))?;

    let target = target.to_string_lossy().replace('\\', "/").replace('\'', "\\'");
    let index = format!("module.exports = require('{target}');\n");
    tokio::fs::write(link.join("index.js"), index)
        .await
        .map_err(|e| link_error(link, e))?;

    if write_manifest {
        let manifest = json!({ "name": package, "main": "index.js" });
        tokio::fs::write(link.join("package.json"), format!("{manifest:#}\n"))
            .await
            .map_err(|e| link_error(link, e))?;
    }
    Ok(())
}
