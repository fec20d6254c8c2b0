//! Moves written top-level components to a caller-requested output path.

use crate::config::absolutize;
use crate::core::traits::DirectoryMover;
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Result of a relocation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Relocation {
    /// The component already sits at the requested path.
    Unchanged,
    /// The component directory was moved.
    Moved {
        /// Previous absolute location.
        from: PathBuf,
        /// New absolute location.
        to: PathBuf,
    },
}

/// Moves `current` to `requested` unless both name the same location.
///
/// Paths are compared after making them absolute, so a relative request that
/// resolves to the current location performs no filesystem operation.
/// Dependencies are never moved here; nested paths do not depend on the
/// top-level location.
///
/// # Errors
///
/// Propagates failures of the mover.
pub async fn relocate(
    mover: &dyn DirectoryMover,
    current: &Path,
    requested: &Path,
) -> Result<Relocation> {
    let from = absolutize(current);
    let to = absolutize(requested);
    if from == to {
        return Ok(Relocation::Unchanged);
    }

    tracing::info!(
        from = %from.display(),
        to = %to.display(),
        "Relocating component to requested path"
    );
    mover.move_dir(&from, &to).await?;
    Ok(Relocation::Moved { from, to })
}

/// [`DirectoryMover`] on top of `tokio::fs`.
///
/// Tries a rename first and falls back to copy-then-delete, which covers
/// moves across filesystems.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioDirectoryMover;

#[async_trait]
impl DirectoryMover for TokioDirectoryMover {
    async fn move_dir(&self, from: &Path, to: &Path) -> Result<()> {
        if tokio::fs::try_exists(to)
            .await
            .map_err(|e| Error::write(e, to, "inspect relocation target"))?
        {
            tokio::fs::remove_dir_all(to)
                .await
                .map_err(|e| Error::write(e, to, "clear relocation target"))?;
        }
        if let Some(parent) = to.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::write(e, parent, "create relocation parent"))?;
        }

        if let Err(e) = tokio::fs::rename(from, to).await {
            tracing::debug!(error = %e, "Rename failed, copying instead");
            copy_tree(from, to).await?;
            tokio::fs::remove_dir_all(from)
                .await
                .map_err(|e| Error::write(e, from, "remove relocated source"))?;
        }
        Ok(())
    }
}

async fn copy_tree(from: &Path, to: &Path) -> Result<()> {
    for entry in WalkDir::new(from) {
        let entry = entry.map_err(|e| {
            let path = e.path().map_or_else(|| from.to_path_buf(), Path::to_path_buf);
            Error::write(std::io::Error::other(e), path, "walk relocation source")
        })?;
        let relative = entry.path().strip_prefix(from).unwrap_or(entry.path());
        let target = to.join(relative);
        if entry.file_type().is_dir() {
            tokio::fs::create_dir_all(&target)
                .await
                .map_err(|e| Error::write(e, &target, "create directory"))?;
        } else {
            tokio::fs::copy(entry.path(), &target)
                .await
                .map_err(|e| Error::write(e, &target, "copy file"))?;
        }
    }
    Ok(())
}
