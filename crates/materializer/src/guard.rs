//! Directory safety guard: refuses to clobber content that does not belong
//! to the component being written.

use crate::error::{Error, Result};
use std::path::Path;

/// Outcome of a permitted check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardDecision {
    /// Write without touching existing content.
    Permit,
    /// The directory holds unrelated content and override was requested; clear it first.
    PermitReplacing,
}

/// Validates that `target` may receive a top-level component.
///
/// * `requested` - the absolute custom output path, if the caller asked for one
/// * `tracked_root` - the absolute root directory of this identity's existing tracking record
///
/// Tracked components are re-imported in place; a requested path equal to the
/// tracked root is an idempotent re-run. Otherwise an existing file is never
/// overwritten and a non-empty directory needs `override_existing`.
///
/// # Errors
///
/// - [`Error::NotADirectory`] when `target` is a regular file
/// - [`Error::DirectoryNotEmpty`] when `target` is a non-empty directory and
///   override was not requested
/// - [`Error::Io`] when `target` cannot be inspected
pub fn check_directory(
    target: &Path,
    requested: Option<&Path>,
    tracked_root: Option<&Path>,
    override_existing: bool,
) -> Result<GuardDecision> {
    match (requested, tracked_root) {
        (None, Some(_)) => return Ok(GuardDecision::Permit),
        (Some(requested), Some(root)) if requested == root => return Ok(GuardDecision::Permit),
        _ => {}
    }

    let metadata = match std::fs::metadata(target) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(GuardDecision::Permit),
        Err(e) => return Err(Error::io(e, target, "inspect target directory")),
    };

    if !metadata.is_dir() {
        return Err(Error::NotADirectory {
            path: target.to_path_buf(),
        });
    }

    let is_empty = std::fs::read_dir(target)
        .map_err(|e| Error::io(e, target, "read target directory"))?
        .next()
        .is_none();

    if is_empty {
        Ok(GuardDecision::Permit)
    } else if override_existing {
        tracing::warn!(path = %target.display(), "Replacing contents of untracked directory");
        Ok(GuardDecision::PermitReplacing)
    } else {
        Err(Error::DirectoryNotEmpty {
            path: target.to_path_buf(),
        })
    }
}
