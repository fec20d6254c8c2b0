//! Package installation through an npm-compatible command.

use crate::core::traits::PackageInstaller;
use crate::core::types::{InstallRequest, InstallTarget};
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;

/// Runs `<program> install` in every written component directory.
#[derive(Debug, Clone)]
pub struct NpmInstaller {
    program: String,
}

impl Default for NpmInstaller {
    fn default() -> Self {
        Self::new()
    }
}

impl NpmInstaller {
    /// Uses `npm` from `PATH`.
    #[must_use]
    pub fn new() -> Self {
        Self::with_program("npm")
    }

    /// Uses a different npm-compatible program (e.g. `pnpm`, `yarn`).
    #[must_use]
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Arguments for the plain install of a target.
    fn install_args(request: &InstallRequest<'_>) -> Vec<String> {
        let mut args = vec!["install".to_string()];
        if request.silent {
            args.push("--silent".to_string());
        } else if request.verbose {
            args.push("--loglevel".to_string());
            args.push("verbose".to_string());
        }
        args
    }

    /// Arguments installing a target's peer dependencies, if it has any.
    fn peer_args(request: &InstallRequest<'_>, target: &InstallTarget) -> Option<Vec<String>> {
        if !request.install_peer_dependencies || target.peer_dependencies.is_empty() {
            return None;
        }
        let mut args = Self::install_args(request);
        args.push("--no-save".to_string());
        args.extend(
            target
                .peer_dependencies
                .iter()
                .map(|(name, range)| format!("{name}@{range}")),
        );
        Some(args)
    }

    async fn run(&self, target: &InstallTarget, args: &[String]) -> Result<()> {
        tracing::info!(
            program = %self.program,
            dir = %target.dir.display(),
            args = ?args,
            "Installing packages"
        );
        let output = Command::new(&self.program)
            .args(args)
            .current_dir(&target.dir)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| Error::InstallFailure {
                dir: target.dir.clone(),
                message: format!("failed to spawn '{}': {e}", self.program),
            })?;

        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(Error::InstallFailure {
            dir: target.dir.clone(),
            message: format!("{} ({})", output.status, stderr.trim()),
        })
    }
}

#[async_trait]
impl PackageInstaller for NpmInstaller {
    async fn install(&self, request: &InstallRequest<'_>) -> Result<()> {
        let args = Self::install_args(request);
        for target in &request.targets {
            self.run(target, &args).await?;
            if let Some(peer_args) = Self::peer_args(request, target) {
                self.run(target, &peer_args).await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn request(targets: Vec<InstallTarget>) -> InstallRequest<'static> {
        InstallRequest {
            graphs: &[],
            targets,
            verbose: false,
            silent: false,
            install_peer_dependencies: false,
        }
    }

    fn target(dir: &std::path::Path) -> InstallTarget {
        InstallTarget {
            dir: dir.to_path_buf(),
            peer_dependencies: BTreeMap::from([("react".to_string(), "^18.0.0".to_string())]),
        }
    }

    #[test]
    fn test_install_args() {
        let mut req = request(Vec::new());
        assert_eq!(NpmInstaller::install_args(&req), vec!["install"]);

        req.silent = true;
        assert_eq!(NpmInstaller::install_args(&req), vec!["install", "--silent"]);

        req.silent = false;
        req.verbose = true;
        assert_eq!(
            NpmInstaller::install_args(&req),
            vec!["install", "--loglevel", "verbose"]
        );
    }

    #[test]
    fn test_peer_args_only_when_requested() {
        let temp = TempDir::new().unwrap();
        let mut req = request(Vec::new());
        let target = target(temp.path());

        assert!(NpmInstaller::peer_args(&req, &target).is_none());

        req.install_peer_dependencies = true;
        let args = NpmInstaller::peer_args(&req, &target).unwrap();
        assert!(args.contains(&"--no-save".to_string()));
        assert!(args.contains(&"react@^18.0.0".to_string()));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_successful_install() {
        let temp = TempDir::new().unwrap();
        let installer = NpmInstaller::with_program("true");

        let result = installer.install(&request(vec![target(temp.path())])).await;
        assert!(result.is_ok());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failing_install() {
        let temp = TempDir::new().unwrap();
        let installer = NpmInstaller::with_program("false");

        let result = installer.install(&request(vec![target(temp.path())])).await;
        assert!(matches!(result, Err(Error::InstallFailure { .. })));
    }

    #[tokio::test]
    async fn test_missing_program() {
        let temp = TempDir::new().unwrap();
        let installer = NpmInstaller::with_program("bitsmith-no-such-installer");

        let result = installer.install(&request(vec![target(temp.path())])).await;
        assert!(matches!(result, Err(Error::InstallFailure { .. })));
    }
}
