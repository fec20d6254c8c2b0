//! Error types for materialization.

use miette::Diagnostic;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for materialization operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while materializing components into a workspace.
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// The target path exists and is a regular file.
    #[error("Cannot write component into {path}: path exists and is not a directory")]
    #[diagnostic(
        code(bitsmith::materializer::not_a_directory),
        help("Remove the file or choose a different output path")
    )]
    NotADirectory {
        /// The offending path.
        path: PathBuf,
    },

    /// The target directory is not empty and is not tracked for this component.
    #[error("Directory {path} is not empty and is not tracked for this component")]
    #[diagnostic(
        code(bitsmith::materializer::directory_not_empty),
        help("Re-run with override enabled to replace its contents, or pick an empty directory")
    )]
    DirectoryNotEmpty {
        /// The directory that would have been clobbered.
        path: PathBuf,
    },

    /// Two top-level components of one run target the same or nested directories.
    #[error("Components {first} and {second} would both be written under {path}")]
    #[diagnostic(
        code(bitsmith::materializer::overlapping_destinations),
        help("Move one of the tracked components elsewhere or materialize them in separate runs")
    )]
    OverlappingDestinations {
        /// Component owning the outer directory.
        first: String,
        /// Component whose directory collides with it.
        second: String,
        /// The outer directory.
        path: PathBuf,
    },

    /// Writing, copying or moving component files failed.
    #[error("Failed to {operation} at {path}: {source}")]
    #[diagnostic(
        code(bitsmith::materializer::write_failure),
        help("Check available disk space and write permissions for the workspace")
    )]
    WriteFailure {
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
        /// Path being written.
        path: PathBuf,
        /// Description of the operation being performed.
        operation: String,
    },

    /// The package installer exited unsuccessfully.
    #[error("Package installation failed in {dir}: {message}")]
    #[diagnostic(
        code(bitsmith::materializer::install_failure),
        help("Components are already written; fix the installer error and re-run the install step")
    )]
    InstallFailure {
        /// Directory the installer ran in.
        dir: PathBuf,
        /// Installer output or exit status.
        message: String,
    },

    /// Linking written components together failed.
    #[error("Failed to link {path}: {message}")]
    #[diagnostic(
        code(bitsmith::materializer::link_failure),
        help("Components are already written; check symlink permissions and re-run linking")
    )]
    LinkFailure {
        /// Link path that could not be created.
        path: PathBuf,
        /// Description of the failure.
        message: String,
    },

    /// The option combination is not supported.
    #[error("Invalid materialize options: {message}")]
    #[diagnostic(
        code(bitsmith::materializer::invalid_options),
        help("Adjust the materialize options; see MaterializeOptions for the supported combinations")
    )]
    InvalidOptions {
        /// Why the options were rejected.
        message: String,
    },

    /// A pipeline phase was entered out of order.
    #[error("Pipeline phase {found} entered while {expected} was expected")]
    #[diagnostic(code(bitsmith::materializer::phase_order))]
    PhaseOrder {
        /// The phase the pipeline expected next.
        expected: String,
        /// The phase that was requested.
        found: String,
    },

    /// The tracking map file is unreadable or inconsistent.
    #[error("Invalid tracking map at {path}: {message}")]
    #[diagnostic(
        code(bitsmith::materializer::tracking_map),
        help("The tracking file may be corrupted; restore it from version control")
    )]
    TrackingMap {
        /// Path to the tracking file.
        path: PathBuf,
        /// Description of the problem.
        message: String,
    },

    /// The workspace package manifest has an unexpected shape.
    #[error("Cannot update workspace manifest {path}: {message}")]
    #[diagnostic(
        code(bitsmith::materializer::manifest),
        help("The root package.json must be a JSON object with an object-valued dependencies field")
    )]
    Manifest {
        /// Path to the manifest.
        path: PathBuf,
        /// Description of the problem.
        message: String,
    },

    /// I/O error outside of a component write.
    #[error("I/O error during {operation}{}: {source}", path.as_ref().map(|p| format!(" at {}", p.display())).unwrap_or_default())]
    #[diagnostic(
        code(bitsmith::materializer::io_error),
        help("Check that the referenced paths exist and that you have permission to read or write them")
    )]
    Io {
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
        /// Optional path where the error occurred.
        path: Option<PathBuf>,
        /// Description of the operation being performed.
        operation: String,
    },

    /// JSON (de)serialization error.
    #[error("JSON error{}: {source}", path.as_ref().map(|p| format!(" in {}", p.display())).unwrap_or_default())]
    #[diagnostic(
        code(bitsmith::materializer::json_error),
        help("Ensure the JSON file has valid syntax")
    )]
    Json {
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
        /// Optional path to the file being parsed.
        path: Option<PathBuf>,
    },
}

impl Error {
    /// Builds a [`Error::WriteFailure`] for `path`.
    pub fn write(source: std::io::Error, path: impl Into<PathBuf>, operation: &str) -> Self {
        Self::WriteFailure {
            source,
            path: path.into(),
            operation: operation.to_string(),
        }
    }

    /// Builds an [`Error::Io`] for `path`.
    pub fn io(source: std::io::Error, path: impl Into<PathBuf>, operation: &str) -> Self {
        Self::Io {
            source,
            path: Some(path.into()),
            operation: operation.to_string(),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(source: std::io::Error) -> Self {
        Self::Io {
            source,
            path: None,
            operation: "file operation".to_string(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(source: serde_json::Error) -> Self {
        Self::Json { source, path: None }
    }
}
