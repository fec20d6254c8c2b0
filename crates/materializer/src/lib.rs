//! Writes resolved component graphs into a bitsmith workspace.
//!
//! Given a set of top-level components, each with its flattened dependency
//! graph already resolved, this crate decides where every component lands on
//! disk, whether it needs to be written at all, and how it is placed, then
//! drives the downstream steps (workspace manifest, package installation,
//! linking) in order.
//!
//! # Architecture
//!
//! The pipeline is built from small, separately testable pieces:
//!
//! - [`origin`] - decides whether a component's dependencies are written as
//!   component copies or left to the package manager
//! - [`guard`] - refuses to clobber unrelated, non-empty directories
//! - [`dedup`] - run-scoped cache guaranteeing a shared dependency is written once
//! - [`planner`] - computes destinations and write plans
//! - [`orchestrator`] - sequences the phases and owns concurrency
//! - [`relocate`] - moves top-level components to a requested output path
//!
//! Collaborators sit behind the traits in [`core::traits`]. The crate ships a
//! filesystem implementation of each:
//!
//! | trait | implementation |
//! |---|---|
//! | [`TrackingMap`] | [`BitMap`] (`.bitmap` JSON file), [`DetachedTrackingMap`] |
//! | [`ComponentWriter`] | [`FsComponentWriter`] |
//! | [`PackageInstaller`] | [`NpmInstaller`] |
//! | [`Linker`] | [`FsLinker`] |
//! | [`WorkspaceManifestWriter`] | [`RootPackageJson`] |
//! | [`DirectoryMover`] | [`TokioDirectoryMover`] |
//! | [`RemoteRegistry`] | [`HubScopes`] |
//!
//! # Placement
//!
//! Top-level components go to their tracked location, the requested output
//! path, or `components/<scope>/<namespace>/<name>`. Dependencies are resolved by the
//! first matching rule:
//!
//! 1. package-style owner and untracked dependency: skipped
//! 2. tracked as authored: the workspace root
//! 3. tracked and still on disk: reused
//! 4. already claimed this run: reused
//! 5. otherwise written once under
//!    `components/.dependencies/<scope>/<namespace>/<name>/<version>`
//!
//! # Example
//!
//! ```rust,ignore
//! use bitsmith_materializer::{
//!     BitMap, FsComponentWriter, FsLinker, HubScopes, MaterializeOptions, Materializer,
//!     NpmInstaller, WorkspaceLayout,
//! };
//!
//! let workspace = std::path::Path::new("/path/to/workspace");
//! let mut bitmap = BitMap::load(workspace)?;
//! let writer = FsComponentWriter::new();
//! let hubs = HubScopes::new().with_hub("ui");
//! let installer = NpmInstaller::new();
//!
//! let report = Materializer::new(
//!     WorkspaceLayout::new(workspace),
//!     MaterializeOptions::default(),
//!     &writer,
//!     &hubs,
//! )
//! .with_installer(&installer)
//! .with_linker(&FsLinker)
//! .run(&graphs, &mut bitmap)
//! .await?;
//!
//! bitmap.save()?;
//! for component in &report.written_components {
//!     tracing::info!(component = %component.id, path = %component.path.display(), "Written");
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod bitmap;
pub mod config;
pub mod core;
pub mod dedup;
pub mod error;
pub mod guard;
pub mod installer;
pub mod linker;
pub mod manifest;
pub mod orchestrator;
pub mod origin;
pub mod planner;
pub mod relocate;
pub mod writer;

// Re-export core types
pub use core::{
    Component, ComponentId, ComponentWithDependencies, InstallRequest, InstallTarget, LinkRequest,
    Origin, PackageManifest, PlacementResult, SourceFile, TrackingRecord, WritePlan,
    WrittenComponent,
};

// Re-export traits
pub use core::{
    ComponentWriter, DirectoryMover, Linker, PackageInstaller, RemoteRegistry, TrackingMap,
    WorkspaceManifestWriter,
};

// Re-export configuration
pub use config::{MaterializeOptions, WorkspaceLayout, WriteMode};

// Re-export the pipeline
pub use orchestrator::{MaterializationPlan, MaterializeReport, Materializer, Phase, PhaseTracker};

// Re-export collaborator implementations
pub use bitmap::{BitMap, DetachedTrackingMap};
pub use installer::NpmInstaller;
pub use linker::FsLinker;
pub use manifest::RootPackageJson;
pub use origin::HubScopes;
pub use relocate::TokioDirectoryMover;
pub use writer::FsComponentWriter;

// Re-export error types
pub use error::{Error, Result};
