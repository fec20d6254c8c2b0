//! Core abstractions for materialization.
//!
//! - **Types** - identities, components, tracking records and write plans
//! - **Traits** - the collaborators the pipeline drives (writer, tracking map,
//!   installer, linker, manifest writer, directory mover)

pub mod traits;
pub mod types;

pub use traits::{
    ComponentWriter, DirectoryMover, Linker, PackageInstaller, RemoteRegistry, TrackingMap,
    WorkspaceManifestWriter,
};
pub use types::{
    Component, ComponentId, ComponentWithDependencies, InstallRequest, InstallTarget, LinkRequest,
    Origin, PackageManifest, PlacementResult, SourceFile, TrackingRecord, WritePlan,
    WrittenComponent,
};
