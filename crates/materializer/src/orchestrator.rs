//! Materialization orchestrator.
//!
//! Sequences a run: classify origins, plan and write top-level components,
//! plan and write their dependencies, relocate to a requested path, update the
//! workspace manifest, install packages and link. Phases are strictly ordered
//! and tracked through [`PhaseTracker`].

use crate::bitmap::DetachedTrackingMap;
use crate::config::{MaterializeOptions, WorkspaceLayout, WriteMode};
use crate::core::traits::{
    ComponentWriter, DirectoryMover, Linker, PackageInstaller, RemoteRegistry, TrackingMap,
    WorkspaceManifestWriter,
};
use crate::core::types::{
    Component, ComponentId, ComponentWithDependencies, InstallRequest, InstallTarget, LinkRequest,
    Origin, PlacementResult, TrackingRecord, WritePlan, WrittenComponent,
};
use crate::dedup::DedupCache;
use crate::error::{Error, Result};
use crate::origin::{Classification, classify};
use crate::planner::{DependencyPlacement, Planner, ensure_disjoint};
use crate::relocate::{Relocation, TokioDirectoryMover, relocate};
use futures::future::join_all;
use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Pipeline phase, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Decide the dependency strategy of every top-level component.
    Classify,
    /// Plan (and in immediate mode write) top-level components.
    WriteComponents,
    /// Plan (and in immediate mode write) dependencies.
    WriteDependencies,
    /// Persist deferred plans.
    Persist,
    /// Move top-level components to the requested path.
    Relocate,
    /// Update the workspace package manifest.
    UpdateManifest,
    /// Run the package installer.
    Install,
    /// Run the linker.
    Link,
    /// The run finished.
    Done,
}

impl Phase {
    /// Every phase, in order.
    pub const ALL: [Self; 9] = [
        Self::Classify,
        Self::WriteComponents,
        Self::WriteDependencies,
        Self::Persist,
        Self::Relocate,
        Self::UpdateManifest,
        Self::Install,
        Self::Link,
        Self::Done,
    ];

    /// The phase after this one, `None` after [`Phase::Done`].
    #[must_use]
    pub fn next(self) -> Option<Self> {
        let index = Self::ALL.iter().position(|phase| *phase == self)?;
        Self::ALL.get(index + 1).copied()
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Classify => "classify",
            Self::WriteComponents => "write-components",
            Self::WriteDependencies => "write-dependencies",
            Self::Persist => "persist",
            Self::Relocate => "relocate",
            Self::UpdateManifest => "update-manifest",
            Self::Install => "install",
            Self::Link => "link",
            Self::Done => "done",
        };
        f.write_str(name)
    }
}

/// Enforces phase order.
#[derive(Debug, Clone, Default)]
pub struct PhaseTracker {
    current: Option<Phase>,
}

impl PhaseTracker {
    /// A tracker that has not entered any phase yet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The phase most recently entered.
    #[must_use]
    pub fn current(&self) -> Option<Phase> {
        self.current
    }

    /// Enters `phase`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PhaseOrder`] unless `phase` directly follows the current phase.
    pub fn enter(&mut self, phase: Phase) -> Result<()> {
        let expected = match self.current {
            None => Some(Phase::Classify),
            Some(current) => current.next(),
        };
        if expected != Some(phase) {
            return Err(Error::PhaseOrder {
                expected: expected.map_or_else(|| "no further phase".to_string(), |p| p.to_string()),
                found: phase.to_string(),
            });
        }
        info!(%phase, "Entering materialization phase");
        self.current = Some(phase);
        Ok(())
    }
}

/// Outcome of a run.
#[derive(Debug, Clone, Default)]
pub struct MaterializeReport {
    /// Top-level components, at their final location.
    pub written_components: Vec<WrittenComponent>,
    /// Nested dependencies written this run.
    pub written_dependencies: Vec<WrittenComponent>,
    /// Resolved location of every placed identity, written or reused.
    pub placements: PlacementResult,
    /// `(owner, dependency)` pairs left to the package manager.
    pub skipped: Vec<(ComponentId, ComponentId)>,
}

/// Planned run, produced by [`Materializer::plan`] and consumed by [`Materializer::execute`].
#[derive(Debug)]
pub struct MaterializationPlan<'g> {
    phases: PhaseTracker,
    component_plans: Vec<WritePlan<'g>>,
    dependency_plans: Vec<WritePlan<'g>>,
    written_components: Vec<WrittenComponent>,
    written_dependencies: Vec<WrittenComponent>,
    placements: PlacementResult,
    skipped: Vec<(ComponentId, ComponentId)>,
}

impl<'g> MaterializationPlan<'g> {
    fn new() -> Self {
        Self {
            phases: PhaseTracker::new(),
            component_plans: Vec::new(),
            dependency_plans: Vec::new(),
            written_components: Vec::new(),
            written_dependencies: Vec::new(),
            placements: PlacementResult::default(),
            skipped: Vec::new(),
        }
    }

    /// Pending top-level writes.
    #[must_use]
    pub fn component_plans(&self) -> &[WritePlan<'g>] {
        &self.component_plans
    }

    /// Pending nested-dependency writes; each identity appears at most once.
    #[must_use]
    pub fn dependency_plans(&self) -> &[WritePlan<'g>] {
        &self.dependency_plans
    }

    /// Locations decided so far.
    #[must_use]
    pub fn placements(&self) -> &PlacementResult {
        &self.placements
    }

    /// `(owner, dependency)` pairs left to the package manager.
    #[must_use]
    pub fn skipped(&self) -> &[(ComponentId, ComponentId)] {
        &self.skipped
    }

    fn absorb(&mut self, outcome: DependencyOutcome<'g>) {
        match outcome {
            DependencyOutcome::Skipped { owner, dependency } => {
                self.skipped.push((owner, dependency));
            }
            DependencyOutcome::Resolved { id, path } => self.placements.insert(id, path),
            DependencyOutcome::Planned(plan) => {
                self.placements
                    .insert(plan.component.id.clone(), plan.destination.clone());
                self.dependency_plans.push(plan);
            }
            DependencyOutcome::Written(written) => {
                self.placements.insert(written.id.clone(), written.path.clone());
                self.written_dependencies.push(written);
            }
        }
    }
}

enum DependencyOutcome<'g> {
    Skipped {
        owner: ComponentId,
        dependency: ComponentId,
    },
    Resolved {
        id: ComponentId,
        path: PathBuf,
    },
    Planned(WritePlan<'g>),
    Written(WrittenComponent),
}

/// State shared by concurrent dependency planners; one claim at a time.
struct ClaimState<'t> {
    cache: DedupCache,
    tracking: &'t mut dyn TrackingMap,
}

/// Drives a materialization run against a workspace.
///
/// # Example
///
/// ```ignore
/// let writer = FsComponentWriter::new();
/// let hubs = HubScopes::new().with_hub("ui");
/// let mut bitmap = BitMap::load(workspace)?;
///
/// let report = Materializer::new(WorkspaceLayout::new(workspace), options, &writer, &hubs)
///     .with_installer(&NpmInstaller::new())
///     .with_linker(&FsLinker)
///     .run(&graphs, &mut bitmap)
///     .await?;
/// bitmap.save()?;
/// ```
pub struct Materializer<'a> {
    layout: WorkspaceLayout,
    options: MaterializeOptions,
    writer: &'a dyn ComponentWriter,
    registry: &'a dyn RemoteRegistry,
    installer: Option<&'a dyn PackageInstaller>,
    linker: Option<&'a dyn Linker>,
    manifest: Option<&'a dyn WorkspaceManifestWriter>,
    mover: &'a dyn DirectoryMover,
}

impl<'a> Materializer<'a> {
    /// Creates a materializer without installer, linker or manifest writer.
    #[must_use]
    pub fn new(
        layout: WorkspaceLayout,
        options: MaterializeOptions,
        writer: &'a dyn ComponentWriter,
        registry: &'a dyn RemoteRegistry,
    ) -> Self {
        Self {
            layout,
            options,
            writer,
            registry,
            installer: None,
            linker: None,
            manifest: None,
            mover: &TokioDirectoryMover,
        }
    }

    /// Sets the package installer.
    #[must_use]
    pub fn with_installer(mut self, installer: &'a dyn PackageInstaller) -> Self {
        self.installer = Some(installer);
        self
    }

    /// Sets the linker.
    #[must_use]
    pub fn with_linker(mut self, linker: &'a dyn Linker) -> Self {
        self.linker = Some(linker);
        self
    }

    /// Sets the workspace manifest writer.
    #[must_use]
    pub fn with_manifest_writer(mut self, manifest: &'a dyn WorkspaceManifestWriter) -> Self {
        self.manifest = Some(manifest);
        self
    }

    /// Replaces the directory mover used for relocation.
    #[must_use]
    pub fn with_mover(mut self, mover: &'a dyn DirectoryMover) -> Self {
        self.mover = mover;
        self
    }

    /// Runs the whole pipeline.
    ///
    /// Each component is recorded in `tracking` as soon as its write completes,
    /// so a failed run can simply be repeated. In isolated mode `tracking` is
    /// neither read nor written.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidOptions`] for unsupported option combinations
    /// - [`Error::NotADirectory`] / [`Error::DirectoryNotEmpty`] from the safety
    ///   guard, before anything is written in deferred mode
    /// - [`Error::OverlappingDestinations`] when two top-level components
    ///   would share a directory
    /// - [`Error::WriteFailure`] from the component writer; writes in flight
    ///   finish, no new ones start
    /// - [`Error::InstallFailure`] / [`Error::LinkFailure`] after both phases ran
    #[tracing::instrument(
        name = "materialize",
        skip_all,
        fields(
            root = %self.layout.root().display(),
            components = graphs.len(),
            mode = ?self.options.mode
        )
    )]
    pub async fn run(
        &self,
        graphs: &[ComponentWithDependencies],
        tracking: &mut dyn TrackingMap,
    ) -> Result<MaterializeReport> {
        if self.options.isolated {
            self.run_tracked(graphs, &mut DetachedTrackingMap).await
        } else {
            self.run_tracked(graphs, tracking).await
        }
    }

    /// Plans every write without touching the disk.
    ///
    /// All safety checks run and dependency edges are registered in
    /// `tracking`, exactly as a deferred run would.
    ///
    /// # Errors
    ///
    /// Returns option validation and safety guard failures.
    pub async fn plan<'g>(
        &self,
        graphs: &'g [ComponentWithDependencies],
        tracking: &mut dyn TrackingMap,
    ) -> Result<MaterializationPlan<'g>> {
        if self.options.isolated {
            self.prepare(graphs, &mut DetachedTrackingMap, WriteMode::Deferred)
                .await
        } else {
            self.prepare(graphs, tracking, WriteMode::Deferred).await
        }
    }

    /// Persists a plan from [`Materializer::plan`] and runs the remaining phases.
    ///
    /// # Errors
    ///
    /// See [`Materializer::run`]; [`Error::PhaseOrder`] if the plan was not
    /// produced by [`Materializer::plan`].
    pub async fn execute<'g>(
        &self,
        graphs: &'g [ComponentWithDependencies],
        plan: MaterializationPlan<'g>,
        tracking: &mut dyn TrackingMap,
    ) -> Result<MaterializeReport> {
        if self.options.isolated {
            self.finish(graphs, plan, &mut DetachedTrackingMap).await
        } else {
            self.finish(graphs, plan, tracking).await
        }
    }

    async fn run_tracked(
        &self,
        graphs: &[ComponentWithDependencies],
        tracking: &mut dyn TrackingMap,
    ) -> Result<MaterializeReport> {
        let plan = self.prepare(graphs, tracking, self.options.mode).await?;
        self.finish(graphs, plan, tracking).await
    }

    /// Classify and write phases.
    async fn prepare<'g>(
        &self,
        graphs: &'g [ComponentWithDependencies],
        tracking: &mut dyn TrackingMap,
        mode: WriteMode,
    ) -> Result<MaterializationPlan<'g>> {
        self.options.validate(graphs.len())?;
        let mut plan = MaterializationPlan::new();
        let planner = Planner::new(&self.layout, &self.options);

        plan.phases.enter(Phase::Classify)?;
        let classifications = classify(
            graphs,
            self.registry,
            self.options.save_dependencies_as_components,
        );

        plan.phases.enter(Phase::WriteComponents)?;
        let component_plans = classifications
            .iter()
            .map(|classification| planner.plan_component(classification, &*tracking))
            .collect::<Result<Vec<_>>>()?;
        ensure_disjoint(&component_plans)?;

        // Top-level components written this run satisfy dependencies on the same identity.
        let mut cache = DedupCache::new();
        for component_plan in &component_plans {
            let id = &component_plan.component.id;
            cache.claim(id, component_plan.destination.clone());
            plan.placements
                .insert(id.clone(), component_plan.destination.clone());
        }

        match mode {
            WriteMode::Immediate => {
                self.persist_all(&component_plans, tracking, &mut plan.written_components)
                    .await?;
            }
            WriteMode::Deferred => plan.component_plans = component_plans,
        }

        plan.phases.enter(Phase::WriteDependencies)?;
        let outcomes = self
            .place_dependencies(
                planner,
                &classifications,
                ClaimState { cache, tracking },
                mode == WriteMode::Immediate,
            )
            .await?;
        for outcome in outcomes {
            plan.absorb(outcome);
        }

        debug!(
            components = plan.component_plans.len() + plan.written_components.len(),
            dependencies = plan.dependency_plans.len() + plan.written_dependencies.len(),
            skipped = plan.skipped.len(),
            "Planned materialization"
        );
        Ok(plan)
    }

    /// Applies the dependency rules for every top-level component concurrently.
    ///
    /// Claims are serialized through `state`; writes in immediate mode happen
    /// outside the lock.
    async fn place_dependencies<'g>(
        &self,
        planner: Planner<'_>,
        classifications: &[Classification<'g>],
        state: ClaimState<'_>,
        immediate: bool,
    ) -> Result<Vec<DependencyOutcome<'g>>> {
        let state = Mutex::new(state);
        let aborted = AtomicBool::new(false);
        let (state, aborted) = (&state, &aborted);

        let per_component = classifications.iter().map(|classification| async move {
            let graph = classification.graph;
            let mut outcomes = Vec::with_capacity(graph.all_dependencies.len());
            for dependency in &graph.all_dependencies {
                let placement = {
                    let mut claims = state.lock().await;
                    let ClaimState { cache, tracking } = &mut *claims;
                    planner.plan_dependency(classification, dependency, cache, &mut **tracking)
                };
                let outcome = match placement {
                    DependencyPlacement::Skipped => DependencyOutcome::Skipped {
                        owner: graph.component.id.clone(),
                        dependency: dependency.id.clone(),
                    },
                    DependencyPlacement::Authored(path)
                    | DependencyPlacement::Tracked(path)
                    | DependencyPlacement::Cached(path) => DependencyOutcome::Resolved {
                        id: dependency.id.clone(),
                        path,
                    },
                    DependencyPlacement::Write(write) if immediate => {
                        let Some(written) = self.persist_guarded(&write, aborted).await? else {
                            continue;
                        };
                        let record = self.tracking_record(&written);
                        state.lock().await.tracking.record_component(record);
                        DependencyOutcome::Written(written)
                    }
                    DependencyPlacement::Write(write) => DependencyOutcome::Planned(write),
                };
                outcomes.push(outcome);
            }
            Ok::<_, Error>(outcomes)
        });

        let mut outcomes = Vec::new();
        let mut failure = None;
        for result in join_all(per_component).await {
            match result {
                Ok(component_outcomes) => outcomes.extend(component_outcomes),
                Err(e) => keep_first(&mut failure, e),
            }
        }
        failure.map_or(Ok(outcomes), Err)
    }

    /// Persist, relocate, manifest, install and link phases.
    async fn finish(
        &self,
        graphs: &[ComponentWithDependencies],
        mut plan: MaterializationPlan<'_>,
        tracking: &mut dyn TrackingMap,
    ) -> Result<MaterializeReport> {
        plan.phases.enter(Phase::Persist)?;
        self.persist_all(&plan.component_plans, tracking, &mut plan.written_components)
            .await?;
        self.persist_all(&plan.dependency_plans, tracking, &mut plan.written_dependencies)
            .await?;

        plan.phases.enter(Phase::Relocate)?;
        if let Some(requested) = self.options.requested_path() {
            for written in &mut plan.written_components {
                self.relocate_component(written, &requested, tracking).await?;
                plan.placements
                    .insert(written.id.clone(), written.path.clone());
            }
        }

        plan.phases.enter(Phase::UpdateManifest)?;
        self.update_manifest(&plan.written_components).await?;

        plan.phases.enter(Phase::Install)?;
        let installed = self.install(graphs, &plan).await;
        if let Err(e) = &installed {
            warn!(error = %e, "Package installation failed, linking anyway");
        }

        plan.phases.enter(Phase::Link)?;
        let linked = self.link(graphs, &plan).await;

        match (installed, linked) {
            (Err(install), Err(link)) => {
                error!(error = %link, "Linking failed after package installation failed");
                return Err(install);
            }
            (Err(e), Ok(())) | (Ok(()), Err(e)) => return Err(e),
            (Ok(()), Ok(())) => {}
        }

        plan.phases.enter(Phase::Done)?;
        info!(
            components = plan.written_components.len(),
            dependencies = plan.written_dependencies.len(),
            skipped = plan.skipped.len(),
            "Materialization complete"
        );
        Ok(MaterializeReport {
            written_components: plan.written_components,
            written_dependencies: plan.written_dependencies,
            placements: plan.placements,
            skipped: plan.skipped,
        })
    }

    /// Persists `plans` with at most `max_parallel_writes` in flight.
    ///
    /// After the first failure no further write starts; writes already running
    /// complete. Every completed write is appended to `written` in plan order
    /// and recorded in `tracking`, including when a sibling failed, so the
    /// next run finds it tracked.
    async fn persist_all(
        &self,
        plans: &[WritePlan<'_>],
        tracking: &mut dyn TrackingMap,
        written: &mut Vec<WrittenComponent>,
    ) -> Result<()> {
        if plans.is_empty() {
            return Ok(());
        }
        let limit = match self.options.max_parallel_writes {
            0 => plans.len(),
            n => n,
        };
        let aborted = &AtomicBool::new(false);

        let results: Vec<Result<Option<WrittenComponent>>> = stream::iter(plans)
            .map(move |plan| self.persist_guarded(plan, aborted))
            .buffered(limit)
            .collect()
            .await;

        let mut failure = None;
        for result in results {
            match result {
                Ok(Some(component)) => {
                    tracking.record_component(self.tracking_record(&component));
                    written.push(component);
                }
                Ok(None) => {}
                Err(e) => keep_first(&mut failure, e),
            }
        }
        failure.map_or(Ok(()), Err)
    }

    async fn persist_guarded(
        &self,
        plan: &WritePlan<'_>,
        aborted: &AtomicBool,
    ) -> Result<Option<WrittenComponent>> {
        if aborted.load(Ordering::SeqCst) {
            debug!(component = %plan.component.id, "Not starting write after an earlier failure");
            return Ok(None);
        }
        match self.writer.persist(plan).await {
            Ok(written) => Ok(Some(written)),
            Err(e) => {
                aborted.store(true, Ordering::SeqCst);
                Err(e)
            }
        }
    }

    fn tracking_record(&self, component: &WrittenComponent) -> TrackingRecord {
        TrackingRecord {
            id: component.id.clone(),
            origin: component.origin,
            root_dir: self.layout.to_tracked(&component.path),
            config_dir: component
                .config_dir
                .as_deref()
                .map(|dir| self.layout.to_tracked(dir)),
        }
    }

    async fn relocate_component(
        &self,
        written: &mut WrittenComponent,
        requested: &Path,
        tracking: &mut dyn TrackingMap,
    ) -> Result<()> {
        let Relocation::Moved { from, to } = relocate(self.mover, &written.path, requested).await?
        else {
            return Ok(());
        };

        let config_dir = written
            .config_dir
            .as_deref()
            .and_then(|dir| dir.strip_prefix(&from).ok())
            .map(|rest| to.join(rest));
        if config_dir.is_some() {
            written.config_dir = config_dir;
        }
        written.path = to;

        if !tracking.set_root_dir(&written.id, self.layout.to_tracked(&written.path)) {
            debug!(component = %written.id, "Relocated component is not tracked");
        }
        Ok(())
    }

    async fn update_manifest(&self, written: &[WrittenComponent]) -> Result<()> {
        let Some(manifest) = self.manifest else {
            return Ok(());
        };
        if self.options.add_to_root_package_json {
            let imported: Vec<WrittenComponent> = written
                .iter()
                .filter(|component| component.origin == Origin::Imported)
                .cloned()
                .collect();
            manifest.add_components_to_root(&imported).await?;
        }
        if self.options.manage_workspaces {
            let paths: Vec<PathBuf> = written
                .iter()
                .map(|component| component.path.clone())
                .collect();
            manifest.add_workspace_entries(&paths).await?;
        }
        Ok(())
    }

    async fn install(
        &self,
        graphs: &[ComponentWithDependencies],
        plan: &MaterializationPlan<'_>,
    ) -> Result<()> {
        let Some(installer) = self.installer else {
            return Ok(());
        };
        if !self.options.install_npm_packages || !self.options.write_package_json {
            debug!("Package installation disabled");
            return Ok(());
        }

        let components = index_components(graphs);
        let targets: Vec<InstallTarget> = plan
            .written_components
            .iter()
            .chain(&plan.written_dependencies)
            .map(|written| InstallTarget {
                dir: written.path.clone(),
                peer_dependencies: components
                    .get(&written.id)
                    .map(|component| component.peer_dependencies())
                    .unwrap_or_default(),
            })
            .collect();
        if targets.is_empty() {
            return Ok(());
        }

        installer
            .install(&InstallRequest {
                graphs,
                targets,
                verbose: self.options.verbose,
                silent: self.options.silent,
                install_peer_dependencies: self.options.install_peer_dependencies,
            })
            .await
    }

    async fn link(
        &self,
        graphs: &[ComponentWithDependencies],
        plan: &MaterializationPlan<'_>,
    ) -> Result<()> {
        let Some(linker) = self.linker else {
            return Ok(());
        };
        linker
            .link(&LinkRequest {
                graphs,
                written_components: &plan.written_components,
                written_dependencies: &plan.written_dependencies,
                placements: &plan.placements,
                create_link_files: self.options.create_npm_link_files,
                write_package_manifests: self.options.write_package_json,
                registry_prefix: self.options.package_prefix(),
            })
            .await
    }
}

fn index_components(graphs: &[ComponentWithDependencies]) -> HashMap<&ComponentId, &Component> {
    graphs
        .iter()
        .flat_map(|graph| std::iter::once(&graph.component).chain(&graph.all_dependencies))
        .map(|component| (&component.id, component))
        .collect()
}

fn keep_first(slot: &mut Option<Error>, error: Error) {
    if slot.is_some() {
        warn!(error = %error, "Additional failure in the same phase");
    } else {
        *slot = Some(error);
    }
}
