//! Placement planning: where each component lands and how it is written.

use crate::config::{MaterializeOptions, WorkspaceLayout};
use crate::core::traits::TrackingMap;
use crate::core::types::{Component, Origin, TrackingRecord, WritePlan};
use crate::dedup::DedupCache;
use crate::error::{Error, Result};
use crate::guard::{self, GuardDecision};
use crate::origin::Classification;
use std::path::{Path, PathBuf};

/// How a dependency of a top-level component is resolved.
#[derive(Debug, Clone)]
pub enum DependencyPlacement<'a> {
    /// Left to the package manager: no write, no cache entry, no edge.
    Skipped,
    /// Tracked as authored; lives at the workspace root.
    Authored(PathBuf),
    /// Tracked elsewhere and still on disk.
    Tracked(PathBuf),
    /// Already claimed earlier in this run.
    Cached(PathBuf),
    /// Claimed now; must be written.
    Write(WritePlan<'a>),
}

impl DependencyPlacement<'_> {
    /// Resolved location, `None` when skipped.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Skipped => None,
            Self::Authored(path) | Self::Tracked(path) | Self::Cached(path) => Some(path),
            Self::Write(plan) => Some(&plan.destination),
        }
    }

    /// Short name of the rule that matched, for logging.
    #[must_use]
    pub fn rule(&self) -> &'static str {
        match self {
            Self::Skipped => "skipped",
            Self::Authored(_) => "authored",
            Self::Tracked(_) => "tracked",
            Self::Cached(_) => "cached",
            Self::Write(_) => "write",
        }
    }
}

/// Plans top-level components and their dependencies for one run.
#[derive(Debug, Clone, Copy)]
pub struct Planner<'o> {
    layout: &'o WorkspaceLayout,
    options: &'o MaterializeOptions,
}

impl<'o> Planner<'o> {
    /// Creates a planner.
    #[must_use]
    pub fn new(layout: &'o WorkspaceLayout, options: &'o MaterializeOptions) -> Self {
        Self { layout, options }
    }

    /// Plans a top-level component and runs the directory safety guard on it.
    ///
    /// A tracked component is rewritten where the tracking map says it lives;
    /// the relocator moves it to a requested path afterwards. Otherwise it goes
    /// to the requested path or the default layout. In isolated mode the
    /// tracking map is not consulted and the component is authored.
    ///
    /// # Errors
    ///
    /// Propagates directory safety guard failures.
    pub fn plan_component<'c>(
        &self,
        classification: &Classification<'c>,
        tracking: &dyn TrackingMap,
    ) -> Result<WritePlan<'c>> {
        let component = &classification.graph.component;
        let requested = self.options.requested_path();

        let existing = if self.options.isolated {
            None
        } else {
            tracking.get_ignoring_version(&component.id)
        };
        let origin = match &existing {
            _ if self.options.isolated => Origin::Authored,
            Some(record) if record.origin == Origin::Authored => Origin::Authored,
            _ => Origin::Imported,
        };
        let tracked_root = existing
            .as_ref()
            .map(|record| self.layout.resolve(&record.root_dir));

        let destination = tracked_root
            .clone()
            .or_else(|| requested.clone())
            .unwrap_or_else(|| self.layout.component_dir(&component.id));

        let guard_target = requested.as_deref().unwrap_or(&destination);
        let decision = guard::check_directory(
            guard_target,
            requested.as_deref(),
            tracked_root.as_deref(),
            self.options.override_existing,
        )?;

        let config_dir = existing
            .as_ref()
            .and_then(|record| record.config_dir.as_deref())
            .map(|dir| self.layout.resolve(dir))
            .or_else(|| self.options.write_config.then(|| destination.clone()));

        tracing::debug!(
            component = %component.id,
            %origin,
            destination = %destination.display(),
            tracked = existing.is_some(),
            "Planned top-level component"
        );

        Ok(WritePlan {
            component,
            replace_existing: decision == GuardDecision::PermitReplacing
                && guard_target == destination,
            destination,
            origin,
            config_dir,
            existing,
            parent: None,
            dependencies_saved_as_components: classification.dependencies_saved_as_components,
            write_dists: self.options.write_dists && origin == Origin::Imported,
            write_config: self.options.write_config,
            write_package_json: self.options.write_package_json,
            write_bit_dependencies: self.options.write_bit_dependencies,
            registry_prefix: self.options.package_prefix().map(str::to_string),
        })
    }

    /// Resolves one dependency of `owner`, claiming it in `cache` when it must be written.
    ///
    /// Rules are tried in order and the first match wins:
    /// 1. owner keeps package-style dependencies and the dependency is untracked: skip
    /// 2. tracked as authored: the workspace root
    /// 3. tracked and its root still exists: reuse it
    /// 4. already claimed this run: reuse the cached path
    /// 5. otherwise claim a fresh version-qualified nested path and write it there
    ///
    /// Every non-skipped outcome registers an `owner -> dependency` edge.
    /// Callers must hold the claim lock across this call.
    pub fn plan_dependency<'c>(
        &self,
        owner: &Classification<'_>,
        dependency: &'c Component,
        cache: &mut DedupCache,
        tracking: &mut dyn TrackingMap,
    ) -> DependencyPlacement<'c> {
        let owner_id = &owner.graph.component.id;
        let record = lookup_dependency(&*tracking, dependency);

        let placement = match &record {
            None if !owner.dependencies_saved_as_components => DependencyPlacement::Skipped,
            Some(record) if record.origin == Origin::Authored => {
                DependencyPlacement::Authored(self.layout.root().to_path_buf())
            }
            Some(record) if self.layout.resolve(&record.root_dir).exists() => {
                DependencyPlacement::Tracked(self.layout.resolve(&record.root_dir))
            }
            _ => match cache.get(&dependency.id) {
                Some(path) => DependencyPlacement::Cached(path.to_path_buf()),
                None => {
                    let destination = self.layout.dependency_dir(&dependency.id);
                    cache.claim(&dependency.id, destination.clone());
                    DependencyPlacement::Write(self.nested_plan(owner, dependency, destination))
                }
            },
        };

        if !matches!(placement, DependencyPlacement::Skipped) {
            tracking.add_dependency_edge(owner_id, &dependency.id);
        }

        tracing::debug!(
            component = %owner_id,
            dependency = %dependency.id,
            rule = placement.rule(),
            "Placed dependency"
        );

        placement
    }

    fn nested_plan<'c>(
        &self,
        owner: &Classification<'_>,
        dependency: &'c Component,
        destination: PathBuf,
    ) -> WritePlan<'c> {
        WritePlan {
            component: dependency,
            destination,
            origin: Origin::Nested,
            config_dir: None,
            existing: None,
            parent: Some(owner.graph.component.id.clone()),
            dependencies_saved_as_components: owner.dependencies_saved_as_components,
            write_dists: false,
            write_config: false,
            write_package_json: self.options.write_package_json,
            write_bit_dependencies: self.options.write_bit_dependencies,
            replace_existing: false,
            registry_prefix: self.options.package_prefix().map(str::to_string),
        }
    }
}

/// Rejects top-level plans whose destinations coincide or nest.
///
/// Guard checks look at each destination on its own, so two components of
/// one run landing in the same directory would otherwise pass them both.
///
/// # Errors
///
/// Returns [`Error::OverlappingDestinations`] for the first colliding pair.
pub fn ensure_disjoint(plans: &[WritePlan<'_>]) -> Result<()> {
    let mut sorted: Vec<&WritePlan<'_>> = plans.iter().collect();
    sorted.sort_by(|a, b| a.destination.cmp(&b.destination));

    // Component-wise order puts every path nested under another right after it.
    for pair in sorted.windows(2) {
        let [outer, inner] = pair else { continue };
        if inner.destination.starts_with(&outer.destination) {
            return Err(Error::OverlappingDestinations {
                first: outer.component.id.to_string(),
                second: inner.component.id.to_string(),
                path: outer.destination.clone(),
            });
        }
    }
    Ok(())
}

/// Exact match first; otherwise a version-singleton authored or imported record.
fn lookup_dependency(tracking: &dyn TrackingMap, dependency: &Component) -> Option<TrackingRecord> {
    tracking.get_exact(&dependency.id).or_else(|| {
        tracking
            .get_ignoring_version(&dependency.id)
            .filter(|record| record.origin != Origin::Nested)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitmap::BitMap;
    use crate::core::types::{ComponentId, ComponentWithDependencies};
    use std::fs;
    use tempfile::TempDir;

    fn graph(name: &str, deps: &[&str]) -> ComponentWithDependencies {
        let id = ComponentId::new(name).with_scope("ui").with_version("1.0.0");
        let dependencies = deps
            .iter()
            .map(|dep| Component::new(ComponentId::new(*dep).with_scope("ui").with_version("2.0.0")))
            .collect();
        ComponentWithDependencies::new(Component::new(id), dependencies)
    }

    fn classification(graph: &ComponentWithDependencies, saved: bool) -> Classification<'_> {
        Classification {
            graph,
            dependencies_saved_as_components: saved,
        }
    }

    fn record(id: &ComponentId, origin: Origin, root: &str) -> TrackingRecord {
        TrackingRecord {
            id: id.clone(),
            origin,
            root_dir: PathBuf::from(root),
            config_dir: None,
        }
    }

    #[test]
    fn test_top_level_defaults_to_imported_component_dir() {
        let temp = TempDir::new().unwrap();
        let layout = WorkspaceLayout::new(temp.path());
        let options = MaterializeOptions::default();
        let planner = Planner::new(&layout, &options);
        let graph = graph("button", &[]);

        let plan = planner
            .plan_component(&classification(&graph, true), &BitMap::new())
            .unwrap();

        assert_eq!(plan.origin, Origin::Imported);
        assert_eq!(plan.destination, layout.component_dir(&graph.component.id));
        assert!(plan.write_dists);
        assert!(!plan.replace_existing);
        assert!(plan.existing.is_none());
    }

    #[test]
    fn test_top_level_authored_record_skips_dists() {
        let temp = TempDir::new().unwrap();
        let layout = WorkspaceLayout::new(temp.path());
        let options = MaterializeOptions::default();
        let planner = Planner::new(&layout, &options);
        let graph = graph("button", &[]);
        let mut map = BitMap::new();
        map.record_component(record(&graph.component.id, Origin::Authored, "src/button"));

        let plan = planner
            .plan_component(&classification(&graph, true), &map)
            .unwrap();

        assert_eq!(plan.origin, Origin::Authored);
        assert_eq!(plan.destination, temp.path().join("src/button"));
        assert!(!plan.write_dists);
    }

    #[test]
    fn test_isolated_ignores_tracking_map() {
        let temp = TempDir::new().unwrap();
        let layout = WorkspaceLayout::new(temp.path());
        let options = MaterializeOptions {
            isolated: true,
            ..MaterializeOptions::default()
        };
        let planner = Planner::new(&layout, &options);
        let graph = graph("button", &[]);
        let mut map = BitMap::new();
        map.record_component(record(&graph.component.id, Origin::Imported, "vendor/button"));

        let plan = planner
            .plan_component(&classification(&graph, true), &map)
            .unwrap();

        assert_eq!(plan.origin, Origin::Authored);
        assert!(plan.existing.is_none());
        assert_eq!(plan.destination, layout.component_dir(&graph.component.id));
    }

    #[test]
    fn test_top_level_guard_failure() {
        let temp = TempDir::new().unwrap();
        let layout = WorkspaceLayout::new(temp.path());
        let options = MaterializeOptions::default();
        let planner = Planner::new(&layout, &options);
        let graph = graph("button", &[]);
        let dir = layout.component_dir(&graph.component.id);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("mine.txt"), "user content").unwrap();

        let result = planner.plan_component(&classification(&graph, true), &BitMap::new());
        assert!(matches!(result, Err(Error::DirectoryNotEmpty { .. })));
    }

    #[test]
    fn test_override_marks_replacement() {
        let temp = TempDir::new().unwrap();
        let layout = WorkspaceLayout::new(temp.path());
        let options = MaterializeOptions {
            override_existing: true,
            ..MaterializeOptions::default()
        };
        let planner = Planner::new(&layout, &options);
        let graph = graph("button", &[]);
        let dir = layout.component_dir(&graph.component.id);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("mine.txt"), "user content").unwrap();

        let plan = planner
            .plan_component(&classification(&graph, true), &BitMap::new())
            .unwrap();
        assert!(plan.replace_existing);
    }

    #[test]
    fn test_dependency_skipped_for_package_style_owner() {
        let temp = TempDir::new().unwrap();
        let layout = WorkspaceLayout::new(temp.path());
        let options = MaterializeOptions::default();
        let planner = Planner::new(&layout, &options);
        let graph = graph("button", &["utils"]);
        let mut map = BitMap::new();
        let mut cache = DedupCache::new();

        let placement = planner.plan_dependency(
            &classification(&graph, false),
            &graph.all_dependencies[0],
            &mut cache,
            &mut map,
        );

        assert!(matches!(placement, DependencyPlacement::Skipped));
        assert!(cache.is_empty());
        assert!(map.dependencies_of(&graph.component.id).is_empty());
    }

    #[test]
    fn test_authored_record_beats_cache() {
        let temp = TempDir::new().unwrap();
        let layout = WorkspaceLayout::new(temp.path());
        let options = MaterializeOptions::default();
        let planner = Planner::new(&layout, &options);
        let graph = graph("button", &["utils"]);
        let dependency = &graph.all_dependencies[0];
        let mut map = BitMap::new();
        map.record_component(record(&dependency.id, Origin::Authored, "utils"));
        let mut cache = DedupCache::new();
        cache.claim(&dependency.id, PathBuf::from("/cached/utils"));

        let placement =
            planner.plan_dependency(&classification(&graph, true), dependency, &mut cache, &mut map);

        assert_eq!(placement.path(), Some(layout.root()));
        assert!(matches!(placement, DependencyPlacement::Authored(_)));
        assert_eq!(map.dependencies_of(&graph.component.id).len(), 1);
    }

    #[test]
    fn test_tracked_dependency_on_disk_is_reused() {
        let temp = TempDir::new().unwrap();
        let layout = WorkspaceLayout::new(temp.path());
        let options = MaterializeOptions::default();
        let planner = Planner::new(&layout, &options);
        let graph = graph("button", &["utils"]);
        let dependency = &graph.all_dependencies[0];
        fs::create_dir_all(temp.path().join("components/utils")).unwrap();
        let mut map = BitMap::new();
        map.record_component(record(&dependency.id, Origin::Imported, "components/utils"));
        let mut cache = DedupCache::new();

        // Tracked records apply even when the owner keeps package-style dependencies.
        let placement = planner.plan_dependency(
            &classification(&graph, false),
            dependency,
            &mut cache,
            &mut map,
        );

        assert!(matches!(placement, DependencyPlacement::Tracked(_)));
        assert_eq!(placement.path(), Some(temp.path().join("components/utils").as_path()));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_tracked_dependency_missing_on_disk_is_rewritten() {
        let temp = TempDir::new().unwrap();
        let layout = WorkspaceLayout::new(temp.path());
        let options = MaterializeOptions::default();
        let planner = Planner::new(&layout, &options);
        let graph = graph("button", &["utils"]);
        let dependency = &graph.all_dependencies[0];
        let mut map = BitMap::new();
        map.record_component(record(&dependency.id, Origin::Nested, "gone/utils"));
        let mut cache = DedupCache::new();

        let placement =
            planner.plan_dependency(&classification(&graph, true), dependency, &mut cache, &mut map);

        let DependencyPlacement::Write(plan) = placement else {
            panic!("expected a write, got {placement:?}");
        };
        assert_eq!(plan.destination, layout.dependency_dir(&dependency.id));
        assert_eq!(plan.origin, Origin::Nested);
        assert!(!plan.write_config);
        assert_eq!(plan.parent.as_ref(), Some(&graph.component.id));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_second_reference_hits_cache() {
        let temp = TempDir::new().unwrap();
        let layout = WorkspaceLayout::new(temp.path());
        let options = MaterializeOptions::default();
        let planner = Planner::new(&layout, &options);
        let first = graph("button", &["utils"]);
        let second = graph("card", &["utils"]);
        let mut map = BitMap::new();
        let mut cache = DedupCache::new();

        let a = planner.plan_dependency(
            &classification(&first, true),
            &first.all_dependencies[0],
            &mut cache,
            &mut map,
        );
        let b = planner.plan_dependency(
            &classification(&second, true),
            &second.all_dependencies[0],
            &mut cache,
            &mut map,
        );

        assert!(matches!(a, DependencyPlacement::Write(_)));
        assert!(matches!(b, DependencyPlacement::Cached(_)));
        assert_eq!(a.path(), b.path());
        assert_eq!(map.dependencies_of(&first.component.id).len(), 1);
        assert_eq!(map.dependencies_of(&second.component.id).len(), 1);
    }

    fn scoped_graph(scope: &str, name: &str) -> ComponentWithDependencies {
        let id = ComponentId::new(name).with_scope(scope).with_version("1.0.0");
        ComponentWithDependencies::new(Component::new(id), Vec::new())
    }

    fn plan_all<'g>(
        planner: &Planner<'_>,
        graphs: &'g [ComponentWithDependencies],
        map: &BitMap,
    ) -> Vec<WritePlan<'g>> {
        graphs
            .iter()
            .map(|graph| planner.plan_component(&classification(graph, true), map).unwrap())
            .collect()
    }

    #[test]
    fn test_same_name_in_different_scopes_is_disjoint() {
        let temp = TempDir::new().unwrap();
        let layout = WorkspaceLayout::new(temp.path());
        let options = MaterializeOptions::default();
        let planner = Planner::new(&layout, &options);
        let graphs = vec![scoped_graph("ui", "button"), scoped_graph("forms", "button")];

        let plans = plan_all(&planner, &graphs, &BitMap::new());

        assert_ne!(plans[0].destination, plans[1].destination);
        assert!(ensure_disjoint(&plans).is_ok());
    }

    #[test]
    fn test_shared_tracked_root_is_rejected() {
        let temp = TempDir::new().unwrap();
        let layout = WorkspaceLayout::new(temp.path());
        let options = MaterializeOptions::default();
        let planner = Planner::new(&layout, &options);
        let graphs = vec![scoped_graph("ui", "button"), scoped_graph("forms", "button")];
        let mut map = BitMap::new();
        for graph in &graphs {
            map.record_component(record(&graph.component.id, Origin::Imported, "components/button"));
        }

        let plans = plan_all(&planner, &graphs, &map);

        let Err(Error::OverlappingDestinations { path, .. }) = ensure_disjoint(&plans) else {
            panic!("expected overlapping destinations");
        };
        assert_eq!(path, temp.path().join("components/button"));
    }

    #[test]
    fn test_nested_destination_is_rejected() {
        let temp = TempDir::new().unwrap();
        let layout = WorkspaceLayout::new(temp.path());
        let options = MaterializeOptions::default();
        let planner = Planner::new(&layout, &options);
        let graphs = vec![scoped_graph("ui", "button"), scoped_graph("ui", "card")];
        let mut map = BitMap::new();
        map.record_component(record(&graphs[1].component.id, Origin::Imported, "components/ui"));

        let plans = plan_all(&planner, &graphs, &map);

        let Err(Error::OverlappingDestinations { first, second, .. }) = ensure_disjoint(&plans)
        else {
            panic!("expected overlapping destinations");
        };
        assert_eq!(first, graphs[1].component.id.to_string());
        assert_eq!(second, graphs[0].component.id.to_string());
    }
}
