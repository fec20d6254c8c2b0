//! Decides whether a top-level component's dependencies are written as
//! component copies or left to the package manager.

use crate::core::traits::RemoteRegistry;
use crate::core::types::ComponentWithDependencies;
use std::collections::HashSet;

/// A top-level graph together with its dependency strategy for this run.
#[derive(Debug, Clone, Copy)]
pub struct Classification<'a> {
    /// The graph being materialized.
    pub graph: &'a ComponentWithDependencies,
    /// Whether dependencies get filesystem copies.
    pub dependencies_saved_as_components: bool,
}

/// Classifies every top-level component.
///
/// Dependencies are saved as components when the caller forces it or when the
/// component's scope is not served by a hub remote (non-hub remotes cannot
/// distribute component-style dependencies as packages). Unscoped components
/// have no remote and are treated as non-hub.
pub fn classify<'a>(
    graphs: &'a [ComponentWithDependencies],
    registry: &dyn RemoteRegistry,
    save_dependencies_as_components: bool,
) -> Vec<Classification<'a>> {
    graphs
        .iter()
        .map(|graph| {
            let is_hub = graph
                .component
                .id
                .scope
                .as_deref()
                .is_some_and(|scope| registry.is_hub(scope));
            let saved = save_dependencies_as_components || !is_hub;
            tracing::debug!(
                component = %graph.component.id,
                is_hub,
                dependencies_saved_as_components = saved,
                "Classified component origin"
            );
            Classification {
                graph,
                dependencies_saved_as_components: saved,
            }
        })
        .collect()
}

/// A [`RemoteRegistry`] backed by a fixed set of hub scopes.
#[derive(Debug, Clone, Default)]
pub struct HubScopes {
    scopes: HashSet<String>,
}

impl HubScopes {
    /// Creates an empty registry: every scope is non-hub.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `scope` as hub-capable.
    #[must_use]
    pub fn with_hub(mut self, scope: impl Into<String>) -> Self {
        self.scopes.insert(scope.into());
        self
    }
}

impl<S: Into<String>> FromIterator<S> for HubScopes {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            scopes: iter.into_iter().map(Into::into).collect(),
        }
    }
}

impl RemoteRegistry for HubScopes {
    fn is_hub(&self, scope: &str) -> bool {
        self.scopes.contains(scope)
    }
}
