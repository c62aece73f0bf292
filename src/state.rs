// src/state.rs

//! The published configuration.
//!
//! `ConfigState` holds the current snapshot behind an `Arc` and the lookup cache derived from it.
//! A candidate graph is validated in full before it replaces the snapshot; a rejected candidate
//! leaves both the snapshot and the cache untouched. Readers clone the `Arc` and keep a consistent
//! view for as long as they hold it.

use crate::core::cache::LookupCache;
use crate::core::capabilities::Services;
use crate::core::context::SaveContext;
use crate::core::errors::{ConfigError, ConfigResult};
use crate::core::graph::ConfigGraph;
use crate::core::validator::{self, ValidationReport};
use crate::models::{Name, Pipeline, PipelineGroup};
use log::{info, warn};
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

#[derive(Debug)]
pub struct ConfigState {
    current: RwLock<Arc<ConfigGraph>>,
    cache: LookupCache,
    services: Services,
}

impl Default for ConfigState {
    fn default() -> Self {
        Self::new(Services::default())
    }
}

impl ConfigState {
    /// An empty configuration with an empty cache.
    pub fn new(services: Services) -> Self {
        Self {
            current: RwLock::new(Arc::new(ConfigGraph::default())),
            cache: LookupCache::new(),
            services,
        }
    }

    /// The published snapshot.
    pub fn current(&self) -> Arc<ConfigGraph> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn cache(&self) -> &LookupCache {
        &self.cache
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    /// Validates `graph` and, when it is clean, makes it the published snapshot and rebuilds the
    /// cache from it.
    ///
    /// # Errors
    /// `ConfigError::Invalid` carrying the report when validation finds any problem.
    pub fn publish(&self, mut graph: ConfigGraph) -> ConfigResult<Arc<ConfigGraph>> {
        let report = validator::validate(&mut graph, &self.services);
        let graph = self.accept(graph, report)?;
        self.cache.on_config_change(&graph);
        Ok(graph)
    }

    /// Saves one pipeline into `group` on a copy of the published snapshot, validates the copy
    /// with the save-time rules and publishes it. Only that pipeline's cache entries are updated.
    ///
    /// # Errors
    /// `ConfigError::Invalid` when the edited configuration has problems, or the graph error that
    /// prevented the edit (for example a group that exists only in a config repository).
    pub fn publish_pipeline(
        &self,
        group: &str,
        pipeline: Pipeline,
        is_new: bool,
    ) -> ConfigResult<Arc<ConfigGraph>> {
        let name = pipeline.name.clone();
        let mut graph = ConfigGraph::clone(&self.current());
        if is_new {
            // Never replaces an existing declaration; a clash surfaces as a duplicate name.
            if !graph.has_group(group) {
                graph.add_group(PipelineGroup::new(group));
            }
            graph.group_mut(group)?.add_pipeline(pipeline)?;
            graph.resolve_material_references();
        } else {
            graph.upsert_pipeline(group, pipeline)?;
        }

        let save = SaveContext::new(name.clone(), group, is_new);
        let report = validator::validate_for_save(&mut graph, &self.services, &save);
        let graph = self.accept(graph, report)?;
        let saved = graph.pipeline_by_name(name.as_str())?;
        self.cache.on_pipeline_config_change(saved);
        Ok(graph)
    }

    fn accept(&self, graph: ConfigGraph, report: ValidationReport) -> ConfigResult<Arc<ConfigGraph>> {
        if !report.is_valid() {
            warn!(
                "Rejected configuration with {} error(s); keeping the published snapshot",
                report.error_count()
            );
            return Err(ConfigError::Invalid {
                report: Box::new(report),
            });
        }
        let graph = Arc::new(graph);
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Arc::clone(&graph);
        info!(
            "Published configuration with {} pipeline(s)",
            graph.all_pipeline_names().len()
        );
        Ok(graph)
    }

    /// Names of the pipelines in the published snapshot.
    pub fn pipeline_names(&self) -> Vec<Name> {
        self.current().all_pipeline_names()
    }
}

static CONFIG_STATE: OnceLock<ConfigState> = OnceLock::new();

/// The process-wide state, created empty with the default services on first use.
pub fn config_state() -> &'static ConfigState {
    CONFIG_STATE.get_or_init(ConfigState::default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{basic_config, dependent_pipeline, group, init_logger, simple_pipeline};

    fn valid_graph() -> ConfigGraph {
        ConfigGraph::basic(basic_config(vec![group(
            "g",
            vec![simple_pipeline("up"), dependent_pipeline("down", "up", "stage")],
        )]))
    }

    #[test]
    fn test_publish_swaps_snapshot_and_rebuilds_cache() -> anyhow::Result<()> {
        // --- Setup ---
        init_logger();
        let state = ConfigState::default();

        // --- Execute ---
        let published = state.publish(valid_graph())?;

        // --- Assert ---
        assert!(Arc::ptr_eq(&published, &state.current()));
        assert_eq!(state.pipeline_names().len(), 2);
        assert_eq!(state.cache().dependencies_of("down").map(|d| d.len()), Some(1));
        Ok(())
    }

    #[test]
    fn test_rejected_publish_keeps_previous_snapshot() -> anyhow::Result<()> {
        // --- Setup ---
        let state = ConfigState::default();
        let before = state.publish(valid_graph())?;
        let broken = ConfigGraph::basic(basic_config(vec![group(
            "g",
            vec![dependent_pipeline("a", "b", "stage"), dependent_pipeline("b", "a", "stage")],
        )]));

        // --- Execute ---
        let result = state.publish(broken);

        // --- Assert ---
        let Err(ConfigError::Invalid { report }) = result else {
            panic!("expected an invalid configuration");
        };
        assert!(report.messages().any(|m| m.starts_with("Circular dependency: ")));
        assert!(Arc::ptr_eq(&before, &state.current()));
        assert!(state.cache().pipeline("a").is_none());
        Ok(())
    }

    #[test]
    fn test_publish_pipeline_updates_one_entry() -> anyhow::Result<()> {
        // --- Setup ---
        let state = ConfigState::default();
        state.publish(valid_graph())?;
        let before_down = state.cache().pipeline("down");
        let mut edited = simple_pipeline("up");
        edited.stages[0].jobs[0].resources.push("linux".to_string());

        // --- Execute ---
        state.publish_pipeline("g", edited, false)?;

        // --- Assert ---
        let cached = state.cache().pipeline("up").unwrap();
        assert_eq!(cached.stages[0].jobs[0].resources, vec!["linux".to_string()]);
        assert!(Arc::ptr_eq(&before_down.unwrap(), &state.cache().pipeline("down").unwrap()));
        assert_eq!(state.current().find_group_of_pipeline("up").unwrap().name().unwrap(), "g");
        Ok(())
    }

    #[test]
    fn test_new_pipeline_with_taken_name_is_rejected() -> anyhow::Result<()> {
        // --- Setup ---
        let state = ConfigState::default();
        state.publish(valid_graph())?;

        // --- Execute ---
        let result = state.publish_pipeline("other", simple_pipeline("UP"), true);

        // --- Assert ---
        let Err(ConfigError::Invalid { report }) = result else {
            panic!("expected a duplicate name error");
        };
        assert!(report.contains(
            "You have defined multiple pipelines called 'up'. Pipeline names are case-insensitive and must be unique."
        ));
        assert!(state.current().find_group("other").is_none());
        Ok(())
    }
}
