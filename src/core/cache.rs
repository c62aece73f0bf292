// src/core/cache.rs

//! # Lookup cache
//!
//! Indices derived from the last published graph:
//!
//! - pipeline name (case-insensitive) → pipeline definition
//! - material fingerprint → every material sharing it
//! - pipeline name → its unique upstream `DependencyNode`s, in material order
//!
//! Readers take a cheap `Arc` snapshot of the current indices. A full rebuild assembles new
//! indices off to the side and swaps them in with a single pointer update, so a reader sees either
//! the old or the new indices, never a mix. The single-pipeline path copies the indices, patches
//! one pipeline's entries and swaps the copy in the same way.

use crate::core::dependency::{self, DependencyNode};
use crate::core::graph::ConfigGraph;
use crate::core::material;
use crate::models::{Material, Name, Pipeline};
use log::{debug, info};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

#[derive(Debug, Clone, Default)]
struct Indices {
    pipelines: HashMap<Name, Arc<Pipeline>>,
    /// Each material is stored with the pipeline that declares it, so that one pipeline's
    /// contributions can be replaced without touching the others.
    materials: HashMap<String, Vec<(Name, Material)>>,
    dependencies: HashMap<Name, Vec<DependencyNode>>,
}

impl Indices {
    fn build(graph: &ConfigGraph) -> Self {
        let mut indices = Self::default();
        for pipeline in graph.all_pipelines() {
            if indices.pipelines.contains_key(&pipeline.name) {
                continue;
            }
            indices.insert(pipeline);
        }
        indices
    }

    fn insert(&mut self, pipeline: &Pipeline) {
        for item in pipeline.materials.iter() {
            self.materials
                .entry(material::fingerprint(item))
                .or_default()
                .push((pipeline.name.clone(), item.clone()));
        }
        self.dependencies
            .insert(pipeline.name.clone(), dependency::upstream_nodes(pipeline));
        self.pipelines
            .insert(pipeline.name.clone(), Arc::new(pipeline.clone()));
    }

    fn remove(&mut self, name: &Name) {
        self.pipelines.remove(name);
        self.dependencies.remove(name);
        self.materials.retain(|_, owners| {
            owners.retain(|(owner, _)| owner != name);
            !owners.is_empty()
        });
    }
}

/// Process-wide read cache over the published configuration.
#[derive(Debug, Default)]
pub struct LookupCache {
    current: RwLock<Option<Arc<Indices>>>,
}

impl LookupCache {
    /// An empty cache; reads miss until the first rebuild.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds every index from `graph`.
    pub fn on_config_change(&self, graph: &ConfigGraph) {
        let indices = Indices::build(graph);
        info!(
            "Lookup cache rebuilt: {} pipeline(s), {} material fingerprint(s)",
            indices.pipelines.len(),
            indices.materials.len()
        );
        self.swap(indices);
    }

    /// Replaces the entries of a single pipeline, leaving every other entry as it was.
    pub fn on_pipeline_config_change(&self, pipeline: &Pipeline) {
        let mut indices = self
            .snapshot()
            .map(|current| Indices::clone(&current))
            .unwrap_or_default();
        indices.remove(&pipeline.name);
        indices.insert(pipeline);
        debug!("Lookup cache updated for pipeline '{}'", pipeline.name);
        self.swap(indices);
    }

    /// True once the cache has been filled at least once.
    pub fn is_initialized(&self) -> bool {
        self.snapshot().is_some()
    }

    /// The cached pipeline called `name`.
    pub fn pipeline(&self, name: &str) -> Option<Arc<Pipeline>> {
        self.snapshot()?.pipelines.get(&Name::from(name)).cloned()
    }

    /// Every cached material with this fingerprint, in publish order. Empty when none is cached.
    pub fn materials_by_fingerprint(&self, fingerprint: &str) -> Vec<Material> {
        self.snapshot()
            .and_then(|indices| {
                indices
                    .materials
                    .get(fingerprint)
                    .map(|owners| owners.iter().map(|(_, item)| item.clone()).collect())
            })
            .unwrap_or_default()
    }

    /// The upstream nodes of `name`. `None` when the pipeline was never cached; an empty list
    /// when it has no dependency materials.
    pub fn dependencies_of(&self, name: &str) -> Option<Vec<DependencyNode>> {
        self.snapshot()?.dependencies.get(&Name::from(name)).cloned()
    }

    fn snapshot(&self) -> Option<Arc<Indices>> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn swap(&self, indices: Indices) {
        let fresh = Arc::new(indices);
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Some(fresh);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{basic_config, dependent_pipeline, group, init_logger, simple_pipeline};

    fn published() -> ConfigGraph {
        ConfigGraph::basic(basic_config(vec![group(
            "g",
            vec![
                simple_pipeline("up"),
                simple_pipeline("other"),
                dependent_pipeline("down", "up", "stage"),
            ],
        )]))
    }

    #[test]
    fn test_reads_before_first_build_are_empty() {
        let cache = LookupCache::new();
        assert!(!cache.is_initialized());
        assert!(cache.pipeline("up").is_none());
        assert!(cache.dependencies_of("up").is_none());
        assert!(cache.materials_by_fingerprint("abc").is_empty());
    }

    #[test]
    fn test_full_rebuild_indexes_every_pipeline() {
        // --- Setup ---
        init_logger();
        let graph = published();
        let cache = LookupCache::new();
        let git = material::fingerprint(&Material::git("http://example.com/repo.git"));

        // --- Execute ---
        cache.on_config_change(&graph);

        // --- Assert ---
        assert_eq!(cache.pipeline("UP").unwrap().name, "up");
        assert_eq!(cache.materials_by_fingerprint(&git).len(), 2);
        assert_eq!(
            cache.dependencies_of("down"),
            Some(vec![DependencyNode {
                pipeline: Name::from("up"),
                stage: Name::from("stage"),
            }])
        );
        assert_eq!(cache.dependencies_of("up"), Some(Vec::new()));
    }

    #[test]
    fn test_single_pipeline_update_leaves_others_alone() {
        // --- Setup ---
        let cache = LookupCache::new();
        cache.on_config_change(&published());
        let git = material::fingerprint(&Material::git("http://example.com/repo.git"));
        let before_other = cache.pipeline("other").unwrap();
        let mut edited = dependent_pipeline("up", "other", "stage");
        edited.stages[0].name = Name::from("renamed");

        // --- Execute ---
        cache.on_pipeline_config_change(&edited);

        // --- Assert ---
        assert_eq!(cache.pipeline("up").unwrap().stages[0].name, "renamed");
        assert_eq!(cache.materials_by_fingerprint(&git).len(), 1);
        assert_eq!(cache.dependencies_of("up").unwrap()[0].pipeline, "other");
        assert!(Arc::ptr_eq(&before_other, &cache.pipeline("other").unwrap()));
        assert_eq!(cache.dependencies_of("down").unwrap().len(), 1);
    }

    #[test]
    fn test_rebuild_is_atomic_for_existing_readers() {
        // --- Setup ---
        let cache = LookupCache::new();
        cache.on_config_change(&published());
        let held = cache.snapshot().unwrap();

        // --- Execute ---
        cache.on_config_change(&ConfigGraph::default());

        // --- Assert ---
        assert!(held.pipelines.contains_key(&Name::from("up")));
        assert!(cache.pipeline("up").is_none());
        assert!(cache.is_initialized());
    }
}
