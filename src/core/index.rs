// src/core/index.rs

//! Lookup tables built once per validation pass over a borrowed graph, so that per-node rules
//! answer "does X exist" questions without rescanning the whole configuration.

use crate::core::dependency::DependencyGraph;
use crate::core::graph::ConfigGraph;
use crate::core::material;
use crate::models::{Material, Name, PackageDefinition, PackageRepository, Pipeline, Scm, Template};
use log::debug;
use std::collections::{HashMap, HashSet};

/// Name and id lookups over one borrowed graph.
#[derive(Debug)]
pub struct GraphIndex<'a> {
    pipelines: HashMap<Name, &'a Pipeline>,
    materials: HashMap<String, Vec<&'a Material>>,
    templates: HashMap<Name, &'a Template>,
    scms: HashMap<&'a str, &'a Scm>,
    packages: HashMap<&'a str, (&'a PackageRepository, &'a PackageDefinition)>,
    roles: HashSet<Name>,
    dependencies: DependencyGraph,
}

impl<'a> GraphIndex<'a> {
    /// Indexes every pipeline, material, template, SCM, package and role of `graph`. When a
    /// name is declared more than once, the first declaration is kept.
    pub fn build(graph: &'a ConfigGraph) -> Self {
        let all_pipelines = graph.all_pipelines();

        let mut pipelines = HashMap::new();
        let mut materials: HashMap<String, Vec<&'a Material>> = HashMap::new();
        for pipeline in &all_pipelines {
            pipelines.entry(pipeline.name.clone()).or_insert(*pipeline);
            for item in pipeline.materials.iter() {
                materials
                    .entry(material::fingerprint(item))
                    .or_default()
                    .push(item);
            }
        }

        let mut templates = HashMap::new();
        for template in graph.templates() {
            templates.entry(template.name.clone()).or_insert(template);
        }

        let mut scms = HashMap::new();
        for scm in graph.scms() {
            scms.entry(scm.id.as_str()).or_insert(scm);
        }

        let mut packages = HashMap::new();
        for repository in graph.package_repositories() {
            for package in &repository.packages {
                packages
                    .entry(package.id.as_str())
                    .or_insert((repository, package));
            }
        }

        let roles = graph
            .security()
            .roles
            .iter()
            .map(|role| role.name.clone())
            .collect();

        let index = Self {
            dependencies: DependencyGraph::from_pipelines(all_pipelines.iter().copied()),
            pipelines,
            materials,
            templates,
            scms,
            packages,
            roles,
        };
        debug!(
            "Indexed {} pipelines, {} material fingerprints, {} templates",
            index.pipelines.len(),
            index.materials.len(),
            index.templates.len()
        );
        index
    }

    /// The first declaration of a pipeline.
    pub fn pipeline(&self, name: &Name) -> Option<&'a Pipeline> {
        self.pipelines.get(name).copied()
    }

    /// The first template called `name`.
    pub fn template(&self, name: &Name) -> Option<&'a Template> {
        self.templates.get(name).copied()
    }

    /// The SCM with id `id`.
    pub fn scm(&self, id: &str) -> Option<&'a Scm> {
        self.scms.get(id).copied()
    }

    /// The package definition with id `id` and its repository.
    pub fn package(&self, id: &str) -> Option<(&'a PackageRepository, &'a PackageDefinition)> {
        self.packages.get(id).copied()
    }

    /// Whether `name` is a declared security role.
    pub fn has_role(&self, name: &Name) -> bool {
        self.roles.contains(name)
    }

    /// Every material, across all pipelines, sharing `fingerprint`.
    pub fn materials_by_fingerprint(&self, fingerprint: &str) -> &[&'a Material] {
        self.materials
            .get(fingerprint)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// The dependency graph of every pipeline.
    pub fn dependencies(&self) -> &DependencyGraph {
        &self.dependencies
    }
}
