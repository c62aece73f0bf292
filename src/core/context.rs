// src/core/context.rs

//! # Validation context
//!
//! A `ValidationContext` is what a rule sees while a node is being validated: the chain of the
//! node's ancestors (nearest first), the whole graph with its lookup index, the pluggable
//! [`Services`], and, for save-time validation, a [`SaveContext`] describing the pending edit.
//!
//! Contexts are immutable. Descending into a child shares the parent's chain through an `Arc`, so
//! cloning a context never copies the chain.

use crate::core::capabilities::Services;
use crate::core::graph::ConfigGraph;
use crate::core::index::GraphIndex;
use crate::core::walker::Node;
use crate::models::{
    Job, Material, Name, PackageDefinition, PackageRepository, Pipeline, PipelineGroup, Scm, Stage,
    Template,
};
use std::fmt;
use std::sync::Arc;

/// Describes the edit a save-time validation is checking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveContext {
    /// The pipeline being saved.
    pub pipeline: Name,
    /// Whether the edited pipeline is being created.
    pub is_new_pipeline: bool,
    /// The group the edited pipeline is saved into.
    pub group_name: Name,
}

impl SaveContext {
    pub fn new(pipeline: impl Into<Name>, group_name: impl Into<Name>, is_new_pipeline: bool) -> Self {
        Self {
            pipeline: pipeline.into(),
            is_new_pipeline,
            group_name: group_name.into(),
        }
    }
}

#[derive(Debug)]
struct ChainLink<'a> {
    node: Node<'a>,
    parent: Option<Arc<ChainLink<'a>>>,
}

#[derive(Clone)]
pub struct ValidationContext<'a> {
    chain: Option<Arc<ChainLink<'a>>>,
    graph: &'a ConfigGraph,
    index: &'a GraphIndex<'a>,
    services: &'a Services,
    save: Option<&'a SaveContext>,
}

impl fmt::Debug for ValidationContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let labels: Vec<String> = self.ancestors().map(|node| node.label()).collect();
        f.debug_struct("ValidationContext")
            .field("ancestors", &labels)
            .field("save", &self.save)
            .finish_non_exhaustive()
    }
}

impl<'a> ValidationContext<'a> {
    /// Context of a graph root: no ancestors.
    pub fn root(graph: &'a ConfigGraph, index: &'a GraphIndex<'a>, services: &'a Services) -> Self {
        Self {
            chain: None,
            graph,
            index,
            services,
            save: None,
        }
    }

    /// Context for a node whose ancestors are `ancestors`, outermost first.
    pub fn for_chain(
        graph: &'a ConfigGraph,
        index: &'a GraphIndex<'a>,
        services: &'a Services,
        ancestors: &[Node<'a>],
    ) -> Self {
        ancestors
            .iter()
            .fold(Self::root(graph, index, services), |context, node| {
                context.with_parent(*node)
            })
    }

    pub fn with_save_context(mut self, save: Option<&'a SaveContext>) -> Self {
        self.save = save;
        self
    }

    /// The context of `node`'s children.
    pub fn with_parent(&self, node: Node<'a>) -> Self {
        Self {
            chain: Some(Arc::new(ChainLink {
                node,
                parent: self.chain.clone(),
            })),
            ..self.clone()
        }
    }

    // --- Chain ---

    /// The nearest ancestor.
    pub fn parent(&self) -> Option<Node<'a>> {
        self.chain.as_ref().map(|link| link.node)
    }

    /// Ancestors, nearest first.
    pub fn ancestors(&self) -> impl Iterator<Item = Node<'a>> + '_ {
        let mut cursor = self.chain.as_deref();
        std::iter::from_fn(move || {
            let link = cursor?;
            cursor = link.parent.as_deref();
            Some(link.node)
        })
    }

    pub fn is_within_templates(&self) -> bool {
        self.template().is_some()
    }

    /// Whether any ancestor is a pipeline group, including nodes a group owns outside its
    /// pipelines such as its authorization.
    pub fn is_within_pipelines(&self) -> bool {
        self.group().is_some()
    }

    pub fn group(&self) -> Option<&'a PipelineGroup> {
        self.ancestors().find_map(|node| match node {
            Node::Group(group) => Some(group),
            _ => None,
        })
    }

    pub fn pipeline(&self) -> Option<&'a Pipeline> {
        self.ancestors().find_map(|node| match node {
            Node::Pipeline(pipeline) => Some(pipeline),
            _ => None,
        })
    }

    pub fn template(&self) -> Option<&'a Template> {
        self.ancestors().find_map(|node| match node {
            Node::Template(template) => Some(template),
            _ => None,
        })
    }

    pub fn stage(&self) -> Option<&'a Stage> {
        self.ancestors().find_map(|node| match node {
            Node::Stage(stage) => Some(stage),
            _ => None,
        })
    }

    pub fn job(&self) -> Option<&'a Job> {
        self.ancestors().find_map(|node| match node {
            Node::Job(job) => Some(job),
            _ => None,
        })
    }

    /// `ancestor > ... > node` labels, outermost first.
    pub fn location(&self, node: Node<'a>) -> String {
        let mut labels: Vec<String> = self.ancestors().map(|ancestor| ancestor.label()).collect();
        labels.reverse();
        labels.push(node.label());
        labels.join(" > ")
    }

    // --- Graph lookups ---

    pub fn graph(&self) -> &'a ConfigGraph {
        self.graph
    }

    pub fn index(&self) -> &'a GraphIndex<'a> {
        self.index
    }

    pub fn services(&self) -> &'a Services {
        self.services
    }

    pub fn save_context(&self) -> Option<&'a SaveContext> {
        self.save
    }

    pub fn pipeline_by_name(&self, name: &Name) -> Option<&'a Pipeline> {
        self.index.pipeline(name)
    }

    pub fn find_scm_by_id(&self, id: &str) -> Option<&'a Scm> {
        self.index.scm(id)
    }

    pub fn find_package_by_id(
        &self,
        id: &str,
    ) -> Option<(&'a PackageRepository, &'a PackageDefinition)> {
        self.index.package(id)
    }

    pub fn does_template_exist(&self, name: &Name) -> bool {
        self.index.template(name).is_some()
    }

    pub fn role_exists(&self, name: &Name) -> bool {
        self.index.has_role(name)
    }

    /// Every material in the graph sharing `fingerprint`, across all pipelines and sources.
    pub fn all_materials_by_fingerprint(&self, fingerprint: &str) -> &'a [&'a Material] {
        self.index.materials_by_fingerprint(fingerprint)
    }
}
