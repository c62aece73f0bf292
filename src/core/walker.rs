// src/core/walker.rs

//! # Graph walker
//!
//! Depth-first, pre-order traversal over the configuration entities, driven by an explicit stack.
//! Only ownership edges are followed: a package or pluggable SCM material's resolved definition is
//! owned (and validated) by the package repository or SCM list, so it is never reached from the
//! material. Nodes are de-duplicated by identity (their address), never by equality, so two equal
//! entities are each visited once.
//!
//! Every visited node is addressed by a `NodeId`, the path of `Step`s from a graph root. Paths
//! are how validation results computed over a shared `&ConfigGraph` find their way back onto the
//! entities through [`errors_mut`].

use crate::core::context::ValidationContext;
use crate::core::errors::ConfigErrors;
use crate::core::graph::{ConfigGraph, PartRef, SourceId};
use crate::core::material;
use crate::models::{
    Authorization, ConfigProperty, ConfigRepo, Environment, EnvironmentVariable, Job, Material,
    Materials, PackageDefinition, PackageRepository, Pipeline, PipelineGroup, Role, Scm, Stage,
    Task, TaskKind, Template,
};
use log::debug;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::mem::Discriminant;

// --- ADDRESSING ---

/// One edge of a path from a graph root to an entity.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Group(PartRef),
    Environment(PartRef),
    Template(SourceId, usize),
    Role(usize),
    ConfigRepo(usize),
    PackageRepository(usize),
    Scm(SourceId, usize),
    Authorization,
    Pipeline(usize),
    Materials,
    Material(usize),
    Stage(usize),
    Job(usize),
    Task(usize),
    OnCancel,
    Variable(usize),
    Package(usize),
    Property(usize),
}

/// Path from a graph root to an entity.
#[derive(Serialize, Debug, Clone, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct NodeId(Vec<Step>);

impl NodeId {
    pub fn root(step: Step) -> Self {
        Self(vec![step])
    }

    pub fn child(&self, step: Step) -> Self {
        let mut steps = self.0.clone();
        steps.push(step);
        Self(steps)
    }

    pub fn steps(&self) -> &[Step] {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let steps: Vec<String> = self.0.iter().map(|step| format!("{step:?}")).collect();
        f.write_str(&steps.join("/"))
    }
}

// --- NODES ---

/// A borrowed configuration entity.
#[derive(Debug, Clone, Copy)]
pub enum Node<'a> {
    Group(&'a PipelineGroup),
    Authorization(&'a Authorization),
    Pipeline(&'a Pipeline),
    Materials(&'a Materials),
    Material(&'a Material),
    Stage(&'a Stage),
    Job(&'a Job),
    Task(&'a Task),
    Variable(&'a EnvironmentVariable),
    Environment(&'a Environment),
    Template(&'a Template),
    Role(&'a Role),
    ConfigRepo(&'a ConfigRepo),
    PackageRepository(&'a PackageRepository),
    Package(&'a PackageDefinition),
    Scm(&'a Scm),
    Property(&'a ConfigProperty),
}

impl<'a> Node<'a> {
    /// Owned children, in declaration order.
    pub fn children(&self) -> Vec<(Step, Node<'a>)> {
        match *self {
            Node::Group(group) => group
                .authorization
                .iter()
                .map(|auth| (Step::Authorization, Node::Authorization(auth)))
                .chain(indexed(&group.pipelines, Step::Pipeline, Node::Pipeline))
                .collect(),
            Node::Pipeline(pipeline) => std::iter::once((Step::Materials, Node::Materials(&pipeline.materials)))
                .chain(indexed(&pipeline.variables, Step::Variable, Node::Variable))
                .chain(indexed(&pipeline.stages, Step::Stage, Node::Stage))
                .collect(),
            Node::Materials(materials) => {
                indexed(&materials.items, Step::Material, Node::Material).collect()
            }
            Node::Stage(stage) => indexed(&stage.variables, Step::Variable, Node::Variable)
                .chain(indexed(&stage.jobs, Step::Job, Node::Job))
                .collect(),
            Node::Job(job) => indexed(&job.variables, Step::Variable, Node::Variable)
                .chain(indexed(&job.tasks, Step::Task, Node::Task))
                .collect(),
            Node::Task(task) => {
                let properties: &[ConfigProperty] = match &task.kind {
                    TaskKind::Pluggable { configuration, .. } => configuration,
                    _ => &[],
                };
                indexed(properties, Step::Property, Node::Property)
                    .chain(
                        task.on_cancel
                            .as_deref()
                            .map(|on_cancel| (Step::OnCancel, Node::Task(on_cancel))),
                    )
                    .collect()
            }
            Node::Environment(environment) => {
                indexed(&environment.variables, Step::Variable, Node::Variable).collect()
            }
            Node::Template(template) => template
                .authorization
                .iter()
                .map(|auth| (Step::Authorization, Node::Authorization(auth)))
                .chain(indexed(&template.stages, Step::Stage, Node::Stage))
                .collect(),
            Node::ConfigRepo(repo) => vec![(Step::Material(0), Node::Material(&repo.material))],
            Node::PackageRepository(repository) => {
                indexed(&repository.configuration, Step::Property, Node::Property)
                    .chain(indexed(&repository.packages, Step::Package, Node::Package))
                    .collect()
            }
            Node::Package(package) => {
                indexed(&package.configuration, Step::Property, Node::Property).collect()
            }
            Node::Scm(scm) => indexed(&scm.configuration, Step::Property, Node::Property).collect(),
            // Package and SCM materials hold their resolved definition, which is not owned.
            Node::Material(_)
            | Node::Authorization(_)
            | Node::Variable(_)
            | Node::Role(_)
            | Node::Property(_) => Vec::new(),
        }
    }

    pub fn errors(&self) -> &'a ConfigErrors {
        match *self {
            Node::Group(n) => &n.errors,
            Node::Authorization(n) => &n.errors,
            Node::Pipeline(n) => &n.errors,
            Node::Materials(n) => &n.errors,
            Node::Material(n) => &n.errors,
            Node::Stage(n) => &n.errors,
            Node::Job(n) => &n.errors,
            Node::Task(n) => &n.errors,
            Node::Variable(n) => &n.errors,
            Node::Environment(n) => &n.errors,
            Node::Template(n) => &n.errors,
            Node::Role(n) => &n.errors,
            Node::ConfigRepo(n) => &n.errors,
            Node::PackageRepository(n) => &n.errors,
            Node::Package(n) => &n.errors,
            Node::Scm(n) => &n.errors,
            Node::Property(n) => &n.errors,
        }
    }

    /// Human-readable label, used in report locations and scoped messages.
    pub fn label(&self) -> String {
        match *self {
            Node::Group(n) => format!("group '{}'", n.name),
            Node::Authorization(_) => "authorization".to_string(),
            Node::Pipeline(n) => format!("pipeline '{}'", n.name),
            Node::Materials(_) => "materials".to_string(),
            Node::Material(n) => match material::effective_name(n) {
                Some(name) => format!("material '{name}'"),
                None => format!("material '{}'", material::describe(n)),
            },
            Node::Stage(n) => format!("stage '{}'", n.name),
            Node::Job(n) => format!("job '{}'", n.name),
            Node::Task(n) => match n.kind {
                TaskKind::Exec { .. } => "exec task".to_string(),
                TaskKind::Fetch { .. } => "fetch task".to_string(),
                TaskKind::Pluggable { .. } => "pluggable task".to_string(),
            },
            Node::Variable(n) => format!("variable '{}'", n.name),
            Node::Environment(n) => format!("environment '{}'", n.name),
            Node::Template(n) => format!("template '{}'", n.name),
            Node::Role(n) => format!("role '{}'", n.name),
            Node::ConfigRepo(n) => format!("config repo '{}'", n.id),
            Node::PackageRepository(n) => format!("package repository '{}'", n.name),
            Node::Package(n) => format!("package '{}'", n.name),
            Node::Scm(n) => format!("SCM '{}'", n.name),
            Node::Property(n) => format!("property '{}'", n.key),
        }
    }

    fn identity(&self) -> (Discriminant<Self>, usize) {
        let address = match *self {
            Node::Group(n) => address_of(n),
            Node::Authorization(n) => address_of(n),
            Node::Pipeline(n) => address_of(n),
            Node::Materials(n) => address_of(n),
            Node::Material(n) => address_of(n),
            Node::Stage(n) => address_of(n),
            Node::Job(n) => address_of(n),
            Node::Task(n) => address_of(n),
            Node::Variable(n) => address_of(n),
            Node::Environment(n) => address_of(n),
            Node::Template(n) => address_of(n),
            Node::Role(n) => address_of(n),
            Node::ConfigRepo(n) => address_of(n),
            Node::PackageRepository(n) => address_of(n),
            Node::Package(n) => address_of(n),
            Node::Scm(n) => address_of(n),
            Node::Property(n) => address_of(n),
        };
        (std::mem::discriminant(self), address)
    }
}

fn address_of<T>(value: &T) -> usize {
    std::ptr::from_ref(value).addr()
}

fn indexed<'a, T>(
    items: &'a [T],
    step: fn(usize) -> Step,
    node: fn(&'a T) -> Node<'a>,
) -> impl Iterator<Item = (Step, Node<'a>)> + 'a {
    items
        .iter()
        .enumerate()
        .map(move |(index, item)| (step(index), node(item)))
}

/// Every root entity of the graph: group and environment parts of every view, then templates,
/// roles, config repositories, package repositories and SCMs.
pub fn roots(graph: &ConfigGraph) -> Vec<(NodeId, Node<'_>)> {
    let mut roots = Vec::new();
    for part in graph.groups.iter().flat_map(|view| view.parts()) {
        if let Some(group) = graph.group_part(*part) {
            roots.push((NodeId::root(Step::Group(*part)), Node::Group(group)));
        }
    }
    for part in graph.environments.iter().flat_map(|view| view.parts()) {
        if let Some(environment) = graph.environment_part(*part) {
            roots.push((NodeId::root(Step::Environment(*part)), Node::Environment(environment)));
        }
    }
    for source in graph.source_ids() {
        for (index, template) in graph.source_templates(source).iter().enumerate() {
            roots.push((NodeId::root(Step::Template(source, index)), Node::Template(template)));
        }
    }
    for (index, role) in graph.main.security.roles.iter().enumerate() {
        roots.push((NodeId::root(Step::Role(index)), Node::Role(role)));
    }
    for (index, repo) in graph.main.config_repos.iter().enumerate() {
        roots.push((NodeId::root(Step::ConfigRepo(index)), Node::ConfigRepo(repo)));
    }
    for (index, repository) in graph.main.package_repositories.iter().enumerate() {
        roots.push((
            NodeId::root(Step::PackageRepository(index)),
            Node::PackageRepository(repository),
        ));
    }
    for source in graph.source_ids() {
        for (index, scm) in graph.source_scms(source).iter().enumerate() {
            roots.push((NodeId::root(Step::Scm(source, index)), Node::Scm(scm)));
        }
    }
    roots
}

// --- TRAVERSAL ---

/// Walks `roots` depth-first, calling `handler` once per distinct node with the context of its
/// ancestors. `context` is the context of the roots themselves.
pub fn walk<'a, F>(roots: Vec<(NodeId, Node<'a>)>, context: &ValidationContext<'a>, mut handler: F)
where
    F: FnMut(&NodeId, Node<'a>, &ValidationContext<'a>),
{
    let mut visited = HashSet::new();
    let mut stack: Vec<(NodeId, Node<'a>, ValidationContext<'a>)> = roots
        .into_iter()
        .rev()
        .map(|(id, node)| (id, node, context.clone()))
        .collect();

    while let Some((id, node, node_context)) = stack.pop() {
        if !visited.insert(node.identity()) {
            debug!("Skipping already visited node {id}");
            continue;
        }
        handler(&id, node, &node_context);

        let child_context = node_context.with_parent(node);
        for (step, child) in node.children().into_iter().rev() {
            stack.push((id.child(step), child, child_context.clone()));
        }
    }
}

// --- MUTABLE ACCESS ---

/// A mutably borrowed configuration entity.
#[derive(Debug)]
pub(crate) enum NodeMut<'g> {
    Group(&'g mut PipelineGroup),
    Authorization(&'g mut Authorization),
    Pipeline(&'g mut Pipeline),
    Materials(&'g mut Materials),
    Material(&'g mut Material),
    Stage(&'g mut Stage),
    Job(&'g mut Job),
    Task(&'g mut Task),
    Variable(&'g mut EnvironmentVariable),
    Environment(&'g mut Environment),
    Template(&'g mut Template),
    Role(&'g mut Role),
    ConfigRepo(&'g mut ConfigRepo),
    PackageRepository(&'g mut PackageRepository),
    Package(&'g mut PackageDefinition),
    Scm(&'g mut Scm),
    Property(&'g mut ConfigProperty),
}

impl<'g> NodeMut<'g> {
    fn child(self, step: Step) -> Option<Self> {
        match (self, step) {
            (Self::Group(g), Step::Authorization) => g.authorization.as_mut().map(Self::Authorization),
            (Self::Group(g), Step::Pipeline(i)) => g.pipelines.get_mut(i).map(Self::Pipeline),
            (Self::Pipeline(p), Step::Materials) => Some(Self::Materials(&mut p.materials)),
            (Self::Pipeline(p), Step::Variable(i)) => p.variables.get_mut(i).map(Self::Variable),
            (Self::Pipeline(p), Step::Stage(i)) => p.stages.get_mut(i).map(Self::Stage),
            (Self::Materials(m), Step::Material(i)) => m.items.get_mut(i).map(Self::Material),
            (Self::Stage(s), Step::Variable(i)) => s.variables.get_mut(i).map(Self::Variable),
            (Self::Stage(s), Step::Job(i)) => s.jobs.get_mut(i).map(Self::Job),
            (Self::Job(j), Step::Variable(i)) => j.variables.get_mut(i).map(Self::Variable),
            (Self::Job(j), Step::Task(i)) => j.tasks.get_mut(i).map(Self::Task),
            (Self::Task(t), Step::OnCancel) => t.on_cancel.as_deref_mut().map(Self::Task),
            (Self::Task(t), Step::Property(i)) => match &mut t.kind {
                TaskKind::Pluggable { configuration, .. } => {
                    configuration.get_mut(i).map(Self::Property)
                }
                _ => None,
            },
            (Self::Environment(e), Step::Variable(i)) => e.variables.get_mut(i).map(Self::Variable),
            (Self::Template(t), Step::Authorization) => {
                t.authorization.as_mut().map(Self::Authorization)
            }
            (Self::Template(t), Step::Stage(i)) => t.stages.get_mut(i).map(Self::Stage),
            (Self::ConfigRepo(r), Step::Material(_)) => Some(Self::Material(&mut r.material)),
            (Self::PackageRepository(r), Step::Property(i)) => {
                r.configuration.get_mut(i).map(Self::Property)
            }
            (Self::PackageRepository(r), Step::Package(i)) => r.packages.get_mut(i).map(Self::Package),
            (Self::Package(p), Step::Property(i)) => p.configuration.get_mut(i).map(Self::Property),
            (Self::Scm(s), Step::Property(i)) => s.configuration.get_mut(i).map(Self::Property),
            _ => None,
        }
    }

    /// Splits the node into its own errors and its owned children.
    fn into_parts(self) -> (&'g mut ConfigErrors, Vec<Self>) {
        match self {
            Self::Group(g) => {
                let mut children: Vec<Self> = g.authorization.as_mut().map(Self::Authorization).into_iter().collect();
                children.extend(g.pipelines.iter_mut().map(Self::Pipeline));
                (&mut g.errors, children)
            }
            Self::Pipeline(p) => {
                let mut children = vec![Self::Materials(&mut p.materials)];
                children.extend(p.variables.iter_mut().map(Self::Variable));
                children.extend(p.stages.iter_mut().map(Self::Stage));
                (&mut p.errors, children)
            }
            Self::Materials(m) => (
                &mut m.errors,
                m.items.iter_mut().map(Self::Material).collect(),
            ),
            Self::Stage(s) => {
                let mut children: Vec<Self> = s.variables.iter_mut().map(Self::Variable).collect();
                children.extend(s.jobs.iter_mut().map(Self::Job));
                (&mut s.errors, children)
            }
            Self::Job(j) => {
                let mut children: Vec<Self> = j.variables.iter_mut().map(Self::Variable).collect();
                children.extend(j.tasks.iter_mut().map(Self::Task));
                (&mut j.errors, children)
            }
            Self::Task(t) => {
                let mut children: Vec<Self> = match &mut t.kind {
                    TaskKind::Pluggable { configuration, .. } => {
                        configuration.iter_mut().map(Self::Property).collect()
                    }
                    _ => Vec::new(),
                };
                children.extend(t.on_cancel.as_deref_mut().map(Self::Task));
                (&mut t.errors, children)
            }
            Self::Environment(e) => (
                &mut e.errors,
                e.variables.iter_mut().map(Self::Variable).collect(),
            ),
            Self::Template(t) => {
                let mut children: Vec<Self> = t.authorization.as_mut().map(Self::Authorization).into_iter().collect();
                children.extend(t.stages.iter_mut().map(Self::Stage));
                (&mut t.errors, children)
            }
            Self::ConfigRepo(r) => (&mut r.errors, vec![Self::Material(&mut r.material)]),
            Self::PackageRepository(r) => {
                let mut children: Vec<Self> = r.configuration.iter_mut().map(Self::Property).collect();
                children.extend(r.packages.iter_mut().map(Self::Package));
                (&mut r.errors, children)
            }
            Self::Package(p) => (
                &mut p.errors,
                p.configuration.iter_mut().map(Self::Property).collect(),
            ),
            Self::Scm(s) => (
                &mut s.errors,
                s.configuration.iter_mut().map(Self::Property).collect(),
            ),
            Self::Material(m) => (&mut m.errors, Vec::new()),
            Self::Authorization(a) => (&mut a.errors, Vec::new()),
            Self::Variable(v) => (&mut v.errors, Vec::new()),
            Self::Role(r) => (&mut r.errors, Vec::new()),
            Self::Property(p) => (&mut p.errors, Vec::new()),
        }
    }
}

fn roots_mut(graph: &mut ConfigGraph) -> Vec<NodeMut<'_>> {
    let ConfigGraph {
        main,
        partials,
        placeholders,
        ..
    } = graph;
    let mut roots: Vec<NodeMut<'_>> = Vec::new();
    roots.extend(main.security.roles.iter_mut().map(NodeMut::Role));
    roots.extend(main.config_repos.iter_mut().map(NodeMut::ConfigRepo));
    roots.extend(main.package_repositories.iter_mut().map(NodeMut::PackageRepository));
    roots.extend(main.groups.iter_mut().map(NodeMut::Group));
    roots.extend(main.environments.iter_mut().map(NodeMut::Environment));
    roots.extend(main.templates.iter_mut().map(NodeMut::Template));
    roots.extend(main.scms.iter_mut().map(NodeMut::Scm));
    for partial in partials.iter_mut().chain(std::iter::once(placeholders)) {
        roots.extend(partial.groups.iter_mut().map(NodeMut::Group));
        roots.extend(partial.environments.iter_mut().map(NodeMut::Environment));
        roots.extend(partial.templates.iter_mut().map(NodeMut::Template));
        roots.extend(partial.scms.iter_mut().map(NodeMut::Scm));
    }
    roots
}

/// Visits every entity of the graph mutably, parents before children.
pub(crate) fn for_each_mut<F>(graph: &mut ConfigGraph, mut visit: F)
where
    F: FnMut(&mut NodeMut<'_>),
{
    let mut stack = roots_mut(graph);
    while let Some(mut node) = stack.pop() {
        visit(&mut node);
        let (_, children) = node.into_parts();
        stack.extend(children);
    }
}

/// Empties the errors of every entity, so a validation pass never accumulates old results.
pub(crate) fn clear_errors(graph: &mut ConfigGraph) {
    let mut stack = roots_mut(graph);
    while let Some(node) = stack.pop() {
        let (errors, children) = node.into_parts();
        errors.clear();
        stack.extend(children);
    }
}

/// Resolves `id` to the errors of the entity it addresses.
pub(crate) fn errors_mut<'g>(graph: &'g mut ConfigGraph, id: &NodeId) -> Option<&'g mut ConfigErrors> {
    let (first, rest) = id.steps().split_first()?;
    let mut node = match *first {
        Step::Group(part) => NodeMut::Group(graph.source_groups_mut(part.source)?.get_mut(part.index)?),
        Step::Environment(part) => NodeMut::Environment(
            graph
                .source_environments_mut(part.source)?
                .get_mut(part.index)?,
        ),
        Step::Template(source, index) => {
            NodeMut::Template(graph.source_templates_mut(source)?.get_mut(index)?)
        }
        Step::Scm(source, index) => NodeMut::Scm(graph.source_scms_mut(source)?.get_mut(index)?),
        Step::Role(index) => NodeMut::Role(graph.main.security.roles.get_mut(index)?),
        Step::ConfigRepo(index) => NodeMut::ConfigRepo(graph.main.config_repos.get_mut(index)?),
        Step::PackageRepository(index) => {
            NodeMut::PackageRepository(graph.main.package_repositories.get_mut(index)?)
        }
        _ => return None,
    };
    for step in rest {
        node = node.child(*step)?;
    }
    Some(node.into_parts().0)
}
