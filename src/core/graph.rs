// src/core/graph.rs

//! # Configuration graph
//!
//! `ConfigGraph` is the root aggregate. It owns every source it was built from (the local
//! `BasicConfig`, the accepted remote `PartialConfig`s and a UI placeholder source) and exposes
//! pipeline groups and environments through *views*. A view is either a single part or a merge
//! of same-named parts from different sources; reads go through all parts, writes are routed to
//! the first part whose origin is editable.
//!
//! A graph built with [`ConfigGraph::basic`] has only the local source. [`ConfigGraph::merged`]
//! and [`ConfigGraph::merge`] (see `merge.rs`) attach remote partials.

use crate::core::errors::{ConfigError, ConfigResult};
use crate::core::material;
use crate::models::{
    Authorization, BasicConfig, ConfigRepo, Environment, EnvironmentVariable, Job, Material,
    Name, Origin, PackageDefinition, PackageRepository, PartialConfig, Pipeline, PipelineGroup,
    Scm, Security, Stage, Template,
};
use log::debug;
use serde::Serialize;
use std::collections::HashSet;

static LOCAL_ORIGIN: Origin = Origin::File;

// --- SOURCES, PARTS & VIEWS ---

/// Identifies one source of configuration inside a graph.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SourceId {
    /// The local configuration.
    Local,
    /// The accepted partial at this position.
    Remote(usize),
    /// Parts created so that edits to remote-only entities have a local home.
    Placeholder,
}

/// One fragment (group or environment) at a position inside a source.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PartRef {
    /// The source holding the fragment.
    pub source: SourceId,
    /// Position of the fragment in its source's list.
    pub index: usize,
}

impl PartRef {
    /// A reference to the fragment at `index` in `source`.
    pub fn new(source: SourceId, index: usize) -> Self {
        Self { source, index }
    }
}

/// A logical group or environment: one part, or several same-named parts from different sources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum View {
    /// A fragment that no other source shares a name with.
    Single(PartRef),
    /// Same-named fragments from different sources, in source order.
    Merged(Vec<PartRef>),
}

impl View {
    /// The referenced fragments, in source order.
    pub fn parts(&self) -> &[PartRef] {
        match self {
            Self::Single(part) => std::slice::from_ref(part),
            Self::Merged(parts) => parts,
        }
    }

    /// Whether more than one source contributes to this view.
    pub fn is_merged(&self) -> bool {
        matches!(self, Self::Merged(_))
    }

    pub(crate) fn push(&mut self, part: PartRef) {
        match self {
            Self::Single(first) => *self = Self::Merged(vec![*first, part]),
            Self::Merged(parts) => parts.push(part),
        }
    }

    pub(crate) fn has_source(&self, source: SourceId) -> bool {
        self.parts().iter().any(|part| part.source == source)
    }
}

// --- THE GRAPH ---

/// The root of a configuration: local data, remote partials, and the views over them.
#[derive(Debug, Clone)]
pub struct ConfigGraph {
    pub(crate) main: BasicConfig,
    pub(crate) partials: Vec<PartialConfig>,
    pub(crate) placeholders: PartialConfig,
    pub(crate) groups: Vec<View>,
    pub(crate) environments: Vec<View>,
    pub(crate) for_edit: bool,
    pub(crate) merged: bool,
}

impl Default for ConfigGraph {
    fn default() -> Self {
        Self::basic(BasicConfig::default())
    }
}

impl ConfigGraph {
    /// A graph holding only the local configuration.
    pub fn basic(main: BasicConfig) -> Self {
        let mut graph = Self {
            main,
            partials: Vec::new(),
            placeholders: PartialConfig::new(Origin::UiPlaceholder),
            groups: Vec::new(),
            environments: Vec::new(),
            for_edit: false,
            merged: false,
        };
        graph.tag_local_origins();
        graph.rebuild_views();
        graph.resolve_material_references();
        graph
    }

    /// The local configuration.
    pub fn main(&self) -> &BasicConfig {
        &self.main
    }

    /// Accepted remote partials, in merge order.
    pub fn partials(&self) -> &[PartialConfig] {
        &self.partials
    }

    /// Whether partials were merged into this graph.
    pub fn is_merged(&self) -> bool {
        self.merged
    }

    /// Whether remote-only views received UI placeholder parts.
    pub fn is_for_edit(&self) -> bool {
        self.for_edit
    }

    /// Roles and administrators of the local configuration.
    pub fn security(&self) -> &Security {
        &self.main.security
    }

    /// Registered config repositories.
    pub fn config_repos(&self) -> &[ConfigRepo] {
        &self.main.config_repos
    }

    /// Package repositories of the local configuration.
    pub fn package_repositories(&self) -> &[PackageRepository] {
        &self.main.package_repositories
    }

    /// The origin shared by every fragment of `source`, or `None` for an unknown remote index.
    pub fn origin_of(&self, source: SourceId) -> Option<&Origin> {
        match source {
            SourceId::Local => Some(&LOCAL_ORIGIN),
            SourceId::Remote(index) => self.partials.get(index).map(|p| &p.origin),
            SourceId::Placeholder => Some(&self.placeholders.origin),
        }
    }

    // --- Storage access ---

    pub(crate) fn source_ids(&self) -> Vec<SourceId> {
        let mut ids = vec![SourceId::Local];
        ids.extend((0..self.partials.len()).map(SourceId::Remote));
        ids.push(SourceId::Placeholder);
        ids
    }

    pub(crate) fn source_groups(&self, source: SourceId) -> &[PipelineGroup] {
        match source {
            SourceId::Local => &self.main.groups,
            SourceId::Remote(index) => self
                .partials
                .get(index)
                .map(|p| p.groups.as_slice())
                .unwrap_or_default(),
            SourceId::Placeholder => &self.placeholders.groups,
        }
    }

    pub(crate) fn source_groups_mut(&mut self, source: SourceId) -> Option<&mut Vec<PipelineGroup>> {
        match source {
            SourceId::Local => Some(&mut self.main.groups),
            SourceId::Remote(index) => self.partials.get_mut(index).map(|p| &mut p.groups),
            SourceId::Placeholder => Some(&mut self.placeholders.groups),
        }
    }

    pub(crate) fn source_environments(&self, source: SourceId) -> &[Environment] {
        match source {
            SourceId::Local => &self.main.environments,
            SourceId::Remote(index) => self
                .partials
                .get(index)
                .map(|p| p.environments.as_slice())
                .unwrap_or_default(),
            SourceId::Placeholder => &self.placeholders.environments,
        }
    }

    pub(crate) fn source_environments_mut(
        &mut self,
        source: SourceId,
    ) -> Option<&mut Vec<Environment>> {
        match source {
            SourceId::Local => Some(&mut self.main.environments),
            SourceId::Remote(index) => self.partials.get_mut(index).map(|p| &mut p.environments),
            SourceId::Placeholder => Some(&mut self.placeholders.environments),
        }
    }

    pub(crate) fn source_templates(&self, source: SourceId) -> &[Template] {
        match source {
            SourceId::Local => &self.main.templates,
            SourceId::Remote(index) => self
                .partials
                .get(index)
                .map(|p| p.templates.as_slice())
                .unwrap_or_default(),
            SourceId::Placeholder => &self.placeholders.templates,
        }
    }

    pub(crate) fn source_templates_mut(&mut self, source: SourceId) -> Option<&mut Vec<Template>> {
        match source {
            SourceId::Local => Some(&mut self.main.templates),
            SourceId::Remote(index) => self.partials.get_mut(index).map(|p| &mut p.templates),
            SourceId::Placeholder => Some(&mut self.placeholders.templates),
        }
    }

    pub(crate) fn source_scms(&self, source: SourceId) -> &[Scm] {
        match source {
            SourceId::Local => &self.main.scms,
            SourceId::Remote(index) => self
                .partials
                .get(index)
                .map(|p| p.scms.as_slice())
                .unwrap_or_default(),
            SourceId::Placeholder => &self.placeholders.scms,
        }
    }

    pub(crate) fn source_scms_mut(&mut self, source: SourceId) -> Option<&mut Vec<Scm>> {
        match source {
            SourceId::Local => Some(&mut self.main.scms),
            SourceId::Remote(index) => self.partials.get_mut(index).map(|p| &mut p.scms),
            SourceId::Placeholder => Some(&mut self.placeholders.scms),
        }
    }

    /// The group fragment `part` points at.
    pub fn group_part(&self, part: PartRef) -> Option<&PipelineGroup> {
        self.source_groups(part.source).get(part.index)
    }

    /// The environment fragment `part` points at.
    pub fn environment_part(&self, part: PartRef) -> Option<&Environment> {
        self.source_environments(part.source).get(part.index)
    }

    /// Direct mutable access to one group part. Fails for parts whose origin forbids edits:
    /// those must be changed through their source, not through the merged graph.
    ///
    /// # Errors
    /// `ConfigError::GroupNotFound` for a dangling `part`, `ConfigError::NotEditable` for a part
    /// from a config repository.
    pub fn group_part_mut(&mut self, part: PartRef) -> ConfigResult<&mut PipelineGroup> {
        let group = self
            .source_groups_mut(part.source)
            .and_then(|groups| groups.get_mut(part.index))
            .ok_or_else(|| ConfigError::GroupNotFound {
                name: format!("{part:?}"),
            })?;
        if !group.origin.is_local() {
            return Err(ConfigError::NotEditable {
                name: group.name.to_string(),
                origin: group.origin.to_string(),
            });
        }
        Ok(group)
    }

    /// Direct mutable access to one environment part, with the same editability rule as
    /// [`ConfigGraph::group_part_mut`].
    ///
    /// # Errors
    /// `ConfigError::EnvironmentNotFound` for a dangling `part`, `ConfigError::NotEditable` for a
    /// part from a config repository.
    pub fn environment_part_mut(&mut self, part: PartRef) -> ConfigResult<&mut Environment> {
        let environment = self
            .source_environments_mut(part.source)
            .and_then(|environments| environments.get_mut(part.index))
            .ok_or_else(|| ConfigError::EnvironmentNotFound {
                name: format!("{part:?}"),
            })?;
        if !environment.origin.is_local() {
            return Err(ConfigError::NotEditable {
                name: environment.name.to_string(),
                origin: environment.origin.to_string(),
            });
        }
        Ok(environment)
    }

    // --- Groups & pipelines ---

    /// Logical groups, in view order.
    pub fn groups(&self) -> impl Iterator<Item = GroupRef<'_>> + '_ {
        self.groups.iter().map(move |view| GroupRef { graph: self, view })
    }

    /// The logical group called `name`, compared case-insensitively.
    pub fn find_group(&self, name: &str) -> Option<GroupRef<'_>> {
        self.groups().find(|group| group.name().is_some_and(|n| n == name))
    }

    /// Whether a group called `name` exists in any source.
    pub fn has_group(&self, name: &str) -> bool {
        self.find_group(name).is_some()
    }

    /// The logical group declaring `pipeline`.
    pub fn find_group_of_pipeline(&self, pipeline: &str) -> Option<GroupRef<'_>> {
        self.groups().find(|group| group.has_pipeline(pipeline))
    }

    /// Every pipeline, in group order and within a group in part order.
    pub fn all_pipelines(&self) -> Vec<&Pipeline> {
        self.groups().flat_map(|group| group.pipelines()).collect()
    }

    /// Names of [`ConfigGraph::all_pipelines`], in the same order.
    pub fn all_pipeline_names(&self) -> Vec<Name> {
        self.all_pipelines()
            .into_iter()
            .map(|pipeline| pipeline.name.clone())
            .collect()
    }

    /// The first declaration of `name`.
    pub fn find_pipeline(&self, name: &str) -> Option<&Pipeline> {
        self.groups().find_map(|group| group.find_pipeline(name))
    }

    /// Whether any source declares `name`.
    pub fn has_pipeline(&self, name: &str) -> bool {
        self.find_pipeline(name).is_some()
    }

    /// Like [`ConfigGraph::find_pipeline`], failing when the pipeline is not declared.
    ///
    /// # Errors
    /// `ConfigError::PipelineNotFound` when no source declares `name`.
    pub fn pipeline_by_name(&self, name: &str) -> ConfigResult<&Pipeline> {
        self.find_pipeline(name)
            .ok_or_else(|| ConfigError::PipelineNotFound {
                name: name.to_string(),
            })
    }

    /// The stage `stage` of pipeline `pipeline`.
    ///
    /// # Errors
    /// `ConfigError::PipelineNotFound` or `ConfigError::StageNotFound`.
    pub fn stage_by_name(&self, pipeline: &str, stage: &str) -> ConfigResult<&Stage> {
        self.pipeline_by_name(pipeline)?
            .stages
            .iter()
            .find(|s| s.name == stage)
            .ok_or_else(|| ConfigError::StageNotFound {
                pipeline: pipeline.to_string(),
                stage: stage.to_string(),
            })
    }

    /// The job `job` of `pipeline`'s stage `stage`.
    ///
    /// # Errors
    /// `ConfigError::PipelineNotFound`, `ConfigError::StageNotFound` or `ConfigError::JobNotFound`.
    pub fn find_job(&self, pipeline: &str, stage: &str, job: &str) -> ConfigResult<&Job> {
        self.stage_by_name(pipeline, stage)?
            .jobs
            .iter()
            .find(|j| j.name == job)
            .ok_or_else(|| ConfigError::JobNotFound {
                pipeline: pipeline.to_string(),
                stage: stage.to_string(),
                job: job.to_string(),
            })
    }

    /// Whether `pipeline` belongs to the first group in view order.
    ///
    /// # Errors
    /// `ConfigError::NoPipelineGroups` when the graph has no group at all.
    pub fn is_in_first_group(&self, pipeline: &str) -> ConfigResult<bool> {
        let first = self.groups().next().ok_or(ConfigError::NoPipelineGroups)?;
        Ok(first.has_pipeline(pipeline))
    }

    /// Pipelines with a dependency material on `upstream`, in pipeline order.
    pub fn downstream_pipelines(&self, upstream: &str) -> Vec<&Pipeline> {
        self.all_pipelines()
            .into_iter()
            .filter(|pipeline| pipeline.dependency_targets().any(|(p, _)| p == upstream))
            .collect()
    }

    /// The first pipeline with a dependency material on `upstream`.
    pub fn find_pipeline_using_as_dependency(&self, upstream: &str) -> Option<&Pipeline> {
        self.downstream_pipelines(upstream).into_iter().next()
    }

    /// Pipelines built from `template`.
    pub fn pipelines_associated_with_template(&self, template: &str) -> Vec<&Pipeline> {
        self.all_pipelines()
            .into_iter()
            .filter(|pipeline| pipeline.template.as_ref().is_some_and(|t| t == template))
            .collect()
    }

    /// Pipelines declared in File or UI parts. With `exclude_members_of_remote_environments`,
    /// pipelines listed by a remote environment fragment are left out.
    pub fn all_local_pipelines(&self, exclude_members_of_remote_environments: bool) -> Vec<&Pipeline> {
        let remote_members: HashSet<&Name> = if exclude_members_of_remote_environments {
            self.environments()
                .flat_map(|environment| environment.parts())
                .filter(|part| !part.origin.is_local())
                .flat_map(|part| part.pipelines.iter())
                .collect()
        } else {
            HashSet::new()
        };

        self.groups()
            .flat_map(|group| group.parts())
            .filter(|part| part.origin.is_local())
            .flat_map(|part| part.pipelines.iter())
            .filter(|pipeline| !remote_members.contains(&pipeline.name))
            .collect()
    }

    /// Materials of every pipeline, one per fingerprint, first declaration wins.
    pub fn unique_materials(&self) -> Vec<&Material> {
        let mut seen = HashSet::new();
        self.all_pipelines()
            .into_iter()
            .flat_map(|pipeline| pipeline.materials.iter())
            .filter(|m| seen.insert(material::fingerprint(m)))
            .collect()
    }

    /// Like [`ConfigGraph::unique_materials`], but leaves out polled materials with auto-update
    /// switched off.
    pub fn unique_auto_update_materials(&self) -> Vec<&Material> {
        self.unique_materials()
            .into_iter()
            .filter(|m| !material::is_polled(m) || m.auto_update)
            .collect()
    }

    // --- Templates & pluggable entities ---

    /// Templates of every source, local first.
    pub fn templates(&self) -> impl Iterator<Item = &Template> + '_ {
        self.source_ids()
            .into_iter()
            .flat_map(move |source| self.source_templates(source).iter())
    }

    /// The first template called `name`, local first.
    pub fn find_template(&self, name: &str) -> Option<&Template> {
        self.templates().find(|template| template.name == name)
    }

    /// Pluggable SCMs of every source, local first.
    pub fn scms(&self) -> impl Iterator<Item = &Scm> + '_ {
        self.source_ids()
            .into_iter()
            .flat_map(move |source| self.source_scms(source).iter())
    }

    /// The SCM with id `id`.
    pub fn find_scm(&self, id: &str) -> Option<&Scm> {
        self.scms().find(|scm| scm.id == id)
    }

    /// The package definition with id `id` and the repository holding it.
    pub fn find_package(&self, id: &str) -> Option<(&PackageRepository, &PackageDefinition)> {
        self.main.package_repositories.iter().find_map(|repository| {
            repository
                .packages
                .iter()
                .find(|package| package.id == id)
                .map(|package| (repository, package))
        })
    }

    // --- Environments ---

    /// Logical environments, in view order.
    pub fn environments(&self) -> impl Iterator<Item = EnvironmentRef<'_>> + '_ {
        self.environments
            .iter()
            .map(move |view| EnvironmentRef { graph: self, view })
    }

    /// The logical environment called `name`.
    pub fn find_environment(&self, name: &str) -> Option<EnvironmentRef<'_>> {
        self.environments()
            .find(|environment| environment.name().is_some_and(|n| n == name))
    }

    /// The environment listing `pipeline`, if any.
    pub fn environment_for_pipeline(&self, pipeline: &str) -> Option<EnvironmentRef<'_>> {
        self.environments()
            .find(|environment| environment.contains_pipeline(pipeline))
    }

    /// The variables a pipeline runs with: those of its environment, overridden by its own.
    ///
    /// # Errors
    /// `ConfigError::PipelineNotFound` when no source declares `pipeline`.
    pub fn variables_for(&self, pipeline: &str) -> ConfigResult<Vec<EnvironmentVariable>> {
        let own = &self.pipeline_by_name(pipeline)?.variables;
        let mut variables: Vec<EnvironmentVariable> = self
            .environment_for_pipeline(pipeline)
            .map(|environment| environment.variables().into_iter().cloned().collect())
            .unwrap_or_default();
        for variable in own {
            match variables.iter_mut().find(|v| v.name == variable.name) {
                Some(existing) => *existing = variable.clone(),
                None => variables.push(variable.clone()),
            }
        }
        Ok(variables)
    }

    // --- Writes ---

    /// Write access to the logical group called `name`.
    ///
    /// # Errors
    /// `ConfigError::GroupNotFound` when no source declares the group.
    pub fn group_mut(&mut self, name: &str) -> ConfigResult<GroupMut<'_>> {
        let view = self
            .groups()
            .position(|group| group.name().is_some_and(|n| n == name))
            .ok_or_else(|| ConfigError::GroupNotFound {
                name: name.to_string(),
            })?;
        Ok(GroupMut { graph: self, view })
    }

    /// Write access to the logical environment called `name`.
    ///
    /// # Errors
    /// `ConfigError::EnvironmentNotFound` when no source declares the environment.
    pub fn environment_mut(&mut self, name: &str) -> ConfigResult<EnvironmentMut<'_>> {
        let view = self
            .environments()
            .position(|environment| environment.name().is_some_and(|n| n == name))
            .ok_or_else(|| ConfigError::EnvironmentNotFound {
                name: name.to_string(),
            })?;
        Ok(EnvironmentMut { graph: self, view })
    }

    /// Adds a group to the local configuration.
    pub fn add_group(&mut self, mut group: PipelineGroup) {
        group.origin = Origin::File;
        for pipeline in &mut group.pipelines {
            pipeline.origin = Origin::File;
        }
        self.main.groups.push(group);
        self.rebuild_views();
    }

    /// Adds an environment to the local configuration.
    pub fn add_environment(&mut self, mut environment: Environment) {
        environment.origin = Origin::File;
        self.main.environments.push(environment);
        self.rebuild_views();
    }

    /// Adds a template to the local configuration.
    pub fn add_template(&mut self, mut template: Template) {
        template.origin = Origin::File;
        self.main.templates.push(template);
    }

    /// Replaces or adds a local template by name.
    ///
    /// # Errors
    /// `ConfigError::NotEditable` when the template of that name comes from a config repository.
    pub fn upsert_template(&mut self, mut template: Template) -> ConfigResult<()> {
        template.origin = Origin::File;
        for source in self.source_ids() {
            let Some(position) = self
                .source_templates(source)
                .iter()
                .position(|t| t.name == template.name)
            else {
                continue;
            };
            let origin = self
                .origin_of(source)
                .cloned()
                .unwrap_or_default();
            if !origin.is_local() {
                return Err(ConfigError::NotEditable {
                    name: template.name.to_string(),
                    origin: origin.to_string(),
                });
            }
            if let Some(slot) = self
                .source_templates_mut(source)
                .and_then(|templates| templates.get_mut(position))
            {
                *slot = template;
            }
            return Ok(());
        }
        self.main.templates.push(template);
        Ok(())
    }

    /// Saves `pipeline` into `group`: replaces an editable declaration of the same name, moving
    /// it between groups if needed, or adds it to the group's first editable part. The group is
    /// created locally when it does not exist yet.
    ///
    /// # Errors
    /// `ConfigError::NotEditable` when the existing declaration comes from a config repository,
    /// `ConfigError::NoEditablePart` when `group` exists only in config repositories.
    pub fn upsert_pipeline(&mut self, group: &str, pipeline: Pipeline) -> ConfigResult<()> {
        if let Some((part, index)) = self.locate_pipeline(pipeline.name.as_str()) {
            let existing = self.group_part_mut(part)?;
            let in_target = existing.name == group;
            if in_target {
                let origin = existing.origin.clone();
                if let Some(slot) = existing.pipelines.get_mut(index) {
                    *slot = Pipeline { origin, ..pipeline };
                }
                self.resolve_material_references();
                return Ok(());
            }
            existing.pipelines.remove(index);
            debug!("Moving pipeline '{}' to group '{}'", pipeline.name, group);
        }

        if !self.has_group(group) {
            self.add_group(PipelineGroup::new(group));
        }
        self.group_mut(group)?.add_pipeline(pipeline)?;
        self.resolve_material_references();
        Ok(())
    }

    /// Position of the first declaration of `name`.
    pub(crate) fn locate_pipeline(&self, name: &str) -> Option<(PartRef, usize)> {
        self.groups.iter().flat_map(|view| view.parts()).find_map(|part| {
            self.group_part(*part)?
                .pipelines
                .iter()
                .position(|pipeline| pipeline.name == name)
                .map(|index| (*part, index))
        })
    }

    /// Every pipeline declaration with its position, in view order.
    pub(crate) fn located_pipelines(&self) -> Vec<(PartRef, usize, &Pipeline)> {
        self.groups
            .iter()
            .flat_map(|view| view.parts())
            .filter_map(|part| self.group_part(*part).map(|group| (*part, group)))
            .flat_map(|(part, group)| {
                group
                    .pipelines
                    .iter()
                    .enumerate()
                    .map(move |(index, pipeline)| (part, index, pipeline))
            })
            .collect()
    }
}

// --- READ VIEWS ---

/// A logical pipeline group as seen through the graph.
#[derive(Debug, Clone, Copy)]
pub struct GroupRef<'a> {
    graph: &'a ConfigGraph,
    view: &'a View,
}

impl<'a> GroupRef<'a> {
    /// The parts behind this group.
    pub fn view(&self) -> &'a View {
        self.view
    }

    /// Whether the group has parts from more than one source.
    pub fn is_merged(&self) -> bool {
        self.view.is_merged()
    }

    /// Name of the first part; `None` only for a view whose parts are gone.
    pub fn name(&self) -> Option<&'a Name> {
        self.parts().first().map(|part| &part.name)
    }

    /// The group fragments, in source order.
    pub fn parts(&self) -> Vec<&'a PipelineGroup> {
        let graph = self.graph;
        self.view
            .parts()
            .iter()
            .filter_map(|part| graph.group_part(*part))
            .collect()
    }

    /// Origin of each part, in part order.
    pub fn origins(&self) -> Vec<&'a Origin> {
        self.parts().into_iter().map(|part| &part.origin).collect()
    }

    /// The union of every part's pipelines, in part order.
    pub fn pipelines(&self) -> Vec<&'a Pipeline> {
        self.parts()
            .into_iter()
            .flat_map(|part| part.pipelines.iter())
            .collect()
    }

    /// The pipeline called `name` in any part.
    pub fn find_pipeline(&self, name: &str) -> Option<&'a Pipeline> {
        self.pipelines().into_iter().find(|pipeline| pipeline.name == name)
    }

    /// Whether any part declares `name`.
    pub fn has_pipeline(&self, name: &str) -> bool {
        self.find_pipeline(name).is_some()
    }

    /// The part declaring `name`.
    pub fn part_with_pipeline(&self, name: &str) -> Option<&'a PipelineGroup> {
        self.parts()
            .into_iter()
            .find(|part| part.pipelines.iter().any(|pipeline| pipeline.name == name))
    }

    /// The first File or UI part.
    pub fn first_editable_part(&self) -> Option<&'a PipelineGroup> {
        self.parts().into_iter().find(|part| part.origin.is_local())
    }

    /// The authorization of the first part that defines one.
    pub fn authorization(&self) -> Option<&'a Authorization> {
        self.parts()
            .into_iter()
            .find_map(|part| part.authorization.as_ref().filter(|auth| !auth.is_empty()))
    }

    /// Number of pipelines across all parts.
    pub fn len(&self) -> usize {
        self.pipelines().len()
    }

    /// Whether no part declares a pipeline.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A logical environment as seen through the graph.
#[derive(Debug, Clone, Copy)]
pub struct EnvironmentRef<'a> {
    graph: &'a ConfigGraph,
    view: &'a View,
}

impl<'a> EnvironmentRef<'a> {
    /// The parts behind this environment.
    pub fn view(&self) -> &'a View {
        self.view
    }

    /// Whether the environment has parts from more than one source.
    pub fn is_merged(&self) -> bool {
        self.view.is_merged()
    }

    /// Name of the first part.
    pub fn name(&self) -> Option<&'a Name> {
        self.parts().first().map(|part| &part.name)
    }

    /// The environment fragments, in source order.
    pub fn parts(&self) -> Vec<&'a Environment> {
        let graph = self.graph;
        self.view
            .parts()
            .iter()
            .filter_map(|part| graph.environment_part(*part))
            .collect()
    }

    /// Origin of each part, in part order.
    pub fn origins(&self) -> Vec<&'a Origin> {
        self.parts().into_iter().map(|part| &part.origin).collect()
    }

    /// Member pipelines of every part.
    pub fn pipelines(&self) -> Vec<&'a Name> {
        self.parts()
            .into_iter()
            .flat_map(|part| part.pipelines.iter())
            .collect()
    }

    /// Agent uuids of every part.
    pub fn agents(&self) -> Vec<&'a str> {
        self.parts()
            .into_iter()
            .flat_map(|part| part.agents.iter().map(String::as_str))
            .collect()
    }

    /// Variables of every part, in part order.
    pub fn variables(&self) -> Vec<&'a EnvironmentVariable> {
        self.parts()
            .into_iter()
            .flat_map(|part| part.variables.iter())
            .collect()
    }

    /// Whether any part lists `name`.
    pub fn contains_pipeline(&self, name: &str) -> bool {
        self.pipelines().into_iter().any(|pipeline| pipeline == name)
    }

    /// Origin of the part listing pipeline `name`.
    pub fn origin_for_pipeline(&self, name: &str) -> Option<&'a Origin> {
        self.parts()
            .into_iter()
            .find(|part| part.pipelines.iter().any(|pipeline| pipeline == name))
            .map(|part| &part.origin)
    }

    /// Origin of the part listing agent `uuid`.
    pub fn origin_for_agent(&self, uuid: &str) -> Option<&'a Origin> {
        self.parts()
            .into_iter()
            .find(|part| part.agents.iter().any(|agent| agent == uuid))
            .map(|part| &part.origin)
    }

    /// The first File or UI part.
    pub fn first_editable_part(&self) -> Option<&'a Environment> {
        self.parts().into_iter().find(|part| part.origin.is_local())
    }
}

// --- WRITE VIEWS ---

/// Write access to a logical group. Every write lands in the first editable part.
#[derive(Debug)]
pub struct GroupMut<'a> {
    graph: &'a mut ConfigGraph,
    view: usize,
}

impl GroupMut<'_> {
    fn editable_part(&self) -> ConfigResult<PartRef> {
        let view = self.graph.groups.get(self.view).ok_or_else(|| ConfigError::GroupNotFound {
            name: format!("#{}", self.view),
        })?;
        view.parts()
            .iter()
            .copied()
            .find(|part| {
                self.graph
                    .group_part(*part)
                    .is_some_and(|group| group.origin.is_local())
            })
            .ok_or_else(|| ConfigError::NoEditablePart {
                name: GroupRef { graph: &*self.graph, view }
                    .name()
                    .map(ToString::to_string)
                    .unwrap_or_default(),
            })
    }

    /// Appends `pipeline` to the first editable part; it takes that part's origin.
    ///
    /// # Errors
    /// `ConfigError::NoEditablePart` when every part comes from a config repository.
    pub fn add_pipeline(&mut self, mut pipeline: Pipeline) -> ConfigResult<()> {
        let part = self.editable_part()?;
        let group = self.graph.group_part_mut(part)?;
        pipeline.origin = group.origin.clone();
        debug!("Adding pipeline '{}' to group '{}' ({})", pipeline.name, group.name, group.origin);
        group.pipelines.push(pipeline);
        Ok(())
    }

    /// Sets the authorization of the first editable part.
    ///
    /// # Errors
    /// `ConfigError::NoEditablePart` when every part comes from a config repository.
    pub fn set_authorization(&mut self, authorization: Authorization) -> ConfigResult<()> {
        let part = self.editable_part()?;
        self.graph.group_part_mut(part)?.authorization = Some(authorization);
        Ok(())
    }
}

/// Write access to a logical environment. Every write lands in the first editable part.
#[derive(Debug)]
pub struct EnvironmentMut<'a> {
    graph: &'a mut ConfigGraph,
    view: usize,
}

impl EnvironmentMut<'_> {
    fn editable(&mut self) -> ConfigResult<&mut Environment> {
        let view = self
            .graph
            .environments
            .get(self.view)
            .ok_or_else(|| ConfigError::EnvironmentNotFound {
                name: format!("#{}", self.view),
            })?;
        let part = view
            .parts()
            .iter()
            .copied()
            .find(|part| {
                self.graph
                    .environment_part(*part)
                    .is_some_and(|environment| environment.origin.is_local())
            })
            .ok_or_else(|| ConfigError::NoEditablePart {
                name: EnvironmentRef { graph: &*self.graph, view }
                    .name()
                    .map(ToString::to_string)
                    .unwrap_or_default(),
            })?;
        self.graph.environment_part_mut(part)
    }

    /// Adds an agent to the first editable part.
    ///
    /// # Errors
    /// `ConfigError::NoEditablePart` when every part comes from a config repository.
    pub fn add_agent(&mut self, uuid: impl Into<String>) -> ConfigResult<()> {
        self.editable()?.agents.push(uuid.into());
        Ok(())
    }

    /// Adds a member pipeline to the first editable part.
    ///
    /// # Errors
    /// `ConfigError::NoEditablePart` when every part comes from a config repository.
    pub fn add_pipeline(&mut self, pipeline: impl Into<Name>) -> ConfigResult<()> {
        self.editable()?.pipelines.push(pipeline.into());
        Ok(())
    }

    /// Adds a variable to the first editable part.
    ///
    /// # Errors
    /// `ConfigError::NoEditablePart` when every part comes from a config repository.
    pub fn add_variable(&mut self, variable: EnvironmentVariable) -> ConfigResult<()> {
        self.editable()?.variables.push(variable);
        Ok(())
    }
}
