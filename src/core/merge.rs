// src/core/merge.rs

//! # Merge engine
//!
//! Attaches remote `PartialConfig`s to a graph and (re)builds the group and environment views.
//!
//! Same-named groups (or environments) from *different* sources collapse into one merged view;
//! two same-named entries from the *same* source stay apart so validation can report them. When a
//! graph is built for editing, every view without an editable part receives an empty
//! `UiPlaceholder` part, so edits never touch a remote fragment.

use crate::core::errors::{ConfigError, ConfigResult};
use crate::core::graph::{ConfigGraph, PartRef, SourceId, View};
use crate::models::{
    BasicConfig, Environment, MaterialKind, Name, Origin, PackageDefinition, PartialConfig,
    PipelineGroup, Scm,
};
use log::{debug, info, warn};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

impl ConfigGraph {
    /// A graph combining the local configuration with remote partials.
    pub fn merged(main: BasicConfig, partials: Vec<PartialConfig>, for_edit: bool) -> Self {
        let mut graph = Self::basic(main);
        graph.attach_partials(partials, for_edit);
        graph
    }

    /// Attaches `partials` to a graph that has not been merged yet.
    pub fn merge(&mut self, partials: Vec<PartialConfig>, for_edit: bool) -> ConfigResult<()> {
        if self.merged {
            return Err(ConfigError::AlreadyMerged);
        }
        self.attach_partials(partials, for_edit);
        Ok(())
    }

    fn attach_partials(&mut self, partials: Vec<PartialConfig>, for_edit: bool) {
        let accepted = self.accept_partials(partials);
        if accepted.is_empty() {
            debug!("No partials to merge, keeping the local configuration as is");
            return;
        }

        info!("Merging {} partial configuration(s)", accepted.len());
        for mut partial in accepted {
            tag_partial(&mut partial);
            self.partials.push(partial);
        }
        self.for_edit = for_edit;
        self.merged = true;
        self.rebuild_views();
        self.resolve_material_references();
    }

    /// Drops partials of unknown config repositories. A config repository contributes one
    /// partial: a later revision of the same repository replaces an earlier one.
    fn accept_partials(&self, partials: Vec<PartialConfig>) -> Vec<PartialConfig> {
        let known_repos: HashSet<&str> = self
            .main
            .config_repos
            .iter()
            .map(|repo| repo.id.as_str())
            .collect();

        let mut accepted: Vec<PartialConfig> = Vec::new();
        for partial in partials {
            if let Some(repo_id) = partial.origin.repo_id()
                && !known_repos.contains(repo_id)
            {
                warn!(
                    "Dropping partial from '{}': config repository '{}' is not registered",
                    partial.origin, repo_id
                );
                continue;
            }
            if self.partials.iter().any(|existing| same_source(existing, &partial)) {
                debug!("Skipping repeated partial from '{}'", partial.origin);
                continue;
            }
            match accepted.iter_mut().find(|existing| same_source(existing, &partial)) {
                Some(existing) => {
                    debug!(
                        "Replacing partial from '{}' with '{}'",
                        existing.origin, partial.origin
                    );
                    *existing = partial;
                }
                None => accepted.push(partial),
            }
        }
        accepted
    }

    /// Recomputes every group and environment view from the current sources.
    pub(crate) fn rebuild_views(&mut self) {
        let sources = self.source_ids();

        let group_parts: Vec<(PartRef, Name)> = sources
            .iter()
            .flat_map(|&source| {
                self.source_groups(source)
                    .iter()
                    .enumerate()
                    .map(move |(index, group)| (PartRef::new(source, index), group.name.clone()))
            })
            .collect();
        let environment_parts: Vec<(PartRef, Name)> = sources
            .iter()
            .flat_map(|&source| {
                self.source_environments(source)
                    .iter()
                    .enumerate()
                    .map(move |(index, env)| (PartRef::new(source, index), env.name.clone()))
            })
            .collect();

        self.groups = build_views(group_parts);
        self.environments = build_views(environment_parts);

        if self.for_edit {
            self.add_group_placeholders();
            self.add_environment_placeholders();
        }
    }

    fn add_group_placeholders(&mut self) {
        let missing: Vec<(usize, Name)> = self
            .groups
            .iter()
            .enumerate()
            .filter(|(_, view)| {
                !view.parts().iter().any(|part| {
                    self.group_part(*part)
                        .is_some_and(|group| group.origin.is_local())
                })
            })
            .filter_map(|(position, view)| {
                let first = view.parts().first()?;
                self.group_part(*first).map(|group| (position, group.name.clone()))
            })
            .collect();

        for (position, name) in missing {
            debug!("Creating UI placeholder for remote group '{name}'");
            let index = self.placeholders.groups.len();
            self.placeholders.groups.push(PipelineGroup {
                origin: Origin::UiPlaceholder,
                ..PipelineGroup::new(name)
            });
            if let Some(view) = self.groups.get_mut(position) {
                view.push(PartRef::new(SourceId::Placeholder, index));
            }
        }
    }

    fn add_environment_placeholders(&mut self) {
        let missing: Vec<(usize, Name)> = self
            .environments
            .iter()
            .enumerate()
            .filter(|(_, view)| {
                !view.parts().iter().any(|part| {
                    self.environment_part(*part)
                        .is_some_and(|environment| environment.origin.is_local())
                })
            })
            .filter_map(|(position, view)| {
                let first = view.parts().first()?;
                self.environment_part(*first)
                    .map(|environment| (position, environment.name.clone()))
            })
            .collect();

        for (position, name) in missing {
            debug!("Creating UI placeholder for remote environment '{name}'");
            let index = self.placeholders.environments.len();
            self.placeholders.environments.push(Environment {
                origin: Origin::UiPlaceholder,
                ..Environment::new(name)
            });
            if let Some(view) = self.environments.get_mut(position) {
                view.push(PartRef::new(SourceId::Placeholder, index));
            }
        }
    }

    pub(crate) fn tag_local_origins(&mut self) {
        for group in &mut self.main.groups {
            group.origin = Origin::File;
            for pipeline in &mut group.pipelines {
                pipeline.origin = Origin::File;
            }
        }
        for environment in &mut self.main.environments {
            environment.origin = Origin::File;
        }
        for template in &mut self.main.templates {
            template.origin = Origin::File;
        }
    }

    /// Points package and pluggable SCM materials at the definitions they reference by id.
    pub(crate) fn resolve_material_references(&mut self) {
        let packages: HashMap<String, Arc<PackageDefinition>> = self
            .main
            .package_repositories
            .iter()
            .flat_map(|repository| repository.packages.iter())
            .map(|package| (package.id.clone(), Arc::new(package.clone())))
            .collect();
        let scms: HashMap<String, Arc<Scm>> = self
            .scms()
            .map(|scm| (scm.id.clone(), Arc::new(scm.clone())))
            .collect();

        for source in self.source_ids() {
            let Some(groups) = self.source_groups_mut(source) else {
                continue;
            };
            let materials = groups
                .iter_mut()
                .flat_map(|group| group.pipelines.iter_mut())
                .flat_map(|pipeline| pipeline.materials.items.iter_mut());
            for material in materials {
                match &mut material.kind {
                    MaterialKind::Package {
                        package_id,
                        resolved,
                    } => *resolved = packages.get(package_id.as_str()).cloned(),
                    MaterialKind::PluggableScm {
                        scm_id, resolved, ..
                    } => *resolved = scms.get(scm_id.as_str()).cloned(),
                    _ => {}
                }
            }
        }
    }

    /// The local part of the configuration: what would be written back to the local file.
    ///
    /// Remote parts are dropped, non-empty UI placeholders are folded into the local source and
    /// template-expanded stages are removed again.
    pub fn strip_remotes(&self) -> Self {
        let mut local = self.main.clone();
        local.groups.extend(
            self.placeholders
                .groups
                .iter()
                .filter(|group| !group.pipelines.is_empty() || group.authorization.is_some())
                .cloned(),
        );
        local.environments.extend(
            self.placeholders
                .environments
                .iter()
                .filter(|environment| {
                    !environment.pipelines.is_empty()
                        || !environment.agents.is_empty()
                        || !environment.variables.is_empty()
                })
                .cloned(),
        );
        for pipeline in local.groups.iter_mut().flat_map(|group| group.pipelines.iter_mut()) {
            if pipeline.template_applied {
                pipeline.stages.clear();
                pipeline.template_applied = false;
            }
        }
        Self::basic(local)
    }
}

fn same_source(left: &PartialConfig, right: &PartialConfig) -> bool {
    match (left.origin.repo_id(), right.origin.repo_id()) {
        (Some(left_repo), Some(right_repo)) => left_repo == right_repo,
        _ => left.origin == right.origin,
    }
}

fn tag_partial(partial: &mut PartialConfig) {
    let origin = partial.origin.clone();
    for group in &mut partial.groups {
        group.origin = origin.clone();
        for pipeline in &mut group.pipelines {
            pipeline.origin = origin.clone();
        }
    }
    for environment in &mut partial.environments {
        environment.origin = origin.clone();
    }
    for template in &mut partial.templates {
        template.origin = origin.clone();
    }
}

/// Groups parts by name. A part joins the first same-named view that has no part from its own
/// source yet; otherwise it opens a new view.
fn build_views(parts: Vec<(PartRef, Name)>) -> Vec<View> {
    let mut views: Vec<(Name, View)> = Vec::new();
    for (part, name) in parts {
        match views
            .iter_mut()
            .find(|(existing, view)| *existing == name && !view.has_source(part.source))
        {
            Some((_, view)) => view.push(part),
            None => views.push((name, View::Single(part))),
        }
    }
    views.into_iter().map(|(_, view)| view).collect()
}
