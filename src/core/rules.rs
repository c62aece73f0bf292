// src/core/rules.rs

//! # Per-node validation rules
//!
//! `check` evaluates every rule that concerns a single node, using its context for anything
//! outside the node (siblings through the parent, lookups through the index). Rules never stop
//! at the first problem. Checks that span the whole graph (name uniqueness across sources,
//! dependency cycles, merged fragments) live in the validator.

use crate::constants::{
    FIELD_APPROVAL, FIELD_AUTO_UPDATE, FIELD_COMMAND, FIELD_DESTINATION,
    FIELD_ENVIRONMENT_PIPELINES, FIELD_GROUP, FIELD_ID, FIELD_JOB, FIELD_JOBS, FIELD_KEY,
    FIELD_LABEL_TEMPLATE, FIELD_LOCK_BEHAVIOR, FIELD_MATERIAL_NAME, FIELD_MATERIALS, FIELD_NAME,
    FIELD_ON_CANCEL, FIELD_PACKAGE_ID, FIELD_PIPELINE, FIELD_PIPELINE_NAME, FIELD_PLUGIN_ID,
    FIELD_RESOURCES, FIELD_ROLES, FIELD_RUN_INSTANCE_COUNT, FIELD_RUN_TYPE, FIELD_SCM_ID,
    FIELD_STAGE, FIELD_STAGE_NAME, FIELD_STAGES, FIELD_TEMPLATE, FIELD_TIMEOUT, FIELD_TIMER,
    FIELD_URL, VALID_LOCK_VALUES,
};
use crate::core::context::ValidationContext;
use crate::core::errors::ConfigErrors;
use crate::core::material;
use crate::core::naming::check_name;
use crate::core::naming::check_label_template;
use crate::core::secure;
use crate::core::walker::Node;
use crate::models::{
    Authorization, ConfigProperty, ConfigRepo, Environment, EnvironmentVariable, Job, Material,
    MaterialKind, Materials, Name, PackageDefinition, PackageRepository, Pipeline, PipelineGroup,
    Role, Scm, Stage, Task, TaskKind, Template,
};

/// Runs the rules of `node` and returns what they found.
pub fn check<'a>(node: Node<'a>, context: &ValidationContext<'a>) -> ConfigErrors {
    let mut errors = ConfigErrors::new();
    match node {
        Node::Group(group) => check_group(group, &mut errors),
        Node::Authorization(authorization) => check_authorization(authorization, context, &mut errors),
        Node::Pipeline(pipeline) => check_pipeline(pipeline, context, &mut errors),
        Node::Materials(materials) => check_materials(materials, &mut errors),
        Node::Material(material) => check_material(material, context, &mut errors),
        Node::Stage(stage) => check_stage(stage, context, &mut errors),
        Node::Job(job) => check_job(job, context, &mut errors),
        Node::Task(task) => check_task(task, context, &mut errors),
        Node::Variable(variable) => check_variable(variable, context, &mut errors),
        Node::Environment(environment) => check_environment(environment, context, &mut errors),
        Node::Template(template) => check_template(template, &mut errors),
        Node::Role(role) => check_role(role, context, &mut errors),
        Node::ConfigRepo(repo) => check_config_repo(repo, context, &mut errors),
        Node::PackageRepository(repository) => {
            check_package_repository(repository, context, &mut errors);
        }
        Node::Package(package) => check_package(package, context, &mut errors),
        Node::Scm(scm) => check_scm(scm, context, &mut errors),
        Node::Property(property) => check_property(property, context, &mut errors),
    }
    errors
}

fn add_name_error(errors: &mut ConfigErrors, field: &str, kind: &str, name: &Name) {
    if let Some(message) = check_name(kind, name) {
        errors.add(field, message);
    }
}

fn count<T>(items: &[T], matches: impl Fn(&T) -> bool) -> usize {
    items.iter().filter(|item| matches(item)).count()
}

// --- GROUPS, TEMPLATES & SECURITY ---

fn check_group(group: &PipelineGroup, errors: &mut ConfigErrors) {
    add_name_error(errors, FIELD_GROUP, "group", &group.name);
}

fn check_template(template: &Template, errors: &mut ConfigErrors) {
    add_name_error(errors, FIELD_NAME, "template", &template.name);
    if template.stages.is_empty() {
        errors.add(
            FIELD_STAGES,
            format!(
                "Template '{}' does not have any stages configured. A template must have at least one stage.",
                template.name
            ),
        );
    }
}

fn check_authorization(authorization: &Authorization, context: &ValidationContext<'_>, errors: &mut ConfigErrors) {
    for role in authorization.roles() {
        if !context.role_exists(role) {
            errors.add(FIELD_ROLES, format!("Role \"{role}\" does not exist."));
        }
    }
}

fn check_role(role: &Role, context: &ValidationContext<'_>, errors: &mut ConfigErrors) {
    add_name_error(errors, FIELD_NAME, "role", &role.name);
    let roles = &context.graph().security().roles;
    if count(roles, |other| other.name == role.name) > 1 {
        errors.add(
            FIELD_NAME,
            "Role names should be unique. Role with the same name exists.",
        );
    }
}

// --- PIPELINES ---

fn check_pipeline(pipeline: &Pipeline, context: &ValidationContext<'_>, errors: &mut ConfigErrors) {
    add_name_error(errors, FIELD_NAME, "pipeline", &pipeline.name);

    let material_names: Vec<Name> = pipeline
        .materials
        .iter()
        .filter_map(material::effective_name)
        .collect();
    if let Some(message) = check_label_template(&pipeline.name, &pipeline.label_template, &material_names) {
        errors.add(FIELD_LABEL_TEMPLATE, message);
    }

    if !VALID_LOCK_VALUES.contains(&pipeline.lock_behavior.as_str()) {
        errors.add(
            FIELD_LOCK_BEHAVIOR,
            format!(
                "Lock behavior has an invalid value ({}). Valid values are: [{}]",
                pipeline.lock_behavior,
                VALID_LOCK_VALUES.join(", ")
            ),
        );
    }

    match &pipeline.template {
        Some(template) => {
            add_name_error(errors, FIELD_TEMPLATE, "template", template);
            if !context.does_template_exist(template) {
                errors.add(
                    FIELD_PIPELINE,
                    format!(
                        "Pipeline '{}' refers to non-existent template '{template}'.",
                        pipeline.name
                    ),
                );
            }
        }
        None if pipeline.stages.is_empty() => errors.add(
            FIELD_PIPELINE,
            format!(
                "Pipeline '{}' does not have any stages configured. A pipeline must have at least one stage.",
                pipeline.name
            ),
        ),
        None => {}
    }

    if let Some(timer) = &pipeline.timer
        && !context.services().cron.is_valid(&timer.spec)
    {
        errors.add(
            FIELD_TIMER,
            format!("Invalid cron syntax for timer: '{}'", timer.spec),
        );
    }

    if let Some(save) = context.save_context()
        && save.pipeline == pipeline.name
    {
        add_name_error(errors, FIELD_GROUP, "group", &save.group_name);
        if let Some(group) = context.group()
            && group.name != save.group_name
        {
            errors.add(
                FIELD_GROUP,
                format!(
                    "Pipeline '{}' does not belong to group '{}'.",
                    pipeline.name, save.group_name
                ),
            );
        }
    }
}

fn check_materials(materials: &Materials, errors: &mut ConfigErrors) {
    if materials.is_empty() {
        errors.add(FIELD_MATERIALS, "A pipeline must have at least one material");
    }
}

fn check_material(item: &Material, context: &ValidationContext<'_>, errors: &mut ConfigErrors) {
    if let Some(name) = &item.name {
        add_name_error(errors, FIELD_MATERIAL_NAME, "material", name);
    }

    if let (Some(Node::Materials(siblings)), Some(name)) = (context.parent(), material::effective_name(item)) {
        let same_name = siblings
            .iter()
            .filter(|other| material::effective_name(other).as_ref() == Some(&name))
            .count();
        if same_name > 1 {
            errors.add(
                FIELD_MATERIAL_NAME,
                format!(
                    "You have defined multiple materials called '{name}'. Material names are case-insensitive and must be unique. Note that for dependency materials the default materialName is the name of the upstream pipeline. You can override this by setting the materialName explicitly for the upstream pipeline."
                ),
            );
        }
    }

    check_auto_update(item, context, errors);

    match &item.kind {
        MaterialKind::Git { url, .. }
        | MaterialKind::Svn { url, .. }
        | MaterialKind::Hg { url, .. } => {
            if url.trim().is_empty() {
                errors.add(FIELD_URL, "URL cannot be blank");
            }
        }
        MaterialKind::Tfs {
            url, project_path, ..
        } => {
            if url.trim().is_empty() {
                errors.add(FIELD_URL, "URL cannot be blank");
            }
            if project_path.trim().is_empty() {
                errors.add("projectPath", "Project Path cannot be blank");
            }
        }
        MaterialKind::P4 { port, view, .. } => {
            if port.trim().is_empty() {
                errors.add("serverAndPort", "P4 port cannot be empty.");
            }
            if view.trim().is_empty() {
                errors.add("view", "P4 view cannot be empty.");
            }
        }
        MaterialKind::Dependency { pipeline, stage } => {
            add_name_error(errors, FIELD_PIPELINE_NAME, "pipeline", pipeline);
            add_name_error(errors, FIELD_STAGE_NAME, "stage", stage);
        }
        MaterialKind::Package { package_id, .. } => {
            if context.find_package_by_id(package_id).is_none() {
                errors.add(
                    FIELD_PACKAGE_ID,
                    format!("Could not find repository for given package id:[{package_id}]"),
                );
            }
        }
        MaterialKind::PluggableScm { scm_id, .. } => {
            if context.find_scm_by_id(scm_id).is_none() {
                errors.add(
                    FIELD_SCM_ID,
                    format!("Could not find SCM for given scm-id: [{scm_id}]."),
                );
            }
        }
    }
}

/// Every copy of a polled material, in any pipeline, must agree on `auto_update`.
fn check_auto_update(item: &Material, context: &ValidationContext<'_>, errors: &mut ConfigErrors) {
    if !material::is_polled(item) || !context.is_within_pipelines() {
        return;
    }
    let conflicting = context
        .all_materials_by_fingerprint(&material::fingerprint(item))
        .iter()
        .any(|copy| material::is_polled(copy) && copy.auto_update != item.auto_update);
    if conflicting {
        errors.add(
            FIELD_AUTO_UPDATE,
            format!(
                "Material of type {} ({}) is specified more than once in the configuration with different values for the autoUpdate attribute. All copies of this material must have the same value for this attribute.",
                material::display_type(item),
                material::describe(item)
            ),
        );
    }
}

// --- STAGES, JOBS & TASKS ---

fn check_stage(stage: &Stage, context: &ValidationContext<'_>, errors: &mut ConfigErrors) {
    add_name_error(errors, FIELD_NAME, "stage", &stage.name);

    let siblings: &[Stage] = match context.parent() {
        Some(Node::Pipeline(pipeline)) => &pipeline.stages,
        Some(Node::Template(template)) => &template.stages,
        _ => &[],
    };
    if count(siblings, |other| other.name == stage.name) > 1 {
        errors.add(
            FIELD_NAME,
            format!(
                "You have defined multiple stages called '{}'. Stage names are case-insensitive and must be unique.",
                stage.name
            ),
        );
    }

    if stage.jobs.is_empty() {
        errors.add(
            FIELD_JOBS,
            format!(
                "Stage '{}' does not have any jobs configured. A stage must have at least one job.",
                stage.name
            ),
        );
    }

    for role in &stage.approval.roles {
        if !context.role_exists(role) {
            errors.add(FIELD_APPROVAL, format!("Role \"{role}\" does not exist."));
        }
    }
}

fn check_job(job: &Job, context: &ValidationContext<'_>, errors: &mut ConfigErrors) {
    add_name_error(errors, FIELD_NAME, "job", &job.name);

    if let Some(Node::Stage(stage)) = context.parent()
        && count(&stage.jobs, |other| other.name == job.name) > 1
    {
        errors.add(
            FIELD_NAME,
            format!(
                "You have defined multiple jobs called '{}'. Job names are case-insensitive and must be unique.",
                job.name
            ),
        );
    }

    if job.run_on_all_agents && job.run_instance_count.is_some() {
        errors.add(
            FIELD_RUN_TYPE,
            "Job cannot be 'run on all agents' type and 'run multiple instance' type together.",
        );
    }

    if job.run_instance_count == Some(0) {
        errors.add(
            FIELD_RUN_INSTANCE_COUNT,
            "'Run Instance Count' should be a valid positive integer as it represents number of instances to spawn during runtime.",
        );
    }

    if !job.resources.is_empty() && job.elastic_profile_id.is_some() {
        errors.add(
            FIELD_RESOURCES,
            "Job cannot have both `resource` and `elasticProfileId`",
        );
    }

    if let Some(timeout) = &job.timeout {
        let valid = timeout == "never"
            || timeout
                .trim()
                .parse::<f64>()
                .is_ok_and(|minutes| minutes.is_finite() && minutes >= 0.0);
        if !valid {
            errors.add(
                FIELD_TIMEOUT,
                "Timeout should be a valid number as it represents number of minutes",
            );
        }
    }
}

fn check_task(task: &Task, context: &ValidationContext<'_>, errors: &mut ConfigErrors) {
    if matches!(context.parent(), Some(Node::Task(_))) && task.on_cancel.is_some() {
        errors.add(FIELD_ON_CANCEL, "Cannot nest 'oncancel' within a cancel task");
    }

    match &task.kind {
        TaskKind::Exec { command, .. } => {
            if command.trim().is_empty() {
                errors.add(FIELD_COMMAND, "Command cannot be empty");
            }
        }
        TaskKind::Pluggable { plugin_id, .. } => {
            if plugin_id.trim().is_empty() {
                errors.add(FIELD_PLUGIN_ID, "Plugin id cannot be blank.");
            }
        }
        TaskKind::Fetch {
            pipeline,
            stage,
            job,
            destination,
            ..
        } => {
            if let Some(destination) = destination
                && escapes_working_directory(destination)
            {
                let owner = context
                    .pipeline()
                    .map(|pipeline| &pipeline.name)
                    .or_else(|| context.template().map(|template| &template.name));
                errors.add(
                    FIELD_DESTINATION,
                    format!(
                        "Task of job '{}' in stage '{}' of pipeline '{}' has dest path '{destination}' which is outside the working directory.",
                        context.job().map(|job| job.name.to_string()).unwrap_or_default(),
                        context.stage().map(|stage| stage.name.to_string()).unwrap_or_default(),
                        owner.map(ToString::to_string).unwrap_or_default(),
                    ),
                );
            }
            check_fetch(pipeline.as_deref(), stage, job, context, errors);
        }
    }
}

/// Absolute paths, and relative paths whose `..` segments climb above their starting point.
fn escapes_working_directory(path: &str) -> bool {
    let path = path.trim().replace('\\', "/");
    if path.starts_with('/') || path.chars().nth(1) == Some(':') {
        return true;
    }
    let mut depth: usize = 0;
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => match depth.checked_sub(1) {
                Some(parent) => depth = parent,
                None => return true,
            },
            _ => depth += 1,
        }
    }
    false
}

/// Fetch tasks are checked only inside concrete pipelines: a template cannot know which
/// pipelines will be upstream of its users.
fn check_fetch(
    path: Option<&str>,
    stage: &Name,
    job: &Name,
    context: &ValidationContext<'_>,
    errors: &mut ConfigErrors,
) {
    if context.is_within_templates() {
        return;
    }
    let (Some(current), Some(current_stage), Some(current_job)) =
        (context.pipeline(), context.stage(), context.job())
    else {
        return;
    };
    let label = format!(
        "\"{} :: {} :: {}\"",
        current.name, current_stage.name, current_job.name
    );

    let hops: Vec<Name> = path
        .map(str::trim)
        .filter(|path| !path.is_empty())
        .map(|path| path.split('/').map(|hop| Name::from(hop.trim())).collect())
        .unwrap_or_default();

    let fetches_own_pipeline = match hops.as_slice() {
        [] => true,
        [only] => *only == current.name,
        _ => false,
    };
    if fetches_own_pipeline {
        check_fetch_from_own_pipeline(current, current_stage, stage, job, &label, errors);
        return;
    }

    let Some(ancestor) = hops.first() else {
        return;
    };
    let Some(source) = context.pipeline_by_name(ancestor) else {
        errors.add(
            FIELD_PIPELINE_NAME,
            format!("{label} tries to fetch artifact from pipeline \"{ancestor}\" which does not exist."),
        );
        return;
    };

    let dependencies = context.index().dependencies();
    let chained = hops.windows(2).all(|pair| match pair {
        [upstream, downstream] => dependencies.is_direct_upstream(downstream, upstream),
        _ => true,
    }) && hops
        .last()
        .is_some_and(|parent| dependencies.is_direct_upstream(&current.name, parent));
    if !chained {
        let rendered: Vec<&str> = hops.iter().map(Name::as_str).collect();
        errors.add(
            FIELD_PIPELINE_NAME,
            format!(
                "Pipeline \"{}\" tries to fetch artifact from pipeline \"{}\" which is not an upstream pipeline",
                current.name,
                rendered.join("/")
            ),
        );
        return;
    }

    let Some(source_stage) = source.find_stage(stage) else {
        errors.add(
            FIELD_STAGE,
            format!(
                "{label} tries to fetch artifact from stage \"{} :: {stage}\" which does not exist.",
                source.name
            ),
        );
        return;
    };
    if source_stage.find_job(job).is_none() {
        errors.add(
            FIELD_JOB,
            format!(
                "{label} tries to fetch artifact from job \"{} :: {stage} :: {job}\" which does not exist.",
                source.name
            ),
        );
    }
}

fn check_fetch_from_own_pipeline(
    current: &Pipeline,
    current_stage: &Stage,
    stage: &Name,
    job: &Name,
    label: &str,
    errors: &mut ConfigErrors,
) {
    let Some(source_index) = current.stages.iter().position(|s| s.name == *stage) else {
        errors.add(
            FIELD_STAGE,
            format!(
                "{label} tries to fetch artifact from stage \"{} :: {stage}\" which does not exist.",
                current.name
            ),
        );
        return;
    };
    let current_index = current
        .stages
        .iter()
        .position(|s| s.name == current_stage.name)
        .unwrap_or(source_index);
    if source_index >= current_index {
        errors.add(
            FIELD_STAGE,
            format!(
                "{label} tries to fetch artifact from its stage \"{stage}\" which does not complete before the current stage \"{}\".",
                current_stage.name
            ),
        );
        return;
    }
    let has_job = current
        .stages
        .get(source_index)
        .is_some_and(|source| source.find_job(job).is_some());
    if !has_job {
        errors.add(
            FIELD_JOB,
            format!(
                "{label} tries to fetch artifact from job \"{} :: {stage} :: {job}\" which does not exist.",
                current.name
            ),
        );
    }
}

// --- VARIABLES & ENVIRONMENTS ---

fn check_variable(variable: &EnvironmentVariable, context: &ValidationContext<'_>, errors: &mut ConfigErrors) {
    let owner = context.parent();
    let scope = owner.map_or_else(|| "configuration".to_string(), |node| node.label());

    if variable.name.trim().is_empty() {
        errors.add(
            FIELD_NAME,
            format!("Environment Variable cannot have an empty name for {scope}."),
        );
    }

    let siblings: &[EnvironmentVariable] = match owner {
        Some(Node::Pipeline(pipeline)) => &pipeline.variables,
        Some(Node::Stage(stage)) => &stage.variables,
        Some(Node::Job(job)) => &job.variables,
        Some(Node::Environment(environment)) => &environment.variables,
        _ => &[],
    };
    if count(siblings, |other| other.name == variable.name) > 1 {
        errors.add(
            FIELD_NAME,
            format!(
                "Environment Variable name '{}' is not unique for {scope}.",
                variable.name
            ),
        );
    }

    if variable.secure {
        secure::check_variable(variable, context.services().cipher.as_ref(), errors);
    }
}

fn check_environment(environment: &Environment, context: &ValidationContext<'_>, errors: &mut ConfigErrors) {
    add_name_error(errors, FIELD_NAME, "environment", &environment.name);
    for pipeline in &environment.pipelines {
        if context.pipeline_by_name(pipeline).is_none() {
            errors.add(
                FIELD_ENVIRONMENT_PIPELINES,
                format!(
                    "Environment '{}' refers to an unknown pipeline '{pipeline}'.",
                    environment.name
                ),
            );
        }
    }
}

// --- PLUGGABLE ENTITIES ---

fn check_config_repo(repo: &ConfigRepo, context: &ValidationContext<'_>, errors: &mut ConfigErrors) {
    if repo.id.trim().is_empty() {
        errors.add(FIELD_ID, "Invalid config-repo id");
    } else if count(context.graph().config_repos(), |other| other.id == repo.id) > 1 {
        errors.add(
            FIELD_ID,
            format!(
                "You have defined multiple configuration repositories with the same id - '{}'.",
                repo.id
            ),
        );
    }
    if repo.plugin_id.trim().is_empty() {
        errors.add(
            FIELD_PLUGIN_ID,
            "Configuration repository plugin id cannot be blank",
        );
    }
}

fn check_package_repository(
    repository: &PackageRepository,
    context: &ValidationContext<'_>,
    errors: &mut ConfigErrors,
) {
    add_name_error(errors, FIELD_NAME, "package repository", &repository.name);
    let repositories = context.graph().package_repositories();
    if count(repositories, |other| other.name == repository.name) > 1 {
        errors.add(
            FIELD_NAME,
            format!(
                "You have defined multiple repositories called '{}'. Repository names are case-insensitive and must be unique.",
                repository.name
            ),
        );
    }
    if repository.plugin_id.trim().is_empty() {
        errors.add(FIELD_PLUGIN_ID, "Please select package repository plugin");
    }
}

fn check_package(package: &PackageDefinition, context: &ValidationContext<'_>, errors: &mut ConfigErrors) {
    add_name_error(errors, FIELD_NAME, "package", &package.name);
    if let Some(Node::PackageRepository(repository)) = context.parent()
        && count(&repository.packages, |other| other.name == package.name) > 1
    {
        errors.add(
            FIELD_NAME,
            format!(
                "You have defined multiple packages called '{}'. Package names are case-insensitive and must be unique within a repository.",
                package.name
            ),
        );
    }
}

fn check_scm(scm: &Scm, context: &ValidationContext<'_>, errors: &mut ConfigErrors) {
    add_name_error(errors, FIELD_NAME, "SCM", &scm.name);
    if context.graph().scms().filter(|other| other.name == scm.name).count() > 1 {
        errors.add(
            FIELD_NAME,
            format!(
                "You have defined multiple SCMs called '{}'. SCM names are case-insensitive and must be unique.",
                scm.name
            ),
        );
    }
    if scm.plugin_id.trim().is_empty() {
        errors.add(FIELD_PLUGIN_ID, "Please select SCM plugin");
    }
}

fn check_property(property: &ConfigProperty, context: &ValidationContext<'_>, errors: &mut ConfigErrors) {
    let owner = context.parent();
    if property.key.trim().is_empty() {
        errors.add(FIELD_KEY, "Key cannot be blank");
    }

    let siblings: &[ConfigProperty] = match owner {
        Some(Node::Scm(scm)) => &scm.configuration,
        Some(Node::PackageRepository(repository)) => &repository.configuration,
        Some(Node::Package(package)) => &package.configuration,
        Some(Node::Task(Task {
            kind: TaskKind::Pluggable { configuration, .. },
            ..
        })) => configuration,
        _ => &[],
    };
    if count(siblings, |other| other.key == property.key) > 1 {
        let scope = owner.map_or_else(String::new, |node| node.label());
        errors.add(
            FIELD_KEY,
            format!("Duplicate key '{}' found for {scope}", property.key),
        );
    }

    secure::check_property(property, context.services().cipher.as_ref(), errors);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::FIELD_ENCRYPTED_VALUE;
    use crate::core::capabilities::Services;
    use crate::core::graph::ConfigGraph;
    use crate::core::index::GraphIndex;
    use crate::test_support::{basic_config, group, simple_pipeline, stage};

    /// Runs `check` on a node reached through `ancestors` of a single-pipeline graph.
    fn check_in_pipeline(pipeline: Pipeline, select: impl Fn(&Pipeline) -> (Vec<Node<'_>>, Node<'_>)) -> ConfigErrors {
        let graph = ConfigGraph::basic(basic_config(vec![group("g", vec![pipeline])]));
        let index = GraphIndex::build(&graph);
        let services = Services::default();
        let group = graph.find_group("g").unwrap().parts()[0];
        let pipeline = &group.pipelines[0];
        let (mut ancestors, node) = select(pipeline);
        ancestors.insert(0, Node::Group(group));
        let context = ValidationContext::for_chain(&graph, &index, &services, &ancestors);
        check(node, &context)
    }

    #[test]
    fn test_pipeline_rules() {
        // --- Setup ---
        let mut pipeline = simple_pipeline("bad name");
        pipeline.stages.clear();
        pipeline.lock_behavior = "sometimes".to_string();

        // --- Execute ---
        let errors = check_in_pipeline(pipeline, |p| (Vec::new(), Node::Pipeline(p)));

        // --- Assert ---
        assert!(errors.on(FIELD_NAME).unwrap().starts_with("Invalid pipeline name 'bad name'."));
        assert_eq!(
            errors.on(FIELD_LOCK_BEHAVIOR),
            Some("Lock behavior has an invalid value (sometimes). Valid values are: [lockOnFailure, unlockWhenFinished, none]")
        );
        assert_eq!(
            errors.on(FIELD_PIPELINE),
            Some("Pipeline 'bad name' does not have any stages configured. A pipeline must have at least one stage.")
        );
    }

    #[test]
    fn test_missing_template_is_reported_on_pipeline() {
        let mut pipeline = simple_pipeline("p1");
        pipeline.stages.clear();
        pipeline.template = Some(Name::from("ghost"));
        let errors = check_in_pipeline(pipeline, |p| (Vec::new(), Node::Pipeline(p)));
        assert_eq!(
            errors.on(FIELD_PIPELINE),
            Some("Pipeline 'p1' refers to non-existent template 'ghost'.")
        );
    }

    #[test]
    fn test_duplicate_stage_names_are_case_insensitive() {
        // --- Setup ---
        let mut pipeline = simple_pipeline("p1");
        pipeline.stages.push(stage("STAGE", &["job"]));

        // --- Execute ---
        let errors = check_in_pipeline(pipeline, |p| {
            (vec![Node::Pipeline(p)], Node::Stage(&p.stages[1]))
        });

        // --- Assert ---
        assert_eq!(
            errors.on(FIELD_NAME),
            Some("You have defined multiple stages called 'STAGE'. Stage names are case-insensitive and must be unique.")
        );
    }

    #[test]
    fn test_job_run_type_and_timeout() {
        // --- Setup ---
        let mut pipeline = simple_pipeline("p1");
        let job = &mut pipeline.stages[0].jobs[0];
        job.run_on_all_agents = true;
        job.run_instance_count = Some(3);
        job.timeout = Some("ten".to_string());
        job.resources.push("linux".to_string());
        job.elastic_profile_id = Some("docker".to_string());

        // --- Execute ---
        let errors = check_in_pipeline(pipeline, |p| {
            let stage = &p.stages[0];
            (vec![Node::Pipeline(p), Node::Stage(stage)], Node::Job(&stage.jobs[0]))
        });

        // --- Assert ---
        assert!(errors.on(FIELD_RUN_TYPE).is_some());
        assert!(errors.on(FIELD_RESOURCES).is_some());
        assert_eq!(
            errors.on(FIELD_TIMEOUT),
            Some("Timeout should be a valid number as it represents number of minutes")
        );
    }

    #[test]
    fn test_zero_run_instance_count() {
        let mut pipeline = simple_pipeline("p1");
        pipeline.stages[0].jobs[0].run_instance_count = Some(0);

        let errors = check_in_pipeline(pipeline, |p| {
            let stage = &p.stages[0];
            (vec![Node::Pipeline(p), Node::Stage(stage)], Node::Job(&stage.jobs[0]))
        });

        assert!(errors.on(FIELD_RUN_INSTANCE_COUNT).is_some());
        assert!(errors.on(FIELD_RUN_TYPE).is_none());
    }

    #[test]
    fn test_fetch_destination_outside_working_directory() {
        // --- Setup ---
        let mut pipeline = simple_pipeline("p1");
        pipeline.stages.insert(0, stage("build", &["compile"]));
        let mut fetch = Task::fetch(None, "build", "compile");
        if let TaskKind::Fetch { destination, .. } = &mut fetch.kind {
            *destination = Some("libs/../../outside".to_string());
        }
        pipeline.stages[1].jobs[0].tasks.push(fetch);

        // --- Execute ---
        let errors = check_in_pipeline(pipeline, |p| {
            let stage = &p.stages[1];
            let job = &stage.jobs[0];
            (
                vec![Node::Pipeline(p), Node::Stage(stage), Node::Job(job)],
                Node::Task(job.tasks.last().unwrap()),
            )
        });

        // --- Assert ---
        assert_eq!(
            errors.on(FIELD_DESTINATION),
            Some("Task of job 'job' in stage 'stage' of pipeline 'p1' has dest path 'libs/../../outside' which is outside the working directory.")
        );
        assert!(errors.on(FIELD_STAGE).is_none());
        assert!(escapes_working_directory("/tmp/out"));
        assert!(!escapes_working_directory("libs/../vendor"));
    }

    #[test]
    fn test_fetch_from_later_own_stage() {
        // --- Setup ---
        let mut pipeline = simple_pipeline("p1");
        pipeline.stages.push(stage("deploy", &["ship"]));
        pipeline.stages[0].jobs[0]
            .tasks
            .push(Task::fetch(None, "deploy", "ship"));

        // --- Execute ---
        let errors = check_in_pipeline(pipeline, |p| {
            let stage = &p.stages[0];
            let job = &stage.jobs[0];
            (
                vec![Node::Pipeline(p), Node::Stage(stage), Node::Job(job)],
                Node::Task(&job.tasks[1]),
            )
        });

        // --- Assert ---
        assert_eq!(
            errors.on(FIELD_STAGE),
            Some("\"p1 :: stage :: job\" tries to fetch artifact from its stage \"deploy\" which does not complete before the current stage \"stage\".")
        );
    }

    #[test]
    fn test_fetch_from_pipeline_that_is_not_upstream() {
        // --- Setup ---
        let mut pipeline = simple_pipeline("p1");
        pipeline.stages[0].jobs[0]
            .tasks
            .push(Task::fetch(Some("p1/other"), "stage", "job"));

        // --- Execute ---
        let errors = check_in_pipeline(pipeline, |p| {
            let stage = &p.stages[0];
            let job = &stage.jobs[0];
            (
                vec![Node::Pipeline(p), Node::Stage(stage), Node::Job(job)],
                Node::Task(&job.tasks[1]),
            )
        });

        // --- Assert ---
        assert_eq!(
            errors.on(FIELD_PIPELINE_NAME),
            Some("Pipeline \"p1\" tries to fetch artifact from pipeline \"p1/other\" which is not an upstream pipeline")
        );
    }

    #[test]
    fn test_unresolved_pluggable_references() {
        // --- Setup ---
        let mut pipeline = simple_pipeline("p1");
        pipeline.materials.push(Material::new(MaterialKind::Package {
            package_id: "pkg-9".to_string(),
            resolved: None,
        }));

        // --- Execute ---
        let errors = check_in_pipeline(pipeline, |p| {
            (
                vec![Node::Pipeline(p), Node::Materials(&p.materials)],
                Node::Material(&p.materials.items[1]),
            )
        });

        // --- Assert ---
        assert_eq!(
            errors.on(FIELD_PACKAGE_ID),
            Some("Could not find repository for given package id:[pkg-9]")
        );
    }

    #[test]
    fn test_duplicate_and_tampered_variables() {
        // --- Setup ---
        let mut pipeline = simple_pipeline("p1");
        pipeline.variables.push(EnvironmentVariable::plain("A", "1"));
        pipeline.variables.push(EnvironmentVariable::encrypted("A", "garbage"));

        // --- Execute ---
        let errors = check_in_pipeline(pipeline, |p| {
            (vec![Node::Pipeline(p)], Node::Variable(&p.variables[1]))
        });

        // --- Assert ---
        assert_eq!(
            errors.on(FIELD_NAME),
            Some("Environment Variable name 'A' is not unique for pipeline 'p1'.")
        );
        assert!(errors.on(FIELD_ENCRYPTED_VALUE).is_some());
    }

    #[test]
    fn test_fetch_inside_template_is_not_checked() {
        // --- Setup ---
        let mut template = Template::new("t1");
        template.stages.push(stage("build", &["compile"]));
        template.stages[0].jobs[0]
            .tasks
            .push(Task::fetch(Some("nowhere"), "x", "y"));
        let mut graph = ConfigGraph::default();
        graph.add_template(template);
        let index = GraphIndex::build(&graph);
        let services = Services::default();
        let template = graph.find_template("t1").unwrap();
        let stage = &template.stages[0];
        let job = &stage.jobs[0];

        // --- Execute ---
        let context = ValidationContext::for_chain(
            &graph,
            &index,
            &services,
            &[Node::Template(template), Node::Stage(stage), Node::Job(job)],
        );
        let errors = check(Node::Task(&job.tasks[1]), &context);

        // --- Assert ---
        assert!(errors.is_empty());
    }
}
