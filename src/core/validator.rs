// src/core/validator.rs

//! # Validator
//!
//! Runs a full validation pass over a `ConfigGraph`:
//!
//! 1. clear the errors left by any previous pass,
//! 2. expand templates and encrypt plain-text secrets,
//! 3. walk every node and run its rules (pipeline groups in parallel, they share nothing
//!    mutable), then run the checks that span the whole graph,
//! 4. attach every finding to its entity and summarise them in a `ValidationReport`.
//!
//! Step 3 works on a shared borrow of the graph; findings carry the `NodeId` path of the entity
//! they belong to and are attached afterwards.

use crate::constants::{
    FIELD_AUTHORIZATION, FIELD_CONSISTENT_VARIABLES,
    FIELD_ENVIRONMENT_AGENTS, FIELD_ENVIRONMENT_PIPELINES, FIELD_GROUP, FIELD_NAME,
    FIELD_STAGE_NAME, MATERIALS_BASE_FIELD,
};
use crate::core::capabilities::Services;
use crate::core::context::{SaveContext, ValidationContext};
use crate::core::errors::{ConfigErrors, ConfigResult};
use crate::core::graph::{ConfigGraph, PartRef, SourceId};
use crate::core::index::GraphIndex;
use crate::core::rules;
use crate::core::secure;
use crate::core::template;
use crate::core::walker::{self, Node, NodeId, Step};
use crate::models::{Material, MaterialKind, Name, Pipeline};
use log::{debug, info};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::HashMap;

// --- REPORT ---

/// The problems recorded on one entity.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ReportEntry {
    /// Path of the entity inside the graph.
    pub node: NodeId,
    /// Human-readable location, e.g. `group 'g' > pipeline 'p' > stage 's'`.
    pub location: String,
    /// The pipeline the entity is, or belongs to.
    pub pipeline: Option<Name>,
    pub errors: ConfigErrors,
}

/// Every problem found by a validation pass, in walk order.
#[derive(Serialize, Debug, Clone, Default, PartialEq)]
pub struct ValidationReport {
    entries: Vec<ReportEntry>,
}

impl ValidationReport {
    /// Gathers the errors currently recorded on the entities of `graph`.
    pub fn collect(graph: &ConfigGraph, services: &Services) -> Self {
        let index = GraphIndex::build(graph);
        let context = ValidationContext::root(graph, &index, services);
        let mut entries = Vec::new();
        walker::walk(walker::roots(graph), &context, |id, node, node_context| {
            let errors = node.errors();
            if errors.is_empty() {
                return;
            }
            let pipeline = match node {
                Node::Pipeline(pipeline) => Some(pipeline.name.clone()),
                _ => node_context.pipeline().map(|pipeline| pipeline.name.clone()),
            };
            entries.push(ReportEntry {
                node: id.clone(),
                location: node_context.location(node),
                pipeline,
                errors: errors.clone(),
            });
        });
        Self { entries }
    }

    pub fn is_valid(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total number of messages.
    pub fn error_count(&self) -> usize {
        self.entries.iter().map(|entry| entry.errors.len()).sum()
    }

    pub fn entries(&self) -> &[ReportEntry] {
        &self.entries
    }

    pub fn messages(&self) -> impl Iterator<Item = &str> + '_ {
        self.entries.iter().flat_map(|entry| entry.errors.messages())
    }

    pub fn contains(&self, message: &str) -> bool {
        self.messages().any(|m| m == message)
    }

    /// Entries of one pipeline and everything inside it.
    pub fn for_pipeline<'r>(&'r self, name: &'r str) -> impl Iterator<Item = &'r ReportEntry> + 'r {
        self.entries
            .iter()
            .filter(move |entry| entry.pipeline.as_ref().is_some_and(|p| p == name))
    }

    pub fn to_json(&self) -> ConfigResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

// --- VALIDATION PASS ---

#[derive(Debug)]
struct Finding {
    id: NodeId,
    errors: ConfigErrors,
}

impl Finding {
    fn new(id: NodeId, field: &str, message: impl Into<String>) -> Self {
        let mut errors = ConfigErrors::new();
        errors.add(field, message);
        Self { id, errors }
    }
}

/// Validates the whole graph, recording problems on the entities and returning their summary.
pub fn validate(graph: &mut ConfigGraph, services: &Services) -> ValidationReport {
    run(graph, services, None)
}

/// Like [`validate`], with the extra rules that apply when a single pipeline is saved.
pub fn validate_for_save(
    graph: &mut ConfigGraph,
    services: &Services,
    save: &SaveContext,
) -> ValidationReport {
    run(graph, services, Some(save))
}

fn run(graph: &mut ConfigGraph, services: &Services, save: Option<&SaveContext>) -> ValidationReport {
    walker::clear_errors(graph);
    template::expand_templates(graph);
    secure::encrypt_plaintext_secrets(graph, services);

    let findings = collect_findings(graph, services, save);
    debug!("Attaching {} finding(s)", findings.len());
    for finding in findings {
        match walker::errors_mut(graph, &finding.id) {
            Some(errors) => errors.add_all(&finding.errors),
            None => debug!("No entity at {}, dropping finding", finding.id),
        }
    }

    let report = ValidationReport::collect(graph, services);
    if report.is_valid() {
        debug!("Configuration is valid");
    } else {
        info!(
            "Validation found {} error(s) on {} entities",
            report.error_count(),
            report.entries().len()
        );
    }
    report
}

fn collect_findings(graph: &ConfigGraph, services: &Services, save: Option<&SaveContext>) -> Vec<Finding> {
    let index = GraphIndex::build(graph);
    let context = ValidationContext::root(graph, &index, services).with_save_context(save);

    let (group_roots, other_roots): (Vec<_>, Vec<_>) = walker::roots(graph)
        .into_iter()
        .partition(|(id, _)| matches!(id.steps().first(), Some(Step::Group(_))));

    let mut findings: Vec<Finding> = group_roots
        .into_par_iter()
        .flat_map_iter(|root| run_rules(vec![root], &context))
        .collect();
    findings.extend(run_rules(other_roots, &context));

    check_pipeline_uniqueness(graph, &mut findings);
    check_group_duplicates(graph, &mut findings);
    check_group_authorization(graph, &mut findings);
    check_environments(graph, &mut findings);
    check_template_duplicates(graph, &mut findings);
    check_dependencies(graph, &index, &mut findings);
    findings
}

fn run_rules<'a>(roots: Vec<(NodeId, Node<'a>)>, context: &ValidationContext<'a>) -> Vec<Finding> {
    let mut findings = Vec::new();
    walker::walk(roots, context, |id, node, node_context| {
        let errors = rules::check(node, node_context);
        if !errors.is_empty() {
            findings.push(Finding {
                id: id.clone(),
                errors,
            });
        }
    });
    findings
}

// --- GLOBAL CHECKS ---

fn pipeline_id(part: PartRef, index: usize) -> NodeId {
    NodeId::root(Step::Group(part)).child(Step::Pipeline(index))
}

fn source_name(graph: &ConfigGraph, source: SourceId) -> String {
    graph
        .origin_of(source)
        .map(ToString::to_string)
        .unwrap_or_default()
}

/// Groups items by key, keeping first-seen key order.
fn group_by<K: Eq + std::hash::Hash, T>(items: impl IntoIterator<Item = (K, T)>) -> Vec<Vec<T>> {
    let mut positions: HashMap<K, usize> = HashMap::new();
    let mut groups: Vec<Vec<T>> = Vec::new();
    for (key, item) in items {
        let position = *positions.entry(key).or_insert_with(|| {
            groups.push(Vec::new());
            groups.len() - 1
        });
        if let Some(group) = groups.get_mut(position) {
            group.push(item);
        }
    }
    groups
}

/// Every declaration of a pipeline name gets the duplicate error, naming the sources involved
/// when more than one source declares it.
fn check_pipeline_uniqueness(graph: &ConfigGraph, findings: &mut Vec<Finding>) {
    let declarations = group_by(
        graph
            .located_pipelines()
            .into_iter()
            .map(|(part, index, pipeline)| (pipeline.name.clone(), (part, index, pipeline))),
    );
    for declarations in declarations.into_iter().filter(|d| d.len() > 1) {
        let Some((first_part, _, first)) = declarations.first() else {
            continue;
        };
        let single_source = declarations
            .iter()
            .all(|(part, _, _)| part.source == first_part.source);
        let message = if single_source {
            format!(
                "You have defined multiple pipelines called '{}'. Pipeline names are case-insensitive and must be unique.",
                first.name
            )
        } else {
            let mut sources: Vec<String> = Vec::new();
            for (part, _, _) in &declarations {
                let name = source_name(graph, part.source);
                if !sources.contains(&name) {
                    sources.push(name);
                }
            }
            format!(
                "You have defined multiple pipelines named '{}'. Pipeline names must be unique. Source(s): [{}]",
                first.name,
                sources.join(", ")
            )
        };
        for (part, index, _) in &declarations {
            findings.push(Finding::new(pipeline_id(*part, *index), FIELD_NAME, message.clone()));
        }
    }
}

fn check_group_duplicates(graph: &ConfigGraph, findings: &mut Vec<Finding>) {
    let parts = graph.groups.iter().flat_map(|view| view.parts()).filter_map(|part| {
        graph
            .group_part(*part)
            .map(|group| ((part.source, group.name.clone()), (*part, &group.name)))
    });
    for duplicates in group_by(parts).into_iter().filter(|d| d.len() > 1) {
        for (part, name) in duplicates {
            findings.push(Finding::new(
                NodeId::root(Step::Group(part)),
                FIELD_GROUP,
                format!("Group with name '{name}' already exists"),
            ));
        }
    }
}

fn check_group_authorization(graph: &ConfigGraph, findings: &mut Vec<Finding>) {
    for view in &graph.groups {
        let authorized: Vec<(PartRef, bool)> = view
            .parts()
            .iter()
            .filter_map(|part| graph.group_part(*part).map(|group| (*part, group)))
            .filter(|(_, group)| group.has_authorization())
            .map(|(part, _)| (part, graph.origin_of(part.source).is_some_and(|o| o.is_local())))
            .collect();
        for (part, is_local) in &authorized {
            let id = NodeId::root(Step::Group(*part));
            if !is_local {
                findings.push(Finding::new(
                    id.clone(),
                    FIELD_AUTHORIZATION,
                    "Authorization can be defined only in configuration file",
                ));
            }
            if authorized.len() > 1 {
                findings.push(Finding::new(
                    id,
                    FIELD_AUTHORIZATION,
                    "Authorization is defined in more than one configuration source",
                ));
            }
        }
    }
}

fn check_environments(graph: &ConfigGraph, findings: &mut Vec<Finding>) {
    let parts = graph.environments.iter().flat_map(|view| view.parts()).filter_map(|part| {
        graph
            .environment_part(*part)
            .map(|environment| ((part.source, environment.name.clone()), (*part, &environment.name)))
    });
    for duplicates in group_by(parts).into_iter().filter(|d| d.len() > 1) {
        for (part, name) in duplicates {
            findings.push(Finding::new(
                NodeId::root(Step::Environment(part)),
                FIELD_NAME,
                format!("Environment with name '{name}' already exists."),
            ));
        }
    }

    for view in graph.environments.iter().filter(|view| view.is_merged()) {
        let parts: Vec<(PartRef, _)> = view
            .parts()
            .iter()
            .filter_map(|part| graph.environment_part(*part).map(|environment| (*part, environment)))
            .collect();
        for (part, environment) in &parts {
            let others = || parts.iter().filter(|(other, _)| other != part).map(|(_, e)| *e);
            let id = NodeId::root(Step::Environment(*part));
            for pipeline in &environment.pipelines {
                if others().any(|other| other.pipelines.contains(pipeline)) {
                    findings.push(Finding::new(
                        id.clone(),
                        FIELD_ENVIRONMENT_PIPELINES,
                        format!("Environment pipeline '{pipeline}' is defined more than once."),
                    ));
                }
            }
            for agent in &environment.agents {
                if others().any(|other| other.agents.contains(agent)) {
                    findings.push(Finding::new(
                        id.clone(),
                        FIELD_ENVIRONMENT_AGENTS,
                        format!("Environment agent '{agent}' is defined more than once."),
                    ));
                }
            }
            for variable in &environment.variables {
                let conflicting = others().any(|other| {
                    other
                        .variables
                        .iter()
                        .any(|v| v.name == variable.name && !v.has_same_value(variable))
                });
                if conflicting {
                    findings.push(Finding::new(
                        id.clone(),
                        FIELD_CONSISTENT_VARIABLES,
                        format!(
                            "Environment variable '{}' is defined more than once with different values",
                            variable.name
                        ),
                    ));
                }
            }
        }
    }
}

fn check_template_duplicates(graph: &ConfigGraph, findings: &mut Vec<Finding>) {
    let templates = graph.source_ids().into_iter().flat_map(|source| {
        graph
            .source_templates(source)
            .iter()
            .enumerate()
            .map(move |(index, template)| (template.name.clone(), (source, index, &template.name)))
    });
    for duplicates in group_by(templates).into_iter().filter(|d| d.len() > 1) {
        for (source, index, name) in duplicates {
            findings.push(Finding::new(
                NodeId::root(Step::Template(source, index)),
                FIELD_NAME,
                format!("Template with name '{name}' already exists."),
            ));
        }
    }
}

fn check_dependencies(graph: &ConfigGraph, index: &GraphIndex<'_>, findings: &mut Vec<Finding>) {
    let located = graph.located_pipelines();
    let declarations_of = |name: &Name| -> Vec<NodeId> {
        located
            .iter()
            .filter(|(_, _, pipeline)| pipeline.name == *name)
            .map(|(part, position, _)| pipeline_id(*part, *position).child(Step::Materials))
            .collect()
    };

    let dependencies = index.dependencies();
    for (pipeline, message) in dependencies.find_cycles() {
        for id in declarations_of(&pipeline) {
            findings.push(Finding::new(id, MATERIALS_BASE_FIELD, message.clone()));
        }
    }
    for missing in dependencies.missing_upstreams() {
        for id in declarations_of(&missing.referencing) {
            findings.push(Finding::new(id, MATERIALS_BASE_FIELD, missing.message()));
        }
    }

    for (part, position, pipeline) in &located {
        for (material_index, item) in pipeline.materials.iter().enumerate() {
            if let Some(message) = missing_stage(index, part.source, graph, pipeline, item) {
                let id = pipeline_id(*part, *position)
                    .child(Step::Materials)
                    .child(Step::Material(material_index));
                findings.push(Finding::new(id, FIELD_STAGE_NAME, message));
            }
        }
    }
}

fn missing_stage(
    index: &GraphIndex<'_>,
    source: SourceId,
    graph: &ConfigGraph,
    pipeline: &Pipeline,
    item: &Material,
) -> Option<String> {
    let MaterialKind::Dependency {
        pipeline: upstream,
        stage,
    } = &item.kind
    else {
        return None;
    };
    let upstream_pipeline = index.pipeline(upstream)?;
    if upstream_pipeline.find_stage(stage).is_some() {
        return None;
    }
    Some(format!(
        "Stage with name '{stage}' does not exist on pipeline '{upstream}', it is being referred to from pipeline '{}' ({})",
        pipeline.name,
        source_name(graph, source)
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{FIELD_AUTO_UPDATE, FIELD_MATERIALS, FIELD_PIPELINE};
    use crate::models::{
        AccessList, Authorization, Environment, EnvironmentVariable, Origin, PartialConfig, Role,
    };
    use crate::test_support::{
        basic_config, dependent_pipeline, group, init_logger, partial, simple_pipeline,
        with_config_repo,
    };

    fn materials_errors<'g>(graph: &'g ConfigGraph, name: &str) -> &'g ConfigErrors {
        &graph.find_pipeline(name).unwrap().materials.errors
    }

    #[test]
    fn test_valid_configuration_has_empty_report() -> anyhow::Result<()> {
        // --- Setup ---
        init_logger();
        let mut graph = ConfigGraph::basic(basic_config(vec![group(
            "g",
            vec![simple_pipeline("up"), dependent_pipeline("down", "up", "stage")],
        )]));

        // --- Execute ---
        let report = validate(&mut graph, &Services::default());

        // --- Assert ---
        assert!(report.is_valid(), "unexpected errors: {}", report.to_json()?);
        assert_eq!(report.error_count(), 0);
        Ok(())
    }

    #[test]
    fn test_same_source_duplicates_and_fix() {
        // --- Setup ---
        let mut graph = ConfigGraph::basic(basic_config(vec![
            group("a", vec![simple_pipeline("p1")]),
            group("b", vec![simple_pipeline("P1")]),
        ]));
        let services = Services::default();

        // --- Execute ---
        let report = validate(&mut graph, &services);

        // --- Assert ---
        let a = graph.find_group("a").unwrap().pipelines()[0];
        let b = graph.find_group("b").unwrap().pipelines()[0];
        assert_eq!(
            a.errors.on(FIELD_NAME),
            Some("You have defined multiple pipelines called 'p1'. Pipeline names are case-insensitive and must be unique.")
        );
        assert_eq!(a.errors, b.errors);
        assert_eq!(report.error_count(), 2);

        // Renaming one declaration clears both on the next pass.
        let part = graph.groups[1].parts()[0];
        graph.group_part_mut(part).unwrap().pipelines[0].name = Name::from("p2");
        assert!(validate(&mut graph, &services).is_valid());
        assert!(graph.find_pipeline("p1").unwrap().errors.is_empty());
    }

    #[test]
    fn test_cross_origin_duplicates_name_every_source() {
        // --- Setup ---
        let main = with_config_repo(basic_config(vec![group("g", vec![simple_pipeline("p1")])]), "repo1");
        let remote = partial("repo1", "rev1", vec![group("remote", vec![simple_pipeline("p1")])]);
        let mut graph = ConfigGraph::merged(main, vec![remote], false);

        // --- Execute ---
        let report = validate(&mut graph, &Services::default());

        // --- Assert ---
        let expected = "You have defined multiple pipelines named 'p1'. Pipeline names must be unique. Source(s): [pipelines.toml, http://repo1.example.com/config.git at rev1]";
        let declarations: Vec<&ReportEntry> = report
            .entries()
            .iter()
            .filter(|entry| entry.errors.on(FIELD_NAME) == Some(expected))
            .collect();
        assert_eq!(declarations.len(), 2);
    }

    #[test]
    fn test_three_cycle_is_reported_on_every_member() {
        // --- Setup ---
        let mut graph = ConfigGraph::basic(basic_config(vec![group(
            "g",
            vec![
                dependent_pipeline("p1", "p3", "stage"),
                dependent_pipeline("p2", "p1", "stage"),
                dependent_pipeline("p3", "p2", "stage"),
            ],
        )]));

        // --- Execute ---
        validate(&mut graph, &Services::default());

        // --- Assert ---
        for name in ["p1", "p2", "p3"] {
            assert_eq!(
                materials_errors(&graph, name).on(MATERIALS_BASE_FIELD),
                Some("Circular dependency: p1 <- p2 <- p3 <- p1")
            );
        }
    }

    #[test]
    fn test_two_cycle_is_reported_on_both() {
        let mut graph = ConfigGraph::basic(basic_config(vec![group(
            "g",
            vec![dependent_pipeline("a", "b", "stage"), dependent_pipeline("b", "a", "stage")],
        )]));
        validate(&mut graph, &Services::default());
        for name in ["a", "b"] {
            let message = materials_errors(&graph, name).on(MATERIALS_BASE_FIELD).unwrap();
            assert!(message.starts_with("Circular dependency: "));
        }
    }

    #[test]
    fn test_missing_upstream_pipeline_and_stage() {
        // --- Setup ---
        let mut graph = ConfigGraph::basic(basic_config(vec![group(
            "g",
            vec![
                simple_pipeline("up"),
                dependent_pipeline("ghost-user", "ghost", "stage"),
                dependent_pipeline("stage-user", "up", "deploy"),
            ],
        )]));

        // --- Execute ---
        let report = validate(&mut graph, &Services::default());

        // --- Assert ---
        assert_eq!(
            materials_errors(&graph, "ghost-user").all_on(MATERIALS_BASE_FIELD),
            &["Pipeline \"ghost\" does not exist. It is used from pipeline \"ghost-user\".".to_string()]
        );
        let material = &graph.find_pipeline("stage-user").unwrap().materials.items[0];
        assert_eq!(
            material.errors.on(FIELD_STAGE_NAME),
            Some("Stage with name 'deploy' does not exist on pipeline 'up', it is being referred to from pipeline 'stage-user' (pipelines.toml)")
        );
        assert_eq!(report.for_pipeline("stage-user").count(), 1);
    }

    #[test]
    fn test_remote_group_authorization_is_rejected() {
        // --- Setup ---
        let main = with_config_repo(basic_config(vec![group("g", vec![simple_pipeline("p1")])]), "repo1");
        let mut remote_group = group("g", vec![simple_pipeline("p2")]);
        remote_group.authorization = Some(Authorization {
            viewers: AccessList {
                users: vec!["alice".to_string()],
                roles: Vec::new(),
            },
            ..Authorization::default()
        });
        let remote = partial("repo1", "rev1", vec![remote_group]);
        let mut graph = ConfigGraph::merged(main, vec![remote], false);

        // --- Execute ---
        let report = validate(&mut graph, &Services::default());

        // --- Assert ---
        assert!(report.contains("Authorization can be defined only in configuration file"));
        assert!(!report.contains("Authorization is defined in more than one configuration source"));
    }

    #[test]
    fn test_merged_environment_duplicates() {
        // --- Setup ---
        let mut local_env = Environment::new("prod");
        local_env.pipelines.push(Name::from("p1"));
        local_env.agents.push("agent-1".to_string());
        local_env.variables.push(EnvironmentVariable::plain("MODE", "fast"));
        let mut main = with_config_repo(basic_config(vec![group("g", vec![simple_pipeline("p1")])]), "repo1");
        main.environments.push(local_env.clone());
        let mut remote_env = local_env;
        remote_env.variables = vec![EnvironmentVariable::plain("MODE", "slow")];
        let remote = PartialConfig {
            environments: vec![remote_env],
            ..PartialConfig::new(Origin::config_repo("repo1", "http://repo1.example.com/config.git", "rev1"))
        };
        let mut graph = ConfigGraph::merged(main, vec![remote], false);

        // --- Execute ---
        let report = validate(&mut graph, &Services::default());

        // --- Assert ---
        assert!(report.contains("Environment pipeline 'p1' is defined more than once."));
        assert!(report.contains("Environment agent 'agent-1' is defined more than once."));
        assert!(report.contains("Environment variable 'MODE' is defined more than once with different values"));
    }

    #[test]
    fn test_environment_with_unknown_pipeline() {
        let mut main = basic_config(vec![group("g", vec![simple_pipeline("p1")])]);
        let mut environment = Environment::new("prod");
        environment.pipelines.push(Name::from("nope"));
        main.environments.push(environment);
        let mut graph = ConfigGraph::basic(main);

        let report = validate(&mut graph, &Services::default());

        assert!(report.contains("Environment 'prod' refers to an unknown pipeline 'nope'."));
    }

    #[test]
    fn test_auto_update_conflict_marks_every_copy() {
        // --- Setup ---
        let mut p2 = simple_pipeline("p2");
        p2.materials.items[0].auto_update = false;
        let mut graph = ConfigGraph::basic(basic_config(vec![group("g", vec![simple_pipeline("p1"), p2])]));

        // --- Execute ---
        validate(&mut graph, &Services::default());

        // --- Assert ---
        let expected = "Material of type Git (http://example.com/repo.git) is specified more than once in the configuration with different values for the autoUpdate attribute. All copies of this material must have the same value for this attribute.";
        for name in ["p1", "p2"] {
            let material = &graph.find_pipeline(name).unwrap().materials.items[0];
            assert_eq!(material.errors.on(FIELD_AUTO_UPDATE), Some(expected));
        }
    }

    #[test]
    fn test_unknown_role_and_missing_materials() {
        // --- Setup ---
        let mut g = group("g", vec![simple_pipeline("p1")]);
        g.pipelines[0].materials.items.clear();
        g.authorization = Some(Authorization {
            admins: AccessList {
                users: Vec::new(),
                roles: vec![Name::from("deployers"), Name::from("ADMINS")],
            },
            ..Authorization::default()
        });
        let mut main = basic_config(vec![g]);
        main.security.roles.push(Role {
            name: Name::from("admins"),
            ..Role::default()
        });
        let mut graph = ConfigGraph::basic(main);

        // --- Execute ---
        let report = validate(&mut graph, &Services::default());

        // --- Assert ---
        assert!(report.contains("Role \"deployers\" does not exist."));
        assert!(!report.contains("Role \"ADMINS\" does not exist."));
        assert_eq!(
            materials_errors(&graph, "p1").on(FIELD_MATERIALS),
            Some("A pipeline must have at least one material")
        );
    }

    #[test]
    fn test_save_context_checks_target_group() {
        // --- Setup ---
        let mut graph = ConfigGraph::basic(basic_config(vec![group("g", vec![simple_pipeline("p1")])]));
        let save = SaveContext::new("p1", "other", false);

        // --- Execute ---
        validate_for_save(&mut graph, &Services::default(), &save);

        // --- Assert ---
        assert_eq!(
            graph.find_pipeline("p1").unwrap().errors.on(FIELD_GROUP),
            Some("Pipeline 'p1' does not belong to group 'other'.")
        );
    }

    #[test]
    fn test_report_json_lists_locations() -> anyhow::Result<()> {
        // --- Setup ---
        let mut pipeline = simple_pipeline("p1");
        pipeline.stages.clear();
        let mut graph = ConfigGraph::basic(basic_config(vec![group("g", vec![pipeline])]));

        // --- Execute ---
        let report = validate(&mut graph, &Services::default());
        let json: serde_json::Value = serde_json::from_str(&report.to_json()?)?;

        // --- Assert ---
        let entry = &json["entries"][0];
        assert_eq!(entry["location"], "group 'g' > pipeline 'p1'");
        assert_eq!(entry["pipeline"], "p1");
        assert!(entry["errors"][FIELD_PIPELINE][0]
            .as_str()
            .unwrap()
            .contains("does not have any stages configured"));
        Ok(())
    }
}
