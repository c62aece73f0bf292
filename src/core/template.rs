// src/core/template.rs

//! # Template expansion
//!
//! Copies the stages of a named template into every pipeline that references it, before
//! validation. Each pipeline receives its own deep copy, so later edits to a pipeline's stages
//! never reach the template or its other users.

use crate::constants::{FIELD_STAGES, FIELD_TEMPLATE};
use crate::core::capabilities::Services;
use crate::core::errors::{ConfigError, ConfigResult};
use crate::core::graph::ConfigGraph;
use crate::core::validator;
use crate::models::{Name, Pipeline, Stage, Template};
use log::debug;
use std::collections::HashMap;

/// Expands template references in every pipeline of every source. Returns the number of
/// pipelines that received template stages.
pub fn expand_templates(graph: &mut ConfigGraph) -> usize {
    let mut stages_by_template: HashMap<Name, Vec<Stage>> = HashMap::new();
    for template in graph.templates() {
        stages_by_template
            .entry(template.name.clone())
            .or_insert_with(|| template.stages.clone());
    }

    let mut expanded = 0;
    for source in graph.source_ids() {
        let Some(groups) = graph.source_groups_mut(source) else {
            continue;
        };
        for pipeline in groups.iter_mut().flat_map(|group| group.pipelines.iter_mut()) {
            if expand_pipeline(pipeline, &stages_by_template) {
                expanded += 1;
            }
        }
    }
    if expanded > 0 {
        debug!("Expanded templates into {expanded} pipeline(s)");
    }
    expanded
}

fn expand_pipeline(pipeline: &mut Pipeline, stages_by_template: &HashMap<Name, Vec<Stage>>) -> bool {
    let Some(template) = pipeline.template.clone() else {
        return false;
    };

    if !pipeline.template_applied && !pipeline.stages.is_empty() {
        pipeline.errors.add(
            FIELD_STAGES,
            format!(
                "Cannot add stages to pipeline '{}' which already references template '{template}'",
                pipeline.name
            ),
        );
        pipeline.errors.add(
            FIELD_TEMPLATE,
            format!(
                "Cannot set template '{template}' on pipeline '{}' because it already has stages defined",
                pipeline.name
            ),
        );
        return false;
    }

    // A missing template is reported by validation; the stages are left as they are.
    let Some(stages) = stages_by_template.get(&template) else {
        return false;
    };
    pipeline.stages = stages.clone();
    for stage in &mut pipeline.stages {
        stage.errors.clear();
        for job in &mut stage.jobs {
            job.errors.clear();
        }
    }
    pipeline.template_applied = true;
    true
}

/// Checks that saving `template` keeps every pipeline built from it, and their direct downstream
/// pipelines, valid. Problems are copied onto the template's `stages` field. Returns whether the
/// template is free of errors.
///
/// # Errors
/// `ConfigError::TemplateNotFound` when `graph` has no template of that name, and
/// `ConfigError::NotEditable` when the template comes from a config repository.
pub fn validate_template_update(
    graph: &ConfigGraph,
    template: &mut Template,
    services: &Services,
) -> ConfigResult<bool> {
    if graph.find_template(template.name.as_str()).is_none() {
        return Err(ConfigError::TemplateNotFound {
            name: template.name.to_string(),
        });
    }
    let mut candidate = graph.clone();
    candidate.upsert_template(template.clone())?;
    let report = validator::validate(&mut candidate, services);

    let users: Vec<Name> = candidate
        .pipelines_associated_with_template(template.name.as_str())
        .into_iter()
        .map(|pipeline| pipeline.name.clone())
        .collect();
    let mut affected: Vec<Name> = users.clone();
    for user in &users {
        for downstream in candidate.downstream_pipelines(user.as_str()) {
            if !affected.contains(&downstream.name) {
                affected.push(downstream.name.clone());
            }
        }
    }
    debug!(
        "Template '{}' affects {} pipeline(s)",
        template.name,
        affected.len()
    );

    if let Some(validated) = candidate.find_template(template.name.as_str()) {
        template.errors.add_all(&validated.errors);
    }
    for entry in report.entries() {
        let Some(pipeline) = entry.pipeline.as_ref() else {
            continue;
        };
        if !affected.contains(pipeline) {
            continue;
        }
        for message in entry.errors.messages() {
            template.errors.add(
                FIELD_STAGES,
                format!("Template change breaks pipeline '{pipeline}': {message}"),
            );
        }
    }
    Ok(template.errors.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EnvironmentVariable, Task};
    use crate::test_support::{basic_config, dependent_pipeline, group, simple_pipeline, stage};

    fn templated(name: &str, template: &str) -> Pipeline {
        let mut pipeline = simple_pipeline(name);
        pipeline.stages.clear();
        pipeline.template = Some(Name::from(template));
        pipeline
    }

    fn graph_with_template(pipelines: Vec<Pipeline>) -> ConfigGraph {
        let mut graph = ConfigGraph::basic(basic_config(vec![group("g", pipelines)]));
        let mut template = Template::new("build-template");
        template.stages.push(stage("build", &["compile"]));
        graph.add_template(template);
        graph
    }

    #[test]
    fn test_expanded_stages_are_isolated_from_the_template() {
        // --- Setup ---
        let mut graph = graph_with_template(vec![
            templated("p1", "BUILD-TEMPLATE"),
            templated("p2", "build-template"),
        ]);

        // --- Execute ---
        let expanded = expand_templates(&mut graph);
        let part = graph.groups[0].parts()[0];
        let first = &mut graph.group_part_mut(part).unwrap().pipelines[0];
        first.stages[0].jobs[0]
            .variables
            .push(EnvironmentVariable::plain("X", "1"));
        first.stages[0].variables.push(EnvironmentVariable::plain("Y", "2"));

        // --- Assert ---
        assert_eq!(expanded, 2);
        let template = graph.find_template("build-template").unwrap();
        assert!(template.stages[0].variables.is_empty());
        assert!(template.stages[0].jobs[0].variables.is_empty());
        let second = graph.find_pipeline("p2").unwrap();
        assert!(second.stages[0].jobs[0].variables.is_empty());
    }

    #[test]
    fn test_stages_and_template_together_is_an_error() {
        // --- Setup ---
        let mut pipeline = simple_pipeline("p1");
        pipeline.template = Some(Name::from("build-template"));
        let mut graph = graph_with_template(vec![pipeline]);

        // --- Execute ---
        expand_templates(&mut graph);

        // --- Assert ---
        let pipeline = graph.find_pipeline("p1").unwrap();
        assert_eq!(pipeline.stages[0].name, "stage");
        assert_eq!(
            pipeline.errors.on(FIELD_STAGES),
            Some("Cannot add stages to pipeline 'p1' which already references template 'build-template'")
        );
        assert_eq!(
            pipeline.errors.on(FIELD_TEMPLATE),
            Some("Cannot set template 'build-template' on pipeline 'p1' because it already has stages defined")
        );
    }

    #[test]
    fn test_missing_template_leaves_stages_untouched() {
        let mut graph = graph_with_template(vec![templated("p1", "nope")]);
        assert_eq!(expand_templates(&mut graph), 0);
        assert!(graph.find_pipeline("p1").unwrap().stages.is_empty());
    }

    #[test]
    fn test_template_update_reports_broken_downstream_fetch() {
        // --- Setup ---
        let mut downstream = dependent_pipeline("consumer", "p1", "build");
        downstream.stages[0].jobs[0]
            .tasks
            .push(Task::fetch(Some("p1"), "build", "compile"));
        let graph = graph_with_template(vec![templated("p1", "build-template"), downstream]);
        let mut renamed = Template::new("build-template");
        renamed.stages.push(stage("package", &["compile"]));

        // --- Execute ---
        let valid = validate_template_update(&graph, &mut renamed, &Services::default()).unwrap();

        // --- Assert ---
        assert!(!valid);
        let messages: Vec<&str> = renamed.errors.all_on(FIELD_STAGES).iter().map(String::as_str).collect();
        assert!(messages.iter().all(|m| m.starts_with("Template change breaks pipeline 'consumer': ")));
        assert!(messages.iter().any(|m| m.contains("stage \"p1 :: build\" which does not exist")));
    }

    #[test]
    fn test_template_update_without_breakage_is_valid() {
        let graph = graph_with_template(vec![templated("p1", "build-template")]);
        let mut updated = Template::new("build-template");
        updated.stages.push(stage("build", &["compile", "lint"]));
        assert!(validate_template_update(&graph, &mut updated, &Services::default()).unwrap());
        assert!(updated.errors.is_empty());
    }

    #[test]
    fn test_template_update_of_unknown_template_is_an_error() {
        let graph = graph_with_template(vec![templated("p1", "build-template")]);
        let mut unknown = Template::new("other-template");

        let result = validate_template_update(&graph, &mut unknown, &Services::default());

        assert!(matches!(
            result,
            Err(ConfigError::TemplateNotFound { name }) if name == "other-template"
        ));
    }
}
