// src/test_support.rs
#![allow(dead_code)] // Not every test module uses every fixture.

//! Fixture builders shared by the unit tests.

use crate::models::{
    BasicConfig, ConfigRepo, Job, Material, Name, Origin, PartialConfig, Pipeline, PipelineGroup,
    Stage, Task,
};

/// Routes `log` output through the test harness. Safe to call from every test.
pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn basic_config(groups: Vec<PipelineGroup>) -> BasicConfig {
    BasicConfig {
        groups,
        ..BasicConfig::default()
    }
}

pub fn with_config_repo(mut config: BasicConfig, id: &str) -> BasicConfig {
    config.config_repos.push(ConfigRepo {
        id: id.to_string(),
        plugin_id: "yaml.config.plugin".to_string(),
        material: Material::git(format!("http://{id}.example.com/config.git")),
        errors: Default::default(),
    });
    config
}

pub fn group(name: &str, pipelines: Vec<Pipeline>) -> PipelineGroup {
    PipelineGroup {
        pipelines,
        ..PipelineGroup::new(name)
    }
}

pub fn stage(name: &str, jobs: &[&str]) -> Stage {
    let mut stage = Stage::new(name);
    for job in jobs {
        let mut job = Job::new(*job);
        job.tasks.push(Task::exec("make"));
        stage.jobs.push(job);
    }
    stage
}

/// A valid pipeline: one git material, stage `stage` with job `job`.
pub fn simple_pipeline(name: &str) -> Pipeline {
    let mut pipeline = Pipeline::new(name);
    pipeline
        .materials
        .push(Material::git("http://example.com/repo.git"));
    pipeline.stages.push(stage("stage", &["job"]));
    pipeline
}

/// A valid pipeline whose only material is a dependency on `upstream`/`upstream_stage`.
pub fn dependent_pipeline(name: &str, upstream: &str, upstream_stage: &str) -> Pipeline {
    let mut pipeline = Pipeline::new(name);
    pipeline
        .materials
        .push(Material::dependency(upstream, upstream_stage));
    pipeline.stages.push(stage("stage", &["job"]));
    pipeline
}

pub fn add_dependency(pipeline: &mut Pipeline, upstream: &str, upstream_stage: &str) {
    pipeline
        .materials
        .push(Material::dependency(Name::from(upstream), Name::from(upstream_stage)));
}

/// A partial from config repository `repo` at `revision`.
pub fn partial(repo: &str, revision: &str, groups: Vec<PipelineGroup>) -> PartialConfig {
    PartialConfig {
        groups,
        ..PartialConfig::new(Origin::config_repo(
            repo,
            format!("http://{repo}.example.com/config.git"),
            revision,
        ))
    }
}
