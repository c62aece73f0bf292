// src/models.rs

//! Plain configuration entities.
//!
//! Everything here is data: the behaviour (validation, merging, fingerprints, lookups) lives under
//! `core`. Every entity that can be wrong carries its own `ConfigErrors`, skipped by serde, so a
//! configuration serialized back to TOML never contains validation output.

use crate::constants::{
    DEFAULT_LABEL_TEMPLATE, LOCAL_CONFIG_DISPLAY_NAME, LOCK_NONE, UI_ORIGIN_DISPLAY_NAME,
};
use crate::core::errors::ConfigErrors;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

// --- NAMES & ORIGINS ---

/// A case-insensitive entity name. Equality, hashing and ordering ignore ASCII case, while the
/// original spelling is kept for display.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(transparent)]
pub struct Name(String);

impl Name {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }

    /// Lower-cased form, used wherever a name feeds a hash or a message that must not depend on
    /// the spelling a user happened to pick.
    pub fn to_lowercase(&self) -> String {
        self.0.to_ascii_lowercase()
    }
}

impl PartialEq for Name {
    fn eq(&self, other: &Self) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }
}

impl Eq for Name {}

impl PartialEq<str> for Name {
    fn eq(&self, other: &str) -> bool {
        self.0.eq_ignore_ascii_case(other)
    }
}

impl PartialEq<&str> for Name {
    fn eq(&self, other: &&str) -> bool {
        self.0.eq_ignore_ascii_case(other)
    }
}

impl Hash for Name {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for byte in self.0.bytes() {
            state.write_u8(byte.to_ascii_lowercase());
        }
        state.write_u8(0xff);
    }
}

impl PartialOrd for Name {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Name {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .bytes()
            .map(|b| b.to_ascii_lowercase())
            .cmp(other.0.bytes().map(|b| b.to_ascii_lowercase()))
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Name {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for Name {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Where a configuration fragment came from.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq, Hash)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Origin {
    /// The locally authored configuration file.
    #[default]
    File,
    /// A snapshot of a config repository at a given revision.
    ConfigRepo {
        repo_id: String,
        url: String,
        revision: String,
    },
    /// An empty part created by the merge engine so that local edits have somewhere to land.
    UiPlaceholder,
}

impl Origin {
    pub fn config_repo(
        repo_id: impl Into<String>,
        url: impl Into<String>,
        revision: impl Into<String>,
    ) -> Self {
        Self::ConfigRepo {
            repo_id: repo_id.into(),
            url: url.into(),
            revision: revision.into(),
        }
    }

    /// True when fragments with this origin may be edited in place.
    pub fn is_local(&self) -> bool {
        matches!(self, Self::File | Self::UiPlaceholder)
    }

    pub fn repo_id(&self) -> Option<&str> {
        match self {
            Self::ConfigRepo { repo_id, .. } => Some(repo_id),
            _ => None,
        }
    }

    pub fn display_name(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File => f.write_str(LOCAL_CONFIG_DISPLAY_NAME),
            Self::ConfigRepo { url, revision, .. } => write!(f, "{url} at {revision}"),
            Self::UiPlaceholder => f.write_str(UI_ORIGIN_DISPLAY_NAME),
        }
    }
}

// --- VARIABLES & PROPERTIES ---

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct EnvironmentVariable {
    pub name: String,
    pub value: Option<String>,
    pub encrypted_value: Option<String>,
    pub secure: bool,
    #[serde(skip)]
    pub errors: ConfigErrors,
}

impl EnvironmentVariable {
    pub fn plain(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: Some(value.into()),
            ..Self::default()
        }
    }

    /// A secure variable still holding its plain text; encrypted during validation.
    pub fn secure(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: Some(value.into()),
            secure: true,
            ..Self::default()
        }
    }

    pub fn encrypted(name: impl Into<String>, encrypted_value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            encrypted_value: Some(encrypted_value.into()),
            secure: true,
            ..Self::default()
        }
    }

    /// Two variables carry the same value when both the plain and encrypted forms agree.
    pub fn has_same_value(&self, other: &Self) -> bool {
        self.secure == other.secure
            && self.value == other.value
            && self.encrypted_value == other.encrypted_value
    }
}

/// A key/value pair configuring a plugin-backed entity.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct ConfigProperty {
    pub key: String,
    pub value: Option<String>,
    pub encrypted_value: Option<String>,
    #[serde(skip)]
    pub errors: ConfigErrors,
}

impl ConfigProperty {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: Some(value.into()),
            ..Self::default()
        }
    }
}

// --- SECURITY ---

/// Users and roles granted one permission level.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct AccessList {
    pub users: Vec<String>,
    pub roles: Vec<Name>,
}

impl AccessList {
    pub fn is_empty(&self) -> bool {
        self.users.is_empty() && self.roles.is_empty()
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct Authorization {
    pub admins: AccessList,
    pub operators: AccessList,
    pub viewers: AccessList,
    #[serde(skip)]
    pub errors: ConfigErrors,
}

impl Authorization {
    pub fn is_empty(&self) -> bool {
        self.admins.is_empty() && self.operators.is_empty() && self.viewers.is_empty()
    }

    pub fn roles(&self) -> impl Iterator<Item = &Name> + '_ {
        self.admins
            .roles
            .iter()
            .chain(&self.operators.roles)
            .chain(&self.viewers.roles)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct Role {
    pub name: Name,
    pub users: Vec<String>,
    #[serde(skip)]
    pub errors: ConfigErrors,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct Security {
    pub roles: Vec<Role>,
}

// --- PLUGGABLE ENTITIES ---

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct PackageDefinition {
    pub id: String,
    pub name: Name,
    pub configuration: Vec<ConfigProperty>,
    pub auto_update: bool,
    #[serde(skip)]
    pub errors: ConfigErrors,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct PackageRepository {
    pub id: String,
    pub name: Name,
    pub plugin_id: String,
    pub configuration: Vec<ConfigProperty>,
    pub packages: Vec<PackageDefinition>,
    #[serde(skip)]
    pub errors: ConfigErrors,
}

/// A pluggable SCM definition, referenced from pipelines by id.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct Scm {
    pub id: String,
    pub name: Name,
    pub plugin_id: String,
    pub configuration: Vec<ConfigProperty>,
    pub auto_update: bool,
    #[serde(skip)]
    pub errors: ConfigErrors,
}

/// A registered config repository: the source remote partials are parsed from.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ConfigRepo {
    pub id: String,
    pub plugin_id: String,
    pub material: Material,
    #[serde(skip)]
    pub errors: ConfigErrors,
}

// --- MATERIALS ---

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Material {
    #[serde(default)]
    pub name: Option<Name>,
    #[serde(default = "default_true")]
    pub auto_update: bool,
    #[serde(flatten)]
    pub kind: MaterialKind,
    #[serde(skip)]
    pub errors: ConfigErrors,
}

impl Material {
    pub fn new(kind: MaterialKind) -> Self {
        Self {
            name: None,
            auto_update: true,
            kind,
            errors: ConfigErrors::new(),
        }
    }

    pub fn git(url: impl Into<String>) -> Self {
        Self::new(MaterialKind::Git {
            url: url.into(),
            branch: None,
            username: None,
            password: None,
            destination: None,
            shallow_clone: false,
        })
    }

    pub fn dependency(pipeline: impl Into<Name>, stage: impl Into<Name>) -> Self {
        Self::new(MaterialKind::Dependency {
            pipeline: pipeline.into(),
            stage: stage.into(),
        })
    }

    pub fn with_name(mut self, name: impl Into<Name>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// The variants a material can take. Package and pluggable SCM materials refer to their
/// definitions by id; the resolved definition is attached after loading and is never serialized.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MaterialKind {
    Git {
        url: String,
        #[serde(default)]
        branch: Option<String>,
        #[serde(default)]
        username: Option<String>,
        #[serde(default)]
        password: Option<String>,
        #[serde(default)]
        destination: Option<String>,
        #[serde(default)]
        shallow_clone: bool,
    },
    Svn {
        url: String,
        #[serde(default)]
        username: Option<String>,
        #[serde(default)]
        password: Option<String>,
        #[serde(default)]
        check_externals: bool,
        #[serde(default)]
        destination: Option<String>,
    },
    Hg {
        url: String,
        #[serde(default)]
        branch: Option<String>,
        #[serde(default)]
        destination: Option<String>,
    },
    P4 {
        port: String,
        view: String,
        #[serde(default)]
        username: Option<String>,
        #[serde(default)]
        password: Option<String>,
        #[serde(default)]
        use_tickets: bool,
        #[serde(default)]
        destination: Option<String>,
    },
    Tfs {
        url: String,
        #[serde(default)]
        domain: Option<String>,
        project_path: String,
        #[serde(default)]
        username: Option<String>,
        #[serde(default)]
        password: Option<String>,
        #[serde(default)]
        destination: Option<String>,
    },
    Dependency {
        pipeline: Name,
        stage: Name,
    },
    Package {
        package_id: String,
        #[serde(skip)]
        resolved: Option<Arc<PackageDefinition>>,
    },
    PluggableScm {
        scm_id: String,
        #[serde(default)]
        destination: Option<String>,
        #[serde(skip)]
        resolved: Option<Arc<Scm>>,
    },
}

/// The ordered material list of a pipeline. Collection-wide problems (cycles, dangling upstreams)
/// are recorded on its own errors rather than on any single material.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(transparent)]
pub struct Materials {
    pub items: Vec<Material>,
    #[serde(skip)]
    pub errors: ConfigErrors,
}

impl Materials {
    pub fn iter(&self) -> std::slice::Iter<'_, Material> {
        self.items.iter()
    }

    pub fn push(&mut self, material: Material) {
        self.items.push(material);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

// --- TASKS, JOBS & STAGES ---

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Task {
    #[serde(flatten)]
    pub kind: TaskKind,
    #[serde(default)]
    pub on_cancel: Option<Box<Task>>,
    #[serde(skip)]
    pub errors: ConfigErrors,
}

impl Task {
    pub fn new(kind: TaskKind) -> Self {
        Self {
            kind,
            on_cancel: None,
            errors: ConfigErrors::new(),
        }
    }

    pub fn exec(command: impl Into<String>) -> Self {
        Self::new(TaskKind::Exec {
            command: command.into(),
            args: Vec::new(),
            working_directory: None,
        })
    }

    /// A fetch-artifact task. `pipeline` is a `/`-separated path from an ancestor down to the
    /// direct upstream; `None` fetches from the pipeline the task runs in.
    pub fn fetch(pipeline: Option<&str>, stage: impl Into<Name>, job: impl Into<Name>) -> Self {
        Self::new(TaskKind::Fetch {
            pipeline: pipeline.map(str::to_string),
            stage: stage.into(),
            job: job.into(),
            source: String::new(),
            is_file: false,
            destination: None,
        })
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskKind {
    Exec {
        command: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        working_directory: Option<String>,
    },
    Fetch {
        #[serde(default)]
        pipeline: Option<String>,
        stage: Name,
        job: Name,
        #[serde(default)]
        source: String,
        #[serde(default)]
        is_file: bool,
        #[serde(default)]
        destination: Option<String>,
    },
    Pluggable {
        plugin_id: String,
        #[serde(default)]
        configuration: Vec<ConfigProperty>,
    },
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct Job {
    pub name: Name,
    pub resources: Vec<String>,
    pub tasks: Vec<Task>,
    pub variables: Vec<EnvironmentVariable>,
    pub run_on_all_agents: bool,
    pub run_instance_count: Option<u32>,
    /// Minutes, or `never`.
    pub timeout: Option<String>,
    pub elastic_profile_id: Option<String>,
    #[serde(skip)]
    pub errors: ConfigErrors,
}

impl Job {
    pub fn new(name: impl Into<Name>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalKind {
    #[default]
    Success,
    Manual,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct Approval {
    #[serde(rename = "type")]
    pub kind: ApprovalKind,
    pub users: Vec<String>,
    pub roles: Vec<Name>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct Stage {
    pub name: Name,
    pub approval: Approval,
    pub fetch_materials: bool,
    pub jobs: Vec<Job>,
    pub variables: Vec<EnvironmentVariable>,
    #[serde(skip)]
    pub errors: ConfigErrors,
}

impl Stage {
    pub fn new(name: impl Into<Name>) -> Self {
        Self {
            name: name.into(),
            fetch_materials: true,
            ..Self::default()
        }
    }

    pub fn find_job(&self, name: &Name) -> Option<&Job> {
        self.jobs.iter().find(|job| job.name == *name)
    }
}

// --- PIPELINES, TEMPLATES & GROUPS ---

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Timer {
    pub spec: String,
    #[serde(default)]
    pub only_on_changes: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Pipeline {
    pub name: Name,
    pub label_template: String,
    pub lock_behavior: String,
    pub template: Option<Name>,
    pub timer: Option<Timer>,
    pub materials: Materials,
    pub variables: Vec<EnvironmentVariable>,
    pub stages: Vec<Stage>,
    #[serde(skip)]
    pub origin: Origin,
    /// Set once the stages of `template` have been copied into `stages`.
    #[serde(skip)]
    pub template_applied: bool,
    #[serde(skip)]
    pub errors: ConfigErrors,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self {
            name: Name::default(),
            label_template: DEFAULT_LABEL_TEMPLATE.to_string(),
            lock_behavior: LOCK_NONE.to_string(),
            template: None,
            timer: None,
            materials: Materials::default(),
            variables: Vec::new(),
            stages: Vec::new(),
            origin: Origin::File,
            template_applied: false,
            errors: ConfigErrors::new(),
        }
    }
}

impl Pipeline {
    pub fn new(name: impl Into<Name>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn find_stage(&self, name: &Name) -> Option<&Stage> {
        self.stages.iter().find(|stage| stage.name == *name)
    }

    /// Upstream `(pipeline, stage)` pairs named by the dependency materials, in material order.
    pub fn dependency_targets(&self) -> impl Iterator<Item = (&Name, &Name)> + '_ {
        self.materials.iter().filter_map(|material| match &material.kind {
            MaterialKind::Dependency { pipeline, stage } => Some((pipeline, stage)),
            _ => None,
        })
    }

    pub fn has_template(&self) -> bool {
        self.template.is_some()
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct Template {
    pub name: Name,
    pub authorization: Option<Authorization>,
    pub stages: Vec<Stage>,
    #[serde(skip)]
    pub origin: Origin,
    #[serde(skip)]
    pub errors: ConfigErrors,
}

impl Template {
    pub fn new(name: impl Into<Name>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct PipelineGroup {
    pub name: Name,
    pub authorization: Option<Authorization>,
    pub pipelines: Vec<Pipeline>,
    #[serde(skip)]
    pub origin: Origin,
    #[serde(skip)]
    pub errors: ConfigErrors,
}

impl PipelineGroup {
    pub fn new(name: impl Into<Name>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn find_pipeline(&self, name: &Name) -> Option<&Pipeline> {
        self.pipelines.iter().find(|pipeline| pipeline.name == *name)
    }

    /// True when an authorization block is present and grants anything.
    pub fn has_authorization(&self) -> bool {
        self.authorization.as_ref().is_some_and(|auth| !auth.is_empty())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct Environment {
    pub name: Name,
    pub pipelines: Vec<Name>,
    pub agents: Vec<String>,
    pub variables: Vec<EnvironmentVariable>,
    #[serde(skip)]
    pub origin: Origin,
    #[serde(skip)]
    pub errors: ConfigErrors,
}

impl Environment {
    pub fn new(name: impl Into<Name>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

// --- ROOT SOURCES ---

/// The configuration of one origin: the local file, or the root of a `Basic` graph.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct BasicConfig {
    pub security: Security,
    pub config_repos: Vec<ConfigRepo>,
    pub package_repositories: Vec<PackageRepository>,
    pub scms: Vec<Scm>,
    pub templates: Vec<Template>,
    pub groups: Vec<PipelineGroup>,
    pub environments: Vec<Environment>,
}

/// A single-origin fragment produced by parsing one config repository.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct PartialConfig {
    #[serde(skip)]
    pub origin: Origin,
    pub groups: Vec<PipelineGroup>,
    pub environments: Vec<Environment>,
    pub templates: Vec<Template>,
    pub scms: Vec<Scm>,
}

impl PartialConfig {
    pub fn new(origin: Origin) -> Self {
        Self {
            origin,
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
            && self.environments.is_empty()
            && self.templates.is_empty()
            && self.scms.is_empty()
    }
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_name_ignores_case_for_equality_and_hashing() {
        let mut seen = HashSet::new();
        seen.insert(Name::from("Build-Linux"));

        assert!(seen.contains(&Name::from("build-linux")));
        assert_eq!(Name::from("ABC"), "abc");
        assert_eq!(Name::from("Mixed").to_string(), "Mixed");
    }

    #[test]
    fn test_origin_display_names() {
        let remote = Origin::config_repo("repo1", "http://some.git", "1234fed");

        assert_eq!(remote.to_string(), "http://some.git at 1234fed");
        assert_eq!(Origin::File.to_string(), LOCAL_CONFIG_DISPLAY_NAME);
        assert_eq!(Origin::UiPlaceholder.to_string(), "UI");
        assert!(!remote.is_local());
        assert!(Origin::UiPlaceholder.is_local());
    }

    #[test]
    fn test_dependency_targets_skip_scm_materials() {
        let mut pipeline = Pipeline::new("down");
        pipeline.materials.push(Material::git("http://example.com/repo.git"));
        pipeline.materials.push(Material::dependency("up", "build"));

        let targets: Vec<_> = pipeline.dependency_targets().collect();

        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].0, &Name::from("UP"));
    }
}
