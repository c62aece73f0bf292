// src/constants.rs

/// Display name used for fragments that come from the local configuration file.
pub const LOCAL_CONFIG_DISPLAY_NAME: &str = "pipelines.toml";

/// Display name used for placeholder fragments created so that UI edits have a home.
pub const UI_ORIGIN_DISPLAY_NAME: &str = "UI";

/// Maximum length of any entity name.
pub const MAX_NAME_LENGTH: usize = 255;

/// Field on a materials collection that carries collection-wide errors (cycles, dangling upstreams).
pub const MATERIALS_BASE_FIELD: &str = "base";

/// Valid values for a pipeline's lock behavior.
pub const LOCK_ON_FAILURE: &str = "lockOnFailure";
pub const UNLOCK_WHEN_FINISHED: &str = "unlockWhenFinished";
pub const LOCK_NONE: &str = "none";
pub const VALID_LOCK_VALUES: [&str; 3] = [LOCK_ON_FAILURE, UNLOCK_WHEN_FINISHED, LOCK_NONE];

/// Label template used when a pipeline does not declare one.
pub const DEFAULT_LABEL_TEMPLATE: &str = "${COUNT}";

// --- FIELD NAMES ---
// Keys under which validation messages are recorded on an entity.

pub const FIELD_NAME: &str = "name";
pub const FIELD_GROUP: &str = "group";
pub const FIELD_PIPELINE: &str = "pipeline";
pub const FIELD_STAGES: &str = "stages";
pub const FIELD_TEMPLATE: &str = "template";
pub const FIELD_LABEL_TEMPLATE: &str = "labelTemplate";
pub const FIELD_LOCK_BEHAVIOR: &str = "lockBehavior";
pub const FIELD_TIMER: &str = "timer";
pub const FIELD_JOBS: &str = "jobs";
pub const FIELD_TASKS: &str = "tasks";
pub const FIELD_RESOURCES: &str = "resources";
pub const FIELD_TIMEOUT: &str = "timeout";
pub const FIELD_RUN_TYPE: &str = "runType";
pub const FIELD_URL: &str = "url";
pub const FIELD_STAGE: &str = "stage";
pub const FIELD_JOB: &str = "job";
pub const FIELD_PIPELINE_NAME: &str = "pipelineName";
pub const FIELD_STAGE_NAME: &str = "stageName";
pub const FIELD_MATERIAL_NAME: &str = "materialName";
pub const FIELD_AUTO_UPDATE: &str = "autoUpdate";
pub const FIELD_DESTINATION: &str = "destination";
pub const FIELD_PACKAGE_ID: &str = "packageId";
pub const FIELD_SCM_ID: &str = "scmId";
pub const FIELD_PLUGIN_ID: &str = "pluginId";
pub const FIELD_COMMAND: &str = "command";
pub const FIELD_ON_CANCEL: &str = "onCancelConfig";
pub const FIELD_VALUE: &str = "value";
pub const FIELD_ENCRYPTED_VALUE: &str = "encryptedValue";
pub const FIELD_ROLES: &str = "roles";
pub const FIELD_AUTHORIZATION: &str = "authorization";
pub const FIELD_ENVIRONMENT_PIPELINES: &str = "pipelines";
pub const FIELD_ENVIRONMENT_AGENTS: &str = "agents";
pub const FIELD_CONSISTENT_VARIABLES: &str = "variables";
pub const FIELD_MATERIALS: &str = "materials";
pub const FIELD_KEY: &str = "key";
pub const FIELD_ID: &str = "id";
pub const FIELD_APPROVAL: &str = "approval";
pub const FIELD_RUN_INSTANCE_COUNT: &str = "runInstanceCount";
