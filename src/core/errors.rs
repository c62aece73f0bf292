// src/core/errors.rs

//! # Errors
//!
//! Two kinds of failure live here. `ConfigErrors` is the per-entity bag of user-facing
//! validation messages: it is never returned as an `Err`, only recorded on the entity that
//! owns it. `ConfigError` is the crate's `thiserror` enum for caller bugs and invariant
//! violations, returned through `ConfigResult`.

use crate::core::validator::ValidationReport;
use serde::ser::{Serialize, SerializeMap, Serializer};
use thiserror::Error;

/// Messages recorded against the fields of a single configuration entity.
///
/// Field order and message order follow insertion. Adding a message that is already present on
/// the same field is a no-op.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigErrors {
    fields: Vec<(String, Vec<String>)>,
}

impl ConfigErrors {
    /// Creates an empty error bag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `message` against `field`.
    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        let message = message.into();
        match self.fields.iter_mut().find(|(name, _)| name == field) {
            Some((_, messages)) => {
                if !messages.contains(&message) {
                    messages.push(message);
                }
            }
            None => self.fields.push((field.to_string(), vec![message])),
        }
    }

    /// Copies every message of `other` into this bag.
    pub fn add_all(&mut self, other: &Self) {
        for (field, messages) in &other.fields {
            for message in messages {
                self.add(field, message.clone());
            }
        }
    }

    /// The first message recorded on `field`, if any.
    pub fn on(&self, field: &str) -> Option<&str> {
        self.all_on(field).first().map(String::as_str)
    }

    /// Every message recorded on `field`.
    pub fn all_on(&self, field: &str) -> &[String] {
        self.fields
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, messages)| messages.as_slice())
            .unwrap_or_default()
    }

    /// True when `message` is recorded on any field.
    pub fn contains(&self, message: &str) -> bool {
        self.messages().any(|m| m == message)
    }

    /// Iterates every message, field by field.
    pub fn messages(&self) -> impl Iterator<Item = &str> + '_ {
        self.fields
            .iter()
            .flat_map(|(_, messages)| messages.iter().map(String::as_str))
    }

    /// Iterates `(field, messages)` pairs in insertion order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &[String])> + '_ {
        self.fields
            .iter()
            .map(|(field, messages)| (field.as_str(), messages.as_slice()))
    }

    pub fn first_error(&self) -> Option<&str> {
        self.messages().next()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Total number of messages across all fields.
    pub fn len(&self) -> usize {
        self.fields.iter().map(|(_, messages)| messages.len()).sum()
    }

    pub fn clear(&mut self) {
        self.fields.clear();
    }
}

impl Serialize for ConfigErrors {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (field, messages) in &self.fields {
            map.serialize_entry(field, messages)?;
        }
        map.end()
    }
}

/// Caller bugs and invariant violations raised by the configuration graph.
///
/// These are not user-fixable configuration problems; those are recorded as `ConfigErrors`.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ConfigError {
    /// A write was routed to a fragment whose origin forbids local edits.
    #[error("Cannot edit '{name}': it is defined in {origin}, which is not editable.")]
    NotEditable {
        /// Name of the entity that was targeted.
        name: String,
        /// Display name of the forbidding origin.
        origin: String,
    },
    /// A merge view has no File or UI part to receive a write.
    #[error("No editable configuration sources for '{name}'.")]
    NoEditablePart {
        /// Name of the group or environment.
        name: String,
    },
    /// `merge` was called on a graph that already contains partials.
    #[error("Cannot merge partials into an already merged configuration.")]
    AlreadyMerged,
    /// A query required at least one pipeline group.
    #[error("No pipeline group defined yet!")]
    NoPipelineGroups,
    #[error("Pipeline '{name}' not found.")]
    PipelineNotFound { name: String },
    #[error("Stage '{stage}' not found in pipeline '{pipeline}'.")]
    StageNotFound { pipeline: String, stage: String },
    #[error("Job '{job}' not found in pipeline '{pipeline}' stage '{stage}'.")]
    JobNotFound {
        pipeline: String,
        stage: String,
        job: String,
    },
    #[error("Pipeline group '{name}' not found.")]
    GroupNotFound { name: String },
    #[error("Template '{name}' was not found.")]
    TemplateNotFound { name: String },
    #[error("Environment '{name}' not found.")]
    EnvironmentNotFound { name: String },
    /// The TOML text of a configuration source could not be parsed.
    #[error("Error parsing configuration TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    /// A configuration could not be serialized back to TOML.
    #[error("Failed to serialize configuration to TOML: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
    #[error("Failed to serialize to JSON: {0}")]
    Json(#[from] serde_json::Error),
    /// A publish was rejected because validation found problems.
    #[error("Configuration is invalid: {} error(s) found.", report.error_count())]
    Invalid {
        /// The full set of problems found by the rejected validation pass.
        report: Box<ValidationReport>,
    },
}

/// Result alias used by every fallible API of the crate.
pub type ConfigResult<T> = Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_keeps_insertion_order_and_ignores_duplicates() {
        let mut errors = ConfigErrors::new();
        errors.add("name", "first");
        errors.add("stages", "second");
        errors.add("name", "third");
        errors.add("name", "first");

        assert_eq!(errors.len(), 3);
        assert_eq!(errors.all_on("name"), ["first".to_string(), "third".to_string()]);
        assert_eq!(errors.on("stages"), Some("second"));
        assert_eq!(errors.first_error(), Some("first"));
        assert!(errors.on("missing").is_none());
    }

    #[test]
    fn test_serializes_as_field_map() {
        let mut errors = ConfigErrors::new();
        errors.add("name", "bad name");

        let json = serde_json::to_string(&errors).unwrap();

        assert_eq!(json, r#"{"name":["bad name"]}"#);
    }

    #[test]
    fn test_clear_removes_everything() {
        let mut errors = ConfigErrors::new();
        errors.add("name", "bad name");
        errors.clear();
        assert!(errors.is_empty());
        assert_eq!(errors.len(), 0);
    }
}
