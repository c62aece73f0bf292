// src/core/config_loader.rs

//! # Config loader
//!
//! Turns TOML text into configuration sources and back. Reading the text from disk or from a
//! config repository is the caller's business; this module only parses and serializes.
//!
//! Package repositories, package definitions and SCMs declared without an `id` are given a fresh
//! v4 UUID while loading, so that materials can refer to them once they are saved.

use crate::core::errors::ConfigResult;
use crate::models::{BasicConfig, Origin, PackageRepository, PartialConfig, Scm};
use log::debug;
use uuid::Uuid;

impl BasicConfig {
    /// Parses the local configuration file.
    pub fn from_toml_str(text: &str) -> ConfigResult<Self> {
        let mut config: Self = toml::from_str(text)?;
        let assigned = assign_missing_ids(&mut config.package_repositories, &mut config.scms);
        debug!(
            "Parsed local configuration: {} group(s), {} template(s), {} generated id(s)",
            config.groups.len(),
            config.templates.len(),
            assigned
        );
        Ok(config)
    }

    /// Serializes the configuration back to TOML. Validation errors and origins are never written.
    pub fn to_toml_string(&self) -> ConfigResult<String> {
        Ok(toml::to_string(self)?)
    }
}

impl PartialConfig {
    /// Parses one remote fragment and tags it with `origin`.
    pub fn from_toml_str(origin: Origin, text: &str) -> ConfigResult<Self> {
        let mut partial: Self = toml::from_str(text)?;
        let assigned = assign_missing_ids(&mut [], &mut partial.scms);
        debug!(
            "Parsed partial from {origin}: {} group(s), {} environment(s), {} generated id(s)",
            partial.groups.len(),
            partial.environments.len(),
            assigned
        );
        partial.origin = origin;
        Ok(partial)
    }
}

fn fresh_id() -> String {
    Uuid::new_v4().to_string()
}

fn assign_missing_ids(repositories: &mut [PackageRepository], scms: &mut [Scm]) -> usize {
    let mut assigned = 0;
    for repository in repositories.iter_mut() {
        if repository.id.trim().is_empty() {
            repository.id = fresh_id();
            assigned += 1;
        }
        for package in &mut repository.packages {
            if package.id.trim().is_empty() {
                package.id = fresh_id();
                assigned += 1;
            }
        }
    }
    for scm in scms.iter_mut() {
        if scm.id.trim().is_empty() {
            scm.id = fresh_id();
            assigned += 1;
        }
    }
    assigned
}
