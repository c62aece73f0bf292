// src/core/secure.rs

//! Secret handling around validation.
//!
//! Before rules run, secure variables and secure plugin properties that still hold plain text are
//! encrypted in place through the injected [`SecretCipher`]. During validation, every stored cipher
//! text is test-decrypted; cipher failures become field errors on the owning entity instead of
//! aborting the pass.

use crate::constants::{FIELD_ENCRYPTED_VALUE, FIELD_VALUE};
use crate::core::capabilities::{CipherError, SecretCipher, Services};
use crate::core::errors::ConfigErrors;
use crate::core::graph::ConfigGraph;
use crate::core::walker::{self, NodeMut};
use crate::models::{ConfigProperty, EnvironmentVariable, TaskKind};
use log::{debug, warn};

/// Encrypts plain text held by secure variables and by properties the plugin marks as secure.
pub fn encrypt_plaintext_secrets(graph: &mut ConfigGraph, services: &Services) {
    let cipher = services.cipher.as_ref();
    let metadata = services.secure_metadata.as_ref();
    let mut encrypted = 0usize;

    walker::for_each_mut(graph, |node| match node {
        NodeMut::Variable(variable) => {
            encrypted += usize::from(encrypt_variable(variable, cipher));
        }
        NodeMut::Scm(scm) => {
            for property in &mut scm.configuration {
                if metadata.has_secure_metadata(&scm.plugin_id, &property.key) {
                    encrypted += usize::from(encrypt_property(property, cipher));
                }
            }
        }
        NodeMut::PackageRepository(repository) => {
            let plugin_id = repository.plugin_id.as_str();
            let properties = repository
                .configuration
                .iter_mut()
                .chain(repository.packages.iter_mut().flat_map(|p| p.configuration.iter_mut()));
            for property in properties {
                if metadata.has_secure_metadata(plugin_id, &property.key) {
                    encrypted += usize::from(encrypt_property(property, cipher));
                }
            }
        }
        NodeMut::Task(task) => {
            if let TaskKind::Pluggable {
                plugin_id,
                configuration,
            } = &mut task.kind
            {
                for property in configuration.iter_mut() {
                    if metadata.has_secure_metadata(plugin_id, &property.key) {
                        encrypted += usize::from(encrypt_property(property, cipher));
                    }
                }
            }
        }
        _ => {}
    });

    if encrypted > 0 {
        debug!("Encrypted {encrypted} plain text secret(s)");
    }
}

fn encrypt_variable(variable: &mut EnvironmentVariable, cipher: &dyn SecretCipher) -> bool {
    if !variable.secure {
        return false;
    }
    let Some(plain) = variable.value.take() else {
        return false;
    };
    match cipher.encrypt(&plain) {
        Ok(cipher_text) => {
            variable.encrypted_value = Some(cipher_text);
            true
        }
        Err(e) => {
            warn!("Could not encrypt variable '{}': {e}", variable.name);
            variable.errors.add(
                FIELD_VALUE,
                format!(
                    "Failed to encrypt variable '{}'. Please check the log for more details.",
                    variable.name
                ),
            );
            false
        }
    }
}

fn encrypt_property(property: &mut ConfigProperty, cipher: &dyn SecretCipher) -> bool {
    if property.encrypted_value.is_some() {
        return false;
    }
    let Some(plain) = property.value.take() else {
        return false;
    };
    match cipher.encrypt(&plain) {
        Ok(cipher_text) => {
            property.encrypted_value = Some(cipher_text);
            true
        }
        Err(e) => {
            warn!("Could not encrypt property '{}': {e}", property.key);
            property.errors.add(
                FIELD_VALUE,
                format!(
                    "Failed to encrypt property '{}'. Please check the log for more details.",
                    property.key
                ),
            );
            false
        }
    }
}

// --- DECRYPTION CHECKS ---

pub fn check_variable(variable: &EnvironmentVariable, cipher: &dyn SecretCipher, errors: &mut ConfigErrors) {
    let Some(cipher_text) = variable.encrypted_value.as_deref() else {
        return;
    };
    match cipher.decrypt(cipher_text) {
        Ok(_) => {}
        Err(CipherError::Malformed(reason)) => {
            debug!("Cipher text of variable '{}' is malformed: {reason}", variable.name);
            errors.add(
                FIELD_ENCRYPTED_VALUE,
                format!(
                    "Encrypted value for variable named '{}' is invalid. This usually happens when the cipher text is modified to have an invalid value.",
                    variable.name
                ),
            );
        }
        Err(CipherError::Unexpected(reason)) => {
            warn!("Failed to decrypt variable '{}': {reason}", variable.name);
            errors.add(
                FIELD_ENCRYPTED_VALUE,
                format!(
                    "Failed to decrypt variable '{}'. Please check the log for more details.",
                    variable.name
                ),
            );
        }
    }
}

pub fn check_property(property: &ConfigProperty, cipher: &dyn SecretCipher, errors: &mut ConfigErrors) {
    let Some(cipher_text) = property.encrypted_value.as_deref() else {
        return;
    };
    match cipher.decrypt(cipher_text) {
        Ok(_) => {}
        Err(CipherError::Malformed(_)) => errors.add(
            FIELD_ENCRYPTED_VALUE,
            format!(
                "Encrypted value for property with key '{}' is invalid. This usually happens when the cipher text is modified to have an invalid value.",
                property.key
            ),
        ),
        Err(CipherError::Unexpected(reason)) => {
            warn!("Failed to decrypt property '{}': {reason}", property.key);
            errors.add(
                FIELD_ENCRYPTED_VALUE,
                format!(
                    "Failed to decrypt property '{}'. Please check the log for more details.",
                    property.key
                ),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::capabilities::{HexCipher, SecureMetadata};
    use crate::models::{Environment, Scm};
    use std::sync::Arc;

    struct Failing;

    impl SecretCipher for Failing {
        fn encrypt(&self, _plain_text: &str) -> Result<String, CipherError> {
            Err(CipherError::Unexpected("key store offline".to_string()))
        }

        fn decrypt(&self, _cipher_text: &str) -> Result<String, CipherError> {
            Err(CipherError::Unexpected("key store offline".to_string()))
        }
    }

    struct PasswordsAreSecret;

    impl SecureMetadata for PasswordsAreSecret {
        fn has_secure_metadata(&self, _plugin_id: &str, key: &str) -> bool {
            key == "password"
        }
    }

    #[test]
    fn test_secure_plain_text_is_encrypted() {
        // --- Setup ---
        let mut graph = ConfigGraph::default();
        let mut environment = Environment::new("prod");
        environment.variables.push(EnvironmentVariable::secure("TOKEN", "s3cret"));
        environment.variables.push(EnvironmentVariable::plain("MODE", "fast"));
        graph.add_environment(environment);
        let mut scm = Scm {
            id: "scm-1".to_string(),
            plugin_id: "github.pr".to_string(),
            ..Scm::default()
        };
        scm.configuration.push(ConfigProperty::new("password", "hunter2"));
        scm.configuration.push(ConfigProperty::new("url", "https://example.com"));
        graph.main.scms.push(scm);
        let services = Services::default().with_secure_metadata(Arc::new(PasswordsAreSecret));

        // --- Execute ---
        encrypt_plaintext_secrets(&mut graph, &services);

        // --- Assert ---
        let variables = graph.find_environment("prod").unwrap().variables();
        assert_eq!(variables[0].value, None);
        assert_eq!(
            HexCipher.decrypt(variables[0].encrypted_value.as_deref().unwrap()).unwrap(),
            "s3cret"
        );
        assert_eq!(variables[1].value.as_deref(), Some("fast"));

        let scm = graph.find_scm("scm-1").unwrap();
        assert!(scm.configuration[0].encrypted_value.is_some());
        assert_eq!(scm.configuration[1].value.as_deref(), Some("https://example.com"));
    }

    #[test]
    fn test_decrypt_failures_become_field_errors() {
        // --- Setup ---
        let tampered = EnvironmentVariable::encrypted("TOKEN", "not-cipher-text");
        let mut malformed = ConfigErrors::new();
        let mut unexpected = ConfigErrors::new();

        // --- Execute ---
        check_variable(&tampered, &HexCipher, &mut malformed);
        check_variable(&tampered, &Failing, &mut unexpected);

        // --- Assert ---
        assert!(malformed
            .on(FIELD_ENCRYPTED_VALUE)
            .unwrap()
            .starts_with("Encrypted value for variable named 'TOKEN' is invalid."));
        assert_eq!(
            unexpected.on(FIELD_ENCRYPTED_VALUE),
            Some("Failed to decrypt variable 'TOKEN'. Please check the log for more details.")
        );
    }
}
