// src/core/capabilities.rs

//! Outbound capabilities the graph consumes but does not own: secret encryption, cron checking
//! and plugin metadata. Callers inject real implementations through `Services`; the defaults here
//! are enough for tooling and tests.

use std::fmt;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CipherError {
    /// The cipher text is not something this cipher could have produced.
    #[error("Malformed cipher text: {0}")]
    Malformed(String),
    /// The cipher failed for a reason unrelated to its input.
    #[error("Unexpected cipher failure: {0}")]
    Unexpected(String),
}

pub trait SecretCipher: Send + Sync {
    fn encrypt(&self, plain_text: &str) -> Result<String, CipherError>;
    fn decrypt(&self, cipher_text: &str) -> Result<String, CipherError>;
}

pub trait CronValidator: Send + Sync {
    fn is_valid(&self, spec: &str) -> bool;
}

pub trait SecureMetadata: Send + Sync {
    /// Whether `key` of the plugin `plugin_id` holds a secret.
    fn has_secure_metadata(&self, plugin_id: &str, key: &str) -> bool;
}

// --- DEFAULT IMPLEMENTATIONS ---

const HEX_CIPHER_PREFIX: &str = "AES:";

/// Reversible hex encoding behind a fixed prefix. It hides nothing; it exists so that secure
/// variables round-trip without a key store.
#[derive(Debug, Default, Clone, Copy)]
pub struct HexCipher;

impl SecretCipher for HexCipher {
    fn encrypt(&self, plain_text: &str) -> Result<String, CipherError> {
        Ok(format!("{HEX_CIPHER_PREFIX}{}", hex::encode(plain_text)))
    }

    fn decrypt(&self, cipher_text: &str) -> Result<String, CipherError> {
        let encoded = cipher_text
            .strip_prefix(HEX_CIPHER_PREFIX)
            .ok_or_else(|| CipherError::Malformed("missing cipher prefix".to_string()))?;
        let bytes = hex::decode(encoded).map_err(|e| CipherError::Malformed(e.to_string()))?;
        String::from_utf8(bytes).map_err(|e| CipherError::Malformed(e.to_string()))
    }
}

/// Accepts Quartz-style cron specs: six or seven whitespace-separated fields drawn from the
/// characters Quartz allows.
#[derive(Debug, Default, Clone, Copy)]
pub struct QuartzCronValidator;

impl CronValidator for QuartzCronValidator {
    fn is_valid(&self, spec: &str) -> bool {
        let fields: Vec<&str> = spec.split_whitespace().collect();
        if !(6..=7).contains(&fields.len()) {
            return false;
        }
        fields.iter().all(|field| {
            field
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || ",-*/?#".contains(c))
        })
    }
}

/// Treats every plugin property as non-secure.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoSecureMetadata;

impl SecureMetadata for NoSecureMetadata {
    fn has_secure_metadata(&self, _plugin_id: &str, _key: &str) -> bool {
        false
    }
}

/// The bundle of capabilities handed to validation.
#[derive(Clone)]
pub struct Services {
    pub cipher: Arc<dyn SecretCipher>,
    pub cron: Arc<dyn CronValidator>,
    pub secure_metadata: Arc<dyn SecureMetadata>,
}

impl Default for Services {
    fn default() -> Self {
        Self {
            cipher: Arc::new(HexCipher),
            cron: Arc::new(QuartzCronValidator),
            secure_metadata: Arc::new(NoSecureMetadata),
        }
    }
}

impl Services {
    pub fn with_cipher(mut self, cipher: Arc<dyn SecretCipher>) -> Self {
        self.cipher = cipher;
        self
    }

    pub fn with_secure_metadata(mut self, secure_metadata: Arc<dyn SecureMetadata>) -> Self {
        self.secure_metadata = secure_metadata;
        self
    }
}

impl fmt::Debug for Services {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Services").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_cipher_round_trip_and_malformed_input() {
        let cipher = HexCipher;

        let encrypted = cipher.encrypt("s3cret").unwrap();

        assert!(encrypted.starts_with(HEX_CIPHER_PREFIX));
        assert_eq!(cipher.decrypt(&encrypted).unwrap(), "s3cret");
        assert!(matches!(cipher.decrypt("plain"), Err(CipherError::Malformed(_))));
        assert!(matches!(cipher.decrypt("AES:zz"), Err(CipherError::Malformed(_))));
    }

    #[test]
    fn test_quartz_cron_field_count() {
        let cron = QuartzCronValidator;
        assert!(cron.is_valid("0 0 22 ? * MON-FRI"));
        assert!(cron.is_valid("0 15 10 * * ? 2030"));
        assert!(!cron.is_valid("* * * * *"));
        assert!(!cron.is_valid("0 0 22 ? * MON-FRI; rm"));
    }
}
