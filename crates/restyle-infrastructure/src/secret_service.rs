//! Secret (API key) loading.
//!
//! Keys are looked up in the environment first, then in the user's secret
//! file. Error messages never contain the key material itself.

use restyle_core::config::SecretConfig;
use restyle_core::error::{RestyleError, Result};
use std::path::{Path, PathBuf};

const API_KEY_ENV: &str = "GEMINI_API_KEY";

/// Loads secret configuration from the environment or a TOML file.
pub struct SecretStore {
    secret_path: PathBuf,
}

impl SecretStore {
    /// Creates a store reading `secrets.toml` under the given directory.
    pub fn new(base_dir: impl AsRef<Path>) -> Self {
        Self {
            secret_path: base_dir.as_ref().join("secrets.toml"),
        }
    }

    /// Creates a store at the default location (`~/.restyle/secrets.toml`).
    pub fn default_location() -> Result<Self> {
        let home_dir = dirs::home_dir()
            .ok_or_else(|| RestyleError::config("failed to get home directory"))?;
        Ok(Self::new(home_dir.join(".restyle")))
    }

    /// Loads the secret configuration.
    ///
    /// # Errors
    ///
    /// Returns a `Config` error (fatal, never retried) when no key can be
    /// found in either the environment or the secret file.
    pub fn load(&self) -> Result<SecretConfig> {
        if let Ok(key) = std::env::var(API_KEY_ENV) {
            if !key.trim().is_empty() {
                return Ok(SecretConfig {
                    gemini_api_key: key,
                });
            }
        }

        if self.secret_path.exists() {
            let content = std::fs::read_to_string(&self.secret_path).map_err(|err| {
                RestyleError::config(format!(
                    "failed to read secret file {}: {err}",
                    self.secret_path.display()
                ))
            })?;
            let config: SecretConfig = toml::from_str(&content)?;
            if !config.gemini_api_key.trim().is_empty() {
                return Ok(config);
            }
        }

        Err(RestyleError::config(format!(
            "no Gemini API key configured; set {API_KEY_ENV} or add gemini_api_key to {}",
            self.secret_path.display()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // The environment branch is left untested on purpose: mutating process
    // env in parallel tests races with everything else.

    #[test]
    fn loads_key_from_secret_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("secrets.toml"),
            "gemini_api_key = \"test-key\"\n",
        )
        .unwrap();

        let store = SecretStore::new(dir.path());
        if std::env::var(API_KEY_ENV).is_ok() {
            return; // ambient key would shadow the file
        }
        let config = store.load().unwrap();
        assert_eq!(config.gemini_api_key, "test-key");
    }

    #[test]
    fn missing_key_is_a_config_error_without_leaking_anything() {
        if std::env::var(API_KEY_ENV).is_ok() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let store = SecretStore::new(dir.path());
        let err = store.load().unwrap_err();
        assert!(err.is_config());
    }
}
