//! Passphrase resolution from a build settings store.

use crate::crypto::pgp::SecurePassphrase;
use crate::crypto::settings_cipher::{self, MASTER_PASSWORD_KEY};
use crate::error::{Result, SignerError};
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// Supplies a plaintext passphrase for an identifier.
pub trait CredentialResolver {
    /// Fails with [`SignerError::CredentialNotFound`] when `id` is unknown or
    /// has no passphrase, and [`SignerError::DecryptionFailed`] when the
    /// stored value cannot be decrypted.
    fn resolve(&self, id: &str) -> Result<SecurePassphrase>;
}

#[derive(Deserialize)]
#[serde(rename_all = "kebab-case")]
struct SettingsFile {
    #[serde(default)]
    servers: Vec<ServerEntry>,
    security: Option<SecuritySection>,
}

#[derive(Deserialize)]
#[serde(rename_all = "kebab-case")]
struct ServerEntry {
    id: String,
    passphrase: Option<String>,
}

#[derive(Deserialize)]
struct SecuritySection {
    master: Option<String>,
}

/// Settings store with per-server passphrases.
///
/// ```toml
/// [security]
/// master = "{...}"        # encrypted with the fixed key "settings.security"
///
/// [[servers]]
/// id = "release-signing"
/// passphrase = "{...}"    # encrypted with the master password, or plaintext
/// ```
pub struct SettingsStore {
    servers: Vec<ServerEntry>,
    stored_master: Option<String>,
    master: Option<SecurePassphrase>,
}

impl SettingsStore {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let file: SettingsFile = toml::from_str(text)
            .map_err(|e| SignerError::Configuration(format!("invalid settings file: {}", e)))?;
        Ok(Self {
            servers: file.servers,
            stored_master: file.security.and_then(|security| security.master),
            master: None,
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| {
            SignerError::io(format!("reading settings file {}", path.display()), e)
        })?;
        let store = Self::from_toml_str(&text)?;
        log::debug!(
            "Loaded settings store {} ({} server entries)",
            path.display(),
            store.servers.len()
        );
        Ok(store)
    }

    /// Use `master` instead of the master password stored in the file.
    pub fn with_master_password(mut self, master: SecurePassphrase) -> Self {
        self.master = Some(master);
        self
    }

    fn master_password(&self) -> Result<SecurePassphrase> {
        if let Some(master) = &self.master {
            return Ok(master.clone());
        }
        let stored = self.stored_master.as_deref().ok_or_else(|| {
            SignerError::decryption("stored passphrase: no master password is configured")
        })?;
        let master = settings_cipher::decrypt(stored, MASTER_PASSWORD_KEY)?;
        Ok(SecurePassphrase::new(master.as_str().to_string()))
    }
}

impl CredentialResolver for SettingsStore {
    fn resolve(&self, id: &str) -> Result<SecurePassphrase> {
        let not_found = || SignerError::CredentialNotFound { id: id.to_string() };
        let server = self
            .servers
            .iter()
            .find(|server| server.id == id)
            .ok_or_else(not_found)?;
        let value = server.passphrase.as_deref().ok_or_else(not_found)?;

        match settings_cipher::encrypted_payload(value) {
            None => Ok(SecurePassphrase::new(value.to_string())),
            Some(payload) => {
                let master = self.master_password()?;
                let plain = settings_cipher::decrypt(payload, master.as_str()).map_err(|e| {
                    log::warn!("Unable to decode the passphrase of server {}", id);
                    e
                })?;
                Ok(SecurePassphrase::new(plain.as_str().to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with(passphrase_line: &str, master_line: &str) -> SettingsStore {
        let text = format!(
            "{}\n[[servers]]\nid = \"release\"\n{}\n\n[[servers]]\nid = \"empty\"\n",
            master_line, passphrase_line
        );
        SettingsStore::from_toml_str(&text).unwrap()
    }

    #[test]
    fn test_plaintext_passphrase() {
        let store = store_with("passphrase = \"latrommI\"", "");
        assert_eq!(store.resolve("release").unwrap().as_str(), "latrommI");
    }

    #[test]
    fn test_stored_master_decrypts_passphrase() {
        let master = settings_cipher::encrypt("master-secret", MASTER_PASSWORD_KEY).unwrap();
        let passphrase = settings_cipher::encrypt("latrommI", "master-secret").unwrap();
        let store = store_with(
            &format!("passphrase = \"{}\"", passphrase),
            &format!("[security]\nmaster = \"{}\"\n", master),
        );

        assert_eq!(store.resolve("release").unwrap().as_str(), "latrommI");
    }

    #[test]
    fn test_explicit_master_overrides_stored() {
        let passphrase = settings_cipher::encrypt("latrommI", "explicit-master").unwrap();
        let store = store_with(&format!("passphrase = \"{}\"", passphrase), "")
            .with_master_password(SecurePassphrase::new("explicit-master".to_string()));

        assert_eq!(store.resolve("release").unwrap().as_str(), "latrommI");
    }

    #[test]
    fn test_missing_entries_are_not_found() {
        let store = store_with("passphrase = \"latrommI\"", "");
        for id in ["unknown", "empty"] {
            let err = store.resolve(id).unwrap_err();
            assert!(
                matches!(err, SignerError::CredentialNotFound { id: ref got } if got == id),
                "{:?}",
                err
            );
        }
    }

    #[test]
    fn test_encrypted_without_master_fails() {
        let passphrase = settings_cipher::encrypt("latrommI", "master-secret").unwrap();
        let store = store_with(&format!("passphrase = \"{}\"", passphrase), "");

        let err = store.resolve("release").unwrap_err();
        assert!(matches!(err, SignerError::DecryptionFailed { .. }), "{:?}", err);
    }
}
