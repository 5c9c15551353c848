//! Session configuration and fail-fast validation.

use crate::core::credentials::CredentialResolver;
use crate::crypto::pgp::{DigestAlgorithm, SecurePassphrase};
use crate::error::{Result, SignerError};
use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Raw session inputs, as read from a TOML file or assembled from flags.
///
/// Nothing here is trusted until [`SessionConfig::validate`] accepts it.
#[derive(Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct SessionConfig {
    /// Key ring text (armored) given inline.
    pub rings: Option<String>,
    pub secret_keyring: Option<PathBuf>,
    pub passphrase: Option<SecurePassphrase>,
    /// Server entry in the settings store that holds the passphrase.
    pub passphrase_server_id: Option<String>,
    pub user_id: Option<String>,
    pub digest: Option<DigestAlgorithm>,
    /// Settings store used to resolve `passphrase-server-id`.
    pub settings: Option<PathBuf>,
}

/// Where the secret key ring comes from.
#[derive(Clone)]
pub enum KeyRingSource {
    Inline(String),
    File(PathBuf),
}

/// Where the passphrase comes from.
#[derive(Clone, Debug)]
pub enum PassphraseSource {
    Explicit(SecurePassphrase),
    Credential { server_id: String },
}

/// A configuration that passed validation.
#[derive(Clone, Debug)]
pub struct ValidatedSession {
    pub keyring: KeyRingSource,
    pub passphrase: PassphraseSource,
    pub user_id: String,
    pub digest: DigestAlgorithm,
    pub settings: Option<PathBuf>,
}

impl SessionConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text)
            .map_err(|e| SignerError::Configuration(format!("invalid session config: {}", e)))
    }

    /// Load a TOML config file. Relative paths inside it resolve against
    /// the file's directory.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| {
            SignerError::io(format!("reading config file {}", path.display()), e)
        })?;
        let mut config = Self::from_toml_str(&text)?;

        if let Some(base) = path.parent() {
            config.secret_keyring = config.secret_keyring.map(|p| base.join(p));
            config.settings = config.settings.map(|p| base.join(p));
        }
        log::debug!("Loaded session config from {}", path.display());
        Ok(config)
    }

    /// Overlay `overrides` on top of `self`, field by field.
    pub fn merge(self, overrides: SessionConfig) -> SessionConfig {
        SessionConfig {
            rings: overrides.rings.or(self.rings),
            secret_keyring: overrides.secret_keyring.or(self.secret_keyring),
            passphrase: overrides.passphrase.or(self.passphrase),
            passphrase_server_id: overrides.passphrase_server_id.or(self.passphrase_server_id),
            user_id: overrides.user_id.or(self.user_id),
            digest: overrides.digest.or(self.digest),
            settings: overrides.settings.or(self.settings),
        }
    }

    /// Enforce the exclusivity rules: exactly one key ring source, exactly
    /// one passphrase source, and a non-empty user id.
    pub fn validate(self) -> Result<ValidatedSession> {
        let keyring = match (self.rings, self.secret_keyring) {
            (Some(_), Some(_)) => {
                return Err(SignerError::Configuration(
                    "'rings' and 'secret-keyring' are mutually exclusive".to_string(),
                ))
            }
            (Some(rings), None) => KeyRingSource::Inline(rings),
            (None, Some(path)) => KeyRingSource::File(path),
            (None, None) => {
                return Err(SignerError::Configuration(
                    "'rings' or 'secret-keyring' property is missing".to_string(),
                ))
            }
        };

        let passphrase = match (self.passphrase, self.passphrase_server_id) {
            (Some(_), Some(_)) => {
                return Err(SignerError::Configuration(
                    "'passphrase' and 'passphrase-server-id' are mutually exclusive".to_string(),
                ))
            }
            (Some(passphrase), None) => PassphraseSource::Explicit(passphrase),
            (None, Some(server_id)) => PassphraseSource::Credential { server_id },
            (None, None) => {
                return Err(SignerError::Configuration(
                    "'passphrase' or 'passphrase-server-id' property is missing".to_string(),
                ))
            }
        };

        let user_id = match self.user_id {
            Some(user_id) if !user_id.is_empty() => user_id,
            _ => {
                return Err(SignerError::Configuration(
                    "'user-id' property is missing".to_string(),
                ))
            }
        };

        Ok(ValidatedSession {
            keyring,
            passphrase,
            user_id,
            digest: self.digest.unwrap_or_default(),
            settings: self.settings,
        })
    }
}

impl KeyRingSource {
    pub fn read(&self) -> Result<Vec<u8>> {
        match self {
            KeyRingSource::Inline(rings) => Ok(rings.as_bytes().to_vec()),
            KeyRingSource::File(path) => fs::read(path).map_err(|e| {
                SignerError::io(format!("reading keyring file {}", path.display()), e)
            }),
        }
    }
}

impl PassphraseSource {
    pub fn resolve(&self, resolver: Option<&dyn CredentialResolver>) -> Result<SecurePassphrase> {
        match self {
            PassphraseSource::Explicit(passphrase) => Ok(passphrase.clone()),
            PassphraseSource::Credential { server_id } => match resolver {
                Some(resolver) => resolver.resolve(server_id),
                None => Err(SignerError::Configuration(format!(
                    "passphrase server {:?} requires a settings store",
                    server_id
                ))),
            },
        }
    }
}

impl fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionConfig")
            .field("rings", &self.rings.as_ref().map(|r| format!("<{} bytes>", r.len())))
            .field("secret_keyring", &self.secret_keyring)
            .field("passphrase", &self.passphrase)
            .field("passphrase_server_id", &self.passphrase_server_id)
            .field("user_id", &self.user_id)
            .field("digest", &self.digest)
            .field("settings", &self.settings)
            .finish()
    }
}

impl fmt::Debug for KeyRingSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyRingSource::Inline(rings) => write!(f, "Inline(<{} bytes>)", rings.len()),
            KeyRingSource::File(path) => f.debug_tuple("File").field(path).finish(),
        }
    }
}
