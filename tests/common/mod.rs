//! Common test setup and utilities for integration tests
//!
//! Keys are generated once per test; generation is fast for Ed25519. RSA
//! keys are generated only by the tests that need a SHA-1 capable key.

#![allow(dead_code)]

use anyhow::Result;
use artifact_signer::{SessionConfig, SecurePassphrase};
use pgp::composed::{KeyType, SecretKeyParamsBuilder, SignedSecretKey, SubkeyParamsBuilder};
use pgp::ser::Serialize as PgpSerialize;
use pgp::types::Password;
use rand::thread_rng;
use std::fs;
use std::path::{Path, PathBuf};

pub const PASSPHRASE: &str = "latrommI";
pub const USER_ID: &str = "Release Engineering <release@example.com>";

/// Initialize test logging (safe to call from every test)
pub fn init_test_logging() {
    let _ = env_logger::Builder::from_default_env()
        .is_test(true)
        .filter(None, log::LevelFilter::Debug)
        .try_init();
}

/// Ed25519 primary key plus a signing subkey, protected by `passphrase`.
pub fn generate_key(user_id: &str, passphrase: &str) -> Result<SignedSecretKey> {
    let mut signkey = SubkeyParamsBuilder::default();
    signkey
        .key_type(KeyType::Ed25519Legacy)
        .can_sign(true)
        .can_encrypt(false)
        .can_authenticate(false)
        .passphrase(Some(passphrase.to_string()));

    let mut key_params = SecretKeyParamsBuilder::default();
    key_params
        .key_type(KeyType::Ed25519Legacy)
        .can_certify(true)
        .can_sign(true)
        .can_encrypt(false)
        .primary_user_id(user_id.into())
        .passphrase(Some(passphrase.to_string()))
        .subkeys(vec![signkey.build()?]);

    let secret_key = key_params.build()?.generate(thread_rng())?;
    Ok(secret_key.sign(&mut thread_rng(), &Password::from(passphrase))?)
}

/// 2048-bit RSA primary key without subkeys, protected by `passphrase`.
pub fn generate_rsa_key(user_id: &str, passphrase: &str) -> Result<SignedSecretKey> {
    let mut key_params = SecretKeyParamsBuilder::default();
    key_params
        .key_type(KeyType::Rsa(2048))
        .can_certify(true)
        .can_sign(true)
        .can_encrypt(false)
        .primary_user_id(user_id.into())
        .passphrase(Some(passphrase.to_string()));

    let secret_key = key_params.build()?.generate(thread_rng())?;
    Ok(secret_key.sign(&mut thread_rng(), &Password::from(passphrase))?)
}

/// Temporary directory holding a key ring and the files under test
pub struct TestContext {
    pub dir: tempfile::TempDir,
    pub key: SignedSecretKey,
}

impl TestContext {
    pub fn new() -> Result<Self> {
        init_test_logging();
        Ok(Self {
            dir: tempfile::tempdir()?,
            key: generate_key(USER_ID, PASSPHRASE)?,
        })
    }

    /// Same layout, signing with an RSA key.
    pub fn with_rsa_key() -> Result<Self> {
        init_test_logging();
        Ok(Self {
            dir: tempfile::tempdir()?,
            key: generate_rsa_key(USER_ID, PASSPHRASE)?,
        })
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    pub fn write(&self, name: &str, contents: &[u8]) -> Result<PathBuf> {
        let path = self.path(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, contents)?;
        Ok(path)
    }

    /// Binary secret key ring file.
    pub fn write_keyring(&self) -> Result<PathBuf> {
        let bytes = PgpSerialize::to_bytes(&self.key)?;
        self.write("secring.gpg", &bytes)
    }

    /// Armored public key file.
    pub fn write_public_key(&self) -> Result<PathBuf> {
        let public = pgp::composed::SignedPublicKey::from(self.key.clone());
        let armored = public.to_armored_string(Default::default())?;
        self.write("pubring.asc", armored.as_bytes())
    }

    /// Config with the key ring file, passphrase and user id filled in.
    pub fn session_config(&self) -> Result<SessionConfig> {
        Ok(SessionConfig {
            secret_keyring: Some(self.write_keyring()?),
            passphrase: Some(SecurePassphrase::new(PASSPHRASE.to_string())),
            user_id: Some("release@example.com".to_string()),
            ..Default::default()
        })
    }
}

pub fn read(path: &Path) -> Result<Vec<u8>> {
    Ok(fs::read(path)?)
}
