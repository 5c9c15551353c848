//! Artifact signer - OpenPGP detached signatures for build artifacts
//!
//! This crate loads secret key rings, creates and verifies armored detached
//! signatures, and signs every output of a build described by a manifest.

pub mod cli;
pub mod core;
pub mod crypto;
pub mod error;

#[cfg(test)]
pub mod test_utils;

// Re-export commonly used items for convenience
pub use crate::core::config::{SessionConfig, ValidatedSession};
pub use crate::core::credentials::{CredentialResolver, SettingsStore};
pub use crate::core::session::SigningSession;
pub use crypto::pgp::{
    DetachedSignature, DigestAlgorithm, KeyRingCollection, SecretKey, SecurePassphrase,
    SignatureEngine,
};
pub use error::{Result, SignerError};
