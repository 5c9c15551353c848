//! PGP cryptographic operations.
//!
//! This module handles:
//! - Loading secret key rings and finding a signing key by user id
//! - Passphrase handling for key unlock
//! - Creating and verifying detached signatures

pub mod keyring;
pub mod passphrase;
pub mod signing;

pub use keyring::{load_public_key, KeyRing, KeyRingCollection, SecretKey};
pub use passphrase::SecurePassphrase;
pub use signing::{DetachedSignature, DigestAlgorithm, SignatureEngine};
