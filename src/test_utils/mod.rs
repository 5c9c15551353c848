//! Test utilities for signing tests
//!
//! Key generation is not part of the crate's surface; these helpers exist so
//! tests can build passphrase-protected key rings without fixture files.

#![cfg(test)]

pub mod pgp_test_keys;

pub use pgp_test_keys::*;
