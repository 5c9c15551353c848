//! Cryptographic building blocks: the OpenPGP engine, the settings-store
//! cipher and stream utilities.

pub mod pgp;
pub mod settings_cipher;
pub mod utils;
