//! PGP key generation utilities for testing

use pgp::composed::{KeyType, SecretKeyParamsBuilder, SignedSecretKey, SubkeyParamsBuilder};
use pgp::ser::Serialize as PgpSerialize;
use pgp::types::Password;
use rand::thread_rng;
use std::sync::OnceLock;

pub const TEST_PASSPHRASE: &str = "correct horse battery staple";

/// Generate an Ed25519 key with a signing subkey, protected by `passphrase`.
pub fn generate_test_key(user_id: &str, passphrase: &str) -> SignedSecretKey {
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
        .subkeys(vec![signkey.build().expect("signing subkey params")]);

    let secret_key = key_params
        .build()
        .expect("secret key params")
        .generate(thread_rng())
        .expect("generate secret key");

    secret_key
        .sign(&mut thread_rng(), &Password::from(passphrase))
        .expect("self-sign secret key")
}

/// A 2048-bit RSA key for `legacy@example.com` without subkeys, protected by
/// [`TEST_PASSPHRASE`]. RSA accepts SHA-1, so this is the key for
/// historical-digest tests. Generated once per test binary.
pub fn rsa_test_key() -> &'static SignedSecretKey {
    static KEY: OnceLock<SignedSecretKey> = OnceLock::new();
    KEY.get_or_init(|| {
        let mut key_params = SecretKeyParamsBuilder::default();
        key_params
            .key_type(KeyType::Rsa(2048))
            .can_certify(true)
            .can_sign(true)
            .can_encrypt(false)
            .primary_user_id("Legacy Builds <legacy@example.com>".into())
            .passphrase(Some(TEST_PASSPHRASE.to_string()));

        key_params
            .build()
            .expect("rsa key params")
            .generate(thread_rng())
            .expect("generate rsa key")
            .sign(&mut thread_rng(), &Password::from(TEST_PASSPHRASE))
            .expect("self-sign rsa key")
    })
}

pub fn armored_key(key: &SignedSecretKey) -> String {
    key.to_armored_string(Default::default())
        .expect("armor secret key")
}

/// Concatenated binary transferable secret keys, in order.
pub fn binary_rings(keys: &[&SignedSecretKey]) -> Vec<u8> {
    keys.iter()
        .flat_map(|key| PgpSerialize::to_bytes(*key).expect("serialize secret key"))
        .collect()
}
