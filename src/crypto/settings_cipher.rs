//! Password-based cipher for secrets kept in a settings store.
//!
//! An encrypted value is written in braces, `{...}`, around
//! `base64(salt[8] | pad_len[1] | ciphertext | padding[pad_len])`.
//! Key and IV are the two halves of `SHA-256(password || salt)`; the
//! ciphertext is AES-128-CBC with PKCS#7 padding.

use crate::error::{Result, SignerError};
use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::{thread_rng, RngCore};
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;
type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;

const SALT_SIZE: usize = 8;
const BLOCK_SIZE: usize = 16;

/// Fixed password protecting the master password itself.
pub const MASTER_PASSWORD_KEY: &str = "settings.security";

/// The inner text of a braced value, or `None` for plaintext.
pub fn encrypted_payload(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    trimmed
        .strip_prefix('{')
        .and_then(|rest| rest.strip_suffix('}'))
        .filter(|inner| !inner.contains(['{', '}']))
}

/// Decrypt a braced or bare payload with `password`.
pub fn decrypt(value: &str, password: &str) -> Result<Zeroizing<String>> {
    let payload = encrypted_payload(value).unwrap_or(value.trim());
    let decoded = STANDARD
        .decode(payload)
        .map_err(|e| SignerError::decryption(format!("stored secret: invalid base64 ({})", e)))?;

    if decoded.len() < SALT_SIZE + 1 + BLOCK_SIZE {
        return Err(SignerError::decryption("stored secret: payload too short"));
    }
    let (salt, rest) = decoded.split_at(SALT_SIZE);
    let pad_len = rest[0] as usize;
    let body = &rest[1..];
    if pad_len > body.len() {
        return Err(SignerError::decryption("stored secret: invalid padding length"));
    }
    let ciphertext = &body[..body.len() - pad_len];

    let (key, iv) = derive_key_iv(password, salt);
    let plain = Aes128CbcDec::new_from_slices(&key[..], &iv[..])
        .map_err(|_| SignerError::decryption("stored secret: invalid key length"))?
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| SignerError::decryption("stored secret: wrong password or corrupt value"))?;
    let plain = Zeroizing::new(plain);

    let text = std::str::from_utf8(&plain)
        .map_err(|_| SignerError::decryption("stored secret: wrong password or corrupt value"))?;
    Ok(Zeroizing::new(text.to_string()))
}

/// Encrypt `plain` under `password` with a random salt, returning the braced form.
pub fn encrypt(plain: &str, password: &str) -> Result<String> {
    let mut salt = [0u8; SALT_SIZE];
    thread_rng().fill_bytes(&mut salt);
    encrypt_with_salt(plain, password, salt)
}

pub(crate) fn encrypt_with_salt(
    plain: &str,
    password: &str,
    salt: [u8; SALT_SIZE],
) -> Result<String> {
    let (key, iv) = derive_key_iv(password, &salt);
    let ciphertext = Aes128CbcEnc::new_from_slices(&key[..], &iv[..])
        .map_err(|_| SignerError::Configuration("invalid AES key length".to_string()))?
        .encrypt_padded_vec_mut::<Pkcs7>(plain.as_bytes());

    let pad_len = BLOCK_SIZE - (SALT_SIZE + ciphertext.len() + 1) % BLOCK_SIZE;
    let mut padding = vec![0u8; pad_len];
    thread_rng().fill_bytes(&mut padding);

    let mut encoded = Vec::with_capacity(SALT_SIZE + 1 + ciphertext.len() + pad_len);
    encoded.extend_from_slice(&salt);
    encoded.push(pad_len as u8);
    encoded.extend_from_slice(&ciphertext);
    encoded.extend_from_slice(&padding);

    Ok(format!("{{{}}}", STANDARD.encode(encoded)))
}

fn derive_key_iv(password: &str, salt: &[u8]) -> (Zeroizing<Vec<u8>>, Zeroizing<Vec<u8>>) {
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    hasher.update(salt);
    let digest = Zeroizing::new(hasher.finalize().to_vec());
    (
        Zeroizing::new(digest[..BLOCK_SIZE].to_vec()),
        Zeroizing::new(digest[BLOCK_SIZE..].to_vec()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encrypt_then_decrypt() {
        let encrypted = encrypt("latrommI", "master-secret").unwrap();
        assert!(encrypted.starts_with('{') && encrypted.ends_with('}'));

        let plain = decrypt(&encrypted, "master-secret").unwrap();
        assert_eq!(plain.as_str(), "latrommI");
    }

    #[test]
    fn test_wrong_password_fails() {
        let encrypted = encrypt_with_salt("latrommI", "master-secret", [7u8; SALT_SIZE]).unwrap();
        let err = decrypt(&encrypted, "other-master").unwrap_err();
        assert!(matches!(err, SignerError::DecryptionFailed { .. }), "{:?}", err);
    }

    #[test]
    fn test_payload_detection() {
        assert_eq!(encrypted_payload(" {abc=} "), Some("abc="));
        assert_eq!(encrypted_payload("plain"), None);
        assert_eq!(encrypted_payload("{nested{x}}"), None);
    }

    #[test]
    fn test_malformed_values_fail() {
        for value in ["{not base64!}", "{AAAA}"] {
            let err = decrypt(value, "master").unwrap_err();
            assert!(matches!(err, SignerError::DecryptionFailed { .. }), "{:?}", err);
        }
    }
}
