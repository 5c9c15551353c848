//! Passphrase handling for secret key unlock.

use crate::error::{Result, SignerError};
use pgp::types::Password;
use serde::{Deserialize, Deserializer};
use std::fmt;
use zeroize::ZeroizeOnDrop;

/// Secure passphrase for PGP operations.
///
/// Implements ZeroizeOnDrop to securely clear passphrase from memory when dropped.
#[derive(Clone, ZeroizeOnDrop)]
pub struct SecurePassphrase {
    passphrase: String,
}

impl SecurePassphrase {
    /// Create a new SecurePassphrase from a string.
    pub fn new(passphrase: String) -> Self {
        Self { passphrase }
    }

    /// Prompt on the terminal with echo disabled.
    pub fn from_user_input_with_prompt(prompt: &str) -> Result<Self> {
        let passphrase = rpassword::prompt_password(format!("{}: ", prompt))
            .map_err(|e| SignerError::io("reading passphrase from terminal", e))?;

        if passphrase.is_empty() {
            return Err(SignerError::Configuration(
                "an empty passphrase was entered".to_string(),
            ));
        }

        Ok(Self::new(passphrase))
    }

    /// Get the passphrase as a string slice.
    pub fn as_str(&self) -> &str {
        &self.passphrase
    }

    /// Convert to the rPGP password type. Keep the result scoped to a single unlock.
    pub(crate) fn to_pgp_password(&self) -> Password {
        Password::from(self.passphrase.as_str())
    }
}

impl fmt::Debug for SecurePassphrase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecurePassphrase(<redacted>)")
    }
}

impl<'de> Deserialize<'de> for SecurePassphrase {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        String::deserialize(deserializer).map(Self::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_is_redacted() {
        let passphrase = SecurePassphrase::new("hunter2-hunter2".to_string());
        let rendered = format!("{:?}", passphrase);
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    fn test_deserialize_from_string() {
        #[derive(Deserialize)]
        struct Wrapper {
            passphrase: SecurePassphrase,
        }

        let wrapper: Wrapper = toml::from_str(r#"passphrase = "latrommI""#).unwrap();
        assert_eq!(wrapper.passphrase.as_str(), "latrommI");
    }
}
