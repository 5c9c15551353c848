//! Error taxonomy for signing sessions.
//!
//! Every failure from rPGP or the standard library is translated into one of
//! these kinds at the engine boundary, with the original cause kept as the
//! error source. A verification mismatch is not an error; see
//! [`SignatureEngine::verify`](crate::crypto::pgp::SignatureEngine::verify).

use std::io;

pub type Result<T> = std::result::Result<T, SignerError>;

#[derive(Debug, thiserror::Error)]
pub enum SignerError {
    /// Missing or conflicting session inputs. Raised before any key material is read.
    #[error("invalid signing configuration: {0}")]
    Configuration(String),

    /// Malformed key ring or signature encoding.
    #[error("failed to parse {context}")]
    Parse {
        context: String,
        #[source]
        source: Option<pgp::errors::Error>,
    },

    /// No key in the loaded rings carries the configured user id.
    #[error("no secret key found for user id containing {user_id:?}")]
    KeyNotFound { user_id: String },

    #[error("credential {id:?} not found")]
    CredentialNotFound { id: String },

    /// Wrong passphrase, corrupt private key payload, or an undecryptable stored secret.
    #[error("failed to decrypt {context}")]
    DecryptionFailed {
        context: String,
        #[source]
        source: Option<pgp::errors::Error>,
    },

    /// The key was unlocked but rPGP could not produce the signature.
    #[error("failed to sign with {context}")]
    Signing {
        context: String,
        #[source]
        source: pgp::errors::Error,
    },

    #[error("I/O failure while {context}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
}

impl SignerError {
    pub(crate) fn parse(context: impl Into<String>, source: pgp::errors::Error) -> Self {
        Self::Parse {
            context: context.into(),
            source: Some(source),
        }
    }

    pub(crate) fn malformed(context: impl Into<String>) -> Self {
        Self::Parse {
            context: context.into(),
            source: None,
        }
    }

    pub(crate) fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    pub(crate) fn decryption(context: impl Into<String>) -> Self {
        Self::DecryptionFailed {
            context: context.into(),
            source: None,
        }
    }
}
