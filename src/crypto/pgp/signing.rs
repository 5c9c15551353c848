//! Streaming detached signatures using rPGP 0.16

use crate::crypto::pgp::keyring::{KeySlot, SecretKey};
use crate::crypto::pgp::passphrase::SecurePassphrase;
use crate::crypto::utils::{read_fully, ChunkedReader, Encoding};
use crate::error::{Result, SignerError};
use pgp::composed::{Deserializable, SignedPublicKey, StandaloneSignature};
use pgp::crypto::hash::HashAlgorithm;
use pgp::errors::Error as PgpError;
use pgp::packet::{Signature, SignatureConfig, SignatureType, Subpacket, SubpacketData};
use pgp::ser::Serialize as PgpSerialize;
use pgp::types::{
    EcdsaPublicParams, Fingerprint, KeyDetails, Password, PublicKeyTrait, PublicParams,
    SecretKeyTrait,
};
use rand::thread_rng;
use serde::Deserialize;
use std::fmt;
use std::io::{self, Cursor, Read, Write};
use std::time::SystemTime;

/// Digest used when producing signatures.
///
/// Verification always uses whatever digest the signature declares, so
/// signatures made with [`DigestAlgorithm::Sha1`] by older tooling still verify.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DigestAlgorithm {
    /// Historical default.
    Sha1,
    #[default]
    Sha256,
    Sha384,
    Sha512,
}

impl DigestAlgorithm {
    /// OpenPGP hash algorithm id (RFC 9580, section 9.5).
    pub fn id(self) -> u8 {
        match self {
            DigestAlgorithm::Sha1 => 2,
            DigestAlgorithm::Sha256 => 8,
            DigestAlgorithm::Sha384 => 9,
            DigestAlgorithm::Sha512 => 10,
        }
    }

    /// Digest length in bits.
    pub fn bits(self) -> usize {
        match self {
            DigestAlgorithm::Sha1 => 160,
            DigestAlgorithm::Sha256 => 256,
            DigestAlgorithm::Sha384 => 384,
            DigestAlgorithm::Sha512 => 512,
        }
    }

    fn hash_algorithm(self) -> HashAlgorithm {
        HashAlgorithm::from(self.id())
    }
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DigestAlgorithm::Sha1 => "sha1",
            DigestAlgorithm::Sha256 => "sha256",
            DigestAlgorithm::Sha384 => "sha384",
            DigestAlgorithm::Sha512 => "sha512",
        };
        f.write_str(name)
    }
}

/// A self-contained binary-document signature.
///
/// It carries no reference to the signed data; pairing it with the right
/// file is up to whoever stores it.
#[derive(Debug, Clone)]
pub struct DetachedSignature {
    inner: StandaloneSignature,
}

impl DetachedSignature {
    /// Parse the first signature packet from armored or binary input.
    ///
    /// Input without any signature packet is a parse error.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let first = match Encoding::detect(bytes) {
            Encoding::Armored => {
                let (mut signatures, _headers) =
                    StandaloneSignature::from_armor_many(Cursor::new(bytes))
                        .map_err(|e| SignerError::parse("armored signature", e))?;
                signatures.next()
            }
            Encoding::Binary => StandaloneSignature::from_bytes_many(bytes)
                .map_err(|e| SignerError::parse("binary signature", e))?
                .next(),
        };

        match first {
            Some(Ok(inner)) => Ok(Self { inner }),
            Some(Err(e)) => Err(SignerError::parse("signature packet", e)),
            None => Err(SignerError::malformed(
                "signature: input contains no signature packet",
            )),
        }
    }

    /// Read a whole signature stream, then [`parse`](Self::parse) it.
    pub fn from_reader<R: Read>(stream: R) -> Result<Self> {
        let bytes = read_fully(stream, "signature")?;
        Self::parse(&bytes)
    }

    pub fn to_armored_string(&self) -> Result<String> {
        self.inner
            .to_armored_string(Default::default())
            .map_err(|e| {
                SignerError::io(
                    "armoring signature",
                    io::Error::new(io::ErrorKind::InvalidData, e.to_string()),
                )
            })
    }

    /// Unarmored packet bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        PgpSerialize::to_bytes(&self.inner).map_err(|e| {
            SignerError::io(
                "serializing signature",
                io::Error::new(io::ErrorKind::InvalidData, e.to_string()),
            )
        })
    }

    /// Write the armored form and flush.
    pub fn write_armored<W: Write>(&self, output: &mut W) -> Result<()> {
        let armored = self.to_armored_string()?;
        output
            .write_all(armored.as_bytes())
            .and_then(|_| output.flush())
            .map_err(|e| SignerError::io("writing signature", e))
    }

    pub fn issuer_fingerprint(&self) -> Option<Fingerprint> {
        self.packet().config().and_then(|config| {
            config
                .hashed_subpackets
                .iter()
                .find_map(|subpkt| match &subpkt.data {
                    SubpacketData::IssuerFingerprint(fingerprint) => Some(fingerprint.clone()),
                    _ => None,
                })
        })
    }

    pub fn created_at(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        self.packet().config().and_then(|config| {
            config
                .hashed_subpackets
                .iter()
                .find_map(|subpkt| match &subpkt.data {
                    SubpacketData::SignatureCreationTime(dt) => Some(dt.clone()),
                    _ => None,
                })
        })
    }

    /// Declared digest, if it is one this crate can produce.
    pub fn digest(&self) -> Option<DigestAlgorithm> {
        let declared = self.packet().config()?.hash_alg;
        [
            DigestAlgorithm::Sha1,
            DigestAlgorithm::Sha256,
            DigestAlgorithm::Sha384,
            DigestAlgorithm::Sha512,
        ]
        .into_iter()
        .find(|digest| digest.hash_algorithm() == declared)
    }

    fn packet(&self) -> &Signature {
        &self.inner.signature
    }
}

/// Produces and checks detached signatures.
///
/// Holds no cryptographic state between calls: every sign or verify builds a
/// fresh signature context, so one engine may be shared across threads.
#[derive(Debug, Clone, Copy, Default)]
pub struct SignatureEngine {
    digest: DigestAlgorithm,
}

impl SignatureEngine {
    pub fn new(digest: DigestAlgorithm) -> Self {
        Self { digest }
    }

    pub fn digest(&self) -> DigestAlgorithm {
        self.digest
    }

    /// Sign everything `data` yields until end-of-stream.
    ///
    /// Before any byte of `data` is read the configured digest is checked
    /// against the key algorithm and the private key is unlocked with
    /// `passphrase`. A digest too weak for the key fails with
    /// [`SignerError::Configuration`]; a wrong passphrase or corrupt key
    /// payload fails with [`SignerError::DecryptionFailed`]. Once streaming
    /// has started, a read failure on `data` is [`SignerError::Io`] and any
    /// other failure is [`SignerError::Signing`].
    pub fn sign<R: Read>(
        &self,
        data: R,
        key: SecretKey<'_>,
        passphrase: &SecurePassphrase,
    ) -> Result<DetachedSignature> {
        log::debug!(
            "Creating detached {} signature with key {}",
            self.digest,
            key.fingerprint()
        );

        let ring = key.ring();
        let params = match key.slot() {
            KeySlot::Primary => ring.primary_key.public_key().public_params(),
            KeySlot::Subkey(index) => ring.secret_subkeys[index].key.public_key().public_params(),
        };
        self.check_digest_strength(&key, params)?;

        let password = passphrase.to_pgp_password();
        let unlocked = match key.slot() {
            KeySlot::Primary => ring.primary_key.unlock(&password, |_, _| Ok(())),
            KeySlot::Subkey(index) => ring.secret_subkeys[index]
                .key
                .unlock(&password, |_, _| Ok(())),
        };
        unlocked
            .and_then(|checked| checked)
            .map_err(|e| SignerError::DecryptionFailed {
                context: format!("secret key {}", key.fingerprint()),
                source: Some(e),
            })?;

        let mut reader = ChunkedReader::new(data);
        let outcome = match key.slot() {
            KeySlot::Primary => self.sign_with(&ring.primary_key, &mut reader, &password),
            KeySlot::Subkey(index) => {
                self.sign_with(&ring.secret_subkeys[index].key, &mut reader, &password)
            }
        };

        match outcome {
            Ok(signature) => {
                log::info!(
                    "Created detached signature over {} bytes",
                    reader.consumed()
                );
                Ok(DetachedSignature {
                    inner: StandaloneSignature::new(signature),
                })
            }
            Err(e) => Err(match reader.take_failure() {
                Some(cause) => SignerError::io("reading data to sign", cause),
                None => SignerError::Signing {
                    context: format!("secret key {}", key.fingerprint()),
                    source: e,
                },
            }),
        }
    }

    /// [`sign`](Self::sign), then write the armored signature to `output`.
    pub fn sign_to_writer<R: Read, W: Write>(
        &self,
        data: R,
        output: &mut W,
        key: SecretKey<'_>,
        passphrase: &SecurePassphrase,
    ) -> Result<()> {
        self.sign(data, key, passphrase)?.write_armored(output)
    }

    /// Check that `signature` was made over `data` by `public_key`.
    ///
    /// Returns `Ok(false)` on a cryptographic mismatch. Unreadable or empty
    /// signature input, read failures on either stream, and hash or key
    /// algorithms rPGP cannot evaluate are errors.
    pub fn verify<D: Read, S: Read>(
        &self,
        data: D,
        signature: S,
        public_key: &SignedPublicKey,
    ) -> Result<bool> {
        let signature = DetachedSignature::from_reader(signature)?;
        self.verify_detached(data, &signature, public_key)
    }

    /// [`verify`](Self::verify) against an already parsed signature.
    pub fn verify_detached<D: Read>(
        &self,
        data: D,
        signature: &DetachedSignature,
        public_key: &SignedPublicKey,
    ) -> Result<bool> {
        let mut reader = ChunkedReader::new(data);
        let subkey = signature.issuer_fingerprint().and_then(|issuer| {
            public_key
                .public_subkeys
                .iter()
                .find(|subkey| subkey.key.fingerprint() == issuer)
        });

        let outcome = match subkey {
            Some(subkey) => signature.packet().verify(&subkey.key, &mut reader),
            None => signature
                .packet()
                .verify(&public_key.primary_key, &mut reader),
        };

        if let Some(cause) = reader.take_failure() {
            return Err(SignerError::io("reading signed data", cause));
        }

        match outcome {
            Ok(()) => {
                log::info!(
                    "Signature verified over {} bytes with key {}",
                    reader.consumed(),
                    public_key.fingerprint()
                );
                Ok(true)
            }
            Err(e) if is_unsupported_algorithm(&e) => {
                Err(SignerError::parse("signature algorithm", e))
            }
            Err(e) => {
                log::warn!("Signature does not match: {}", e);
                Ok(false)
            }
        }
    }

    fn check_digest_strength(&self, key: &SecretKey<'_>, params: &PublicParams) -> Result<()> {
        let required = minimum_digest_bits(params);
        if self.digest.bits() >= required {
            return Ok(());
        }
        Err(SignerError::Configuration(format!(
            "digest {} is too weak for {:?} key {}, which needs at least a {}-bit digest",
            self.digest,
            key.algorithm(),
            key.fingerprint(),
            required
        )))
    }

    fn sign_with<K, R>(
        &self,
        key: &K,
        reader: &mut ChunkedReader<R>,
        password: &Password,
    ) -> pgp::errors::Result<Signature>
    where
        K: SecretKeyTrait + KeyDetails,
        R: Read,
    {
        let mut config = SignatureConfig::from_key(thread_rng(), key, SignatureType::Binary)?;
        config.hash_alg = self.digest.hash_algorithm();

        config.hashed_subpackets = vec![
            Subpacket::regular(SubpacketData::IssuerFingerprint(key.fingerprint()))?,
            Subpacket::critical(SubpacketData::SignatureCreationTime(
                SystemTime::now().into(),
            ))?,
        ];
        config.unhashed_subpackets = vec![Subpacket::regular(SubpacketData::Issuer(key.key_id()))?];

        config.sign(key, password, reader)
    }
}

/// Smallest digest, in bits, that rPGP accepts for signatures by this key.
fn minimum_digest_bits(params: &PublicParams) -> usize {
    match params {
        PublicParams::EdDSALegacy(_) | PublicParams::Ed25519(_) => 256,
        PublicParams::Ed448(_) => 512,
        PublicParams::ECDSA(EcdsaPublicParams::P384 { .. }) => 384,
        PublicParams::ECDSA(EcdsaPublicParams::P521 { .. }) => 512,
        PublicParams::ECDSA(_) => 256,
        _ => 0,
    }
}

/// Hash or key algorithms rPGP cannot evaluate, as opposed to a bad signature.
fn is_unsupported_algorithm(e: &PgpError) -> bool {
    match e {
        PgpError::Unsupported { .. } | PgpError::Unimplemented { .. } => true,
        PgpError::InvalidPacketContent { source } => is_unsupported_algorithm(source),
        _ => false,
    }
}
