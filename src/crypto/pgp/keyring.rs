//! Secret key ring loading and user-id lookup using rPGP 0.16

use crate::crypto::utils::Encoding;
use crate::error::{Result, SignerError};
use pgp::armor::{BlockType, Dearmor};
use pgp::composed::{Deserializable, SignedPublicKey, SignedSecretKey};
use pgp::crypto::public_key::PublicKeyAlgorithm;
use pgp::errors::Error as PgpError;
use pgp::packet::{Packet, PacketParser};
use pgp::types::{Fingerprint, KeyDetails};
use std::cell::Cell;
use std::fmt;
use std::io::{self, BufRead, Cursor, Read};

/// Ordered key rings parsed from one encoded buffer. Immutable after load.
#[derive(Clone, Default)]
pub struct KeyRingCollection {
    rings: Vec<KeyRing>,
}

/// One transferable secret key: a primary key, its subkeys and user ids.
#[derive(Clone)]
pub struct KeyRing {
    key: SignedSecretKey,
}

/// Which key of a ring a [`SecretKey`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum KeySlot {
    Primary,
    Subkey(usize),
}

/// Read-only view of one secret key inside a [`KeyRing`].
///
/// The private payload stays encrypted; it is only unlocked inside
/// [`SignatureEngine::sign`](super::SignatureEngine::sign).
#[derive(Clone, Copy)]
pub struct SecretKey<'a> {
    ring: &'a SignedSecretKey,
    slot: KeySlot,
}

impl KeyRingCollection {
    /// Parse an armored or binary secret key ring collection.
    ///
    /// The encoding is detected from the first bytes. Input that yields no
    /// key ring at all is rejected as malformed, and so is any buffer with a
    /// truncated or unreadable packet, a key without a self-signed user id,
    /// or a subkey without a binding signature.
    pub fn load(encoded: &[u8]) -> Result<Self> {
        let encoding = Encoding::detect(encoded);
        log::debug!(
            "Loading secret key rings ({} bytes, {:?})",
            encoded.len(),
            encoding
        );

        let parsed = match encoding {
            Encoding::Armored => {
                parse_secret_keys(&dearmor(encoded)?, "armored secret key ring")?
            }
            Encoding::Binary => parse_secret_keys(encoded, "binary secret key ring")?,
        };

        if parsed.is_empty() {
            return Err(SignerError::malformed(
                "secret key ring: input contains no secret keys",
            ));
        }

        log::info!("Loaded {} secret key ring(s)", parsed.len());
        Ok(Self {
            rings: parsed.into_iter().map(|key| KeyRing { key }).collect(),
        })
    }

    pub fn rings(&self) -> &[KeyRing] {
        &self.rings
    }

    pub fn is_empty(&self) -> bool {
        self.rings.is_empty()
    }

    /// Find the first key, in (ring order, key order), with a user id
    /// containing `user_id` as a case-sensitive substring.
    ///
    /// This is first-match, not best-match: if several keys share an
    /// overlapping identity the earliest one wins. Callers needing exact
    /// matching should compare [`SecretKey::user_ids`] themselves.
    pub fn find_key(&self, user_id: &str) -> Option<SecretKey<'_>> {
        self.rings
            .iter()
            .flat_map(KeyRing::keys)
            .find(|key| key.has_user_id(user_id))
    }
}

impl KeyRing {
    /// The primary key followed by every secret subkey.
    pub fn keys(&self) -> impl Iterator<Item = SecretKey<'_>> + '_ {
        let subkeys = (0..self.key.secret_subkeys.len()).map(KeySlot::Subkey);
        std::iter::once(KeySlot::Primary)
            .chain(subkeys)
            .map(move |slot| SecretKey {
                ring: &self.key,
                slot,
            })
    }

    pub fn primary(&self) -> SecretKey<'_> {
        SecretKey {
            ring: &self.key,
            slot: KeySlot::Primary,
        }
    }

    pub fn user_ids(&self) -> Vec<String> {
        user_ids_of(&self.key).collect()
    }

    /// Transferable public key for this ring.
    pub fn public_key(&self) -> SignedPublicKey {
        SignedPublicKey::from(self.key.clone())
    }
}

impl<'a> SecretKey<'a> {
    pub(crate) fn ring(&self) -> &'a SignedSecretKey {
        self.ring
    }

    pub(crate) fn slot(&self) -> KeySlot {
        self.slot
    }

    pub fn is_primary(&self) -> bool {
        self.slot == KeySlot::Primary
    }

    /// User ids bound to this key. Subkeys carry none.
    pub fn user_ids(&self) -> Vec<String> {
        match self.slot {
            KeySlot::Primary => user_ids_of(self.ring).collect(),
            KeySlot::Subkey(_) => Vec::new(),
        }
    }

    pub fn has_user_id(&self, user_id: &str) -> bool {
        match self.slot {
            KeySlot::Primary => user_ids_of(self.ring).any(|id| id.contains(user_id)),
            KeySlot::Subkey(_) => false,
        }
    }

    pub fn fingerprint(&self) -> Fingerprint {
        match self.slot {
            KeySlot::Primary => self.ring.primary_key.fingerprint(),
            KeySlot::Subkey(index) => self.ring.secret_subkeys[index].key.fingerprint(),
        }
    }

    pub fn algorithm(&self) -> PublicKeyAlgorithm {
        match self.slot {
            KeySlot::Primary => self.ring.primary_key.algorithm(),
            KeySlot::Subkey(index) => self.ring.secret_subkeys[index].key.algorithm(),
        }
    }

    /// Transferable public key of the ring this key belongs to.
    ///
    /// Verification picks the primary key or the matching subkey from it by
    /// the signature's issuer fingerprint.
    pub fn public_key(&self) -> SignedPublicKey {
        SignedPublicKey::from(self.ring.clone())
    }
}

/// Parse a single armored or binary transferable public key.
pub fn load_public_key(encoded: &[u8]) -> Result<SignedPublicKey> {
    match Encoding::detect(encoded) {
        Encoding::Armored => SignedPublicKey::from_armor_single(Cursor::new(encoded))
            .map(|(key, _headers)| key)
            .map_err(|e| SignerError::parse("armored public key", e)),
        Encoding::Binary => SignedPublicKey::from_bytes(encoded)
            .map_err(|e| SignerError::parse("binary public key", e)),
    }
}

/// Decode the first armor block, which must hold a private key.
fn dearmor(encoded: &[u8]) -> Result<Vec<u8>> {
    let context = "armored secret key ring";
    let mut dearmor = Dearmor::new(encoded);
    dearmor
        .read_header()
        .map_err(|e| SignerError::parse(context, e))?;
    if !matches!(dearmor.typ, Some(BlockType::PrivateKey)) {
        return Err(SignerError::malformed(format!(
            "{}: unexpected armor block {:?}",
            context, dearmor.typ
        )));
    }

    let mut packets = Vec::new();
    dearmor
        .read_to_end(&mut packets)
        .map_err(|e| SignerError::parse(context, e.into()))?;
    Ok(packets)
}

/// Parse transferable secret keys packet by packet.
///
/// Every byte of `bytes` must belong to a complete packet. rPGP's own
/// collection parser skips incomplete packets and stops quietly at a
/// truncated header, which would let a cut-off buffer load as a shorter
/// ring.
fn parse_secret_keys(bytes: &[u8], context: &str) -> Result<Vec<SignedSecretKey>> {
    let consumed = Cell::new(0);
    let mut packets = Vec::new();
    let mut parsed_len = 0;
    let mut subkey_packets = 0;

    for packet in PacketParser::new(TrackedSlice::new(bytes, &consumed)) {
        let packet = match packet {
            Ok(packet) => packet,
            // unsupported versions and packet types are skipped, as rPGP does
            Err(e) if is_unsupported(&e) => {
                log::warn!("{}: skipping unsupported packet: {}", context, e);
                parsed_len = consumed.get();
                continue;
            }
            Err(e) => return Err(SignerError::parse(context, e)),
        };
        parsed_len = consumed.get();

        match packet {
            Packet::Marker(_) | Packet::Padding(_) => continue,
            Packet::SecretSubkey(_) | Packet::PublicSubkey(_) => subkey_packets += 1,
            _ => {}
        }
        packets.push(packet);
    }

    if parsed_len != bytes.len() {
        return Err(SignerError::malformed(format!(
            "{}: truncated packet at byte {} of {}",
            context,
            parsed_len,
            bytes.len()
        )));
    }

    let keys: Vec<SignedSecretKey> =
        SignedSecretKey::from_packets(packets.into_iter().map(Ok).peekable())
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| SignerError::parse(context, e))?;

    for key in &keys {
        let users = &key.details.users;
        if users.is_empty() || users.iter().any(|user| user.signatures.is_empty()) {
            return Err(SignerError::malformed(format!(
                "{}: key {} has no self-signed user id",
                context,
                key.primary_key.fingerprint()
            )));
        }
    }

    let kept_subkeys: usize = keys
        .iter()
        .map(|key| key.secret_subkeys.len() + key.public_subkeys.len())
        .sum();
    if kept_subkeys != subkey_packets {
        return Err(SignerError::malformed(format!(
            "{}: {} subkey(s) without a binding signature",
            context,
            subkey_packets.saturating_sub(kept_subkeys)
        )));
    }

    Ok(keys)
}

fn is_unsupported(error: &PgpError) -> bool {
    match error {
        PgpError::Unsupported { .. } => true,
        PgpError::InvalidPacketContent { source } => {
            matches!(**source, PgpError::Unsupported { .. })
        }
        _ => false,
    }
}

/// A byte slice that reports how much of it has been consumed.
struct TrackedSlice<'a> {
    rest: &'a [u8],
    consumed: &'a Cell<usize>,
}

impl<'a> TrackedSlice<'a> {
    fn new(bytes: &'a [u8], consumed: &'a Cell<usize>) -> Self {
        Self {
            rest: bytes,
            consumed,
        }
    }
}

impl Read for TrackedSlice<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.rest.read(buf)?;
        self.consumed.set(self.consumed.get() + n);
        Ok(n)
    }
}

impl BufRead for TrackedSlice<'_> {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        Ok(self.rest)
    }

    fn consume(&mut self, amt: usize) {
        let amt = amt.min(self.rest.len());
        self.rest = &self.rest[amt..];
        self.consumed.set(self.consumed.get() + amt);
    }
}

fn user_ids_of(key: &SignedSecretKey) -> impl Iterator<Item = String> + '_ {
    key.details
        .users
        .iter()
        .map(|user| String::from_utf8_lossy(user.id.id()).into_owned())
}

impl fmt::Debug for SecretKey<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretKey")
            .field("fingerprint", &self.fingerprint().to_string())
            .field("primary", &self.is_primary())
            .finish()
    }
}

impl fmt::Debug for KeyRing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyRing")
            .field("fingerprint", &self.primary().fingerprint().to_string())
            .field("user_ids", &self.user_ids())
            .finish()
    }
}

impl fmt::Debug for KeyRingCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(&self.rings).finish()
    }
}
