//! A validated configuration turned into a ready signer.

use crate::core::artifacts::{ArtifactProvider, ArtifactSigningOrchestrator, Attachment};
use crate::core::config::ValidatedSession;
use crate::core::credentials::CredentialResolver;
use crate::crypto::pgp::{KeyRingCollection, SecretKey, SecurePassphrase, SignatureEngine};
use crate::error::{Result, SignerError};
use std::path::{Path, PathBuf};

/// Loaded key rings, the resolved passphrase and the engine.
///
/// The passphrase stays in memory for the lifetime of the session and is
/// zeroized on drop.
pub struct SigningSession {
    rings: KeyRingCollection,
    passphrase: SecurePassphrase,
    user_id: String,
    engine: SignatureEngine,
}

impl SigningSession {
    pub fn open(
        session: ValidatedSession,
        resolver: Option<&dyn CredentialResolver>,
    ) -> Result<Self> {
        let passphrase = session.passphrase.resolve(resolver)?;
        let rings = KeyRingCollection::load(&session.keyring.read()?)?;
        log::info!(
            "Opened signing session for {:?} with {} key ring(s), digest {}",
            session.user_id,
            rings.rings().len(),
            session.digest
        );

        Ok(Self {
            rings,
            passphrase,
            user_id: session.user_id,
            engine: SignatureEngine::new(session.digest),
        })
    }

    pub fn rings(&self) -> &KeyRingCollection {
        &self.rings
    }

    pub fn engine(&self) -> SignatureEngine {
        self.engine
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// The first key whose user ids contain the configured user id.
    pub fn signing_key(&self) -> Result<SecretKey<'_>> {
        self.rings
            .find_key(&self.user_id)
            .ok_or_else(|| SignerError::KeyNotFound {
                user_id: self.user_id.clone(),
            })
    }

    fn orchestrator(&self) -> Result<ArtifactSigningOrchestrator<'_>> {
        Ok(ArtifactSigningOrchestrator::new(
            self.engine,
            self.signing_key()?,
            &self.passphrase,
        ))
    }

    /// Write `<file>.asc` for `file`.
    pub fn sign_file(&self, file: &Path) -> Result<PathBuf> {
        self.orchestrator()?.sign_file(file)
    }

    pub fn sign_artifacts<P: ArtifactProvider + ?Sized>(
        &self,
        provider: &mut P,
    ) -> Result<Vec<Attachment>> {
        self.orchestrator()?.sign_all(provider)
    }
}
