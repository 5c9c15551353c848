use crate::core::artifacts::signature_path;
use crate::core::config::{PassphraseSource, SessionConfig};
use crate::core::credentials::{CredentialResolver, SettingsStore};
use crate::core::manifest::BuildManifest;
use crate::core::session::SigningSession;
use crate::crypto::pgp::{
    load_public_key, DigestAlgorithm, KeyRingCollection, SecurePassphrase, SignatureEngine,
};
use crate::crypto::settings_cipher::{self, MASTER_PASSWORD_KEY};
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use log::info;
use std::fs::{self, File};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "artifact-signer")]
#[command(about = "Create and check OpenPGP detached signatures for build artifacts")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Sign every artifact of a build manifest and register the signatures
    SignArtifacts {
        /// Build manifest (TOML)
        #[arg(short, long)]
        manifest: PathBuf,
        #[command(flatten)]
        session: SessionArgs,
    },
    /// Write <FILE>.asc for each file
    Sign {
        #[arg(required = true)]
        files: Vec<PathBuf>,
        #[command(flatten)]
        session: SessionArgs,
    },
    /// Check a detached signature; exits with 1 on mismatch
    Verify {
        /// Signed data
        file: PathBuf,
        /// Signature file (defaults to <FILE>.asc)
        #[arg(short, long)]
        signature: Option<PathBuf>,
        /// Public key of the signer, armored or binary
        #[arg(short = 'k', long)]
        public_key: PathBuf,
    },
    /// Print the fingerprints and user ids of a secret key ring file
    ListKeys {
        keyring: PathBuf,
    },
    /// Encrypt a passphrase for the settings store
    EncryptPassphrase {
        /// Encrypt a master password instead of a server passphrase
        #[arg(long)]
        master: bool,
    },
}

/// Session inputs. Flags override the values of `--config`.
#[derive(Args)]
pub struct SessionArgs {
    /// Session config file (TOML)
    #[arg(short, long, env = "SIGNER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Armored secret key ring text
    #[arg(
        long,
        env = "SIGNER_RINGS",
        hide_env_values = true,
        conflicts_with = "secret_keyring"
    )]
    pub rings: Option<String>,

    /// Secret key ring file, armored or binary
    #[arg(long, env = "SIGNER_SECRET_KEYRING")]
    pub secret_keyring: Option<PathBuf>,

    #[arg(long, env = "SIGNER_PASSPHRASE", hide_env_values = true)]
    pub passphrase: Option<String>,

    /// Server entry in the settings store holding the passphrase
    #[arg(long, env = "SIGNER_PASSPHRASE_SERVER_ID")]
    pub passphrase_server_id: Option<String>,

    /// Prompt for the passphrase when none is configured
    #[arg(long)]
    pub ask_passphrase: bool,

    /// Substring of the signing key's user id
    #[arg(short, long, env = "SIGNER_USER_ID")]
    pub user_id: Option<String>,

    #[arg(long, value_enum, env = "SIGNER_DIGEST")]
    pub digest: Option<DigestAlgorithm>,

    /// Settings store used to resolve --passphrase-server-id
    #[arg(long, env = "SIGNER_SETTINGS")]
    pub settings: Option<PathBuf>,

    /// Master password of the settings store
    #[arg(long, env = "SIGNER_MASTER_PASSWORD", hide_env_values = true)]
    pub master_password: Option<String>,
}

impl SessionArgs {
    fn open(self) -> Result<SigningSession> {
        let file_config = match &self.config {
            Some(path) => SessionConfig::load(path)?,
            None => SessionConfig::default(),
        };
        let mut config = file_config.merge(SessionConfig {
            rings: self.rings,
            secret_keyring: self.secret_keyring,
            passphrase: self.passphrase.map(SecurePassphrase::new),
            passphrase_server_id: self.passphrase_server_id,
            user_id: self.user_id,
            digest: self.digest,
            settings: self.settings,
        });

        let unconfigured = config.passphrase.is_none() && config.passphrase_server_id.is_none();
        if self.ask_passphrase && unconfigured {
            config.passphrase = Some(SecurePassphrase::from_user_input_with_prompt("Key passphrase")?);
        }

        let validated = config.validate()?;
        let store = match (&validated.passphrase, &validated.settings) {
            (PassphraseSource::Credential { .. }, Some(path)) => {
                let store = SettingsStore::load(path)?;
                Some(match self.master_password {
                    Some(master) => store.with_master_password(SecurePassphrase::new(master)),
                    None => store,
                })
            }
            _ => None,
        };

        let resolver = store.as_ref().map(|s| s as &dyn CredentialResolver);
        Ok(SigningSession::open(validated, resolver)?)
    }
}

/// Run a command. `Ok(false)` means the command completed with a negative
/// outcome, such as a signature mismatch.
pub fn run_cli(cli: Cli) -> Result<bool> {
    match cli.command {
        Commands::SignArtifacts { manifest, session } => {
            let session = session.open()?;
            let mut build = BuildManifest::load(&manifest)?;
            session.sign_artifacts(&mut build)?;
            println!("{}", serde_json::to_string_pretty(build.attachments())?);
            Ok(true)
        }
        Commands::Sign { files, session } => {
            let session = session.open()?;
            for file in &files {
                let output = session.sign_file(file)?;
                println!("{}", output.display());
            }
            Ok(true)
        }
        Commands::Verify {
            file,
            signature,
            public_key,
        } => {
            let signature = signature.unwrap_or_else(|| signature_path(&file));
            let key_bytes = fs::read(&public_key)
                .with_context(|| format!("reading public key {}", public_key.display()))?;
            let key = load_public_key(&key_bytes)?;

            let data = File::open(&file).with_context(|| format!("opening {}", file.display()))?;
            let sig = File::open(&signature)
                .with_context(|| format!("opening {}", signature.display()))?;

            let valid = SignatureEngine::default().verify(data, sig, &key)?;
            if valid {
                println!("Good signature for {}", file.display());
            } else {
                println!("BAD signature for {}", file.display());
            }
            Ok(valid)
        }
        Commands::ListKeys { keyring } => {
            let bytes = fs::read(&keyring)
                .with_context(|| format!("reading keyring {}", keyring.display()))?;
            let rings = KeyRingCollection::load(&bytes)?;
            for ring in rings.rings() {
                for key in ring.keys() {
                    let kind = if key.is_primary() { "sec" } else { "ssb" };
                    println!("{}  {:?}  {}", kind, key.algorithm(), key.fingerprint());
                    for user_id in key.user_ids() {
                        println!("uid  {}", user_id);
                    }
                }
            }
            info!("Listed {} key ring(s)", rings.rings().len());
            Ok(true)
        }
        Commands::EncryptPassphrase { master } => {
            let encrypted = if master {
                let secret = SecurePassphrase::from_user_input_with_prompt("Master password")?;
                settings_cipher::encrypt(secret.as_str(), MASTER_PASSWORD_KEY)?
            } else {
                let master = SecurePassphrase::from_user_input_with_prompt("Master password")?;
                let secret = SecurePassphrase::from_user_input_with_prompt("Passphrase")?;
                settings_cipher::encrypt(secret.as_str(), master.as_str())?
            };
            println!("{}", encrypted);
            Ok(true)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_sign_flags() {
        let cli = Cli::try_parse_from([
            "artifact-signer",
            "sign",
            "a.jar",
            "b.jar",
            "--secret-keyring",
            "ring.gpg",
            "--user-id",
            "release@",
            "--digest",
            "sha512",
        ])
        .unwrap();
        match cli.command {
            Commands::Sign { files, session } => {
                assert_eq!(files.len(), 2);
                assert_eq!(session.digest, Some(DigestAlgorithm::Sha512));
                assert_eq!(session.user_id.as_deref(), Some("release@"));
            }
            _ => panic!("expected sign command"),
        }
    }

    #[test]
    fn test_rings_and_file_conflict() {
        let result = Cli::try_parse_from([
            "artifact-signer",
            "sign",
            "a.jar",
            "--rings",
            "text",
            "--secret-keyring",
            "ring.gpg",
        ]);
        assert!(result.is_err());
    }
}
