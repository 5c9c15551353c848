//! Signing every output of a build and registering the signatures back.

use crate::crypto::pgp::{SecretKey, SecurePassphrase, SignatureEngine};
use crate::error::{Result, SignerError};
use serde::Serialize;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

/// Suffix appended to an artifact path to name its detached signature.
pub const SIGNATURE_SUFFIX: &str = ".asc";

/// One build output file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// `None` when the build produced no file for it.
    pub file: Option<PathBuf>,
    /// Type label, usually the file extension (`jar`, `zip`, ...).
    pub extension: String,
    pub classifier: Option<String>,
}

/// The project descriptor and where its published copy goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectDescriptor {
    pub file: PathBuf,
    pub build_dir: PathBuf,
    pub final_name: String,
}

/// A signature registered as an additional build output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Attachment {
    #[serde(rename = "type")]
    pub artifact_type: String,
    pub classifier: Option<String>,
    pub file: PathBuf,
}

/// The build whose artifacts are being signed.
pub trait ArtifactProvider {
    /// Packaging of the project; `pom` projects have no main artifact.
    fn packaging(&self) -> &str;
    fn main_artifact(&self) -> Option<Artifact>;
    fn attached_artifacts(&self) -> Vec<Artifact>;
    fn project_descriptor(&self) -> ProjectDescriptor;
    fn attach(&mut self, attachment: Attachment);
}

/// `<file>.asc`, next to `file`.
pub fn signature_path(file: &Path) -> PathBuf {
    let mut path = file.as_os_str().to_owned();
    path.push(SIGNATURE_SUFFIX);
    PathBuf::from(path)
}

/// Drives the signature engine once per artifact of a build.
pub struct ArtifactSigningOrchestrator<'a> {
    engine: SignatureEngine,
    key: SecretKey<'a>,
    passphrase: &'a SecurePassphrase,
}

impl<'a> ArtifactSigningOrchestrator<'a> {
    pub fn new(
        engine: SignatureEngine,
        key: SecretKey<'a>,
        passphrase: &'a SecurePassphrase,
    ) -> Self {
        Self {
            engine,
            key,
            passphrase,
        }
    }

    /// Sign `file` and write the armored signature to `<file>.asc`.
    ///
    /// The signature file is only created once signing succeeded, and is
    /// removed again if writing it fails.
    pub fn sign_file(&self, file: &Path) -> Result<PathBuf> {
        let input = File::open(file)
            .map_err(|e| SignerError::io(format!("opening {}", file.display()), e))?;
        let signature = self.engine.sign(input, self.key, self.passphrase)?;

        let output_path = signature_path(file);
        let output = File::create(&output_path)
            .map_err(|e| SignerError::io(format!("creating {}", output_path.display()), e))?;
        if let Err(e) = signature.write_armored(&mut BufWriter::new(output)) {
            remove_signature(&output_path);
            return Err(e);
        }

        log::debug!("Signed {} -> {}", file.display(), output_path.display());
        Ok(output_path)
    }

    /// Sign the main artifact, every attached artifact and the project
    /// descriptor, then register all signatures with `provider`.
    ///
    /// The first failure aborts the run before anything is registered, and
    /// the `.asc` files already written by this run are deleted. The
    /// published descriptor copy is a build output and stays.
    pub fn sign_all<P: ArtifactProvider + ?Sized>(&self, provider: &mut P) -> Result<Vec<Attachment>> {
        let mut signed = Vec::new();
        if let Err(e) = self.sign_outputs(&*provider, &mut signed) {
            for attachment in &signed {
                remove_signature(&attachment.file);
            }
            return Err(e);
        }

        for attachment in &signed {
            provider.attach(attachment.clone());
        }
        log::info!("Signed {} artifact(s)", signed.len());
        Ok(signed)
    }

    fn sign_outputs<P: ArtifactProvider + ?Sized>(
        &self,
        provider: &P,
        signed: &mut Vec<Attachment>,
    ) -> Result<()> {
        if provider.packaging() != "pom" {
            if let Some(artifact) = provider.main_artifact() {
                if let Some(file) = self.sign_artifact(&artifact)? {
                    signed.push(Attachment {
                        artifact_type: format!("{}{}", artifact.extension, SIGNATURE_SUFFIX),
                        classifier: None,
                        file,
                    });
                }
            }
        }

        for artifact in provider.attached_artifacts() {
            if let Some(file) = self.sign_artifact(&artifact)? {
                signed.push(Attachment {
                    artifact_type: format!("{}{}", artifact.extension, SIGNATURE_SUFFIX),
                    classifier: artifact.classifier.clone(),
                    file,
                });
            }
        }

        let pom = self.publish_descriptor(&provider.project_descriptor())?;
        signed.push(Attachment {
            artifact_type: format!("pom{}", SIGNATURE_SUFFIX),
            classifier: None,
            file: self.sign_file(&pom)?,
        });
        Ok(())
    }

    fn sign_artifact(&self, artifact: &Artifact) -> Result<Option<PathBuf>> {
        match &artifact.file {
            Some(file) if file.is_file() => self.sign_file(file).map(Some),
            _ => {
                log::warn!(
                    "Skipping {} artifact{} without a file",
                    artifact.extension,
                    artifact
                        .classifier
                        .as_ref()
                        .map(|c| format!(" ({})", c))
                        .unwrap_or_default()
                );
                Ok(None)
            }
        }
    }

    /// Copy the descriptor to `<build-dir>/<final-name>.pom`.
    fn publish_descriptor(&self, descriptor: &ProjectDescriptor) -> Result<PathBuf> {
        let target = descriptor
            .build_dir
            .join(format!("{}.pom", descriptor.final_name));
        if target != descriptor.file {
            fs::create_dir_all(&descriptor.build_dir).map_err(|e| {
                SignerError::io(format!("creating {}", descriptor.build_dir.display()), e)
            })?;
            fs::copy(&descriptor.file, &target).map_err(|e| {
                SignerError::io(
                    format!("copying {} to {}", descriptor.file.display(), target.display()),
                    e,
                )
            })?;
        }
        Ok(target)
    }
}

fn remove_signature(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => log::debug!("Removed {}", path.display()),
        Err(e) => log::warn!("Could not remove {}: {}", path.display(), e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_path_appends_suffix() {
        assert_eq!(
            signature_path(Path::new("target/app-1.0.jar")),
            PathBuf::from("target/app-1.0.jar.asc")
        );
        assert_eq!(
            signature_path(Path::new("archive.tar.gz")),
            PathBuf::from("archive.tar.gz.asc")
        );
    }

    #[test]
    fn test_attachment_json_shape() {
        let attachment = Attachment {
            artifact_type: "jar.asc".to_string(),
            classifier: Some("sources".to_string()),
            file: PathBuf::from("a.jar.asc"),
        };
        let json = serde_json::to_value(&attachment).unwrap();
        assert_eq!(json["type"], "jar.asc");
        assert_eq!(json["classifier"], "sources");
    }
}
