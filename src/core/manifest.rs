//! A build described by a TOML manifest.
//!
//! ```toml
//! packaging = "jar"
//! build-dir = "target"
//! final-name = "app-1.0"
//! descriptor = "pom.xml"
//!
//! [main]
//! file = "target/app-1.0.jar"
//! extension = "jar"
//!
//! [[attached]]
//! file = "target/app-1.0-sources.jar"
//! extension = "jar"
//! classifier = "sources"
//! ```

use crate::core::artifacts::{Artifact, ArtifactProvider, Attachment, ProjectDescriptor};
use crate::error::{Result, SignerError};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct ManifestFile {
    #[serde(default = "default_packaging")]
    packaging: String,
    build_dir: PathBuf,
    final_name: String,
    descriptor: PathBuf,
    main: Option<ArtifactEntry>,
    #[serde(default)]
    attached: Vec<ArtifactEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ArtifactEntry {
    file: Option<PathBuf>,
    extension: String,
    classifier: Option<String>,
}

fn default_packaging() -> String {
    "jar".to_string()
}

/// [`ArtifactProvider`] backed by a manifest file.
#[derive(Debug)]
pub struct BuildManifest {
    packaging: String,
    descriptor: ProjectDescriptor,
    main: Option<Artifact>,
    attached: Vec<Artifact>,
    attachments: Vec<Attachment>,
}

impl BuildManifest {
    /// Parse manifest text; relative paths resolve against `base_dir`.
    pub fn from_toml_str(text: &str, base_dir: &Path) -> Result<Self> {
        let file: ManifestFile = toml::from_str(text)
            .map_err(|e| SignerError::Configuration(format!("invalid build manifest: {}", e)))?;

        let artifact = |entry: ArtifactEntry| Artifact {
            file: entry.file.map(|p| base_dir.join(p)),
            extension: entry.extension,
            classifier: entry.classifier,
        };

        Ok(Self {
            packaging: file.packaging,
            descriptor: ProjectDescriptor {
                file: base_dir.join(file.descriptor),
                build_dir: base_dir.join(file.build_dir),
                final_name: file.final_name,
            },
            main: file.main.map(artifact),
            attached: file.attached.into_iter().map(artifact).collect(),
            attachments: Vec::new(),
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .map_err(|e| SignerError::io(format!("reading manifest {}", path.display()), e))?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new(""));
        let manifest = Self::from_toml_str(&text, base_dir)?;
        log::debug!(
            "Loaded build manifest {} ({} attached artifacts)",
            path.display(),
            manifest.attached.len()
        );
        Ok(manifest)
    }

    /// Attachments registered so far.
    pub fn attachments(&self) -> &[Attachment] {
        &self.attachments
    }
}

impl ArtifactProvider for BuildManifest {
    fn packaging(&self) -> &str {
        &self.packaging
    }

    fn main_artifact(&self) -> Option<Artifact> {
        self.main.clone()
    }

    fn attached_artifacts(&self) -> Vec<Artifact> {
        self.attached.clone()
    }

    fn project_descriptor(&self) -> ProjectDescriptor {
        self.descriptor.clone()
    }

    fn attach(&mut self, attachment: Attachment) {
        self.attachments.push(attachment);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_resolve_against_base() {
        let manifest = BuildManifest::from_toml_str(
            r#"
            build-dir = "target"
            final-name = "app-1.0"
            descriptor = "pom.xml"

            [main]
            file = "target/app-1.0.jar"
            extension = "jar"

            [[attached]]
            file = "target/app-1.0-sources.jar"
            extension = "jar"
            classifier = "sources"
            "#,
            Path::new("/work/app"),
        )
        .unwrap();

        assert_eq!(manifest.packaging(), "jar");
        let descriptor = manifest.project_descriptor();
        assert_eq!(descriptor.file, PathBuf::from("/work/app/pom.xml"));
        assert_eq!(descriptor.build_dir, PathBuf::from("/work/app/target"));
        assert_eq!(
            manifest.main_artifact().unwrap().file,
            Some(PathBuf::from("/work/app/target/app-1.0.jar"))
        );
        let attached = manifest.attached_artifacts();
        assert_eq!(attached.len(), 1);
        assert_eq!(attached[0].classifier.as_deref(), Some("sources"));
    }

    #[test]
    fn test_missing_required_field() {
        let err = BuildManifest::from_toml_str("packaging = \"pom\"", Path::new(".")).unwrap_err();
        assert!(matches!(err, SignerError::Configuration(_)), "{:?}", err);
    }
}
