//! Demo site bundle: a fixed set of JSON sections sealed to `<name>.json.enc`
//! files, with a plaintext `manifest.json` listing them.

use std::{
    collections::BTreeMap,
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sitevault_core::envelope::{Codec, PlainValue};
use thiserror::Error;
use tracing::info;

use crate::{
    file_store::{write_atomic, BUNDLE_SUFFIX},
    sealed_file::{open_file, FileError},
};

pub const MANIFEST_FILE: &str = "manifest.json";

#[derive(Debug, Error)]
pub enum BundleError {
    #[error("no bundle manifest at {0}")]
    Missing(PathBuf),
    #[error("invalid manifest: {0}")]
    Manifest(String),
    #[error(transparent)]
    File(#[from] FileError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub encrypted_files: Vec<String>,
    pub encryption_method: String,
    pub key_derivation: String,
}

/// Named JSON sections sealed independently.
#[derive(Debug, Clone, PartialEq)]
pub struct SiteBundle {
    sections: BTreeMap<String, Value>,
}

impl SiteBundle {
    pub fn new() -> Self {
        Self {
            sections: BTreeMap::new(),
        }
    }

    pub fn with_section(mut self, name: impl Into<String>, value: Value) -> Self {
        self.sections.insert(name.into(), value);
        self
    }

    pub fn sections(&self) -> &BTreeMap<String, Value> {
        &self.sections
    }

    /// Seal every section into `dir` and write the manifest.
    pub fn build(&self, dir: &Path, codec: &Codec) -> Result<Manifest, BundleError> {
        fs::create_dir_all(dir).map_err(|e| FileError::io(dir, e))?;

        let mut encrypted_files = Vec::with_capacity(self.sections.len());
        for (name, value) in &self.sections {
            let file_name = format!("{name}{BUNDLE_SUFFIX}");
            let envelope = codec.encrypt_json(value).map_err(FileError::from)?;
            write_atomic(&dir.join(&file_name), envelope.as_bytes()).map_err(FileError::from)?;
            encrypted_files.push(file_name);
        }

        let manifest = Manifest {
            encrypted_files,
            encryption_method: "AES-GCM".to_string(),
            key_derivation: "PBKDF2-HMAC-SHA256".to_string(),
        };
        let body = serde_json::to_vec_pretty(&manifest)
            .map_err(|e| BundleError::Manifest(e.to_string()))?;
        write_atomic(&dir.join(MANIFEST_FILE), &body).map_err(FileError::from)?;

        info!(dir = %dir.display(), sections = self.sections.len(), "site bundle built");
        Ok(manifest)
    }
}

impl Default for SiteBundle {
    /// The demo site: configuration, page content, and a secrets section.
    fn default() -> Self {
        SiteBundle::new()
            .with_section(
                "site_config",
                json!({
                    "name": "Encrypted Site",
                    "version": "1.0.0",
                    "description": "A site with encrypted data storage"
                }),
            )
            .with_section(
                "content_data",
                json!({
                    "home": {
                        "title": "Welcome to Our Secure Site",
                        "description": "All data is encrypted for security",
                        "features": ["Secure Data", "Encrypted Storage", "Privacy Focused"]
                    },
                    "about": {
                        "title": "About Us",
                        "content": "We believe in data privacy and security."
                    }
                }),
            )
            .with_section(
                "secrets",
                json!({
                    "api_keys": {
                        "service_1": "encrypted_api_key_123",
                        "service_2": "encrypted_secret_456"
                    },
                    "config": {
                        "database_url": "encrypted_db_url",
                        "admin_email": "encrypted_admin@example.com"
                    }
                }),
            )
    }
}

/// Read the manifest in `dir` and decrypt every listed section.
pub fn load(dir: &Path, codec: &Codec) -> Result<BTreeMap<String, PlainValue>, BundleError> {
    let manifest_path = dir.join(MANIFEST_FILE);
    let raw = match fs::read(&manifest_path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            return Err(BundleError::Missing(manifest_path))
        }
        Err(err) => return Err(FileError::io(&manifest_path, err).into()),
    };
    let manifest: Manifest =
        serde_json::from_slice(&raw).map_err(|e| BundleError::Manifest(e.to_string()))?;

    let mut sections = BTreeMap::new();
    for file_name in &manifest.encrypted_files {
        let name = file_name
            .strip_suffix(BUNDLE_SUFFIX)
            .ok_or_else(|| BundleError::Manifest(format!("unexpected entry {file_name}")))?;
        if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
            return Err(BundleError::Manifest(format!("unexpected entry {file_name}")));
        }
        sections.insert(name.to_string(), open_file(codec, &dir.join(file_name))?);
    }
    Ok(sections)
}
