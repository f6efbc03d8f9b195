use std::{path::PathBuf, sync::Arc};

use crate::config::{Backend, Config, PasscodeSource};
use color_eyre::{eyre::eyre, Result};
use dirs::data_dir;
use sitevault_airtable::AirtableStore;
use sitevault_core::{
    envelope::Codec,
    storage::{InMemoryRecordStore, RecordStore},
};
use sitevault_storage::{
    file_store::FileRecordStore,
    passcode::{codec_from_provider, EnvPasscodeProvider, KeyringPasscodeProvider, PasscodeProvider},
};
use tracing::debug;

const KEYRING_SERVICE: &str = "sitevault";
const KEYRING_ACCOUNT: &str = "site-data-passcode";

/// Resolve the default data directory for sitevault.
pub fn default_data_dir() -> Result<PathBuf> {
    let base = data_dir().ok_or_else(|| eyre!("no data dir available"))?;
    Ok(base.join("sitevault"))
}

/// Configured data directory, falling back to the platform default.
pub fn data_dir_from_config(config: &Config) -> Result<PathBuf> {
    match &config.data_dir {
        Some(root) => Ok(root.clone()),
        None => default_data_dir(),
    }
}

/// Build the record backend selected in config.
pub fn store_from_config(config: &Config) -> Result<Arc<dyn RecordStore>> {
    let store: Arc<dyn RecordStore> = match config.backend {
        Backend::File => {
            let root = data_dir_from_config(config)?;
            debug!(?root, "initializing file record store");
            Arc::new(FileRecordStore::new(root))
        }
        Backend::Airtable => {
            let cfg = config
                .airtable
                .clone()
                .ok_or_else(|| eyre!("airtable backend selected but not configured"))?;
            debug!(base_id = %cfg.base_id, table = %cfg.table, "initializing airtable store");
            Arc::new(AirtableStore::new(cfg))
        }
        Backend::Memory => {
            debug!("initializing in-memory record store");
            Arc::new(InMemoryRecordStore::new())
        }
    };
    Ok(store)
}

pub fn passcode_provider(config: &Config) -> Box<dyn PasscodeProvider> {
    match config.passcode.source {
        PasscodeSource::Env => Box::new(EnvPasscodeProvider::new(config.passcode.env_var())),
        PasscodeSource::Keyring => {
            Box::new(KeyringPasscodeProvider::new(KEYRING_SERVICE, KEYRING_ACCOUNT))
        }
    }
}

/// Load the passcode once and build the shared codec. Fails before anything is served.
pub async fn codec_from_config(config: &Config) -> Result<Arc<Codec>> {
    let provider = passcode_provider(config);
    let codec = codec_from_provider(provider.as_ref(), config.kdf_iterations()).await?;
    Ok(Arc::new(codec))
}

#[cfg(test)]
pub fn test_codec() -> Arc<Codec> {
    Arc::new(Codec::with_iterations("test_passcode_123", 1_000).expect("codec"))
}

#[cfg(test)]
mod tests {
    use sitevault_airtable::AirtableConfig;

    use super::*;

    #[test]
    fn selects_backend_from_config() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = Config {
            data_dir: Some(dir.path().to_path_buf()),
            ..Config::default()
        };
        assert_eq!(store_from_config(&file).expect("file").name(), "file");

        let memory = Config {
            backend: Backend::Memory,
            ..Config::default()
        };
        assert_eq!(store_from_config(&memory).expect("memory").name(), "memory");

        let airtable = Config {
            backend: Backend::Airtable,
            airtable: Some(AirtableConfig::new("patKEY", "appBASE")),
            ..Config::default()
        };
        assert_eq!(
            store_from_config(&airtable).expect("airtable").name(),
            "airtable"
        );
    }

    #[test]
    fn airtable_without_credentials_fails() {
        let cfg = Config {
            backend: Backend::Airtable,
            ..Config::default()
        };
        assert!(store_from_config(&cfg).is_err());
    }

    #[test]
    fn passcode_source_selects_provider() {
        assert_eq!(passcode_provider(&Config::default()).name(), "env");
        let mut cfg = Config::default();
        cfg.passcode.source = PasscodeSource::Keyring;
        assert_eq!(passcode_provider(&cfg).name(), "keyring");
    }

    #[tokio::test]
    async fn missing_passcode_is_fatal() {
        let mut cfg = Config::default();
        cfg.passcode.env_var = Some("SITEVAULT_TEST_PASSCODE_THAT_IS_NEVER_SET".into());
        assert!(codec_from_config(&cfg).await.is_err());
    }
}
