use std::{collections::BTreeMap, sync::Arc};

use chrono::{DateTime, Utc};
use sitevault_core::{
    envelope::{Codec, EnvelopeError, PlainValue},
    storage::{validate_key, RecordStore, RecordSummary, StoreError, StoredRecord},
};
use thiserror::Error;
use tracing::{debug, instrument};

#[derive(Debug, Error)]
pub enum SealedStoreError {
    #[error(transparent)]
    Envelope(#[from] EnvelopeError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("codec task failed: {0}")]
    Task(String),
}

/// A decrypted record together with the metadata its backend kept.
#[derive(Debug, Clone, PartialEq)]
pub struct DecryptedRecord {
    pub data: PlainValue,
    pub data_type: Option<String>,
    pub created: Option<DateTime<Utc>>,
    pub modified: Option<DateTime<Utc>>,
}

/// Record store wrapper that seals values before `put` and opens them after `get`.
///
/// Key derivation is CPU-bound, so codec calls run on the blocking pool.
pub struct SealedStore<S: RecordStore + ?Sized> {
    codec: Arc<Codec>,
    store: Arc<S>,
}

impl<S: RecordStore + ?Sized> Clone for SealedStore<S> {
    fn clone(&self) -> Self {
        Self {
            codec: Arc::clone(&self.codec),
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: RecordStore + ?Sized> SealedStore<S> {
    pub fn new(codec: Arc<Codec>, store: Arc<S>) -> Self {
        Self { codec, store }
    }

    /// Backend name, for logs and health output.
    pub fn backend(&self) -> &'static str {
        self.store.name()
    }

    /// Encrypt `value` once and persist the envelope under `key`.
    #[instrument(skip(self, value, data_type), fields(backend = self.store.name()))]
    pub async fn store(
        &self,
        key: &str,
        value: PlainValue,
        data_type: Option<String>,
    ) -> Result<(), SealedStoreError> {
        validate_key(key)?;
        let envelope = self.run_codec(move |codec| codec.encrypt(&value)).await?;
        self.store
            .put(StoredRecord::new(key, envelope).with_data_type(data_type))
            .await?;
        debug!("record sealed");
        Ok(())
    }

    /// Fetch the envelope for `key` and decrypt it once.
    #[instrument(skip(self), fields(backend = self.store.name()))]
    pub async fn get(&self, key: &str) -> Result<PlainValue, SealedStoreError> {
        let record = self.store.get(key).await?;
        Ok(self.open(record).await?.data)
    }

    pub async fn list(&self) -> Result<Vec<RecordSummary>, SealedStoreError> {
        Ok(self.store.list().await?)
    }

    /// Returns `false` when nothing was stored under `key`.
    #[instrument(skip(self), fields(backend = self.store.name()))]
    pub async fn delete(&self, key: &str) -> Result<bool, SealedStoreError> {
        Ok(self.store.delete(key).await?)
    }

    /// Decrypt every record in the backend, keyed by id.
    pub async fn get_all(&self) -> Result<BTreeMap<String, DecryptedRecord>, SealedStoreError> {
        let mut all = BTreeMap::new();
        for summary in self.store.list().await? {
            let record = self.store.get(&summary.id).await?;
            all.insert(summary.id, self.open(record).await?);
        }
        Ok(all)
    }

    async fn open(&self, record: StoredRecord) -> Result<DecryptedRecord, SealedStoreError> {
        let StoredRecord {
            envelope,
            data_type,
            created_at,
            modified_at,
            ..
        } = record;
        let data = self
            .run_codec(move |codec| codec.decrypt(&envelope))
            .await?;
        Ok(DecryptedRecord {
            data,
            data_type,
            created: created_at,
            modified: modified_at,
        })
    }

    async fn run_codec<T, F>(&self, op: F) -> Result<T, SealedStoreError>
    where
        F: FnOnce(&Codec) -> Result<T, EnvelopeError> + Send + 'static,
        T: Send + 'static,
    {
        let codec = Arc::clone(&self.codec);
        let result = tokio::task::spawn_blocking(move || op(&codec))
            .await
            .map_err(|e| SealedStoreError::Task(e.to_string()))?;
        Ok(result?)
    }
}
