use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Suffix used for record files and record labels.
pub const ENVELOPE_SUFFIX: &str = ".enc";
const MAX_KEY_LEN: usize = 128;
/// `<name>.json.enc` files are bundle sections, so record keys cannot end in this.
const RESERVED_KEY_SUFFIX: &str = ".json";

/// Errors produced by record store implementations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Requested key does not exist.
    #[error("entry not found for key: {key}")]
    NotFound { key: String },
    /// Key is unusable as a record identifier.
    #[error("invalid key {key:?}: {reason}")]
    InvalidKey { key: String, reason: String },
    /// Underlying storage failure.
    #[error("storage failure: {reason}")]
    Storage { reason: String },
}

/// One persisted envelope plus the metadata a backend keeps beside it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub key: String,
    /// Base64 envelope text; never plaintext.
    pub envelope: String,
    /// Optional free-form type tag (e.g. `content`).
    pub data_type: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub modified_at: Option<DateTime<Utc>>,
}

impl StoredRecord {
    pub fn new(key: impl Into<String>, envelope: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            envelope: envelope.into(),
            data_type: None,
            created_at: None,
            modified_at: None,
        }
    }

    pub fn with_data_type(mut self, data_type: Option<String>) -> Self {
        self.data_type = data_type;
        self
    }
}

/// Listing entry: the record id plus a backend-specific location label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordSummary {
    pub id: String,
    pub filename: String,
    pub path: String,
}

impl RecordSummary {
    pub fn new(id: impl Into<String>, path: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            filename: format!("{id}{ENVELOPE_SUFFIX}"),
            id,
            path: path.into(),
        }
    }
}

/// Key → envelope persistence contract shared by the filesystem, Airtable
/// and in-memory backends. Stores only ever see envelope text.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Short backend name used for logging and health output.
    fn name(&self) -> &'static str;

    /// Persist a record, overwriting any existing entry with the same key.
    async fn put(&self, record: StoredRecord) -> Result<(), StoreError>;

    /// Retrieve the record for a key.
    async fn get(&self, key: &str) -> Result<StoredRecord, StoreError>;

    /// List all records, sorted by id.
    async fn list(&self) -> Result<Vec<RecordSummary>, StoreError>;

    /// Remove a record. Returns `false` when nothing was stored under the key.
    async fn delete(&self, key: &str) -> Result<bool, StoreError>;
}

/// Reject keys that cannot safely become file names or formula literals.
pub fn validate_key(key: &str) -> Result<(), StoreError> {
    let invalid = |reason: &str| StoreError::InvalidKey {
        key: key.to_string(),
        reason: reason.to_string(),
    };

    if key.is_empty() {
        return Err(invalid("key must not be empty"));
    }
    if key.len() > MAX_KEY_LEN {
        return Err(invalid("key is too long"));
    }
    if key.starts_with('.') {
        return Err(invalid("key must not start with '.'"));
    }
    if key.ends_with(RESERVED_KEY_SUFFIX) {
        return Err(invalid("keys ending in '.json' are reserved for bundle sections"));
    }
    if !key
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
        return Err(invalid(
            "only ASCII letters, digits, '-', '_' and '.' are allowed",
        ));
    }
    Ok(())
}

/// In-memory record store for tests and credential-less runs.
#[derive(Debug, Default, Clone)]
pub struct InMemoryRecordStore {
    inner: Arc<Mutex<BTreeMap<String, StoredRecord>>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, StoredRecord>>, StoreError> {
        self.inner.lock().map_err(|err| StoreError::Storage {
            reason: format!("lock poisoned: {err}"),
        })
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn put(&self, mut record: StoredRecord) -> Result<(), StoreError> {
        validate_key(&record.key)?;
        let mut map = self.lock()?;
        let now = Utc::now();
        record.created_at = map
            .get(&record.key)
            .and_then(|existing| existing.created_at)
            .or(Some(now));
        record.modified_at = Some(now);
        map.insert(record.key.clone(), record);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<StoredRecord, StoreError> {
        validate_key(key)?;
        let map = self.lock()?;
        map.get(key).cloned().ok_or_else(|| StoreError::NotFound {
            key: key.to_string(),
        })
    }

    async fn list(&self) -> Result<Vec<RecordSummary>, StoreError> {
        let map = self.lock()?;
        Ok(map
            .keys()
            .map(|key| RecordSummary::new(key.clone(), format!("memory:{key}")))
            .collect())
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        validate_key(key)?;
        let mut map = self.lock()?;
        Ok(map.remove(key).is_some())
    }
}
