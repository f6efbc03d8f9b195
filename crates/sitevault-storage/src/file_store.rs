use std::{
    fs::{self, Metadata},
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sitevault_core::storage::{
    validate_key, RecordStore, RecordSummary, StoreError, StoredRecord, ENVELOPE_SUFFIX,
};
use tempfile::NamedTempFile;
use tracing::instrument;

/// Files ending in this suffix belong to the site bundle, not the record store.
pub const BUNDLE_SUFFIX: &str = ".json.enc";

/// Flat-file record store: one `<key>.enc` file per record holding the envelope text.
/// The type tag is not persisted by this backend.
#[derive(Debug, Clone)]
pub struct FileRecordStore {
    root: PathBuf,
}

impl FileRecordStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(format!("{key}{ENVELOPE_SUFFIX}"))
    }
}

#[async_trait]
impl RecordStore for FileRecordStore {
    fn name(&self) -> &'static str {
        "file"
    }

    #[instrument(skip_all, fields(key = %record.key))]
    async fn put(&self, record: StoredRecord) -> Result<(), StoreError> {
        validate_key(&record.key)?;
        write_atomic(&self.path_for(&record.key), record.envelope.as_bytes())
    }

    #[instrument(skip_all, fields(key = %key))]
    async fn get(&self, key: &str) -> Result<StoredRecord, StoreError> {
        validate_key(key)?;
        let path = self.path_for(key);
        let envelope = fs::read_to_string(&path).map_err(|err| {
            if err.kind() == ErrorKind::NotFound {
                StoreError::NotFound {
                    key: key.to_string(),
                }
            } else {
                storage_err(err)
            }
        })?;

        let mut record = StoredRecord::new(key, envelope.trim_end());
        if let Ok(metadata) = fs::metadata(&path) {
            let (created, modified) = file_times(&metadata);
            record.created_at = created;
            record.modified_at = modified;
        }
        Ok(record)
    }

    #[instrument(skip_all)]
    async fn list(&self) -> Result<Vec<RecordSummary>, StoreError> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(storage_err(err)),
        };

        let mut summaries = Vec::new();
        for entry in entries {
            let entry = entry.map_err(storage_err)?;
            if !entry.file_type().map_err(storage_err)?.is_file() {
                continue;
            }
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };
            if name.ends_with(BUNDLE_SUFFIX) {
                continue;
            }
            if let Some(id) = name.strip_suffix(ENVELOPE_SUFFIX) {
                if validate_key(id).is_ok() {
                    summaries.push(RecordSummary::new(
                        id,
                        entry.path().to_string_lossy().to_string(),
                    ));
                }
            }
        }
        summaries.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(summaries)
    }

    #[instrument(skip_all, fields(key = %key))]
    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        validate_key(key)?;
        match fs::remove_file(self.path_for(key)) {
            Ok(_) => Ok(true),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(storage_err(err)),
        }
    }
}

/// Write through a temp file in the target directory so readers never see a
/// partially written envelope.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), StoreError> {
    let parent = path.parent().ok_or_else(|| StoreError::Storage {
        reason: "invalid storage path".to_string(),
    })?;
    fs::create_dir_all(parent).map_err(storage_err)?;

    let mut tmp = NamedTempFile::new_in(parent).map_err(storage_err)?;
    tmp.write_all(contents).map_err(storage_err)?;
    tmp.flush().map_err(storage_err)?;
    tmp.persist(path).map_err(|e| storage_err(e.error))?;
    Ok(())
}

fn file_times(metadata: &Metadata) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
    let created = metadata.created().ok().map(DateTime::<Utc>::from);
    let modified = metadata.modified().ok().map(DateTime::<Utc>::from);
    (created, modified)
}

fn storage_err<E: ToString>(err: E) -> StoreError {
    StoreError::Storage {
        reason: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_get_round_trip_writes_flat_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileRecordStore::new(dir.path().join("data"));

        store
            .put(StoredRecord::new("homepage_content", "c2VhbGVk"))
            .await
            .expect("put");
        let record = store.get("homepage_content").await.expect("get");
        assert_eq!(record.envelope, "c2VhbGVk");
        assert!(record.modified_at.is_some());

        let on_disk = fs::read_to_string(dir.path().join("data/homepage_content.enc"))
            .expect("read envelope file");
        assert_eq!(on_disk, "c2VhbGVk");
    }

    #[tokio::test]
    async fn overwrite_replaces_envelope() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileRecordStore::new(dir.path());
        store.put(StoredRecord::new("k", "first")).await.unwrap();
        store.put(StoredRecord::new("k", "second")).await.unwrap();
        assert_eq!(store.get("k").await.unwrap().envelope, "second");
    }

    #[tokio::test]
    async fn list_skips_bundle_files_and_sorts() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileRecordStore::new(dir.path());
        store.put(StoredRecord::new("user_data", "x")).await.unwrap();
        store.put(StoredRecord::new("api_secrets", "x")).await.unwrap();
        fs::write(dir.path().join("secrets.json.enc"), "bundle").unwrap();
        fs::write(dir.path().join("manifest.json"), "{}").unwrap();
        fs::create_dir(dir.path().join("nested.enc")).unwrap();

        let listed = store.list().await.expect("list");
        let ids: Vec<_> = listed.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, ["api_secrets", "user_data"]);
        assert_eq!(listed[0].filename, "api_secrets.enc");
        assert!(listed[0].path.ends_with("api_secrets.enc"));
    }

    #[tokio::test]
    async fn missing_root_lists_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileRecordStore::new(dir.path().join("never-created"));
        assert!(store.list().await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn delete_reports_presence() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileRecordStore::new(dir.path());
        store.put(StoredRecord::new("k", "v")).await.expect("put");

        assert!(store.delete("k").await.expect("delete"));
        assert!(!store.delete("k").await.expect("delete again"));
        let err = store.get("k").await.expect_err("should be missing");
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn traversal_keys_are_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileRecordStore::new(dir.path());
        let err = store
            .put(StoredRecord::new("../escape", "v"))
            .await
            .expect_err("must reject");
        assert!(matches!(err, StoreError::InvalidKey { .. }));
    }

    #[tokio::test]
    async fn keys_that_would_shadow_bundle_sections_are_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileRecordStore::new(dir.path());
        fs::write(dir.path().join("secrets.json.enc"), "bundle").unwrap();

        let err = store
            .put(StoredRecord::new("secrets.json", "ZW52"))
            .await
            .expect_err("bundle-shaped key");
        assert!(matches!(err, StoreError::InvalidKey { .. }));
        assert_eq!(
            fs::read_to_string(dir.path().join("secrets.json.enc")).unwrap(),
            "bundle"
        );

        // Every key that put accepts shows up in list.
        store
            .put(StoredRecord::new("secrets.json.v2", "ZW52"))
            .await
            .expect("put");
        let ids: Vec<_> = store
            .list()
            .await
            .expect("list")
            .into_iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(ids, ["secrets.json.v2"]);
    }
}
