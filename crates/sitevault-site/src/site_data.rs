use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sitevault_core::{
    envelope::{EnvelopeError, PlainValue},
    storage::{RecordStore, RecordSummary, StoreError, ENVELOPE_SUFFIX},
};
use tracing::info;

use crate::sealed::{SealedStore, SealedStoreError};

const SITE_DATA_TYPE: &str = "content";

/// Payload sealed for every site-data entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteRecord {
    pub data: Value,
    pub notes: Option<String>,
    /// Seconds since the Unix epoch.
    pub timestamp: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreReceipt {
    pub message: String,
    pub id: String,
}

/// Site-data operations behind the `/site-data` API.
pub struct SiteDataService<S: RecordStore + ?Sized> {
    sealed: SealedStore<S>,
}

impl<S: RecordStore + ?Sized> Clone for SiteDataService<S> {
    fn clone(&self) -> Self {
        Self {
            sealed: self.sealed.clone(),
        }
    }
}

impl<S: RecordStore + ?Sized> SiteDataService<S> {
    pub fn new(sealed: SealedStore<S>) -> Self {
        Self { sealed }
    }

    pub fn sealed(&self) -> &SealedStore<S> {
        &self.sealed
    }

    /// Wrap `data` with notes and a timestamp, then seal it under `id`.
    pub async fn store_site_data(
        &self,
        id: &str,
        data: Value,
        notes: Option<String>,
    ) -> Result<StoreReceipt, SealedStoreError> {
        let record = SiteRecord {
            data,
            notes,
            timestamp: Utc::now().timestamp_millis() as f64 / 1000.0,
        };
        let value = serde_json::to_value(&record).map_err(|e| EnvelopeError::Serialization {
            reason: e.to_string(),
        })?;

        self.sealed
            .store(id, PlainValue::Json(value), Some(SITE_DATA_TYPE.to_string()))
            .await?;
        info!(id, backend = self.sealed.backend(), "site data stored");
        Ok(StoreReceipt {
            message: format!("Data stored as {id}{ENVELOPE_SUFFIX}"),
            id: id.to_string(),
        })
    }

    /// Decrypted payload for `id`, as recovered by the codec.
    pub async fn retrieve_site_data(&self, id: &str) -> Result<PlainValue, SealedStoreError> {
        self.sealed.get(id).await
    }

    pub async fn list_all_data(&self) -> Result<Vec<RecordSummary>, SealedStoreError> {
        self.sealed.list().await
    }

    /// Delete `id`, reporting `NotFound` when nothing was stored.
    pub async fn delete_site_data(&self, id: &str) -> Result<String, SealedStoreError> {
        if !self.sealed.delete(id).await? {
            return Err(StoreError::NotFound { key: id.to_string() }.into());
        }
        info!(id, backend = self.sealed.backend(), "site data deleted");
        Ok(format!("Data '{id}' deleted"))
    }
}
