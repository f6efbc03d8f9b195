//! Airtable-backed record store: one table row per envelope.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{header::USER_AGENT, Url};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sitevault_core::storage::{
    validate_key, RecordStore, RecordSummary, StoreError, StoredRecord,
};
use tracing::{debug, instrument};

const DEFAULT_API_BASE: &str = "https://api.airtable.com";
const DEFAULT_DATA_TYPE: &str = "content";

fn default_table() -> String {
    "site_data".to_string()
}

/// Airtable connection settings.
#[derive(Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct AirtableConfig {
    pub api_key: String,
    pub base_id: String,
    #[serde(default = "default_table")]
    pub table: String,
    #[serde(default)]
    pub api_base: Option<String>,
}

impl AirtableConfig {
    pub fn new(api_key: impl Into<String>, base_id: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_id: base_id.into(),
            table: default_table(),
            api_base: None,
        }
    }
}

impl fmt::Debug for AirtableConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AirtableConfig")
            .field("api_key", &"***")
            .field("base_id", &self.base_id)
            .field("table", &self.table)
            .field("api_base", &self.api_base)
            .finish()
    }
}

pub struct AirtableStore {
    cfg: AirtableConfig,
    client: reqwest::Client,
}

impl AirtableStore {
    pub fn new(cfg: AirtableConfig) -> Self {
        Self {
            cfg,
            client: reqwest::Client::new(),
        }
    }

    fn table_url(&self) -> Result<Url, StoreError> {
        let base = self.cfg.api_base.as_deref().unwrap_or(DEFAULT_API_BASE);
        let mut url = Url::parse(base).map_err(storage_err)?;
        {
            let mut segments = url.path_segments_mut().map_err(|_| StoreError::Storage {
                reason: format!("api base cannot hold a path: {base}"),
            })?;
            segments
                .pop_if_empty()
                .extend(["v0", self.cfg.base_id.as_str(), self.cfg.table.as_str()]);
        }
        Ok(url)
    }

    fn record_url(&self, record_id: &str) -> Result<Url, StoreError> {
        let mut url = self.table_url()?;
        url.path_segments_mut()
            .map_err(|_| StoreError::Storage {
                reason: "invalid table url".to_string(),
            })?
            .push(record_id);
        Ok(url)
    }

    async fn list_records(&self, formula: Option<String>) -> Result<Vec<AirtableRecord>, StoreError> {
        let url = self.table_url()?;
        let mut records = Vec::new();
        let mut offset: Option<String> = None;
        loop {
            let mut query: Vec<(&str, String)> = Vec::new();
            if let Some(formula) = &formula {
                query.push(("filterByFormula", formula.clone()));
            }
            if let Some(offset) = offset.take() {
                query.push(("offset", offset));
            }

            let page: ListResponse = self
                .client
                .get(url.clone())
                .bearer_auth(&self.cfg.api_key)
                .header(USER_AGENT, "sitevault")
                .query(&query)
                .send()
                .await
                .map_err(storage_err)?
                .error_for_status()
                .map_err(storage_err)?
                .json()
                .await
                .map_err(storage_err)?;

            records.extend(page.records);
            match page.offset {
                Some(next) => offset = Some(next),
                None => break,
            }
        }
        Ok(records)
    }

    async fn find(&self, key: &str) -> Result<Option<AirtableRecord>, StoreError> {
        let mut matches = self.list_records(Some(key_formula(key))).await?;
        Ok(if matches.is_empty() {
            None
        } else {
            Some(matches.swap_remove(0))
        })
    }
}

#[async_trait]
impl RecordStore for AirtableStore {
    fn name(&self) -> &'static str {
        "airtable"
    }

    #[instrument(skip_all, fields(key = %record.key, table = %self.cfg.table))]
    async fn put(&self, record: StoredRecord) -> Result<(), StoreError> {
        validate_key(&record.key)?;
        let data_type = record
            .data_type
            .unwrap_or_else(|| DEFAULT_DATA_TYPE.to_string());

        let request = match self.find(&record.key).await? {
            Some(existing) => {
                debug!(record_id = %existing.id, "updating airtable record");
                self.client
                    .patch(self.record_url(&existing.id)?)
                    .json(&json!({ "fields": {
                        "encrypted_value": record.envelope,
                        "data_type": data_type,
                    }}))
            }
            None => {
                debug!("creating airtable record");
                self.client.post(self.table_url()?).json(&json!({ "fields": {
                    "key": record.key,
                    "encrypted_value": record.envelope,
                    "data_type": data_type,
                }}))
            }
        };

        request
            .bearer_auth(&self.cfg.api_key)
            .header(USER_AGENT, "sitevault")
            .send()
            .await
            .map_err(storage_err)?
            .error_for_status()
            .map_err(storage_err)?;
        Ok(())
    }

    #[instrument(skip_all, fields(key = %key, table = %self.cfg.table))]
    async fn get(&self, key: &str) -> Result<StoredRecord, StoreError> {
        validate_key(key)?;
        let record = self.find(key).await?.ok_or_else(|| StoreError::NotFound {
            key: key.to_string(),
        })?;
        record.into_stored()
    }

    #[instrument(skip_all, fields(table = %self.cfg.table))]
    async fn list(&self) -> Result<Vec<RecordSummary>, StoreError> {
        let mut summaries: Vec<_> = self
            .list_records(None)
            .await?
            .into_iter()
            .filter_map(|record| record.fields.key)
            .map(|key| {
                let path = format!("airtable:{key}");
                RecordSummary::new(key, path)
            })
            .collect();
        summaries.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(summaries)
    }

    #[instrument(skip_all, fields(key = %key, table = %self.cfg.table))]
    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        validate_key(key)?;
        let Some(existing) = self.find(key).await? else {
            return Ok(false);
        };
        self.client
            .delete(self.record_url(&existing.id)?)
            .bearer_auth(&self.cfg.api_key)
            .header(USER_AGENT, "sitevault")
            .send()
            .await
            .map_err(storage_err)?
            .error_for_status()
            .map_err(storage_err)?;
        Ok(true)
    }
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    records: Vec<AirtableRecord>,
    #[serde(default)]
    offset: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AirtableRecord {
    id: String,
    #[serde(default)]
    created_time: Option<DateTime<Utc>>,
    fields: RecordFields,
}

#[derive(Debug, Default, Deserialize)]
struct RecordFields {
    #[serde(default)]
    key: Option<String>,
    #[serde(default)]
    encrypted_value: Option<String>,
    #[serde(default)]
    data_type: Option<String>,
    #[serde(default)]
    created_time: Option<DateTime<Utc>>,
    #[serde(default)]
    last_modified_time: Option<DateTime<Utc>>,
}

impl AirtableRecord {
    fn into_stored(self) -> Result<StoredRecord, StoreError> {
        let RecordFields {
            key,
            encrypted_value,
            data_type,
            created_time,
            last_modified_time,
        } = self.fields;
        let key = key.ok_or_else(|| StoreError::Storage {
            reason: format!("airtable record {} has no key", self.id),
        })?;
        let envelope = encrypted_value.ok_or_else(|| StoreError::Storage {
            reason: format!("airtable record {} has no encrypted_value", self.id),
        })?;
        Ok(StoredRecord {
            key,
            envelope,
            data_type: Some(data_type.unwrap_or_else(|| DEFAULT_DATA_TYPE.to_string())),
            created_at: created_time.or(self.created_time),
            modified_at: last_modified_time,
        })
    }
}

/// Formula matching the `key` field exactly.
fn key_formula(key: &str) -> String {
    let escaped = key.replace('\\', "\\\\").replace('\'', "\\'");
    format!("{{key}} = '{escaped}'")
}

fn storage_err<E: ToString>(err: E) -> StoreError {
    StoreError::Storage {
        reason: err.to_string(),
    }
}
