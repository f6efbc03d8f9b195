//! Sealed persistence for Sitevault: every value is encrypted exactly once on
//! the way into a [`RecordStore`](sitevault_core::storage::RecordStore) and
//! decrypted exactly once on the way out.

pub mod sealed;
pub mod site_data;

pub use sealed::{DecryptedRecord, SealedStore, SealedStoreError};
pub use site_data::{SiteDataService, SiteRecord, StoreReceipt};
