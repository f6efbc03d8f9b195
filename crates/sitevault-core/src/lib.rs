//! Core abstractions for Sitevault: the authenticated-encryption envelope codec
//! and the record storage contract every backend implements.
//! No I/O lives here; backends are in the storage and airtable crates.

pub mod envelope;
pub mod storage;
