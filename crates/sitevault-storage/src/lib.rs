//! Concrete local storage for Sitevault envelopes.
//! Passcode sourcing (environment, OS keyring), the flat-file record store,
//! and helpers that seal whole files and the demo site bundle.

pub mod bundle;
pub mod file_store;
pub mod passcode;
pub mod sealed_file;
