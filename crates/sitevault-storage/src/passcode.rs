use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::{rngs::OsRng, RngCore};
use sitevault_core::envelope::{Codec, EnvelopeError};
use thiserror::Error;
use tracing::debug;
use zeroize::Zeroizing;

/// Environment variable read by [`EnvPasscodeProvider::default`].
pub const DEFAULT_PASSCODE_VAR: &str = "LOCAL_PASSCODE_FOR_SITE_DATA";

#[derive(Debug, Error)]
pub enum PasscodeError {
    #[error("passcode not available from {source_name}")]
    Missing { source_name: String },
    #[error("keyring error: {0}")]
    Keyring(String),
    #[error(transparent)]
    Codec(#[from] EnvelopeError),
}

/// Supplies the process-wide passcode once at startup.
/// Implementations must never log the returned secret.
#[async_trait]
pub trait PasscodeProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn passcode(&self) -> Result<Zeroizing<String>, PasscodeError>;
}

/// Reads the passcode from an environment variable.
#[derive(Debug, Clone)]
pub struct EnvPasscodeProvider {
    var: String,
}

impl EnvPasscodeProvider {
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

impl Default for EnvPasscodeProvider {
    fn default() -> Self {
        Self::new(DEFAULT_PASSCODE_VAR)
    }
}

#[async_trait]
impl PasscodeProvider for EnvPasscodeProvider {
    fn name(&self) -> &'static str {
        "env"
    }

    async fn passcode(&self) -> Result<Zeroizing<String>, PasscodeError> {
        match std::env::var(&self.var) {
            Ok(value) if !value.is_empty() => Ok(Zeroizing::new(value)),
            _ => Err(PasscodeError::Missing {
                source_name: format!("environment variable {}", self.var),
            }),
        }
    }
}

/// OS keyring-backed provider. Generates and saves a random passcode on first use.
pub struct KeyringPasscodeProvider {
    service: String,
    account: String,
}

impl KeyringPasscodeProvider {
    pub fn new(service: impl Into<String>, account: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            account: account.into(),
        }
    }
}

#[async_trait]
impl PasscodeProvider for KeyringPasscodeProvider {
    fn name(&self) -> &'static str {
        "keyring"
    }

    async fn passcode(&self) -> Result<Zeroizing<String>, PasscodeError> {
        // Keyring operations are synchronous; wrapped in async for trait compatibility.
        let entry = keyring::Entry::new(&self.service, &self.account)
            .map_err(|e| PasscodeError::Keyring(e.to_string()))?;
        if let Some(secret) = stored_passcode(entry.get_password())? {
            return Ok(secret);
        }

        debug!(service = %self.service, "generating passcode in keyring");
        let generated = generate_passcode();
        entry
            .set_password(&generated)
            .map_err(|e| PasscodeError::Keyring(e.to_string()))?;
        Ok(generated)
    }
}

/// Fixed passcode, for tests and callers that already hold the secret.
#[derive(Clone)]
pub struct StaticPasscodeProvider {
    passcode: Zeroizing<String>,
}

impl StaticPasscodeProvider {
    pub fn new(passcode: impl Into<String>) -> Self {
        Self {
            passcode: Zeroizing::new(passcode.into()),
        }
    }
}

#[async_trait]
impl PasscodeProvider for StaticPasscodeProvider {
    fn name(&self) -> &'static str {
        "static"
    }

    async fn passcode(&self) -> Result<Zeroizing<String>, PasscodeError> {
        if self.passcode.is_empty() {
            return Err(PasscodeError::Missing {
                source_name: "static passcode".to_string(),
            });
        }
        Ok(self.passcode.clone())
    }
}

/// Fetch the passcode and build the process-wide codec from it.
pub async fn codec_from_provider(
    provider: &dyn PasscodeProvider,
    iterations: u32,
) -> Result<Codec, PasscodeError> {
    let passcode = provider.passcode().await?;
    debug!(provider = provider.name(), iterations, "passcode loaded");
    Ok(Codec::with_iterations(&passcode, iterations)?)
}

/// `None` only for a missing or empty entry. Every other keyring error
/// propagates, so a stored passcode is never replaced after a failed read.
fn stored_passcode(
    lookup: keyring::Result<String>,
) -> Result<Option<Zeroizing<String>>, PasscodeError> {
    match lookup {
        Ok(secret) if !secret.is_empty() => Ok(Some(Zeroizing::new(secret))),
        Ok(_) | Err(keyring::Error::NoEntry) => Ok(None),
        Err(err) => Err(PasscodeError::Keyring(err.to_string())),
    }
}

fn generate_passcode() -> Zeroizing<String> {
    let mut bytes = Zeroizing::new([0u8; 32]);
    OsRng.fill_bytes(&mut *bytes);
    Zeroizing::new(URL_SAFE_NO_PAD.encode(&*bytes))
}
