//! Authenticated-encryption envelope.
//!
//! An envelope is `base64(salt || nonce || ciphertext || tag)`. The AES-256-GCM key
//! is re-derived from the passcode and the envelope's own salt with
//! PBKDF2-HMAC-SHA256, so decoding needs nothing but the token and the passcode.

use std::fmt;

use aes_gcm::{
    aead::{rand_core::RngCore, Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Key, Nonce,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Serialize;
use serde_json::Value;
use sha2::Sha256;
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

/// Random KDF salt stored at the front of every envelope.
pub const SALT_LEN: usize = 16;
/// AES-GCM nonce (96 bits).
pub const NONCE_LEN: usize = 12;
/// AES-GCM authentication tag (128 bits).
pub const TAG_LEN: usize = 16;
/// AES-256 key length.
pub const KEY_LEN: usize = 32;
/// Smallest decodable envelope: salt, nonce and the tag of an empty plaintext.
pub const MIN_ENVELOPE_LEN: usize = SALT_LEN + NONCE_LEN + TAG_LEN;
/// PBKDF2 iteration count used unless a codec is built with an explicit one.
pub const DEFAULT_ITERATIONS: u32 = 100_000;

pub type Salt = [u8; SALT_LEN];

/// Failures surfaced by the codec. None of them are retryable.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EnvelopeError {
    /// Codec could not be constructed (empty passcode, zero iterations).
    #[error("codec configuration error: {reason}")]
    Configuration { reason: String },
    /// Plaintext value could not be serialized to JSON.
    #[error("failed to serialize plaintext: {reason}")]
    Serialization { reason: String },
    /// Input is not base64 or too short to be an envelope.
    #[error("malformed envelope: {reason}")]
    Malformed { reason: String },
    /// Tag verification failed. Deliberately carries no detail.
    #[error("decryption failed")]
    Authentication,
}

/// Plaintext accepted by [`Codec::encrypt`] and recovered by [`Codec::decrypt`].
#[derive(Debug, Clone, PartialEq)]
pub enum PlainValue {
    /// Raw bytes, sealed unchanged.
    Bytes(Vec<u8>),
    /// UTF-8 text.
    Text(String),
    /// Structured value, sealed as compact JSON.
    Json(Value),
}

impl PlainValue {
    fn to_plaintext(&self) -> Result<Zeroizing<Vec<u8>>, EnvelopeError> {
        let bytes = match self {
            PlainValue::Bytes(bytes) => bytes.clone(),
            PlainValue::Text(text) => text.as_bytes().to_vec(),
            PlainValue::Json(value) => serde_json::to_vec(value).map_err(serialization_err)?,
        };
        Ok(Zeroizing::new(bytes))
    }

    /// Recover a typed value from decrypted bytes.
    ///
    /// The envelope carries no content-type tag, so the type is recovered by
    /// trying JSON first, then UTF-8 text, then falling back to raw bytes.
    pub fn from_plaintext(bytes: Vec<u8>) -> Self {
        match String::from_utf8(bytes) {
            Ok(text) => match serde_json::from_str::<Value>(&text) {
                Ok(value) => PlainValue::Json(value),
                Err(_) => PlainValue::Text(text),
            },
            Err(err) => PlainValue::Bytes(err.into_bytes()),
        }
    }

    /// JSON rendition for transport: bytes become a base64 string.
    pub fn into_json(self) -> Value {
        match self {
            PlainValue::Json(value) => value,
            PlainValue::Text(text) => Value::String(text),
            PlainValue::Bytes(bytes) => Value::String(STANDARD.encode(bytes)),
        }
    }
}

impl From<String> for PlainValue {
    fn from(value: String) -> Self {
        PlainValue::Text(value)
    }
}

impl From<&str> for PlainValue {
    fn from(value: &str) -> Self {
        PlainValue::Text(value.to_string())
    }
}

impl From<Vec<u8>> for PlainValue {
    fn from(value: Vec<u8>) -> Self {
        PlainValue::Bytes(value)
    }
}

impl From<Value> for PlainValue {
    fn from(value: Value) -> Self {
        PlainValue::Json(value)
    }
}

/// 256-bit key derived from a passcode and salt. Wiped on drop.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct DerivedKey([u8; KEY_LEN]);

impl DerivedKey {
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DerivedKey(***)")
    }
}

/// Derive a key with PBKDF2-HMAC-SHA256. A fresh random salt is generated
/// when none is given; the salt actually used is returned with the key.
pub fn derive_key(passcode: &[u8], salt: Option<Salt>, iterations: u32) -> (DerivedKey, Salt) {
    let salt = salt.unwrap_or_else(random_salt);
    let mut key = DerivedKey([0u8; KEY_LEN]);
    pbkdf2::pbkdf2_hmac::<Sha256>(passcode, &salt, iterations, &mut key.0);
    (key, salt)
}

fn random_salt() -> Salt {
    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    salt
}

/// Envelope codec bound to one passcode for its whole lifetime.
///
/// Stateless per call: every `encrypt` draws its own salt and nonce, so a
/// single `Codec` can be shared across threads behind an `Arc`.
pub struct Codec {
    passcode: Zeroizing<String>,
    iterations: u32,
}

impl Codec {
    /// Build a codec with [`DEFAULT_ITERATIONS`]. Rejects an empty passcode.
    pub fn new(passcode: &str) -> Result<Self, EnvelopeError> {
        Self::with_iterations(passcode, DEFAULT_ITERATIONS)
    }

    /// Build a codec with an explicit PBKDF2 iteration count.
    ///
    /// The count is not recorded in the envelope; decoding with a different
    /// count than encoding fails authentication.
    pub fn with_iterations(passcode: &str, iterations: u32) -> Result<Self, EnvelopeError> {
        if passcode.is_empty() {
            return Err(EnvelopeError::Configuration {
                reason: "passcode is missing or empty".to_string(),
            });
        }
        if iterations == 0 {
            return Err(EnvelopeError::Configuration {
                reason: "kdf iteration count must be positive".to_string(),
            });
        }
        Ok(Self {
            passcode: Zeroizing::new(passcode.to_string()),
            iterations,
        })
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    /// Derive the key for `salt` (or a fresh salt) from this codec's passcode.
    pub fn derive_key(&self, salt: Option<Salt>) -> (DerivedKey, Salt) {
        derive_key(self.passcode.as_bytes(), salt, self.iterations)
    }

    /// Seal a plaintext value into a base64 envelope.
    pub fn encrypt(&self, value: &PlainValue) -> Result<String, EnvelopeError> {
        let plaintext = value.to_plaintext()?;
        self.seal(&plaintext)
    }

    /// Serialize any `Serialize` value to JSON and seal it.
    pub fn encrypt_json<T: Serialize + ?Sized>(&self, value: &T) -> Result<String, EnvelopeError> {
        let plaintext = Zeroizing::new(serde_json::to_vec(value).map_err(serialization_err)?);
        self.seal(&plaintext)
    }

    /// Open an envelope and recover the typed plaintext.
    pub fn decrypt(&self, envelope: &str) -> Result<PlainValue, EnvelopeError> {
        let plaintext = self.open(envelope)?;
        Ok(PlainValue::from_plaintext(plaintext))
    }

    /// Seal raw bytes.
    pub fn seal(&self, plaintext: &[u8]) -> Result<String, EnvelopeError> {
        let (key, salt) = self.derive_key(None);
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext =
            cipher
                .encrypt(&nonce, plaintext)
                .map_err(|_| EnvelopeError::Serialization {
                    reason: "plaintext exceeds AES-GCM limits".to_string(),
                })?;

        let mut packed = Vec::with_capacity(SALT_LEN + NONCE_LEN + ciphertext.len());
        packed.extend_from_slice(&salt);
        packed.extend_from_slice(nonce.as_slice());
        packed.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(packed))
    }

    /// Open an envelope into raw plaintext bytes.
    pub fn open(&self, envelope: &str) -> Result<Vec<u8>, EnvelopeError> {
        let packed = STANDARD
            .decode(envelope.trim())
            .map_err(|e| EnvelopeError::Malformed {
                reason: format!("invalid base64: {e}"),
            })?;
        if packed.len() < MIN_ENVELOPE_LEN {
            return Err(EnvelopeError::Malformed {
                reason: format!(
                    "expected at least {MIN_ENVELOPE_LEN} bytes, got {}",
                    packed.len()
                ),
            });
        }

        let (salt, rest) = packed.split_at(SALT_LEN);
        let (nonce, ciphertext) = rest.split_at(NONCE_LEN);
        let mut salt_bytes = [0u8; SALT_LEN];
        salt_bytes.copy_from_slice(salt);

        let (key, _) = self.derive_key(Some(salt_bytes));
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));
        cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| EnvelopeError::Authentication)
    }
}

impl fmt::Debug for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Codec")
            .field("passcode", &"***")
            .field("iterations", &self.iterations)
            .finish()
    }
}

fn serialization_err(err: serde_json::Error) -> EnvelopeError {
    EnvelopeError::Serialization {
        reason: err.to_string(),
    }
}
