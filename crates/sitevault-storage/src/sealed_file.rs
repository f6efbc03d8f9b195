use std::{fs, path::Path};

use sitevault_core::{
    envelope::{Codec, EnvelopeError, PlainValue},
    storage::StoreError,
};
use thiserror::Error;
use tracing::debug;

use crate::file_store::write_atomic;

#[derive(Debug, Error)]
pub enum FileError {
    #[error("{path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Envelope(#[from] EnvelopeError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl FileError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        FileError::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

/// Encrypt a UTF-8 text file into an envelope file.
pub fn seal_file(codec: &Codec, input: &Path, output: &Path) -> Result<(), FileError> {
    let plaintext = fs::read_to_string(input).map_err(|e| FileError::io(input, e))?;
    let envelope = codec.encrypt(&PlainValue::Text(plaintext))?;
    write_atomic(output, envelope.as_bytes())?;
    debug!(output = %output.display(), "sealed file");
    Ok(())
}

/// Decrypt an envelope file.
pub fn open_file(codec: &Codec, path: &Path) -> Result<PlainValue, FileError> {
    let envelope = fs::read_to_string(path).map_err(|e| FileError::io(path, e))?;
    Ok(codec.decrypt(&envelope)?)
}
