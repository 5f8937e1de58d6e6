use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::crypto::CryptoError;
use crate::vault::item::ItemError;

/// Errors that can occur while reading or writing a vault directory.
#[derive(Error, Debug)]
pub enum VaultError {
    /// A keys record is missing, unreadable or malformed.
    #[error("Invalid vault at {path}: {reason}")]
    InvalidVault { path: PathBuf, reason: String },

    /// No item record exists for the identifier, or the identifier is not a
    /// plain file name.
    #[error("Invalid item UUID: {0}")]
    InvalidUuid(String),

    /// The password did not unlock the vault's master key.
    #[error("Incorrect password")]
    IncorrectPassword,

    #[error("An item with UUID {0} already exists")]
    DuplicateItem(String),

    #[error("Keychain already initialised at {0}")]
    AlreadyInitialised(PathBuf),

    /// The keys record registers no key for the security level or identifier.
    #[error("No encryption key for {0}")]
    MissingKey(String),

    #[error(transparent)]
    Item(#[from] ItemError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A record could not be serialized for writing.
    #[error("Failed to encode record: {0}")]
    Encode(String),
}

impl VaultError {
    pub(crate) fn invalid_vault(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        VaultError::InvalidVault {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}
