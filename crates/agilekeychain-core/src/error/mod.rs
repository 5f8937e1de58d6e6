//! Error types for the agilekeychain crate
//!
//! Each layer defines its own error enum next to the code that raises it;
//! this module gathers them in one place.

pub use crate::crypto::CryptoError;
pub use crate::keychain::KeychainError;
pub use crate::vault::error::VaultError;
pub use crate::vault::item::{DecryptionError, ItemError};
