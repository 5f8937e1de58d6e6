//! Session gate over a vault.
//!
//! A [`Keychain`] starts locked and hands out items only after a password has
//! authenticated against one of the vault's master keys. It keeps nothing but
//! the lock state: the decrypted master key is dropped as soon as the
//! password is verified, and items come back still encrypted.

use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::crypto::CryptoError;
use crate::vault::{KeychainItem, SecurityLevel, VaultError, VaultReader};

#[derive(Error, Debug)]
pub enum KeychainError {
    /// Item access was attempted before a successful unlock.
    #[error("Keychain is locked")]
    Locked,

    #[error("Invalid password")]
    InvalidPassword,

    #[error("No encryption key registered for {0}")]
    MissingKey(SecurityLevel),

    #[error(transparent)]
    Vault(#[from] VaultError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LockState {
    #[default]
    Locked,
    Unlocked,
}

/// Lock state machine borrowing a vault reader.
///
/// Not internally synchronised; share it behind a mutex if needed.
#[derive(Debug)]
pub struct Keychain<'a, R: VaultReader + ?Sized> {
    repository: &'a R,
    state: LockState,
}

impl<'a, R: VaultReader + ?Sized> Keychain<'a, R> {
    pub fn new(repository: &'a R) -> Self {
        Self {
            repository,
            state: LockState::Locked,
        }
    }

    /// Unlock with the key registered for the default level (SL5).
    pub fn unlock(&mut self, password: &str) -> Result<(), KeychainError> {
        self.unlock_at(password, SecurityLevel::default())
    }

    /// Unlock with the key registered for `level`.
    ///
    /// Any failure leaves the keychain locked, even if it was unlocked before.
    #[instrument(skip(self, password))]
    pub fn unlock_at(&mut self, password: &str, level: SecurityLevel) -> Result<(), KeychainError> {
        self.state = LockState::Locked;

        let key = self
            .repository
            .key_for_security_level(level)?
            .ok_or(KeychainError::MissingKey(level))?;

        match key.decrypt(password.as_bytes()) {
            Ok(_) => {
                self.state = LockState::Unlocked;
                info!("Keychain unlocked");
                Ok(())
            }
            Err(CryptoError::InvalidPassword) => {
                debug!("unlock rejected");
                Err(KeychainError::InvalidPassword)
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn lock(&mut self) {
        self.state = LockState::Locked;
        debug!("Keychain locked");
    }

    pub fn state(&self) -> LockState {
        self.state
    }

    pub fn is_locked(&self) -> bool {
        self.state == LockState::Locked
    }

    /// Fetch an item, still encrypted.
    ///
    /// # Errors
    ///
    /// `KeychainError::Locked` unless the keychain is unlocked.
    pub fn get_item_by_unique_id(&self, uuid: &str) -> Result<KeychainItem, KeychainError> {
        if self.is_locked() {
            return Err(KeychainError::Locked);
        }
        Ok(self.repository.item_by_id(uuid)?)
    }
}
