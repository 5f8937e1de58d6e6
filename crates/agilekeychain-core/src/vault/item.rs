//! Vault items and their encrypted contents.

use rand::CryptoRng;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, instrument};
use zeroize::Zeroizing;

use crate::crypto::{CryptoError, KeyDerivation, MasterKey, envelope};
use crate::vault::records::{ItemMetadata, ItemRecord};

/// Decrypted secret contents of an item: named fields as a JSON object.
pub type ItemPayload = Map<String, Value>;

/// Why an item's ciphertext did not yield a payload.
#[derive(Error, Debug)]
pub enum DecryptionError {
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error("Decrypted payload is not a JSON object: {0}")]
    Payload(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum ItemError {
    #[error("Failed to decrypt item {uuid}: {source}")]
    Decryption {
        uuid: String,
        #[source]
        source: DecryptionError,
    },

    /// `encrypt` was called on an item whose payload has not been decrypted.
    #[error("Item {0} has no decrypted contents")]
    MissingContents(String),

    /// The item holds only unsealed contents.
    #[error("Item {0} has not been encrypted")]
    NotEncrypted(String),

    #[error("Failed to encrypt item {uuid}: {source}")]
    Encryption {
        uuid: String,
        #[source]
        source: DecryptionError,
    },
}

/// What an item currently holds.
///
/// Exactly one representation is authoritative at a time: ciphertext read
/// from disk, ciphertext together with the payload it decrypted to, or new
/// plaintext that has not been sealed yet.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemContents {
    Encrypted(Vec<u8>),
    Decrypted { envelope: Vec<u8>, payload: ItemPayload },
    Plaintext(ItemPayload),
}

/// A single vault entry.
///
/// Items never enforce lock state themselves; callers reach them through a
/// [`Keychain`](crate::keychain::Keychain) and must pass the master key
/// explicitly to decrypt.
#[derive(Debug, Clone, PartialEq)]
pub struct KeychainItem {
    uuid: String,
    key_identifier: String,
    contents: ItemContents,
    metadata: ItemMetadata,
}

impl KeychainItem {
    /// A new, empty item sealed by the key `key_identifier`.
    pub fn new(uuid: impl Into<String>, key_identifier: impl Into<String>) -> Self {
        Self {
            uuid: uuid.into(),
            key_identifier: key_identifier.into(),
            contents: ItemContents::Plaintext(ItemPayload::new()),
            metadata: ItemMetadata::default(),
        }
    }

    /// Wrap a stored record without decrypting it.
    pub fn from_record(record: ItemRecord) -> Self {
        Self {
            uuid: record.uuid,
            key_identifier: record.key_id,
            contents: ItemContents::Encrypted(record.encrypted),
            metadata: record.metadata,
        }
    }

    /// The record to persist.
    ///
    /// # Errors
    ///
    /// `ItemError::NotEncrypted` if the item holds unsealed contents; call
    /// [`encrypt`](Self::encrypt) first.
    pub fn to_record(&self) -> Result<ItemRecord, ItemError> {
        let encrypted = self
            .envelope()
            .ok_or_else(|| ItemError::NotEncrypted(self.uuid.clone()))?;
        Ok(ItemRecord {
            uuid: self.uuid.clone(),
            key_id: self.key_identifier.clone(),
            encrypted: encrypted.to_vec(),
            metadata: self.metadata.clone(),
        })
    }

    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    pub fn key_identifier(&self) -> &str {
        &self.key_identifier
    }

    pub fn contents(&self) -> &ItemContents {
        &self.contents
    }

    pub fn metadata(&self) -> &ItemMetadata {
        &self.metadata
    }

    pub fn metadata_mut(&mut self) -> &mut ItemMetadata {
        &mut self.metadata
    }

    /// Sealed contents, if the ciphertext is current.
    pub fn envelope(&self) -> Option<&[u8]> {
        match &self.contents {
            ItemContents::Encrypted(envelope) | ItemContents::Decrypted { envelope, .. } => {
                Some(envelope.as_slice())
            }
            ItemContents::Plaintext(_) => None,
        }
    }

    /// Secret contents, if decrypted or newly set.
    pub fn payload(&self) -> Option<&ItemPayload> {
        match &self.contents {
            ItemContents::Decrypted { payload, .. } | ItemContents::Plaintext(payload) => {
                Some(payload)
            }
            ItemContents::Encrypted(_) => None,
        }
    }

    /// Replace the secret contents. Any existing ciphertext is discarded and
    /// the item must be encrypted again before it is persisted.
    pub fn set_private_contents(&mut self, payload: ItemPayload) {
        self.contents = ItemContents::Plaintext(payload);
    }

    /// Open the ciphertext with `master_key` and keep the payload alongside it.
    ///
    /// Decrypting an already decrypted item re-reads the ciphertext.
    #[instrument(level = "debug", skip(self, master_key), fields(uuid = %self.uuid))]
    pub fn decrypt(&mut self, master_key: &MasterKey) -> Result<(), ItemError> {
        let sealed = self
            .envelope()
            .ok_or_else(|| ItemError::NotEncrypted(self.uuid.clone()))?
            .to_vec();

        let payload = master_key
            .with_raw_key(|raw| -> Result<ItemPayload, DecryptionError> {
                let plaintext = envelope::open(&sealed, raw, KeyDerivation::Legacy)?;
                Ok(serde_json::from_slice(&plaintext)?)
            })
            .map_err(|source| ItemError::Decryption {
                uuid: self.uuid.clone(),
                source,
            })?;

        debug!(fields = payload.len(), "decrypted item");
        self.contents = ItemContents::Decrypted {
            envelope: sealed,
            payload,
        };
        Ok(())
    }

    /// Seal the payload under `master_key` with a fresh salt.
    ///
    /// Afterwards the item holds ciphertext only.
    #[instrument(level = "debug", skip(self, master_key, rng), fields(uuid = %self.uuid))]
    pub fn encrypt<R: CryptoRng + ?Sized>(
        &mut self,
        master_key: &MasterKey,
        rng: &mut R,
    ) -> Result<(), ItemError> {
        let payload = self
            .payload()
            .ok_or_else(|| ItemError::MissingContents(self.uuid.clone()))?;

        let sealed = master_key
            .with_raw_key(|raw| -> Result<Vec<u8>, DecryptionError> {
                let plaintext = Zeroizing::new(serde_json::to_vec(payload)?);
                Ok(envelope::seal(&plaintext, raw, KeyDerivation::Legacy, rng)?)
            })
            .map_err(|source| ItemError::Encryption {
                uuid: self.uuid.clone(),
                source,
            })?;

        self.contents = ItemContents::Encrypted(sealed);
        Ok(())
    }
}
