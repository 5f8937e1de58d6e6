//! Read-only access to a vault directory.
//!
//! Nothing is cached: every lookup re-reads the relevant file, so a
//! [`Repository`] always reflects what is on disk.

use std::fs;
use std::path::Path;

use tracing::{debug, instrument, warn};

use super::encryption_key::{EncryptionKey, SecurityLevel};
use super::error::VaultError;
use super::item::KeychainItem;
use super::layout::{KeysFormat, VaultLayout};
use super::records::{self, ContentsEntry, ItemRecord, KeysRecord};

/// The lookups a [`Keychain`](crate::keychain::Keychain) needs from a vault.
pub trait VaultReader {
    /// The key registered for `level`, or `None` if the vault registers none.
    fn key_for_security_level(&self, level: SecurityLevel) -> Result<Option<EncryptionKey>, VaultError>;

    /// The item stored under `uuid`, still encrypted.
    fn item_by_id(&self, uuid: &str) -> Result<KeychainItem, VaultError>;
}

/// Loads keys and items from a vault without modifying it.
#[derive(Debug, Clone)]
pub struct Repository {
    layout: VaultLayout,
}

impl Repository {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self::with_layout(VaultLayout::new(root))
    }

    pub fn with_layout(layout: VaultLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &VaultLayout {
        &self.layout
    }

    /// Read the keys record in `format`.
    ///
    /// # Errors
    ///
    /// `VaultError::InvalidVault` if the file is missing, unreadable or malformed.
    #[instrument(level = "debug", skip(self))]
    pub fn read_keys(&self, format: KeysFormat) -> Result<KeysRecord, VaultError> {
        let path = self.layout.keys_file(format);
        let bytes = fs::read(&path).map_err(|e| VaultError::invalid_vault(&path, e))?;
        records::decode_keys(&bytes, format, &path)
    }

    /// The keys record this vault is read through: `encryptionKeys.js` when
    /// present, otherwise `1password.keys`.
    pub fn preferred_keys(&self) -> Result<(KeysFormat, KeysRecord), VaultError> {
        let format = self.layout.preferred_keys_format().ok_or_else(|| {
            VaultError::invalid_vault(self.layout.data_dir(), "no encryption keys record")
        })?;
        debug!(?format, "reading keys record");
        Ok((format, self.read_keys(format)?))
    }

    /// Every key in the preferred keys record.
    pub fn keys(&self) -> Result<Vec<EncryptionKey>, VaultError> {
        let (format, record) = self.preferred_keys()?;
        let path = self.layout.keys_file(format);
        record
            .list
            .iter()
            .map(|key| EncryptionKey::from_record(key).map_err(|e| VaultError::invalid_vault(&path, e)))
            .collect()
    }

    pub fn key_by_identifier(&self, identifier: &str) -> Result<Option<EncryptionKey>, VaultError> {
        let (format, record) = self.preferred_keys()?;
        find_key(&record, identifier, &self.layout.keys_file(format))
    }

    /// Read the `contents.js` index.
    pub fn contents(&self) -> Result<Vec<ContentsEntry>, VaultError> {
        records::read_json(&self.layout.contents_file())
    }
}

impl VaultReader for Repository {
    #[instrument(level = "debug", skip(self))]
    fn key_for_security_level(&self, level: SecurityLevel) -> Result<Option<EncryptionKey>, VaultError> {
        let (format, record) = self.preferred_keys()?;
        let identifier = match level {
            SecurityLevel::Sl3 => record.sl3.as_deref(),
            SecurityLevel::Sl5 => record.sl5.as_deref(),
        };
        let Some(identifier) = identifier else {
            debug!("no key registered for level");
            return Ok(None);
        };
        let key = find_key(&record, identifier, &self.layout.keys_file(format))?;
        if key.is_none() {
            warn!(identifier, "security level refers to a key missing from the list");
        }
        Ok(key)
    }

    #[instrument(level = "debug", skip(self))]
    fn item_by_id(&self, uuid: &str) -> Result<KeychainItem, VaultError> {
        let path = self
            .layout
            .item_file(uuid)
            .ok_or_else(|| VaultError::InvalidUuid(uuid.to_string()))?;

        let bytes = fs::read(&path).map_err(|e| {
            debug!(error = %e, "item file unreadable");
            VaultError::InvalidUuid(uuid.to_string())
        })?;

        let mut record: ItemRecord =
            serde_json::from_slice(&bytes).map_err(|e| VaultError::invalid_vault(&path, e))?;
        if record.uuid.is_empty() {
            record.uuid = uuid.to_string();
        } else if record.uuid != uuid {
            warn!(stored = %record.uuid, "item record uuid differs from its file name");
            record.uuid = uuid.to_string();
        }
        Ok(KeychainItem::from_record(record))
    }
}

fn find_key(
    record: &KeysRecord,
    identifier: &str,
    path: &Path,
) -> Result<Option<EncryptionKey>, VaultError> {
    record
        .list
        .iter()
        .find(|key| key.identifier == identifier)
        .map(|key| EncryptionKey::from_record(key).map_err(|e| VaultError::invalid_vault(path, e)))
        .transpose()
}
