//! Read/write vault management.
//!
//! [`DataSource`] creates vaults, authenticates and rotates passwords, and
//! adds items. Reads go through its [`Repository`].
//!
//! # Vault creation
//!
//! `initialise` writes both keys record generations so that readers of
//! either format open the vault with the same password:
//!
//! | File | Derivation | Levels |
//! |------|------------|--------|
//! | `encryptionKeys.js` | PBKDF2-HMAC-SHA1, [`default_iterations`] | SL3, SL5 |
//! | `1password.keys` | legacy `EVP_BytesToKey` | SL3, SL5 |
//!
//! All four key records wrap one freshly generated master key.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::num::NonZeroU32;
use std::path::Path;

use rand::CryptoRng;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::encryption_key::{EncryptionKey, SecurityLevel};
use super::error::VaultError;
use super::item::KeychainItem;
use super::layout::{KeysFormat, VaultLayout};
use super::records::{self, ContentsEntry, KeysRecord};
use super::repository::{Repository, VaultReader};
use crate::crypto::{CryptoError, KeyDerivation, MasterKey};

/// PBKDF2 iterations for newly written generation-4 key records.
pub const DEFAULT_ITERATIONS: NonZeroU32 = NonZeroU32::new(25_000).unwrap();

/// Iterations used when [`FAST_KDF_ENV`] is set.
///
/// This is for testing only. Never use in production!
pub const FAST_ITERATIONS: NonZeroU32 = NonZeroU32::new(1_000).unwrap();

/// Environment variable selecting [`FAST_ITERATIONS`].
pub const FAST_KDF_ENV: &str = "AGILEKEYCHAIN_FAST_KDF";

/// Build marker written to `config/buildnum`.
pub const BUILD_NUMBER: &str = "32009";

#[inline]
fn is_fast_kdf_enabled() -> bool {
    std::env::var(FAST_KDF_ENV)
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// Iteration count for new vaults: [`FAST_ITERATIONS`] if `AGILEKEYCHAIN_FAST_KDF=1`,
/// otherwise [`DEFAULT_ITERATIONS`].
pub fn default_iterations() -> NonZeroU32 {
    if is_fast_kdf_enabled() {
        FAST_ITERATIONS
    } else {
        DEFAULT_ITERATIONS
    }
}

/// Manages a vault on disk.
#[derive(Debug, Clone)]
pub struct DataSource {
    repository: Repository,
    iterations: NonZeroU32,
}

impl DataSource {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self::with_layout(VaultLayout::new(root))
    }

    pub fn with_layout(layout: VaultLayout) -> Self {
        Self {
            repository: Repository::with_layout(layout),
            iterations: default_iterations(),
        }
    }

    /// PBKDF2 iterations for key records written by [`initialise`](Self::initialise).
    pub fn with_iterations(mut self, iterations: NonZeroU32) -> Self {
        self.iterations = iterations;
        self
    }

    pub fn layout(&self) -> &VaultLayout {
        self.repository.layout()
    }

    pub fn repository(&self) -> &Repository {
        &self.repository
    }

    /// Whether a readable keys record exists. Never fails.
    pub fn is_keychain_initialised(&self) -> bool {
        match self.repository.preferred_keys() {
            Ok((_, record)) => !record.list.is_empty(),
            Err(e) => {
                debug!(error = %e, "keychain not initialised");
                false
            }
        }
    }

    /// Create the vault directory structure and master keys.
    ///
    /// # Errors
    ///
    /// - `VaultError::AlreadyInitialised`: a keys record already exists
    /// - `VaultError::Io`: the directories or files could not be written
    #[instrument(skip(self, password, rng), fields(root = %self.layout().root().display()))]
    pub fn initialise<R: CryptoRng + ?Sized>(&self, password: &str, rng: &mut R) -> Result<(), VaultError> {
        let layout = self.layout();
        if layout.preferred_keys_format().is_some() {
            return Err(VaultError::AlreadyInitialised(layout.root().to_path_buf()));
        }

        fs::create_dir_all(layout.data_dir())?;
        fs::create_dir_all(layout.config_dir())?;

        let master_key = MasterKey::random(rng);
        let sl3_id = new_identifier(rng);
        let sl5_id = new_identifier(rng);

        let generations = [
            (KeysFormat::Plist, KeyDerivation::Legacy),
            (KeysFormat::Json, KeyDerivation::Pbkdf2 { iterations: self.iterations }),
        ];
        let mut encoded = Vec::with_capacity(generations.len());
        for (format, derivation) in generations {
            let mut record = KeysRecord {
                sl3: Some(sl3_id.clone()),
                sl5: Some(sl5_id.clone()),
                list: Vec::with_capacity(2),
            };
            for (identifier, level) in [(&sl3_id, SecurityLevel::Sl3), (&sl5_id, SecurityLevel::Sl5)] {
                let key = EncryptionKey::create(
                    identifier.as_str(),
                    level,
                    &master_key,
                    password.as_bytes(),
                    derivation,
                    rng,
                )?;
                record.list.push(key.to_record());
            }
            encoded.push((layout.keys_file(format), records::encode_keys(&record, format)?));
        }

        records::write_atomic(&layout.contents_file(), b"[]")?;
        fs::write(layout.build_number_file(), format!("{BUILD_NUMBER}\n"))?;

        // A keys record marks the vault as initialised, so they go last and
        // are removed again if the set is incomplete.
        let mut written = Vec::with_capacity(encoded.len());
        for (path, bytes) in &encoded {
            if let Err(e) = records::write_atomic(path, bytes) {
                for path in written {
                    remove_partial(path);
                }
                return Err(e);
            }
            written.push(path);
        }

        info!(iterations = self.iterations.get(), "Keychain initialised");
        Ok(())
    }

    /// Unlock the master key with `password`.
    ///
    /// The SL5 key is preferred; vaults registering only SL3 fall back to it.
    ///
    /// # Errors
    ///
    /// - `VaultError::IncorrectPassword`: wrong password
    /// - `VaultError::MissingKey`: no key is registered for either level
    #[instrument(level = "debug", skip(self, password))]
    pub fn authenticate(&self, password: &str) -> Result<MasterKey, VaultError> {
        for level in [SecurityLevel::Sl5, SecurityLevel::Sl3] {
            if let Some(key) = self.repository.key_for_security_level(level)? {
                return key.decrypt(password.as_bytes()).map_err(incorrect_password);
            }
        }
        Err(VaultError::MissingKey(SecurityLevel::default().to_string()))
    }

    /// Like [`authenticate`](Self::authenticate), but reports failure as `false`.
    pub fn verify_password(&self, password: &str) -> bool {
        match self.authenticate(password) {
            Ok(_) => true,
            Err(VaultError::IncorrectPassword) => false,
            Err(e) => {
                warn!(error = %e, "password could not be verified");
                false
            }
        }
    }

    /// Re-encrypt every key record under `new_password`.
    ///
    /// Every keys file present is rewritten through a temporary file and a
    /// rename. All records are re-encrypted before anything is written, so a
    /// failure leaves the vault untouched. The master key does not change,
    /// so items need no re-encryption.
    ///
    /// # Errors
    ///
    /// `VaultError::IncorrectPassword` if `current_password` does not unlock
    /// every key record.
    #[instrument(skip(self, current_password, new_password, rng))]
    pub fn set_password<R: CryptoRng + ?Sized>(
        &self,
        current_password: &str,
        new_password: &str,
        rng: &mut R,
    ) -> Result<(), VaultError> {
        self.authenticate(current_password)?;

        let layout = self.layout();
        let mut pending = Vec::new();
        for format in [KeysFormat::Json, KeysFormat::Plist] {
            let path = layout.keys_file(format);
            if !path.is_file() {
                continue;
            }
            let mut record = self.repository.read_keys(format)?;
            for entry in &mut record.list {
                let mut key = EncryptionKey::from_record(entry)
                    .map_err(|e| VaultError::invalid_vault(&path, e))?;
                key.re_encrypt(current_password.as_bytes(), new_password.as_bytes(), rng)
                    .map_err(incorrect_password)?;
                *entry = key.to_record();
            }
            pending.push((path, records::encode_keys(&record, format)?));
        }

        for (path, bytes) in &pending {
            records::write_atomic(path, bytes)?;
        }
        info!(files = pending.len(), "Password changed");
        Ok(())
    }

    /// Persist a new, encrypted item and list it in `contents.js`.
    ///
    /// # Errors
    ///
    /// - `VaultError::DuplicateItem`: an item with the same UUID exists
    /// - `VaultError::InvalidUuid`: the UUID is not a plain file name
    /// - `VaultError::Item`: the item has not been encrypted
    /// - `VaultError::InvalidVault`: `contents.js` is malformed; nothing is written
    #[instrument(level = "debug", skip(self, item), fields(uuid = %item.uuid()))]
    pub fn add_item(&self, item: &KeychainItem) -> Result<(), VaultError> {
        let record = item.to_record()?;
        let path = self
            .layout()
            .item_file(&record.uuid)
            .ok_or_else(|| VaultError::InvalidUuid(record.uuid.clone()))?;
        let bytes = records::encode_json(&record)?;

        let contents_path = self.layout().contents_file();
        let mut contents: Vec<ContentsEntry> = if contents_path.is_file() {
            records::read_json(&contents_path)?
        } else {
            Vec::new()
        };
        contents.push(ContentsEntry::for_record(&record));
        let index = records::encode_json(&contents)?;

        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(VaultError::DuplicateItem(record.uuid));
            }
            Err(e) => return Err(e.into()),
        };
        let written = file.write_all(&bytes).and_then(|()| file.sync_all());
        drop(file);
        if let Err(e) = written {
            remove_partial(&path);
            return Err(e.into());
        }

        // An unindexed item file would block every retry with DuplicateItem.
        if let Err(e) = records::write_atomic(&contents_path, &index) {
            remove_partial(&path);
            return Err(e);
        }

        debug!("item added");
        Ok(())
    }

    /// Whether the SL3 and SL5 keys wrap the same master key.
    ///
    /// Vaults created by [`initialise`](Self::initialise) always do; vaults
    /// created elsewhere commonly use two distinct keys, which is reported
    /// but not treated as an error.
    pub fn verify_key_consistency(&self, password: &str) -> Result<bool, VaultError> {
        let mut master_keys = Vec::with_capacity(2);
        for level in SecurityLevel::ALL {
            let key = self
                .repository
                .key_for_security_level(level)?
                .ok_or_else(|| VaultError::MissingKey(level.to_string()))?;
            master_keys.push(key.decrypt(password.as_bytes()).map_err(incorrect_password)?);
        }

        let consistent = master_keys[0] == master_keys[1];
        if !consistent {
            warn!("SL3 and SL5 keys wrap different master keys");
        }
        Ok(consistent)
    }
}

impl VaultReader for DataSource {
    fn key_for_security_level(&self, level: SecurityLevel) -> Result<Option<EncryptionKey>, VaultError> {
        self.repository.key_for_security_level(level)
    }

    fn item_by_id(&self, uuid: &str) -> Result<KeychainItem, VaultError> {
        self.repository.item_by_id(uuid)
    }
}

/// Best-effort removal of a file left behind by a failed write.
fn remove_partial(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        warn!(path = %path.display(), error = %e, "could not remove partially written file");
    }
}

fn incorrect_password(error: CryptoError) -> VaultError {
    match error {
        CryptoError::InvalidPassword => VaultError::IncorrectPassword,
        other => other.into(),
    }
}

/// Random 32-digit uppercase hex identifier, the form the format uses for
/// keys and items.
pub fn new_identifier<R: CryptoRng + ?Sized>(rng: &mut R) -> String {
    let mut bytes = [0u8; 16];
    rng.fill_bytes(&mut bytes);
    let uuid = uuid::Builder::from_random_bytes(bytes).into_uuid();
    uuid.simple()
        .encode_upper(&mut Uuid::encode_buffer())
        .to_string()
}
