//! Password-protected master key records.
//!
//! Each [`EncryptionKey`] holds two envelopes:
//!
//! - the key blob, the master key sealed under the user's password with the
//!   record's [`KeyDerivation`]
//! - the validation blob, the master key sealed under *itself* with the legacy
//!   derivation
//!
//! A password is accepted only when the master key recovered from the key
//! blob also opens the validation blob and reproduces itself. The format has
//! no MAC, so this double check is the authentication mechanism.

use std::fmt;
use std::str::FromStr;

use rand::CryptoRng;
use tracing::{debug, instrument};

use crate::crypto::{CryptoError, KeyDerivation, MasterKey, envelope};
use crate::vault::records::KeyRecord;

/// Legacy compatibility tier a master key is registered under.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum SecurityLevel {
    Sl3,
    #[default]
    Sl5,
}

impl SecurityLevel {
    pub const ALL: [SecurityLevel; 2] = [SecurityLevel::Sl3, SecurityLevel::Sl5];

    pub fn as_str(self) -> &'static str {
        match self {
            SecurityLevel::Sl3 => "SL3",
            SecurityLevel::Sl5 => "SL5",
        }
    }
}

impl fmt::Display for SecurityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SecurityLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SL3" => Ok(SecurityLevel::Sl3),
            "SL5" => Ok(SecurityLevel::Sl5),
            other => Err(format!("unknown security level {other:?}")),
        }
    }
}

/// A master key encrypted under the user's password.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptionKey {
    identifier: String,
    level: Option<SecurityLevel>,
    encrypted_key: Vec<u8>,
    validation: Vec<u8>,
    derivation: KeyDerivation,
}

impl EncryptionKey {
    /// Seal `master_key` under `password` as a new key record.
    pub fn create<R: CryptoRng + ?Sized>(
        identifier: impl Into<String>,
        level: SecurityLevel,
        master_key: &MasterKey,
        password: &[u8],
        derivation: KeyDerivation,
        rng: &mut R,
    ) -> Result<Self, CryptoError> {
        let (encrypted_key, validation) = seal_master_key(master_key, password, derivation, rng)?;
        Ok(Self {
            identifier: identifier.into(),
            level: Some(level),
            encrypted_key,
            validation,
            derivation,
        })
    }

    /// Build from a decoded keys-record entry.
    ///
    /// # Errors
    ///
    /// `CryptoError::InvalidIterationCount` if the record declares zero iterations.
    pub fn from_record(record: &KeyRecord) -> Result<Self, CryptoError> {
        Ok(Self {
            identifier: record.identifier.clone(),
            level: record.level.as_deref().and_then(|l| l.parse().ok()),
            encrypted_key: record.data.clone(),
            validation: record.validation.clone(),
            derivation: KeyDerivation::from_iterations(record.iterations)?,
        })
    }

    pub fn to_record(&self) -> KeyRecord {
        KeyRecord {
            identifier: self.identifier.clone(),
            level: self.level.map(|l| l.as_str().to_string()),
            data: self.encrypted_key.clone(),
            validation: self.validation.clone(),
            iterations: self.derivation.iterations(),
        }
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn level(&self) -> Option<SecurityLevel> {
        self.level
    }

    pub fn derivation(&self) -> KeyDerivation {
        self.derivation
    }

    pub fn encrypted_key(&self) -> &[u8] {
        &self.encrypted_key
    }

    pub fn validation(&self) -> &[u8] {
        &self.validation
    }

    /// Recover the master key with `password`.
    ///
    /// # Errors
    ///
    /// - `CryptoError::InvalidPassword`: the key blob did not decrypt, or the
    ///   result did not reproduce the validation blob
    /// - `CryptoError::InvalidEnvelope` / `InvalidCiphertextLength`: a blob is
    ///   structurally corrupt
    #[instrument(level = "debug", skip(self, password), fields(identifier = %self.identifier))]
    pub fn decrypt(&self, password: &[u8]) -> Result<MasterKey, CryptoError> {
        let candidate = match envelope::open(&self.encrypted_key, password, self.derivation) {
            Ok(bytes) => MasterKey::from_bytes(bytes.to_vec()),
            Err(CryptoError::MalformedPadding) => {
                debug!("key blob did not decrypt");
                return Err(CryptoError::InvalidPassword);
            }
            Err(e) => return Err(e),
        };

        let validated = candidate.with_raw_key(|raw| {
            match envelope::open(&self.validation, raw, KeyDerivation::Legacy) {
                Ok(validation) => Ok(candidate.ct_eq_bytes(&validation)),
                Err(CryptoError::MalformedPadding) => Ok(false),
                Err(e) => Err(e),
            }
        })?;

        if !validated {
            debug!("validation blob mismatch");
            return Err(CryptoError::InvalidPassword);
        }
        Ok(candidate)
    }

    /// Re-seal the same master key under `new_password`.
    ///
    /// The derivation is kept, so generation-4 records stay PBKDF2 with the
    /// same iteration count and items need no re-encryption.
    pub fn re_encrypt<R: CryptoRng + ?Sized>(
        &mut self,
        current_password: &[u8],
        new_password: &[u8],
        rng: &mut R,
    ) -> Result<(), CryptoError> {
        let master_key = self.decrypt(current_password)?;
        let (encrypted_key, validation) =
            seal_master_key(&master_key, new_password, self.derivation, rng)?;
        self.encrypted_key = encrypted_key;
        self.validation = validation;
        Ok(())
    }
}

fn seal_master_key<R: CryptoRng + ?Sized>(
    master_key: &MasterKey,
    password: &[u8],
    derivation: KeyDerivation,
    rng: &mut R,
) -> Result<(Vec<u8>, Vec<u8>), CryptoError> {
    master_key.with_raw_key(|raw| {
        let encrypted_key = envelope::seal(raw, password, derivation, rng)?;
        let validation = envelope::seal(raw, raw, KeyDerivation::Legacy, rng)?;
        Ok((encrypted_key, validation))
    })
}
