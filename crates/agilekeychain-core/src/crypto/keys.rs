#![forbid(unsafe_code)]
//! Master key material shared by every key record and item in a vault.

use std::fmt;

use rand::CryptoRng;
use secrecy::{ExposeSecret, SecretSlice};
use subtle::ConstantTimeEq;

/// Length of master key material generated for new vaults.
///
/// Existing vaults may carry other lengths; nothing else depends on this.
pub const MASTER_KEY_LEN: usize = 1024;

/// Raw master key material for an AgileKeychain vault.
///
/// The master key is the secret handed to [`legacy_derive`] when encrypting or
/// decrypting items and validation blobs. Each security level stores it
/// encrypted under the user's password.
///
/// # Security
///
/// The bytes live in a `secrecy::SecretSlice`, which zeroes them on drop and
/// keeps them out of `Debug` output. Access is scoped through
/// [`with_raw_key`](Self::with_raw_key), and equality is constant time.
///
/// [`legacy_derive`]: super::kdf::legacy_derive
pub struct MasterKey {
    material: SecretSlice<u8>,
}

impl MasterKey {
    /// Generate fresh master key material from a cryptographically secure RNG.
    pub fn random<R: CryptoRng + ?Sized>(rng: &mut R) -> Self {
        let mut material = vec![0u8; MASTER_KEY_LEN];
        rng.fill_bytes(&mut material);
        Self::from_bytes(material)
    }

    /// Take ownership of decrypted key material.
    pub fn from_bytes(material: Vec<u8>) -> Self {
        Self {
            material: SecretSlice::from(material),
        }
    }

    /// Execute a function with access to the raw key material.
    ///
    /// The material never leaves this call; callers get a borrowed slice only.
    pub fn with_raw_key<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&[u8]) -> R,
    {
        f(self.material.expose_secret())
    }

    pub fn len(&self) -> usize {
        self.material.expose_secret().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Constant-time comparison against candidate bytes.
    pub fn ct_eq_bytes(&self, other: &[u8]) -> bool {
        self.material.expose_secret().ct_eq(other).into()
    }

    /// Copy the material into a new, independently zeroized key.
    pub fn duplicate(&self) -> Self {
        Self::from_bytes(self.material.expose_secret().to_vec())
    }
}

impl PartialEq for MasterKey {
    fn eq(&self, other: &Self) -> bool {
        other.with_raw_key(|bytes| self.ct_eq_bytes(bytes))
    }
}

impl Eq for MasterKey {}

impl fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MasterKey")
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}
