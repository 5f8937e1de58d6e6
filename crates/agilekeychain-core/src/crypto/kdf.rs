//! Key and IV derivation for AgileKeychain envelopes.
//!
//! Two derivations are in use:
//!
//! - [`legacy_derive`]: OpenSSL's `EVP_BytesToKey` with MD5 and a single round,
//!   the scheme behind `openssl enc -md md5`. Items, validation blobs and
//!   generation-3 key records use it. It is weak by modern standards and must
//!   stay bit-exact; do not swap it for a stronger KDF.
//! - [`password_derive`]: PBKDF2-HMAC-SHA1, used by generation-4 key records
//!   with the iteration count declared in the record.
//!
//! Both produce 32 bytes of material split into an AES-128 key and a CBC IV.

use std::fmt;
use std::num::NonZeroU32;

use ring::pbkdf2;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use super::CryptoError;

/// AES-128 key length in bytes.
pub const KEY_LEN: usize = 16;

/// AES-CBC IV length in bytes.
pub const IV_LEN: usize = 16;

const MATERIAL_LEN: usize = KEY_LEN + IV_LEN;

/// An AES key and IV pair derived from a secret and salt.
///
/// Zeroed on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct KeyIv {
    key: [u8; KEY_LEN],
    iv: [u8; IV_LEN],
}

impl KeyIv {
    fn from_material(material: &[u8; MATERIAL_LEN]) -> Self {
        let mut key = [0u8; KEY_LEN];
        let mut iv = [0u8; IV_LEN];
        key.copy_from_slice(&material[..KEY_LEN]);
        iv.copy_from_slice(&material[KEY_LEN..]);
        Self { key, iv }
    }

    pub fn key(&self) -> &[u8; KEY_LEN] {
        &self.key
    }

    pub fn iv(&self) -> &[u8; IV_LEN] {
        &self.iv
    }
}

impl fmt::Debug for KeyIv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyIv").finish_non_exhaustive()
    }
}

/// OpenSSL `EVP_BytesToKey` (MD5, one iteration).
///
/// `D_i = MD5(D_{i-1} || secret || salt)` with `D_0` empty; digests are
/// concatenated until 32 bytes exist.
pub fn legacy_derive(secret: &[u8], salt: &[u8]) -> KeyIv {
    let mut material = Zeroizing::new([0u8; MATERIAL_LEN]);
    let mut previous = Zeroizing::new([0u8; 16]);
    let mut filled = 0;
    let mut round = 0;

    while filled < MATERIAL_LEN {
        let mut input = Zeroizing::new(Vec::with_capacity(16 + secret.len() + salt.len()));
        if round > 0 {
            input.extend_from_slice(previous.as_slice());
        }
        input.extend_from_slice(secret);
        input.extend_from_slice(salt);

        *previous = md5::compute(input.as_slice()).into();

        let take = (MATERIAL_LEN - filled).min(previous.len());
        material[filled..filled + take].copy_from_slice(&previous[..take]);
        filled += take;
        round += 1;
    }

    KeyIv::from_material(&material)
}

/// PBKDF2-HMAC-SHA1 producing exactly 32 bytes.
///
/// The iteration count comes from the vault and is honoured as-is, however
/// low, so that existing vaults stay readable.
pub fn password_derive(password: &[u8], salt: &[u8], iterations: NonZeroU32) -> KeyIv {
    let mut material = Zeroizing::new([0u8; MATERIAL_LEN]);
    pbkdf2::derive(
        pbkdf2::PBKDF2_HMAC_SHA1,
        iterations,
        salt,
        password,
        material.as_mut_slice(),
    );
    KeyIv::from_material(&material)
}

/// Which derivation turns a secret and envelope salt into a [`KeyIv`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyDerivation {
    /// `EVP_BytesToKey` with MD5 (generation 3, items, validation blobs).
    Legacy,
    /// PBKDF2-HMAC-SHA1 (generation 4 key records).
    Pbkdf2 { iterations: NonZeroU32 },
}

impl KeyDerivation {
    /// Select the derivation declared by a key record.
    ///
    /// A missing iteration count means the legacy derivation.
    ///
    /// # Errors
    ///
    /// `CryptoError::InvalidIterationCount` if the record declares zero iterations.
    pub fn from_iterations(iterations: Option<u32>) -> Result<Self, CryptoError> {
        match iterations {
            None => Ok(KeyDerivation::Legacy),
            Some(n) => NonZeroU32::new(n)
                .map(|iterations| KeyDerivation::Pbkdf2 { iterations })
                .ok_or(CryptoError::InvalidIterationCount),
        }
    }

    /// Iteration count to persist alongside the key record, if any.
    pub fn iterations(&self) -> Option<u32> {
        match self {
            KeyDerivation::Legacy => None,
            KeyDerivation::Pbkdf2 { iterations } => Some(iterations.get()),
        }
    }

    pub fn derive(&self, secret: &[u8], salt: &[u8]) -> KeyIv {
        match self {
            KeyDerivation::Legacy => legacy_derive(secret, salt),
            KeyDerivation::Pbkdf2 { iterations } => password_derive(secret, salt, *iterations),
        }
    }
}
