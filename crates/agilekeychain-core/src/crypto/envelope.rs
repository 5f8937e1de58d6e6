//! OpenSSL-style salted AES-128-CBC envelopes.
//!
//! # Envelope Format
//!
//! | Offset | Size | Description |
//! |--------|------|-------------|
//! | 0      | 8    | ASCII `Salted__` |
//! | 8      | 8    | Salt |
//! | 16     | n    | AES-128-CBC ciphertext, PKCS#7 padded, n a positive multiple of 16 |
//!
//! This is byte-for-byte what `openssl enc -aes-128-cbc -md md5` writes, and it
//! must stay that way for existing vaults to open. The AES key and IV come from
//! the secret and salt through a [`KeyDerivation`].

use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit, block_padding::NoPadding};
use rand::CryptoRng;
use tracing::trace;
use zeroize::Zeroizing;

use super::CryptoError;
use super::kdf::KeyDerivation;
use super::padding::{BLOCK_SIZE, pad, unpad};

/// Magic marker opening every envelope.
pub const MAGIC: &[u8; 8] = b"Salted__";

/// Salt length in bytes.
pub const SALT_LEN: usize = 8;

/// Marker plus salt.
pub const HEADER_LEN: usize = MAGIC.len() + SALT_LEN;

type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;
type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;

/// Split an envelope into its salt and ciphertext.
///
/// # Errors
///
/// `CryptoError::InvalidEnvelope` if the marker is missing or the header is short.
pub fn split(envelope: &[u8]) -> Result<(&[u8; SALT_LEN], &[u8]), CryptoError> {
    if envelope.len() < HEADER_LEN {
        return Err(CryptoError::InvalidEnvelope(format!(
            "{} bytes is shorter than the {HEADER_LEN}-byte header",
            envelope.len()
        )));
    }

    let (header, ciphertext) = envelope.split_at(HEADER_LEN);
    let (magic, salt) = header.split_at(MAGIC.len());
    if magic != MAGIC {
        return Err(CryptoError::InvalidEnvelope(
            "missing Salted__ marker".to_string(),
        ));
    }

    let salt: &[u8; SALT_LEN] = salt
        .try_into()
        .map_err(|_| CryptoError::InvalidEnvelope("truncated salt".to_string()))?;
    Ok((salt, ciphertext))
}

/// Decrypt an envelope with `secret`.
///
/// # Errors
///
/// - `CryptoError::InvalidEnvelope`: missing marker or short header
/// - `CryptoError::InvalidCiphertextLength`: empty or unaligned ciphertext
/// - `CryptoError::MalformedPadding`: wrong secret or corrupted ciphertext
pub fn open(
    envelope: &[u8],
    secret: &[u8],
    derivation: KeyDerivation,
) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    let (salt, ciphertext) = split(envelope)?;
    if ciphertext.is_empty() || ciphertext.len() % BLOCK_SIZE != 0 {
        return Err(CryptoError::InvalidCiphertextLength(ciphertext.len()));
    }

    let key_iv = derivation.derive(secret, salt);
    let decryptor = Aes128CbcDec::new_from_slices(key_iv.key(), key_iv.iv())
        .map_err(|e| CryptoError::Cipher(e.to_string()))?;
    let padded = Zeroizing::new(
        decryptor
            .decrypt_padded_vec_mut::<NoPadding>(ciphertext)
            .map_err(|_| CryptoError::InvalidCiphertextLength(ciphertext.len()))?,
    );

    let plaintext = unpad(&padded)?;
    trace!(len = plaintext.len(), "opened envelope");
    Ok(Zeroizing::new(plaintext.to_vec()))
}

/// Encrypt `plaintext` under `secret` with a fresh random salt.
///
/// The salt also seeds the IV, so it must never repeat: always pass a
/// cryptographically secure `rng`.
pub fn seal<R: CryptoRng + ?Sized>(
    plaintext: &[u8],
    secret: &[u8],
    derivation: KeyDerivation,
    rng: &mut R,
) -> Result<Vec<u8>, CryptoError> {
    let mut salt = [0u8; SALT_LEN];
    rng.fill_bytes(&mut salt);
    seal_with_salt(plaintext, secret, derivation, &salt)
}

fn seal_with_salt(
    plaintext: &[u8],
    secret: &[u8],
    derivation: KeyDerivation,
    salt: &[u8; SALT_LEN],
) -> Result<Vec<u8>, CryptoError> {
    let key_iv = derivation.derive(secret, salt);
    let encryptor = Aes128CbcEnc::new_from_slices(key_iv.key(), key_iv.iv())
        .map_err(|e| CryptoError::Cipher(e.to_string()))?;

    let padded = Zeroizing::new(pad(plaintext));
    let ciphertext = encryptor.encrypt_padded_vec_mut::<NoPadding>(&padded);

    let mut envelope = Vec::with_capacity(HEADER_LEN + ciphertext.len());
    envelope.extend_from_slice(MAGIC);
    envelope.extend_from_slice(salt);
    envelope.extend_from_slice(&ciphertext);
    Ok(envelope)
}
