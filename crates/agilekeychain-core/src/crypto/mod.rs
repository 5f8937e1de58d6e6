//! Cryptographic primitives for AgileKeychain vault operations

pub mod envelope;
pub mod kdf;
pub mod keys;
pub mod padding;

use thiserror::Error;

/// Errors that can occur during cryptographic operations.
///
/// # Security Classification
///
/// Some errors indicate a ciphertext that failed its **integrity checks**: the
/// envelope is structurally wrong or its padding does not decode. The legacy
/// format carries no MAC, so a wrong key usually surfaces as one of these.
/// They are marked with `[INTEGRITY]`.
///
/// Other errors indicate **user errors** (wrong password) or **corrupted
/// records** (invalid parameters). These are marked accordingly.
#[derive(Error, Debug)]
pub enum CryptoError {
    // =========================================================================
    // INTEGRITY FAILURES - corrupted ciphertext or wrong key
    // =========================================================================
    /// PKCS#7 padding was not valid after decryption.
    ///
    /// **[INTEGRITY]** Either the ciphertext was modified or it was decrypted
    /// with the wrong key. Callers must never fall back to the unpadded bytes.
    #[error("[INTEGRITY] Malformed PKCS#7 padding")]
    MalformedPadding,

    /// The envelope did not start with the `Salted__` marker and an 8-byte salt.
    ///
    /// **[INTEGRITY]** The record is not an OpenSSL salted envelope.
    #[error("[INTEGRITY] Invalid envelope: {0}")]
    InvalidEnvelope(String),

    /// The envelope body was empty or not a whole number of AES blocks.
    #[error("[INTEGRITY] Invalid ciphertext length: {0} bytes is not a positive multiple of 16")]
    InvalidCiphertextLength(usize),

    // =========================================================================
    // USER ERRORS - wrong password
    // =========================================================================
    /// The password did not decrypt the master key, or the decrypted master key
    /// did not reproduce its validation blob.
    ///
    /// **[USER ERROR]** Wrong password is by far the most common cause, but a
    /// tampered key record is indistinguishable from it.
    #[error("Invalid password")]
    InvalidPassword,

    // =========================================================================
    // RECORD ERRORS - invalid parameters
    // =========================================================================
    /// A key record declared zero PBKDF2 iterations.
    #[error("Invalid PBKDF2 iteration count: must be at least 1")]
    InvalidIterationCount,

    /// The block cipher rejected its key or IV.
    ///
    /// **[PROGRAMMING ERROR]** Derived key material always has the right length,
    /// so this indicates an implementation bug.
    #[error("Cipher initialisation failed: {0}")]
    Cipher(String),
}

// Re-export commonly used types
pub use envelope::{open, seal};
pub use kdf::{KeyDerivation, KeyIv};
pub use keys::MasterKey;
