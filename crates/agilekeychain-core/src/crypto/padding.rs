//! PKCS#7 padding for AES-CBC plaintext.
//!
//! The block cipher in [`envelope`](super::envelope) runs without padding so
//! that padding failures surface as [`CryptoError::MalformedPadding`] rather
//! than as an opaque cipher error.

use super::CryptoError;

/// AES block size in bytes.
pub const BLOCK_SIZE: usize = 16;

/// Pad `data` to a multiple of [`BLOCK_SIZE`].
///
/// Always appends between 1 and 16 bytes, each holding the number of bytes
/// appended, so block-aligned input gains a full block.
pub fn pad(data: &[u8]) -> Vec<u8> {
    let count = BLOCK_SIZE - data.len() % BLOCK_SIZE;
    let mut padded = Vec::with_capacity(data.len() + count);
    padded.extend_from_slice(data);
    // count is in 1..=16
    padded.resize(data.len() + count, count as u8);
    padded
}

/// Strip PKCS#7 padding from `data`.
///
/// # Errors
///
/// `CryptoError::MalformedPadding` if the buffer is empty, the trailing count
/// is 0 or larger than a block or the buffer, or any padding byte disagrees
/// with the count.
pub fn unpad(data: &[u8]) -> Result<&[u8], CryptoError> {
    let &last = data.last().ok_or(CryptoError::MalformedPadding)?;
    let count = usize::from(last);

    if count == 0 || count > BLOCK_SIZE || count > data.len() {
        return Err(CryptoError::MalformedPadding);
    }

    let (body, padding) = data.split_at(data.len() - count);
    if padding.iter().any(|&b| b != last) {
        return Err(CryptoError::MalformedPadding);
    }

    Ok(body)
}
