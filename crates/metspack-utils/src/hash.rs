use md5::{Digest, Md5};

use crate::error::{HashError, HashResult};

/// Algorithm name written into `CHECKSUMTYPE` attributes.
pub const MD5: &str = "MD5";

/// Hex digest of the empty byte string, used for zero-filled content.
pub const EMPTY_MD5: &str = "d41d8cd98f00b204e9800998ecf8427e";

/// Computes the lowercase hex MD5 digest of an in-memory buffer.
///
/// # Example
///
/// ```
/// use metspack_utils::hash::checksum_bytes;
///
/// assert_eq!(checksum_bytes(b""), "d41d8cd98f00b204e9800998ecf8427e");
/// ```
pub fn checksum_bytes(data: &[u8]) -> String {
    let mut hasher = Md5::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// Checks `data` against a declared checksum.
///
/// Only MD5 is understood; any other algorithm yields
/// [`HashError::UnsupportedAlgorithm`] so callers can decide whether to ignore it.
pub fn verify_bytes(data: &[u8], algorithm: &str, expected: &str) -> HashResult<bool> {
    if !algorithm.eq_ignore_ascii_case(MD5) {
        return Err(HashError::UnsupportedAlgorithm(algorithm.to_string()));
    }
    Ok(checksum_bytes(data).eq_ignore_ascii_case(expected))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_bytes() {
        assert_eq!(checksum_bytes(b"hello world"), "5eb63bbbe01eeed093cb22bb8f5acdc3");
        assert_eq!(checksum_bytes(b""), EMPTY_MD5);
    }

    #[test]
    fn test_verify_bytes() {
        assert!(verify_bytes(b"hello world", "md5", "5EB63BBBE01EEED093CB22BB8F5ACDC3").unwrap());
        assert!(!verify_bytes(b"hello world!", "MD5", "5eb63bbbe01eeed093cb22bb8f5acdc3").unwrap());
        assert!(matches!(
            verify_bytes(b"x", "SHA-256", "00"),
            Err(HashError::UnsupportedAlgorithm(_))
        ));
    }
}
