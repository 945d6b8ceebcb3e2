//! Piece descriptors and integrity verification.

use boring::sha::Sha1;

/// One piece waiting to be downloaded. Identity is `index`; `length` equals
/// the global piece length except possibly for the last piece.
#[derive(Debug, Clone)]
pub struct PieceJob {
    pub index: u32,
    pub length: u32,
    pub digest: [u8; 20],
}

/// A fully downloaded, digest-checked piece.
#[derive(Debug)]
pub struct PieceResult {
    pub index: u32,
    pub data: Vec<u8>,
}

/// Whether `data` hashes to `digest`.
///
/// The 20-byte comparison runs in constant time.
pub fn verify_digest(data: &[u8], digest: &[u8; 20]) -> bool {
    let mut hasher = Sha1::new();
    hasher.update(data);
    let hash = hasher.finish();

    let mut diff = 0u8;
    for (a, b) in hash.iter().zip(digest.iter()) {
        diff |= a ^ b;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    // SHA-1("abc")
    const ABC_DIGEST: [u8; 20] = [
        0xa9, 0x99, 0x3e, 0x36, 0x47, 0x06, 0x81, 0x6a, 0xba, 0x3e, 0x25, 0x71, 0x78, 0x50,
        0xc2, 0x6c, 0x9c, 0xd0, 0xd8, 0x9d,
    ];

    #[test]
    fn accepts_a_matching_digest() {
        assert!(verify_digest(b"abc", &ABC_DIGEST));
    }

    #[test]
    fn rejects_a_mismatching_digest() {
        let mut digest = ABC_DIGEST;
        digest[0] ^= 1;
        assert!(!verify_digest(b"abc", &digest));
        assert!(!verify_digest(b"abd", &ABC_DIGEST));
    }

    #[test]
    fn rejects_truncated_data() {
        assert!(!verify_digest(b"ab", &ABC_DIGEST));
    }
}
