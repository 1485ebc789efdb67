//! Content hashing for archive deduplication.

use sha2::{Digest, Sha256};

/// Length of a fingerprint in hex characters.
pub const FINGERPRINT_LEN: usize = 64;

/// SHA-256 of the UTF-8 bytes of `raw_message`, as lowercase hex.
pub fn fingerprint(raw_message: &str) -> String {
    let digest = Sha256::digest(raw_message.as_bytes());
    format!("{digest:x}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_digest() {
        assert_eq!(
            fingerprint("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_fixed_length_lowercase_hex() {
        for input in ["", "x", "2024/01/15 09:30:00:123 E LICENSE_SVC Grant"] {
            let fp = fingerprint(input);
            assert_eq!(fp.len(), FINGERPRINT_LEN);
            assert!(fp.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
        }
    }

    #[test]
    fn test_distinct_lines_distinct_fingerprints() {
        let a = fingerprint("2024/01/15 09:30:00:123 E LICENSE_SVC user1@ws1 Grant");
        let b = fingerprint("2024/01/15 09:30:00:124 E LICENSE_SVC user1@ws1 Grant");
        assert_ne!(a, b);
    }
}
