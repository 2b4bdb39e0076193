use sha2::{Digest, Sha256};

/// Lowercase hex SHA-256 of `payload`.
///
/// Used purely for change detection between sync runs.
pub fn sha256_hex(payload: &[u8]) -> String {
    hex::encode(Sha256::digest(payload))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_of_empty_payload() {
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn digest_is_deterministic() {
        let payload = b"apiVersion: v1\nentries: {}\n";
        assert_eq!(sha256_hex(payload), sha256_hex(payload));
        assert_eq!(sha256_hex(payload).len(), 64);
    }

    #[test]
    fn single_byte_change_changes_digest() {
        let original = b"apiVersion: v1\nentries: {}\n".to_vec();
        let mut mutated = original.clone();
        let last = mutated.len() - 2;
        mutated[last] ^= 0x01;

        assert_ne!(sha256_hex(&original), sha256_hex(&mutated));
    }
}
