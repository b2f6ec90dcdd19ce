//! Salted password hashing.

use sha2::{Digest, Sha256};
use uuid::Uuid;

const ROUNDS: u32 = 4_096;

/// Stored form of a password.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordHash {
    pub hash: String,
    pub salt: String,
}

fn derive(password: &str, salt: &str) -> String {
    let mut digest = Sha256::new()
        .chain_update(salt.as_bytes())
        .chain_update(password.as_bytes())
        .finalize();
    for _ in 1..ROUNDS {
        digest = Sha256::new()
            .chain_update(digest)
            .chain_update(salt.as_bytes())
            .finalize();
    }
    format!("{digest:x}")
}

/// Hash a password with a fresh random salt.
pub fn hash_password(password: &str) -> PasswordHash {
    let salt = Uuid::new_v4().simple().to_string();
    PasswordHash {
        hash: derive(password, &salt),
        salt,
    }
}

/// Check a password against a stored hash in constant time.
pub fn verify_password(password: &str, hash: &str, salt: &str) -> bool {
    let candidate = derive(password, salt);
    if candidate.len() != hash.len() {
        return false;
    }
    candidate
        .bytes()
        .zip(hash.bytes())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let stored = hash_password("correct horse battery");
        assert_eq!(stored.hash.len(), 64);
        assert!(verify_password("correct horse battery", &stored.hash, &stored.salt));
        assert!(!verify_password("wrong", &stored.hash, &stored.salt));
    }

    #[test]
    fn test_salts_differ() {
        let a = hash_password("same");
        let b = hash_password("same");
        assert_ne!(a.salt, b.salt);
        assert_ne!(a.hash, b.hash);
    }
}
