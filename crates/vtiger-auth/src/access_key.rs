//! Access key derivation for the login call
//!
//! `accessKey = hex(md5(token || password))`. MD5 is weak, but the remote
//! service computes the same digest on its side, so any other hash breaks
//! login.

use md5::{Digest, Md5};

/// Derive the lowercase hex access key for a challenge token.
pub fn compute_access_key(token: &str, password: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(token.as_bytes());
    hasher.update(password.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_known_digest() {
        // md5("hello") = 5d41402abc4b2a76b9719d911017c592
        assert_eq!(
            compute_access_key("hel", "lo"),
            "5d41402abc4b2a76b9719d911017c592"
        );
    }

    #[test]
    fn empty_inputs_hash_to_md5_of_empty_string() {
        assert_eq!(
            compute_access_key("", ""),
            "d41d8cd98f00b204e9800998ecf8427e"
        );
    }

    #[test]
    fn key_is_32_lowercase_hex_chars() {
        let key = compute_access_key("4f1e6a0a2b7c3", "s3cret-Access");
        assert_eq!(key.len(), 32);
        assert!(
            key.chars()
                .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)),
            "access key must be lowercase hex: {key}"
        );
    }

    #[test]
    fn token_changes_the_key() {
        assert_ne!(
            compute_access_key("token-a", "password"),
            compute_access_key("token-b", "password")
        );
    }
}
