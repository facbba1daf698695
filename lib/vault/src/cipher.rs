//! Authenticated encryption of secrets at rest.
//!
//! - Argon2id key derivation, once per process
//! - AES-256-GCM with a 16-byte IV and a 16-byte tag
//! - Blob format: `<ivHex>:<tagHex>:<cipherHex>`

use crate::error::VaultError;
use aes_gcm::aead::consts::U16;
use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::aead::{AeadInPlace, KeyInit};
use aes_gcm::aes::Aes256;
use aes_gcm::AesGcm;
use argon2::Argon2;
use rand::rngs::OsRng;
use rand::RngCore;
use std::fmt;

/// AES-256-GCM with a 128-bit IV.
type Aes256Gcm16 = AesGcm<Aes256, U16>;

/// IV size in bytes.
pub const IV_LEN: usize = 16;

/// Authentication tag size in bytes.
pub const TAG_LEN: usize = 16;

/// Derived key size in bytes.
pub const KEY_LEN: usize = 32;

/// Segment delimiter in the serialized blob.
const DELIMITER: char = ':';

/// Minimum salt length accepted by Argon2.
const MIN_SALT_LEN: usize = 8;

/// Encrypts and decrypts secrets with a key derived once at construction.
#[derive(Clone)]
pub struct SecretCipher {
    cipher: Aes256Gcm16,
}

impl SecretCipher {
    /// Derives the encryption key from a long-lived secret.
    ///
    /// Argon2id is deliberately slow: construct one cipher at startup and
    /// share it rather than deriving per call.
    ///
    /// # Errors
    ///
    /// Returns `VaultError::Configuration` if the secret is empty, the salt is
    /// shorter than eight bytes, or derivation fails.
    pub fn derive(master_secret: &str, salt: &str) -> Result<Self, VaultError> {
        if master_secret.is_empty() {
            return Err(VaultError::Configuration {
                reason: "master secret is empty".to_string(),
            });
        }
        if salt.len() < MIN_SALT_LEN {
            return Err(VaultError::Configuration {
                reason: format!("salt must be at least {MIN_SALT_LEN} bytes"),
            });
        }

        let mut key = [0u8; KEY_LEN];
        Argon2::default()
            .hash_password_into(master_secret.as_bytes(), salt.as_bytes(), &mut key)
            .map_err(|e| VaultError::Configuration {
                reason: format!("key derivation failed: {e}"),
            })?;

        Ok(Self::from_key(&key))
    }

    /// Builds a cipher from an already-derived key.
    #[must_use]
    pub fn from_key(key: &[u8; KEY_LEN]) -> Self {
        Self {
            cipher: Aes256Gcm16::new(GenericArray::from_slice(key)),
        }
    }

    /// Encrypts a plaintext under a fresh random IV.
    ///
    /// # Errors
    ///
    /// Returns `VaultError::EncryptionFailed` if the AEAD rejects the input
    /// (only possible for plaintexts beyond the GCM length limit).
    pub fn encrypt(&self, plaintext: &str) -> Result<String, VaultError> {
        let mut iv = [0u8; IV_LEN];
        OsRng.fill_bytes(&mut iv);

        let mut buffer = plaintext.as_bytes().to_vec();
        let tag = self
            .cipher
            .encrypt_in_place_detached(GenericArray::from_slice(&iv), b"", &mut buffer)
            .map_err(|e| VaultError::EncryptionFailed {
                reason: e.to_string(),
            })?;

        Ok(format!(
            "{}{DELIMITER}{}{DELIMITER}{}",
            hex::encode(iv),
            hex::encode(tag),
            hex::encode(buffer)
        ))
    }

    /// Decrypts a blob produced by [`encrypt`](Self::encrypt).
    ///
    /// Returns `None` for any malformed, tampered, or non-UTF-8 input.
    #[must_use]
    pub fn decrypt(&self, blob: &str) -> Option<String> {
        let Some((iv, tag, mut buffer)) = parse_blob(blob) else {
            tracing::debug!(len = blob.len(), "rejecting malformed ciphertext blob");
            return None;
        };

        if self
            .cipher
            .decrypt_in_place_detached(
                GenericArray::from_slice(&iv),
                b"",
                &mut buffer,
                GenericArray::from_slice(&tag),
            )
            .is_err()
        {
            tracing::warn!("ciphertext failed authentication");
            return None;
        }

        String::from_utf8(buffer).ok()
    }
}

impl fmt::Debug for SecretCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretCipher").finish_non_exhaustive()
    }
}

/// Splits a blob into its decoded IV, tag, and ciphertext.
fn parse_blob(blob: &str) -> Option<([u8; IV_LEN], [u8; TAG_LEN], Vec<u8>)> {
    let mut segments = blob.split(DELIMITER);
    let (Some(iv_hex), Some(tag_hex), Some(cipher_hex), None) = (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) else {
        return None;
    };

    let mut iv = [0u8; IV_LEN];
    hex::decode_to_slice(iv_hex, &mut iv).ok()?;
    let mut tag = [0u8; TAG_LEN];
    hex::decode_to_slice(tag_hex, &mut tag).ok()?;
    let ciphertext = hex::decode(cipher_hex).ok()?;

    Some((iv, tag, ciphertext))
}

/// Extracts the hex IV segment of a blob without decrypting it.
#[must_use]
pub fn iv_of(blob: &str) -> Option<&str> {
    blob.split(DELIMITER).next().filter(|iv| iv.len() == IV_LEN * 2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn test_cipher() -> SecretCipher {
        SecretCipher::from_key(&[0x42u8; KEY_LEN])
    }

    fn is_lower_hex(s: &str) -> bool {
        s.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
    }

    #[test]
    fn roundtrip() {
        let cipher = test_cipher();
        for plaintext in ["shpat_abc123", "", "ünïcödé 🔑", &"x".repeat(4096)] {
            let blob = cipher.encrypt(plaintext).expect("encrypt");
            assert_eq!(cipher.decrypt(&blob).as_deref(), Some(plaintext));
        }
    }

    #[test]
    fn blob_format_is_three_lower_hex_segments() {
        let blob = test_cipher().encrypt("shpat_abc123").expect("encrypt");
        let segments: Vec<&str> = blob.split(':').collect();

        assert_eq!(segments.len(), 3);
        assert_eq!(segments[0].len(), 32);
        assert_eq!(segments[1].len(), 32);
        assert!(!segments[2].is_empty());
        assert!(segments.iter().all(|s| is_lower_hex(s)));
    }

    #[test]
    fn thousand_encryptions_never_reuse_an_iv() {
        let cipher = test_cipher();
        let mut blobs = HashSet::new();
        let mut ivs = HashSet::new();

        for _ in 0..1000 {
            let blob = cipher.encrypt("same plaintext").expect("encrypt");
            ivs.insert(iv_of(&blob).expect("iv").to_string());
            blobs.insert(blob);
        }

        assert_eq!(blobs.len(), 1000);
        assert_eq!(ivs.len(), 1000);
    }

    #[test]
    fn wrong_segment_count_is_none() {
        let cipher = test_cipher();
        let blob = cipher.encrypt("secret").expect("encrypt");

        assert_eq!(cipher.decrypt(""), None);
        assert_eq!(cipher.decrypt("abcd"), None);
        assert_eq!(cipher.decrypt("aa:bb"), None);
        assert_eq!(cipher.decrypt(&format!("{blob}:00")), None);
    }

    #[test]
    fn non_hex_segments_are_none() {
        let cipher = test_cipher();
        let blob = cipher.encrypt("secret").expect("encrypt");
        let segments: Vec<&str> = blob.split(':').collect();

        let bad_iv = format!("{}:{}:{}", "zz".repeat(16), segments[1], segments[2]);
        let bad_tag = format!("{}:{}:{}", segments[0], "g".repeat(32), segments[2]);
        let bad_body = format!("{}:{}:{}", segments[0], segments[1], "xyz");
        for blob in [bad_iv, bad_tag, bad_body] {
            assert_eq!(cipher.decrypt(&blob), None);
        }
    }

    #[test]
    fn short_iv_or_tag_is_none() {
        let cipher = test_cipher();
        let blob = cipher.encrypt("secret").expect("encrypt");
        let segments: Vec<&str> = blob.split(':').collect();

        let short_iv = format!("{}:{}:{}", &segments[0][..24], segments[1], segments[2]);
        let short_tag = format!("{}:{}:{}", segments[0], &segments[1][..30], segments[2]);
        assert_eq!(cipher.decrypt(&short_iv), None);
        assert_eq!(cipher.decrypt(&short_tag), None);
    }

    #[test]
    fn tampered_ciphertext_is_none() {
        let cipher = test_cipher();
        let blob = cipher.encrypt("shpat_abc123").expect("encrypt");
        let segments: Vec<&str> = blob.split(':').collect();

        let mut body = hex::decode(segments[2]).expect("hex");
        body[0] ^= 0x01;
        let tampered = format!("{}:{}:{}", segments[0], segments[1], hex::encode(body));
        assert_eq!(cipher.decrypt(&tampered), None);

        let mut tag = hex::decode(segments[1]).expect("hex");
        tag[15] ^= 0x80;
        let tampered = format!("{}:{}:{}", segments[0], hex::encode(tag), segments[2]);
        assert_eq!(cipher.decrypt(&tampered), None);
    }

    #[test]
    fn wrong_key_is_none() {
        let blob = test_cipher().encrypt("secret").expect("encrypt");
        let other = SecretCipher::from_key(&[0x43u8; KEY_LEN]);
        assert_eq!(other.decrypt(&blob), None);
    }

    #[test]
    fn derive_is_deterministic_per_secret_and_salt() {
        let a = SecretCipher::derive("master", "deployment-salt").expect("derive");
        let b = SecretCipher::derive("master", "deployment-salt").expect("derive");
        let c = SecretCipher::derive("master", "other-salt-value").expect("derive");

        let blob = a.encrypt("token").expect("encrypt");
        assert_eq!(b.decrypt(&blob).as_deref(), Some("token"));
        assert_eq!(c.decrypt(&blob), None);
    }

    #[test]
    fn derive_rejects_bad_configuration() {
        assert!(matches!(
            SecretCipher::derive("", "deployment-salt"),
            Err(VaultError::Configuration { .. })
        ));
        assert!(matches!(
            SecretCipher::derive("master", "short"),
            Err(VaultError::Configuration { .. })
        ));
    }

    #[test]
    fn debug_does_not_leak_key() {
        let rendered = format!("{:?}", test_cipher());
        assert_eq!(rendered, "SecretCipher { .. }");
    }
}
