//! Authenticated encryption for cached payloads
//!
//! AES-256-GCM with a fresh 96-bit nonce per entry. The cache key is bound
//! as associated data, so ciphertext moved under another key fails to open.
//! Rotation only changes the key used for new writes; earlier key ids stay
//! in the ring so existing entries remain readable until they expire.

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng, Payload};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use crate::error::CacheError;

/// AES-GCM nonce length in bytes
pub const NONCE_LEN: usize = 12;

type Result<T> = std::result::Result<T, CacheError>;

/// Ciphertext plus what is needed to open it
#[derive(Clone)]
pub struct SealedPayload {
    pub key_id: u32,
    pub nonce: [u8; NONCE_LEN],
    pub ciphertext: Arc<Vec<u8>>,
}

impl SealedPayload {
    /// Bytes accounted against the cache budget
    pub fn stored_len(&self) -> usize {
        NONCE_LEN + self.ciphertext.len()
    }
}

struct KeyRing {
    active: u32,
    keys: HashMap<u32, Aes256Gcm>,
}

/// Process-wide cipher with a forward-only key ring
pub struct Cipher {
    ring: RwLock<KeyRing>,
}

impl fmt::Debug for Cipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cipher")
            .field("active_key_id", &self.active_key_id())
            .finish_non_exhaustive()
    }
}

impl Cipher {
    /// Derive the key from secret material (SHA-256 of the secret)
    pub fn from_secret(secret: &str) -> Self {
        Self::with_key(derive_key(secret))
    }

    /// Use a freshly generated random key
    pub fn random() -> Self {
        Self::with_key(Aes256Gcm::generate_key(OsRng))
    }

    fn with_key(key: Key<Aes256Gcm>) -> Self {
        let mut keys = HashMap::new();
        keys.insert(1, Aes256Gcm::new(&key));
        Self {
            ring: RwLock::new(KeyRing { active: 1, keys }),
        }
    }

    pub fn active_key_id(&self) -> u32 {
        self.ring.read().unwrap_or_else(|e| e.into_inner()).active
    }

    /// Switch new writes to a new key. Returns the new key id.
    pub fn rotate(&self, secret: Option<&str>) -> u32 {
        let key = match secret {
            Some(s) => derive_key(s),
            None => Aes256Gcm::generate_key(OsRng),
        };
        let mut ring = self.ring.write().unwrap_or_else(|e| e.into_inner());
        let id = ring.active + 1;
        ring.keys.insert(id, Aes256Gcm::new(&key));
        ring.active = id;
        log::info!("Cache encryption key rotated to key id {}", id);
        id
    }

    /// Encrypt `plaintext`, binding it to `aad`.
    pub fn seal(&self, aad: &str, plaintext: &[u8]) -> Result<SealedPayload> {
        let ring = self.ring.read().unwrap_or_else(|e| e.into_inner());
        let cipher = ring
            .keys
            .get(&ring.active)
            .ok_or_else(|| CacheError::Encryption("active key missing from key ring".to_string()))?;

        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = cipher
            .encrypt(
                &nonce,
                Payload {
                    msg: plaintext,
                    aad: aad.as_bytes(),
                },
            )
            .map_err(|e| CacheError::Encryption(e.to_string()))?;

        let mut nonce_bytes = [0u8; NONCE_LEN];
        nonce_bytes.copy_from_slice(nonce.as_slice());

        Ok(SealedPayload {
            key_id: ring.active,
            nonce: nonce_bytes,
            ciphertext: Arc::new(ciphertext),
        })
    }

    /// Decrypt and authenticate a sealed payload.
    pub fn open(&self, aad: &str, sealed: &SealedPayload) -> Result<Vec<u8>> {
        let ring = self.ring.read().unwrap_or_else(|e| e.into_inner());
        let cipher = ring
            .keys
            .get(&sealed.key_id)
            .ok_or_else(|| CacheError::Decryption(format!("unknown key id {}", sealed.key_id)))?;

        cipher
            .decrypt(
                Nonce::from_slice(&sealed.nonce),
                Payload {
                    msg: sealed.ciphertext.as_slice(),
                    aad: aad.as_bytes(),
                },
            )
            .map_err(|_| CacheError::Decryption("authentication failed".to_string()))
    }
}

fn derive_key(secret: &str) -> Key<Aes256Gcm> {
    let digest = Sha256::digest(secret.as_bytes());
    *Key::<Aes256Gcm>::from_slice(&digest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seal_open_round_trip() {
        let cipher = Cipher::random();
        let sealed = cipher.seal("k1", br#"{"balance":10}"#).unwrap();

        assert_ne!(sealed.ciphertext.as_slice(), br#"{"balance":10}"#);
        assert_eq!(cipher.open("k1", &sealed).unwrap(), br#"{"balance":10}"#);
    }

    #[test]
    fn test_nonce_is_fresh_per_seal() {
        let cipher = Cipher::from_secret("s3cret");
        let a = cipher.seal("k", b"same").unwrap();
        let b = cipher.seal("k", b"same").unwrap();

        assert_ne!(a.nonce, b.nonce);
        assert_ne!(a.ciphertext, b.ciphertext);
    }

    #[test]
    fn test_wrong_aad_fails() {
        let cipher = Cipher::random();
        let sealed = cipher.seal("k1", b"data").unwrap();

        assert!(matches!(
            cipher.open("k2", &sealed),
            Err(CacheError::Decryption(_))
        ));
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let cipher = Cipher::random();
        let mut sealed = cipher.seal("k1", b"data").unwrap();
        let mut bytes = (*sealed.ciphertext).clone();
        bytes[0] ^= 0xff;
        sealed.ciphertext = Arc::new(bytes);

        assert!(cipher.open("k1", &sealed).is_err());
    }

    #[test]
    fn test_same_secret_derives_same_key() {
        let a = Cipher::from_secret("shared");
        let b = Cipher::from_secret("shared");
        let sealed = a.seal("k", b"data").unwrap();

        assert_eq!(b.open("k", &sealed).unwrap(), b"data");
    }

    #[test]
    fn test_rotation_is_forward_only() {
        let cipher = Cipher::from_secret("v1");
        let old = cipher.seal("k", b"old").unwrap();

        let id = cipher.rotate(Some("v2"));
        assert_eq!(id, 2);
        assert_eq!(cipher.active_key_id(), 2);

        let new = cipher.seal("k", b"new").unwrap();
        assert_eq!(old.key_id, 1);
        assert_eq!(new.key_id, 2);
        assert_eq!(cipher.open("k", &old).unwrap(), b"old");
        assert_eq!(cipher.open("k", &new).unwrap(), b"new");
    }

    #[test]
    fn test_unknown_key_id_fails() {
        let cipher = Cipher::random();
        let mut sealed = cipher.seal("k", b"data").unwrap();
        sealed.key_id = 99;

        assert!(cipher.open("k", &sealed).is_err());
    }
}
