//! Client-side symmetric encryption
//!
//! AES-256-CBC with PKCS#7 padding. The key is the first 256 bits of the
//! SHA-512 digest of a passphrase or key file. Every payload carries its own
//! random IV: `base64(IV || ciphertext)`.
//!
//! Encryption and decryption never return errors: a failure is reported as
//! `None` so callers can classify it (typically as an invalid key).

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rand::RngCore;
use sha2::{Digest, Sha512};
use std::path::PathBuf;
use tracing::{debug, info, warn};
use vs_secrets_core::JsonFileStore;
use zeroize::Zeroizing;

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// Size of the AES key in bytes (256 bits)
pub const KEY_SIZE: usize = 32;

/// Size of the CBC initialization vector in bytes (128 bits)
pub const IV_SIZE: usize = 16;

/// Entry name of the key inside the key store
const KEY_ENTRY: &str = "key";

/// Input the key is derived from
#[derive(Debug, Clone)]
pub enum KeyMaterial {
    /// A passphrase, hashed as UTF-8 bytes
    Passphrase(String),
    /// A file whose raw bytes are hashed
    KeyFile(PathBuf),
}

impl KeyMaterial {
    fn read_bytes(&self) -> Result<Zeroizing<Vec<u8>>> {
        match self {
            KeyMaterial::Passphrase(passphrase) => {
                Ok(Zeroizing::new(passphrase.as_bytes().to_vec()))
            }
            KeyMaterial::KeyFile(path) => {
                let bytes = std::fs::read(path)
                    .with_context(|| format!("Failed to read key file: {}", path.display()))?;
                Ok(Zeroizing::new(bytes))
            }
        }
    }
}

/// Symmetric cipher holding at most one active key
pub struct Cipher {
    key: Option<Zeroizing<[u8; KEY_SIZE]>>,
    store: Option<JsonFileStore>,
}

impl Cipher {
    /// Load the persisted key from `store`.
    ///
    /// An unreadable or malformed store leaves the cipher without a key.
    pub fn load(store: JsonFileStore) -> Self {
        let key = match store.get(KEY_ENTRY) {
            Ok(Some(encoded)) => decode_key(&encoded),
            Ok(None) => None,
            Err(e) => {
                warn!("Failed to read key store {}: {}", store.path().display(), e);
                None
            }
        };

        if key.is_none() {
            debug!("No encryption key loaded");
        }

        Self {
            key,
            store: Some(store),
        }
    }

    /// A cipher that is never persisted and starts without a key
    pub fn in_memory() -> Self {
        Self {
            key: None,
            store: None,
        }
    }

    /// Derive an in-memory cipher from key material.
    ///
    /// Returns a cipher without a key when the material is empty.
    pub fn derive(material: &KeyMaterial) -> Result<Self> {
        let bytes = material.read_bytes()?;
        Ok(Self {
            key: derive_key(&bytes),
            store: None,
        })
    }

    /// Derive a key from `material` and persist it immediately.
    ///
    /// `None` or empty material deletes the persisted key.
    pub fn init(&mut self, material: Option<&KeyMaterial>) -> Result<()> {
        let key = match material {
            Some(material) => derive_key(&material.read_bytes()?),
            None => None,
        };
        self.key = key;
        self.persist()
    }

    /// Take over the key of `other` and persist it
    pub fn adopt(&mut self, other: Cipher) -> Result<()> {
        self.key = other.key;
        self.persist()
    }

    /// Whether a key is currently loaded
    pub fn is_ready(&self) -> bool {
        self.key.is_some()
    }

    /// Encrypt `plaintext`, returning `base64(IV || ciphertext)`
    pub fn encrypt(&self, plaintext: &str) -> Option<String> {
        let key = self.key.as_ref()?;

        let mut iv = [0u8; IV_SIZE];
        rand::rng().fill_bytes(&mut iv);

        let cipher = Aes256CbcEnc::new_from_slices(&key[..], &iv).ok()?;
        let ciphertext = cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes());

        let mut payload = Vec::with_capacity(IV_SIZE + ciphertext.len());
        payload.extend_from_slice(&iv);
        payload.extend_from_slice(&ciphertext);
        Some(BASE64.encode(payload))
    }

    /// Decrypt a payload produced by [`Cipher::encrypt`].
    ///
    /// Any failure (bad encoding, wrong key, bad padding, non UTF-8) yields `None`.
    pub fn decrypt(&self, payload: &str) -> Option<String> {
        let key = self.key.as_ref()?;
        let bytes = BASE64.decode(payload.trim()).ok()?;
        if bytes.len() <= IV_SIZE {
            return None;
        }

        let (iv, ciphertext) = bytes.split_at(IV_SIZE);
        if ciphertext.len() % IV_SIZE != 0 {
            return None;
        }

        let cipher = Aes256CbcDec::new_from_slices(&key[..], iv).ok()?;
        let plaintext = cipher.decrypt_padded_vec_mut::<Pkcs7>(ciphertext).ok()?;
        String::from_utf8(plaintext).ok()
    }

    fn persist(&self) -> Result<()> {
        let Some(store) = &self.store else {
            return Ok(());
        };

        match &self.key {
            Some(key) => {
                store
                    .set(KEY_ENTRY, &BASE64.encode(&key[..]))
                    .context("Failed to persist encryption key")?;
                info!("Encryption key saved to {}", store.path().display());
            }
            None => {
                store
                    .remove(KEY_ENTRY)
                    .context("Failed to delete encryption key")?;
                info!("Encryption key deleted from {}", store.path().display());
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for Cipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cipher")
            .field("ready", &self.is_ready())
            .field("store", &self.store)
            .finish()
    }
}

fn derive_key(bytes: &[u8]) -> Option<Zeroizing<[u8; KEY_SIZE]>> {
    if bytes.is_empty() {
        return None;
    }

    let digest = Sha512::digest(bytes);
    let mut key = Zeroizing::new([0u8; KEY_SIZE]);
    key.copy_from_slice(&digest[..KEY_SIZE]);
    Some(key)
}

fn decode_key(encoded: &str) -> Option<Zeroizing<[u8; KEY_SIZE]>> {
    let bytes = Zeroizing::new(BASE64.decode(encoded.trim()).ok()?);
    if bytes.len() != KEY_SIZE {
        warn!("Ignoring stored key with unexpected length {}", bytes.len());
        return None;
    }

    let mut key = Zeroizing::new([0u8; KEY_SIZE]);
    key.copy_from_slice(&bytes);
    Some(key)
}
