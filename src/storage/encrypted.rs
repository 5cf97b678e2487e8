//! Machine-bound encrypted cookie file, used where no OS keychain is available
//!
//! On-disk format is a small JSON envelope holding base64 salt, nonce and the
//! AES-256-GCM sealed cookie map. The key is derived with Argon2id from a
//! passphrase, by default one tied to the current user and host.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use argon2::Argon2;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rand::RngCore;
use serde::{Deserialize, Serialize};

const ENVELOPE_VERSION: u8 = 1;
const NONCE_LEN: usize = 12;
const SALT_LEN: usize = 16;

pub type CookieMap = BTreeMap<String, String>;

#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    #[error("Failed to seal cookie file")]
    Seal,
    #[error("Cookie file cannot be opened on this machine")]
    Open,
    #[error("Unsupported cookie file version {0}")]
    Version(u8),
    #[error("Cookie file IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Malformed cookie file: {0}")]
    Format(#[from] serde_json::Error),
    #[error("Malformed cookie file encoding: {0}")]
    Encoding(#[from] base64::DecodeError),
    #[error("Key derivation failed")]
    KeyDerivation,
}

#[derive(Serialize, Deserialize)]
struct Envelope {
    version: u8,
    salt: String,
    nonce: String,
    sealed: String,
}

/// Encrypted cookie map at a fixed path
pub struct CookieVault {
    path: PathBuf,
    passphrase: Option<String>,
}

impl CookieVault {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            passphrase: None,
        }
    }

    /// Use an explicit passphrase instead of the machine identity
    #[cfg(test)]
    pub fn with_passphrase(mut self, passphrase: impl Into<String>) -> Self {
        self.passphrase = Some(passphrase.into());
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    pub fn save(&self, cookies: &CookieMap) -> Result<(), VaultError> {
        let plaintext = serde_json::to_vec(cookies)?;

        let mut salt = [0u8; SALT_LEN];
        let mut nonce = [0u8; NONCE_LEN];
        let mut rng = rand::rng();
        rng.fill_bytes(&mut salt);
        rng.fill_bytes(&mut nonce);

        let cipher = self.cipher(&salt)?;
        let sealed = cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext.as_slice())
            .map_err(|_| VaultError::Seal)?;

        let envelope = Envelope {
            version: ENVELOPE_VERSION,
            salt: BASE64.encode(salt),
            nonce: BASE64.encode(nonce),
            sealed: BASE64.encode(sealed),
        };

        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(&self.path, serde_json::to_string_pretty(&envelope)?)?;
        log::debug!("Wrote {} cookies to {}", cookies.len(), self.path.display());
        Ok(())
    }

    /// `None` when no file exists yet
    pub fn load(&self) -> Result<Option<CookieMap>, VaultError> {
        if !self.exists() {
            return Ok(None);
        }

        let envelope: Envelope = serde_json::from_str(&fs::read_to_string(&self.path)?)?;
        if envelope.version != ENVELOPE_VERSION {
            return Err(VaultError::Version(envelope.version));
        }

        let salt = BASE64.decode(&envelope.salt)?;
        let nonce = BASE64.decode(&envelope.nonce)?;
        let sealed = BASE64.decode(&envelope.sealed)?;
        if nonce.len() != NONCE_LEN {
            return Err(VaultError::Open);
        }

        let plaintext = self
            .cipher(&salt)?
            .decrypt(Nonce::from_slice(&nonce), sealed.as_slice())
            .map_err(|_| VaultError::Open)?;

        Ok(Some(serde_json::from_slice(&plaintext)?))
    }

    pub fn remove(&self) -> Result<(), VaultError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn cipher(&self, salt: &[u8]) -> Result<Aes256Gcm, VaultError> {
        let passphrase = self.passphrase.clone().unwrap_or_else(machine_identity);
        let mut key = [0u8; 32];
        Argon2::default()
            .hash_password_into(passphrase.as_bytes(), salt, &mut key)
            .map_err(|_| VaultError::KeyDerivation)?;
        Aes256Gcm::new_from_slice(&key).map_err(|_| VaultError::KeyDerivation)
    }
}

/// Home directory and host name; the file only opens for the same user on the same host
fn machine_identity() -> String {
    let host = hostname::get()
        .map(|h| h.to_string_lossy().into_owned())
        .unwrap_or_default();
    let home = dirs::home_dir()
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_default();
    format!("usage-watcher:{}@{}", home, host)
}
