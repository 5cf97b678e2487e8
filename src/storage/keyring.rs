//! Cookie map kept as one JSON secret in the OS keychain
//! - Windows: Credential Manager
//! - macOS: Keychain
//! - Linux: kernel keyutils (gone after logout or reboot)

use keyring::Entry;

use crate::storage::encrypted::CookieMap;

const SERVICE: &str = "com.usagewatcher";
/// Account name of the cookie secret
pub const COOKIE_ACCOUNT: &str = "claude_cookies";

#[derive(Debug, thiserror::Error)]
pub enum KeyringError {
    #[error("Keychain error: {0}")]
    Keyring(#[from] keyring::Error),
    #[error("Keychain secret is not a cookie map: {0}")]
    Format(#[from] serde_json::Error),
}

pub struct CookieKeychain {
    account: String,
}

impl Default for CookieKeychain {
    fn default() -> Self {
        Self::new(COOKIE_ACCOUNT)
    }
}

impl CookieKeychain {
    pub fn new(account: impl Into<String>) -> Self {
        Self {
            account: account.into(),
        }
    }

    fn entry(&self) -> Result<Entry, KeyringError> {
        Ok(Entry::new(SERVICE, &self.account)?)
    }

    /// `None` when nothing is stored yet
    pub fn load(&self) -> Result<Option<CookieMap>, KeyringError> {
        match self.entry()?.get_password() {
            Ok(secret) => Ok(Some(serde_json::from_str(&secret)?)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn save(&self, cookies: &CookieMap) -> Result<(), KeyringError> {
        let secret = serde_json::to_string(cookies)?;
        self.entry()?.set_password(&secret)?;
        log::debug!("Stored {} cookies in the keychain", cookies.len());
        Ok(())
    }

    /// Succeeds when nothing was stored
    pub fn clear(&self) -> Result<(), KeyringError> {
        match self.entry()?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
