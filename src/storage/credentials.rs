//! Session cookie loading from the local stores

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::{Config, SourceKind};
use crate::storage::encrypted::{CookieVault, VaultError};
use crate::storage::keyring::{CookieKeychain, KeyringError};

#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("No cookies for {domain} found in {store}")]
    Empty { domain: String, store: String },
    #[error("Credential store unavailable: {0}")]
    Unavailable(String),
    #[error(transparent)]
    Keyring(#[from] KeyringError),
    #[error(transparent)]
    Vault(#[from] VaultError),
}

/// Cookie name -> value for a single domain. Values never appear in `Debug` output.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    domain: String,
    cookies: BTreeMap<String, String>,
}

impl Credentials {
    pub fn new(domain: impl Into<String>, cookies: BTreeMap<String, String>) -> Self {
        Self {
            domain: domain.into(),
            cookies,
        }
    }

    /// Parse a raw `Cookie` header (`a=1; b=2`). A leading `Cookie:` is tolerated.
    pub fn from_cookie_header(domain: impl Into<String>, header: &str) -> Self {
        let header = header.trim();
        let header = header
            .strip_prefix("Cookie:")
            .or_else(|| header.strip_prefix("cookie:"))
            .unwrap_or(header);

        let cookies = header
            .split(';')
            .filter_map(|pair| {
                let (name, value) = pair.split_once('=')?;
                let name = name.trim();
                if name.is_empty() {
                    return None;
                }
                Some((name.to_string(), value.trim().to_string()))
            })
            .collect();

        Self::new(domain, cookies)
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }

    pub fn len(&self) -> usize {
        self.cookies.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.cookies.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn cookies(&self) -> &BTreeMap<String, String> {
        &self.cookies
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("domain", &self.domain)
            .field("names", &self.cookies.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// A trusted local store holding session cookies
pub trait CredentialSource: Send + Sync {
    /// Human readable store name for logs and errors
    fn describe(&self) -> String;

    fn load(&self) -> Result<Credentials, CredentialError>;
}

/// Cookie header in an environment variable
pub struct EnvSource {
    var: String,
    domain: String,
}

impl EnvSource {
    pub fn new(var: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            var: var.into(),
            domain: domain.into(),
        }
    }
}

impl CredentialSource for EnvSource {
    fn describe(&self) -> String {
        format!("${}", self.var)
    }

    fn load(&self) -> Result<Credentials, CredentialError> {
        let header = std::env::var(&self.var).unwrap_or_default();
        let credentials = Credentials::from_cookie_header(&self.domain, &header);
        non_empty(credentials, self.describe())
    }
}

/// Cookie map stored as JSON in the OS keychain
pub struct KeyringSource {
    domain: String,
}

impl KeyringSource {
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
        }
    }
}

impl CredentialSource for KeyringSource {
    fn describe(&self) -> String {
        "OS keychain".to_string()
    }

    fn load(&self) -> Result<Credentials, CredentialError> {
        let cookies = CookieKeychain::default().load()?.unwrap_or_default();
        non_empty(Credentials::new(&self.domain, cookies), self.describe())
    }
}

/// Cookie map in the machine-bound encrypted file
pub struct EncryptedFileSource {
    vault: CookieVault,
    domain: String,
}

impl EncryptedFileSource {
    pub fn new(path: impl Into<PathBuf>, domain: impl Into<String>) -> Self {
        Self {
            vault: CookieVault::new(path),
            domain: domain.into(),
        }
    }
}

impl CredentialSource for EncryptedFileSource {
    fn describe(&self) -> String {
        self.vault.path().display().to_string()
    }

    fn load(&self) -> Result<Credentials, CredentialError> {
        let cookies = self.vault.load()?.unwrap_or_default();
        non_empty(Credentials::new(&self.domain, cookies), self.describe())
    }
}

/// Tries each source in order; the first non-empty one wins
pub struct ChainSource {
    sources: Vec<Box<dyn CredentialSource>>,
    domain: String,
}

impl ChainSource {
    pub fn new(domain: impl Into<String>, sources: Vec<Box<dyn CredentialSource>>) -> Self {
        Self {
            sources,
            domain: domain.into(),
        }
    }
}

impl CredentialSource for ChainSource {
    fn describe(&self) -> String {
        self.sources
            .iter()
            .map(|s| s.describe())
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn load(&self) -> Result<Credentials, CredentialError> {
        let mut failures = Vec::new();
        for source in &self.sources {
            match source.load() {
                Ok(credentials) => {
                    log::info!(
                        "Loaded {} cookies from {}",
                        credentials.len(),
                        source.describe()
                    );
                    return Ok(credentials);
                }
                Err(CredentialError::Empty { .. }) => {
                    log::debug!("No cookies in {}", source.describe());
                }
                Err(e) => {
                    log::warn!("Credential source {} failed: {}", source.describe(), e);
                    failures.push(format!("{}: {}", source.describe(), e));
                }
            }
        }

        if failures.is_empty() {
            Err(CredentialError::Empty {
                domain: self.domain.clone(),
                store: self.describe(),
            })
        } else {
            Err(CredentialError::Unavailable(failures.join("; ")))
        }
    }
}

fn non_empty(credentials: Credentials, store: String) -> Result<Credentials, CredentialError> {
    if credentials.is_empty() {
        Err(CredentialError::Empty {
            domain: credentials.domain,
            store,
        })
    } else {
        Ok(credentials)
    }
}

/// Build the source selected in the configuration
pub fn source_for(config: &Config) -> Box<dyn CredentialSource> {
    let domain = config.cookie_domain.as_str();
    let env = || -> Box<dyn CredentialSource> {
        Box::new(EnvSource::new(crate::config::COOKIE_ENV_VAR, domain))
    };
    let keychain = || -> Box<dyn CredentialSource> { Box::new(KeyringSource::new(domain)) };
    let file = || -> Box<dyn CredentialSource> {
        Box::new(EncryptedFileSource::new(config.cookie_file.clone(), domain))
    };

    match config.source {
        SourceKind::Env => env(),
        SourceKind::Keyring => keychain(),
        SourceKind::File => file(),
        SourceKind::Auto => Box::new(ChainSource::new(
            domain,
            vec![env(), keychain(), file()],
        )),
    }
}

pub fn save_to_keyring(credentials: &Credentials) -> Result<(), CredentialError> {
    CookieKeychain::default().save(credentials.cookies())?;
    Ok(())
}

pub fn save_to_file(path: &Path, credentials: &Credentials) -> Result<(), CredentialError> {
    CookieVault::new(path).save(credentials.cookies())?;
    Ok(())
}

/// Remove stored cookies from both stores
pub fn forget(path: &Path) -> Result<(), CredentialError> {
    CookieKeychain::default().clear()?;
    CookieVault::new(path).remove()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(Result<Credentials, &'static str>);

    impl CredentialSource for Fixed {
        fn describe(&self) -> String {
            "fixed".to_string()
        }

        fn load(&self) -> Result<Credentials, CredentialError> {
            match &self.0 {
                Ok(c) => Ok(c.clone()),
                Err("empty") => Err(CredentialError::Empty {
                    domain: ".claude.ai".into(),
                    store: "fixed".into(),
                }),
                Err(msg) => Err(CredentialError::Unavailable(msg.to_string())),
            }
        }
    }

    #[test]
    fn test_parse_cookie_header() {
        let creds = Credentials::from_cookie_header(
            ".claude.ai",
            "Cookie: sessionKey=sk-1; cf_clearance=abc=def ; =bad; lastActiveOrg=o1",
        );
        assert_eq!(creds.len(), 3);
        let map = creds.cookies();
        assert_eq!(map["sessionKey"], "sk-1");
        assert_eq!(map["cf_clearance"], "abc=def");
        assert_eq!(map["lastActiveOrg"], "o1");
    }

    #[test]
    fn test_debug_hides_values() {
        let creds = Credentials::from_cookie_header(".claude.ai", "sessionKey=secret-value");
        let debug = format!("{:?}", creds);
        assert!(debug.contains("sessionKey"));
        assert!(!debug.contains("secret-value"));
    }

    #[test]
    fn test_env_source() {
        let var = "USAGE_WATCHER_TEST_COOKIE_ENV_SOURCE";
        std::env::set_var(var, "sessionKey=abc");
        let creds = EnvSource::new(var, ".claude.ai").load().unwrap();
        assert_eq!(creds.cookies()["sessionKey"], "abc");
        assert_eq!(creds.domain(), ".claude.ai");

        std::env::remove_var(var);
        let err = EnvSource::new(var, ".claude.ai").load().unwrap_err();
        assert!(matches!(err, CredentialError::Empty { .. }));
    }

    #[test]
    fn test_file_source_missing_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let source = EncryptedFileSource::new(dir.path().join("none.enc"), ".claude.ai");
        assert!(matches!(source.load(), Err(CredentialError::Empty { .. })));
    }

    #[test]
    fn test_file_source_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cookies.enc");
        let creds = Credentials::from_cookie_header(".claude.ai", "sessionKey=abc; other=1");
        save_to_file(&path, &creds).unwrap();

        let loaded = EncryptedFileSource::new(&path, ".claude.ai").load().unwrap();
        assert_eq!(loaded, creds);
    }

    #[test]
    fn test_chain_takes_first_non_empty() {
        let creds = Credentials::from_cookie_header(".claude.ai", "sessionKey=abc");
        let chain = ChainSource::new(
            ".claude.ai",
            vec![
                Box::new(Fixed(Err("empty"))),
                Box::new(Fixed(Err("locked"))),
                Box::new(Fixed(Ok(creds.clone()))),
            ],
        );
        assert_eq!(chain.load().unwrap(), creds);
    }

    #[test]
    fn test_chain_all_empty() {
        let chain = ChainSource::new(
            ".claude.ai",
            vec![Box::new(Fixed(Err("empty"))), Box::new(Fixed(Err("empty")))],
        );
        assert!(matches!(chain.load(), Err(CredentialError::Empty { .. })));
    }

    #[test]
    fn test_chain_reports_store_failures() {
        let chain = ChainSource::new(
            ".claude.ai",
            vec![Box::new(Fixed(Err("empty"))), Box::new(Fixed(Err("locked")))],
        );
        match chain.load() {
            Err(CredentialError::Unavailable(msg)) => assert!(msg.contains("locked")),
            other => panic!("unexpected {:?}", other.map(|c| c.len())),
        }
    }
}
