pub mod credentials;
pub mod encrypted;
pub mod keyring;

pub use credentials::{CredentialError, CredentialSource, Credentials};
