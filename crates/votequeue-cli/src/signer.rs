//! Signer credential storage backed by the OS keychain.
//!
//! The ledger gateway authorizes submissions with a bearer token that stands
//! in for the transaction signer. It is kept per profile and never written to
//! the JSON config.

#[cfg(test)]
use std::collections::HashMap;
#[cfg(test)]
use std::sync::{Mutex, OnceLock};

#[cfg(not(test))]
use keyring::Entry;
use thiserror::Error;

use crate::config_profiles::normalize_text_option;

pub const SIGNER_TOKEN_ENV_VAR: &str = "VOTEQUEUE_SIGNER_TOKEN";

#[cfg(not(test))]
const KEYRING_SERVICE_NAME: &str = "votequeue-cli";

#[derive(Debug, Error)]
pub enum SignerError {
    #[error("Secure storage error: {0}")]
    SecureStorage(String),
    #[error("Signer token cannot be empty")]
    EmptyToken,
}

pub type SignerResult<T> = Result<T, SignerError>;

/// Where the active signer token came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignerSource {
    Environment,
    Keychain,
}

#[derive(Clone)]
struct SignerStore {
    username: String,
}

impl SignerStore {
    fn new(profile_name: &str) -> Self {
        Self {
            username: format!("signer_token:{profile_name}"),
        }
    }

    #[cfg(test)]
    fn test_store() -> &'static Mutex<HashMap<String, String>> {
        static STORE: OnceLock<Mutex<HashMap<String, String>>> = OnceLock::new();
        STORE.get_or_init(|| Mutex::new(HashMap::new()))
    }

    #[cfg(not(test))]
    fn entry(&self) -> SignerResult<Entry> {
        Entry::new(KEYRING_SERVICE_NAME, &self.username)
            .map_err(|error| SignerError::SecureStorage(error.to_string()))
    }

    #[cfg(not(test))]
    fn load(&self) -> SignerResult<Option<String>> {
        match self.entry()?.get_password() {
            Ok(token) => Ok(normalize_text_option(Some(token))),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(error) => Err(SignerError::SecureStorage(error.to_string())),
        }
    }

    #[cfg(test)]
    fn load(&self) -> SignerResult<Option<String>> {
        let guard = Self::test_store()
            .lock()
            .map_err(|error| SignerError::SecureStorage(error.to_string()))?;
        Ok(guard.get(&self.username).cloned())
    }

    #[cfg(not(test))]
    fn save(&self, token: &str) -> SignerResult<()> {
        self.entry()?
            .set_password(token)
            .map_err(|error| SignerError::SecureStorage(error.to_string()))
    }

    #[cfg(test)]
    fn save(&self, token: &str) -> SignerResult<()> {
        let mut guard = Self::test_store()
            .lock()
            .map_err(|error| SignerError::SecureStorage(error.to_string()))?;
        guard.insert(self.username.clone(), token.to_string());
        Ok(())
    }

    #[cfg(not(test))]
    fn clear(&self) -> SignerResult<()> {
        match self.entry()?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(error) => Err(SignerError::SecureStorage(error.to_string())),
        }
    }

    #[cfg(test)]
    fn clear(&self) -> SignerResult<()> {
        let mut guard = Self::test_store()
            .lock()
            .map_err(|error| SignerError::SecureStorage(error.to_string()))?;
        guard.remove(&self.username);
        Ok(())
    }
}

pub fn store_signer_token(profile_name: &str, token: &str) -> SignerResult<()> {
    let token = normalize_text_option(Some(token.to_string())).ok_or(SignerError::EmptyToken)?;
    SignerStore::new(profile_name).save(&token)
}

pub fn load_stored_signer_token(profile_name: &str) -> SignerResult<Option<String>> {
    SignerStore::new(profile_name).load()
}

pub fn clear_stored_signer_token(profile_name: &str) -> SignerResult<()> {
    SignerStore::new(profile_name).clear()
}

/// Token from `VOTEQUEUE_SIGNER_TOKEN`, falling back to the keychain
pub fn resolve_signer_token(profile_name: &str) -> SignerResult<Option<(String, SignerSource)>> {
    if let Some(token) = normalize_text_option(std::env::var(SIGNER_TOKEN_ENV_VAR).ok()) {
        return Ok(Some((token, SignerSource::Environment)));
    }
    Ok(load_stored_signer_token(profile_name)?.map(|token| (token, SignerSource::Keychain)))
}
