//! Shared credential cache.

use super::types::Credential;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Holds at most one credential and never hands out an expired one.
#[derive(Debug, Default)]
pub struct CredentialCache {
    entry: Mutex<Option<Credential>>,
}

impl CredentialCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Option<Credential>> {
        self.entry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The cached credential if it has not expired. Expired entries are evicted.
    pub fn get(&self) -> Option<Credential> {
        let mut entry = self.lock();
        match entry.as_ref() {
            Some(credential) if !credential.is_expired() => Some(credential.clone()),
            Some(_) => {
                *entry = None;
                None
            }
            None => None,
        }
    }

    /// Store a credential, replacing any previous one.
    pub fn set(&self, credential: Credential) {
        *self.lock() = Some(credential);
    }

    /// Drop the cached credential.
    pub fn clear(&self) {
        *self.lock() = None;
    }
}
