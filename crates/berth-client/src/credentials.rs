//! API token lookup.
//!
//! Tokens are stored per server URL so one user can keep several servers
//! configured.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use berth_common::error::{BerthError, Result};

/// Supplies and stores API tokens per server URL.
pub trait CredentialStore: Send + Sync {
    /// Returns the token for a server, if one is stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store cannot be read.
    fn token(&self, server_url: &str) -> Result<Option<String>>;

    /// Stores the token for a server, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store cannot be written.
    fn store_token(&self, server_url: &str, token: &str) -> Result<()>;

    /// Forgets the token for a server.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store cannot be written.
    fn remove_token(&self, server_url: &str) -> Result<()>;
}

/// Keeps tokens in process memory.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    tokens: RwLock<HashMap<String, String>>,
}

impl MemoryCredentialStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn token(&self, server_url: &str) -> Result<Option<String>> {
        let tokens = self.tokens.read().unwrap_or_else(PoisonError::into_inner);
        Ok(tokens.get(normalize(server_url)).cloned())
    }

    fn store_token(&self, server_url: &str, token: &str) -> Result<()> {
        let mut tokens = self.tokens.write().unwrap_or_else(PoisonError::into_inner);
        let _ = tokens.insert(normalize(server_url).to_string(), token.to_string());
        Ok(())
    }

    fn remove_token(&self, server_url: &str) -> Result<()> {
        let mut tokens = self.tokens.write().unwrap_or_else(PoisonError::into_inner);
        let _ = tokens.remove(normalize(server_url));
        Ok(())
    }
}

/// Reads a single token from an environment variable, whatever the server.
#[derive(Debug, Clone)]
pub struct EnvCredentialStore {
    var: String,
}

impl EnvCredentialStore {
    /// Creates a store reading the given variable.
    #[must_use]
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

impl CredentialStore for EnvCredentialStore {
    fn token(&self, _server_url: &str) -> Result<Option<String>> {
        Ok(std::env::var(&self.var).ok().filter(|t| !t.trim().is_empty()))
    }

    fn store_token(&self, _server_url: &str, _token: &str) -> Result<()> {
        Err(BerthError::Config {
            message: format!("tokens are read from ${} and cannot be stored", self.var),
        })
    }

    fn remove_token(&self, _server_url: &str) -> Result<()> {
        Err(BerthError::Config {
            message: format!("tokens are read from ${} and cannot be removed", self.var),
        })
    }
}

fn normalize(server_url: &str) -> &str {
    server_url.trim_end_matches('/')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_ignores_trailing_slash() {
        let store = MemoryCredentialStore::new();
        store.store_token("https://p.local/", "secret").unwrap();
        assert_eq!(
            store.token("https://p.local").unwrap().as_deref(),
            Some("secret")
        );
    }

    #[test]
    fn memory_store_remove_forgets_token() {
        let store = MemoryCredentialStore::new();
        store.store_token("https://p.local", "secret").unwrap();
        store.remove_token("https://p.local").unwrap();
        assert!(store.token("https://p.local").unwrap().is_none());
    }

    #[test]
    fn env_store_is_read_only() {
        let store = EnvCredentialStore::new("BERTH_TEST_TOKEN_THAT_IS_NEVER_SET");
        assert!(store.token("https://p.local").unwrap().is_none());
        assert!(store.store_token("https://p.local", "x").is_err());
    }
}
