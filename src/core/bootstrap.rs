// src/core/bootstrap.rs

//! Single-use bootstrap token registry. Tokens expire on first
//! consumption, never by time; they exist only to authorize one fetch
//! of `init_script.sh` per provisioning run.

use crate::core::metrics::BOOTSTRAP_TOKENS_OUTSTANDING;
use parking_lot::Mutex;
use rand::RngCore;
use std::collections::HashSet;
use std::sync::Arc;

#[derive(Clone)]
pub struct BootstrapTokenRegistry {
    tokens: Arc<Mutex<HashSet<String>>>,
}

impl BootstrapTokenRegistry {
    pub fn new() -> Self {
        Self {
            tokens: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Mints a fresh 16-hex-byte token and registers it as outstanding.
    pub fn mint(&self) -> String {
        let mut bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut bytes);
        let token = hex::encode(bytes);

        let mut guard = self.tokens.lock();
        guard.insert(token.clone());
        BOOTSTRAP_TOKENS_OUTSTANDING.set(guard.len() as f64);
        token
    }

    /// Atomically checks for and removes `token`. Returns `true` if it
    /// was outstanding.
    pub fn consume(&self, token: &str) -> bool {
        let mut guard = self.tokens.lock();
        let existed = guard.remove(token);
        BOOTSTRAP_TOKENS_OUTSTANDING.set(guard.len() as f64);
        existed
    }
}

impl Default for BootstrapTokenRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minted_token_consumes_exactly_once() {
        let registry = BootstrapTokenRegistry::new();
        let token = registry.mint();
        assert!(registry.consume(&token));
        assert!(!registry.consume(&token));
    }

    #[test]
    fn unknown_token_is_rejected() {
        let registry = BootstrapTokenRegistry::new();
        assert!(!registry.consume("deadbeef"));
    }

    #[test]
    fn minted_tokens_are_sixteen_bytes_hex_encoded() {
        let registry = BootstrapTokenRegistry::new();
        let token = registry.mint();
        assert_eq!(token.len(), 32);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
