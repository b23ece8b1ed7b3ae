//! Boundary to wherever the host keeps provider API keys.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::error::Result;
use crate::provider::Provider;

/// Opaque key-value store for provider credentials. The host wires in its
/// platform keychain; tests and keychain-less hosts use [`MemorySecretStore`].
#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn get(&self, provider: Provider) -> Result<Option<String>>;
    async fn set(&self, provider: Provider, key: &str) -> Result<()>;
    async fn delete(&self, provider: Provider) -> Result<()>;

    /// Providers with a stored secret, in [`Provider::ALL`] order.
    async fn list_configured(&self) -> Result<Vec<Provider>>;
}

/// In-memory store, process-lifetime only.
#[derive(Debug, Default)]
pub struct MemorySecretStore {
    keys: RwLock<HashMap<Provider, String>>,
}

impl MemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SecretStore for MemorySecretStore {
    async fn get(&self, provider: Provider) -> Result<Option<String>> {
        let keys = self.keys.read().unwrap_or_else(|e| e.into_inner());
        Ok(keys.get(&provider).cloned())
    }

    async fn set(&self, provider: Provider, key: &str) -> Result<()> {
        let mut keys = self.keys.write().unwrap_or_else(|e| e.into_inner());
        keys.insert(provider, key.to_string());
        Ok(())
    }

    async fn delete(&self, provider: Provider) -> Result<()> {
        let mut keys = self.keys.write().unwrap_or_else(|e| e.into_inner());
        keys.remove(&provider);
        Ok(())
    }

    async fn list_configured(&self) -> Result<Vec<Provider>> {
        let keys = self.keys.read().unwrap_or_else(|e| e.into_inner());
        Ok(Provider::ALL
            .iter()
            .copied()
            .filter(|p| keys.contains_key(p))
            .collect())
    }
}
