//! Provider profiles and the boundary that applies them to the gateway.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::provider::Provider;

/// Everything the gateway's configuration needs to know about providers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderProfile {
    pub enabled_providers: Vec<Provider>,
    pub default_model: String,
    pub fallback_chain: Vec<String>,
    pub search_enabled: bool,
}

impl ProviderProfile {
    /// Build the profile for a chosen primary provider.
    ///
    /// The fallback chain is the default models of the other configured
    /// primary-capable providers, in priority order. Search stays off
    /// unless requested and perplexity holds a key.
    pub fn for_primary(primary: Provider, configured: &[Provider], search_enabled: bool) -> Self {
        let fallback_chain = Provider::PRIMARY_PRIORITY
            .iter()
            .filter(|&&p| p != primary && configured.contains(&p))
            .map(|p| p.default_model().to_string())
            .collect();

        Self {
            enabled_providers: configured.to_vec(),
            default_model: primary.default_model().to_string(),
            fallback_chain,
            search_enabled: search_enabled && configured.contains(&Provider::Perplexity),
        }
    }
}

/// Result of handing a profile to the external config applier.
#[derive(Debug, Clone, Serialize)]
pub struct ApplyOutcome {
    pub ok: bool,
    pub message: String,
}

/// Translates a profile into the gateway's configuration. Owned by the
/// host; opaque to this crate beyond this contract.
#[async_trait]
pub trait ConfigApplier: Send + Sync {
    async fn apply_profile(&self, profile: &ProviderProfile) -> ApplyOutcome;
}
