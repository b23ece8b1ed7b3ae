//! One-shot liveness/auth probes against each provider's API.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures_util::future::join_all;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use serde_json::json;

use crate::provider::Provider;
use crate::secrets::SecretStore;

/// Upper bound for a single verification request.
pub const VERIFY_TIMEOUT: Duration = Duration::from_secs(15);

/// Outcome of one credential verification.
///
/// `can_skip` marks the failure as network-origin: the key could not be
/// checked, but it was not rejected either, so the caller may persist it
/// anyway. A rejected key is never skippable.
#[derive(Debug, Clone, Serialize)]
pub struct VerifyResult {
    pub provider: Provider,
    pub ok: bool,
    pub can_skip: bool,
    pub status_code: Option<u16>,
    pub latency_ms: u64,
    pub message: String,
}

/// Per-provider health snapshot entry, recomputed fully each tick.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderHealth {
    pub provider: Provider,
    pub ok: bool,
    pub latency_ms: u64,
    pub message: String,
}

/// Verification seam, so the supervisor's state machine can be driven with
/// scripted health in tests.
#[async_trait]
pub trait Prober: Send + Sync {
    async fn verify(&self, provider: Provider, key: &str) -> VerifyResult;
}

/// Probes the real provider APIs over a shared HTTP client.
pub struct KeyProber {
    client: Client,
}

impl KeyProber {
    #[allow(clippy::expect_used)]
    pub fn new() -> Self {
        let client = Client::builder()
            .timeout(VERIFY_TIMEOUT)
            .build()
            .expect("Failed to create HTTP client");
        Self { client }
    }

    /// Issue the provider's minimal liveness request: a models-list lookup
    /// for OpenAI, a one-token completion for the rest.
    async fn send_probe(
        &self,
        provider: Provider,
        key: &str,
    ) -> std::result::Result<StatusCode, reqwest::Error> {
        let request = match provider {
            Provider::Openai => self
                .client
                .get("https://api.openai.com/v1/models")
                .bearer_auth(key),
            Provider::Anthropic => self
                .client
                .post("https://api.anthropic.com/v1/messages")
                .header("x-api-key", key)
                .header("anthropic-version", "2023-06-01")
                .json(&one_token_completion(provider)),
            Provider::Deepseek => self
                .client
                .post("https://api.deepseek.com/chat/completions")
                .bearer_auth(key)
                .json(&one_token_completion(provider)),
            Provider::Perplexity => self
                .client
                .post("https://api.perplexity.ai/chat/completions")
                .bearer_auth(key)
                .json(&one_token_completion(provider)),
        };

        Ok(request.send().await?.status())
    }
}

impl Default for KeyProber {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Prober for KeyProber {
    async fn verify(&self, provider: Provider, key: &str) -> VerifyResult {
        let key = key.trim();
        if key.is_empty() {
            return VerifyResult {
                provider,
                ok: false,
                can_skip: false,
                status_code: None,
                latency_ms: 0,
                message: "API key is empty.".to_string(),
            };
        }

        let started = Instant::now();
        let outcome = self.send_probe(provider, key).await;
        let latency_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(status) => classify_status(provider, status.as_u16(), latency_ms),
            Err(e) => VerifyResult {
                provider,
                ok: false,
                can_skip: true,
                status_code: None,
                latency_ms,
                message: format!("Could not reach the verification endpoint: {e}"),
            },
        }
    }
}

fn one_token_completion(provider: Provider) -> serde_json::Value {
    json!({
        "model": provider.default_model(),
        "max_tokens": 1,
        "messages": [{"role": "user", "content": "ping"}],
    })
}

/// Map an HTTP status to a verification result. Any response from the
/// provider, even a rejection, means the endpoint was reached, so nothing
/// here is skippable.
pub fn classify_status(provider: Provider, code: u16, latency_ms: u64) -> VerifyResult {
    let (ok, message) = if (200..300).contains(&code) {
        (true, "Key verified.".to_string())
    } else if code == 401 || code == 403 {
        (
            false,
            format!("Authentication failed (HTTP {code}): the key was rejected."),
        )
    } else {
        (false, format!("Provider rejected the request (HTTP {code})."))
    };

    VerifyResult {
        provider,
        ok,
        can_skip: false,
        status_code: Some(code),
        latency_ms,
        message,
    }
}

/// Probe every provider with a stored key concurrently; providers without
/// one are marked unhealthy as "Not configured" without a network call.
pub async fn collect_health(
    prober: &dyn Prober,
    secrets: &dyn SecretStore,
) -> Vec<ProviderHealth> {
    let checks = Provider::ALL.iter().map(|&provider| async move {
        let key = match secrets.get(provider).await {
            Ok(key) => key,
            Err(e) => {
                log::warn!("Secret lookup failed for {provider}: {e}");
                None
            }
        };

        let Some(key) = key else {
            return ProviderHealth {
                provider,
                ok: false,
                latency_ms: 0,
                message: "Not configured".to_string(),
            };
        };

        let result = prober.verify(provider, &key).await;
        ProviderHealth {
            provider,
            ok: result.ok,
            latency_ms: result.latency_ms,
            message: result.message,
        }
    });

    join_all(checks).await
}
