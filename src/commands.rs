//! Host-facing command surface.
//!
//! The desktop shell wires real collaborators into [`AppState`] and calls
//! these free functions one-to-one from its command handlers. Nothing here
//! throws across the boundary: lifecycle operations return status values,
//! and `Result` is reserved for store/filesystem failures the host can show
//! verbatim.

use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use crate::bootstrap::{self, BootstrapOutcome, PrereqReport};
use crate::error::Result;
use crate::gateway::{export_logs, tail_logs, GatewayController, GatewayStatus};
use crate::probe::{collect_health, KeyProber, Prober, ProviderHealth, VerifyResult};
use crate::profile::{ApplyOutcome, ConfigApplier, ProviderProfile};
use crate::provider::Provider;
use crate::secrets::SecretStore;
use crate::settings::Settings;
use crate::wsl::WslBridge;

/// Wired collaborators, constructed once by the host at startup.
pub struct AppState {
    pub bridge: Arc<WslBridge>,
    pub gateway: Arc<GatewayController>,
    pub prober: Arc<dyn Prober>,
    pub secrets: Arc<dyn SecretStore>,
    pub applier: Arc<dyn ConfigApplier>,
    settings: RwLock<Settings>,
}

impl AppState {
    pub fn new(
        settings: Settings,
        secrets: Arc<dyn SecretStore>,
        applier: Arc<dyn ConfigApplier>,
    ) -> Self {
        let bridge = Arc::new(WslBridge::new(settings.wsl_distro.clone()));
        let gateway = Arc::new(GatewayController::new(Arc::clone(&bridge) as _));
        Self {
            bridge,
            gateway,
            prober: Arc::new(KeyProber::new()),
            secrets,
            applier,
            settings: RwLock::new(settings),
        }
    }

    pub fn settings(&self) -> Settings {
        self.settings
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn update_settings(&self, settings: Settings) {
        *self.settings.write().unwrap_or_else(|e| e.into_inner()) = settings;
    }
}

// === Environment ===

pub async fn check_prereqs(state: &AppState) -> PrereqReport {
    bootstrap::check_prereqs(&state.bridge, &state.gateway).await
}

pub async fn run_bootstrap(state: &AppState) -> BootstrapOutcome {
    bootstrap::run_bootstrap(&state.bridge).await
}

// === Credentials ===

pub async fn verify_key(state: &AppState, provider: Provider, key: &str) -> VerifyResult {
    state.prober.verify(provider, key).await
}

/// Verify, then store. An unverifiable key (network-origin failure) is
/// stored only when the caller opted in via `allow_unverified`; a rejected
/// key is never stored. The verification result is returned either way so
/// the host can explain what happened.
pub async fn save_key(
    state: &AppState,
    provider: Provider,
    key: &str,
    allow_unverified: bool,
) -> Result<VerifyResult> {
    let result = state.prober.verify(provider, key).await;
    if result.ok || (result.can_skip && allow_unverified) {
        state.secrets.set(provider, key.trim()).await?;
    }
    Ok(result)
}

pub async fn remove_key(state: &AppState, provider: Provider) -> Result<()> {
    state.secrets.delete(provider).await
}

pub async fn list_configured(state: &AppState) -> Result<Vec<Provider>> {
    state.secrets.list_configured().await
}

// === Provider configuration ===

/// Build the profile for a chosen primary provider and hand it to the
/// config applier.
pub async fn apply_profile(state: &AppState, primary: Provider) -> Result<ApplyOutcome> {
    let configured = state.secrets.list_configured().await?;
    let profile =
        ProviderProfile::for_primary(primary, &configured, state.settings().search_enabled);
    Ok(state.applier.apply_profile(&profile).await)
}

pub async fn health_check_providers(state: &AppState) -> Vec<ProviderHealth> {
    collect_health(state.prober.as_ref(), state.secrets.as_ref()).await
}

// === Gateway ===

pub async fn gateway_start(state: &AppState) -> GatewayStatus {
    state.gateway.start().await
}

pub async fn gateway_stop(state: &AppState) -> GatewayStatus {
    state.gateway.stop().await
}

pub async fn gateway_status(state: &AppState) -> GatewayStatus {
    state.gateway.status().await
}

// === Logs ===

pub async fn get_logs(state: &AppState, lines: u32) -> Result<String> {
    tail_logs(state.bridge.as_ref(), lines).await
}

pub async fn export_gateway_logs(state: &AppState, dest: Option<PathBuf>) -> Result<PathBuf> {
    export_logs(state.bridge.as_ref(), dest).await
}
