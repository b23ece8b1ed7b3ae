//! Provider health monitoring and automatic failover.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::error::Result;
use crate::gateway::GatewayController;
use crate::probe::{collect_health, Prober, ProviderHealth};
use crate::profile::{ConfigApplier, ProviderProfile};
use crate::provider::Provider;
use crate::secrets::SecretStore;
use crate::settings::Settings;

/// Interval between health ticks.
pub const CHECK_INTERVAL: Duration = Duration::from_secs(60);

/// Consecutive unhealthy ticks of the active provider before failing over.
pub const FAILOVER_THRESHOLD: u32 = 3;

/// Fire-and-forget user-visible alert, used only on failover.
pub trait Notifier: Send + Sync {
    fn notify(&self, message: &str);
}

/// Whether the failure count has reached the failover threshold.
pub fn should_failover(failures: u32, threshold: u32) -> bool {
    failures >= threshold
}

/// First healthy provider in primary priority order, if any. Providers
/// that cannot hold the primary slot are never chosen, healthy or not.
pub fn choose_best_provider(health: &[ProviderHealth]) -> Option<Provider> {
    Provider::PRIMARY_PRIORITY
        .iter()
        .copied()
        .find(|&p| health.iter().any(|h| h.provider == p && h.ok))
}

/// In-memory supervisor state, process-lifetime only. Mutated exclusively
/// inside the serialized tick.
#[derive(Debug, Default)]
struct SupervisorState {
    failure_counts: HashMap<Provider, u32>,
    active: Option<Provider>,
}

impl SupervisorState {
    fn failures(&self, provider: Provider) -> u32 {
        self.failure_counts.get(&provider).copied().unwrap_or(0)
    }

    fn record_failure(&mut self, provider: Provider) -> u32 {
        let count = self.failure_counts.entry(provider).or_insert(0);
        *count += 1;
        *count
    }

    fn reset_failures(&mut self, provider: Provider) {
        self.failure_counts.insert(provider, 0);
    }

    fn clear_all_failures(&mut self) {
        self.failure_counts.clear();
    }
}

/// Watches provider health on a fixed interval and switches the gateway to
/// the best available provider after sustained unhealthiness.
///
/// Ticks cannot overlap: the interval loop awaits each tick, and the state
/// sits behind an async mutex held for the whole tick.
pub struct FailoverSupervisor {
    prober: Arc<dyn Prober>,
    secrets: Arc<dyn SecretStore>,
    applier: Arc<dyn ConfigApplier>,
    notifier: Arc<dyn Notifier>,
    gateway: Arc<GatewayController>,
    search_enabled: AtomicBool,
    state: Mutex<SupervisorState>,
    timer: StdMutex<Option<JoinHandle<()>>>,
}

impl FailoverSupervisor {
    pub fn new(
        prober: Arc<dyn Prober>,
        secrets: Arc<dyn SecretStore>,
        applier: Arc<dyn ConfigApplier>,
        notifier: Arc<dyn Notifier>,
        gateway: Arc<GatewayController>,
    ) -> Self {
        Self {
            prober,
            secrets,
            applier,
            notifier,
            gateway,
            search_enabled: AtomicBool::new(true),
            state: Mutex::new(SupervisorState::default()),
            timer: StdMutex::new(None),
        }
    }

    /// Run one immediate tick in initialize-only mode (establishes the
    /// active provider, never fails over), then start the interval timer.
    /// Optionally auto-starts the gateway first, per settings.
    pub async fn initialize(self: &Arc<Self>, settings: &Settings) {
        self.apply_settings(settings);

        if settings.gateway_auto_start {
            let status = self.gateway.start().await;
            if status.running {
                log::info!("Gateway auto-started");
            } else {
                log::warn!(
                    "Gateway auto-start failed: {}",
                    status.error.as_deref().unwrap_or("unknown")
                );
            }
        }

        self.run_check(true).await;

        let supervisor = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(CHECK_INTERVAL);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick fires immediately; the initialize pass above
            // already covered it.
            interval.tick().await;
            loop {
                interval.tick().await;
                supervisor.run_check(false).await;
            }
        });

        let previous = {
            let mut timer = self.timer.lock().unwrap_or_else(|e| e.into_inner());
            timer.replace(handle)
        };
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    pub fn apply_settings(&self, settings: &Settings) {
        self.search_enabled
            .store(settings.search_enabled, Ordering::Relaxed);
    }

    /// Cancel the interval timer. Idempotent.
    pub fn stop(&self) {
        let handle = {
            let mut timer = self.timer.lock().unwrap_or_else(|e| e.into_inner());
            timer.take()
        };
        if let Some(handle) = handle {
            handle.abort();
            log::info!("Failover supervisor stopped");
        }
    }

    pub async fn active_provider(&self) -> Option<Provider> {
        self.state.lock().await.active
    }

    /// Run one tick, swallowing errors: a monitoring loop that can crash
    /// on a transient failure would defeat its purpose.
    async fn run_check(&self, initialize_only: bool) {
        if let Err(e) = self.tick(initialize_only).await {
            log::warn!("Provider health tick failed: {e}");
        }
    }

    async fn tick(&self, initialize_only: bool) -> Result<()> {
        let mut state = self.state.lock().await;

        let health = collect_health(self.prober.as_ref(), self.secrets.as_ref()).await;

        let Some(best) = choose_best_provider(&health) else {
            log::debug!("No healthy provider this tick, taking no action");
            return Ok(());
        };

        let Some(active) = state.active else {
            log::info!("Adopting {} as the active provider", best.display_name());
            state.active = Some(best);
            return Ok(());
        };

        let active_healthy = health
            .iter()
            .find(|h| h.provider == active)
            .is_some_and(|h| h.ok);

        if active_healthy {
            state.reset_failures(active);
            return Ok(());
        }

        let failures = state.record_failure(active);
        log::warn!(
            "Active provider {} unhealthy ({failures}/{FAILOVER_THRESHOLD})",
            active.display_name()
        );

        if initialize_only || !should_failover(failures, FAILOVER_THRESHOLD) || best == active {
            return Ok(());
        }

        let configured = self.secrets.list_configured().await?;
        let profile = ProviderProfile::for_primary(
            best,
            &configured,
            self.search_enabled.load(Ordering::Relaxed),
        );

        let outcome = self.applier.apply_profile(&profile).await;
        if !outcome.ok {
            // Leave the state untouched so a later tick retries.
            log::warn!(
                "Abandoning failover to {}: {}",
                best.display_name(),
                outcome.message
            );
            return Ok(());
        }

        self.notifier.notify(&format!(
            "Provider failover: switched from {} to {} after {FAILOVER_THRESHOLD} failed health checks.",
            active.display_name(),
            best.display_name()
        ));

        state.active = Some(best);
        state.clear_all_failures();

        let stopped = self.gateway.stop().await;
        if stopped.running {
            log::warn!("Gateway did not stop cleanly during failover restart");
        }
        let started = self.gateway.start().await;
        if started.running {
            log::info!(
                "Gateway restarted on {} after failover",
                best.display_name()
            );
        } else {
            log::warn!(
                "Gateway failed to restart after failover: {}",
                started.error.as_deref().unwrap_or("unknown")
            );
        }

        Ok(())
    }
}

impl Drop for FailoverSupervisor {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;

    use super::{
        choose_best_provider, should_failover, FailoverSupervisor, Notifier, FAILOVER_THRESHOLD,
    };
    use crate::error::Result;
    use crate::exec::{CommandResult, ExecOptions};
    use crate::gateway::GatewayController;
    use crate::probe::{Prober, ProviderHealth, VerifyResult};
    use crate::profile::{ApplyOutcome, ConfigApplier, ProviderProfile};
    use crate::provider::Provider;
    use crate::secrets::{MemorySecretStore, SecretStore as _};
    use crate::wsl::ScriptRunner;

    fn health(provider: Provider, ok: bool) -> ProviderHealth {
        ProviderHealth {
            provider,
            ok,
            latency_ms: 10,
            message: String::new(),
        }
    }

    #[test]
    fn should_failover_is_a_threshold_check() {
        assert!(!should_failover(2, 3));
        assert!(should_failover(3, 3));
        assert!(should_failover(4, 3));
        assert!(!should_failover(0, 1));
    }

    #[test]
    fn best_provider_follows_priority_order() {
        let snapshot = [
            health(Provider::Openai, true),
            health(Provider::Deepseek, false),
            health(Provider::Anthropic, true),
        ];
        assert_eq!(choose_best_provider(&snapshot), Some(Provider::Openai));
    }

    #[test]
    fn perplexity_is_never_chosen_as_primary() {
        let snapshot = [
            health(Provider::Perplexity, true),
            health(Provider::Deepseek, false),
        ];
        assert_eq!(choose_best_provider(&snapshot), None);
    }

    /// Prober whose per-provider health can be flipped between ticks.
    struct ScriptedProber {
        unhealthy: Mutex<HashSet<Provider>>,
    }

    impl ScriptedProber {
        fn new() -> Self {
            Self {
                unhealthy: Mutex::new(HashSet::new()),
            }
        }

        fn set_unhealthy(&self, provider: Provider, unhealthy: bool) {
            let mut set = self.unhealthy.lock().unwrap();
            if unhealthy {
                set.insert(provider);
            } else {
                set.remove(&provider);
            }
        }
    }

    #[async_trait]
    impl Prober for ScriptedProber {
        async fn verify(&self, provider: Provider, _key: &str) -> VerifyResult {
            let ok = !self.unhealthy.lock().unwrap().contains(&provider);
            VerifyResult {
                provider,
                ok,
                can_skip: !ok,
                status_code: ok.then_some(200),
                latency_ms: 10,
                message: if ok { "Key verified." } else { "timed out" }.to_string(),
            }
        }
    }

    struct CountingApplier {
        ok: Mutex<bool>,
        calls: Mutex<Vec<ProviderProfile>>,
    }

    impl CountingApplier {
        fn new() -> Self {
            Self {
                ok: Mutex::new(true),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ConfigApplier for CountingApplier {
        async fn apply_profile(&self, profile: &ProviderProfile) -> ApplyOutcome {
            self.calls.lock().unwrap().push(profile.clone());
            let ok = *self.ok.lock().unwrap();
            ApplyOutcome {
                ok,
                message: if ok { "applied" } else { "disk full" }.to_string(),
            }
        }
    }

    struct RecordingNotifier {
        messages: Mutex<Vec<String>>,
    }

    impl Notifier for RecordingNotifier {
        fn notify(&self, message: &str) {
            self.messages.lock().unwrap().push(message.to_string());
        }
    }

    /// Stands in for the gateway CLI behind the shell bridge.
    struct GatewayCliStub {
        running: Mutex<bool>,
        scripts: Mutex<Vec<String>>,
    }

    impl GatewayCliStub {
        fn new() -> Self {
            Self {
                running: Mutex::new(true),
                scripts: Mutex::new(Vec::new()),
            }
        }

        fn count_containing(&self, needle: &str) -> usize {
            self.scripts
                .lock()
                .unwrap()
                .iter()
                .filter(|s| s.contains(needle))
                .count()
        }
    }

    #[async_trait]
    impl ScriptRunner for GatewayCliStub {
        async fn run_script(&self, script: &str, _options: &ExecOptions) -> Result<CommandResult> {
            self.scripts.lock().unwrap().push(script.to_string());
            let stdout = if script.starts_with("command -v") {
                "/usr/local/bin/omnigate\n".to_string()
            } else if script.contains("status") {
                let running = *self.running.lock().unwrap();
                format!("{{\"running\":{running}}}")
            } else if script.contains("gateway start") {
                *self.running.lock().unwrap() = true;
                "{\"ok\":true}".to_string()
            } else if script.contains("gateway stop") {
                *self.running.lock().unwrap() = false;
                String::new()
            } else {
                String::new()
            };
            Ok(CommandResult {
                stdout,
                stderr: String::new(),
                exit_code: 0,
                duration_ms: 1,
            })
        }
    }

    struct Harness {
        prober: Arc<ScriptedProber>,
        secrets: Arc<MemorySecretStore>,
        applier: Arc<CountingApplier>,
        notifier: Arc<RecordingNotifier>,
        cli: Arc<GatewayCliStub>,
        supervisor: Arc<FailoverSupervisor>,
    }

    async fn harness() -> Harness {
        let prober = Arc::new(ScriptedProber::new());
        let secrets = Arc::new(MemorySecretStore::new());
        secrets.set(Provider::Deepseek, "dk").await.unwrap();
        secrets.set(Provider::Openai, "ok").await.unwrap();
        let applier = Arc::new(CountingApplier::new());
        let notifier = Arc::new(RecordingNotifier {
            messages: Mutex::new(Vec::new()),
        });
        let cli = Arc::new(GatewayCliStub::new());
        let gateway = Arc::new(GatewayController::new(
            Arc::clone(&cli) as Arc<dyn ScriptRunner>
        ));
        let supervisor = Arc::new(FailoverSupervisor::new(
            Arc::clone(&prober) as Arc<dyn Prober>,
            Arc::clone(&secrets) as Arc<dyn crate::secrets::SecretStore>,
            Arc::clone(&applier) as Arc<dyn ConfigApplier>,
            Arc::clone(&notifier) as Arc<dyn Notifier>,
            gateway,
        ));
        Harness {
            prober,
            secrets,
            applier,
            notifier,
            cli,
            supervisor,
        }
    }

    #[tokio::test]
    async fn first_tick_adopts_the_best_provider() {
        let h = harness().await;
        h.supervisor.run_check(true).await;
        assert_eq!(h.supervisor.active_provider().await, Some(Provider::Deepseek));
        assert_eq!(h.applier.call_count(), 0);
    }

    #[tokio::test]
    async fn three_unhealthy_ticks_trigger_exactly_one_failover() {
        let h = harness().await;
        h.supervisor.run_check(true).await;
        assert_eq!(h.supervisor.active_provider().await, Some(Provider::Deepseek));

        h.prober.set_unhealthy(Provider::Deepseek, true);

        h.supervisor.run_check(false).await;
        h.supervisor.run_check(false).await;
        assert_eq!(h.applier.call_count(), 0);
        assert_eq!(h.supervisor.active_provider().await, Some(Provider::Deepseek));

        h.supervisor.run_check(false).await;

        assert_eq!(h.applier.call_count(), 1);
        let profile = h.applier.calls.lock().unwrap()[0].clone();
        assert_eq!(profile.default_model, "gpt-4o-mini");

        assert_eq!(h.supervisor.active_provider().await, Some(Provider::Openai));
        {
            let state = h.supervisor.state.lock().await;
            assert!(state.failure_counts.is_empty());
        }

        let messages = h.notifier.messages.lock().unwrap().clone();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].contains("DeepSeek"));
        assert!(messages[0].contains("OpenAI"));

        assert_eq!(h.cli.count_containing("gateway stop"), 1);
        assert_eq!(h.cli.count_containing("gateway start --json"), 1);
    }

    #[tokio::test]
    async fn initialize_only_ticks_never_fail_over() {
        let h = harness().await;
        h.supervisor.run_check(true).await;
        h.prober.set_unhealthy(Provider::Deepseek, true);

        for _ in 0..FAILOVER_THRESHOLD + 2 {
            h.supervisor.run_check(true).await;
        }

        assert_eq!(h.applier.call_count(), 0);
        assert_eq!(h.supervisor.active_provider().await, Some(Provider::Deepseek));
    }

    #[tokio::test]
    async fn a_healthy_tick_resets_the_failure_counter() {
        let h = harness().await;
        h.supervisor.run_check(true).await;

        h.prober.set_unhealthy(Provider::Deepseek, true);
        h.supervisor.run_check(false).await;
        h.supervisor.run_check(false).await;

        h.prober.set_unhealthy(Provider::Deepseek, false);
        h.supervisor.run_check(false).await;

        // Two more unhealthy ticks must not reach the threshold.
        h.prober.set_unhealthy(Provider::Deepseek, true);
        h.supervisor.run_check(false).await;
        h.supervisor.run_check(false).await;

        assert_eq!(h.applier.call_count(), 0);
        assert_eq!(h.supervisor.active_provider().await, Some(Provider::Deepseek));
    }

    #[tokio::test]
    async fn no_healthy_provider_means_no_action() {
        let h = harness().await;
        h.supervisor.run_check(true).await;

        h.prober.set_unhealthy(Provider::Deepseek, true);
        h.prober.set_unhealthy(Provider::Openai, true);
        for _ in 0..FAILOVER_THRESHOLD + 1 {
            h.supervisor.run_check(false).await;
        }

        assert_eq!(h.applier.call_count(), 0);
        assert_eq!(h.supervisor.active_provider().await, Some(Provider::Deepseek));
    }

    #[tokio::test]
    async fn failed_profile_application_abandons_the_failover() {
        let h = harness().await;
        h.supervisor.run_check(true).await;
        h.prober.set_unhealthy(Provider::Deepseek, true);
        *h.applier.ok.lock().unwrap() = false;

        for _ in 0..FAILOVER_THRESHOLD {
            h.supervisor.run_check(false).await;
        }

        assert_eq!(h.applier.call_count(), 1);
        assert_eq!(h.supervisor.active_provider().await, Some(Provider::Deepseek));
        assert!(h.notifier.messages.lock().unwrap().is_empty());
        assert_eq!(h.cli.count_containing("gateway stop"), 0);

        // The next tick retries once the applier recovers.
        *h.applier.ok.lock().unwrap() = true;
        h.supervisor.run_check(false).await;
        assert_eq!(h.applier.call_count(), 2);
        assert_eq!(h.supervisor.active_provider().await, Some(Provider::Openai));
    }

    #[tokio::test]
    async fn stop_is_idempotent() {
        let h = harness().await;
        h.supervisor.initialize(&crate::settings::Settings::default()).await;
        h.supervisor.stop();
        h.supervisor.stop();
    }
}
