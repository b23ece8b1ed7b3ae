//! Core library of the Omnigate launcher.
//!
//! Manages the lifecycle of the gateway service running inside a WSL
//! distribution, verifies provider credentials, and fails the gateway over
//! to the best available provider when the active one stays unhealthy. The
//! graphical shell, settings persistence, and secret storage live in the
//! host application and reach this crate through the trait boundaries
//! re-exported below.

mod bootstrap;
mod commands;
mod error;
mod exec;
mod gateway;
mod probe;
mod profile;
mod provider;
mod secrets;
mod settings;
mod supervisor;
mod wsl;

pub use bootstrap::{BootstrapOutcome, PrereqCheck, PrereqReport};
pub use commands::{
    apply_profile, check_prereqs, export_gateway_logs, gateway_start, gateway_status,
    gateway_stop, get_logs, health_check_providers, list_configured, remove_key, run_bootstrap,
    save_key, verify_key, AppState,
};
pub use error::{AppError, ErrorKind, Result};
pub use exec::{run_command, CommandResult, ExecOptions, DEFAULT_TIMEOUT};
pub use gateway::{parse_status, GatewayController, GatewayStatus};
pub use probe::{
    classify_status, collect_health, KeyProber, Prober, ProviderHealth, VerifyResult,
    VERIFY_TIMEOUT,
};
pub use profile::{ApplyOutcome, ConfigApplier, ProviderProfile};
pub use provider::Provider;
pub use secrets::{MemorySecretStore, SecretStore};
pub use settings::Settings;
pub use supervisor::{
    choose_best_provider, should_failover, FailoverSupervisor, Notifier, CHECK_INTERVAL,
    FAILOVER_THRESHOLD,
};
pub use wsl::{sh_quote, ScriptRunner, WslBridge};
