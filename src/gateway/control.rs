//! Gateway start/stop/status orchestration against the external CLI.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Mutex;

use super::status::extract_json_object;
use super::{
    parse_status, GatewayStatus, CLI_TIMEOUT, GATEWAY_LOG_PATH, GATEWAY_PID_PATH,
    START_GRACE_PERIOD,
};
use crate::exec::ExecOptions;
use crate::wsl::{sh_quote, ScriptRunner};

const GATEWAY_CLI: &str = "omnigate";

/// Conventional install locations checked after `command -v`, first hit wins.
const INSTALL_LOCATIONS: [&str; 4] = [
    "/usr/local/bin/omnigate",
    "/usr/bin/omnigate",
    "$HOME/.local/bin/omnigate",
    "$HOME/.npm-global/bin/omnigate",
];

/// Process-name fragments for the pattern-kill step of `stop`.
const PROCESS_PATTERNS: [&str; 2] = ["omnigate gateway", "omnigate-gateway"];

const EXECUTABLE_NOT_FOUND: &str = "omnigate executable not found";

/// Drives the gateway through the external CLI.
///
/// Holds no state about the gateway itself; every call recomputes from the
/// tool. `start` and `stop` are serialized through an async mutex so a
/// user-triggered start cannot race a failover restart. `status` is
/// read-only and takes no lock.
pub struct GatewayController {
    runner: Arc<dyn ScriptRunner>,
    lifecycle: Mutex<()>,
}

impl GatewayController {
    pub fn new(runner: Arc<dyn ScriptRunner>) -> Self {
        Self {
            runner,
            lifecycle: Mutex::new(()),
        }
    }

    /// Find the gateway CLI inside the distribution.
    pub async fn locate_executable(&self) -> Option<String> {
        let mut script = format!("command -v {GATEWAY_CLI} 2>/dev/null");
        for location in INSTALL_LOCATIONS {
            script.push_str(&format!(" || {{ [ -x {location} ] && echo {location}; }}"));
        }

        match self.runner.run_script(&script, &cli_options()).await {
            Ok(result) => {
                let path = result.stdout.lines().next().unwrap_or("").trim();
                if path.is_empty() {
                    None
                } else {
                    Some(path.to_string())
                }
            }
            Err(e) => {
                log::warn!("Failed to locate {GATEWAY_CLI}: {e}");
                None
            }
        }
    }

    /// Query the gateway's current state. Never fails the caller: an
    /// unlocatable executable or unparseable output degrades to `Stopped`.
    pub async fn status(&self) -> GatewayStatus {
        match self.locate_executable().await {
            Some(exe) => self.query_status(&exe).await,
            None => GatewayStatus::stopped(Some(EXECUTABLE_NOT_FOUND.to_string())),
        }
    }

    /// Layered status query: the general status command first, then the
    /// gateway subcommand in structured mode, then in plain-text mode. A
    /// failed invocation or a parse miss falls through to the next source.
    /// Output from a non-zero exit still parses, but only as a fallback:
    /// a later source that answers cleanly takes precedence, so one
    /// unsupported subcommand's diagnostic cannot mask a real answer.
    async fn query_status(&self, exe: &str) -> GatewayStatus {
        let queries = [
            format!("{exe} status"),
            format!("{exe} gateway status --json"),
            format!("{exe} gateway status"),
        ];

        let mut diagnostic: Option<GatewayStatus> = None;

        for script in &queries {
            match self.runner.run_script(script, &cli_options()).await {
                Ok(result) => {
                    if result.stdout.trim().is_empty() {
                        continue;
                    }
                    let Some(status) = parse_status(&result.stdout) else {
                        continue;
                    };
                    if result.success() {
                        return status;
                    }
                    if diagnostic.is_none() {
                        diagnostic = Some(status);
                    }
                }
                Err(e) => log::debug!("Status query failed ({script}): {e}"),
            }
        }

        diagnostic.unwrap_or_else(|| GatewayStatus::stopped(None))
    }

    /// Start the gateway. Idempotent: if it is already running, the current
    /// status is returned and nothing is spawned.
    pub async fn start(&self) -> GatewayStatus {
        let _guard = self.lifecycle.lock().await;

        let Some(exe) = self.locate_executable().await else {
            return GatewayStatus::stopped(Some(EXECUTABLE_NOT_FOUND.to_string()));
        };

        let current = self.query_status(&exe).await;
        if current.running {
            return current;
        }

        // The CLI's own start subcommand, wrapped so a non-zero exit does
        // not abort the script. Keep any embedded error for the caller.
        let start_script = format!("{exe} gateway start --json 2>&1 || true");
        let start_error = match self.runner.run_script(&start_script, &cli_options()).await {
            Ok(result) => extract_json_object(&result.stdout).and_then(|v| {
                v.get("error")
                    .and_then(Value::as_str)
                    .map(str::to_string)
            }),
            Err(e) => {
                log::warn!("Gateway start invocation failed: {e}");
                None
            }
        };

        let after_start = self.query_status(&exe).await;
        if after_start.running {
            return after_start;
        }

        // Fallback: detached long-running process, output to the fixed log,
        // pid recorded for a later stop. Re-verified below, never trusted.
        let run_script = format!(
            "nohup {exe} gateway run >{GATEWAY_LOG_PATH} 2>&1 & echo $! > {GATEWAY_PID_PATH}"
        );
        if let Err(e) = self.runner.run_script(&run_script, &cli_options()).await {
            log::warn!("Detached gateway launch failed: {e}");
        }
        tokio::time::sleep(START_GRACE_PERIOD).await;

        let final_status = self.query_status(&exe).await;
        if final_status.running {
            return final_status;
        }

        let error = start_error
            .or(final_status.error)
            .unwrap_or_else(|| "Gateway did not come up after start".to_string());
        GatewayStatus::stopped(Some(error))
    }

    /// Stop the gateway, best effort. Every step tolerates failure; if the
    /// tool still reports running afterwards, that is returned with an
    /// explanatory error rather than claiming success.
    pub async fn stop(&self) -> GatewayStatus {
        let _guard = self.lifecycle.lock().await;

        let exe = self.locate_executable().await;

        if let Some(exe) = &exe {
            let stop_script = format!("{exe} gateway stop >/dev/null 2>&1 || true");
            if let Err(e) = self.runner.run_script(&stop_script, &cli_options()).await {
                log::warn!("Gateway stop invocation failed: {e}");
            }
        }

        let pid_script = format!(
            "if [ -f {GATEWAY_PID_PATH} ]; then kill \"$(cat {GATEWAY_PID_PATH})\" 2>/dev/null; rm -f {GATEWAY_PID_PATH}; fi"
        );
        if let Err(e) = self.runner.run_script(&pid_script, &cli_options()).await {
            log::warn!("Pid-file kill failed: {e}");
        }

        for pattern in PROCESS_PATTERNS {
            let kill_script = format!("pkill -f {} 2>/dev/null || true", sh_quote(pattern));
            if let Err(e) = self.runner.run_script(&kill_script, &cli_options()).await {
                log::warn!("Pattern kill failed for {pattern}: {e}");
            }
        }

        let Some(exe) = exe else {
            return GatewayStatus::stopped(Some(EXECUTABLE_NOT_FOUND.to_string()));
        };

        let mut status = self.query_status(&exe).await;
        if status.running {
            status.error = Some("Gateway still reports running after stop".to_string());
        }
        status
    }
}

fn cli_options() -> ExecOptions {
    ExecOptions::with_timeout(CLI_TIMEOUT)
}
