//! Environment prerequisite checks and the one-time bootstrap invocation.

use std::time::Duration;

use serde::Serialize;

use crate::exec::ExecOptions;
use crate::gateway::GatewayController;
use crate::wsl::{ScriptRunner as _, WslBridge};

/// Minimum Node.js version the gateway CLI supports.
const MIN_NODE_VERSION: (u64, u64, u64) = (18, 0, 0);

/// The provisioning script installed into the distribution; its content is
/// owned by the installer, not this crate.
const BOOTSTRAP_SCRIPT: &str = "/opt/omnigate/bootstrap.sh";

/// Provisioning can download and compile, so give it plenty of room.
const BOOTSTRAP_TIMEOUT: Duration = Duration::from_secs(600);

const PREREQ_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug, Clone, Serialize)]
pub struct PrereqCheck {
    pub name: String,
    pub ok: bool,
    pub detail: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PrereqReport {
    pub ok: bool,
    pub checks: Vec<PrereqCheck>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BootstrapOutcome {
    pub ok: bool,
    pub message: String,
}

/// Check that the WSL distribution answers, Node.js is new enough, and the
/// gateway CLI can be located. Each check reports independently; the report
/// is `ok` only when all of them are.
pub async fn check_prereqs(bridge: &WslBridge, gateway: &GatewayController) -> PrereqReport {
    let mut checks = Vec::with_capacity(3);

    let wsl_check = match bridge
        .run_script("true", &ExecOptions::with_timeout(PREREQ_TIMEOUT))
        .await
    {
        Ok(result) if result.success() => PrereqCheck {
            name: "wsl".to_string(),
            ok: true,
            detail: format!("Distribution '{}' is reachable", bridge.distro()),
        },
        Ok(result) => PrereqCheck {
            name: "wsl".to_string(),
            ok: false,
            detail: format!(
                "Distribution '{}' answered with exit code {}",
                bridge.distro(),
                result.exit_code
            ),
        },
        Err(e) => PrereqCheck {
            name: "wsl".to_string(),
            ok: false,
            detail: format!("WSL is not available: {e}"),
        },
    };
    let wsl_ok = wsl_check.ok;
    checks.push(wsl_check);

    if wsl_ok {
        checks.push(check_node(bridge).await);
        checks.push(match gateway.locate_executable().await {
            Some(path) => PrereqCheck {
                name: "gateway".to_string(),
                ok: true,
                detail: format!("Gateway CLI found at {path}"),
            },
            None => PrereqCheck {
                name: "gateway".to_string(),
                ok: false,
                detail: "Gateway CLI not found; run the bootstrap".to_string(),
            },
        });
    }

    PrereqReport {
        ok: checks.iter().all(|c| c.ok),
        checks,
    }
}

async fn check_node(bridge: &WslBridge) -> PrereqCheck {
    let name = "node".to_string();
    let result = match bridge
        .run_script("node --version", &ExecOptions::with_timeout(PREREQ_TIMEOUT))
        .await
    {
        Ok(result) if result.success() => result,
        Ok(_) | Err(_) => {
            return PrereqCheck {
                name,
                ok: false,
                detail: "Node.js is not installed".to_string(),
            }
        }
    };

    let reported = result.stdout.trim();
    match semver::Version::parse(reported.trim_start_matches('v')) {
        Ok(version) => {
            let minimum =
                semver::Version::new(MIN_NODE_VERSION.0, MIN_NODE_VERSION.1, MIN_NODE_VERSION.2);
            if version >= minimum {
                PrereqCheck {
                    name,
                    ok: true,
                    detail: format!("Node.js {version}"),
                }
            } else {
                PrereqCheck {
                    name,
                    ok: false,
                    detail: format!("Node.js {version} is older than the required {minimum}"),
                }
            }
        }
        Err(_) => PrereqCheck {
            name,
            ok: false,
            detail: format!("Unrecognized node version output: {reported}"),
        },
    }
}

/// Run the provisioning script inside the distribution. The script installs
/// the gateway CLI and its runtime; this crate only reports how it went.
pub async fn run_bootstrap(bridge: &WslBridge) -> BootstrapOutcome {
    let script = format!("[ -f {BOOTSTRAP_SCRIPT} ] && bash {BOOTSTRAP_SCRIPT}");
    match bridge
        .run_script(&script, &ExecOptions::with_timeout(BOOTSTRAP_TIMEOUT))
        .await
    {
        Ok(result) if result.success() => BootstrapOutcome {
            ok: true,
            message: "Bootstrap completed".to_string(),
        },
        Ok(result) => {
            let detail = last_output_line(&result.stderr)
                .or_else(|| last_output_line(&result.stdout))
                .unwrap_or_else(|| format!("exit code {}", result.exit_code));
            BootstrapOutcome {
                ok: false,
                message: format!("Bootstrap failed: {detail}"),
            }
        }
        Err(e) => BootstrapOutcome {
            ok: false,
            message: format!("Bootstrap could not run: {e}"),
        },
    }
}

fn last_output_line(text: &str) -> Option<String> {
    text.lines()
        .rev()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::last_output_line;

    #[test]
    fn last_output_line_skips_trailing_blanks() {
        assert_eq!(
            last_output_line("step 1\nerror: no network\n\n \n").as_deref(),
            Some("error: no network")
        );
        assert_eq!(last_output_line("\n \n"), None);
    }
}
