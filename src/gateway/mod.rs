//! Gateway lifecycle management.

mod control;
mod logs;
mod status;

use std::time::Duration;

use serde::Serialize;

pub use control::GatewayController;
pub use logs::{export_logs, tail_logs};
pub use status::parse_status;

/// Where the detached fallback redirects the gateway's output, inside the
/// distribution.
pub(crate) const GATEWAY_LOG_PATH: &str = "/tmp/omnigate-gateway.log";

/// Pid file written by the detached fallback launch.
pub(crate) const GATEWAY_PID_PATH: &str = "/tmp/omnigate-gateway.pid";

/// Wait after the detached fallback launch before re-querying status.
const START_GRACE_PERIOD: Duration = Duration::from_secs(3);

/// Time limit for each individual CLI invocation.
const CLI_TIMEOUT: Duration = Duration::from_secs(30);

/// The controller's current belief about the gateway.
///
/// Recomputed from the external tool on every call, never cached. `running`
/// is authoritative: `url` is only populated alongside `running = true`,
/// and `error` explains a non-running (or non-converged) state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GatewayStatus {
    pub running: bool,
    pub url: Option<String>,
    pub pid: Option<u32>,
    pub error: Option<String>,
}

impl GatewayStatus {
    pub(crate) fn stopped(error: Option<String>) -> Self {
        Self {
            running: false,
            url: None,
            pid: None,
            error,
        }
    }
}
