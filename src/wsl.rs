//! Running commands inside the WSL distribution that hosts the gateway.

use async_trait::async_trait;

use crate::error::Result;
use crate::exec::{run_command, CommandResult, ExecOptions};

const WSL_EXE: &str = "wsl.exe";

/// Anything that can run a shell script inside the gateway's environment.
///
/// The gateway controller and log access go through this seam so their
/// sequencing can be tested without WSL present.
#[async_trait]
pub trait ScriptRunner: Send + Sync {
    async fn run_script(&self, script: &str, options: &ExecOptions) -> Result<CommandResult>;
}

/// Executes commands inside a named WSL distribution.
///
/// The bridge assumes WSL and the distribution exist; if they do not, the
/// underlying executor's `Launch` error surfaces unchanged. Detecting their
/// absence is the prerequisite check's job.
pub struct WslBridge {
    distro: String,
}

impl WslBridge {
    pub fn new(distro: impl Into<String>) -> Self {
        Self {
            distro: distro.into(),
        }
    }

    pub fn distro(&self) -> &str {
        &self.distro
    }

    /// Run an argv directly inside the distribution.
    pub async fn run_args(&self, args: &[&str], options: &ExecOptions) -> Result<CommandResult> {
        let mut full: Vec<&str> = vec!["-d", &self.distro, "--"];
        full.extend_from_slice(args);
        run_command(WSL_EXE, &full, options).await
    }
}

#[async_trait]
impl ScriptRunner for WslBridge {
    /// Run a script through a login, non-interactive shell so the user's
    /// PATH additions (nvm, npm globals) are visible.
    async fn run_script(&self, script: &str, options: &ExecOptions) -> Result<CommandResult> {
        self.run_args(&["bash", "-lc", script], options).await
    }
}

/// Quote a value as a single POSIX shell word.
///
/// Embedded single quotes close the quoted span, insert an escaped quote,
/// and reopen it (`'` becomes `'\''`). This is the only defense against
/// injection when untrusted values are interpolated into generated scripts,
/// so it is kept pure and tested on its own.
pub fn sh_quote(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('\'');
    for c in value.chars() {
        if c == '\'' {
            quoted.push_str("'\\''");
        } else {
            quoted.push(c);
        }
    }
    quoted.push('\'');
    quoted
}
