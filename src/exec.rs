//! Bounded execution of external commands.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt as _, AsyncWriteExt as _};
use tokio::process::{Child, Command};

use crate::error::{AppError, Result};

/// Time limit applied when the caller does not set one.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Grace period between the termination signal and the hard kill.
const TERM_GRACE: Duration = Duration::from_secs(2);

/// Captured output of one finished command.
#[derive(Debug, Clone, Serialize)]
pub struct CommandResult {
    pub stdout: String,
    pub stderr: String,
    /// Process exit code; -1 denotes an abnormal (signaled) termination.
    pub exit_code: i32,
    pub duration_ms: u64,
}

impl CommandResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Options for a single command run.
#[derive(Debug, Clone, Default)]
pub struct ExecOptions {
    pub timeout: Option<Duration>,
    pub stdin: Option<String>,
    pub cwd: Option<PathBuf>,
}

impl ExecOptions {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
            ..Self::default()
        }
    }
}

/// Run a command to completion, capturing its output.
///
/// The child is killed (termination signal first, hard kill after a short
/// grace period) if it has not exited within the time limit. Each call owns
/// its own child process and timer, so concurrent calls are independent.
pub async fn run_command(
    program: &str,
    args: &[&str],
    options: &ExecOptions,
) -> Result<CommandResult> {
    let limit = options.timeout.unwrap_or(DEFAULT_TIMEOUT);
    let started = Instant::now();

    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(if options.stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    if let Some(dir) = &options.cwd {
        cmd.current_dir(dir);
    }

    #[cfg(target_os = "windows")]
    {
        use windows::Win32::System::Threading::CREATE_NO_WINDOW;
        cmd.creation_flags(CREATE_NO_WINDOW.0);
    }

    #[cfg(unix)]
    {
        cmd.process_group(0);
    }

    let mut child = cmd
        .spawn()
        .map_err(|e| AppError::launch(format!("Failed to spawn {}: {}", program, e)))?;

    if let Some(input) = &options.stdin {
        if let Some(mut handle) = child.stdin.take() {
            // A child that exits without reading its input is not an error;
            // the handle is dropped either way, closing the stream.
            if let Err(e) = handle.write_all(input.as_bytes()).await {
                log::warn!("Failed to write stdin to {}: {}", program, e);
            }
        }
    }

    let stdout_task = drain_pipe(child.stdout.take());
    let stderr_task = drain_pipe(child.stderr.take());

    let status = match tokio::time::timeout(limit, child.wait()).await {
        Ok(waited) => {
            waited.map_err(|e| AppError::process(format!("Failed to wait for {}: {}", program, e)))?
        }
        Err(_) => {
            terminate(&mut child).await;
            return Err(AppError::timeout(program, limit));
        }
    };

    let stdout = stdout_task.await.unwrap_or_default();
    let stderr = stderr_task.await.unwrap_or_default();

    Ok(CommandResult {
        stdout: String::from_utf8_lossy(&stdout).into_owned(),
        stderr: String::from_utf8_lossy(&stderr).into_owned(),
        exit_code: status.code().unwrap_or(-1),
        duration_ms: started.elapsed().as_millis() as u64,
    })
}

fn drain_pipe<R>(pipe: Option<R>) -> tokio::task::JoinHandle<Vec<u8>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf).await;
        }
        buf
    })
}

/// Ask the child to exit, then force kill whatever remains.
#[cfg(unix)]
async fn terminate(child: &mut Child) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    if let Some(pid) = child.id() {
        if kill(Pid::from_raw(pid as i32), Signal::SIGTERM).is_ok()
            && tokio::time::timeout(TERM_GRACE, child.wait()).await.is_ok()
        {
            return;
        }
    }
    if let Err(e) = child.kill().await {
        log::warn!("Failed to kill timed-out child: {}", e);
    }
}

#[cfg(not(unix))]
async fn terminate(child: &mut Child) {
    if let Err(e) = child.kill().await {
        log::warn!("Failed to kill timed-out child: {}", e);
    }
}
