//! Access to the gateway's log file inside the distribution.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{AppError, Result};
use crate::exec::ExecOptions;
use crate::wsl::ScriptRunner;

use super::GATEWAY_LOG_PATH;

const LOG_READ_TIMEOUT: Duration = Duration::from_secs(20);

/// Read the last `lines` lines of the gateway log. A missing log file
/// yields an empty string, not an error.
pub async fn tail_logs(runner: &dyn ScriptRunner, lines: u32) -> Result<String> {
    let script = format!("tail -n {lines} {GATEWAY_LOG_PATH} 2>/dev/null || true");
    let result = runner
        .run_script(&script, &ExecOptions::with_timeout(LOG_READ_TIMEOUT))
        .await?;
    Ok(result.stdout)
}

/// Copy the full gateway log to a timestamped file on the host side.
///
/// The destination defaults to the downloads directory, falling back to the
/// home directory. Returns the path of the written file.
pub async fn export_logs(runner: &dyn ScriptRunner, dest_dir: Option<PathBuf>) -> Result<PathBuf> {
    let script = format!("cat {GATEWAY_LOG_PATH} 2>/dev/null || true");
    let result = runner
        .run_script(&script, &ExecOptions::with_timeout(LOG_READ_TIMEOUT))
        .await?;

    let dir = dest_dir
        .or_else(dirs::download_dir)
        .or_else(dirs::home_dir)
        .ok_or_else(|| AppError::io("No destination directory for log export"))?;

    let file_name = format!(
        "omnigate-gateway-{}.log",
        chrono::Local::now().format("%Y%m%d-%H%M%S")
    );
    let dest = dir.join(file_name);
    std::fs::write(&dest, &result.stdout)
        .map_err(|e| AppError::io(format!("Failed to write {}: {}", dest.display(), e)))?;

    Ok(dest)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::{export_logs, tail_logs};
    use crate::error::Result;
    use crate::exec::{CommandResult, ExecOptions};
    use crate::wsl::ScriptRunner;

    struct FakeLogSource {
        content: String,
        scripts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ScriptRunner for FakeLogSource {
        async fn run_script(&self, script: &str, _options: &ExecOptions) -> Result<CommandResult> {
            self.scripts.lock().unwrap().push(script.to_string());
            Ok(CommandResult {
                stdout: self.content.clone(),
                stderr: String::new(),
                exit_code: 0,
                duration_ms: 1,
            })
        }
    }

    #[tokio::test]
    async fn tail_requests_the_given_line_count() {
        let source = FakeLogSource {
            content: "line1\nline2\n".to_string(),
            scripts: Mutex::new(Vec::new()),
        };
        let out = tail_logs(&source, 200).await.unwrap();
        assert_eq!(out, "line1\nline2\n");
        let scripts = source.scripts.lock().unwrap();
        assert!(scripts[0].starts_with("tail -n 200 "));
    }

    #[tokio::test]
    async fn export_writes_a_timestamped_file() {
        let source = FakeLogSource {
            content: "gateway booted\n".to_string(),
            scripts: Mutex::new(Vec::new()),
        };
        let dir = tempfile::tempdir().unwrap();
        let path = export_logs(&source, Some(dir.path().to_path_buf()))
            .await
            .unwrap();
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("omnigate-gateway-"));
        assert!(name.ends_with(".log"));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "gateway booted\n");
    }
}
