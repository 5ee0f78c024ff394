//! Subprocess plumbing shared by the command-line tool adapters.

use std::ffi::OsStr;
use std::path::Path;
use std::process::{Output, Stdio};
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

/// Run `binary args..` to completion, bounded by `limit`.
///
/// The exit status is not checked here; see [`ensure_success`]. A child
/// that outlives its timeout is killed.
pub async fn run_tool<I, S>(
    binary: &str,
    args: I,
    cwd: Option<&Path>,
    limit: Duration,
) -> Result<Output>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut command = Command::new(binary);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = cwd {
        command.current_dir(dir);
    }

    debug!(binary, ?cwd, "Spawning tool");

    let child = command
        .spawn()
        .with_context(|| format!("Failed to spawn '{}'", binary))?;

    timeout(limit, child.wait_with_output())
        .await
        .with_context(|| format!("'{}' timed out after {:?}", binary, limit))?
        .with_context(|| format!("Failed to wait for '{}'", binary))
}

/// Fail with the tool's stderr when it exited non-zero
pub fn ensure_success(binary: &str, output: &Output) -> Result<()> {
    if output.status.success() {
        return Ok(());
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    let exit_code = output.status.code().unwrap_or(-1);
    anyhow::bail!(
        "'{}' failed with exit code {}: {}",
        binary,
        exit_code,
        stderr.trim()
    );
}

/// Check that a tool can be started (`<binary> <arg>` exits zero)
pub async fn probe(binary: &str, arg: &str) -> Result<()> {
    let output = run_tool(binary, [arg], None, Duration::from_secs(30)).await?;
    ensure_success(binary, &output)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_successful_tool() {
        let output = run_tool("sh", ["-c", "echo hello"], None, Duration::from_secs(5))
            .await
            .unwrap();
        ensure_success("sh", &output).unwrap();
        assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "hello");
    }

    #[tokio::test]
    async fn test_failing_tool_reports_stderr() {
        let output = run_tool(
            "sh",
            ["-c", "echo broken >&2; exit 3"],
            None,
            Duration::from_secs(5),
        )
        .await
        .unwrap();

        let err = ensure_success("sh", &output).unwrap_err().to_string();
        assert!(err.contains("exit code 3"));
        assert!(err.contains("broken"));
    }

    #[tokio::test]
    async fn test_timeout() {
        let result = run_tool("sh", ["-c", "sleep 5"], None, Duration::from_millis(50)).await;
        assert!(result.unwrap_err().to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn test_missing_binary() {
        let result = run_tool(
            "definitely-not-a-real-binary-xyz",
            Vec::<String>::new(),
            None,
            Duration::from_secs(1),
        )
        .await;
        assert!(result.is_err());
    }
}
