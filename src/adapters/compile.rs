//! Syntax check via `python -m py_compile`.

use std::ffi::OsStr;
use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use super::process::{probe, run_tool};
use super::CompileChecker;

/// Compile checker backed by the Python interpreter
#[derive(Debug, Clone)]
pub struct PythonCompileChecker {
    /// Interpreter binary (default: "python3")
    binary_path: String,
    timeout: Duration,
}

impl PythonCompileChecker {
    pub fn new(binary_path: impl Into<String>, timeout: Duration) -> Self {
        Self {
            binary_path: binary_path.into(),
            timeout,
        }
    }

    pub async fn health_check(&self) -> Result<()> {
        probe(&self.binary_path, "--version").await
    }
}

#[async_trait]
impl CompileChecker for PythonCompileChecker {
    async fn check(&self, script: &Path) -> Result<()> {
        let output = run_tool(
            &self.binary_path,
            [OsStr::new("-m"), OsStr::new("py_compile"), script.as_os_str()],
            None,
            self.timeout,
        )
        .await?;

        if output.status.success() {
            return Ok(());
        }

        // The interpreter's error output is what the repair step needs
        let stderr = String::from_utf8_lossy(&output.stderr);
        let stdout = String::from_utf8_lossy(&output.stdout);
        let message = if stderr.trim().is_empty() { stdout } else { stderr };
        anyhow::bail!("{}", message.trim());
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    // `true` and `false` ignore their arguments, standing in for an
    // interpreter that accepts or rejects the script
    #[tokio::test]
    async fn test_zero_exit_passes() {
        let checker = PythonCompileChecker::new("true", Duration::from_secs(5));
        assert!(checker.check(Path::new("scene.py")).await.is_ok());
    }

    #[tokio::test]
    async fn test_non_zero_exit_fails() {
        let checker = PythonCompileChecker::new("false", Duration::from_secs(5));
        assert!(checker.check(Path::new("scene.py")).await.is_err());
    }

    #[tokio::test]
    async fn test_missing_interpreter_fails() {
        let checker = PythonCompileChecker::new("no-such-python-xyz", Duration::from_secs(5));
        assert!(checker.check(Path::new("scene.py")).await.is_err());
    }
}
