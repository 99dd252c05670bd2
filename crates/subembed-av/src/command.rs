//! Builder for executing external tool commands with deadline and
//! cancellation support.

use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use subembed_core::{Error, Result};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

/// Default command timeout: 5 minutes.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Default number of stderr lines kept in an error message.
const DEFAULT_DIAGNOSTIC_LINES: usize = 20;

/// Output captured from a tool execution.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub status: ExitStatus,
    /// Captured standard output (lossy UTF-8).
    pub stdout: String,
    /// Captured standard error (lossy UTF-8).
    pub stderr: String,
}

/// A builder for constructing and executing external tool invocations.
///
/// The child is spawned with `kill_on_drop`, so a deadline or a cancelled
/// token terminates the process instead of leaving it running.
///
/// # Example
///
/// ```no_run
/// use subembed_av::ToolCommand;
/// use std::path::PathBuf;
///
/// # async fn example() -> subembed_core::Result<()> {
/// let output = ToolCommand::new(PathBuf::from("ffprobe"))
///     .args(["-v", "error", "-print_format", "json", "-show_streams"])
///     .arg("/path/to/video.mkv")
///     .execute()
///     .await?;
/// println!("{}", output.stdout);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ToolCommand {
    program: PathBuf,
    args: Vec<String>,
    timeout: Duration,
    cancel: Option<CancellationToken>,
    diagnostic_lines: usize,
}

impl ToolCommand {
    pub fn new(program: PathBuf) -> Self {
        Self {
            program,
            args: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
            cancel: None,
            diagnostic_lines: DEFAULT_DIAGNOSTIC_LINES,
        }
    }

    pub fn arg(&mut self, s: impl Into<String>) -> &mut Self {
        self.args.push(s.into());
        self
    }

    pub fn args(&mut self, iter: impl IntoIterator<Item = impl Into<String>>) -> &mut Self {
        self.args.extend(iter.into_iter().map(Into::into));
        self
    }

    /// Set the maximum execution time.
    pub fn timeout(&mut self, d: Duration) -> &mut Self {
        self.timeout = d;
        self
    }

    /// Kill the process when `token` is cancelled.
    pub fn cancel_on(&mut self, token: CancellationToken) -> &mut Self {
        self.cancel = Some(token);
        self
    }

    /// How many trailing stderr lines a failure message carries.
    pub fn diagnostic_lines(&mut self, n: usize) -> &mut Self {
        self.diagnostic_lines = n;
        self
    }

    fn program_name(&self) -> String {
        self.program
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.program.to_string_lossy().to_string())
    }

    /// Execute the command, capturing stdout and stderr.
    ///
    /// # Errors
    ///
    /// - [`Error::Cancelled`] if the cancellation token fired; the process is killed.
    /// - [`Error::Tool`] if the process times out, exits with a non-zero
    ///   status (message carries the stderr tail), or cannot be spawned.
    pub async fn execute(&self) -> Result<ToolOutput> {
        let program_name = self.program_name();

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);

        tracing::debug!(tool = %program_name, args = ?self.args, "spawning");

        let child = cmd
            .spawn()
            .map_err(|e| Error::tool(&program_name, format!("failed to spawn: {e}")))?;

        let cancel = self.cancel.clone().unwrap_or_default();

        // Dropping the wait future drops the child, and kill_on_drop kills it.
        let output = tokio::select! {
            res = child.wait_with_output() => res.map_err(|e| {
                Error::tool(&program_name, format!("I/O error waiting for process: {e}"))
            })?,
            _ = tokio::time::sleep(self.timeout) => {
                tracing::warn!(tool = %program_name, timeout = ?self.timeout, "deadline reached; killing process");
                return Err(Error::tool(
                    &program_name,
                    format!("timed out after {:?}", self.timeout),
                ));
            }
            _ = cancel.cancelled() => {
                tracing::info!(tool = %program_name, "cancelled; killing process");
                return Err(Error::Cancelled);
            }
        };

        let tool_output = ToolOutput {
            status: output.status,
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        };

        if !output.status.success() {
            let tail = tail_lines(&tool_output.stderr, self.diagnostic_lines);
            return Err(Error::tool(
                program_name,
                format!("exited with status {}: {}", output.status, tail),
            ));
        }

        Ok(tool_output)
    }
}

/// The last `n` non-empty lines of `text`, joined with newlines.
pub fn tail_lines(text: &str, n: usize) -> String {
    let lines: Vec<&str> = text
        .lines()
        .map(str::trim_end)
        .filter(|l| !l.is_empty())
        .collect();
    let start = lines.len().saturating_sub(n);
    lines[start..].join("\n")
}
