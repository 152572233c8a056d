/// External command execution
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{Error, Result};

#[cfg(test)]
pub mod fake;

/// Result from command execution with captured output
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub success: bool,
}

impl CommandOutput {
    /// Create from process output
    fn from_output(output: std::process::Output) -> Self {
        Self {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            success: output.status.success(),
        }
    }

    /// Successful output with the given stdout
    #[cfg(test)]
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
            success: true,
        }
    }

    /// Failed output with the given stderr
    #[cfg(test)]
    pub fn failed(stderr: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            stderr: stderr.into(),
            success: false,
        }
    }

    /// Return stdout if successful, otherwise an error carrying stderr
    pub fn into_result(self, program: &str) -> Result<String> {
        if self.success {
            Ok(self.stdout)
        } else {
            Err(Error::Command {
                program: program.to_string(),
                message: self.stderr.trim().to_string(),
            })
        }
    }
}

/// Description of one external command invocation
#[derive(Debug, Clone)]
pub struct CommandBuilder {
    program: String,
    args: Vec<String>,
    stdin: Option<String>,
}

impl CommandBuilder {
    /// Create a new command builder
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            stdin: None,
        }
    }

    /// Add a single argument
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add multiple arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Pipe the given payload into the command's stdin
    pub fn stdin(mut self, payload: impl Into<String>) -> Self {
        self.stdin = Some(payload.into());
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn stdin_payload(&self) -> Option<&str> {
        self.stdin.as_deref()
    }

    /// Program followed by its arguments
    pub fn argv(&self) -> Vec<String> {
        std::iter::once(self.program.clone())
            .chain(self.args.iter().cloned())
            .collect()
    }

    fn to_command(&self, stdout: Stdio, stderr: Stdio) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .stdout(stdout)
            .stderr(stderr)
            .stdin(if self.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .kill_on_drop(true);
        command
    }
}

/// Capability to run external commands under a cancellation token
#[async_trait]
pub trait CmdRunner: Send + Sync {
    /// Resolve a program on PATH
    fn look_path(&self, program: &str) -> Option<PathBuf>;

    /// Run to completion and capture output. A non-zero exit is not an error here.
    async fn output(&self, ctx: &CancellationToken, cmd: CommandBuilder) -> Result<CommandOutput>;

    /// Run with stdout/stderr streamed through to the terminal
    async fn run_io(&self, ctx: &CancellationToken, cmd: CommandBuilder) -> Result<()>;

    /// Run and return stdout on success, error with stderr on failure
    async fn run(&self, ctx: &CancellationToken, cmd: CommandBuilder) -> Result<String> {
        let program = cmd.program().to_string();
        self.output(ctx, cmd).await?.into_result(&program)
    }
}

/// Runs commands as real child processes
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CmdRunner for ProcessRunner {
    fn look_path(&self, program: &str) -> Option<PathBuf> {
        let paths = std::env::var_os("PATH")?;
        std::env::split_paths(&paths)
            .map(|dir| dir.join(program))
            .find(|candidate| is_executable(candidate))
    }

    async fn output(&self, ctx: &CancellationToken, cmd: CommandBuilder) -> Result<CommandOutput> {
        debug!(argv = ?cmd.argv(), "running command");

        let mut child = cmd
            .to_command(Stdio::piped(), Stdio::piped())
            .spawn()
            .map_err(|e| spawn_error(&cmd, e))?;
        write_stdin(&mut child, &cmd).await?;

        // Dropping the wait future on cancellation kills the child.
        tokio::select! {
            output = child.wait_with_output() => Ok(CommandOutput::from_output(output?)),
            _ = ctx.cancelled() => Err(Error::Cancelled { program: cmd.program().to_string() }),
        }
    }

    async fn run_io(&self, ctx: &CancellationToken, cmd: CommandBuilder) -> Result<()> {
        debug!(argv = ?cmd.argv(), "running command interactively");

        let mut child = cmd
            .to_command(Stdio::inherit(), Stdio::inherit())
            .spawn()
            .map_err(|e| spawn_error(&cmd, e))?;
        write_stdin(&mut child, &cmd).await?;

        let status = tokio::select! {
            status = child.wait() => Some(status?),
            _ = ctx.cancelled() => None,
        };

        match status {
            Some(status) if status.success() => Ok(()),
            Some(status) => Err(Error::Command {
                program: cmd.program().to_string(),
                message: status.to_string(),
            }),
            None => {
                let _ = child.kill().await;
                Err(Error::Cancelled {
                    program: cmd.program().to_string(),
                })
            }
        }
    }
}

async fn write_stdin(child: &mut tokio::process::Child, cmd: &CommandBuilder) -> Result<()> {
    if let (Some(payload), Some(mut stdin)) = (cmd.stdin_payload(), child.stdin.take()) {
        stdin.write_all(payload.as_bytes()).await?;
    }
    Ok(())
}

fn spawn_error(cmd: &CommandBuilder, err: std::io::Error) -> Error {
    Error::Command {
        program: cmd.program().to_string(),
        message: format!("failed to start: {}", err),
    }
}

#[cfg(unix)]
fn is_executable(path: &std::path::Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &std::path::Path) -> bool {
    path.is_file()
}
