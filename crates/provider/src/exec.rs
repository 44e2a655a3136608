//! External command execution.
//!
//! Providers never spawn processes directly; they go through an
//! [`Executor`], which lets the framework run against the real system
//! ([`SystemExecutor`]) or, in tests, a scripted stand-in (`ScriptedExecutor`,
//! behind the `test-utils` feature). Execution is blocking: the caller waits
//! for exit status and captured output.

use std::path::PathBuf;
use std::process::{Command, Output};

/// A fully resolved command invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Absolute path of the program
    pub program: PathBuf,
    /// Arguments, not including the program
    pub args: Vec<String>,
    /// Extra environment variables
    pub env: Vec<(String, String)>,
}

impl Invocation {
    /// Create an invocation without extra environment.
    pub fn new(program: impl Into<PathBuf>, args: &[&str]) -> Self {
        Self {
            program: program.into(),
            args: args.iter().map(|a| (*a).to_string()).collect(),
            env: Vec::new(),
        }
    }

    /// Render the command line for logs and error messages.
    pub fn display(&self) -> String {
        let mut parts = vec![self.program.display().to_string()];
        parts.extend(self.args.iter().cloned());
        parts.join(" ")
    }
}

/// Captured output of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    /// Exit code; `None` when killed by a signal
    pub status: Option<i32>,
}

impl From<Output> for CommandOutput {
    fn from(output: Output) -> Self {
        Self {
            stdout: output.stdout,
            stderr: output.stderr,
            status: output.status.code(),
        }
    }
}

impl CommandOutput {
    /// Successful output with the given stdout.
    pub fn ok(stdout: &str) -> Self {
        Self {
            stdout: stdout.as_bytes().to_vec(),
            stderr: Vec::new(),
            status: Some(0),
        }
    }

    /// Output with the given exit code and stderr.
    pub fn exit(code: i32, stderr: &str) -> Self {
        Self {
            stdout: Vec::new(),
            stderr: stderr.as_bytes().to_vec(),
            status: Some(code),
        }
    }

    /// Whether the command exited with status zero
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }

    /// Get stdout as a string
    pub fn stdout_str(&self) -> String {
        String::from_utf8_lossy(&self.stdout).to_string()
    }

    /// Get stderr as a string
    pub fn stderr_str(&self) -> String {
        String::from_utf8_lossy(&self.stderr).to_string()
    }
}

/// Runs external commands.
pub trait Executor: Send + Sync {
    /// Run a command to completion and capture its output.
    ///
    /// Returns `Err` only when the process could not be started; a non-zero
    /// exit is reported through [`CommandOutput::status`].
    fn execute(&self, invocation: &Invocation) -> std::io::Result<CommandOutput>;
}

/// Executor that spawns real processes.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemExecutor;

impl Executor for SystemExecutor {
    fn execute(&self, invocation: &Invocation) -> std::io::Result<CommandOutput> {
        let output = Command::new(&invocation.program)
            .args(&invocation.args)
            .envs(invocation.env.iter().map(|(k, v)| (k, v)))
            .output()?;
        Ok(output.into())
    }
}
