//! Command Execution
//!
//! Drivers that manage storage through CLI tools build [`Command`]s and hand
//! them to a [`CommandExecutor`]. [`ProcessExecutor`] runs them with
//! `tokio::process`; [`ScriptedExecutor`] records them and replies from a
//! script, for tests and dry runs.

use crate::error::{Error, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::debug;

// =============================================================================
// Command
// =============================================================================

/// A program invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub program: String,
    pub args: Vec<String>,
    /// Run through the configured root helper
    pub run_as_root: bool,
}

impl Command {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            run_as_root: false,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn as_root(mut self) -> Self {
        self.run_as_root = true;
        self
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Captured output of a successful command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn stdout(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }
}

/// Quote an argument for a POSIX shell if it needs it
pub fn shell_quote(arg: &str) -> String {
    let safe = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "_-./:=,@%+".contains(c));
    if safe {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', "'\\''"))
    }
}

// =============================================================================
// Executor Port
// =============================================================================

/// Runs commands on behalf of a driver
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Run to completion; a non-zero exit is `ProcessExecution`, a missing
    /// program is `Io` with kind `NotFound`
    async fn execute(&self, command: &Command) -> Result<CommandOutput>;
}

pub type CommandExecutorRef = Arc<dyn CommandExecutor>;

// =============================================================================
// Process Executor
// =============================================================================

/// Executor backed by `tokio::process`
pub struct ProcessExecutor {
    root_helper: Option<String>,
}

impl ProcessExecutor {
    /// `root_helper` (e.g. `sudo`) prefixes commands that run as root
    pub fn new(root_helper: Option<String>) -> Self {
        Self { root_helper }
    }
}

#[async_trait]
impl CommandExecutor for ProcessExecutor {
    async fn execute(&self, command: &Command) -> Result<CommandOutput> {
        let mut process = match (&self.root_helper, command.run_as_root) {
            (Some(helper), true) => {
                let mut p = tokio::process::Command::new(helper);
                p.arg(&command.program);
                p
            }
            _ => tokio::process::Command::new(&command.program),
        };
        process.args(&command.args).kill_on_drop(true);

        debug!(command = %command, "Executing");
        let output = process.output().await?;
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if output.status.success() {
            Ok(CommandOutput { stdout, stderr })
        } else {
            Err(Error::ProcessExecution {
                command: command.to_string(),
                exit_code: output.status.code(),
                stderr,
            })
        }
    }
}

// =============================================================================
// Scripted Executor
// =============================================================================

type Reply = Box<dyn Fn(&Command) -> Result<CommandOutput> + Send + Sync>;

/// Records every command and answers from registered replies.
///
/// A reply matches when the rendered command starts with its prefix; the
/// first match wins. Unmatched commands succeed with empty output.
#[derive(Default)]
pub struct ScriptedExecutor {
    log: Mutex<Vec<String>>,
    replies: Mutex<Vec<(String, Reply)>>,
}

impl ScriptedExecutor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register a reply for commands starting with `prefix`
    pub fn reply<F>(&self, prefix: impl Into<String>, reply: F)
    where
        F: Fn(&Command) -> Result<CommandOutput> + Send + Sync + 'static,
    {
        self.replies.lock().push((prefix.into(), Box::new(reply)));
    }

    /// Reply with fixed stdout
    pub fn reply_stdout(&self, prefix: impl Into<String>, stdout: impl Into<String>) {
        let stdout = stdout.into();
        self.reply(prefix, move |_| Ok(CommandOutput::stdout(stdout.clone())));
    }

    /// Fail with a non-zero exit and the given stderr
    pub fn reply_failure(&self, prefix: impl Into<String>, stderr: impl Into<String>) {
        let stderr = stderr.into();
        self.reply(prefix, move |cmd| {
            Err(Error::ProcessExecution {
                command: cmd.to_string(),
                exit_code: Some(1),
                stderr: stderr.clone(),
            })
        });
    }

    /// Rendered commands in execution order
    pub fn log(&self) -> Vec<String> {
        self.log.lock().clone()
    }

    pub fn clear(&self) {
        self.log.lock().clear();
        self.replies.lock().clear();
    }
}

#[async_trait]
impl CommandExecutor for ScriptedExecutor {
    async fn execute(&self, command: &Command) -> Result<CommandOutput> {
        let rendered = command.to_string();
        self.log.lock().push(rendered.clone());

        let replies = self.replies.lock();
        match replies.iter().find(|(prefix, _)| rendered.starts_with(prefix.as_str())) {
            Some((_, reply)) => reply(command),
            None => Ok(CommandOutput::default()),
        }
    }
}
