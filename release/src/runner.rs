//! Running external commands.
//!
//! Every step of the release workflow is ultimately an invocation of some external tool (`docker`,
//! `python`, `devpi`). The workflow describes each one as an [`Invocation`] and hands it to a
//! [`Runner`], which makes it possible to check exactly which commands a workflow runs without
//! running any of them; see [`mock`].

use anyhow::Error;
use async_std::task::spawn_blocking;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};

pub mod mock;

/// Placeholder shown instead of secret arguments.
const REDACTED: &str = "********";

/// Arguments whose value must never be logged.
const SECRET_FLAGS: [&str; 1] = ["--password"];

/// A single invocation of an external program.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    /// Data to write to the standard input of the program.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdin: Option<String>,
}

impl Invocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: vec![],
            stdin: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I>(mut self, args: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    /// A copy of this invocation with the values of secret arguments masked.
    pub fn redacted(&self) -> Self {
        let mut args = self.args.clone();
        for i in 1..args.len() {
            if SECRET_FLAGS.contains(&self.args[i - 1].as_str()) {
                args[i] = REDACTED.into();
            }
        }
        Self {
            program: self.program.clone(),
            args,
            stdin: self.stdin.clone(),
        }
    }

    fn command(&self, root: &Path) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args).current_dir(root);
        if self.stdin.is_some() {
            cmd.stdin(Stdio::piped());
        }
        cmd
    }

    fn spawn(&self, mut cmd: Command) -> io::Result<Child> {
        let mut child = cmd.spawn()?;
        if let Some(input) = &self.stdin {
            // Dropping the pipe closes it, so the program sees the end of its input.
            if let Some(mut pipe) = child.stdin.take() {
                match pipe.write_all(input.as_bytes()) {
                    // The program exited without reading all of its input. Waiting on it reports
                    // the exit status.
                    Err(err) if err.kind() == io::ErrorKind::BrokenPipe => {
                        tracing::debug!("`{}` closed its input early", self);
                    }
                    Err(err) => {
                        child.kill().ok();
                        child.wait().ok();
                        return Err(err);
                    }
                    Ok(()) => {}
                }
            }
        }
        Ok(child)
    }
}

impl Display for Invocation {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        let redacted = self.redacted();
        write!(f, "{}", redacted.program)?;
        for arg in &redacted.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// The captured result of an invocation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// A successful output, printing `stdout`.
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            success: true,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// A failed output, printing `stdout`.
    pub fn failure(stdout: impl Into<String>) -> Self {
        Self {
            success: false,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Whether either output stream contains `needle`.
    pub fn contains(&self, needle: &str) -> bool {
        self.stdout.contains(needle) || self.stderr.contains(needle)
    }
}

/// Something which can run external commands.
#[async_trait]
pub trait Runner: Send + Sync {
    /// Run a command, passing its output through, and fail if it does not exit successfully.
    async fn run(&self, invocation: &Invocation) -> Result<(), Error>;

    /// Run a command and capture its output.
    ///
    /// This only fails if the command cannot be run at all. Exiting unsuccessfully is reported
    /// through [`CommandOutput::success`].
    async fn output(&self, invocation: &Invocation) -> Result<CommandOutput, Error>;
}

/// Runs commands as child processes of this one.
#[derive(Clone, Debug)]
pub struct System {
    root: PathBuf,
}

impl System {
    /// Run commands from the directory `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl Runner for System {
    async fn run(&self, invocation: &Invocation) -> Result<(), Error> {
        tracing::info!("running {invocation}");
        let cmd = invocation.command(&self.root);
        let status = {
            let invocation = invocation.clone();
            spawn_blocking(move || invocation.spawn(cmd)?.wait()).await
        }
        .map_err(|err| Error::msg(format!("unable to run `{invocation}`: {err}")))?;

        if status.success() {
            Ok(())
        } else {
            Err(Error::msg(format!(
                "command `{invocation}` failed with {status}"
            )))
        }
    }

    async fn output(&self, invocation: &Invocation) -> Result<CommandOutput, Error> {
        tracing::info!("running {invocation}");
        let mut cmd = invocation.command(&self.root);
        cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
        let output = {
            let invocation = invocation.clone();
            spawn_blocking(move || invocation.spawn(cmd)?.wait_with_output()).await
        }
        .map_err(|err| Error::msg(format!("unable to run `{invocation}`: {err}")))?;

        let output = CommandOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        tracing::debug!(?output, "`{invocation}` finished");
        Ok(output)
    }
}
