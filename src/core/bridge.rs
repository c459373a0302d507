//! Purpose: Run commands against the device over the adb bridge with bounded retries.
//! Exports: `CommandResult`, `BridgeBackend`, `AdbBackend`, `BridgeClient`, `ExitPolicy`.
//! Role: Lowest layer of the session; every remote effect goes through `BridgeClient`.
//! Invariants: Invocation failures (spawn error, signal death) retry with fixed backoff.
//! Invariants: Non-zero remote status is never retried; it fails unless the caller is tolerant.
use std::ffi::{OsStr, OsString};
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

use bstr::ByteSlice;
use tracing::{debug, warn};

use crate::core::error::{Error, ErrorKind};
use crate::core::retry::{RetryPolicy, Step};
use crate::core::shell::ShellCommand;

/// Exit status plus captured output of one bridge invocation.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CommandResult {
    pub status: i32,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl CommandResult {
    pub fn success(stdout: impl Into<Vec<u8>>) -> Self {
        Self {
            status: 0,
            stdout: stdout.into(),
            stderr: Vec::new(),
        }
    }

    pub fn stdout_lines(&self) -> impl Iterator<Item = String> + '_ {
        self.stdout
            .lines()
            .map(|line| line.trim().to_str_lossy().into_owned())
            .filter(|line| !line.is_empty())
    }
}

/// How a non-zero remote exit status is treated.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ExitPolicy {
    Strict,
    /// Return the result as-is; the caller classifies it.
    Tolerant,
}

pub trait BridgeBackend {
    /// Run one bridge command. `Err` means the bridge itself could not run.
    fn invoke(&self, args: &[OsString]) -> io::Result<CommandResult>;
}

impl<B: BridgeBackend + ?Sized> BridgeBackend for &B {
    fn invoke(&self, args: &[OsString]) -> io::Result<CommandResult> {
        (**self).invoke(args)
    }
}

/// Spawns the host `adb` executable.
#[derive(Clone, Debug)]
pub struct AdbBackend {
    program: PathBuf,
    serial: Option<String>,
}

impl AdbBackend {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            serial: None,
        }
    }

    pub fn with_serial(mut self, serial: Option<String>) -> Self {
        self.serial = serial;
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }
}

impl BridgeBackend for AdbBackend {
    fn invoke(&self, args: &[OsString]) -> io::Result<CommandResult> {
        let mut command = Command::new(&self.program);
        if let Some(serial) = &self.serial {
            command.arg("-s").arg(serial);
        }
        let output = command.args(args).output()?;
        let status = output.status.code().ok_or_else(|| {
            io::Error::other(format!("adb terminated abnormally ({})", output.status))
        })?;
        Ok(CommandResult {
            status,
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }
}

pub struct BridgeClient<B> {
    backend: B,
    retry: RetryPolicy,
}

impl<B: BridgeBackend> BridgeClient<B> {
    pub fn new(backend: B, retry: RetryPolicy) -> Self {
        Self { backend, retry }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn execute(&self, args: &[OsString], policy: ExitPolicy) -> Result<CommandResult, Error> {
        let rendered = describe(args);
        let mut last_failure: Option<io::Error> = None;
        let outcome = self.retry.run(
            |attempt| {
                debug!(command = %rendered, attempt, "bridge invoke");
                match self.backend.invoke(args) {
                    Ok(result) => Ok(Step::Done(result)),
                    Err(err) => {
                        warn!(command = %rendered, attempt, error = %err, "bridge invocation failed");
                        last_failure = Some(err);
                        Ok(Step::Retry)
                    }
                }
            },
            |attempts| {
                Error::new(ErrorKind::BridgeInvocation)
                    .with_message("could not run the device bridge")
                    .with_hint("Check that adb is installed and the device is connected.")
                    .with_command(rendered.clone())
                    .with_attempts(attempts)
            },
        );
        let result = match (outcome, last_failure) {
            (Ok(result), _) => result,
            (Err(err), Some(source)) => return Err(err.with_source(source)),
            (Err(err), None) => return Err(err),
        };

        if policy == ExitPolicy::Strict && result.status != 0 {
            return Err(Error::new(ErrorKind::BridgeCommand)
                .with_message(format!(
                    "remote command exited with status {}: {}",
                    result.status,
                    result.stderr.trim().to_str_lossy()
                ))
                .with_command(rendered));
        }
        Ok(result)
    }

    pub fn shell(&self, command: &ShellCommand) -> Result<CommandResult, Error> {
        self.execute(&shell_args(command)?, ExitPolicy::Strict)
    }

    pub fn shell_tolerant(&self, command: &ShellCommand) -> Result<CommandResult, Error> {
        self.execute(&shell_args(command)?, ExitPolicy::Tolerant)
    }

    pub fn push(&self, local: &Path, remote: &str) -> Result<(), Error> {
        let args = [
            OsString::from("push"),
            local.as_os_str().to_owned(),
            OsString::from(remote),
        ];
        self.execute(&args, ExitPolicy::Strict)
            .map(|_| ())
            .map_err(|err| err.with_path(local))
    }

    pub fn pull(&self, remote: &str, local: &Path) -> Result<(), Error> {
        let args = [
            OsString::from("pull"),
            OsString::from(remote),
            local.as_os_str().to_owned(),
        ];
        self.execute(&args, ExitPolicy::Strict)
            .map(|_| ())
            .map_err(|err| err.with_path(local))
    }
}

fn shell_args(command: &ShellCommand) -> Result<[OsString; 2], Error> {
    Ok([OsString::from("shell"), OsString::from(command.render()?)])
}

fn describe(args: &[OsString]) -> String {
    args.iter()
        .map(|arg| OsStr::to_string_lossy(arg).into_owned())
        .collect::<Vec<_>>()
        .join(" ")
}
