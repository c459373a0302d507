//! Purpose: Single error value shared by the bridge, session and CLI layers.
//! Exports: `Error`, `ErrorKind`, `to_exit_code`.
//! Role: Every fallible operation in the crate returns this type.
//! Invariants: Exit codes per kind are stable once published.
//! Invariants: Retryable conditions never surface as an `Error` until their budget is spent.
use std::error::Error as StdError;
use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    Internal,
    Usage,
    NotFound,
    Io,
    /// The bridge process could not be spawned or died.
    BridgeInvocation,
    /// A remote command ran and reported a non-zero status.
    BridgeCommand,
    /// Bridge output outside every expected classification.
    ProtocolViolation,
    LaunchTimeout,
    OutputTimeout,
    AmbiguousOutput,
    Integrity,
    MalformedInput,
}

#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    message: Option<String>,
    hint: Option<String>,
    path: Option<PathBuf>,
    command: Option<String>,
    attempts: Option<u32>,
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl Error {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: None,
            hint: None,
            path: None,
            command: None,
            attempts: None,
            source: None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn hint(&self) -> Option<&str> {
        self.hint.as_deref()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn command(&self) -> Option<&str> {
        self.command.as_deref()
    }

    pub fn attempts(&self) -> Option<u32> {
        self.attempts
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = Some(attempts);
        self
    }

    pub fn with_source(mut self, source: impl StdError + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.kind)?;
        if let Some(message) = &self.message {
            write!(f, ": {message}")?;
        }
        if let Some(path) = &self.path {
            write!(f, " (path: {})", path.display())?;
        }
        if let Some(command) = &self.command {
            write!(f, " (command: {command})")?;
        }
        if let Some(attempts) = self.attempts {
            write!(f, " (attempts: {attempts})")?;
        }
        Ok(())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|source| source.as_ref() as &(dyn StdError + 'static))
    }
}

pub fn to_exit_code(kind: ErrorKind) -> i32 {
    match kind {
        ErrorKind::Internal => 1,
        ErrorKind::Usage => 2,
        ErrorKind::NotFound => 3,
        ErrorKind::Io => 4,
        ErrorKind::BridgeInvocation => 10,
        ErrorKind::BridgeCommand => 11,
        ErrorKind::ProtocolViolation => 12,
        ErrorKind::LaunchTimeout => 13,
        ErrorKind::OutputTimeout => 14,
        ErrorKind::AmbiguousOutput => 15,
        ErrorKind::Integrity => 16,
        ErrorKind::MalformedInput => 17,
    }
}
