//! Core domain types

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::CommandError;

/// A host and port pair that can be dialed
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    /// Create a new endpoint
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Which commands of a batch should have their standard output captured
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputFlags {
    /// One flag applied to every command
    All(bool),
    /// One flag per command, in order
    PerCommand(Vec<bool>),
}

impl Default for OutputFlags {
    fn default() -> Self {
        OutputFlags::All(true)
    }
}

impl From<bool> for OutputFlags {
    fn from(flag: bool) -> Self {
        OutputFlags::All(flag)
    }
}

impl From<Vec<bool>> for OutputFlags {
    fn from(flags: Vec<bool>) -> Self {
        OutputFlags::PerCommand(flags)
    }
}

/// An ordered list of shell commands, each with its own capture flag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandBatch {
    commands: Vec<String>,
    capture: Vec<bool>,
}

impl CommandBatch {
    /// Build a batch, broadcasting a single flag to every command.
    ///
    /// Fails when the batch is empty or when a per-command flag list does
    /// not match the number of commands.
    pub fn new<I, S>(commands: I, flags: impl Into<OutputFlags>) -> Result<Self, CommandError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let commands: Vec<String> = commands.into_iter().map(Into::into).collect();
        if commands.is_empty() {
            return Err(CommandError::InvalidBatch(
                "at least one command is required".to_string(),
            ));
        }

        let capture = match flags.into() {
            OutputFlags::All(flag) => vec![flag; commands.len()],
            OutputFlags::PerCommand(flags) => {
                if flags.len() != commands.len() {
                    return Err(CommandError::InvalidBatch(format!(
                        "{} output flags given for {} commands",
                        flags.len(),
                        commands.len()
                    )));
                }
                flags
            }
        };

        Ok(Self { commands, capture })
    }

    /// A batch with a single command whose output is captured
    pub fn single(command: impl Into<String>) -> Self {
        Self {
            commands: vec![command.into()],
            capture: vec![true],
        }
    }

    /// Iterate over `(command, capture)` pairs in order
    pub fn iter(&self) -> impl Iterator<Item = (&str, bool)> {
        self.commands
            .iter()
            .map(String::as_str)
            .zip(self.capture.iter().copied())
    }

    /// The commands in order
    pub fn commands(&self) -> &[String] {
        &self.commands
    }

    /// Number of commands
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Always false for a constructed batch
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Number of commands whose output will be captured
    pub fn captured_count(&self) -> usize {
        self.capture.iter().filter(|c| **c).count()
    }
}

/// Result of running a command batch
///
/// `NoOutput` is returned when no command was flagged for capture, which is
/// distinct from a capture that produced empty strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatchOutput {
    /// Decoded stdout of every flagged command, in batch order
    Captured(Vec<String>),
    /// No command was flagged for capture
    NoOutput,
}

impl BatchOutput {
    /// Captured outputs, or `None` for the no-output sentinel
    pub fn outputs(&self) -> Option<&[String]> {
        match self {
            BatchOutput::Captured(outputs) => Some(outputs),
            BatchOutput::NoOutput => None,
        }
    }

    /// Consume into the captured outputs
    pub fn into_outputs(self) -> Option<Vec<String>> {
        match self {
            BatchOutput::Captured(outputs) => Some(outputs),
            BatchOutput::NoOutput => None,
        }
    }

    /// Whether this is the no-output sentinel
    pub fn is_no_output(&self) -> bool {
        matches!(self, BatchOutput::NoOutput)
    }
}
