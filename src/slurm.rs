//! Submit job scripts to a batch scheduler and keep hold of the job ids it hands back
//!
//! The [Scheduler] trait is the only thing the chain coordinator knows about; [sbatch::Sbatch]
//! is the SLURM implementation. Nothing here retries: submitting twice would queue the job
//! twice, so a retry is always the caller's decision.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Build and run sbatch, and parse its response
pub mod sbatch;

/// Run an external command with a deadline
mod process;

/// A job id returned by the scheduler
///
/// The token is opaque: each [Scheduler] decides what its ids look like and builds them with
/// [JobId::new]. It must be a single non-empty word since it is passed back as one argument in
/// a dependency flag.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct JobId(String);

impl JobId {
    pub fn new(token: impl Into<String>) -> Result<Self, InvalidJobId> {
        let token = token.into();
        if token.is_empty() || token.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(InvalidJobId(token));
        }
        Ok(JobId(token))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0:?} is not a job id")]
pub struct InvalidJobId(pub String);

impl FromStr for JobId {
    type Err = InvalidJobId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobId::new(s)
    }
}

impl TryFrom<String> for JobId {
    type Error = InvalidJobId;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        JobId::new(value)
    }
}

impl From<JobId> for String {
    fn from(id: JobId) -> Self {
        id.0
    }
}

/// Something that accepts job scripts
pub trait Scheduler {
    /// Queue `script`, held until `dependency` completes successfully when one is given
    ///
    /// Blocks until the submit command returns, never until the job itself finishes.
    fn submit(&self, script: &Path, dependency: Option<&JobId>) -> Result<JobId, SubmissionError>;
}

/// A program and its arguments, printed the way an operator would retype it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    pub program: String,
    pub args: Vec<String>,
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum SubmissionError {
    #[error("job script {} does not exist", .0.display())]
    MissingScript(PathBuf),

    #[error("can't run `{command}`: {source}")]
    Spawn {
        command: CommandLine,
        #[source]
        source: io::Error,
    },

    #[error("`{command}` exited with {}\nstdout: {stdout}\nstderr: {stderr}", exit_description(.code))]
    Rejected {
        command: CommandLine,
        code: Option<i32>,
        stdout: String,
        stderr: String,
    },

    #[error("`{command}` did not return within {timeout:?} and was killed\nstdout: {stdout}\nstderr: {stderr}")]
    TimedOut {
        command: CommandLine,
        timeout: Duration,
        /// Whatever was read before the kill; a job may already be queued
        stdout: String,
        stderr: String,
    },

    #[error("`{command}` succeeded but no job id found in its output: {stdout:?}")]
    Unparsable { command: CommandLine, stdout: String },
}

fn exit_description(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {code}"),
        None => "a signal".to_string(),
    }
}
