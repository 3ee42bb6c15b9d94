//! Render, write and submit a list of jobs so each one waits for the one before it
//!
//! A chain runs strictly in order on the calling thread: every submission needs the job id of
//! the previous one. Independent chains share nothing and can run side by side.

use std::path::PathBuf;

use thiserror::Error;

use crate::artifact::{RenderError, WriteError};
use crate::slurm::SubmissionError;

/// How a chain reacts when one element fails
pub mod policy;

/// Per-element states and the submission report
pub mod state;

/// A job directory: job script plus companion inputs
pub mod element;

/// Drive elements through render, write and submit
pub mod coordinator;

pub use coordinator::ChainCoordinator;
pub use element::ChainElement;
pub use policy::ChainPolicy;
pub use state::{ChainReport, ElementState, SubmissionRecord};

/// Why one element of a chain failed
#[derive(Debug, Error)]
pub enum ElementError {
    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    Write(#[from] WriteError),

    #[error(transparent)]
    Submission(#[from] SubmissionError),

    #[error("chain has {len} elements, can't start at {start}")]
    NoSuchElement { start: usize, len: usize },
}

/// The first failing element of a fail-fast chain, plus where everything else got to
#[derive(Debug, Error)]
#[error("chain element {index} ({}) failed: {source}", .directory.display())]
pub struct ChainError {
    pub index: usize,
    pub directory: PathBuf,
    #[source]
    pub source: ElementError,
    pub report: ChainReport,
}
