//! Everything a chain element needs on disk before it can be submitted
//!
//! Parameter sets are validated and rendered into text without touching the filesystem. Only
//! [write] does I/O, so a bad parameter never leaves half a job directory behind.

use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Parameter sets for each artifact kind, deserialised from workflow files or built from CLI args
pub mod spec;

/// Render parameter sets with TinyTemplate
pub mod render;

/// Write rendered artifacts to a job directory
pub mod write;

pub use render::RenderedArtifact;
pub use spec::{Artifact, JobSpec, MethodParamSpec, PushTarget, SolverInputSpec};
pub use write::{write_artifact, FileMode, WriteOutcome};

/// The four kinds of file this crate knows how to render
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ArtifactKind {
    JobScript,
    TransitionSearch,
    Minimization,
    MethodParams,
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ArtifactKind::JobScript => write!(f, "job script"),
            ArtifactKind::TransitionSearch => write!(f, "ARTn LAMMPS input"),
            ArtifactKind::Minimization => write!(f, "minimization LAMMPS input"),
            ArtifactKind::MethodParams => write!(f, "ARTn parameters"),
        }
    }
}

/// A parameter that can't produce a meaningful artifact
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {field}: {reason}")]
pub struct ValidationError {
    pub field: &'static str,
    pub reason: String,
}

impl ValidationError {
    pub fn new(field: &'static str, reason: impl Into<String>) -> Self {
        ValidationError { field, reason: reason.into() }
    }
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("template {name} failed to render: {source}")]
    Template {
        name: &'static str,
        #[source]
        source: tinytemplate::error::Error,
    },
}

/// Writing an artifact (or creating its directory) failed
#[derive(Debug, Error)]
#[error("can't write {}: {source}", .path.display())]
pub struct WriteError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}
