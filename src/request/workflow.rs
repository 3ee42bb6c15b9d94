use std::fs;
use std::path::{Path, PathBuf};

use jsonschema::JSONSchema;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::chain::{ChainElement, ChainPolicy};
use crate::slurm::JobId;

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("can't read workflow {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("workflow is not valid JSON: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("bundled workflow schema doesn't compile: {0}")]
    Schema(String),

    #[error("workflow fails validation:\n{}", .0.join("\n"))]
    Invalid(Vec<String>),

    #[error("can't deserialise workflow: {0}")]
    Deserialise(#[source] serde_json::Error),
}

/// A chain as written by an operator
///
/// Relative element directories are resolved against the workflow file's own directory.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Workflow {
    pub policy: Option<ChainPolicy>,
    /// Make the first element wait for a job that is already queued
    pub after: Option<JobId>,
    pub elements: Vec<ChainElement>,
}

impl Workflow {
    pub fn read(path: &Path) -> Result<Workflow, WorkflowError> {
        info!("Reading workflow at {}", path.display());
        let text = fs::read_to_string(path).map_err(|source| {
            warn!("Can't read workflow at path {}: {}", path.display(), source);
            WorkflowError::Read { path: path.to_path_buf(), source }
        })?;

        let mut workflow = Workflow::parse(&text)?;
        if let Some(base) = path.parent() {
            workflow.rebase(base);
        }
        Ok(workflow)
    }

    /// Parse and validate workflow JSON
    pub fn parse(text: &str) -> Result<Workflow, WorkflowError> {
        info!("Parsing JSON into untyped structure");
        let json: Value = serde_json::from_str(text).map_err(WorkflowError::Decode)?;

        info!("Validating workflow against JSON schema");
        if let Err(err) = validate(&json) {
            warn!("Workflow fails validation");
            return Err(err);
        }

        info!("Deserialising valid JSON into typed Rust object");
        serde_json::from_value::<Workflow>(json).map_err(WorkflowError::Deserialise)
    }

    fn rebase(&mut self, base: &Path) {
        for element in &mut self.elements {
            if element.directory.is_relative() {
                element.directory = base.join(&element.directory);
            }
        }
    }
}

fn validate(json: &Value) -> Result<(), WorkflowError> {
    static SCHEMA: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/data/schema/workflow.json"));
    let schema: Value = serde_json::from_str(SCHEMA).map_err(|err| WorkflowError::Schema(err.to_string()))?;
    let compiled = JSONSchema::compile(&schema).map_err(|err| WorkflowError::Schema(err.to_string()))?;

    let errors: Vec<String> = match compiled.validate(json) {
        Ok(()) => Vec::new(),
        Err(errors) => errors.map(|err| format!("{}: {}", err.instance_path, err)).collect(),
    };
    match errors.is_empty() {
        true => Ok(()),
        false => Err(WorkflowError::Invalid(errors)),
    }
}
