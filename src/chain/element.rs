use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use log::info;
use serde::{Deserialize, Serialize};

use crate::artifact::render::render_job;
use crate::artifact::{Artifact, JobSpec, RenderError, RenderedArtifact, ValidationError, WriteError, WriteOutcome};
use crate::config::ClusterConfig;

/// One job in a chain: its directory, script and the inputs the script reads
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ChainElement {
    pub directory: PathBuf,
    pub job: JobSpec,
    #[serde(default)]
    pub artifacts: Vec<Artifact>,
}

impl ChainElement {
    pub fn new(directory: impl Into<PathBuf>, job: JobSpec, artifacts: Vec<Artifact>) -> Self {
        ChainElement { directory: directory.into(), job, artifacts }
    }

    pub fn script_path(&self) -> PathBuf {
        self.directory.join(&self.job.file_name)
    }

    /// Render the job script followed by each companion input
    ///
    /// Everything is rendered before anything is written, so one bad parameter leaves the
    /// directory untouched.
    pub fn render(&self, config: &ClusterConfig) -> Result<Vec<RenderedArtifact>, RenderError> {
        let mut rendered = vec![render_job(&self.job, config)?];
        for artifact in &self.artifacts {
            rendered.push(artifact.render(config)?);
        }

        let mut names = HashSet::new();
        if let Some(duplicate) = rendered.iter().find(|artifact| !names.insert(artifact.file_name.as_str())) {
            return Err(ValidationError::new(
                "file_name",
                format!("{} is written twice in {}", duplicate.file_name, self.directory.display()),
            )
            .into());
        }
        Ok(rendered)
    }

    /// Create the job directory and write the rendered files into it
    pub fn write(&self, rendered: &[RenderedArtifact]) -> Result<Vec<WriteOutcome>, WriteError> {
        create_directory(&self.directory)?;
        rendered.iter().map(|artifact| artifact.write_to(&self.directory)).collect()
    }
}

fn create_directory(path: &Path) -> Result<(), WriteError> {
    if !path.exists() {
        info!("Creating job directory {}", path.display());
    }
    fs::create_dir_all(path).map_err(|source| WriteError { path: path.to_path_buf(), source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::{MethodParamSpec, PushTarget, SolverInputSpec};
    use tempfile::TempDir;

    fn element(dir: &Path) -> ChainElement {
        ChainElement::new(
            dir.join("vac_955"),
            JobSpec::new("0-01:30:00", 40, 1, "8G"),
            vec![
                Artifact::TransitionSearch(SolverInputSpec::new("conf.lmp")),
                Artifact::MethodParams(MethodParamSpec::new(PushTarget::Atom(955))),
            ],
        )
    }

    #[test]
    fn test_render_and_write() {
        let tmp = TempDir::new().unwrap();
        let element = element(tmp.path());

        let rendered = element.render(&ClusterConfig::default()).unwrap();
        let names: Vec<&str> = rendered.iter().map(|r| r.file_name.as_str()).collect();
        assert_eq!(names, vec!["script_job.sh", "lammps.in", "artn.in"]);

        let outcomes = element.write(&rendered).unwrap();
        assert_eq!(outcomes.len(), 3);
        assert!(element.script_path().is_file());
        assert!(tmp.path().join("vac_955/artn.in").is_file());
    }

    #[test]
    fn test_duplicate_file_names_rejected() {
        let tmp = TempDir::new().unwrap();
        let mut element = element(tmp.path());
        element.artifacts.push(Artifact::Minimization(SolverInputSpec::new("other.lmp")));

        let err = element.render(&ClusterConfig::default()).unwrap_err();
        assert!(matches!(err, RenderError::Validation(ref e) if e.field == "file_name"));
    }

    #[test]
    fn test_invalid_companion_writes_nothing() {
        let tmp = TempDir::new().unwrap();
        let mut element = element(tmp.path());
        element.artifacts.push(Artifact::MethodParams(MethodParamSpec {
            push_target: PushTarget::Atoms(vec![]),
            file_name: "artn2.in".to_string(),
        }));

        assert!(element.render(&ClusterConfig::default()).is_err());
        assert!(!element.directory.exists());
    }
}
