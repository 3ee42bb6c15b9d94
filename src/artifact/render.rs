use serde::Serialize;
use tinytemplate::{format_unescaped, TinyTemplate};

use crate::artifact::spec::{Artifact, JobSpec, MethodParamSpec, SolverInputSpec};
use crate::artifact::{ArtifactKind, FileMode, RenderError};
use crate::config::ClusterConfig;

/// Rendered text plus the file name it should be written to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedArtifact {
    pub kind: ArtifactKind,
    pub file_name: String,
    pub content: String,
    pub mode: FileMode,
}

/// Rendering context for the SBATCH job script
#[derive(Serialize)]
struct JobContext<'a> {
    account: Option<&'a str>,
    task_count: u32,
    cores_per_task: u32,
    memory_per_cpu: &'a str,
    duration: &'a str,
    environment: String,
    launcher: &'a str,
    engine: &'a str,
    solver_input: &'a str,
    run_log: &'a str,
}

/// Rendering context shared by both LAMMPS inputs
#[derive(Serialize)]
struct LammpsContext<'a> {
    input_data_file: &'a str,
    potential: &'a str,
    masses: String,
    artn_plugin: &'a str,
    output_basename: &'a str,
}

/// Rendering context for the ARTn namelist
#[derive(Serialize)]
struct ArtnContext {
    push_ids: String,
}

/// Render a named template; the unescaped formatter keeps shell and LAMMPS syntax intact
fn render_template<C: Serialize>(name: &'static str, text: &'static str, context: &C) -> Result<String, RenderError> {
    let mut tt = TinyTemplate::new();
    tt.set_default_formatter(&format_unescaped);
    tt.add_template(name, text)
        .map_err(|source| RenderError::Template { name, source })?;
    tt.render(name, context)
        .map_err(|source| RenderError::Template { name, source })
}

/// Render the SBATCH job script
///
/// The header carries the resource request; the body loads the environment from the cluster
/// config and runs the engine once on the paired LAMMPS input.
pub fn render_job(spec: &JobSpec, config: &ClusterConfig) -> Result<RenderedArtifact, RenderError> {
    static JOB: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/data/templates/job.txt"));
    spec.validate()?;

    let cluster = &config.cluster;
    let context = JobContext {
        account: cluster.account.as_deref(),
        task_count: spec.task_count,
        cores_per_task: spec.cores_per_task,
        memory_per_cpu: &spec.memory_per_cpu,
        duration: &spec.duration,
        environment: environment_block(config),
        launcher: &cluster.launcher,
        engine: &cluster.engine,
        solver_input: &spec.solver_input,
        run_log: &spec.run_log,
    };

    Ok(RenderedArtifact {
        kind: ArtifactKind::JobScript,
        file_name: spec.file_name.clone(),
        content: render_template("job", JOB, &context)?,
        mode: FileMode::Executable,
    })
}

/// Render the LAMMPS input that runs an ARTn saddle point search
pub fn render_transition_search(spec: &SolverInputSpec, config: &ClusterConfig) -> Result<RenderedArtifact, RenderError> {
    static ARTN_LAMMPS: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/data/templates/artn_lammps.txt"));
    render_lammps(ArtifactKind::TransitionSearch, "artn_lammps", ARTN_LAMMPS, spec, config)
}

/// Render the LAMMPS input for a box relaxation with conjugate gradient
pub fn render_minimization(spec: &SolverInputSpec, config: &ClusterConfig) -> Result<RenderedArtifact, RenderError> {
    static MIN_LAMMPS: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/data/templates/min_lammps.txt"));
    render_lammps(ArtifactKind::Minimization, "min_lammps", MIN_LAMMPS, spec, config)
}

fn render_lammps(
    kind: ArtifactKind,
    name: &'static str,
    template: &'static str,
    spec: &SolverInputSpec,
    config: &ClusterConfig,
) -> Result<RenderedArtifact, RenderError> {
    spec.validate()?;
    let potential = &config.potential;
    let context = LammpsContext {
        input_data_file: &spec.input_data_file,
        potential: &potential.file,
        masses: mass_lines(&potential.masses),
        artn_plugin: &potential.artn_plugin,
        output_basename: &spec.output_basename,
    };

    Ok(RenderedArtifact {
        kind,
        file_name: spec.file_name.clone(),
        content: render_template(name, template, &context)?,
        mode: FileMode::Regular,
    })
}

/// Render the `&ARTN_PARAMETERS` namelist
///
/// Only `push_ids` varies; several atoms become one comma separated value rather than
/// repeated `push_ids` lines.
pub fn render_method_params(spec: &MethodParamSpec) -> Result<RenderedArtifact, RenderError> {
    static ARTN: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/data/templates/artn.txt"));
    spec.validate()?;
    let context = ArtnContext { push_ids: spec.push_target.to_string() };

    Ok(RenderedArtifact {
        kind: ArtifactKind::MethodParams,
        file_name: spec.file_name.clone(),
        content: render_template("artn", ARTN, &context)?,
        mode: FileMode::Regular,
    })
}

impl Artifact {
    pub fn render(&self, config: &ClusterConfig) -> Result<RenderedArtifact, RenderError> {
        match self {
            Artifact::TransitionSearch(spec) => render_transition_search(spec, config),
            Artifact::Minimization(spec) => render_minimization(spec, config),
            Artifact::MethodParams(spec) => render_method_params(spec),
        }
    }
}

/// `module load` plus exports, each group followed by a newline
fn environment_block(config: &ClusterConfig) -> String {
    let cluster = &config.cluster;
    let mut sections = Vec::new();
    if !cluster.modules.is_empty() {
        sections.push(format!("module load {}\n", cluster.modules.join(" ")));
    }
    if !cluster.environment.is_empty() {
        let exports: String = cluster
            .environment
            .iter()
            .map(|(key, value)| format!("export {key}={value}\n"))
            .collect();
        sections.push(exports);
    }
    sections.join("\n")
}

fn mass_lines(masses: &[f64]) -> String {
    masses
        .iter()
        .enumerate()
        .map(|(i, mass)| format!("mass        {}  {}", i + 1, mass))
        .collect::<Vec<String>>()
        .join("\n")
}
