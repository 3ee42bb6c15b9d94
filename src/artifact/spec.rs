use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex_lite::Regex;
use serde::{Deserialize, Serialize};

use crate::artifact::ValidationError;

pub const DEFAULT_JOB_SCRIPT: &str = "script_job.sh";
pub const DEFAULT_SOLVER_INPUT: &str = "lammps.in";
pub const DEFAULT_RUN_LOG: &str = "out.run";
pub const DEFAULT_OUTPUT_BASENAME: &str = "FinalS";
pub const DEFAULT_METHOD_PARAMS: &str = "artn.in";

fn default_job_script() -> String { DEFAULT_JOB_SCRIPT.to_string() }
fn default_solver_input() -> String { DEFAULT_SOLVER_INPUT.to_string() }
fn default_run_log() -> String { DEFAULT_RUN_LOG.to_string() }
fn default_output_basename() -> String { DEFAULT_OUTPUT_BASENAME.to_string() }
fn default_method_params() -> String { DEFAULT_METHOD_PARAMS.to_string() }

/// Resources and file names for one SLURM job script
///
/// `duration` uses the sbatch `days-hours:minutes:seconds` form (e.g. `0-01:30:00`) and memory
/// carries a unit suffix (e.g. `8G`). The script runs the engine on `solver_input` and sends its
/// output to `run_log`, which is what `check` reads afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct JobSpec {
    pub duration: String,
    pub task_count: u32,
    pub cores_per_task: u32,
    pub memory_per_cpu: String,
    #[serde(default = "default_job_script")]
    pub file_name: String,
    #[serde(default = "default_solver_input")]
    pub solver_input: String,
    #[serde(default = "default_run_log")]
    pub run_log: String,
}

impl JobSpec {
    pub fn new(duration: &str, task_count: u32, cores_per_task: u32, memory_per_cpu: &str) -> Self {
        JobSpec {
            duration: duration.to_string(),
            task_count,
            cores_per_task,
            memory_per_cpu: memory_per_cpu.to_string(),
            file_name: default_job_script(),
            solver_input: default_solver_input(),
            run_log: default_run_log(),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_duration(&self.duration)?;
        if self.task_count == 0 {
            return Err(ValidationError::new("task_count", "must be at least 1"));
        }
        if self.cores_per_task == 0 {
            return Err(ValidationError::new("cores_per_task", "must be at least 1"));
        }
        validate_memory(&self.memory_per_cpu)?;
        validate_file_name("file_name", &self.file_name)?;
        validate_file_name("solver_input", &self.solver_input)?;
        validate_file_name("run_log", &self.run_log)
    }
}

/// A LAMMPS input deck that reads one data file and writes `<output_basename>.data` and
/// `<output_basename>.restart` when the run finishes
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SolverInputSpec {
    pub input_data_file: String,
    #[serde(default = "default_output_basename")]
    pub output_basename: String,
    #[serde(default = "default_solver_input")]
    pub file_name: String,
}

impl SolverInputSpec {
    pub fn new(input_data_file: &str) -> Self {
        SolverInputSpec {
            input_data_file: input_data_file.to_string(),
            output_basename: default_output_basename(),
            file_name: default_solver_input(),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_file_name("input_data_file", &self.input_data_file)?;
        validate_file_name("output_basename", &self.output_basename)?;
        validate_file_name("file_name", &self.file_name)
    }
}

/// Atom(s) ARTn pushes away from the starting configuration
///
/// Deserialises from either a bare id (`955`) or a list (`[955, 956]`).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum PushTarget {
    Atom(u32),
    Atoms(Vec<u32>),
}

impl PushTarget {
    pub fn ids(&self) -> &[u32] {
        match self {
            PushTarget::Atom(id) => std::slice::from_ref(id),
            PushTarget::Atoms(ids) => ids,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        let ids = self.ids();
        if ids.is_empty() {
            return Err(ValidationError::new("push_target", "needs at least one atom id"));
        }
        if ids.contains(&0) {
            return Err(ValidationError::new("push_target", "atom ids start at 1"));
        }
        Ok(())
    }
}

/// Serialised as the single `push_ids` value ARTn expects, e.g. `955, 956`
impl fmt::Display for PushTarget {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let ids: Vec<String> = self.ids().iter().map(|id| id.to_string()).collect();
        write!(f, "{}", ids.join(", "))
    }
}

/// Parse `955` or `955,956` (spaces allowed) as typed on the command line
impl FromStr for PushTarget {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let ids = s
            .split(',')
            .map(|token| token.trim().parse::<u32>())
            .collect::<Result<Vec<u32>, _>>()
            .map_err(|err| ValidationError::new("push_target", format!("{s:?}: {err}")))?;

        let target = match ids.as_slice() {
            [id] => PushTarget::Atom(*id),
            _ => PushTarget::Atoms(ids),
        };
        target.validate()?;
        Ok(target)
    }
}

/// ARTn control parameters; everything except the push target is fixed in the template
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct MethodParamSpec {
    pub push_target: PushTarget,
    #[serde(default = "default_method_params")]
    pub file_name: String,
}

impl MethodParamSpec {
    pub fn new(push_target: PushTarget) -> Self {
        MethodParamSpec { push_target, file_name: default_method_params() }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        self.push_target.validate()?;
        validate_file_name("file_name", &self.file_name)
    }
}

/// Input files that travel with a job script
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Artifact {
    /// LAMMPS input that loads the ARTn plugin
    TransitionSearch(SolverInputSpec),
    /// LAMMPS input for a plain box/relax + conjugate gradient minimization
    Minimization(SolverInputSpec),
    /// `&ARTN_PARAMETERS` namelist
    MethodParams(MethodParamSpec),
}

impl Artifact {
    pub fn file_name(&self) -> &str {
        match self {
            Artifact::TransitionSearch(spec) | Artifact::Minimization(spec) => &spec.file_name,
            Artifact::MethodParams(spec) => &spec.file_name,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            Artifact::TransitionSearch(spec) | Artifact::Minimization(spec) => spec.validate(),
            Artifact::MethodParams(spec) => spec.validate(),
        }
    }
}

fn duration_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^(\d+)-(\d{1,2}):(\d{2}):(\d{2})$").expect("duration pattern"))
}

fn memory_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^(\d+)[KMGT]B?$").expect("memory pattern"))
}

fn validate_duration(duration: &str) -> Result<(), ValidationError> {
    let invalid = |reason: &str| ValidationError::new("duration", format!("{duration:?} {reason}"));
    let caps = duration_pattern()
        .captures(duration)
        .ok_or_else(|| invalid("is not days-hours:minutes:seconds"))?;

    // digits only, but a huge day count still overflows u64
    let field = |i: usize| caps[i].parse::<u64>().map_err(|_| invalid("is out of range"));
    let (days, hours, minutes, seconds) = (field(1)?, field(2)?, field(3)?, field(4)?);
    if hours >= 24 || minutes >= 60 || seconds >= 60 {
        return Err(invalid("has hours, minutes or seconds out of range"));
    }
    if [days, hours, minutes, seconds].iter().all(|part| *part == 0) {
        return Err(invalid("is zero"));
    }
    Ok(())
}

fn validate_memory(memory: &str) -> Result<(), ValidationError> {
    let caps = memory_pattern().captures(memory).ok_or_else(|| {
        ValidationError::new("memory_per_cpu", format!("{memory:?} needs a size and a K, M, G or T suffix"))
    })?;
    if caps[1].trim_start_matches('0').is_empty() {
        return Err(ValidationError::new("memory_per_cpu", format!("{memory:?} is zero")));
    }
    Ok(())
}

/// File names end up unquoted in shell and LAMMPS lines, so whitespace would split them
fn validate_file_name(field: &'static str, name: &str) -> Result<(), ValidationError> {
    if name.is_empty() {
        return Err(ValidationError::new(field, "is empty"));
    }
    if name.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(ValidationError::new(field, format!("{name:?} contains whitespace")));
    }
    Ok(())
}
