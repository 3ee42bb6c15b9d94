use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use log::info;
use regex_lite::Regex;

use crate::config::SchedulerSection;
use crate::slurm::process::{self, Outcome};
use crate::slurm::{CommandLine, InvalidJobId, JobId, Scheduler, SubmissionError};

/// Submit job scripts with SLURM's `sbatch`
#[derive(Debug, Clone)]
pub struct Sbatch {
    program: PathBuf,
    timeout: Duration,
}

impl Sbatch {
    pub fn new(program: impl Into<PathBuf>, timeout: Duration) -> Self {
        Sbatch { program: program.into(), timeout }
    }

    pub fn from_config(config: &SchedulerSection) -> Self {
        Sbatch::new(&config.program, config.timeout())
    }

    /// Arguments for one submission
    ///
    /// The job runs in the script's directory so it finds its input files. A dependency becomes
    /// exactly one `--dependency=afterok:<id>`; without one the flag is left out entirely.
    pub fn command_line(&self, script: &Path, dependency: Option<&JobId>) -> CommandLine {
        let mut args = Vec::new();
        if let Some(dir) = script.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            args.push(format!("--chdir={}", dir.display()));
        }
        if let Some(job_id) = dependency {
            args.push(format!("--dependency=afterok:{job_id}"));
        }
        args.push(script.display().to_string());

        CommandLine { program: self.program.display().to_string(), args }
    }
}

impl Scheduler for Sbatch {
    fn submit(&self, script: &Path, dependency: Option<&JobId>) -> Result<JobId, SubmissionError> {
        if !script.is_file() {
            return Err(SubmissionError::MissingScript(script.to_path_buf()));
        }

        let command = self.command_line(script, dependency);
        info!("Running sbatch process");
        info!("{command}");

        let outcome = match process::run(&command, self.timeout) {
            Ok(outcome) => outcome,
            Err(source) => return Err(SubmissionError::Spawn { command, source }),
        };

        match outcome {
            Outcome::TimedOut { stdout, stderr } => {
                Err(SubmissionError::TimedOut { command, timeout: self.timeout, stdout, stderr })
            }
            Outcome::Exited { status, stdout, stderr } if !status.success() => {
                Err(SubmissionError::Rejected { command, code: status.code(), stdout, stderr })
            }
            Outcome::Exited { stdout, .. } => match parse_job_id(&stdout) {
                Some(job_id) => {
                    info!("SLURM job id: {job_id}");
                    Ok(job_id)
                }
                None => Err(SubmissionError::Unparsable { command, stdout }),
            },
        }
    }
}

/// Find the job id in sbatch's stdout
///
/// Accepts `Submitted batch job 445566` anywhere in the output, including the multi-cluster
/// `Submitted batch job 445566 on cluster cedar`, with the last such sentence winning. Failing
/// that, the last non-empty line may be the `--parsable` form `445566` or `445566;cluster`.
/// Anything else is `None`, never an empty id.
pub fn parse_job_id(stdout: &str) -> Option<JobId> {
    static SENTENCE: OnceLock<Regex> = OnceLock::new();
    static PARSABLE: OnceLock<Regex> = OnceLock::new();
    let sentence = SENTENCE
        .get_or_init(|| Regex::new(r"Submitted batch job\s+([0-9]+(?:_[0-9]+)?)\b").expect("job id pattern"));
    let parsable =
        PARSABLE.get_or_init(|| Regex::new(r"^([0-9]+(?:_[0-9]+)?)(?:;\S+)?$").expect("parsable job id pattern"));

    if let Some(caps) = sentence.captures_iter(stdout).last() {
        return JobId::new(&caps[1]).ok();
    }
    let line = stdout.lines().map(str::trim).filter(|line| !line.is_empty()).last()?;
    let caps = parsable.captures(line)?;
    JobId::new(&caps[1]).ok()
}

/// Parse a SLURM job id given on the command line: digits, optionally `_<array task>`
pub fn parse_slurm_job_id(s: &str) -> Result<JobId, InvalidJobId> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| Regex::new(r"^[0-9]+(?:_[0-9]+)?$").expect("slurm job id pattern"));

    if !pattern.is_match(s) {
        return Err(InvalidJobId(s.to_string()));
    }
    JobId::new(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sbatch() -> Sbatch {
        Sbatch::new("sbatch", Duration::from_secs(30))
    }

    #[test]
    fn test_parse_default_response() {
        assert_eq!(parse_job_id("Submitted batch job 445566\n").unwrap().as_str(), "445566");
    }

    #[test]
    fn test_parse_parsable_response() {
        assert_eq!(parse_job_id("445566\n").unwrap().as_str(), "445566");
        assert_eq!(parse_job_id("445566;cedar\n").unwrap().as_str(), "445566");
    }

    #[test]
    fn test_parse_skips_warning_lines() {
        let stdout = "sbatch: warning: memory request rounded\nSubmitted batch job 12\n\n";
        assert_eq!(parse_job_id(stdout).unwrap().as_str(), "12");
    }

    #[test]
    fn test_parse_multi_cluster_response() {
        let stdout = "Submitted batch job 445566 on cluster cedar\n";
        assert_eq!(parse_job_id(stdout).unwrap().as_str(), "445566");
    }

    #[test]
    fn test_slurm_job_id_on_command_line() {
        assert_eq!(parse_slurm_job_id("445566").unwrap().as_str(), "445566");
        assert_eq!(parse_slurm_job_id("445566_3").unwrap().as_str(), "445566_3");
        for bad in ["", "J123", "12 34", "_3", "12_", "12;cluster"] {
            assert_eq!(parse_slurm_job_id(bad), Err(InvalidJobId(bad.to_string())));
        }
    }

    #[test]
    fn test_unparsable_responses() {
        for stdout in ["", "\n\n", "Submitted batch job", "job queued", "Submitted batch job abc"] {
            assert_eq!(parse_job_id(stdout), None, "{stdout:?}");
        }
    }

    #[test]
    fn test_no_dependency_directive_without_dependency() {
        let command = sbatch().command_line(Path::new("vac_1/script_job.sh"), None);
        assert!(command.args.iter().all(|arg| !arg.contains("dependency")));
        assert_eq!(command.args, vec!["--chdir=vac_1", "vac_1/script_job.sh"]);
    }

    #[test]
    fn test_single_dependency_directive() {
        let dependency = JobId::new("J123").unwrap();
        let command = sbatch().command_line(Path::new("script_job.sh"), Some(&dependency));

        let directives: Vec<&String> = command.args.iter().filter(|arg| arg.contains("dependency")).collect();
        assert_eq!(directives, vec!["--dependency=afterok:J123"]);
        assert_eq!(command.args.last().unwrap(), "script_job.sh");
        assert_eq!(command.to_string(), "sbatch --dependency=afterok:J123 script_job.sh");
    }

    #[test]
    fn test_missing_script() {
        let err = sbatch().submit(Path::new("/nonexistent/script_job.sh"), None).unwrap_err();
        assert!(matches!(err, SubmissionError::MissingScript(_)));
    }
}
