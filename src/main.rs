use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use log::{info, warn};

use artnsub::artifact::render::{render_job, render_method_params, render_minimization, render_transition_search};
use artnsub::artifact::{JobSpec, MethodParamSpec, PushTarget, RenderedArtifact, SolverInputSpec};
use artnsub::chain::{ChainCoordinator, ChainPolicy};
use artnsub::config::ClusterConfig;
use artnsub::request::workflow::Workflow;
use artnsub::runlog::check_runs;
use artnsub::slurm::sbatch::{parse_slurm_job_id, Sbatch};
use artnsub::slurm::{JobId, Scheduler};

#[derive(Debug, Parser)]
#[command(author, version, about = "Generate and chain SLURM jobs for ARTn/LAMMPS runs")]
struct Args {
    /// Cluster configuration (TOML); built-in defaults are used without it
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Copy, Clone, ValueEnum)]
enum SolverKind {
    TransitionSearch,
    Minimization,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Write a SLURM job script
    Job {
        /// Wall time as days-hours:minutes:seconds, e.g. 0-01:30:00
        #[arg(long)]
        time: String,
        #[arg(long)]
        ntasks: u32,
        #[arg(long, default_value_t = 1)]
        cores: u32,
        /// Memory per CPU, e.g. 8G
        #[arg(long)]
        mem: String,
        #[arg(long, default_value = "script_job.sh")]
        file_name: String,
        #[arg(long, default_value = "lammps.in")]
        solver_input: String,
        #[arg(long, default_value = "out.run")]
        run_log: String,
        #[arg(long, default_value = ".")]
        dir: PathBuf,
    },

    /// Write a LAMMPS input file
    Lammps {
        #[arg(long, value_enum, default_value_t = SolverKind::TransitionSearch)]
        kind: SolverKind,
        /// Data file read with read_data
        #[arg(long)]
        data: String,
        #[arg(long, default_value = "FinalS")]
        output_basename: String,
        #[arg(long, default_value = "lammps.in")]
        file_name: String,
        #[arg(long, default_value = ".")]
        dir: PathBuf,
    },

    /// Write the ARTn parameter file
    Artn {
        /// Atom id(s) to push, comma separated
        #[arg(long, default_value = "955")]
        push_ids: PushTarget,
        #[arg(long, default_value = "artn.in")]
        file_name: String,
        #[arg(long, default_value = ".")]
        dir: PathBuf,
    },

    /// Submit one job script, optionally after another job
    Submit {
        script: PathBuf,
        #[arg(long, value_parser = parse_slurm_job_id)]
        after: Option<JobId>,
    },

    /// Render, write and submit every job in a workflow file
    Chain {
        workflow: PathBuf,
        /// Overrides the policy in the workflow file
        #[arg(long, value_enum)]
        policy: Option<ChainPolicy>,
        /// First element waits for this job; overrides the workflow file
        #[arg(long, value_parser = parse_slurm_job_id)]
        after: Option<JobId>,
        /// Skip elements before this index, e.g. to resubmit from a failed element
        #[arg(long, default_value_t = 0)]
        start: usize,
        /// Write files but don't submit anything
        #[arg(long)]
        dry_run: bool,
    },

    /// List job directories whose run log has no energies
    Check {
        #[arg(default_value = ".")]
        dir: PathBuf,
        #[arg(long, default_value = "vac_")]
        prefix: String,
        #[arg(long, default_value = "out.run")]
        log: String,
    },
}

fn main() -> ExitCode {
    env_logger::init();
    info!("terve! starting up :)");

    let args = Args::parse();
    match run(args) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<ExitCode> {
    let config = ClusterConfig::load(args.config.as_deref())?;

    match args.command {
        Command::Job { time, ntasks, cores, mem, file_name, solver_input, run_log, dir } => {
            let spec = JobSpec { duration: time, task_count: ntasks, cores_per_task: cores, memory_per_cpu: mem, file_name, solver_input, run_log };
            write_single(render_job(&spec, &config)?, &dir)
        }
        Command::Lammps { kind, data, output_basename, file_name, dir } => {
            let spec = SolverInputSpec { input_data_file: data, output_basename, file_name };
            let rendered = match kind {
                SolverKind::TransitionSearch => render_transition_search(&spec, &config)?,
                SolverKind::Minimization => render_minimization(&spec, &config)?,
            };
            write_single(rendered, &dir)
        }
        Command::Artn { push_ids, file_name, dir } => {
            let spec = MethodParamSpec { push_target: push_ids, file_name };
            write_single(render_method_params(&spec)?, &dir)
        }
        Command::Submit { script, after } => {
            let sbatch = Sbatch::from_config(&config.scheduler);
            let job_id = sbatch
                .submit(&script, after.as_ref())
                .with_context(|| format!("submitting {}", script.display()))?;
            println!("{job_id}");
            Ok(ExitCode::SUCCESS)
        }
        Command::Chain { workflow, policy, after, start, dry_run } => {
            run_chain(&config, &workflow, policy, after, start, dry_run)
        }
        Command::Check { dir, prefix, log } => {
            let checks = check_runs(&dir, &prefix, &log).with_context(|| format!("checking {}", dir.display()))?;
            let problems: Vec<_> = checks.iter().filter(|check| !check.status.is_complete()).collect();
            for check in &problems {
                println!("{}\t{}", check.folder.display(), check.status);
            }
            println!("{} folders checked, {} need attention", checks.len(), problems.len());
            Ok(match problems.is_empty() {
                true => ExitCode::SUCCESS,
                false => ExitCode::FAILURE,
            })
        }
    }
}

fn write_single(rendered: RenderedArtifact, dir: &Path) -> Result<ExitCode> {
    let outcome = rendered.write_to(dir)?;
    if let Some(warning) = &outcome.permission_warning {
        warn!("{warning}");
    }
    println!("File {} successfully generated.", outcome.path.display());
    Ok(ExitCode::SUCCESS)
}

fn run_chain(
    config: &ClusterConfig,
    path: &Path,
    policy: Option<ChainPolicy>,
    after: Option<JobId>,
    start: usize,
    dry_run: bool,
) -> Result<ExitCode> {
    let workflow = Workflow::read(path)?;
    let policy = policy.or(workflow.policy).unwrap_or_default();
    let after = after.or(workflow.after);
    let sbatch = Sbatch::from_config(&config.scheduler);
    let coordinator = ChainCoordinator::new(&sbatch, config, policy);

    if dry_run {
        info!("--dry-run set, writing files without submitting");
        for script in coordinator.stage(&workflow.elements)? {
            println!("{}", script.display());
        }
        return Ok(ExitCode::SUCCESS);
    }

    match coordinator.run_from(&workflow.elements, start, after) {
        Ok(report) => {
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(match report.failed().next() {
                Some(_) => ExitCode::FAILURE,
                None => ExitCode::SUCCESS,
            })
        }
        Err(err) => {
            // the partial report tells the operator what is already queued
            println!("{}", serde_json::to_string_pretty(&err.report)?);
            Err(err.into())
        }
    }
}
