//! End-to-end chains: workflow file -> job directories -> fake sbatch
#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use artnsub::artifact::render::render_method_params;
use artnsub::artifact::{MethodParamSpec, PushTarget};
use artnsub::chain::{ChainCoordinator, ChainPolicy, ElementError, ElementState};
use artnsub::config::ClusterConfig;
use artnsub::request::workflow::Workflow;
use artnsub::slurm::sbatch::Sbatch;
use artnsub::slurm::SubmissionError;
use tempfile::TempDir;

/// Fake sbatch that hands out ids from a counter and rejects any script under `fail_dir`
fn counting_sbatch(dir: &Path, fail_dir: &str) -> PathBuf {
    let path = dir.join("sbatch");
    let counter = dir.join("counter");
    let log = dir.join("args.log");
    let script = format!(
        r#"#!/bin/sh
echo "$@" >> {log}
case "$*" in
  *{fail_dir}/*) echo "sbatch: error: Batch job submission failed" >&2; exit 1 ;;
esac
n=$(cat {counter} 2>/dev/null || echo 100)
n=$((n + 1))
echo $n > {counter}
echo "Submitted batch job $n"
"#,
        log = log.display(),
        counter = counter.display(),
        fail_dir = fail_dir,
    );
    fs::write(&path, script).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn workflow(dir: &Path) -> Workflow {
    static EXAMPLE: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/data/config/workflow.json"));
    let path = dir.join("workflow.json");
    fs::write(&path, EXAMPLE).unwrap();
    Workflow::read(&path).unwrap()
}

#[test]
fn test_workflow_chain_end_to_end() {
    let tmp = TempDir::new().unwrap();
    let sbatch = Sbatch::new(counting_sbatch(tmp.path(), "never"), Duration::from_secs(10));
    let config = ClusterConfig::default();
    let workflow = workflow(tmp.path());

    let report = ChainCoordinator::new(&sbatch, &config, ChainPolicy::FailFast)
        .run(&workflow.elements)
        .unwrap();

    assert_eq!(report.states(), vec![ElementState::Chained; 3]);
    let ids: Vec<&str> = report.records.iter().map(|r| r.job_id.as_ref().unwrap().as_str()).collect();
    assert_eq!(ids, vec!["101", "102", "103"]);

    let args: Vec<String> = fs::read_to_string(tmp.path().join("args.log"))
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect();
    assert!(!args[0].contains("--dependency"));
    assert!(args[1].contains("--dependency=afterok:101"));
    assert!(args[2].contains("--dependency=afterok:102"));

    let vac = tmp.path().join("vac_955");
    assert!(vac.join("script_job.sh").is_file());
    assert!(fs::read_to_string(vac.join("lammps.in")).unwrap().contains("plugin   load"));
    assert!(fs::read_to_string(vac.join("artn.in")).unwrap().contains("push_ids         = 955\n"));
    let relax = fs::read_to_string(tmp.path().join("vac_955_relax/lammps.in")).unwrap();
    assert!(relax.contains("read_data        ../vac_955/FinalS.data\n"));
    assert!(relax.contains("write_data                   Relaxed.data\n"));
}

#[test]
fn test_fail_fast_leaves_rest_pending() {
    let tmp = TempDir::new().unwrap();
    let sbatch = Sbatch::new(counting_sbatch(tmp.path(), "vac_955"), Duration::from_secs(10));
    let config = ClusterConfig::default();
    let workflow = workflow(tmp.path());

    let err = ChainCoordinator::new(&sbatch, &config, ChainPolicy::FailFast)
        .run(&workflow.elements)
        .unwrap_err();

    assert_eq!(err.index, 1);
    assert_eq!(
        err.report.states(),
        vec![ElementState::Chained, ElementState::Failed, ElementState::Pending]
    );
    assert!(matches!(err.source, ElementError::Submission(SubmissionError::Rejected { .. })));
    let message = err.to_string();
    assert!(message.contains("chain element 1"));
    assert!(message.contains("Batch job submission failed"));
    assert!(!tmp.path().join("vac_955_relax").exists());
}

#[test]
fn test_method_params_file_named_artn_in() {
    let tmp = TempDir::new().unwrap();

    let rendered = render_method_params(&MethodParamSpec::new(PushTarget::Atom(100))).unwrap();
    let outcome = rendered.write_to(tmp.path()).unwrap();

    assert_eq!(outcome.path, tmp.path().join("artn.in"));
    let content = fs::read_to_string(&outcome.path).unwrap();
    let push_line = content.lines().find(|line| line.contains("push_ids")).unwrap();
    assert_eq!(push_line.split('=').nth(1).unwrap().trim(), "100");
}
