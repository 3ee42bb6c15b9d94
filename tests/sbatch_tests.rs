//! Run the real sbatch submitter against small shell scripts standing in for sbatch
#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use artnsub::artifact::{write_artifact, FileMode};
use artnsub::slurm::sbatch::Sbatch;
use artnsub::slurm::{JobId, Scheduler, SubmissionError};
use tempfile::TempDir;

/// Write an executable fake sbatch that records its arguments in `args.log`
fn fake_sbatch(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("sbatch");
    let log = dir.join("args.log");
    let script = format!("#!/bin/sh\necho \"$@\" >> {}\n{}\n", log.display(), body);
    fs::write(&path, script).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn job_script(dir: &Path) -> PathBuf {
    let path = dir.join("script_job.sh");
    write_artifact(&path, "#!/bin/sh\necho hi\n", FileMode::Executable).unwrap();
    path
}

fn recorded_args(dir: &Path) -> String {
    fs::read_to_string(dir.join("args.log")).unwrap()
}

#[test]
fn test_submitted_batch_job_response() {
    let tmp = TempDir::new().unwrap();
    let sbatch = Sbatch::new(fake_sbatch(tmp.path(), "echo 'Submitted batch job 445566'"), Duration::from_secs(10));

    let job_id = sbatch.submit(&job_script(tmp.path()), None).unwrap();

    assert_eq!(job_id.as_str(), "445566");
    assert!(!recorded_args(tmp.path()).contains("--dependency"));
}

#[test]
fn test_dependency_is_passed_once() {
    let tmp = TempDir::new().unwrap();
    let sbatch = Sbatch::new(fake_sbatch(tmp.path(), "echo 'Submitted batch job 2'"), Duration::from_secs(10));
    let after = JobId::new("J123").unwrap();

    sbatch.submit(&job_script(tmp.path()), Some(&after)).unwrap();

    let args = recorded_args(tmp.path());
    assert_eq!(args.matches("--dependency").count(), 1);
    assert!(args.contains("--dependency=afterok:J123"));
}

#[test]
fn test_multi_cluster_response() {
    let tmp = TempDir::new().unwrap();
    let sbatch = Sbatch::new(
        fake_sbatch(tmp.path(), "echo 'Submitted batch job 445566 on cluster cedar'"),
        Duration::from_secs(10),
    );

    let job_id = sbatch.submit(&job_script(tmp.path()), None).unwrap();
    assert_eq!(job_id.as_str(), "445566");
}

#[test]
fn test_non_zero_exit_is_an_error_even_with_digits() {
    let tmp = TempDir::new().unwrap();
    let sbatch = Sbatch::new(
        fake_sbatch(tmp.path(), "echo 'Submitted batch job 445566'\necho 'sbatch: error: invalid account' >&2\nexit 1"),
        Duration::from_secs(10),
    );

    let err = sbatch.submit(&job_script(tmp.path()), None).unwrap_err();

    match err {
        SubmissionError::Rejected { code, stdout, stderr, command } => {
            assert_eq!(code, Some(1));
            assert!(stdout.contains("445566"));
            assert!(stderr.contains("invalid account"));
            assert!(command.to_string().ends_with("script_job.sh"));
        }
        other => panic!("unexpected error {other}"),
    }
}

#[test]
fn test_zero_exit_without_job_id() {
    let tmp = TempDir::new().unwrap();
    let sbatch = Sbatch::new(fake_sbatch(tmp.path(), "echo 'queued, probably'"), Duration::from_secs(10));

    let err = sbatch.submit(&job_script(tmp.path()), None).unwrap_err();
    assert!(matches!(err, SubmissionError::Unparsable { ref stdout, .. } if stdout.contains("queued")));
}

#[test]
fn test_hung_sbatch_times_out() {
    let tmp = TempDir::new().unwrap();
    let sbatch = Sbatch::new(
        fake_sbatch(tmp.path(), "echo 'Submitted batch job 9'\necho 'sbatch: waiting for controller' >&2\nexec sleep 30"),
        Duration::from_millis(300),
    );

    let start = Instant::now();
    let err = sbatch.submit(&job_script(tmp.path()), None).unwrap_err();

    assert!(start.elapsed() < Duration::from_secs(10));
    match &err {
        SubmissionError::TimedOut { stdout, stderr, .. } => {
            assert!(stdout.contains("Submitted batch job 9"));
            assert!(stderr.contains("waiting for controller"));
        }
        other => panic!("unexpected error {other}"),
    }
    assert!(err.to_string().contains("Submitted batch job 9"));
}

#[test]
fn test_background_child_does_not_block_submission() {
    let tmp = TempDir::new().unwrap();
    let sbatch = Sbatch::new(
        fake_sbatch(tmp.path(), "sleep 5 &\necho 'Submitted batch job 7'"),
        Duration::from_millis(300),
    );

    let start = Instant::now();
    let job_id = sbatch.submit(&job_script(tmp.path()), None).unwrap();

    assert_eq!(job_id.as_str(), "7");
    assert!(start.elapsed() < Duration::from_secs(3));
}

#[test]
fn test_missing_sbatch_binary() {
    let tmp = TempDir::new().unwrap();
    let sbatch = Sbatch::new(tmp.path().join("no-such-sbatch"), Duration::from_secs(1));

    let err = sbatch.submit(&job_script(tmp.path()), None).unwrap_err();
    assert!(matches!(err, SubmissionError::Spawn { .. }));
}
