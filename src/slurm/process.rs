use std::io::{self, Read};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use log::warn;

use crate::slurm::CommandLine;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// How long the pipes may stay open once the child is gone
const DRAIN_GRACE: Duration = Duration::from_millis(500);

pub(crate) enum Outcome {
    Exited { status: ExitStatus, stdout: String, stderr: String },
    TimedOut { stdout: String, stderr: String },
}

type Buffer = Arc<Mutex<Vec<u8>>>;

/// Run `command` to completion, killing it once `timeout` has passed
///
/// Both pipes are drained on their own threads so a chatty child can't fill a pipe and stall.
/// Once the child has exited or been killed, the readers get [DRAIN_GRACE] to reach end of file.
/// A grandchild that keeps a pipe open past that is left behind and whatever was read so far is
/// returned, so the call never outlives `timeout` by more than the grace period.
pub(crate) fn run(command: &CommandLine, timeout: Duration) -> io::Result<Outcome> {
    let mut child = Command::new(&command.program)
        .args(&command.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    let (done, finished) = mpsc::channel();
    let stdout = drain(child.stdout.take(), "stdout", done.clone());
    let stderr = drain(child.stderr.take(), "stderr", done);

    let start = Instant::now();
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break Some(status),
            Ok(None) if start.elapsed() >= timeout => {
                warn!("`{command}` still running after {timeout:?}, killing it");
                stop(&mut child, command);
                break None;
            }
            Ok(None) => thread::sleep(POLL_INTERVAL),
            Err(e) => {
                warn!("Can't poll `{command}`: {e}");
                stop(&mut child, command);
                return Err(e);
            }
        }
    };

    settle(&finished, command);
    let stdout = snapshot(&stdout);
    let stderr = snapshot(&stderr);

    Ok(match status {
        Some(status) => Outcome::Exited { status, stdout, stderr },
        None => Outcome::TimedOut { stdout, stderr },
    })
}

fn stop(child: &mut Child, command: &CommandLine) {
    if let Err(e) = child.kill() {
        warn!("Can't kill `{command}`: {e}");
    }
    if let Err(e) = child.wait() {
        warn!("Can't reap `{command}`: {e}");
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>, name: &'static str, done: Sender<()>) -> Buffer {
    let buffer = Buffer::default();
    let shared = Arc::clone(&buffer);
    thread::spawn(move || {
        if let Some(mut pipe) = pipe {
            let mut chunk = [0u8; 4096];
            loop {
                match pipe.read(&mut chunk) {
                    Ok(0) => break,
                    Ok(n) => shared.lock().unwrap_or_else(PoisonError::into_inner).extend_from_slice(&chunk[..n]),
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        warn!("Reading {name} failed: {e}");
                        break;
                    }
                }
            }
        }
        // the receiver is gone if run() already gave up waiting
        let _ = done.send(());
    });
    buffer
}

/// Wait for both readers to hit end of file, but no longer than [DRAIN_GRACE]
fn settle(finished: &Receiver<()>, command: &CommandLine) {
    let deadline = Instant::now() + DRAIN_GRACE;
    for _ in 0..2 {
        let left = deadline.saturating_duration_since(Instant::now());
        if finished.recv_timeout(left).is_err() {
            warn!("Output of `{command}` still open {DRAIN_GRACE:?} after it ended, keeping what was read");
            return;
        }
    }
}

fn snapshot(buffer: &Buffer) -> String {
    let bytes = buffer.lock().unwrap_or_else(PoisonError::into_inner);
    String::from_utf8_lossy(&bytes).into_owned()
}
