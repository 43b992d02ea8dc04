use std::io::{self, Read};
use std::process::{Child, ChildStderr, Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};

use super::CancelToken;

const POLL_INTERVAL: Duration = Duration::from_millis(20);
const STDERR_KEEP_BYTES: u64 = 16 * 1024;

#[derive(Debug, Clone, Copy)]
pub struct ChildLimits {
    pub timeout: Duration,
    pub cancel_grace: Duration,
}

/// Runs `command` to completion as a separate process, killing it when it
/// exceeds `limits.timeout`, or when the job was cancelled and the grace
/// period has run out. Stderr is drained while the child runs so a chatty
/// child never stalls on a full pipe.
pub fn run_bounded(
    mut command: Command,
    label: &str,
    limits: ChildLimits,
    cancel: &CancelToken,
) -> Result<()> {
    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .with_context(|| format!("failed to execute {label}"))?;
    let stderr = child.stderr.take().map(drain_stderr);

    let started = Instant::now();
    let mut cancelled_at: Option<Instant> = None;

    loop {
        let status = child
            .try_wait()
            .with_context(|| format!("failed to wait on {label}"))?;

        if let Some(status) = status {
            let stderr = collect_stderr(stderr);
            if !status.success() {
                bail!(
                    "{} returned non-zero exit status {}: {}",
                    label,
                    status,
                    stderr.trim()
                );
            }
            return Ok(());
        }

        if started.elapsed() > limits.timeout {
            terminate(&mut child);
            bail!(
                "{} timed out after {} ms",
                label,
                limits.timeout.as_millis()
            );
        }

        if cancel.is_cancelled() {
            let since = *cancelled_at.get_or_insert_with(Instant::now);
            if since.elapsed() > limits.cancel_grace {
                terminate(&mut child);
                bail!("{} terminated after job cancellation", label);
            }
        }

        thread::sleep(POLL_INTERVAL);
    }
}

fn terminate(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

fn drain_stderr(mut pipe: ChildStderr) -> JoinHandle<String> {
    thread::spawn(move || {
        let mut kept = Vec::new();
        let _ = (&mut pipe).take(STDERR_KEEP_BYTES).read_to_end(&mut kept);
        let _ = io::copy(&mut pipe, &mut io::sink());
        String::from_utf8_lossy(&kept).into_owned()
    })
}

fn collect_stderr(reader: Option<JoinHandle<String>>) -> String {
    reader
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default()
}
