//! External process supervision.
//!
//! Wraps one spawned tool (ffmpeg/ffprobe) behind a shared handle that
//! supports concurrent polling, waiting and killing. Both output pipes are
//! pumped continuously on their own threads; leaving either pipe undrained
//! lets the child block once the OS buffer (~64KB) fills up, which in turn
//! deadlocks anyone waiting on the other pipe.
//!
//! Completion is detected by a dedicated reaper thread that polls the child
//! at [`EXIT_POLL_INTERVAL`] and publishes the status through a condvar, so
//! callers of [`ToolProcess::wait`] block instead of sleep-polling
//! themselves. A concurrent [`ToolProcess::kill`] unblocks `wait` within one
//! poll interval.

use std::io::{self, Read};
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, warn};

/// How often the reaper thread checks the child for completion.
pub const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(25);

const PUMP_BUF_SIZE: usize = 8192;

/// Launch failure. A non-zero *exit* status is not a `SpawnError`; that is
/// reported through the [`ExitStatus`] returned by `wait`.
#[derive(Debug, thiserror::Error)]
pub enum SpawnError {
    #[error("executable not found: {0}")]
    NotFound(String),
    #[error("failed to launch {program}: {source}")]
    Launch {
        program: String,
        #[source]
        source: io::Error,
    },
}

/// Handle to one running external tool.
///
/// Created via [`ToolProcess::spawn`] and owned as an `Arc` by the caller;
/// a `Weak` copy may be parked in the cancellation slot so an interrupt
/// handler can reach the process without owning it (see [`crate::cancel`]).
/// Dropping the handle never terminates a still-running child; termination
/// only happens via [`kill`](Self::kill) or natural exit.
pub struct ToolProcess {
    child: Mutex<Child>,
    status: Mutex<Option<ExitStatus>>,
    exited: Condvar,
    pumps: Mutex<Vec<JoinHandle<()>>>,
}

impl ToolProcess {
    /// Spawn `cmd` and start streaming its output.
    ///
    /// `working_dir == None` runs the tool in the current directory.
    /// `on_stdout` / `on_stderr` receive raw byte chunks as they arrive,
    /// on pump threads that run concurrently with the caller; they are never
    /// batched until process exit.
    pub fn spawn(
        mut cmd: Command,
        working_dir: Option<&Path>,
        on_stdout: impl FnMut(&[u8]) + Send + 'static,
        on_stderr: impl FnMut(&[u8]) + Send + 'static,
    ) -> Result<Arc<Self>, SpawnError> {
        let program = cmd.get_program().to_string_lossy().into_owned();
        if let Some(dir) = working_dir {
            cmd.current_dir(dir);
        }
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        debug!(command = ?cmd, "spawning external tool");

        let mut child = cmd.spawn().map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                SpawnError::NotFound(program.clone())
            } else {
                SpawnError::Launch {
                    program: program.clone(),
                    source: e,
                }
            }
        })?;

        let stdout = take_pipe(child.stdout.take(), &program, "stdout")?;
        let stderr = take_pipe(child.stderr.take(), &program, "stderr")?;

        let proc = Arc::new(Self {
            child: Mutex::new(child),
            status: Mutex::new(None),
            exited: Condvar::new(),
            pumps: Mutex::new(Vec::with_capacity(2)),
        });

        {
            let mut pumps = lock_unpoisoned(&proc.pumps);
            pumps.push(thread::spawn(pump(stdout, on_stdout)));
            pumps.push(thread::spawn(pump(stderr, on_stderr)));
        }

        let reaper = Arc::clone(&proc);
        thread::spawn(move || reaper.reap());

        Ok(proc)
    }

    /// Non-blocking poll for the exit status. Returns immediately whether or
    /// not the process has finished.
    pub fn try_exit_status(&self) -> Option<ExitStatus> {
        *lock_unpoisoned(&self.status)
    }

    /// Block until the process has exited and every output chunk has been
    /// delivered to the callbacks, then return the exit status.
    pub fn wait(&self) -> ExitStatus {
        let status = {
            let mut guard = lock_unpoisoned(&self.status);
            loop {
                match *guard {
                    Some(status) => break status,
                    None => {
                        guard = self
                            .exited
                            .wait(guard)
                            .unwrap_or_else(PoisonError::into_inner);
                    }
                }
            }
        };
        // Pipes hit EOF once the child is gone, so these joins are quick.
        let pumps = std::mem::take(&mut *lock_unpoisoned(&self.pumps));
        for pump in pumps {
            let _ = pump.join();
        }
        status
    }

    /// Request immediate termination. No-op once the process has exited;
    /// safe to call from another thread while someone polls or waits on the
    /// same handle.
    pub fn kill(&self) {
        if self.try_exit_status().is_some() {
            return;
        }
        let mut child = lock_unpoisoned(&self.child);
        if let Err(e) = child.kill() {
            // Already gone between the status check and the kill.
            debug!(error = %e, "kill on exited process ignored");
        }
    }

    /// Reaper loop: poll the child until it exits, publish the status, wake
    /// waiters. The child lock is only held for the duration of one
    /// `try_wait`, never across the sleep, so `kill` is never starved.
    fn reap(&self) {
        loop {
            let polled = lock_unpoisoned(&self.child).try_wait();
            match polled {
                Ok(Some(status)) => {
                    *lock_unpoisoned(&self.status) = Some(status);
                    self.exited.notify_all();
                    debug!(code = ?status.code(), "external tool exited");
                    return;
                }
                Ok(None) => thread::sleep(EXIT_POLL_INTERVAL),
                Err(e) => {
                    warn!(error = %e, "failed to poll external tool, retrying");
                    thread::sleep(EXIT_POLL_INTERVAL);
                }
            }
        }
    }
}

fn take_pipe<T>(pipe: Option<T>, program: &str, name: &str) -> Result<T, SpawnError> {
    pipe.ok_or_else(|| SpawnError::Launch {
        program: program.to_string(),
        source: io::Error::other(format!("{name} not captured")),
    })
}

fn pump<R: Read + Send + 'static>(
    mut reader: R,
    mut callback: impl FnMut(&[u8]) + Send + 'static,
) -> impl FnOnce() + Send + 'static {
    move || {
        let mut buf = [0u8; PUMP_BUF_SIZE];
        loop {
            match reader.read(&mut buf) {
                Ok(0) => return,
                Ok(n) => callback(&buf[..n]),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(_) => return,
            }
        }
    }
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Instant;

    fn sh(script: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(script);
        cmd
    }

    fn collector() -> (Arc<Mutex<Vec<u8>>>, impl FnMut(&[u8]) + Send + 'static) {
        let buf = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&buf);
        (buf, move |chunk: &[u8]| {
            sink.lock().unwrap().extend_from_slice(chunk)
        })
    }

    #[test]
    fn spawn_streams_stdout_and_reports_exit_code() {
        let (out, on_out) = collector();
        let proc = ToolProcess::spawn(sh("printf hello; exit 7"), None, on_out, |_| {})
            .expect("spawn sh");

        let status = proc.wait();
        assert_eq!(status.code(), Some(7));
        assert_eq!(out.lock().unwrap().as_slice(), b"hello");
    }

    #[test]
    fn stderr_is_delivered_separately() {
        let (out, on_out) = collector();
        let (err, on_err) = collector();
        let proc = ToolProcess::spawn(sh("printf o; printf e >&2"), None, on_out, on_err)
            .expect("spawn sh");

        assert!(proc.wait().success());
        assert_eq!(out.lock().unwrap().as_slice(), b"o");
        assert_eq!(err.lock().unwrap().as_slice(), b"e");
    }

    #[test]
    fn missing_executable_is_a_spawn_error_not_an_exit_status() {
        let cmd = Command::new("definitely-not-a-real-tool-4471");
        let result = ToolProcess::spawn(cmd, None, |_| {}, |_| {});
        match result {
            Err(SpawnError::NotFound(program)) => {
                assert!(program.contains("definitely-not-a-real-tool"))
            }
            other => panic!("expected NotFound, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn try_exit_status_never_blocks() {
        let proc = ToolProcess::spawn(sh("sleep 5"), None, |_| {}, |_| {}).expect("spawn sh");

        let started = Instant::now();
        assert!(proc.try_exit_status().is_none());
        assert!(started.elapsed() < Duration::from_secs(1));

        proc.kill();
        let status = proc.wait();
        assert!(!status.success());
        assert!(proc.try_exit_status().is_some());
    }

    #[test]
    fn kill_after_exit_is_a_noop() {
        let proc = ToolProcess::spawn(sh("true"), None, |_| {}, |_| {}).expect("spawn sh");
        let status = proc.wait();
        assert!(status.success());
        // Already exited; must not panic or error.
        proc.kill();
        assert_eq!(proc.try_exit_status(), Some(status));
    }

    #[test]
    fn kill_races_cleanly_with_a_polling_thread() {
        let proc = ToolProcess::spawn(sh("sleep 5"), None, |_| {}, |_| {}).expect("spawn sh");

        let done = Arc::new(AtomicBool::new(false));
        let poller = {
            let proc = Arc::clone(&proc);
            let done = Arc::clone(&done);
            thread::spawn(move || {
                while !done.load(Ordering::Relaxed) {
                    let _ = proc.try_exit_status();
                    thread::sleep(Duration::from_millis(1));
                }
            })
        };

        thread::sleep(Duration::from_millis(50));
        proc.kill();
        let status = proc.wait();
        assert!(!status.success());

        done.store(true, Ordering::Relaxed);
        poller.join().expect("poller thread");
    }

    #[test]
    fn working_dir_is_applied() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (out, on_out) = collector();
        let proc = ToolProcess::spawn(sh("pwd"), Some(dir.path()), on_out, |_| {})
            .expect("spawn sh");
        assert!(proc.wait().success());

        let printed = String::from_utf8(out.lock().unwrap().clone()).expect("utf8 pwd");
        let canonical = dir.path().canonicalize().expect("canonicalize");
        assert_eq!(
            Path::new(printed.trim_end()).canonicalize().expect("canonicalize"),
            canonical
        );
    }
}
