//! Execution of external processes under a wall clock timeout
//!
//! The output of the child (stdout and stderr interleaved) is written into an
//! anonymous scratch file instead of a pipe, so a child producing a lot of
//! output can never block on a full pipe buffer while we are polling it.
//!
//! The child is wrapped in a [`ScopedChild`] which kills and reaps the process
//! if it is still running when the handle goes out of scope. Together with the
//! scratch file, which is removed by the operating system once its last handle
//! is closed, no resources outlive a call to [`run_with_timeout`], whatever
//! path the call returns on.

use std::{
    ffi::OsStr,
    fs::File,
    io::{Read, Seek, SeekFrom},
    process::{Child, Command, ExitStatus, Stdio},
    thread,
    time::{Duration, Instant},
};

use log::{debug, trace, warn};

use crate::SolverError;

/// Interval in which the liveness of the child is polled
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Result of a process run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutcome {
    output: Vec<u8>,
    elapsed: Option<Duration>,
}

impl ProcessOutcome {
    /// Create a new outcome
    pub fn new(output: Vec<u8>, elapsed: Option<Duration>) -> Self {
        Self { output, elapsed }
    }

    /// Captured output (stdout and stderr)
    pub fn output(&self) -> &[u8] {
        &self.output
    }

    /// Captured output decoded as UTF-8, invalid sequences replaced
    pub fn output_lossy(&self) -> String {
        String::from_utf8_lossy(&self.output).into_owned()
    }

    /// Wall clock time until the process exited
    ///
    /// `None` if the process was killed because it exceeded the timeout. The
    /// output of a timed out run is incomplete and must not be trusted.
    pub fn elapsed(&self) -> Option<Duration> {
        self.elapsed
    }

    /// Check whether the process was killed because of the timeout
    pub fn timed_out(&self) -> bool {
        self.elapsed.is_none()
    }
}

/// Child process that is killed and reaped when dropped
#[derive(Debug)]
pub struct ScopedChild {
    child: Child,
    reaped: bool,
}

impl ScopedChild {
    /// Take ownership of `child`
    pub fn new(child: Child) -> Self {
        Self {
            child,
            reaped: false,
        }
    }

    /// Operating system id of the child
    pub fn id(&self) -> u32 {
        self.child.id()
    }

    /// Check whether the child has exited, without blocking
    pub fn try_wait(&mut self) -> Result<Option<ExitStatus>, SolverError> {
        let status = self.child.try_wait()?;
        if status.is_some() {
            self.reaped = true;
        }
        Ok(status)
    }

    /// Kill the child and wait until it has been reaped
    pub fn terminate(&mut self) -> Result<(), SolverError> {
        if self.reaped {
            return Ok(());
        }
        // killing an already exited child fails with `InvalidInput`, waiting
        // still reaps it
        if let Err(e) = self.child.kill() {
            trace!("Failed to kill process {}: {e}", self.child.id());
        }
        self.child.wait()?;
        self.reaped = true;
        Ok(())
    }

    /// Mutable access to the wrapped child, e.g. to take its pipes
    pub fn child_mut(&mut self) -> &mut Child {
        &mut self.child
    }
}

impl Drop for ScopedChild {
    fn drop(&mut self) {
        if let Err(e) = self.terminate() {
            warn!("Failed to reap child process {}: {e}", self.child.id());
        }
    }
}

/// Run `command` and kill it if it takes longer than `timeout`
///
/// The first element of `command` is the program, the remaining elements are
/// its arguments. See [`run_with_timeout_polling`] for details.
pub fn run_with_timeout<S: AsRef<OsStr>>(
    command: &[S],
    timeout: Duration,
) -> Result<ProcessOutcome, SolverError> {
    run_with_timeout_polling(command, timeout, DEFAULT_POLL_INTERVAL)
}

/// Run `command`, polling for its termination every `poll_interval`, and kill
/// it if it takes longer than `timeout`
///
/// Returns the captured output together with the elapsed wall clock time, or
/// with `None` as elapsed time if the process had to be killed. The call
/// returns at the latest one poll interval after the timeout expired.
pub fn run_with_timeout_polling<S: AsRef<OsStr>>(
    command: &[S],
    timeout: Duration,
    poll_interval: Duration,
) -> Result<ProcessOutcome, SolverError> {
    let (program, args) = command.split_first().ok_or(SolverError::EmptyCommand)?;
    let program_name = program.as_ref().to_string_lossy().to_string();

    let mut scratch = tempfile::tempfile()?;
    let stdout: File = scratch.try_clone()?;
    let stderr: File = scratch.try_clone()?;

    let start = Instant::now();
    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(stdout)
        .stderr(stderr)
        .spawn()
        .map_err(|source| SolverError::Spawn {
            command: program_name.clone(),
            source,
        })?;
    let mut child = ScopedChild::new(child);
    debug!(
        "Started '{program_name}' (pid {}) with timeout {:.1}s",
        child.id(),
        timeout.as_secs_f64()
    );

    let elapsed = loop {
        if child.try_wait()?.is_some() {
            break Some(start.elapsed());
        }

        let running_for = start.elapsed();
        if running_for >= timeout {
            child.terminate()?;
            debug!(
                "Killed '{program_name}' after {:.1}s: timeout exceeded",
                running_for.as_secs_f64()
            );
            break None;
        }

        thread::sleep(poll_interval.min(timeout - running_for));
    };

    let mut output = Vec::new();
    scratch.seek(SeekFrom::Start(0))?;
    scratch.read_to_end(&mut output)?;

    if let Some(elapsed) = elapsed {
        trace!(
            "'{program_name}' finished after {:.3}s with {} bytes of output",
            elapsed.as_secs_f64(),
            output.len()
        );
    }

    Ok(ProcessOutcome::new(output, elapsed))
}
