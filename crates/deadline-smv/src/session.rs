//! Persistent interactive session with the model checker
//!
//! The full model checking search asks many reachability questions about the
//! same model. Instead of starting a new solver for every question, a single
//! solver process is started in interactive mode, the model is built once
//! (`go`), and every question is sent as a `check_ctlspec` command over stdin.
//!
//! The end of the answer to a command is detected by sending an `echo` of a
//! unique marker right after it. Everything printed before the marker belongs
//! to the answer.

use std::{
    io::{BufRead, BufReader, Write},
    path::Path,
    process::{ChildStdin, ChildStdout, Command, Stdio},
    thread,
    time::{Duration, Instant},
};

use log::{debug, trace, warn};

use crate::{
    PathOracle, SolverCfg, SolverError,
    output::{PROVEN, REFUTED},
    process::ScopedChild,
};

/// Time the solver gets to exit after `quit` before it is killed
const QUIT_GRACE_PERIOD: Duration = Duration::from_secs(1);

/// Prefix of the markers delimiting the answers of the solver
const MARKER_PREFIX: &str = "__deadline_answer_";

/// Interactive session with a model checker process
///
/// The process is terminated when the session is dropped.
#[derive(Debug)]
pub struct SmvSession {
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    prompt: String,
    n_commands: usize,
    // declared last so the pipes are closed before the child is reaped
    child: ScopedChild,
}

impl SmvSession {
    /// Start the solver in interactive mode on `model` and build the model
    pub fn open(cfg: &SolverCfg, model: &Path) -> Result<Self, SolverError> {
        debug!(
            "Starting interactive session of '{}' on model {}",
            cfg.command(),
            model.display()
        );

        let child = Command::new(cfg.command())
            .args(cfg.args())
            .arg("-int")
            .arg(model)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| SolverError::Spawn {
                command: cfg.command().to_string(),
                source,
            })?;
        let mut child = ScopedChild::new(child);

        let stdin = child
            .child_mut()
            .stdin
            .take()
            .ok_or(SolverError::ChannelClosed)?;
        let stdout = child
            .child_mut()
            .stdout
            .take()
            .ok_or(SolverError::ChannelClosed)?;

        let mut session = Self {
            stdin,
            stdout: BufReader::new(stdout),
            prompt: cfg.prompt().to_string(),
            n_commands: 0,
            child,
        };

        let answer = session.execute("go")?;
        for line in answer.iter() {
            trace!("go: {line}");
        }

        Ok(session)
    }

    /// Send a command and collect the lines of its answer
    pub fn execute(&mut self, command: &str) -> Result<Vec<String>, SolverError> {
        self.n_commands += 1;
        let marker = format!("{MARKER_PREFIX}{}__", self.n_commands);
        trace!("Sending command to solver: {command}");

        writeln!(self.stdin, "{command}").map_err(|_| SolverError::ChannelClosed)?;
        writeln!(self.stdin, "echo {marker}").map_err(|_| SolverError::ChannelClosed)?;
        self.stdin.flush().map_err(|_| SolverError::ChannelClosed)?;

        let mut answer = Vec::new();
        loop {
            let mut line = String::new();
            if self.stdout.read_line(&mut line)? == 0 {
                return Err(SolverError::ChannelClosed);
            }

            let line = strip_prompt(&line, &self.prompt).trim_end();
            if line.contains(&marker) {
                break;
            }
            answer.push(line.to_string());
        }

        Ok(answer)
    }
}

impl PathOracle for SmvSession {
    fn get_path(&mut self, target: &str) -> Result<Option<String>, SolverError> {
        let answer = self.execute(&format!("check_ctlspec -p \"AG !({target})\""))?;
        classify_answer(&answer)
    }
}

impl Drop for SmvSession {
    fn drop(&mut self) {
        if writeln!(self.stdin, "quit")
            .and_then(|_| self.stdin.flush())
            .is_err()
        {
            trace!("Solver closed its input before quit");
        }

        let start = Instant::now();
        while start.elapsed() < QUIT_GRACE_PERIOD {
            match self.child.try_wait() {
                Ok(Some(_)) => return,
                Ok(None) => thread::sleep(Duration::from_millis(10)),
                Err(e) => {
                    warn!("Failed to query state of solver process: {e}");
                    break;
                }
            }
        }
        debug!("Solver did not quit in time, killing it");
        // `ScopedChild` kills and reaps the process when the session is dropped
    }
}

/// Remove all leading occurrences of the interactive prompt from `line`
fn strip_prompt<'a>(line: &'a str, prompt: &str) -> &'a str {
    if prompt.is_empty() {
        return line;
    }
    let mut rest = line;
    while let Some(stripped) = rest.strip_prefix(prompt) {
        rest = stripped;
    }
    rest
}

/// Interpret the answer to a `check_ctlspec` command
///
/// A refuted `AG !(target)` comes with a path into the target, which is
/// returned. A proven one means the target is unreachable.
fn classify_answer(answer: &[String]) -> Result<Option<String>, SolverError> {
    if let Some(pos) = answer.iter().position(|l| l.contains(REFUTED)) {
        let path = answer[pos + 1..].join("\n");
        return Ok(Some(path));
    }

    if answer.iter().any(|l| l.contains(PROVEN)) {
        return Ok(None);
    }

    Err(SolverError::UnexpectedOutput(answer.join("\n")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(s: &str) -> Vec<String> {
        s.lines().map(|l| l.to_string()).collect()
    }

    #[test]
    fn test_strip_prompt() {
        assert_eq!(strip_prompt("NuSMV > NuSMV > foo", "NuSMV > "), "foo");
        assert_eq!(strip_prompt("  -> State: 1.1 <-", "NuSMV > "), "  -> State: 1.1 <-");
        assert_eq!(strip_prompt("foo", ""), "foo");
    }

    #[test]
    fn test_classify_refuted() {
        let answer = lines(
            "-- specification AG !((COUNT_U1_t1 = 1) & (time <= 50))  is false\n\
             -- as demonstrated by the following execution sequence\n\
             Trace Description: CTL Counterexample\n\
             \x20 -> State: 1.1 <-\n\
             \x20   time = 50",
        );

        let path = classify_answer(&answer).unwrap().unwrap();
        assert!(path.starts_with("-- as demonstrated"));
        assert!(path.ends_with("time = 50"));
    }

    #[test]
    fn test_classify_proven() {
        let answer = lines("-- specification AG !((COUNT_U1_t1 = 1) & (time <= 50))  is true");
        assert_eq!(classify_answer(&answer).unwrap(), None);
    }

    #[test]
    fn test_classify_garbage() {
        let answer = lines("ERROR: undefined identifier COUNT_U1_t1");
        assert!(matches!(
            classify_answer(&answer),
            Err(SolverError::UnexpectedOutput(_))
        ));
    }
}
