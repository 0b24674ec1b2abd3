//! Interface to SMV model checkers
//!
//! DEADLINE does not implement model checking itself. Instead it drives an
//! external model checker of the SMV family (e.g. NuSMV or nuXmv) in two ways:
//!
//! - as a one-shot process in bounded model checking mode, killed if it
//!   exceeds a timeout (see [`process`] and [`SmvBackend::run_bmc`]),
//! - as a persistent interactive session that answers reachability queries
//!   on a fixed model (see [`session`] and [`PathOracle`]).
//!
//! The traits [`SmvBackend`] and [`PathOracle`] decouple the search algorithms
//! from the concrete solver, [`SmvSolver`] is the implementation backed by a
//! real solver executable.

use core::{error, fmt};
use std::{
    ffi::OsString,
    io,
    path::Path,
    time::Duration,
};

use log::trace;

#[cfg(feature = "config_deserialize")]
use serde::Deserialize;

pub mod output;
pub mod process;
pub mod session;

pub use process::{ProcessOutcome, run_with_timeout, run_with_timeout_polling};
pub use session::SmvSession;

/// NuSMV command
pub const NUSMV_PRG: &str = "NuSMV";

/// Prompt printed by NuSMV in interactive mode
pub const NUSMV_PROMPT: &str = "NuSMV > ";

/// Default bound of bounded model checking runs
pub const DEFAULT_BMC_LENGTH: u32 = 100;

/// Configuration of the model checker executable
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "config_deserialize", derive(Deserialize))]
pub struct SolverCfg {
    /// Command to start the model checker
    command: String,
    /// Arguments passed to the model checker before the mode options
    #[cfg_attr(feature = "config_deserialize", serde(default))]
    args: Vec<String>,
    /// Prompt printed by the model checker in interactive mode
    #[cfg_attr(feature = "config_deserialize", serde(default = "default_prompt"))]
    prompt: String,
}

#[cfg(feature = "config_deserialize")]
fn default_prompt() -> String {
    NUSMV_PROMPT.to_string()
}

impl SolverCfg {
    /// Create a new solver configuration
    pub fn new(command: String, args: Vec<String>, prompt: String) -> Self {
        Self {
            command,
            args,
            prompt,
        }
    }

    /// Default configuration for NuSMV found on the `PATH`
    pub fn new_nusmv() -> Self {
        Self::new(NUSMV_PRG.to_string(), vec![], NUSMV_PROMPT.to_string())
    }

    /// Command to start the model checker
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Additional arguments for the model checker
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Interactive prompt of the model checker
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    /// Replace the command to start the model checker
    pub fn set_command(&mut self, command: String) {
        self.command = command;
    }

    /// Replace the additional arguments of the model checker
    pub fn set_args(&mut self, args: Vec<String>) {
        self.args = args;
    }
}

impl Default for SolverCfg {
    fn default() -> Self {
        Self::new_nusmv()
    }
}

/// Error that can occur while interacting with the model checker
#[derive(Debug)]
pub enum SolverError {
    /// No program to execute was given
    EmptyCommand,
    /// The model checker could not be started
    Spawn {
        /// Program that was started
        command: String,
        /// Underlying error
        source: io::Error,
    },
    /// Error while reading or writing the output of the model checker
    Io(io::Error),
    /// The model checker closed the connection of an interactive session
    ChannelClosed,
    /// The model checker answered in an unexpected way
    UnexpectedOutput(String),
}

impl fmt::Display for SolverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SolverError::EmptyCommand => write!(f, "No model checker command given"),
            SolverError::Spawn { command, source } => write!(
                f,
                "Failed to start model checker '{command}': {source}. Is it installed?"
            ),
            SolverError::Io(e) => write!(f, "I/O error while running the model checker: {e}"),
            SolverError::ChannelClosed => {
                write!(f, "The model checker closed the interactive session")
            }
            SolverError::UnexpectedOutput(out) => {
                write!(f, "Unexpected answer from the model checker: {out}")
            }
        }
    }
}

impl error::Error for SolverError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            SolverError::Spawn { source, .. } => Some(source),
            SolverError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for SolverError {
    fn from(e: io::Error) -> Self {
        SolverError::Io(e)
    }
}

/// Trait for types that answer reachability queries on a fixed model
pub trait PathOracle {
    /// Search for a path into a state satisfying `target`
    ///
    /// Returns the path as printed by the model checker if one exists and
    /// `None` if `target` is unreachable.
    fn get_path(&mut self, target: &str) -> Result<Option<String>, SolverError>;
}

impl<T: PathOracle + ?Sized> PathOracle for &mut T {
    fn get_path(&mut self, target: &str) -> Result<Option<String>, SolverError> {
        (**self).get_path(target)
    }
}

/// Trait for model checker backends
pub trait SmvBackend {
    /// Interactive session type of the backend
    type Session: PathOracle;

    /// Check the specifications of the model in `model` with bounded model
    /// checking up to `bmc_length` steps, killing the solver after `timeout`
    fn run_bmc(
        &self,
        model: &Path,
        bmc_length: u32,
        timeout: Duration,
    ) -> Result<ProcessOutcome, SolverError>;

    /// Open an interactive session on the model in `model`
    fn open_session(&self, model: &Path) -> Result<Self::Session, SolverError>;
}

/// Model checker backend running a solver executable
#[derive(Debug, Clone, PartialEq)]
pub struct SmvSolver {
    cfg: SolverCfg,
    poll_interval: Duration,
}

impl SmvSolver {
    /// Create a new backend for the configured solver
    pub fn new(cfg: SolverCfg) -> Self {
        Self {
            cfg,
            poll_interval: process::DEFAULT_POLL_INTERVAL,
        }
    }

    /// Set the interval in which running solvers are polled
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Configuration of the solver
    pub fn cfg(&self) -> &SolverCfg {
        &self.cfg
    }

    /// Command line of a bounded model checking run
    pub fn bmc_command(&self, model: &Path, bmc_length: u32) -> Vec<OsString> {
        let mut argv: Vec<OsString> = Vec::with_capacity(self.cfg.args.len() + 5);
        argv.push(self.cfg.command.clone().into());
        argv.extend(self.cfg.args.iter().map(OsString::from));
        argv.push("-bmc".into());
        argv.push("-bmc_length".into());
        argv.push(bmc_length.to_string().into());
        argv.push(model.as_os_str().to_owned());
        argv
    }
}

impl Default for SmvSolver {
    fn default() -> Self {
        Self::new(SolverCfg::default())
    }
}

impl SmvBackend for SmvSolver {
    type Session = SmvSession;

    fn run_bmc(
        &self,
        model: &Path,
        bmc_length: u32,
        timeout: Duration,
    ) -> Result<ProcessOutcome, SolverError> {
        let argv = self.bmc_command(model, bmc_length);
        trace!("Running bounded model checking: {argv:?}");
        run_with_timeout_polling(&argv, timeout, self.poll_interval)
    }

    fn open_session(&self, model: &Path) -> Result<SmvSession, SolverError> {
        SmvSession::open(&self.cfg, model)
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn test_bmc_command() {
        let cfg = SolverCfg::new(
            "nuXmv".to_string(),
            vec!["-dynamic".to_string()],
            "nuXmv > ".to_string(),
        );
        let solver = SmvSolver::new(cfg);

        let argv = solver.bmc_command(&PathBuf::from("out/bmc.smv"), 100);
        assert_eq!(
            argv,
            vec!["nuXmv", "-dynamic", "-bmc", "-bmc_length", "100", "out/bmc.smv"]
                .into_iter()
                .map(OsString::from)
                .collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_default_cfg() {
        let cfg = SolverCfg::default();
        assert_eq!(cfg.command(), NUSMV_PRG);
        assert!(cfg.args().is_empty());
        assert_eq!(cfg.prompt(), NUSMV_PROMPT);
    }

    #[test]
    #[cfg(feature = "config_deserialize")]
    fn test_deserialize_cfg() {
        let cfg: SolverCfg = serde_json::from_str(r#"{"command": "nuXmv"}"#).unwrap();
        assert_eq!(
            cfg,
            SolverCfg::new("nuXmv".to_string(), vec![], NUSMV_PROMPT.to_string())
        );
    }

    #[test]
    fn test_spawn_error_display() {
        let err = SolverError::Spawn {
            command: "NuSMV".to_string(),
            source: io::Error::new(io::ErrorKind::NotFound, "not found"),
        };
        assert_eq!(
            err.to_string(),
            "Failed to start model checker 'NuSMV': not found. Is it installed?"
        );
    }
}
