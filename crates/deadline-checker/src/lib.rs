//! Feasibility check of task deadlines
//!
//! This crate decides whether the task of a schedule that is currently active
//! can meet its deadline in the process model, and if not, by how much its
//! deadline has to be delayed. The entry point is the
//! [`orchestrator::ScheduleChecker`].
//!
//! The check runs in stages:
//! - [`model`]: the model of the task is assembled from its deadline
//!   specification, the plant state and auxiliary metadata files,
//! - [`bmc`]: bounded model checking approximates the earliest completion,
//! - [`full_mc`]: full model checking decides feasibility exactly and searches
//!   for the delay of infeasible tasks.
//!
//! All results are written to an output directory, see [`artifacts`].

use core::{error, fmt};
use std::{io, path::PathBuf};

use deadline_combine::CombineError;
use deadline_schedule::{ScheduleParseError, Task, ValidationError};
use deadline_smv::SolverError;

use crate::model::MetadataError;

pub mod artifacts;
pub mod bmc;
pub mod full_mc;
pub mod model;
pub mod options;
pub mod orchestrator;

pub use options::{BmcOptions, CheckerOptions, DebugArg};
pub use orchestrator::{FeasibilityVerdict, ScheduleChecker};

/// Error that can occur during a feasibility check
#[derive(Debug)]
pub enum CheckerError {
    /// Schedule or state file could not be read
    Input {
        /// File that could not be read
        path: PathBuf,
        /// Underlying error
        source: ScheduleParseError,
    },
    /// A derived schedule violates an invariant
    Validation(ValidationError),
    /// Metadata file could not be read
    Metadata {
        /// Metadata file
        path: PathBuf,
        /// Underlying error
        source: MetadataError,
    },
    /// Error of the model checker
    Solver(SolverError),
    /// Error while combining the model
    Combine(CombineError),
    /// An output file could not be written
    Artifact {
        /// File that could not be written
        path: PathBuf,
        /// Underlying error
        source: io::Error,
    },
    /// The deadline specification contains no target for the task
    MissingTarget(Task),
}

impl fmt::Display for CheckerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckerError::Input { path, source } => {
                write!(f, "Failed to read '{}': {source}", path.display())
            }
            CheckerError::Validation(e) => write!(f, "Invalid schedule: {e}"),
            CheckerError::Metadata { path, source } => {
                write!(f, "Failed to read metadata '{}': {source}", path.display())
            }
            CheckerError::Solver(e) => write!(f, "{e}"),
            CheckerError::Combine(e) => write!(f, "Failed to combine model: {e}"),
            CheckerError::Artifact { path, source } => {
                write!(f, "Failed to write '{}': {source}", path.display())
            }
            CheckerError::MissingTarget(task) => {
                write!(f, "No deadline specification generated for task {task}")
            }
        }
    }
}

impl error::Error for CheckerError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            CheckerError::Input { source, .. } => Some(source),
            CheckerError::Validation(e) => Some(e),
            CheckerError::Metadata { source, .. } => Some(source),
            CheckerError::Solver(e) => Some(e),
            CheckerError::Combine(e) => Some(e),
            CheckerError::Artifact { source, .. } => Some(source),
            CheckerError::MissingTarget(_) => None,
        }
    }
}

impl From<ValidationError> for CheckerError {
    fn from(e: ValidationError) -> Self {
        CheckerError::Validation(e)
    }
}

impl From<SolverError> for CheckerError {
    fn from(e: SolverError) -> Self {
        CheckerError::Solver(e)
    }
}

impl From<CombineError> for CheckerError {
    fn from(e: CombineError) -> Self {
        CheckerError::Combine(e)
    }
}
