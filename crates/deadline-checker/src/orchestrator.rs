//! Top level of a feasibility check
//!
//! A check reads a schedule and a plant state, selects the task that is
//! active at the time of the state and decides whether it can meet its
//! deadline:
//!
//! 1. bounded model checking searches for an early completion,
//! 2. if it finds none by the deadline, the task is either declared
//!    infeasible by the timeout heuristic (if enabled) or
//! 3. checked exactly with full model checking, searching for the delay if it
//!    is infeasible.
//!
//! Only the first active task (earliest deadline first) is checked. Callers
//! check the remaining tasks by calling again with a later state.

use std::{fmt, path::Path};

use deadline_schedule::{
    DeadlineSpecBuilder, PlantState, Schedule, Task, TaskCounts, Time, active_positions,
};
use deadline_smv::{SmvBackend, output};
use log::{info, warn};

use crate::{
    CheckerError,
    artifacts::{ArtifactWriter, DelayRecorder},
    bmc::BmcDriver,
    full_mc::{FullMcDriver, FullMcOutcome},
    model::ModelCombiner,
    options::{CheckerOptions, DebugArg},
};

/// How feasibility of a task was established
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeasibilityProof {
    /// Path found by bounded model checking
    Bmc,
    /// Path found by full model checking
    FullMc,
}

/// How infeasibility of a task was established
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfeasibilityProof {
    /// Derived from the adaptive timeout of bounded model checking, not sound
    Heuristic,
    /// Proven by full model checking
    FullMc,
    /// Proven by full model checking, the delay was assumed to be 1
    Assumed,
}

/// Result of a feasibility check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeasibilityVerdict {
    /// No task is active at the time of the plant state
    NoActiveTask,
    /// The task can meet its deadline
    Feasible {
        /// The checked task
        task: Task,
        /// Completion time on the path found, if known
        completion: Option<Time>,
        /// How feasibility was established
        proof: FeasibilityProof,
    },
    /// The task can not meet its deadline
    Infeasible {
        /// The checked task
        task: Task,
        /// Delay of the task, `None` if no deadline within the horizon is
        /// feasible
        delay: Option<Time>,
        /// How infeasibility was established
        proof: InfeasibilityProof,
    },
    /// Bounded model checking was inconclusive and full model checking is
    /// disabled
    Undetermined {
        /// The checked task
        task: Task,
    },
}

impl FeasibilityVerdict {
    /// Check whether the checked task can meet its deadline
    pub fn is_feasible(&self) -> bool {
        matches!(self, FeasibilityVerdict::Feasible { .. })
    }
}

impl fmt::Display for FeasibilityVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeasibilityVerdict::NoActiveTask => write!(f, "no active task"),
            FeasibilityVerdict::Feasible {
                task,
                completion,
                proof,
            } => {
                write!(f, "task {task} is feasible ({proof:?})")?;
                if let Some(t) = completion {
                    write!(f, ", completes at {t}")?;
                }
                Ok(())
            }
            FeasibilityVerdict::Infeasible { task, delay, proof } => {
                write!(f, "task {task} is infeasible ({proof:?})")?;
                match delay {
                    Some(d) => write!(f, ", delay {d}"),
                    None => write!(f, ", no feasible deadline within the horizon"),
                }
            }
            FeasibilityVerdict::Undetermined { task } => {
                write!(f, "feasibility of task {task} is undetermined")
            }
        }
    }
}

/// Checks the feasibility of the active task of a schedule
#[derive(Debug)]
pub struct ScheduleChecker<B: SmvBackend> {
    backend: B,
    combiner: ModelCombiner,
    options: CheckerOptions,
    writer: ArtifactWriter,
}

impl<B: SmvBackend> ScheduleChecker<B> {
    /// Create a checker writing its artifacts to `writer`
    pub fn new(
        backend: B,
        combiner: ModelCombiner,
        options: CheckerOptions,
        writer: ArtifactWriter,
    ) -> Self {
        Self {
            backend,
            combiner,
            options,
            writer,
        }
    }

    /// Output directory of the checker
    pub fn writer(&self) -> &ArtifactWriter {
        &self.writer
    }

    /// Read schedule and state from files and check them
    pub fn check_schedule(
        &self,
        schedule_path: &Path,
        state_path: &Path,
    ) -> Result<FeasibilityVerdict, CheckerError> {
        self.writer.write_path_placeholder()?;

        let schedule = Schedule::from_file(schedule_path).map_err(|source| CheckerError::Input {
            path: schedule_path.to_path_buf(),
            source,
        })?;
        let state = PlantState::from_file(state_path).map_err(|source| CheckerError::Input {
            path: state_path.to_path_buf(),
            source,
        })?;

        self.check_active_task(&schedule, &state)
    }

    /// Check the task of `schedule` that is active in `state`
    pub fn check(
        &self,
        schedule: &Schedule,
        state: &PlantState,
    ) -> Result<FeasibilityVerdict, CheckerError> {
        self.writer.write_path_placeholder()?;
        self.check_active_task(schedule, state)
    }

    fn check_active_task(
        &self,
        schedule: &Schedule,
        state: &PlantState,
    ) -> Result<FeasibilityVerdict, CheckerError> {
        let ordered = schedule.ordered_tasks();
        let active = active_positions(
            &ordered,
            state.time(),
            self.options.key_scheduling_unit.as_deref(),
        );

        let Some(&index) = active.first() else {
            info!("No task active at time {}", state.time());
            return Ok(FeasibilityVerdict::NoActiveTask);
        };
        let task = &ordered[index];
        if active.len() > 1 {
            warn!(
                "{} tasks are active at time {}, only checking {task}",
                active.len(),
                state.time()
            );
        }
        info!("Checking task {task} at time {}", state.time());

        let initial_counts = TaskCounts::from_tasks(&ordered[..index]);

        let sub = schedule.single_task(task)?;
        let spec = DeadlineSpecBuilder::new(initial_counts.clone()).build(&sub);
        let target = spec
            .target_for(task)
            .ok_or_else(|| CheckerError::MissingTarget(task.clone()))?;

        let model = self.combiner.combine(&self.writer, &spec, state, task)?;

        let bmc = BmcDriver::new(&self.backend, &self.writer, &self.options.bmc)
            .search(&model.text, target)?;

        if bmc.meets(task.deadline()) {
            if let Some(cex) = bmc.counterexample.as_ref() {
                self.writer.write_path(cex)?;
            }
            info!("Task {task} meets its deadline (bounded model checking)");
            return Ok(FeasibilityVerdict::Feasible {
                task: task.clone(),
                completion: bmc.final_time,
                proof: FeasibilityProof::Bmc,
            });
        }

        let mut recorder = DelayRecorder::new(&self.writer, schedule, state, task);

        if self.options.trust_bmc_timeout_heuristic
            && bmc.timeout_heuristic_holds(self.options.bmc.timeout_factor)
        {
            if let Some(final_time) = bmc.final_time {
                warn!(
                    "Declaring task {task} infeasible based on the bounded model checking timeout heuristic. This result is NOT sound."
                );
                let delay = recorder.record(final_time - 1)?;
                return Ok(FeasibilityVerdict::Infeasible {
                    task: task.clone(),
                    delay: Some(delay),
                    proof: InfeasibilityProof::Heuristic,
                });
            }
        }

        if !self.options.fallback_to_full_mc {
            info!("Bounded model checking was inconclusive for task {task}, full model checking is disabled");
            return Ok(FeasibilityVerdict::Undetermined { task: task.clone() });
        }

        info!("Bounded model checking was inconclusive for task {task}, running full model checking");
        let session = self.backend.open_session(&model.path)?;
        let outcome = FullMcDriver::new(session, schedule, task, &initial_counts)
            .with_delay_search(!self.options.has_debug_arg(DebugArg::SimpleDelay))
            .run(|lower| recorder.record(lower).map(|_| ()))?;

        let verdict = match outcome {
            FullMcOutcome::Feasible { path } => {
                self.writer.write_path(&output::trace_lines(&path))?;
                FeasibilityVerdict::Feasible {
                    task: task.clone(),
                    completion: output::final_time(&path),
                    proof: FeasibilityProof::FullMc,
                }
            }
            FullMcOutcome::Infeasible { bounds } => FeasibilityVerdict::Infeasible {
                task: task.clone(),
                delay: bounds.upper.map(|_| bounds.delay()),
                proof: InfeasibilityProof::FullMc,
            },
            FullMcOutcome::DelayAssumed { bounds } => FeasibilityVerdict::Infeasible {
                task: task.clone(),
                delay: Some(bounds.delay()),
                proof: InfeasibilityProof::Assumed,
            },
        };
        info!("Result: {verdict}");

        Ok(verdict)
    }
}
