//! Exact feasibility check and delay search with full model checking
//!
//! The task is first checked directly: a path into a state in which the task
//! completed by its deadline proves feasibility. If there is none, the
//! deadline is infeasible and the search for the smallest feasible deadline
//! starts:
//!
//! 1. exponential search: the deadlines `deadline + 2^k` (capped at the end
//!    of the horizon) are checked for `k = 0, 1, ...` until one is feasible,
//! 2. binary search between the largest infeasible and the smallest feasible
//!    deadline found, until they are adjacent.
//!
//! The search relies on feasibility being monotonic in the deadline. Every
//! newly proven infeasible deadline is reported, so an interrupted search
//! still leaves the best bound known so far.
//!
//! All queries are answered by one [`PathOracle`], i.e. a single solver
//! session on a fixed model.

use deadline_schedule::{DeadlineSpecBuilder, Schedule, Task, TaskCounts, Time};
use deadline_smv::PathOracle;
use log::{debug, info, warn};

use crate::CheckerError;

/// Bounds on the smallest feasible deadline of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayBounds {
    /// Original deadline of the task
    pub deadline: Time,
    /// Largest deadline proven infeasible
    pub lower: Time,
    /// Smallest deadline proven feasible, `None` if no deadline within the
    /// horizon is feasible
    pub upper: Option<Time>,
}

impl DelayBounds {
    /// Bounds after the original deadline was proven infeasible
    pub fn new(deadline: Time) -> Self {
        Self {
            deadline,
            lower: deadline,
            upper: None,
        }
    }

    /// Number of time steps the deadline has to be delayed at least
    pub fn delay(&self) -> Time {
        self.lower - self.deadline + 1
    }

    /// Check whether the smallest feasible deadline is known exactly
    pub fn is_exact(&self) -> bool {
        self.upper.is_some_and(|u| u - self.lower < 2)
    }
}

/// Exponential search for a feasible deadline after `bounds.lower`
///
/// `probe` returns whether a deadline is feasible. The search stops at the
/// first feasible deadline or at `horizon_end`, in which case no upper bound
/// is returned.
pub fn exponential_search<E, F>(
    mut bounds: DelayBounds,
    horizon_end: Time,
    mut probe: F,
) -> Result<DelayBounds, E>
where
    F: FnMut(Time) -> Result<bool, E>,
{
    if bounds.lower >= horizon_end {
        return Ok(bounds);
    }

    let start = bounds.lower;
    let mut k: u32 = 0;
    loop {
        let relaxed = 2i64
            .checked_pow(k)
            .and_then(|step| start.checked_add(step))
            .map_or(horizon_end, |t| t.min(horizon_end));

        debug!("Exponential search: checking deadline {relaxed}");
        if probe(relaxed)? {
            bounds.upper = Some(relaxed);
            return Ok(bounds);
        }

        bounds.lower = relaxed;
        if relaxed == horizon_end {
            return Ok(bounds);
        }
        k += 1;
    }
}

/// Binary search between the bounds until they are adjacent
///
/// Takes at most `ceil(log2(upper - lower))` probes. Bounds without an upper
/// bound are returned unchanged.
pub fn binary_search<E, F>(mut bounds: DelayBounds, mut probe: F) -> Result<DelayBounds, E>
where
    F: FnMut(Time) -> Result<bool, E>,
{
    while let Some(upper) = bounds.upper {
        if upper - bounds.lower < 2 {
            break;
        }

        let middle = bounds.lower + (upper - bounds.lower) / 2;
        debug!("Binary search: checking deadline {middle}");
        if probe(middle)? {
            bounds.upper = Some(middle);
        } else {
            bounds.lower = middle;
        }
    }
    Ok(bounds)
}

/// Result of the full model checking search
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FullMcOutcome {
    /// The task meets its deadline on the given path
    Feasible {
        /// Path into a state in which the task completed by its deadline
        path: String,
    },
    /// The task can not meet its deadline
    Infeasible {
        /// Bounds on the smallest feasible deadline
        bounds: DelayBounds,
    },
    /// The task can not meet its deadline, the delay search was skipped
    DelayAssumed {
        /// Bounds containing only the original deadline
        bounds: DelayBounds,
    },
}

/// Driver of the full model checking search for one task
#[derive(Debug)]
pub struct FullMcDriver<'a, O: PathOracle> {
    oracle: O,
    schedule: &'a Schedule,
    task: &'a Task,
    initial_counts: &'a TaskCounts,
    search_delay: bool,
}

impl<'a, O: PathOracle> FullMcDriver<'a, O> {
    /// Create a new driver for `task` of `schedule`, asking `oracle`
    pub fn new(
        oracle: O,
        schedule: &'a Schedule,
        task: &'a Task,
        initial_counts: &'a TaskCounts,
    ) -> Self {
        Self {
            oracle,
            schedule,
            task,
            initial_counts,
            search_delay: true,
        }
    }

    /// Enable or disable the search for the delay of an infeasible task
    pub fn with_delay_search(mut self, search_delay: bool) -> Self {
        self.search_delay = search_delay;
        self
    }

    /// Target predicate of the task with its deadline moved to `deadline`
    fn target(&self, deadline: Time) -> Result<String, CheckerError> {
        let relaxed = self.task.with_deadline(deadline);
        let sub = self.schedule.with_relaxed_deadline(self.task, deadline)?;
        let spec = DeadlineSpecBuilder::new(self.initial_counts.clone()).build(&sub);
        spec.target_for(&relaxed)
            .map(|t| t.reached_by_deadline())
            .ok_or_else(|| CheckerError::MissingTarget(relaxed.clone()))
    }

    /// Check whether the task can complete by `deadline`
    fn probe(&mut self, deadline: Time) -> Result<Option<String>, CheckerError> {
        let target = self.target(deadline)?;
        Ok(self.oracle.get_path(&target)?)
    }

    /// Run the search
    ///
    /// `on_infeasible` is called with every deadline proven infeasible, in
    /// increasing order.
    pub fn run<F>(mut self, mut on_infeasible: F) -> Result<FullMcOutcome, CheckerError>
    where
        F: FnMut(Time) -> Result<(), CheckerError>,
    {
        let task = self.task;
        let deadline = task.deadline();
        let horizon_end = self.schedule.horizon().end();

        if let Some(path) = self.probe(deadline)? {
            info!("Full model checking: task {task} meets its deadline");
            return Ok(FullMcOutcome::Feasible { path });
        }

        info!("Full model checking proved that task {task} can not meet its deadline {deadline}");
        let bounds = DelayBounds::new(deadline);
        on_infeasible(bounds.lower)?;

        if !self.search_delay {
            return Ok(FullMcOutcome::DelayAssumed { bounds });
        }

        let mut check = |t: Time| -> Result<bool, CheckerError> {
            let feasible = self.probe(t)?.is_some();
            if !feasible {
                on_infeasible(t)?;
            }
            Ok(feasible)
        };

        let bounds = exponential_search(bounds, horizon_end, &mut check)?;
        if bounds.upper.is_none() {
            warn!("Could not find an upper bound: task {task} can not complete within the horizon");
            return Ok(FullMcOutcome::Infeasible { bounds });
        }

        let bounds = binary_search(bounds, &mut check)?;
        debug!(
            "Delay search converged: infeasible {}, feasible {:?}",
            bounds.lower, bounds.upper
        );
        Ok(FullMcOutcome::Infeasible { bounds })
    }
}

#[cfg(test)]
mod tests {
    use deadline_smv::SolverError;

    use super::*;

    /// Oracle for a task that can complete from time `earliest` on
    struct ThresholdOracle {
        earliest: Time,
        queries: Vec<String>,
    }

    impl ThresholdOracle {
        fn new(earliest: Time) -> Self {
            Self {
                earliest,
                queries: Vec::new(),
            }
        }
    }

    impl PathOracle for ThresholdOracle {
        fn get_path(&mut self, target: &str) -> Result<Option<String>, SolverError> {
            self.queries.push(target.to_string());
            let deadline: Time = target
                .rsplit("<= ")
                .next()
                .and_then(|s| s.trim_end_matches(')').parse().ok())
                .ok_or_else(|| SolverError::UnexpectedOutput(target.to_string()))?;
            if deadline >= self.earliest {
                Ok(Some(format!("  -> State: 1.1 <-\n    time = {deadline}")))
            } else {
                Ok(None)
            }
        }
    }

    fn schedule() -> Schedule {
        Schedule::from_json_str(r#"{"horizon": [0, 100], "tasks": {"U1": [["t1", [0, 50]]]}}"#)
            .unwrap()
    }

    fn feasible_from(earliest: Time) -> impl FnMut(Time) -> Result<bool, ()> {
        move |t| Ok(t >= earliest)
    }

    #[test]
    fn test_exponential_search() {
        let bounds = exponential_search(DelayBounds::new(50), 100, feasible_from(56)).unwrap();
        assert_eq!(bounds.lower, 54);
        assert_eq!(bounds.upper, Some(58));
    }

    #[test]
    fn test_exponential_search_capped_at_horizon() {
        let mut probed = Vec::new();
        let bounds = exponential_search(DelayBounds::new(90), 100, |t| {
            probed.push(t);
            Ok::<_, ()>(false)
        })
        .unwrap();

        assert_eq!(probed, vec![91, 92, 94, 98, 100]);
        assert_eq!(bounds.lower, 100);
        assert_eq!(bounds.upper, None);
    }

    #[test]
    fn test_exponential_search_at_horizon_end() {
        let bounds = exponential_search(DelayBounds::new(100), 100, |_| -> Result<bool, ()> {
            panic!("no deadline beyond the horizon must be probed")
        })
        .unwrap();
        assert_eq!(bounds, DelayBounds::new(100));
    }

    #[test]
    fn test_binary_search_converges() {
        for earliest in 51..=100 {
            let bounds = exponential_search(DelayBounds::new(50), 100, feasible_from(earliest)).unwrap();
            let start = bounds;

            let mut n_probes = 0;
            let mut probe = feasible_from(earliest);
            let bounds = binary_search(bounds, |t| {
                n_probes += 1;
                probe(t)
            })
            .unwrap();

            assert_eq!(bounds.lower, earliest - 1);
            assert_eq!(bounds.upper, Some(earliest));
            assert!(bounds.is_exact());

            let width = (start.upper.unwrap() - start.lower) as f64;
            assert!(n_probes as f64 <= width.log2().ceil().max(0.0));
        }
    }

    #[test]
    fn test_binary_search_without_upper_bound() {
        let bounds = DelayBounds::new(50);
        assert_eq!(binary_search(bounds, feasible_from(0)).unwrap(), bounds);
    }

    #[test]
    fn test_delay() {
        let bounds = DelayBounds {
            deadline: 50,
            lower: 55,
            upper: Some(56),
        };
        assert_eq!(bounds.delay(), 6);
        assert_eq!(DelayBounds::new(50).delay(), 1);
    }

    #[test]
    fn test_driver_feasible() {
        let schedule = schedule();
        let task = schedule.ordered_tasks().remove(0);
        let counts = TaskCounts::new();
        let mut oracle = ThresholdOracle::new(40);

        let outcome = FullMcDriver::new(&mut oracle, &schedule, &task, &counts)
            .run(|_| panic!("feasible task must not record a delay"))
            .unwrap();

        assert!(matches!(outcome, FullMcOutcome::Feasible { .. }));
        assert_eq!(oracle.queries, vec!["(COUNT_U1_t1 = 1) & (time <= 50)"]);
    }

    #[test]
    fn test_driver_delay_search() {
        let schedule = schedule();
        let task = schedule.ordered_tasks().remove(0);
        let counts = TaskCounts::new();
        let mut oracle = ThresholdOracle::new(56);
        let mut recorded = Vec::new();

        let outcome = FullMcDriver::new(&mut oracle, &schedule, &task, &counts)
            .run(|lower| {
                recorded.push(lower);
                Ok(())
            })
            .unwrap();

        let FullMcOutcome::Infeasible { bounds } = &outcome else {
            panic!("expected infeasible task, got {outcome:?}");
        };
        assert_eq!(bounds.lower, 55);
        assert_eq!(bounds.upper, Some(56));
        assert_eq!(bounds.delay(), 6);
        assert_eq!(recorded, vec![50, 51, 52, 54, 55]);
    }

    #[test]
    fn test_driver_seeded_counter() {
        let schedule = schedule();
        let task = schedule.ordered_tasks().remove(0);
        let mut counts = TaskCounts::new();
        counts.set("U1", "t1", 2);
        let mut oracle = ThresholdOracle::new(0);

        FullMcDriver::new(&mut oracle, &schedule, &task, &counts)
            .run(|_| Ok(()))
            .unwrap();

        assert_eq!(oracle.queries, vec!["(COUNT_U1_t1 = 3) & (time <= 50)"]);
    }

    #[test]
    fn test_driver_assumed_delay() {
        let schedule = schedule();
        let task = schedule.ordered_tasks().remove(0);
        let counts = TaskCounts::new();
        let mut oracle = ThresholdOracle::new(70);

        let outcome = FullMcDriver::new(&mut oracle, &schedule, &task, &counts)
            .with_delay_search(false)
            .run(|_| Ok(()))
            .unwrap();

        assert_eq!(
            outcome,
            FullMcOutcome::DelayAssumed {
                bounds: DelayBounds::new(50)
            }
        );
        assert_eq!(oracle.queries.len(), 1);
    }

    #[test]
    fn test_driver_no_upper_bound() {
        let schedule = schedule();
        let task = schedule.ordered_tasks().remove(0);
        let counts = TaskCounts::new();
        let mut oracle = ThresholdOracle::new(1000);

        let outcome = FullMcDriver::new(&mut oracle, &schedule, &task, &counts)
            .run(|_| Ok(()))
            .unwrap();

        assert_eq!(
            outcome,
            FullMcOutcome::Infeasible {
                bounds: DelayBounds {
                    deadline: 50,
                    lower: 100,
                    upper: None
                }
            }
        );
    }
}
