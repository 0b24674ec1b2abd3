//! Search for an early completion of a task with bounded model checking
//!
//! The search starts by refuting the claim that the task never completes. A
//! counterexample is a run on which the task completes, the last value of
//! `time` on it is the completion time. The claim is then tightened to
//! exclude all completions at or after the best completion time found so far,
//! until the task completes by its deadline or the solver fails to refute the
//! claim.
//!
//! The first run uses a fixed timeout. Every further run gets a timeout
//! proportional to the longest solve time observed so far, since the runs
//! get harder as the claim tightens.
//!
//! Bounded model checking can not prove that a task is infeasible. Its result
//! is an approximation of the earliest completion time.

use std::time::Duration;

use deadline_schedule::{TaskTarget, Time};
use deadline_smv::{SmvBackend, output};
use log::{debug, info, warn};

use crate::{
    CheckerError,
    artifacts::{Artifact, ArtifactWriter},
    options::BmcOptions,
};

/// Result of the bounded model checking search
#[derive(Debug, Clone, PartialEq)]
pub struct BmcSearch {
    /// Earliest completion time found
    pub final_time: Option<Time>,
    /// Trace of the run completing at `final_time`
    pub counterexample: Option<Vec<String>>,
    /// Wall clock times of all runs that refuted their claim
    pub solve_times: Vec<Duration>,
    /// Timeout used for the last run
    pub bmc_timeout: Duration,
}

impl BmcSearch {
    fn new(base_timeout: Duration) -> Self {
        Self {
            final_time: None,
            counterexample: None,
            solve_times: Vec::new(),
            bmc_timeout: base_timeout,
        }
    }

    /// Check whether a run completing by `deadline` was found
    pub fn meets(&self, deadline: Time) -> bool {
        self.final_time.is_some_and(|t| t <= deadline)
    }

    /// Longest solve time of all refuting runs
    pub fn max_solve_time(&self) -> Option<Duration> {
        self.solve_times.iter().max().copied()
    }

    /// Check whether the last timeout was at least `factor` times the longest
    /// solve time
    ///
    /// If so, the last run had ample time compared to all earlier ones and
    /// not finding an earlier completion suggests there is none. This is a
    /// heuristic, the last run might just have been harder.
    pub fn timeout_heuristic_holds(&self, factor: f64) -> bool {
        match (self.final_time, self.max_solve_time()) {
            (Some(_), Some(max)) => self.bmc_timeout >= max.mul_f64(factor),
            _ => false,
        }
    }
}

/// Driver of the bounded model checking search for one task
#[derive(Debug)]
pub struct BmcDriver<'a, B: SmvBackend> {
    backend: &'a B,
    writer: &'a ArtifactWriter,
    options: &'a BmcOptions,
}

impl<'a, B: SmvBackend> BmcDriver<'a, B> {
    /// Create a new driver
    pub fn new(backend: &'a B, writer: &'a ArtifactWriter, options: &'a BmcOptions) -> Self {
        Self {
            backend,
            writer,
            options,
        }
    }

    /// Search for the earliest completion of `target` in `model`
    ///
    /// Every run checks `model` with the current claim appended, written to
    /// `bmc.smv`.
    pub fn search(&self, model: &str, target: &TaskTarget) -> Result<BmcSearch, CheckerError> {
        let mut search = BmcSearch::new(self.options.base_timeout);
        let mut claim = target.bmc_never_completes();

        loop {
            let bmc_model = format!("{}\nLTLSPEC {claim}\n", model.trim_end());
            let bmc_file = self.writer.write(Artifact::Bmc, &bmc_model)?;

            debug!(
                "Checking '{claim}' with timeout {:.1}s",
                search.bmc_timeout.as_secs_f64()
            );
            let outcome =
                self.backend
                    .run_bmc(&bmc_file, self.options.bmc_length, search.bmc_timeout)?;

            let Some(elapsed) = outcome.elapsed() else {
                info!(
                    "Bounded model checking timed out after {:.1}s",
                    search.bmc_timeout.as_secs_f64()
                );
                break;
            };

            let out = outcome.output_lossy();
            if !output::is_refuted(&out) {
                debug!("No completion of {target} found by bounded model checking");
                break;
            }

            let Some(final_time) = output::final_time(&out) else {
                warn!("Counterexample of '{claim}' does not assign time, stopping search");
                break;
            };
            if search.final_time.is_some_and(|t| final_time >= t) {
                warn!(
                    "Solver reported completion at {final_time}, which is not earlier than the known completion, stopping search"
                );
                break;
            }

            info!(
                "Bounded model checking found completion at time {final_time} ({:.3}s)",
                elapsed.as_secs_f64()
            );
            search.final_time = Some(final_time);
            search.counterexample = Some(output::trace_lines(&out));
            search.solve_times.push(elapsed);

            if final_time <= target.deadline() {
                break;
            }

            if let Some(max) = search.max_solve_time() {
                search.bmc_timeout = max.mul_f64(self.options.timeout_factor);
            }
            claim = target.bmc_no_completion_before(final_time);
        }

        Ok(search)
    }
}

#[cfg(test)]
mod tests {
    use std::{
        cell::RefCell,
        fs,
        path::Path,
    };

    use deadline_smv::{PathOracle, ProcessOutcome, SolverError};

    use super::*;

    /// Backend answering bounded model checking runs from a script
    struct ScriptedBackend {
        answers: RefCell<Vec<ProcessOutcome>>,
        runs: RefCell<Vec<(String, Duration)>>,
    }

    impl ScriptedBackend {
        fn new(answers: Vec<ProcessOutcome>) -> Self {
            Self {
                answers: RefCell::new(answers.into_iter().rev().collect()),
                runs: RefCell::new(Vec::new()),
            }
        }
    }

    struct NoSession;

    impl PathOracle for NoSession {
        fn get_path(&mut self, _target: &str) -> Result<Option<String>, SolverError> {
            unreachable!("bounded model checking does not open sessions")
        }
    }

    impl SmvBackend for ScriptedBackend {
        type Session = NoSession;

        fn run_bmc(
            &self,
            model: &Path,
            _bmc_length: u32,
            timeout: Duration,
        ) -> Result<ProcessOutcome, SolverError> {
            let model = fs::read_to_string(model)?;
            self.runs.borrow_mut().push((model, timeout));
            Ok(self
                .answers
                .borrow_mut()
                .pop()
                .expect("more runs than scripted answers"))
        }

        fn open_session(&self, _model: &Path) -> Result<NoSession, SolverError> {
            Ok(NoSession)
        }
    }

    fn refuted(time: Time, secs: u64) -> ProcessOutcome {
        ProcessOutcome::new(
            format!(
                "-- specification G COUNT_U1_t1 < 1 is false\n  -> State: 1.1 <-\n    time = 0\n  -> State: 1.2 <-\n    time = {time}\n"
            )
            .into_bytes(),
            Some(Duration::from_secs(secs)),
        )
    }

    fn target() -> TaskTarget {
        TaskTarget::new("U1", "t1", 1, 50)
    }

    #[test]
    fn test_completion_by_deadline_stops_search() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ArtifactWriter::new(dir.path()).unwrap();
        let backend = ScriptedBackend::new(vec![refuted(45, 2)]);
        let options = BmcOptions::default();

        let search = BmcDriver::new(&backend, &writer, &options)
            .search("MODULE main\n", &target())
            .unwrap();

        assert_eq!(search.final_time, Some(45));
        assert!(search.meets(50));
        assert_eq!(search.solve_times, vec![Duration::from_secs(2)]);
        assert_eq!(search.bmc_timeout, Duration::from_secs(30));
        assert!(search.counterexample.unwrap().contains(&"    time = 45".to_string()));

        let runs = backend.runs.borrow();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].0, "MODULE main\nLTLSPEC G(COUNT_U1_t1 < 1)\n");
    }

    #[test]
    fn test_claim_tightens_and_timeout_adapts() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ArtifactWriter::new(dir.path()).unwrap();
        let backend = ScriptedBackend::new(vec![
            refuted(80, 2),
            refuted(70, 5),
            ProcessOutcome::new(b"-- no counterexample found with bound 100".to_vec(), Some(Duration::from_secs(1))),
        ]);
        let options = BmcOptions::default();

        let search = BmcDriver::new(&backend, &writer, &options)
            .search("MODULE main", &target())
            .unwrap();

        assert_eq!(search.final_time, Some(70));
        assert!(!search.meets(50));
        assert_eq!(search.bmc_timeout, Duration::from_secs(20));
        assert!(search.timeout_heuristic_holds(4.0));

        let runs = backend.runs.borrow();
        let claims: Vec<(&str, Duration)> = runs
            .iter()
            .map(|(m, t)| (m.lines().last().unwrap(), *t))
            .collect();
        assert_eq!(
            claims,
            vec![
                ("LTLSPEC G(COUNT_U1_t1 < 1)", Duration::from_secs(30)),
                (
                    "LTLSPEC G(!((COUNT_U1_t1 >= 1) & (time < 80)))",
                    Duration::from_secs(8)
                ),
                (
                    "LTLSPEC G(!((COUNT_U1_t1 >= 1) & (time < 70)))",
                    Duration::from_secs(20)
                ),
            ]
        );
    }

    #[test]
    fn test_timeout_is_inconclusive() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ArtifactWriter::new(dir.path()).unwrap();
        let backend = ScriptedBackend::new(vec![ProcessOutcome::new(b"partial".to_vec(), None)]);
        let options = BmcOptions::default();

        let search = BmcDriver::new(&backend, &writer, &options)
            .search("MODULE main", &target())
            .unwrap();

        assert_eq!(search.final_time, None);
        assert_eq!(search.counterexample, None);
        assert!(search.solve_times.is_empty());
        assert!(!search.timeout_heuristic_holds(4.0));
    }

    #[test]
    fn test_non_decreasing_completion_stops_search() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ArtifactWriter::new(dir.path()).unwrap();
        let backend = ScriptedBackend::new(vec![refuted(80, 1), refuted(80, 1)]);
        let options = BmcOptions::default();

        let search = BmcDriver::new(&backend, &writer, &options)
            .search("MODULE main", &target())
            .unwrap();

        assert_eq!(search.final_time, Some(80));
        assert_eq!(search.solve_times.len(), 1);
        assert_eq!(backend.runs.borrow().len(), 2);
    }

    #[test]
    fn test_heuristic_requires_generous_timeout() {
        let search = BmcSearch {
            final_time: Some(70),
            counterexample: None,
            solve_times: vec![Duration::from_secs(10)],
            bmc_timeout: Duration::from_secs(30),
        };
        assert!(!search.timeout_heuristic_holds(4.0));
        assert!(search.timeout_heuristic_holds(3.0));
    }
}
