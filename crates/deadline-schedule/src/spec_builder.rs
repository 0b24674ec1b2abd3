//! Translation of schedules into SMV deadline specifications
//!
//! Every task occurrence is identified in the process model by a counter
//! `COUNT_<unit>_<task>` that counts how often the task has been completed.
//! The `n`-th occurrence of a task meets its deadline `d` if the model reaches
//! a state with `COUNT_<unit>_<task> = n` and `time <= d`.
//!
//! For every occurrence the builder emits the specification
//!
//! ```text
//! SPEC AG(!((COUNT_<unit>_<task> = <n>) & (time <= <d>)))
//! ```
//!
//! A counterexample to this specification is a run on which the occurrence
//! completes in time.
//!
//! Counters are seeded from `initial_counts`, which allows to chain the
//! specifications of consecutive sub-schedules.

use std::fmt;

use indexmap::IndexMap;
use log::{trace, warn};

use crate::{
    schedule::{Schedule, Task, Time},
    state::TIME_VARIABLE,
};

/// Prefix of all task counter variables
pub const COUNTER_PREFIX: &str = "COUNT";

/// Name of the SMV counter variable of task `name` on `unit`
///
/// Characters that are not valid in SMV identifiers are replaced by `_`.
pub fn counter_variable(unit: &str, name: &str) -> String {
    let sanitize = |s: &str| -> String {
        s.chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
            .collect()
    };
    format!("{COUNTER_PREFIX}_{}_{}", sanitize(unit), sanitize(name))
}

/// Number of occurrences per `(unit, task name)` pair
///
/// Iteration follows the order in which pairs were first counted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskCounts(IndexMap<(String, String), u32>);

impl TaskCounts {
    /// Create empty counts
    pub fn new() -> Self {
        Self::default()
    }

    /// Count every task in `tasks` once
    pub fn from_tasks<'a, I: IntoIterator<Item = &'a Task>>(tasks: I) -> Self {
        let mut counts = Self::new();
        for task in tasks {
            counts.increment(task.unit(), task.name());
        }
        counts
    }

    /// Current count of the pair, `0` if it has not been counted yet
    pub fn get(&self, unit: &str, name: &str) -> u32 {
        self.0
            .get(&(unit.to_string(), name.to_string()))
            .copied()
            .unwrap_or(0)
    }

    /// Set the count of a pair
    pub fn set<U: Into<String>, N: Into<String>>(&mut self, unit: U, name: N, count: u32) {
        self.0.insert((unit.into(), name.into()), count);
    }

    /// Increment the count of a pair and return the new count
    pub fn increment(&mut self, unit: &str, name: &str) -> u32 {
        let count = self
            .0
            .entry((unit.to_string(), name.to_string()))
            .or_insert(0);
        *count += 1;
        *count
    }

    /// Iterate over all counted pairs
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str, u32)> {
        self.0
            .iter()
            .map(|((unit, name), count)| (unit.as_str(), name.as_str(), *count))
    }

    /// Check whether no pair has been counted
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Counter variables that are shared by more than one counted pair
    ///
    /// Pairs such as `("tank-1", "fill")` and `("tank_1", "fill")`, or
    /// `("a_b", "c")` and `("a", "b_c")`, map to the same variable. The
    /// returned list contains every such variable together with the
    /// colliding pairs, in counting order.
    pub fn counter_collisions(&self) -> Vec<(String, Vec<(&str, &str)>)> {
        let mut by_variable: IndexMap<String, Vec<(&str, &str)>> = IndexMap::new();
        for (unit, name) in self.0.keys() {
            by_variable
                .entry(counter_variable(unit, name))
                .or_default()
                .push((unit.as_str(), name.as_str()));
        }
        by_variable
            .into_iter()
            .filter(|(_, pairs)| pairs.len() > 1)
            .collect()
    }
}

/// Completion target of a single task occurrence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskTarget {
    unit: String,
    name: String,
    count: u32,
    deadline: Time,
}

impl TaskTarget {
    /// Create a new target for the `count`-th occurrence of a task
    pub fn new<U: Into<String>, N: Into<String>>(
        unit: U,
        name: N,
        count: u32,
        deadline: Time,
    ) -> Self {
        Self {
            unit: unit.into(),
            name: name.into(),
            count,
            deadline,
        }
    }

    /// Scheduling unit of the task
    pub fn unit(&self) -> &str {
        &self.unit
    }

    /// Name of the task
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Occurrence number of the task
    pub fn count(&self) -> u32 {
        self.count
    }

    /// Deadline of the occurrence
    pub fn deadline(&self) -> Time {
        self.deadline
    }

    /// Check whether this is the target of `task`
    pub fn is_target_of(&self, task: &Task) -> bool {
        self.unit == task.unit() && self.name == task.name() && self.deadline == task.deadline()
    }

    /// SMV counter variable of the task
    pub fn counter_variable(&self) -> String {
        counter_variable(&self.unit, &self.name)
    }

    /// Predicate of states in which the occurrence completed by its deadline
    pub fn reached_by_deadline(&self) -> String {
        self.reached_by(self.deadline)
    }

    /// Predicate of states in which the occurrence completed by `time`
    pub fn reached_by(&self, time: Time) -> String {
        format!(
            "({} = {}) & ({TIME_VARIABLE} <= {time})",
            self.counter_variable(),
            self.count
        )
    }

    /// LTL property claiming the occurrence never completes
    pub fn bmc_never_completes(&self) -> String {
        format!("G({} < {})", self.counter_variable(), self.count)
    }

    /// LTL property claiming the occurrence never completes before `time`
    pub fn bmc_no_completion_before(&self, time: Time) -> String {
        format!(
            "G(!(({} >= {}) & ({TIME_VARIABLE} < {time})))",
            self.counter_variable(),
            self.count
        )
    }

    /// CTL specification whose counterexamples meet the deadline
    pub fn deadline_spec(&self) -> String {
        format!("SPEC AG(!({}))", self.reached_by_deadline())
    }
}

impl fmt::Display for TaskTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "occurrence {} of {}/{} by {}",
            self.count, self.unit, self.name, self.deadline
        )
    }
}

/// Declaration of a bounded counter variable
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterDeclaration {
    variable: String,
    upper: u32,
}

impl CounterDeclaration {
    /// Name of the declared variable
    pub fn variable(&self) -> &str {
        &self.variable
    }

    /// Largest value of the counter
    pub fn upper(&self) -> u32 {
        self.upper
    }
}

impl fmt::Display for CounterDeclaration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} : 0..{};", self.variable, self.upper)
    }
}

/// Deadline specification of a schedule
///
/// The [`fmt::Display`] implementation renders the content of the
/// `schedule.smv` file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadlineSpecification {
    counters: Vec<CounterDeclaration>,
    targets: Vec<TaskTarget>,
    final_counts: TaskCounts,
}

impl DeadlineSpecification {
    /// Counter variables declared by this specification
    pub fn counters(&self) -> &[CounterDeclaration] {
        &self.counters
    }

    /// Targets of all task occurrences, earliest deadline first
    pub fn targets(&self) -> &[TaskTarget] {
        &self.targets
    }

    /// Target belonging to `task`
    pub fn target_for(&self, task: &Task) -> Option<&TaskTarget> {
        self.targets.iter().find(|t| t.is_target_of(task))
    }

    /// Counts after all tasks of the schedule have been counted
    ///
    /// Pass these as `initial_counts` to the builder of the next sub-schedule.
    pub fn final_counts(&self) -> &TaskCounts {
        &self.final_counts
    }
}

impl fmt::Display for DeadlineSpecification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.counters.is_empty() {
            writeln!(f, "VAR")?;
            for counter in self.counters.iter() {
                writeln!(f, "    {counter}")?;
            }
            writeln!(f)?;
        }
        for target in self.targets.iter() {
            writeln!(f, "{}", target.deadline_spec())?;
        }
        Ok(())
    }
}

/// Builder for [`DeadlineSpecification`]s
#[derive(Debug, Clone, Default)]
pub struct DeadlineSpecBuilder {
    initial_counts: TaskCounts,
}

impl DeadlineSpecBuilder {
    /// Create a builder whose counters start at `initial_counts`
    pub fn new(initial_counts: TaskCounts) -> Self {
        Self { initial_counts }
    }

    /// Build the deadline specification of `schedule`
    ///
    /// Tasks are processed earliest deadline first. A counter is declared
    /// only if the schedule counts it beyond its initial value; counters that
    /// were fully accounted for by a previous sub-schedule are not declared
    /// again.
    pub fn build(&self, schedule: &Schedule) -> DeadlineSpecification {
        let mut counts = self.initial_counts.clone();

        let targets: Vec<TaskTarget> = schedule
            .ordered_tasks()
            .into_iter()
            .map(|task| {
                let count = counts.increment(task.unit(), task.name());
                TaskTarget::new(task.unit(), task.name(), count, task.deadline())
            })
            .collect();

        for (variable, pairs) in counts.counter_collisions() {
            warn!(
                "Tasks {pairs:?} share the counter variable {variable}, their occurrences \
                 are counted together"
            );
        }

        let counters = counts
            .iter()
            .filter(|(unit, name, count)| *count > self.initial_counts.get(unit, name))
            .map(|(unit, name, count)| CounterDeclaration {
                variable: counter_variable(unit, name),
                upper: count,
            })
            .collect();

        trace!(
            "Built deadline specification with {} target(s)",
            targets.len()
        );

        DeadlineSpecification {
            counters,
            targets,
            final_counts: counts,
        }
    }
}

#[cfg(test)]
mod tests {
    use indexmap::IndexMap;

    use crate::schedule::{TaskEntry, TimeWindow};

    use super::*;

    fn schedule(tasks: Vec<(&str, Vec<(&str, Time, Time)>)>) -> Schedule {
        let tasks: IndexMap<String, Vec<TaskEntry>> = tasks
            .into_iter()
            .map(|(unit, entries)| {
                (
                    unit.to_string(),
                    entries
                        .into_iter()
                        .map(|(n, s, e)| TaskEntry(n.to_string(), TimeWindow::new(s, e)))
                        .collect(),
                )
            })
            .collect();
        Schedule::new(TimeWindow::new(0, 100), tasks).unwrap()
    }

    #[test]
    fn test_single_task_spec() {
        let s = schedule(vec![("U1", vec![("t1", 0, 50)])]);

        let spec = DeadlineSpecBuilder::default().build(&s);

        assert_eq!(
            spec.to_string(),
            "VAR\n    COUNT_U1_t1 : 0..1;\n\nSPEC AG(!((COUNT_U1_t1 = 1) & (time <= 50)))\n"
        );
        assert_eq!(spec.targets(), &[TaskTarget::new("U1", "t1", 1, 50)]);
    }

    #[test]
    fn test_repeated_tasks_are_counted_in_deadline_order() {
        let s = schedule(vec![
            ("U1", vec![("fill", 50, 80), ("fill", 0, 30)]),
            ("U2", vec![("heat", 0, 40)]),
        ]);

        let spec = DeadlineSpecBuilder::default().build(&s);

        assert_eq!(
            spec.targets(),
            &[
                TaskTarget::new("U1", "fill", 1, 30),
                TaskTarget::new("U2", "heat", 1, 40),
                TaskTarget::new("U1", "fill", 2, 80),
            ]
        );
        assert_eq!(
            spec.to_string(),
            "VAR\n    COUNT_U1_fill : 0..2;\n    COUNT_U2_heat : 0..1;\n\n\
             SPEC AG(!((COUNT_U1_fill = 1) & (time <= 30)))\n\
             SPEC AG(!((COUNT_U2_heat = 1) & (time <= 40)))\n\
             SPEC AG(!((COUNT_U1_fill = 2) & (time <= 80)))\n"
        );
    }

    #[test]
    fn test_build_is_deterministic() {
        let s = schedule(vec![
            ("U2", vec![("b", 0, 20), ("a", 0, 20)]),
            ("U1", vec![("c", 0, 20), ("b", 0, 10)]),
        ]);
        let mut initial = TaskCounts::new();
        initial.set("U1", "c", 3);

        let first = DeadlineSpecBuilder::new(initial.clone()).build(&s);
        let second = DeadlineSpecBuilder::new(initial).build(&s);

        assert_eq!(first.to_string(), second.to_string());
        assert_eq!(first, second);
    }

    #[test]
    fn test_counts_are_chained_through_initial_counts() {
        let first = schedule(vec![("U1", vec![("fill", 0, 30)])]);
        let second = schedule(vec![
            ("U1", vec![("fill", 30, 60)]),
            ("U2", vec![("heat", 0, 40)]),
        ]);
        let third = schedule(vec![("U1", vec![("fill", 60, 90)])]);

        let spec1 = DeadlineSpecBuilder::default().build(&first);
        assert_eq!(spec1.final_counts().get("U1", "fill"), 1);

        let spec2 = DeadlineSpecBuilder::new(spec1.final_counts().clone()).build(&second);
        assert_eq!(spec2.final_counts().get("U1", "fill"), 2);
        assert_eq!(spec2.final_counts().get("U2", "heat"), 1);
        assert_eq!(spec2.target_for(&second.ordered_tasks()[1]).unwrap().count(), 2);

        let spec3 = DeadlineSpecBuilder::new(spec2.final_counts().clone()).build(&third);
        assert_eq!(spec3.final_counts().get("U1", "fill"), 3);
        assert_eq!(spec3.final_counts().get("U2", "heat"), 1);
        assert_eq!(spec3.targets()[0].count(), 3);
    }

    #[test]
    fn test_seeded_counters_not_in_schedule_are_not_declared() {
        let s = schedule(vec![("U1", vec![("fill", 0, 30)])]);
        let mut initial = TaskCounts::new();
        initial.set("U2", "heat", 2);
        initial.set("U1", "fill", 1);

        let spec = DeadlineSpecBuilder::new(initial).build(&s);

        let declared: Vec<&str> = spec.counters().iter().map(|c| c.variable()).collect();
        assert_eq!(declared, vec!["COUNT_U1_fill"]);
        assert_eq!(spec.counters()[0].upper(), 2);
        assert_eq!(spec.targets()[0].count(), 2);
    }

    #[test]
    fn test_empty_schedule() {
        let s = schedule(vec![]);
        let spec = DeadlineSpecBuilder::default().build(&s);
        assert_eq!(spec.to_string(), "");
        assert!(spec.final_counts().is_empty());
    }

    #[test]
    fn test_target_predicates() {
        let target = TaskTarget::new("U1", "t1", 2, 50);

        assert_eq!(target.reached_by_deadline(), "(COUNT_U1_t1 = 2) & (time <= 50)");
        assert_eq!(target.reached_by(64), "(COUNT_U1_t1 = 2) & (time <= 64)");
        assert_eq!(target.bmc_never_completes(), "G(COUNT_U1_t1 < 2)");
        assert_eq!(
            target.bmc_no_completion_before(45),
            "G(!((COUNT_U1_t1 >= 2) & (time < 45)))"
        );
        assert_eq!(
            target.deadline_spec(),
            "SPEC AG(!((COUNT_U1_t1 = 2) & (time <= 50)))"
        );
    }

    #[test]
    fn test_counter_variable_is_sanitized() {
        assert_eq!(counter_variable("tank-1", "fill up"), "COUNT_tank_1_fill_up");
    }

    #[test]
    fn test_counter_collisions() {
        let counts = TaskCounts::from_tasks(
            [
                Task::new("tank-1", "fill", TimeWindow::new(0, 10)),
                Task::new("tank_1", "fill", TimeWindow::new(0, 20)),
                Task::new("a_b", "c", TimeWindow::new(0, 30)),
                Task::new("a", "b_c", TimeWindow::new(0, 40)),
                Task::new("U1", "fill", TimeWindow::new(0, 50)),
                Task::new("U1", "fill", TimeWindow::new(0, 60)),
            ]
            .iter(),
        );

        assert_eq!(
            counts.counter_collisions(),
            vec![
                (
                    "COUNT_tank_1_fill".to_string(),
                    vec![("tank-1", "fill"), ("tank_1", "fill")]
                ),
                ("COUNT_a_b_c".to_string(), vec![("a_b", "c"), ("a", "b_c")]),
            ]
        );
    }

    #[test]
    fn test_no_counter_collisions_for_distinct_variables() {
        let spec = DeadlineSpecBuilder::new(TaskCounts::new()).build(&schedule(vec![
            ("tank-1", vec![("fill", 0, 10), ("fill", 20, 30)]),
            ("tank-2", vec![("fill", 0, 10)]),
        ]));

        assert!(spec.final_counts().counter_collisions().is_empty());
    }

    #[test]
    fn test_counts_from_tasks() {
        let tasks = [
            Task::new("U1", "fill", TimeWindow::new(0, 10)),
            Task::new("U2", "heat", TimeWindow::new(0, 20)),
            Task::new("U1", "fill", TimeWindow::new(0, 30)),
        ];
        let counts = TaskCounts::from_tasks(tasks.iter());
        assert_eq!(counts.get("U1", "fill"), 2);
        assert_eq!(counts.get("U2", "heat"), 1);
        assert_eq!(counts.get("U3", "idle"), 0);
    }
}
