//! Schedules of time-bounded tasks on scheduling units
//!
//! A schedule is read from JSON of the form
//!
//! ```json
//! {
//!     "horizon": [0, 100],
//!     "tasks": {
//!         "U1": [["fill", [0, 50]], ["drain", [40, 90]]]
//!     }
//! }
//! ```
//!
//! Every task window must lie within the horizon of the schedule. This is
//! checked when the schedule is constructed, so every [`Schedule`] that exists
//! is valid.

use core::fmt;
use std::{error, fs, io, path::Path};

use indexmap::IndexMap;
use log::trace;
use serde::{Deserialize, Serialize};

/// Discrete time as used by the process model
pub type Time = i64;

/// Closed time interval `[start, end]`
///
/// Serialized as a two element array `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "(Time, Time)", into = "(Time, Time)")]
pub struct TimeWindow {
    start: Time,
    end: Time,
}

impl TimeWindow {
    /// Create a new time window
    pub fn new(start: Time, end: Time) -> Self {
        Self { start, end }
    }

    /// First point in time of the window
    pub fn start(&self) -> Time {
        self.start
    }

    /// Last point in time of the window
    pub fn end(&self) -> Time {
        self.end
    }

    /// Check whether `time` lies within the window (bounds included)
    pub fn contains(&self, time: Time) -> bool {
        self.start <= time && time <= self.end
    }
}

impl From<(Time, Time)> for TimeWindow {
    fn from((start, end): (Time, Time)) -> Self {
        Self::new(start, end)
    }
}

impl From<TimeWindow> for (Time, Time) {
    fn from(w: TimeWindow) -> Self {
        (w.start, w.end)
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.start, self.end)
    }
}

/// Entry of a unit's task list: the task name and its time window
///
/// Serialized as `[name, [start, end]]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskEntry(pub String, pub TimeWindow);

impl TaskEntry {
    /// Name of the task
    pub fn name(&self) -> &str {
        &self.0
    }

    /// Time window of the task
    pub fn window(&self) -> TimeWindow {
        self.1
    }
}

/// A task scheduled on a specific scheduling unit
///
/// Serialized in tuple form `[unit, name, [start, end]]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "(String, String, TimeWindow)", into = "(String, String, TimeWindow)")]
pub struct Task {
    unit: String,
    name: String,
    window: TimeWindow,
}

impl Task {
    /// Create a new task
    pub fn new<U: Into<String>, N: Into<String>>(unit: U, name: N, window: TimeWindow) -> Self {
        Self {
            unit: unit.into(),
            name: name.into(),
            window,
        }
    }

    /// Scheduling unit the task runs on
    pub fn unit(&self) -> &str {
        &self.unit
    }

    /// Name of the task
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Time window of the task
    pub fn window(&self) -> TimeWindow {
        self.window
    }

    /// Deadline of the task, i.e. the end of its window
    pub fn deadline(&self) -> Time {
        self.window.end
    }

    /// Check whether the task is active at `time`
    pub fn is_active_at(&self, time: Time) -> bool {
        self.window.contains(time)
    }

    /// Same task with the deadline replaced by `end`
    pub fn with_deadline(&self, end: Time) -> Self {
        Self {
            unit: self.unit.clone(),
            name: self.name.clone(),
            window: TimeWindow::new(self.window.start, end),
        }
    }
}

impl From<(String, String, TimeWindow)> for Task {
    fn from((unit, name, window): (String, String, TimeWindow)) -> Self {
        Self { unit, name, window }
    }
}

impl From<Task> for (String, String, TimeWindow) {
    fn from(t: Task) -> Self {
        (t.unit, t.name, t.window)
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} {}", self.unit, self.name, self.window)
    }
}

/// Error raised when a schedule or state violates its invariants
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The horizon ends before it begins
    InvalidHorizon {
        /// Begin of the horizon
        begin: Time,
        /// End of the horizon
        end: Time,
    },
    /// A task ends before it starts
    InvalidTaskWindow {
        /// Scheduling unit of the task
        unit: String,
        /// Name of the task
        task: String,
        /// Offending window
        window: TimeWindow,
    },
    /// A task ends after the end of the horizon
    DeadlineBeyondHorizon {
        /// Scheduling unit of the task
        unit: String,
        /// Name of the task
        task: String,
        /// Deadline of the task
        deadline: Time,
        /// End of the horizon
        horizon_end: Time,
    },
    /// The plant state does not contain an integer `time` entry
    MissingTime,
    /// A plant state variable is neither boolean nor integer
    InvalidStateValue(String),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::InvalidHorizon { begin, end } => {
                write!(f, "Horizon [{begin}, {end}] ends before it begins")
            }
            ValidationError::InvalidTaskWindow { unit, task, window } => {
                write!(f, "Task '{task}' of unit '{unit}' has invalid window {window}")
            }
            ValidationError::DeadlineBeyondHorizon {
                unit,
                task,
                deadline,
                horizon_end,
            } => write!(
                f,
                "Task '{task}' of unit '{unit}' ends at {deadline}, after the end of the horizon ({horizon_end})"
            ),
            ValidationError::MissingTime => {
                write!(f, "Plant state does not contain an integer 'time' entry")
            }
            ValidationError::InvalidStateValue(var) => write!(
                f,
                "Value of plant state variable '{var}' is neither a boolean nor an integer"
            ),
        }
    }
}

impl error::Error for ValidationError {}

/// Error that can occur when reading a schedule or state from JSON
#[derive(Debug)]
pub enum ScheduleParseError {
    /// The input file could not be read
    Io(io::Error),
    /// The input is not valid JSON of the expected shape
    Json(serde_json::Error),
    /// The input is well-formed but violates an invariant
    Validation(ValidationError),
}

impl fmt::Display for ScheduleParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScheduleParseError::Io(e) => write!(f, "Failed to read input file: {e}"),
            ScheduleParseError::Json(e) => write!(f, "Malformed JSON input: {e}"),
            ScheduleParseError::Validation(e) => write!(f, "Invalid input: {e}"),
        }
    }
}

impl error::Error for ScheduleParseError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            ScheduleParseError::Io(e) => Some(e),
            ScheduleParseError::Json(e) => Some(e),
            ScheduleParseError::Validation(e) => Some(e),
        }
    }
}

impl From<io::Error> for ScheduleParseError {
    fn from(e: io::Error) -> Self {
        ScheduleParseError::Io(e)
    }
}

impl From<serde_json::Error> for ScheduleParseError {
    fn from(e: serde_json::Error) -> Self {
        ScheduleParseError::Json(e)
    }
}

impl From<ValidationError> for ScheduleParseError {
    fn from(e: ValidationError) -> Self {
        ScheduleParseError::Validation(e)
    }
}

/// Unvalidated shape of a schedule as it appears in JSON
#[derive(Debug, Clone, Deserialize)]
struct RawSchedule {
    horizon: TimeWindow,
    tasks: IndexMap<String, Vec<TaskEntry>>,
}

/// A schedule of tasks per scheduling unit within a time horizon
///
/// Units and the tasks of each unit keep the order in which they were
/// specified. This order is used to break ties between tasks with equal
/// deadlines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawSchedule")]
pub struct Schedule {
    horizon: TimeWindow,
    tasks: IndexMap<String, Vec<TaskEntry>>,
}

impl TryFrom<RawSchedule> for Schedule {
    type Error = ValidationError;

    fn try_from(raw: RawSchedule) -> Result<Self, Self::Error> {
        Schedule::new(raw.horizon, raw.tasks)
    }
}

impl Schedule {
    /// Create a new schedule, checking that every task lies within the horizon
    pub fn new(
        horizon: TimeWindow,
        tasks: IndexMap<String, Vec<TaskEntry>>,
    ) -> Result<Self, ValidationError> {
        if horizon.start > horizon.end {
            return Err(ValidationError::InvalidHorizon {
                begin: horizon.start,
                end: horizon.end,
            });
        }

        for (unit, entries) in tasks.iter() {
            for TaskEntry(task, window) in entries.iter() {
                if window.start > window.end {
                    return Err(ValidationError::InvalidTaskWindow {
                        unit: unit.clone(),
                        task: task.clone(),
                        window: *window,
                    });
                }
                if window.end > horizon.end {
                    return Err(ValidationError::DeadlineBeyondHorizon {
                        unit: unit.clone(),
                        task: task.clone(),
                        deadline: window.end,
                        horizon_end: horizon.end,
                    });
                }
            }
        }

        Ok(Self { horizon, tasks })
    }

    /// Parse and validate a schedule from a JSON string
    pub fn from_json_str(input: &str) -> Result<Self, ScheduleParseError> {
        let raw: RawSchedule = serde_json::from_str(input)?;
        Ok(Schedule::try_from(raw)?)
    }

    /// Read, parse and validate a schedule from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ScheduleParseError> {
        let input = fs::read_to_string(path)?;
        Self::from_json_str(&input)
    }

    /// Horizon of the schedule
    pub fn horizon(&self) -> TimeWindow {
        self.horizon
    }

    /// Task lists of all scheduling units, in input order
    pub fn units(&self) -> impl Iterator<Item = (&String, &Vec<TaskEntry>)> {
        self.tasks.iter()
    }

    /// Total number of task occurrences in the schedule
    pub fn task_count(&self) -> usize {
        self.tasks.values().map(|entries| entries.len()).sum()
    }

    /// All tasks of the schedule, earliest deadline first
    ///
    /// The sort is stable, tasks with the same deadline stay in input order.
    pub fn ordered_tasks(&self) -> Vec<Task> {
        let mut tasks: Vec<Task> = self
            .tasks
            .iter()
            .flat_map(|(unit, entries)| {
                entries
                    .iter()
                    .map(move |TaskEntry(name, window)| Task::new(unit.as_str(), name.as_str(), *window))
            })
            .collect();
        tasks.sort_by_key(|t| t.deadline());
        tasks
    }

    /// Tasks active at `time`, earliest deadline first
    ///
    /// If `key_unit` is given, only tasks of that scheduling unit are returned.
    pub fn active_tasks(&self, time: Time, key_unit: Option<&str>) -> Vec<Task> {
        let ordered = self.ordered_tasks();
        active_positions(&ordered, time, key_unit)
            .into_iter()
            .map(|i| ordered[i].clone())
            .collect()
    }

    /// Schedule with the same horizon that only contains `task`
    pub fn single_task(&self, task: &Task) -> Result<Schedule, ValidationError> {
        trace!("Deriving single task schedule for {task}");
        let mut tasks = IndexMap::new();
        tasks.insert(
            task.unit().to_string(),
            vec![TaskEntry(task.name().to_string(), task.window())],
        );
        Schedule::new(self.horizon, tasks)
    }

    /// Schedule with the same horizon that only contains `task`, with its
    /// deadline moved to `end`
    pub fn with_relaxed_deadline(&self, task: &Task, end: Time) -> Result<Schedule, ValidationError> {
        self.single_task(&task.with_deadline(end))
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "horizon {}", self.horizon)?;
        for (unit, entries) in self.tasks.iter() {
            let entries = entries
                .iter()
                .map(|TaskEntry(name, window)| format!("{name} {window}"))
                .collect::<Vec<_>>()
                .join(", ");
            writeln!(f, "{unit}: {entries}")?;
        }
        Ok(())
    }
}

/// Positions of the tasks in `ordered` that are active at `time`
///
/// If `key_unit` is given, only tasks of that scheduling unit are considered.
/// Positions are returned in increasing order, so for the output of
/// [`Schedule::ordered_tasks`] the earliest deadline comes first.
pub fn active_positions(ordered: &[Task], time: Time, key_unit: Option<&str>) -> Vec<usize> {
    ordered
        .iter()
        .enumerate()
        .filter(|(_, t)| t.is_active_at(time))
        .filter(|(_, t)| key_unit.is_none_or(|u| t.unit() == u))
        .map(|(i, _)| i)
        .collect()
}
