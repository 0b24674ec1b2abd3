//! Files written to the output directory of a check
//!
//! The files are the result of a check. A downstream consumer reads
//! `path.cex` for a run on which the active task meets its deadline and
//! `delay.json` for the delay of an infeasible task.

use std::{
    fs,
    path::{Path, PathBuf},
};

use deadline_schedule::{PlantState, Schedule, Task, Time, TimeWindow};
use log::{debug, info};
use serde::Serialize;
use serde_json::Value;

use crate::CheckerError;

/// Placeholder written to `path.cex` before the check starts
pub const PATH_PLACEHOLDER: &str = "--";

/// Files written during a check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Artifact {
    /// Deadline specification of the sub-schedule
    Schedule,
    /// Initial state constraints
    State,
    /// Combined model
    Combined,
    /// Model of the current bounded model checking run
    Bmc,
    /// Path on which the task meets its deadline
    Path,
    /// Known delay of an infeasible task
    Delay,
}

impl Artifact {
    /// Name of the file in the output directory
    pub fn file_name(&self) -> &'static str {
        match self {
            Artifact::Schedule => "schedule.smv",
            Artifact::State => "state.smv",
            Artifact::Combined => "combined.smv",
            Artifact::Bmc => "bmc.smv",
            Artifact::Path => "path.cex",
            Artifact::Delay => "delay.json",
        }
    }
}

/// Writer of the artifacts of a check into an output directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactWriter {
    dir: PathBuf,
}

impl ArtifactWriter {
    /// Create a writer for `dir`, creating the directory if necessary
    pub fn new<P: Into<PathBuf>>(dir: P) -> Result<Self, CheckerError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| CheckerError::Artifact {
            path: dir.clone(),
            source,
        })?;
        Ok(Self { dir })
    }

    /// Output directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Location of `artifact`
    pub fn path(&self, artifact: Artifact) -> PathBuf {
        self.dir.join(artifact.file_name())
    }

    /// Write `contents` to `artifact`, replacing earlier contents
    pub fn write(&self, artifact: Artifact, contents: &str) -> Result<PathBuf, CheckerError> {
        let path = self.path(artifact);
        fs::write(&path, contents).map_err(|source| CheckerError::Artifact {
            path: path.clone(),
            source,
        })?;
        debug!("Wrote {}", path.display());
        Ok(path)
    }

    /// Mark the path file as not containing a result of this check
    pub fn write_path_placeholder(&self) -> Result<PathBuf, CheckerError> {
        self.write(Artifact::Path, PATH_PLACEHOLDER)
    }

    /// Write the lines of a path, trailing whitespace removed
    pub fn write_path<S: AsRef<str>>(&self, lines: &[S]) -> Result<PathBuf, CheckerError> {
        let contents = lines
            .iter()
            .map(|l| l.as_ref().trim_end())
            .collect::<Vec<_>>()
            .join("\n");
        self.write(Artifact::Path, &contents)
    }
}

/// Content of `delay.json`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DelayRecord {
    /// Time of the plant state the check started from
    pub time: Time,
    /// Wall clock time of the plant state
    pub absolute_time: Value,
    /// Horizon of the schedule
    pub horizon: TimeWindow,
    /// The infeasible task
    pub task: Task,
    /// Number of time steps the deadline has to be delayed at least
    pub delay: Time,
}

/// Records the delay of an infeasible task whenever a better bound is known
#[derive(Debug)]
pub struct DelayRecorder<'a> {
    writer: &'a ArtifactWriter,
    time: Time,
    absolute_time: Value,
    horizon: TimeWindow,
    task: Task,
    recorded: Option<Time>,
}

impl<'a> DelayRecorder<'a> {
    /// Create a recorder for the delay of `task`
    pub fn new(writer: &'a ArtifactWriter, schedule: &Schedule, state: &PlantState, task: &Task) -> Self {
        Self {
            writer,
            time: state.time(),
            absolute_time: state.absolute_time().clone(),
            horizon: schedule.horizon(),
            task: task.clone(),
            recorded: None,
        }
    }

    /// Record that the deadline `lower` was proven infeasible
    ///
    /// The delay is the distance to the first deadline that might be
    /// feasible: `lower - deadline + 1`.
    pub fn record(&mut self, lower: Time) -> Result<Time, CheckerError> {
        let delay = lower - self.task.deadline() + 1;
        let record = DelayRecord {
            time: self.time,
            absolute_time: self.absolute_time.clone(),
            horizon: self.horizon,
            task: self.task.clone(),
            delay,
        };
        let json = serde_json::to_string_pretty(&record).map_err(|e| CheckerError::Artifact {
            path: self.writer.path(Artifact::Delay),
            source: e.into(),
        })?;
        self.writer.write(Artifact::Delay, &json)?;

        info!("Task {} is delayed by at least {delay} time step(s)", self.task);
        self.recorded = Some(delay);
        Ok(delay)
    }

    /// Last recorded delay
    pub fn recorded(&self) -> Option<Time> {
        self.recorded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schedule() -> Schedule {
        Schedule::from_json_str(r#"{"horizon": [0, 100], "tasks": {"U1": [["t1", [0, 50]]]}}"#)
            .unwrap()
    }

    #[test]
    fn test_path_file() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ArtifactWriter::new(dir.path().join("out")).unwrap();

        writer.write_path_placeholder().unwrap();
        assert_eq!(
            fs::read_to_string(writer.path(Artifact::Path)).unwrap(),
            PATH_PLACEHOLDER
        );

        writer.write_path(&["-> State: 1.1 <-   ", "  time = 3\t"]).unwrap();
        assert_eq!(
            fs::read_to_string(dir.path().join("out/path.cex")).unwrap(),
            "-> State: 1.1 <-\n  time = 3"
        );
    }

    #[test]
    fn test_delay_record() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ArtifactWriter::new(dir.path()).unwrap();
        let schedule = schedule();
        let state =
            PlantState::from_json_str(r#"{"time": 4, "_absolute_time": "2024-01-01T10:00:00"}"#)
                .unwrap();
        let task = schedule.ordered_tasks().remove(0);

        let mut recorder = DelayRecorder::new(&writer, &schedule, &state, &task);
        assert_eq!(recorder.record(50).unwrap(), 1);
        assert_eq!(recorder.record(55).unwrap(), 6);
        assert_eq!(recorder.recorded(), Some(6));

        let json: Value =
            serde_json::from_str(&fs::read_to_string(writer.path(Artifact::Delay)).unwrap())
                .unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "time": 4,
                "absolute_time": "2024-01-01T10:00:00",
                "horizon": [0, 100],
                "task": ["U1", "t1", [0, 50]],
                "delay": 6
            })
        );
    }
}
