//! Assembly of the model checked for a task
//!
//! The model of a task consists of the deadline specification of its
//! sub-schedule (`schedule.smv`), the initial state constraints
//! (`state.smv`) and the auxiliary files listed for the task in the metadata.
//!
//! Metadata is a JSON object mapping `"*"` to files included for every task
//! and scheduling units to objects mapping task names to files:
//!
//! ```json
//! {
//!     "*": ["process.smv"],
//!     "U1": {"fill": ["fill_assumptions.smv"]}
//! }
//! ```
//!
//! Relative paths are resolved against the directory of the metadata file.

use std::{
    fmt, fs,
    path::{Path, PathBuf},
};

use deadline_combine::{CombineOptions, Combiner};
use deadline_schedule::{DeadlineSpecification, PlantState, Task};
use indexmap::IndexMap;
use log::{debug, info, warn};
use serde::Deserialize;

use crate::{
    CheckerError,
    artifacts::{Artifact, ArtifactWriter},
};

/// Key of the files included for every task
pub const ALL_TASKS_KEY: &str = "*";

/// Error while reading metadata
#[derive(Debug)]
pub enum MetadataError {
    /// The file could not be read
    Io(std::io::Error),
    /// The file is not valid metadata
    Json(serde_json::Error),
    /// The entry of `"*"` is not a list of files
    InvalidWildcard,
}

impl fmt::Display for MetadataError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataError::Io(e) => write!(f, "{e}"),
            MetadataError::Json(e) => write!(f, "{e}"),
            MetadataError::InvalidWildcard => {
                write!(f, "entry '{ALL_TASKS_KEY}' must be a list of files")
            }
        }
    }
}

impl std::error::Error for MetadataError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            MetadataError::Io(e) => Some(e),
            MetadataError::Json(e) => Some(e),
            MetadataError::InvalidWildcard => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum MetadataEntry {
    Files(Vec<PathBuf>),
    Tasks(IndexMap<String, Vec<PathBuf>>),
}

/// Auxiliary model files per task
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    common: Vec<PathBuf>,
    tasks: IndexMap<String, IndexMap<String, Vec<PathBuf>>>,
}

impl Metadata {
    /// Parse metadata, resolving relative paths against `base_dir`
    pub fn from_json_str(input: &str, base_dir: &Path) -> Result<Self, MetadataError> {
        let entries: IndexMap<String, MetadataEntry> =
            serde_json::from_str(input).map_err(MetadataError::Json)?;
        let resolve = |p: PathBuf| if p.is_absolute() { p } else { base_dir.join(p) };

        let mut metadata = Metadata::default();
        for (key, entry) in entries.into_iter() {
            match (key.as_str(), entry) {
                (ALL_TASKS_KEY, MetadataEntry::Files(files)) => {
                    metadata.common = files.into_iter().map(resolve).collect();
                }
                (ALL_TASKS_KEY, MetadataEntry::Tasks(_)) => {
                    return Err(MetadataError::InvalidWildcard);
                }
                (_, MetadataEntry::Tasks(tasks)) => {
                    let tasks: IndexMap<String, Vec<PathBuf>> = tasks
                        .into_iter()
                        .map(|(name, files)| (name, files.into_iter().map(resolve).collect::<Vec<_>>()))
                        .collect();
                    metadata.tasks.insert(key, tasks);
                }
                (_, MetadataEntry::Files(files)) => {
                    // a unit listing files directly applies them to all of its tasks
                    let mut tasks: IndexMap<String, Vec<PathBuf>> = IndexMap::new();
                    tasks.insert(
                        ALL_TASKS_KEY.to_string(),
                        files.into_iter().map(resolve).collect(),
                    );
                    metadata.tasks.insert(key, tasks);
                }
            }
        }

        Ok(metadata)
    }

    /// Read metadata from `path`
    pub fn from_file(path: &Path) -> Result<Self, CheckerError> {
        let to_err = |source| CheckerError::Metadata {
            path: path.to_path_buf(),
            source,
        };
        let input = fs::read_to_string(path).map_err(|e| to_err(MetadataError::Io(e)))?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new(""));
        Self::from_json_str(&input, base_dir).map_err(to_err)
    }

    /// Files included for every task
    pub fn common_files(&self) -> &[PathBuf] {
        &self.common
    }

    /// All files to include for `task`, common files first
    ///
    /// A task without an entry only gets the common files, which is logged
    /// as a warning.
    pub fn files_for(&self, task: &Task) -> Vec<PathBuf> {
        let mut files = self.common.clone();

        let unit = self.tasks.get(task.unit());
        let unit_files = unit.and_then(|u| u.get(ALL_TASKS_KEY));
        let task_files = unit.and_then(|u| u.get(task.name()));

        if unit_files.is_none() && task_files.is_none() {
            warn!(
                "No metadata for task {}/{}, continuing without task specific files",
                task.unit(),
                task.name()
            );
        }

        files.extend(unit_files.into_iter().flatten().cloned());
        files.extend(task_files.into_iter().flatten().cloned());
        files
    }
}

/// Combined model of a task
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskModel {
    /// Location of `combined.smv`
    pub path: PathBuf,
    /// Text of the combined model
    pub text: String,
}

/// Stage assembling the combined model of a task
pub struct ModelCombiner {
    combiner: Box<dyn Combiner>,
    options: CombineOptions,
    metadata: Option<Metadata>,
}

impl ModelCombiner {
    /// Create a new stage using `combiner`
    pub fn new(combiner: Box<dyn Combiner>, options: CombineOptions, metadata: Option<Metadata>) -> Self {
        Self {
            combiner,
            options,
            metadata,
        }
    }

    /// Write `schedule.smv` and `state.smv` and combine them with the
    /// metadata files of `task` into `combined.smv`
    pub fn combine(
        &self,
        writer: &ArtifactWriter,
        spec: &DeadlineSpecification,
        state: &PlantState,
        task: &Task,
    ) -> Result<TaskModel, CheckerError> {
        let schedule_file = writer.write(Artifact::Schedule, &spec.to_string())?;
        let state_file = writer.write(Artifact::State, &state.to_smv())?;

        let mut files = vec![schedule_file, state_file];
        if let Some(metadata) = self.metadata.as_ref() {
            files.extend(metadata.files_for(task));
        }
        debug!("Combining model from {files:?}");

        let text = self.combiner.combine_files(&files, &self.options)?;
        let path = writer.write(Artifact::Combined, &text)?;
        info!("Combined model of task {task} written to {}", path.display());

        Ok(TaskModel { path, text })
    }
}

impl fmt::Debug for ModelCombiner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelCombiner")
            .field("options", &self.options)
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}
