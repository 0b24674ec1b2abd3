//! Snapshots of the plant state
//!
//! The plant state is a flat JSON object mapping state and input variables to
//! boolean or integer values. The entry `time` is mandatory. Entries whose name
//! starts with an underscore (e.g. `_absolute_time`) carry metadata and are not
//! part of the process model.

use std::{fmt, fs, path::Path};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::schedule::{ScheduleParseError, Time, ValidationError};

/// Name of the entry holding the current time
pub const TIME_VARIABLE: &str = "time";

/// Name of the entry holding the wall clock time of the snapshot
pub const ABSOLUTE_TIME_ENTRY: &str = "_absolute_time";

/// Value of a single plant state variable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StateValue {
    /// Boolean variable
    Bool(bool),
    /// Integer variable
    Int(i64),
}

/// Snapshot of all state and input variables at a point in time
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "IndexMap<String, Value>")]
pub struct PlantState {
    time: Time,
    absolute_time: Value,
    values: IndexMap<String, StateValue>,
}

impl TryFrom<IndexMap<String, Value>> for PlantState {
    type Error = ValidationError;

    fn try_from(entries: IndexMap<String, Value>) -> Result<Self, Self::Error> {
        let mut time = None;
        let mut absolute_time = Value::Null;
        let mut values = IndexMap::new();

        for (name, value) in entries.into_iter() {
            if name == ABSOLUTE_TIME_ENTRY {
                absolute_time = value;
                continue;
            }
            if name.starts_with('_') {
                continue;
            }

            let value = match value {
                Value::Bool(b) => StateValue::Bool(b),
                Value::Number(n) if n.is_i64() => {
                    StateValue::Int(n.as_i64().ok_or_else(|| ValidationError::InvalidStateValue(name.clone()))?)
                }
                _ => return Err(ValidationError::InvalidStateValue(name)),
            };

            if name == TIME_VARIABLE {
                match value {
                    StateValue::Int(t) => time = Some(t),
                    StateValue::Bool(_) => return Err(ValidationError::MissingTime),
                }
            }

            values.insert(name, value);
        }

        Ok(Self {
            time: time.ok_or(ValidationError::MissingTime)?,
            absolute_time,
            values,
        })
    }
}

impl PlantState {
    /// Parse and validate a plant state from a JSON string
    pub fn from_json_str(input: &str) -> Result<Self, ScheduleParseError> {
        let entries: IndexMap<String, Value> = serde_json::from_str(input)?;
        Ok(PlantState::try_from(entries)?)
    }

    /// Read, parse and validate a plant state from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ScheduleParseError> {
        let input = fs::read_to_string(path)?;
        Self::from_json_str(&input)
    }

    /// Current time of the plant
    pub fn time(&self) -> Time {
        self.time
    }

    /// Wall clock time of the snapshot, `null` if not recorded
    pub fn absolute_time(&self) -> &Value {
        &self.absolute_time
    }

    /// Value of the variable `name`
    pub fn get(&self, name: &str) -> Option<StateValue> {
        self.values.get(name).copied()
    }

    /// All variables of the snapshot in input order, including `time`
    pub fn values(&self) -> impl Iterator<Item = (&String, &StateValue)> {
        self.values.iter()
    }

    /// Render the snapshot as SMV initial state constraints
    ///
    /// Emits one `INIT` line per variable: `INIT var;` / `INIT !var;` for
    /// booleans and `INIT var = N;` for integers.
    pub fn to_smv(&self) -> String {
        self.values
            .iter()
            .map(|(name, value)| match value {
                StateValue::Bool(true) => format!("INIT {name};\n"),
                StateValue::Bool(false) => format!("INIT !{name};\n"),
                StateValue::Int(n) => format!("INIT {name} = {n};\n"),
            })
            .collect()
    }
}

impl fmt::Display for PlantState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let values = self
            .values
            .iter()
            .map(|(name, value)| match value {
                StateValue::Bool(b) => format!("{name} = {b}"),
                StateValue::Int(n) => format!("{name} = {n}"),
            })
            .collect::<Vec<_>>()
            .join(", ");
        write!(f, "{{{values}}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_state() {
        let state = PlantState::from_json_str(
            r#"{"time": 12, "_absolute_time": "2024-03-01T10:00:00", "valve_open": true, "level": -3, "pump": false}"#,
        )
        .unwrap();

        assert_eq!(state.time(), 12);
        assert_eq!(
            state.absolute_time(),
            &Value::String("2024-03-01T10:00:00".to_string())
        );
        assert_eq!(state.get("valve_open"), Some(StateValue::Bool(true)));
        assert_eq!(state.get("level"), Some(StateValue::Int(-3)));
        assert_eq!(state.get("_absolute_time"), None);
    }

    #[test]
    fn test_state_to_smv() {
        let state = PlantState::from_json_str(
            r#"{"time": 12, "_absolute_time": 1700000000, "valve_open": true, "pump": false, "level": 7}"#,
        )
        .unwrap();

        assert_eq!(
            state.to_smv(),
            "INIT time = 12;\nINIT valve_open;\nINIT !pump;\nINIT level = 7;\n"
        );
    }

    #[test]
    fn test_missing_time() {
        let err = PlantState::from_json_str(r#"{"pump": false}"#).unwrap_err();
        assert!(matches!(
            err,
            ScheduleParseError::Validation(ValidationError::MissingTime)
        ));

        let err = PlantState::from_json_str(r#"{"time": true}"#).unwrap_err();
        assert!(matches!(
            err,
            ScheduleParseError::Validation(ValidationError::MissingTime)
        ));
    }

    #[test]
    fn test_reject_non_scalar_values() {
        let err = PlantState::from_json_str(r#"{"time": 0, "level": 1.5}"#).unwrap_err();
        match err {
            ScheduleParseError::Validation(ValidationError::InvalidStateValue(var)) => {
                assert_eq!(var, "level")
            }
            e => panic!("Unexpected error {e}"),
        }

        assert!(PlantState::from_json_str(r#"{"time": 0, "mode": "auto"}"#).is_err());
    }

    #[test]
    fn test_display_state() {
        let state = PlantState::from_json_str(r#"{"time": 3, "pump": true}"#).unwrap();
        assert_eq!(state.to_string(), "{time = 3, pump = true}");
    }
}
