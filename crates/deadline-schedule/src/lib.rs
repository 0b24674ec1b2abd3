//! Data model of the DEADLINE schedule feasibility checker
//!
//! This crate contains the types describing what is checked:
//! - [`schedule`]: schedules of time-bounded tasks on scheduling units,
//! - [`state`]: snapshots of the plant state the check starts from,
//! - [`spec_builder`]: the translation of (sub-)schedules into SMV deadline
//!   specifications over per-task counters.
//!
//! All types validate their invariants on construction. A [`Schedule`] whose
//! tasks exceed the horizon can not be constructed.

pub mod schedule;
pub mod spec_builder;
pub mod state;

pub use schedule::{
    Schedule, ScheduleParseError, Task, TaskEntry, Time, TimeWindow, ValidationError,
    active_positions,
};
pub use spec_builder::{DeadlineSpecBuilder, DeadlineSpecification, TaskCounts, TaskTarget};
pub use state::{PlantState, StateValue};
