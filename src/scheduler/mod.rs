//! Schedule optimization.
//!
//! [`optimizer`] formulates one scheduling pass as a binary integer
//! program and solves it; [`pipeline`] chains the passes (priority-ordered,
//! field reordering, unrestricted, slew-adjusted) into the final committed
//! schedule.

pub mod optimizer;
pub mod pipeline;


pub use optimizer::optimize_schedule;
pub use pipeline::{run_pipeline, ObservationModel, PlanOutcome};

use std::collections::BTreeMap;

use crate::error::{ScheduleError, ScheduleResult, SolveStatus};
use crate::models::{SlotIndex, Target};

/// Name of the reserved pseudo-target absorbing unassigned capacity.
pub const DUMMY_NAME: &str = "dummy";
/// Working-group tag of the reserved pseudo-target.
pub const DUMMY_GROUP: &str = "dummy";

/// Solved slot-to-target mapping.
///
/// Every candidate slot maps to exactly one target name; slots left
/// intentionally idle map to the dummy.
#[derive(Debug, Clone, Default)]
pub struct Assignment {
    by_slot: BTreeMap<SlotIndex, String>,
}

impl Assignment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn assign(&mut self, slot: SlotIndex, target: impl Into<String>) {
        self.by_slot.insert(slot, target.into());
    }

    pub fn target_for(&self, slot: SlotIndex) -> Option<&str> {
        self.by_slot.get(&slot).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.by_slot.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_slot.is_empty()
    }

    /// All (slot, target) entries, dummy included, in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (&SlotIndex, &String)> {
        self.by_slot.iter()
    }

    /// Entries assigned to real targets, in slot order.
    pub fn real_assignments(&self) -> impl Iterator<Item = (&SlotIndex, &String)> {
        self.by_slot.iter().filter(|(_, name)| *name != DUMMY_NAME)
    }

    /// Number of slots held by one target.
    pub fn count_for(&self, target: &str) -> usize {
        self.by_slot.values().filter(|name| *name == target).count()
    }
}

/// Result of an optimal solve.
#[derive(Debug, Clone)]
pub struct Solved {
    pub assignment: Assignment,
    pub candidate_slots: Vec<SlotIndex>,
    pub candidate_targets: Vec<String>,
}

/// Closed solver outcome. Callers match exhaustively; only
/// [`SolveOutcome::Optimal`] may ever be committed.
#[derive(Debug, Clone)]
pub enum SolveOutcome {
    Optimal(Solved),
    Infeasible,
    Unbounded,
    Error(String),
}

impl SolveOutcome {
    /// Unwrap an optimal solve or surface the failure as a
    /// [`ScheduleError::Solver`] tagged with the pipeline stage.
    pub fn into_solved(self, stage: &str) -> ScheduleResult<Solved> {
        let status = match self {
            SolveOutcome::Optimal(solved) => return Ok(solved),
            SolveOutcome::Infeasible => SolveStatus::Infeasible,
            SolveOutcome::Unbounded => SolveStatus::Unbounded,
            SolveOutcome::Error(reason) => SolveStatus::Error(reason),
        };
        Err(ScheduleError::Solver {
            stage: stage.to_string(),
            status,
        })
    }

    pub fn is_optimal(&self) -> bool {
        matches!(self, SolveOutcome::Optimal(_))
    }
}

/// Build the capacity-absorbing pseudo-target sized to a candidate pool.
pub(crate) fn dummy_target(quota: u32) -> Target {
    Target::new(
        DUMMY_GROUP,
        DUMMY_NAME,
        qtty::Degrees::new(0.0),
        qtty::Degrees::new(0.0),
        qtty::Degrees::new(0.0),
        quota,
        10,
        0,
    )
}
