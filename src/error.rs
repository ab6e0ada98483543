//! Error types for scheduling operations.
//!
//! Data-integrity failures (unknown slot, unknown target, duplicate name)
//! abort the enclosing operation; a non-optimal solver outcome is surfaced
//! as a distinct error instead of being committed as an empty schedule.
//! Cache faults are intentionally absent here: a cache read failure falls
//! back to recomputation and a persist failure is only logged.

use crate::models::SlotIndex;

/// Result type for scheduling operations.
pub type ScheduleResult<T> = Result<T, ScheduleError>;

/// Solver termination status for a non-optimal solve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SolveStatus {
    Infeasible,
    Unbounded,
    Error(String),
}

impl std::fmt::Display for SolveStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SolveStatus::Infeasible => write!(f, "infeasible"),
            SolveStatus::Unbounded => write!(f, "unbounded"),
            SolveStatus::Error(reason) => write!(f, "error: {}", reason),
        }
    }
}

/// Error type for scheduling operations.
#[derive(Debug, thiserror::Error)]
pub enum ScheduleError {
    /// A slot index that is not registered in the collection.
    #[error("invalid slot index {0}")]
    InvalidSlot(SlotIndex),

    /// A target name that is not registered in the catalog.
    #[error("unknown target '{0}'")]
    UnknownTarget(String),

    /// A target name that is already registered in the catalog.
    #[error("duplicate target name '{0}'")]
    DuplicateName(String),

    /// The optimizer terminated without an optimal assignment.
    #[error("solver returned {status} during {stage}")]
    Solver { stage: String, status: SolveStatus },

    /// Parameter file could not be read or parsed.
    #[error("configuration error: {0}")]
    Config(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_solve_status_display() {
        assert_eq!(SolveStatus::Infeasible.to_string(), "infeasible");
        assert_eq!(SolveStatus::Unbounded.to_string(), "unbounded");
        assert_eq!(
            SolveStatus::Error("no solver".into()).to_string(),
            "error: no solver"
        );
    }

    #[test]
    fn test_error_messages() {
        let err = ScheduleError::UnknownTarget("SSP_GA_001".into());
        assert_eq!(err.to_string(), "unknown target 'SSP_GA_001'");

        let err = ScheduleError::Solver {
            stage: "priority pass 1".into(),
            status: SolveStatus::Infeasible,
        };
        assert_eq!(
            err.to_string(),
            "solver returned infeasible during priority pass 1"
        );
    }
}
