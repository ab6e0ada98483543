//! # sspplan
//!
//! Multi-night telescope observation scheduling optimizer.
//!
//! This crate assigns discrete telescope-time slots to survey targets over a
//! multi-night campaign, maximizing effective exposure subject to
//! astrophysical visibility constraints, instrument limits and programmatic
//! fairness rules.
//!
//! ## Features
//!
//! - **Slot and target models**: slot usage tracking with a consistent
//!   used/free partition, exposure quotas and completion state
//! - **Optimizer**: one binary integer program per scheduling pass, with
//!   exposure quotas, per-group caps, contiguity rules and observability
//!   gates
//! - **Pipeline**: priority-ordered passes, field reordering, an
//!   unrestricted consolidation pass and slew-time adjustment
//! - **Slew-time cache**: content-addressed persistence of the pairwise
//!   slew-time tensor
//!
//! ## Architecture
//!
//! - [`models`]: slot and target state containers
//! - [`conditions`]: the observing-conditions provider contract and the
//!   slew kinematics it feeds
//! - [`scheduler`]: the optimizer and the multi-stage pipeline
//! - [`config`]: scheduling parameters and observer site
//! - [`error`]: the scheduling error taxonomy
//!
//! The astronomical-geometry engine, catalog loading and reporting live
//! outside this crate and connect through the [`conditions::ObservingConditions`]
//! and [`scheduler::ObservationModel`] traits.

pub mod conditions;
pub mod config;
pub mod error;
pub mod models;
pub mod scheduler;

pub use config::{ObserverSite, PlanParams};
pub use error::{ScheduleError, ScheduleResult, SolveStatus};
pub use models::{SlotCollection, SlotIndex, Target, TargetCatalog, TimeSlot};
pub use scheduler::{
    optimize_schedule, run_pipeline, Assignment, ObservationModel, PlanOutcome, SolveOutcome,
};
