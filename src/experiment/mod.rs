//! Experiment orchestration.
//!
//! A run steps an ordered combo sequence through three loosely-coupled
//! actors: the motion subsystem (real travel time, fault potential), the
//! screen-automation layer (no programmatic acknowledgment channel), and the
//! filesystem handoff owned by the external acquisition tool.
//!
//! - [`ComboExecutor`] handles one combo: move all stages, then drive one
//!   acquisition cycle, producing exactly one [`AcquisitionResult`].
//! - [`Sequencer`] iterates combos strictly one at a time, decides what each
//!   result means for the run, and returns every stage to zero as the
//!   terminal action.

pub mod executor;
pub mod sequencer;

pub use executor::{AcquisitionResult, ComboExecutor, MotionPlan};
pub use sequencer::{run_directory, RunReport, RunState, Sequencer};
