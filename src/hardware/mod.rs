//! Motion subsystem boundary.
//!
//! The sequencing core never reimplements axis kinematics or offset handling;
//! it only issues "move and wait" commands through the [`MotionSystem`]
//! capability trait. `move_to` blocks until the stage reports settled or a
//! fault, relying on the backend's own blocking contract. There is no
//! timeout-free busy wait anywhere above this trait.
//!
//! Backends:
//! - [`MockMotion`] simulates four stages for tests and `--simulate` runs.
//! - `Esp300Motion` (feature `instrument_newport`) drives a Newport ESP300
//!   controller over RS-232.

use anyhow::Result;
use async_trait::async_trait;

#[cfg(feature = "instrument_newport")]
pub mod esp300;
pub mod mock;

#[cfg(feature = "instrument_newport")]
pub use esp300::Esp300Motion;
pub use mock::MockMotion;

/// Identifier of one controllable motion axis.
pub type StageId = u8;

/// Capability trait for the motion subsystem.
#[async_trait]
pub trait MotionSystem: Send + Sync {
    /// Move one stage to an absolute position and block until it has settled.
    ///
    /// An error is a motion fault: the stage did not settle, rejected the
    /// command, or the command was out of range. After a fault the stage
    /// position is no longer trustworthy.
    async fn move_to(&self, stage: StageId, position: f64) -> Result<()>;

    /// Return one stage to its configured logical zero and block until
    /// settled.
    async fn zero(&self, stage: StageId) -> Result<()>;
}
