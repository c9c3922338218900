//! Single-combo execution.

use crate::acquisition::{AcquisitionFailure, AcquisitionPanel};
use crate::config::Settings;
use crate::hardware::{MotionSystem, StageId};
use crate::table::Combo;
use crate::vision::ScreenDriver;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;

/// The stage-to-target mapping for one combo. Derived, not persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct MotionPlan {
    moves: Vec<(StageId, f64)>,
}

impl MotionPlan {
    /// Pair each actuated stage with its target from the combo, in stage-list
    /// order.
    pub fn new(stages: &[StageId], combo: &Combo) -> Self {
        Self {
            moves: stages
                .iter()
                .copied()
                .zip(combo.positions.iter().copied())
                .collect(),
        }
    }

    /// The planned moves, in issue order.
    pub fn moves(&self) -> &[(StageId, f64)] {
        &self.moves
    }
}

/// The outcome of one combo's data-collection cycle.
///
/// Every combo consumed by the sequencer yields exactly one of these before
/// the next combo begins.
#[derive(Debug)]
pub enum AcquisitionResult {
    /// Acquisition completed and the output file was confirmed saved.
    Saved {
        /// Path the acquisition tool was told to write
        file: PathBuf,
    },
    /// A GUI-automation step failed; the combo is skipped.
    Skipped {
        /// The typed failure, tagged with step and template
        failure: AcquisitionFailure,
    },
    /// A stage did not settle. Fatal for the run; acquisition was never
    /// attempted for this combo.
    MotionFault {
        /// Fault description including the stage
        message: String,
    },
}

/// Executes one combo: motion first, then one acquisition cycle.
pub struct ComboExecutor<M, S> {
    motion: Arc<M>,
    panel: AcquisitionPanel<S>,
    stages: Vec<StageId>,
    dwell: Duration,
    settle_pause: Duration,
    pre_stop_pause: Duration,
}

impl<M: MotionSystem, S: ScreenDriver> ComboExecutor<M, S> {
    /// Build an executor over the motion backend and acquisition panel.
    ///
    /// `dwell` is the configured wait between starting and stopping data
    /// collection; it has no default.
    pub fn new(
        motion: Arc<M>,
        panel: AcquisitionPanel<S>,
        stages: Vec<StageId>,
        dwell: Duration,
        settings: &Settings,
    ) -> Self {
        Self {
            motion,
            panel,
            stages,
            dwell,
            settle_pause: settings.motion.settle_pause,
            pre_stop_pause: settings.screen.pre_stop_pause,
        }
    }

    /// Stages actuated by this executor, in issue order.
    pub fn stages(&self) -> &[StageId] {
        &self.stages
    }

    /// Run one combo to its `AcquisitionResult`.
    ///
    /// A motion fault short-circuits: no GUI action is attempted for a combo
    /// whose stages did not settle.
    pub async fn run(&self, index: usize, combo: &Combo, output_dir: &Path) -> AcquisitionResult {
        let plan = MotionPlan::new(&self.stages, combo);
        for (stage, position) in plan.moves() {
            debug!(stage, position, "moving stage");
            if let Err(err) = self.motion.move_to(*stage, *position).await {
                return AcquisitionResult::MotionFault {
                    message: format!("stage {stage}: {err:#}"),
                };
            }
        }
        sleep(self.settle_pause).await;

        let file = output_dir.join(combo.output_file_name(index));
        let session = self.panel.acquire().await;

        if let Err(failure) = session.start().await {
            return AcquisitionResult::Skipped { failure };
        }
        sleep(self.dwell).await;
        sleep(self.pre_stop_pause).await;
        if let Err(failure) = session.stop().await {
            return AcquisitionResult::Skipped { failure };
        }
        if let Err(failure) = session.save_as(&file).await {
            return AcquisitionResult::Skipped { failure };
        }

        AcquisitionResult::Saved { file }
    }
}
