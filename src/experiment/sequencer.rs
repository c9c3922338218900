//! Run-level sequencing.

use super::executor::{AcquisitionResult, ComboExecutor};
use crate::error::{AppResult, TomoError};
use crate::hardware::MotionSystem;
use crate::table::Combo;
use crate::vision::ScreenDriver;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Sequencer lifecycle over a combo table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// No run started yet
    Idle,
    /// Executing the combo at this table index
    Running(usize),
    /// A motion fault ended the run early
    Faulted,
    /// The combo sequence was exhausted
    Complete,
}

/// Summary of one finished run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    /// Combos that received an `AcquisitionResult`
    pub attempted: usize,
    /// Combos whose output file was confirmed saved
    pub saved: usize,
    /// Combos skipped on a GUI-automation failure
    pub skipped: usize,
    /// Directory holding this run's output files
    pub output_dir: PathBuf,
}

/// Build the timestamped output directory path for one run.
pub fn run_directory(output_root: &Path, description: &str) -> PathBuf {
    let timestamp = chrono::Local::now().format("%Y-%m-%d-%H%M%S");
    output_root.join(format!("{timestamp}_{description}"))
}

/// Drives combos through the executor one at a time and owns run-level
/// failure policy.
///
/// A GUI-automation failure skips that combo and the run continues; hardware
/// time already spent on earlier combos is never wasted on an abort. A motion
/// fault is fatal, since stage position is no longer trustworthy. Either way
/// the terminal action is the same: every stage is commanded back to its
/// configured zero, exactly once per run.
pub struct Sequencer<M, S> {
    motion: Arc<M>,
    executor: ComboExecutor<M, S>,
    state: RunState,
}

impl<M: MotionSystem, S: ScreenDriver> Sequencer<M, S> {
    /// Build a sequencer over a motion backend and a combo executor.
    pub fn new(motion: Arc<M>, executor: ComboExecutor<M, S>) -> Self {
        Self {
            motion,
            executor,
            state: RunState::Idle,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> RunState {
        self.state
    }

    /// Execute the whole combo sequence.
    ///
    /// Creates `output_dir`, runs each combo to exactly one result, then
    /// returns all stages to zero before reporting. A motion fault is
    /// returned as the run error, but only after the zero-return has been
    /// issued.
    pub async fn run(&mut self, combos: &[Combo], output_dir: &Path) -> AppResult<RunReport> {
        std::fs::create_dir_all(output_dir)?;
        info!(output_dir = %output_dir.display(), combos = combos.len(), "starting run");

        let mut report = RunReport {
            attempted: 0,
            saved: 0,
            skipped: 0,
            output_dir: output_dir.to_path_buf(),
        };
        let mut fatal: Option<TomoError> = None;

        for (index, combo) in combos.iter().enumerate() {
            self.state = RunState::Running(index);
            let identity = combo.identity(index);

            let result = self.executor.run(index, combo, output_dir).await;
            report.attempted += 1;

            match result {
                AcquisitionResult::Saved { file } => {
                    info!(combo = %identity, file = %file.display(), "combo saved");
                    report.saved += 1;
                }
                AcquisitionResult::Skipped { failure } => {
                    warn!(combo = %identity, %failure, "combo skipped, run continues");
                    report.skipped += 1;
                }
                AcquisitionResult::MotionFault { message } => {
                    error!(combo = %identity, %message, "motion fault, aborting run");
                    fatal = Some(TomoError::Motion(message));
                    break;
                }
            }
        }

        self.state = if fatal.is_some() {
            RunState::Faulted
        } else {
            RunState::Complete
        };

        self.return_to_zero().await;

        match fatal {
            Some(err) => Err(err),
            None => Ok(report),
        }
    }

    /// Command every stage back to its configured zero.
    ///
    /// Per-stage failures are logged and do not stop the remaining stages
    /// from being zeroed, nor do they mask the run outcome.
    async fn return_to_zero(&self) {
        info!("returning all stages to their configured zero positions");
        for stage in self.executor.stages() {
            if let Err(err) = self.motion.zero(*stage).await {
                error!(stage, error = %format!("{err:#}"), "zero-return failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::AcquisitionPanel;
    use crate::config::Settings;
    use crate::hardware::{MockMotion, StageId};
    use crate::table::parse_table;
    use crate::vision::{Anchors, SimulatedScreen, Template};
    use std::time::Duration;

    fn anchors() -> Anchors {
        Anchors {
            start: Template::new("start.png", "screenshots/start.png"),
            stop: Template::new("stop.png", "screenshots/stop.png"),
            save_tag: Template::new("tag.png", "screenshots/tag.png"),
            save_dialog: Template::new("dialog.png", "screenshots/dialog.png"),
        }
    }

    fn fast_settings() -> Settings {
        let mut settings = Settings::default();
        settings.screen.poll_interval = Duration::from_millis(5);
        settings.screen.locate_timeout = Duration::from_millis(40);
        settings.screen.save_dialog_timeout = Duration::from_millis(40);
        settings.screen.type_settle = Duration::from_millis(1);
        settings.screen.pre_stop_pause = Duration::from_millis(1);
        settings.motion.settle_pause = Duration::from_millis(1);
        settings
    }

    fn sequencer(
        motion: Arc<MockMotion>,
        screen: SimulatedScreen,
    ) -> Sequencer<MockMotion, SimulatedScreen> {
        let settings = fast_settings();
        let panel = AcquisitionPanel::new(screen, anchors(), &settings.screen);
        let executor = ComboExecutor::new(
            Arc::clone(&motion),
            panel,
            vec![1, 2, 3, 4],
            Duration::from_millis(2),
            &settings,
        );
        Sequencer::new(motion, executor)
    }

    const STAGES: [StageId; 4] = [1, 2, 3, 4];

    #[tokio::test]
    async fn test_full_sequence_completes() {
        let dir = tempfile::tempdir().unwrap();
        let motion = Arc::new(MockMotion::new(&STAGES));
        let screen = SimulatedScreen::new(anchors());
        let mut seq = sequencer(Arc::clone(&motion), screen);

        let combos = parse_table("10.0,0.0,90.0,5.0\n20.0,5.0,45.0,0.0,my_label\n").unwrap();
        let report = seq.run(&combos, dir.path()).await.unwrap();

        assert_eq!(report.attempted, 2);
        assert_eq!(report.saved, 2);
        assert_eq!(report.skipped, 0);
        assert_eq!(seq.state(), RunState::Complete);
        assert!(dir.path().join("combo000.csv").is_file());
        assert!(dir.path().join("my_label.csv").is_file());
        // Exactly one zero command per stage, after the last combo
        assert_eq!(motion.zero_calls().await, vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_gui_failure_skips_and_continues() {
        let dir = tempfile::tempdir().unwrap();
        let motion = Arc::new(MockMotion::new(&STAGES));
        let screen = SimulatedScreen::new(anchors());
        screen.refuse("start.png").await;
        let mut seq = sequencer(Arc::clone(&motion), screen);

        let combos = parse_table("10.0,0.0,90.0,5.0\n20.0,5.0,45.0,0.0\n").unwrap();
        let report = seq.run(&combos, dir.path()).await.unwrap();

        assert_eq!(report.attempted, 2);
        assert_eq!(report.saved, 0);
        assert_eq!(report.skipped, 2);
        assert_eq!(seq.state(), RunState::Complete);
        // Zero-return still runs exactly once
        assert_eq!(motion.zero_calls().await, vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_motion_fault_is_fatal_but_zero_returns() {
        let dir = tempfile::tempdir().unwrap();
        let motion = Arc::new(MockMotion::new(&STAGES));
        // First combo is fine; the second one's stage-1 target faults
        motion.fail_at_position(77.7).await;
        let screen = SimulatedScreen::new(anchors());
        let mut seq = sequencer(Arc::clone(&motion), screen);

        let combos = parse_table("10.0,0.0,90.0,5.0\n77.7,5.0,45.0,0.0\n3.0,3.0,3.0,3.0\n").unwrap();
        let err = seq.run(&combos, dir.path()).await.unwrap_err();

        match err {
            TomoError::Motion(message) => assert!(message.contains("stage 1")),
            other => panic!("expected Motion error, got {other:?}"),
        }
        assert_eq!(seq.state(), RunState::Faulted);
        // First combo completed, third was never attempted
        assert!(dir.path().join("combo000.csv").is_file());
        assert!(!dir.path().join("combo002.csv").exists());
        assert_eq!(motion.zero_calls().await, vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_zero_failure_does_not_mask_outcome() {
        let dir = tempfile::tempdir().unwrap();
        let motion = Arc::new(MockMotion::new(&STAGES));
        motion.fail_zero(3).await;
        let screen = SimulatedScreen::new(anchors());
        let mut seq = sequencer(Arc::clone(&motion), screen);

        let combos = parse_table("10.0,0.0,90.0,5.0\n").unwrap();
        let report = seq.run(&combos, dir.path()).await.unwrap();

        assert_eq!(report.saved, 1);
        // The failed stage-3 zero is logged, the remaining stages still zero
        assert_eq!(motion.zero_calls().await, vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_empty_table_still_zero_returns() {
        let dir = tempfile::tempdir().unwrap();
        let motion = Arc::new(MockMotion::new(&STAGES));
        let screen = SimulatedScreen::new(anchors());
        let mut seq = sequencer(Arc::clone(&motion), screen);

        let report = seq.run(&[], dir.path()).await.unwrap();
        assert_eq!(report.attempted, 0);
        assert_eq!(seq.state(), RunState::Complete);
        assert_eq!(motion.zero_calls().await, vec![1, 2, 3, 4]);
    }
}
