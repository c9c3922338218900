//! End-to-end runs against the simulated backends: motion table in, combo
//! CSVs and a summary file out, no hardware or display attached.

use qtomo::acquisition::AcquisitionPanel;
use qtomo::config::Settings;
use qtomo::error::TomoError;
use qtomo::experiment::{ComboExecutor, RunState, Sequencer};
use qtomo::hardware::{MockMotion, StageId};
use qtomo::processing::{self, SUMMARY_FILE};
use qtomo::table;
use qtomo::vision::SimulatedScreen;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

const STAGES: [StageId; 4] = [1, 2, 3, 4];
const COLUMN: &str = "Pattern 01[counts]";

fn fast_settings() -> Settings {
    let mut settings = Settings::default();
    settings.screen.poll_interval = Duration::from_millis(5);
    settings.screen.locate_timeout = Duration::from_millis(50);
    settings.screen.save_dialog_timeout = Duration::from_millis(50);
    settings.screen.type_settle = Duration::from_millis(1);
    settings.screen.pre_stop_pause = Duration::from_millis(1);
    settings.motion.settle_pause = Duration::from_millis(1);
    settings
}

fn build_run(
    motion: Arc<MockMotion>,
    screen: SimulatedScreen,
    settings: &Settings,
) -> Sequencer<MockMotion, SimulatedScreen> {
    let panel = AcquisitionPanel::new(screen, settings.screen.anchors(), &settings.screen);
    let executor = ComboExecutor::new(
        Arc::clone(&motion),
        panel,
        STAGES.to_vec(),
        Duration::from_millis(2),
        settings,
    );
    Sequencer::new(motion, executor)
}

fn load_table_str(dir: &Path, content: &str) -> Vec<table::Combo> {
    let path = dir.join("motion.txt");
    std::fs::write(&path, content).unwrap();
    table::load_table(&path).unwrap()
}

#[tokio::test]
async fn full_run_produces_files_and_summary() {
    let dir = tempfile::tempdir().unwrap();
    let output_dir = dir.path().join("2026-01-01-000000_itest");
    let settings = fast_settings();

    let combos = load_table_str(dir.path(), "10.0,0.0,90.0,5.0\n20.0,5.0,45.0,0.0,my_label\n");
    assert_eq!(combos.len(), 2);

    let motion = Arc::new(MockMotion::new(&STAGES));
    let screen = SimulatedScreen::new(settings.screen.anchors());
    let mut sequencer = build_run(Arc::clone(&motion), screen, &settings);

    let report = sequencer.run(&combos, &output_dir).await.unwrap();
    assert_eq!(report.attempted, 2);
    assert_eq!(report.saved, 2);
    assert_eq!(sequencer.state(), RunState::Complete);

    // One deterministic CSV per combo
    assert!(output_dir.join("combo000.csv").is_file());
    assert!(output_dir.join("my_label.csv").is_file());

    // Stages were driven through both combos and then zeroed once each
    let moves = motion.moves().await;
    assert_eq!(moves.len(), 2 * STAGES.len() + STAGES.len());
    assert_eq!(motion.zero_calls().await, vec![1, 2, 3, 4]);
    for stage in STAGES {
        assert_eq!(motion.position(stage).await, Some(0.0));
    }

    // Postprocessing over the run directory yields one row per file
    let records = processing::process_folder(&output_dir, COLUMN).unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].file_name, "combo000.csv");
    assert_eq!(records[0].average, Some(100.0));
    assert_eq!(records[1].file_name, "my_label.csv");

    let summary = std::fs::read_to_string(output_dir.join(SUMMARY_FILE)).unwrap();
    assert!(summary.contains("combo000.csv"));
    assert!(summary.contains("my_label.csv"));
}

#[tokio::test]
async fn gui_failure_skips_combo_but_run_completes() {
    let dir = tempfile::tempdir().unwrap();
    let output_dir = dir.path().join("out");
    let settings = fast_settings();

    let combos = load_table_str(dir.path(), "10.0,0.0,90.0,5.0\n20.0,5.0,45.0,0.0\n");

    let motion = Arc::new(MockMotion::new(&STAGES));
    let screen = SimulatedScreen::new(settings.screen.anchors());
    // The start anchor never appears on screen
    screen.refuse("start_data_collect.png").await;
    let mut sequencer = build_run(Arc::clone(&motion), screen, &settings);

    let report = sequencer.run(&combos, &output_dir).await.unwrap();
    assert_eq!(report.attempted, 2);
    assert_eq!(report.saved, 0);
    assert_eq!(report.skipped, 2);
    assert_eq!(sequencer.state(), RunState::Complete);

    // No output files, but the zero-return still executed
    assert!(!output_dir.join("combo000.csv").exists());
    assert_eq!(motion.zero_calls().await, vec![1, 2, 3, 4]);
}

#[tokio::test]
async fn motion_fault_aborts_batch_after_zero_return() {
    let dir = tempfile::tempdir().unwrap();
    let output_dir = dir.path().join("out");
    let settings = fast_settings();

    let combos = load_table_str(
        dir.path(),
        "10.0,0.0,90.0,5.0\n66.6,5.0,45.0,0.0\n1.0,1.0,1.0,1.0\n",
    );

    let motion = Arc::new(MockMotion::new(&STAGES));
    motion.fail_at_position(66.6).await;
    let screen = SimulatedScreen::new(settings.screen.anchors());
    let mut sequencer = build_run(Arc::clone(&motion), screen, &settings);

    let err = sequencer.run(&combos, &output_dir).await.unwrap_err();
    assert!(matches!(err, TomoError::Motion(_)));
    assert_eq!(sequencer.state(), RunState::Faulted);

    // Combo 1 saved before the fault; combo 3 never attempted
    assert!(output_dir.join("combo000.csv").is_file());
    assert!(!output_dir.join("combo002.csv").exists());
    assert_eq!(motion.zero_calls().await, vec![1, 2, 3, 4]);
}

#[test]
fn malformed_table_aborts_before_any_motion() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("motion.txt");
    std::fs::write(&path, "abc,0,0,0\n").unwrap();

    let err = table::load_table(&path).unwrap_err();
    assert!(matches!(err, TomoError::Table { line: 1, .. }));
}

#[tokio::test]
async fn reprocessing_appends_to_summary() {
    let dir = tempfile::tempdir().unwrap();
    let output_dir = dir.path().join("out");
    let settings = fast_settings();

    let combos = load_table_str(dir.path(), "10.0,0.0,90.0,5.0\n");
    let motion = Arc::new(MockMotion::new(&STAGES));
    let screen = SimulatedScreen::new(settings.screen.anchors());
    let mut sequencer = build_run(motion, screen, &settings);
    sequencer.run(&combos, &output_dir).await.unwrap();

    processing::process_folder(&output_dir, COLUMN).unwrap();
    processing::process_folder(&output_dir, COLUMN).unwrap();

    let summary = std::fs::read_to_string(output_dir.join(SUMMARY_FILE)).unwrap();
    let headers = summary.lines().filter(|l| l.starts_with("filename")).count();
    assert_eq!(headers, 1);
    let rows = summary
        .lines()
        .filter(|l| l.starts_with("combo000"))
        .count();
    assert_eq!(rows, 2);
}
