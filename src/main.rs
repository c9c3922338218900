//! Run the tomography measurement sequence and optional post-processing.

use clap::Parser;
use qtomo::acquisition::AcquisitionPanel;
use qtomo::config::Settings;
use qtomo::error::{AppResult, TomoError};
use qtomo::experiment::{run_directory, ComboExecutor, RunReport, Sequencer};
use qtomo::hardware::{MockMotion, StageId};
use qtomo::processing;
use qtomo::table;
use qtomo::vision::SimulatedScreen;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "qtomo",
    version,
    about = "Run a table-driven tomography measurement sequence and postprocess the results."
)]
struct Cli {
    /// Path to the motion table (one `pos1,pos2,pos3,pos4[,label]` per line)
    #[arg(long)]
    motion: PathBuf,

    /// Comma-separated list of the four stage ids to actuate, e.g. `1,2,3,4`
    #[arg(long)]
    stages: String,

    /// Data acquisition time per combo, in seconds
    #[arg(long)]
    wait: f64,

    /// Description used to name the output directory
    #[arg(long, default_value = "run")]
    desc: String,

    /// Which column to average in postprocessing
    #[arg(long)]
    column: String,

    /// Run postprocessing after the measurement sequence
    #[arg(long)]
    process: bool,

    /// Process this folder instead of the run's own output directory
    #[arg(long)]
    folder: Option<PathBuf>,

    /// Path to the configuration file
    #[arg(long, default_value = "qtomo.toml")]
    config: PathBuf,

    /// Use the simulated motion and screen backends (no hardware, no display)
    #[arg(long)]
    simulate: bool,
}

fn parse_stages(input: &str) -> AppResult<Vec<StageId>> {
    let stages: Vec<StageId> = input
        .split(',')
        .map(|field| field.trim().parse())
        .collect::<Result<_, _>>()
        .map_err(|_| TomoError::Configuration(format!("invalid stage list: '{input}'")))?;
    if stages.len() != table::STAGE_COUNT {
        return Err(TomoError::Configuration(format!(
            "exactly {} stages are required, got {}",
            table::STAGE_COUNT,
            stages.len()
        )));
    }
    Ok(stages)
}

async fn run(cli: Cli) -> AppResult<()> {
    let settings = Settings::load(&cli.config)?;
    settings.validate(!cli.simulate)?;

    let stages = parse_stages(&cli.stages)?;
    let combos = table::load_table(&cli.motion)?;
    if combos.is_empty() {
        return Err(TomoError::Configuration(format!(
            "no valid combinations found in {}",
            cli.motion.display()
        )));
    }

    let dwell = Duration::from_secs_f64(cli.wait);
    let output_dir = run_directory(&settings.storage.output_root, &cli.desc);
    let anchors = settings.screen.anchors();

    let report: RunReport = if cli.simulate {
        info!("running with simulated motion and screen backends");
        let motion = Arc::new(MockMotion::with_zeros(&stages, &settings.motion.zeros));
        let panel = AcquisitionPanel::new(SimulatedScreen::new(anchors.clone()), anchors, &settings.screen);
        let executor = ComboExecutor::new(Arc::clone(&motion), panel, stages, dwell, &settings);
        let mut sequencer = Sequencer::new(motion, executor);
        sequencer.run(&combos, &output_dir).await?
    } else {
        #[cfg(all(feature = "instrument_newport", feature = "gui_live"))]
        {
            let motion = Arc::new(
                qtomo::hardware::Esp300Motion::connect(&settings.motion, &stages)
                    .map_err(|err| TomoError::Motion(format!("{err:#}")))?,
            );
            let screen = qtomo::vision::LiveScreen::new(settings.screen.match_threshold)
                .map_err(|err| TomoError::Configuration(format!("{err:#}")))?;
            let panel = AcquisitionPanel::new(screen, anchors, &settings.screen);
            let executor = ComboExecutor::new(Arc::clone(&motion), panel, stages, dwell, &settings);
            let mut sequencer = Sequencer::new(motion, executor);
            sequencer.run(&combos, &output_dir).await?
        }
        #[cfg(not(all(feature = "instrument_newport", feature = "gui_live")))]
        {
            #[cfg(not(feature = "instrument_newport"))]
            return Err(TomoError::FeatureNotEnabled("instrument_newport"));
            #[cfg(all(feature = "instrument_newport", not(feature = "gui_live")))]
            return Err(TomoError::FeatureNotEnabled("gui_live"));
        }
    };

    info!(
        attempted = report.attempted,
        saved = report.saved,
        skipped = report.skipped,
        "measurement sequence complete"
    );

    if cli.process {
        let folder = cli.folder.unwrap_or_else(|| report.output_dir.clone());
        let records = processing::process_folder(&folder, &cli.column)?;
        info!(
            rows = records.len(),
            summary = %folder.join(processing::SUMMARY_FILE).display(),
            "postprocessing complete"
        );
    } else {
        info!("measurement done (use --process to postprocess averages)");
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    if let Err(err) = run(cli).await {
        error!("{err}");
        std::process::exit(1);
    }
}
