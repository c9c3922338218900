//! Configuration loading using Figment.
//!
//! Settings are loaded from three layers, later layers overriding earlier:
//! 1. Built-in defaults
//! 2. A TOML file (default `qtomo.toml`)
//! 3. Environment variables prefixed with `QTOMO_` (nested keys separated by
//!    `__`, e.g. `QTOMO_STORAGE__OUTPUT_ROOT=/data/runs`)
//!
//! # Example
//!
//! ```toml
//! [screen]
//! screenshots_dir = "screenshots"
//! locate_timeout = "5s"
//! save_dialog_timeout = "15s"
//!
//! [motion]
//! zeros = [0.0, 0.0, 0.0, 0.0]
//! settle_pause = "2s"
//!
//! [storage]
//! output_root = "saved_data"
//! ```

use crate::error::{AppResult, TomoError};
use crate::table::STAGE_COUNT;
use crate::vision::{Anchors, Template};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Screen automation settings
    pub screen: ScreenConfig,
    /// Motion subsystem settings
    pub motion: MotionConfig,
    /// Output storage settings
    pub storage: StorageConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            screen: ScreenConfig::default(),
            motion: MotionConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

/// Screen automation configuration: template anchors and GUI timing.
///
/// All waits are explicit. The acquisition application's visual state is the
/// only liveness signal available, so unbounded polling is not allowed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreenConfig {
    /// Directory holding the reference screenshots
    pub screenshots_dir: PathBuf,
    /// Template for the start-acquisition button
    pub start_template: String,
    /// Template for the stop-acquisition button
    pub stop_template: String,
    /// Template for the CSV save/export tag
    pub save_tag_template: String,
    /// Template that confirms the save dialog has focus
    pub save_dialog_template: String,
    /// Interval between screen samples while locating a template
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
    /// How long to poll for a template before giving up
    #[serde(with = "humantime_serde")]
    pub locate_timeout: Duration,
    /// How long to wait for the save dialog to appear after clicking the tag
    #[serde(with = "humantime_serde")]
    pub save_dialog_timeout: Duration,
    /// Pause after typing the destination path into the save dialog
    #[serde(with = "humantime_serde")]
    pub type_settle: Duration,
    /// Pause before clicking stop at the end of the dwell
    #[serde(with = "humantime_serde")]
    pub pre_stop_pause: Duration,
    /// Template match threshold for the live screen backend (0, 1]
    pub match_threshold: f64,
}

impl Default for ScreenConfig {
    fn default() -> Self {
        Self {
            screenshots_dir: PathBuf::from("screenshots"),
            start_template: "start_data_collect.png".to_string(),
            stop_template: "stop_data_collect.png".to_string(),
            save_tag_template: "csv_file_tag.png".to_string(),
            save_dialog_template: "save_file_dialog.png".to_string(),
            poll_interval: Duration::from_millis(500),
            locate_timeout: Duration::from_secs(5),
            save_dialog_timeout: Duration::from_secs(15),
            type_settle: Duration::from_secs(5),
            pre_stop_pause: Duration::from_secs(1),
            match_threshold: 0.8,
        }
    }
}

impl ScreenConfig {
    /// Resolve the configured template names into concrete anchors.
    pub fn anchors(&self) -> Anchors {
        let template = |name: &str| Template::new(name, self.screenshots_dir.join(name));
        Anchors {
            start: template(&self.start_template),
            stop: template(&self.stop_template),
            save_tag: template(&self.save_tag_template),
            save_dialog: template(&self.save_dialog_template),
        }
    }
}

/// Motion subsystem configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionConfig {
    /// Logical zero position for each actuated stage, in stage-list order
    pub zeros: Vec<f64>,
    /// Pause after the last stage settles before touching the GUI
    #[serde(with = "humantime_serde")]
    pub settle_pause: Duration,
    /// Upper bound on a single move, settle polling included
    #[serde(with = "humantime_serde")]
    pub move_timeout: Duration,
    /// Serial port for the ESP300 backend
    pub port: String,
    /// Baud rate for the ESP300 backend
    pub baud_rate: u32,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            zeros: vec![0.0; STAGE_COUNT],
            settle_pause: Duration::from_secs(2),
            move_timeout: Duration::from_secs(30),
            port: "/dev/ttyUSB0".to_string(),
            baud_rate: 19200,
        }
    }
}

/// Output storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root directory under which per-run output directories are created
    pub output_root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            output_root: PathBuf::from("saved_data"),
        }
    }
}

impl Settings {
    /// Load settings from defaults, the given TOML file, and `QTOMO_*`
    /// environment variables.
    ///
    /// A missing file is not an error; defaults and environment still apply.
    pub fn load(path: &Path) -> AppResult<Self> {
        let settings = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("QTOMO_").split("__"))
            .extract()?;
        Ok(settings)
    }

    /// Validate the loaded settings.
    ///
    /// With `require_templates` set, every configured screenshot template must
    /// exist on disk. This runs before any hardware motion so that a missing
    /// template aborts the run while the stages are still untouched.
    pub fn validate(&self, require_templates: bool) -> AppResult<()> {
        if self.motion.zeros.len() != STAGE_COUNT {
            return Err(TomoError::Configuration(format!(
                "motion.zeros must have exactly {} entries, got {}",
                STAGE_COUNT,
                self.motion.zeros.len()
            )));
        }

        if !(self.screen.match_threshold > 0.0 && self.screen.match_threshold <= 1.0) {
            return Err(TomoError::Configuration(format!(
                "screen.match_threshold must be in (0, 1], got {}",
                self.screen.match_threshold
            )));
        }

        if require_templates {
            let anchors = self.screen.anchors();
            for template in [
                &anchors.start,
                &anchors.stop,
                &anchors.save_tag,
                &anchors.save_dialog,
            ] {
                if !template.path().is_file() {
                    return Err(TomoError::Configuration(format!(
                        "required screenshot template not found: {}",
                        template.path().display()
                    )));
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.motion.zeros, vec![0.0; 4]);
        assert_eq!(settings.screen.poll_interval, Duration::from_millis(500));
        assert_eq!(settings.screen.save_dialog_timeout, Duration::from_secs(15));
        assert_eq!(settings.storage.output_root, PathBuf::from("saved_data"));
    }

    #[test]
    fn test_validate_rejects_wrong_zero_count() {
        let mut settings = Settings::default();
        settings.motion.zeros = vec![0.0, 0.0];
        assert!(settings.validate(false).is_err());
    }

    #[test]
    fn test_validate_rejects_bad_threshold() {
        let mut settings = Settings::default();
        settings.screen.match_threshold = 1.5;
        assert!(settings.validate(false).is_err());
    }

    #[test]
    fn test_validate_requires_templates_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = Settings::default();
        settings.screen.screenshots_dir = dir.path().to_path_buf();

        // No template files yet
        assert!(settings.validate(true).is_err());
        // But fine when templates are not required (simulated runs)
        assert!(settings.validate(false).is_ok());

        for name in [
            "start_data_collect.png",
            "stop_data_collect.png",
            "csv_file_tag.png",
            "save_file_dialog.png",
        ] {
            std::fs::File::create(dir.path().join(name)).unwrap();
        }
        assert!(settings.validate(true).is_ok());
    }

    #[test]
    fn test_load_toml_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("qtomo.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            "[screen]\nlocate_timeout = \"9s\"\n\n[motion]\nzeros = [1.0, 2.0, 3.0, 4.0]"
        )
        .unwrap();

        let settings = Settings::load(&path).unwrap();
        assert_eq!(settings.screen.locate_timeout, Duration::from_secs(9));
        assert_eq!(settings.motion.zeros, vec![1.0, 2.0, 3.0, 4.0]);
        // Untouched sections keep their defaults
        assert_eq!(settings.motion.baud_rate, 19200);
    }

    #[test]
    #[serial_test::serial]
    fn test_env_override() {
        std::env::set_var("QTOMO_MOTION__BAUD_RATE", "9600");
        let settings = Settings::load(Path::new("/nonexistent/qtomo.toml")).unwrap();
        std::env::remove_var("QTOMO_MOTION__BAUD_RATE");
        assert_eq!(settings.motion.baud_rate, 9600);
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let settings = Settings::load(Path::new("/nonexistent/qtomo.toml")).unwrap();
        assert_eq!(settings.screen.match_threshold, 0.8);
    }

    #[test]
    fn test_anchor_paths_join_screenshots_dir() {
        let settings = Settings::default();
        let anchors = settings.screen.anchors();
        assert_eq!(anchors.start.name(), "start_data_collect.png");
        assert_eq!(
            anchors.save_dialog.path(),
            Path::new("screenshots/save_file_dialog.png")
        );
    }
}
