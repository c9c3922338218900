//! GUI automation adapter for the correlation-counter application.
//!
//! Translates abstract acquisition actions (start, stop, save-as) into
//! synthesized input anchored to visually located UI elements. The host
//! display and input devices are a process-wide exclusive resource, so all
//! actions go through an [`AcquisitionSession`]: a mutex guard held for one
//! full acquisition cycle and released deterministically afterwards.
//!
//! A locate failure during a required step surfaces as a typed
//! [`AcquisitionFailure`] tagged with the step and template. It is not
//! retried here; the retry policy belongs to the sequencer.

use crate::config::ScreenConfig;
use crate::vision::{Anchors, KeyPress, Region, ScreenDriver, Template};
use std::fmt;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Mutex, MutexGuard};
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

/// Acquisition steps, used to tag failures with their origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Clicking the start-acquisition button
    Start,
    /// Waiting for start to toggle into stop
    StartConfirm,
    /// Clicking the stop-acquisition button
    Stop,
    /// Waiting for stop to toggle back into start
    StopConfirm,
    /// Clicking the CSV save/export tag
    SaveTag,
    /// Waiting for the save dialog to take focus
    SaveDialog,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Step::Start => "start",
            Step::StartConfirm => "start-confirm",
            Step::Stop => "stop",
            Step::StopConfirm => "stop-confirm",
            Step::SaveTag => "save-tag",
            Step::SaveDialog => "save-dialog",
        };
        f.write_str(name)
    }
}

/// A failed acquisition cycle. Recoverable at the run level: the combo is
/// skipped and the run continues.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AcquisitionFailure {
    /// A required template never appeared within the locate timeout.
    #[error("template '{template}' not found during step '{step}'")]
    TemplateNotFound {
        /// Step that needed the template
        step: Step,
        /// Template that was never located
        template: String,
    },

    /// The save dialog did not take focus within its (longer) timeout.
    #[error("save dialog '{template}' did not appear within timeout")]
    SaveDialogTimeout {
        /// The save-dialog template
        template: String,
    },

    /// The input-synthesis engine itself failed mid-step.
    #[error("input synthesis failed during step '{step}': {message}")]
    Input {
        /// Step that was being synthesized
        step: Step,
        /// Engine error text
        message: String,
    },
}

/// GUI timing parameters, all explicit configuration.
#[derive(Debug, Clone)]
struct Timing {
    poll_interval: Duration,
    locate_timeout: Duration,
    save_dialog_timeout: Duration,
    type_settle: Duration,
}

/// The acquisition application's control surface.
///
/// Owns the screen driver behind a mutex; [`AcquisitionPanel::acquire`] hands
/// out the one session allowed to touch the display at a time.
pub struct AcquisitionPanel<S> {
    screen: Mutex<S>,
    anchors: Anchors,
    timing: Timing,
}

impl<S: ScreenDriver> AcquisitionPanel<S> {
    /// Build a panel over a screen driver with the configured anchors and
    /// timing.
    pub fn new(screen: S, anchors: Anchors, config: &ScreenConfig) -> Self {
        Self {
            screen: Mutex::new(screen),
            anchors,
            timing: Timing {
                poll_interval: config.poll_interval,
                locate_timeout: config.locate_timeout,
                save_dialog_timeout: config.save_dialog_timeout,
                type_settle: config.type_settle,
            },
        }
    }

    /// Take exclusive ownership of the display for one acquisition cycle.
    pub async fn acquire(&self) -> AcquisitionSession<'_, S> {
        AcquisitionSession {
            screen: self.screen.lock().await,
            anchors: &self.anchors,
            timing: &self.timing,
        }
    }
}

/// Exclusive access to the display for the duration of one acquisition cycle.
pub struct AcquisitionSession<'panel, S: ScreenDriver> {
    screen: MutexGuard<'panel, S>,
    anchors: &'panel Anchors,
    timing: &'panel Timing,
}

impl<S: ScreenDriver> AcquisitionSession<'_, S> {
    /// Poll the screen for a template until found or the timeout elapses.
    async fn locate(
        &self,
        template: &Template,
        step: Step,
        timeout: Duration,
    ) -> Result<Region, AcquisitionFailure> {
        let deadline = Instant::now() + timeout;
        loop {
            match self.screen.find(template).await {
                Ok(Some(region)) => {
                    debug!(template = template.name(), %step, "template located");
                    return Ok(region);
                }
                Ok(None) => {}
                // An engine error counts as a failed sample, not a fatal run
                // condition; the timeout bounds how long we keep trying.
                Err(err) => warn!(
                    template = template.name(),
                    error = %format!("{err:#}"),
                    "screen sample failed"
                ),
            }
            if Instant::now() >= deadline {
                return Err(AcquisitionFailure::TemplateNotFound {
                    step,
                    template: template.name().to_string(),
                });
            }
            sleep(self.timing.poll_interval).await;
        }
    }

    async fn click(&self, template: &Template, step: Step) -> Result<(), AcquisitionFailure> {
        let region = self.locate(template, step, self.timing.locate_timeout).await?;
        self.screen
            .click(region.center())
            .await
            .map_err(|err| AcquisitionFailure::Input {
                step,
                message: format!("{err:#}"),
            })
    }

    async fn press(&self, key: KeyPress, step: Step) -> Result<(), AcquisitionFailure> {
        self.screen
            .press(key)
            .await
            .map_err(|err| AcquisitionFailure::Input {
                step,
                message: format!("{err:#}"),
            })
    }

    /// Click the start-acquisition anchor and confirm it toggled into stop.
    pub async fn start(&self) -> Result<(), AcquisitionFailure> {
        self.click(&self.anchors.start, Step::Start).await?;
        self.locate(
            &self.anchors.stop,
            Step::StartConfirm,
            self.timing.locate_timeout,
        )
        .await?;
        Ok(())
    }

    /// Click the stop-acquisition anchor and confirm the panel is idle again.
    pub async fn stop(&self) -> Result<(), AcquisitionFailure> {
        self.click(&self.anchors.stop, Step::Stop).await?;
        self.locate(
            &self.anchors.start,
            Step::StopConfirm,
            self.timing.locate_timeout,
        )
        .await?;
        Ok(())
    }

    /// Save the collected data to `path` through the application's dialog.
    ///
    /// Dialog appearance is the completion signal for the cycle: once the
    /// dialog has taken focus, the field is cleared, the destination typed,
    /// and the save confirmed with Tab + Enter.
    pub async fn save_as(&self, path: &Path) -> Result<(), AcquisitionFailure> {
        self.click(&self.anchors.save_tag, Step::SaveTag).await?;

        let dialog = &self.anchors.save_dialog;
        if let Err(failure) = self
            .locate(dialog, Step::SaveDialog, self.timing.save_dialog_timeout)
            .await
        {
            return Err(match failure {
                AcquisitionFailure::TemplateNotFound { .. } => {
                    AcquisitionFailure::SaveDialogTimeout {
                        template: dialog.name().to_string(),
                    }
                }
                other => other,
            });
        }

        let step = Step::SaveDialog;
        self.press(KeyPress::SelectAll, step).await?;
        self.press(KeyPress::Delete, step).await?;
        self.screen
            .type_text(&path.to_string_lossy())
            .await
            .map_err(|err| AcquisitionFailure::Input {
                step,
                message: format!("{err:#}"),
            })?;
        sleep(self.timing.type_settle).await;
        self.press(KeyPress::Tab, step).await?;
        self.press(KeyPress::Enter, step).await?;
        Ok(())
    }
}
