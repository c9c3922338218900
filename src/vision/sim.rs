//! Simulated screen backend.
//!
//! Models the acquisition application's visible anchors well enough to drive
//! the full pipeline without a display: the start button is visible while
//! idle, the stop button while collecting, and clicking the CSV tag opens a
//! save dialog. Confirming the dialog writes a small canned counter CSV to
//! the typed path, so simulated runs produce real files for post-processing.
//!
//! Every synthesized action is recorded for inspection by tests, and any
//! template can be marked never-found to inject locate failures.

use super::{Anchors, KeyPress, Point, Region, ScreenDriver, Template};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Fixed on-screen layout of the simulated panel.
const START_REGION: Region = Region {
    x: 100,
    y: 100,
    width: 40,
    height: 24,
};
const STOP_REGION: Region = Region {
    x: 200,
    y: 100,
    width: 40,
    height: 24,
};
const SAVE_TAG_REGION: Region = Region {
    x: 300,
    y: 100,
    width: 40,
    height: 24,
};
const SAVE_DIALOG_REGION: Region = Region {
    x: 320,
    y: 200,
    width: 300,
    height: 180,
};

/// Canned counter export written on save-confirm. Carries the preamble rows
/// a real export has before its header.
const CANNED_CSV: &str = "\
# Correlation counter export
# firmware 0.35
Time[s],Pattern 01[counts],Pattern 02[counts]
0.0,95,7
0.1,100,9
0.2,105,11
";

/// One recorded synthesized action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScreenAction {
    /// A click, tagged with the anchor it landed on (or `point` if none)
    Click(String),
    /// Typed text
    Type(String),
    /// A key press
    Press(KeyPress),
}

#[derive(Debug, Default)]
struct SimState {
    running: bool,
    dialog_open: bool,
    typed: String,
    never_found: HashSet<String>,
    actions: Vec<ScreenAction>,
    saved: Vec<PathBuf>,
}

/// Simulated screen and input driver.
///
/// Cheaply clonable; clones share state, so tests can keep a handle while the
/// driver itself is owned by the acquisition panel.
#[derive(Clone)]
pub struct SimulatedScreen {
    anchors: Arc<Anchors>,
    state: Arc<Mutex<SimState>>,
}

impl SimulatedScreen {
    /// Create a simulated screen for the given anchors, idle state.
    pub fn new(anchors: Anchors) -> Self {
        Self {
            anchors: Arc::new(anchors),
            state: Arc::new(Mutex::new(SimState::default())),
        }
    }

    /// Mark a template as never visible, by name.
    pub async fn refuse(&self, template_name: &str) {
        self.state
            .lock()
            .await
            .never_found
            .insert(template_name.to_string());
    }

    /// All synthesized actions so far, in order.
    pub async fn actions(&self) -> Vec<ScreenAction> {
        self.state.lock().await.actions.clone()
    }

    /// Paths of every file written through the save dialog.
    pub async fn saved_files(&self) -> Vec<PathBuf> {
        self.state.lock().await.saved.clone()
    }

    /// Whether the panel is currently collecting.
    pub async fn is_running(&self) -> bool {
        self.state.lock().await.running
    }

    fn role_region(&self, template: &Template, state: &SimState) -> Option<Region> {
        let name = template.name();
        if name == self.anchors.start.name() {
            (!state.running).then_some(START_REGION)
        } else if name == self.anchors.stop.name() {
            state.running.then_some(STOP_REGION)
        } else if name == self.anchors.save_tag.name() {
            (!state.running).then_some(SAVE_TAG_REGION)
        } else if name == self.anchors.save_dialog.name() {
            state.dialog_open.then_some(SAVE_DIALOG_REGION)
        } else {
            None
        }
    }
}

#[async_trait]
impl ScreenDriver for SimulatedScreen {
    async fn find(&self, template: &Template) -> Result<Option<Region>> {
        let state = self.state.lock().await;
        if state.never_found.contains(template.name()) {
            return Ok(None);
        }
        Ok(self.role_region(template, &state))
    }

    async fn click(&self, point: Point) -> Result<()> {
        let mut state = self.state.lock().await;

        let label = if START_REGION.contains(point) && !state.running {
            state.running = true;
            self.anchors.start.name().to_string()
        } else if STOP_REGION.contains(point) && state.running {
            state.running = false;
            self.anchors.stop.name().to_string()
        } else if SAVE_TAG_REGION.contains(point) {
            state.dialog_open = true;
            self.anchors.save_tag.name().to_string()
        } else {
            format!("({}, {})", point.x, point.y)
        };

        state.actions.push(ScreenAction::Click(label));
        Ok(())
    }

    async fn type_text(&self, text: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.dialog_open {
            state.typed.push_str(text);
        }
        state.actions.push(ScreenAction::Type(text.to_string()));
        Ok(())
    }

    async fn press(&self, key: KeyPress) -> Result<()> {
        let mut state = self.state.lock().await;
        state.actions.push(ScreenAction::Press(key));

        if state.dialog_open {
            match key {
                KeyPress::SelectAll | KeyPress::Delete => state.typed.clear(),
                KeyPress::Enter => {
                    let path = PathBuf::from(std::mem::take(&mut state.typed));
                    std::fs::write(&path, CANNED_CSV)
                        .with_context(|| format!("simulated save failed: {}", path.display()))?;
                    state.saved.push(path);
                    state.dialog_open = false;
                }
                KeyPress::Tab => {}
            }
        }
        Ok(())
    }
}
