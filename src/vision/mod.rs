//! Screen capture and input synthesis boundary.
//!
//! The acquisition application exposes no API, so the only control surface is
//! the host display: locate a reference screenshot on screen, click it, type.
//! Everything that touches the screen or input devices goes through the
//! [`ScreenDriver`] trait, so the rest of the system depends only on abstract
//! actions and can run against the [`SimulatedScreen`] without a display.
//!
//! `find` is a single screen sample. Polling (interval, timeout) lives one
//! layer up, in [`crate::acquisition`], where it is configuration rather than
//! a property of the engine.

use anyhow::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

#[cfg(feature = "gui_live")]
pub mod live;
pub mod sim;

#[cfg(feature = "gui_live")]
pub use live::LiveScreen;
pub use sim::SimulatedScreen;

/// A reference image used to visually locate a UI element on screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    name: String,
    path: PathBuf,
}

impl Template {
    /// Create a template from its display name and screenshot path.
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }

    /// Template name, used in log messages and failure tags.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Path of the screenshot file backing this template.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// The four UI anchors of the acquisition application.
#[derive(Debug, Clone)]
pub struct Anchors {
    /// Start-acquisition button
    pub start: Template,
    /// Stop-acquisition button
    pub stop: Template,
    /// CSV save/export tag
    pub save_tag: Template,
    /// Save-dialog marker, confirms the dialog has focus
    pub save_dialog: Template,
}

/// A point in screen coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Point {
    /// Horizontal coordinate in pixels
    pub x: i32,
    /// Vertical coordinate in pixels
    pub y: i32,
}

/// A matched region on screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    /// Left edge in pixels
    pub x: i32,
    /// Top edge in pixels
    pub y: i32,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

impl Region {
    /// Center of the region, the default click target.
    pub fn center(&self) -> Point {
        Point {
            x: self.x + self.width as i32 / 2,
            y: self.y + self.height as i32 / 2,
        }
    }

    /// Whether the region contains the given point.
    pub fn contains(&self, point: Point) -> bool {
        point.x >= self.x
            && point.x < self.x + self.width as i32
            && point.y >= self.y
            && point.y < self.y + self.height as i32
    }
}

/// Semantic key presses synthesized into the focused window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyPress {
    /// Select all text in the focused field
    SelectAll,
    /// Delete the selection
    Delete,
    /// Move focus to the next control
    Tab,
    /// Confirm
    Enter,
}

/// One-shot screen sampling and input synthesis.
///
/// Implementations are side-effecting on the live display and input state of
/// the host machine. They must never run concurrently with unrelated input
/// automation on the same machine; exclusivity is enforced one layer up.
#[async_trait]
pub trait ScreenDriver: Send + Sync {
    /// Sample the screen once for the template. `Ok(None)` means the template
    /// is currently not visible; `Err` means the engine itself failed.
    async fn find(&self, template: &Template) -> Result<Option<Region>>;

    /// Move the pointer to the point and click.
    async fn click(&self, point: Point) -> Result<()>;

    /// Type text into the focused control.
    async fn type_text(&self, text: &str) -> Result<()>;

    /// Press a single semantic key.
    async fn press(&self, key: KeyPress) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_center() {
        let region = Region {
            x: 100,
            y: 40,
            width: 40,
            height: 20,
        };
        assert_eq!(region.center(), Point { x: 120, y: 50 });
    }

    #[test]
    fn test_region_contains() {
        let region = Region {
            x: 10,
            y: 10,
            width: 5,
            height: 5,
        };
        assert!(region.contains(Point { x: 10, y: 10 }));
        assert!(region.contains(Point { x: 14, y: 14 }));
        assert!(!region.contains(Point { x: 15, y: 10 }));
        assert!(!region.contains(Point { x: 9, y: 12 }));
    }
}
