//! Live screen backend: monitor capture, template matching, input synthesis.
//!
//! Capture goes through `xcap`, matching through `imageproc`'s normalized
//! cross-correlation, and input synthesis through `enigo`. Capture and
//! matching are CPU-bound, so each sample runs on the blocking thread pool.
//!
//! Template coordinates and focus state are global to the machine. While this
//! driver is active no other input automation may run against the same
//! screen.

use super::{KeyPress, Point, Region, ScreenDriver, Template};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use enigo::{Button, Coordinate, Direction, Enigo, Key, Keyboard, Mouse, Settings as EnigoSettings};
use image::{DynamicImage, GrayImage};
use imageproc::template_matching::{find_extremes, match_template, MatchTemplateMethod};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::sleep;

/// Screen driver working against the host's primary monitor.
pub struct LiveScreen {
    enigo: Mutex<Enigo>,
    templates: Arc<std::sync::Mutex<HashMap<PathBuf, GrayImage>>>,
    threshold: f32,
}

impl LiveScreen {
    /// Create a live screen driver with the given match threshold.
    pub fn new(match_threshold: f64) -> Result<Self> {
        let enigo = Enigo::new(&EnigoSettings::default())
            .map_err(|err| anyhow!("failed to initialize input synthesis: {err}"))?;
        Ok(Self {
            enigo: Mutex::new(enigo),
            templates: Arc::new(std::sync::Mutex::new(HashMap::new())),
            threshold: match_threshold as f32,
        })
    }

    async fn key(&self, key: Key, direction: Direction) -> Result<()> {
        self.enigo
            .lock()
            .await
            .key(key, direction)
            .map_err(|err| anyhow!("key synthesis failed: {err}"))
    }
}

#[async_trait]
impl ScreenDriver for LiveScreen {
    async fn find(&self, template: &Template) -> Result<Option<Region>> {
        let path = template.path().to_path_buf();
        let name = template.name().to_string();
        let templates = Arc::clone(&self.templates);
        let threshold = self.threshold;

        tokio::task::spawn_blocking(move || -> Result<Option<Region>> {
            let reference = {
                let mut cache = templates
                    .lock()
                    .map_err(|_| anyhow!("template cache poisoned"))?;
                match cache.get(&path) {
                    Some(image) => image.clone(),
                    None => {
                        let image = image::open(&path)
                            .with_context(|| format!("failed to load template {name}"))?
                            .to_luma8();
                        cache.insert(path.clone(), image.clone());
                        image
                    }
                }
            };

            let monitor = xcap::Monitor::all()
                .map_err(|err| anyhow!("monitor enumeration failed: {err}"))?
                .into_iter()
                .next()
                .ok_or_else(|| anyhow!("no monitor available"))?;
            let shot = monitor
                .capture_image()
                .map_err(|err| anyhow!("screen capture failed: {err}"))?;
            let screen = DynamicImage::ImageRgba8(shot).to_luma8();

            if reference.width() > screen.width() || reference.height() > screen.height() {
                return Ok(None);
            }

            let scores = match_template(
                &screen,
                &reference,
                MatchTemplateMethod::CrossCorrelationNormalized,
            );
            let extremes = find_extremes(&scores);
            if extremes.max_value >= threshold {
                let (x, y) = extremes.max_value_location;
                Ok(Some(Region {
                    x: x as i32,
                    y: y as i32,
                    width: reference.width(),
                    height: reference.height(),
                }))
            } else {
                Ok(None)
            }
        })
        .await
        .context("screen sampling task failed")?
    }

    async fn click(&self, point: Point) -> Result<()> {
        let mut enigo = self.enigo.lock().await;
        enigo
            .move_mouse(point.x, point.y, Coordinate::Abs)
            .map_err(|err| anyhow!("pointer move failed: {err}"))?;
        // Let the cursor land before the press registers
        sleep(Duration::from_millis(100)).await;
        enigo
            .button(Button::Left, Direction::Click)
            .map_err(|err| anyhow!("click synthesis failed: {err}"))
    }

    async fn type_text(&self, text: &str) -> Result<()> {
        self.enigo
            .lock()
            .await
            .text(text)
            .map_err(|err| anyhow!("text synthesis failed: {err}"))
    }

    async fn press(&self, key: KeyPress) -> Result<()> {
        match key {
            KeyPress::SelectAll => {
                self.key(Key::Control, Direction::Press).await?;
                self.key(Key::Unicode('a'), Direction::Click).await?;
                self.key(Key::Control, Direction::Release).await
            }
            KeyPress::Delete => self.key(Key::Delete, Direction::Click).await,
            KeyPress::Tab => self.key(Key::Tab, Direction::Click).await,
            KeyPress::Enter => self.key(Key::Return, Direction::Click).await,
        }
    }
}
