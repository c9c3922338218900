//! Newport ESP300 motion backend over RS-232.
//!
//! Command format is `<axis><mnemonic><data>`:
//! - `xPA<pos>` absolute move
//! - `xMD?` motion-done query (0 while moving)
//! - `xTP` position readback
//! - `TB?` controller error buffer
//!
//! `move_to` sends the absolute move and then polls `MD?` until the axis
//! reports done or the configured move timeout elapses, so callers get the
//! blocking settle-or-fault contract the sequencing core relies on.

use super::{MotionSystem, StageId};
use crate::config::MotionConfig;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tokio_serial::{SerialPortBuilderExt, SerialStream};

/// Interval between `MD?` settle polls.
const SETTLE_POLL: Duration = Duration::from_millis(100);
/// Read timeout for one serial response line.
const RESPONSE_TIMEOUT: Duration = Duration::from_millis(500);

/// ESP300 motion subsystem.
pub struct Esp300Motion {
    /// Serial port protected by Mutex for exclusive access during transactions
    port: Mutex<SerialStream>,
    zeros: HashMap<StageId, f64>,
    move_timeout: Duration,
}

impl Esp300Motion {
    /// Open the serial port and map each actuated stage to its logical zero.
    pub fn connect(config: &MotionConfig, stages: &[StageId]) -> Result<Self> {
        let port = tokio_serial::new(&config.port, config.baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .open_native_async()
            .with_context(|| format!("Failed to open ESP300 serial port: {}", config.port))?;

        let zeros = stages
            .iter()
            .copied()
            .zip(config.zeros.iter().copied())
            .collect();

        Ok(Self {
            port: Mutex::new(port),
            zeros,
            move_timeout: config.move_timeout,
        })
    }

    fn validate_stage(&self, stage: StageId) -> Result<()> {
        if !self.zeros.contains_key(&stage) {
            bail!("stage {stage} is not part of this run");
        }
        Ok(())
    }

    async fn send(&self, command: &str) -> Result<()> {
        let mut port = self.port.lock().await;
        port.write_all(format!("{command}\r").as_bytes())
            .await
            .context("ESP300 write failed")
    }

    async fn query(&self, command: &str) -> Result<String> {
        let mut port = self.port.lock().await;
        port.write_all(format!("{command}\r").as_bytes())
            .await
            .context("ESP300 write failed")?;

        let mut response = Vec::with_capacity(32);
        let mut buf = [0u8; 32];
        let deadline = Instant::now() + RESPONSE_TIMEOUT;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            match tokio::time::timeout(remaining, port.read(&mut buf)).await {
                Ok(Ok(n)) if n > 0 => {
                    response.extend_from_slice(&buf[..n]);
                    if response.contains(&b'\n') || response.contains(&b'\r') {
                        break;
                    }
                }
                _ => break,
            }
        }

        if response.is_empty() {
            bail!("ESP300 gave no response to '{command}'");
        }
        Ok(String::from_utf8_lossy(&response).trim().to_string())
    }

    async fn wait_settled(&self, stage: StageId, position: f64) -> Result<()> {
        let deadline = Instant::now() + self.move_timeout;
        loop {
            let response = self
                .query(&format!("{stage}MD?"))
                .await
                .context("Failed to query motion status")?;
            let done: i32 = response
                .parse()
                .with_context(|| format!("Failed to parse motion status: {response}"))?;
            // MD? returns 0 while the axis is still moving
            if done != 0 {
                return Ok(());
            }
            if Instant::now() >= deadline {
                bail!(
                    "stage {stage} failed to settle at {position} within {:?}",
                    self.move_timeout
                );
            }
            sleep(SETTLE_POLL).await;
        }
    }

    async fn check_error_buffer(&self) -> Result<()> {
        let status = self
            .query("TB?")
            .await
            .context("Failed to query error buffer")?;
        if !status.starts_with('0') {
            bail!("ESP300 reported error: {status}");
        }
        Ok(())
    }
}

#[async_trait]
impl MotionSystem for Esp300Motion {
    async fn move_to(&self, stage: StageId, position: f64) -> Result<()> {
        self.validate_stage(stage)?;

        self.send(&format!("{stage}PA{position}"))
            .await
            .context("Failed to send move absolute command")?;

        self.wait_settled(stage, position).await?;
        self.check_error_buffer().await
    }

    async fn zero(&self, stage: StageId) -> Result<()> {
        self.validate_stage(stage)?;
        let Some(zero) = self.zeros.get(&stage).copied() else {
            bail!("stage {stage} has no configured zero");
        };
        self.move_to(stage, zero).await
    }
}
