//! Mock motion backend.
//!
//! Simulates a set of stages for tests and `--simulate` runs. Moves are
//! instant by default; `with_speed` adds travel time proportional to the
//! distance. Faults can be injected per stage or per target position, and
//! every command is recorded so tests can assert exact motion sequences.

use super::{MotionSystem, StageId};
use anyhow::{bail, Result};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;
use tokio::time::{sleep, Duration};

/// Simulated motion subsystem.
pub struct MockMotion {
    zeros: HashMap<StageId, f64>,
    speed_units_per_sec: Option<f64>,
    positions: RwLock<HashMap<StageId, f64>>,
    fault_stages: RwLock<HashSet<StageId>>,
    fault_zero_stages: RwLock<HashSet<StageId>>,
    fault_positions: RwLock<Vec<f64>>,
    moves: RwLock<Vec<(StageId, f64)>>,
    zero_calls: RwLock<Vec<StageId>>,
}

impl MockMotion {
    /// Create a mock with all stages zeroed at position 0.0.
    pub fn new(stages: &[StageId]) -> Self {
        Self::with_zeros(stages, &vec![0.0; stages.len()])
    }

    /// Create a mock with explicit logical zeros, in stage-list order.
    pub fn with_zeros(stages: &[StageId], zeros: &[f64]) -> Self {
        let zeros: HashMap<StageId, f64> = stages.iter().copied().zip(zeros.iter().copied()).collect();
        let positions = zeros.clone();
        Self {
            zeros,
            speed_units_per_sec: None,
            positions: RwLock::new(positions),
            fault_stages: RwLock::new(HashSet::new()),
            fault_zero_stages: RwLock::new(HashSet::new()),
            fault_positions: RwLock::new(Vec::new()),
            moves: RwLock::new(Vec::new()),
            zero_calls: RwLock::new(Vec::new()),
        }
    }

    /// Add travel time: moves sleep `distance / speed`.
    pub fn with_speed(mut self, units_per_sec: f64) -> Self {
        self.speed_units_per_sec = Some(units_per_sec);
        self
    }

    /// Make every command to the given stage fault.
    pub async fn fail_stage(&self, stage: StageId) {
        self.fault_stages.write().await.insert(stage);
    }

    /// Make only the zero-return of the given stage fault.
    pub async fn fail_zero(&self, stage: StageId) {
        self.fault_zero_stages.write().await.insert(stage);
    }

    /// Make any move targeting this position fault.
    pub async fn fail_at_position(&self, position: f64) {
        self.fault_positions.write().await.push(position);
    }

    /// Current position of a stage.
    pub async fn position(&self, stage: StageId) -> Option<f64> {
        self.positions.read().await.get(&stage).copied()
    }

    /// Every settled move so far, in command order.
    pub async fn moves(&self) -> Vec<(StageId, f64)> {
        self.moves.read().await.clone()
    }

    /// Stages that have received a zero command, in command order.
    pub async fn zero_calls(&self) -> Vec<StageId> {
        self.zero_calls.read().await.clone()
    }
}

#[async_trait]
impl MotionSystem for MockMotion {
    async fn move_to(&self, stage: StageId, position: f64) -> Result<()> {
        if !self.zeros.contains_key(&stage) {
            bail!("unknown stage {stage}");
        }
        if self.fault_stages.read().await.contains(&stage) {
            bail!("stage {stage} failed to settle");
        }
        if self
            .fault_positions
            .read()
            .await
            .iter()
            .any(|fault| (position - fault).abs() < 1e-9)
        {
            bail!("stage {stage} fault at position {position}");
        }

        if let Some(speed) = self.speed_units_per_sec {
            let current = self.position(stage).await.unwrap_or(0.0);
            let travel_ms = ((position - current).abs() / speed * 1000.0) as u64;
            sleep(Duration::from_millis(travel_ms)).await;
        }

        self.positions.write().await.insert(stage, position);
        self.moves.write().await.push((stage, position));
        Ok(())
    }

    async fn zero(&self, stage: StageId) -> Result<()> {
        self.zero_calls.write().await.push(stage);
        if self.fault_zero_stages.read().await.contains(&stage) {
            bail!("stage {stage} zero-return fault");
        }
        let Some(zero) = self.zeros.get(&stage).copied() else {
            bail!("unknown stage {stage}");
        };
        self.move_to(stage, zero).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_move_updates_position() {
        let motion = MockMotion::new(&[1, 2, 3, 4]);
        motion.move_to(1, 45.0).await.unwrap();
        assert_eq!(motion.position(1).await, Some(45.0));
        assert_eq!(motion.moves().await, vec![(1, 45.0)]);
    }

    #[tokio::test]
    async fn test_unknown_stage_faults() {
        let motion = MockMotion::new(&[1, 2, 3, 4]);
        assert!(motion.move_to(9, 1.0).await.is_err());
    }

    #[tokio::test]
    async fn test_stage_fault_injection() {
        let motion = MockMotion::new(&[1, 2, 3, 4]);
        motion.fail_stage(3).await;
        assert!(motion.move_to(3, 10.0).await.is_err());
        // Other stages keep working
        motion.move_to(1, 10.0).await.unwrap();
    }

    #[tokio::test]
    async fn test_position_fault_injection() {
        let motion = MockMotion::new(&[1, 2, 3, 4]);
        motion.fail_at_position(77.7).await;
        assert!(motion.move_to(2, 77.7).await.is_err());
        motion.move_to(2, 77.8).await.unwrap();
    }

    #[tokio::test]
    async fn test_zero_returns_to_configured_zero() {
        let motion = MockMotion::with_zeros(&[1, 2, 3, 4], &[5.0, 0.0, 0.0, 0.0]);
        motion.move_to(1, 90.0).await.unwrap();
        motion.zero(1).await.unwrap();
        assert_eq!(motion.position(1).await, Some(5.0));
        assert_eq!(motion.zero_calls().await, vec![1]);
    }

    #[tokio::test]
    async fn test_zero_only_fault_injection() {
        let motion = MockMotion::new(&[1, 2, 3, 4]);
        motion.fail_zero(2).await;
        // Ordinary moves are unaffected
        motion.move_to(2, 5.0).await.unwrap();
        assert!(motion.zero(2).await.is_err());
        assert_eq!(motion.zero_calls().await, vec![2]);
    }

    #[tokio::test]
    async fn test_timed_move() {
        let motion = MockMotion::new(&[1, 2, 3, 4]).with_speed(1000.0);
        motion.move_to(1, 10.0).await.unwrap();
        assert_eq!(motion.position(1).await, Some(10.0));
    }
}
