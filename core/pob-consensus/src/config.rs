//! Engine configuration

use crate::behavior::{BehaviorAgent, BehaviorWeights};
use crate::errors::{ConsensusError, ConsensusResult};
use crate::types::BASIS_POINTS;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;

/// Configuration for the Proof-of-Behavior engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PobConfig {
    /// Minimum seconds between blocks
    pub period: u64,

    /// Checkpoint interval: votes reset, validator payload embedded, scores re-evaluated
    pub epoch: u64,

    /// Tolerated clock drift for incoming headers, in seconds
    pub allowed_future_secs: u64,

    /// Fraction of a severity actually deducted, in basis points
    pub slash_fraction_bp: u64,

    /// Severity applied to a validator that misses its turn, in basis points
    pub missed_turn_severity_bp: u64,

    /// Recent snapshots kept in memory
    pub snapshot_cache_size: usize,

    /// Recovered signers kept in memory
    pub signature_cache_size: usize,

    /// Skip difficulty checks (tests and dev chains)
    pub fake_difficulty: bool,

    /// Dimension weights used when scores are re-evaluated at epoch blocks
    pub behavior_weights: BehaviorWeights,
}

impl Default for PobConfig {
    fn default() -> Self {
        Self {
            period: 3,
            epoch: 30_000,
            allowed_future_secs: 15,
            slash_fraction_bp: BASIS_POINTS,
            missed_turn_severity_bp: 100,
            snapshot_cache_size: 128,
            signature_cache_size: 4096,
            fake_difficulty: false,
            behavior_weights: BehaviorWeights::default(),
        }
    }
}

impl PobConfig {
    /// Load from a JSON file, then apply environment overrides
    pub fn load(path: impl AsRef<Path>) -> ConsensusResult<Self> {
        let raw = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            ConsensusError::InvalidConfig(format!("{}: {}", path.as_ref().display(), e))
        })?;
        let mut config: PobConfig = serde_json::from_str(&raw)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Override fields from `POB_*` environment variables
    pub fn apply_env_overrides(&mut self) -> ConsensusResult<()> {
        if let Some(period) = env_u64("POB_PERIOD")? {
            self.period = period;
        }
        if let Some(epoch) = env_u64("POB_EPOCH")? {
            self.epoch = epoch;
        }
        if let Some(fraction) = env_u64("POB_SLASH_FRACTION_BP")? {
            self.slash_fraction_bp = fraction;
        }
        if let Ok(value) = env::var("POB_FAKE_DIFFICULTY") {
            self.fake_difficulty = matches!(value.as_str(), "1" | "true" | "yes");
        }
        Ok(())
    }

    pub fn validate(&self) -> ConsensusResult<()> {
        if self.epoch == 0 {
            return Err(ConsensusError::InvalidConfig("epoch must be positive".to_string()));
        }
        if self.slash_fraction_bp > BASIS_POINTS || self.missed_turn_severity_bp > BASIS_POINTS {
            return Err(ConsensusError::InvalidConfig(format!(
                "basis points above {}",
                BASIS_POINTS
            )));
        }
        if self.snapshot_cache_size == 0 || self.signature_cache_size == 0 {
            return Err(ConsensusError::InvalidConfig("cache sizes must be positive".to_string()));
        }
        BehaviorAgent::with_weights(self.behavior_weights)?;
        Ok(())
    }
}

fn env_u64(name: &str) -> ConsensusResult<Option<u64>> {
    match env::var(name) {
        Ok(value) => value
            .parse::<u64>()
            .map(Some)
            .map_err(|e| ConsensusError::InvalidConfig(format!("{}={}: {}", name, value, e))),
        Err(_) => Ok(None),
    }
}
