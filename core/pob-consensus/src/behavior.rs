//! Behavior scoring for validators
//!
//! A validator's score is a pure function of its recorded history. Five
//! dimensions are computed independently in basis points and blended into a
//! total with fixed integer weights:
//!
//! | Dimension          | Source                                   | Weight |
//! |--------------------|------------------------------------------|--------|
//! | Liveness           | proposed / (proposed + missed)           | 25     |
//! | Correctness        | proposed / (proposed + invalid)          | 25     |
//! | Cooperation        | acks given / (given + missed)            | 18     |
//! | Consistency        | 10000 - 1000 per slash                   | 17     |
//! | Signal sovereignty | time-source, sync and qualifying blocks  | 15     |

use crate::errors::{ConsensusError, ConsensusResult};
use crate::types::{BASIS_POINTS, DEFAULT_SCORE};
use pob_state::Address;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Consistency lost per recorded slash
pub const SLASH_CONSISTENCY_COST: u64 = 1_000;

/// Sovereignty score for validators with no capability events
pub const NEUTRAL_SOVEREIGNTY: u64 = 5_000;

/// Sovereignty points per sync event (saturates after 20 events)
pub const SYNC_POINTS_PER_EVENT: u64 = 500;

/// Sovereignty points per qualifying block (saturates after 100 blocks)
pub const QUALIFYING_POINTS_PER_BLOCK: u64 = 100;

/// Per-validator reputation in basis points
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BehaviorScore {
    pub total: u64,
    pub liveness: u64,
    pub correctness: u64,
    pub cooperation: u64,
    pub consistency: u64,
    pub signal_sovereignty: u64,
    /// Block height of the last evaluation
    pub last_update: u64,
}

impl BehaviorScore {
    /// Score given to genesis validators and newly voted-in validators
    pub fn new_default(height: u64) -> Self {
        Self {
            total: DEFAULT_SCORE,
            liveness: DEFAULT_SCORE,
            correctness: DEFAULT_SCORE,
            cooperation: DEFAULT_SCORE,
            consistency: DEFAULT_SCORE,
            signal_sovereignty: DEFAULT_SCORE,
            last_update: height,
        }
    }
}

impl Default for BehaviorScore {
    fn default() -> Self {
        Self::new_default(0)
    }
}

/// Raw action counters for a validator. Counters only grow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidatorHistory {
    pub blocks_proposed: u64,
    pub blocks_missed: u64,
    pub invalid_proposals: u64,
    pub acks_given: u64,
    pub acks_missed: u64,
    pub slash_count: u64,
    pub time_verifications: u64,
    pub sync_events: u64,
    pub qualifying_blocks: u64,
}

impl ValidatorHistory {
    fn has_capability_events(&self) -> bool {
        self.time_verifications > 0 || self.sync_events > 0 || self.qualifying_blocks > 0
    }
}

/// Integer percentage weights of the five dimensions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BehaviorWeights {
    pub liveness: u64,
    pub correctness: u64,
    pub cooperation: u64,
    pub consistency: u64,
    pub signal_sovereignty: u64,
}

impl Default for BehaviorWeights {
    fn default() -> Self {
        Self {
            liveness: 25,
            correctness: 25,
            cooperation: 18,
            consistency: 17,
            signal_sovereignty: 15,
        }
    }
}

impl BehaviorWeights {
    fn sum(&self) -> u64 {
        self.liveness
            + self.correctness
            + self.cooperation
            + self.consistency
            + self.signal_sovereignty
    }
}

/// Pure scoring agent: history in, score out
#[derive(Debug, Clone, Copy, Default)]
pub struct BehaviorAgent {
    weights: BehaviorWeights,
}

impl BehaviorAgent {
    pub fn new() -> Self {
        Self::default()
    }

    /// Agent with custom weights; they must sum to 100
    pub fn with_weights(weights: BehaviorWeights) -> ConsensusResult<Self> {
        if weights.sum() != 100 {
            return Err(ConsensusError::InvalidConfig(format!(
                "behavior weights sum to {}, expected 100",
                weights.sum()
            )));
        }
        Ok(Self { weights })
    }

    pub fn weights(&self) -> &BehaviorWeights {
        &self.weights
    }

    /// Score a validator history at `height`
    pub fn evaluate(&self, history: &ValidatorHistory, height: u64) -> BehaviorScore {
        let liveness = ratio_bp(history.blocks_proposed, history.blocks_missed);
        let correctness = ratio_bp(history.blocks_proposed, history.invalid_proposals);
        let cooperation = ratio_bp(history.acks_given, history.acks_missed);
        let slash_cost = history.slash_count.saturating_mul(SLASH_CONSISTENCY_COST);
        let consistency = BASIS_POINTS - slash_cost.min(BASIS_POINTS);
        let signal_sovereignty = self.signal_sovereignty(history);

        let w = &self.weights;
        let weighted = liveness * w.liveness
            + correctness * w.correctness
            + cooperation * w.cooperation
            + consistency * w.consistency
            + signal_sovereignty * w.signal_sovereignty;

        BehaviorScore {
            total: (weighted / 100).min(BASIS_POINTS),
            liveness,
            correctness,
            cooperation,
            consistency,
            signal_sovereignty,
            last_update: height,
        }
    }

    fn signal_sovereignty(&self, history: &ValidatorHistory) -> u64 {
        if !history.has_capability_events() {
            return NEUTRAL_SOVEREIGNTY;
        }

        let verification = scaled_bp(history.time_verifications, history.qualifying_blocks.max(1));
        let sync = history
            .sync_events
            .saturating_mul(SYNC_POINTS_PER_EVENT)
            .min(BASIS_POINTS);
        let qualifying = history
            .qualifying_blocks
            .saturating_mul(QUALIFYING_POINTS_PER_BLOCK)
            .min(BASIS_POINTS);

        (verification * 40 + sync * 30 + qualifying * 30) / 100
    }

    /// Deduct `total * severity * fraction / 10000^2` from the total.
    ///
    /// A non-zero penalty on a non-zero score always removes at least one
    /// point, so repeated slashing reaches zero.
    pub fn proportional_slash(
        &self,
        score: &BehaviorScore,
        severity_bp: u64,
        slash_fraction_bp: u64,
    ) -> BehaviorScore {
        let severity = severity_bp.min(BASIS_POINTS) as u128;
        let fraction = slash_fraction_bp.min(BASIS_POINTS) as u128;
        let bp = BASIS_POINTS as u128;

        let mut deduction = (score.total as u128 * severity * fraction / (bp * bp)) as u64;
        if deduction == 0 && severity > 0 && fraction > 0 && score.total > 0 {
            deduction = 1;
        }

        BehaviorScore {
            total: score.total.saturating_sub(deduction),
            ..*score
        }
    }

    /// Re-evaluate every validator in `current`; missing histories score as fresh validators
    pub fn update_scores(
        &self,
        current: &BTreeMap<Address, BehaviorScore>,
        histories: &BTreeMap<Address, ValidatorHistory>,
        height: u64,
    ) -> BTreeMap<Address, BehaviorScore> {
        current
            .keys()
            .map(|address| {
                let history = histories.get(address).copied().unwrap_or_default();
                (*address, self.evaluate(&history, height))
            })
            .collect()
    }
}

/// `good / (good + bad)` in basis points, full marks when there were no opportunities
fn ratio_bp(good: u64, bad: u64) -> u64 {
    let total = good as u128 + bad as u128;
    if total == 0 {
        return BASIS_POINTS;
    }
    (good as u128 * BASIS_POINTS as u128 / total) as u64
}

/// `numerator / denominator` in basis points, capped
fn scaled_bp(numerator: u64, denominator: u64) -> u64 {
    let scaled = numerator as u128 * BASIS_POINTS as u128 / denominator as u128;
    scaled.min(BASIS_POINTS as u128) as u64
}
