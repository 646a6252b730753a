//! Protocol constants and small shared types

use pob_state::Amount;
use serde::{Deserialize, Serialize};

/// Basis-point scale used for every score and fraction
pub const BASIS_POINTS: u64 = 10_000;

/// Score assigned to a validator that has no history yet
pub const DEFAULT_SCORE: u64 = 5_000;

/// Snapshots are persisted to the store every this many blocks
pub const CHECKPOINT_INTERVAL: u64 = 1024;

/// Headers deeper than this are treated as immutable when reconstructing
pub const FULL_IMMUTABILITY_THRESHOLD: usize = 90_000;

/// Difficulty of an in-turn block
pub const DIFF_IN_TURN: u64 = 2;

/// Difficulty of an out-of-turn block (and of every block after the
/// behavior-difficulty fork)
pub const DIFF_NO_TURN: u64 = 1;

/// Vote nonce adding the coinbase to the validator set
pub const NONCE_AUTH: u64 = u64::MAX;

/// Vote nonce removing the coinbase from the validator set
pub const NONCE_DROP: u64 = 0;

/// Largest allowed gas limit (2^63 - 1)
pub const MAX_GAS_LIMIT: u64 = 0x7fff_ffff_ffff_ffff;

/// Smallest allowed gas limit
pub const MIN_GAS_LIMIT: u64 = 5_000;

/// Bound divisor of the per-block gas limit change
pub const GAS_LIMIT_BOUND_DIVISOR: u64 = 1024;

/// Reward paid to the block producer
pub const PRODUCER_REWARD: Amount = 2_000_000_000;

/// Reward paid per primary proof-of-work answer
pub const POW_ANSWER_REWARD: Amount = 500_000_000;

/// Reward paid per uncle-tier proof-of-work answer
pub const POW_UNCLE_REWARD: Amount = 250_000_000;

/// Domain tag handed to the signer callback
pub const SEAL_MIME_TYPE: &str = "application/x-pob-header";

/// Verification progress of a single header
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum VerificationStage {
    Unverified,
    SignatureChecked,
    TimingChecked,
    DifficultyChecked,
    GasChecked,
    SealChecked,
    Accepted,
}

impl Default for VerificationStage {
    fn default() -> Self {
        VerificationStage::Unverified
    }
}
