//! Error types for consensus module

use pob_state::{Address, StateError};
use thiserror::Error;

/// Consensus error types
#[derive(Error, Debug)]
pub enum ConsensusError {
    // Structural
    /// Header number missing or genesis where a sealed block is required
    #[error("Unknown block")]
    UnknownBlock,

    /// Parent or real (non-visual) ancestor not available
    #[error("Unknown ancestor")]
    UnknownAncestor,

    /// Header batch is not contiguous from the snapshot head
    #[error("Invalid voting chain")]
    InvalidVotingChain,

    /// Uncles are not allowed
    #[error("Uncles not allowed")]
    InvalidUncles,

    // Authorization
    /// Producer is not in the validator set
    #[error("Unauthorized signer: {0}")]
    UnauthorizedSigner(Address),

    /// Recovered address differs from the declared producer
    #[error("Signer mismatch: declared {declared}, recovered {recovered}")]
    SignerMismatch { declared: Address, recovered: Address },

    /// Signature missing, malformed or unrecoverable
    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    // Temporal
    /// Timestamp too far ahead of local time
    #[error("Block in the future: {timestamp} > {now}")]
    FutureBlock { timestamp: u64, now: u64 },

    /// Timestamp not after the parent
    #[error("Invalid timestamp: {timestamp} <= parent {parent}")]
    InvalidTimestamp { timestamp: u64, parent: u64 },

    /// Out-of-turn producer still inside the recents window
    #[error("Recently signed: {0}")]
    RecentlySigned(Address),

    // Resource limits
    /// Gas limit above cap or outside the allowed parent delta
    #[error("Invalid gas limit: {0}")]
    InvalidGasLimit(String),

    /// Gas used above gas limit
    #[error("Invalid gas used: have {used}, limit {limit}")]
    InvalidGasUsed { used: u64, limit: u64 },

    /// Base fee present before the fee-market fork, missing or wrong after it
    #[error("Invalid base fee: {0}")]
    InvalidBaseFee(String),

    /// Extra-data larger than a full checkpoint payload
    #[error("Extra-data too long: {0} bytes")]
    ExtraDataTooLong(usize),

    // Consensus parameters
    /// Behavior payload on a non-checkpoint block
    #[error("Non-checkpoint block contains extra validator data")]
    ExtraCheckpointData,

    /// Checkpoint payload does not decode
    #[error("Invalid checkpoint validators: {0}")]
    InvalidCheckpointValidators(String),

    /// Checkpoint payload decodes but disagrees with the snapshot
    #[error("Mismatching checkpoint validators")]
    MismatchingCheckpointValidators,

    /// Difficulty differs from the recomputed value
    #[error("Wrong difficulty: expected {expected}, got {actual}")]
    WrongDifficulty { expected: u64, actual: u64 },

    /// Number is not real parent + skipped visual blocks + 1
    #[error("Invalid number: expected {expected}, got {actual}")]
    InvalidNumber { expected: u64, actual: u64 },

    /// Ack digest does not commit to the ack counts
    #[error("Invalid acknowledgment digest")]
    InvalidAckDigest,

    /// Vote nonce is neither authorize nor deauthorize
    #[error("Invalid vote nonce: {0:#x}")]
    InvalidVote(u64),

    // Delegated
    /// Proof-of-work sub-engine rejected an answer
    #[error("Proof-of-work answer rejected: {0}")]
    Pow(String),

    // Sealing
    /// No local signer installed
    #[error("Signer not configured")]
    SignerUnavailable,

    /// Signer callback failed
    #[error("Signing failed: {0}")]
    Signing(String),

    // Persistence
    /// Store error
    #[error("Store error: {0}")]
    Store(#[from] StateError),

    /// Snapshot (de)serialization failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration rejected
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
}

impl ConsensusError {
    /// Short label used for metrics
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnknownBlock
            | Self::UnknownAncestor
            | Self::InvalidVotingChain
            | Self::InvalidUncles => "structural",
            Self::UnauthorizedSigner(_)
            | Self::SignerMismatch { .. }
            | Self::InvalidSignature(_) => "authorization",
            Self::FutureBlock { .. } | Self::InvalidTimestamp { .. } | Self::RecentlySigned(_) => {
                "temporal"
            }
            Self::InvalidGasLimit(_)
            | Self::InvalidGasUsed { .. }
            | Self::InvalidBaseFee(_)
            | Self::ExtraDataTooLong(_) => "resource",
            Self::ExtraCheckpointData
            | Self::InvalidCheckpointValidators(_)
            | Self::MismatchingCheckpointValidators
            | Self::WrongDifficulty { .. }
            | Self::InvalidNumber { .. }
            | Self::InvalidAckDigest
            | Self::InvalidVote(_) => "parameter",
            Self::Pow(_) => "delegated",
            Self::SignerUnavailable | Self::Signing(_) => "sealing",
            Self::Store(_) | Self::Serialization(_) | Self::InvalidConfig(_) => "internal",
        }
    }
}

/// Result type for consensus operations
pub type ConsensusResult<T> = Result<T, ConsensusError>;
