//! Proof-of-Behavior Consensus
//!
//! Validators are picked by a deterministic, behavior-weighted draw seeded
//! from the parent hash. Each validator carries a score derived from its
//! history (liveness, correctness, cooperation, consistency and signal
//! sovereignty); missed turns cost score through proportional slashing, and
//! the set itself changes through majority votes carried in headers.

pub mod api;
pub mod batch;
pub mod behavior;
pub mod cache;
pub mod checkpoint;
pub mod config;
pub mod crypto;
pub mod engine;
pub mod errors;
pub mod fees;
pub mod metrics;
pub mod pow;
pub mod rpc;
pub mod snapshot;
pub mod types;
pub mod verify;

// Re-export main types for public API
pub use api::{PobApi, Status};
pub use batch::BatchHandle;
pub use behavior::{BehaviorAgent, BehaviorScore, BehaviorWeights, ValidatorHistory};
pub use cache::{Cache, LruCache};
pub use checkpoint::{decode_checkpoint, encode_checkpoint, genesis_checkpoint};
pub use config::PobConfig;
pub use crypto::{local_signer, recover_address, secret_to_address, sign_digest, SignerFn};
pub use engine::ProofOfBehavior;
pub use errors::{ConsensusError, ConsensusResult};
pub use pow::{KeccakPowVerifier, SealVerifier};
pub use rpc::{RpcError, RpcHandler, RpcRequest, RpcResponse};
pub use snapshot::{Snapshot, Tally, Vote};
pub use types::VerificationStage;
pub use verify::{find_real_parent_header, VerifyOptions};
