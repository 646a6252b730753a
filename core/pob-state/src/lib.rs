//! Chain primitives and storage interfaces for the PoB node
//!
//! This crate holds the types the consensus engine consumes but does not
//! own: headers, the header store, the key-value store used for snapshot
//! checkpoints and the balance state credited at finalization.

pub mod chain;
pub mod errors;
pub mod header;
pub mod primitives;
pub mod state_db;
pub mod store;

pub use chain::{ChainConfig, ChainReader, MemoryChain};
pub use errors::{StateError, StateResult};
pub use header::{Header, PowAnswer};
pub use primitives::{keccak256, Address, Amount, Hash};
pub use state_db::{MemoryState, StateDatabase};
pub use store::{KeyValueStore, MemoryDb};

