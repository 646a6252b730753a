//! Chain parameters and the header reader consumed by consensus

use crate::header::Header;
use crate::primitives::Hash;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Protocol parameters and fork activation heights
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainConfig {
    pub chain_id: u64,
    /// Fee-market fork; headers from this height carry a base fee
    #[serde(default)]
    pub london_block: Option<u64>,
    /// From this height difficulty is a fixed advisory constant
    #[serde(default)]
    pub behavior_difficulty_block: Option<u64>,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            chain_id: 1337,
            london_block: None,
            behavior_difficulty_block: None,
        }
    }
}

impl ChainConfig {
    pub fn is_london(&self, number: u64) -> bool {
        matches!(self.london_block, Some(fork) if number >= fork)
    }

    pub fn is_behavior_difficulty(&self, number: u64) -> bool {
        matches!(self.behavior_difficulty_block, Some(fork) if number >= fork)
    }
}

/// Read access to the header store.
///
/// Missing headers are reported as `None`, never as an error.
pub trait ChainReader: Send + Sync {
    /// Chain configuration
    fn config(&self) -> &ChainConfig;

    /// Current canonical head
    fn current_header(&self) -> Option<Header>;

    /// Header by hash and number
    fn get_header(&self, hash: &Hash, number: u64) -> Option<Header>;

    /// Canonical header at `number`
    fn get_header_by_number(&self, number: u64) -> Option<Header>;

    /// Header by hash, any branch
    fn get_header_by_hash(&self, hash: &Hash) -> Option<Header>;
}

/// In-memory header store
pub struct MemoryChain {
    config: ChainConfig,
    headers: RwLock<HashMap<Hash, Header>>,
    canonical: RwLock<BTreeMap<u64, Hash>>,
}

impl MemoryChain {
    pub fn new(config: ChainConfig) -> Self {
        Self {
            config,
            headers: RwLock::new(HashMap::new()),
            canonical: RwLock::new(BTreeMap::new()),
        }
    }

    /// Store a header and make it canonical at its height
    pub fn insert(&self, header: Header) -> Hash {
        let hash = header.hash();
        let number = header.number;
        self.headers.write().insert(hash, header);
        self.canonical.write().insert(number, hash);
        hash
    }

    pub fn len(&self) -> usize {
        self.canonical.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.canonical.read().is_empty()
    }
}

impl ChainReader for MemoryChain {
    fn config(&self) -> &ChainConfig {
        &self.config
    }

    fn current_header(&self) -> Option<Header> {
        let canonical = self.canonical.read();
        let (_, hash) = canonical.iter().next_back()?;
        self.headers.read().get(hash).cloned()
    }

    fn get_header(&self, hash: &Hash, number: u64) -> Option<Header> {
        self.headers
            .read()
            .get(hash)
            .filter(|header| header.number == number)
            .cloned()
    }

    fn get_header_by_number(&self, number: u64) -> Option<Header> {
        let hash = *self.canonical.read().get(&number)?;
        self.headers.read().get(&hash).cloned()
    }

    fn get_header_by_hash(&self, hash: &Hash) -> Option<Header> {
        self.headers.read().get(hash).cloned()
    }
}
