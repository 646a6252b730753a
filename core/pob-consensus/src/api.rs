//! Typed query surface over the engine and the chain store

use crate::behavior::BehaviorScore;
use crate::engine::ProofOfBehavior;
use crate::errors::{ConsensusError, ConsensusResult};
use crate::snapshot::Snapshot;
use pob_state::{Address, ChainReader, Hash, Header};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Blocks covered by [`PobApi::status`]
pub const STATUS_WINDOW: u64 = 64;

/// Signing activity over the most recent blocks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Status {
    /// Share of blocks sealed by the selected producer, 0-100
    pub inturn_percent: f64,
    /// Blocks sealed per validator
    pub sealer_activity: BTreeMap<Address, u64>,
    /// Blocks inspected
    pub num_blocks: u64,
}

pub struct PobApi {
    engine: Arc<ProofOfBehavior>,
    chain: Arc<dyn ChainReader>,
}

impl PobApi {
    pub fn new(engine: Arc<ProofOfBehavior>, chain: Arc<dyn ChainReader>) -> Self {
        Self { engine, chain }
    }

    /// Header at `number`, or the head when `None`
    fn header_by_number(&self, number: Option<u64>) -> ConsensusResult<Header> {
        let header = match number {
            Some(number) => self.chain.get_header_by_number(number),
            None => self.chain.current_header(),
        };
        header.ok_or(ConsensusError::UnknownBlock)
    }

    fn header_by_hash(&self, hash: &Hash) -> ConsensusResult<Header> {
        self.chain
            .get_header_by_hash(hash)
            .ok_or(ConsensusError::UnknownBlock)
    }

    fn snapshot_of(&self, header: &Header) -> ConsensusResult<Arc<Snapshot>> {
        self.engine
            .snapshot(self.chain.as_ref(), header.number, header.hash(), &[])
    }

    pub fn get_snapshot(&self, number: Option<u64>) -> ConsensusResult<Snapshot> {
        let header = self.header_by_number(number)?;
        Ok(self.snapshot_of(&header)?.as_ref().clone())
    }

    pub fn get_snapshot_at_hash(&self, hash: &Hash) -> ConsensusResult<Snapshot> {
        let header = self.header_by_hash(hash)?;
        Ok(self.snapshot_of(&header)?.as_ref().clone())
    }

    pub fn get_behavior_scores(
        &self,
        number: Option<u64>,
    ) -> ConsensusResult<BTreeMap<Address, BehaviorScore>> {
        let header = self.header_by_number(number)?;
        Ok(self.snapshot_of(&header)?.validators.clone())
    }

    pub fn get_behavior_scores_at_hash(
        &self,
        hash: &Hash,
    ) -> ConsensusResult<BTreeMap<Address, BehaviorScore>> {
        let header = self.header_by_hash(hash)?;
        Ok(self.snapshot_of(&header)?.validators.clone())
    }

    pub fn get_validators(&self, number: Option<u64>) -> ConsensusResult<Vec<Address>> {
        let header = self.header_by_number(number)?;
        Ok(self.snapshot_of(&header)?.validators_list())
    }

    pub fn get_validators_at_hash(&self, hash: &Hash) -> ConsensusResult<Vec<Address>> {
        let header = self.header_by_hash(hash)?;
        Ok(self.snapshot_of(&header)?.validators_list())
    }

    pub fn proposals(&self) -> BTreeMap<Address, bool> {
        self.engine.proposals()
    }

    pub fn propose(&self, address: Address, authorize: bool) {
        self.engine.propose(address, authorize);
    }

    pub fn discard(&self, address: &Address) {
        self.engine.discard(address);
    }

    /// In-turn share and per-validator counts over the last [`STATUS_WINDOW`] blocks
    pub fn status(&self) -> ConsensusResult<Status> {
        let head = self.header_by_number(None)?;
        let chain = self.chain.as_ref();

        let mut sealer_activity: BTreeMap<Address, u64> = BTreeMap::new();
        let mut inturn = 0u64;
        let mut counted = 0u64;
        let mut header = head;

        while header.number > 0 && counted < STATUS_WINDOW {
            if !header.visual {
                let producer = self.engine.author(&header)?;
                let parent = self
                    .engine
                    .snapshot(chain, header.number - 1, header.parent_hash, &[])?;
                if parent.inturn(header.number, &header.parent_hash, &producer) {
                    inturn += 1;
                }
                *sealer_activity.entry(producer).or_insert(0) += 1;
                counted += 1;
            }
            header = chain
                .get_header(&header.parent_hash, header.number - 1)
                .ok_or(ConsensusError::UnknownAncestor)?;
        }

        let inturn_percent = if counted == 0 {
            0.0
        } else {
            inturn as f64 * 100.0 / counted as f64
        };
        Ok(Status {
            inturn_percent,
            sealer_activity,
            num_blocks: counted,
        })
    }
}
