//! Block header structures

use crate::primitives::{keccak256, Address, Hash};
use serde::{Deserialize, Serialize};

/// Proof-of-work answer attached to a header by an external miner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PowAnswer {
    /// Miner credited for the answer
    pub miner: Address,
    /// Nonce found by the miner
    pub nonce: u64,
    /// Digest the miner claims for the answer
    pub mix_digest: Hash,
    /// Uncle-tier answer (solved against a side block)
    pub uncle: bool,
}

/// Block header
///
/// The consensus extension fields (`producer` through `signature`) are filled
/// during sealing; everything before `signature` is covered by the seal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Header {
    pub parent_hash: Hash,
    /// Membership vote target (zero when the header carries no vote)
    pub coinbase: Address,
    pub state_root: Hash,
    pub tx_root: Hash,
    pub difficulty: u64,
    pub number: u64,
    pub gas_limit: u64,
    pub gas_used: u64,
    /// Unix seconds
    pub timestamp: u64,
    /// Checkpoint validator payload; empty outside checkpoint blocks
    pub extra: Vec<u8>,
    pub mix_digest: Hash,
    /// Membership vote direction
    pub nonce: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_fee: Option<u64>,
    /// Informational block that does not extend the real chain height
    #[serde(default)]
    pub visual: bool,
    /// Declared block producer
    pub producer: Address,
    #[serde(default)]
    pub pow_answers: Vec<PowAnswer>,
    #[serde(default)]
    pub ack_counts: Vec<u64>,
    pub ack_digest: Hash,
    /// 65-byte recoverable producer signature
    #[serde(default)]
    pub signature: Vec<u8>,
}

impl Header {
    /// Canonical encoding of every field except the trailing signature
    pub fn pre_seal_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(320 + self.extra.len());
        out.extend_from_slice(self.parent_hash.as_ref());
        out.extend_from_slice(self.coinbase.as_ref());
        out.extend_from_slice(self.state_root.as_ref());
        out.extend_from_slice(self.tx_root.as_ref());
        out.extend_from_slice(&self.difficulty.to_be_bytes());
        out.extend_from_slice(&self.number.to_be_bytes());
        out.extend_from_slice(&self.gas_limit.to_be_bytes());
        out.extend_from_slice(&self.gas_used.to_be_bytes());
        out.extend_from_slice(&self.timestamp.to_be_bytes());
        out.extend_from_slice(&(self.extra.len() as u32).to_be_bytes());
        out.extend_from_slice(&self.extra);
        out.extend_from_slice(self.mix_digest.as_ref());
        out.extend_from_slice(&self.nonce.to_be_bytes());
        match self.base_fee {
            Some(fee) => {
                out.push(1);
                out.extend_from_slice(&fee.to_be_bytes());
            }
            None => out.push(0),
        }
        out.push(self.visual as u8);
        out.extend_from_slice(self.producer.as_ref());
        out.extend_from_slice(&(self.pow_answers.len() as u32).to_be_bytes());
        for answer in &self.pow_answers {
            out.extend_from_slice(answer.miner.as_ref());
            out.extend_from_slice(&answer.nonce.to_be_bytes());
            out.extend_from_slice(answer.mix_digest.as_ref());
            out.push(answer.uncle as u8);
        }
        out.extend_from_slice(&(self.ack_counts.len() as u32).to_be_bytes());
        for count in &self.ack_counts {
            out.extend_from_slice(&count.to_be_bytes());
        }
        out.extend_from_slice(self.ack_digest.as_ref());
        out
    }

    /// Hash the producer signs
    pub fn seal_hash(&self) -> Hash {
        keccak256(&self.pre_seal_bytes())
    }

    /// Block hash, covering the signature
    pub fn hash(&self) -> Hash {
        let mut bytes = self.pre_seal_bytes();
        bytes.extend_from_slice(&self.signature);
        keccak256(&bytes)
    }
}
