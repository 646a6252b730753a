//! Proof-of-work answers for the hybrid reward channel
//!
//! External miners attach answers to headers; the engine never mines, it only
//! asks the injected [`SealVerifier`] whether each answer holds.

use crate::errors::{ConsensusError, ConsensusResult};
use pob_state::{keccak256, Address, ChainReader, Hash, Header, PowAnswer};

/// Verifies a single proof-of-work answer against a reference header
pub trait SealVerifier: Send + Sync {
    fn verify_seal(
        &self,
        chain: &dyn ChainReader,
        reference: &Header,
        uncle: bool,
        answer: &PowAnswer,
    ) -> ConsensusResult<()>;
}

/// Hash-cash over keccak256
///
/// `keccak256(seal_hash(reference) ‖ be(nonce) ‖ miner)` must start with
/// `difficulty_bits` zero bits and equal the answer's `mix_digest`.
#[derive(Debug, Clone, Copy)]
pub struct KeccakPowVerifier {
    pub difficulty_bits: u32,
}

impl KeccakPowVerifier {
    pub fn new(difficulty_bits: u32) -> Self {
        Self { difficulty_bits }
    }

    pub fn digest(reference: &Header, miner: &Address, nonce: u64) -> Hash {
        let mut buf = Vec::with_capacity(Hash::LEN + 8 + Address::LEN);
        buf.extend_from_slice(reference.seal_hash().as_ref());
        buf.extend_from_slice(&nonce.to_be_bytes());
        buf.extend_from_slice(miner.as_ref());
        keccak256(&buf)
    }

    /// Brute-force an answer; used by dev miners and tests
    pub fn solve(&self, reference: &Header, miner: Address, uncle: bool) -> PowAnswer {
        let mut nonce = 0u64;
        loop {
            let digest = Self::digest(reference, &miner, nonce);
            if leading_zero_bits(&digest) >= self.difficulty_bits {
                return PowAnswer {
                    miner,
                    nonce,
                    mix_digest: digest,
                    uncle,
                };
            }
            nonce = nonce.wrapping_add(1);
        }
    }
}

impl SealVerifier for KeccakPowVerifier {
    fn verify_seal(
        &self,
        _chain: &dyn ChainReader,
        reference: &Header,
        _uncle: bool,
        answer: &PowAnswer,
    ) -> ConsensusResult<()> {
        let digest = Self::digest(reference, &answer.miner, answer.nonce);
        if digest != answer.mix_digest {
            return Err(ConsensusError::Pow(format!(
                "mix digest mismatch for miner {}",
                answer.miner
            )));
        }
        let zeros = leading_zero_bits(&digest);
        if zeros < self.difficulty_bits {
            return Err(ConsensusError::Pow(format!(
                "{} leading zero bits, need {}",
                zeros, self.difficulty_bits
            )));
        }
        Ok(())
    }
}

fn leading_zero_bits(hash: &Hash) -> u32 {
    let mut bits = 0;
    for byte in hash.as_bytes() {
        if *byte == 0 {
            bits += 8;
            continue;
        }
        bits += byte.leading_zeros();
        break;
    }
    bits
}
