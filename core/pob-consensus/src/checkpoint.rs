//! Checkpoint extra-data codec
//!
//! Layout: `[count: u8][count × (address: 20 bytes ‖ score: u64 big-endian)]`.
//! Embedded only in checkpoint blocks so a light client can pick up the
//! validator set and scores without replaying history.

use crate::behavior::BehaviorScore;
use crate::errors::{ConsensusError, ConsensusResult};
use crate::types::BASIS_POINTS;
use pob_state::Address;
use std::collections::BTreeMap;

/// Bytes per validator record
pub const CHECKPOINT_RECORD_LEN: usize = Address::LEN + 8;

/// Validators that fit behind a one-byte count
pub const MAX_CHECKPOINT_VALIDATORS: usize = u8::MAX as usize;

/// Largest valid payload
pub const MAX_CHECKPOINT_LEN: usize = 1 + MAX_CHECKPOINT_VALIDATORS * CHECKPOINT_RECORD_LEN;

/// Encode validators in ascending address order
pub fn encode_checkpoint(
    validators: &BTreeMap<Address, BehaviorScore>,
) -> ConsensusResult<Vec<u8>> {
    if validators.len() > MAX_CHECKPOINT_VALIDATORS {
        return Err(ConsensusError::InvalidCheckpointValidators(format!(
            "{} validators exceed the {} record limit",
            validators.len(),
            MAX_CHECKPOINT_VALIDATORS
        )));
    }

    let mut out = Vec::with_capacity(1 + validators.len() * CHECKPOINT_RECORD_LEN);
    out.push(validators.len() as u8);
    for (address, score) in validators {
        out.extend_from_slice(address.as_ref());
        out.extend_from_slice(&score.total.to_be_bytes());
    }
    Ok(out)
}

/// Payload for a genesis header: every validator at the default score
pub fn genesis_checkpoint(validators: &[Address]) -> ConsensusResult<Vec<u8>> {
    let set: BTreeMap<Address, BehaviorScore> = validators
        .iter()
        .map(|address| (*address, BehaviorScore::new_default(0)))
        .collect();
    encode_checkpoint(&set)
}

/// Decode a payload into address → total score
pub fn decode_checkpoint(payload: &[u8]) -> ConsensusResult<BTreeMap<Address, u64>> {
    let (&count, records) = payload
        .split_first()
        .ok_or_else(|| ConsensusError::InvalidCheckpointValidators("empty payload".to_string()))?;

    let expected = count as usize * CHECKPOINT_RECORD_LEN;
    if records.len() != expected {
        return Err(ConsensusError::InvalidCheckpointValidators(format!(
            "expected {} record bytes for {} validators, got {}",
            expected,
            count,
            records.len()
        )));
    }

    let mut scores = BTreeMap::new();
    for record in records.chunks_exact(CHECKPOINT_RECORD_LEN) {
        let address = Address::from_slice(&record[..Address::LEN])?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&record[Address::LEN..]);
        let score = u64::from_be_bytes(raw);
        if score > BASIS_POINTS {
            return Err(ConsensusError::InvalidCheckpointValidators(format!(
                "score {} of {} above {}",
                score, address, BASIS_POINTS
            )));
        }
        if scores.insert(address, score).is_some() {
            return Err(ConsensusError::InvalidCheckpointValidators(format!(
                "duplicate validator {}",
                address
            )));
        }
    }
    Ok(scores)
}
