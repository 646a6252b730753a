//! Validator set state at a given block
//!
//! A snapshot is the authorization state of the chain at one block: the
//! validator set with behavior scores and histories, the recents window,
//! and the pending membership votes. It is advanced by [`Snapshot::apply`]
//! and never mutated in place once shared.

use crate::behavior::{BehaviorAgent, BehaviorScore, ValidatorHistory};
use crate::checkpoint::{decode_checkpoint, encode_checkpoint};
use crate::config::PobConfig;
use crate::errors::{ConsensusError, ConsensusResult};
use crate::types::{NONCE_AUTH, NONCE_DROP};
use pob_state::{keccak256, Address, Hash, Header, KeyValueStore};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Key prefix of persisted snapshots
pub const SNAPSHOT_PREFIX: &[u8] = b"pob-";

/// A single membership vote cast by a validator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    /// Validator that cast the vote
    pub signer: Address,
    /// Block the vote was cast in
    pub block: u64,
    /// Account being voted on
    pub address: Address,
    /// Add (true) or remove (false)
    pub authorize: bool,
}

/// Running count of votes for one target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tally {
    pub authorize: bool,
    pub votes: u64,
}

/// Authorization state at a block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(skip)]
    config: PobConfig,

    /// Block number of the snapshot
    pub number: u64,
    /// Block hash of the snapshot
    pub hash: Hash,
    /// Validators and their current behavior scores
    pub validators: BTreeMap<Address, BehaviorScore>,
    /// Behavior counters per validator
    pub histories: BTreeMap<Address, ValidatorHistory>,
    /// Recent producers by block number, for spam protection
    pub recents: BTreeMap<u64, Address>,
    /// Votes in chronological order
    pub votes: Vec<Vote>,
    /// Current vote tally per target
    pub tally: BTreeMap<Address, Tally>,
    /// Rebuilt from a trusted checkpoint without the history before it.
    /// Epoch blocks then carry the scores instead of re-evaluation.
    #[serde(default)]
    pub light: bool,
}

impl Snapshot {
    /// New snapshot where every validator starts from the default score
    pub fn new(config: PobConfig, number: u64, hash: Hash, validators: &[Address]) -> Self {
        let validators: BTreeMap<Address, BehaviorScore> = validators
            .iter()
            .map(|address| (*address, BehaviorScore::new_default(number)))
            .collect();
        Self::with_scores(config, number, hash, validators)
    }

    /// New snapshot from a decoded checkpoint payload.
    ///
    /// Only the total survives a checkpoint; the dimensions restart neutral.
    pub fn from_checkpoint(
        config: PobConfig,
        number: u64,
        hash: Hash,
        scores: &BTreeMap<Address, u64>,
    ) -> Self {
        let validators = scores
            .iter()
            .map(|(address, total)| {
                let score = BehaviorScore {
                    total: *total,
                    ..BehaviorScore::new_default(number)
                };
                (*address, score)
            })
            .collect();
        Self::with_scores(config, number, hash, validators)
    }

    /// Snapshot for a node that starts from the checkpoint at `number`
    /// without the headers before it
    pub fn from_trusted_checkpoint(
        config: PobConfig,
        number: u64,
        hash: Hash,
        scores: &BTreeMap<Address, u64>,
    ) -> Self {
        Self {
            light: true,
            ..Self::from_checkpoint(config, number, hash, scores)
        }
    }

    fn with_scores(
        config: PobConfig,
        number: u64,
        hash: Hash,
        validators: BTreeMap<Address, BehaviorScore>,
    ) -> Self {
        let histories = validators
            .keys()
            .map(|address| (*address, ValidatorHistory::default()))
            .collect();
        Self {
            config,
            number,
            hash,
            validators,
            histories,
            recents: BTreeMap::new(),
            votes: Vec::new(),
            tally: BTreeMap::new(),
            light: false,
        }
    }

    /// Load a persisted snapshot, `None` when the store has no entry for `hash`
    pub fn load(
        config: &PobConfig,
        db: &dyn KeyValueStore,
        hash: &Hash,
    ) -> ConsensusResult<Option<Self>> {
        let Some(blob) = db.get(&snapshot_key(hash))? else {
            return Ok(None);
        };
        let mut snap: Snapshot = serde_json::from_slice(&blob)?;
        snap.config = config.clone();
        Ok(Some(snap))
    }

    /// Persist under `pob-` ‖ hash
    pub fn store(&self, db: &dyn KeyValueStore) -> ConsensusResult<()> {
        let blob = serde_json::to_vec(self)?;
        db.put(&snapshot_key(&self.hash), &blob)?;
        Ok(())
    }

    pub fn config(&self) -> &PobConfig {
        &self.config
    }

    /// Validators in ascending address order
    pub fn validators_list(&self) -> Vec<Address> {
        self.validators.keys().copied().collect()
    }

    pub fn is_validator(&self, address: &Address) -> bool {
        self.validators.contains_key(address)
    }

    /// Size of the recents window
    pub fn recents_limit(&self) -> usize {
        self.validators.len() / 2 + 1
    }

    /// Whether `address` produced a block inside the window preceding `number`
    pub fn signed_recently(&self, address: &Address, number: u64) -> bool {
        let limit = self.recents_limit() as u64;
        self.recents
            .iter()
            .any(|(seen, signer)| signer == address && seen + limit > number)
    }

    /// Checkpoint payload for the current validator set
    pub fn checkpoint_payload(&self) -> ConsensusResult<Vec<u8>> {
        encode_checkpoint(&self.validators)
    }

    /// Address → total, the part of the snapshot a checkpoint carries
    pub fn checkpoint_scores(&self) -> BTreeMap<Address, u64> {
        self.validators
            .iter()
            .map(|(address, score)| (*address, score.total))
            .collect()
    }

    /// A vote is meaningful only if it changes membership
    pub fn valid_vote(&self, address: &Address, authorize: bool) -> bool {
        let member = self.validators.contains_key(address);
        (member && !authorize) || (!member && authorize)
    }

    fn cast(&mut self, address: Address, authorize: bool) -> bool {
        if !self.valid_vote(&address, authorize) {
            return false;
        }
        self.tally
            .entry(address)
            .and_modify(|tally| tally.votes += 1)
            .or_insert(Tally { authorize, votes: 1 });
        true
    }

    fn uncast(&mut self, address: Address, authorize: bool) -> bool {
        let Some(tally) = self.tally.get_mut(&address) else {
            return false;
        };
        if tally.authorize != authorize {
            return false;
        }
        if tally.votes > 1 {
            tally.votes -= 1;
        } else {
            self.tally.remove(&address);
        }
        true
    }

    /// Deterministic behavior-weighted producer for `height`.
    ///
    /// Walks validators in ascending address order accumulating scores and
    /// returns the first whose running total exceeds `seed mod total`. Falls
    /// back to round-robin when every score is zero.
    pub fn select_producer(&self, height: u64, parent_hash: &Hash) -> Option<Address> {
        if self.validators.is_empty() {
            return None;
        }

        let total: u64 = self
            .validators
            .values()
            .fold(0u64, |acc, score| acc.saturating_add(score.total));
        if total == 0 {
            let index = (height % self.validators.len() as u64) as usize;
            return self.validators.keys().nth(index).copied();
        }

        let target = selection_seed(parent_hash, height) % total;
        let mut cumulative = 0u64;
        for (address, score) in &self.validators {
            cumulative = cumulative.saturating_add(score.total);
            if cumulative > target {
                return Some(*address);
            }
        }
        self.validators.keys().next_back().copied()
    }

    /// Whether `address` is the selected producer for `height`
    pub fn inturn(&self, height: u64, parent_hash: &Hash, address: &Address) -> bool {
        self.select_producer(height, parent_hash).as_ref() == Some(address)
    }

    /// Produce the snapshot after applying `headers` on top of this one.
    ///
    /// Headers must be contiguous and start right after `self.number`.
    /// Signatures are not checked here; callers hand in verified headers.
    pub fn apply(&self, headers: &[Header]) -> ConsensusResult<Snapshot> {
        let Some(last) = headers.last() else {
            return Ok(self.clone());
        };
        for pair in headers.windows(2) {
            if pair[1].number != pair[0].number + 1 {
                return Err(ConsensusError::InvalidVotingChain);
            }
        }
        if headers[0].number != self.number + 1 {
            return Err(ConsensusError::InvalidVotingChain);
        }

        let agent = BehaviorAgent::with_weights(self.config.behavior_weights)?;
        let mut snap = self.clone();

        for header in headers {
            let number = header.number;

            if header.visual {
                if number % snap.config.epoch == 0 {
                    snap.start_epoch(&agent, header)?;
                }
                continue;
            }

            let producer = header.producer;
            if !snap.validators.contains_key(&producer) {
                return Err(ConsensusError::UnauthorizedSigner(producer));
            }

            // Selection runs against the parent state, before this block's effects
            if let Some(expected) = snap.select_producer(number, &header.parent_hash) {
                if expected != producer {
                    snap.record_missed_turn(&agent, expected, number);
                }
            }

            let limit = snap.recents_limit();
            while snap.recents.len() >= limit {
                snap.recents.pop_first();
            }
            snap.recents.insert(number, producer);
            snap.histories.entry(producer).or_default().blocks_proposed += 1;

            snap.record_acks(&header.ack_counts);
            snap.tally_vote(header, number)?;

            if number % snap.config.epoch == 0 {
                snap.start_epoch(&agent, header)?;
            }
        }

        snap.number = last.number;
        snap.hash = last.hash();
        Ok(snap)
    }

    /// Clear votes and re-score every validator at an epoch block.
    ///
    /// A light snapshot lacks the histories before its checkpoint, so it
    /// takes the totals the epoch block carries instead.
    fn start_epoch(&mut self, agent: &BehaviorAgent, header: &Header) -> ConsensusResult<()> {
        let number = header.number;
        self.votes.clear();
        self.tally.clear();

        if !self.light {
            self.validators = agent.update_scores(&self.validators, &self.histories, number);
            debug!(
                "Re-evaluated {} validator scores at epoch block {}",
                self.validators.len(),
                number
            );
            return Ok(());
        }

        let scores = decode_checkpoint(&header.extra)?;
        if !scores.keys().eq(self.validators.keys()) {
            return Err(ConsensusError::MismatchingCheckpointValidators);
        }
        for (address, total) in scores {
            self.validators.insert(
                address,
                BehaviorScore {
                    total,
                    ..BehaviorScore::new_default(number)
                },
            );
        }
        debug!("Adopted checkpoint scores at epoch block {}", number);
        Ok(())
    }

    fn record_missed_turn(&mut self, agent: &BehaviorAgent, expected: Address, number: u64) {
        let slashing = self.config.missed_turn_severity_bp > 0 && self.config.slash_fraction_bp > 0;
        let history = self.histories.entry(expected).or_default();
        history.blocks_missed += 1;
        if !slashing {
            return;
        }
        history.slash_count += 1;
        if let Some(score) = self.validators.get_mut(&expected) {
            let slashed = agent.proportional_slash(
                score,
                self.config.missed_turn_severity_bp,
                self.config.slash_fraction_bp,
            );
            debug!(
                "Validator {} missed turn at block {}: score {} -> {}",
                expected, number, score.total, slashed.total
            );
            *score = slashed;
        }
    }

    /// One ack entry per validator in address order; any other length is ignored
    fn record_acks(&mut self, ack_counts: &[u64]) {
        if ack_counts.is_empty() || ack_counts.len() != self.validators.len() {
            return;
        }
        let order = self.validators_list();
        for (address, count) in order.iter().zip(ack_counts) {
            let history = self.histories.entry(*address).or_default();
            if *count > 0 {
                history.acks_given += 1;
            } else {
                history.acks_missed += 1;
            }
        }
    }

    fn tally_vote(&mut self, header: &Header, number: u64) -> ConsensusResult<()> {
        let target = header.coinbase;
        if target.is_zero() {
            return Ok(());
        }
        let authorize = match header.nonce {
            NONCE_AUTH => true,
            NONCE_DROP => false,
            other => return Err(ConsensusError::InvalidVote(other)),
        };
        let signer = header.producer;

        // A validator holds at most one vote per target
        if let Some(position) = self
            .votes
            .iter()
            .position(|vote| vote.signer == signer && vote.address == target)
        {
            let stale = self.votes.remove(position);
            self.uncast(stale.address, stale.authorize);
        }

        if self.cast(target, authorize) {
            self.votes.push(Vote {
                signer,
                block: number,
                address: target,
                authorize,
            });
        } else {
            // A vote that cannot change membership is a faulty proposal
            self.histories.entry(signer).or_default().invalid_proposals += 1;
        }

        let Some(tally) = self.tally.get(&target).copied() else {
            return Ok(());
        };
        if tally.votes <= self.validators.len() as u64 / 2 {
            return Ok(());
        }

        if tally.authorize {
            self.validators.insert(target, BehaviorScore::new_default(number));
            self.histories.entry(target).or_default();
            info!("Validator {} authorized at block {}", target, number);
        } else {
            self.validators.remove(&target);
            self.histories.remove(&target);

            let limit = self.recents_limit();
            while self.recents.len() > limit {
                self.recents.pop_first();
            }

            let mut index = 0;
            while index < self.votes.len() {
                if self.votes[index].signer == target {
                    let vote = self.votes.remove(index);
                    self.uncast(vote.address, vote.authorize);
                } else {
                    index += 1;
                }
            }
            warn!("Validator {} removed at block {}", target, number);
        }

        self.votes.retain(|vote| vote.address != target);
        self.tally.remove(&target);
        Ok(())
    }
}

/// First 8 bytes of keccak(parent_hash ‖ be(height)) as a big-endian integer
pub fn selection_seed(parent_hash: &Hash, height: u64) -> u64 {
    let mut buf = [0u8; Hash::LEN + 8];
    buf[..Hash::LEN].copy_from_slice(parent_hash.as_ref());
    buf[Hash::LEN..].copy_from_slice(&height.to_be_bytes());
    let digest = keccak256(&buf);
    let mut seed = [0u8; 8];
    seed.copy_from_slice(&digest.as_bytes()[..8]);
    u64::from_be_bytes(seed)
}

fn snapshot_key(hash: &Hash) -> Vec<u8> {
    let mut key = Vec::with_capacity(SNAPSHOT_PREFIX.len() + Hash::LEN);
    key.extend_from_slice(SNAPSHOT_PREFIX);
    key.extend_from_slice(hash.as_ref());
    key
}

#[cfg(test)]
mod tests {
    use super::*;
    use pob_state::MemoryDb;

    fn addr(n: u8) -> Address {
        Address([n; 20])
    }

    fn genesis(validators: &[Address]) -> Snapshot {
        Snapshot::new(PobConfig::default(), 0, Hash([0x11; 32]), validators)
    }

    fn header(number: u64, parent: Hash, producer: Address) -> Header {
        Header {
            number,
            parent_hash: parent,
            producer,
            timestamp: number * 3,
            ..Default::default()
        }
    }

    /// Chain of headers on top of `snap` with the given producers
    fn chain(snap: &Snapshot, producers: &[Address]) -> Vec<Header> {
        let mut parent = snap.hash;
        producers
            .iter()
            .enumerate()
            .map(|(i, producer)| {
                let h = header(snap.number + 1 + i as u64, parent, *producer);
                parent = h.hash();
                h
            })
            .collect()
    }

    fn vote(mut h: Header, target: Address, authorize: bool) -> Header {
        h.coinbase = target;
        h.nonce = if authorize { NONCE_AUTH } else { NONCE_DROP };
        h
    }

    #[test]
    fn test_round_robin_chain_keeps_window() {
        let validators = [addr(1), addr(2), addr(3)];
        let snap = genesis(&validators);
        let producers: Vec<Address> = (1..=10).map(|n| validators[n % 3]).collect();
        let headers = chain(&snap, &producers);

        let next = snap.apply(&headers).unwrap();
        assert_eq!(next.number, 10);
        assert_eq!(next.hash, headers[9].hash());
        assert!(next.recents.len() <= 2);
        assert_eq!(next.validators.len(), 3);
        let proposed: u64 = next.histories.values().map(|h| h.blocks_proposed).sum();
        assert_eq!(proposed, 10);
    }

    #[test]
    fn test_apply_is_deterministic() {
        let validators = [addr(1), addr(2), addr(3), addr(4)];
        let snap = genesis(&validators);
        let producers: Vec<Address> = (0..25).map(|n| validators[(n * 7) % 4]).collect();
        let headers = chain(&snap, &producers);

        let a = snap.apply(&headers).unwrap();
        let b = snap.apply(&headers).unwrap();
        assert_eq!(a, b);

        // Split application reaches the same state
        let first = snap.apply(&headers[..10]).unwrap();
        let split = first.apply(&headers[10..]).unwrap();
        assert_eq!(a, split);
    }

    #[test]
    fn test_empty_apply_is_identity() {
        let snap = genesis(&[addr(1)]);
        assert_eq!(snap.apply(&[]).unwrap(), snap);
    }

    #[test]
    fn test_non_contiguous_headers_rejected() {
        let snap = genesis(&[addr(1), addr(2)]);
        let mut headers = chain(&snap, &[addr(1), addr(2), addr(1)]);
        headers[2].number = 7;
        assert!(matches!(snap.apply(&headers), Err(ConsensusError::InvalidVotingChain)));

        let gap = vec![header(2, snap.hash, addr(1))];
        assert!(matches!(snap.apply(&gap), Err(ConsensusError::InvalidVotingChain)));
    }

    #[test]
    fn test_unknown_producer_rejected() {
        let snap = genesis(&[addr(1), addr(2)]);
        let headers = chain(&snap, &[addr(9)]);
        assert!(matches!(
            snap.apply(&headers),
            Err(ConsensusError::UnauthorizedSigner(a)) if a == addr(9)
        ));
    }

    #[test]
    fn test_valid_vote() {
        let snap = genesis(&[addr(1), addr(2)]);
        assert!(!snap.valid_vote(&addr(1), true));
        assert!(snap.valid_vote(&addr(1), false));
        assert!(snap.valid_vote(&addr(5), true));
        assert!(!snap.valid_vote(&addr(5), false));
    }

    #[test]
    fn test_authorize_on_majority() {
        let snap = genesis(&[addr(1), addr(2), addr(3)]);
        let mut headers = chain(&snap, &[addr(1), addr(2)]);
        headers[0] = vote(headers[0].clone(), addr(4), true);

        let after_one = snap.apply(&headers[..1]).unwrap();
        assert_eq!(after_one.tally.get(&addr(4)).map(|t| t.votes), Some(1));
        assert!(!after_one.is_validator(&addr(4)));

        headers[1] = vote(headers[1].clone(), addr(4), true);
        let after_two = snap.apply(&headers).unwrap();
        assert!(after_two.is_validator(&addr(4)));
        assert!(after_two.tally.is_empty());
        assert!(after_two.votes.iter().all(|v| v.address != addr(4)));
        assert_eq!(after_two.validators[&addr(4)].total, 5000);
    }

    #[test]
    fn test_repeated_vote_counts_once() {
        let snap = genesis(&[addr(1), addr(2), addr(3)]);
        let headers: Vec<Header> = chain(&snap, &[addr(1), addr(2), addr(1)])
            .into_iter()
            .enumerate()
            .map(|(i, h)| if i == 1 { h } else { vote(h, addr(4), true) })
            .collect();
        let next = snap.apply(&headers).unwrap();
        assert_eq!(next.tally[&addr(4)].votes, 1);
        assert_eq!(next.votes.len(), 1);
        assert!(!next.is_validator(&addr(4)));
    }

    #[test]
    fn test_no_op_vote_not_tallied() {
        let snap = genesis(&[addr(1), addr(2)]);
        let headers = vec![vote(chain(&snap, &[addr(1)])[0].clone(), addr(2), true)];
        let next = snap.apply(&headers).unwrap();
        assert!(next.tally.is_empty());
        assert!(next.votes.is_empty());
        assert_eq!(next.histories[&addr(1)].invalid_proposals, 1);
        assert_eq!(next.histories[&addr(2)].invalid_proposals, 0);
    }

    #[test]
    fn test_deauthorize_purges_validator() {
        let snap = genesis(&[addr(1), addr(2), addr(3)]);
        let raw = chain(&snap, &[addr(3), addr(1), addr(2)]);
        let headers = vec![
            // addr(3) votes for an outsider before being removed
            vote(raw[0].clone(), addr(7), true),
            vote(raw[1].clone(), addr(3), false),
            vote(raw[2].clone(), addr(3), false),
        ];
        let next = snap.apply(&headers).unwrap();
        assert!(!next.is_validator(&addr(3)));
        assert!(!next.histories.contains_key(&addr(3)));
        assert!(next.votes.iter().all(|v| v.signer != addr(3) && v.address != addr(3)));
        assert!(!next.tally.contains_key(&addr(7)));
        assert!(next.recents.len() <= next.recents_limit());
    }

    #[test]
    fn test_bad_vote_nonce_rejected() {
        let snap = genesis(&[addr(1), addr(2)]);
        let mut h = chain(&snap, &[addr(1)]).remove(0);
        h.coinbase = addr(9);
        h.nonce = 5;
        assert!(matches!(snap.apply(&[h]), Err(ConsensusError::InvalidVote(5))));
    }

    #[test]
    fn test_missed_turn_slashes_expected_producer() {
        let snap = genesis(&[addr(1), addr(2)]);
        let expected = snap.select_producer(1, &snap.hash).unwrap();
        let other = if expected == addr(1) { addr(2) } else { addr(1) };

        let next = snap.apply(&chain(&snap, &[other])).unwrap();
        assert_eq!(next.histories[&expected].blocks_missed, 1);
        assert_eq!(next.histories[&expected].slash_count, 1);
        // 5000 * 100bp * 10000bp
        assert_eq!(next.validators[&expected].total, 4950);
        assert_eq!(next.validators[&other].total, 5000);
    }

    #[test]
    fn test_acks_follow_address_order() {
        let snap = genesis(&[addr(3), addr(1), addr(2)]);
        let mut headers = chain(&snap, &[addr(1)]);
        headers[0].ack_counts = vec![4, 0, 1];
        let next = snap.apply(&headers).unwrap();
        assert_eq!(next.histories[&addr(1)].acks_given, 1);
        assert_eq!(next.histories[&addr(2)].acks_missed, 1);
        assert_eq!(next.histories[&addr(3)].acks_given, 1);

        // Wrong length is ignored
        let mut headers = chain(&snap, &[addr(1)]);
        headers[0].ack_counts = vec![1, 1];
        let next = snap.apply(&headers).unwrap();
        assert!(next.histories.values().all(|h| h.acks_given == 0 && h.acks_missed == 0));
    }

    #[test]
    fn test_visual_headers_only_advance_head() {
        let snap = genesis(&[addr(1), addr(2)]);
        let mut headers = chain(&snap, &[addr(1), addr(2)]);
        headers[1].visual = true;
        headers[1].producer = addr(9);
        let next = snap.apply(&headers).unwrap();
        assert_eq!(next.number, 2);
        assert_eq!(next.hash, headers[1].hash());
        assert_eq!(next.recents.len(), 1);
    }

    #[test]
    fn test_epoch_resets_votes_and_rescores() {
        let config = PobConfig {
            epoch: 4,
            ..Default::default()
        };
        let validators = [addr(1), addr(2), addr(3)];
        let snap = Snapshot::new(config, 0, Hash([0x22; 32]), &validators);
        let mut headers = chain(&snap, &[addr(1), addr(2), addr(3), addr(1)]);
        headers[0] = vote(headers[0].clone(), addr(8), true);

        let before = snap.apply(&headers[..3]).unwrap();
        assert_eq!(before.votes.len(), 1);

        let after = snap.apply(&headers).unwrap();
        assert!(after.votes.is_empty());
        assert!(after.tally.is_empty());
        assert!(after.validators.values().all(|s| s.last_update == 4));
    }

    #[test]
    fn test_slash_survives_epoch_rescoring() {
        let config = PobConfig {
            epoch: 2,
            ..Default::default()
        };
        let snap = Snapshot::new(config, 0, Hash([0x33; 32]), &[addr(1), addr(2), addr(3)]);
        let expected = snap.select_producer(1, &snap.hash).unwrap();
        let other = snap.validators_list().into_iter().find(|a| *a != expected).unwrap();

        let first = chain(&snap, &[other]);
        let mid = snap.apply(&first).unwrap();
        let second_producer = mid.select_producer(2, &first[0].hash()).unwrap();
        let mut headers = first.clone();
        headers.extend(chain(&mid, &[second_producer]));

        let after = snap.apply(&headers).unwrap();
        assert_eq!(after.histories[&expected].slash_count, 1);
        assert_eq!(after.validators[&expected].consistency, 9_000);
        for (address, score) in &after.validators {
            if *address != expected {
                assert!(after.validators[&expected].total < score.total);
            }
        }
    }

    #[test]
    fn test_zero_severity_records_miss_without_slash() {
        let config = PobConfig {
            missed_turn_severity_bp: 0,
            ..Default::default()
        };
        let snap = Snapshot::new(config, 0, Hash([0x44; 32]), &[addr(1), addr(2)]);
        let expected = snap.select_producer(1, &snap.hash).unwrap();
        let other = if expected == addr(1) { addr(2) } else { addr(1) };

        let next = snap.apply(&chain(&snap, &[other])).unwrap();
        assert_eq!(next.histories[&expected].blocks_missed, 1);
        assert_eq!(next.histories[&expected].slash_count, 0);
        assert_eq!(next.validators[&expected].total, 5_000);
    }

    #[test]
    fn test_light_snapshot_adopts_epoch_payload() {
        let config = PobConfig {
            epoch: 2,
            ..Default::default()
        };
        let mut scores = BTreeMap::new();
        scores.insert(addr(1), 8000);
        scores.insert(addr(2), 6000);
        let snap = Snapshot::from_trusted_checkpoint(config, 0, Hash([0x55; 32]), &scores);
        assert!(snap.light);

        let mut headers = chain(&snap, &[addr(1), addr(2)]);
        let mut next_scores = scores.clone();
        next_scores.insert(addr(2), 7000);
        let payload: BTreeMap<Address, BehaviorScore> = next_scores
            .iter()
            .map(|(address, total)| {
                let score = BehaviorScore {
                    total: *total,
                    ..Default::default()
                };
                (*address, score)
            })
            .collect();
        headers[1].extra = encode_checkpoint(&payload).unwrap();
        let after = snap.apply(&headers).unwrap();
        assert_eq!(after.checkpoint_scores(), next_scores);
        assert!(after.light);

        // A light snapshot cannot re-score without the payload
        let bare = chain(&snap, &[addr(1), addr(2)]);
        assert!(matches!(
            snap.apply(&bare),
            Err(ConsensusError::InvalidCheckpointValidators(_))
        ));

        // Nor accept a payload for another validator set
        let mut foreign = chain(&snap, &[addr(1), addr(2)]);
        foreign[1].extra = crate::checkpoint::genesis_checkpoint(&[addr(1), addr(9)]).unwrap();
        assert!(matches!(
            snap.apply(&foreign),
            Err(ConsensusError::MismatchingCheckpointValidators)
        ));
    }

    #[test]
    fn test_select_producer_is_deterministic() {
        let snap = genesis(&[addr(1), addr(2), addr(3), addr(4), addr(5)]);
        let parent = Hash([0x33; 32]);
        for height in 1..50 {
            let a = snap.select_producer(height, &parent).unwrap();
            assert_eq!(Some(a), snap.select_producer(height, &parent));
            assert!(snap.is_validator(&a));
            assert!(snap.inturn(height, &parent, &a));
        }
    }

    #[test]
    fn test_select_skips_zero_scores() {
        let mut snap = genesis(&[addr(1), addr(2), addr(3)]);
        snap.validators.get_mut(&addr(1)).unwrap().total = 0;
        snap.validators.get_mut(&addr(3)).unwrap().total = 0;
        for height in 0..30 {
            assert_eq!(snap.select_producer(height, &Hash([height as u8; 32])), Some(addr(2)));
        }
    }

    #[test]
    fn test_select_round_robin_when_all_zero() {
        let mut snap = genesis(&[addr(1), addr(2), addr(3)]);
        for score in snap.validators.values_mut() {
            score.total = 0;
        }
        assert_eq!(snap.select_producer(0, &Hash::ZERO), Some(addr(1)));
        assert_eq!(snap.select_producer(4, &Hash::ZERO), Some(addr(2)));
        assert_eq!(snap.select_producer(8, &Hash::ZERO), Some(addr(3)));
    }

    #[test]
    fn test_select_empty_set() {
        let snap = genesis(&[]);
        assert_eq!(snap.select_producer(1, &Hash::ZERO), None);
    }

    #[test]
    fn test_signed_recently() {
        let snap = genesis(&[addr(1), addr(2), addr(3)]);
        let next = snap.apply(&chain(&snap, &[addr(1), addr(2)])).unwrap();
        // window of 2: a producer may sign every other block
        assert!(!next.signed_recently(&addr(1), 3));
        assert!(next.signed_recently(&addr(2), 3));
        assert!(!next.signed_recently(&addr(3), 3));
        assert!(!next.signed_recently(&addr(2), 4));
    }

    #[test]
    fn test_store_and_load() {
        let db = MemoryDb::new();
        let config = PobConfig::default();
        let snap = genesis(&[addr(1), addr(2)]);
        let next = snap.apply(&chain(&snap, &[addr(2), addr(1)])).unwrap();
        next.store(&db).unwrap();

        let loaded = Snapshot::load(&config, &db, &next.hash).unwrap().unwrap();
        assert_eq!(loaded, next);
        assert!(Snapshot::load(&config, &db, &Hash([0x99; 32])).unwrap().is_none());
    }

    #[test]
    fn test_from_checkpoint_keeps_totals() {
        let mut scores = BTreeMap::new();
        scores.insert(addr(1), 7000);
        scores.insert(addr(2), 1200);
        let snap = Snapshot::from_checkpoint(PobConfig::default(), 30_000, Hash([1; 32]), &scores);
        assert_eq!(snap.checkpoint_scores(), scores);
        assert_eq!(snap.histories.len(), 2);
        assert!(!snap.light);
    }
}
