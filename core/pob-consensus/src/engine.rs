//! Proof-of-Behavior consensus engine
//!
//! `ProofOfBehavior` ties together snapshot retrieval, header verification
//! (see `verify` and `batch`), local sealing and reward distribution. All
//! shared state is either behind the injected caches or the signer lock;
//! snapshots themselves are immutable once cached.

use crate::cache::{Cache, LruCache};
use crate::checkpoint::decode_checkpoint;
use crate::config::PobConfig;
use crate::crypto::{recover_signer, SignerFn, SIGNATURE_LENGTH};
use crate::errors::{ConsensusError, ConsensusResult};
use crate::metrics;
use crate::pow::SealVerifier;
use crate::snapshot::Snapshot;
use crate::types::{
    CHECKPOINT_INTERVAL, DIFF_IN_TURN, DIFF_NO_TURN, FULL_IMMUTABILITY_THRESHOLD, NONCE_AUTH,
    NONCE_DROP, POW_ANSWER_REWARD, POW_UNCLE_REWARD, PRODUCER_REWARD, SEAL_MIME_TYPE,
};
use parking_lot::RwLock;
use pob_state::{Address, ChainReader, Hash, Header, KeyValueStore, StateDatabase};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

/// Local sealing identity
#[derive(Default)]
pub(crate) struct SignerState {
    pub(crate) address: Address,
    pub(crate) sign_fn: Option<SignerFn>,
}

/// Proof-of-Behavior consensus engine
pub struct ProofOfBehavior {
    pub(crate) config: PobConfig,
    pub(crate) db: Arc<dyn KeyValueStore>,
    pub(crate) snapshots: Arc<dyn Cache<Hash, Arc<Snapshot>>>,
    pub(crate) signatures: Arc<dyn Cache<Hash, Address>>,
    pub(crate) pow: Arc<dyn SealVerifier>,
    /// Pending membership proposals of this node: target → authorize
    pub(crate) proposals: RwLock<BTreeMap<Address, bool>>,
    pub(crate) signer: RwLock<SignerState>,
}

impl ProofOfBehavior {
    /// Engine with LRU caches sized from `config`
    pub fn new(
        config: PobConfig,
        db: Arc<dyn KeyValueStore>,
        pow: Arc<dyn SealVerifier>,
    ) -> ConsensusResult<Self> {
        let snapshots: Arc<dyn Cache<Hash, Arc<Snapshot>>> =
            Arc::new(LruCache::new(config.snapshot_cache_size));
        let signatures: Arc<dyn Cache<Hash, Address>> =
            Arc::new(LruCache::new(config.signature_cache_size));
        Self::with_caches(config, db, pow, snapshots, signatures)
    }

    /// Engine with caller-provided caches
    pub fn with_caches(
        config: PobConfig,
        db: Arc<dyn KeyValueStore>,
        pow: Arc<dyn SealVerifier>,
        snapshots: Arc<dyn Cache<Hash, Arc<Snapshot>>>,
        signatures: Arc<dyn Cache<Hash, Address>>,
    ) -> ConsensusResult<Self> {
        config.validate()?;
        info!(
            "Initializing Proof-of-Behavior engine: period={}s epoch={}",
            config.period, config.epoch
        );
        Ok(Self {
            config,
            db,
            snapshots,
            signatures,
            pow,
            proposals: RwLock::new(BTreeMap::new()),
            signer: RwLock::new(SignerState::default()),
        })
    }

    pub fn config(&self) -> &PobConfig {
        &self.config
    }

    /// Producer that sealed `header`
    pub fn author(&self, header: &Header) -> ConsensusResult<Address> {
        recover_signer(header, self.signatures.as_ref())
    }

    /// Hash the producer signs
    pub fn seal_hash(&self, header: &Header) -> Hash {
        header.seal_hash()
    }

    /// Install the local sealing identity
    pub fn authorize(&self, signer: Address, sign_fn: SignerFn) {
        let mut state = self.signer.write();
        state.address = signer;
        state.sign_fn = Some(sign_fn);
        info!("Local signer set to {}", signer);
    }

    /// Current local signer (zero when unset)
    pub fn signer(&self) -> Address {
        self.signer.read().address
    }

    /// Uncles are not part of this protocol
    pub fn verify_uncles(&self, uncles: &[Header]) -> ConsensusResult<()> {
        if uncles.is_empty() {
            Ok(())
        } else {
            Err(ConsensusError::InvalidUncles)
        }
    }

    /// Queue a membership proposal to be cast in future blocks
    pub fn propose(&self, address: Address, authorize: bool) {
        self.proposals.write().insert(address, authorize);
    }

    pub fn discard(&self, address: &Address) {
        self.proposals.write().remove(address);
    }

    pub fn proposals(&self) -> BTreeMap<Address, bool> {
        self.proposals.read().clone()
    }

    /// Nothing runs in the background
    pub fn close(&self) -> ConsensusResult<()> {
        Ok(())
    }

    /// Snapshot after block `number` with hash `hash`.
    ///
    /// `parents` are in-flight headers ending at `number`, used before the
    /// chain store. Walks back to a cached, persisted, genesis or trusted
    /// checkpoint snapshot and replays the collected headers on top of it.
    pub fn snapshot(
        &self,
        chain: &dyn ChainReader,
        number: u64,
        hash: Hash,
        parents: &[Header],
    ) -> ConsensusResult<Arc<Snapshot>> {
        let mut number = number;
        let mut hash = hash;
        let mut parents = parents;
        let mut headers: Vec<Header> = Vec::new();

        let base = loop {
            if let Some(snap) = self.snapshots.get(&hash) {
                metrics::record_snapshot_lookup("cache");
                break snap;
            }

            if number % CHECKPOINT_INTERVAL == 0 {
                if let Some(snap) = Snapshot::load(&self.config, self.db.as_ref(), &hash)? {
                    debug!("Loaded snapshot from disk at block {} ({})", number, hash);
                    metrics::record_snapshot_lookup("disk");
                    break Arc::new(snap);
                }
            }

            let trusted = number == 0
                || (number % self.config.epoch == 0
                    && (headers.len() > FULL_IMMUTABILITY_THRESHOLD
                        || chain.get_header_by_number(number - 1).is_none()));
            if trusted {
                if let Some(checkpoint) = chain.get_header_by_number(number) {
                    let checkpoint_hash = checkpoint.hash();
                    if checkpoint_hash == hash {
                        let scores = decode_checkpoint(&checkpoint.extra)?;
                        let snap = if number == 0 {
                            Snapshot::from_checkpoint(
                                self.config.clone(),
                                number,
                                checkpoint_hash,
                                &scores,
                            )
                        } else {
                            Snapshot::from_trusted_checkpoint(
                                self.config.clone(),
                                number,
                                checkpoint_hash,
                                &scores,
                            )
                        };
                        snap.store(self.db.as_ref())?;
                        info!("Stored checkpoint snapshot at block {} ({})", number, hash);
                        metrics::record_snapshot_lookup("checkpoint");
                        break Arc::new(snap);
                    }
                }
            }

            let header = match parents.split_last() {
                Some((last, rest)) => {
                    if last.hash() != hash || last.number != number {
                        return Err(ConsensusError::UnknownAncestor);
                    }
                    parents = rest;
                    last.clone()
                }
                None => chain
                    .get_header(&hash, number)
                    .ok_or(ConsensusError::UnknownAncestor)?,
            };
            number = number.checked_sub(1).ok_or(ConsensusError::UnknownAncestor)?;
            hash = header.parent_hash;
            headers.push(header);
        };

        if headers.is_empty() {
            return Ok(base);
        }

        headers.reverse();
        let snap = Arc::new(base.apply(&headers)?);
        metrics::record_snapshot_lookup("replay");

        let added = snap.validators.keys().filter(|a| !base.is_validator(a)).count();
        let removed = base.validators.keys().filter(|a| !snap.is_validator(a)).count();
        metrics::record_membership_changes(added, removed);

        self.snapshots.insert(snap.hash, snap.clone());
        if snap.number % CHECKPOINT_INTERVAL == 0 {
            snap.store(self.db.as_ref())?;
            info!("Stored snapshot to disk at block {} ({})", snap.number, snap.hash);
        }
        Ok(snap)
    }

    /// Difficulty the local signer would get on top of `parent`
    pub fn calc_difficulty(
        &self,
        chain: &dyn ChainReader,
        _time: u64,
        parent: &Header,
    ) -> ConsensusResult<u64> {
        let snap = self.snapshot(chain, parent.number, parent.hash(), &[])?;
        let signer = self.signer();
        Ok(expected_difficulty(
            chain,
            &snap,
            parent.number + 1,
            &parent.hash(),
            &signer,
        ))
    }

    /// Fill the consensus fields of a header about to be sealed locally
    pub fn prepare(&self, chain: &dyn ChainReader, header: &mut Header) -> ConsensusResult<()> {
        let number = header.number;
        if number == 0 {
            return Err(ConsensusError::UnknownBlock);
        }
        let parent = chain
            .get_header(&header.parent_hash, number - 1)
            .ok_or(ConsensusError::UnknownAncestor)?;
        let snap = self.snapshot(chain, number - 1, header.parent_hash, &[])?;
        let signer = self.signer();

        header.coinbase = Address::ZERO;
        header.nonce = NONCE_DROP;
        header.producer = signer;

        header.extra.clear();
        if number % self.config.epoch == 0 {
            // The payload carries the scores as they stand after this block
            header.extra = snap.apply(std::slice::from_ref(header))?.checkpoint_payload()?;
        } else {
            // Lowest address first keeps proposal order deterministic
            let proposals = self.proposals.read();
            if let Some((address, authorize)) = proposals
                .iter()
                .find(|(address, authorize)| snap.valid_vote(address, **authorize))
            {
                header.coinbase = *address;
                header.nonce = if *authorize { NONCE_AUTH } else { NONCE_DROP };
            }
        }

        header.difficulty = expected_difficulty(chain, &snap, number, &header.parent_hash, &signer);
        header.ack_digest = crate::crypto::ack_digest(&header.ack_counts);
        header.mix_digest = Hash::ZERO;
        header.timestamp = (parent.timestamp + self.config.period).max(unix_now());
        Ok(())
    }

    /// Credit block rewards and commit the resulting state root
    pub fn finalize(
        &self,
        _chain: &dyn ChainReader,
        header: &mut Header,
        state: &mut dyn StateDatabase,
    ) -> ConsensusResult<()> {
        state.add_balance(&header.producer, PRODUCER_REWARD);
        for answer in &header.pow_answers {
            let reward = if answer.uncle {
                POW_UNCLE_REWARD
            } else {
                POW_ANSWER_REWARD
            };
            state.add_balance(&answer.miner, reward);
        }
        header.state_root = state.intermediate_root();
        debug!(
            "Finalized block {}: producer {} and {} pow answers rewarded",
            header.number,
            header.producer,
            header.pow_answers.len()
        );
        Ok(())
    }

    /// Sign `header` with the local signer
    pub fn seal(&self, chain: &dyn ChainReader, header: &mut Header) -> ConsensusResult<()> {
        let number = header.number;
        if number == 0 {
            return Err(ConsensusError::UnknownBlock);
        }

        let (signer, sign_fn) = {
            let state = self.signer.read();
            let sign_fn = state.sign_fn.clone().ok_or(ConsensusError::SignerUnavailable)?;
            (state.address, sign_fn)
        };

        let snap = self.snapshot(chain, number - 1, header.parent_hash, &[])?;
        if !snap.is_validator(&signer) {
            return Err(ConsensusError::UnauthorizedSigner(signer));
        }
        let inturn = snap.inturn(number, &header.parent_hash, &signer);
        if !inturn && snap.signed_recently(&signer, number) {
            return Err(ConsensusError::RecentlySigned(signer));
        }

        header.producer = signer;
        let signature = sign_fn(signer, SEAL_MIME_TYPE, &header.pre_seal_bytes())
            .map_err(ConsensusError::Signing)?;
        if signature.len() != SIGNATURE_LENGTH {
            return Err(ConsensusError::Signing(format!(
                "signer returned {} bytes, expected {}",
                signature.len(),
                SIGNATURE_LENGTH
            )));
        }
        header.signature = signature;

        metrics::record_sealed(inturn);
        debug!("Sealed block {} as {} (in turn: {})", number, signer, inturn);
        Ok(())
    }
}

/// Difficulty `producer` must declare at `number`.
///
/// After the behavior-difficulty fork this is always the out-of-turn value
/// and selection alone governs leadership.
pub(crate) fn expected_difficulty(
    chain: &dyn ChainReader,
    snap: &Snapshot,
    number: u64,
    parent_hash: &Hash,
    producer: &Address,
) -> u64 {
    if chain.config().is_behavior_difficulty(number) {
        return DIFF_NO_TURN;
    }
    if snap.inturn(number, parent_hash, producer) {
        DIFF_IN_TURN
    } else {
        DIFF_NO_TURN
    }
}

pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
