//! Shared fixtures: a validator set with real keys and a signed header chain

#![allow(dead_code)]

use pob_consensus::types::DIFF_IN_TURN;
use pob_consensus::{
    genesis_checkpoint, sign_digest, secret_to_address, KeccakPowVerifier, PobConfig,
    ProofOfBehavior,
};
use pob_state::{Address, ChainConfig, Header, MemoryChain, MemoryDb};
use secp256k1::SecretKey;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Far enough in the past that `parent + 3s` steps never hit the future check
pub const GENESIS_TIMESTAMP: u64 = 1_000_000;

pub const GAS_LIMIT: u64 = 8_000_000;

pub struct TestNet {
    pub engine: Arc<ProofOfBehavior>,
    pub chain: Arc<MemoryChain>,
    pub db: Arc<MemoryDb>,
    pub keys: BTreeMap<Address, SecretKey>,
    pub genesis: Header,
}

/// Route engine logs through the test harness; set RUST_LOG to see them
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn secret(seed: u8) -> SecretKey {
    SecretKey::from_slice(&[seed; 32]).expect("valid secret key")
}

impl TestNet {
    pub fn new(validators: u8) -> Self {
        Self::with_config(validators, PobConfig::default(), ChainConfig::default())
    }

    pub fn with_config(validators: u8, config: PobConfig, chain_config: ChainConfig) -> Self {
        init_tracing();
        let keys: BTreeMap<Address, SecretKey> = (1..=validators)
            .map(|seed| {
                let key = secret(seed);
                (secret_to_address(&key), key)
            })
            .collect();
        let addresses: Vec<Address> = keys.keys().copied().collect();

        let genesis = Header {
            gas_limit: GAS_LIMIT,
            timestamp: GENESIS_TIMESTAMP,
            extra: genesis_checkpoint(&addresses).expect("genesis payload"),
            ..Default::default()
        };
        let chain = Arc::new(MemoryChain::new(chain_config));
        chain.insert(genesis.clone());

        let db = Arc::new(MemoryDb::new());
        let engine = ProofOfBehavior::new(
            config,
            db.clone(),
            Arc::new(KeccakPowVerifier::new(4)),
        )
        .expect("engine");

        Self {
            engine: Arc::new(engine),
            chain,
            db,
            keys,
            genesis,
        }
    }

    pub fn addresses(&self) -> Vec<Address> {
        self.keys.keys().copied().collect()
    }

    /// Re-sign a header with its producer's key
    pub fn sign(&self, header: &mut Header) {
        let key = self.keys.get(&header.producer).expect("known producer");
        header.signature = sign_digest(key, &header.seal_hash()).expect("signature");
    }

    /// Unsigned header on top of the last in-flight header (or genesis),
    /// produced by whoever is in turn
    pub fn draft(&self, pending: &[Header]) -> Header {
        let parent = pending.last().unwrap_or(&self.genesis);
        let number = parent.number + 1;
        let snap = self
            .engine
            .snapshot(self.chain.as_ref(), parent.number, parent.hash(), pending)
            .expect("parent snapshot");
        let producer = snap
            .select_producer(number, &parent.hash())
            .expect("non-empty validator set");
        let mut header = Header {
            parent_hash: parent.hash(),
            number,
            gas_limit: parent.gas_limit,
            timestamp: parent.timestamp + 3,
            difficulty: DIFF_IN_TURN,
            producer,
            ..Default::default()
        };
        if number % self.engine.config().epoch == 0 {
            header.extra = snap
                .apply(std::slice::from_ref(&header))
                .and_then(|after| after.checkpoint_payload())
                .expect("checkpoint payload");
        }
        header
    }

    /// Signed in-turn header on top of `pending`
    pub fn next(&self, pending: &[Header]) -> Header {
        self.next_with(pending, |_| {})
    }

    /// Like [`TestNet::next`] with a hook to adjust the header before signing
    pub fn next_with(&self, pending: &[Header], edit: impl FnOnce(&mut Header)) -> Header {
        let mut header = self.draft(pending);
        edit(&mut header);
        self.sign(&mut header);
        header
    }

    /// `count` signed in-turn headers on top of genesis, not inserted
    pub fn build(&self, count: usize) -> Vec<Header> {
        let mut headers = Vec::with_capacity(count);
        for _ in 0..count {
            let header = self.next(&headers);
            headers.push(header);
        }
        headers
    }

    /// Insert headers as canonical
    pub fn import(&self, headers: &[Header]) {
        for header in headers {
            self.chain.insert(header.clone());
        }
    }
}
