//! Header verification state machine
//!
//! A header advances through [`VerificationStage`]s in a fixed order and is
//! rejected at the first failing predicate:
//!
//! 1. signature recovered and matching the declared producer, payload sane
//! 2. timestamp, authorization and recents window against the parent
//! 3. difficulty and checkpoint contents against the parent snapshot
//! 4. gas, base fee and block number against the real parent
//! 5. proof-of-work answers (when seal checking is requested)

use crate::checkpoint::{decode_checkpoint, MAX_CHECKPOINT_LEN};
use crate::crypto::{ack_digest, recover_signer};
use crate::engine::{expected_difficulty, unix_now, ProofOfBehavior};
use crate::errors::{ConsensusError, ConsensusResult};
use crate::fees::verify_gas;
use crate::metrics;
use crate::types::{VerificationStage, NONCE_AUTH, NONCE_DROP};
use pob_state::{Address, ChainReader, Header};
use std::collections::BTreeMap;
use tracing::debug;

/// Per-call verification switches
#[derive(Debug, Clone, Copy, Default)]
pub struct VerifyOptions {
    /// Delegate proof-of-work answers to the seal verifier
    pub seal: bool,
    /// Side-block verification; skips the future-timestamp check
    pub uncle: bool,
}

impl VerifyOptions {
    pub fn with_seal(seal: bool) -> Self {
        Self { seal, uncle: false }
    }
}

/// Tracks how far a header got through verification
#[derive(Debug, Default)]
pub struct Verification {
    stage: VerificationStage,
}

impl Verification {
    pub fn stage(&self) -> VerificationStage {
        self.stage
    }

    fn advance(&mut self, next: VerificationStage) {
        debug_assert!(next > self.stage);
        self.stage = next;
    }
}

/// Walk back from `header` to its closest non-visual ancestor.
///
/// `parents` is an in-flight batch ending right before `header` and is
/// consulted before the chain store. Returns the ancestor and the number of
/// visual headers skipped on the way.
pub fn find_real_parent_header(
    chain: &dyn ChainReader,
    header: &Header,
    parents: &[Header],
) -> ConsensusResult<(Header, u64)> {
    let mut hash = header.parent_hash;
    let mut batch = parents;
    let mut skipped = 0u64;

    loop {
        let candidate = match batch.split_last() {
            Some((last, rest)) if last.hash() == hash => {
                batch = rest;
                last.clone()
            }
            _ => chain
                .get_header_by_hash(&hash)
                .ok_or(ConsensusError::UnknownAncestor)?,
        };
        if !candidate.visual {
            return Ok((candidate, skipped));
        }
        if candidate.number == 0 {
            return Err(ConsensusError::UnknownAncestor);
        }
        skipped += 1;
        hash = candidate.parent_hash;
    }
}

impl ProofOfBehavior {
    /// Verify a header against the chain store
    pub fn verify_header(
        &self,
        chain: &dyn ChainReader,
        header: &Header,
        seal: bool,
    ) -> ConsensusResult<()> {
        self.verify_header_with_parents(chain, header, &[], VerifyOptions::with_seal(seal))
    }

    /// Verify a header whose ancestors may still be in flight in `parents`
    pub fn verify_header_with_parents(
        &self,
        chain: &dyn ChainReader,
        header: &Header,
        parents: &[Header],
        options: VerifyOptions,
    ) -> ConsensusResult<()> {
        let mut verification = Verification::default();
        let result = self.run_verification(chain, header, parents, options, &mut verification);
        if let Err(e) = &result {
            debug!(
                "Rejected header {} at stage {:?}: {}",
                header.number,
                verification.stage(),
                e
            );
        }
        metrics::record_verification(&result);
        result
    }

    fn run_verification(
        &self,
        chain: &dyn ChainReader,
        header: &Header,
        parents: &[Header],
        options: VerifyOptions,
        verification: &mut Verification,
    ) -> ConsensusResult<()> {
        let number = header.number;
        // Genesis is the trusted root
        if number == 0 {
            verification.advance(VerificationStage::Accepted);
            return Ok(());
        }

        // Signature and payload
        let recovered = recover_signer(header, self.signatures.as_ref())?;
        if recovered != header.producer {
            return Err(ConsensusError::SignerMismatch {
                declared: header.producer,
                recovered,
            });
        }
        let checkpoint_scores = self.verify_payload(header)?;
        verification.advance(VerificationStage::SignatureChecked);

        // Timing and authorization
        if !options.uncle {
            let now = unix_now();
            if header.timestamp > now + self.config.allowed_future_secs {
                return Err(ConsensusError::FutureBlock {
                    timestamp: header.timestamp,
                    now,
                });
            }
        }
        let (parent, skipped) = find_real_parent_header(chain, header, parents)?;
        if header.timestamp <= parent.timestamp {
            return Err(ConsensusError::InvalidTimestamp {
                timestamp: header.timestamp,
                parent: parent.timestamp,
            });
        }

        let snap = self.snapshot(chain, number - 1, header.parent_hash, parents)?;
        if !snap.is_validator(&header.producer) {
            return Err(ConsensusError::UnauthorizedSigner(header.producer));
        }
        let inturn = snap.inturn(number, &header.parent_hash, &header.producer);
        if !header.visual && !inturn && snap.signed_recently(&header.producer, number) {
            return Err(ConsensusError::RecentlySigned(header.producer));
        }
        verification.advance(VerificationStage::TimingChecked);

        // Difficulty and checkpoint contents
        if !self.config.fake_difficulty && !header.visual {
            let expected =
                expected_difficulty(chain, &snap, number, &header.parent_hash, &header.producer);
            if header.difficulty != expected {
                return Err(ConsensusError::WrongDifficulty {
                    expected,
                    actual: header.difficulty,
                });
            }
        }
        if let Some(scores) = checkpoint_scores {
            let after = snap.apply(std::slice::from_ref(header))?;
            if scores != after.checkpoint_scores() {
                return Err(ConsensusError::MismatchingCheckpointValidators);
            }
        }
        verification.advance(VerificationStage::DifficultyChecked);

        // Gas, fees and height
        verify_gas(chain.config(), &parent, header)?;
        let expected_number = parent.number + skipped + 1;
        if number != expected_number {
            return Err(ConsensusError::InvalidNumber {
                expected: expected_number,
                actual: number,
            });
        }
        verification.advance(VerificationStage::GasChecked);

        if options.seal {
            for answer in &header.pow_answers {
                self.pow.verify_seal(chain, &parent, answer.uncle, answer)?;
            }
            verification.advance(VerificationStage::SealChecked);
        }

        verification.advance(VerificationStage::Accepted);
        Ok(())
    }

    /// Extra-data, vote and ack checks that need no chain access.
    ///
    /// Returns the decoded checkpoint scores on checkpoint blocks.
    fn verify_payload(
        &self,
        header: &Header,
    ) -> ConsensusResult<Option<BTreeMap<Address, u64>>> {
        if header.extra.len() > MAX_CHECKPOINT_LEN {
            return Err(ConsensusError::ExtraDataTooLong(header.extra.len()));
        }

        let checkpoint = header.number % self.config.epoch == 0;
        let scores = if checkpoint {
            Some(decode_checkpoint(&header.extra)?)
        } else if !header.extra.is_empty() {
            return Err(ConsensusError::ExtraCheckpointData);
        } else {
            None
        };

        if !header.coinbase.is_zero() && header.nonce != NONCE_AUTH && header.nonce != NONCE_DROP {
            return Err(ConsensusError::InvalidVote(header.nonce));
        }
        if header.ack_digest != ack_digest(&header.ack_counts) {
            return Err(ConsensusError::InvalidAckDigest);
        }
        Ok(scores)
    }
}
