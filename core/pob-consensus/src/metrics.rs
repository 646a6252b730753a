//! Metrics collection for consensus

use crate::errors::ConsensusResult;
use lazy_static::lazy_static;
use prometheus::{register_counter_vec, CounterVec};

lazy_static! {
    /// Headers run through verification, by outcome
    pub static ref VERIFIED_HEADERS: CounterVec = register_counter_vec!(
        "pob_verified_headers_total",
        "Total number of headers verified",
        &["result"]
    ).expect("register pob_verified_headers_total");

    /// Snapshot lookups by where they were served from
    pub static ref SNAPSHOT_LOOKUPS: CounterVec = register_counter_vec!(
        "pob_snapshot_lookups_total",
        "Snapshot lookups by source",
        &["source"]
    ).expect("register pob_snapshot_lookups_total");

    /// Validator set changes applied through votes
    pub static ref MEMBERSHIP_CHANGES: CounterVec = register_counter_vec!(
        "pob_membership_changes_total",
        "Validator set changes applied through votes",
        &["kind"]
    ).expect("register pob_membership_changes_total");

    /// Blocks sealed by the local signer
    pub static ref SEALED_BLOCKS: CounterVec = register_counter_vec!(
        "pob_sealed_blocks_total",
        "Blocks sealed by this node",
        &["turn"]
    ).expect("register pob_sealed_blocks_total");
}

/// Record the outcome of a single header verification
pub fn record_verification(result: &ConsensusResult<()>) {
    let label = match result {
        Ok(()) => "accepted",
        Err(e) => e.kind(),
    };
    VERIFIED_HEADERS.with_label_values(&[label]).inc();
}

/// `source` is one of `cache`, `disk`, `checkpoint` or `replay`
pub fn record_snapshot_lookup(source: &str) {
    SNAPSHOT_LOOKUPS.with_label_values(&[source]).inc();
}

pub fn record_membership_changes(added: usize, removed: usize) {
    if added > 0 {
        MEMBERSHIP_CHANGES
            .with_label_values(&["authorize"])
            .inc_by(added as f64);
    }
    if removed > 0 {
        MEMBERSHIP_CHANGES
            .with_label_values(&["deauthorize"])
            .inc_by(removed as f64);
    }
}

pub fn record_sealed(inturn: bool) {
    let turn = if inturn { "in_turn" } else { "out_of_turn" };
    SEALED_BLOCKS.with_label_values(&[turn]).inc();
}
