//! Ordered concurrent verification of header batches

mod common;

use common::TestNet;
use pob_consensus::ConsensusError;
use pob_state::ChainReader;
use std::sync::Arc;

#[test]
fn test_batch_all_valid_in_order() {
    let net = TestNet::new(3);
    let headers = net.build(24);
    let chain: Arc<dyn ChainReader> = net.chain.clone();

    let handle = net.engine.verify_headers(chain, headers, vec![false; 24]);
    let results = handle.wait();
    assert_eq!(results.len(), 24);
    assert!(results.iter().all(|r| r.is_ok()));
}

#[test]
fn test_batch_reports_single_failure_at_its_index() {
    let net = TestNet::new(3);
    let bad_index = 7;

    // Later headers build on the bad one; replay ignores difficulty
    let mut headers = Vec::new();
    for i in 0..16 {
        let header = if i == bad_index {
            net.next_with(&headers, |h| h.difficulty = 7)
        } else {
            net.next(&headers)
        };
        headers.push(header);
    }

    let chain: Arc<dyn ChainReader> = net.chain.clone();
    let results = net
        .engine
        .verify_headers(chain, headers, Vec::new())
        .wait();
    assert_eq!(results.len(), 16);
    for (i, result) in results.iter().enumerate() {
        if i == bad_index {
            assert!(matches!(
                result,
                Err(ConsensusError::WrongDifficulty { actual: 7, .. })
            ));
        } else {
            assert!(result.is_ok(), "header {} failed: {:?}", i, result);
        }
    }
}

#[test]
fn test_batch_results_stream_through_receiver() {
    let net = TestNet::new(2);
    let headers = net.build(8);
    let chain: Arc<dyn ChainReader> = net.chain.clone();

    let handle = net.engine.verify_headers(chain, headers, vec![true; 8]);
    let mut received = 0;
    while let Ok(result) = handle.results().recv() {
        assert!(result.is_ok());
        received += 1;
    }
    assert_eq!(received, 8);
}

#[test]
fn test_batch_abort_stops_early() {
    let net = TestNet::new(3);
    let headers = net.build(64);
    let chain: Arc<dyn ChainReader> = net.chain.clone();

    let handle = net.engine.verify_headers(chain, headers, Vec::new());
    handle.abort();
    let results = handle.wait();
    assert!(results.len() <= 64);
    // Whatever was released before the abort is still in order and valid
    assert!(results.iter().all(|r| r.is_ok()));
}

#[test]
fn test_empty_batch() {
    let net = TestNet::new(1);
    let chain: Arc<dyn ChainReader> = net.chain.clone();
    let results = net.engine.verify_headers(chain, Vec::new(), Vec::new()).wait();
    assert!(results.is_empty());
}
