//! Ordered parallel header verification
//!
//! Workers pull header indices from a shared channel and verify them
//! independently; a sequencer buffers completions by index and releases
//! results strictly in input order.

use crate::engine::ProofOfBehavior;
use crate::errors::ConsensusResult;
use crate::verify::VerifyOptions;
use crossbeam::channel::{self, Receiver, Sender};
use pob_state::{ChainReader, Header};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::debug;

/// Handle to a running batch verification
pub struct BatchHandle {
    abort: Sender<()>,
    results: Receiver<ConsensusResult<()>>,
    sequencer: Option<JoinHandle<()>>,
}

impl BatchHandle {
    /// Stop handing out work; headers already being verified finish quietly
    pub fn abort(&self) {
        let _ = self.abort.try_send(());
    }

    /// Results in input order, one per header
    pub fn results(&self) -> &Receiver<ConsensusResult<()>> {
        &self.results
    }

    /// Drain every remaining result and wait for the sequencer
    pub fn wait(mut self) -> Vec<ConsensusResult<()>> {
        let collected: Vec<_> = self.results.iter().collect();
        if let Some(sequencer) = self.sequencer.take() {
            let _ = sequencer.join();
        }
        collected
    }
}

/// Worker count: available parallelism capped at the batch length
fn worker_count(batch_len: usize) -> usize {
    let cores = thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    cores.min(batch_len).max(1)
}

impl ProofOfBehavior {
    /// Verify a contiguous batch of headers concurrently.
    ///
    /// Header `i` is verified with `headers[..i]` as its in-flight parents.
    /// `seals[i]` enables proof-of-work checks for header `i`; a missing
    /// entry means no seal check.
    pub fn verify_headers(
        self: &Arc<Self>,
        chain: Arc<dyn ChainReader>,
        headers: Vec<Header>,
        seals: Vec<bool>,
    ) -> BatchHandle {
        let total = headers.len();
        let headers: Arc<[Header]> = headers.into();
        let seals: Arc<[bool]> = seals.into();

        let (abort_tx, abort_rx) = channel::bounded::<()>(1);
        let (results_tx, results_rx) = channel::bounded::<ConsensusResult<()>>(total.max(1));
        let (work_tx, work_rx) = channel::unbounded::<usize>();
        let (done_tx, done_rx) = channel::unbounded::<(usize, ConsensusResult<()>)>();
        let aborted = Arc::new(AtomicBool::new(false));

        for index in 0..total {
            let _ = work_tx.send(index);
        }
        drop(work_tx);

        let workers = worker_count(total);
        debug!("Verifying {} headers on {} workers", total, workers);
        for _ in 0..workers {
            let engine = Arc::clone(self);
            let chain = Arc::clone(&chain);
            let headers = Arc::clone(&headers);
            let seals = Arc::clone(&seals);
            let work_rx = work_rx.clone();
            let done_tx = done_tx.clone();
            let aborted = Arc::clone(&aborted);
            thread::spawn(move || {
                for index in work_rx.iter() {
                    if aborted.load(Ordering::Acquire) {
                        break;
                    }
                    let seal = seals.get(index).copied().unwrap_or(false);
                    let options = VerifyOptions::with_seal(seal);
                    let result = engine.verify_header_with_parents(
                        chain.as_ref(),
                        &headers[index],
                        &headers[..index],
                        options,
                    );
                    if done_tx.send((index, result)).is_err() {
                        break;
                    }
                }
            });
        }
        drop(done_tx);

        let sequencer = thread::spawn(move || {
            sequence(total, abort_rx, done_rx, results_tx, aborted);
        });

        BatchHandle {
            abort: abort_tx,
            results: results_rx,
            sequencer: Some(sequencer),
        }
    }
}

fn sequence(
    total: usize,
    abort_rx: Receiver<()>,
    done_rx: Receiver<(usize, ConsensusResult<()>)>,
    results_tx: Sender<ConsensusResult<()>>,
    aborted: Arc<AtomicBool>,
) {
    let mut pending: Vec<Option<ConsensusResult<()>>> = (0..total).map(|_| None).collect();
    let mut next = 0;
    let mut abort_open = true;

    while next < total {
        let completion = if abort_open {
            channel::select! {
                recv(abort_rx) -> signal => {
                    if signal.is_ok() {
                        debug!("Header batch aborted after {} of {} results", next, total);
                        aborted.store(true, Ordering::Release);
                        return;
                    }
                    // Handle dropped without aborting
                    abort_open = false;
                    None
                }
                recv(done_rx) -> completion => Some(completion),
            }
        } else {
            Some(done_rx.recv())
        };

        let Some(completion) = completion else {
            continue;
        };
        let Ok((index, result)) = completion else {
            return;
        };
        pending[index] = Some(result);
        while next < total {
            let Some(result) = pending[next].take() else {
                break;
            };
            if results_tx.send(result).is_err() {
                aborted.store(true, Ordering::Release);
                return;
            }
            next += 1;
        }
    }
}
