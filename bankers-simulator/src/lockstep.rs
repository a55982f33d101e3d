//! Deterministic single-threaded interleaving.
//!
//! A seeded scheduler picks which active consumer moves next. Each step is
//! one request attempt and, when granted, the paired release. Every
//! transaction is folded into a BLAKE3 transcript, so two runs with the same
//! seed and ledger produce the same hash.

use blake3::Hasher;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, trace};

use bankers_core::{Decision, DenialReason, Ledger};

use crate::consumer::{Consumer, ConsumerReport, ConsumerState};
use crate::error::SimulationError;
use crate::worker::WorkerOptions;

/// Scheduler stream is kept apart from the consumer streams derived from the same seed.
const SCHEDULER_SALT: u64 = 0x5CED_01E5_0000_0001;

pub struct LockstepOutcome {
    pub ledger: Ledger,
    pub reports: Vec<ConsumerReport>,
    pub steps: u64,
    pub transcript: String,
}

pub fn run(
    mut ledger: Ledger,
    seed: u64,
    max_steps: u64,
    options: &WorkerOptions,
) -> Result<LockstepOutcome, SimulationError> {
    let n = ledger.consumers();
    let mut scheduler = SmallRng::seed_from_u64(seed ^ SCHEDULER_SALT);
    let mut consumers: Vec<Consumer> = (0..n).map(|i| Consumer::new(i, seed)).collect();
    // request being retried, with the denials it has collected so far
    let mut pending: Vec<Option<(Vec<u32>, u64)>> = vec![None; n];
    let mut reports: Vec<ConsumerReport> = (0..n).map(ConsumerReport::new).collect();
    let mut transcript = Hasher::new();
    let mut steps = 0u64;

    loop {
        let active: Vec<usize> = consumers
            .iter()
            .filter(|c| c.is_active())
            .map(Consumer::id)
            .collect();
        if active.is_empty() {
            break;
        }
        if steps >= max_steps {
            return Err(SimulationError::StepLimit(max_steps));
        }
        steps += 1;

        let i = active[scheduler.random_range(0..active.len())];
        let consumer = &mut consumers[i];
        let (request, denied) = match pending[i].take() {
            Some(retry) => retry,
            None => (consumer.next_request(ledger.need_of(i)?), 0),
        };

        match ledger.try_request(i, &request)? {
            Decision::Denied(reason) => {
                let (tag, label) = match reason {
                    DenialReason::Unavailable { .. } => {
                        reports[i].denied_unavailable += 1;
                        (b'U', "unavailable")
                    }
                    DenialReason::Unsafe => {
                        reports[i].denied_unsafe += 1;
                        (b'S', "unsafe")
                    }
                };
                record(&mut transcript, tag, i, &request);
                if let Some(metrics) = &options.metrics {
                    metrics.record_denial(label);
                }
                trace!(step = steps, consumer = i, ?request, reason = label, "Denied");
                pending[i] = Some((request, denied + 1));
            }
            Decision::Granted { .. } => {
                record(&mut transcript, b'G', i, &request);
                reports[i].grants += 1;
                if let Some(metrics) = &options.metrics {
                    metrics.record_grant(denied);
                }

                let release = consumer.next_release(ledger.allocation_of(i)?);
                ledger.release(i, &release)?;
                record(&mut transcript, b'R', i, &release);
                reports[i].releases += 1;
                if let Some(metrics) = &options.metrics {
                    metrics.record_release();
                }
                if let Some(observer) = &options.observer {
                    observer.on_release(i, &release, &ledger.snapshot());
                }

                if consumer.settle(ledger.is_settled(i)?) == ConsumerState::Done {
                    debug!(step = steps, consumer = i, "Consumer done");
                    if let Some(metrics) = &options.metrics {
                        metrics.record_consumer_done();
                    }
                }
            }
        }
    }

    Ok(LockstepOutcome {
        ledger,
        reports,
        steps,
        transcript: hex::encode(transcript.finalize().as_bytes()),
    })
}

fn record(transcript: &mut Hasher, tag: u8, consumer: usize, vector: &[u32]) {
    transcript.update(&[tag]);
    transcript.update(&(consumer as u64).to_le_bytes());
    for v in vector {
        transcript.update(&v.to_le_bytes());
    }
}
