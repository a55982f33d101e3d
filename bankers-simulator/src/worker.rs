//! Threaded consumer workers.
//!
//! One named OS thread per consumer. Choosing amounts happens outside the
//! bank's lock; only the transactions themselves are serialised.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{debug, error, info, instrument};

use bankers_core::{Bank, WaitStrategy};
use bankers_telemetry::MetricsRecorder;

use crate::consumer::{Consumer, ConsumerReport};
use crate::error::SimulationError;
use crate::StateObserver;

/// What every worker shares.
#[derive(Clone, Default)]
pub struct WorkerOptions {
    pub strategy: WaitStrategy,
    pub observer: Option<Arc<dyn StateObserver>>,
    pub metrics: Option<MetricsRecorder>,
}

/// Starts `consumer` on its own thread. The handle yields the consumer's
/// report once it reaches `Done`.
///
/// A worker that fails or panics aborts the bank so its peers stop waiting
/// for units it will never return.
pub fn spawn(
    bank: Arc<Bank>,
    consumer: Consumer,
    options: WorkerOptions,
) -> Result<JoinHandle<Result<ConsumerReport, SimulationError>>, SimulationError> {
    let handle = thread::Builder::new()
        .name(format!("consumer-{}", consumer.id()))
        .spawn(move || {
            let _guard = AbortOnPanic(&bank);
            let result = run_consumer(&bank, consumer, &options);
            if let Err(e) = &result {
                if !e.is_secondary() {
                    error!("Consumer failed: {e}");
                    bank.abort();
                }
            }
            result
        })?;
    Ok(handle)
}

#[instrument(skip_all, fields(consumer = consumer.id()))]
fn run_consumer(
    bank: &Bank,
    mut consumer: Consumer,
    options: &WorkerOptions,
) -> Result<ConsumerReport, SimulationError> {
    let id = consumer.id();
    let mut report = ConsumerReport::new(id);

    while consumer.is_active() {
        let (need, _) = bank.position(id)?;
        let request = consumer.next_request(&need);
        let grant = bank.request(id, &request, options.strategy)?;
        report.grants += 1;
        report.denied_unavailable += grant.denied_unavailable;
        report.denied_unsafe += grant.denied_unsafe;
        if let Some(metrics) = &options.metrics {
            metrics.record_grant(grant.denials());
            for _ in 0..grant.denied_unavailable {
                metrics.record_denial("unavailable");
            }
            for _ in 0..grant.denied_unsafe {
                metrics.record_denial("unsafe");
            }
        }

        let (_, held) = bank.position(id)?;
        let release = consumer.next_release(&held);
        let snapshot = bank.release_and_snapshot(id, &release)?;
        report.releases += 1;
        if let Some(metrics) = &options.metrics {
            metrics.record_release();
        }
        if let Some(observer) = &options.observer {
            observer.on_release(id, &release, &snapshot);
        }

        consumer.settle(snapshot.is_settled(id));
        debug!(?request, ?release, denials = grant.denials(), "Cycle complete");
    }

    if let Some(metrics) = &options.metrics {
        metrics.record_consumer_done();
    }
    info!(grants = report.grants, denials = report.denials(), "Consumer done");
    Ok(report)
}

struct AbortOnPanic<'a>(&'a Bank);

impl Drop for AbortOnPanic<'_> {
    fn drop(&mut self) {
        if thread::panicking() {
            self.0.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bankers_core::{Ledger, Matrix};

    #[test]
    fn spawned_consumer_runs_to_done() {
        let maximum = Matrix::from_rows(&[[3, 2]]).unwrap();
        let bank = Arc::new(Bank::new(Ledger::with_maximum(&[3, 2], maximum).unwrap()));

        let handle = spawn(bank.clone(), Consumer::new(0, 5), WorkerOptions::default()).unwrap();
        let report = handle.join().unwrap().unwrap();

        assert!(report.grants >= 1);
        assert_eq!(report.grants, report.releases);
        let snap = bank.snapshot();
        assert!(snap.is_settled(0));
        assert_eq!(snap.available, vec![3, 2]);
        assert_eq!(snap.retired.row(0), &[3, 2]);
    }

    #[test]
    fn worker_thread_is_named_after_consumer() {
        struct NameCheck;
        impl StateObserver for NameCheck {
            fn on_release(&self, consumer: usize, _: &[u32], _: &bankers_core::Snapshot) {
                let expected = format!("consumer-{consumer}");
                assert_eq!(thread::current().name(), Some(expected.as_str()));
            }
        }

        let maximum = Matrix::from_rows(&[[1], [1]]).unwrap();
        let bank = Arc::new(Bank::new(Ledger::with_maximum(&[1], maximum).unwrap()));
        let options = WorkerOptions {
            observer: Some(Arc::new(NameCheck)),
            ..Default::default()
        };
        let handles: Vec<_> = (0..2)
            .map(|i| spawn(bank.clone(), Consumer::new(i, 0), options.clone()).unwrap())
            .collect();
        for handle in handles {
            handle.join().unwrap().unwrap();
        }
    }
}
