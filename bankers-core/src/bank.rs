//! ## bankers-core::bank
//! **Thread-safe ledger with blocking requests**
//!
//! A [`Ledger`] behind a single `parking_lot` mutex. Each request runs the
//! availability check, tentative commit and safety check inside one critical
//! section; releases wake every waiter so denied requests can be retried.

use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};

use crate::error::LedgerError;
use crate::ledger::{Decision, DenialReason, Ledger, Snapshot};

/// How a consumer waits between denied attempts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WaitStrategy {
    /// Sleep on the condition variable until the next release.
    #[default]
    Notify,
    /// Sleep `initial`, doubling up to `max`, between attempts.
    Backoff { initial: Duration, max: Duration },
    /// Yield the thread and retry immediately.
    Spin,
}

/// Result of a blocking request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Grant {
    /// Attempts denied because the units were not free.
    pub denied_unavailable: u64,
    /// Attempts denied because granting would have been unsafe.
    pub denied_unsafe: u64,
    /// Completion order of the state the grant produced.
    pub sequence: Vec<usize>,
}

impl Grant {
    /// Denials observed before the request went through.
    pub fn denials(&self) -> u64 {
        self.denied_unavailable + self.denied_unsafe
    }

    fn count(&mut self, reason: &DenialReason) {
        match reason {
            DenialReason::Unavailable { .. } => self.denied_unavailable += 1,
            DenialReason::Unsafe => self.denied_unsafe += 1,
        }
    }
}

struct BankState {
    ledger: Ledger,
    aborted: bool,
}

/// Shared banker. Clone an `Arc<Bank>` into each consumer thread.
pub struct Bank {
    state: Mutex<BankState>,
    released: Condvar,
}

impl Bank {
    pub fn new(ledger: Ledger) -> Self {
        Self {
            state: Mutex::new(BankState {
                ledger,
                aborted: false,
            }),
            released: Condvar::new(),
        }
    }

    pub fn consumers(&self) -> usize {
        self.state.lock().ledger.consumers()
    }

    pub fn resources(&self) -> usize {
        self.state.lock().ledger.resources()
    }

    /// Consistent copy of the whole ledger, never taken mid-transaction.
    pub fn snapshot(&self) -> Snapshot {
        self.state.lock().ledger.snapshot()
    }

    /// The consumer's own `(need, allocation)` rows.
    pub fn position(&self, consumer: usize) -> Result<(Vec<u32>, Vec<u32>), LedgerError> {
        let state = self.state.lock();
        Ok((
            state.ledger.need_of(consumer)?.to_vec(),
            state.ledger.allocation_of(consumer)?.to_vec(),
        ))
    }

    /// One request attempt, no waiting.
    pub fn try_request(&self, consumer: usize, request: &[u32]) -> Result<Decision, LedgerError> {
        let mut state = self.state.lock();
        if state.aborted {
            return Err(LedgerError::Aborted { consumer });
        }
        state.ledger.try_request(consumer, request)
    }

    /// Requests `request` for `consumer`, waiting per `strategy` until granted.
    ///
    /// Only a fault or [`Bank::abort`] ends the wait early.
    pub fn request(
        &self,
        consumer: usize,
        request: &[u32],
        strategy: WaitStrategy,
    ) -> Result<Grant, LedgerError> {
        match strategy {
            WaitStrategy::Notify => self.request_notified(consumer, request),
            WaitStrategy::Backoff { initial, max } => {
                let mut delay = initial;
                self.request_polling(consumer, request, || {
                    std::thread::sleep(delay);
                    delay = (delay * 2).min(max);
                })
            }
            WaitStrategy::Spin => self.request_polling(consumer, request, std::thread::yield_now),
        }
    }

    fn request_notified(&self, consumer: usize, request: &[u32]) -> Result<Grant, LedgerError> {
        let mut state = self.state.lock();
        let mut grant = Grant::default();
        loop {
            if state.aborted {
                return Err(LedgerError::Aborted { consumer });
            }
            match state.ledger.try_request(consumer, request)? {
                Decision::Granted { sequence } => return Ok(Grant { sequence, ..grant }),
                Decision::Denied(reason) => {
                    grant.count(&reason);
                    // The lock is released only while parked, so a release
                    // cannot slip in between the denial and the wait.
                    self.released.wait(&mut state);
                }
            }
        }
    }

    fn request_polling(
        &self,
        consumer: usize,
        request: &[u32],
        mut pause: impl FnMut(),
    ) -> Result<Grant, LedgerError> {
        let mut grant = Grant::default();
        loop {
            match self.try_request(consumer, request)? {
                Decision::Granted { sequence } => return Ok(Grant { sequence, ..grant }),
                Decision::Denied(reason) => {
                    grant.count(&reason);
                    pause();
                }
            }
        }
    }

    /// Returns units to the pool and wakes waiting requests.
    pub fn release(&self, consumer: usize, release: &[u32]) -> Result<(), LedgerError> {
        {
            let mut state = self.state.lock();
            state.ledger.release(consumer, release)?;
        }
        self.released.notify_all();
        Ok(())
    }

    /// Like [`Bank::release`] but also returns the state right after the release.
    pub fn release_and_snapshot(
        &self,
        consumer: usize,
        release: &[u32],
    ) -> Result<Snapshot, LedgerError> {
        let snapshot = {
            let mut state = self.state.lock();
            state.ledger.release(consumer, release)?;
            state.ledger.snapshot()
        };
        self.released.notify_all();
        Ok(snapshot)
    }

    /// Fails every current and future request with [`LedgerError::Aborted`].
    pub fn abort(&self) {
        let mut state = self.state.lock();
        if !state.aborted {
            warn!("Bank aborted, waking all waiting consumers");
            state.aborted = true;
        }
        drop(state);
        self.released.notify_all();
    }

    pub fn is_aborted(&self) -> bool {
        self.state.lock().aborted
    }

    /// Takes the ledger back once all consumers are done with the bank.
    pub fn into_ledger(self) -> Ledger {
        debug!("Bank closed");
        self.state.into_inner().ledger
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::Matrix;
    use std::sync::Arc;
    use std::thread;
    use tracing_test::traced_test;

    fn single_resource(supply: u32, maxima: &[u32]) -> Bank {
        let rows: Vec<[u32; 1]> = maxima.iter().map(|&m| [m]).collect();
        let maximum = Matrix::from_rows(&rows).unwrap();
        Bank::new(Ledger::with_maximum(&[supply], maximum).unwrap())
    }

    #[test]
    fn try_request_reports_denial_without_blocking() {
        let bank = single_resource(2, &[2, 2]);
        assert!(bank.try_request(0, &[2]).unwrap().is_granted());
        assert!(!bank.try_request(1, &[1]).unwrap().is_granted());
        assert_eq!(bank.snapshot().available, vec![0]);
    }

    #[test]
    fn notify_waiter_is_granted_after_release() {
        let bank = Arc::new(single_resource(2, &[2, 2]));
        bank.request(0, &[2], WaitStrategy::Notify).unwrap();

        let waiter = {
            let bank = bank.clone();
            thread::spawn(move || bank.request(1, &[2], WaitStrategy::Notify))
        };
        // Give the waiter a chance to park; the grant is correct either way.
        thread::sleep(Duration::from_millis(20));
        bank.release(0, &[2]).unwrap();

        let grant = waiter.join().unwrap().unwrap();
        assert_eq!(grant.sequence.len(), 2);
        assert_eq!(grant.denied_unsafe, 0);
        let snap = bank.snapshot();
        assert_eq!(snap.allocation.row(1), &[2]);
        snap.check_invariants().unwrap();
    }

    #[test]
    fn backoff_and_spin_eventually_grant() {
        for strategy in [
            WaitStrategy::Backoff {
                initial: Duration::from_micros(50),
                max: Duration::from_millis(2),
            },
            WaitStrategy::Spin,
        ] {
            let bank = Arc::new(single_resource(1, &[1, 1]));
            bank.request(0, &[1], strategy).unwrap();
            let waiter = {
                let bank = bank.clone();
                thread::spawn(move || bank.request(1, &[1], strategy))
            };
            thread::sleep(Duration::from_millis(10));
            bank.release(0, &[1]).unwrap();
            assert!(waiter.join().unwrap().is_ok());
        }
    }

    #[traced_test]
    #[test]
    fn abort_wakes_waiters() {
        let bank = Arc::new(single_resource(1, &[1, 1]));
        bank.request(0, &[1], WaitStrategy::Notify).unwrap();
        let waiter = {
            let bank = bank.clone();
            thread::spawn(move || bank.request(1, &[1], WaitStrategy::Notify))
        };
        thread::sleep(Duration::from_millis(10));
        bank.abort();

        assert_eq!(
            waiter.join().unwrap().unwrap_err(),
            LedgerError::Aborted { consumer: 1 }
        );
        assert!(bank.is_aborted());
        assert!(logs_contain("Bank aborted"));
    }

    #[test]
    fn faults_propagate_out_of_blocking_request() {
        let bank = single_resource(3, &[1]);
        assert!(matches!(
            bank.request(0, &[2], WaitStrategy::Notify),
            Err(LedgerError::ExceedsNeed { .. })
        ));
    }

    #[test]
    fn release_and_snapshot_reflects_release() {
        let bank = single_resource(3, &[3]);
        bank.request(0, &[3], WaitStrategy::Notify).unwrap();
        let snap = bank.release_and_snapshot(0, &[1]).unwrap();
        assert_eq!(snap.available, vec![1]);
        assert_eq!(snap.retired.row(0), &[1]);
        assert_eq!(bank.position(0).unwrap(), (vec![0], vec![2]));
    }

    #[test]
    fn concurrent_consumers_preserve_invariants() {
        let bank = Arc::new(single_resource(4, &[3, 3, 3, 3]));
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let bank = bank.clone();
                thread::spawn(move || {
                    for _ in 0..3 {
                        bank.request(i, &[1], WaitStrategy::Notify).unwrap();
                    }
                    bank.release(i, &[3]).unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let ledger = Arc::try_unwrap(bank).ok().unwrap().into_ledger();
        let snap = ledger.snapshot();
        snap.check_invariants().unwrap();
        assert_eq!(snap.available, vec![4]);
        assert!((0..4).all(|i| snap.is_settled(i)));
    }
}
