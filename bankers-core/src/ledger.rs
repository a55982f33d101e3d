//! ## bankers-core::ledger
//! **Resource ledger and request/release transactions**
//!
//! The ledger owns available / maximum / allocation / need and is the only
//! place they change. It is not synchronised itself; share it through
//! [`crate::Bank`], which runs every transaction under one lock.
//!
//! A release hands units back to the system for good: need is not restored,
//! the units move to `retired`. Per consumer and resource the ledger keeps
//! `allocation + need + retired == maximum`.

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::error::{InvariantViolation, LedgerError};
use crate::matrix::Matrix;
use crate::safety;

/// Why a request was not granted. Either way the caller retries later.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DenialReason {
    /// The request exceeds what is currently free.
    Unavailable {
        resource: usize,
        requested: u32,
        available: u32,
    },
    /// Granting would leave no completion order for all consumers.
    Unsafe,
}

/// Outcome of a request transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Committed. `sequence` is a completion order for the new state.
    Granted { sequence: Vec<usize> },
    /// Rolled back, ledger unchanged.
    Denied(DenialReason),
}

impl Decision {
    pub fn is_granted(&self) -> bool {
        matches!(self, Decision::Granted { .. })
    }
}

/// Point-in-time copy of the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub total: Vec<u32>,
    pub available: Vec<u32>,
    pub maximum: Matrix,
    pub allocation: Matrix,
    pub need: Matrix,
    pub retired: Matrix,
}

impl Snapshot {
    pub fn consumers(&self) -> usize {
        self.maximum.rows()
    }

    pub fn resources(&self) -> usize {
        self.available.len()
    }

    pub fn is_safe(&self) -> bool {
        safety::is_safe(&self.available, &self.allocation, &self.need)
    }

    pub fn safe_sequence(&self) -> Option<Vec<usize>> {
        safety::safe_sequence(&self.available, &self.allocation, &self.need)
    }

    /// True once consumer `i` neither holds nor needs anything.
    pub fn is_settled(&self, i: usize) -> bool {
        self.need.is_zero_row(i) && self.allocation.is_zero_row(i)
    }

    /// Checks conservation, the per-consumer claim balance and the
    /// maximum-within-supply bound. Non-negativity holds by construction.
    pub fn check_invariants(&self) -> Result<(), InvariantViolation> {
        let (n, m) = (self.consumers(), self.resources());
        let shaped = |mx: &Matrix| mx.rows() == n && mx.cols() == m;
        if self.total.len() != m
            || !shaped(&self.allocation)
            || !shaped(&self.need)
            || !shaped(&self.retired)
            || self.maximum.cols() != m
        {
            return Err(InvariantViolation::Shape {
                consumers: n,
                resources: m,
            });
        }

        for i in 0..n {
            for j in 0..m {
                let (allocation, need, retired, maximum) = (
                    self.allocation.get(i, j),
                    self.need.get(i, j),
                    self.retired.get(i, j),
                    self.maximum.get(i, j),
                );
                if u64::from(allocation) + u64::from(need) + u64::from(retired)
                    != u64::from(maximum)
                {
                    return Err(InvariantViolation::ClaimMismatch {
                        consumer: i,
                        resource: j,
                        allocation,
                        need,
                        retired,
                        maximum,
                    });
                }
                if maximum > self.total[j] {
                    return Err(InvariantViolation::MaximumAboveTotal {
                        consumer: i,
                        resource: j,
                        maximum,
                        total: self.total[j],
                    });
                }
            }
        }

        for (j, allocated) in self.allocation.column_sums().into_iter().enumerate() {
            if u64::from(self.available[j]) + allocated != u64::from(self.total[j]) {
                return Err(InvariantViolation::Conservation {
                    resource: j,
                    available: self.available[j],
                    allocated,
                    total: self.total[j],
                });
            }
        }
        Ok(())
    }
}

/// The shared bookkeeping of the banker.
#[derive(Debug, Clone)]
pub struct Ledger {
    total: Vec<u32>,
    available: Vec<u32>,
    maximum: Matrix,
    allocation: Matrix,
    need: Matrix,
    retired: Matrix,
}

impl Ledger {
    /// Builds a ledger for `consumers` consumers over the given supply, drawing
    /// each `maximum[i][j]` uniformly from `0..=available[j]`.
    pub fn initialize<R: Rng>(
        available: &[u32],
        consumers: usize,
        rng: &mut R,
    ) -> Result<Self, LedgerError> {
        validate_supply(available)?;
        if consumers == 0 {
            return Err(LedgerError::InvalidConfig(
                "at least one consumer is required".into(),
            ));
        }

        let mut maximum = Matrix::zeros(consumers, available.len());
        for i in 0..consumers {
            for (slot, &supply) in maximum.row_mut(i).iter_mut().zip(available) {
                *slot = rng.random_range(0..=supply);
            }
        }
        Self::with_maximum(available, maximum)
    }

    /// Builds a ledger with an explicit maximum-claim matrix and nothing allocated.
    pub fn with_maximum(available: &[u32], maximum: Matrix) -> Result<Self, LedgerError> {
        let allocation = Matrix::zeros(maximum.rows(), maximum.cols());
        Self::from_state(available, maximum, allocation)
    }

    /// Rebuilds a ledger mid-run: `available` is what is currently free and
    /// `allocation` what each consumer holds. Need is derived as
    /// `maximum - allocation`; the supply is `available + Σ allocation`.
    pub fn from_state(
        available: &[u32],
        maximum: Matrix,
        allocation: Matrix,
    ) -> Result<Self, LedgerError> {
        if available.is_empty() {
            return Err(LedgerError::InvalidConfig(
                "at least one resource type is required".into(),
            ));
        }
        let (n, m) = (maximum.rows(), available.len());
        if n == 0 {
            return Err(LedgerError::InvalidConfig(
                "at least one consumer is required".into(),
            ));
        }
        for mx in [&maximum, &allocation] {
            if mx.cols() != m {
                return Err(LedgerError::DimensionMismatch {
                    expected: m,
                    actual: mx.cols(),
                });
            }
        }
        if allocation.rows() != n {
            return Err(LedgerError::InvalidConfig(format!(
                "allocation has {} rows, maximum has {n}",
                allocation.rows()
            )));
        }

        let mut total = Vec::with_capacity(m);
        for (j, allocated) in allocation.column_sums().into_iter().enumerate() {
            let t = u64::from(available[j]) + allocated;
            let t = u32::try_from(t).map_err(|_| {
                LedgerError::InvalidConfig(format!("R{j}: total supply {t} overflows u32"))
            })?;
            total.push(t);
        }
        validate_supply(&total)?;

        let mut need = Matrix::zeros(n, m);
        for i in 0..n {
            for j in 0..m {
                let (max, held) = (maximum.get(i, j), allocation.get(i, j));
                if max > total[j] {
                    return Err(LedgerError::InvalidConfig(format!(
                        "P{i} claims {max} of R{j}, the system only has {}",
                        total[j]
                    )));
                }
                if held > max {
                    return Err(LedgerError::InvalidConfig(format!(
                        "P{i} holds {held} of R{j}, above its maximum {max}"
                    )));
                }
                need.row_mut(i)[j] = max - held;
            }
        }

        Ok(Self {
            total,
            available: available.to_vec(),
            retired: Matrix::zeros(n, m),
            maximum,
            allocation,
            need,
        })
    }

    pub fn consumers(&self) -> usize {
        self.maximum.rows()
    }

    pub fn resources(&self) -> usize {
        self.available.len()
    }

    pub fn available(&self) -> &[u32] {
        &self.available
    }

    pub fn need_of(&self, consumer: usize) -> Result<&[u32], LedgerError> {
        self.check_consumer(consumer)?;
        Ok(self.need.row(consumer))
    }

    pub fn allocation_of(&self, consumer: usize) -> Result<&[u32], LedgerError> {
        self.check_consumer(consumer)?;
        Ok(self.allocation.row(consumer))
    }

    pub fn is_settled(&self, consumer: usize) -> Result<bool, LedgerError> {
        self.check_consumer(consumer)?;
        Ok(self.need.is_zero_row(consumer) && self.allocation.is_zero_row(consumer))
    }

    pub fn is_safe(&self) -> bool {
        safety::is_safe(&self.available, &self.allocation, &self.need)
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            total: self.total.clone(),
            available: self.available.clone(),
            maximum: self.maximum.clone(),
            allocation: self.allocation.clone(),
            need: self.need.clone(),
            retired: self.retired.clone(),
        }
    }

    /// Attempts to allocate `request` to `consumer`.
    ///
    /// The request is applied tentatively and kept only if the resulting state
    /// is safe; otherwise it is undone exactly. Asking for more than the
    /// remaining need is a caller fault and returns an error without touching
    /// the ledger.
    pub fn try_request(&mut self, consumer: usize, request: &[u32]) -> Result<Decision, LedgerError> {
        self.check_vector(consumer, request)?;
        for (j, (&r, &n)) in request.iter().zip(self.need.row(consumer)).enumerate() {
            if r > n {
                return Err(LedgerError::ExceedsNeed {
                    consumer,
                    resource: j,
                    requested: r,
                    need: n,
                });
            }
        }

        if let Some((j, (&r, &a))) = request
            .iter()
            .zip(&self.available)
            .enumerate()
            .find(|(_, (r, a))| r > a)
        {
            trace!(consumer, resource = j, requested = r, available = a, "Request exceeds availability");
            return Ok(Decision::Denied(DenialReason::Unavailable {
                resource: j,
                requested: r,
                available: a,
            }));
        }

        self.apply_request(consumer, request);
        match safety::safe_sequence(&self.available, &self.allocation, &self.need) {
            Some(sequence) => {
                debug!(consumer, ?request, ?sequence, "Request granted");
                self.debug_check();
                Ok(Decision::Granted { sequence })
            }
            None => {
                self.undo_request(consumer, request);
                trace!(consumer, ?request, "Request would leave an unsafe state");
                Ok(Decision::Denied(DenialReason::Unsafe))
            }
        }
    }

    /// Returns `release` units from `consumer` to the pool. Never needs a
    /// safety check: freeing units cannot shrink the set of completion orders.
    pub fn release(&mut self, consumer: usize, release: &[u32]) -> Result<(), LedgerError> {
        self.check_vector(consumer, release)?;
        for (j, (&r, &h)) in release.iter().zip(self.allocation.row(consumer)).enumerate() {
            if r > h {
                return Err(LedgerError::ExceedsAllocation {
                    consumer,
                    resource: j,
                    released: r,
                    held: h,
                });
            }
        }

        for (j, &r) in release.iter().enumerate() {
            self.available[j] += r;
            self.allocation.row_mut(consumer)[j] -= r;
            self.retired.row_mut(consumer)[j] += r;
        }
        debug!(consumer, ?release, "Release completed");
        self.debug_check();
        Ok(())
    }

    fn apply_request(&mut self, consumer: usize, request: &[u32]) {
        for (j, &r) in request.iter().enumerate() {
            self.available[j] -= r;
            self.allocation.row_mut(consumer)[j] += r;
            self.need.row_mut(consumer)[j] -= r;
        }
    }

    fn undo_request(&mut self, consumer: usize, request: &[u32]) {
        for (j, &r) in request.iter().enumerate() {
            self.available[j] += r;
            self.allocation.row_mut(consumer)[j] -= r;
            self.need.row_mut(consumer)[j] += r;
        }
    }

    fn check_consumer(&self, consumer: usize) -> Result<(), LedgerError> {
        if consumer >= self.consumers() {
            return Err(LedgerError::UnknownConsumer {
                consumer,
                consumers: self.consumers(),
            });
        }
        Ok(())
    }

    fn check_vector(&self, consumer: usize, vector: &[u32]) -> Result<(), LedgerError> {
        self.check_consumer(consumer)?;
        if vector.len() != self.resources() {
            return Err(LedgerError::DimensionMismatch {
                expected: self.resources(),
                actual: vector.len(),
            });
        }
        Ok(())
    }

    #[inline]
    fn debug_check(&self) {
        if cfg!(debug_assertions) {
            if let Err(violation) = self.snapshot().check_invariants() {
                panic!("ledger invariant broken: {violation}");
            }
        }
    }
}

fn validate_supply(available: &[u32]) -> Result<(), LedgerError> {
    if available.is_empty() {
        return Err(LedgerError::InvalidConfig(
            "at least one resource type is required".into(),
        ));
    }
    if let Some(j) = available.iter().position(|&a| a == 0) {
        return Err(LedgerError::InvalidConfig(format!(
            "R{j} must have a positive supply"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    /// The classic five-process, three-resource example.
    fn textbook() -> Ledger {
        let maximum =
            Matrix::from_rows(&[[7, 5, 3], [3, 2, 2], [9, 0, 2], [2, 2, 2], [4, 3, 3]]).unwrap();
        let allocation =
            Matrix::from_rows(&[[0, 1, 0], [2, 0, 0], [3, 0, 2], [2, 1, 1], [0, 0, 2]]).unwrap();
        Ledger::from_state(&[3, 3, 2], maximum, allocation).unwrap()
    }

    #[test]
    fn initialize_bounds_maximum_by_supply() {
        let mut rng = SmallRng::seed_from_u64(7);
        let ledger = Ledger::initialize(&[3, 1, 8], 6, &mut rng).unwrap();
        let snap = ledger.snapshot();
        for row in snap.maximum.iter_rows() {
            for (&max, &supply) in row.iter().zip(&[3, 1, 8]) {
                assert!(max <= supply);
            }
        }
        assert_eq!(snap.allocation, Matrix::zeros(6, 3));
        assert_eq!(snap.need, snap.maximum);
        assert_eq!(snap.total, vec![3, 1, 8]);
        snap.check_invariants().unwrap();
        assert!(snap.is_safe());
    }

    #[test]
    fn initialize_rejects_bad_supply() {
        let mut rng = SmallRng::seed_from_u64(1);
        assert!(matches!(
            Ledger::initialize(&[], 3, &mut rng),
            Err(LedgerError::InvalidConfig(_))
        ));
        assert!(matches!(
            Ledger::initialize(&[4, 0, 2], 3, &mut rng),
            Err(LedgerError::InvalidConfig(_))
        ));
        assert!(matches!(
            Ledger::initialize(&[4, 1, 2], 0, &mut rng),
            Err(LedgerError::InvalidConfig(_))
        ));
    }

    #[test]
    fn with_maximum_rejects_claims_above_supply() {
        let maximum = Matrix::from_rows(&[[2, 5]]).unwrap();
        assert!(matches!(
            Ledger::with_maximum(&[3, 4], maximum),
            Err(LedgerError::InvalidConfig(_))
        ));
    }

    #[test]
    fn textbook_safe_request_is_granted() {
        let mut ledger = textbook();
        let decision = ledger.try_request(1, &[1, 0, 2]).unwrap();
        assert!(decision.is_granted());
        assert_eq!(ledger.available(), &[2, 3, 0]);
        assert_eq!(ledger.allocation_of(1).unwrap(), &[3, 0, 2]);
        assert_eq!(ledger.need_of(1).unwrap(), &[0, 2, 0]);
        ledger.snapshot().check_invariants().unwrap();
    }

    #[test]
    fn textbook_unsafe_request_is_rolled_back() {
        let mut ledger = textbook();
        ledger.try_request(1, &[1, 0, 2]).unwrap();
        let before = ledger.snapshot();

        // Fits within [2, 3, 0] but leaves work = [2, 1, 0], which covers nobody.
        let decision = ledger.try_request(0, &[0, 2, 0]).unwrap();
        assert_eq!(decision, Decision::Denied(DenialReason::Unsafe));
        assert_eq!(ledger.snapshot(), before);
    }

    #[test]
    fn textbook_request_above_availability_is_denied() {
        let mut ledger = textbook();
        ledger.try_request(1, &[1, 0, 2]).unwrap();
        let before = ledger.snapshot();

        let decision = ledger.try_request(4, &[3, 3, 0]).unwrap();
        assert_eq!(
            decision,
            Decision::Denied(DenialReason::Unavailable {
                resource: 0,
                requested: 3,
                available: 2,
            })
        );
        assert_eq!(ledger.snapshot(), before);
    }

    #[test]
    fn zero_request_is_always_granted() {
        let mut ledger = textbook();
        assert!(ledger.try_request(2, &[0, 0, 0]).unwrap().is_granted());
    }

    #[test]
    fn request_above_need_is_a_fault() {
        let mut ledger = textbook();
        let before = ledger.snapshot();
        let err = ledger.try_request(3, &[1, 0, 0]).unwrap_err();
        assert_eq!(
            err,
            LedgerError::ExceedsNeed {
                consumer: 3,
                resource: 0,
                requested: 1,
                need: 0,
            }
        );
        assert_eq!(ledger.snapshot(), before);
    }

    #[test]
    fn release_above_allocation_is_a_fault() {
        let mut ledger = textbook();
        let err = ledger.release(0, &[1, 0, 0]).unwrap_err();
        assert!(matches!(err, LedgerError::ExceedsAllocation { consumer: 0, .. }));
    }

    #[test]
    fn shape_errors_are_reported() {
        let mut ledger = textbook();
        assert_eq!(
            ledger.try_request(9, &[0, 0, 0]).unwrap_err(),
            LedgerError::UnknownConsumer {
                consumer: 9,
                consumers: 5,
            }
        );
        assert_eq!(
            ledger.release(0, &[0, 0]).unwrap_err(),
            LedgerError::DimensionMismatch {
                expected: 3,
                actual: 2,
            }
        );
    }

    #[test]
    fn release_retires_units_without_restoring_need() {
        let mut ledger = textbook();
        ledger.release(2, &[3, 0, 2]).unwrap();
        let snap = ledger.snapshot();
        assert_eq!(snap.available, vec![6, 3, 4]);
        assert_eq!(snap.allocation.row(2), &[0, 0, 0]);
        assert_eq!(snap.need.row(2), &[6, 0, 0]);
        assert_eq!(snap.retired.row(2), &[3, 0, 2]);
        snap.check_invariants().unwrap();
    }

    #[test]
    fn consumer_settles_after_full_need_and_release() {
        let maximum = Matrix::from_rows(&[[2, 1]]).unwrap();
        let mut ledger = Ledger::with_maximum(&[2, 1], maximum).unwrap();
        assert!(!ledger.is_settled(0).unwrap());
        assert!(ledger.try_request(0, &[2, 1]).unwrap().is_granted());
        ledger.release(0, &[2, 1]).unwrap();
        assert!(ledger.is_settled(0).unwrap());
        assert_eq!(ledger.available(), &[2, 1]);
    }

    #[test]
    fn snapshot_detects_tampering() {
        let mut snap = textbook().snapshot();
        snap.available[1] += 1;
        assert!(matches!(
            snap.check_invariants(),
            Err(InvariantViolation::Conservation { resource: 1, .. })
        ));

        let mut snap = textbook().snapshot();
        snap.need.row_mut(0)[0] = 0;
        assert!(matches!(
            snap.check_invariants(),
            Err(InvariantViolation::ClaimMismatch { consumer: 0, resource: 0, .. })
        ));
    }

    #[derive(Debug, Clone)]
    enum Op {
        Request(usize, Vec<u32>),
        Release(usize, Vec<u32>),
    }

    fn op() -> impl Strategy<Value = Op> {
        let vector = prop::collection::vec(0u32..4, 3);
        prop_oneof![
            (0usize..4, vector.clone()).prop_map(|(i, v)| Op::Request(i, v)),
            (0usize..4, vector).prop_map(|(i, v)| Op::Release(i, v)),
        ]
    }

    fn clamp(v: &[u32], bound: &[u32]) -> Vec<u32> {
        v.iter().zip(bound).map(|(&a, &b)| a.min(b)).collect()
    }

    proptest! {
        #[test]
        fn invariants_hold_after_every_transaction(seed in any::<u64>(), ops in prop::collection::vec(op(), 1..64)) {
            let mut rng = SmallRng::seed_from_u64(seed);
            let mut ledger = Ledger::initialize(&[5, 4, 6], 4, &mut rng).unwrap();

            for op in ops {
                match op {
                    Op::Request(i, v) => {
                        let request = clamp(&v, ledger.need_of(i).unwrap());
                        let before = ledger.snapshot();
                        match ledger.try_request(i, &request).unwrap() {
                            Decision::Granted { .. } => {
                                prop_assert!(ledger.is_safe());
                            }
                            Decision::Denied(_) => {
                                prop_assert_eq!(ledger.snapshot(), before);
                            }
                        }
                    }
                    Op::Release(i, v) => {
                        let release = clamp(&v, ledger.allocation_of(i).unwrap());
                        ledger.release(i, &release).unwrap();
                    }
                }
                let snap = ledger.snapshot();
                prop_assert!(snap.check_invariants().is_ok());
                prop_assert!(snap.is_safe());
            }
        }

        #[test]
        fn releasing_from_a_safe_state_stays_safe(
            seed in any::<u64>(),
            grants in prop::collection::vec((0usize..4, prop::collection::vec(0u32..4, 3)), 1..16),
            who in 0usize..4,
            amount in prop::collection::vec(0u32..6, 3),
        ) {
            let mut rng = SmallRng::seed_from_u64(seed);
            let mut ledger = Ledger::initialize(&[5, 4, 6], 4, &mut rng).unwrap();
            for (i, v) in grants {
                let request = clamp(&v, ledger.need_of(i).unwrap());
                ledger.try_request(i, &request).unwrap();
            }
            prop_assert!(ledger.is_safe());

            let release = clamp(&amount, ledger.allocation_of(who).unwrap());
            ledger.release(who, &release).unwrap();
            prop_assert!(ledger.is_safe());
        }
    }
}
