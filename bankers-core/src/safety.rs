//! ## bankers-core::safety
//! **Banker's safety check**
//!
//! Decides whether some completion order lets every consumer obtain its
//! remaining need and hand back what it holds. The scan restarts from the
//! first consumer after every completion and stops once a full pass makes no
//! progress, so a consumer that was blocked early in the pass gets another
//! look after later consumers return their units.

use crate::matrix::Matrix;

/// Returns a completion order if the state is safe, `None` otherwise.
///
/// `allocation` and `need` must share the shape `consumers × available.len()`.
pub fn safe_sequence(available: &[u32], allocation: &Matrix, need: &Matrix) -> Option<Vec<usize>> {
    debug_assert_eq!(allocation.rows(), need.rows());
    debug_assert_eq!(allocation.cols(), available.len());
    debug_assert_eq!(need.cols(), available.len());

    let consumers = need.rows();
    // u64 so a work vector summed over many consumers cannot overflow
    let mut work: Vec<u64> = available.iter().map(|&v| u64::from(v)).collect();
    let mut finish = vec![false; consumers];
    let mut order = Vec::with_capacity(consumers);

    'scan: loop {
        for i in 0..consumers {
            if finish[i] || !fits(need.row(i), &work) {
                continue;
            }
            for (w, &held) in work.iter_mut().zip(allocation.row(i)) {
                *w += u64::from(held);
            }
            finish[i] = true;
            order.push(i);
            continue 'scan;
        }
        break;
    }

    (order.len() == consumers).then_some(order)
}

/// True iff a completion order exists.
pub fn is_safe(available: &[u32], allocation: &Matrix, need: &Matrix) -> bool {
    safe_sequence(available, allocation, need).is_some()
}

#[inline]
fn fits(need: &[u32], work: &[u64]) -> bool {
    need.iter().zip(work).all(|(&n, &w)| u64::from(n) <= w)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn textbook() -> ([u32; 3], Matrix, Matrix) {
        let allocation =
            Matrix::from_rows(&[[0, 1, 0], [2, 0, 0], [3, 0, 2], [2, 1, 1], [0, 0, 2]]).unwrap();
        let need =
            Matrix::from_rows(&[[7, 4, 3], [1, 2, 2], [6, 0, 0], [0, 1, 1], [4, 3, 1]]).unwrap();
        ([3, 3, 2], allocation, need)
    }

    #[test]
    fn textbook_state_is_safe() {
        let (available, allocation, need) = textbook();
        let order = safe_sequence(&available, &allocation, &need).unwrap();
        // restarts from P0 after each completion
        assert_eq!(order, vec![1, 3, 0, 2, 4]);
    }

    #[test]
    fn no_consumer_fits_is_unsafe() {
        let allocation = Matrix::from_rows(&[[1, 0], [0, 1]]).unwrap();
        let need = Matrix::from_rows(&[[1, 1], [1, 1]]).unwrap();
        assert!(!is_safe(&[0, 0], &allocation, &need));
    }

    #[test]
    fn earlier_consumer_completes_after_later_release() {
        // A single top-to-bottom pass would reject this: P0 only fits once P1
        // has finished and returned its two units.
        let allocation = Matrix::from_rows(&[[0], [2]]).unwrap();
        let need = Matrix::from_rows(&[[2], [1]]).unwrap();
        assert_eq!(safe_sequence(&[1], &allocation, &need), Some(vec![1, 0]));
    }

    #[test]
    fn zero_need_consumers_are_always_completable() {
        let allocation = Matrix::from_rows(&[[3], [0]]).unwrap();
        let need = Matrix::zeros(2, 1);
        assert!(is_safe(&[0], &allocation, &need));
    }

    #[test]
    fn oracle_does_not_touch_inputs() {
        let (available, allocation, need) = textbook();
        let (a2, m2, n2) = (available, allocation.clone(), need.clone());
        let _ = safe_sequence(&available, &allocation, &need);
        assert_eq!(available, a2);
        assert_eq!(allocation, m2);
        assert_eq!(need, n2);
    }
}
