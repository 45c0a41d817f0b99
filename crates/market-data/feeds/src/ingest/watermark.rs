//! Last-delivered trade timestamp

use common::Ts;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Timestamp of the most recently delivered trade.
///
/// Cloning shares the same mark. Readers (poller, monitor) may load it at
/// any time; only the router advances it, and the value never decreases.
#[derive(Debug, Clone)]
pub struct Watermark {
    nanos: Arc<AtomicU64>,
}

impl Watermark {
    /// Mark starting at `initial`
    #[must_use]
    pub fn new(initial: Ts) -> Self {
        Self {
            nanos: Arc::new(AtomicU64::new(initial.as_nanos())),
        }
    }

    /// Mark starting at the current wall clock
    #[must_use]
    pub fn starting_now() -> Self {
        Self::new(Ts::now())
    }

    /// Current mark
    #[must_use]
    pub fn get(&self) -> Ts {
        Ts::from_nanos(self.nanos.load(Ordering::Acquire))
    }

    /// Raise the mark to `ts`; returns whether it moved
    pub(crate) fn advance_to(&self, ts: Ts) -> bool {
        let prev = self.nanos.fetch_max(ts.as_nanos(), Ordering::AcqRel);
        prev < ts.as_nanos()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_advance_only_forward() {
        let mark = Watermark::new(Ts::from_millis(10));
        assert!(!mark.advance_to(Ts::from_millis(5)));
        assert_eq!(mark.get(), Ts::from_millis(10));
        assert!(!mark.advance_to(Ts::from_millis(10)));
        assert!(mark.advance_to(Ts::from_millis(11)));
        assert_eq!(mark.get(), Ts::from_millis(11));
    }

    #[test]
    fn test_clones_share_mark() {
        let mark = Watermark::new(Ts::ZERO);
        let reader = mark.clone();
        mark.advance_to(Ts::from_millis(3));
        assert_eq!(reader.get(), Ts::from_millis(3));
    }

    proptest! {
        #[test]
        fn prop_mark_is_running_max(steps in proptest::collection::vec(0u64..1_000_000, 0..200)) {
            let mark = Watermark::new(Ts::ZERO);
            let mut prev = mark.get();
            let mut max = 0u64;
            for step in steps {
                mark.advance_to(Ts::from_nanos(step));
                max = max.max(step);
                let now = mark.get();
                prop_assert!(now >= prev);
                prop_assert_eq!(now.as_nanos(), max);
                prev = now;
            }
        }
    }
}
