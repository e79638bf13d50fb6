use std::sync::{
    atomic::{self, AtomicUsize},
    Arc,
};

use crate::{backend::Backend, policy::BalancerPolicy};

/// Cycles through the backends in their configured order. Liveness is
/// not consulted.
pub struct RoundRobin {
    next: AtomicUsize,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self {
            next: AtomicUsize::new(0),
        }
    }

    pub fn next(&self, backends: &[Arc<dyn Backend>]) -> usize {
        // it's ok if it overflows
        self.next.fetch_add(1, atomic::Ordering::SeqCst) % backends.len()
    }
}

impl BalancerPolicy for RoundRobin {
    fn next(&self, backends: &[Arc<dyn Backend>]) -> usize {
        RoundRobin::next(self, backends)
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::HashMap, thread};

    use crate::utils::testing::{stubs, StubBackend};

    use super::*;

    fn pick(policy: &RoundRobin, backends: &[Arc<dyn Backend>], count: usize) -> Vec<String> {
        (0..count)
            .map(|_| backends[policy.next(backends)].address().to_owned())
            .collect()
    }

    #[test]
    fn test_happy() {
        let backends = stubs(&["a", "b", "c"]);

        let policy = RoundRobin::new();
        assert_eq!(pick(&policy, &backends, 4), vec!["a", "b", "c", "a"]);
    }

    #[test]
    fn test_one() {
        let backends = stubs(&["a"]);

        let policy = RoundRobin::new();
        assert_eq!(pick(&policy, &backends, 2), vec!["a", "a"]);
    }

    #[test]
    fn test_deterministic() {
        let backends = stubs(&["a", "b", "c", "d", "e"]);

        let first = pick(&RoundRobin::new(), &backends, 17);
        let second = pick(&RoundRobin::new(), &backends, 17);
        assert_eq!(first, second);
    }

    #[test]
    fn test_ignores_liveness() {
        let dead = StubBackend::new("dead");
        dead.set_alive(false);
        let backends: Vec<Arc<dyn Backend>> =
            vec![StubBackend::new("a"), dead, StubBackend::new("b")];

        let policy = RoundRobin::new();
        assert_eq!(pick(&policy, &backends, 3), vec!["a", "dead", "b"]);
    }

    #[test]
    fn test_wraps_on_overflow() {
        let backends = stubs(&["a", "b", "c"]);

        let policy = RoundRobin::new();
        policy.next.store(usize::MAX, atomic::Ordering::SeqCst);

        // usize::MAX % 3 == 0, then the counter wraps to 0.
        assert_eq!(pick(&policy, &backends, 2), vec!["a", "a"]);
    }

    #[test]
    fn test_concurrent() {
        const THREADS: usize = 8;
        const ROUNDS: usize = 250;

        let backends = stubs(&["a", "b", "c", "d"]);
        let policy = RoundRobin::new();

        let counts = thread::scope(|s| {
            let handles = (0..THREADS)
                .map(|_| s.spawn(|| pick(&policy, &backends, ROUNDS)))
                .collect::<Vec<_>>();

            let mut counts = HashMap::new();
            for handle in handles {
                for address in handle.join().unwrap() {
                    *counts.entry(address).or_insert(0) += 1;
                }
            }
            counts
        });

        // 8 * 250 picks spread over 4 backends
        assert_eq!(counts.len(), 4);
        for count in counts.values() {
            assert_eq!(*count, THREADS * ROUNDS / 4);
        }
    }
}
