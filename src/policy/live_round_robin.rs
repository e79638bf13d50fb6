use std::sync::Arc;

use crate::{
    backend::Backend,
    policy::{BalancerPolicy, RoundRobin},
};

/// Round robin that skips backends reported dead. When nothing is alive
/// it behaves like plain round robin, so a pick is always made.
pub struct LiveRoundRobin {
    round_robin: RoundRobin,
}

impl LiveRoundRobin {
    pub fn new() -> Self {
        Self {
            round_robin: RoundRobin::new(),
        }
    }

    pub fn next(&self, backends: &[Arc<dyn Backend>]) -> usize {
        let first = self.round_robin.next(backends);
        if backends[first].is_alive() {
            return first;
        }

        // Each attempt advances the shared cursor, so alive backends keep
        // an even share of the traffic.
        for _ in 1..backends.len() {
            let next = self.round_robin.next(backends);
            if backends[next].is_alive() {
                return next;
            }
        }

        first
    }
}

impl BalancerPolicy for LiveRoundRobin {
    fn next(&self, backends: &[Arc<dyn Backend>]) -> usize {
        LiveRoundRobin::next(self, backends)
    }
}
