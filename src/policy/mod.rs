pub mod factory;
pub mod live_round_robin;
pub mod round_robin;

use std::sync::Arc;

use crate::backend::Backend;

pub use factory::{PolicyFactory, PolicyType};
pub use live_round_robin::LiveRoundRobin;
pub use round_robin::RoundRobin;

pub trait BalancerPolicy {
    /// Returns an index into `backends`, which must not be empty.
    fn next(&self, backends: &[Arc<dyn Backend>]) -> usize;
}
