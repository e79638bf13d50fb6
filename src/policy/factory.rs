use serde::Deserialize;

use crate::policy::{BalancerPolicy, LiveRoundRobin, RoundRobin};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyType {
    #[default]
    RoundRobin,
    LiveRoundRobin,
}

pub struct PolicyFactory;

impl PolicyFactory {
    pub fn make(policy: PolicyType) -> Box<dyn BalancerPolicy + Send + Sync> {
        match policy {
            PolicyType::RoundRobin => Box::new(RoundRobin::new()),
            PolicyType::LiveRoundRobin => Box::new(LiveRoundRobin::new()),
        }
    }
}
