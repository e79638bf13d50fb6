use crate::balancer::Balancer;

pub struct AppState {
    pub balancer: Balancer,
}
