use std::{net::SocketAddr, sync::Arc};

use http::{Request, Response};
use hyper::body::Incoming;
use serde::Deserialize;
use tracing::info;

use crate::{
    backend::Backend,
    config,
    policy::{BalancerPolicy, PolicyFactory, PolicyType},
    server::ServerBody,
};

#[derive(Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub policy: PolicyType,
}

/// Owns the backends and picks one of them for every request.
///
/// The backend list is fixed at construction and never empty. The only
/// state shared between requests is the policy cursor.
pub struct Balancer {
    backends: Vec<Arc<dyn Backend>>,
    policy: Box<dyn BalancerPolicy + Send + Sync>,
}

impl Balancer {
    pub fn new(config: Config, backends: Vec<Arc<dyn Backend>>) -> Result<Self, config::Error> {
        if backends.is_empty() {
            return Err(config::Error::NoBackends);
        }

        Ok(Self {
            backends,
            policy: PolicyFactory::make(config.policy),
        })
    }

    pub fn select_next(&self) -> &Arc<dyn Backend> {
        let index = self.policy.next(&self.backends);
        &self.backends[index]
    }

    /// Exactly one selection and one forward per request. Upstream
    /// failures are answered by the backend itself; there is no failover.
    pub async fn dispatch(
        &self,
        req: Request<Incoming>,
        client_addr: SocketAddr,
    ) -> Response<ServerBody> {
        let backend = self.select_next();
        info!("forwarding {} {} to {}", req.method(), req.uri(), backend.address());

        backend.forward(req, client_addr).await
    }

    pub fn backends(&self) -> &[Arc<dyn Backend>] {
        &self.backends
    }
}
