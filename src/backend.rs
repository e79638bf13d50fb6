use std::{
    net::SocketAddr,
    sync::atomic::{self, AtomicBool},
};

use async_trait::async_trait;
use http::{uri::Scheme, Request, Response, Uri};
use hyper::body::Incoming;
use serde::Deserialize;

use crate::{
    config, metrics,
    proxy::{HttpClient, ReverseProxy},
    server::ServerBody,
};

#[derive(Clone, Deserialize)]
pub struct BackendConfig {
    pub address: String,
}

/// An upstream the balancer can hand requests to.
#[async_trait]
pub trait Backend: Send + Sync {
    fn address(&self) -> &str;

    fn is_alive(&self) -> bool;

    /// Upstream failures are answered with an error response; nothing is
    /// reported back to the caller.
    async fn forward(
        &self,
        req: Request<Incoming>,
        client_addr: SocketAddr,
    ) -> Response<ServerBody>;
}

/// Plain reverse proxy backend. It is never health checked, so it is always alive.
pub struct ProxyBackend {
    address: String,
    proxy: ReverseProxy,
}

impl ProxyBackend {
    pub fn new(address: &str, client: HttpClient) -> Result<Self, config::Error> {
        let target = parse_address(address)?;

        Ok(Self {
            address: address.to_owned(),
            proxy: ReverseProxy::new(target, client),
        })
    }

    pub fn target(&self) -> &Uri {
        self.proxy.target()
    }
}

#[async_trait]
impl Backend for ProxyBackend {
    fn address(&self) -> &str {
        &self.address
    }

    fn is_alive(&self) -> bool {
        true
    }

    async fn forward(
        &self,
        req: Request<Incoming>,
        client_addr: SocketAddr,
    ) -> Response<ServerBody> {
        self.proxy.serve(req, client_addr, &self.address).await
    }
}

/// Backend whose liveness is driven by the healthcheck task.
pub struct MonitoredBackend {
    inner: ProxyBackend,
    alive: AtomicBool,
}

impl MonitoredBackend {
    pub fn new(inner: ProxyBackend) -> Self {
        metrics::BACKEND_ALIVE
            .with_label_values(&[inner.address()])
            .set(1);

        Self {
            inner,
            alive: AtomicBool::new(true),
        }
    }

    pub fn target(&self) -> &Uri {
        self.inner.target()
    }

    pub fn set_alive(&self, alive: bool) {
        self.alive.store(alive, atomic::Ordering::SeqCst);
        metrics::BACKEND_ALIVE
            .with_label_values(&[self.inner.address()])
            .set(i64::from(alive));
    }
}

#[async_trait]
impl Backend for MonitoredBackend {
    fn address(&self) -> &str {
        self.inner.address()
    }

    fn is_alive(&self) -> bool {
        self.alive.load(atomic::Ordering::SeqCst)
    }

    async fn forward(
        &self,
        req: Request<Incoming>,
        client_addr: SocketAddr,
    ) -> Response<ServerBody> {
        self.inner.forward(req, client_addr).await
    }
}

fn parse_address(address: &str) -> Result<Uri, config::Error> {
    let invalid = |reason: String| config::Error::InvalidAddress {
        address: address.to_owned(),
        reason,
    };

    let uri: Uri = address.parse().map_err(|e| invalid(format!("{e}")))?;

    let scheme = uri
        .scheme()
        .ok_or_else(|| invalid("missing scheme".to_owned()))?;
    if *scheme != Scheme::HTTP && *scheme != Scheme::HTTPS {
        return Err(config::Error::UnsupportedScheme {
            address: address.to_owned(),
            scheme: scheme.to_string(),
        });
    }

    match uri.host() {
        Some(host) if !host.is_empty() => Ok(uri),
        _ => Err(invalid("missing host".to_owned())),
    }
}
