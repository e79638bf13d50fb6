use std::{convert::Infallible, io, sync::Arc, time::Duration};

use http::Uri;
use http_body_util::{combinators::BoxBody, BodyExt, Empty};
use hyper::body::Bytes;
use hyper_tls::HttpsConnector;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::backend::{Backend, MonitoredBackend};
use crate::config;
use crate::proxy;
use crate::utils;

#[derive(Clone, Deserialize)]
pub struct Config {
    pub path: String,
    #[serde(with = "utils::serde_millis")]
    pub interval: Duration,
    #[serde(
        default = "default_timeout",
        deserialize_with = "utils::serde_millis::deserialize"
    )]
    pub timeout: Duration,
}

fn default_timeout() -> Duration {
    Duration::from_secs(1)
}

/// Periodically checks every monitored backend and flips its liveness.
pub struct Healthcheck {
    backends: Vec<Arc<MonitoredBackend>>,
    config: Config,
    path: Uri,
    client: Client<HttpsConnector<HttpConnector>, BoxBody<Bytes, Infallible>>,
}

impl Healthcheck {
    pub fn new(
        config: Config,
        backends: Vec<Arc<MonitoredBackend>>,
    ) -> Result<Self, config::Error> {
        let path = parse_path(&config.path)?;
        let client = Client::builder(TokioExecutor::new()).build(HttpsConnector::new());

        Ok(Self {
            backends,
            config,
            path,
            client,
        })
    }

    pub async fn run(&self) {
        loop {
            tokio::time::sleep(self.config.interval).await;
            self.do_healthcheck().await;
        }
    }

    async fn do_healthcheck(&self) {
        for backend in &self.backends {
            let result = self.check(backend.target()).await;
            if let Err(e) = result {
                warn!("healthcheck failed for {}: {}", backend.address(), e);
                backend.set_alive(false);
            } else {
                debug!("healthcheck successful for {}", backend.address());
                backend.set_alive(true);
            }
        }
    }

    async fn check(&self, target: &Uri) -> crate::Result<()> {
        let uri = proxy::join_uri(target, &self.path)?;

        let req = http::Request::builder()
            .method(http::Method::GET)
            .uri(uri)
            .body(Empty::new().boxed())?;

        let resp = tokio::time::timeout(self.config.timeout, self.client.request(req))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "healthcheck timed out"))??;

        if !resp.status().is_success() {
            return Err(io::Error::other(format!("got bad response {}", resp.status())).into());
        }

        Ok(())
    }
}

fn parse_path(path: &str) -> Result<Uri, config::Error> {
    let invalid = |reason: String| config::Error::InvalidHealthcheckPath {
        path: path.to_owned(),
        reason,
    };

    if !path.starts_with('/') {
        return Err(invalid("must start with '/'".to_owned()));
    }

    path.parse().map_err(|e| invalid(format!("{e}")))
}
