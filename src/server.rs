use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use http::Request;
use http::Response;
use http_body_util::Either;
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use hyper_util::rt::TokioTimer;
use serde::Deserialize;
use tokio::net::TcpListener;
use tracing::debug;
use tracing::error;
use tracing::info;

use crate::app_state::AppState;
use crate::utils;

#[derive(Clone, Deserialize)]
pub struct Config {
    pub listen_addr: String,
    pub client_max_idle_per_host: usize,
    #[serde(with = "utils::serde_millis")]
    pub server_header_read_timeout: Duration,
    pub metrics_addr: Option<String>,
}

pub struct Server(Arc<ServerInner>);

struct ServerInner {
    config: Config,
}

impl Server {
    pub fn new(config: Config) -> Self {
        Server(Arc::new(ServerInner { config }))
    }

    pub async fn run(&self, state: Arc<AppState>) -> crate::Result<()> {
        let listener = TcpListener::bind(&self.0.config.listen_addr).await?;
        info!(
            "load balancer is listening on http://{}",
            listener.local_addr()?
        );

        self.serve(listener, state).await
    }

    pub async fn serve(&self, listener: TcpListener, state: Arc<AppState>) -> crate::Result<()> {
        let listener = &listener;
        loop {
            let (stream, addr) = utils::net::next_connection(move || listener.accept()).await;

            debug!("got client {addr}");

            let server = self.clone();
            let state = state.clone();
            tokio::spawn(async move {
                let service = service_fn({
                    |req| {
                        let state = state.clone();
                        Self::serve_request(state, req, addr)
                    }
                });

                let io = TokioIo::new(stream);

                let mut http = http1::Builder::new();
                http.timer(TokioTimer::new())
                    .header_read_timeout(Some(server.0.config.server_header_read_timeout));
                let result = http.serve_connection(io, &service).await;
                if let Err(err) = result {
                    error!("error during handling client {addr}: {err:?}");
                }
            });
        }
    }

    // Every path and method goes to the balancer.
    async fn serve_request(
        state: Arc<AppState>,
        req: Request<Incoming>,
        client_addr: SocketAddr,
    ) -> Result<Response<ServerBody>, Infallible> {
        debug!("got request {req:#?}");

        Ok(state.balancer.dispatch(req, client_addr).await)
    }
}

impl Clone for Server {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

// We use our own body type, because we want to return either
// the upstream `body::Incoming` or a locally built `Full` body.
// We might have done it using BoxBody, but it will lead
// to allocation per request.
pub type ServerBody = Either<Incoming, Full<Bytes>>;
