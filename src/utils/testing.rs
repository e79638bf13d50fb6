//! Helpers shared by the unit tests: in-memory backends and real HTTP/1
//! stub upstreams bound to random local ports.

use std::{
    convert::Infallible,
    net::SocketAddr,
    sync::{
        atomic::{self, AtomicBool},
        Arc,
    },
};

use async_trait::async_trait;
use http::{HeaderMap, HeaderValue, Request, Response, StatusCode, Uri};
use http_body_util::{BodyExt, Either, Empty, Full};
use hyper::{
    body::{Bytes, Incoming},
    server::conn::http1,
    service::service_fn,
};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::{TokioExecutor, TokioIo},
};
use tokio::net::TcpListener;

use crate::{backend::Backend, server::ServerBody};

/// Backend that answers with its own address without touching the network.
pub struct StubBackend {
    address: String,
    alive: AtomicBool,
}

impl StubBackend {
    pub fn new(address: &str) -> Arc<Self> {
        Arc::new(Self {
            address: address.to_owned(),
            alive: AtomicBool::new(true),
        })
    }

    pub fn set_alive(&self, alive: bool) {
        self.alive.store(alive, atomic::Ordering::SeqCst);
    }
}

#[async_trait]
impl Backend for StubBackend {
    fn address(&self) -> &str {
        &self.address
    }

    fn is_alive(&self) -> bool {
        self.alive.load(atomic::Ordering::SeqCst)
    }

    async fn forward(
        &self,
        _req: Request<Incoming>,
        _client_addr: SocketAddr,
    ) -> Response<ServerBody> {
        Response::new(Either::Right(Full::new(Bytes::from(self.address.clone()))))
    }
}

pub fn stubs(addresses: &[&str]) -> Vec<Arc<dyn Backend>> {
    addresses
        .iter()
        .map(|&a| StubBackend::new(a) as Arc<dyn Backend>)
        .collect()
}

/// Starts an upstream answering every request with `status` and `body`.
/// The request uri and `X-Forwarded-For` it saw are echoed back in
/// `x-upstream-uri` and `x-upstream-forwarded-for`.
pub async fn spawn_upstream(status: StatusCode, body: &'static str) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let service = service_fn(move |req: Request<Incoming>| async move {
                    let mut resp = Response::new(Full::new(Bytes::from(body)));
                    *resp.status_mut() = status;

                    let headers = resp.headers_mut();
                    if let Ok(uri) = HeaderValue::from_str(&req.uri().to_string()) {
                        headers.insert("x-upstream-uri", uri);
                    }
                    if let Some(xff) = req.headers().get("x-forwarded-for") {
                        headers.insert("x-upstream-forwarded-for", xff.clone());
                    }

                    Ok::<_, Infallible>(resp)
                });

                let _ = http1::Builder::new()
                    .serve_connection(TokioIo::new(stream), service)
                    .await;
            });
        }
    });

    addr
}

/// Local address nothing listens on.
pub async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

pub async fn get(addr: SocketAddr, path: &str) -> (StatusCode, HeaderMap, String) {
    let client: Client<HttpConnector, Empty<Bytes>> =
        Client::builder(TokioExecutor::new()).build_http();

    let uri: Uri = format!("http://{addr}{path}").parse().unwrap();
    let resp = client.get(uri).await.unwrap();

    let status = resp.status();
    let headers = resp.headers().clone();
    let body = resp.into_body().collect().await.unwrap().to_bytes();

    (status, headers, String::from_utf8(body.to_vec()).unwrap())
}
