use std::convert::Infallible;

use http::{Request, Response, StatusCode};
use http_body_util::Full;
use hyper::{
    body::{Bytes, Incoming},
    server::conn::http1,
    service::service_fn,
};
use hyper_util::rt::TokioIo;
use lazy_static::lazy_static;
use prometheus::{
    opts, register_histogram_vec, register_int_counter_vec, register_int_gauge_vec, Encoder,
    HistogramVec, IntCounterVec, IntGaugeVec, TextEncoder,
};
use tokio::net::TcpListener;
use tracing::{debug, error, warn};

use crate::utils;

lazy_static! {
    pub static ref UPSTREAM_REQUESTS_COUNT: IntCounterVec = register_int_counter_vec!(
        opts!("upstream_requests_count", "requests answered by upstream"),
        &["backend"]
    )
    .expect("Can't create metric");
    pub static ref UPSTREAM_ERRORS_COUNT: IntCounterVec = register_int_counter_vec!(
        opts!("upstream_errors_count", "requests failed to reach upstream"),
        &["backend"]
    )
    .expect("Can't create metric");
    pub static ref UPSTREAM_TIMINGS_SECONDS: HistogramVec = register_histogram_vec!(
        "upstream_timings_seconds",
        "time to upstream response headers",
        &["backend"],
        vec![0.0001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0],
    )
    .expect("Can't create metric");
    pub static ref BACKEND_ALIVE: IntGaugeVec = register_int_gauge_vec!(
        opts!("backend_alive", "1 if the last healthcheck succeeded"),
        &["backend"]
    )
    .expect("Can't create metric");
}

pub fn gather() -> crate::Result<Vec<u8>> {
    let mut buffer = Vec::new();

    let encoder = TextEncoder::new();
    encoder.encode(&prometheus::gather(), &mut buffer)?;

    Ok(buffer)
}

/// Serves the text exposition format at any path. It runs on its own
/// listener; the proxy port never answers for metrics itself.
pub async fn serve(listener: TcpListener) {
    let listener = &listener;
    loop {
        let (stream, addr) = utils::net::next_connection(move || listener.accept()).await;

        tokio::spawn(async move {
            let io = TokioIo::new(stream);
            let result = http1::Builder::new()
                .serve_connection(io, service_fn(handle_metrics))
                .await;
            if let Err(err) = result {
                error!("error during handling metrics client {addr}: {err:?}");
            }
        });
    }
}

async fn handle_metrics(_req: Request<Incoming>) -> Result<Response<Full<Bytes>>, Infallible> {
    let resp = match gather() {
        Ok(data) => {
            let mut resp = Response::new(Full::new(Bytes::from(data)));
            resp.headers_mut().insert(
                http::header::CONTENT_TYPE,
                http::HeaderValue::from_static("text/plain; version=0.0.4"),
            );
            resp
        }
        Err(e) => {
            warn!("can't gather metrics: {e}");
            let mut resp = Response::new(Full::default());
            *resp.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            resp
        }
    };

    debug!("return metrics {}", resp.status());
    Ok(resp)
}
