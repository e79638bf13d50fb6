use std::{
    net::{IpAddr, SocketAddr},
    time::Instant,
};

use http::{header, HeaderMap, HeaderValue, Request, Response, StatusCode, Uri};
use http_body_util::{Either, Full};
use hyper::body::Incoming;
use hyper_tls::HttpsConnector;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use tracing::{debug, warn};

use crate::{metrics, server::ServerBody};

pub type HttpClient = Client<HttpsConnector<HttpConnector>, Incoming>;

// Headers meaningful for a single connection only.
const HOP_HEADERS: &[&str] = &[
    "connection",
    "proxy-connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// Shared upstream client. It speaks both plain http and https.
pub fn build_client(max_idle_per_host: usize) -> HttpClient {
    Client::builder(TokioExecutor::new())
        .pool_max_idle_per_host(max_idle_per_host)
        .build(HttpsConnector::new())
}

/// Forwards requests to a single upstream base url and relays the response.
pub struct ReverseProxy {
    target: Uri,
    client: HttpClient,
}

impl ReverseProxy {
    pub fn new(target: Uri, client: HttpClient) -> Self {
        Self { target, client }
    }

    pub fn target(&self) -> &Uri {
        &self.target
    }

    /// Never fails: upstream errors turn into `502 Bad Gateway`.
    /// `label` identifies the upstream in logs and metrics.
    pub async fn serve(
        &self,
        mut req: Request<Incoming>,
        client_addr: SocketAddr,
        label: &str,
    ) -> Response<ServerBody> {
        if let Err(e) = self.prepare_request(&mut req, client_addr.ip()) {
            warn!("can't build request for upstream {label}: {e}");
            metrics::UPSTREAM_ERRORS_COUNT
                .with_label_values(&[label])
                .inc();
            return bad_gateway();
        }

        let start = Instant::now();
        let response = self.client.request(req).await;
        metrics::UPSTREAM_TIMINGS_SECONDS
            .with_label_values(&[label])
            .observe(start.elapsed().as_secs_f64());

        match response {
            Err(e) => {
                warn!("upstream {label} error: {e}");
                metrics::UPSTREAM_ERRORS_COUNT
                    .with_label_values(&[label])
                    .inc();
                bad_gateway()
            }
            Ok(mut response) => {
                debug!("upstream {} response {}", label, response.status());
                metrics::UPSTREAM_REQUESTS_COUNT
                    .with_label_values(&[label])
                    .inc();

                // NOTE: the body is still streaming at this point.
                remove_hop_headers(response.headers_mut());
                response.map(Either::Left)
            }
        }
    }

    fn prepare_request(
        &self,
        req: &mut Request<Incoming>,
        client_ip: IpAddr,
    ) -> Result<(), http::Error> {
        *req.uri_mut() = join_uri(&self.target, req.uri())?;

        let headers = req.headers_mut();
        remove_hop_headers(headers);
        append_forwarded_for(headers, client_ip);

        Ok(())
    }
}

fn bad_gateway() -> Response<ServerBody> {
    let mut resp = Response::new(Either::Right(Full::default()));
    *resp.status_mut() = StatusCode::BAD_GATEWAY;
    resp
}

/// Puts the request path under the target base path and merges both queries.
pub fn join_uri(target: &Uri, uri: &Uri) -> Result<Uri, http::Error> {
    let path = join_paths(target.path(), uri.path());
    let query = match (target.query().unwrap_or(""), uri.query().unwrap_or("")) {
        ("", query) | (query, "") => query.to_owned(),
        (a, b) => format!("{a}&{b}"),
    };

    let path_and_query = if query.is_empty() {
        path
    } else {
        format!("{path}?{query}")
    };

    let mut builder = Uri::builder().path_and_query(path_and_query);
    if let Some(scheme) = target.scheme() {
        builder = builder.scheme(scheme.clone());
    }
    if let Some(authority) = target.authority() {
        builder = builder.authority(authority.clone());
    }

    builder.build()
}

fn join_paths(a: &str, b: &str) -> String {
    match (a.ends_with('/'), b.starts_with('/')) {
        (true, true) => format!("{a}{}", &b[1..]),
        (false, false) => format!("{a}/{b}"),
        _ => format!("{a}{b}"),
    }
}

fn remove_hop_headers(headers: &mut HeaderMap) {
    let listed = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|v| v.trim().to_ascii_lowercase())
        .filter(|v| !v.is_empty())
        .collect::<Vec<_>>();

    for name in &listed {
        headers.remove(name.as_str());
    }
    for name in HOP_HEADERS {
        headers.remove(*name);
    }
}

fn append_forwarded_for(headers: &mut HeaderMap, client_ip: IpAddr) {
    // Prior values are kept byte for byte, even when they are not ASCII.
    let mut value = Vec::new();
    for prior in headers.get_all(X_FORWARDED_FOR) {
        value.extend_from_slice(prior.as_bytes());
        value.extend_from_slice(b", ");
    }
    value.extend_from_slice(client_ip.to_string().as_bytes());

    if let Ok(value) = HeaderValue::from_bytes(&value) {
        headers.insert(X_FORWARDED_FOR, value);
    }
}
