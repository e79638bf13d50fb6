mod app_state;
mod backend;
mod balancer;
mod config;
mod healthcheck;
mod metrics;
mod policy;
mod proxy;
mod result;
mod server;
mod utils;

use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
    sync::Arc,
};

use app_state::AppState;
use backend::{Backend, MonitoredBackend, ProxyBackend};
use balancer::Balancer;
use config::AppConfig;
use healthcheck::Healthcheck;
use policy::PolicyType;
use result::Result;
use server::Server;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() {
    init_logging();

    // Configuration problems are fatal: nothing is served on a partial setup.
    if let Err(e) = run().await {
        error!("{e}");
        report_fatal(&mut io::stderr().lock(), &e);
        std::process::exit(1);
    }
}

// Written straight to stderr so the diagnostic survives any RUST_LOG filter.
fn report_fatal(out: &mut impl Write, e: &result::Error) {
    let _ = writeln!(out, "error: {e}");
}

async fn run() -> Result<()> {
    let args = parse_args()?;
    let config = read_config(&args.config_path)?;

    let client = proxy::build_client(config.server.client_max_idle_per_host);

    let mut backends: Vec<Arc<dyn Backend>> = Vec::new();
    let mut monitored = Vec::new();
    for backend in &config.backends {
        let backend = ProxyBackend::new(&backend.address, client.clone())?;
        if config.healthcheck.is_some() {
            let backend = Arc::new(MonitoredBackend::new(backend));
            monitored.push(backend.clone());
            backends.push(backend);
        } else {
            backends.push(Arc::new(backend));
        }
    }

    if config.balancer.policy == PolicyType::LiveRoundRobin && config.healthcheck.is_none() {
        warn!("live_round_robin policy without [healthcheck]: every backend stays alive");
    }

    let balancer = Balancer::new(config.balancer.clone(), backends)?;
    for backend in balancer.backends() {
        info!("backend {}", backend.address());
    }

    let state = Arc::new(AppState { balancer });

    if let Some(healthcheck) = config.healthcheck.clone() {
        let healthcheck = Healthcheck::new(healthcheck, monitored)?;
        tokio::spawn(async move { healthcheck.run().await });
    }

    if let Some(metrics_addr) = &config.server.metrics_addr {
        let listener = TcpListener::bind(metrics_addr).await?;
        info!("metrics are served on http://{}", listener.local_addr()?);

        tokio::spawn(metrics::serve(listener));
    }

    let server = Server::new(config.server.clone());
    server.run(state).await
}

fn init_logging() {
    // RUST_LOG overrides the default, e.g. RUST_LOG=rr_balancer=debug
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();
}

struct Args {
    config_path: PathBuf,
}

fn parse_args() -> Result<Args> {
    let mut config_path = None;

    // a single option doesn't justify clap
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match &arg[..] {
            "-c" | "--config" => {
                let value = args.next().ok_or("config file expected")?;
                config_path = Some(PathBuf::from(value));
            }
            other => return Err(format!("unknown argument '{other}'").into()),
        }
    }

    let config_path = config_path.ok_or("provide config file with '-c' option")?;

    Ok(Args { config_path })
}

fn read_config(config_path: &Path) -> Result<AppConfig> {
    let config = fs::read_to_string(config_path)
        .map_err(|e| format!("can't read {}: {e}", config_path.display()))?;

    AppConfig::parse(&config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_fatal() {
        let mut out = Vec::new();
        let e: result::Error = config::Error::NoBackends.into();

        report_fatal(&mut out, &e);

        assert_eq!(
            String::from_utf8(out).unwrap(),
            "error: at least one backend must be configured\n"
        );
    }

    #[test]
    fn test_missing_config_file() {
        let e = match read_config(Path::new("/nonexistent/rr-balancer.toml")) {
            Ok(_) => panic!("config must not load"),
            Err(e) => e,
        };

        let mut out = Vec::new();
        report_fatal(&mut out, &e);

        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("error: can't read /nonexistent/rr-balancer.toml"));
    }
}
