use serde::Deserialize;

use crate::{backend, balancer, healthcheck, server};

#[derive(Deserialize)]
pub struct AppConfig {
    pub server: server::Config,
    #[serde(default)]
    pub balancer: balancer::Config,
    pub healthcheck: Option<healthcheck::Config>,
    #[serde(default)]
    pub backends: Vec<backend::BackendConfig>,
}

impl AppConfig {
    pub fn parse(data: &str) -> crate::Result<Self> {
        Ok(toml::from_str(data)?)
    }
}

/// Startup errors. All of them are fatal for the process.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("at least one backend must be configured")]
    NoBackends,
    #[error("invalid backend address '{address}': {reason}")]
    InvalidAddress { address: String, reason: String },
    #[error("unsupported scheme '{scheme}' in backend address '{address}'")]
    UnsupportedScheme { address: String, scheme: String },
    #[error("invalid healthcheck path '{path}': {reason}")]
    InvalidHealthcheckPath { path: String, reason: String },
}
