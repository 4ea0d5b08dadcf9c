//! Host name resolution probe

use async_trait::async_trait;
use eyre::{Context, Result};
use serde_json::{Value, json};
use tokio::net::lookup_host;
use tracing::debug;

use crate::domain::Task;

/// Resolve a host to its addresses
#[derive(Debug, Clone)]
pub struct ResolveProbe {
    pub host: String,
}

impl ResolveProbe {
    pub fn new(host: impl Into<String>) -> Self {
        Self { host: host.into() }
    }
}

#[async_trait]
impl Task for ResolveProbe {
    async fn run(&self) -> Result<Value> {
        let addrs = lookup_host((self.host.as_str(), 0))
            .await
            .with_context(|| format!("Failed to resolve {}", self.host))?;

        let mut addresses: Vec<String> = addrs.map(|addr| addr.ip().to_string()).collect();
        addresses.sort();
        addresses.dedup();
        debug!(host = %self.host, count = addresses.len(), "ResolveProbe::run: resolved");

        Ok(json!({
            "host": self.host,
            "addresses": addresses,
        }))
    }
}
