//! TCP connect probe

use std::time::Duration;

use async_trait::async_trait;
use eyre::Result;
use serde::Serialize;
use serde_json::Value;
use tokio::net::TcpStream;
use tracing::debug;

use crate::domain::Task;

/// Ports probed when none are requested
pub const COMMON_PORTS: &[u16] = &[
    21, 22, 23, 25, 53, 80, 110, 111, 135, 139, 143, 443, 445, 993, 995, 1723, 3306, 3389, 5900, 8080, 8443,
];

/// Well-known service name for a port
pub fn service_name(port: u16) -> &'static str {
    match port {
        21 => "ftp",
        22 => "ssh",
        23 => "telnet",
        25 => "smtp",
        53 => "domain",
        80 => "http",
        110 => "pop3",
        111 => "rpcbind",
        135 => "msrpc",
        139 => "netbios-ssn",
        143 => "imap",
        443 => "https",
        445 => "microsoft-ds",
        993 => "imaps",
        995 => "pop3s",
        1723 => "pptp",
        3306 => "mysql",
        3389 => "ms-wbt-server",
        5900 => "vnc",
        8080 => "http-proxy",
        8443 => "https-alt",
        _ => "unknown",
    }
}

#[derive(Debug, Serialize)]
struct PortReport<'a> {
    host: &'a str,
    port: u16,
    open: bool,
    service: &'static str,
}

/// Check whether a TCP port accepts connections
///
/// A refused or unanswered connection is a successful probe with `open: false`.
#[derive(Debug, Clone)]
pub struct PortProbe {
    pub host: String,
    pub port: u16,
    pub connect_timeout: Duration,
}

impl PortProbe {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            connect_timeout: Duration::from_secs(1),
        }
    }

    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    pub fn label(&self) -> String {
        format!("port:{}", self.port)
    }
}

#[async_trait]
impl Task for PortProbe {
    async fn run(&self) -> Result<Value> {
        let connect = TcpStream::connect((self.host.as_str(), self.port));
        let open = match tokio::time::timeout(self.connect_timeout, connect).await {
            Ok(Ok(_stream)) => true,
            Ok(Err(e)) => {
                debug!(host = %self.host, port = self.port, error = %e, "PortProbe::run: connect failed");
                false
            }
            Err(_) => {
                debug!(host = %self.host, port = self.port, "PortProbe::run: connect timed out");
                false
            }
        };

        Ok(serde_json::to_value(PortReport {
            host: &self.host,
            port: self.port,
            open,
            service: service_name(self.port),
        })?)
    }
}
