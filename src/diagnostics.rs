//! Best-effort diagnostic broadcast of focus changes
//!
//! Each announcement opens a short-lived TCP connection, writes one JSON line and
//! closes. Nobody has to listen: every failure is logged at debug level and
//! otherwise ignored.

use serde::Serialize;
use std::io;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::{debug, trace};

use crate::config::DiagnosticsConfig;
use crate::host::InstrumentDescriptor;

/// What changed, as written to the diagnostic listener
#[derive(Debug, Clone, Serialize)]
pub struct FocusReport {
    /// `focus`, `release` or `refresh`
    pub event: &'static str,
    pub track: String,
    pub index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instrument: Option<InstrumentDescriptor>,
}

#[derive(Debug, Clone)]
pub struct DiagnosticBroadcaster {
    address: String,
    timeout: Duration,
}

impl DiagnosticBroadcaster {
    pub fn new(address: impl Into<String>, timeout: Duration) -> Self {
        Self {
            address: address.into(),
            timeout,
        }
    }

    /// Broadcaster for the config, if broadcasting is enabled
    pub fn from_config(config: &DiagnosticsConfig) -> Option<Self> {
        config
            .broadcast
            .then(|| Self::new(config.address.clone(), Duration::from_millis(config.timeout_ms)))
    }

    /// Send the report in the background; never blocks and never fails
    pub fn announce(&self, report: &FocusReport) {
        let line = match serde_json::to_string(report) {
            Ok(line) => line,
            Err(e) => {
                debug!("Failed to serialise focus report: {}", e);
                return;
            }
        };

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            trace!("No runtime available, diagnostic broadcast skipped");
            return;
        };

        let address = self.address.clone();
        let timeout = self.timeout;
        runtime.spawn(async move {
            if let Err(e) = send_line(&address, &line, timeout).await {
                debug!("No diagnostic listener at {}: {}", address, e);
            }
        });
    }
}

async fn send_line(address: &str, line: &str, timeout: Duration) -> io::Result<()> {
    let mut stream = tokio::time::timeout(timeout, TcpStream::connect(address))
        .await
        .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "connect timed out"))??;

    stream.write_all(line.as_bytes()).await?;
    stream.write_all(b"\n").await?;
    stream.shutdown().await
}
