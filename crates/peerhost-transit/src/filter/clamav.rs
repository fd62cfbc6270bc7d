use super::{FilterContext, FilterResult, TransitFilter};
use async_trait::async_trait;
use clamav_client::{clean, Tcp};
use peerhost_core::models::MultipartPart;
use std::str;
use std::time::{Duration, Instant};

const FILTER_ID: &str = "malware-scan";

#[derive(Debug)]
pub enum ScanResult {
    Clean,
    Infected(String),
    Error(String),
}

/// ClamAV daemon client.
#[derive(Clone)]
pub struct ClamAvScanner {
    host: String,
    port: u16,
    timeout_secs: u64,
}

impl ClamAvScanner {
    pub fn new(host: String, port: u16) -> Self {
        Self::with_timeout(host, port, 30)
    }

    pub fn with_timeout(host: String, port: u16, timeout_secs: u64) -> Self {
        Self {
            host,
            port,
            timeout_secs,
        }
    }

    /// Scan in-memory data. The client is synchronous, so it runs in spawn_blocking.
    pub async fn scan_bytes(&self, data: Vec<u8>) -> ScanResult {
        let start = Instant::now();
        let address = format!("{}:{}", self.host, self.port);
        tracing::debug!(address = %address, size_bytes = data.len(), "Starting ClamAV scan");

        let result = tokio::time::timeout(
            Duration::from_secs(self.timeout_secs),
            tokio::task::spawn_blocking(move || {
                let connection = Tcp {
                    host_address: address.as_str(),
                };
                let response = match clamav_client::scan_buffer(data.as_slice(), connection, None) {
                    Ok(response) => response,
                    Err(e) => return ScanResult::Error(format!("ClamAV scan error: {}", e)),
                };
                match clean(&response) {
                    Ok(true) => ScanResult::Clean,
                    Ok(false) => {
                        let text = str::from_utf8(&response).map(str::trim).unwrap_or("unknown");
                        let virus = text
                            .split(':')
                            .nth(1)
                            .and_then(|s| s.split_whitespace().next())
                            .unwrap_or("unknown")
                            .to_string();
                        ScanResult::Infected(virus)
                    }
                    Err(e) => ScanResult::Error(format!("Failed to parse ClamAV response: {}", e)),
                }
            }),
        )
        .await;

        let outcome = match result {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => ScanResult::Error(format!("ClamAV scan task join error: {}", e)),
            Err(_) => ScanResult::Error(format!(
                "ClamAV scan timeout (exceeded {} seconds)",
                self.timeout_secs
            )),
        };

        tracing::info!(
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            outcome = ?outcome,
            "ClamAV scan finished"
        );
        outcome
    }
}

/// Scans payload parts; infected payloads are quarantined.
pub struct MalwareScanFilter {
    scanner: ClamAvScanner,
    fail_closed: bool,
}

impl MalwareScanFilter {
    /// `fail_closed` quarantines payloads that could not be scanned.
    pub fn new(scanner: ClamAvScanner, fail_closed: bool) -> Self {
        Self {
            scanner,
            fail_closed,
        }
    }
}

#[async_trait]
impl TransitFilter for MalwareScanFilter {
    fn id(&self) -> &'static str {
        FILTER_ID
    }

    async fn apply(&self, ctx: &FilterContext<'_>) -> anyhow::Result<FilterResult> {
        if ctx.part != MultipartPart::Payload {
            return Ok(FilterResult::accept(FILTER_ID));
        }

        let data = ctx.read_part().await?;
        match self.scanner.scan_bytes(data).await {
            ScanResult::Clean => Ok(FilterResult::accept(FILTER_ID)),
            ScanResult::Infected(virus) => Ok(FilterResult::quarantine(
                FILTER_ID,
                format!("Payload matched signature {}", virus),
            )),
            ScanResult::Error(e) if self.fail_closed => Ok(FilterResult::quarantine(FILTER_ID, e)),
            ScanResult::Error(e) => {
                tracing::warn!(error = %e, "ClamAV scan failed, continuing (fail-open)");
                Ok(FilterResult::accept(FILTER_ID))
            }
        }
    }
}
