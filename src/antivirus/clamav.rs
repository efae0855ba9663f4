//! ClamAV-backed antivirus provider, speaking the clamd TCP protocol.

use std::str;
use std::time::Duration;

use async_trait::async_trait;
use clamav_client::{clean, Tcp};
use tracing::{debug, warn};

use crate::error::{DocPipeError, Result};

use super::{AntivirusProvider, ScanOutcome};

/// Scans buffers against a clamd daemon over TCP. The scan itself is
/// synchronous socket I/O, so it runs on the blocking pool with a bounded
/// timeout.
pub struct ClamAvScanner {
    address: String,
    timeout: Duration,
}

impl ClamAvScanner {
    /// `address` is `host:port`, typically port 3310.
    pub fn new(address: impl Into<String>) -> Self {
        ClamAvScanner {
            address: address.into(),
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_timeout(address: impl Into<String>, timeout: Duration) -> Self {
        ClamAvScanner {
            address: address.into(),
            timeout,
        }
    }
}

#[async_trait]
impl AntivirusProvider for ClamAvScanner {
    async fn scan(&self, data: &[u8], label: &str) -> Result<ScanOutcome> {
        debug!(address = %self.address, label, "Starting ClamAV scan");

        let data = data.to_vec();
        let address = self.address.clone();

        let scan_task = tokio::task::spawn_blocking(move || {
            let connection = Tcp {
                host_address: address.as_str(),
            };
            clamav_client::scan_buffer(data.as_slice(), connection, None)
        });

        let response = tokio::time::timeout(self.timeout, scan_task)
            .await
            .map_err(|_| {
                DocPipeError::Antivirus(format!(
                    "ClamAV scan timed out after {} seconds",
                    self.timeout.as_secs()
                ))
            })?
            .map_err(|e| DocPipeError::Antivirus(format!("ClamAV scan task failed: {e}")))?
            .map_err(|e| DocPipeError::Antivirus(format!("ClamAV scan error: {e}")))?;

        let is_clean = clean(&response)
            .map_err(|e| DocPipeError::Antivirus(format!("Unknown scan result: {e}")))?;

        if is_clean {
            return Ok(ScanOutcome {
                clean: true,
                message: "Clean".to_string(),
            });
        }

        let virus_name = virus_name_from_response(&response);
        warn!(label, virus = %virus_name, "ClamAV detected a virus");
        Ok(ScanOutcome {
            clean: false,
            message: virus_name,
        })
    }
}

// clamd replies `stream: <name> FOUND` for infected buffers.
fn virus_name_from_response(response: &[u8]) -> String {
    let text = str::from_utf8(response).unwrap_or("unknown").trim();
    if text.contains("FOUND") {
        text.split(':')
            .nth(1)
            .unwrap_or("unknown")
            .split_whitespace()
            .next()
            .unwrap_or("unknown")
            .to_string()
    } else {
        "unknown".to_string()
    }
}
