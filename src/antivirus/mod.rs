//! Antivirus providers. The scan worker only sees the [`AntivirusProvider`]
//! trait; the concrete engine is swappable.

use async_trait::async_trait;
use tracing::warn;

use crate::error::Result;

mod clamav;
pub use clamav::ClamAvScanner;

/// The result of a virus scan. `message` carries the virus name when the
/// data is infected, "Clean" otherwise.
#[derive(Debug, Clone)]
pub struct ScanOutcome {
    pub clean: bool,
    pub message: String,
}

/// A capability that can scan document bytes for malware. Failures of the
/// engine or its transport surface as errors; an infected file is a normal
/// outcome, not an error.
#[async_trait]
pub trait AntivirusProvider: Send + Sync {
    async fn scan(&self, data: &[u8], label: &str) -> Result<ScanOutcome>;
}

pub const EICAR_TEST_STRING: &str = "EICAR-STANDARD-ANTIVIRUS-TEST-FILE";

/// Fake scanner used when no ClamAV daemon is configured. Flags only the
/// EICAR test string so the quarantine path stays exercisable in
/// environments without a real engine.
pub struct EicarScanner;

#[async_trait]
impl AntivirusProvider for EicarScanner {
    async fn scan(&self, data: &[u8], label: &str) -> Result<ScanOutcome> {
        warn!(
            "Real malware scanner is disabled. Using fake scanner for document {}",
            label
        );

        let text = String::from_utf8_lossy(data);
        if text.contains(EICAR_TEST_STRING) {
            return Ok(ScanOutcome {
                clean: false,
                message: EICAR_TEST_STRING.to_string(),
            });
        }

        Ok(ScanOutcome {
            clean: true,
            message: "Clean".to_string(),
        })
    }
}
