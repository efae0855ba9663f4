//! Antivirus scan worker: consumes object-created events for the unscanned
//! area, scans the bytes, and moves the blob to the scanned or quarantine
//! area.

use std::sync::Arc;

use futures::StreamExt;
use lapin::{
    message::Delivery,
    options::{BasicAckOptions, BasicNackOptions},
    Consumer,
};
use tracing::{debug, error, warn};

use crate::antivirus::AntivirusProvider;
use crate::data_model::ObjectCreatedEvent;
use crate::error::{DocPipeError, Result};
use crate::queue::AckDecision;
use crate::storage::BlobStorage;
use crate::utils::prometheus_metrics::*;

/// Decide what to do with one delivered object-created event.
///
/// Acked: foreign-bucket events (stray subscriptions), malformed payloads
/// (they can never succeed), and objects already moved by a previous
/// delivery of the same event. Nacked: scan or storage failures, so the
/// broker redelivers.
pub async fn handle_object_event(
    payload: &[u8],
    storage: &BlobStorage,
    antivirus: &dyn AntivirusProvider,
) -> AckDecision {
    SCAN_EVENTS_TOTAL.inc();
    let timer = SCAN_DURATION_SECONDS.start_timer();

    let event: ObjectCreatedEvent = match serde_json::from_slice(payload) {
        Ok(event) => event,
        Err(e) => {
            error!(
                error = %e,
                payload = %String::from_utf8_lossy(payload),
                "Failed to deserialize object-created event"
            );
            SCAN_EVENT_DESERIALIZATION_ERRORS_TOTAL.inc();
            timer.observe_duration();
            return AckDecision::Ack;
        }
    };

    if event.bucket != storage.unscanned_area() {
        debug!("Ignoring message from bucket {}", event.bucket);
        SCAN_EVENTS_IGNORED_TOTAL.inc();
        timer.observe_duration();
        return AckDecision::Ack;
    }

    let decision = match scan_and_route(&event.name, storage, antivirus).await {
        Ok(()) => AckDecision::Ack,
        Err(DocPipeError::NotFound(_)) => {
            // Already scanned, quarantined, or gone: a race with a previous
            // delivery of the same event. Treated as handled.
            warn!(
                object = %event.name,
                "Object absent from unscanned area, treating event as already handled"
            );
            AckDecision::Ack
        }
        Err(e) => {
            error!(object = %event.name, error = %e, "Error scanning file");
            SCAN_FAILURES_TOTAL.inc();
            AckDecision::Nack
        }
    };

    timer.observe_duration();
    decision
}

async fn scan_and_route(
    name: &str,
    storage: &BlobStorage,
    antivirus: &dyn AntivirusProvider,
) -> Result<()> {
    debug!("Scanning file: {}", name);

    let file = storage.unscanned_file_data(name).await?;
    let outcome = antivirus.scan(&file.bytes, name).await?;

    if outcome.clean {
        debug!("File {} is clean", name);
        storage.confirm_clean_file(name).await?;
        SCANS_CLEAN_TOTAL.inc();
    } else {
        warn!(message = %outcome.message, "File {} is infected", name);
        storage.quarantine_file(name).await?;
        SCANS_INFECTED_TOTAL.inc();
    }
    Ok(())
}

async fn settle(delivery: Delivery, decision: AckDecision) {
    match decision {
        AckDecision::Ack => {
            if let Err(e) = delivery.ack(BasicAckOptions::default()).await {
                error!(error = %e, "Failed to ack scan event");
            }
        }
        AckDecision::Nack => {
            let options = BasicNackOptions {
                requeue: true,
                ..Default::default()
            };
            if let Err(e) = delivery.nack(options).await {
                error!(error = %e, "Failed to nack scan event");
            }
        }
    }
}

/// Consume object-created events until the stream ends, handling each
/// delivery on its own task.
pub async fn run_scan_worker(
    mut consumer: Consumer,
    storage: Arc<BlobStorage>,
    antivirus: Arc<dyn AntivirusProvider>,
) -> Result<()> {
    while let Some(delivery_result) = consumer.next().await {
        match delivery_result {
            Ok(delivery) => {
                let storage = Arc::clone(&storage);
                let antivirus = Arc::clone(&antivirus);
                tokio::spawn(async move {
                    let decision =
                        handle_object_event(&delivery.data, &storage, antivirus.as_ref()).await;
                    settle(delivery, decision).await;
                });
            }
            Err(e) => {
                error!(error = %e, "Error receiving scan event. Scan worker stopping.");
                return Err(DocPipeError::QueueError(
                    "Scan consumer stream error".to_string(),
                ));
            }
        }
    }

    warn!("Scan consumer stream ended.");
    Ok(())
}
