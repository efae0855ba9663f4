//! Processing worker: consumes queued processing requests, runs them
//! through the orchestrator's synchronous core, and maps every outcome to a
//! deterministic ack/nack decision.

use std::sync::Arc;

use futures::StreamExt;
use lapin::{
    message::Delivery,
    options::{BasicAckOptions, BasicNackOptions},
    Consumer,
};
use tracing::{debug, error, info, warn};

use crate::config::processors::{ProcessingConfig, ProcessorConfig};
use crate::data_model::ProcessingRequestEnvelope;
use crate::error::{DocPipeError, Result};
use crate::processing::ProcessingService;
use crate::processor::docai::DocAiClient;
use crate::processor::{
    DocumentProcessor, DocumentQualityProcessor, IdProofingProcessor, ProcessorRegistry,
};
use crate::queue::AckDecision;
use crate::storage::BlobStorage;
use crate::utils::prometheus_metrics::*;

/// Build the processor set from configuration.
pub fn build_registry_from_config(
    config: &ProcessingConfig,
    storage: Arc<BlobStorage>,
    client: Arc<DocAiClient>,
) -> ProcessorRegistry {
    let mut processors: Vec<Arc<dyn DocumentProcessor>> = Vec::new();
    info!("Building processor registry from configuration...");

    for processor_config in &config.processors {
        let processor: Arc<dyn DocumentProcessor> = match processor_config {
            ProcessorConfig::DocumentQuality(params) => {
                debug!(params = ?params, "Adding DocumentQualityProcessor");
                Arc::new(DocumentQualityProcessor::new(
                    Arc::clone(&storage),
                    Arc::clone(&client),
                    params.backend_processor_id.clone(),
                ))
            }
            ProcessorConfig::IdProofing(params) => {
                debug!(params = ?params, "Adding IdProofingProcessor");
                Arc::new(IdProofingProcessor::new(
                    Arc::clone(&storage),
                    Arc::clone(&client),
                    params.backend_processor_id.clone(),
                ))
            }
        };
        info!("Added processor: {}", processor_config.name());
        processors.push(processor);
    }

    ProcessorRegistry::new(processors)
}

/// Decide what to do with one delivered processing request.
///
/// Malformed payloads are acked and dropped: a message that cannot parse can
/// never succeed, so redelivering it only burns attempts. Unretryable
/// failures are acked (the terminal row was persisted inside
/// `process_request` where applicable); retryable failures are nacked for
/// redelivery; transport failures are nacked so the broker redelivers once
/// the dependency recovers.
pub async fn handle_processing_delivery(
    payload: &[u8],
    service: &ProcessingService,
) -> AckDecision {
    let envelope: ProcessingRequestEnvelope = match serde_json::from_slice(payload) {
        Ok(envelope) => envelope,
        Err(e) => {
            error!(
                error = %e,
                payload = %String::from_utf8_lossy(payload),
                "Failed to deserialize processing request"
            );
            TASK_DESERIALIZATION_ERRORS_TOTAL.inc();
            return AckDecision::Ack;
        }
    };

    match service
        .process_request(&envelope.document_id, &envelope.request)
        .await
    {
        Ok(result) => {
            debug!(
                processor_id = %result.processor_id,
                document_id = %envelope.document_id,
                "Processing request completed"
            );
            TASKS_PROCESSED_TOTAL.inc();
            AckDecision::Ack
        }
        Err(DocPipeError::Unretryable(message)) => {
            error!(
                document_id = %envelope.document_id,
                processor_id = %envelope.request.processor_id,
                error = %message,
                "Processing request failed terminally"
            );
            TASKS_UNPROCESSABLE_TOTAL.inc();
            AckDecision::Ack
        }
        Err(DocPipeError::Retryable(message)) => {
            warn!(
                document_id = %envelope.document_id,
                processor_id = %envelope.request.processor_id,
                error = %message,
                "Processing request will be retried"
            );
            TASKS_RETRIED_TOTAL.inc();
            AckDecision::Nack
        }
        Err(DocPipeError::SerializationError { source }) => {
            // Serialization of the terminal result is deterministic; a
            // redelivery would fail the same way.
            error!(
                document_id = %envelope.document_id,
                error = %source,
                "Failed to serialize processing result"
            );
            TASKS_UNPROCESSABLE_TOTAL.inc();
            AckDecision::Ack
        }
        Err(e) => {
            error!(
                document_id = %envelope.document_id,
                error = %e,
                "Transport failure while processing request"
            );
            TASKS_RETRIED_TOTAL.inc();
            AckDecision::Nack
        }
    }
}

async fn process_single_delivery(delivery: Delivery, service: Arc<ProcessingService>) {
    ACTIVE_PROCESSING_TASKS.inc();
    let timer = TASK_PROCESSING_DURATION_SECONDS.start_timer();

    let decision = handle_processing_delivery(&delivery.data, &service).await;

    match decision {
        AckDecision::Ack => {
            if let Err(e) = delivery.ack(BasicAckOptions::default()).await {
                error!(error = %e, "Failed to ack task message");
            }
        }
        AckDecision::Nack => {
            let options = BasicNackOptions {
                requeue: true,
                ..Default::default()
            };
            if let Err(e) = delivery.nack(options).await {
                error!(error = %e, "Failed to nack task message");
            }
        }
    }

    timer.observe_duration();
    ACTIVE_PROCESSING_TASKS.dec();
}

/// Consume processing requests until the stream ends, handling each delivery
/// on its own task.
pub async fn run_processing_worker(
    mut consumer: Consumer,
    service: Arc<ProcessingService>,
) -> Result<()> {
    while let Some(delivery_result) = consumer.next().await {
        match delivery_result {
            Ok(delivery) => {
                let service = Arc::clone(&service);
                tokio::spawn(async move {
                    process_single_delivery(delivery, service).await;
                });
            }
            Err(e) => {
                error!(error = %e, "Error receiving task message. Worker stopping.");
                return Err(DocPipeError::QueueError(
                    "Consumer stream error".to_string(),
                ));
            }
        }
    }

    info!("Consumer stream ended.");
    Ok(())
}
