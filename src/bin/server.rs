// src/bin/server.rs
//
// HTTP server and orchestrator: accepts uploads, publishes scan events and
// processing requests, serves statuses and results.

use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use docpipe::config::server::Args;
use docpipe::config::load_processing_config;
use docpipe::processing::ProcessingService;
use docpipe::processor::docai::DocAiClient;
use docpipe::queue::{
    connect_rabbitmq, declare_plain_queue, declare_work_queue, AmqpTaskPublisher,
};
use docpipe::repository::postgres::{self, PgDocumentRepository, PgProcessorResultRepository};
use docpipe::repository::{
    DocumentRepository, InMemoryDocumentRepository, InMemoryProcessorResultRepository,
    ProcessorResultRepository,
};
use docpipe::server::{router, AppState};
use docpipe::storage::BlobStorage;
use docpipe::utils::token::{ServiceTokenProvider, TokenConfig};
use docpipe::worker_logic::build_registry_from_config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing subscriber
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder().with_env_filter(filter).init();

    info!("Server starting.");
    info!(
        "Publishing processing requests to '{}', results to '{}', scan events to '{}' @ {}",
        args.task_queue, args.results_queue, args.scan_queue, args.amqp_addr
    );

    // 1. Connect to RabbitMQ and declare the queues up front so publishes
    // never race the first consumer.
    let conn = connect_rabbitmq(&args.amqp_addr).await?;
    let channel = conn.create_channel().await?;
    declare_work_queue(&channel, &args.task_queue).await?;
    declare_work_queue(&channel, &args.scan_queue).await?;
    declare_plain_queue(&channel, &args.results_queue).await?;

    let task_publisher = Arc::new(AmqpTaskPublisher::new(
        channel.clone(),
        args.task_queue.clone(),
    ));
    let result_publisher = Arc::new(AmqpTaskPublisher::new(
        channel.clone(),
        args.results_queue.clone(),
    ));
    let scan_publisher = Arc::new(AmqpTaskPublisher::new(
        channel.clone(),
        args.scan_queue.clone(),
    ));

    // 2. Storage and persistence.
    let storage = match &args.storage_root {
        Some(root) => {
            info!("Using filesystem blob storage at {}", root.display());
            Arc::new(BlobStorage::local(root)?)
        }
        None => {
            warn!("No --storage-root configured; using in-memory blob storage");
            Arc::new(BlobStorage::in_memory())
        }
    };

    let (documents, results): (Arc<dyn DocumentRepository>, Arc<dyn ProcessorResultRepository>) =
        match &args.database_url {
            Some(url) => {
                info!("Using Postgres repositories");
                let pool = postgres::connect(url).await?;
                (
                    Arc::new(PgDocumentRepository::new(pool.clone())),
                    Arc::new(PgProcessorResultRepository::new(pool)),
                )
            }
            None => {
                warn!("No --database-url configured; using in-memory repositories");
                (
                    Arc::new(InMemoryDocumentRepository::new()),
                    Arc::new(InMemoryProcessorResultRepository::new()),
                )
            }
        };

    // 3. Processor registry, shared with the orchestrator so enqueue and
    // processing agree on the known processor ids.
    let processing_config = load_processing_config(&args.processing_config)?;
    let token = Arc::new(ServiceTokenProvider::start(TokenConfig::new(
        args.token_issuer.clone(),
        args.token_secret.clone(),
        vec!["document-processing".to_string()],
    ))?);
    let docai_client = Arc::new(DocAiClient::new(args.docai_endpoint.clone(), token)?);
    let registry = Arc::new(build_registry_from_config(
        &processing_config,
        Arc::clone(&storage),
        docai_client,
    ));

    let processing = Arc::new(ProcessingService::new(
        task_publisher,
        result_publisher,
        registry,
        Arc::clone(&results),
        Arc::clone(&storage),
    ));

    let state = Arc::new(AppState {
        storage,
        documents,
        processing,
        scan_events: scan_publisher,
        allowed_content_types: args.allowed_content_types(),
    });

    let app = router(state, args.max_upload_bytes);
    let listener = tokio::net::TcpListener::bind(&args.listen_addr).await?;
    info!("Server listening on {}", args.listen_addr);
    axum::serve(listener, app).await?;

    Ok(())
}
