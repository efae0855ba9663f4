// src/bin/worker.rs
//
// Consumer worker: runs the antivirus scan consumer and the processing
// consumer against the shared broker, storage, and result repository.

use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use docpipe::antivirus::{AntivirusProvider, ClamAvScanner, EicarScanner};
use docpipe::config::load_processing_config;
use docpipe::config::worker::Args;
use docpipe::processing::ProcessingService;
use docpipe::processor::docai::DocAiClient;
use docpipe::queue::{
    connect_rabbitmq, declare_plain_queue, declare_work_queue, setup_consumer, AmqpTaskPublisher,
};
use docpipe::repository::postgres::{self, PgProcessorResultRepository};
use docpipe::repository::{InMemoryProcessorResultRepository, ProcessorResultRepository};
use docpipe::scan_logic::run_scan_worker;
use docpipe::server::metrics_handler;
use docpipe::storage::BlobStorage;
use docpipe::utils::token::{ServiceTokenProvider, TokenConfig};
use docpipe::worker_logic::{build_registry_from_config, run_processing_worker};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing subscriber
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder().with_env_filter(filter).init();

    info!(
        "Loading processing configuration from: {}",
        args.processing_config.display()
    );
    let processing_config = load_processing_config(&args.processing_config)?;
    if args.validate_config {
        info!("Processing configuration is valid.");
        return Ok(());
    }

    // --- Optional: Start Metrics Endpoint ---
    if let Some(port) = args.metrics_port {
        let app = axum::Router::new().route("/metrics", axum::routing::get(metrics_handler));
        let listener_addr = format!("0.0.0.0:{}", port);
        info!(
            "Metrics endpoint will be available at http://{}/metrics",
            listener_addr
        );

        tokio::spawn(async move {
            match tokio::net::TcpListener::bind(&listener_addr).await {
                Ok(listener) => {
                    if let Err(e) = axum::serve(listener, app).await {
                        error!("Metrics server error: {}", e);
                    }
                }
                Err(e) => {
                    error!("Failed to bind metrics server to {}: {}", listener_addr, e);
                }
            }
        });
    }

    info!("Worker starting.");
    info!(
        "Consuming tasks from '{}', scan events from '{}', publishing results to '{}' @ {}",
        args.task_queue, args.scan_queue, args.results_queue, args.amqp_addr
    );
    info!("Prefetch count: {}", args.prefetch_count);

    // 1. Connect to RabbitMQ. Separate channels for the two consumers and
    // the publisher so one stalled operation cannot block the others.
    let conn = connect_rabbitmq(&args.amqp_addr).await?;
    let task_channel = conn.create_channel().await?;
    let scan_channel = conn.create_channel().await?;
    let publish_channel = conn.create_channel().await?;

    declare_work_queue(&task_channel, &args.task_queue).await?;
    declare_work_queue(&scan_channel, &args.scan_queue).await?;
    declare_plain_queue(&publish_channel, &args.results_queue).await?;

    let task_publisher = Arc::new(AmqpTaskPublisher::new(
        publish_channel.clone(),
        args.task_queue.clone(),
    ));
    let result_publisher = Arc::new(AmqpTaskPublisher::new(
        publish_channel.clone(),
        args.results_queue.clone(),
    ));

    // 2. Storage, persistence, antivirus.
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

    let results: Arc<dyn ProcessorResultRepository> = match &args.database_url {
        Some(url) => {
            info!("Using Postgres result repository");
            let pool = postgres::connect(url).await?;
            Arc::new(PgProcessorResultRepository::new(pool))
        }
        None => {
            warn!("No --database-url configured; using in-memory result repository");
            Arc::new(InMemoryProcessorResultRepository::new())
        }
    };

    let antivirus: Arc<dyn AntivirusProvider> = match &args.clamav_addr {
        Some(addr) => {
            info!("Using ClamAV scanner at {}", addr);
            Arc::new(ClamAvScanner::new(addr.clone()))
        }
        None => {
            warn!("No --clamav-addr configured; using the EICAR fake scanner");
            Arc::new(EicarScanner)
        }
    };

    // 3. Processor registry and orchestrator core.
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

    let service = Arc::new(ProcessingService::new(
        task_publisher,
        result_publisher,
        registry,
        results,
        Arc::clone(&storage),
    ));

    // 4. Run both consumers; either one stopping is fatal for the process.
    let task_consumer =
        setup_consumer(&task_channel, &args.task_queue, args.prefetch_count, "worker").await?;
    let scan_consumer = setup_consumer(
        &scan_channel,
        &args.scan_queue,
        args.prefetch_count,
        "scan-worker",
    )
    .await?;

    let processing_handle = tokio::spawn(run_processing_worker(task_consumer, service));
    let scan_handle = tokio::spawn(run_scan_worker(scan_consumer, storage, antivirus));

    let (processing_result, scan_result) = tokio::try_join!(processing_handle, scan_handle)?;
    processing_result?;
    scan_result?;

    Ok(())
}
