//! RabbitMQ plumbing shared by the server and the workers, plus the
//! publisher seam the orchestrator talks to so the core stays testable
//! without a broker.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use lapin::{
    options::{BasicConsumeOptions, BasicPublishOptions, BasicQosOptions, QueueDeclareOptions},
    protocol::basic::AMQPProperties,
    types::{AMQPValue, FieldTable},
    Channel, Connection, ConnectionProperties, Consumer, Result as LapinResult,
};
use tokio::time::sleep;
use tracing::{error, info};

use crate::error::{DocPipeError, Result};

/// Maximum delivery attempts before the broker diverts a message to the
/// dead-letter queue. Enforced through queue declaration, not business logic.
pub const MAX_DELIVERY_ATTEMPTS: i32 = 5;

pub const DEAD_LETTER_SUFFIX: &str = ".dead-letter";

/// What the worker tells the broker about a delivery once handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckDecision {
    /// Remove from the queue: success, or a failure that can never succeed.
    Ack,
    /// Return to the queue for redelivery; dead-lettered after the bounded
    /// attempt count.
    Nack,
}

/// Connect to RabbitMQ with bounded retry.
pub async fn connect_rabbitmq(addr: &str) -> LapinResult<Connection> {
    let options = ConnectionProperties::default()
        .with_executor(tokio_executor_trait::Tokio::current())
        .with_reactor(tokio_reactor_trait::Tokio);

    let mut attempts = 0;
    loop {
        match Connection::connect(addr, options.clone()).await {
            Ok(conn) => {
                info!("Successfully connected to RabbitMQ at {}", addr);
                return Ok(conn);
            }
            Err(e) => {
                attempts += 1;
                error!(
                    attempt = attempts,
                    error = %e,
                    "Failed to connect to RabbitMQ. Retrying in 5 seconds..."
                );
                if attempts >= 5 {
                    return Err(e);
                }
                sleep(Duration::from_secs(5)).await;
            }
        }
    }
}

/// Declare a durable work queue with bounded redelivery and a companion
/// dead-letter queue (`<name>.dead-letter`). Quorum queues track delivery
/// counts server-side; once `x-delivery-limit` is exceeded the message is
/// routed to the dead-letter queue via the default exchange.
pub async fn declare_work_queue(channel: &Channel, queue: &str) -> Result<()> {
    let dead_letter_queue = format!("{queue}{DEAD_LETTER_SUFFIX}");

    channel
        .queue_declare(
            &dead_letter_queue,
            QueueDeclareOptions {
                durable: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await
        .map_err(|e| {
            DocPipeError::QueueError(format!(
                "Failed to declare dead-letter queue '{dead_letter_queue}': {e}"
            ))
        })?;

    let mut args = FieldTable::default();
    args.insert("x-queue-type".into(), AMQPValue::LongString("quorum".into()));
    args.insert(
        "x-delivery-limit".into(),
        AMQPValue::LongInt(MAX_DELIVERY_ATTEMPTS),
    );
    args.insert(
        "x-dead-letter-exchange".into(),
        AMQPValue::LongString("".into()),
    );
    args.insert(
        "x-dead-letter-routing-key".into(),
        AMQPValue::LongString(dead_letter_queue.into()),
    );

    channel
        .queue_declare(
            queue,
            QueueDeclareOptions {
                durable: true,
                ..Default::default()
            },
            args,
        )
        .await
        .map_err(|e| DocPipeError::QueueError(format!("Failed to declare queue '{queue}': {e}")))?;

    Ok(())
}

/// Declare a plain durable queue (no redelivery bound), used for the
/// results feed which is only ever acked.
pub async fn declare_plain_queue(channel: &Channel, queue: &str) -> Result<()> {
    channel
        .queue_declare(
            queue,
            QueueDeclareOptions {
                durable: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await
        .map_err(|e| DocPipeError::QueueError(format!("Failed to declare queue '{queue}': {e}")))?;
    Ok(())
}

/// Set prefetch and start a consumer on `queue`. The consumer tag embeds
/// binary name, pid, and timestamp so concurrent workers are tellable apart
/// in the broker's UI.
pub async fn setup_consumer(
    channel: &Channel,
    queue: &str,
    prefetch_count: u16,
    binary: &str,
) -> Result<Consumer> {
    channel
        .basic_qos(prefetch_count, BasicQosOptions::default())
        .await
        .map_err(|e| DocPipeError::QueueError(format!("Failed to set QoS: {e}")))?;

    let consumer_tag = format!(
        "{}-{}-{}",
        binary,
        std::process::id(),
        chrono::Utc::now().timestamp()
    );
    let consumer = channel
        .basic_consume(
            queue,
            &consumer_tag,
            BasicConsumeOptions::default(),
            FieldTable::default(),
        )
        .await?;

    Ok(consumer)
}

/// Publisher seam for the orchestrator and the upload flow. The production
/// implementation is AMQP-backed; tests use [`InMemoryTaskQueue`].
#[async_trait]
pub trait TaskPublisher: Send + Sync {
    async fn publish(&self, payload: &[u8]) -> Result<()>;
}

/// Publishes persistent messages to a named queue via the default exchange.
#[derive(Clone)]
pub struct AmqpTaskPublisher {
    channel: Channel,
    queue: String,
}

impl AmqpTaskPublisher {
    pub fn new(channel: Channel, queue: impl Into<String>) -> Self {
        AmqpTaskPublisher {
            channel,
            queue: queue.into(),
        }
    }
}

#[async_trait]
impl TaskPublisher for AmqpTaskPublisher {
    async fn publish(&self, payload: &[u8]) -> Result<()> {
        self.channel
            .basic_publish(
                "",
                &self.queue,
                BasicPublishOptions::default(),
                payload,
                AMQPProperties::default().with_delivery_mode(2),
            )
            .await?
            .await?;
        Ok(())
    }
}

/// In-process queue for tests: published payloads are buffered and can be
/// drained by the test harness in publish order.
#[derive(Clone, Default)]
pub struct InMemoryTaskQueue {
    messages: Arc<Mutex<VecDeque<Vec<u8>>>>,
}

impl InMemoryTaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pop(&self) -> Option<Vec<u8>> {
        self.messages
            .lock()
            .expect("task queue lock poisoned")
            .pop_front()
    }

    pub fn len(&self) -> usize {
        self.messages.lock().expect("task queue lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl TaskPublisher for InMemoryTaskQueue {
    async fn publish(&self, payload: &[u8]) -> Result<()> {
        self.messages
            .lock()
            .expect("task queue lock poisoned")
            .push_back(payload.to_vec());
        Ok(())
    }
}
