//! The `MessageBus` collaborator seam. Consuming deliveries is inherently
//! broker-specific (manual ack/nack against one `lapin::Channel`), so that
//! plumbing lives in each binary's main loop; what the testable logic in
//! this crate needs injected is the ability to publish an ACK, which is
//! what `AckPublisher` captures.

use crate::schemas::AckV1;
use async_trait::async_trait;
use lapin::{
    options::{
        BasicPublishOptions, ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions,
    },
    types::{AMQPValue, FieldTable},
    BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind,
};
use std::sync::Mutex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BusError {
    #[error("amqp error: {0}")]
    Amqp(#[from] lapin::Error),
}

#[async_trait]
pub trait AckPublisher: Send + Sync {
    async fn publish_ack(&self, ack: &AckV1) -> Result<(), BusError>;
}

/// One durable `direct` queue bound to `routing_key` off `exchange`,
/// declared with `x-queue-type: quorum`, mirroring the idempotent topology
/// setup every collaborator in this system performs on startup.
pub async fn declare_topology(
    channel: &Channel,
    exchange: &str,
    queue: &str,
    routing_key: &str,
) -> Result<(), BusError> {
    channel
        .exchange_declare(
            exchange,
            ExchangeKind::Direct,
            ExchangeDeclareOptions {
                durable: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await?;

    let mut queue_args = FieldTable::default();
    queue_args.insert("x-queue-type".into(), AMQPValue::LongString("quorum".into()));

    channel
        .queue_declare(
            queue,
            QueueDeclareOptions {
                durable: true,
                ..Default::default()
            },
            queue_args,
        )
        .await?;

    channel
        .queue_bind(
            queue,
            exchange,
            routing_key,
            QueueBindOptions::default(),
            FieldTable::default(),
        )
        .await?;

    Ok(())
}

pub async fn connect(amqp_url: &str) -> Result<Connection, BusError> {
    Ok(Connection::connect(amqp_url, ConnectionProperties::default()).await?)
}

pub struct LapinAckPublisher {
    channel: Channel,
    exchange: String,
    routing_key: String,
}

impl LapinAckPublisher {
    pub fn new(channel: Channel, exchange: String, routing_key: String) -> Self {
        Self {
            channel,
            exchange,
            routing_key,
        }
    }
}

#[async_trait]
impl AckPublisher for LapinAckPublisher {
    async fn publish_ack(&self, ack: &AckV1) -> Result<(), BusError> {
        let body = serde_json::to_vec(ack).expect("AckV1 always serializes");
        let properties = BasicProperties::default()
            .with_content_type("application/json".into())
            .with_delivery_mode(2) // persistent
            .with_message_id(ack.message_id().into());

        self.channel
            .basic_publish(
                &self.exchange,
                &self.routing_key,
                BasicPublishOptions::default(),
                &body,
                properties,
            )
            .await?
            .await?;

        Ok(())
    }
}

/// In-memory fake recording every ACK published, for testing the consumer
/// protocol without a live broker.
#[derive(Default)]
pub struct InMemoryAckPublisher {
    pub published: Mutex<Vec<AckV1>>,
}

impl InMemoryAckPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn published(&self) -> Vec<AckV1> {
        self.published.lock().unwrap().clone()
    }
}

#[async_trait]
impl AckPublisher for InMemoryAckPublisher {
    async fn publish_ack(&self, ack: &AckV1) -> Result<(), BusError> {
        self.published.lock().unwrap().push(ack.clone());
        Ok(())
    }
}
