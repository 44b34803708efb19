use std::time;

use serde::Deserialize;
use serde_with::serde_as;

/// Bus settings for a branch consumer: one pointer queue bound to its own
/// routing key, plus the shared ACK exchange it publishes onto.
#[serde_as]
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ConsumerBusSettings {
    pub amqp_url: String,
    #[serde(default = "default_pointer_exchange")]
    pub exchange: String,
    pub routing_key: String,
    pub queue: String,
    #[serde(default = "default_ack_exchange")]
    pub ack_exchange: String,
    #[serde(default = "default_ack_routing_key")]
    pub ack_routing_key: String,
    #[serde(default = "default_ack_queue")]
    pub ack_queue: String,
    #[serde(default = "default_consumer_prefetch")]
    pub prefetch: u16,
}

/// Bus settings for the coordinator: it consumes both the shared pointer
/// queue and the single shared ACK queue.
#[serde_as]
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct CoordinatorBusSettings {
    pub amqp_url: String,
    #[serde(default = "default_pointer_exchange")]
    pub pointer_exchange: String,
    pub pointer_routing_key: String,
    pub pointer_queue: String,
    #[serde(default = "default_ack_exchange")]
    pub ack_exchange: String,
    #[serde(default = "default_ack_routing_key")]
    pub ack_routing_key: String,
    #[serde(default = "default_ack_queue")]
    pub ack_queue: String,
    #[serde(default = "default_coordinator_prefetch")]
    pub prefetch: u16,
}

fn default_pointer_exchange() -> String {
    "ex.msg".to_string()
}

fn default_ack_exchange() -> String {
    "ex.ack".to_string()
}

fn default_ack_routing_key() -> String {
    "ack".to_string()
}

fn default_ack_queue() -> String {
    "q.ack".to_string()
}

fn default_consumer_prefetch() -> u16 {
    10
}

fn default_coordinator_prefetch() -> u16 {
    50
}

/// Grace period and paging parameters for the out-of-band reconciliation
/// job (`fanout-scripts`), which retries blob deletes that the coordinator
/// committed to (`deleted_at` set) but could not carry out.
#[serde_as]
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ReconciliationSettings {
    #[serde(default = "default_grace_period")]
    #[serde_as(as = "serde_with::DurationSeconds<u64>")]
    pub grace_period: time::Duration,
    #[serde(default = "default_reconciliation_batch_size")]
    pub batch_size: u64,
}

fn default_grace_period() -> time::Duration {
    time::Duration::from_secs(3600)
}

fn default_reconciliation_batch_size() -> u64 {
    1000
}

impl Default for ReconciliationSettings {
    fn default() -> Self {
        Self {
            grace_period: default_grace_period(),
            batch_size: default_reconciliation_batch_size(),
        }
    }
}
