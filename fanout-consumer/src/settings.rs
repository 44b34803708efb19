use blockscout_service_launcher::{
    launcher::{ConfigSettings, MetricsSettings},
    tracing::{JaegerSettings, TracingSettings},
};
use fanout_logic::{blob_store::BlobStoreSettings, settings::ConsumerBusSettings};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    /// Identifies this branch in the `recipient_id` field of every ack it
    /// publishes. Distinct branches pointed at the same pointer queue must
    /// use distinct ids, or the coordinator will collapse their acks into
    /// one.
    pub recipient_id: String,

    #[serde(default)]
    pub metrics: MetricsSettings,
    #[serde(default)]
    pub tracing: TracingSettings,
    #[serde(default)]
    pub jaeger: JaegerSettings,

    pub bus: ConsumerBusSettings,
    pub blob_store: BlobStoreSettings,
}

impl ConfigSettings for Settings {
    const SERVICE_NAME: &'static str = "FANOUT_CONSUMER";
}
