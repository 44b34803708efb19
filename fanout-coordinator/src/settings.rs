use blockscout_service_launcher::{
    database::{DatabaseConnectSettings, DatabaseSettings},
    launcher::{ConfigSettings, MetricsSettings, ServerSettings},
    tracing::{JaegerSettings, TracingSettings},
};
use fanout_logic::{blob_store::BlobStoreSettings, settings::CoordinatorBusSettings};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub metrics: MetricsSettings,
    #[serde(default)]
    pub tracing: TracingSettings,
    #[serde(default)]
    pub jaeger: JaegerSettings,
    pub database: DatabaseSettings,

    pub bus: CoordinatorBusSettings,
    pub blob_store: BlobStoreSettings,
}

impl ConfigSettings for Settings {
    const SERVICE_NAME: &'static str = "FANOUT_COORDINATOR";
}

impl Settings {
    pub fn default(database_url: String, bus: CoordinatorBusSettings, blob_store: BlobStoreSettings) -> Self {
        Self {
            server: Default::default(),
            metrics: Default::default(),
            tracing: Default::default(),
            jaeger: Default::default(),
            database: DatabaseSettings {
                connect: DatabaseConnectSettings::Url(database_url),
                create_database: Default::default(),
                run_migrations: Default::default(),
            },
            bus,
            blob_store,
        }
    }
}
