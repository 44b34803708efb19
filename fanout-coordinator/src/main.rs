use blockscout_service_launcher::launcher::ConfigSettings;
use fanout_coordinator::Settings;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let settings = Settings::build().expect("failed to read config");
    fanout_coordinator::run(settings).await
}
