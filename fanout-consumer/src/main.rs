use blockscout_service_launcher::launcher::ConfigSettings;
use fanout_consumer::Settings;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let settings = Settings::build().expect("failed to read config");
    fanout_consumer::run(settings).await
}
