mod settings;

pub use settings::Settings;

use anyhow::Context;
use fanout_logic::{
    blob_store::S3BlobStore,
    bus::{self, LapinAckPublisher},
    consumer::{pointer_consumer, Disposition},
};
use futures::StreamExt;
use lapin::{
    message::Delivery,
    options::{BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicQosOptions},
    types::FieldTable,
    Channel,
};
use prometheus::{Encoder, TextEncoder};
use tokio_util::sync::CancellationToken;

const SERVICE_NAME: &str = "fanout_consumer";

pub async fn run(settings: Settings) -> anyhow::Result<()> {
    blockscout_service_launcher::tracing::init_logs(
        SERVICE_NAME,
        &settings.tracing,
        &settings.jaeger,
    )?;

    let blob_store = S3BlobStore::new(settings.blob_store.clone())
        .await
        .context("blob store initialization failed")?;

    let connection = bus::connect(&settings.bus.amqp_url)
        .await
        .context("amqp connection failed")?;

    let pointer_channel = connection.create_channel().await?;
    bus::declare_topology(
        &pointer_channel,
        &settings.bus.exchange,
        &settings.bus.queue,
        &settings.bus.routing_key,
    )
    .await?;
    pointer_channel
        .basic_qos(settings.bus.prefetch, BasicQosOptions::default())
        .await?;

    let ack_channel = connection.create_channel().await?;
    bus::declare_topology(
        &ack_channel,
        &settings.bus.ack_exchange,
        &settings.bus.ack_queue,
        &settings.bus.ack_routing_key,
    )
    .await?;
    let ack_publisher = LapinAckPublisher::new(
        ack_channel,
        settings.bus.ack_exchange.clone(),
        settings.bus.ack_routing_key.clone(),
    );

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("shutdown signal received, cancelling consume loop");
                shutdown.cancel();
            }
        }
    });

    let recipient_id = settings.recipient_id.clone();
    let queue = settings.bus.queue.clone();
    let consume_shutdown = shutdown.clone();
    let consume_task = tokio::spawn(async move {
        consume_pointers(
            pointer_channel,
            queue,
            recipient_id,
            blob_store,
            ack_publisher,
            consume_shutdown,
        )
        .await
    });

    let mut tasks = vec![consume_task];
    if settings.metrics.enabled {
        tasks.push(tokio::spawn(run_metrics_server(
            settings.metrics.addr,
            settings.metrics.route.clone(),
            shutdown.clone(),
        )));
    }

    let (result, _, _) = futures::future::select_all(tasks).await;
    result.context("a consumer task panicked")?
}

/// Consumes deliveries until the channel closes or `shutdown` fires.
/// Cancellation only stops pulling new deliveries; a delivery already
/// taken off the channel is always fetched, verified, acked, and
/// dispositioned before the loop exits.
async fn consume_pointers(
    channel: Channel,
    queue: String,
    recipient_id: String,
    blob_store: S3BlobStore,
    ack_publisher: LapinAckPublisher,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let mut consumer = channel
        .basic_consume(
            &queue,
            "fanout-consumer",
            BasicConsumeOptions::default(),
            FieldTable::default(),
        )
        .await?;

    loop {
        let delivery = tokio::select! {
            delivery = consumer.next() => delivery,
            _ = shutdown.cancelled() => {
                tracing::info!("pointer consume loop shutting down");
                return Ok(());
            }
        };
        let Some(delivery) = delivery else { break };
        let delivery = delivery?;
        let disposition =
            pointer_consumer::handle(&recipient_id, &blob_store, &ack_publisher, &delivery.data)
                .await;
        acknowledge(&delivery, disposition).await?;
    }

    Ok(())
}

async fn acknowledge(delivery: &Delivery, disposition: Disposition) -> anyhow::Result<()> {
    match disposition {
        Disposition::Ack => delivery.ack(BasicAckOptions::default()).await?,
        Disposition::NackRequeue => {
            delivery
                .nack(BasicNackOptions {
                    requeue: true,
                    ..Default::default()
                })
                .await?
        }
    }
    Ok(())
}

async fn run_metrics_server(
    addr: std::net::SocketAddr,
    route: String,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    use actix_web::{web, App, HttpResponse, HttpServer};

    tracing::info!(%addr, %route, "starting metrics server");
    let server = HttpServer::new(move || {
        App::new().route(
            &route,
            web::get().to(|| async {
                let encoder = TextEncoder::new();
                let metric_families = prometheus::gather();
                let mut buffer = Vec::new();
                if encoder.encode(&metric_families, &mut buffer).is_err() {
                    return HttpResponse::InternalServerError().finish();
                }
                HttpResponse::Ok()
                    .content_type(encoder.format_type())
                    .body(buffer)
            }),
        )
    })
    .bind(addr)?
    .run();
    let handle = server.handle();

    tokio::select! {
        result = server => result?,
        _ = shutdown.cancelled() => handle.stop(true).await,
    }
    Ok(())
}
