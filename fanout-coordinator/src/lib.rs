mod settings;

pub use settings::Settings;

use anyhow::Context;
use blockscout_service_launcher::database;
use fanout_logic::{
    blob_store::{BlobStore, S3BlobStore},
    bus,
    coordinator::{ack_handler, pointer_handler, Disposition},
    store::{SeaOrmStore, Store},
};
use futures::StreamExt;
use lapin::{
    options::{
        BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicQosOptions,
    },
    types::FieldTable,
    Channel,
};
use prometheus::{Encoder, TextEncoder};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

const SERVICE_NAME: &str = "fanout_coordinator";

pub async fn run(settings: Settings) -> anyhow::Result<()> {
    blockscout_service_launcher::tracing::init_logs(
        SERVICE_NAME,
        &settings.tracing,
        &settings.jaeger,
    )?;

    let db_connection =
        database::initialize_postgres::<fanout_migration::Migrator>(&settings.database).await?;
    let store: Arc<dyn Store> = Arc::new(SeaOrmStore::new(db_connection));

    let blob_store: Arc<dyn BlobStore> = Arc::new(
        S3BlobStore::new(settings.blob_store.clone())
            .await
            .context("blob store initialization failed")?,
    );

    let connection = bus::connect(&settings.bus.amqp_url)
        .await
        .context("amqp connection failed")?;

    let pointer_channel = connection.create_channel().await?;
    bus::declare_topology(
        &pointer_channel,
        &settings.bus.pointer_exchange,
        &settings.bus.pointer_queue,
        &settings.bus.pointer_routing_key,
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
    ack_channel
        .basic_qos(settings.bus.prefetch, BasicQosOptions::default())
        .await?;

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("shutdown signal received, cancelling consume loops");
                shutdown.cancel();
            }
        }
    });

    let pointer_queue = settings.bus.pointer_queue.clone();
    let pointer_store = store.clone();
    let pointer_shutdown = shutdown.clone();
    let pointer_task = tokio::spawn(async move {
        consume_pointers(pointer_channel, pointer_queue, pointer_store, pointer_shutdown).await
    });

    let ack_queue = settings.bus.ack_queue.clone();
    let ack_store = store.clone();
    let ack_blob_store = blob_store.clone();
    let ack_shutdown = shutdown.clone();
    let ack_task = tokio::spawn(async move {
        consume_acks(ack_channel, ack_queue, ack_store, ack_blob_store, ack_shutdown).await
    });

    let mut tasks = vec![pointer_task, ack_task];
    if settings.server.http.enabled {
        tasks.push(tokio::spawn(run_health_server(
            settings.server.http.addr,
            shutdown.clone(),
        )));
    }
    if settings.metrics.enabled {
        tasks.push(tokio::spawn(run_metrics_server(
            settings.metrics.addr,
            settings.metrics.route.clone(),
            shutdown.clone(),
        )));
    }

    let (result, _, _) = futures::future::select_all(tasks).await;
    result.context("a coordinator task panicked")?
}

/// Consumes deliveries until the channel closes or `shutdown` fires.
/// Cancellation here only stops pulling new deliveries. Any delivery
/// already in flight is fully handled (DB commit, then ack/nack) before
/// the loop exits, so the broker never sees a half-processed message.
async fn consume_pointers(
    channel: Channel,
    queue: String,
    store: Arc<dyn Store>,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let mut consumer = channel
        .basic_consume(
            &queue,
            "fanout-coordinator-pointers",
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
        let disposition = pointer_handler::handle(store.as_ref(), &delivery.data).await;
        acknowledge(&delivery, disposition).await?;
    }

    Ok(())
}

async fn consume_acks(
    channel: Channel,
    queue: String,
    store: Arc<dyn Store>,
    blob_store: Arc<dyn BlobStore>,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let mut consumer = channel
        .basic_consume(
            &queue,
            "fanout-coordinator-acks",
            BasicConsumeOptions::default(),
            FieldTable::default(),
        )
        .await?;

    loop {
        let delivery = tokio::select! {
            delivery = consumer.next() => delivery,
            _ = shutdown.cancelled() => {
                tracing::info!("ack consume loop shutting down");
                return Ok(());
            }
        };
        let Some(delivery) = delivery else { break };
        let delivery = delivery?;
        let disposition =
            ack_handler::handle(store.as_ref(), blob_store.as_ref(), &delivery.data).await;
        acknowledge(&delivery, disposition).await?;
    }

    Ok(())
}

async fn acknowledge(delivery: &lapin::message::Delivery, disposition: Disposition) -> anyhow::Result<()> {
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

async fn run_health_server(addr: std::net::SocketAddr, shutdown: CancellationToken) -> anyhow::Result<()> {
    use actix_web::{web, App, HttpResponse, HttpServer};

    tracing::info!(%addr, "starting health server");
    let server = HttpServer::new(|| {
        App::new().route(
            "/health",
            web::get().to(|| async { HttpResponse::Ok().finish() }),
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
