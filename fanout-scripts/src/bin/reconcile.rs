//! Reconciliation job: retries blob deletes the ack handler committed to in
//! the database (`deleted_at` set) but could not carry out against the
//! blob store, because the delete happens outside the transaction that
//! sets `deleted_at`.
//!
//! Scans `objects` in pages, past a grace period so it never races the ack
//! handler's own delete attempt, and re-issues the delete for any blob
//! still present. Never touches `acks` or `deleted_at`: this job only
//! repairs the one failure mode the data model already accounts for.

use anyhow::Context;
use blockscout_service_launcher::{database, launcher::ConfigSettings, tracing::TracingSettings};
use chrono::{DateTime, Utc};
use fanout_logic::{
    blob_store::{BlobStore, BlobStoreSettings, S3BlobStore},
    settings::ReconciliationSettings,
};
use sea_orm::{ConnectionTrait, DatabaseConnection, FromQueryResult, Statement};
use serde::Deserialize;
use std::time::Duration;
use uuid::Uuid;

macro_rules! call_retriable {
    ($function:expr) => {
        call_retriable(|| async { Ok::<_, anyhow::Error>($function) }).await?
    };
}

const SERVICE_NAME: &str = "fanout_reconcile";

#[derive(Clone, Debug, Deserialize)]
struct Settings {
    pub database: database::DatabaseSettings,
    pub blob_store: BlobStoreSettings,
    #[serde(default)]
    pub reconciliation: ReconciliationSettings,
    #[serde(default)]
    pub tracing: TracingSettings,
}

impl ConfigSettings for Settings {
    const SERVICE_NAME: &'static str = SERVICE_NAME;
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let settings = Settings::build().expect("failed to read config");
    blockscout_service_launcher::tracing::init_logs(
        SERVICE_NAME,
        &settings.tracing,
        &Default::default(),
    )?;

    let database = {
        let mut database_settings = settings.database;
        // This job runs against an already-migrated database.
        database_settings.create_database = false;
        database_settings.run_migrations = false;
        database::initialize_postgres::<fanout_migration::Migrator>(&database_settings)
            .await
            .context("initialize database")?
    };

    let blob_store = S3BlobStore::new(settings.blob_store)
        .await
        .context("initialize blob store")?;

    let cutoff = Utc::now() - chrono::Duration::from_std(settings.reconciliation.grace_period)?;

    let mut iteration = 0;
    let mut repaired = 0u64;
    let mut already_gone = 0u64;
    // Rows never change once scanned, deleted_at stays set regardless of
    // outcome, so paging needs its own cursor, not just a LIMIT: ordering
    // by pointer_id and advancing past the last one seen is what actually
    // makes the loop terminate after one pass instead of refetching the
    // same page forever.
    let mut cursor: Option<Uuid> = None;
    loop {
        iteration += 1;
        let candidates = call_retriable!(
            fetch_stale_deletions(&database, cutoff, cursor, settings.reconciliation.batch_size)
                .await
                .context("fetch stale deletions")?
        );

        if candidates.is_empty() {
            tracing::info!(iteration, repaired, already_gone, "reconciliation finished");
            break;
        }

        for candidate in candidates {
            cursor = Some(candidate.pointer_id);

            let present = call_retriable!(
                blob_store
                    .head(&candidate.bucket, &candidate.object_key)
                    .await
                    .context("check blob existence")?
            );

            if !present {
                already_gone += 1;
                continue;
            }

            call_retriable!(
                blob_store
                    .delete(&candidate.bucket, &candidate.object_key)
                    .await
                    .context("delete orphaned blob")?
            );
            repaired += 1;
            tracing::info!(
                pointer_id = %candidate.pointer_id,
                bucket = %candidate.bucket,
                key = %candidate.object_key,
                "repaired an orphaned blob delete"
            );
        }
    }

    Ok(())
}

#[derive(Clone, Debug, FromQueryResult)]
struct StaleDeletion {
    pointer_id: Uuid,
    bucket: String,
    object_key: String,
}

async fn fetch_stale_deletions(
    database: &DatabaseConnection,
    cutoff: DateTime<Utc>,
    cursor: Option<Uuid>,
    limit: u64,
) -> Result<Vec<StaleDeletion>, anyhow::Error> {
    let stmt = match cursor {
        Some(cursor) => Statement::from_sql_and_values(
            database.get_database_backend(),
            r#"
            SELECT pointer_id, bucket, object_key
            FROM objects
            WHERE deleted_at IS NOT NULL
              AND deleted_at < $1
              AND pointer_id > $2
            ORDER BY pointer_id
            LIMIT $3
            "#,
            [cutoff.into(), cursor.into(), (limit as i64).into()],
        ),
        None => Statement::from_sql_and_values(
            database.get_database_backend(),
            r#"
            SELECT pointer_id, bucket, object_key
            FROM objects
            WHERE deleted_at IS NOT NULL
              AND deleted_at < $1
            ORDER BY pointer_id
            LIMIT $2
            "#,
            [cutoff.into(), (limit as i64).into()],
        ),
    };
    Ok(StaleDeletion::find_by_statement(stmt).all(database).await?)
}

async fn call_retriable<V, E, F, Fut>(function: F) -> Result<V, E>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<V, E>>,
    E: std::fmt::Debug,
{
    let timeouts: Vec<_> = [1, 3, 5].into_iter().map(Duration::from_secs).collect();
    let retries = timeouts.len() + 1;
    let mut attempt = 0;
    loop {
        attempt += 1;
        match function().await {
            Ok(value) => return Ok(value),
            Err(error) => {
                if attempt == retries {
                    tracing::error!(
                        error = format!("{error:#?}"),
                        "no attempts left; request resulted in error"
                    );
                    return Err(error);
                }
                let timeout = timeouts[attempt - 1];
                tracing::warn!(
                    error = format!("{error:#?}"),
                    attempt = attempt,
                    timeout = timeout.as_secs(),
                    "attempt resulted in error; retrying.. "
                );
                tokio::time::sleep(timeout).await;
            }
        }
    }
}
