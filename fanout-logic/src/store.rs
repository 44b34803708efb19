//! The `Store` collaborator seam: the coordinator's only source of truth.
//! Every transition named in the data model is one method here, and every
//! one of them is either a single transaction or a single conditional
//! statement, no read-modify-write happens in application memory.

use crate::schemas::{AckV1, PointerV1};
use chrono::{DateTime, Utc};
use sea_orm::{
    ConnectionTrait, DatabaseConnection, DbErr, FromQueryResult, Statement, TransactionTrait,
};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Db(#[from] DbErr),
}

/// Snapshot read back atomically with the ACK insert, used by the
/// deletion gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AckTally {
    pub ack_count: i64,
    /// `false` if this ACK was already present, the `(pointer_id,
    /// recipient_id)` unique constraint collapsed it into a no-op.
    pub ack_was_new: bool,
    pub recipients_total: Option<i32>,
    pub bucket: Option<String>,
    pub object_key: Option<String>,
    pub pointer_received_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl AckTally {
    /// The deletion gate from the ack handler's design: every condition
    /// must hold before a claim attempt is worth making.
    pub fn passes_deletion_gate(&self) -> bool {
        if self.pointer_received_at.is_none() {
            return false;
        }
        if self.deleted_at.is_some() {
            return false;
        }
        match self.recipients_total {
            Some(total) if total >= 0 => self.ack_count >= total as i64,
            _ => false,
        }
    }
}

#[async_trait::async_trait]
pub trait Store: Send + Sync {
    /// Insert or upgrade the authoritative object row for a pointer
    /// observation. No-op on a duplicate real pointer (one whose
    /// `pointer_received_at` is already set).
    async fn upsert_pointer(&self, pointer: &PointerV1) -> Result<(), StoreError>;

    /// Ensure a placeholder row exists, idempotently insert the ack row,
    /// and read back the current tally, all in one transaction.
    async fn record_ack(&self, ack: &AckV1) -> Result<AckTally, StoreError>;

    /// Attempt the single compare-and-set that claims the right to delete
    /// a blob. Returns `Some((bucket, object_key))` only to the one caller
    /// that won the race; everyone else gets `None`.
    async fn try_claim_delete(
        &self,
        pointer_id: Uuid,
    ) -> Result<Option<(String, String)>, StoreError>;
}

pub struct SeaOrmStore {
    db: DatabaseConnection,
}

impl SeaOrmStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait::async_trait]
impl Store for SeaOrmStore {
    async fn upsert_pointer(&self, pointer: &PointerV1) -> Result<(), StoreError> {
        let created_at = pointer.created_at.unwrap_or_else(Utc::now);

        // `WHERE objects.pointer_received_at IS NULL` on the DO UPDATE
        // action itself makes the whole upsert a no-op once a real
        // pointer has already been observed, the "simplest correct
        // rule" for duplicate pointers from the spec, applied directly in
        // SQL rather than with a read-then-branch race.
        let stmt = Statement::from_sql_and_values(
            self.db.get_database_backend(),
            r#"
            INSERT INTO objects (pointer_id, bucket, object_key, recipients_total, created_at, pointer_received_at)
            VALUES ($1, $2, $3, $4, $5, now())
            ON CONFLICT (pointer_id) DO UPDATE
            SET bucket = EXCLUDED.bucket,
                object_key = EXCLUDED.object_key,
                recipients_total = EXCLUDED.recipients_total,
                pointer_received_at = now(),
                created_at = EXCLUDED.created_at
            WHERE objects.pointer_received_at IS NULL
            "#,
            [
                pointer.pointer_id.into(),
                pointer.bucket.clone().into(),
                pointer.key.clone().into(),
                (pointer.recipients_total as i32).into(),
                created_at.into(),
            ],
        );

        self.db.execute(stmt).await?;
        Ok(())
    }

    async fn record_ack(&self, ack: &AckV1) -> Result<AckTally, StoreError> {
        let txn = self.db.begin().await?;

        let placeholder_stmt = Statement::from_sql_and_values(
            txn.get_database_backend(),
            r#"
            INSERT INTO objects (pointer_id, created_at)
            VALUES ($1, now())
            ON CONFLICT (pointer_id) DO NOTHING
            "#,
            [ack.pointer_id.into()],
        );
        txn.execute(placeholder_stmt).await?;

        let ack_stmt = Statement::from_sql_and_values(
            txn.get_database_backend(),
            r#"
            INSERT INTO acks (pointer_id, recipient_id, processed_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (pointer_id, recipient_id) DO NOTHING
            "#,
            [
                ack.pointer_id.into(),
                ack.recipient_id.clone().into(),
                ack.processed_at.into(),
            ],
        );
        let ack_insert_result = txn.execute(ack_stmt).await?;
        let ack_was_new = ack_insert_result.rows_affected() > 0;

        #[derive(FromQueryResult)]
        struct AckCount {
            count: i64,
        }
        let count_stmt = Statement::from_sql_and_values(
            txn.get_database_backend(),
            r#"SELECT COUNT(*) AS count FROM acks WHERE pointer_id = $1"#,
            [ack.pointer_id.into()],
        );
        let ack_count = AckCount::find_by_statement(count_stmt)
            .one(&txn)
            .await?
            .map(|row| row.count)
            .unwrap_or(0);

        #[derive(FromQueryResult)]
        struct ObjectRow {
            recipients_total: Option<i32>,
            bucket: Option<String>,
            object_key: Option<String>,
            pointer_received_at: Option<DateTime<Utc>>,
            deleted_at: Option<DateTime<Utc>>,
        }
        let object_stmt = Statement::from_sql_and_values(
            txn.get_database_backend(),
            r#"
            SELECT recipients_total, bucket, object_key, pointer_received_at, deleted_at
            FROM objects WHERE pointer_id = $1
            "#,
            [ack.pointer_id.into()],
        );
        let object = ObjectRow::find_by_statement(object_stmt)
            .one(&txn)
            .await?
            .expect("row was just inserted or already existed in this same transaction");

        txn.commit().await?;

        Ok(AckTally {
            ack_count,
            ack_was_new,
            recipients_total: object.recipients_total,
            bucket: object.bucket,
            object_key: object.object_key,
            pointer_received_at: object.pointer_received_at,
            deleted_at: object.deleted_at,
        })
    }

    async fn try_claim_delete(
        &self,
        pointer_id: Uuid,
    ) -> Result<Option<(String, String)>, StoreError> {
        let txn = self.db.begin().await?;

        let claim_stmt = Statement::from_sql_and_values(
            txn.get_database_backend(),
            r#"
            UPDATE objects
            SET deleted_at = now()
            WHERE pointer_id = $1
              AND deleted_at IS NULL
              AND pointer_received_at IS NOT NULL
            "#,
            [pointer_id.into()],
        );
        let result = txn.execute(claim_stmt).await?;
        if result.rows_affected() == 0 {
            txn.commit().await?;
            return Ok(None);
        }

        #[derive(FromQueryResult)]
        struct Coordinates {
            bucket: Option<String>,
            object_key: Option<String>,
        }
        let coordinates_stmt = Statement::from_sql_and_values(
            txn.get_database_backend(),
            r#"SELECT bucket, object_key FROM objects WHERE pointer_id = $1"#,
            [pointer_id.into()],
        );
        let coordinates = Coordinates::find_by_statement(coordinates_stmt)
            .one(&txn)
            .await?;

        txn.commit().await?;

        Ok(coordinates.and_then(|c| match (c.bucket, c.object_key) {
            (Some(bucket), Some(object_key)) => Some((bucket, object_key)),
            // Invariant 4 (deleted_at may be set only once pointer_received_at
            // is set, which always implies bucket/object_key are populated)
            // guarantees this branch is unreachable in practice.
            _ => None,
        }))
    }
}
