use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let sql = r#"
            CREATE TABLE "objects" (
                "pointer_id" uuid PRIMARY KEY,
                "bucket" text,
                "object_key" text,
                "recipients_total" integer,
                "created_at" timestamptz NOT NULL,
                "pointer_received_at" timestamptz,
                "deleted_at" timestamptz
            );

            CREATE TABLE "acks" (
                "pointer_id" uuid NOT NULL references "objects"("pointer_id"),
                "recipient_id" text NOT NULL,
                "processed_at" timestamptz NOT NULL,
                PRIMARY KEY ("pointer_id", "recipient_id")
            );

            CREATE INDEX "idx_objects_deleted_at" ON "objects" ("deleted_at");

            COMMENT ON TABLE "objects" IS 'Authoritative record for one announced blob, keyed by pointer_id. A NULL pointer_received_at marks a placeholder row created by an early ACK.';

            COMMENT ON TABLE "acks" IS 'One row per confirmed (pointer_id, recipient_id) pair.';
        "#;
        crate::from_sql(manager, sql).await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let sql = r#"
            DROP TABLE "acks";
            DROP TABLE "objects";
        "#;

        crate::from_sql(manager, sql).await
    }
}
