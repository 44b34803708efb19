//! Scenario tests against a real, throw-away Postgres database. These
//! exercise the conditional SQL in `SeaOrmStore` directly: the things a
//! hand-rolled in-memory fake could only restate, not verify.
//!
//! Requires `DATABASE_URL` pointing at a reachable Postgres server; see
//! `blockscout_service_launcher::test_database`.

use blockscout_service_launcher::database;
use chrono::Utc;
use fanout_logic::{
    coordinator::{ack_handler, pointer_handler, Disposition},
    schemas::{AckV1, PointerV1},
    store::{SeaOrmStore, Store},
};
use pretty_assertions::assert_eq;
use uuid::Uuid;

fn pointer(pointer_id: Uuid, recipients_total: u32) -> PointerV1 {
    PointerV1 {
        pointer_id,
        bucket: "1c-exchange".to_string(),
        key: format!("demo/{pointer_id}.json.gz"),
        encoding: "gzip".to_string(),
        content_type: "application/json".to_string(),
        size_raw: Some(100),
        size_gz: Some(40),
        sha256: Some("a".repeat(64)),
        recipients_total,
        created_at: None,
    }
}

fn pointer_body(pointer: &PointerV1) -> Vec<u8> {
    serde_json::to_vec(&serde_json::json!({
        "schema": "s3-pointer-v1",
        "pointer_id": pointer.pointer_id,
        "bucket": pointer.bucket,
        "key": pointer.key,
        "encoding": pointer.encoding,
        "content_type": pointer.content_type,
        "size_raw": pointer.size_raw,
        "size_gz": pointer.size_gz,
        "sha256": pointer.sha256,
        "recipients_total": pointer.recipients_total,
    }))
    .unwrap()
}

fn ack_body(pointer_id: Uuid, recipient_id: &str, recipients_total: u32) -> Vec<u8> {
    serde_json::to_vec(&serde_json::json!({
        "schema": "s3-ack-v1",
        "pointer_id": pointer_id,
        "bucket": "1c-exchange",
        "key": format!("demo/{pointer_id}.json.gz"),
        "recipient_id": recipient_id,
        "status": "processed",
        "processed_at": Utc::now(),
        "recipients_total": recipients_total,
    }))
    .unwrap()
}

#[tokio::test]
#[ignore = "needs database to run"]
async fn happy_path_pointer_then_all_acks_triggers_exactly_one_deletion_claim() {
    let db = database!(fanout_migration::Migrator);
    let store = SeaOrmStore::new((*db.client()).clone());
    let pointer_id = Uuid::new_v4();
    let pointer = pointer(pointer_id, 3);

    assert_eq!(
        pointer_handler::handle(&store, &pointer_body(&pointer)).await,
        Disposition::Ack
    );

    for recipient in ["branch1", "branch2"] {
        let tally = store
            .record_ack(&AckV1 {
                pointer_id,
                bucket: pointer.bucket.clone(),
                key: pointer.key.clone(),
                recipient_id: recipient.to_string(),
                status: "processed".to_string(),
                processed_at: Utc::now(),
                recipients_total: 3,
            })
            .await
            .unwrap();
        assert!(!tally.passes_deletion_gate());
    }

    let final_tally = store
        .record_ack(&AckV1 {
            pointer_id,
            bucket: pointer.bucket.clone(),
            key: pointer.key.clone(),
            recipient_id: "branch3".to_string(),
            status: "processed".to_string(),
            processed_at: Utc::now(),
            recipients_total: 3,
        })
        .await
        .unwrap();
    assert!(final_tally.passes_deletion_gate());

    let claim = store.try_claim_delete(pointer_id).await.unwrap();
    assert_eq!(claim, Some((pointer.bucket.clone(), pointer.key.clone())));

    // Second claim attempt loses the race: deleted_at is already set.
    let second_claim = store.try_claim_delete(pointer_id).await.unwrap();
    assert_eq!(second_claim, None);
}

#[tokio::test]
#[ignore = "needs database to run"]
async fn duplicate_pointer_after_real_pointer_is_a_no_op() {
    let db = database!(fanout_migration::Migrator);
    let store = SeaOrmStore::new((*db.client()).clone());
    let pointer_id = Uuid::new_v4();
    let first = pointer(pointer_id, 2);
    let mut second = first.clone();
    second.recipients_total = 99;
    second.bucket = "some-other-bucket".to_string();

    store.upsert_pointer(&first).await.unwrap();
    store.upsert_pointer(&second).await.unwrap();

    let tally = store
        .record_ack(&AckV1 {
            pointer_id,
            bucket: first.bucket.clone(),
            key: first.key.clone(),
            recipient_id: "branch1".to_string(),
            status: "processed".to_string(),
            processed_at: Utc::now(),
            recipients_total: 2,
        })
        .await
        .unwrap();

    // The second (duplicate) upsert must never have won: recipients_total
    // still reflects the first, real pointer.
    assert_eq!(tally.recipients_total, Some(2));
    assert_eq!(tally.bucket.as_deref(), Some(first.bucket.as_str()));
}

#[tokio::test]
#[ignore = "needs database to run"]
async fn duplicate_ack_is_absorbed_and_does_not_inflate_the_tally() {
    let db = database!(fanout_migration::Migrator);
    let store = SeaOrmStore::new((*db.client()).clone());
    let pointer_id = Uuid::new_v4();
    let p = pointer(pointer_id, 2);
    store.upsert_pointer(&p).await.unwrap();

    let ack = AckV1 {
        pointer_id,
        bucket: p.bucket.clone(),
        key: p.key.clone(),
        recipient_id: "branch1".to_string(),
        status: "processed".to_string(),
        processed_at: Utc::now(),
        recipients_total: 2,
    };

    let first = store.record_ack(&ack).await.unwrap();
    assert!(first.ack_was_new);
    assert_eq!(first.ack_count, 1);

    let second = store.record_ack(&ack).await.unwrap();
    assert!(!second.ack_was_new);
    assert_eq!(second.ack_count, 1);
    assert!(!second.passes_deletion_gate());
}

#[tokio::test]
#[ignore = "needs database to run"]
async fn acks_arriving_before_the_pointer_create_a_placeholder_that_never_triggers_deletion() {
    let db = database!(fanout_migration::Migrator);
    let store = SeaOrmStore::new((*db.client()).clone());
    let pointer_id = Uuid::new_v4();

    let body = ack_body(pointer_id, "branch1", 1);
    assert_eq!(
        ack_handler::handle(&store, &fanout_logic::blob_store::InMemoryBlobStore::new(), &body)
            .await,
        Disposition::Ack
    );

    let claim = store.try_claim_delete(pointer_id).await.unwrap();
    assert_eq!(claim, None, "pointer_received_at is still null");

    // Once the real pointer arrives, the already-recorded ack already
    // satisfies the gate and the very next ack should be able to claim.
    let pointer = pointer(pointer_id, 1);
    store.upsert_pointer(&pointer).await.unwrap();
    let claim = store.try_claim_delete(pointer_id).await.unwrap();
    assert_eq!(claim, Some((pointer.bucket, pointer.key)));
}

#[tokio::test]
#[ignore = "needs database to run"]
async fn partial_acks_never_pass_the_deletion_gate() {
    let db = database!(fanout_migration::Migrator);
    let store = SeaOrmStore::new((*db.client()).clone());
    let pointer_id = Uuid::new_v4();
    let p = pointer(pointer_id, 5);
    store.upsert_pointer(&p).await.unwrap();

    for recipient in ["b1", "b2", "b3"] {
        let tally = store
            .record_ack(&AckV1 {
                pointer_id,
                bucket: p.bucket.clone(),
                key: p.key.clone(),
                recipient_id: recipient.to_string(),
                status: "processed".to_string(),
                processed_at: Utc::now(),
                recipients_total: 5,
            })
            .await
            .unwrap();
        assert!(!tally.passes_deletion_gate());
    }

    assert_eq!(store.try_claim_delete(pointer_id).await.unwrap(), None);
}
