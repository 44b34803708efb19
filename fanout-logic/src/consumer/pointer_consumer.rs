//! Branch consumer: fetches the blob a pointer message names, verifies its
//! integrity, and publishes an ACK back to the coordinator. One delivery
//! in, at most one ACK out; never more than one ACK per delivery, since a
//! duplicate ACK is only absorbed (not rejected) by the coordinator.

use super::Disposition;
use crate::{
    blob_store::BlobStore,
    bus::AckPublisher,
    metrics,
    schemas::{AckV1, PointerMessage},
};
use chrono::Utc;
use sha2::{Digest, Sha256};

pub async fn handle(
    recipient_id: &str,
    blob_store: &dyn BlobStore,
    ack_publisher: &dyn AckPublisher,
    body: &[u8],
) -> Disposition {
    let message: PointerMessage = match serde_json::from_slice(body) {
        Ok(message) => message,
        Err(error) => {
            tracing::warn!(%error, "malformed pointer message, ack-and-drop");
            return Disposition::Ack;
        }
    };

    let pointer = match message {
        PointerMessage::V1(pointer) => pointer,
        PointerMessage::Unknown => {
            tracing::info!("unrecognized pointer schema, ack-and-drop");
            return Disposition::Ack;
        }
    };

    let content = match blob_store.get(&pointer.bucket, &pointer.key).await {
        Ok(content) => content,
        Err(error) if error.is_not_found() => {
            metrics::CONSUMER_BLOBS_MISSING_TOTAL.inc();
            tracing::warn!(
                pointer_id = %pointer.pointer_id,
                bucket = %pointer.bucket,
                key = %pointer.key,
                "blob already gone, ack-and-drop without emitting an ack"
            );
            return Disposition::Ack;
        }
        Err(error) => {
            tracing::warn!(
                pointer_id = %pointer.pointer_id,
                bucket = %pointer.bucket,
                key = %pointer.key,
                %error,
                "failed to fetch blob, requeueing"
            );
            return Disposition::NackRequeue;
        }
    };

    if let Some(expected) = &pointer.sha256 {
        let actual = hex::encode(Sha256::digest(&content));
        if &actual != expected {
            metrics::CONSUMER_POISON_MESSAGES_TOTAL.inc();
            tracing::error!(
                pointer_id = %pointer.pointer_id,
                bucket = %pointer.bucket,
                key = %pointer.key,
                expected,
                actual,
                "sha256 mismatch, poison delivery, requeueing without acking"
            );
            return Disposition::NackRequeue;
        }
    }

    let ack = AckV1 {
        pointer_id: pointer.pointer_id,
        bucket: pointer.bucket.clone(),
        key: pointer.key.clone(),
        recipient_id: recipient_id.to_string(),
        status: "processed".to_string(),
        processed_at: Utc::now(),
        recipients_total: pointer.recipients_total,
    };

    match ack_publisher.publish_ack(&ack).await {
        Ok(()) => {
            metrics::CONSUMER_ACKS_PUBLISHED_TOTAL.inc();
            tracing::info!(
                pointer_id = %pointer.pointer_id,
                recipient_id,
                "ack published"
            );
            Disposition::Ack
        }
        Err(error) => {
            tracing::warn!(
                pointer_id = %pointer.pointer_id,
                recipient_id,
                %error,
                "failed to publish ack, requeueing"
            );
            Disposition::NackRequeue
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob_store::InMemoryBlobStore;
    use crate::bus::InMemoryAckPublisher;
    use uuid::Uuid;

    fn pointer_body(pointer_id: Uuid, sha256: Option<&str>) -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({
            "schema": "s3-pointer-v1",
            "pointer_id": pointer_id,
            "bucket": "b",
            "key": "k",
            "recipients_total": 2,
            "sha256": sha256,
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn unknown_schema_is_acked_without_publishing() {
        let blobs = InMemoryBlobStore::new();
        let acks = InMemoryAckPublisher::new();
        let body = serde_json::to_vec(&serde_json::json!({"schema": "future-v9"})).unwrap();

        let disposition = handle("branch1", &blobs, &acks, &body).await;

        assert_eq!(disposition, Disposition::Ack);
        assert!(acks.published().is_empty());
    }

    #[tokio::test]
    async fn missing_blob_is_acked_without_publishing() {
        let blobs = InMemoryBlobStore::new();
        let acks = InMemoryAckPublisher::new();
        let pointer_id = Uuid::new_v4();
        let body = pointer_body(pointer_id, None);

        let disposition = handle("branch1", &blobs, &acks, &body).await;

        assert_eq!(disposition, Disposition::Ack);
        assert!(acks.published().is_empty());
    }

    #[tokio::test]
    async fn sha256_mismatch_is_poisoned_and_requeued() {
        let blobs = InMemoryBlobStore::new();
        blobs.put("b", "k", b"actual content".to_vec());
        let acks = InMemoryAckPublisher::new();
        let pointer_id = Uuid::new_v4();
        let body = pointer_body(pointer_id, Some(&"f".repeat(64)));

        let disposition = handle("branch1", &blobs, &acks, &body).await;

        assert_eq!(disposition, Disposition::NackRequeue);
        assert!(acks.published().is_empty());
    }

    #[tokio::test]
    async fn valid_blob_is_acked_and_published() {
        let content = b"hello world".to_vec();
        let blobs = InMemoryBlobStore::new();
        blobs.put("b", "k", content.clone());
        let acks = InMemoryAckPublisher::new();
        let pointer_id = Uuid::new_v4();
        let sha256 = hex::encode(Sha256::digest(&content));
        let body = pointer_body(pointer_id, Some(&sha256));

        let disposition = handle("branch1", &blobs, &acks, &body).await;

        assert_eq!(disposition, Disposition::Ack);
        let published = acks.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].pointer_id, pointer_id);
        assert_eq!(published[0].recipient_id, "branch1");
        assert_eq!(published[0].recipients_total, 2);
    }

    #[tokio::test]
    async fn missing_sha256_skips_verification_and_still_acks() {
        let blobs = InMemoryBlobStore::new();
        blobs.put("b", "k", b"unsigned content".to_vec());
        let acks = InMemoryAckPublisher::new();
        let pointer_id = Uuid::new_v4();
        let body = pointer_body(pointer_id, None);

        let disposition = handle("branch1", &blobs, &acks, &body).await;

        assert_eq!(disposition, Disposition::Ack);
        assert_eq!(acks.published().len(), 1);
    }
}
