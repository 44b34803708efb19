//! Coordinator - Pointer Handler: establishes or upgrades the authoritative
//! object row. One transaction per message (inside `Store::upsert_pointer`),
//! bus ack after commit.

use super::Disposition;
use crate::{
    metrics,
    schemas::PointerMessage,
    store::Store,
};

pub async fn handle(store: &dyn Store, body: &[u8]) -> Disposition {
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

    match store.upsert_pointer(&pointer).await {
        Ok(()) => {
            metrics::POINTERS_PROCESSED_TOTAL.inc();
            tracing::info!(pointer_id = %pointer.pointer_id, "pointer stored");
            Disposition::Ack
        }
        Err(error) => {
            tracing::warn!(
                pointer_id = %pointer.pointer_id,
                %error,
                "failed to store pointer, requeueing"
            );
            Disposition::NackRequeue
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{AckTally, StoreError};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use uuid::Uuid;

    #[derive(Default)]
    struct RecordingStore {
        upserted: Mutex<Vec<crate::schemas::PointerV1>>,
    }

    #[async_trait]
    impl Store for RecordingStore {
        async fn upsert_pointer(&self, pointer: &crate::schemas::PointerV1) -> Result<(), StoreError> {
            self.upserted.lock().unwrap().push(pointer.clone());
            Ok(())
        }
        async fn record_ack(&self, _ack: &crate::schemas::AckV1) -> Result<AckTally, StoreError> {
            unreachable!()
        }
        async fn try_claim_delete(
            &self,
            _pointer_id: Uuid,
        ) -> Result<Option<(String, String)>, StoreError> {
            unreachable!()
        }
    }

    #[tokio::test]
    async fn unknown_schema_is_acked_without_storing() {
        let store = RecordingStore::default();
        let body = serde_json::to_vec(&serde_json::json!({"schema": "future-v7"})).unwrap();
        let disposition = handle(&store, &body).await;
        assert_eq!(disposition, Disposition::Ack);
        assert!(store.upserted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn malformed_body_is_acked_without_storing() {
        let store = RecordingStore::default();
        let disposition = handle(&store, b"not json").await;
        assert_eq!(disposition, Disposition::Ack);
        assert!(store.upserted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn valid_pointer_is_stored_and_acked() {
        let store = RecordingStore::default();
        let pointer_id = Uuid::new_v4();
        let body = serde_json::to_vec(&serde_json::json!({
            "schema": "s3-pointer-v1",
            "pointer_id": pointer_id,
            "bucket": "b",
            "key": "k",
            "recipients_total": 2,
        }))
        .unwrap();
        let disposition = handle(&store, &body).await;
        assert_eq!(disposition, Disposition::Ack);
        let upserted = store.upserted.lock().unwrap();
        assert_eq!(upserted.len(), 1);
        assert_eq!(upserted[0].pointer_id, pointer_id);
    }
}
