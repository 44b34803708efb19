//! Coordinator - ACK Handler: counts acknowledgements and drives the
//! deletion transition. The deletion gate and the CAS claim happen
//! outside the per-ack transaction, exactly as the data model requires;
//! the blob delete happens outside the database entirely.

use super::Disposition;
use crate::{
    blob_store::BlobStore,
    metrics,
    schemas::AckMessage,
    store::Store,
};
use uuid::Uuid;

pub async fn handle(store: &dyn Store, blob_store: &dyn BlobStore, body: &[u8]) -> Disposition {
    let message: AckMessage = match serde_json::from_slice(body) {
        Ok(message) => message,
        Err(error) => {
            tracing::warn!(%error, "malformed ack message, ack-and-drop");
            return Disposition::Ack;
        }
    };

    let ack = match message {
        AckMessage::V1(ack) => ack,
        AckMessage::Unknown => {
            tracing::info!("unrecognized ack schema, ack-and-drop");
            return Disposition::Ack;
        }
    };

    let timer = metrics::ACK_HANDLER_TRANSACTION_TIME.start_timer();
    let tally = match store.record_ack(&ack).await {
        Ok(tally) => tally,
        Err(error) => {
            timer.stop_and_discard();
            tracing::warn!(
                pointer_id = %ack.pointer_id,
                recipient_id = %ack.recipient_id,
                %error,
                "failed to record ack, requeueing"
            );
            return Disposition::NackRequeue;
        }
    };
    timer.observe_duration();

    if tally.ack_was_new {
        metrics::ACKS_PROCESSED_TOTAL.inc();
    } else {
        metrics::ACKS_DUPLICATE_TOTAL.inc();
    }
    tracing::info!(
        pointer_id = %ack.pointer_id,
        recipient_id = %ack.recipient_id,
        ack_count = tally.ack_count,
        recipients_total = ?tally.recipients_total,
        "ack stored"
    );

    if !tally.passes_deletion_gate() {
        return Disposition::Ack;
    }

    try_complete_deletion(store, blob_store, ack.pointer_id).await;
    Disposition::Ack
}

/// Attempts the CAS claim and, on a win, the out-of-transaction blob
/// delete. A loss (another worker already claimed it) and a blob-delete
/// failure both still result in the bus delivery being acked: the
/// database already owns the "deleted" fact either way, and retrying the
/// ACK message cannot repair a transient store outage.
async fn try_complete_deletion(store: &dyn Store, blob_store: &dyn BlobStore, pointer_id: Uuid) {
    let claim = match store.try_claim_delete(pointer_id).await {
        Ok(claim) => claim,
        Err(error) => {
            // The CAS transaction itself failed to complete; deleted_at
            // was not committed. A later ACK redelivery will re-evaluate
            // the gate and retry the claim.
            tracing::warn!(%pointer_id, %error, "deletion claim failed, will retry on next ack");
            return;
        }
    };

    let Some((bucket, object_key)) = claim else {
        tracing::debug!(%pointer_id, "deletion already claimed by another worker");
        return;
    };

    metrics::DELETIONS_COMMITTED_TOTAL.inc();
    match blob_store.delete(&bucket, &object_key).await {
        Ok(()) => {
            tracing::info!(%pointer_id, %bucket, %object_key, "blob deleted");
        }
        Err(error) => {
            metrics::BLOB_DELETE_FAILURES_TOTAL.inc();
            tracing::error!(
                %pointer_id, %bucket, %object_key, %error,
                "blob delete failed after deleted_at was committed; leaving for reconciliation"
            );
        }
    }
}
