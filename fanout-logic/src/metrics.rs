use lazy_static::lazy_static;
use prometheus::{register_histogram, register_int_counter, Histogram, IntCounter};

lazy_static! {
    pub static ref POINTERS_PROCESSED_TOTAL: IntCounter = register_int_counter!(
        "fanout_pointers_processed_total",
        "total number of s3-pointer-v1 messages the pointer handler committed",
    )
    .unwrap();
    pub static ref ACKS_PROCESSED_TOTAL: IntCounter = register_int_counter!(
        "fanout_acks_processed_total",
        "total number of s3-ack-v1 messages the ack handler committed",
    )
    .unwrap();
    pub static ref ACKS_DUPLICATE_TOTAL: IntCounter = register_int_counter!(
        "fanout_acks_duplicate_total",
        "number of acks collapsed as duplicates by the (pointer_id, recipient_id) unique constraint",
    )
    .unwrap();
    pub static ref DELETIONS_COMMITTED_TOTAL: IntCounter = register_int_counter!(
        "fanout_deletions_committed_total",
        "number of pointer_ids for which deleted_at was successfully claimed",
    )
    .unwrap();
    pub static ref BLOB_DELETE_FAILURES_TOTAL: IntCounter = register_int_counter!(
        "fanout_blob_delete_failures_total",
        "number of blob deletes that failed after deleted_at was already committed",
    )
    .unwrap();
    pub static ref ACK_HANDLER_TRANSACTION_TIME: Histogram = register_histogram!(
        "fanout_ack_handler_transaction_seconds",
        "time spent in the ack handler's per-message database transaction",
    )
    .unwrap();
    pub static ref CONSUMER_POISON_MESSAGES_TOTAL: IntCounter = register_int_counter!(
        "fanout_consumer_poison_messages_total",
        "number of sha256 mismatches observed by the pointer consumer",
    )
    .unwrap();
    pub static ref CONSUMER_ACKS_PUBLISHED_TOTAL: IntCounter = register_int_counter!(
        "fanout_consumer_acks_published_total",
        "number of s3-ack-v1 messages published back to the coordinator",
    )
    .unwrap();
    pub static ref CONSUMER_BLOBS_MISSING_TOTAL: IntCounter = register_int_counter!(
        "fanout_consumer_blobs_missing_total",
        "number of pointer deliveries whose blob was already gone when fetched",
    )
    .unwrap();
}
