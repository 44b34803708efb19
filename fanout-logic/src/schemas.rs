//! Wire schemas for the two message kinds that travel over the bus:
//! `s3-pointer-v1` (producer -> branch consumers + coordinator) and
//! `s3-ack-v1` (branch consumer -> coordinator).
//!
//! Both are modeled as `#[serde(tag = "schema")]` enums with a catch-all
//! `Unknown` variant so a forward-compatible schema bump deserializes
//! instead of failing: unrecognized schemas are inert, not fatal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "schema")]
pub enum PointerMessage {
    #[serde(rename = "s3-pointer-v1")]
    V1(PointerV1),
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PointerV1 {
    pub pointer_id: Uuid,
    pub bucket: String,
    pub key: String,
    #[serde(default = "default_encoding")]
    pub encoding: String,
    #[serde(default = "default_content_type")]
    pub content_type: String,
    #[serde(default)]
    pub size_raw: Option<u64>,
    #[serde(default)]
    pub size_gz: Option<u64>,
    #[serde(default)]
    pub sha256: Option<String>,
    pub recipients_total: u32,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

fn default_encoding() -> String {
    "gzip".to_string()
}

fn default_content_type() -> String {
    "application/json".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "schema")]
pub enum AckMessage {
    #[serde(rename = "s3-ack-v1")]
    V1(AckV1),
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AckV1 {
    pub pointer_id: Uuid,
    pub bucket: String,
    pub key: String,
    pub recipient_id: String,
    #[serde(default = "default_status")]
    pub status: String,
    pub processed_at: DateTime<Utc>,
    pub recipients_total: u32,
}

fn default_status() -> String {
    "processed".to_string()
}

impl AckV1 {
    pub fn message_id(&self) -> String {
        format!("{}:{}", self.pointer_id, self.recipient_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pointer_v1_round_trips() {
        let json = serde_json::json!({
            "schema": "s3-pointer-v1",
            "pointer_id": "11111111-1111-1111-1111-111111111111",
            "bucket": "1c-exchange",
            "key": "demo/2026/07/28/x.json.gz",
            "encoding": "gzip",
            "content_type": "application/json",
            "size_raw": 100,
            "size_gz": 40,
            "sha256": "a".repeat(64),
            "recipients_total": 3,
            "created_at": "2026-07-28T00:00:00Z",
        });
        let msg: PointerMessage = serde_json::from_value(json).unwrap();
        match msg {
            PointerMessage::V1(p) => {
                assert_eq!(p.recipients_total, 3);
                assert_eq!(p.bucket, "1c-exchange");
            }
            PointerMessage::Unknown => panic!("expected V1"),
        }
    }

    #[test]
    fn unknown_schema_is_inert() {
        let json = serde_json::json!({"schema": "some-future-schema", "whatever": 1});
        let msg: PointerMessage = serde_json::from_value(json).unwrap();
        assert_eq!(msg, PointerMessage::Unknown);
    }

    #[test]
    fn ack_v1_defaults_status_to_processed() {
        let json = serde_json::json!({
            "schema": "s3-ack-v1",
            "pointer_id": "11111111-1111-1111-1111-111111111111",
            "bucket": "b",
            "key": "k",
            "recipient_id": "branch1",
            "processed_at": "2026-07-28T00:00:00Z",
            "recipients_total": 1,
        });
        let msg: AckMessage = serde_json::from_value(json).unwrap();
        match msg {
            AckMessage::V1(a) => assert_eq!(a.status, "processed"),
            AckMessage::Unknown => panic!("expected V1"),
        }
    }
}
