/*!
 * Change events and their decoding into work units.
 *
 * - `envelope`: wire formats for store events and topic envelopes
 * - `decode`: the two-level envelope decoder used by batch workers
 */

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use self::envelope::{
    BucketRef, ChangeRecord, EVENT_SOURCE, OBJECT_CREATED_PUT, ObjectRef, StoreEntity, StoreEvent,
    encode_object_key,
};

pub mod decode;
pub mod envelope;

pub use self::decode::{Decoded, decode_message};

/// A single object-store mutation, as produced by a store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// Bucket the object was written to
    pub bucket: String,
    /// Object key in plain (decoded) form
    pub key: String,
    /// When the write completed
    pub event_time: DateTime<Utc>,
    /// Size of the written object in bytes
    pub size: u64,
    /// Content hash of the written object
    pub etag: String,
}

impl ChangeEvent {
    /// Convert to the wire record, encoding the key
    pub fn to_record(&self) -> ChangeRecord {
        ChangeRecord {
            event_version: Some("2.1".to_string()),
            event_source: Some(EVENT_SOURCE.to_string()),
            event_time: Some(self.event_time),
            event_name: Some(OBJECT_CREATED_PUT.to_string()),
            s3: StoreEntity {
                bucket: BucketRef {
                    name: self.bucket.clone(),
                },
                object: ObjectRef {
                    key: encode_object_key(&self.key),
                    size: Some(self.size),
                    e_tag: Some(self.etag.clone()),
                },
            },
        }
    }

    /// Render the store event payload carrying just this change
    pub fn to_store_event_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&StoreEvent {
            records: Some(vec![self.to_record()]),
        })
    }
}

/// Decoded, validated unit of work derived from one change record.
///
/// Lives only for the duration of one processing attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkUnit {
    pub source_bucket: String,
    pub source_key: String,
    pub event_time: Option<DateTime<Utc>>,
    pub size: Option<u64>,
    /// Id of the queue message the unit came from
    pub message_id: String,
}

impl std::fmt::Display for WorkUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.source_bucket, self.source_key)
    }
}
