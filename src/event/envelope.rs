/*!
 * Wire formats for change notifications.
 *
 * Two layers travel through the pipeline. The inner layer is the store event
 * (`{"Records": [...]}`) produced by an object store; the outer layer is the
 * topic envelope that carries the store event as a JSON *string* in its
 * `Message` field. A queue message body is exactly one topic envelope.
 *
 * Field names follow the S3/SNS notification formats so real notifications
 * decode with the same types.
 */

use chrono::{DateTime, Utc};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};
use serde::{Deserialize, Serialize};

use crate::errors::DecodeError;

/// Envelope type written by topics for ordinary messages
pub const NOTIFICATION_TYPE: &str = "Notification";

/// Event name emitted by stores for a completed write
pub const OBJECT_CREATED_PUT: &str = "ObjectCreated:Put";

/// Event source emitted by the stores in this crate
pub const EVENT_SOURCE: &str = "translate-relay:store";

/// Characters left as-is in an encoded key; everything else is escaped
const KEY_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b'/');

/// Topic envelope as it sits in a queue message body
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TopicEnvelope {
    /// Envelope type, `Notification` for published messages
    #[serde(rename = "Type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    /// Unique id assigned by the topic on publish
    #[serde(rename = "MessageId", default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,

    /// Name of the publishing topic
    #[serde(rename = "TopicArn", default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,

    /// Optional subject line
    #[serde(rename = "Subject", default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,

    /// The published payload, itself a JSON document encoded as a string
    #[serde(rename = "Message", default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Publish time
    #[serde(rename = "Timestamp", default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Store event: the inner payload of a topic envelope
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct StoreEvent {
    /// Change records; absent for test events and other control messages
    #[serde(rename = "Records", default, skip_serializing_if = "Option::is_none")]
    pub records: Option<Vec<ChangeRecord>>,
}

/// One change record inside a store event
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChangeRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_source: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_time: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_name: Option<String>,

    /// Bucket and object the record refers to
    pub s3: StoreEntity,
}

/// Bucket/object pair of a change record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoreEntity {
    pub bucket: BucketRef,
    pub object: ObjectRef,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BucketRef {
    pub name: String,
}

/// Object reference; `key` is in its encoded wire form
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ObjectRef {
    pub key: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,

    #[serde(rename = "eTag", default, skip_serializing_if = "Option::is_none")]
    pub e_tag: Option<String>,
}

/// Encode an object key the way object stores write it into notifications.
///
/// Spaces become `+`, a literal `+` becomes `%2B`, and every other byte
/// outside the unreserved set (and `/`) is percent-escaped.
pub fn encode_object_key(key: &str) -> String {
    utf8_percent_encode(key, KEY_ENCODE_SET)
        .to_string()
        .replace("%20", "+")
}

/// Decode an object key from its notification form.
///
/// `+` must be turned into a space before percent-decoding, otherwise an
/// encoded literal plus (`%2B`) would be indistinguishable from a space.
pub fn decode_object_key(encoded: &str) -> Result<String, DecodeError> {
    let spaced = encoded.replace('+', " ");
    percent_decode_str(&spaced)
        .decode_utf8()
        .map(|decoded| decoded.into_owned())
        .map_err(|e| DecodeError::Key {
            key: encoded.to_string(),
            reason: e.to_string(),
        })
}
