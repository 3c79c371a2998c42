/*!
 * Two-level envelope decoding.
 *
 * A queue message body is a topic envelope whose `Message` field holds a
 * store event. Decoding unwraps both layers in a fixed order and reports one
 * of three outcomes: work units, "not applicable" (a well-formed message that
 * is not a change notification), or a `DecodeError` scoped to the message.
 */

use log::debug;

use super::WorkUnit;
use super::envelope::{ChangeRecord, StoreEvent, TopicEnvelope, decode_object_key};
use crate::errors::DecodeError;

/// Why a well-formed message carried no work
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotApplicable {
    /// The topic envelope has no `Message` payload
    NoTopicMessage,
    /// The payload is not a change-record list (e.g. a store test event)
    NoChangeRecords,
}

/// Result of decoding one queue message
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    /// Change records decoded into units, in record order
    Units(Vec<WorkUnit>),
    /// Nothing to do for this message
    NotApplicable(NotApplicable),
}

impl Decoded {
    /// Units carried by the message, empty when not applicable
    pub fn into_units(self) -> Vec<WorkUnit> {
        match self {
            Self::Units(units) => units,
            Self::NotApplicable(_) => Vec::new(),
        }
    }
}

/// Decode a queue message body into work units
pub fn decode_message(message_id: &str, body: &str) -> Result<Decoded, DecodeError> {
    let envelope: TopicEnvelope = serde_json::from_str(body).map_err(DecodeError::Envelope)?;

    let Some(payload) = envelope.message.as_deref() else {
        debug!("Message {} has no topic payload, skipping", message_id);
        return Ok(Decoded::NotApplicable(NotApplicable::NoTopicMessage));
    };

    let event: StoreEvent = serde_json::from_str(payload).map_err(DecodeError::Payload)?;

    let Some(records) = event.records else {
        debug!("Message {} carries no change records, skipping", message_id);
        return Ok(Decoded::NotApplicable(NotApplicable::NoChangeRecords));
    };

    records
        .into_iter()
        .map(|record| unit_from_record(message_id, record))
        .collect::<Result<Vec<_>, _>>()
        .map(Decoded::Units)
}

fn unit_from_record(message_id: &str, record: ChangeRecord) -> Result<WorkUnit, DecodeError> {
    let source_key = decode_object_key(&record.s3.object.key)?;

    Ok(WorkUnit {
        source_bucket: record.s3.bucket.name,
        source_key,
        event_time: record.event_time,
        size: record.s3.object.size,
        message_id: message_id.to_string(),
    })
}
