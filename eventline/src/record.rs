//! Event record construction.
//!
//! [`make_event`] is the only way records enter the system: it stamps id and
//! timestamps, fills defaults, and performs no I/O and no validation. The
//! validator registry and the append protocol live elsewhere; the factory is
//! a pure function over its inputs plus the clock.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{EventId, EventType, StreamId, Timestamp};

/// An immutable, validated entry in the event log.
///
/// Records are append-only: once inserted they never change. Within a stream,
/// `(created, id)` is a total order, and the store guarantees no two records
/// of the same stream share a `created` value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Globally unique, time-ordered identifier.
    pub id: EventId,
    /// The stream this record belongs to.
    pub stream: StreamId,
    /// One tag from the closed set declared at store construction.
    #[serde(rename = "type")]
    pub event_type: EventType,
    /// Structured payload conforming to the data schema for `event_type`.
    pub data: Value,
    /// Structured metadata conforming to the meta schema for `event_type`.
    pub meta: Value,
    /// Per-stream ordering key and global read cursor.
    pub created: Timestamp,
    /// Server-side acceptance time, stamped at insert.
    pub recorded: Timestamp,
}

impl EventRecord {
    /// Returns a content fingerprint over `(stream, type, data, meta)`.
    ///
    /// Two records with the same id are the same event only if their
    /// fingerprints match; a duplicate id over a different fingerprint is a
    /// conflict, not an idempotent replay. Serialized JSON is used for the
    /// payload portion because `serde_json` keeps object keys sorted, making
    /// the text form canonical.
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.stream.as_ref().hash(&mut hasher);
        self.event_type.as_ref().hash(&mut hasher);
        self.data.to_string().hash(&mut hasher);
        self.meta.to_string().hash(&mut hasher);
        hasher.finish()
    }
}

/// Caller input for a new event.
///
/// Only the type is required. A missing stream means the record gets a fresh
/// stream of its own; missing payloads default to empty objects.
///
/// # Examples
///
/// ```
/// use eventline::{EventType, NewEvent, StreamId};
/// use serde_json::json;
///
/// let input = NewEvent::new(EventType::try_new("user:created").unwrap())
///     .stream(StreamId::try_new("user-1").unwrap())
///     .data(json!({ "name": "Jane" }));
/// let record = eventline::make_event(input);
/// assert_eq!(record.stream.as_ref(), "user-1");
/// ```
#[derive(Debug, Clone)]
pub struct NewEvent {
    event_type: EventType,
    stream: Option<StreamId>,
    data: Option<Value>,
    meta: Option<Value>,
}

impl NewEvent {
    /// Starts a new event of the given type.
    pub const fn new(event_type: EventType) -> Self {
        Self {
            event_type,
            stream: None,
            data: None,
            meta: None,
        }
    }

    /// Targets an existing stream instead of a fresh one.
    #[must_use]
    pub fn stream(mut self, stream: StreamId) -> Self {
        self.stream = Some(stream);
        self
    }

    /// Sets the data payload.
    #[must_use]
    pub fn data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Sets the metadata payload.
    #[must_use]
    pub fn meta(mut self, meta: Value) -> Self {
        self.meta = Some(meta);
        self
    }
}

// Last `created` handed out by this process. `make_event` never reuses a
// value even if the wall clock stalls or steps backwards.
static LAST_CREATED: Mutex<Option<DateTime<Utc>>> = Mutex::new(None);

fn next_created() -> Timestamp {
    let now = Timestamp::now();
    let mut last = LAST_CREATED
        .lock()
        .expect("created-clock mutex is never poisoned: the critical section cannot panic");
    let next = match *last {
        Some(prev) if *now.as_datetime() <= prev => Timestamp::new(prev).bump(),
        _ => now,
    };
    *last = Some(*next.as_datetime());
    next
}

/// Builds a canonical record from caller input.
///
/// Stamps a fresh time-ordered [`EventId`], assigns `created` from a
/// process-local monotonic wall clock, and sets `recorded = created` until
/// the storage provider overwrites it at insert. Pure apart from the clock:
/// no I/O, no validation.
pub fn make_event(input: NewEvent) -> EventRecord {
    let created = next_created();
    EventRecord {
        id: EventId::new(),
        stream: input.stream.unwrap_or_else(StreamId::fresh),
        event_type: input.event_type,
        data: input.data.unwrap_or_else(|| Value::Object(Default::default())),
        meta: input.meta.unwrap_or_else(|| Value::Object(Default::default())),
        created,
        recorded: created,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event_type(tag: &str) -> EventType {
        EventType::try_new(tag).unwrap()
    }

    #[test]
    fn defaults_are_fresh_stream_and_empty_payloads() {
        let record = make_event(NewEvent::new(event_type("ping")));
        assert_eq!(record.data, json!({}));
        assert_eq!(record.meta, json!({}));
        assert_eq!(record.created, record.recorded);
        // The fresh stream is a parseable UUID.
        assert!(uuid::Uuid::parse_str(record.stream.as_ref()).is_ok());
    }

    #[test]
    fn explicit_fields_are_kept() {
        let stream = StreamId::try_new("s1").unwrap();
        let record = make_event(
            NewEvent::new(event_type("user:created"))
                .stream(stream.clone())
                .data(json!({ "name": "Jane" }))
                .meta(json!({ "actor": "test" })),
        );
        assert_eq!(record.stream, stream);
        assert_eq!(record.data["name"], "Jane");
        assert_eq!(record.meta["actor"], "test");
    }

    #[test]
    fn created_is_strictly_monotonic() {
        let records: Vec<_> = (0..100)
            .map(|_| make_event(NewEvent::new(event_type("tick"))))
            .collect();
        for pair in records.windows(2) {
            assert!(
                pair[1].created > pair[0].created,
                "created must be strictly increasing within a process"
            );
        }
    }

    #[test]
    fn fingerprint_ignores_id_and_timestamps() {
        let stream = StreamId::try_new("s1").unwrap();
        let a = make_event(
            NewEvent::new(event_type("user:created"))
                .stream(stream.clone())
                .data(json!({ "name": "Jane" })),
        );
        let mut b = a.clone();
        b.id = EventId::new();
        b.created = b.created.bump();
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn fingerprint_differs_on_payload() {
        let stream = StreamId::try_new("s1").unwrap();
        let a = make_event(
            NewEvent::new(event_type("user:created"))
                .stream(stream.clone())
                .data(json!({ "name": "Jane" })),
        );
        let mut b = a.clone();
        b.data = json!({ "name": "John" });
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn record_serde_roundtrip_uses_type_field() {
        let record = make_event(
            NewEvent::new(event_type("user:created")).data(json!({ "name": "Jane" })),
        );
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["type"], "user:created");
        let back: EventRecord = serde_json::from_value(value).unwrap();
        assert_eq!(back, record);
    }
}
