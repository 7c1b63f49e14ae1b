//! Core identifier and timestamp types for the event store.
//!
//! All types follow the "parse, don't validate" principle: smart constructors
//! guarantee validity at construction time, so a value that exists is a value
//! that is valid.
//!
//! - [`StreamId`]: non-empty, trimmed, at most 255 characters
//! - [`EventType`]: one tag from the closed set declared at store construction
//! - [`ContextKey`]: key of a stream-to-context index entry
//! - [`ReducerName`]: name under which reducer snapshots are stored
//! - [`EventId`]: always a valid UUIDv7, giving time-based ordering
//! - [`Timestamp`]: UTC instant with microsecond precision and a
//!   lexicographically sortable at-rest form

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use nutype::nutype;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

/// A unique identifier for an event stream.
///
/// A `StreamId` names the aggregate an event belongs to and is the unit of
/// ordered event history. The store itself treats it as opaque.
///
/// # Guarantees
///
/// Once constructed, a `StreamId` is non-empty (after trimming whitespace)
/// and at most 255 characters long.
///
/// # Examples
///
/// ```
/// use eventline::StreamId;
///
/// let stream = StreamId::try_new("user-123").expect("valid stream id");
/// assert_eq!(stream.as_ref(), "user-123");
///
/// assert!(StreamId::try_new("").is_err());
/// assert!(StreamId::try_new("a".repeat(256)).is_err());
/// ```
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 255),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        AsRef,
        Deref,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct StreamId(String);

impl StreamId {
    /// Creates a fresh, globally unique stream id.
    ///
    /// Used when an event is appended without naming a stream: the record
    /// gets a stream of its own. Fresh ids are UUIDv7 strings, so streams
    /// created later sort after streams created earlier.
    pub fn fresh() -> Self {
        Self::try_new(Uuid::now_v7().to_string())
            .expect("a UUID string is never empty nor over 255 characters")
    }
}

/// The type tag of an event.
///
/// Event types form a closed enumeration declared when the store is built.
/// Validators for `data` and `meta` payloads are keyed by this tag, as are
/// projector handlers and context reducers.
///
/// # Examples
///
/// ```
/// use eventline::EventType;
///
/// let opened = EventType::try_new("account:opened").expect("valid type");
/// assert_eq!(opened.as_ref(), "account:opened");
/// ```
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 255),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        AsRef,
        Deref,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct EventType(String);

/// The key of a context index entry.
///
/// Contexts are a secondary index from an opaque key to the set of streams
/// currently associated with it. Context reducers derive keys from event
/// payloads; readers query the derived set.
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 255),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        AsRef,
        Deref,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct ContextKey(String);

/// The name of a reducer, used as half of a snapshot's primary key.
///
/// Snapshots are stored per `(name, key)` pair, so two reducers folding the
/// same stream never clobber each other's checkpoints.
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 255),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        AsRef,
        Deref,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct ReducerName(String);

/// A globally unique event identifier in UUIDv7 format.
///
/// `EventId` identifies a record across the whole store. UUIDv7 carries a
/// timestamp component, so ids created later compare greater, which makes
/// `(created, id)` a total order within a stream and the id a usable
/// tiebreaker for reads.
///
/// # Examples
///
/// ```
/// use eventline::EventId;
/// use uuid::Uuid;
///
/// let id = EventId::new();
/// assert_ne!(id, EventId::new());
///
/// // Only v7 values are accepted.
/// assert!(EventId::try_new(Uuid::nil()).is_err());
/// ```
#[nutype(
    validate(predicate = |id: &Uuid| id.get_version() == Some(uuid::Version::SortRand)),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        AsRef,
        Deref,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct EventId(Uuid);

impl EventId {
    /// Creates a new `EventId` stamped with the current time.
    pub fn new() -> Self {
        Self::try_new(Uuid::now_v7()).expect("Uuid::now_v7() always returns a valid v7 UUID")
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

/// A UTC instant with microsecond precision.
///
/// `Timestamp` is both the per-stream ordering key (`created`) and the global
/// read cursor. Precision is fixed at microseconds so that:
///
/// - the serialized form (`2024-01-15T10:30:00.000123Z`) has a fixed width
///   and sorts lexicographically in the same order as the instants themselves,
/// - [`Timestamp::bump`] advances by the smallest representable step, which
///   is how `(stream, created)` collisions between concurrent writers are
///   resolved without reordering the stream.
///
/// # Examples
///
/// ```
/// use eventline::Timestamp;
///
/// let t = Timestamp::now();
/// let next = t.bump();
/// assert!(next > t);
/// assert_eq!(next.as_datetime().timestamp_micros(), t.as_datetime().timestamp_micros() + 1);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Creates a timestamp from a UTC `DateTime`, truncating to microseconds.
    ///
    /// Truncation keeps every timestamp representable in the at-rest form;
    /// two instants that serialize equal are equal.
    pub fn new(datetime: DateTime<Utc>) -> Self {
        let micros = datetime.timestamp_micros();
        Self(
            DateTime::from_timestamp_micros(micros)
                .expect("a datetime's own microsecond count is always in range"),
        )
    }

    /// Creates a timestamp for the current moment.
    pub fn now() -> Self {
        Self::new(Utc::now())
    }

    /// Returns the timestamp one microsecond later.
    ///
    /// This is the minimal step by which a `created` value can be advanced
    /// while preserving per-stream order.
    #[must_use]
    pub fn bump(self) -> Self {
        Self(self.0 + Duration::microseconds(1))
    }

    /// Returns a reference to the underlying `DateTime`.
    pub const fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }

    /// Consumes the timestamp and returns the inner `DateTime<Utc>`.
    pub const fn into_datetime(self) -> DateTime<Utc> {
        self.0
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(datetime: DateTime<Utc>) -> Self {
        Self::new(datetime)
    }
}

impl From<Timestamp> for DateTime<Utc> {
    fn from(timestamp: Timestamp) -> Self {
        timestamp.into_datetime()
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_rfc3339_opts(SecondsFormat::Micros, true))
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        let parsed = DateTime::parse_from_rfc3339(&s).map_err(serde::de::Error::custom)?;
        Ok(Self::new(parsed.with_timezone(&Utc)))
    }
}
