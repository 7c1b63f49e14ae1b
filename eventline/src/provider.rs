//! Storage provider contracts.
//!
//! Three port traits back the store: [`EventProvider`] for the append-only
//! event log, [`ContextProvider`] for the stream-to-context index, and
//! [`SnapshotProvider`] for reducer checkpoints. The traits are
//! backend-independent; any embedded or server SQL engine can implement
//! them, and `eventline-memory` ships in-memory implementations for tests
//! and single-process deployments.
//!
//! All implementations must be safe to call from concurrent writers. The
//! store composes them; providers never call each other.

use async_trait::async_trait;
use serde_json::Value;

use crate::errors::ProviderResult;
use crate::record::EventRecord;
use crate::types::{ContextKey, EventId, EventType, ReducerName, StreamId, Timestamp};

/// Read direction for event queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    /// Ascending `(created, id)` order, oldest first.
    #[default]
    Forward,
    /// Descending `(created, id)` order, newest first.
    Backward,
}

/// Configuration for event reads.
///
/// Reads are always totally ordered by `(created, id)`; `direction` selects
/// which end to start from. The cursor is strictly exclusive: `Forward`
/// returns records with `created` strictly greater than the cursor,
/// `Backward` strictly less.
///
/// # Examples
///
/// ```
/// use eventline::{Direction, EventType, ReadOptions, Timestamp};
///
/// let options = ReadOptions::new()
///     .with_types(vec![EventType::try_new("user:created").unwrap()])
///     .with_cursor(Timestamp::now())
///     .with_direction(Direction::Backward);
/// assert_eq!(options.direction, Direction::Backward);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ReadOptions {
    /// Restrict results to these event types. `None` means all types.
    pub types: Option<Vec<EventType>>,
    /// Exclusive cursor on `created`.
    pub cursor: Option<Timestamp>,
    /// Which end of the order to read from.
    pub direction: Direction,
}

impl ReadOptions {
    /// Creates read options with default values: all types, no cursor,
    /// forward.
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts results to the given event types.
    #[must_use]
    pub fn with_types(mut self, types: Vec<EventType>) -> Self {
        self.types = Some(types);
        self
    }

    /// Sets the exclusive read cursor.
    #[must_use]
    pub fn with_cursor(mut self, cursor: Timestamp) -> Self {
        self.cursor = Some(cursor);
        self
    }

    /// Sets the read direction.
    #[must_use]
    pub const fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    /// Whether a record passes this filter, cursor included.
    ///
    /// Provided for implementations; SQL backends will usually push the
    /// equivalent predicate into the query instead.
    pub fn admits(&self, record: &EventRecord) -> bool {
        if let Some(types) = &self.types {
            if !types.contains(&record.event_type) {
                return false;
            }
        }
        match (self.cursor, self.direction) {
            (Some(cursor), Direction::Forward) => record.created > cursor,
            (Some(cursor), Direction::Backward) => record.created < cursor,
            (None, _) => true,
        }
    }
}

/// Port for the append-only `events` table.
///
/// Uniqueness contract: one record per `id`, one record per
/// `(stream, created)` pair. Violations are reported as
/// [`ProviderError::DuplicateEventId`](crate::ProviderError::DuplicateEventId)
/// and
/// [`ProviderError::CreatedConflict`](crate::ProviderError::CreatedConflict);
/// the store's append protocol decides what to do with them.
#[async_trait]
pub trait EventProvider: Send + Sync {
    /// Appends one record, returning it as stored.
    ///
    /// The provider stamps `recorded` with its own acceptance time; every
    /// other field is written as given.
    async fn insert(&self, record: EventRecord) -> ProviderResult<EventRecord>;

    /// Appends a set of records in a single transaction.
    ///
    /// All-or-nothing: if any record violates a uniqueness constraint, no
    /// record is persisted. Implementations may chunk the write internally
    /// (a batch size of 1000 is customary for SQL backends), but the call is
    /// externally observable as one transaction. Returns the records as
    /// stored, in input order.
    async fn insert_many(&self, records: Vec<EventRecord>) -> ProviderResult<Vec<EventRecord>>;

    /// Looks up a record by id.
    async fn get_by_id(&self, id: &EventId) -> ProviderResult<Option<EventRecord>>;

    /// Reads the whole store in `(created, id)` order.
    async fn get(&self, options: &ReadOptions) -> ProviderResult<Vec<EventRecord>>;

    /// Reads one stream in `(created, id)` order.
    async fn get_by_stream(
        &self,
        stream: &StreamId,
        options: &ReadOptions,
    ) -> ProviderResult<Vec<EventRecord>>;

    /// Reads the union of several streams in `(created, id)` order.
    async fn get_by_streams(
        &self,
        streams: &[StreamId],
        options: &ReadOptions,
    ) -> ProviderResult<Vec<EventRecord>>;

    /// Whether a record with the same stream and type exists with a strictly
    /// greater `created`.
    async fn check_outdated(
        &self,
        stream: &StreamId,
        event_type: &EventType,
        created: Timestamp,
    ) -> ProviderResult<bool>;
}

/// One operation on the context index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextOp {
    /// Associate the stream with the key.
    Insert,
    /// Dissociate the stream from the key.
    Remove,
}

/// An entry in the append-only `contexts` table.
///
/// The current set of streams for a key is the sequential replay of its
/// entries; removing a stream that was never inserted is a no-op.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ContextEntry {
    /// The context key.
    pub key: ContextKey,
    /// Insert or remove.
    pub op: ContextOp,
    /// The stream being associated or dissociated.
    pub stream: StreamId,
}

impl ContextEntry {
    /// An insert entry.
    pub const fn insert(key: ContextKey, stream: StreamId) -> Self {
        Self {
            key,
            op: ContextOp::Insert,
            stream,
        }
    }

    /// A remove entry.
    pub const fn remove(key: ContextKey, stream: StreamId) -> Self {
        Self {
            key,
            op: ContextOp::Remove,
            stream,
        }
    }
}

/// Port for the append-only `contexts` table.
#[async_trait]
pub trait ContextProvider: Send + Sync {
    /// Applies one entry.
    async fn handle(&self, entry: ContextEntry) -> ProviderResult<()>;

    /// The distinct streams currently associated with a key, in first-insert
    /// order.
    async fn get_by_key(&self, key: &ContextKey) -> ProviderResult<Vec<StreamId>>;
}

/// A reducer checkpoint.
///
/// Snapshots are advisory cache entries: deleting or rebuilding one never
/// affects correctness, only the cost of the next fold.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Snapshot {
    /// The reducer this checkpoint belongs to.
    pub name: ReducerName,
    /// The stream or context key that was folded.
    pub key: String,
    /// `created` of the last folded event.
    pub cursor: Timestamp,
    /// The reducer's state at the cursor.
    pub state: Value,
}

/// Port for the `snapshots` table, keyed by `(name, key)`.
#[async_trait]
pub trait SnapshotProvider: Send + Sync {
    /// Upserts a snapshot, replacing any existing row for `(name, key)`.
    async fn insert(&self, snapshot: Snapshot) -> ProviderResult<()>;

    /// Looks up the snapshot for `(name, key)`.
    async fn get_by_stream(
        &self,
        name: &ReducerName,
        key: &str,
    ) -> ProviderResult<Option<Snapshot>>;

    /// Removes the snapshot for `(name, key)`, if any.
    async fn remove(&self, name: &ReducerName, key: &str) -> ProviderResult<()>;
}
