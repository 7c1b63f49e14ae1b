//! In-memory storage providers for the `eventline` event store.
//!
//! This crate implements the three provider traits from `eventline` on top
//! of standard library collections behind `Arc<RwLock<..>>`. It is meant for
//! tests, development, and single-process deployments where persistence is
//! not required; the semantics match what a SQL backend provides, including
//! the uniqueness contract on the event log and all-or-nothing sequence
//! inserts.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use eventline::{
    ContextEntry, ContextKey, ContextOp, ContextProvider, Direction, EventId, EventProvider,
    EventRecord, EventType, ProviderError, ProviderResult, ReadOptions, ReducerName, Snapshot,
    SnapshotProvider, StreamId, Timestamp,
};

/// All three in-memory providers behind one handle.
///
/// Clones share storage, so a backend can be handed to a store and kept
/// around for direct inspection in tests.
///
/// # Example
///
/// ```ignore
/// let backend = MemoryBackend::new();
/// let store = Store::builder()
///     .event_provider(backend.events())
///     .context_provider(backend.contexts())
///     .snapshot_provider(backend.snapshots())
///     // ...
///     .build()?;
/// ```
#[derive(Clone, Default)]
pub struct MemoryBackend {
    events: Arc<MemoryEventProvider>,
    contexts: Arc<MemoryContextProvider>,
    snapshots: Arc<MemorySnapshotProvider>,
}

impl MemoryBackend {
    /// Creates an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// The event log provider.
    pub fn events(&self) -> Arc<dyn EventProvider> {
        self.events.clone()
    }

    /// The context index provider.
    pub fn contexts(&self) -> Arc<dyn ContextProvider> {
        self.contexts.clone()
    }

    /// The snapshot provider.
    pub fn snapshots(&self) -> Arc<dyn SnapshotProvider> {
        self.snapshots.clone()
    }

    /// Number of records in the event log. Test helper.
    pub fn event_count(&self) -> usize {
        self.events
            .log
            .read()
            .expect("RwLock poisoned")
            .records
            .len()
    }
}

#[derive(Default)]
struct EventLog {
    records: Vec<EventRecord>,
    by_id: HashMap<EventId, usize>,
    by_stream_created: HashSet<(StreamId, Timestamp)>,
}

impl EventLog {
    fn check_unique(&self, record: &EventRecord) -> ProviderResult<()> {
        if self.by_id.contains_key(&record.id) {
            return Err(ProviderError::DuplicateEventId(record.id));
        }
        if self
            .by_stream_created
            .contains(&(record.stream.clone(), record.created))
        {
            return Err(ProviderError::CreatedConflict {
                stream: record.stream.clone(),
                created: record.created,
            });
        }
        Ok(())
    }

    fn push(&mut self, mut record: EventRecord, recorded: Timestamp) -> EventRecord {
        record.recorded = recorded;
        self.by_id.insert(record.id, self.records.len());
        self.by_stream_created
            .insert((record.stream.clone(), record.created));
        self.records.push(record.clone());
        record
    }

    fn select(&self, options: &ReadOptions, mut keep: impl FnMut(&EventRecord) -> bool) -> Vec<EventRecord> {
        let mut selected: Vec<EventRecord> = self
            .records
            .iter()
            .filter(|record| keep(record) && options.admits(record))
            .cloned()
            .collect();
        selected.sort_by(|a, b| (a.created, a.id).cmp(&(b.created, b.id)));
        if options.direction == Direction::Backward {
            selected.reverse();
        }
        selected
    }
}

/// Thread-safe in-memory event log.
#[derive(Default)]
pub struct MemoryEventProvider {
    log: RwLock<EventLog>,
}

impl MemoryEventProvider {
    /// Creates an empty event log.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EventProvider for MemoryEventProvider {
    async fn insert(&self, record: EventRecord) -> ProviderResult<EventRecord> {
        let mut log = self.log.write().expect("RwLock poisoned");
        log.check_unique(&record)?;
        Ok(log.push(record, Timestamp::now()))
    }

    async fn insert_many(&self, records: Vec<EventRecord>) -> ProviderResult<Vec<EventRecord>> {
        let mut log = self.log.write().expect("RwLock poisoned");

        // Verify the whole set, against the log and within the batch,
        // before writing anything.
        let mut batch_pairs = HashSet::new();
        let mut batch_ids = HashSet::new();
        for record in &records {
            log.check_unique(record)?;
            if !batch_ids.insert(record.id) {
                return Err(ProviderError::DuplicateEventId(record.id));
            }
            if !batch_pairs.insert((record.stream.clone(), record.created)) {
                return Err(ProviderError::CreatedConflict {
                    stream: record.stream.clone(),
                    created: record.created,
                });
            }
        }

        // One acceptance time for the whole transaction.
        let recorded = Timestamp::now();
        Ok(records
            .into_iter()
            .map(|record| log.push(record, recorded))
            .collect())
    }

    async fn get_by_id(&self, id: &EventId) -> ProviderResult<Option<EventRecord>> {
        let log = self.log.read().expect("RwLock poisoned");
        Ok(log.by_id.get(id).map(|&index| log.records[index].clone()))
    }

    async fn get(&self, options: &ReadOptions) -> ProviderResult<Vec<EventRecord>> {
        let log = self.log.read().expect("RwLock poisoned");
        Ok(log.select(options, |_| true))
    }

    async fn get_by_stream(
        &self,
        stream: &StreamId,
        options: &ReadOptions,
    ) -> ProviderResult<Vec<EventRecord>> {
        let log = self.log.read().expect("RwLock poisoned");
        Ok(log.select(options, |record| &record.stream == stream))
    }

    async fn get_by_streams(
        &self,
        streams: &[StreamId],
        options: &ReadOptions,
    ) -> ProviderResult<Vec<EventRecord>> {
        let wanted: HashSet<&StreamId> = streams.iter().collect();
        let log = self.log.read().expect("RwLock poisoned");
        Ok(log.select(options, |record| wanted.contains(&record.stream)))
    }

    async fn check_outdated(
        &self,
        stream: &StreamId,
        event_type: &EventType,
        created: Timestamp,
    ) -> ProviderResult<bool> {
        let log = self.log.read().expect("RwLock poisoned");
        Ok(log.records.iter().any(|record| {
            &record.stream == stream
                && &record.event_type == event_type
                && record.created > created
        }))
    }
}

/// Thread-safe in-memory context index.
///
/// Entries append forever; the current stream set for a key is derived by
/// replaying its entries in order.
#[derive(Default)]
pub struct MemoryContextProvider {
    entries: RwLock<Vec<ContextEntry>>,
}

impl MemoryContextProvider {
    /// Creates an empty context index.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ContextProvider for MemoryContextProvider {
    async fn handle(&self, entry: ContextEntry) -> ProviderResult<()> {
        self.entries.write().expect("RwLock poisoned").push(entry);
        Ok(())
    }

    async fn get_by_key(&self, key: &ContextKey) -> ProviderResult<Vec<StreamId>> {
        let entries = self.entries.read().expect("RwLock poisoned");
        let mut streams: Vec<StreamId> = Vec::new();
        for entry in entries.iter().filter(|entry| &entry.key == key) {
            match entry.op {
                ContextOp::Insert => {
                    if !streams.contains(&entry.stream) {
                        streams.push(entry.stream.clone());
                    }
                }
                ContextOp::Remove => streams.retain(|stream| stream != &entry.stream),
            }
        }
        Ok(streams)
    }
}

/// Thread-safe in-memory snapshot table, keyed by `(name, key)`.
#[derive(Default)]
pub struct MemorySnapshotProvider {
    snapshots: RwLock<HashMap<(ReducerName, String), Snapshot>>,
}

impl MemorySnapshotProvider {
    /// Creates an empty snapshot table.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SnapshotProvider for MemorySnapshotProvider {
    async fn insert(&self, snapshot: Snapshot) -> ProviderResult<()> {
        self.snapshots
            .write()
            .expect("RwLock poisoned")
            .insert((snapshot.name.clone(), snapshot.key.clone()), snapshot);
        Ok(())
    }

    async fn get_by_stream(
        &self,
        name: &ReducerName,
        key: &str,
    ) -> ProviderResult<Option<Snapshot>> {
        let snapshots = self.snapshots.read().expect("RwLock poisoned");
        Ok(snapshots.get(&(name.clone(), key.to_string())).cloned())
    }

    async fn remove(&self, name: &ReducerName, key: &str) -> ProviderResult<()> {
        self.snapshots
            .write()
            .expect("RwLock poisoned")
            .remove(&(name.clone(), key.to_string()));
        Ok(())
    }
}
