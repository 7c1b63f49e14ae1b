//! The event-store façade.
//!
//! [`Store`] composes the three storage providers with the validator set,
//! projector, contextor, and hooks. It owns the append protocol: existence
//! check, validation, outdatedness probe, insert with bounded timestamp-bump
//! retry, then concurrent fan-out to the contextor and projector.
//!
//! A `Store` is cheaply cloneable; clones share every component, so a clone
//! handed into a task or a transaction scope observes the same log.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::contextor::{Contextor, ContextorBuilder};
use crate::errors::{
    ConfigError, ConfigResult, ConflictReason, ProviderError, StoreError, StoreResult,
};
use crate::hooks::{Hooks, InsertNote};
use crate::projector::{ProjectionInfo, Projector, ProjectorBuilder};
use crate::provider::{
    ContextProvider, EventProvider, ReadOptions, Snapshot, SnapshotProvider,
};
use crate::record::{make_event, EventRecord, NewEvent};
use crate::reducer::{Reducer, ReducerSource};
use crate::schema::SchemaSet;
use crate::types::{ContextKey, EventId, EventType, ReducerName, StreamId};
use crate::validation::{SharedValidator, ValidatorSet};

/// How many `(stream, created)` collisions one append may resolve by
/// bumping the timestamp before giving up.
const CREATED_BUMP_ATTEMPTS: u32 = 16;

/// Whether reducers checkpoint automatically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SnapshotMode {
    /// Snapshots are written only through
    /// [`create_snapshot`](Store::create_snapshot).
    #[default]
    Manual,
    /// Every successful [`reduce`](Store::reduce) upserts a snapshot at the
    /// last folded event.
    Auto,
}

/// Assembles a [`Store`], validating the configuration before it goes live.
///
/// # Examples
///
/// ```ignore
/// use eventline::{EventType, Hooks, SnapshotMode, Store, ValidatorSet};
/// use eventline_memory::MemoryBackend;
///
/// let backend = MemoryBackend::new();
/// let store = Store::builder()
///     .event_provider(backend.events())
///     .context_provider(backend.contexts())
///     .snapshot_provider(backend.snapshots())
///     .events([EventType::try_new("user:created").unwrap()])
///     .validators(ValidatorSet::new().open(EventType::try_new("user:created").unwrap()))
///     .snapshot_mode(SnapshotMode::Auto)
///     .build()?;
/// ```
#[derive(Default)]
pub struct StoreBuilder {
    events: Option<Arc<dyn EventProvider>>,
    contexts: Option<Arc<dyn ContextProvider>>,
    snapshots: Option<Arc<dyn SnapshotProvider>>,
    declared: BTreeSet<EventType>,
    validators: ValidatorSet,
    projector: Option<ProjectorBuilder>,
    contextor: Option<ContextorBuilder>,
    snapshot_mode: SnapshotMode,
    hooks: Hooks,
}

impl StoreBuilder {
    /// Sets the event log provider.
    #[must_use]
    pub fn event_provider(mut self, provider: Arc<dyn EventProvider>) -> Self {
        self.events = Some(provider);
        self
    }

    /// Sets the context index provider.
    #[must_use]
    pub fn context_provider(mut self, provider: Arc<dyn ContextProvider>) -> Self {
        self.contexts = Some(provider);
        self
    }

    /// Sets the snapshot provider.
    #[must_use]
    pub fn snapshot_provider(mut self, provider: Arc<dyn SnapshotProvider>) -> Self {
        self.snapshots = Some(provider);
        self
    }

    /// Declares event types, extending any prior declaration.
    #[must_use]
    pub fn events<I>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = EventType>,
    {
        self.declared.extend(types);
        self
    }

    /// Declares every event type of a parsed schema set.
    #[must_use]
    pub fn events_from_schemas(mut self, schemas: &SchemaSet) -> Self {
        self.declared.extend(schemas.event_types().cloned());
        self
    }

    /// Sets the validator maps.
    #[must_use]
    pub fn validators(mut self, validators: ValidatorSet) -> Self {
        self.validators = validators;
        self
    }

    /// Sets the projector registrations.
    #[must_use]
    pub fn projector(mut self, projector: ProjectorBuilder) -> Self {
        self.projector = Some(projector);
        self
    }

    /// Sets the context reducer registrations.
    #[must_use]
    pub fn contextor(mut self, contextor: ContextorBuilder) -> Self {
        self.contextor = Some(contextor);
        self
    }

    /// Sets the snapshot mode. Defaults to [`SnapshotMode::Manual`].
    #[must_use]
    pub const fn snapshot_mode(mut self, mode: SnapshotMode) -> Self {
        self.snapshot_mode = mode;
        self
    }

    /// Sets the hook callbacks.
    #[must_use]
    pub fn hooks(mut self, hooks: Hooks) -> Self {
        self.hooks = hooks;
        self
    }

    /// Validates the configuration and builds the store.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::MissingComponent`] if a provider was not supplied.
    /// - [`ConfigError::MissingDataValidator`] /
    ///   [`ConfigError::MissingMetaValidator`] if a declared type lacks a
    ///   validator.
    /// - [`ConfigError::UndeclaredEventType`] if a validator targets a type
    ///   outside the declared set.
    /// - [`ConfigError::DuplicateHandler`] from sealing the projector.
    pub fn build(self) -> ConfigResult<Store> {
        let events = self
            .events
            .ok_or(ConfigError::MissingComponent("event provider"))?;
        let contexts = self
            .contexts
            .ok_or(ConfigError::MissingComponent("context provider"))?;
        let snapshots = self
            .snapshots
            .ok_or(ConfigError::MissingComponent("snapshot provider"))?;

        for event_type in &self.declared {
            if self.validators.data_validator(event_type).is_none() {
                return Err(ConfigError::MissingDataValidator(event_type.clone()));
            }
            if self.validators.meta_validator(event_type).is_none() {
                return Err(ConfigError::MissingMetaValidator(event_type.clone()));
            }
        }
        for event_type in self.validators.registered_types() {
            if !self.declared.contains(event_type) {
                return Err(ConfigError::UndeclaredEventType(event_type.clone()));
            }
        }

        let projector = match self.projector {
            Some(builder) => builder.build()?,
            None => Projector::default(),
        };
        let contextor = self.contextor.map_or_else(Contextor::default, ContextorBuilder::build);

        Ok(Store {
            events,
            contexts,
            snapshots,
            declared: Arc::new(self.declared),
            validators: Arc::new(self.validators),
            projector,
            contextor,
            snapshot_mode: self.snapshot_mode,
            hooks: self.hooks,
        })
    }
}

/// The event store.
#[derive(Clone)]
pub struct Store {
    events: Arc<dyn EventProvider>,
    contexts: Arc<dyn ContextProvider>,
    snapshots: Arc<dyn SnapshotProvider>,
    declared: Arc<BTreeSet<EventType>>,
    validators: Arc<ValidatorSet>,
    projector: Projector,
    contextor: Contextor,
    snapshot_mode: SnapshotMode,
    hooks: Hooks,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store").finish_non_exhaustive()
    }
}

enum InsertOutcome {
    Inserted(EventRecord),
    Existing(EventId),
}

impl Store {
    /// Starts assembling a store.
    pub fn builder() -> StoreBuilder {
        StoreBuilder::default()
    }

    /// Whether an event type belongs to the declared set.
    pub fn has_event(&self, event_type: &EventType) -> bool {
        self.declared.contains(event_type)
    }

    /// The data validator registered for a type, if declared.
    pub fn get_validator(&self, event_type: &EventType) -> Option<SharedValidator> {
        self.validators.data_validator(event_type).cloned()
    }

    /// Builds a record from caller input and appends it as a new event.
    pub async fn add_event(&self, input: NewEvent) -> StoreResult<EventId> {
        self.push_event(make_event(input), false).await
    }

    /// Builds records from caller inputs and appends them as one atomic
    /// sequence.
    pub async fn add_event_sequence(&self, inputs: Vec<NewEvent>) -> StoreResult<Vec<EventId>> {
        let records = inputs.into_iter().map(make_event).collect();
        self.push_event_sequence(records, false).await
    }

    /// Appends one record.
    ///
    /// The append protocol, in order: existence check (a known id is an
    /// idempotent no-op), validation, outdatedness probe for non-hydrated
    /// records, insert with bounded timestamp-bump retry, then concurrent
    /// fan-out to the contextor and projector followed by the inserted hook.
    ///
    /// Fan-out runs in a task of its own: a caller that disappears after the
    /// commit does not stop handlers from completing, it only gets the
    /// abandonment logged.
    ///
    /// # Errors
    ///
    /// [`StoreError::UnknownEvent`], [`StoreError::Validation`],
    /// [`StoreError::Conflict`], or [`StoreError::Storage`]. Handler
    /// failures are routed through hooks and never fail the append.
    pub async fn push_event(&self, record: EventRecord, hydrated: bool) -> StoreResult<EventId> {
        if let Some(existing) = self.events.get_by_id(&record.id).await? {
            if existing.fingerprint() != record.fingerprint() {
                return Err(StoreError::Conflict(
                    ConflictReason::IdCollisionDistinctPayload(record.id),
                ));
            }
            let note = InsertNote {
                hydrated,
                outdated: false,
                existing: true,
            };
            self.hooks.inserted(&existing, &note);
            return Ok(existing.id);
        }

        if let Err(error) = self.check_declared_and_valid(&record) {
            self.hooks.event_failed(&record, &error);
            return Err(error);
        }

        let outdated = if hydrated {
            false
        } else {
            self.events
                .check_outdated(&record.stream, &record.event_type, record.created)
                .await?
        };

        match self.insert_with_bump(record, hydrated).await? {
            InsertOutcome::Existing(id) => Ok(id),
            InsertOutcome::Inserted(stored) => {
                tracing::debug!(
                    event_id = %stored.id,
                    stream = %stored.stream,
                    event_type = %stored.event_type,
                    outdated,
                    "event inserted"
                );
                let id = stored.id;
                let note = InsertNote {
                    hydrated,
                    outdated,
                    existing: false,
                };
                self.run_fan_out(vec![(stored, note)]).await;
                Ok(id)
            }
        }
    }

    /// Appends a set of records as one transaction.
    ///
    /// Every record is validated first; a single failure aborts the whole
    /// sequence with nothing inserted and one event-error hook fired. The
    /// insert itself is all-or-nothing through the provider. Fan-out runs
    /// after the commit, for the inserted records only, in input order.
    pub async fn push_event_sequence(
        &self,
        records: Vec<EventRecord>,
        hydrated: bool,
    ) -> StoreResult<Vec<EventId>> {
        for record in &records {
            if let Err(error) = self.check_declared_and_valid(record) {
                self.hooks.event_failed(record, &error);
                return Err(error);
            }
        }

        // Ids never change during insert (only `created` can be bumped), so
        // the result order is fixed up front.
        let ids: Vec<EventId> = records.iter().map(|r| r.id).collect();

        // Partition out records the store already holds; they are idempotent
        // replays, not members of the transaction.
        let mut fresh = Vec::new();
        let mut already_present = Vec::new();
        for record in records {
            match self.events.get_by_id(&record.id).await? {
                Some(existing) => {
                    if existing.fingerprint() != record.fingerprint() {
                        return Err(StoreError::Conflict(
                            ConflictReason::IdCollisionDistinctPayload(record.id),
                        ));
                    }
                    already_present.push(existing);
                }
                None => fresh.push(record),
            }
        }

        let mut outdated_by_id = std::collections::HashMap::with_capacity(fresh.len());
        for record in &fresh {
            let outdated = if hydrated {
                false
            } else {
                self.events
                    .check_outdated(&record.stream, &record.event_type, record.created)
                    .await?
            };
            outdated_by_id.insert(record.id, outdated);
        }

        let stored = self.insert_many_with_bump(fresh, hydrated).await?;
        tracing::debug!(count = stored.len(), "event sequence inserted");

        let batch: Vec<(EventRecord, InsertNote)> = stored
            .into_iter()
            .map(|record| {
                let outdated = outdated_by_id.get(&record.id).copied().unwrap_or(false);
                (
                    record,
                    InsertNote {
                        hydrated,
                        outdated,
                        existing: false,
                    },
                )
            })
            .collect();
        self.run_fan_out(batch).await;

        for existing in &already_present {
            let note = InsertNote {
                hydrated,
                outdated: false,
                existing: true,
            };
            self.hooks.inserted(existing, &note);
        }

        Ok(ids)
    }

    /// Re-applies a set of records to the contextor and projector.
    ///
    /// Replay never inserts: records are delivered with `hydrated = true`
    /// and `outdated = false`, `once` handlers stay silent, and no inserted
    /// hook fires. Replay is additive; resetting read models is the
    /// caller's business.
    pub async fn replay(&self, records: Vec<EventRecord>) -> StoreResult<()> {
        tracing::debug!(count = records.len(), "replaying records");
        let info = ProjectionInfo {
            hydrated: true,
            outdated: false,
        };
        for record in records {
            let (context_failures, projector_failures) = tokio::join!(
                self.contextor.push(&record, self.contexts.as_ref()),
                self.projector.project(&record, info),
            );
            for failure in &context_failures {
                self.hooks.context_failed(&record, failure);
            }
            for failure in &projector_failures {
                self.hooks.projector_failed(&record, failure);
            }
        }
        Ok(())
    }

    /// Replays one stream, or the whole store.
    pub async fn replay_events(&self, stream: Option<&StreamId>) -> StoreResult<()> {
        let options = ReadOptions::new();
        let records = match stream {
            Some(stream) => self.events.get_by_stream(stream, &options).await?,
            None => self.events.get(&options).await?,
        };
        self.replay(records).await
    }

    /// Looks up one record by id.
    pub async fn get_event(&self, id: &EventId) -> StoreResult<Option<EventRecord>> {
        Ok(self.events.get_by_id(id).await?)
    }

    /// Reads the whole store in `(created, id)` order.
    pub async fn get_events(&self, options: &ReadOptions) -> StoreResult<Vec<EventRecord>> {
        Ok(self.events.get(options).await?)
    }

    /// Reads one stream in `(created, id)` order.
    pub async fn get_events_by_stream(
        &self,
        stream: &StreamId,
        options: &ReadOptions,
    ) -> StoreResult<Vec<EventRecord>> {
        Ok(self.events.get_by_stream(stream, options).await?)
    }

    /// Reads the union of several streams in `(created, id)` order.
    pub async fn get_events_by_streams(
        &self,
        streams: &[StreamId],
        options: &ReadOptions,
    ) -> StoreResult<Vec<EventRecord>> {
        Ok(self.events.get_by_streams(streams, options).await?)
    }

    /// Reads the union of a context key's streams in `(created, id)` order.
    pub async fn get_events_by_context(
        &self,
        key: &ContextKey,
        options: &ReadOptions,
    ) -> StoreResult<Vec<EventRecord>> {
        let streams = self.contexts.get_by_key(key).await?;
        if streams.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self.events.get_by_streams(&streams, options).await?)
    }

    /// Folds a stream or context into reducer state, resuming from a
    /// snapshot when one exists.
    ///
    /// Returns `None` when there is neither a snapshot nor a matching event.
    /// With [`SnapshotMode::Auto`], a successful fold upserts a snapshot at
    /// the last folded event.
    ///
    /// # Errors
    ///
    /// [`StoreError::Storage`] for provider failures; a failure inside the
    /// reducer's own fold function surfaces as-is through
    /// [`StoreError::Reduce`].
    pub async fn reduce<S>(&self, key: &str, reducer: &Reducer<S>) -> StoreResult<Option<S>>
    where
        S: Serialize + DeserializeOwned + Clone + Send + Sync,
    {
        let snapshot = self.snapshots.get_by_stream(reducer.name(), key).await?;

        let mut options = ReadOptions::new();
        if let Some(filter) = reducer.filter() {
            options = options.with_types(filter.to_vec());
        }
        if let Some(snapshot) = &snapshot {
            options = options.with_cursor(snapshot.cursor);
            tracing::debug!(
                reducer = %reducer.name(),
                key,
                cursor = %snapshot.cursor,
                "resuming reduce from snapshot"
            );
        }

        let events = self
            .fetch_reducer_events(key, reducer.source(), &options)
            .await?;

        let snapshot_state = match snapshot {
            Some(snapshot) => Some(decode_state::<S>(snapshot.state)?),
            None => None,
        };

        if events.is_empty() {
            return Ok(snapshot_state);
        }

        let seed = snapshot_state.unwrap_or_else(|| reducer.initial());
        let state = reducer.fold(&events, seed).map_err(StoreError::Reduce)?;

        if self.snapshot_mode == SnapshotMode::Auto {
            let cursor = events
                .last()
                .map(|record| record.created)
                .expect("events is non-empty on this branch");
            self.snapshots
                .insert(Snapshot {
                    name: reducer.name().clone(),
                    key: key.to_string(),
                    cursor,
                    state: encode_state(&state)?,
                })
                .await?;
        }

        Ok(Some(state))
    }

    /// Recomputes a reducer's snapshot from scratch, ignoring any existing
    /// one.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] when no matching events exist: there is
    /// nothing to checkpoint.
    pub async fn create_snapshot<S>(&self, key: &str, reducer: &Reducer<S>) -> StoreResult<()>
    where
        S: Serialize + DeserializeOwned + Clone + Send + Sync,
    {
        let mut options = ReadOptions::new();
        if let Some(filter) = reducer.filter() {
            options = options.with_types(filter.to_vec());
        }
        let events = self
            .fetch_reducer_events(key, reducer.source(), &options)
            .await?;
        let Some(last) = events.last() else {
            return Err(StoreError::NotFound(format!(
                "no events to snapshot for reducer '{}' at key '{key}'",
                reducer.name()
            )));
        };
        let cursor = last.created;

        let state = reducer
            .fold(&events, reducer.initial())
            .map_err(StoreError::Reduce)?;
        self.snapshots
            .insert(Snapshot {
                name: reducer.name().clone(),
                key: key.to_string(),
                cursor,
                state: encode_state(&state)?,
            })
            .await?;
        Ok(())
    }

    /// Removes a snapshot unconditionally.
    pub async fn delete_snapshot(&self, name: &ReducerName, key: &str) -> StoreResult<()> {
        Ok(self.snapshots.remove(name, key).await?)
    }

    fn check_declared_and_valid(&self, record: &EventRecord) -> StoreResult<()> {
        if !self.declared.contains(&record.event_type) {
            return Err(StoreError::UnknownEvent(record.event_type.clone()));
        }
        self.validators.check(record)
    }

    async fn insert_with_bump(
        &self,
        mut record: EventRecord,
        hydrated: bool,
    ) -> StoreResult<InsertOutcome> {
        for _ in 0..CREATED_BUMP_ATTEMPTS {
            match self.events.insert(record.clone()).await {
                Ok(stored) => return Ok(InsertOutcome::Inserted(stored)),
                Err(ProviderError::CreatedConflict { .. }) => {
                    record.created = record.created.bump();
                }
                Err(ProviderError::DuplicateEventId(id)) => {
                    let id = self.resolve_duplicate_id(id, &record, hydrated).await?;
                    return Ok(InsertOutcome::Existing(id));
                }
                Err(other) => return Err(other.into()),
            }
        }
        Err(StoreError::Conflict(
            ConflictReason::StreamTimestampExhausted {
                attempts: CREATED_BUMP_ATTEMPTS,
            },
        ))
    }

    async fn insert_many_with_bump(
        &self,
        mut records: Vec<EventRecord>,
        hydrated: bool,
    ) -> StoreResult<Vec<EventRecord>> {
        if records.is_empty() {
            return Ok(Vec::new());
        }
        let mut bumps_left = CREATED_BUMP_ATTEMPTS;
        loop {
            match self.events.insert_many(records.clone()).await {
                Ok(stored) => return Ok(stored),
                Err(ProviderError::CreatedConflict { stream, created }) => {
                    if bumps_left == 0 {
                        return Err(StoreError::Conflict(
                            ConflictReason::StreamTimestampExhausted {
                                attempts: CREATED_BUMP_ATTEMPTS,
                            },
                        ));
                    }
                    bumps_left -= 1;
                    let Some(colliding) = records
                        .iter_mut()
                        .find(|r| r.stream == stream && r.created == created)
                    else {
                        return Err(ProviderError::CreatedConflict { stream, created }.into());
                    };
                    colliding.created = colliding.created.bump();
                }
                Err(ProviderError::DuplicateEventId(id)) => {
                    // Another writer committed this record between the
                    // existence check and the transaction.
                    let colliding = record_by_id(&records, id)?.clone();
                    self.resolve_duplicate_id(id, &colliding, hydrated).await?;
                    records.retain(|r| r.id != id);
                    if records.is_empty() {
                        return Ok(Vec::new());
                    }
                }
                Err(other) => return Err(other.into()),
            }
        }
    }

    /// Classifies a duplicate-id report: an identical payload is an
    /// idempotent replay (hook fires, id returned), a distinct payload is a
    /// conflict.
    async fn resolve_duplicate_id(
        &self,
        id: EventId,
        record: &EventRecord,
        hydrated: bool,
    ) -> StoreResult<EventId> {
        let existing = self.events.get_by_id(&id).await?.ok_or_else(|| {
            StoreError::Storage(ProviderError::Internal(format!(
                "provider reported duplicate id {id} but the record is gone"
            )))
        })?;
        if existing.fingerprint() != record.fingerprint() {
            return Err(StoreError::Conflict(
                ConflictReason::IdCollisionDistinctPayload(id),
            ));
        }
        let note = InsertNote {
            hydrated,
            outdated: false,
            existing: true,
        };
        self.hooks.inserted(&existing, &note);
        Ok(id)
    }

    /// Runs fan-out and hooks for a batch of freshly inserted records.
    ///
    /// The work is spawned so it survives an abandoning caller; the await
    /// here only observes completion. Within one record the contextor and
    /// projector run concurrently; across records delivery is sequential in
    /// batch order.
    async fn run_fan_out(&self, batch: Vec<(EventRecord, InsertNote)>) {
        let contextor = self.contextor.clone();
        let projector = self.projector.clone();
        let contexts = Arc::clone(&self.contexts);
        let hooks = self.hooks.clone();

        let task = tokio::spawn(async move {
            for (record, note) in batch {
                let info = ProjectionInfo {
                    hydrated: note.hydrated,
                    outdated: note.outdated,
                };
                let (context_failures, projector_failures) = tokio::join!(
                    contextor.push(&record, contexts.as_ref()),
                    projector.project(&record, info),
                );
                for failure in &context_failures {
                    hooks.context_failed(&record, failure);
                }
                for failure in &projector_failures {
                    hooks.projector_failed(&record, failure);
                }
                hooks.inserted(&record, &note);
            }
        });

        let mut guard = PostCommitGuard { armed: true };
        if let Err(join_error) = task.await {
            tracing::error!(error = %join_error, "fan-out task failed");
        }
        guard.armed = false;
    }

    async fn fetch_reducer_events(
        &self,
        key: &str,
        source: ReducerSource,
        options: &ReadOptions,
    ) -> StoreResult<Vec<EventRecord>> {
        match source {
            ReducerSource::Stream => {
                let stream = StreamId::try_new(key).map_err(|e| StoreError::Validation {
                    path: "/key".to_string(),
                    message: e.to_string(),
                })?;
                Ok(self.events.get_by_stream(&stream, options).await?)
            }
            ReducerSource::Context => {
                let context = ContextKey::try_new(key).map_err(|e| StoreError::Validation {
                    path: "/key".to_string(),
                    message: e.to_string(),
                })?;
                let streams = self.contexts.get_by_key(&context).await?;
                if streams.is_empty() {
                    return Ok(Vec::new());
                }
                Ok(self.events.get_by_streams(&streams, options).await?)
            }
        }
    }
}

/// Logs an abandonment if the appending caller goes away between the commit
/// and the end of fan-out. The spawned fan-out keeps running either way.
struct PostCommitGuard {
    armed: bool,
}

impl Drop for PostCommitGuard {
    fn drop(&mut self) {
        if self.armed {
            tracing::warn!("caller abandoned append after commit; fan-out continues in background");
        }
    }
}

fn record_by_id(records: &[EventRecord], id: EventId) -> StoreResult<&EventRecord> {
    records.iter().find(|r| r.id == id).ok_or_else(|| {
        StoreError::Storage(ProviderError::Internal(format!(
            "provider reported duplicate id {id} not present in the batch"
        )))
    })
}

fn encode_state<S: Serialize>(state: &S) -> StoreResult<Value> {
    serde_json::to_value(state)
        .map_err(|e| StoreError::Storage(ProviderError::Serialization(e.to_string())))
}

fn decode_state<S: DeserializeOwned>(state: Value) -> StoreResult<S> {
    serde_json::from_value(state)
        .map_err(|e| StoreError::Storage(ProviderError::Serialization(e.to_string())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ProviderResult;
    use crate::provider::ContextEntry;
    use crate::types::Timestamp;
    use async_trait::async_trait;

    struct NullEvents;
    struct NullContexts;
    struct NullSnapshots;

    #[async_trait]
    impl EventProvider for NullEvents {
        async fn insert(&self, record: EventRecord) -> ProviderResult<EventRecord> {
            Ok(record)
        }
        async fn insert_many(&self, records: Vec<EventRecord>) -> ProviderResult<Vec<EventRecord>> {
            Ok(records)
        }
        async fn get_by_id(&self, _id: &EventId) -> ProviderResult<Option<EventRecord>> {
            Ok(None)
        }
        async fn get(&self, _options: &ReadOptions) -> ProviderResult<Vec<EventRecord>> {
            Ok(Vec::new())
        }
        async fn get_by_stream(
            &self,
            _stream: &StreamId,
            _options: &ReadOptions,
        ) -> ProviderResult<Vec<EventRecord>> {
            Ok(Vec::new())
        }
        async fn get_by_streams(
            &self,
            _streams: &[StreamId],
            _options: &ReadOptions,
        ) -> ProviderResult<Vec<EventRecord>> {
            Ok(Vec::new())
        }
        async fn check_outdated(
            &self,
            _stream: &StreamId,
            _event_type: &EventType,
            _created: Timestamp,
        ) -> ProviderResult<bool> {
            Ok(false)
        }
    }

    #[async_trait]
    impl ContextProvider for NullContexts {
        async fn handle(&self, _entry: ContextEntry) -> ProviderResult<()> {
            Ok(())
        }
        async fn get_by_key(&self, _key: &ContextKey) -> ProviderResult<Vec<StreamId>> {
            Ok(Vec::new())
        }
    }

    #[async_trait]
    impl SnapshotProvider for NullSnapshots {
        async fn insert(&self, _snapshot: Snapshot) -> ProviderResult<()> {
            Ok(())
        }
        async fn get_by_stream(
            &self,
            _name: &ReducerName,
            _key: &str,
        ) -> ProviderResult<Option<Snapshot>> {
            Ok(None)
        }
        async fn remove(&self, _name: &ReducerName, _key: &str) -> ProviderResult<()> {
            Ok(())
        }
    }

    fn t(tag: &str) -> EventType {
        EventType::try_new(tag).unwrap()
    }

    fn with_providers() -> StoreBuilder {
        Store::builder()
            .event_provider(Arc::new(NullEvents))
            .context_provider(Arc::new(NullContexts))
            .snapshot_provider(Arc::new(NullSnapshots))
    }

    #[test]
    fn missing_provider_is_a_configuration_fault() {
        let err = Store::builder().build().unwrap_err();
        assert!(matches!(err, ConfigError::MissingComponent("event provider")));
    }

    #[test]
    fn declared_type_without_validator_is_a_configuration_fault() {
        let err = with_providers().events([t("user:created")]).build().unwrap_err();
        assert!(matches!(err, ConfigError::MissingDataValidator(ty) if ty.as_ref() == "user:created"));
    }

    #[test]
    fn validator_for_undeclared_type_is_a_configuration_fault() {
        let err = with_providers()
            .validators(ValidatorSet::new().open(t("stray")))
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::UndeclaredEventType(ty) if ty.as_ref() == "stray"));
    }

    #[test]
    fn complete_configuration_builds() {
        let store = with_providers()
            .events([t("user:created")])
            .validators(ValidatorSet::new().open(t("user:created")))
            .build()
            .unwrap();
        assert!(store.has_event(&t("user:created")));
        assert!(!store.has_event(&t("user:removed")));
        assert!(store.get_validator(&t("user:created")).is_some());
        assert!(store.get_validator(&t("user:removed")).is_none());
    }

    #[tokio::test]
    async fn unknown_event_type_is_rejected_before_insert() {
        let store = with_providers()
            .events([t("known")])
            .validators(ValidatorSet::new().open(t("known")))
            .build()
            .unwrap();
        let record = make_event(NewEvent::new(t("unknown")));
        let err = store.push_event(record, false).await.unwrap_err();
        assert!(matches!(err, StoreError::UnknownEvent(_)));
    }
}
