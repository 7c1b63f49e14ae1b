//! Derivation of context index entries from events.
//!
//! A context reducer is a pure function from a record to zero or more
//! [`ContextEntry`] operations. Reducers are registered per event type on a
//! [`ContextorBuilder`] and sealed before the store goes live; several
//! reducers may watch the same type. The ops they produce are applied
//! downstream of the event commit, in production order, and a failing op
//! never rolls the event back.

use std::collections::HashMap;
use std::sync::Arc;

use crate::errors::HandlerError;
use crate::provider::{ContextEntry, ContextProvider};
use crate::record::EventRecord;
use crate::types::EventType;

type ContextReducer = Arc<dyn Fn(&EventRecord) -> Vec<ContextEntry> + Send + Sync>;

/// Collects context reducer registrations.
///
/// # Examples
///
/// ```
/// use eventline::{ContextEntry, ContextKey, ContextorBuilder, EventType};
///
/// let contextor = ContextorBuilder::new()
///     .add(EventType::try_new("tenant:assigned").unwrap(), |record| {
///         let tenant = record.data["tenantId"].as_str()?;
///         let key = ContextKey::try_new(tenant).ok()?;
///         Some(ContextEntry::insert(key, record.stream.clone()))
///     })
///     .build();
/// # let _ = contextor;
/// ```
#[derive(Default)]
pub struct ContextorBuilder {
    reducers: HashMap<EventType, Vec<ContextReducer>>,
}

impl ContextorBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a reducer producing at most one op per record.
    ///
    /// Returning `None` means the record contributes nothing, which is the
    /// common case for reducers that only react to certain payloads.
    #[must_use]
    pub fn add<F>(self, event_type: EventType, reducer: F) -> Self
    where
        F: Fn(&EventRecord) -> Option<ContextEntry> + Send + Sync + 'static,
    {
        self.add_many(event_type, move |record| {
            reducer(record).into_iter().collect()
        })
    }

    /// Registers a reducer producing any number of ops per record.
    #[must_use]
    pub fn add_many<F>(mut self, event_type: EventType, reducer: F) -> Self
    where
        F: Fn(&EventRecord) -> Vec<ContextEntry> + Send + Sync + 'static,
    {
        self.reducers
            .entry(event_type)
            .or_default()
            .push(Arc::new(reducer));
        self
    }

    /// Seals the registrations into an immutable [`Contextor`].
    pub fn build(self) -> Contextor {
        Contextor {
            reducers: Arc::new(self.reducers),
        }
    }
}

/// The immutable context reducer table built by [`ContextorBuilder`].
#[derive(Clone, Default)]
pub struct Contextor {
    reducers: Arc<HashMap<EventType, Vec<ContextReducer>>>,
}

impl Contextor {
    /// Derives and applies all context ops for one record.
    ///
    /// Ops are collected from every reducer registered for the record's type
    /// and applied through the provider in the order produced. A failing op
    /// is reported and skipped; the remaining ops still run.
    pub async fn push(
        &self,
        record: &EventRecord,
        provider: &dyn ContextProvider,
    ) -> Vec<HandlerError> {
        let Some(reducers) = self.reducers.get(&record.event_type) else {
            return Vec::new();
        };

        let mut failures = Vec::new();
        for reducer in reducers {
            for entry in reducer(record) {
                if let Err(cause) = provider.handle(entry).await {
                    tracing::warn!(
                        event_id = %record.id,
                        event_type = %record.event_type,
                        error = %cause,
                        "context op failed"
                    );
                    failures.push(HandlerError::new(
                        record.id,
                        record.event_type.clone(),
                        Box::new(cause),
                    ));
                }
            }
        }
        failures
    }
}
