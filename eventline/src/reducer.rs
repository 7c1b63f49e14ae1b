//! Reducer descriptors.
//!
//! A reducer is a named left-fold over a filtered event sequence. The
//! descriptor is a plain value: a name, an event source, an optional type
//! filter, an initial state, and a pure fold function. The engine that runs
//! it, resuming from snapshots where possible, lives on the store.

use std::sync::Arc;

use crate::record::EventRecord;
use crate::types::{EventType, ReducerName};

/// Where a reducer's events come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReducerSource {
    /// Fold one stream, addressed by stream id.
    Stream,
    /// Fold the union of a context key's streams.
    Context,
}

/// What a fold step returns.
///
/// Reducer code is caller-owned; its failures surface to the caller as-is
/// instead of being routed through hooks.
pub type FoldResult<S> = Result<S, Box<dyn std::error::Error + Send + Sync>>;

type FoldFn<S> = Arc<dyn Fn(&[EventRecord], S) -> FoldResult<S> + Send + Sync>;

/// An immutable left-fold descriptor producing state of type `S`.
///
/// # Examples
///
/// ```
/// use eventline::{Reducer, ReducerName};
///
/// let counter = Reducer::stream(
///     ReducerName::try_new("event-count").unwrap(),
///     0u64,
///     |events, count: u64| Ok(count + events.len() as u64),
/// );
/// assert_eq!(counter.name().as_ref(), "event-count");
/// ```
#[derive(Clone)]
pub struct Reducer<S> {
    name: ReducerName,
    source: ReducerSource,
    filter: Option<Vec<EventType>>,
    initial: S,
    fold: FoldFn<S>,
}

impl<S: Clone> Reducer<S> {
    /// Creates a stream-sourced reducer.
    pub fn stream<F>(name: ReducerName, initial: S, fold: F) -> Self
    where
        F: Fn(&[EventRecord], S) -> FoldResult<S> + Send + Sync + 'static,
    {
        Self {
            name,
            source: ReducerSource::Stream,
            filter: None,
            initial,
            fold: Arc::new(fold),
        }
    }

    /// Creates a context-sourced reducer.
    pub fn context<F>(name: ReducerName, initial: S, fold: F) -> Self
    where
        F: Fn(&[EventRecord], S) -> FoldResult<S> + Send + Sync + 'static,
    {
        Self {
            name,
            source: ReducerSource::Context,
            filter: None,
            initial,
            fold: Arc::new(fold),
        }
    }

    /// Restricts the fold to the given event types.
    #[must_use]
    pub fn with_filter(mut self, types: Vec<EventType>) -> Self {
        self.filter = Some(types);
        self
    }

    /// The name snapshots are stored under.
    pub fn name(&self) -> &ReducerName {
        &self.name
    }

    /// Where this reducer's events come from.
    pub fn source(&self) -> ReducerSource {
        self.source
    }

    /// The event type filter, if any.
    pub fn filter(&self) -> Option<&[EventType]> {
        self.filter.as_deref()
    }

    /// A copy of the initial state.
    pub fn initial(&self) -> S {
        self.initial.clone()
    }

    /// Runs one fold step over a batch of events.
    pub fn fold(&self, events: &[EventRecord], state: S) -> FoldResult<S> {
        (self.fold)(events, state)
    }
}
