//! Observation hooks.
//!
//! A single [`Hooks`] value with optional callbacks, configured once at
//! store construction. Hooks observe outcomes; they cannot veto them. They
//! may be called from a task that outlives the appending caller, so they
//! must be `Send + Sync + 'static`.

use std::sync::Arc;

use crate::errors::{HandlerError, StoreError};
use crate::record::EventRecord;

/// How a record came to be (or already was) in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InsertNote {
    /// The record arrived from replication or replay, not a local author.
    pub hydrated: bool,
    /// A record of the same stream and type with a greater `created`
    /// already existed at acceptance.
    pub outdated: bool,
    /// The record was already present; nothing was written.
    pub existing: bool,
}

type InsertedHook = Arc<dyn Fn(&EventRecord, &InsertNote) + Send + Sync>;
type ErrorHook = Arc<dyn Fn(&EventRecord, &StoreError) + Send + Sync>;
type HandlerHook = Arc<dyn Fn(&EventRecord, &HandlerError) + Send + Sync>;

/// The store's hook surface.
///
/// # Examples
///
/// ```
/// use eventline::Hooks;
///
/// let hooks = Hooks::new().on_event_inserted(|record, note| {
///     if note.existing {
///         println!("duplicate append of {}", record.id);
///     }
/// });
/// # let _ = hooks;
/// ```
#[derive(Clone, Default)]
pub struct Hooks {
    event_inserted: Option<InsertedHook>,
    event_error: Option<ErrorHook>,
    projector_error: Option<HandlerHook>,
    context_error: Option<HandlerHook>,
}

impl Hooks {
    /// Creates an empty hook set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Called after a record is accepted, or recognized as already present.
    #[must_use]
    pub fn on_event_inserted<F>(mut self, hook: F) -> Self
    where
        F: Fn(&EventRecord, &InsertNote) + Send + Sync + 'static,
    {
        self.event_inserted = Some(Arc::new(hook));
        self
    }

    /// Called when a record fails validation before insert.
    #[must_use]
    pub fn on_event_error<F>(mut self, hook: F) -> Self
    where
        F: Fn(&EventRecord, &StoreError) + Send + Sync + 'static,
    {
        self.event_error = Some(Arc::new(hook));
        self
    }

    /// Called for each projection handler failure.
    #[must_use]
    pub fn on_projector_error<F>(mut self, hook: F) -> Self
    where
        F: Fn(&EventRecord, &HandlerError) + Send + Sync + 'static,
    {
        self.projector_error = Some(Arc::new(hook));
        self
    }

    /// Called for each failed context op.
    #[must_use]
    pub fn on_context_error<F>(mut self, hook: F) -> Self
    where
        F: Fn(&EventRecord, &HandlerError) + Send + Sync + 'static,
    {
        self.context_error = Some(Arc::new(hook));
        self
    }

    pub(crate) fn inserted(&self, record: &EventRecord, note: &InsertNote) {
        if let Some(hook) = &self.event_inserted {
            hook(record, note);
        }
    }

    pub(crate) fn event_failed(&self, record: &EventRecord, error: &StoreError) {
        if let Some(hook) = &self.event_error {
            hook(record, error);
        }
    }

    pub(crate) fn projector_failed(&self, record: &EventRecord, error: &HandlerError) {
        if let Some(hook) = &self.projector_error {
            hook(record, error);
        }
    }

    pub(crate) fn context_failed(&self, record: &EventRecord, error: &HandlerError) {
        if let Some(hook) = &self.context_error {
            hook(record, error);
        }
    }
}
