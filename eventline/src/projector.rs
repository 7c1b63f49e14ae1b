//! Typed event-to-handler dispatch.
//!
//! Handlers are registered against event types on a [`ProjectorBuilder`] and
//! sealed into an immutable [`Projector`] before the store goes live; there
//! is no re-registration at runtime. For a single record, handlers run
//! sequentially in registration order, which gives read models a
//! deterministic write order. Cross-record order follows the caller's loop.
//!
//! Registration modes:
//!
//! - `on`: exactly one handler per event type; fires for live and replayed
//!   records. Outdated records are skipped unless the registration opts in.
//! - `once`: fires only for genuinely new records, never during replay and
//!   never for outdated records.
//! - `all`: like `on`, but for every event type.

use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::errors::{ConfigError, ConfigResult, HandlerError};
use crate::record::EventRecord;
use crate::types::EventType;

/// How a record is being delivered to handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProjectionInfo {
    /// The record is being re-applied (replay or replication), not newly
    /// authored.
    pub hydrated: bool,
    /// A record of the same stream and type with a greater `created`
    /// already existed when this one was accepted.
    pub outdated: bool,
}

/// What a handler returns.
pub type HandlerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

type HandlerFuture = Pin<Box<dyn Future<Output = HandlerResult> + Send>>;

type Handler = Arc<dyn Fn(EventRecord, ProjectionInfo) -> HandlerFuture + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Selector {
    Type(EventType),
    All,
}

impl Selector {
    fn matches(&self, event_type: &EventType) -> bool {
        match self {
            Self::Type(t) => t == event_type,
            Self::All => true,
        }
    }

    fn describe(&self) -> String {
        match self {
            Self::Type(t) => t.to_string(),
            Self::All => "*".to_string(),
        }
    }
}

struct Entry {
    selector: Selector,
    once: bool,
    include_outdated: bool,
    handler: Handler,
}

impl Entry {
    fn applies(&self, event_type: &EventType, info: ProjectionInfo) -> bool {
        if !self.selector.matches(event_type) {
            return false;
        }
        if self.once {
            return !info.hydrated && !info.outdated;
        }
        !info.outdated || self.include_outdated
    }
}

fn erase<F, Fut>(handler: F) -> Handler
where
    F: Fn(EventRecord, ProjectionInfo) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    Arc::new(move |record, info| Box::pin(handler(record, info)))
}

/// Collects handler registrations before the store goes live.
///
/// # Examples
///
/// ```
/// use eventline::{EventType, ProjectorBuilder};
///
/// let projector = ProjectorBuilder::new()
///     .on(EventType::try_new("user:created").unwrap(), |record, _info| async move {
///         println!("welcome {}", record.data["name"]);
///         Ok(())
///     })
///     .build()
///     .expect("no duplicate registrations");
/// # let _ = projector;
/// ```
#[derive(Default)]
pub struct ProjectorBuilder {
    entries: Vec<Entry>,
}

impl ProjectorBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    fn push<F, Fut>(mut self, selector: Selector, once: bool, include_outdated: bool, f: F) -> Self
    where
        F: Fn(EventRecord, ProjectionInfo) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.entries.push(Entry {
            selector,
            once,
            include_outdated,
            handler: erase(f),
        });
        self
    }

    /// Registers the exclusive handler for an event type.
    ///
    /// Outdated records are skipped; use [`on_including_outdated`]
    /// to receive them.
    ///
    /// [`on_including_outdated`]: Self::on_including_outdated
    #[must_use]
    pub fn on<F, Fut>(self, event_type: EventType, handler: F) -> Self
    where
        F: Fn(EventRecord, ProjectionInfo) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.push(Selector::Type(event_type), false, false, handler)
    }

    /// Like [`on`](Self::on), but also fires for outdated records.
    #[must_use]
    pub fn on_including_outdated<F, Fut>(self, event_type: EventType, handler: F) -> Self
    where
        F: Fn(EventRecord, ProjectionInfo) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.push(Selector::Type(event_type), false, true, handler)
    }

    /// Registers a handler that fires only for genuinely new records.
    ///
    /// Never fires during replay and never for outdated records. Suited to
    /// side effects that must not repeat, like notifications.
    #[must_use]
    pub fn once<F, Fut>(self, event_type: EventType, handler: F) -> Self
    where
        F: Fn(EventRecord, ProjectionInfo) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.push(Selector::Type(event_type), true, false, handler)
    }

    /// Registers the exclusive handler for all event types.
    #[must_use]
    pub fn all<F, Fut>(self, handler: F) -> Self
    where
        F: Fn(EventRecord, ProjectionInfo) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.push(Selector::All, false, false, handler)
    }

    /// Like [`all`](Self::all), but also fires for outdated records.
    #[must_use]
    pub fn all_including_outdated<F, Fut>(self, handler: F) -> Self
    where
        F: Fn(EventRecord, ProjectionInfo) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.push(Selector::All, false, true, handler)
    }

    /// Seals the registrations into an immutable dispatch table.
    ///
    /// # Errors
    ///
    /// [`ConfigError::DuplicateHandler`] if two handlers were registered for
    /// the same selector in the same mode.
    pub fn build(self) -> ConfigResult<Projector> {
        let mut seen: HashSet<(Selector, bool)> = HashSet::new();
        for entry in &self.entries {
            if !seen.insert((entry.selector.clone(), entry.once)) {
                return Err(ConfigError::DuplicateHandler {
                    mode: if entry.once { "once" } else { "on" },
                    target: entry.selector.describe(),
                });
            }
        }
        Ok(Projector {
            entries: Arc::from(self.entries),
        })
    }
}

/// The immutable dispatch table built by [`ProjectorBuilder`].
#[derive(Clone)]
pub struct Projector {
    entries: Arc<[Entry]>,
}

impl std::fmt::Debug for Projector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Projector").finish_non_exhaustive()
    }
}

impl Default for Projector {
    fn default() -> Self {
        Self {
            entries: Arc::from(Vec::new()),
        }
    }
}

impl Projector {
    /// Dispatches one record to every applicable handler.
    ///
    /// Handlers run sequentially in registration order and are awaited one
    /// at a time. A faulting handler is reported and does not prevent
    /// subsequent handlers from running; the collected failures are returned
    /// for hook delivery.
    pub async fn project(&self, record: &EventRecord, info: ProjectionInfo) -> Vec<HandlerError> {
        let mut failures = Vec::new();
        for entry in self.entries.iter() {
            if !entry.applies(&record.event_type, info) {
                continue;
            }
            if let Err(cause) = (entry.handler)(record.clone(), info).await {
                tracing::warn!(
                    event_id = %record.id,
                    event_type = %record.event_type,
                    error = %cause,
                    "projection handler failed"
                );
                failures.push(HandlerError::new(
                    record.id,
                    record.event_type.clone(),
                    cause,
                ));
            }
        }
        failures
    }

    /// Whether any handler is registered for this event type.
    pub fn handles(&self, event_type: &EventType) -> bool {
        self.entries
            .iter()
            .any(|entry| entry.selector.matches(event_type))
    }
}
